use crate::device::{error::ToolResult, link::Link};
use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    sync::{Arc, Mutex},
};

type Responder = Box<dyn FnMut(&str) -> Option<String> + Send>;

#[derive(Default)]
struct MockState {
    written: Vec<u8>,
    rx: VecDeque<u8>,
    fail_reads: bool,
    read_limit: Option<usize>,
}

/// In-memory adapter. Every `\r\n` terminated line in a single write is
/// passed to the responder and the answer, if any, becomes readable.
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
    responder: Responder,
}

/// Test-side view of a `MockLink` that has been moved into a tool.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    pub fn new<F>(responder: F) -> (Self, MockHandle)
    where
        F: FnMut(&str) -> Option<String> + Send + 'static,
    {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: Arc::clone(&state),
                responder: Box::new(responder),
            },
            MockHandle { state },
        )
    }

    /// Answers every command with `OK`.
    pub fn agreeable() -> (Self, MockHandle) {
        Self::new(|_| Some(String::from("OK\r\n")))
    }

    /// Never answers.
    pub fn silent() -> (Self, MockHandle) {
        Self::new(|_| None)
    }
}

impl MockHandle {
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().unwrap().written.clone()
    }

    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written()).to_string()
    }

    pub fn clear_written(&self) {
        self.state.lock().unwrap().written.clear();
    }

    pub fn inject(&self, bytes: &[u8]) {
        self.state.lock().unwrap().rx.extend(bytes.iter().copied());
    }

    /// Hands out at most `limit` bytes per read, as a slow device would.
    pub fn limit_reads(&self, limit: usize) {
        self.state.lock().unwrap().read_limit = Some(limit);
    }

    pub fn fail_reads(&self) {
        self.state.lock().unwrap().fail_reads = true;
    }
}

impl Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        if state.rx.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "Operation timed out"));
        }
        let count = buf
            .len()
            .min(state.rx.len())
            .min(state.read_limit.unwrap_or(usize::MAX));
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

impl Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state.lock().unwrap().written.extend_from_slice(buf);
        let text = String::from_utf8_lossy(buf).to_string();
        let mut segments: Vec<&str> = text.split("\r\n").collect();
        // the last segment was not terminated
        segments.pop();
        for line in segments {
            if let Some(reply) = (self.responder)(line) {
                self.state.lock().unwrap().rx.extend(reply.into_bytes());
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Link for MockLink {
    fn name(&self) -> String {
        String::from("mock")
    }

    fn bytes_to_read(&self) -> ToolResult<u32> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged").into());
        }
        Ok(state.rx.len() as u32)
    }
}
