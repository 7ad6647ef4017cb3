use crate::{
    device::{
        error::{ToolError, ToolResult},
        frame::{to_hex, CanFrame},
        link::Link,
    },
    threads::{
        file_logger_thread::FileLoggerThread, set_thread_priority, BUFFER_SIZE, LINE_WIDTH,
        MONITOR_POLL_INTERVAL, MONITOR_THREAD_PRIORITY,
    },
    utils::{
        line_printer::{LinePrinter, CONSOLE_TIME_FMT},
        ring_buf_queue::{write_queue, WriteQueueConsumer, WriteQueueProducer},
        sync_flag::{new_run_flag, RunFlag, RunFlagStopper},
    },
};
use chrono::Local;
use std::{
    io::{self, Read, Write},
    path::Path,
    sync::mpsc::Sender,
    thread::{self, JoinHandle},
};

/// How received bytes are shown on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Hex,
    Text,
}

pub fn monitor_log_header() -> Vec<String> {
    vec![
        format!("# CAN Monitor Log - {}", Local::now().format("%Y-%m-%d %H:%M:%S%.6f")),
        String::from("# Timestamp,Direction,ID,Data"),
    ]
}

fn timestamp_now() -> String {
    Local::now().format(CONSOLE_TIME_FMT).to_string()
}

/// What the monitor hands back when it stops.
pub struct MonitorExit {
    pub link: Box<dyn Link>,
    pub result: ToolResult<()>,
    pub rx_bytes: usize,
    pub log_lines: Option<usize>,
}

/// Owns the link while monitoring. Writes from the caller are queued and
/// drained by the monitor loop between reads.
pub struct MonitorThread {
    stopper: RunFlagStopper,
    write_producer: WriteQueueProducer,
    logger: Option<FileLoggerThread>,
    log_sender: Option<Sender<String>>,
    join_handle: JoinHandle<(Box<dyn Link>, ToolResult<()>, usize)>,
}

impl MonitorThread {
    /// Opens a monitor log and writes its header.
    pub fn open_log(path: &Path) -> ToolResult<FileLoggerThread> {
        FileLoggerThread::spawn(path, &monitor_log_header())
            .map_err(|e| ToolError::MonitorLog(format!("{:?}: {}", path, e)))
    }

    pub fn spawn(link: Box<dyn Link>, logger: Option<FileLoggerThread>, display: DisplayMode) -> Self {
        let log_sender = logger.as_ref().map(|l| l.line_sender());
        let (run_flag, stopper) = new_run_flag();
        let (write_producer, write_consumer) = write_queue::<BUFFER_SIZE>();
        let task_sender = log_sender.clone();

        Self {
            stopper,
            write_producer,
            logger,
            log_sender,
            join_handle: thread::spawn(move || {
                monitor_task(run_flag, link, write_consumer, display, task_sender)
            }),
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.write_producer.push(bytes);
    }

    /// Queues an encoded frame and records it as TX.
    pub fn send_frame(&mut self, frame: &CanFrame, bytes: &[u8]) {
        self.write(bytes);
        let timestamp = timestamp_now();
        println!("[{}] TX: {}", timestamp, frame);
        if let Some(sender) = &self.log_sender {
            let _ = sender.send(format!("{},TX,{},{}", timestamp, frame.id_string(), to_hex(frame.data())));
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    pub fn join(mut self) -> ToolResult<MonitorExit> {
        // let writes parked in the overflow reach the ring before stopping
        while self.write_producer.pending() > 0 && !self.join_handle.is_finished() {
            self.write_producer.flush();
            thread::sleep(MONITOR_POLL_INTERVAL);
        }
        self.stopper.stop();
        let (link, result, rx_bytes) = self
            .join_handle
            .join()
            .map_err(|_| ToolError::Thread(String::from("monitor thread panicked")))?;
        drop(self.log_sender);
        let log_lines = match self.logger {
            Some(logger) => Some(
                logger
                    .join()
                    .map_err(|e| ToolError::MonitorLog(e.to_string()))?,
            ),
            None => None,
        };
        Ok(MonitorExit {
            link,
            result,
            rx_bytes,
            log_lines,
        })
    }
}

enum RxDisplay {
    Hex,
    Text(LinePrinter),
}

impl RxDisplay {
    fn new(mode: DisplayMode) -> Self {
        match mode {
            DisplayMode::Hex => RxDisplay::Hex,
            DisplayMode::Text => RxDisplay::Text(LinePrinter::new("RX", LINE_WIDTH, None)),
        }
    }

    fn show(&mut self, timestamp: &str, bytes: &[u8]) {
        match self {
            RxDisplay::Hex => println!("[{}] RX: {}", timestamp, to_hex(bytes)),
            RxDisplay::Text(printer) => printer.push_bytes(bytes),
        }
    }

    fn finish(&mut self) {
        if let RxDisplay::Text(printer) = self {
            printer.finish();
        }
    }
}

fn drain_writes<const SIZE: usize>(
    link: &mut Box<dyn Link>,
    write_consumer: &mut WriteQueueConsumer<SIZE>,
) -> ToolResult<()> {
    loop {
        let write_buf = write_consumer.pop();
        if write_buf.is_empty() {
            break;
        }
        link.write_all(&write_buf)?;
    }
    link.flush()?;
    Ok(())
}

/// Reads whatever is waiting, returning 0 when nothing is.
fn read_waiting(link: &mut Box<dyn Link>, read_buf: &mut [u8]) -> ToolResult<usize> {
    let waiting = link.bytes_to_read()? as usize;
    if waiting == 0 {
        return Ok(0);
    }
    let len = waiting.min(read_buf.len());
    match link.read(&mut read_buf[..len]) {
        Ok(count) => Ok(count),
        Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn monitor_task<const SIZE: usize>(
    run_flag: RunFlag,
    mut link: Box<dyn Link>,
    mut write_consumer: WriteQueueConsumer<SIZE>,
    display: DisplayMode,
    log_sender: Option<Sender<String>>,
) -> (Box<dyn Link>, ToolResult<()>, usize) {
    set_thread_priority::<MONITOR_THREAD_PRIORITY>();
    log::info!("[monitor_task] {} start", link.name());

    let mut display = RxDisplay::new(display);
    let mut read_buf = [0u8; BUFFER_SIZE];
    let mut rx_bytes = 0;
    let result = loop {
        if !run_flag.is_running() {
            // pending writes still go out before the link is handed back
            break drain_writes(&mut link, &mut write_consumer);
        }
        if let Err(e) = drain_writes(&mut link, &mut write_consumer) {
            println!("Monitor error: {}", e);
            break Err(e);
        }
        match read_waiting(&mut link, &mut read_buf) {
            Ok(0) => {}
            Ok(count) => {
                rx_bytes += count;
                let timestamp = timestamp_now();
                let bytes = &read_buf[..count];
                display.show(&timestamp, bytes);
                if let Some(sender) = &log_sender {
                    let _ = sender.send(format!("{},RX,unknown,{}", timestamp, to_hex(bytes)));
                }
            }
            Err(e) => {
                println!("Monitor error: {}", e);
                break Err(e);
            }
        }
        thread::sleep(MONITOR_POLL_INTERVAL);
    };
    display.finish();

    log::info!("[monitor_task] {} end, {} bytes received", link.name(), rx_bytes);
    (link, result, rx_bytes)
}
