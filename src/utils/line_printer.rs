use chrono::Local;
use std::sync::mpsc::Sender;

pub const CONSOLE_TIME_FMT: &str = "%H:%M:%S%.3f";

/// Splits a byte stream into text lines for display. `\r\n`, `\n\r`, `\r`
/// and `\n` all end a line. Lines longer than `line_width` are broken at the
/// last space and continued with a `' '` marker instead of `'|'`.
pub struct LinePrinter {
    timestamp: String,
    buffer: String,
    prefix: String,
    complete: char,
    last_char: Option<char>,
    line_width: usize,
    line_sender: Option<Sender<String>>,
}

fn timestamp_now() -> String {
    Local::now().format(CONSOLE_TIME_FMT).to_string()
}

macro_rules! send_split {
    ($self: ident, $buffer: expr) => {
        let line = format!(
            "[{}] {} {} {}",
            $self.timestamp, $self.prefix, $self.complete, $buffer
        );
        println!("{}", line);
        if let Some(sender) = &$self.line_sender {
            let _ = sender.send(line);
        }
    };
}

impl LinePrinter {
    pub fn new(prefix: &str, line_width: usize, line_sender: Option<Sender<String>>) -> Self {
        Self {
            prefix: prefix.to_string(),
            timestamp: timestamp_now(),
            buffer: String::new(),
            complete: '|',
            line_width,
            last_char: None,
            line_sender,
        }
    }

    pub fn push_str(&mut self, lines: &str) {
        for ch in lines.chars() {
            if let '\r' | '\n' = ch {
                let last_char = self.last_char;
                self.last_char = Some(ch);
                if let Some(last_char) = last_char {
                    if last_char != ch {
                        // second half of a \r\n or \n\r pair
                        self.last_char = None;
                        continue;
                    }
                }
                send_split!(self, &self.buffer);
                self.complete = '|';
                self.buffer.clear();
            } else {
                if self.buffer.len() >= self.line_width {
                    match self.buffer.rfind(' ') {
                        Some(0) | None => {}
                        Some(last_space_idx) => {
                            send_split!(self, &self.buffer[..last_space_idx]);
                            self.buffer = self.buffer[last_space_idx + 1..].to_string();
                            self.complete = ' ';
                        }
                    }
                }
                if self.buffer.is_empty() {
                    self.timestamp = timestamp_now();
                }
                self.buffer.push(ch);
                self.last_char = None;
            }
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.push_str(&String::from_utf8_lossy(bytes))
    }

    /// Emits a partial line, if any. Used when monitoring stops.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() {
            send_split!(self, &self.buffer);
            self.buffer.clear();
        }
        self.complete = '|';
        self.last_char = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    fn collect(width: usize, chunks: &[&str]) -> Vec<String> {
        let (sender, receiver) = channel();
        let mut printer = LinePrinter::new("RX", width, Some(sender));
        for chunk in chunks {
            printer.push_str(chunk);
        }
        printer.finish();
        drop(printer);
        receiver
            .iter()
            .map(|line| line.split_once("] ").unwrap().1.to_string())
            .collect()
    }

    #[test]
    fn crlf_ends_one_line() {
        assert_eq!(collect(80, &["OK\r\n", "ERROR\r\n"]), vec!["RX | OK", "RX | ERROR"]);
    }

    #[test]
    fn line_split_across_reads() {
        assert_eq!(collect(80, &["+VER:", "1.2\r", "\n"]), vec!["RX | +VER:1.2"]);
    }

    #[test]
    fn repeated_newline_is_empty_line() {
        assert_eq!(collect(80, &["a\n\nb"]), vec!["RX | a", "RX | ", "RX | b"]);
    }

    #[test]
    fn long_line_wraps_at_space() {
        assert_eq!(
            collect(8, &["hello world again\n"]),
            vec!["RX | hello", "RX   world", "RX   again"]
        );
    }
}
