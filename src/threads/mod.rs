pub mod file_logger_thread;
pub mod monitor_thread;
pub mod user_console;

use std::time::Duration;
use thread_priority::{set_current_thread_priority, ThreadPriority};

pub const BUFFER_SIZE: usize = 0x1000;
pub const LINE_WIDTH: usize = 80;
pub const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const LOGGER_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const MONITOR_THREAD_PRIORITY: u8 = 1;
pub const FILE_LOGGER_THREAD_PRIORITY: u8 = 3;

pub fn set_thread_priority<const PRIORITY: u8>() {
    match PRIORITY.try_into() {
        Ok(value) => {
            if let Err(e) = set_current_thread_priority(ThreadPriority::Crossplatform(value)) {
                log::warn!("[set_thread_priority] {} => {:?}", PRIORITY, e);
            }
        }
        Err(e) => log::warn!("[set_thread_priority] invalid priority {} => {:?}", PRIORITY, e),
    }
}
