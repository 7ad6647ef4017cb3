use crate::{
    threads::{set_thread_priority, FILE_LOGGER_THREAD_PRIORITY, LOGGER_POLL_INTERVAL},
    utils::{
        sync_flag::{new_run_flag, RunFlag, RunFlagStopper},
        user_io::{BoxErr, BoxResult},
    },
};
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::mpsc::{channel, Receiver, Sender},
    thread::{self, JoinHandle},
};

/// Appends lines received over a channel to a file, syncing whenever the
/// channel goes quiet.
pub struct FileLoggerThread {
    stopper: RunFlagStopper,
    line_sender: Sender<String>,
    join_handle: JoinHandle<BoxResult<usize>>,
}

impl FileLoggerThread {
    /// Truncates `file_path` and writes `header` before any queued line.
    pub fn spawn(file_path: &Path, header: &[String]) -> BoxResult<Self> {
        let mut file = match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(file_path)
        {
            Ok(opened_file) => {
                log::info!("[file_logger_task] opened {:?}", file_path);
                opened_file
            }
            Err(e) => {
                log::error!("[file_logger_task] error {:?}", e);
                return Err(Box::new(e));
            }
        };
        for line in header {
            writeln!(file, "{}", line)?;
        }

        let (run_flag, stopper) = new_run_flag();
        let (line_sender, line_receiver) = channel();
        Ok(Self {
            stopper,
            line_sender,
            join_handle: thread::spawn(move || file_logger_task(run_flag, file, line_receiver)),
        })
    }

    pub fn line_sender(&self) -> Sender<String> {
        self.line_sender.clone()
    }

    /// Flushes everything sent so far and returns the number of lines written.
    pub fn join(self) -> BoxResult<usize> {
        self.stopper.stop();
        self.join_handle.join().box_err()?
    }
}

fn write_line(file: &mut File, mut line: String) -> BoxResult<()> {
    line.push('\n');
    if let Err(e) = file.write_all(line.as_bytes()) {
        log::error!("[file_logger_task] write error {:#?}", e);
        return Err(Box::new(e));
    }
    Ok(())
}

fn file_logger_task(run_flag: RunFlag, mut file: File, line_receiver: Receiver<String>) -> BoxResult<usize> {
    set_thread_priority::<FILE_LOGGER_THREAD_PRIORITY>();

    let mut written = 0;
    let mut synced = false;
    while run_flag.is_running() {
        if let Ok(line) = line_receiver.recv_timeout(LOGGER_POLL_INTERVAL) {
            write_line(&mut file, line)?;
            written += 1;
            synced = false;
        } else if !synced {
            if let Err(e) = file.sync_all() {
                log::error!("[file_logger_task] sync error {:#?}", e);
                return Err(Box::new(e));
            }
            synced = true;
        }
    }
    while let Ok(line) = line_receiver.try_recv() {
        write_line(&mut file, line)?;
        written += 1;
    }
    file.sync_all()?;
    log::info!("[file_logger_task] end, {} lines", written);
    Ok(written)
}
