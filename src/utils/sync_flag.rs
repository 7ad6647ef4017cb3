use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

type Inner = Arc<AtomicBool>;

/// Read side of a run flag. Polled by a worker loop.
#[derive(Clone)]
pub struct RunFlag {
    inner: Inner,
}

/// Write side of a run flag. Stopping is one-way; dropping it stops too.
pub struct RunFlagStopper {
    inner: Inner,
}

pub fn new_run_flag() -> (RunFlag, RunFlagStopper) {
    let inner = Arc::new(AtomicBool::new(true));
    (
        RunFlag {
            inner: Arc::clone(&inner),
        },
        RunFlagStopper { inner },
    )
}

impl RunFlag {
    pub fn is_running(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }
}

impl RunFlagStopper {
    pub fn stop(self) {
        self.inner.store(false, Ordering::Release);
    }
}

impl Drop for RunFlagStopper {
    fn drop(&mut self) {
        self.inner.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_clears_every_reader() {
        let (flag, stopper) = new_run_flag();
        let other = flag.clone();
        assert!(flag.is_running());
        stopper.stop();
        assert!(!flag.is_running());
        assert!(!other.is_running());
    }

    #[test]
    fn dropping_stopper_stops() {
        let (flag, stopper) = new_run_flag();
        drop(stopper);
        assert!(!flag.is_running());
    }
}
