//! Background thread with a shutdown flag, joined on drop.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep, so a stop request is honoured promptly.
const SLICE: Duration = Duration::from_millis(5);

pub(crate) struct Worker {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn<F>(body: F) -> Self
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let join_handle = std::thread::spawn(move || {
            body(&*flag);
            tracing::trace!("sim worker exiting cleanly");
        });
        Self {
            shutdown,
            join_handle: Some(join_handle),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("sim worker panicked");
        }
    }
}

/// Sleep for `d` unless asked to stop. Returns false on shutdown.
pub(crate) fn pause(shutdown: &AtomicBool, d: Duration) -> bool {
    let deadline = Instant::now() + d;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(SLICE));
    }
}
