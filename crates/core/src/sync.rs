//! Cooperative cancellation for the long-running loops.
//!
//! Every loop (transmitter, receiver, scheduler) owns a [`StopSignal`] and
//! checks it once per iteration, using [`StopSignal::wait_timeout`] as its
//! bounded idle wait so a stop request is observed within one poll interval.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// One-shot stop flag with a bounded wait.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the loop to stop. Raising twice is a no-op.
    pub fn raise(&self) {
        let (flag, cvar) = &*self.inner;
        let mut raised = flag.lock();
        if !*raised {
            *raised = true;
            cvar.notify_all();
        }
    }

    pub fn is_raised(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep up to `timeout`, waking early if the signal is raised.
    /// Returns whether the signal is raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let mut raised = flag.lock();
        if !*raised {
            cvar.wait_for(&mut raised, timeout);
        }
        *raised
    }
}

/// A named thread paired with the signal that stops it.
pub struct Worker {
    name: String,
    stop: StopSignal,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a new thread. The body receives the stop signal it must poll.
    pub fn spawn<F>(name: &str, body: F) -> io::Result<Self>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let stop = StopSignal::new();
        let signal = stop.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(signal))?;

        tracing::trace!(worker = name, "worker started");
        Ok(Self {
            name: name.to_string(),
            stop,
            handle: Some(handle),
        })
    }

    pub fn signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Raise the stop signal and wait for the thread to exit. Idempotent.
    pub fn stop(&mut self) {
        self.stop.raise();
        let Some(handle) = self.handle.take() else {
            return;
        };
        // Joining from the worker's own thread would deadlock.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!(worker = %self.name, "worker panicked");
        } else {
            tracing::trace!(worker = %self.name, "worker stopped");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn wait_times_out_when_not_raised() {
        let stop = StopSignal::new();
        let start = Instant::now();
        assert!(!stop.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn raise_wakes_waiter() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        let waiter = thread::spawn(move || remote.wait_timeout(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        stop.raise();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn worker_stop_is_idempotent() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let mut worker = Worker::spawn("ticker", move |stop| {
            while !stop.wait_timeout(Duration::from_millis(5)) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        worker.stop();
        assert!(worker.is_finished());
        let after = ticks.load(Ordering::SeqCst);
        worker.stop();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), after);
    }
}
