//! Interruption flag and pause barrier shared between a fetch worker thread
//! and whoever controls it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct PauseState {
    requested: bool,
    parked: bool,
}

/// Cooperative control block for one fetch worker.
///
/// The worker polls [`WorkerControl::is_interrupted`] before every target and
/// blocks in [`WorkerControl::wait_if_paused`] while a pause is requested.
/// [`WorkerControl::cancel`] always releases a parked worker.
#[derive(Debug, Default)]
pub struct WorkerControl {
    interrupted: AtomicBool,
    pause: Mutex<PauseState>,
    wake: Condvar,
}

impl WorkerControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests interruption and wakes the worker if it is paused or sleeping.
    pub fn cancel(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        let mut state = self.lock();
        state.requested = false;
        self.wake.notify_all();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Asks the worker to block before its next request.
    pub fn pause(&self) {
        if self.is_interrupted() {
            return;
        }
        self.lock().requested = true;
    }

    pub fn resume(&self) {
        let mut state = self.lock();
        state.requested = false;
        self.wake.notify_all();
    }

    pub fn is_pause_requested(&self) -> bool {
        self.lock().requested
    }

    /// Whether the worker is currently blocked at the pause barrier.
    pub fn is_parked(&self) -> bool {
        self.lock().parked
    }

    /// Blocks while a pause is requested.
    ///
    /// Returns `false` when the worker was interrupted, either before or while
    /// waiting, and must stop.
    pub fn wait_if_paused(&self) -> bool {
        let mut state = self.lock();
        while state.requested && !self.is_interrupted() {
            state.parked = true;
            state = self
                .wake
                .wait(state)
                .expect("worker pause lock should not be poisoned");
        }
        state.parked = false;
        !self.is_interrupted()
    }

    /// Sleeps for `duration` unless interrupted first. Returns `false` on interruption.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut state = self.lock();
        loop {
            if self.is_interrupted() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let (guard, _) = self
                .wake
                .wait_timeout(state, deadline - now)
                .expect("worker pause lock should not be poisoned");
            state = guard;
        }
    }

    /// Waits up to `timeout` for the worker to park at the pause barrier.
    pub fn wait_until_parked(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.is_parked() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.is_parked()
    }

    fn lock(&self) -> MutexGuard<'_, PauseState> {
        self.pause
            .lock()
            .expect("worker pause lock should not be poisoned")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn unpaused_worker_passes_the_barrier() {
        let control = WorkerControl::new();
        assert!(control.wait_if_paused());
        assert!(!control.is_parked());
    }

    #[test]
    fn resume_releases_a_parked_worker() {
        let control = Arc::new(WorkerControl::new());
        control.pause();

        let worker = {
            let control = Arc::clone(&control);
            thread::spawn(move || control.wait_if_paused())
        };

        assert!(control.wait_until_parked(Duration::from_secs(2)));
        control.resume();
        assert!(worker.join().expect("worker thread"));
        assert!(!control.is_parked());
    }

    #[test]
    fn cancel_releases_a_parked_worker_and_reports_interruption() {
        let control = Arc::new(WorkerControl::new());
        control.pause();

        let worker = {
            let control = Arc::clone(&control);
            thread::spawn(move || control.wait_if_paused())
        };

        assert!(control.wait_until_parked(Duration::from_secs(2)));
        control.cancel();
        assert!(!worker.join().expect("worker thread"));
        assert!(control.is_interrupted());
    }

    #[test]
    fn sleep_returns_early_on_cancel() {
        let control = Arc::new(WorkerControl::new());
        let sleeper = {
            let control = Arc::clone(&control);
            thread::spawn(move || {
                let started = Instant::now();
                let completed = control.sleep(Duration::from_secs(30));
                (completed, started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        control.cancel();
        let (completed, elapsed) = sleeper.join().expect("sleeper thread");
        assert!(!completed);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn pause_after_cancel_is_ignored() {
        let control = WorkerControl::new();
        control.cancel();
        control.pause();
        assert!(!control.is_pause_requested());
        assert!(!control.wait_if_paused());
    }
}
