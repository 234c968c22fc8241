use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Cooperative cancellation flag shared between a controller and its workers.
///
/// Workers check it once per loop iteration; nothing is interrupted mid-flight.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early once stopped.
    ///
    /// Returns `true` if the signal fired before the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let signal = StopSignal::new();
        let worker_view = signal.clone();

        assert!(!worker_view.is_stopped());
        signal.stop();
        assert!(worker_view.is_stopped());
    }

    #[test]
    fn sleep_returns_early_once_stopped() {
        let signal = StopSignal::new();
        let remote = signal.clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.stop();
        });

        let started = Instant::now();
        assert!(signal.sleep(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        stopper.join().unwrap();
    }

    #[test]
    fn sleep_runs_to_completion_when_not_stopped() {
        assert!(!StopSignal::new().sleep(Duration::from_millis(10)));
    }
}
