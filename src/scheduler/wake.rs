//! Interruptible wait used by the scheduler loop.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A resettable event flag.
///
/// `set` wakes every waiter and stays set until `clear`, so a wake that
/// arrives before the loop starts waiting is not lost.
#[derive(Debug, Default)]
pub struct WakeSignal {
    flag: Mutex<bool>,
    cvar: Condvar,
}

impl WakeSignal {
    /// Create a cleared signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake all waiters.
    pub fn set(&self) {
        let mut flag = self.lock();
        *flag = true;
        self.cvar.notify_all();
    }

    /// Clear the flag, returning whether it was set.
    pub fn clear(&self) -> bool {
        std::mem::replace(&mut *self.lock(), false)
    }

    /// Returns `true` if the flag is set.
    pub fn is_set(&self) -> bool {
        *self.lock()
    }

    /// Block until the flag is set or `timeout` elapses.
    ///
    /// Returns the flag value on wake-up. Does not clear the flag.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let flag = self.lock();
        let (flag, _) = self
            .cvar
            .wait_timeout_while(flag, timeout, |set| !*set)
            .unwrap_or_else(PoisonError::into_inner);
        *flag
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.flag.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn set_and_clear() {
        let wake = WakeSignal::new();
        assert!(!wake.is_set());
        assert!(!wake.clear());

        wake.set();
        assert!(wake.is_set());
        assert!(wake.clear());
        assert!(!wake.is_set());
    }

    #[test]
    fn wait_returns_immediately_when_already_set() {
        let wake = WakeSignal::new();
        wake.set();
        let started = Instant::now();
        assert!(wake.wait_timeout(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(wake.is_set(), "waiting must not consume the flag");
    }

    #[test]
    fn wait_times_out_when_not_set() {
        let wake = WakeSignal::new();
        let started = Instant::now();
        assert!(!wake.wait_timeout(Duration::from_millis(50)));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn set_from_another_thread_interrupts_wait() {
        let wake = Arc::new(WakeSignal::new());
        let setter = Arc::clone(&wake);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            setter.set();
        });

        let started = Instant::now();
        assert!(wake.wait_timeout(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().expect("join");
    }
}
