//! Trailing-edge debounce as a pure deadline
//!
//! A [`Debouncer`] holds at most one pending value. Each call replaces the
//! value and pushes the deadline out; the value is released by [`poll`] once
//! the deadline passes without another call. The caller owns the clock, so
//! the debouncer never spawns timers and is trivially testable.
//!
//! [`poll`]: Debouncer::poll

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    wait: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            pending: None,
        }
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Schedule `value`, replacing any pending one.
    pub fn call(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.wait));
    }

    /// Take the pending value if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        if self.deadline().is_some_and(|deadline| now >= deadline) {
            self.cancel()
        } else {
            None
        }
    }

    /// When the pending value becomes due.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref().map(|(value, _)| value)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the pending value without firing it.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(100);

    #[test]
    fn test_fires_after_quiet_period() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WAIT);
        debouncer.call(1, start);

        assert_eq!(debouncer.poll(start + Duration::from_millis(99)), None);
        assert_eq!(debouncer.poll(start + WAIT), Some(1));
        assert_eq!(debouncer.poll(start + WAIT * 2), None);
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_burst_fires_last_value_once() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WAIT);
        for (i, value) in [3, 5, 9].into_iter().enumerate() {
            debouncer.call(value, start + Duration::from_millis(40 * i as u64));
        }

        // Deadline moved with the last call at +80ms.
        assert_eq!(debouncer.deadline(), Some(start + Duration::from_millis(180)));
        assert_eq!(debouncer.poll(start + Duration::from_millis(150)), None);
        assert_eq!(debouncer.poll(start + Duration::from_millis(180)), Some(9));
    }

    #[test]
    fn test_cancel_drops_pending_value() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WAIT);
        debouncer.call("a", start);
        assert_eq!(debouncer.cancel(), Some("a"));
        assert_eq!(debouncer.poll(start + WAIT), None);
        assert_eq!(debouncer.deadline(), None);
    }
}
