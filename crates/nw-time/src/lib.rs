//! Shim over the clock so time-driven logic can run against a fake in tests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// The clock operations reconciliation loops are allowed to depend on.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn since(&self, earlier: Instant) -> Duration;
    fn until(&self, later: Instant) -> Duration;
    /// Fires exactly once after `delay` has elapsed, delivering the fire time.
    fn after(&self, delay: Duration) -> oneshot::Receiver<Instant>;
}

/// Production clock backed by [`std::time::Instant`] and the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn since(&self, earlier: Instant) -> Duration {
        earlier.elapsed()
    }

    fn until(&self, later: Instant) -> Duration {
        later.saturating_duration_since(Instant::now())
    }

    fn after(&self, delay: Duration) -> oneshot::Receiver<Instant> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Instant::now());
        });
        rx
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeClockInner>>,
}

#[derive(Debug)]
struct FakeClockInner {
    now: Instant,
    timers: Vec<Timer>,
}

#[derive(Debug)]
struct Timer {
    deadline: Instant,
    sender: oneshot::Sender<Instant>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeClockInner {
                now: Instant::now(),
                timers: Vec::new(),
            })),
        }
    }

    /// Move time forward and fire any timers that have come due.
    pub fn advance(&self, step: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.now += step;
        let now = inner.now;
        let mut remaining = Vec::new();
        for timer in inner.timers.drain(..) {
            if timer.deadline <= now {
                let _ = timer.sender.send(now);
            } else {
                remaining.push(timer);
            }
        }
        inner.timers = remaining;
    }

    /// Number of timers waiting to fire.
    pub fn pending_timers(&self) -> usize {
        self.inner.lock().unwrap().timers.len()
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.inner.lock().unwrap().now
    }

    fn since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }

    fn until(&self, later: Instant) -> Duration {
        later.saturating_duration_since(self.now())
    }

    fn after(&self, delay: Duration) -> oneshot::Receiver<Instant> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().unwrap();
        let deadline = inner.now + delay;
        if delay.is_zero() {
            let _ = tx.send(inner.now);
        } else {
            inner.timers.push(Timer {
                deadline,
                sender: tx,
            });
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_deterministically() {
        let clock = FakeClock::new();
        let start = clock.now();
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.since(start), Duration::from_secs(90));

        let later = clock.now() + Duration::from_secs(30);
        assert_eq!(clock.until(later), Duration::from_secs(30));
    }

    #[test]
    fn fake_timer_fires_only_when_due() {
        let clock = FakeClock::new();
        let mut rx = clock.after(Duration::from_secs(10));
        assert_eq!(clock.pending_timers(), 1);

        clock.advance(Duration::from_secs(5));
        assert!(rx.try_recv().is_err());

        clock.advance(Duration::from_secs(5));
        let fired_at = rx.try_recv().expect("timer should have fired");
        assert_eq!(fired_at, clock.now());
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn zero_delay_fires_immediately() {
        let clock = FakeClock::new();
        let mut rx = clock.after(Duration::ZERO);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn real_clock_timer_fires() {
        let clock = RealClock::new();
        let before = clock.now();
        let rx = clock.after(Duration::from_millis(5));
        let fired_at = rx.await.expect("sender dropped");
        assert!(clock.since(before) >= Duration::from_millis(5));
        assert!(fired_at >= before);
    }
}
