use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The source of time for every waiter in this crate. Waiters never call `Instant::now` or
/// `tokio::time::sleep` directly so that tests can substitute a [`ManualClock`].
#[async_trait]
pub trait Clock: Send + Sync {
    /// The current point on a monotonic timeline.
    fn now(&self) -> Instant;

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// The real clock: `Instant::now` and `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// A virtual clock. Time only moves when somebody sleeps on it or calls [`ManualClock::advance`],
/// so a wait that would take minutes completes instantly and deterministically.
///
/// Clones share the same timeline, which lets a mock collaborator (e.g. a mock SSH connector)
/// charge the time its fake network call would have taken.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<ManualClockInner>,
}

#[derive(Debug)]
struct ManualClockInner {
    start: Instant,
    offset_nanos: AtomicU64,
    sleeps: AtomicU32,
    slept_nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManualClockInner {
                start: Instant::now(),
                offset_nanos: AtomicU64::new(0),
                sleeps: AtomicU32::new(0),
                slept_nanos: AtomicU64::new(0),
            }),
        }
    }

    /// Move virtual time forward without counting it as a sleep.
    pub fn advance(&self, duration: Duration) {
        self.inner
            .offset_nanos
            .fetch_add(as_nanos(duration), Ordering::SeqCst);
    }

    /// Virtual time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.inner.offset_nanos.load(Ordering::SeqCst))
    }

    /// Number of times [`Clock::sleep`] was called.
    pub fn sleeps(&self) -> u32 {
        self.inner.sleeps.load(Ordering::SeqCst)
    }

    /// Total virtual time spent in [`Clock::sleep`].
    pub fn slept(&self) -> Duration {
        Duration::from_nanos(self.inner.slept_nanos.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.inner.start + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.inner.sleeps.fetch_add(1, Ordering::SeqCst);
        self.inner
            .slept_nanos
            .fetch_add(as_nanos(duration), Ordering::SeqCst);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

fn as_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);

        clock.sleep(Duration::from_secs(2)).await;
        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.now() - start, Duration::from_millis(2500));
        assert_eq!(clock.sleeps(), 1);
        assert_eq!(clock.slept(), Duration::from_secs(2));

        let shared = clock.clone();
        shared.advance(Duration::from_secs(1));
        assert_eq!(clock.elapsed(), Duration::from_millis(3500));
    }
}
