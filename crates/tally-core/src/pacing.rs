//! Per-model request pacing
//!
//! Each model identifier gets its own slot holding the time of its last
//! dispatch. The slot lock is held across the wait, so concurrent callers of
//! one model queue up serially while other models proceed unblocked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

/// Time source for pacing and cache expiry
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio timers
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Test clock: time only moves when advanced or slept on
///
/// `sleep` returns immediately after advancing the clock and records the
/// requested duration.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    offset: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            state: Arc::new(Mutex::new(ManualState::default())),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        self.lock().offset += by;
    }

    /// Total time elapsed on this clock
    pub fn elapsed(&self) -> Duration {
        self.lock().offset
    }

    /// Every sleep requested so far
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
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
        self.start + self.lock().offset
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.offset += duration;
        state.sleeps.push(duration);
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<Instant>>>;

/// Enforces a minimum interval between dispatches to the same model
pub struct RatePacer {
    min_interval: Duration,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl RatePacer {
    pub fn new(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Pacer allowing `requests_per_minute` dispatches per model (0 = unpaced)
    pub fn per_minute(requests_per_minute: u32, clock: Arc<dyn Clock>) -> Self {
        let interval = if requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(60.0 / f64::from(requests_per_minute))
        };
        Self::new(interval, clock)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Wait until `model` may be dispatched again, then record the dispatch
    ///
    /// Returns how long this call waited.
    pub async fn pace(&self, model: &str) -> Duration {
        if self.min_interval.is_zero() {
            return Duration::ZERO;
        }

        let slot = self.slot(model);
        let mut last = slot.lock().await;

        let mut waited = Duration::ZERO;
        if let Some(previous) = *last {
            let elapsed = self.clock.now().saturating_duration_since(previous);
            if elapsed < self.min_interval {
                waited = self.min_interval - elapsed;
                debug!(model = %model, wait_ms = waited.as_millis() as u64, "Pacing dispatch");
                self.clock.sleep(waited).await;
            }
        }

        *last = Some(self.clock.now());
        waited
    }

    fn slot(&self, model: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(model.to_string()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_dispatch_does_not_wait() {
        let clock = ManualClock::new();
        let pacer = RatePacer::per_minute(10, Arc::new(clock.clone()));

        assert_eq!(pacer.pace("llama3.1-8b").await, Duration::ZERO);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_consecutive_dispatches_are_spaced() {
        let clock = ManualClock::new();
        let pacer = RatePacer::per_minute(10, Arc::new(clock.clone()));

        pacer.pace("llama3.1-8b").await;
        let start = clock.now();
        let waited = pacer.pace("llama3.1-8b").await;

        assert_eq!(waited, Duration::from_secs(6));
        assert!(clock.now().duration_since(start) >= Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_partial_wait_after_elapsed_time() {
        let clock = ManualClock::new();
        let pacer = RatePacer::per_minute(10, Arc::new(clock.clone()));

        pacer.pace("m").await;
        clock.advance(Duration::from_secs(4));
        assert_eq!(pacer.pace("m").await, Duration::from_secs(2));

        clock.advance(Duration::from_secs(60));
        assert_eq!(pacer.pace("m").await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_models_are_paced_independently() {
        let clock = ManualClock::new();
        let pacer = RatePacer::per_minute(10, Arc::new(clock.clone()));

        pacer.pace("a").await;
        assert_eq!(pacer.pace("b").await, Duration::ZERO);
        assert_eq!(pacer.pace("a").await, Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_zero_rate_disables_pacing() {
        let clock = ManualClock::new();
        let pacer = RatePacer::per_minute(0, Arc::new(clock.clone()));

        pacer.pace("m").await;
        assert_eq!(pacer.pace("m").await, Duration::ZERO);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_waiting_model_does_not_block_others() {
        let pacer = Arc::new(RatePacer::new(
            Duration::from_millis(500),
            Arc::new(SystemClock),
        ));
        pacer.pace("slow").await;

        let queued = {
            let pacer = pacer.clone();
            tokio::spawn(async move { pacer.pace("slow").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        assert_eq!(pacer.pace("fast").await, Duration::ZERO);
        assert!(started.elapsed() < Duration::from_millis(250));

        let waited = queued.await.unwrap();
        assert!(waited > Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_same_model_callers_queue_serially() {
        let clock = ManualClock::new();
        let pacer = Arc::new(RatePacer::per_minute(10, Arc::new(clock.clone())));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let pacer = pacer.clone();
            handles.push(tokio::spawn(async move { pacer.pace("m").await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // First goes immediately, the next two each wait a full interval
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(6); 2]);
        assert_eq!(clock.elapsed(), Duration::from_secs(12));
    }
}
