use crate::events::{AdrsEvent, EventBus};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Small xorshift step generator for the 1-5 frame increments.
///
/// The sequence only has to look plausible, not be uniform; seeding from the
/// session epoch keeps runs distinguishable without a rand dependency.
struct StepGenerator {
    state: u64,
}

impl StepGenerator {
    fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_mul(0x9e3779b97f4a7c15).max(1),
        }
    }

    fn next_step(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        1 + self.state % 5
    }
}

/// Cosmetic frame-progress estimator.
///
/// Emits a monotonically non-decreasing cumulative frame count toward the
/// estimated total at a fixed tick, then stops. It is presentation only:
/// workflow completion is gated solely on the detection response, never on
/// this counter.
pub struct FrameProgressEstimator {
    tick_interval: Duration,
    event_bus: Arc<EventBus>,
}

/// Handle for one running progress sequence. Cancelling guarantees no
/// further emission after the current tick.
pub struct ProgressHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    current: watch::Receiver<u64>,
    total: u64,
}

impl ProgressHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Latest emitted cumulative frame count
    pub fn current(&self) -> u64 {
        *self.current.borrow()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Subscribe to emitted counts
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.current.clone()
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl FrameProgressEstimator {
    pub fn new(tick_interval: Duration, event_bus: Arc<EventBus>) -> Self {
        Self {
            tick_interval,
            event_bus,
        }
    }

    /// Start a progress sequence toward `total` estimated frames.
    pub fn start(&self, total: u64, seed: u64) -> ProgressHandle {
        let (sender, receiver) = watch::channel(0u64);
        let cancel = CancellationToken::new();

        let tick_interval = self.tick_interval;
        let event_bus = Arc::clone(&self.event_bus);
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick completes immediately; consume it so
            // the first increment lands one full tick after start.
            ticker.tick().await;

            let mut generator = StepGenerator::new(seed);
            let mut frames = 0u64;

            while frames < total {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Progress sequence cancelled at {}/{}", frames, total);
                        return;
                    }
                    _ = ticker.tick() => {
                        frames = (frames + generator.next_step()).min(total);

                        if sender.send(frames).is_err() {
                            return;
                        }

                        let _ = event_bus
                            .publish(AdrsEvent::ProgressAdvanced {
                                frames,
                                total,
                                timestamp: SystemTime::now(),
                            })
                            .await;
                    }
                }
            }

            debug!("Progress sequence completed at {}/{}", frames, total);
        });

        ProgressHandle {
            cancel,
            task,
            current: receiver,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const TICK: Duration = Duration::from_millis(250);

    fn estimator() -> FrameProgressEstimator {
        FrameProgressEstimator::new(TICK, Arc::new(EventBus::new(64)))
    }

    async fn settle() {
        // Let the spawned task observe the advanced clock
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_step_generator_bounds() {
        let mut generator = StepGenerator::new(42);
        for _ in 0..1000 {
            let step = generator.next_step();
            assert!((1..=5).contains(&step));
        }
    }

    #[test]
    fn test_step_generator_deterministic_per_seed() {
        let mut a = StepGenerator::new(7);
        let mut b = StepGenerator::new(7);
        for _ in 0..32 {
            assert_eq!(a.next_step(), b.next_step());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_monotonic_and_bounded() {
        let handle = estimator().start(300, 1);
        settle().await;

        let mut last = 0u64;
        for _ in 0..20 {
            advance(TICK).await;
            settle().await;

            let current = handle.current();
            assert!(current >= last, "progress went backwards");
            assert!(current <= 300, "progress exceeded total");
            assert!(current - last <= 5, "increment larger than 5");
            last = current;
        }
        assert!(last > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_stops_at_total() {
        let handle = estimator().start(12, 3);
        settle().await;

        // Worst case one frame per tick
        for _ in 0..15 {
            advance(TICK).await;
            settle().await;
        }

        assert_eq!(handle.current(), 12);
        assert!(handle.is_finished());

        // No further movement after completion
        advance(TICK).await;
        settle().await;
        assert_eq!(handle.current(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_emission_after_cancellation() {
        let handle = estimator().start(300, 5);
        settle().await;

        advance(TICK).await;
        settle().await;
        let at_cancel = handle.current();

        handle.cancel();
        settle().await;

        for _ in 0..4 {
            advance(TICK).await;
            settle().await;
        }

        assert_eq!(handle.current(), at_cancel);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_total_emits_nothing() {
        let handle = estimator().start(0, 9);
        settle().await;

        advance(TICK).await;
        settle().await;

        assert_eq!(handle.current(), 0);
        assert!(handle.is_finished());
    }
}
