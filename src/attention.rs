use crate::config::AttentionConfig;
use crate::events::{AdrsEvent, EventBus};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info};

/// Presentation state of the attention alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttentionState {
    Off,
    Blinking,
}

/// Bounded-duration blink alarm driven by detection verdicts.
///
/// A positive verdict starts a blink cycle: the visible flag toggles at a
/// fixed interval and the whole cycle is forced off at a fixed bound no
/// matter what. Any new verdict or an explicit reset restarts from Off.
/// There is at most one toggle task and one stop timer alive at any time;
/// every transition that supersedes them aborts them first.
pub struct AttentionController {
    toggle_interval: Duration,
    total_duration: Duration,
    visible: Arc<AtomicBool>,
    blinking: Arc<AtomicBool>,
    toggle_task: Arc<RwLock<Option<JoinHandle<()>>>>,
    stop_task: Arc<RwLock<Option<JoinHandle<()>>>>,
    cycle_started: Arc<parking_lot::RwLock<Option<SystemTime>>>,
    event_bus: Arc<EventBus>,
}

impl AttentionController {
    pub fn new(config: &AttentionConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            toggle_interval: Duration::from_millis(config.toggle_interval_ms),
            total_duration: Duration::from_secs(config.duration_seconds),
            visible: Arc::new(AtomicBool::new(false)),
            blinking: Arc::new(AtomicBool::new(false)),
            toggle_task: Arc::new(RwLock::new(None)),
            stop_task: Arc::new(RwLock::new(None)),
            cycle_started: Arc::new(parking_lot::RwLock::new(None)),
            event_bus,
        }
    }

    /// Feed a verdict into the state machine.
    ///
    /// Both polarities cancel the running cycle; a positive verdict then
    /// restarts it from zero.
    pub async fn observe_verdict(&self, accident_detected: bool) {
        let was_blinking = self.stop_cycle().await;

        if !accident_detected {
            if was_blinking {
                let _ = self
                    .event_bus
                    .publish(AdrsEvent::AttentionCleared {
                        timestamp: SystemTime::now(),
                    })
                    .await;
            }
            return;
        }

        self.start_cycle().await;
    }

    /// Explicit reset, cancelling any pending timers.
    pub async fn reset(&self) {
        if self.stop_cycle().await {
            let _ = self
                .event_bus
                .publish(AdrsEvent::AttentionCleared {
                    timestamp: SystemTime::now(),
                })
                .await;
        }
    }

    pub fn state(&self) -> AttentionState {
        if self.blinking.load(Ordering::Relaxed) {
            AttentionState::Blinking
        } else {
            AttentionState::Off
        }
    }

    /// Current value of the blink flag driving presentation
    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    pub fn cycle_started(&self) -> Option<SystemTime> {
        *self.cycle_started.read()
    }

    /// Abort both timers and force Off. Returns whether a cycle was running.
    async fn stop_cycle(&self) -> bool {
        {
            let mut toggle = self.toggle_task.write().await;
            if let Some(handle) = toggle.take() {
                handle.abort();
            }
        }
        {
            let mut stop = self.stop_task.write().await;
            if let Some(handle) = stop.take() {
                handle.abort();
            }
        }

        let was_blinking = self.blinking.swap(false, Ordering::Relaxed);
        self.visible.store(false, Ordering::Relaxed);
        *self.cycle_started.write() = None;
        was_blinking
    }

    async fn start_cycle(&self) {
        self.blinking.store(true, Ordering::Relaxed);
        // Alarm shows immediately; the first toggle lands one interval later
        self.visible.store(true, Ordering::Relaxed);
        *self.cycle_started.write() = Some(SystemTime::now());

        info!(
            "Attention blink started ({}ms toggle, {}s total)",
            self.toggle_interval.as_millis(),
            self.total_duration.as_secs()
        );

        let _ = self
            .event_bus
            .publish(AdrsEvent::AttentionStarted {
                timestamp: SystemTime::now(),
            })
            .await;

        // Toggle task
        let visible = Arc::clone(&self.visible);
        let toggle_interval = self.toggle_interval;
        let toggle_handle = tokio::spawn(async move {
            let mut ticker = interval(toggle_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First interval tick completes immediately; skip it
            ticker.tick().await;

            loop {
                ticker.tick().await;
                visible.fetch_xor(true, Ordering::Relaxed);
            }
        });
        {
            let mut toggle = self.toggle_task.write().await;
            *toggle = Some(toggle_handle);
        }

        // Stop timer: unconditional Off at the bound
        let visible = Arc::clone(&self.visible);
        let blinking = Arc::clone(&self.blinking);
        let toggle_task = Arc::clone(&self.toggle_task);
        let cycle_started = Arc::clone(&self.cycle_started);
        let event_bus = Arc::clone(&self.event_bus);
        let total_duration = self.total_duration;

        let stop_handle = tokio::spawn(async move {
            sleep(total_duration).await;

            {
                let mut toggle = toggle_task.write().await;
                if let Some(handle) = toggle.take() {
                    handle.abort();
                }
            }

            blinking.store(false, Ordering::Relaxed);
            visible.store(false, Ordering::Relaxed);
            *cycle_started.write() = None;

            debug!("Attention blink expired, forcing off");

            let _ = event_bus
                .publish(AdrsEvent::AttentionCleared {
                    timestamp: SystemTime::now(),
                })
                .await;
        });
        {
            let mut stop = self.stop_task.write().await;
            *stop = Some(stop_handle);
        }
    }
}
