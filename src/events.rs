use crate::alert::AlertOutcome;
use crate::error::EventBusError;
use crate::media::MediaKind;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur in the accident-response workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AdrsEvent {
    /// An uploaded asset passed validation and was attached to the session
    AssetAccepted {
        kind: MediaKind,
        size_bytes: u64,
        timestamp: SystemTime,
    },
    /// A detection request was dispatched to the inference collaborator
    DetectionStarted { epoch: u64, timestamp: SystemTime },
    /// The inference collaborator returned a verdict
    VerdictReady {
        accident_detected: bool,
        confidence: Option<f32>,
        timestamp: SystemTime,
    },
    /// The detection call failed; the session moves to Failed
    DetectionFailed {
        reason: String,
        timestamp: SystemTime,
    },
    /// The alert fan-out completed with the given per-channel outcome
    AlertDispatched {
        outcome: AlertOutcome,
        timestamp: SystemTime,
    },
    /// The blink alarm entered its bounded cycle
    AttentionStarted { timestamp: SystemTime },
    /// The blink alarm returned to Off
    AttentionCleared { timestamp: SystemTime },
    /// A live preview session became active
    PreviewStarted {
        generation: u64,
        timestamp: SystemTime,
    },
    /// The live preview session was released
    PreviewCleared {
        generation: u64,
        timestamp: SystemTime,
    },
    /// Cosmetic frame counter advanced
    ProgressAdvanced {
        frames: u64,
        total: u64,
        timestamp: SystemTime,
    },
    /// The workflow session was reset to Idle
    SessionReset { timestamp: SystemTime },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl AdrsEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            AdrsEvent::AssetAccepted { timestamp, .. } => *timestamp,
            AdrsEvent::DetectionStarted { timestamp, .. } => *timestamp,
            AdrsEvent::VerdictReady { timestamp, .. } => *timestamp,
            AdrsEvent::DetectionFailed { timestamp, .. } => *timestamp,
            AdrsEvent::AlertDispatched { timestamp, .. } => *timestamp,
            AdrsEvent::AttentionStarted { timestamp } => *timestamp,
            AdrsEvent::AttentionCleared { timestamp } => *timestamp,
            AdrsEvent::PreviewStarted { timestamp, .. } => *timestamp,
            AdrsEvent::PreviewCleared { timestamp, .. } => *timestamp,
            AdrsEvent::ProgressAdvanced { timestamp, .. } => *timestamp,
            AdrsEvent::SessionReset { timestamp } => *timestamp,
            AdrsEvent::SystemError { .. } => SystemTime::now(),
            AdrsEvent::ShutdownRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            AdrsEvent::AssetAccepted {
                kind, size_bytes, ..
            } => {
                format!("{} asset accepted ({} bytes)", kind.as_str(), size_bytes)
            }
            AdrsEvent::DetectionStarted { epoch, .. } => {
                format!("Detection started (epoch {})", epoch)
            }
            AdrsEvent::VerdictReady {
                accident_detected,
                confidence,
                ..
            } => match confidence {
                Some(c) => format!(
                    "Verdict ready: accident={} confidence={:.2}",
                    accident_detected, c
                ),
                None => format!("Verdict ready: accident={}", accident_detected),
            },
            AdrsEvent::DetectionFailed { reason, .. } => {
                format!("Detection failed: {}", reason)
            }
            AdrsEvent::AlertDispatched { outcome, .. } => {
                format!("Alert dispatched: {}", outcome.as_str())
            }
            AdrsEvent::AttentionStarted { .. } => "Attention blink started".to_string(),
            AdrsEvent::AttentionCleared { .. } => "Attention cleared".to_string(),
            AdrsEvent::PreviewStarted { generation, .. } => {
                format!("Live preview started (generation {})", generation)
            }
            AdrsEvent::PreviewCleared { generation, .. } => {
                format!("Live preview cleared (generation {})", generation)
            }
            AdrsEvent::ProgressAdvanced { frames, total, .. } => {
                format!("Progress {}/{} frames", frames, total)
            }
            AdrsEvent::SessionReset { .. } => "Session reset".to_string(),
            AdrsEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            AdrsEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            AdrsEvent::AssetAccepted { .. } => "asset_accepted",
            AdrsEvent::DetectionStarted { .. } => "detection_started",
            AdrsEvent::VerdictReady { .. } => "verdict_ready",
            AdrsEvent::DetectionFailed { .. } => "detection_failed",
            AdrsEvent::AlertDispatched { .. } => "alert_dispatched",
            AdrsEvent::AttentionStarted { .. } => "attention_started",
            AdrsEvent::AttentionCleared { .. } => "attention_cleared",
            AdrsEvent::PreviewStarted { .. } => "preview_started",
            AdrsEvent::PreviewCleared { .. } => "preview_cleared",
            AdrsEvent::ProgressAdvanced { .. } => "progress_advanced",
            AdrsEvent::SessionReset { .. } => "session_reset",
            AdrsEvent::SystemError { .. } => "system_error",
            AdrsEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<AdrsEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<AdrsEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: AdrsEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        // Log important events at appropriate levels
        match &event {
            AdrsEvent::VerdictReady {
                accident_detected, ..
            } => {
                if *accident_detected {
                    warn!("Accident detected, dispatching alerts");
                } else {
                    info!("No accident detected");
                }
            }
            AdrsEvent::AlertDispatched { outcome, .. } => match outcome {
                AlertOutcome::Delivered => info!("Alert delivered on both channels"),
                AlertOutcome::Partial => warn!("Alert partially delivered"),
                AlertOutcome::Failed => error!("Alert delivery failed on both channels"),
            },
            AdrsEvent::DetectionFailed { reason, .. } => {
                warn!("Detection failed: {}", reason);
            }
            AdrsEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            AdrsEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Accept events from specific components (for SystemError events)
    Components(Vec<String>),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &AdrsEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Components(components) => {
                if let AdrsEvent::SystemError { component, .. } = event {
                    components.contains(component)
                } else {
                    false
                }
            }
        }
    }
}

/// Event receiver with filtering capabilities
pub struct EventReceiver {
    receiver: broadcast::Receiver<AdrsEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(receiver: broadcast::Receiver<AdrsEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<AdrsEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                    // Continue loop to get next event if this one doesn't match filter
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<AdrsEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                    // Continue loop to check next event
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let event = AdrsEvent::VerdictReady {
            accident_detected: true,
            confidence: Some(0.87),
            timestamp: SystemTime::now(),
        };

        let subscriber_count = event_bus.publish(event).await.unwrap();
        assert_eq!(subscriber_count, 1);

        let received = receiver.recv().await.unwrap();
        match received {
            AdrsEvent::VerdictReady {
                accident_detected,
                confidence,
                ..
            } => {
                assert!(accident_detected);
                assert_eq!(confidence, Some(0.87));
            }
            _ => panic!("Unexpected event type"),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        let event = AdrsEvent::SessionReset {
            timestamp: SystemTime::now(),
        };

        event_bus.publish(event).await.unwrap();

        let _ = timeout(Duration::from_millis(100), receiver1.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = timeout(Duration::from_millis(100), receiver2.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_event_filter() {
        let filter = EventFilter::EventTypes(vec!["verdict_ready", "detection_failed"]);

        let verdict_event = AdrsEvent::VerdictReady {
            accident_detected: false,
            confidence: None,
            timestamp: SystemTime::now(),
        };

        let progress_event = AdrsEvent::ProgressAdvanced {
            frames: 10,
            total: 300,
            timestamp: SystemTime::now(),
        };

        assert!(filter.matches(&verdict_event));
        assert!(!filter.matches(&progress_event));
    }

    #[tokio::test]
    async fn test_filtered_receiver_skips_unmatched() {
        let event_bus = EventBus::new(10);
        let receiver = event_bus.subscribe();
        let filter = EventFilter::EventTypes(vec!["verdict_ready"]);
        let mut filtered = EventReceiver::new(receiver, filter, "test".to_string());

        event_bus
            .publish(AdrsEvent::ProgressAdvanced {
                frames: 1,
                total: 300,
                timestamp: SystemTime::now(),
            })
            .await
            .unwrap();

        event_bus
            .publish(AdrsEvent::VerdictReady {
                accident_detected: true,
                confidence: None,
                timestamp: SystemTime::now(),
            })
            .await
            .unwrap();

        let received = timeout(Duration::from_millis(100), filtered.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.event_type(), "verdict_ready");
    }

    #[tokio::test]
    async fn test_component_filter_matches_system_errors_only() {
        let filter = EventFilter::Components(vec!["hardware".to_string()]);

        let hw_error = AdrsEvent::SystemError {
            component: "hardware".to_string(),
            error: "write failed".to_string(),
        };
        let other_error = AdrsEvent::SystemError {
            component: "mailer".to_string(),
            error: "timeout".to_string(),
        };
        let reset = AdrsEvent::SessionReset {
            timestamp: SystemTime::now(),
        };

        assert!(filter.matches(&hw_error));
        assert!(!filter.matches(&other_error));
        assert!(!filter.matches(&reset));
    }
}
