use crate::detection::DetectionVerdict;
use crate::error::AdrsError;
use crate::events::{AdrsEvent, EventBus};
use crate::hardware::{SignalClient, SignalCode};
use crate::mailer::EmailNotifier;
use crate::media::MediaKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info};
use uuid::Uuid;

/// Metadata handed to every alert channel for one accident verdict
#[derive(Debug, Clone)]
pub struct AlertContext {
    pub kind: MediaKind,
    pub confidence: Option<f32>,
    pub total_frames: Option<u64>,
    pub detected_at: DateTime<Utc>,
    pub code: SignalCode,
}

/// Delivery result of a single alert channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelStatus {
    Sent,
    Failed(String),
}

impl ChannelStatus {
    pub fn is_sent(&self) -> bool {
        matches!(self, ChannelStatus::Sent)
    }
}

/// Combined outcome across both channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertOutcome {
    /// Both channels accepted the alert
    Delivered,
    /// One channel failed while the other succeeded
    Partial,
    /// Both channels failed
    Failed,
}

impl AlertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertOutcome::Delivered => "delivered",
            AlertOutcome::Partial => "partial",
            AlertOutcome::Failed => "failed",
        }
    }
}

/// Record of one alert fan-out, created only for positive verdicts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub detected_at: DateTime<Utc>,
    pub kind: MediaKind,
    pub confidence: Option<f32>,
    pub code: SignalCode,
    pub email: ChannelStatus,
    pub hardware: ChannelStatus,
}

impl AlertEvent {
    pub fn outcome(&self) -> AlertOutcome {
        match (self.email.is_sent(), self.hardware.is_sent()) {
            (true, true) => AlertOutcome::Delivered,
            (false, false) => AlertOutcome::Failed,
            _ => AlertOutcome::Partial,
        }
    }

    /// User-visible status distinguishing full, partial, and total failure
    pub fn status_line(&self) -> String {
        match self.outcome() {
            AlertOutcome::Delivered => {
                "Alert sent: emergency email and hardware signal delivered".to_string()
            }
            AlertOutcome::Partial => {
                let failed = if self.email.is_sent() {
                    "hardware signal"
                } else {
                    "emergency email"
                };
                format!("Alert partially sent: {} delivery failed", failed)
            }
            AlertOutcome::Failed => {
                "Alert delivery failed on both channels".to_string()
            }
        }
    }
}

/// Seam for a single alert delivery channel.
#[async_trait::async_trait]
pub trait AlertChannel: Send + Sync {
    /// Name of this channel for logging
    fn channel_name(&self) -> &'static str;

    /// Deliver one alert. Failures are recorded by the dispatcher, never
    /// propagated to the other channel.
    async fn deliver(&self, alert: &AlertContext) -> Result<(), AdrsError>;
}

/// Email channel backed by the mailer collaborator
pub struct EmailChannel {
    notifier: Arc<EmailNotifier>,
}

impl EmailChannel {
    pub fn new(notifier: Arc<EmailNotifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait::async_trait]
impl AlertChannel for EmailChannel {
    fn channel_name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, alert: &AlertContext) -> Result<(), AdrsError> {
        self.notifier.send_alert(alert).await?;
        Ok(())
    }
}

/// Hardware channel writing the kind-specific code to the serial device
pub struct HardwareChannel {
    client: Arc<SignalClient>,
}

impl HardwareChannel {
    pub fn new(client: Arc<SignalClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl AlertChannel for HardwareChannel {
    fn channel_name(&self) -> &'static str {
        "hardware"
    }

    async fn deliver(&self, alert: &AlertContext) -> Result<(), AdrsError> {
        self.client.signal(alert.code).await?;
        Ok(())
    }
}

/// Fans one accident alert out to the email and hardware channels.
///
/// Both channels are always attempted; one failing never cancels the other.
pub struct AlertDispatcher {
    email: Arc<dyn AlertChannel>,
    hardware: Arc<dyn AlertChannel>,
    event_bus: Arc<EventBus>,
}

impl AlertDispatcher {
    pub fn new(
        email: Arc<dyn AlertChannel>,
        hardware: Arc<dyn AlertChannel>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            email,
            hardware,
            event_bus,
        }
    }

    /// Dispatch the alert for a positive verdict and record per-channel
    /// results.
    pub async fn dispatch(&self, verdict: &DetectionVerdict) -> AlertEvent {
        let context = AlertContext {
            kind: verdict.kind,
            confidence: verdict.confidence,
            total_frames: verdict.total_frames,
            detected_at: Utc::now(),
            code: SignalCode::for_kind(verdict.kind),
        };

        let email = self.attempt(&self.email, &context).await;
        let hardware = self.attempt(&self.hardware, &context).await;

        let event = AlertEvent {
            id: Uuid::new_v4(),
            detected_at: context.detected_at,
            kind: context.kind,
            confidence: context.confidence,
            code: context.code,
            email,
            hardware,
        };

        info!("{}", event.status_line());

        let _ = self
            .event_bus
            .publish(AdrsEvent::AlertDispatched {
                outcome: event.outcome(),
                timestamp: SystemTime::now(),
            })
            .await;

        event
    }

    async fn attempt(
        &self,
        channel: &Arc<dyn AlertChannel>,
        context: &AlertContext,
    ) -> ChannelStatus {
        match channel.deliver(context).await {
            Ok(()) => ChannelStatus::Sent,
            Err(e) => {
                error!("{} alert channel failed: {}", channel.channel_name(), e);

                let _ = self
                    .event_bus
                    .publish(AdrsEvent::SystemError {
                        component: channel.channel_name().to_string(),
                        error: e.to_string(),
                    })
                    .await;

                ChannelStatus::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingChannel {
        name: &'static str,
        calls: AtomicUsize,
        fail: bool,
    }

    impl RecordingChannel {
        fn ok(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl AlertChannel for RecordingChannel {
        fn channel_name(&self) -> &'static str {
            self.name
        }

        async fn deliver(&self, _alert: &AlertContext) -> Result<(), AdrsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError::Request {
                    details: "simulated outage".to_string(),
                }
                .into())
            } else {
                Ok(())
            }
        }
    }

    fn positive_verdict(kind: MediaKind) -> DetectionVerdict {
        DetectionVerdict {
            accident_detected: true,
            confidence: Some(0.87),
            total_frames: Some(152),
            kind,
        }
    }

    fn dispatcher(
        email: Arc<RecordingChannel>,
        hardware: Arc<RecordingChannel>,
    ) -> AlertDispatcher {
        AlertDispatcher::new(email, hardware, Arc::new(EventBus::new(16)))
    }

    #[tokio::test]
    async fn test_full_success() {
        let email = RecordingChannel::ok("email");
        let hardware = RecordingChannel::ok("hardware");
        let dispatcher = dispatcher(Arc::clone(&email), Arc::clone(&hardware));

        let event = dispatcher.dispatch(&positive_verdict(MediaKind::Video)).await;

        assert_eq!(event.outcome(), AlertOutcome::Delivered);
        assert!(event.email.is_sent());
        assert!(event.hardware.is_sent());
        assert_eq!(event.code, SignalCode::On);
        assert_eq!(email.call_count(), 1);
        assert_eq!(hardware.call_count(), 1);
    }

    #[tokio::test]
    async fn test_email_failure_does_not_cancel_hardware() {
        let email = RecordingChannel::failing("email");
        let hardware = RecordingChannel::ok("hardware");
        let dispatcher = dispatcher(Arc::clone(&email), Arc::clone(&hardware));

        let event = dispatcher.dispatch(&positive_verdict(MediaKind::Video)).await;

        assert_eq!(event.outcome(), AlertOutcome::Partial);
        assert!(!event.email.is_sent());
        assert!(event.hardware.is_sent());
        // The untried channel was still attempted
        assert_eq!(hardware.call_count(), 1);
    }

    #[tokio::test]
    async fn test_hardware_failure_does_not_cancel_email() {
        let email = RecordingChannel::ok("email");
        let hardware = RecordingChannel::failing("hardware");
        let dispatcher = dispatcher(Arc::clone(&email), Arc::clone(&hardware));

        let event = dispatcher.dispatch(&positive_verdict(MediaKind::Image)).await;

        assert_eq!(event.outcome(), AlertOutcome::Partial);
        assert!(event.email.is_sent());
        assert!(!event.hardware.is_sent());
        assert_eq!(email.call_count(), 1);
    }

    #[tokio::test]
    async fn test_total_failure_records_both_reasons() {
        let email = RecordingChannel::failing("email");
        let hardware = RecordingChannel::failing("hardware");
        let dispatcher = dispatcher(email, hardware);

        let event = dispatcher.dispatch(&positive_verdict(MediaKind::Video)).await;

        assert_eq!(event.outcome(), AlertOutcome::Failed);
        assert!(matches!(event.email, ChannelStatus::Failed(_)));
        assert!(matches!(event.hardware, ChannelStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_code_follows_asset_kind() {
        let dispatcher = dispatcher(RecordingChannel::ok("email"), RecordingChannel::ok("hardware"));

        let video_event = dispatcher.dispatch(&positive_verdict(MediaKind::Video)).await;
        assert_eq!(video_event.code, SignalCode::On);

        let image_event = dispatcher.dispatch(&positive_verdict(MediaKind::Image)).await;
        assert_eq!(image_event.code, SignalCode::Off);
    }

    #[test]
    fn test_status_line_distinguishes_outcomes() {
        let base = AlertEvent {
            id: Uuid::new_v4(),
            detected_at: Utc::now(),
            kind: MediaKind::Video,
            confidence: None,
            code: SignalCode::On,
            email: ChannelStatus::Sent,
            hardware: ChannelStatus::Sent,
        };
        assert!(base.status_line().contains("delivered"));

        let partial = AlertEvent {
            hardware: ChannelStatus::Failed("offline".to_string()),
            ..base.clone()
        };
        assert!(partial.status_line().contains("hardware signal"));

        let failed = AlertEvent {
            email: ChannelStatus::Failed("down".to_string()),
            hardware: ChannelStatus::Failed("offline".to_string()),
            ..base
        };
        assert!(failed.status_line().contains("both channels"));
    }
}
