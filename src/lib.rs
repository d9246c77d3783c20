pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod hardware;
pub mod detection;
pub mod mailer;
pub mod alert;
pub mod preview;
pub mod progress;
pub mod attention;
pub mod orchestration;

#[cfg(feature = "api")]
pub mod api;

pub use config::AdrsConfig;
pub use error::{AdrsError, Result};
pub use events::{AdrsEvent, EventBus, EventFilter, EventReceiver};
pub use media::{MediaAsset, MediaKind};
pub use hardware::{SignalClient, SignalCode};
pub use detection::{DetectionClient, DetectionVerdict};
pub use mailer::{EmailNotifier, SendEmailResponse};
pub use alert::{
    AlertChannel, AlertContext, AlertDispatcher, AlertEvent, AlertOutcome, ChannelStatus,
    EmailChannel, HardwareChannel,
};
pub use preview::{LivePreviewManager, LiveSession, SessionQuery};
pub use progress::{FrameProgressEstimator, ProgressHandle};
pub use attention::{AttentionController, AttentionState};
pub use orchestration::{
    AdrsOrchestrator, ComponentState, SessionState, ShutdownReason, WorkflowSnapshot,
};

#[cfg(feature = "api")]
pub use api::ApiServer;
