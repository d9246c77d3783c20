use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdrsError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    #[error("Preview error: {0}")]
    Preview(#[from] PreviewError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("System error: {message}")]
    System { message: String },
}

impl AdrsError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Synchronous rejection of an upload before any network or hardware call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unsupported media type: {content_type}")]
    UnsupportedMediaType { content_type: String },

    #[error("File too large: {size_bytes} bytes (limit {limit_bytes})")]
    FileTooLarge { size_bytes: u64, limit_bytes: u64 },

    #[error("Empty upload payload")]
    EmptyPayload,
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Detection request failed: {details}")]
    Request { details: String },

    #[error("Detection service rejected request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Malformed detection response: {details}")]
    MalformedResponse { details: String },
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Mailer request failed: {details}")]
    Request { details: String },

    #[error("Mailer rejected request with status {status}")]
    Rejected { status: u16 },

    #[error("Mailer declined to send: {message}")]
    Declined { message: String },
}

#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("Failed to open serial device {path}: {details}")]
    OpenFailed { path: String, details: String },

    #[error("Hardware device unavailable")]
    DeviceUnavailable,

    #[error("Invalid hardware signal code: {code:?}")]
    InvalidCode { code: char },

    #[error("Serial write failed: {details}")]
    WriteFailed { details: String },
}

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("Preview upload failed: {details}")]
    Request { details: String },

    #[error("Streaming collaborator rejected request with status {status}")]
    Rejected { status: u16 },
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Workflow busy in state {state}, reset or wait for completion")]
    Busy { state: String },
}

pub type Result<T> = std::result::Result<T, AdrsError>;
