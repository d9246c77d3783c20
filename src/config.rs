use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AdrsConfig {
    pub detection: DetectionConfig,
    pub mailer: MailerConfig,
    pub hardware: HardwareConfig,
    pub preview: PreviewConfig,
    pub progress: ProgressConfig,
    pub attention: AttentionConfig,
    pub workflow: WorkflowConfig,
    pub api: ApiConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectionConfig {
    /// Base URL of the inference collaborator
    #[serde(default = "default_detection_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds (video uploads can take a while)
    #[serde(default = "default_detection_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MailerConfig {
    /// Base URL of the mail-sending collaborator
    #[serde(default = "default_mailer_endpoint")]
    pub endpoint: String,

    /// Recipient address for accident alerts
    #[serde(default = "default_mailer_recipient")]
    pub recipient: String,

    /// Request timeout in seconds
    #[serde(default = "default_mailer_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HardwareConfig {
    /// Serial device path
    #[serde(default = "default_hardware_path")]
    pub path: String,

    /// Baud rate (device protocol runs at 9600)
    #[serde(default = "default_hardware_baud")]
    pub baud_rate: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PreviewConfig {
    /// Base URL of the streaming collaborator holding the live asset slot
    #[serde(default = "default_preview_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_preview_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProgressConfig {
    /// Tick interval for the cosmetic frame counter in milliseconds
    #[serde(default = "default_progress_tick_ms")]
    pub tick_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AttentionConfig {
    /// Blink toggle interval in milliseconds
    #[serde(default = "default_attention_toggle_ms")]
    pub toggle_interval_ms: u64,

    /// Total blink duration in seconds before the alarm is forced off
    #[serde(default = "default_attention_duration")]
    pub duration_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowConfig {
    /// Delay before a terminal state transitions to CoolingDown, in seconds
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,

    /// Maximum accepted upload size in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    /// IP address to bind to
    #[serde(default = "default_api_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl AdrsConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("adrs.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("detection.endpoint", default_detection_endpoint())?
            .set_default(
                "detection.timeout_seconds",
                default_detection_timeout() as i64,
            )?
            .set_default("mailer.endpoint", default_mailer_endpoint())?
            .set_default("mailer.recipient", default_mailer_recipient())?
            .set_default("mailer.timeout_seconds", default_mailer_timeout() as i64)?
            .set_default("hardware.path", default_hardware_path())?
            .set_default("hardware.baud_rate", default_hardware_baud() as i64)?
            .set_default("preview.endpoint", default_preview_endpoint())?
            .set_default("preview.timeout_seconds", default_preview_timeout() as i64)?
            .set_default(
                "progress.tick_interval_ms",
                default_progress_tick_ms() as i64,
            )?
            .set_default(
                "attention.toggle_interval_ms",
                default_attention_toggle_ms() as i64,
            )?
            .set_default(
                "attention.duration_seconds",
                default_attention_duration() as i64,
            )?
            .set_default("workflow.cooldown_seconds", default_cooldown_seconds() as i64)?
            .set_default("workflow.max_upload_mb", default_max_upload_mb() as i64)?
            .set_default("api.ip", default_api_ip())?
            .set_default("api.port", default_api_port() as i64)?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with ADRS_ prefix
            .add_source(Environment::with_prefix("ADRS").separator("_"))
            .build()?;

        let config: AdrsConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detection.endpoint.is_empty() {
            return Err(ConfigError::Message(
                "Detection endpoint must not be empty".to_string(),
            ));
        }

        if self.mailer.endpoint.is_empty() {
            return Err(ConfigError::Message(
                "Mailer endpoint must not be empty".to_string(),
            ));
        }

        if self.mailer.recipient.is_empty() {
            return Err(ConfigError::Message(
                "Mailer recipient must not be empty".to_string(),
            ));
        }

        if self.hardware.baud_rate == 0 {
            return Err(ConfigError::Message(
                "Hardware baud rate must be greater than 0".to_string(),
            ));
        }

        if self.progress.tick_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Progress tick interval must be greater than 0".to_string(),
            ));
        }

        if self.attention.toggle_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Attention toggle interval must be greater than 0".to_string(),
            ));
        }

        if self.attention.duration_seconds * 1000 < self.attention.toggle_interval_ms {
            return Err(ConfigError::Message(
                "Attention duration must cover at least one toggle interval".to_string(),
            ));
        }

        if self.workflow.max_upload_mb == 0 {
            return Err(ConfigError::Message(
                "Maximum upload size must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for AdrsConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig {
                endpoint: default_detection_endpoint(),
                timeout_seconds: default_detection_timeout(),
            },
            mailer: MailerConfig {
                endpoint: default_mailer_endpoint(),
                recipient: default_mailer_recipient(),
                timeout_seconds: default_mailer_timeout(),
            },
            hardware: HardwareConfig {
                path: default_hardware_path(),
                baud_rate: default_hardware_baud(),
            },
            preview: PreviewConfig {
                endpoint: default_preview_endpoint(),
                timeout_seconds: default_preview_timeout(),
            },
            progress: ProgressConfig {
                tick_interval_ms: default_progress_tick_ms(),
            },
            attention: AttentionConfig {
                toggle_interval_ms: default_attention_toggle_ms(),
                duration_seconds: default_attention_duration(),
            },
            workflow: WorkflowConfig {
                cooldown_seconds: default_cooldown_seconds(),
                max_upload_mb: default_max_upload_mb(),
            },
            api: ApiConfig {
                ip: default_api_ip(),
                port: default_api_port(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_detection_endpoint() -> String {
    "http://localhost:8000".to_string()
}
fn default_detection_timeout() -> u64 {
    120
}

fn default_mailer_endpoint() -> String {
    "http://localhost:4000".to_string()
}
fn default_mailer_recipient() -> String {
    "dispatch@emergency.example".to_string()
}
fn default_mailer_timeout() -> u64 {
    10
}

fn default_hardware_path() -> String {
    "/dev/ttyACM0".to_string()
}
fn default_hardware_baud() -> u32 {
    9600
}

fn default_preview_endpoint() -> String {
    "http://localhost:5000".to_string()
}
fn default_preview_timeout() -> u64 {
    30
}

fn default_progress_tick_ms() -> u64 {
    250
}

fn default_attention_toggle_ms() -> u64 {
    500
}
fn default_attention_duration() -> u64 {
    10
}

fn default_cooldown_seconds() -> u64 {
    4
}
fn default_max_upload_mb() -> u64 {
    50
}

fn default_api_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_api_port() -> u16 {
    3000
}

fn default_event_bus_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AdrsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hardware.baud_rate, 9600);
        assert_eq!(config.attention.toggle_interval_ms, 500);
        assert_eq!(config.attention.duration_seconds, 10);
        assert_eq!(config.workflow.max_upload_mb, 50);
    }

    #[test]
    fn test_config_validation() {
        let mut config = AdrsConfig::default();

        config.hardware.baud_rate = 0;
        assert!(config.validate().is_err());

        config.hardware.baud_rate = 9600;
        assert!(config.validate().is_ok());

        // A duration shorter than one toggle interval can never blink
        config.attention.duration_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let config = AdrsConfig::load_from_file("/nonexistent/adrs.toml").unwrap();
        assert_eq!(config.detection.timeout_seconds, 120);
        assert_eq!(config.workflow.cooldown_seconds, 4);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adrs.toml");
        std::fs::write(
            &path,
            "[hardware]\npath = \"/dev/ttyUSB3\"\n\n[api]\nport = 9000\n",
        )
        .unwrap();

        let config = AdrsConfig::load_from_file(&path).unwrap();
        assert_eq!(config.hardware.path, "/dev/ttyUSB3");
        assert_eq!(config.api.port, 9000);
        // Untouched sections keep their defaults
        assert_eq!(config.hardware.baud_rate, 9600);
    }
}
