use crate::config::HardwareConfig;
use crate::error::HardwareError;
use crate::media::MediaKind;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_serial::{DataBits, FlowControl, Parity, SerialStream, StopBits};
use tracing::{debug, info, warn};

/// Single-byte command accepted by the alert hardware.
///
/// The wire alphabet is exactly ASCII `'0'` and `'1'`; anything else is
/// rejected before it reaches the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalCode {
    /// `'0'`, the image-class alert
    Off,
    /// `'1'`, the video-class alert
    On,
}

impl SignalCode {
    pub fn as_byte(&self) -> u8 {
        match self {
            SignalCode::Off => b'0',
            SignalCode::On => b'1',
        }
    }

    pub fn as_char(&self) -> char {
        self.as_byte() as char
    }

    /// Hardware code for an asset kind. The two kinds map to distinct codes.
    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Image => SignalCode::Off,
            MediaKind::Video => SignalCode::On,
        }
    }
}

impl TryFrom<char> for SignalCode {
    type Error = HardwareError;

    fn try_from(code: char) -> Result<Self, Self::Error> {
        match code {
            '0' => Ok(SignalCode::Off),
            '1' => Ok(SignalCode::On),
            other => Err(HardwareError::InvalidCode { code: other }),
        }
    }
}

/// Client owning the serial connection to the alert hardware.
///
/// The port is opened once at startup. If the open fails the client stays in
/// degraded mode: every write fails fast with `DeviceUnavailable` and no
/// reconnect is attempted. Writes are serialized under a single lock so two
/// alerts firing close together cannot interleave bytes.
pub struct SignalClient {
    config: HardwareConfig,
    port: Arc<Mutex<Option<SerialStream>>>,
    open: Arc<AtomicBool>,
}

impl SignalClient {
    /// Create a client without opening the device; `connect` does that.
    pub fn new(config: HardwareConfig) -> Self {
        Self {
            config,
            port: Arc::new(Mutex::new(None)),
            open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the serial device with the fixed line parameters (8N1, no flow
    /// control). An open failure leaves the client in degraded mode; the
    /// process keeps running and later writes fail fast.
    pub async fn connect(&self) {
        let builder = tokio_serial::new(&self.config.path, self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None);

        match SerialStream::open(&builder) {
            Ok(stream) => {
                let mut port = self.port.lock().await;
                *port = Some(stream);
                self.open.store(true, Ordering::Relaxed);
                info!(
                    "Serial device {} opened at {} baud",
                    self.config.path, self.config.baud_rate
                );
            }
            Err(e) => {
                warn!(
                    "Failed to open serial device {}: {} - hardware alerts degraded",
                    self.config.path, e
                );
            }
        }
    }

    /// Whether the device was opened successfully at startup
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Write one command byte to the device.
    ///
    /// "Accepted by transport" only: nothing is read back, so a successful
    /// return does not confirm actuation. Writing while closed returns
    /// `DeviceUnavailable` without touching the lock state.
    pub async fn signal(&self, code: SignalCode) -> Result<(), HardwareError> {
        let mut port = self.port.lock().await;

        let stream = port.as_mut().ok_or(HardwareError::DeviceUnavailable)?;

        stream
            .write_all(&[code.as_byte()])
            .await
            .map_err(|e| HardwareError::WriteFailed {
                details: e.to_string(),
            })?;

        stream
            .flush()
            .await
            .map_err(|e| HardwareError::WriteFailed {
                details: e.to_string(),
            })?;

        debug!("Serial command {:?} accepted by transport", code.as_char());
        Ok(())
    }

    /// Validate a raw character against the wire alphabet, then write it.
    /// Invalid codes are rejected before any transmission is attempted.
    pub async fn signal_char(&self, raw: char) -> Result<(), HardwareError> {
        let code = SignalCode::try_from(raw)?;
        self.signal(code).await
    }

    /// Release the serial device. Called on every shutdown path; closing an
    /// already-degraded client is a no-op.
    pub async fn close(&self) {
        let mut port = self.port.lock().await;
        if port.take().is_some() {
            self.open.store(false, Ordering::Relaxed);
            info!("Serial device {} closed", self.config.path);
        }
    }

    pub fn config(&self) -> &HardwareConfig {
        &self.config
    }
}
