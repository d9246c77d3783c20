use crate::alert::{AlertDispatcher, AlertEvent, EmailChannel, HardwareChannel};
use crate::attention::{AttentionController, AttentionState};
use crate::config::AdrsConfig;
use crate::detection::{DetectionClient, DetectionVerdict};
use crate::error::{AdrsError, Result, WorkflowError};
use crate::events::{AdrsEvent, EventBus};
use crate::hardware::SignalClient;
use crate::mailer::EmailNotifier;
use crate::media::{MediaAsset, MediaKind};
use crate::preview::{LivePreviewManager, SessionQuery};
use crate::progress::{FrameProgressEstimator, ProgressHandle};

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::signal;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
}

/// State of the single active workflow session
#[derive(Debug, Clone)]
pub enum SessionState {
    Idle,
    AssetSelected,
    UploadingPreview,
    Detecting,
    Completed(DetectionVerdict),
    Failed(String),
    CoolingDown,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AssetSelected => "asset_selected",
            SessionState::UploadingPreview => "uploading_preview",
            SessionState::Detecting => "detecting",
            SessionState::Completed(_) => "completed",
            SessionState::Failed(_) => "failed",
            SessionState::CoolingDown => "cooling_down",
        }
    }

    /// Busy states reject a new `start` outright; there is no queueing
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionState::UploadingPreview | SessionState::Detecting
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed(_) | SessionState::Failed(_))
    }
}

/// Point-in-time view of the session for the status surface
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSnapshot {
    pub state: String,
    pub epoch: u64,
    pub asset: Option<AssetSummary>,
    pub verdict: Option<DetectionVerdict>,
    pub failure: Option<String>,
    pub progress: Option<ProgressSnapshot>,
    pub attention: AttentionState,
    pub attention_visible: bool,
    pub preview: SessionQuery,
    pub last_alert: Option<AlertEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetSummary {
    pub kind: MediaKind,
    pub file_name: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub frames: u64,
    pub total: u64,
}

/// Top-level coordinator for the accident-response workflow.
///
/// One analysis session at a time: `start` is rejected while a session is
/// busy. Every outstanding call is tagged with the epoch current at dispatch
/// time; `reset` bumps the epoch so late responses for a superseded session
/// are discarded instead of applied.
pub struct AdrsOrchestrator {
    config: AdrsConfig,
    event_bus: Arc<EventBus>,
    detection: Arc<DetectionClient>,
    dispatcher: Arc<AlertDispatcher>,
    attention: Arc<AttentionController>,
    preview: Arc<LivePreviewManager>,
    estimator: Arc<FrameProgressEstimator>,
    hardware: Arc<SignalClient>,

    state: Arc<parking_lot::RwLock<SessionState>>,
    current_asset: Arc<parking_lot::RwLock<Option<MediaAsset>>>,
    last_alert: Arc<parking_lot::RwLock<Option<AlertEvent>>>,
    epoch: Arc<AtomicU64>,

    detection_task: Arc<RwLock<Option<JoinHandle<()>>>>,
    preview_task: Arc<RwLock<Option<JoinHandle<()>>>>,
    cooldown_task: Arc<RwLock<Option<JoinHandle<()>>>>,
    progress_handle: Arc<RwLock<Option<ProgressHandle>>>,

    // Lifecycle management
    component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    cancellation_token: CancellationToken,
}

impl AdrsOrchestrator {
    /// Create a new orchestrator with the given configuration
    pub fn new(config: AdrsConfig) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));

        let hardware = Arc::new(SignalClient::new(config.hardware.clone()));
        let notifier = Arc::new(EmailNotifier::new(&config.mailer));

        let dispatcher = Arc::new(AlertDispatcher::new(
            Arc::new(EmailChannel::new(notifier)),
            Arc::new(HardwareChannel::new(Arc::clone(&hardware))),
            Arc::clone(&event_bus),
        ));

        let detection = Arc::new(DetectionClient::new(&config.detection));
        let preview = Arc::new(LivePreviewManager::new(
            &config.preview,
            Arc::clone(&event_bus),
        ));
        let attention = Arc::new(AttentionController::new(
            &config.attention,
            Arc::clone(&event_bus),
        ));
        let estimator = Arc::new(FrameProgressEstimator::new(
            Duration::from_millis(config.progress.tick_interval_ms),
            Arc::clone(&event_bus),
        ));

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            config,
            event_bus,
            detection,
            dispatcher,
            attention,
            preview,
            estimator,
            hardware,
            state: Arc::new(parking_lot::RwLock::new(SessionState::Idle)),
            current_asset: Arc::new(parking_lot::RwLock::new(None)),
            last_alert: Arc::new(parking_lot::RwLock::new(None)),
            epoch: Arc::new(AtomicU64::new(0)),
            detection_task: Arc::new(RwLock::new(None)),
            preview_task: Arc::new(RwLock::new(None)),
            cooldown_task: Arc::new(RwLock::new(None)),
            progress_handle: Arc::new(RwLock::new(None)),
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Begin an analysis session for a validated asset.
    ///
    /// Rejected with `WorkflowError::Busy` while a session is in flight;
    /// callers must wait for a terminal state or call `reset`. Image assets
    /// skip the preview step and go straight to detection.
    pub async fn start(&self, asset: MediaAsset) -> Result<u64> {
        {
            let state = self.state.read();
            if state.is_busy() {
                return Err(WorkflowError::Busy {
                    state: state.name().to_string(),
                }
                .into());
            }
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        // A new run supersedes whatever the previous terminal state left behind
        self.cancel_cooldown().await;
        self.cancel_progress().await;

        *self.current_asset.write() = Some(asset.clone());
        *self.last_alert.write() = None;
        *self.state.write() = SessionState::AssetSelected;

        let _ = self
            .event_bus
            .publish(AdrsEvent::AssetAccepted {
                kind: asset.kind,
                size_bytes: asset.size_bytes(),
                timestamp: SystemTime::now(),
            })
            .await;

        if asset.kind == MediaKind::Video {
            *self.state.write() = SessionState::UploadingPreview;

            // Cosmetic frame counter, seeded by the epoch
            let handle = self.estimator.start(asset.estimated_frames(), epoch);
            {
                let mut progress = self.progress_handle.write().await;
                *progress = Some(handle);
            }

            // Preview upload runs independently of detection; its failure
            // never aborts the analysis
            let this = self.clone_for_task();
            let preview_asset = asset.clone();
            let preview_handle = tokio::spawn(async move {
                this.run_preview_upload(epoch, preview_asset).await;
            });
            {
                let mut task = self.preview_task.write().await;
                if let Some(old) = task.take() {
                    old.abort();
                }
                *task = Some(preview_handle);
            }
        } else {
            *self.state.write() = SessionState::Detecting;
        }

        let _ = self
            .event_bus
            .publish(AdrsEvent::DetectionStarted {
                epoch,
                timestamp: SystemTime::now(),
            })
            .await;

        let this = self.clone_for_task();
        let detection_handle = tokio::spawn(async move {
            let result = this.detection.detect(&asset).await;
            this.complete_detection(epoch, result.map_err(AdrsError::from))
                .await;
        });
        {
            let mut task = self.detection_task.write().await;
            if let Some(old) = task.take() {
                old.abort();
            }
            *task = Some(detection_handle);
        }

        Ok(epoch)
    }

    /// Force the session back to Idle from any state.
    pub async fn reset(&self) {
        // Invalidate in-flight responses before touching any state
        self.epoch.fetch_add(1, Ordering::SeqCst);

        self.cancel_detection().await;
        self.cancel_preview_upload().await;
        self.cancel_progress().await;
        self.cancel_cooldown().await;

        self.attention.reset().await;
        self.preview.clear_session().await;

        *self.current_asset.write() = None;
        *self.last_alert.write() = None;
        *self.state.write() = SessionState::Idle;

        let _ = self
            .event_bus
            .publish(AdrsEvent::SessionReset {
                timestamp: SystemTime::now(),
            })
            .await;

        info!("Session reset to idle");
    }

    /// Preview upload leg of a video session.
    async fn run_preview_upload(&self, epoch: u64, asset: MediaAsset) {
        let result = self.preview.start_session(&asset).await;

        if epoch != self.epoch.load(Ordering::SeqCst) {
            debug!("Discarding stale preview result (epoch {})", epoch);
            return;
        }

        match result {
            Ok(generation) => {
                debug!("Preview session active (generation {})", generation);
            }
            Err(e) => {
                warn!("Live preview upload failed: {}", e);
                let _ = self
                    .event_bus
                    .publish(AdrsEvent::SystemError {
                        component: "preview".to_string(),
                        error: e.to_string(),
                    })
                    .await;
            }
        }

        // Either way detection is the only thing still outstanding
        let mut state = self.state.write();
        if matches!(*state, SessionState::UploadingPreview) {
            *state = SessionState::Detecting;
        }
    }

    /// Apply a detection result to the session.
    ///
    /// A response tagged with a superseded epoch is discarded without
    /// touching the current session.
    pub(crate) async fn complete_detection(&self, epoch: u64, result: Result<DetectionVerdict>) {
        if epoch != self.epoch.load(Ordering::SeqCst) {
            debug!("Discarding stale detection response (epoch {})", epoch);
            return;
        }

        // Actual completion supersedes the cosmetic counter
        self.cancel_progress().await;

        match result {
            Ok(verdict) => {
                *self.state.write() = SessionState::Completed(verdict.clone());

                let _ = self
                    .event_bus
                    .publish(AdrsEvent::VerdictReady {
                        accident_detected: verdict.accident_detected,
                        confidence: verdict.confidence,
                        timestamp: SystemTime::now(),
                    })
                    .await;

                self.attention.observe_verdict(verdict.accident_detected).await;

                if verdict.accident_detected {
                    let alert = self.dispatcher.dispatch(&verdict).await;
                    *self.last_alert.write() = Some(alert);
                }
            }
            Err(e) => {
                let reason = e.to_string();
                *self.state.write() = SessionState::Failed(reason.clone());

                let _ = self
                    .event_bus
                    .publish(AdrsEvent::DetectionFailed {
                        reason,
                        timestamp: SystemTime::now(),
                    })
                    .await;
            }
        }

        self.schedule_cooldown(epoch).await;
    }

    /// Move the terminal state to CoolingDown after the configured delay,
    /// release session resources, then auto-clear to Idle.
    async fn schedule_cooldown(&self, epoch: u64) {
        let this = self.clone_for_task();
        let delay = Duration::from_secs(self.config.workflow.cooldown_seconds);

        let handle = tokio::spawn(async move {
            sleep(delay).await;

            if epoch != this.epoch.load(Ordering::SeqCst) {
                return;
            }

            *this.state.write() = SessionState::CoolingDown;
            debug!("Cooling down, releasing session resources");

            this.preview.clear_session().await;

            if epoch != this.epoch.load(Ordering::SeqCst) {
                // A reset raced the cleanup and owns the session now
                return;
            }

            *this.current_asset.write() = None;
            *this.state.write() = SessionState::Idle;
            info!("Session returned to idle");
        });

        let mut task = self.cooldown_task.write().await;
        if let Some(old) = task.take() {
            old.abort();
        }
        *task = Some(handle);
    }

    async fn cancel_detection(&self) {
        let mut task = self.detection_task.write().await;
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }

    async fn cancel_preview_upload(&self) {
        let mut task = self.preview_task.write().await;
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }

    async fn cancel_cooldown(&self) {
        let mut task = self.cooldown_task.write().await;
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }

    async fn cancel_progress(&self) {
        let mut progress = self.progress_handle.write().await;
        if let Some(handle) = progress.take() {
            handle.cancel();
        }
    }

    /// Point-in-time session snapshot for the status surface
    pub async fn snapshot(&self) -> WorkflowSnapshot {
        let state = self.state.read().clone();
        let (verdict, failure) = match &state {
            SessionState::Completed(verdict) => (Some(verdict.clone()), None),
            SessionState::Failed(reason) => (None, Some(reason.clone())),
            _ => (None, None),
        };

        let asset = self.current_asset.read().as_ref().map(|a| AssetSummary {
            kind: a.kind,
            file_name: a.file_name.clone(),
            size_bytes: a.size_bytes(),
        });

        let progress = {
            let handle = self.progress_handle.read().await;
            handle.as_ref().map(|h| ProgressSnapshot {
                frames: h.current(),
                total: h.total(),
            })
        };

        WorkflowSnapshot {
            state: state.name().to_string(),
            epoch: self.epoch.load(Ordering::SeqCst),
            asset,
            verdict,
            failure,
            progress,
            attention: self.attention.state(),
            attention_visible: self.attention.is_visible(),
            preview: self.preview.query_session(),
            last_alert: self.last_alert.read().clone(),
        }
    }

    pub fn current_state(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn last_alert(&self) -> Option<AlertEvent> {
        self.last_alert.read().clone()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn preview_manager(&self) -> Arc<LivePreviewManager> {
        Arc::clone(&self.preview)
    }

    pub fn attention(&self) -> Arc<AttentionController> {
        Arc::clone(&self.attention)
    }

    pub fn config(&self) -> &AdrsConfig {
        &self.config
    }

    /// Initialize component state tracking
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing ADRS system components");

        let mut states = self.component_states.lock().await;
        states.insert("hardware".to_string(), ComponentState::Stopped);
        states.insert("workflow".to_string(), ComponentState::Stopped);

        #[cfg(feature = "api")]
        states.insert("api".to_string(), ComponentState::Stopped);

        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start system components: open the serial device and bring up the API
    /// surface.
    pub async fn start_components(&mut self) -> Result<()> {
        info!("Starting ADRS system");

        self.set_component_state("hardware", ComponentState::Starting)
            .await;
        self.hardware.connect().await;
        if self.hardware.is_open() {
            self.set_component_state("hardware", ComponentState::Running)
                .await;
        } else {
            // Degraded mode: every write fails fast, no reconnect attempts
            self.set_component_state("hardware", ComponentState::Failed)
                .await;
        }

        #[cfg(feature = "api")]
        {
            self.set_component_state("api", ComponentState::Starting).await;

            let server = crate::api::ApiServer::new(
                self.config.api.clone(),
                Arc::new(self.clone_for_task()),
                self.config.workflow.max_upload_mb * 1024 * 1024,
            );

            tokio::spawn(async move {
                if let Err(e) = server.start().await {
                    error!("API server error: {}", e);
                }
            });

            self.set_component_state("api", ComponentState::Running).await;
            info!(
                "API server started on {}:{}",
                self.config.api.ip, self.config.api.port
            );
        }

        self.set_component_state("workflow", ComponentState::Running)
            .await;

        info!("ADRS system started successfully");
        Ok(())
    }

    /// Run the main application loop with signal handling
    pub async fn run(&mut self) -> Result<i32> {
        info!("ADRS system is running");

        let shutdown_sender = self.shutdown_sender.take().ok_or_else(|| {
            AdrsError::system("Shutdown sender already taken")
        })?;

        let shutdown_receiver = self.shutdown_receiver.take().ok_or_else(|| {
            AdrsError::system("Shutdown receiver already taken")
        })?;

        self.setup_signal_handlers(shutdown_sender).await;

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| AdrsError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("ADRS system shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    async fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                if let Some(()) = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler")
                    .recv()
                    .await
                {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }

    /// Perform graceful shutdown: stop the workflow, then release the serial
    /// device. The device is closed on every shutdown path.
    async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();

        self.set_component_state("workflow", ComponentState::Stopping)
            .await;
        self.reset().await;
        self.set_component_state("workflow", ComponentState::Stopped)
            .await;

        self.set_component_state("hardware", ComponentState::Stopping)
            .await;
        self.hardware.close().await;
        self.set_component_state("hardware", ComponentState::Stopped)
            .await;

        #[cfg(feature = "api")]
        self.set_component_state("api", ComponentState::Stopped).await;

        info!("Graceful shutdown completed");
        Ok(0)
    }

    /// Update component state
    async fn set_component_state(&self, component: &str, state: ComponentState) {
        let mut states = self.component_states.lock().await;
        states.insert(component.to_string(), state.clone());
        debug!("Component '{}' state changed to: {:?}", component, state);
    }

    /// Get component state
    pub async fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        let states = self.component_states.lock().await;
        states.get(component).cloned()
    }

    /// Get all component states
    pub async fn get_all_component_states(&self) -> HashMap<String, ComponentState> {
        let states = self.component_states.lock().await;
        states.clone()
    }

    /// Clone for use in spawned tasks. The shutdown channel stays with the
    /// original instance.
    fn clone_for_task(&self) -> Self {
        Self {
            config: self.config.clone(),
            event_bus: Arc::clone(&self.event_bus),
            detection: Arc::clone(&self.detection),
            dispatcher: Arc::clone(&self.dispatcher),
            attention: Arc::clone(&self.attention),
            preview: Arc::clone(&self.preview),
            estimator: Arc::clone(&self.estimator),
            hardware: Arc::clone(&self.hardware),
            state: Arc::clone(&self.state),
            current_asset: Arc::clone(&self.current_asset),
            last_alert: Arc::clone(&self.last_alert),
            epoch: Arc::clone(&self.epoch),
            detection_task: Arc::clone(&self.detection_task),
            preview_task: Arc::clone(&self.preview_task),
            cooldown_task: Arc::clone(&self.cooldown_task),
            progress_handle: Arc::clone(&self.progress_handle),
            component_states: Arc::clone(&self.component_states),
            shutdown_sender: None,
            shutdown_receiver: None,
            cancellation_token: self.cancellation_token.clone(),
        }
    }
}
