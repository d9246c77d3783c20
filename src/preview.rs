use crate::config::PreviewConfig;
use crate::error::PreviewError;
use crate::events::{AdrsEvent, EventBus};
use crate::media::MediaAsset;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The current live preview session, when one is active.
///
/// There is one live asset globally; starting a new session replaces the
/// previous one on the streaming collaborator's side.
#[derive(Debug, Clone, Serialize)]
pub struct LiveSession {
    pub asset_id: Uuid,
    pub file_name: String,
    /// Generation current when this session was started
    pub generation: u64,
}

/// Snapshot answer for session queries
#[derive(Debug, Clone, Serialize)]
pub struct SessionQuery {
    pub active: bool,
    pub session: Option<LiveSession>,
}

/// Owns the live preview session and its generation counter.
///
/// The generation is strictly increasing for the lifetime of the process and
/// tags every outstanding call so a late-arriving response for a superseded
/// session can be recognized and discarded.
pub struct LivePreviewManager {
    endpoint: String,
    http_client: reqwest::Client,
    generation: AtomicU64,
    session: RwLock<Option<LiveSession>>,
    event_bus: Arc<EventBus>,
}

impl LivePreviewManager {
    pub fn new(config: &PreviewConfig, event_bus: Arc<EventBus>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            http_client,
            generation: AtomicU64::new(0),
            session: RwLock::new(None),
            event_bus,
        }
    }

    /// Upload the asset to the streaming collaborator's live slot and record
    /// the new session locally. Returns the generation id tagging it.
    pub async fn start_session(&self, asset: &MediaAsset) -> Result<u64, PreviewError> {
        let generation = self.next_generation();

        let part = reqwest::multipart::Part::bytes(asset.data.as_ref().clone())
            .file_name(asset.file_name.clone())
            .mime_str(&asset.content_type)
            .map_err(|e| PreviewError::Request {
                details: e.to_string(),
            })?;
        let form = reqwest::multipart::Form::new().part("video", part);

        let url = format!("{}/live/start?generation={}", self.endpoint, generation);

        debug!(
            "Uploading {} to live preview slot (generation {})",
            asset.file_name, generation
        );

        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PreviewError::Request {
                details: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(PreviewError::Rejected {
                status: response.status().as_u16(),
            });
        }

        let session = LiveSession {
            asset_id: asset.id,
            file_name: asset.file_name.clone(),
            generation,
        };
        *self.session.write() = Some(session);

        info!("Live preview session started (generation {})", generation);

        let _ = self
            .event_bus
            .publish(AdrsEvent::PreviewStarted {
                generation,
                timestamp: SystemTime::now(),
            })
            .await;

        Ok(generation)
    }

    /// Snapshot of the current session state
    pub fn query_session(&self) -> SessionQuery {
        let session = self.session.read().clone();
        SessionQuery {
            active: session.is_some(),
            session,
        }
    }

    /// Release the live slot.
    ///
    /// The remote release is best-effort: a failure is logged and the local
    /// state is cleared regardless. The generation is always incremented so
    /// that any response still in flight for the old session is stale.
    pub async fn clear_session(&self) {
        let generation = self.next_generation();

        let url = format!("{}/live/current", self.endpoint);
        match self.http_client.delete(&url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Streaming collaborator released live slot");
            }
            Ok(response) => {
                warn!(
                    "Streaming collaborator refused live slot release: {}",
                    response.status()
                );
            }
            Err(e) => {
                warn!("Failed to reach streaming collaborator for release: {}", e);
            }
        }

        let cleared = self.session.write().take();
        if let Some(session) = cleared {
            info!(
                "Live preview session cleared (was generation {}, now {})",
                session.generation, generation
            );

            let _ = self
                .event_bus
                .publish(AdrsEvent::PreviewCleared {
                    generation: session.generation,
                    timestamp: SystemTime::now(),
                })
                .await;
        }
    }

    /// Current value of the generation counter
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> LivePreviewManager {
        let config = PreviewConfig {
            // TEST-NET address: unreachable, requests fail fast or time out
            endpoint: "http://192.0.2.1:9".to_string(),
            timeout_seconds: 1,
        };
        LivePreviewManager::new(&config, Arc::new(EventBus::new(16)))
    }

    #[test]
    fn test_initial_state_is_inactive() {
        let manager = manager();
        let query = manager.query_session();
        assert!(!query.active);
        assert!(query.session.is_none());
        assert_eq!(manager.current_generation(), 0);
    }

    #[tokio::test]
    async fn test_failed_start_leaves_no_session_but_advances_generation() {
        let manager = manager();

        let asset =
            MediaAsset::from_upload("clip.mp4", "video/mp4", vec![0u8; 64]).unwrap();
        let result = manager.start_session(&asset).await;

        assert!(result.is_err());
        assert!(!manager.query_session().active);
        // The attempt consumed a generation even though it failed
        assert_eq!(manager.current_generation(), 1);
    }

    #[tokio::test]
    async fn test_clear_always_clears_local_state_and_increments() {
        let manager = manager();

        // Seed a session directly to exercise the local-clear path
        *manager.session.write() = Some(LiveSession {
            asset_id: Uuid::new_v4(),
            file_name: "clip.mp4".to_string(),
            generation: 1,
        });
        manager.generation.store(1, Ordering::SeqCst);

        // Remote release fails (unreachable endpoint) but local state clears
        manager.clear_session().await;

        assert!(!manager.query_session().active);
        assert_eq!(manager.current_generation(), 2);
    }

    #[tokio::test]
    async fn test_generation_strictly_increases() {
        let manager = manager();

        let first = manager.next_generation();
        let second = manager.next_generation();
        manager.clear_session().await;

        assert!(second > first);
        assert!(manager.current_generation() > second);
    }
}
