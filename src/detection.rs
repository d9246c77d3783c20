use crate::config::DetectionConfig;
use crate::error::DetectionError;
use crate::media::{MediaAsset, MediaKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Wire shape returned by the inference collaborator
#[derive(Debug, Deserialize)]
struct VerdictPayload {
    accident_detected: bool,
    confidence: Option<f32>,
    total_frames: Option<u64>,
}

/// Detection outcome for one media unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionVerdict {
    pub accident_detected: bool,
    /// Model confidence in [0, 1] when reported
    pub confidence: Option<f32>,
    /// Frames the model actually processed (videos only)
    pub total_frames: Option<u64>,
    pub kind: MediaKind,
}

/// Error shape the inference collaborator uses for rejections
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    detail: String,
}

/// Client for the opaque computer-vision inference collaborator.
///
/// Uploads media and returns a verdict; it never interprets pixel data
/// itself. Detection failures drive the workflow to Failed; there are no
/// automatic retries.
pub struct DetectionClient {
    endpoint: String,
    http_client: reqwest::Client,
}

impl DetectionClient {
    pub fn new(config: &DetectionConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            http_client,
        }
    }

    /// Upload an asset for analysis and wait for the verdict.
    pub async fn detect(&self, asset: &MediaAsset) -> Result<DetectionVerdict, DetectionError> {
        // Videos and still frames go to different routes with different
        // multipart field names on the collaborator side.
        let (path, field) = match asset.kind {
            MediaKind::Video => ("/detect-video", "video"),
            MediaKind::Image => ("/detect", "frame"),
        };
        let url = format!("{}{}", self.endpoint, path);

        let part = reqwest::multipart::Part::bytes(asset.data.as_ref().clone())
            .file_name(asset.file_name.clone())
            .mime_str(&asset.content_type)
            .map_err(|e| DetectionError::Request {
                details: e.to_string(),
            })?;
        let form = reqwest::multipart::Form::new().part(field, part);

        info!(
            "Uploading {} ({:.2} MB) for detection",
            asset.file_name,
            asset.size_mb()
        );

        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| DetectionError::Request {
                details: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| DetectionError::Request {
            details: e.to_string(),
        })?;

        if !status.is_success() {
            warn!("Detection service returned {}: {}", status, body);
            return Err(rejection_from_body(status.as_u16(), &body));
        }

        let verdict = parse_verdict(asset.kind, &body)?;
        debug!(
            "Verdict for {}: accident={} confidence={:?} frames={:?}",
            asset.file_name, verdict.accident_detected, verdict.confidence, verdict.total_frames
        );
        Ok(verdict)
    }
}

/// Parse and validate a verdict body. An out-of-range confidence is treated
/// as a malformed response, not clamped.
fn parse_verdict(kind: MediaKind, body: &str) -> Result<DetectionVerdict, DetectionError> {
    let payload: VerdictPayload =
        serde_json::from_str(body).map_err(|e| DetectionError::MalformedResponse {
            details: e.to_string(),
        })?;

    if let Some(confidence) = payload.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DetectionError::MalformedResponse {
                details: format!("confidence {} outside [0, 1]", confidence),
            });
        }
    }

    Ok(DetectionVerdict {
        accident_detected: payload.accident_detected,
        confidence: payload.confidence,
        total_frames: payload.total_frames,
        kind,
    })
}

/// Build a rejection error, preferring the collaborator's own `detail` field
/// over the raw status when the body parses.
fn rejection_from_body(status: u16, body: &str) -> DetectionError {
    let detail = serde_json::from_str::<ErrorPayload>(body)
        .map(|p| p.detail)
        .unwrap_or_else(|_| format!("HTTP {}", status));

    DetectionError::Rejected { status, detail }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_verdict() {
        let body = r#"{"accident_detected": true, "confidence": 0.87, "total_frames": 152}"#;
        let verdict = parse_verdict(MediaKind::Video, body).unwrap();
        assert!(verdict.accident_detected);
        assert_eq!(verdict.confidence, Some(0.87));
        assert_eq!(verdict.total_frames, Some(152));
        assert_eq!(verdict.kind, MediaKind::Video);
    }

    #[test]
    fn test_parse_minimal_verdict() {
        let body = r#"{"accident_detected": false}"#;
        let verdict = parse_verdict(MediaKind::Image, body).unwrap();
        assert!(!verdict.accident_detected);
        assert_eq!(verdict.confidence, None);
        assert_eq!(verdict.total_frames, None);
    }

    #[test]
    fn test_out_of_range_confidence_is_malformed() {
        let body = r#"{"accident_detected": true, "confidence": 1.3}"#;
        let err = parse_verdict(MediaKind::Video, body).unwrap_err();
        assert!(matches!(err, DetectionError::MalformedResponse { .. }));

        let body = r#"{"accident_detected": true, "confidence": -0.1}"#;
        let err = parse_verdict(MediaKind::Video, body).unwrap_err();
        assert!(matches!(err, DetectionError::MalformedResponse { .. }));
    }

    #[test]
    fn test_malformed_body_is_rejected() {
        let err = parse_verdict(MediaKind::Video, "not json").unwrap_err();
        assert!(matches!(err, DetectionError::MalformedResponse { .. }));

        // A valid JSON object missing the verdict flag is still malformed
        let err = parse_verdict(MediaKind::Video, r#"{"confidence": 0.5}"#).unwrap_err();
        assert!(matches!(err, DetectionError::MalformedResponse { .. }));
    }

    #[test]
    fn test_rejection_prefers_parsed_detail() {
        let err = rejection_from_body(500, r#"{"detail": "inference crashed"}"#);
        match err {
            DetectionError::Rejected { status, detail } => {
                assert_eq!(status, 500);
                assert_eq!(detail, "inference crashed");
            }
            other => panic!("Unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_rejection_falls_back_to_status() {
        let err = rejection_from_body(502, "<html>bad gateway</html>");
        match err {
            DetectionError::Rejected { status, detail } => {
                assert_eq!(status, 502);
                assert_eq!(detail, "HTTP 502");
            }
            other => panic!("Unexpected error: {:?}", other),
        }
    }
}
