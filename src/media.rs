use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Default upload size limit, matching the 50 MB accepted by the upload surface.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Content types accepted for analysis
const ACCEPTED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "video/mp4",
    "video/avi",
    "video/mov",
    "video/quicktime",
];

/// Media kind of an uploaded asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Derive the kind from a MIME content type
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        if content_type.starts_with("image/") {
            Some(MediaKind::Image)
        } else if content_type.starts_with("video/") {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// An uploaded media asset owned by the current workflow session.
///
/// The payload is never inspected beyond its size; pixel interpretation
/// belongs entirely to the inference collaborator.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub id: Uuid,
    pub kind: MediaKind,
    pub file_name: String,
    pub content_type: String,
    /// Raw payload (shared ownership, handed to upload tasks without copying)
    pub data: Arc<Vec<u8>>,
}

impl MediaAsset {
    /// Validate and wrap an upload with the default size limit.
    pub fn from_upload(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<Self, ValidationError> {
        Self::from_upload_with_limit(file_name, content_type, data, DEFAULT_MAX_UPLOAD_BYTES)
    }

    /// Validate and wrap an upload, rejecting before any network call.
    pub fn from_upload_with_limit(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
        limit_bytes: u64,
    ) -> Result<Self, ValidationError> {
        let content_type = content_type.into();

        if !ACCEPTED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(ValidationError::UnsupportedMediaType { content_type });
        }

        if data.is_empty() {
            return Err(ValidationError::EmptyPayload);
        }

        if data.len() as u64 > limit_bytes {
            return Err(ValidationError::FileTooLarge {
                size_bytes: data.len() as u64,
                limit_bytes,
            });
        }

        let kind = MediaKind::from_content_type(&content_type)
            .ok_or(ValidationError::UnsupportedMediaType {
                content_type: content_type.clone(),
            })?;

        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            file_name: file_name.into(),
            content_type,
            data: Arc::new(data),
        })
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn size_mb(&self) -> f64 {
        self.data.len() as f64 / (1024.0 * 1024.0)
    }

    /// Estimated frame count for the cosmetic progress sequence.
    ///
    /// Purely presentational; the real frame count only arrives with the
    /// detection verdict.
    pub fn estimated_frames(&self) -> u64 {
        (self.size_mb() * 30.0).floor() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(n: usize) -> Vec<u8> {
        vec![0u8; n]
    }

    #[test]
    fn test_accepts_supported_types() {
        let image = MediaAsset::from_upload("crash.jpg", "image/jpeg", bytes(1024)).unwrap();
        assert_eq!(image.kind, MediaKind::Image);

        let video = MediaAsset::from_upload("crash.mp4", "video/mp4", bytes(1024)).unwrap();
        assert_eq!(video.kind, MediaKind::Video);
    }

    #[test]
    fn test_rejects_unsupported_type() {
        let err = MediaAsset::from_upload("notes.pdf", "application/pdf", bytes(16)).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedMediaType { .. }));
    }

    #[test]
    fn test_rejects_empty_payload() {
        let err = MediaAsset::from_upload("crash.png", "image/png", Vec::new()).unwrap_err();
        assert_eq!(err, ValidationError::EmptyPayload);
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let err =
            MediaAsset::from_upload_with_limit("big.mp4", "video/mp4", bytes(2048), 1024)
                .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::FileTooLarge {
                size_bytes: 2048,
                limit_bytes: 1024
            }
        ));
    }

    #[test]
    fn test_estimated_frames_scales_with_size() {
        // 10 MB of video estimates to 300 frames
        let video =
            MediaAsset::from_upload("dashcam.mp4", "video/mp4", bytes(10 * 1024 * 1024)).unwrap();
        assert_eq!(video.estimated_frames(), 300);

        // Half a megabyte floors to 15
        let small = MediaAsset::from_upload("clip.mp4", "video/mp4", bytes(512 * 1024)).unwrap();
        assert_eq!(small.estimated_frames(), 15);
    }
}
