use crate::alert::AlertContext;
use crate::config::MailerConfig;
use crate::error::NotifyError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct SendEmailRequest {
    to: String,
    subject: String,
    text: String,
    html: String,
}

/// Wire shape returned by the mail-sending collaborator
#[derive(Debug, Clone, Deserialize)]
pub struct SendEmailResponse {
    pub success: bool,
    pub message: Option<String>,
    #[serde(rename = "messageId")]
    pub message_id: Option<String>,
}

/// Client for the mail-sending collaborator.
///
/// One notification request per accident verdict; a declined or failed send
/// is reported back to the dispatcher, never retried here.
pub struct EmailNotifier {
    endpoint: String,
    recipient: String,
    http_client: reqwest::Client,
}

impl EmailNotifier {
    pub fn new(config: &MailerConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            recipient: config.recipient.clone(),
            http_client,
        }
    }

    /// Send an accident alert notification.
    pub async fn send_alert(&self, alert: &AlertContext) -> Result<SendEmailResponse, NotifyError> {
        let request = SendEmailRequest {
            to: self.recipient.clone(),
            subject: "Accident Detection Alert".to_string(),
            text: alert_text(alert),
            html: alert_html(alert),
        };

        let url = format!("{}/send-email", self.endpoint);

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| NotifyError::Request {
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }

        let body: SendEmailResponse =
            response.json().await.map_err(|e| NotifyError::Request {
                details: e.to_string(),
            })?;

        if !body.success {
            return Err(NotifyError::Declined {
                message: body
                    .message
                    .clone()
                    .unwrap_or_else(|| "no reason given".to_string()),
            });
        }

        info!(
            "Alert email accepted by mailer (message id: {})",
            body.message_id.as_deref().unwrap_or("unknown")
        );
        debug!("Mailer response: {:?}", body);
        Ok(body)
    }
}

fn alert_text(alert: &AlertContext) -> String {
    let confidence = match alert.confidence {
        Some(c) => format!("{:.1}%", c * 100.0),
        None => "not reported".to_string(),
    };

    format!(
        "An accident was detected in an uploaded {} at {}.\n\
         Detection confidence: {}.\n\n\
         This alert was generated automatically by the Accident Detection \
         and Response System.",
        alert.kind.as_str(),
        alert.detected_at.format("%Y-%m-%d %H:%M:%S UTC"),
        confidence,
    )
}

fn alert_html(alert: &AlertContext) -> String {
    let confidence = match alert.confidence {
        Some(c) => format!("{:.1}%", c * 100.0),
        None => "not reported".to_string(),
    };

    format!(
        "<h1>Accident Detection Alert</h1>\
         <p>An accident was detected in an uploaded <b>{}</b> at {}.</p>\
         <p>Detection confidence: <b>{}</b>.</p>\
         <p>This alert was generated automatically by the Accident Detection \
         and Response System.</p>",
        alert.kind.as_str(),
        alert.detected_at.format("%Y-%m-%d %H:%M:%S UTC"),
        confidence,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SignalCode;
    use crate::media::MediaKind;
    use chrono::TimeZone;

    fn test_context() -> AlertContext {
        AlertContext {
            kind: MediaKind::Video,
            confidence: Some(0.87),
            total_frames: Some(152),
            detected_at: chrono::Utc.with_ymd_and_hms(2026, 8, 7, 12, 30, 0).unwrap(),
            code: SignalCode::On,
        }
    }

    #[test]
    fn test_alert_text_includes_metadata() {
        let text = alert_text(&test_context());
        assert!(text.contains("video"));
        assert!(text.contains("87.0%"));
        assert!(text.contains("2026-08-07 12:30:00 UTC"));
    }

    #[test]
    fn test_alert_text_without_confidence() {
        let mut context = test_context();
        context.confidence = None;
        let text = alert_text(&context);
        assert!(text.contains("not reported"));
    }

    #[test]
    fn test_response_parses_camel_case_message_id() {
        let body = r#"{"success": true, "message": "Email sent successfully!", "messageId": "<abc@mail>"}"#;
        let response: SendEmailResponse = serde_json::from_str(body).unwrap();
        assert!(response.success);
        assert_eq!(response.message_id.as_deref(), Some("<abc@mail>"));
    }

    #[test]
    fn test_response_tolerates_missing_fields() {
        let body = r#"{"success": false}"#;
        let response: SendEmailResponse = serde_json::from_str(body).unwrap();
        assert!(!response.success);
        assert_eq!(response.message, None);
        assert_eq!(response.message_id, None);
    }
}
