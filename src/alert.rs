//! Alert payloads and delivery channels.
//!
//! Channels are interchangeable delivery backends behind [`AlertChannel`]; the
//! webhook channels post severity-colored cards to Slack and Teams with bounded
//! timeouts, and the email channel hands the formatted message to the log
//! pipeline until a mail provider is wired in.

use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use crate::detectors::DetectionResult;
use crate::risk::Severity;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
const DETAILS_SNIPPET_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected status: {0}")]
    Status(u16),
}

/// Formatted alert, shared by every channel.
#[derive(Debug, Clone)]
pub struct AlertPayload {
    pub severity: Severity,
    pub risk_score: f64,
    pub detector: String,
    pub timestamp: String,
    pub details: Value,
    pub recommended_actions: Vec<String>,
}

impl AlertPayload {
    pub fn from_detection(detection: &DetectionResult) -> Self {
        Self {
            severity: detection.severity,
            risk_score: detection.risk_score,
            detector: detection.detector_name.clone(),
            timestamp: Utc::now().to_rfc3339(),
            details: Value::Object(detection.details.clone()),
            recommended_actions: detection.recommended_actions.clone(),
        }
    }

    pub fn color(&self) -> &'static str {
        match self.severity {
            Severity::Critical => "#FF0000",
            Severity::High => "#FF6600",
            Severity::Medium => "#FFCC00",
            Severity::Low => "#00CC00",
        }
    }

    pub fn title(&self) -> String {
        format!(
            "IAM Security Alert - {}",
            self.severity.label().to_uppercase()
        )
    }

    /// Pretty-printed details, bounded so chat clients do not truncate the card.
    pub fn details_snippet(&self) -> String {
        serde_json::to_string_pretty(&self.details)
            .unwrap_or_default()
            .chars()
            .take(DETAILS_SNIPPET_CHARS)
            .collect()
    }
}

pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &'static str;
    fn send(&self, alert: &AlertPayload) -> Result<(), ChannelError>;
}

fn webhook_client() -> Client {
    Client::builder()
        .timeout(WEBHOOK_TIMEOUT)
        .user_agent("iam-immune/0.1")
        .build()
        .unwrap_or_default()
}

fn post_json(client: &Client, url: &str, body: &Value) -> Result<(), ChannelError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .map_err(|e| ChannelError::Http(e.to_string()))?;
    if !response.status().is_success() {
        return Err(ChannelError::Status(response.status().as_u16()));
    }
    Ok(())
}

// ── Slack ───────────────────────────────────────────────────────────────────

pub struct SlackChannel {
    webhook_url: String,
    client: Client,
}

impl SlackChannel {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: webhook_client(),
        }
    }

    fn emoji(severity: Severity) -> &'static str {
        match severity {
            Severity::Critical => ":rotating_light:",
            Severity::High => ":warning:",
            Severity::Medium => ":large_orange_diamond:",
            Severity::Low => ":information_source:",
        }
    }

    fn build_blocks(alert: &AlertPayload) -> Vec<Value> {
        let mut blocks = vec![
            json!({
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("{} {}", Self::emoji(alert.severity), alert.title()),
                    "emoji": true
                }
            }),
            json!({
                "type": "section",
                "fields": [
                    {"type": "mrkdwn", "text": format!("*Detector:*\n{}", alert.detector)},
                    {"type": "mrkdwn", "text": format!("*Risk Score:*\n{:.1}/100", alert.risk_score)},
                    {"type": "mrkdwn", "text": format!("*Timestamp:*\n{}", alert.timestamp)},
                    {"type": "mrkdwn", "text": format!("*Severity:*\n{}", alert.severity.label().to_uppercase())}
                ]
            }),
            json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!("*Details:*\n```{}```", alert.details_snippet())
                }
            }),
        ];

        if !alert.recommended_actions.is_empty() {
            let actions_text = alert
                .recommended_actions
                .iter()
                .map(|a| format!("• {a}"))
                .collect::<Vec<_>>()
                .join("\n");
            blocks.push(json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!("*Recommended Actions:*\n{actions_text}")
                }
            }));
        }

        blocks.push(json!({"type": "divider"}));
        blocks
    }
}

impl AlertChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn send(&self, alert: &AlertPayload) -> Result<(), ChannelError> {
        let body = json!({
            "text": alert.title(),
            "blocks": Self::build_blocks(alert)
        });
        post_json(&self.client, &self.webhook_url, &body)
    }
}

// ── Teams ───────────────────────────────────────────────────────────────────

pub struct TeamsChannel {
    webhook_url: String,
    client: Client,
}

impl TeamsChannel {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: webhook_client(),
        }
    }

    fn build_card(alert: &AlertPayload) -> Value {
        let mut sections = vec![
            json!({
                "activityTitle": alert.title(),
                "activitySubtitle": format!("Detected by {}", alert.detector),
                "facts": [
                    {"name": "Severity", "value": alert.severity.label().to_uppercase()},
                    {"name": "Risk Score", "value": format!("{:.1}/100", alert.risk_score)},
                    {"name": "Timestamp", "value": alert.timestamp}
                ],
                "markdown": true
            }),
            json!({
                "activityTitle": "Details",
                "text": format!("```\n{}\n```", alert.details_snippet())
            }),
        ];

        if !alert.recommended_actions.is_empty() {
            let actions_text = alert
                .recommended_actions
                .iter()
                .map(|a| format!("• {a}"))
                .collect::<Vec<_>>()
                .join("\n\n");
            sections.push(json!({
                "activityTitle": "Recommended Actions",
                "text": actions_text
            }));
        }

        json!({
            "@type": "MessageCard",
            "@context": "https://schema.org/extensions",
            "themeColor": alert.color(),
            "summary": alert.title(),
            "sections": sections
        })
    }
}

impl AlertChannel for TeamsChannel {
    fn name(&self) -> &'static str {
        "teams"
    }

    fn send(&self, alert: &AlertPayload) -> Result<(), ChannelError> {
        post_json(&self.client, &self.webhook_url, &Self::build_card(alert))
    }
}

// ── Email ───────────────────────────────────────────────────────────────────

/// Formats the alert as mail and logs it. Delivery is handed to the log-based
/// forwarder until an SES/SendGrid sender is configured.
pub struct EmailChannel {
    recipient: String,
}

impl EmailChannel {
    pub fn new(recipient: String) -> Self {
        Self { recipient }
    }

    fn body(alert: &AlertPayload) -> String {
        let actions = alert
            .recommended_actions
            .iter()
            .map(|a| format!("- {a}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Severity: {}\nRisk Score: {:.1}/100\nDetector: {}\nTimestamp: {}\n\nDetails:\n{}\n\nRecommended Actions:\n{}",
            alert.severity.label().to_uppercase(),
            alert.risk_score,
            alert.detector,
            alert.timestamp,
            alert.details_snippet(),
            actions
        )
    }
}

impl AlertChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn send(&self, alert: &AlertPayload) -> Result<(), ChannelError> {
        info!(
            recipient = %self.recipient,
            subject = %alert.title(),
            body = %Self::body(alert),
            "Queued alert email"
        );
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::DetectionResult;

    fn sample_alert() -> AlertPayload {
        let mut detection = DetectionResult::no_threat("PublicBucketDetector", "test");
        detection.severity = Severity::Critical;
        detection.risk_score = 92.5;
        detection.recommended_actions = vec!["block_public".into(), "alert_team".into()];
        AlertPayload::from_detection(&detection)
    }

    #[test]
    fn payload_carries_detection_fields() {
        let alert = sample_alert();
        assert_eq!(alert.detector, "PublicBucketDetector");
        assert_eq!(alert.color(), "#FF0000");
        assert_eq!(alert.title(), "IAM Security Alert - CRITICAL");
    }

    #[test]
    fn details_snippet_is_bounded() {
        let mut detection = DetectionResult::no_threat("Test", "x");
        detection.details.insert("blob".into(), json!("y".repeat(2000)));
        let alert = AlertPayload::from_detection(&detection);
        assert!(alert.details_snippet().chars().count() <= DETAILS_SNIPPET_CHARS);
    }

    #[test]
    fn slack_blocks_include_actions_section() {
        let blocks = SlackChannel::build_blocks(&sample_alert());
        // Header, fields, details, actions, divider.
        assert_eq!(blocks.len(), 5);
        let actions = blocks[3]["text"]["text"].as_str().unwrap();
        assert!(actions.contains("block_public"));
    }

    #[test]
    fn teams_card_uses_severity_color() {
        let card = TeamsChannel::build_card(&sample_alert());
        assert_eq!(card["themeColor"], "#FF0000");
        assert_eq!(card["@type"], "MessageCard");
        assert_eq!(card["sections"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn email_channel_always_delivers_to_log() {
        let channel = EmailChannel::new("security@example.com".into());
        assert!(channel.send(&sample_alert()).is_ok());
    }
}
