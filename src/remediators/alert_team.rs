//! Team notification.
//!
//! Fans a detection out to every configured alert channel. Channel failures are
//! isolated and collected; the remediation succeeds as long as at least one
//! channel delivered.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info};

use crate::alert::{AlertChannel, AlertPayload, EmailChannel, SlackChannel, TeamsChannel};
use crate::config::AlertConfig;
use crate::detectors::DetectionResult;
use crate::remediators::{Details, RemediationResult, Remediator};

pub struct AlertTeamRemediator {
    channels: Vec<Arc<dyn AlertChannel>>,
    dry_run: bool,
}

impl AlertTeamRemediator {
    pub fn new(channels: Vec<Arc<dyn AlertChannel>>, dry_run: bool) -> Self {
        Self { channels, dry_run }
    }

    /// Builds the channel list from configuration; unset channels are skipped.
    pub fn from_config(config: &AlertConfig, dry_run: bool) -> Self {
        let mut channels: Vec<Arc<dyn AlertChannel>> = Vec::new();
        if let Some(url) = &config.slack_webhook_url {
            channels.push(Arc::new(SlackChannel::new(url.clone())));
        }
        if let Some(url) = &config.teams_webhook_url {
            channels.push(Arc::new(TeamsChannel::new(url.clone())));
        }
        if let Some(recipient) = &config.alert_email {
            channels.push(Arc::new(EmailChannel::new(recipient.clone())));
        }
        Self::new(channels, dry_run)
    }
}

impl Remediator for AlertTeamRemediator {
    fn name(&self) -> &'static str {
        "alert_team"
    }

    fn remediate(&self, detection: &DetectionResult) -> RemediationResult {
        if self.dry_run {
            info!(detector = %detection.detector_name, "Dry run: would send alerts");
            return RemediationResult::dry_run(detection);
        }

        let alert = AlertPayload::from_detection(detection);
        let mut sent: Vec<&str> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        for channel in &self.channels {
            match channel.send(&alert) {
                Ok(()) => sent.push(channel.name()),
                Err(e) => {
                    error!(channel = channel.name(), error = %e, "Alert delivery failed");
                    errors.push(format!("{}: {e}", channel.name()));
                }
            }
        }

        if sent.is_empty() {
            let error = if errors.is_empty() {
                "No channels configured".to_string()
            } else {
                errors.join("; ")
            };
            return RemediationResult::failed(
                "No alert channels configured or all alerts failed",
                error,
            );
        }

        info!(channels = ?sent, "Sent alerts");
        let mut details = Details::new();
        details.insert("channels".into(), json!(sent));
        details.insert("errors".into(), json!(errors));
        RemediationResult::succeeded(
            format!("Alerts sent via {}", sent.join(", ")),
            "send_alerts",
            details,
        )
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::ChannelError;
    use crate::risk::Severity;
    use parking_lot::Mutex;

    struct ScriptedChannel {
        channel_name: &'static str,
        fail: bool,
        sent: Mutex<usize>,
    }

    impl ScriptedChannel {
        fn new(channel_name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                channel_name,
                fail,
                sent: Mutex::new(0),
            })
        }
    }

    impl AlertChannel for ScriptedChannel {
        fn name(&self) -> &'static str {
            self.channel_name
        }

        fn send(&self, _alert: &AlertPayload) -> Result<(), ChannelError> {
            if self.fail {
                return Err(ChannelError::Status(500));
            }
            *self.sent.lock() += 1;
            Ok(())
        }
    }

    fn detection() -> DetectionResult {
        let mut d = DetectionResult::no_threat("AdminGrantDetector", "test");
        d.is_threat = true;
        d.severity = Severity::High;
        d.risk_score = 70.0;
        d
    }

    #[test]
    fn partial_channel_failure_still_succeeds() {
        let good = ScriptedChannel::new("slack", false);
        let bad = ScriptedChannel::new("teams", true);
        let r = AlertTeamRemediator::new(vec![good.clone(), bad], false);

        let result = r.remediate(&detection());

        assert!(result.success);
        assert_eq!(*good.sent.lock(), 1);
        assert_eq!(result.details.get("channels").unwrap(), &json!(["slack"]));
        let errors = result.details.get("errors").unwrap().as_array().unwrap();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn no_channels_is_a_failure() {
        let r = AlertTeamRemediator::new(Vec::new(), false);
        let result = r.remediate(&detection());
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No channels configured"));
    }

    #[test]
    fn all_channels_failing_is_a_failure() {
        let r = AlertTeamRemediator::new(vec![ScriptedChannel::new("slack", true)], false);
        let result = r.remediate(&detection());
        assert!(!result.success);
        assert!(result.error.unwrap().contains("slack"));
    }

    #[test]
    fn dry_run_skips_delivery() {
        let channel = ScriptedChannel::new("slack", false);
        let r = AlertTeamRemediator::new(vec![channel.clone()], true);
        let result = r.remediate(&detection());
        assert!(result.success);
        assert_eq!(result.action_taken.as_deref(), Some("dry_run"));
        assert_eq!(*channel.sent.lock(), 0);
    }

    #[test]
    fn from_config_skips_unset_channels() {
        let config = AlertConfig {
            alert_email: Some("sec@example.com".into()),
            ..Default::default()
        };
        let r = AlertTeamRemediator::from_config(&config, false);
        let result = r.remediate(&detection());
        // Only the email channel is configured, and it always delivers.
        assert!(result.success);
        assert_eq!(result.details.get("channels").unwrap(), &json!(["email"]));
    }
}
