//! Remediation contract.
//!
//! A remediator executes one corrective action for one detection. The contract
//! mirrors the detectors' fail-open rule: `remediate` never panics; faults come
//! back as failed results so the dispatcher can keep going. When the global
//! dry-run flag is set, every remediator reports success without touching
//! anything.

pub mod alert_team;
pub mod block_public;
pub mod revoke_access;

pub use alert_team::AlertTeamRemediator;
pub use block_public::BlockPublicRemediator;
pub use revoke_access::RevokeAccessRemediator;

use serde::Serialize;
use serde_json::{json, Value};

use crate::detectors::DetectionResult;

pub type Details = serde_json::Map<String, Value>;

pub trait Remediator: Send + Sync {
    fn name(&self) -> &'static str;
    fn remediate(&self, detection: &DetectionResult) -> RemediationResult;
}

#[derive(Debug, Clone, Serialize)]
pub struct RemediationResult {
    pub success: bool,
    pub message: String,
    pub details: Details,
    pub action_taken: Option<String>,
    pub error: Option<String>,
}

impl RemediationResult {
    pub fn succeeded(message: impl Into<String>, action_taken: &str, details: Details) -> Self {
        Self {
            success: true,
            message: message.into(),
            details,
            action_taken: Some(action_taken.to_string()),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: Details::new(),
            action_taken: None,
            error: Some(error.into()),
        }
    }

    /// Dry-run short circuit: success, nothing mutated.
    pub fn dry_run(detection: &DetectionResult) -> Self {
        let mut details = Details::new();
        details.insert("dry_run".into(), json!(true));
        details.insert("detection".into(), json!(detection.details));
        Self {
            success: true,
            message: "Dry run - no action taken".into(),
            details,
            action_taken: Some("dry_run".to_string()),
            error: None,
        }
    }
}
