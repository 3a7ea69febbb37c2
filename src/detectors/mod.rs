//! Detection contract.
//!
//! A detector inspects one audit event and returns a verdict. The contract is
//! fail-open: `detect` never panics and never returns an error. Events a
//! detector cannot interpret score zero risk, with the reason recorded in the
//! result details, so one hostile or malformed event cannot take the pipeline
//! down.

pub mod admin_grant;
pub mod cross_account;
pub mod machine_identity;
pub mod policy_change;
pub mod public_bucket;

pub use admin_grant::AdminGrantDetector;
pub use cross_account::CrossAccountDetector;
pub use machine_identity::MachineIdentityDetector;
pub use policy_change::PolicyChangeDetector;
pub use public_bucket::PublicBucketDetector;

use serde::Serialize;
use serde_json::{json, Value};

use crate::event::IamEvent;
use crate::risk::{fuse, RiskFactors, Severity};

pub type Details = serde_json::Map<String, Value>;

pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Analyzes one event. Must be total: gate misses, malformed payloads, and
    /// internal faults all map to a zero-risk result.
    fn detect(&self, event: &IamEvent) -> DetectionResult;
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub detector_name: String,
    pub is_threat: bool,
    pub risk_score: f64,
    pub severity: Severity,
    pub details: Details,
    /// Action names for the dispatcher, strongest first.
    pub recommended_actions: Vec<String>,
    pub auto_remediate: bool,
}

impl DetectionResult {
    /// Zero-risk verdict for events outside a detector's scope or beyond its
    /// ability to interpret.
    pub fn no_threat(detector: &str, reason: &str) -> Self {
        let mut details = Details::new();
        details.insert("reason".into(), json!(reason));
        Self {
            detector_name: detector.to_string(),
            is_threat: false,
            risk_score: 0.0,
            severity: Severity::Low,
            details,
            recommended_actions: Vec::new(),
            auto_remediate: false,
        }
    }

    /// Zero-risk verdict carrying an internal fault description.
    pub fn fault(detector: &str, error: &str) -> Self {
        let mut details = Details::new();
        details.insert("error".into(), json!(error));
        Self {
            detector_name: detector.to_string(),
            is_threat: false,
            risk_score: 0.0,
            severity: Severity::Low,
            details,
            recommended_actions: Vec::new(),
            auto_remediate: false,
        }
    }

    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }
}

/// Builds a threat verdict from fused factors and detector thresholds. Callers
/// fill in recommended actions afterwards, since the action policy is
/// detector-specific.
pub(crate) fn verdict(
    detector: &str,
    factors: RiskFactors,
    details: Details,
    threat_threshold: f64,
    auto_threshold: f64,
) -> DetectionResult {
    let (risk_score, severity) = fuse(&factors);
    let mut details = details;
    details.insert("risk_factors".into(), json!(factors));

    DetectionResult {
        detector_name: detector.to_string(),
        is_threat: risk_score >= threat_threshold,
        risk_score,
        severity,
        details,
        recommended_actions: Vec::new(),
        auto_remediate: risk_score >= auto_threshold,
    }
}

/// Detail fields shared by every detector: enough to identify the event, the
/// caller, and where the call came from.
pub(crate) fn base_details(event: &IamEvent) -> Details {
    let mut details = Details::new();
    details.insert("event_name".into(), json!(event.name()));
    details.insert("event_time".into(), json!(event.time()));
    details.insert("source_ip".into(), json!(event.source_ip()));
    details.insert("user_identity".into(), json!(event.user_identity));
    details
}
