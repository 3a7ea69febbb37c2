//! Cross-account access detection.
//!
//! Watches STS credential issuance: role assumption from untrusted accounts,
//! trust relationships missing an external id, over-broad session policies,
//! long sessions, and role chaining.

use serde_json::json;

use std::sync::Arc;

use crate::config::MonitorConfig;
use crate::detectors::{base_details, verdict, Detector, DetectionResult};
use crate::event::{account_from_arn, IamEvent};
use crate::policy::PolicyDocument;
use crate::risk::RiskFactors;
use crate::signals;

const NAME: &str = "CrossAccountDetector";

const GATE_ACTIONS: &[&str] = &["AssumeRole", "GetFederationToken", "GetSessionToken"];

/// Session-policy actions worth flagging even without a wildcard.
const SENSITIVE_SESSION_ACTIONS: &[&str] = &[
    "iam:*",
    "sts:AssumeRole",
    "s3:GetObject",
    "secretsmanager:GetSecretValue",
];

/// 12 hours; the STS default is one hour.
const MAX_SESSION_SECONDS: i64 = 43_200;
const DEFAULT_SESSION_SECONDS: i64 = 3_600;

const THREAT_THRESHOLD: f64 = 40.0;
const STRONG_ACTION_THRESHOLD: f64 = 70.0;
const AUTO_THRESHOLD: f64 = 80.0;

pub struct CrossAccountDetector {
    config: Arc<MonitorConfig>,
}

impl CrossAccountDetector {
    pub fn new(config: Arc<MonitorConfig>) -> Self {
        Self { config }
    }

    fn check_source_account(&self, event: &IamEvent, factors: &mut RiskFactors) {
        let source = event.source_account();
        if !source.is_empty() && !self.config.is_trusted_account(&source) {
            factors.insert("untrusted_source_account".into(), 70.0);
        }
    }

    fn check_external_id(&self, event: &IamEvent, factors: &mut RiskFactors) {
        if event.name() != "AssumeRole" {
            return;
        }
        let Some(role_arn) = event.param_str("roleArn") else {
            return;
        };
        if event.param_str("externalId").is_some() {
            return;
        }
        let target_account = account_from_arn(role_arn);
        let recipient = event.recipient_account_id.as_deref().unwrap_or("");
        if !target_account.is_empty() && target_account != recipient {
            factors.insert("no_external_id".into(), 60.0);
        }
    }

    fn check_session_policy(&self, event: &IamEvent, factors: &mut RiskFactors) {
        let Some(raw) = event.param("policy") else {
            return;
        };
        let Some(doc) = PolicyDocument::parse(raw) else {
            return;
        };

        let mut worst: f64 = 0.0;
        for stmt in &doc.statements {
            if stmt.has_action("*") || stmt.has_resource("*") {
                worst = worst.max(75.0);
            }
            if stmt.has_any_action(SENSITIVE_SESSION_ACTIONS) {
                worst = worst.max(60.0);
            }
        }
        if worst > 0.0 {
            factors.insert("dangerous_session_policy".into(), worst);
        }
    }

    fn check_session_duration(&self, event: &IamEvent, factors: &mut RiskFactors) {
        let duration = event
            .param_i64("durationSeconds")
            .unwrap_or(DEFAULT_SESSION_SECONDS);
        if duration > MAX_SESSION_SECONDS {
            factors.insert("excessive_session_duration".into(), 45.0);
        }
    }
}

impl Detector for CrossAccountDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn detect(&self, event: &IamEvent) -> DetectionResult {
        if !GATE_ACTIONS.contains(&event.name()) {
            return DetectionResult::no_threat(NAME, "event not relevant to cross-account access");
        }

        let mut factors = RiskFactors::new();
        self.check_source_account(event, &mut factors);
        self.check_external_id(event, &mut factors);
        self.check_session_policy(event, &mut factors);
        self.check_session_duration(event, &mut factors);
        if event.name() == "GetFederationToken" {
            factors.insert("federated_access".into(), 50.0);
        }
        if signals::ip_flagged(event.source_ip()) {
            factors.insert("suspicious_source_ip".into(), 55.0);
        }
        if !event.has_error() && signals::recent_failed_attempts(event) {
            factors.insert("retry_after_failures".into(), 65.0);
        }
        if event.user_identity.kind.as_deref() == Some("AssumedRole") {
            factors.insert("role_chaining".into(), 40.0);
        }
        if event.occurred_off_hours() {
            factors.insert("off_hours_access".into(), 30.0);
        }

        let mut details = base_details(event);
        details.insert("source_account".into(), json!(event.source_account()));
        details.insert(
            "assumed_role".into(),
            json!(event.param_str("roleArn").unwrap_or("")),
        );
        details.insert(
            "request_parameters".into(),
            event.request_parameters.clone(),
        );

        let mut result = verdict(NAME, factors, details, THREAT_THRESHOLD, AUTO_THRESHOLD);
        if result.is_threat {
            result.recommended_actions = vec!["alert_team".to_string()];
            if result.risk_score >= STRONG_ACTION_THRESHOLD {
                result
                    .recommended_actions
                    .insert(0, "revoke_access".to_string());
            }
        }
        result
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
