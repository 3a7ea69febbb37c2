//! Privilege grant detection.
//!
//! Watches policy attachments, inline policy writes, access key creation, and
//! trust policy updates for grants that hand out administrative power. Known
//! provisioning principals are whitelisted and short-circuit to zero risk.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::config::MonitorConfig;
use crate::detectors::{base_details, verdict, Detector, DetectionResult};
use crate::event::IamEvent;
use crate::policy::PolicyDocument;
use crate::risk::RiskFactors;
use crate::signals;

const NAME: &str = "AdminGrantDetector";

const GATE_ACTIONS: &[&str] = &[
    "AttachUserPolicy",
    "AttachGroupPolicy",
    "AttachRolePolicy",
    "PutUserPolicy",
    "PutGroupPolicy",
    "PutRolePolicy",
    "CreateAccessKey",
    "UpdateAssumeRolePolicy",
];

const ADMIN_MANAGED_POLICIES: &[&str] = &[
    "AdministratorAccess",
    "PowerUserAccess",
    "IAMFullAccess",
    "SecurityAudit",
];

/// Actions that enable privilege escalation even without full admin.
const DANGEROUS_ACTIONS: &[&str] = &[
    "iam:CreatePolicyVersion",
    "iam:SetDefaultPolicyVersion",
    "iam:PassRole",
    "iam:AttachUserPolicy",
    "iam:AttachRolePolicy",
    "sts:AssumeRole",
];

const THREAT_THRESHOLD: f64 = 50.0;
const STRONG_ACTION_THRESHOLD: f64 = 70.0;
const AUTO_THRESHOLD: f64 = 80.0;

pub struct AdminGrantDetector {
    config: Arc<MonitorConfig>,
}

impl AdminGrantDetector {
    pub fn new(config: Arc<MonitorConfig>) -> Self {
        Self { config }
    }

    fn check_managed_policy(&self, event: &IamEvent, factors: &mut RiskFactors) {
        if !event.name().contains("Policy") {
            return;
        }
        let Some(policy_arn) = event.param_str("policyArn") else {
            return;
        };
        let policy_name = policy_arn.rsplit('/').next().unwrap_or("");
        if ADMIN_MANAGED_POLICIES.iter().any(|p| policy_name.contains(p)) {
            factors.insert("admin_policy_attached".into(), 95.0);
        }
    }

    fn check_inline_policy(&self, event: &IamEvent, factors: &mut RiskFactors) {
        let Some(raw) = event.param("policyDocument") else {
            return;
        };
        let Some(doc) = PolicyDocument::parse(raw) else {
            debug!(detector = NAME, "Unparseable inline policy, scoring zero");
            return;
        };

        let mut worst: f64 = 0.0;
        for stmt in doc.allow_statements() {
            if stmt.has_action("*") || stmt.has_action("iam:*") {
                worst = worst.max(95.0);
            } else if stmt.has_any_action(DANGEROUS_ACTIONS) {
                worst = worst.max(80.0);
            } else if stmt.has_resource("*") {
                worst = worst.max(70.0);
            }
        }
        if worst > 0.0 {
            factors.insert("dangerous_inline_policy".into(), worst);
        }
    }

    fn check_cross_user_key(&self, event: &IamEvent, factors: &mut RiskFactors) {
        if event.name() != "CreateAccessKey" {
            return;
        }
        let target = event.param_str("userName").unwrap_or("");
        // Creating a key for yourself carries the caller's own name in the ARN.
        if !target.is_empty() && !event.principal().contains(target) {
            factors.insert("cross_user_key_creation".into(), 85.0);
        }
    }

    fn check_trust_policy(&self, event: &IamEvent, factors: &mut RiskFactors) {
        if event.name() != "UpdateAssumeRolePolicy" {
            return;
        }
        let Some(raw) = event.param("policyDocument") else {
            return;
        };
        let Some(doc) = PolicyDocument::parse(raw) else {
            return;
        };

        let mut worst: f64 = 0.0;
        for stmt in &doc.statements {
            if stmt.has_wildcard_principal() {
                worst = worst.max(95.0);
                continue;
            }
            if let Some(aws_principal) = stmt.aws_principal() {
                let account = aws_principal.split(':').nth(4).unwrap_or("");
                if !account.is_empty() && !stmt.condition_mentions("ExternalId") {
                    worst = worst.max(60.0);
                }
            }
        }
        if worst > 0.0 {
            factors.insert("dangerous_assume_role_policy".into(), worst);
        }
    }
}

impl Detector for AdminGrantDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn detect(&self, event: &IamEvent) -> DetectionResult {
        if !GATE_ACTIONS.contains(&event.name()) {
            return DetectionResult::no_threat(NAME, "event not relevant to privilege grants");
        }

        let principal = event.principal();
        if self.config.is_whitelisted(principal) {
            return DetectionResult::no_threat(NAME, "principal is whitelisted");
        }

        let mut factors = RiskFactors::new();
        self.check_managed_policy(event, &mut factors);
        self.check_inline_policy(event, &mut factors);
        self.check_cross_user_key(event, &mut factors);
        self.check_trust_policy(event, &mut factors);
        if signals::ip_flagged(event.source_ip()) {
            factors.insert("unusual_source_ip".into(), 40.0);
        }
        if event.occurred_off_hours() {
            factors.insert("off_hours_activity".into(), 30.0);
        }
        if event.has_error() {
            factors.insert("error_in_request".into(), 20.0);
        }

        let mut details = base_details(event);
        details.insert("principal".into(), json!(principal));
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
