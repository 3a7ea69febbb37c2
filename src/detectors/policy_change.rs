//! Policy lifecycle change detection.
//!
//! Watches managed policy creation, deletion, version changes, and detachments.
//! Deletions and default-version swaps touching security-critical services are
//! the classic way to blind audit tooling before an attack.

use serde_json::json;
use tracing::debug;

use crate::detectors::{base_details, verdict, Detector, DetectionResult};
use crate::event::IamEvent;
use crate::policy::{policy_text_lower, PolicyDocument};
use crate::risk::RiskFactors;
use crate::signals;

const NAME: &str = "PolicyChangeDetector";

const GATE_ACTIONS: &[&str] = &[
    "CreatePolicy",
    "CreatePolicyVersion",
    "SetDefaultPolicyVersion",
    "DeletePolicy",
    "DeletePolicyVersion",
    "DetachRolePolicy",
    "DetachUserPolicy",
    "DetachGroupPolicy",
];

/// Services whose policies gate the security posture of the whole account.
const CRITICAL_SERVICES: &[&str] = &[
    "iam",
    "kms",
    "cloudtrail",
    "guardduty",
    "config",
    "securityhub",
    "cloudwatch",
    "logs",
];

/// Actions that disable audit or protection infrastructure.
const SECURITY_ACTIONS: &[&str] = &[
    "cloudtrail:StopLogging",
    "cloudtrail:DeleteTrail",
    "guardduty:DeleteDetector",
    "config:DeleteConfigRule",
    "iam:DeleteAccountPasswordPolicy",
    "kms:ScheduleKeyDeletion",
    "logs:DeleteLogGroup",
];

const EXFILTRATION_ACTIONS: &[&str] = &[
    "s3:GetObject",
    "rds:CopyDBSnapshot",
    "ec2:CreateSnapshot",
    "lambda:GetFunction",
];

const THREAT_THRESHOLD: f64 = 45.0;
const STRONG_ACTION_THRESHOLD: f64 = 75.0;
const AUTO_THRESHOLD: f64 = 85.0;

pub struct PolicyChangeDetector;

impl PolicyChangeDetector {
    pub fn new() -> Self {
        Self
    }

    fn is_critical_arn(&self, policy_arn: &str) -> bool {
        let lower = policy_arn.to_lowercase();
        CRITICAL_SERVICES.iter().any(|s| lower.contains(s))
    }

    fn check_lifecycle(&self, event: &IamEvent, factors: &mut RiskFactors) {
        let name = event.name();
        let policy_arn = event.param_str("policyArn").unwrap_or("");

        if name == "DeletePolicy" || name == "DeletePolicyVersion" {
            factors.insert("policy_deletion".into(), 75.0);
            if self.is_critical_arn(policy_arn) {
                factors.insert("critical_policy_deleted".into(), 90.0);
            }
        }
        if name == "SetDefaultPolicyVersion" {
            factors.insert("policy_version_change".into(), 65.0);
        }
        if name.contains("Detach") {
            factors.insert("policy_detached".into(), 60.0);
        }
    }

    fn check_new_content(&self, event: &IamEvent, factors: &mut RiskFactors) {
        let name = event.name();
        if name != "CreatePolicy" && name != "CreatePolicyVersion" {
            return;
        }
        let Some(raw) = event.param("policyDocument") else {
            return;
        };
        let Some(doc) = PolicyDocument::parse(raw) else {
            debug!(detector = NAME, "Unparseable policy document, scoring zero");
            return;
        };

        let mut worst: f64 = 0.0;
        for stmt in &doc.statements {
            if stmt.effect == "Allow" {
                if stmt.has_action("*") && stmt.has_resource("*") {
                    worst = worst.max(95.0);
                }
                if stmt.has_any_action(SECURITY_ACTIONS) {
                    worst = worst.max(85.0);
                }
                if stmt.has_any_action(EXFILTRATION_ACTIONS) && stmt.has_resource("*") {
                    worst = worst.max(70.0);
                }
            } else if stmt.effect == "Deny" {
                let actions_text = stmt.actions.join(" ").to_lowercase();
                if CRITICAL_SERVICES.iter().any(|s| actions_text.contains(s)) {
                    worst = worst.max(80.0);
                }
            }
        }
        if worst > 0.0 {
            factors.insert("dangerous_policy_content".into(), worst);
        }
    }

    fn check_critical_scope(&self, event: &IamEvent, factors: &mut RiskFactors) {
        let policy_arn = event.param_str("policyArn").unwrap_or("");
        let mut haystack = policy_arn.to_lowercase();
        if let Some(doc) = event.param("policyDocument") {
            haystack.push(' ');
            haystack.push_str(&policy_text_lower(doc));
        }
        if CRITICAL_SERVICES.iter().any(|s| haystack.contains(s)) {
            factors.insert("affects_critical_service".into(), 55.0);
        }
    }

    fn affected_resources(&self, event: &IamEvent) -> Vec<String> {
        let mut resources: Vec<String> =
            event.resource_arns().iter().map(|a| a.to_string()).collect();
        for key in ["policyArn", "roleName", "userName", "groupName"] {
            if let Some(value) = event.param_str(key) {
                if !value.is_empty() {
                    resources.push(value.to_string());
                }
            }
        }
        resources
    }
}

impl Default for PolicyChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for PolicyChangeDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn detect(&self, event: &IamEvent) -> DetectionResult {
        if !GATE_ACTIONS.contains(&event.name()) {
            return DetectionResult::no_threat(NAME, "event not relevant to policy lifecycle");
        }

        let mut factors = RiskFactors::new();
        self.check_lifecycle(event, &mut factors);
        self.check_new_content(event, &mut factors);
        self.check_critical_scope(event, &mut factors);
        if signals::rapid_policy_changes(event) {
            factors.insert("rapid_policy_changes".into(), 50.0);
        }
        if event.has_error() {
            factors.insert("failed_attempt".into(), 25.0);
        }

        let mut details = base_details(event);
        details.insert("principal".into(), json!(event.principal()));
        details.insert(
            "affected_resources".into(),
            json!(self.affected_resources(event)),
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_event(value: serde_json::Value) -> IamEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn ignores_events_outside_gate() {
        let detector = PolicyChangeDetector::new();
        let event = make_event(json!({"eventName": "GetPolicy"}));
        let result = detector.detect(&event);
        assert!(!result.is_threat);
    }

    #[test]
    fn plain_policy_deletion_is_a_threat() {
        let detector = PolicyChangeDetector::new();
        let event = make_event(json!({
            "eventName": "DeletePolicy",
            "requestParameters": {"policyArn": "arn:aws:iam::123456789012:policy/app-policy"}
        }));
        let result = detector.detect(&event);
        // Deletion (75) averaged with the critical-scope factor (the ARN names
        // the iam service).
        assert!(result.is_threat);
        assert_eq!(result.risk_score, 65.0);
        assert!(!result.auto_remediate);
        assert_eq!(result.recommended_actions, vec!["alert_team"]);
    }

    #[test]
    fn critical_policy_deletion_scores_higher() {
        let detector = PolicyChangeDetector::new();
        let event = make_event(json!({
            "eventName": "DeletePolicy",
            "requestParameters": {
                "policyArn": "arn:aws:iam::123456789012:policy/cloudtrail-access"
            }
        }));
        let result = detector.detect(&event);
        assert!(result.is_threat);
        // Deletion (75), critical deletion (90), and critical scope (55).
        assert!(result.risk_score >= 73.0);
        assert!(result.recommended_actions.contains(&"alert_team".into()));
    }

    #[test]
    fn wildcard_create_policy_is_auto_remediable() {
        let detector = PolicyChangeDetector::new();
        let policy = json!({
            "Version": "2012-10-17",
            "Statement": [{"Effect": "Allow", "Action": ["*"], "Resource": ["*"]}]
        });
        let event = make_event(json!({
            "eventName": "CreatePolicy",
            "requestParameters": {
                "policyName": "everything",
                "policyDocument": policy.to_string()
            }
        }));
        let result = detector.detect(&event);
        assert!(result.is_threat);
        assert_eq!(result.risk_score, 95.0);
        assert!(result.auto_remediate);
    }

    #[test]
    fn deny_on_security_service_is_flagged() {
        let detector = PolicyChangeDetector::new();
        let policy = json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Deny",
                "Action": ["guardduty:*"],
                "Resource": "*"
            }]
        });
        let event = make_event(json!({
            "eventName": "CreatePolicy",
            "requestParameters": {
                "policyName": "blind-guardduty",
                "policyDocument": policy.to_string()
            }
        }));
        let result = detector.detect(&event);
        assert!(result.is_threat);
        let factors = result.details.get("risk_factors").unwrap();
        assert_eq!(
            factors
                .get("dangerous_policy_content")
                .and_then(|v| v.as_f64()),
            Some(80.0)
        );
    }

    #[test]
    fn detachment_is_flagged() {
        let detector = PolicyChangeDetector::new();
        let event = make_event(json!({
            "eventName": "DetachRolePolicy",
            "requestParameters": {
                "roleName": "app-role",
                "policyArn": "arn:aws:iam::aws:policy/ReadOnlyAccess"
            }
        }));
        let result = detector.detect(&event);
        assert!(result.is_threat);
        // Detachment (60) averaged with the critical-scope factor (55).
        assert_eq!(result.risk_score, 57.5);
        let affected = result.details.get("affected_resources").unwrap();
        assert!(affected.as_array().unwrap().contains(&json!("app-role")));
    }
}
