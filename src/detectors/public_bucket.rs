//! Public bucket exposure detection.
//!
//! Watches S3 control-plane mutations that can open a bucket to the world:
//! bucket policies with wildcard principals, public ACL grants, and weakened or
//! removed public-access-block configuration.

use serde_json::{json, Value};
use tracing::debug;

use crate::detectors::{base_details, verdict, Detector, DetectionResult};
use crate::event::IamEvent;
use crate::policy::PolicyDocument;
use crate::risk::RiskFactors;

const NAME: &str = "PublicBucketDetector";

const GATE_ACTIONS: &[&str] = &[
    "PutBucketPolicy",
    "DeleteBucketPolicy",
    "PutBucketAcl",
    "PutBucketPublicAccessBlock",
    "DeleteBucketPublicAccessBlock",
];

const PAB_FLAGS: &[&str] = &[
    "BlockPublicAcls",
    "BlockPublicPolicy",
    "IgnorePublicAcls",
    "RestrictPublicBuckets",
];

const DANGEROUS_BUCKET_ACTIONS: &[&str] =
    &["s3:GetObject", "s3:PutObject", "s3:DeleteObject", "s3:*"];

const PUBLIC_GRANTEE_URIS: &[&str] = &["AllUsers", "AuthenticatedUsers"];

/// Name fragments suggesting the bucket holds data that must never be public.
const SENSITIVE_KEYWORDS: &[&str] = &[
    "pii",
    "phi",
    "backup",
    "logs",
    "audit",
    "compliance",
    "customer",
    "user",
    "payment",
    "credential",
    "secret",
    "private",
    "internal",
    "prod",
    "production",
];

const THREAT_THRESHOLD: f64 = 40.0;
const STRONG_ACTION_THRESHOLD: f64 = 80.0;
const AUTO_THRESHOLD: f64 = 60.0;

pub struct PublicBucketDetector;

impl PublicBucketDetector {
    pub fn new() -> Self {
        Self
    }

    fn bucket_name(&self, event: &IamEvent) -> Option<String> {
        if let Some(name) = event.param_str("bucketName") {
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
        // CloudTrail sometimes only carries the bucket in the resource ARN.
        for arn in event.resource_arns() {
            if let Some((_, tail)) = arn.split_once("arn:aws:s3:::") {
                let bucket = tail.split('/').next().unwrap_or("");
                if !bucket.is_empty() {
                    return Some(bucket.to_string());
                }
            }
        }
        None
    }

    fn check_public_access_block(&self, event: &IamEvent, factors: &mut RiskFactors) {
        match event.name() {
            "DeleteBucketPublicAccessBlock" => {
                factors.insert("public_access_block_removed".into(), 90.0);
            }
            "PutBucketPublicAccessBlock" => {
                let config = event.param("PublicAccessBlockConfiguration");
                let fully_enabled = PAB_FLAGS.iter().all(|flag| {
                    config
                        .and_then(|c| c.get(*flag))
                        .and_then(Value::as_bool)
                        .unwrap_or(false)
                });
                if !fully_enabled {
                    factors.insert("weak_public_access_block".into(), 70.0);
                }
            }
            _ => {}
        }
    }

    fn check_bucket_policy(&self, event: &IamEvent, factors: &mut RiskFactors) {
        if event.name() != "PutBucketPolicy" {
            return;
        }
        let Some(raw) = event.param("bucketPolicy") else {
            return;
        };
        let Some(doc) = PolicyDocument::parse(raw) else {
            debug!(detector = NAME, "Unparseable bucket policy, scoring zero");
            return;
        };

        let mut worst: f64 = 0.0;
        for stmt in &doc.statements {
            if stmt.has_wildcard_principal() {
                let score = if stmt.effect == "Allow" { 95.0 } else { 20.0 };
                worst = worst.max(score);
            }
            if stmt.has_any_action(DANGEROUS_BUCKET_ACTIONS) {
                worst = worst.max(80.0);
            }
        }
        if worst > 0.0 {
            factors.insert("dangerous_bucket_policy".into(), worst);
        }
    }

    fn check_bucket_acl(&self, event: &IamEvent, factors: &mut RiskFactors) {
        if event.name() != "PutBucketAcl" {
            return;
        }
        let grants = event
            .param("AccessControlPolicy")
            .and_then(|acp| acp.get("AccessControlList"))
            .and_then(|acl| acl.get("Grant"));

        let grants: Vec<&Value> = match grants {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(single @ Value::Object(_)) => vec![single],
            _ => return,
        };

        let mut worst: f64 = 0.0;
        for grant in grants {
            let uri = grant
                .get("Grantee")
                .and_then(|g| g.get("URI"))
                .and_then(Value::as_str)
                .unwrap_or("");
            if !PUBLIC_GRANTEE_URIS.iter().any(|g| uri.contains(g)) {
                continue;
            }
            let permission = grant
                .get("Permission")
                .and_then(Value::as_str)
                .unwrap_or("");
            match permission {
                "FULL_CONTROL" | "WRITE" => worst = worst.max(95.0),
                "READ" => worst = worst.max(70.0),
                _ => {}
            }
        }
        if worst > 0.0 {
            factors.insert("dangerous_bucket_acl".into(), worst);
        }
    }

    fn check_sensitive_name(&self, bucket: &str, factors: &mut RiskFactors) {
        let lower = bucket.to_lowercase();
        if SENSITIVE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            factors.insert("sensitive_bucket".into(), 30.0);
        }
    }
}

impl Default for PublicBucketDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for PublicBucketDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn detect(&self, event: &IamEvent) -> DetectionResult {
        if !GATE_ACTIONS.contains(&event.name()) {
            return DetectionResult::no_threat(NAME, "event not relevant to bucket exposure");
        }

        let Some(bucket) = self.bucket_name(event) else {
            return DetectionResult::fault(NAME, "could not extract bucket name from event");
        };

        let mut factors = RiskFactors::new();
        self.check_public_access_block(event, &mut factors);
        self.check_bucket_policy(event, &mut factors);
        self.check_bucket_acl(event, &mut factors);
        self.check_sensitive_name(&bucket, &mut factors);

        let mut details = base_details(event);
        details.insert("bucket_name".into(), json!(bucket));

        let mut result = verdict(NAME, factors, details, THREAT_THRESHOLD, AUTO_THRESHOLD);
        if result.is_threat {
            result.recommended_actions =
                vec!["block_public".to_string(), "alert_team".to_string()];
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
    use crate::risk::Severity;
    use serde_json::json;

    fn make_event(value: serde_json::Value) -> IamEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn ignores_events_outside_gate() {
        let detector = PublicBucketDetector::new();
        let event = make_event(json!({"eventName": "ListBuckets"}));
        let result = detector.detect(&event);
        assert!(!result.is_threat);
        assert_eq!(result.risk_score, 0.0);
    }

    #[test]
    fn missing_bucket_name_is_zero_risk_with_error() {
        let detector = PublicBucketDetector::new();
        let event = make_event(json!({"eventName": "PutBucketPolicy"}));
        let result = detector.detect(&event);
        assert!(!result.is_threat);
        assert!(result.detail_str("error").is_some());
    }

    #[test]
    fn deleted_public_access_block_is_critical_and_auto() {
        let detector = PublicBucketDetector::new();
        let event = make_event(json!({
            "eventName": "DeleteBucketPublicAccessBlock",
            "requestParameters": {"bucketName": "data-bucket"}
        }));
        let result = detector.detect(&event);
        assert!(result.is_threat);
        assert!(result.risk_score >= 80.0);
        assert_eq!(result.severity, Severity::Critical);
        assert!(result.auto_remediate);
        assert_eq!(
            result.recommended_actions,
            vec!["revoke_access", "block_public", "alert_team"]
        );
        assert_eq!(result.detail_str("bucket_name"), Some("data-bucket"));
    }

    #[test]
    fn wildcard_allow_policy_scores_high() {
        let detector = PublicBucketDetector::new();
        let policy = json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": "*",
                "Action": "s3:GetObject",
                "Resource": "arn:aws:s3:::my-test-bucket/*"
            }]
        });
        let event = make_event(json!({
            "eventName": "PutBucketPolicy",
            "requestParameters": {
                "bucketName": "my-test-bucket",
                "bucketPolicy": policy.to_string()
            }
        }));
        let result = detector.detect(&event);
        assert!(result.is_threat);
        assert!(result.risk_score >= 90.0);
        assert!(result.recommended_actions.contains(&"revoke_access".into()));
    }

    #[test]
    fn malformed_policy_scores_zero() {
        let detector = PublicBucketDetector::new();
        let event = make_event(json!({
            "eventName": "PutBucketPolicy",
            "requestParameters": {
                "bucketName": "my-test-bucket",
                "bucketPolicy": "{definitely not json"
            }
        }));
        let result = detector.detect(&event);
        assert!(!result.is_threat);
        assert_eq!(result.risk_score, 0.0);
    }

    #[test]
    fn weak_public_access_block_is_flagged() {
        let detector = PublicBucketDetector::new();
        let event = make_event(json!({
            "eventName": "PutBucketPublicAccessBlock",
            "requestParameters": {
                "bucketName": "data-bucket",
                "PublicAccessBlockConfiguration": {
                    "BlockPublicAcls": true,
                    "BlockPublicPolicy": false,
                    "IgnorePublicAcls": true,
                    "RestrictPublicBuckets": true
                }
            }
        }));
        let result = detector.detect(&event);
        assert!(result.is_threat);
        assert_eq!(result.risk_score, 70.0);
        assert!(result.auto_remediate);
    }

    #[test]
    fn public_read_acl_on_sensitive_bucket() {
        let detector = PublicBucketDetector::new();
        let event = make_event(json!({
            "eventName": "PutBucketAcl",
            "requestParameters": {
                "bucketName": "customer-exports",
                "AccessControlPolicy": {
                    "AccessControlList": {
                        "Grant": [{
                            "Grantee": {"URI": "http://acs.amazonaws.com/groups/global/AllUsers"},
                            "Permission": "READ"
                        }]
                    }
                }
            }
        }));
        let result = detector.detect(&event);
        // Mean of public-read (70) and sensitive-name (30).
        assert!(result.is_threat);
        assert_eq!(result.risk_score, 50.0);
        assert_eq!(result.severity, Severity::Medium);
        assert!(!result.auto_remediate);
    }

    #[test]
    fn bucket_name_falls_back_to_resource_arn() {
        let detector = PublicBucketDetector::new();
        let event = make_event(json!({
            "eventName": "DeleteBucketPublicAccessBlock",
            "resources": [{"ARN": "arn:aws:s3:::arn-bucket/key"}]
        }));
        let result = detector.detect(&event);
        assert_eq!(result.detail_str("bucket_name"), Some("arn-bucket"));
        assert!(result.is_threat);
    }
}
