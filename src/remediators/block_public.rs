//! Public bucket lockdown.
//!
//! Applies the full public-access block (required for success), then makes a
//! best-effort pass over the remaining exposure surfaces: bucket policies with
//! wildcard principals, public ACLs, and static website hosting. Every step is
//! idempotent so the remediator can run repeatedly on an already-private bucket.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::cloud::{BucketApi, PublicAccessBlock};
use crate::detectors::DetectionResult;
use crate::policy::PolicyDocument;
use crate::remediators::{Details, RemediationResult, Remediator};

pub struct BlockPublicRemediator {
    buckets: Arc<dyn BucketApi>,
    dry_run: bool,
}

impl BlockPublicRemediator {
    pub fn new(buckets: Arc<dyn BucketApi>, dry_run: bool) -> Self {
        Self { buckets, dry_run }
    }

    fn remove_wildcard_policy(&self, bucket: &str, actions_taken: &mut Vec<String>) {
        let raw = match self.buckets.get_bucket_policy(bucket) {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => return,
            Err(e) => {
                warn!(bucket, error = %e, "Could not read bucket policy");
                return;
            }
        };

        let has_wildcard = PolicyDocument::parse(&Value::String(raw))
            .map(|doc| doc.statements.iter().any(|s| s.has_wildcard_principal()))
            .unwrap_or(false);
        if !has_wildcard {
            return;
        }

        match self.buckets.delete_bucket_policy(bucket) {
            Ok(()) => actions_taken.push(format!("Deleted public bucket policy for {bucket}")),
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(bucket, error = %e, "Failed to delete bucket policy"),
        }
    }
}

impl Remediator for BlockPublicRemediator {
    fn name(&self) -> &'static str {
        "block_public"
    }

    fn remediate(&self, detection: &DetectionResult) -> RemediationResult {
        let bucket = detection.detail_str("bucket_name").unwrap_or("");
        if bucket.is_empty() {
            return RemediationResult::failed(
                "No bucket name found in details",
                "Missing bucket_name",
            );
        }

        if self.dry_run {
            info!(bucket, "Dry run: would block public access");
            return RemediationResult::dry_run(detection);
        }

        let mut actions_taken: Vec<String> = Vec::new();

        // The access block is the backstop; if it cannot be applied the bucket
        // is still exposed and this remediation has failed.
        if let Err(e) = self
            .buckets
            .put_public_access_block(bucket, &PublicAccessBlock::fully_enabled())
        {
            return RemediationResult::failed(
                format!("Failed to enable public access block for {bucket}"),
                e.to_string(),
            );
        }
        actions_taken.push(format!("Enabled public access block for {bucket}"));

        self.remove_wildcard_policy(bucket, &mut actions_taken);

        match self.buckets.put_bucket_acl(bucket, "private") {
            Ok(()) => actions_taken.push(format!("Set bucket ACL to private for {bucket}")),
            Err(e) => warn!(bucket, error = %e, "Failed to set bucket ACL"),
        }

        match self.buckets.delete_bucket_website(bucket) {
            Ok(()) => actions_taken.push(format!("Disabled website hosting for {bucket}")),
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(bucket, error = %e, "Failed to disable website hosting"),
        }

        info!(bucket, ?actions_taken, "Blocked public bucket access");
        let mut details = Details::new();
        details.insert("bucket_name".into(), json!(bucket));
        details.insert("actions_taken".into(), json!(actions_taken));
        RemediationResult::succeeded(
            format!("Successfully blocked public access for {bucket}"),
            "block_public_access",
            details,
        )
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{BucketState, MemoryBuckets};
    use crate::risk::Severity;
    use serde_json::json;

    fn detection(details: serde_json::Value) -> DetectionResult {
        DetectionResult {
            detector_name: "PublicBucketDetector".into(),
            is_threat: true,
            risk_score: 90.0,
            severity: Severity::Critical,
            details: details.as_object().cloned().unwrap_or_default(),
            recommended_actions: vec!["block_public".into()],
            auto_remediate: true,
        }
    }

    fn public_bucket_state() -> BucketState {
        let policy = json!({
            "Statement": [{"Effect": "Allow", "Principal": "*", "Action": "s3:GetObject"}]
        });
        BucketState {
            policy: Some(policy.to_string()),
            acl: "public-read".into(),
            website_enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn locks_down_every_exposure_surface() {
        let buckets = Arc::new(MemoryBuckets::new());
        buckets.seed("exposed", public_bucket_state());
        let r = BlockPublicRemediator::new(buckets.clone(), false);

        let result = r.remediate(&detection(json!({"bucket_name": "exposed"})));

        assert!(result.success);
        assert_eq!(result.action_taken.as_deref(), Some("block_public_access"));
        let state = buckets.state("exposed").unwrap();
        assert!(state.public_access_block.is_fully_enabled());
        assert!(state.policy.is_none());
        assert_eq!(state.acl, "private");
        assert!(!state.website_enabled);
    }

    #[test]
    fn non_wildcard_policy_is_left_in_place() {
        let policy = json!({
            "Statement": [{
                "Effect": "Allow",
                "Principal": {"AWS": "arn:aws:iam::123456789012:root"},
                "Action": "s3:GetObject"
            }]
        });
        let buckets = Arc::new(MemoryBuckets::new());
        buckets.seed(
            "scoped",
            BucketState {
                policy: Some(policy.to_string()),
                ..Default::default()
            },
        );
        let r = BlockPublicRemediator::new(buckets.clone(), false);

        let result = r.remediate(&detection(json!({"bucket_name": "scoped"})));

        assert!(result.success);
        assert!(buckets.state("scoped").unwrap().policy.is_some());
    }

    #[test]
    fn already_private_bucket_succeeds_twice() {
        let buckets = Arc::new(MemoryBuckets::new());
        buckets.seed("quiet", BucketState::default());
        let r = BlockPublicRemediator::new(buckets.clone(), false);

        let first = r.remediate(&detection(json!({"bucket_name": "quiet"})));
        let second = r.remediate(&detection(json!({"bucket_name": "quiet"})));

        assert!(first.success);
        assert!(second.success);
        assert!(buckets
            .state("quiet")
            .unwrap()
            .public_access_block
            .is_fully_enabled());
    }

    #[test]
    fn missing_bucket_name_fails() {
        let r = BlockPublicRemediator::new(Arc::new(MemoryBuckets::new()), false);
        let result = r.remediate(&detection(json!({})));
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Missing bucket_name"));
    }

    #[test]
    fn dry_run_leaves_bucket_untouched() {
        let buckets = Arc::new(MemoryBuckets::new());
        buckets.seed("exposed", public_bucket_state());
        let r = BlockPublicRemediator::new(buckets.clone(), true);

        let result = r.remediate(&detection(json!({"bucket_name": "exposed"})));

        assert!(result.success);
        assert_eq!(result.action_taken.as_deref(), Some("dry_run"));
        let state = buckets.state("exposed").unwrap();
        assert!(!state.public_access_block.is_fully_enabled());
        assert!(state.policy.is_some());
    }
}
