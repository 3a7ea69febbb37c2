//! Access revocation.
//!
//! Undoes the specific grant a detection describes. The strategy depends on
//! which detector fired: privilege grants are detached or deleted exactly as
//! they were made, assumed roles get an emergency deny policy, and exposed
//! buckets are reverted to private.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::cloud::{BucketApi, IamApi};
use crate::detectors::DetectionResult;
use crate::remediators::{Details, RemediationResult, Remediator};

const DENY_ALL_POLICY: &str = r#"{
  "Version": "2012-10-17",
  "Statement": [
    {
      "Effect": "Deny",
      "Action": "*",
      "Resource": "*"
    }
  ]
}"#;

pub struct RevokeAccessRemediator {
    iam: Arc<dyn IamApi>,
    buckets: Arc<dyn BucketApi>,
    dry_run: bool,
}

impl RevokeAccessRemediator {
    pub fn new(iam: Arc<dyn IamApi>, buckets: Arc<dyn BucketApi>, dry_run: bool) -> Self {
        Self {
            iam,
            buckets,
            dry_run,
        }
    }

    fn revoke_iam_grant(&self, detection: &DetectionResult) -> RemediationResult {
        let event_name = detection.detail_str("event_name").unwrap_or("");
        let params = detection
            .details
            .get("request_parameters")
            .cloned()
            .unwrap_or(Value::Null);
        let param = |key: &str| params.get(key).and_then(Value::as_str).unwrap_or("");

        let mut actions_taken: Vec<String> = Vec::new();

        match event_name {
            "AttachUserPolicy" | "AttachRolePolicy" | "AttachGroupPolicy" => {
                let policy_arn = param("policyArn");
                let entity = match event_name {
                    "AttachUserPolicy" => param("userName"),
                    "AttachRolePolicy" => param("roleName"),
                    _ => param("groupName"),
                };
                if !entity.is_empty() && !policy_arn.is_empty() {
                    let outcome = match event_name {
                        "AttachUserPolicy" => self.iam.detach_user_policy(entity, policy_arn),
                        "AttachRolePolicy" => self.iam.detach_role_policy(entity, policy_arn),
                        _ => self.iam.detach_group_policy(entity, policy_arn),
                    };
                    if let Err(e) = outcome {
                        return RemediationResult::failed(
                            "Cloud API error revoking IAM permissions",
                            e.to_string(),
                        );
                    }
                    actions_taken.push(format!("Detached policy {policy_arn} from {entity}"));
                }
            }
            "PutUserPolicy" | "PutRolePolicy" | "PutGroupPolicy" => {
                let entity = [param("userName"), param("roleName"), param("groupName")]
                    .into_iter()
                    .find(|v| !v.is_empty())
                    .unwrap_or("");
                let policy_name = param("policyName");
                if !entity.is_empty() && !policy_name.is_empty() {
                    let outcome = if event_name == "PutUserPolicy" {
                        self.iam.delete_user_policy(entity, policy_name)
                    } else if event_name == "PutRolePolicy" {
                        self.iam.delete_role_policy(entity, policy_name)
                    } else {
                        self.iam.delete_group_policy(entity, policy_name)
                    };
                    if let Err(e) = outcome {
                        return RemediationResult::failed(
                            "Cloud API error revoking IAM permissions",
                            e.to_string(),
                        );
                    }
                    actions_taken.push(format!(
                        "Deleted inline policy {policy_name} from {entity}"
                    ));
                }
            }
            "CreateAccessKey" => {
                // The new key id only appears in response elements, which the
                // detection does not carry. Deleting it needs a key inventory
                // lookup; until then this stays a manual follow-up.
                let user = param("userName");
                actions_taken.push(format!("Flagged new access key for user {user} for review"));
            }
            _ => {}
        }

        if actions_taken.is_empty() {
            return RemediationResult::failed(
                "No actions taken",
                "Unable to determine remediation action",
            );
        }

        info!(?actions_taken, "Revoked IAM permissions");
        let mut details = Details::new();
        details.insert("actions_taken".into(), json!(actions_taken));
        RemediationResult::succeeded(
            "Successfully revoked IAM permissions",
            "revoke_iam_permissions",
            details,
        )
    }

    fn deny_assumed_role(&self, detection: &DetectionResult) -> RemediationResult {
        // An issued STS session cannot be revoked directly; denying the role
        // blocks further use while the session ages out.
        let assumed_role = detection.detail_str("assumed_role").unwrap_or("");
        if assumed_role.is_empty() {
            return RemediationResult::failed(
                "No assumed role found in details",
                "Missing assumed_role",
            );
        }

        let role_name = assumed_role.rsplit('/').next().unwrap_or(assumed_role);
        let policy_name = format!("EmergencyDeny-{}", Utc::now().timestamp());

        if let Err(e) = self
            .iam
            .put_role_policy(role_name, &policy_name, DENY_ALL_POLICY)
        {
            error!(role = role_name, error = %e, "Failed to attach emergency deny policy");
            return RemediationResult::failed(
                "Cloud API error revoking assumed role",
                e.to_string(),
            );
        }

        info!(role = role_name, policy = %policy_name, "Attached emergency deny policy");
        let mut details = Details::new();
        details.insert("role_name".into(), json!(role_name));
        details.insert("policy_name".into(), json!(policy_name));
        details.insert(
            "note".into(),
            json!("Active sessions may still have cached permissions"),
        );
        RemediationResult::succeeded(
            format!("Attached emergency deny policy to role {role_name}"),
            "attach_emergency_deny_policy",
            details,
        )
    }

    fn revoke_bucket_access(&self, detection: &DetectionResult) -> RemediationResult {
        let bucket = detection.detail_str("bucket_name").unwrap_or("");
        if bucket.is_empty() {
            return RemediationResult::failed(
                "No bucket name found in details",
                "Missing bucket_name",
            );
        }

        let mut actions_taken: Vec<String> = Vec::new();

        match self.buckets.delete_bucket_policy(bucket) {
            Ok(()) => actions_taken.push(format!("Deleted bucket policy for {bucket}")),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                return RemediationResult::failed(
                    "Cloud API error revoking bucket permissions",
                    e.to_string(),
                );
            }
        }

        match self.buckets.put_bucket_acl(bucket, "private") {
            Ok(()) => actions_taken.push(format!("Set bucket ACL to private for {bucket}")),
            Err(e) => warn!(bucket, error = %e, "Failed to set bucket ACL"),
        }

        info!(bucket, ?actions_taken, "Revoked bucket permissions");
        let mut details = Details::new();
        details.insert("bucket_name".into(), json!(bucket));
        details.insert("actions_taken".into(), json!(actions_taken));
        RemediationResult::succeeded(
            format!("Successfully revoked bucket permissions for {bucket}"),
            "revoke_bucket_permissions",
            details,
        )
    }
}

impl Remediator for RevokeAccessRemediator {
    fn name(&self) -> &'static str {
        "revoke_access"
    }

    fn remediate(&self, detection: &DetectionResult) -> RemediationResult {
        if self.dry_run {
            info!(detector = %detection.detector_name, "Dry run: would revoke access");
            return RemediationResult::dry_run(detection);
        }

        let detector = detection.detector_name.as_str();
        if detector.contains("AdminGrant") {
            self.revoke_iam_grant(detection)
        } else if detector.contains("CrossAccount") {
            self.deny_assumed_role(detection)
        } else if detector.contains("PublicBucket") {
            self.revoke_bucket_access(detection)
        } else {
            RemediationResult::failed(
                format!("Unknown detector type: {detector}"),
                "Unsupported detector type",
            )
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
