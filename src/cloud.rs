//! Cloud control-plane seam.
//!
//! Remediators mutate IAM and S3 through these traits rather than a concrete
//! SDK, so the pipeline runs identically against the real control plane, the
//! in-memory implementations below (local mode), or test doubles.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

pub trait IamApi: Send + Sync {
    fn detach_user_policy(&self, user: &str, policy_arn: &str) -> Result<(), ApiError>;
    fn detach_role_policy(&self, role: &str, policy_arn: &str) -> Result<(), ApiError>;
    fn detach_group_policy(&self, group: &str, policy_arn: &str) -> Result<(), ApiError>;
    fn delete_user_policy(&self, user: &str, policy_name: &str) -> Result<(), ApiError>;
    fn delete_role_policy(&self, role: &str, policy_name: &str) -> Result<(), ApiError>;
    fn delete_group_policy(&self, group: &str, policy_name: &str) -> Result<(), ApiError>;
    fn put_role_policy(&self, role: &str, policy_name: &str, document: &str)
        -> Result<(), ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicAccessBlock {
    pub block_public_acls: bool,
    pub ignore_public_acls: bool,
    pub block_public_policy: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlock {
    pub fn fully_enabled() -> Self {
        Self {
            block_public_acls: true,
            ignore_public_acls: true,
            block_public_policy: true,
            restrict_public_buckets: true,
        }
    }

    pub fn is_fully_enabled(&self) -> bool {
        self.block_public_acls
            && self.ignore_public_acls
            && self.block_public_policy
            && self.restrict_public_buckets
    }
}

impl Default for PublicAccessBlock {
    fn default() -> Self {
        Self {
            block_public_acls: false,
            ignore_public_acls: false,
            block_public_policy: false,
            restrict_public_buckets: false,
        }
    }
}

pub trait BucketApi: Send + Sync {
    fn put_public_access_block(
        &self,
        bucket: &str,
        config: &PublicAccessBlock,
    ) -> Result<(), ApiError>;
    /// Returns `NotFound` when the bucket has no policy.
    fn get_bucket_policy(&self, bucket: &str) -> Result<String, ApiError>;
    fn delete_bucket_policy(&self, bucket: &str) -> Result<(), ApiError>;
    fn put_bucket_acl(&self, bucket: &str, acl: &str) -> Result<(), ApiError>;
    /// Returns `NotFound` when website hosting is not configured.
    fn delete_bucket_website(&self, bucket: &str) -> Result<(), ApiError>;
}

// ── In-memory implementations ───────────────────────────────────────────────

/// Records every IAM mutation. Detach and delete calls require the attachment
/// to exist, matching control-plane behavior.
#[derive(Default)]
pub struct MemoryIam {
    attachments: RwLock<Vec<(String, String)>>,
    inline_policies: RwLock<HashMap<(String, String), String>>,
    calls: RwLock<Vec<String>>,
}

impl MemoryIam {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, entity: &str, policy_arn: &str) {
        self.attachments
            .write()
            .push((entity.to_string(), policy_arn.to_string()));
    }

    pub fn put_inline(&self, entity: &str, policy_name: &str, document: &str) {
        self.inline_policies.write().insert(
            (entity.to_string(), policy_name.to_string()),
            document.to_string(),
        );
    }

    pub fn is_attached(&self, entity: &str, policy_arn: &str) -> bool {
        self.attachments
            .read()
            .iter()
            .any(|(e, p)| e == entity && p == policy_arn)
    }

    pub fn inline_policy(&self, entity: &str, policy_name: &str) -> Option<String> {
        self.inline_policies
            .read()
            .get(&(entity.to_string(), policy_name.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.read().clone()
    }

    fn record(&self, call: String) {
        self.calls.write().push(call);
    }

    fn detach(&self, entity: &str, policy_arn: &str, op: &str) -> Result<(), ApiError> {
        self.record(format!("{op}:{entity}:{policy_arn}"));
        let mut attachments = self.attachments.write();
        let before = attachments.len();
        attachments.retain(|(e, p)| !(e == entity && p == policy_arn));
        if attachments.len() == before {
            return Err(ApiError::NotFound(format!(
                "attachment {policy_arn} on {entity}"
            )));
        }
        info!(entity, policy_arn, "Detached managed policy");
        Ok(())
    }

    fn delete_inline(&self, entity: &str, policy_name: &str, op: &str) -> Result<(), ApiError> {
        self.record(format!("{op}:{entity}:{policy_name}"));
        let removed = self
            .inline_policies
            .write()
            .remove(&(entity.to_string(), policy_name.to_string()));
        if removed.is_none() {
            return Err(ApiError::NotFound(format!(
                "inline policy {policy_name} on {entity}"
            )));
        }
        info!(entity, policy_name, "Deleted inline policy");
        Ok(())
    }
}

impl IamApi for MemoryIam {
    fn detach_user_policy(&self, user: &str, policy_arn: &str) -> Result<(), ApiError> {
        self.detach(user, policy_arn, "detach_user_policy")
    }

    fn detach_role_policy(&self, role: &str, policy_arn: &str) -> Result<(), ApiError> {
        self.detach(role, policy_arn, "detach_role_policy")
    }

    fn detach_group_policy(&self, group: &str, policy_arn: &str) -> Result<(), ApiError> {
        self.detach(group, policy_arn, "detach_group_policy")
    }

    fn delete_user_policy(&self, user: &str, policy_name: &str) -> Result<(), ApiError> {
        self.delete_inline(user, policy_name, "delete_user_policy")
    }

    fn delete_role_policy(&self, role: &str, policy_name: &str) -> Result<(), ApiError> {
        self.delete_inline(role, policy_name, "delete_role_policy")
    }

    fn delete_group_policy(&self, group: &str, policy_name: &str) -> Result<(), ApiError> {
        self.delete_inline(group, policy_name, "delete_group_policy")
    }

    fn put_role_policy(
        &self,
        role: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), ApiError> {
        self.record(format!("put_role_policy:{role}:{policy_name}"));
        self.put_inline(role, policy_name, document);
        info!(role, policy_name, "Attached inline policy");
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct BucketState {
    pub public_access_block: PublicAccessBlock,
    pub policy: Option<String>,
    pub acl: String,
    pub website_enabled: bool,
}

/// In-memory bucket control plane.
#[derive(Default)]
pub struct MemoryBuckets {
    buckets: RwLock<HashMap<String, BucketState>>,
}

impl MemoryBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, bucket: &str, state: BucketState) {
        self.buckets.write().insert(bucket.to_string(), state);
    }

    pub fn state(&self, bucket: &str) -> Option<BucketState> {
        self.buckets.read().get(bucket).cloned()
    }
}

impl BucketApi for MemoryBuckets {
    fn put_public_access_block(
        &self,
        bucket: &str,
        config: &PublicAccessBlock,
    ) -> Result<(), ApiError> {
        let mut buckets = self.buckets.write();
        buckets.entry(bucket.to_string()).or_default().public_access_block = *config;
        info!(bucket, "Applied public access block");
        Ok(())
    }

    fn get_bucket_policy(&self, bucket: &str) -> Result<String, ApiError> {
        self.buckets
            .read()
            .get(bucket)
            .and_then(|s| s.policy.clone())
            .ok_or_else(|| ApiError::NotFound(format!("bucket policy for {bucket}")))
    }

    fn delete_bucket_policy(&self, bucket: &str) -> Result<(), ApiError> {
        let mut buckets = self.buckets.write();
        let state = buckets
            .get_mut(bucket)
            .ok_or_else(|| ApiError::NotFound(format!("bucket {bucket}")))?;
        if state.policy.take().is_none() {
            return Err(ApiError::NotFound(format!("bucket policy for {bucket}")));
        }
        info!(bucket, "Deleted bucket policy");
        Ok(())
    }

    fn put_bucket_acl(&self, bucket: &str, acl: &str) -> Result<(), ApiError> {
        let mut buckets = self.buckets.write();
        buckets.entry(bucket.to_string()).or_default().acl = acl.to_string();
        info!(bucket, acl, "Applied bucket ACL");
        Ok(())
    }

    fn delete_bucket_website(&self, bucket: &str) -> Result<(), ApiError> {
        let mut buckets = self.buckets.write();
        let state = buckets
            .get_mut(bucket)
            .ok_or_else(|| ApiError::NotFound(format!("bucket {bucket}")))?;
        if !state.website_enabled {
            return Err(ApiError::NotFound(format!(
                "website configuration for {bucket}"
            )));
        }
        state.website_enabled = false;
        info!(bucket, "Disabled website hosting");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detach_requires_existing_attachment() {
        let iam = MemoryIam::new();
        iam.attach("alice", "arn:aws:iam::aws:policy/AdministratorAccess");

        assert!(iam
            .detach_user_policy("alice", "arn:aws:iam::aws:policy/AdministratorAccess")
            .is_ok());
        assert!(iam
            .detach_user_policy("alice", "arn:aws:iam::aws:policy/AdministratorAccess")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn bucket_policy_lifecycle() {
        let buckets = MemoryBuckets::new();
        buckets.seed(
            "b",
            BucketState {
                policy: Some("{}".into()),
                ..Default::default()
            },
        );

        assert_eq!(buckets.get_bucket_policy("b").unwrap(), "{}");
        assert!(buckets.delete_bucket_policy("b").is_ok());
        assert!(buckets.get_bucket_policy("b").unwrap_err().is_not_found());
        assert!(buckets.delete_bucket_policy("b").unwrap_err().is_not_found());
    }
}
