//! Activity baselines for machine identities.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

/// Learned behavior profile for a single machine identity.
#[derive(Debug, Clone, Default)]
pub struct ActivityBaseline {
    /// Unix timestamp of the last observed activity.
    pub last_activity: Option<i64>,
    pub typical_resources: HashSet<String>,
    pub typical_ips: HashSet<String>,
}

/// Source of activity baselines, keyed by principal ARN. Lookups are best
/// effort; an unknown principal simply has no baseline.
pub trait BaselineStore: Send + Sync {
    fn baseline_for(&self, principal_arn: &str) -> Option<ActivityBaseline>;
}

/// In-memory baseline store, seeded explicitly. Used for local mode and tests;
/// production deployments back this with a real profile table.
#[derive(Default)]
pub struct MemoryBaselines {
    profiles: RwLock<HashMap<String, ActivityBaseline>>,
}

impl MemoryBaselines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, principal_arn: &str, baseline: ActivityBaseline) {
        self.profiles
            .write()
            .insert(principal_arn.to_string(), baseline);
    }
}

impl BaselineStore for MemoryBaselines {
    fn baseline_for(&self, principal_arn: &str) -> Option<ActivityBaseline> {
        self.profiles.read().get(principal_arn).cloned()
    }
}
