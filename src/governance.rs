//! Identity governance collaborator.
//!
//! An external governance product (identity inventory, certification state,
//! per-identity risk) can enrich detections with a combined health score. Only
//! the interface lives here; authentication failures at the boundary get a
//! bounded retry with exponential backoff, nothing else is retried.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Governance API error: {0}")]
    Api(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentityRecord {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub status: String,
    pub department: Option<String>,
}

pub trait IdentityGovernance: Send + Sync {
    fn get_identity(&self, identity_id: &str) -> Result<Option<IdentityRecord>, GovernanceError>;
    /// Governance-side risk score in [0, 100].
    fn identity_risk_score(&self, identity_id: &str) -> Result<f64, GovernanceError>;
}

/// Retries `op` on authentication errors only, with exponential backoff.
/// Other errors and successes return immediately.
pub fn with_auth_retry<T>(
    max_attempts: u32,
    base_delay: Duration,
    mut op: impl FnMut() -> Result<T, GovernanceError>,
) -> Result<T, GovernanceError> {
    let mut delay = base_delay;
    let mut attempt = 1;
    loop {
        match op() {
            Err(GovernanceError::Auth(reason)) if attempt < max_attempts => {
                warn!(attempt, error = %reason, "Governance auth failed, retrying");
                std::thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            other => return other,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
