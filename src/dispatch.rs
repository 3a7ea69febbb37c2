//! Remediation dispatch.
//!
//! Maps the action names a detector recommends onto registered remediators and
//! runs them in order. Actions without a registration are operator hints (for
//! example `verify_source_ip`) and are skipped with a log line, not treated as
//! failures. A failed action never stops the remaining actions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::detectors::DetectionResult;
use crate::remediators::Remediator;

#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    pub action: String,
    pub success: bool,
    pub message: String,
    pub details: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub actions_taken: Vec<ActionRecord>,
    /// AND over the attempted actions; true when none were attempted.
    pub success: bool,
    pub errors: Vec<String>,
}

#[derive(Default)]
pub struct RemediationDispatcher {
    registry: HashMap<String, Arc<dyn Remediator>>,
    dispatched: AtomicU64,
    failed: AtomicU64,
}

impl RemediationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, remediator: Arc<dyn Remediator>) {
        self.registry
            .insert(remediator.name().to_string(), remediator);
    }

    pub fn registered_actions(&self) -> Vec<&str> {
        self.registry.keys().map(String::as_str).collect()
    }

    /// Runs every recommended action in order. Recommendations are taken as
    /// given: no deduplication, no reordering.
    pub fn dispatch(&self, detection: &DetectionResult) -> DispatchOutcome {
        let mut outcome = DispatchOutcome {
            actions_taken: Vec::new(),
            success: true,
            errors: Vec::new(),
        };

        for action in &detection.recommended_actions {
            let Some(remediator) = self.registry.get(action) else {
                warn!(action = %action, "No remediator registered for action, skipping");
                continue;
            };

            self.dispatched.fetch_add(1, Ordering::Relaxed);
            let result = remediator.remediate(detection);

            if result.success {
                info!(action = %action, message = %result.message, "Remediation succeeded");
            } else {
                self.failed.fetch_add(1, Ordering::Relaxed);
                let error = result.error.clone().unwrap_or_else(|| result.message.clone());
                warn!(action = %action, error = %error, "Remediation failed");
                outcome.success = false;
                outcome.errors.push(format!("{action}: {error}"));
            }

            outcome.actions_taken.push(ActionRecord {
                action: action.clone(),
                success: result.success,
                message: result.message,
                details: result.details,
            });
        }

        outcome
    }

    pub fn stats(&self) -> (u64, u64) {
        (
            self.dispatched.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
