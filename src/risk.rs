//! Risk fusion.
//!
//! Detectors accumulate named risk factors (each scored 0-100); fusion collapses
//! them into a single score and severity band. The score is the capped mean, so a
//! single weak signal cannot dominate and a pile of strong signals saturates at 100.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named factor scores produced by a single detection pass.
pub type RiskFactors = BTreeMap<String, f64>;

/// Severity band derived from the fused risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Severity::Critical
        } else if score >= 60.0 {
            Severity::High
        } else if score >= 40.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Fuses factor scores into `(risk_score, severity)`.
///
/// An empty factor map means nothing suspicious was observed and fuses to zero.
pub fn fuse(factors: &RiskFactors) -> (f64, Severity) {
    if factors.is_empty() {
        return (0.0, Severity::Low);
    }
    let sum: f64 = factors.values().sum();
    let score = (sum / factors.len() as f64).min(100.0);
    (score, Severity::from_score(score))
}

// ── Tests ───────────────────────────────────────────────────────────────────
