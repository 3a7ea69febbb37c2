//! Statistical anomaly collaborator.
//!
//! The model itself lives outside this crate; the pipeline only consumes its
//! verdicts. [`NoopAnalyzer`] is the default binding and never flags anything.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::event::IamEvent;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Analyzer error: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnomalyVerdict {
    pub is_anomaly: bool,
    /// Model score in [0, 1].
    pub anomaly_score: f64,
    pub features: serde_json::Map<String, Value>,
}

pub trait AnomalyAnalyzer: Send + Sync {
    fn analyze(&self, event: &IamEvent) -> Result<AnomalyVerdict, AnalyzerError>;
}

/// Permanent no-signal verdict.
pub struct NoopAnalyzer;

impl AnomalyAnalyzer for NoopAnalyzer {
    fn analyze(&self, _event: &IamEvent) -> Result<AnomalyVerdict, AnalyzerError> {
        Ok(AnomalyVerdict::default())
    }
}
