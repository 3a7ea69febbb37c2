//! Per-event orchestration.
//!
//! Runs every enabled detector over an event, dispatches auto-remediation for
//! qualifying threats, consults the anomaly collaborator, optionally correlates
//! with identity governance, and publishes a report for noteworthy events.
//! Every step is isolated: a fault in one detector or collaborator never stops
//! the rest, and a well-formed report is always returned.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::anomaly::{AnomalyAnalyzer, AnomalyVerdict, NoopAnalyzer};
use crate::baseline::BaselineStore;
use crate::cloud::{BucketApi, IamApi};
use crate::config::MonitorConfig;
use crate::detectors::{
    AdminGrantDetector, CrossAccountDetector, Details, Detector, MachineIdentityDetector,
    PolicyChangeDetector, PublicBucketDetector,
};
use crate::dispatch::{DispatchOutcome, RemediationDispatcher};
use crate::governance::{with_auth_retry, IdentityGovernance};
use crate::publish::AlertPublisher;
use crate::remediators::{AlertTeamRemediator, BlockPublicRemediator, RevokeAccessRemediator};
use crate::risk::Severity;
use crate::event::IamEvent;

const GOVERNANCE_RETRY_ATTEMPTS: u32 = 3;
const GOVERNANCE_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Weights for the combined identity health score.
const DETECTION_WEIGHT: f64 = 0.4;
const GOVERNANCE_WEIGHT: f64 = 0.3;
const ANOMALY_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Serialize)]
pub struct DetectionRecord {
    pub detector: String,
    pub risk_score: f64,
    pub severity: Severity,
    pub details: Details,
    pub recommended_actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentityCorrelation {
    pub identity_found: bool,
    pub identity_name: Option<String>,
    pub identity_status: Option<String>,
    pub governance_risk_score: Option<f64>,
    /// 100 minus the weighted combined risk, floored at 0.
    pub identity_health_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub event_id: String,
    pub event_name: String,
    pub timestamp: String,
    pub detections: Vec<DetectionRecord>,
    pub remediations: Vec<DispatchOutcome>,
    pub ml_analysis: Option<AnomalyVerdict>,
    pub identity_correlation: Option<IdentityCorrelation>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProcessorStats {
    pub events_processed: u64,
    pub threats_detected: u64,
    pub anomalies_flagged: u64,
}

pub struct EventProcessor {
    detectors: Vec<Arc<dyn Detector>>,
    dispatcher: RemediationDispatcher,
    analyzer: Arc<dyn AnomalyAnalyzer>,
    governance: Option<Arc<dyn IdentityGovernance>>,
    publisher: Arc<dyn AlertPublisher>,
    auto_remediation: bool,
    events_processed: AtomicU64,
    threats_detected: AtomicU64,
    anomalies_flagged: AtomicU64,
}

impl EventProcessor {
    pub fn new(
        dispatcher: RemediationDispatcher,
        analyzer: Arc<dyn AnomalyAnalyzer>,
        publisher: Arc<dyn AlertPublisher>,
        auto_remediation: bool,
    ) -> Self {
        Self {
            detectors: Vec::new(),
            dispatcher,
            analyzer,
            governance: None,
            publisher,
            auto_remediation,
            events_processed: AtomicU64::new(0),
            threats_detected: AtomicU64::new(0),
            anomalies_flagged: AtomicU64::new(0),
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn with_governance(mut self, governance: Arc<dyn IdentityGovernance>) -> Self {
        self.governance = Some(governance);
        self
    }

    /// Wires the standard pipeline: detectors per config enable flags, the
    /// three remediators, and the anomaly stub.
    pub fn standard(
        config: Arc<MonitorConfig>,
        iam: Arc<dyn IamApi>,
        buckets: Arc<dyn BucketApi>,
        baselines: Arc<dyn BaselineStore>,
        publisher: Arc<dyn AlertPublisher>,
    ) -> Self {
        let mut dispatcher = RemediationDispatcher::new();
        dispatcher.register(Arc::new(RevokeAccessRemediator::new(
            iam,
            buckets.clone(),
            config.dry_run,
        )));
        dispatcher.register(Arc::new(BlockPublicRemediator::new(
            buckets,
            config.dry_run,
        )));
        dispatcher.register(Arc::new(AlertTeamRemediator::from_config(
            &config.alerts,
            config.dry_run,
        )));

        let mut processor = Self::new(
            dispatcher,
            Arc::new(NoopAnalyzer),
            publisher,
            config.auto_remediation,
        );

        if config.detectors.public_bucket {
            processor = processor.with_detector(Arc::new(PublicBucketDetector::new()));
        }
        if config.detectors.admin_grant {
            processor =
                processor.with_detector(Arc::new(AdminGrantDetector::new(config.clone())));
        }
        if config.detectors.policy_change {
            processor = processor.with_detector(Arc::new(PolicyChangeDetector::new()));
        }
        if config.detectors.cross_account {
            processor =
                processor.with_detector(Arc::new(CrossAccountDetector::new(config.clone())));
        }
        if config.detectors.machine_identity {
            processor = processor.with_detector(Arc::new(MachineIdentityDetector::new(
                config.clone(),
                baselines,
            )));
        }

        info!(
            detectors = processor.detectors.len(),
            auto_remediation = config.auto_remediation,
            dry_run = config.dry_run,
            "Event processor initialized"
        );
        processor
    }

    pub fn process_event(&self, event: &IamEvent) -> ProcessReport {
        self.events_processed.fetch_add(1, Ordering::Relaxed);

        let mut report = ProcessReport {
            event_id: event.event_id.clone().unwrap_or_default(),
            event_name: event.name().to_string(),
            timestamp: event.time().to_string(),
            detections: Vec::new(),
            remediations: Vec::new(),
            ml_analysis: None,
            identity_correlation: None,
            error: None,
        };

        self.run_detectors(event, &mut report);
        self.run_analyzer(event, &mut report);
        self.run_correlation(event, &mut report);
        self.publish_if_noteworthy(&mut report);

        report
    }

    fn run_detectors(&self, event: &IamEvent, report: &mut ProcessReport) {
        for detector in &self.detectors {
            // Detectors are fail-open by contract; the unwind guard covers the
            // remaining ways one could take the loop down.
            let outcome = catch_unwind(AssertUnwindSafe(|| detector.detect(event)));
            let result = match outcome {
                Ok(result) => result,
                Err(_) => {
                    error!(detector = detector.name(), "Detector panicked, skipping");
                    continue;
                }
            };

            if !result.is_threat {
                continue;
            }

            self.threats_detected.fetch_add(1, Ordering::Relaxed);
            warn!(
                detector = %result.detector_name,
                risk_score = result.risk_score,
                severity = result.severity.label(),
                event = %report.event_name,
                "Threat detected"
            );

            if self.auto_remediation && result.auto_remediate {
                report.remediations.push(self.dispatcher.dispatch(&result));
            }

            report.detections.push(DetectionRecord {
                detector: result.detector_name,
                risk_score: result.risk_score,
                severity: result.severity,
                details: result.details,
                recommended_actions: result.recommended_actions,
            });
        }
    }

    fn run_analyzer(&self, event: &IamEvent, report: &mut ProcessReport) {
        match self.analyzer.analyze(event) {
            Ok(verdict) => {
                if verdict.is_anomaly {
                    self.anomalies_flagged.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        score = verdict.anomaly_score,
                        event = %report.event_name,
                        "Anomalous event flagged"
                    );
                }
                report.ml_analysis = Some(verdict);
            }
            Err(e) => error!(error = %e, "Anomaly analysis failed"),
        }
    }

    fn run_correlation(&self, event: &IamEvent, report: &mut ProcessReport) {
        let Some(governance) = &self.governance else {
            return;
        };
        let Some(identity_id) = extract_identity_id(event) else {
            return;
        };

        let lookup = with_auth_retry(
            GOVERNANCE_RETRY_ATTEMPTS,
            GOVERNANCE_RETRY_BASE_DELAY,
            || governance.get_identity(&identity_id),
        );

        let record = match lookup {
            Ok(Some(record)) => record,
            Ok(None) => {
                report.identity_correlation = Some(IdentityCorrelation {
                    identity_found: false,
                    identity_name: None,
                    identity_status: None,
                    governance_risk_score: None,
                    identity_health_score: None,
                });
                return;
            }
            Err(e) => {
                error!(identity = %identity_id, error = %e, "Identity lookup failed");
                return;
            }
        };

        let governance_risk = match governance.identity_risk_score(&record.id) {
            Ok(score) => score,
            Err(e) => {
                error!(identity = %record.id, error = %e, "Governance risk lookup failed");
                0.0
            }
        };

        let detection_risk = report
            .detections
            .iter()
            .map(|d| d.risk_score)
            .fold(0.0, f64::max);
        let anomaly_risk = report
            .ml_analysis
            .as_ref()
            .map(|m| m.anomaly_score * 100.0)
            .unwrap_or(0.0);
        let combined = DETECTION_WEIGHT * detection_risk
            + GOVERNANCE_WEIGHT * governance_risk
            + ANOMALY_WEIGHT * anomaly_risk;

        report.identity_correlation = Some(IdentityCorrelation {
            identity_found: true,
            identity_name: Some(record.name),
            identity_status: Some(record.status),
            governance_risk_score: Some(governance_risk),
            identity_health_score: Some((100.0 - combined).max(0.0)),
        });
    }

    fn publish_if_noteworthy(&self, report: &mut ProcessReport) {
        let anomalous = report
            .ml_analysis
            .as_ref()
            .map(|m| m.is_anomaly)
            .unwrap_or(false);
        if report.detections.is_empty() && !anomalous {
            return;
        }

        let payload = match serde_json::to_vec(&report) {
            Ok(payload) => payload,
            Err(e) => {
                report.error = Some(format!("Failed to serialize report: {e}"));
                return;
            }
        };
        match self.publisher.publish(&payload) {
            Ok(message_id) => info!(%message_id, event = %report.event_name, "Report published"),
            Err(e) => {
                error!(error = %e, "Failed to publish report");
                report.error = Some(e.to_string());
            }
        }
    }

    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            threats_detected: self.threats_detected.load(Ordering::Relaxed),
            anomalies_flagged: self.anomalies_flagged.load(Ordering::Relaxed),
        }
    }
}

/// Best-effort identity reference for governance correlation.
fn extract_identity_id(event: &IamEvent) -> Option<String> {
    if let Some(principal_id) = event.user_identity.principal_id.as_deref() {
        if !principal_id.is_empty() {
            return Some(principal_id.to_string());
        }
    }
    if let Some(user_name) = event.user_identity.user_name.as_deref() {
        if !user_name.is_empty() {
            return Some(user_name.to_string());
        }
    }
    for key in ["user", "principal", "actor", "requestor"] {
        if let Some(value) = event.extra.get(key).and_then(Value::as_str) {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

// ── Tests ───────────────────────────────────────────────────────────────────
