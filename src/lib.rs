//! # IAM Immune System
//!
//! Detection and auto-remediation pipeline for cloud IAM audit events.
//!
//! Audit records flow through an [`processor::EventProcessor`], which runs a
//! configured set of [`detectors`] (public bucket exposure, privilege grants,
//! policy lifecycle changes, cross-account access, machine identity abuse),
//! fuses per-detector risk factors into a score and severity, and hands
//! qualifying threats to a [`dispatch::RemediationDispatcher`] that executes
//! the recommended [`remediators`] (revoke access, block public access, alert
//! the team). Reports for noteworthy events are published downstream.
//!
//! Detectors and remediators are fail-open: malformed or hostile input degrades
//! to zero risk or a failed remediation record, never to a crash. Cloud
//! mutations, anomaly analysis, identity governance, and publication are traits
//! so the pipeline runs unchanged against real infrastructure, the in-memory
//! bindings, or test doubles.

pub mod alert;
pub mod anomaly;
pub mod baseline;
pub mod cloud;
pub mod config;
pub mod detectors;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod governance;
pub mod policy;
pub mod processor;
pub mod publish;
pub mod remediators;
pub mod risk;
pub mod signals;

pub use config::MonitorConfig;
pub use detectors::{DetectionResult, Detector};
pub use error::{MonitorError, MonitorResult};
pub use event::IamEvent;
pub use processor::{EventProcessor, ProcessReport};
pub use remediators::{RemediationResult, Remediator};
pub use risk::Severity;
