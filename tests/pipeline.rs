//! End-to-end pipeline tests over the in-memory cloud bindings.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use iam_immune::baseline::MemoryBaselines;
use iam_immune::cloud::{BucketState, MemoryBuckets, MemoryIam};
use iam_immune::config::MonitorConfig;
use iam_immune::event::IamEvent;
use iam_immune::processor::EventProcessor;
use iam_immune::publish::{AlertPublisher, PublishError};

struct CollectingPublisher {
    payloads: Mutex<Vec<serde_json::Value>>,
}

impl CollectingPublisher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            payloads: Mutex::new(Vec::new()),
        })
    }
}

impl AlertPublisher for CollectingPublisher {
    fn publish(&self, payload: &[u8]) -> Result<String, PublishError> {
        let value = serde_json::from_slice(payload)
            .map_err(|e| PublishError::Failed(e.to_string()))?;
        self.payloads.lock().push(value);
        Ok(format!("msg-{}", self.payloads.lock().len()))
    }
}

fn make_event(value: serde_json::Value) -> IamEvent {
    serde_json::from_value(value).unwrap()
}

fn standard_processor(
    config: MonitorConfig,
    iam: Arc<MemoryIam>,
    buckets: Arc<MemoryBuckets>,
    publisher: Arc<CollectingPublisher>,
) -> EventProcessor {
    EventProcessor::standard(
        Arc::new(config),
        iam,
        buckets,
        Arc::new(MemoryBaselines::new()),
        publisher,
    )
}

#[test]
fn public_bucket_event_is_detected_and_locked_down() {
    let iam = Arc::new(MemoryIam::new());
    let buckets = Arc::new(MemoryBuckets::new());
    buckets.seed(
        "open-data",
        BucketState {
            policy: Some(
                json!({
                    "Statement": [{"Effect": "Allow", "Principal": "*", "Action": "s3:GetObject"}]
                })
                .to_string(),
            ),
            acl: "public-read".into(),
            website_enabled: true,
            ..Default::default()
        },
    );
    let publisher = CollectingPublisher::new();
    let processor = standard_processor(
        MonitorConfig::default(),
        iam,
        buckets.clone(),
        publisher.clone(),
    );

    let report = processor.process_event(&make_event(json!({
        "eventID": "evt-bucket-1",
        "eventName": "DeleteBucketPublicAccessBlock",
        "eventTime": "2023-06-01T12:00:00Z",
        "userIdentity": {"type": "IAMUser", "arn": "arn:aws:iam::123456789012:user/mallory"},
        "requestParameters": {"bucketName": "open-data"}
    })));

    assert_eq!(report.detections.len(), 1);
    assert_eq!(report.detections[0].detector, "PublicBucketDetector");
    assert_eq!(report.remediations.len(), 1);

    // revoke_access, block_public, and alert_team all attempted; alerting has
    // no channels configured, so the dispatch reports the failure but the
    // bucket is still locked down.
    let dispatch = &report.remediations[0];
    assert_eq!(dispatch.actions_taken.len(), 3);
    assert!(!dispatch.success);
    assert_eq!(dispatch.errors.len(), 1);
    assert!(dispatch.errors[0].starts_with("alert_team:"));

    let state = buckets.state("open-data").unwrap();
    assert!(state.public_access_block.is_fully_enabled());
    assert!(state.policy.is_none());
    assert_eq!(state.acl, "private");
    assert!(!state.website_enabled);

    let payloads = publisher.payloads.lock();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["event_id"], "evt-bucket-1");
    assert_eq!(payloads[0]["detections"][0]["severity"], "critical");
}

#[test]
fn admin_grant_is_reverted_through_the_pipeline() {
    let iam = Arc::new(MemoryIam::new());
    iam.attach("bob", "arn:aws:iam::aws:policy/AdministratorAccess");
    let buckets = Arc::new(MemoryBuckets::new());
    let publisher = CollectingPublisher::new();
    let config = MonitorConfig {
        alerts: iam_immune::config::AlertConfig {
            alert_email: Some("security@example.com".into()),
            ..Default::default()
        },
        ..Default::default()
    };
    let processor = standard_processor(config, iam.clone(), buckets, publisher);

    let report = processor.process_event(&make_event(json!({
        "eventName": "AttachUserPolicy",
        "eventTime": "2023-06-01T12:00:00Z",
        "userIdentity": {"type": "IAMUser", "arn": "arn:aws:iam::123456789012:user/mallory"},
        "requestParameters": {
            "userName": "bob",
            "policyArn": "arn:aws:iam::aws:policy/AdministratorAccess"
        }
    })));

    assert_eq!(report.detections.len(), 1);
    let dispatch = &report.remediations[0];
    assert!(dispatch.success);
    assert_eq!(dispatch.actions_taken.len(), 2);
    assert!(!iam.is_attached("bob", "arn:aws:iam::aws:policy/AdministratorAccess"));
}

#[test]
fn dry_run_detects_but_mutates_nothing() {
    let iam = Arc::new(MemoryIam::new());
    iam.attach("bob", "arn:aws:iam::aws:policy/AdministratorAccess");
    let buckets = Arc::new(MemoryBuckets::new());
    let publisher = CollectingPublisher::new();
    let config = MonitorConfig {
        dry_run: true,
        ..Default::default()
    };
    let processor = standard_processor(config, iam.clone(), buckets, publisher);

    let report = processor.process_event(&make_event(json!({
        "eventName": "AttachUserPolicy",
        "eventTime": "2023-06-01T12:00:00Z",
        "userIdentity": {"type": "IAMUser", "arn": "arn:aws:iam::123456789012:user/mallory"},
        "requestParameters": {
            "userName": "bob",
            "policyArn": "arn:aws:iam::aws:policy/AdministratorAccess"
        }
    })));

    assert_eq!(report.detections.len(), 1);
    let dispatch = &report.remediations[0];
    assert!(dispatch.success);
    assert!(dispatch
        .actions_taken
        .iter()
        .all(|a| a.details.get("dry_run") == Some(&json!(true))));
    assert!(iam.is_attached("bob", "arn:aws:iam::aws:policy/AdministratorAccess"));
    assert!(iam.calls().is_empty());
}

#[test]
fn disabled_detector_stays_silent() {
    let iam = Arc::new(MemoryIam::new());
    let buckets = Arc::new(MemoryBuckets::new());
    let publisher = CollectingPublisher::new();
    let config = MonitorConfig {
        detectors: iam_immune::config::DetectorFlags {
            admin_grant: false,
            machine_identity: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let processor = standard_processor(config, iam, buckets, publisher.clone());

    let report = processor.process_event(&make_event(json!({
        "eventName": "AttachUserPolicy",
        "eventTime": "2023-06-01T12:00:00Z",
        "userIdentity": {"type": "IAMUser", "arn": "arn:aws:iam::123456789012:user/mallory"},
        "requestParameters": {
            "userName": "bob",
            "policyArn": "arn:aws:iam::aws:policy/AdministratorAccess"
        }
    })));

    assert!(report.detections.is_empty());
    assert!(publisher.payloads.lock().is_empty());
}

#[test]
fn benign_event_flows_through_quietly() {
    let iam = Arc::new(MemoryIam::new());
    let buckets = Arc::new(MemoryBuckets::new());
    let publisher = CollectingPublisher::new();
    let processor = standard_processor(
        MonitorConfig {
            trusted_accounts: vec!["123456789012".into()],
            ..Default::default()
        },
        iam,
        buckets,
        publisher.clone(),
    );

    let report = processor.process_event(&make_event(json!({
        "eventName": "GetCallerIdentity",
        "eventTime": "2023-06-01T12:00:00Z",
        "userIdentity": {"type": "IAMUser", "accountId": "123456789012"}
    })));

    assert!(report.detections.is_empty());
    assert!(report.remediations.is_empty());
    assert!(report.error.is_none());
    assert!(publisher.payloads.lock().is_empty());
    assert_eq!(processor.stats().events_processed, 1);
}
