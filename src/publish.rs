//! Downstream publication boundary.
//!
//! Reports for noteworthy events (detections or anomalies) are handed to an
//! [`AlertPublisher`] fire-and-forget. The default binding logs locally;
//! deployments swap in a queue-backed implementation.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Publish failed: {0}")]
    Failed(String),
}

pub trait AlertPublisher: Send + Sync {
    /// Publishes a serialized report and returns a message id.
    fn publish(&self, payload: &[u8]) -> Result<String, PublishError>;
}

/// Logs the payload and mints a local id.
#[derive(Default)]
pub struct LogPublisher {
    next_id: AtomicU64,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertPublisher for LogPublisher {
    fn publish(&self, payload: &[u8]) -> Result<String, PublishError> {
        let id = format!("local-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        info!(message_id = %id, bytes = payload.len(), "Published detection report");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_publisher_mints_unique_ids() {
        let publisher = LogPublisher::new();
        let a = publisher.publish(b"{}").unwrap();
        let b = publisher.publish(b"{}").unwrap();
        assert_ne!(a, b);
    }
}
