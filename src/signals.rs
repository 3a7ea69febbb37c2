//! Context signals that need state this service does not keep.
//!
//! These checks require a historical event store or an external intelligence
//! feed. They are wired into the detectors as named extension points with a
//! permanent no-signal default, so supplying a real implementation later changes
//! scores without touching detector logic.

use crate::event::IamEvent;

/// Threat-intelligence reputation for a source address. No feed is wired in, so
/// nothing is ever flagged; provider-internal addresses are excluded up front.
pub fn ip_flagged(ip: &str) -> bool {
    if ip.is_empty() || ip.contains("amazonaws.com") || ip.contains("AWS Internal") {
        return false;
    }
    false
}

/// Burst detection over recent policy mutations by the same principal. Needs a
/// lookback store.
pub fn rapid_policy_changes(_event: &IamEvent) -> bool {
    false
}

/// Whether the caller accumulated access-denied errors shortly before this
/// event. Needs a lookback store.
pub fn recent_failed_attempts(_event: &IamEvent) -> bool {
    false
}

/// Age-based risk for the credential used in this event. Needs the key
/// inventory; scores zero until one is attached.
pub fn stale_key_risk(_event: &IamEvent) -> f64 {
    0.0
}
