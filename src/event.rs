//! Audit event model.
//!
//! Events arrive as semi-structured CloudTrail / GCP audit log records produced by
//! systems outside our control. Every field is optional and every accessor is
//! total: a malformed or truncated event must degrade to "no signal", never to a
//! parse failure mid-detection.

use chrono::{DateTime, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Off-hours window in UTC: 22:00 inclusive to 06:00 exclusive.
const OFF_HOURS_START: u32 = 22;
const OFF_HOURS_END: u32 = 6;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IamEvent {
    #[serde(rename = "eventID")]
    pub event_id: Option<String>,
    pub event_name: Option<String>,
    pub event_time: Option<String>,
    pub event_source: Option<String>,
    #[serde(rename = "sourceIPAddress")]
    pub source_ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub user_identity: UserIdentity,
    pub request_parameters: Value,
    pub response_elements: Value,
    pub resources: Vec<EventResource>,
    pub recipient_account_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Fields we do not model explicitly. Identity correlation probes these for
    /// free-form user references.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserIdentity {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub principal_id: Option<String>,
    pub arn: Option<String>,
    pub account_id: Option<String>,
    pub user_name: Option<String>,
    pub session_context: Option<SessionContext>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionContext {
    pub session_issuer: Option<SessionIssuer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionIssuer {
    pub user_name: Option<String>,
    pub arn: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventResource {
    #[serde(rename = "ARN", alias = "arn", default)]
    pub arn: Option<String>,
    #[serde(rename = "accountId", default)]
    pub account_id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl IamEvent {
    pub fn name(&self) -> &str {
        self.event_name.as_deref().unwrap_or("")
    }

    pub fn source(&self) -> &str {
        self.event_source.as_deref().unwrap_or("")
    }

    pub fn source_ip(&self) -> &str {
        self.source_ip_address.as_deref().unwrap_or("")
    }

    pub fn time(&self) -> &str {
        self.event_time.as_deref().unwrap_or("")
    }

    pub fn agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or("")
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.request_parameters.get(key)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(Value::as_str)
    }

    pub fn param_i64(&self, key: &str) -> Option<i64> {
        let v = self.param(key)?;
        v.as_i64()
            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    }

    /// Best available principal identifier: ARN, then principal id, then account.
    pub fn principal(&self) -> &str {
        self.user_identity
            .arn
            .as_deref()
            .or(self.user_identity.principal_id.as_deref())
            .or(self.user_identity.account_id.as_deref())
            .unwrap_or("")
    }

    /// Account that originated the call. Falls back from the explicit account id
    /// to the principal id prefix, then to the account field of the identity ARN.
    pub fn source_account(&self) -> String {
        if let Some(account) = self.user_identity.account_id.as_deref() {
            if !account.is_empty() {
                return account.to_string();
            }
        }
        if let Some(principal_id) = self.user_identity.principal_id.as_deref() {
            if let Some((prefix, _)) = principal_id.split_once(':') {
                if !prefix.is_empty() {
                    return prefix.to_string();
                }
            }
        }
        if let Some(arn) = self.user_identity.arn.as_deref() {
            return account_from_arn(arn);
        }
        String::new()
    }

    pub fn resource_arns(&self) -> Vec<&str> {
        self.resources
            .iter()
            .filter_map(|r| r.arn.as_deref())
            .collect()
    }

    pub fn has_error(&self) -> bool {
        self.error_code.is_some() || self.error_message.is_some()
    }

    pub fn occurred_off_hours(&self) -> bool {
        self.event_time
            .as_deref()
            .map(is_off_hours)
            .unwrap_or(false)
    }
}

/// Extracts the account field from an ARN (`arn:aws:iam::123456789012:role/x`).
pub fn account_from_arn(arn: &str) -> String {
    if !arn.contains("arn:aws:") {
        return String::new();
    }
    arn.split(':').nth(4).unwrap_or("").to_string()
}

/// UTC hour test against the off-hours window. Unparseable timestamps count as
/// business hours.
pub fn is_off_hours(timestamp: &str) -> bool {
    let hour = if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        dt.to_utc().hour()
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f") {
        naive.hour()
    } else {
        return false;
    };
    hour >= OFF_HOURS_START || hour < OFF_HOURS_END
}

// ── Tests ───────────────────────────────────────────────────────────────────
