//! Runtime configuration.
//!
//! A `MonitorConfig` is built once at startup, from a TOML file or from the
//! environment, and shared read-only via `Arc`. Every field has a conservative
//! default so the pipeline starts with an empty configuration.

use std::env;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{MonitorError, MonitorResult};

fn default_true() -> bool {
    true
}

fn default_dormant_days() -> i64 {
    30
}

fn default_key_rotation_days() -> i64 {
    90
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub detectors: DetectorFlags,
    /// Principals exempt from admin-grant detection (break-glass roles,
    /// provisioning automation). Compared exactly against the caller principal,
    /// so entries must be full ARNs (or the principal id / account id the event
    /// falls back to).
    pub whitelisted_principals: Vec<String>,
    /// Accounts allowed to assume roles or receive events cross-account.
    pub trusted_accounts: Vec<String>,
    /// IP prefixes of known CI/CD runners.
    pub cicd_ip_ranges: Vec<String>,
    /// When set, remediators report success without touching anything.
    pub dry_run: bool,
    /// Global switch for dispatching remediations from the processor.
    #[serde(default = "default_true")]
    pub auto_remediation: bool,
    /// Days of inactivity after which a machine identity counts as dormant.
    #[serde(default = "default_dormant_days")]
    pub dormant_threshold_days: i64,
    /// Maximum acceptable service-account key age in days.
    #[serde(default = "default_key_rotation_days")]
    pub key_rotation_threshold_days: i64,
    pub alerts: AlertConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorFlags {
    #[serde(default = "default_true")]
    pub public_bucket: bool,
    #[serde(default = "default_true")]
    pub admin_grant: bool,
    #[serde(default = "default_true")]
    pub policy_change: bool,
    #[serde(default = "default_true")]
    pub cross_account: bool,
    #[serde(default = "default_true")]
    pub machine_identity: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub slack_webhook_url: Option<String>,
    pub teams_webhook_url: Option<String>,
    pub alert_email: Option<String>,
}

impl Default for DetectorFlags {
    fn default() -> Self {
        Self {
            public_bucket: true,
            admin_grant: true,
            policy_change: true,
            cross_account: true,
            machine_identity: true,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            detectors: DetectorFlags::default(),
            whitelisted_principals: Vec::new(),
            trusted_accounts: Vec::new(),
            cicd_ip_ranges: Vec::new(),
            dry_run: false,
            auto_remediation: true,
            dormant_threshold_days: default_dormant_days(),
            key_rotation_threshold_days: default_key_rotation_days(),
            alerts: AlertConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Loads configuration from a TOML file. A missing file is not an error:
    /// defaults are used so the monitor can run unconfigured.
    pub fn load(path: &Path) -> MonitorResult<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: MonitorConfig = toml::from_str(&raw)
            .map_err(|e| MonitorError::Config(format!("Failed to parse config: {e}")))?;

        info!(path = %path.display(), "Loaded monitor configuration");
        Ok(config)
    }

    /// Builds configuration from environment variables. List-valued settings are
    /// comma-separated.
    pub fn from_env() -> Self {
        Self {
            detectors: DetectorFlags {
                public_bucket: env_bool("ENABLE_PUBLIC_BUCKET_DETECTION", true),
                admin_grant: env_bool("ENABLE_ADMIN_GRANT_DETECTION", true),
                policy_change: env_bool("ENABLE_POLICY_CHANGE_DETECTION", true),
                cross_account: env_bool("ENABLE_CROSS_ACCOUNT_DETECTION", true),
                machine_identity: env_bool("ENABLE_MACHINE_IDENTITY_DETECTION", true),
            },
            whitelisted_principals: env_list("WHITELISTED_PRINCIPALS"),
            trusted_accounts: env_list("TRUSTED_ACCOUNTS"),
            cicd_ip_ranges: env_list("CICD_IP_RANGES"),
            dry_run: env_bool("REMEDIATION_DRY_RUN", false),
            auto_remediation: env_bool("AUTO_REMEDIATION", true),
            dormant_threshold_days: env_i64("DORMANT_THRESHOLD_DAYS", default_dormant_days()),
            key_rotation_threshold_days: env_i64(
                "KEY_ROTATION_THRESHOLD_DAYS",
                default_key_rotation_days(),
            ),
            alerts: AlertConfig {
                slack_webhook_url: env::var("SLACK_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
                teams_webhook_url: env::var("TEAMS_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
                alert_email: env::var("ALERT_EMAIL").ok().filter(|s| !s.is_empty()),
            },
        }
    }

    pub fn is_whitelisted(&self, principal: &str) -> bool {
        !principal.is_empty()
            && self
                .whitelisted_principals
                .iter()
                .any(|w| w == principal)
    }

    pub fn is_trusted_account(&self, account: &str) -> bool {
        self.trusted_accounts.iter().any(|a| a == account)
    }

    pub fn is_known_cicd_ip(&self, ip: &str) -> bool {
        !ip.is_empty()
            && self
                .cicd_ip_ranges
                .iter()
                .any(|prefix| !prefix.is_empty() && ip.starts_with(prefix.as_str()))
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(name: &str) -> Vec<String> {
    env::var(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ── Tests ───────────────────────────────────────────────────────────────────
