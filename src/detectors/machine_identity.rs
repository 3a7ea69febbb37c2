//! Machine identity abuse detection.
//!
//! Service accounts, CI/CD runners, and workload roles behave predictably, so
//! deviations carry more signal than they would for humans: reactivated dormant
//! accounts, access outside the learned resource scope, calls from unknown
//! addresses, privilege escalation by automation, and impersonation chains.
//! Behavior profiles come from an injected [`BaselineStore`].

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::baseline::BaselineStore;
use crate::config::MonitorConfig;
use crate::detectors::{base_details, verdict, Detector, DetectionResult};
use crate::event::IamEvent;
use crate::risk::RiskFactors;
use crate::signals;

const NAME: &str = "MachineIdentityDetector";

const MONITORED_ACTIONS: &[&str] = &[
    "CreateServiceAccount",
    "DeleteServiceAccount",
    "UpdateServiceAccount",
    "SetIamPolicy",
    "CreateAccessKey",
    "DeleteAccessKey",
    "UpdateAccessKey",
    "RotateAccessKey",
    "CreateServiceAccountKey",
    "DeleteServiceAccountKey",
    "AssumeRole",
    "AssumeRoleWithWebIdentity",
    "AssumeRoleWithSAML",
    "GetSessionToken",
    "GetFederationToken",
    "CreateOIDCToken",
    "SignJwt",
    "SignBlob",
    "GenerateAccessToken",
    "ImpersonateServiceAccount",
];

const MACHINE_IDENTITY_TYPES: &[&str] =
    &["AssumedRole", "FederatedUser", "WebIdentityUser", "SAMLUser"];

/// Name fragments that mark non-human principals across AWS and GCP.
const MACHINE_NAME_PATTERNS: &[&str] = &[
    "service-account",
    "svc-",
    "sa-",
    "bot-",
    "automation-",
    "ci-",
    "cd-",
    "pipeline-",
    "lambda-",
    "function-",
    "worker-",
    "agent-",
    "system-",
    "app-",
    "integration-",
];

const ESCALATION_ACTIONS: &[&str] = &[
    "AttachRolePolicy",
    "PutRolePolicy",
    "UpdateAssumeRolePolicy",
    "PassRole",
    "CreatePolicyVersion",
    "SetDefaultPolicyVersion",
];

/// `service:Action` pairs matched by substring in either direction, so both
/// `kms:Decrypt` and a fully qualified GCP method name hit.
const HIGH_RISK_ACTIONS: &[&str] = &[
    "secretsmanager:GetSecretValue",
    "kms:Decrypt",
    "kms:ScheduleKeyDeletion",
    "iam:PassRole",
    "iam:CreateAccessKey",
    "iam:AttachUserPolicy",
    "iam:PutRolePolicy",
    "s3:PutBucketPolicy",
    "cloudtrail:StopLogging",
];

const BOT_AGENT_INDICATORS: &[&str] =
    &["bot", "automation", "script", "curl", "python", "java", "go-http"];

const CICD_NAME_INDICATORS: &[&str] = &[
    "ci-",
    "cd-",
    "pipeline-",
    "jenkins",
    "gitlab",
    "github",
    "circleci",
    "travis",
];

/// Actions CI/CD credentials have no business performing.
const UNUSUAL_CICD_ACTIONS: &[&str] = &["CreateAccessKey", "DeleteUser", "AttachUserPolicy"];

const CLOUD_PROVIDER_MARKERS: &[&str] = &["amazonaws.com", "azure", "googleusercontent"];

const SECONDS_PER_DAY: i64 = 86_400;

const THREAT_THRESHOLD: f64 = 40.0;
const ALERT_THRESHOLD: f64 = 50.0;
const STRONG_ACTION_THRESHOLD: f64 = 80.0;
const AUTO_THRESHOLD: f64 = 80.0;

pub struct MachineIdentityDetector {
    config: Arc<MonitorConfig>,
    baselines: Arc<dyn BaselineStore>,
}

impl MachineIdentityDetector {
    pub fn new(config: Arc<MonitorConfig>, baselines: Arc<dyn BaselineStore>) -> Self {
        Self { config, baselines }
    }

    fn principal_arn(&self, event: &IamEvent) -> String {
        event.user_identity.arn.clone().unwrap_or_default()
    }

    fn is_machine_identity(&self, event: &IamEvent) -> bool {
        let identity = &event.user_identity;
        if let Some(kind) = identity.kind.as_deref() {
            if MACHINE_IDENTITY_TYPES.contains(&kind) {
                return true;
            }
        }

        let arn = self.principal_arn(event).to_lowercase();
        let issuer_name = identity
            .session_context
            .as_ref()
            .and_then(|c| c.session_issuer.as_ref())
            .and_then(|i| i.user_name.as_deref())
            .unwrap_or("")
            .to_lowercase();

        if MACHINE_NAME_PATTERNS
            .iter()
            .any(|p| arn.contains(p) || issuer_name.contains(p))
        {
            return true;
        }
        if arn.contains(":role/") && arn.contains("service-role") {
            return true;
        }
        arn.contains("lambda") || arn.contains("function")
    }

    fn check_dormancy(&self, event: &IamEvent, factors: &mut RiskFactors) {
        let Some(baseline) = self.baselines.baseline_for(&self.principal_arn(event)) else {
            return;
        };
        let Some(last_activity) = baseline.last_activity else {
            return;
        };
        let days_dormant = (Utc::now().timestamp() - last_activity) / SECONDS_PER_DAY;
        if days_dormant > self.config.dormant_threshold_days {
            let score = (50.0 + days_dormant as f64).min(85.0);
            factors.insert("dormant_account_activated".into(), score);
        }
    }

    fn check_resource_scope(&self, event: &IamEvent, factors: &mut RiskFactors) {
        let Some(baseline) = self.baselines.baseline_for(&self.principal_arn(event)) else {
            return;
        };
        if baseline.typical_resources.is_empty() {
            return;
        }
        let unusual: Vec<&str> = event
            .resource_arns()
            .into_iter()
            .filter(|arn| !baseline.typical_resources.contains(*arn))
            .collect();
        if unusual.is_empty() {
            return;
        }
        let ratio = unusual.len() as f64 / baseline.typical_resources.len().max(1) as f64;
        let score = (40.0 + ratio * 40.0).min(80.0);
        factors.insert("out_of_scope_access".into(), score);
    }

    fn check_location(&self, event: &IamEvent, factors: &mut RiskFactors) {
        let ip = event.source_ip();
        if ip.is_empty() || self.config.is_known_cicd_ip(ip) {
            return;
        }
        let Some(baseline) = self.baselines.baseline_for(&self.principal_arn(event)) else {
            return;
        };
        if baseline.typical_ips.is_empty() || baseline.typical_ips.contains(ip) {
            return;
        }
        let mut score = 60.0;
        // Calls relayed through another cloud provider suggest stolen credentials.
        if CLOUD_PROVIDER_MARKERS.iter().any(|m| ip.contains(m)) {
            score += 20.0;
        }
        factors.insert("unexpected_location".into(), score);
    }

    fn check_escalation(&self, event: &IamEvent, factors: &mut RiskFactors) {
        if !ESCALATION_ACTIONS.contains(&event.name()) {
            return;
        }
        let principal_arn = self.principal_arn(event);
        let target_role = event.param_str("roleName").unwrap_or("");
        let policy_arn = event.param_str("policyArn").unwrap_or("");

        let score = if !target_role.is_empty() && principal_arn.contains(target_role) {
            // Automation granting its own role more power.
            90.0
        } else if policy_arn.contains("Admin") || policy_arn.contains("FullAccess") {
            85.0
        } else {
            70.0
        };
        factors.insert("privilege_escalation".into(), score);
    }

    fn check_cross_account(&self, event: &IamEvent, factors: &mut RiskFactors) {
        let Some(account) = event.user_identity.account_id.as_deref() else {
            return;
        };
        let recipient = event.recipient_account_id.as_deref().unwrap_or("");
        if recipient.is_empty() || account == recipient {
            return;
        }
        let score = if self.config.is_trusted_account(account) {
            35.0
        } else {
            75.0
        };
        factors.insert("cross_account_usage".into(), score);
    }

    fn check_impersonation(&self, event: &IamEvent, factors: &mut RiskFactors) {
        let has_issuer = event
            .user_identity
            .session_context
            .as_ref()
            .and_then(|c| c.session_issuer.as_ref())
            .is_some();

        if has_issuer {
            let depth = event
                .user_identity
                .principal_id
                .as_deref()
                .unwrap_or("")
                .matches(':')
                .count();
            if depth >= 3 {
                factors.insert("impersonation_chain".into(), 85.0);
                return;
            }
            if depth >= 2 {
                factors.insert("impersonation_chain".into(), 60.0);
                return;
            }
        }
        if event.name() == "ImpersonateServiceAccount" {
            factors.insert("impersonation_chain".into(), 70.0);
        }
    }

    fn check_high_risk_action(&self, event: &IamEvent, factors: &mut RiskFactors) {
        let service = event.source().split('.').next().unwrap_or("");
        if service.is_empty() || event.name().is_empty() {
            return;
        }
        let action = format!("{}:{}", service, event.name());
        let matched = HIGH_RISK_ACTIONS
            .iter()
            .any(|hra| action.contains(hra) || hra.contains(action.as_str()));
        if !matched {
            return;
        }
        let lower = action.to_lowercase();
        let score = if lower.contains("secretsmanager") || lower.contains("kms:decrypt") {
            80.0
        } else if lower.contains("passrole") {
            75.0
        } else {
            55.0
        };
        factors.insert("high_risk_action".into(), score);
    }

    fn check_bot_agent(&self, event: &IamEvent, factors: &mut RiskFactors) {
        let agent = event.agent().to_lowercase();
        let looks_automated = BOT_AGENT_INDICATORS.iter().any(|b| agent.contains(b));
        if looks_automated && event.occurred_off_hours() {
            factors.insert("bot_anomaly".into(), 45.0);
        }
    }

    fn check_cicd_misuse(&self, event: &IamEvent, factors: &mut RiskFactors) {
        let arn = self.principal_arn(event).to_lowercase();
        if !CICD_NAME_INDICATORS.iter().any(|c| arn.contains(c)) {
            return;
        }
        let ip = event.source_ip();
        if !ip.is_empty() && !self.config.is_known_cicd_ip(ip) {
            factors.insert("cicd_credential_misuse".into(), 85.0);
        } else if UNUSUAL_CICD_ACTIONS.contains(&event.name()) {
            factors.insert("cicd_credential_misuse".into(), 75.0);
        }
    }

    fn recommendations(&self, risk_score: f64, factors: &serde_json::Value) -> Vec<String> {
        let has = |name: &str| factors.get(name).is_some();
        let mut actions = Vec::new();
        if risk_score >= STRONG_ACTION_THRESHOLD {
            actions.push("revoke_access".to_string());
        }
        if risk_score >= ALERT_THRESHOLD {
            actions.push("alert_team".to_string());
        }
        if has("old_service_account_key") {
            actions.push("rotate_service_account_key".to_string());
        }
        if has("dormant_account_activated") {
            actions.push("verify_account_reactivation".to_string());
        }
        if has("privilege_escalation") {
            actions.push("audit_permission_changes".to_string());
        }
        if has("cross_account_usage") {
            actions.push("verify_cross_account_access".to_string());
        }
        if has("impersonation_chain") {
            actions.push("investigate_impersonation_chain".to_string());
        }
        if has("cicd_credential_misuse") {
            actions.push("rotate_cicd_credentials".to_string());
            actions.push("audit_cicd_infrastructure".to_string());
        }
        if has("unexpected_location") {
            actions.push("verify_source_ip".to_string());
            actions.push("enable_ip_whitelisting".to_string());
        }
        actions
    }
}

impl Detector for MachineIdentityDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn detect(&self, event: &IamEvent) -> DetectionResult {
        let monitored = MONITORED_ACTIONS.contains(&event.name());
        let machine = self.is_machine_identity(event);
        if !monitored && !machine {
            return DetectionResult::no_threat(NAME, "not a machine identity event");
        }

        let mut factors = RiskFactors::new();
        let key_risk = signals::stale_key_risk(event);
        if key_risk > 0.0 {
            factors.insert("old_service_account_key".into(), key_risk);
        }
        self.check_dormancy(event, &mut factors);
        self.check_resource_scope(event, &mut factors);
        self.check_location(event, &mut factors);
        self.check_escalation(event, &mut factors);
        self.check_cross_account(event, &mut factors);
        self.check_impersonation(event, &mut factors);
        self.check_high_risk_action(event, &mut factors);
        self.check_bot_agent(event, &mut factors);
        self.check_cicd_misuse(event, &mut factors);

        let mut details = base_details(event);
        details.insert("principal_arn".into(), json!(self.principal_arn(event)));
        details.insert(
            "principal_type".into(),
            json!(event.user_identity.kind.as_deref().unwrap_or("")),
        );
        details.insert("is_machine_identity".into(), json!(machine));
        details.insert("event_source".into(), json!(event.source()));
        details.insert("user_agent".into(), json!(event.agent()));
        details.insert(
            "request_parameters".into(),
            event.request_parameters.clone(),
        );

        let mut result = verdict(NAME, factors, details, THREAT_THRESHOLD, AUTO_THRESHOLD);
        if result.is_threat {
            let factor_map = result
                .details
                .get("risk_factors")
                .cloned()
                .unwrap_or_default();
            result.recommended_actions = self.recommendations(result.risk_score, &factor_map);
        }
        result
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
