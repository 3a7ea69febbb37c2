//! Defensive IAM policy document parsing.
//!
//! Policy documents show up in audit events as raw JSON strings, URL-decoded
//! strings, or already-parsed objects, and attackers control their contents.
//! Parsing therefore never fails loudly: anything malformed yields `None` and the
//! caller scores zero risk for that check.

use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct PolicyDocument {
    pub statements: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyStatement {
    pub effect: String,
    pub principal: Value,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    pub condition: Value,
}

impl PolicyDocument {
    /// Parses a policy from a JSON string or an already-decoded object.
    /// A document without a `Statement` key parses to zero statements.
    pub fn parse(raw: &Value) -> Option<PolicyDocument> {
        let doc: Value = match raw {
            Value::String(s) => serde_json::from_str(s).ok()?,
            Value::Object(_) => raw.clone(),
            _ => return None,
        };

        let statements = match doc.get("Statement") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(PolicyStatement::from_value)
                .collect(),
            Some(single @ Value::Object(_)) => {
                PolicyStatement::from_value(single).into_iter().collect()
            }
            _ => Vec::new(),
        };

        Some(PolicyDocument { statements })
    }

    pub fn allow_statements(&self) -> impl Iterator<Item = &PolicyStatement> {
        self.statements.iter().filter(|s| s.effect == "Allow")
    }
}

impl PolicyStatement {
    fn from_value(value: &Value) -> Option<PolicyStatement> {
        let obj = value.as_object()?;
        Some(PolicyStatement {
            effect: obj
                .get("Effect")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            principal: obj.get("Principal").cloned().unwrap_or(Value::Null),
            actions: one_or_many(obj.get("Action")),
            resources: one_or_many(obj.get("Resource")),
            condition: obj.get("Condition").cloned().unwrap_or(Value::Null),
        })
    }

    /// `"Principal": "*"` or `"Principal": {"AWS": "*"}`.
    pub fn has_wildcard_principal(&self) -> bool {
        self.principal.as_str() == Some("*")
            || self.principal.get("AWS").and_then(Value::as_str) == Some("*")
    }

    pub fn aws_principal(&self) -> Option<&str> {
        self.principal.get("AWS").and_then(Value::as_str)
    }

    /// True when any condition key (at any depth) contains `needle`.
    pub fn condition_mentions(&self, needle: &str) -> bool {
        fn walk(value: &Value, needle: &str) -> bool {
            match value {
                Value::Object(map) => map
                    .iter()
                    .any(|(k, v)| k.contains(needle) || walk(v, needle)),
                Value::Array(items) => items.iter().any(|v| walk(v, needle)),
                _ => false,
            }
        }
        walk(&self.condition, needle)
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }

    pub fn has_any_action(&self, candidates: &[&str]) -> bool {
        self.actions
            .iter()
            .any(|a| candidates.contains(&a.as_str()))
    }

    pub fn has_resource(&self, resource: &str) -> bool {
        self.resources.iter().any(|r| r == resource)
    }
}

/// Accepts `"s3:GetObject"` and `["s3:GetObject", ...]` alike.
fn one_or_many(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Lowercased textual form of a policy for keyword scans. Works for both raw
/// strings and decoded objects.
pub fn policy_text_lower(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.to_lowercase(),
        other => serde_json::to_string(other)
            .unwrap_or_default()
            .to_lowercase(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_and_object_forms() {
        let as_object = json!({
            "Version": "2012-10-17",
            "Statement": [{"Effect": "Allow", "Action": "s3:GetObject", "Resource": "*"}]
        });
        let as_string = Value::String(as_object.to_string());

        for raw in [&as_object, &as_string] {
            let doc = PolicyDocument::parse(raw).unwrap();
            assert_eq!(doc.statements.len(), 1);
            assert_eq!(doc.statements[0].effect, "Allow");
            assert!(doc.statements[0].has_action("s3:GetObject"));
            assert!(doc.statements[0].has_resource("*"));
        }
    }

    #[test]
    fn malformed_json_string_is_none() {
        assert!(PolicyDocument::parse(&Value::String("{not json".into())).is_none());
        assert!(PolicyDocument::parse(&json!(42)).is_none());
    }

    #[test]
    fn missing_statement_parses_empty() {
        let doc = PolicyDocument::parse(&json!({"Version": "2012-10-17"})).unwrap();
        assert!(doc.statements.is_empty());
    }

    #[test]
    fn single_statement_object_is_accepted() {
        let doc = PolicyDocument::parse(&json!({
            "Statement": {"Effect": "Deny", "Action": ["iam:*"], "Resource": ["*"]}
        }))
        .unwrap();
        assert_eq!(doc.statements.len(), 1);
        assert_eq!(doc.statements[0].actions, vec!["iam:*"]);
    }

    #[test]
    fn wildcard_principal_forms() {
        let doc = PolicyDocument::parse(&json!({
            "Statement": [
                {"Effect": "Allow", "Principal": "*"},
                {"Effect": "Allow", "Principal": {"AWS": "*"}},
                {"Effect": "Allow", "Principal": {"AWS": "arn:aws:iam::123456789012:root"}}
            ]
        }))
        .unwrap();
        assert!(doc.statements[0].has_wildcard_principal());
        assert!(doc.statements[1].has_wildcard_principal());
        assert!(!doc.statements[2].has_wildcard_principal());
    }

    #[test]
    fn condition_key_search_is_recursive() {
        let doc = PolicyDocument::parse(&json!({
            "Statement": [{
                "Effect": "Allow",
                "Condition": {"StringEquals": {"sts:ExternalId": "deploy-1"}}
            }]
        }))
        .unwrap();
        assert!(doc.statements[0].condition_mentions("ExternalId"));
        assert!(!doc.statements[0].condition_mentions("SourceIp"));
    }
}
