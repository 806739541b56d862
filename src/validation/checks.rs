// Configuration-driven gates
// A SpecGate runs a list of declarative checks and reports every one that fails

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::candidate::{Candidate, has_content};
use crate::error::{CritiqError, TransientError};
use crate::reference::{Lookup, values_equal};
use crate::validation::traits::{EvalContext, Gate, GateResult, STRUCTURAL_GATE};

/// A single declarative check over a candidate field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum CheckSpec {
    /// Field must exist (any value, including null)
    Required { path: String },
    /// Field must exist and carry content
    NonEmpty { path: String },
    /// List must have at least `min` items
    MinItems { path: String, min: usize },
    /// List must have at most `max` items
    MaxItems { path: String, max: usize },
    /// Field must equal one of the listed values
    OneOf { path: String, values: Vec<Value> },
    /// Every item of a list must carry content in each named field
    EachItemHas { path: String, fields: Vec<String> },
    /// The string at `path` must be a known reference key
    ReferenceExists { path: String },
    /// The field at `path` must equal the reference value stored under `key`
    ReferenceEquals { path: String, key: String },
}

impl CheckSpec {
    /// Whether this check consults the reference data provider
    pub fn uses_reference(&self) -> bool {
        matches!(self, CheckSpec::ReferenceExists { .. } | CheckSpec::ReferenceEquals { .. })
    }

    /// Run the check, returning the failure messages (empty when it passes).
    pub async fn run(&self, candidate: &Candidate, ctx: &EvalContext) -> Result<Vec<String>, TransientError> {
        let failures = match self {
            CheckSpec::Required { path } => match candidate.lookup(path) {
                Some(_) => Vec::new(),
                None => vec![format!("required field `{}` is missing", path)],
            },

            CheckSpec::NonEmpty { path } => match candidate.lookup(path) {
                Some(v) if has_content(v) => Vec::new(),
                Some(_) => vec![format!("field `{}` is empty", path)],
                None => vec![format!("required field `{}` is missing", path)],
            },

            CheckSpec::MinItems { path, min } => match list_len(candidate, path) {
                Ok(len) if len >= *min => Vec::new(),
                Ok(len) => vec![format!("`{}` has {} item(s), expected at least {}", path, len, min)],
                Err(msg) => vec![msg],
            },

            CheckSpec::MaxItems { path, max } => match list_len(candidate, path) {
                Ok(len) if len <= *max => Vec::new(),
                Ok(len) => vec![format!("`{}` has {} item(s), expected at most {}", path, len, max)],
                Err(msg) => vec![msg],
            },

            CheckSpec::OneOf { path, values } => match candidate.lookup(path) {
                Some(v) if values.contains(v) => Vec::new(),
                Some(v) => vec![format!("`{}` is {}, expected one of {}", path, v, render_values(values))],
                None => vec![format!("required field `{}` is missing", path)],
            },

            CheckSpec::EachItemHas { path, fields } => match candidate.lookup(path) {
                Some(Value::Array(items)) => items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| {
                        let missing: Vec<&str> = fields
                            .iter()
                            .filter(|f| !crate::candidate::resolve(item, f).is_some_and(has_content))
                            .map(String::as_str)
                            .collect();
                        if missing.is_empty() {
                            None
                        } else {
                            Some(format!("`{}[{}]` is missing {}", path, i, missing.join(", ")))
                        }
                    })
                    .collect(),
                Some(_) => vec![format!("`{}` is not a list", path)],
                None => vec![format!("required field `{}` is missing", path)],
            },

            CheckSpec::ReferenceExists { path } => match candidate.lookup_str(path) {
                Some(key) => match ctx.lookup(key).await? {
                    Lookup::Found(_) => Vec::new(),
                    Lookup::NotFound => vec![format!("`{}` refers to unknown reference `{}`", path, key)],
                },
                None => vec![format!("`{}` must be a reference key string", path)],
            },

            CheckSpec::ReferenceEquals { path, key } => {
                let actual = candidate.lookup(path);
                match ctx.lookup(key).await? {
                    Lookup::Found(expected) if actual.is_some_and(|a| values_equal(a, &expected)) => Vec::new(),
                    Lookup::Found(expected) => vec![format!(
                        "`{}` is {}, reference `{}` says {}",
                        path,
                        actual.map(|v| v.to_string()).unwrap_or_else(|| "missing".to_string()),
                        key,
                        expected
                    )],
                    Lookup::NotFound => vec![format!("reference `{}` not found for `{}`", key, path)],
                }
            }
        };

        Ok(failures)
    }
}

fn list_len(candidate: &Candidate, path: &str) -> Result<usize, String> {
    match candidate.lookup(path) {
        Some(Value::Array(items)) => Ok(items.len()),
        Some(_) => Err(format!("`{}` is not a list", path)),
        None => Err(format!("required field `{}` is missing", path)),
    }
}

fn render_values(values: &[Value]) -> String {
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
}

/// Declarative gate definition as it appears in a validation bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateSpec {
    pub name: String,
    #[serde(default)]
    pub critical: bool,
    pub checks: Vec<CheckSpec>,
}

impl GateSpec {
    /// Reject gates that could never fail or never be identified.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.name.trim().is_empty() {
            return Err(CritiqError::config("gate name must not be empty"));
        }
        if self.name == STRUCTURAL_GATE {
            return Err(CritiqError::config(format!("gate name `{}` is reserved", STRUCTURAL_GATE)));
        }
        if self.checks.is_empty() {
            return Err(CritiqError::config(format!("gate `{}` has no checks", self.name)));
        }
        Ok(())
    }
}

/// Gate built from a [`GateSpec`].
///
/// All checks run, so one pass reports every failed check of the gate.
#[derive(Debug, Clone)]
pub struct SpecGate {
    spec: GateSpec,
}

impl SpecGate {
    pub fn new(spec: GateSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &GateSpec {
        &self.spec
    }
}

#[async_trait]
impl Gate for SpecGate {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn is_critical(&self) -> bool {
        self.spec.critical
    }

    fn uses_reference(&self) -> bool {
        self.spec.checks.iter().any(CheckSpec::uses_reference)
    }

    async fn evaluate(&self, candidate: &Candidate, ctx: &EvalContext) -> Result<GateResult, TransientError> {
        let mut result = GateResult::pass(&self.spec.name).critical(self.spec.critical);

        for check in &self.spec.checks {
            for failure in check.run(candidate, ctx).await? {
                result.add_failed_check(failure);
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::InMemoryReferenceData;
    use serde_json::json;
    use std::sync::Arc;

    fn lesson() -> Candidate {
        Candidate::new(
            "lin",
            json!({
                "title": "Equivalent fractions",
                "key_stage": "KS2",
                "objectives": ["compare fractions", "simplify fractions"],
                "notes": "",
                "examples": [
                    {"question": "1/2 = ?/4", "answer": "2"},
                    {"question": "3/6 = ?/2", "answer": ""}
                ],
                "subject": "maths"
            }),
        )
    }

    async fn run(check: CheckSpec) -> Vec<String> {
        check.run(&lesson(), &EvalContext::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_required() {
        assert!(run(CheckSpec::Required { path: "notes".into() }).await.is_empty());
        assert_eq!(
            run(CheckSpec::Required { path: "duration".into() }).await,
            vec!["required field `duration` is missing".to_string()]
        );
    }

    #[tokio::test]
    async fn test_non_empty() {
        assert!(run(CheckSpec::NonEmpty { path: "title".into() }).await.is_empty());
        assert_eq!(
            run(CheckSpec::NonEmpty { path: "notes".into() }).await,
            vec!["field `notes` is empty".to_string()]
        );
    }

    #[tokio::test]
    async fn test_min_and_max_items() {
        assert!(run(CheckSpec::MinItems { path: "objectives".into(), min: 2 }).await.is_empty());
        assert_eq!(
            run(CheckSpec::MinItems { path: "objectives".into(), min: 3 }).await,
            vec!["`objectives` has 2 item(s), expected at least 3".to_string()]
        );
        assert_eq!(
            run(CheckSpec::MaxItems { path: "objectives".into(), max: 1 }).await,
            vec!["`objectives` has 2 item(s), expected at most 1".to_string()]
        );
        assert_eq!(
            run(CheckSpec::MinItems { path: "title".into(), min: 1 }).await,
            vec!["`title` is not a list".to_string()]
        );
    }

    #[tokio::test]
    async fn test_one_of() {
        let ok = CheckSpec::OneOf {
            path: "key_stage".into(),
            values: vec![json!("KS1"), json!("KS2")],
        };
        assert!(run(ok).await.is_empty());

        let bad = CheckSpec::OneOf {
            path: "key_stage".into(),
            values: vec![json!("KS3")],
        };
        assert_eq!(run(bad).await, vec!["`key_stage` is \"KS2\", expected one of \"KS3\"".to_string()]);
    }

    #[tokio::test]
    async fn test_each_item_has_reports_each_offending_item() {
        let failures = run(CheckSpec::EachItemHas {
            path: "examples".into(),
            fields: vec!["question".into(), "answer".into()],
        })
        .await;
        assert_eq!(failures, vec!["`examples[1]` is missing answer".to_string()]);
    }

    #[tokio::test]
    async fn test_reference_checks() {
        let provider = InMemoryReferenceData::new()
            .with_entry("maths", json!({"name": "Mathematics"}))
            .with_entry("ks2_age_range", json!("7-11"));
        let ctx = EvalContext::default().with_reference(Arc::new(provider));
        let candidate = lesson();

        let exists = CheckSpec::ReferenceExists { path: "subject".into() };
        assert!(exists.run(&candidate, &ctx).await.unwrap().is_empty());

        let unknown = CheckSpec::ReferenceExists { path: "title".into() };
        assert_eq!(
            unknown.run(&candidate, &ctx).await.unwrap(),
            vec!["`title` refers to unknown reference `Equivalent fractions`".to_string()]
        );

        let equals = CheckSpec::ReferenceEquals {
            path: "key_stage".into(),
            key: "ks2_age_range".into(),
        };
        assert_eq!(
            equals.run(&candidate, &ctx).await.unwrap(),
            vec!["`key_stage` is \"KS2\", reference `ks2_age_range` says \"7-11\"".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reference_equals_compares_numbers_by_value() {
        let provider = InMemoryReferenceData::new().with_entry("lesson_minutes", json!(45));
        let ctx = EvalContext::default().with_reference(Arc::new(provider));
        let check = CheckSpec::ReferenceEquals {
            path: "duration".into(),
            key: "lesson_minutes".into(),
        };

        let matching = Candidate::new("lin", json!({"duration": 45.0}));
        assert!(check.run(&matching, &ctx).await.unwrap().is_empty());

        let off = Candidate::new("lin", json!({"duration": 50}));
        assert_eq!(
            check.run(&off, &ctx).await.unwrap(),
            vec!["`duration` is 50, reference `lesson_minutes` says 45".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reference_check_without_provider_is_transient() {
        let check = CheckSpec::ReferenceExists { path: "subject".into() };
        let err = check.run(&lesson(), &EvalContext::default()).await.unwrap_err();
        assert!(matches!(err, TransientError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_spec_gate_collects_all_failed_checks() {
        let gate = SpecGate::new(GateSpec {
            name: "schema".into(),
            critical: false,
            checks: vec![
                CheckSpec::NonEmpty { path: "title".into() },
                CheckSpec::Required { path: "duration".into() },
                CheckSpec::NonEmpty { path: "notes".into() },
            ],
        });

        let result = gate.evaluate(&lesson(), &EvalContext::default()).await.unwrap();
        assert!(!result.pass);
        assert_eq!(result.gate_name, "schema");
        assert_eq!(result.failed_checks.len(), 2);
    }

    #[test]
    fn test_spec_gate_flags() {
        let gate = SpecGate::new(GateSpec {
            name: "facts".into(),
            critical: true,
            checks: vec![CheckSpec::ReferenceExists { path: "subject".into() }],
        });
        assert!(gate.is_critical());
        assert!(gate.uses_reference());
    }

    #[test]
    fn test_gate_spec_validation() {
        let empty = GateSpec {
            name: "schema".into(),
            critical: false,
            checks: vec![],
        };
        assert!(empty.validate().is_err());

        let reserved = GateSpec {
            name: STRUCTURAL_GATE.into(),
            critical: false,
            checks: vec![CheckSpec::Required { path: "title".into() }],
        };
        assert!(reserved.validate().unwrap_err().to_string().contains("reserved"));
    }

    #[test]
    fn test_gate_spec_from_yaml() {
        let yaml = r#"
name: schema
critical: true
checks:
  - check: non_empty
    path: title
  - check: min_items
    path: objectives
    min: 2
"#;
        let spec: GateSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.checks.len(), 2);
        assert_eq!(spec.checks[1], CheckSpec::MinItems { path: "objectives".into(), min: 2 });
    }
}
