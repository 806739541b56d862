//! Reference data provider - authoritative facts for cross-checks.
//!
//! Gates and criterion evaluators consult a provider read-only. Lookups may
//! suspend on an external service, so every call goes through
//! [`lookup_with_timeout`]; failures are transient and never read as
//! "not found".

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TransientError};

/// Outcome of a successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Value),
    NotFound,
}

impl Lookup {
    pub fn found(&self) -> Option<&Value> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::NotFound => None,
        }
    }
}

/// Equality for reference comparisons: numbers compare by value, so `1`
/// matches `1.0`. Lists and maps compare element-wise.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len() && xs.iter().all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Read-only source of authoritative reference values.
#[async_trait]
pub trait ReferenceDataProvider: Send + Sync {
    async fn lookup(&self, key: &str) -> std::result::Result<Lookup, TransientError>;
}

/// Run a lookup under a caller-supplied timeout.
pub async fn lookup_with_timeout(
    provider: &dyn ReferenceDataProvider,
    key: &str,
    timeout: Duration,
) -> std::result::Result<Lookup, TransientError> {
    tokio::time::timeout(timeout, provider.lookup(key))
        .await
        .map_err(|_| TransientError::Timeout(timeout))?
}

/// Reference data held in memory, typically loaded from a YAML or JSON map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReferenceData {
    entries: HashMap<String, Value>,
}

impl InMemoryReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry (builder pattern)
    pub fn with_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    /// Load a flat `key: value` map from a YAML (or JSON) file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let entries: HashMap<String, Value> = serde_yaml::from_str(&content)?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ReferenceDataProvider for InMemoryReferenceData {
    async fn lookup(&self, key: &str) -> std::result::Result<Lookup, TransientError> {
        Ok(match self.entries.get(key) {
            Some(v) => Lookup::Found(v.clone()),
            None => Lookup::NotFound,
        })
    }
}
