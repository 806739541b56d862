//! Candidate model - the document under evaluation at one revision.
//!
//! Candidates are immutable. A revision never mutates the previous
//! candidate; it produces a new value with the same lineage and the next
//! version number.

mod path;

pub use path::{PathSegment, collect_text, has_content, parse_path, resolve};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// A structured document plus versioning metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    lineage_id: String,
    version: u32,
    body: Value,
}

/// Why a candidate could not be parsed structurally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedCandidate {
    pub reason: String,
}

impl fmt::Display for MalformedCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed input: {}", self.reason)
    }
}

impl Candidate {
    /// Create the first version of a lineage.
    pub fn new(lineage_id: impl Into<String>, body: Value) -> Self {
        Self {
            lineage_id: lineage_id.into(),
            version: 1,
            body,
        }
    }

    /// Create the first version from raw JSON text.
    ///
    /// Unparseable text is kept verbatim as a string body so the gate chain
    /// can report it as malformed instead of the caller having to.
    pub fn from_json_str(lineage_id: impl Into<String>, raw: &str) -> Self {
        let body = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        Self::new(lineage_id, body)
    }

    /// Produce the next revision of this candidate.
    pub fn revise(&self, body: Value) -> Self {
        Self {
            lineage_id: self.lineage_id.clone(),
            version: self.version + 1,
            body,
        }
    }

    pub fn lineage_id(&self) -> &str {
        &self.lineage_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Basic structural parse: the document root must be a non-empty object.
    pub fn structure(&self) -> Result<&Map<String, Value>, MalformedCandidate> {
        match &self.body {
            Value::Object(map) if map.is_empty() => Err(MalformedCandidate {
                reason: "document has no fields".to_string(),
            }),
            Value::Object(map) => Ok(map),
            other => Err(MalformedCandidate {
                reason: format!("expected an object at document root, found {}", json_kind(other)),
            }),
        }
    }

    /// Look up a field by path (see [`parse_path`]).
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        resolve(&self.body, path)
    }

    /// Look up a field and return it as a string slice.
    pub fn lookup_str(&self, path: &str) -> Option<&str> {
        self.lookup(path).and_then(Value::as_str)
    }

    /// Hex SHA-256 of the canonical JSON body.
    pub fn digest(&self) -> String {
        // serde_json maps are key-ordered, so serialization is canonical
        let bytes = serde_json::to_vec(&self.body).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
