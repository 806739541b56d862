//! Field paths into a candidate document.
//!
//! A path is a dot-separated list of object keys with optional list indexes,
//! e.g. `sections[2].title` or `sections.2.title`.

use serde_json::Value;

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Split a path expression into segments.
///
/// Purely numeric dot segments are treated as list indexes.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();

    for part in path.split('.').filter(|p| !p.is_empty()) {
        let (key, rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };

        if !key.is_empty() {
            match key.parse::<usize>() {
                Ok(index) => segments.push(PathSegment::Index(index)),
                Err(_) => segments.push(PathSegment::Key(key.to_string())),
            }
        }

        for index in rest.split('[').filter(|s| !s.is_empty()) {
            let index = index.trim_end_matches(']');
            match index.parse::<usize>() {
                Ok(i) => segments.push(PathSegment::Index(i)),
                Err(_) => segments.push(PathSegment::Key(index.to_string())),
            }
        }
    }

    segments
}

/// Resolve a path against a JSON value.
pub fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in parse_path(path) {
        current = match (&segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
            (PathSegment::Index(i), Value::Array(items)) => items.get(*i)?,
            // Numeric keys on objects are allowed ("2021" as a map key)
            (PathSegment::Index(i), Value::Object(map)) => map.get(&i.to_string())?,
            _ => return None,
        };
    }
    Some(current)
}

/// Whether a value carries content: not null, not blank, not an empty collection.
pub fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Flatten every string reachable from a value into one lowercase text blob.
pub fn collect_text(value: &Value) -> String {
    fn walk(value: &Value, out: &mut String) {
        match value {
            Value::String(s) => {
                out.push_str(&s.to_lowercase());
                out.push(' ');
            }
            Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            Value::Object(map) => map.values().for_each(|v| walk(v, out)),
            Value::Number(n) => {
                out.push_str(&n.to_string());
                out.push(' ');
            }
            Value::Bool(_) | Value::Null => {}
        }
    }

    let mut out = String::new();
    walk(value, &mut out);
    out
}
