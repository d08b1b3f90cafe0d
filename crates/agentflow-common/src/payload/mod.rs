//! Payload access by field path
//!
//! Paths are dotted selectors over the JSON tree, with an optional `$.`
//! prefix. Array elements are addressed either as a numeric segment
//! (`items.0.name`) or in brackets (`items[0].name`).

pub mod template;

pub use template::interpolate;

use crate::error::ExtractionError;
use crate::types::Payload;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<Segment<'_>>, ExtractionError> {
    let trimmed = path.trim();
    let trimmed = trimmed
        .strip_prefix("$.")
        .or_else(|| trimmed.strip_prefix('$'))
        .unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(ExtractionError::EmptyPath);
    }

    let mut segments = Vec::new();
    for part in trimmed.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if !key.is_empty() {
            segments.push(Segment::Key(key));
        }
        while let Some(inner) = rest.strip_prefix('[') {
            let close = inner.find(']').ok_or_else(|| ExtractionError::Missing {
                path: path.to_string(),
            })?;
            let index = inner[..close]
                .trim()
                .parse::<usize>()
                .map_err(|_| ExtractionError::Missing {
                    path: path.to_string(),
                })?;
            segments.push(Segment::Index(index));
            rest = &inner[close + 1..];
        }
    }
    Ok(segments)
}

/// Resolve `path` inside a payload
pub fn value_at<'a>(payload: &'a Payload, path: &str) -> Result<&'a Value, ExtractionError> {
    let segments = parse_path(path)?;
    let missing = || ExtractionError::Missing {
        path: path.to_string(),
    };

    let mut segments = segments.into_iter();
    let mut current = match segments.next() {
        Some(Segment::Key(key)) => payload.get(key).ok_or_else(missing)?,
        _ => return Err(missing()),
    };

    for segment in segments {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key),
            (Segment::Key(key), Value::Array(items)) => {
                key.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            (Segment::Index(i), Value::Array(items)) => items.get(i),
            _ => None,
        }
        .ok_or_else(missing)?;
    }

    Ok(current)
}

/// Resolve `path` and coerce the value to a float.
///
/// Numbers and numeric strings are accepted; anything else (including null)
/// is an extraction error.
pub fn numeric_at(payload: &Payload, path: &str) -> Result<f64, ExtractionError> {
    let value = value_at(payload, path)?;
    to_number(value).ok_or_else(|| ExtractionError::NotNumeric {
        path: path.to_string(),
        found: describe(value),
    })
}

/// Numeric view of a JSON value, if it has one
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Render a value as a flat string (strings unquoted, everything else as JSON)
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn describe(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() > 64 {
        let head: String = rendered.chars().take(61).collect();
        format!("{head}...")
    } else {
        rendered
    }
}
