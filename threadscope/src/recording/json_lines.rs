//! JSON-lines wire shape
//!
//! One object per line, either a metadata block or a sample:
//!
//! ```text
//! {"metadata": {"mode": "cpu", "thread:7": "MainThread"}}
//! {"thread": "MainThread", "metric": {"kind": "cpu", "value": 10}, "frames": [{"function": "run", "line": 5}]}
//! ```

use serde_json::Value;

use super::{Metadata, Sample};

const METADATA_FIELD: &str = "metadata";

/// One decoded JSON line.
#[derive(Debug)]
pub enum JsonRecord {
    Metadata(Metadata),
    Sample(Sample),
}

#[must_use]
pub fn looks_like_json(text: &str) -> bool {
    text.trim_start().starts_with('{')
}

/// True if `text` is a metadata block rather than a sample.
///
/// Decided by the top-level key, so a sample mentioning `"metadata"` in a
/// frame or thread name is never mistaken for one.
#[must_use]
pub fn is_metadata_record(text: &str) -> bool {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => value.get(METADATA_FIELD).is_some(),
        Err(_) => text
            .trim_start()
            .strip_prefix('{')
            .is_some_and(|rest| rest.trim_start().starts_with("\"metadata\"")),
    }
}

pub fn parse_record(text: &str) -> Result<JsonRecord, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;

    if let Some(fields) = value.get(METADATA_FIELD) {
        let fields = fields.as_object().ok_or("metadata must be an object")?;
        let mut metadata = Metadata::new();
        for (key, field) in fields {
            let rendered = match field {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            metadata.insert(key.clone(), rendered);
        }
        return Ok(JsonRecord::Metadata(metadata));
    }

    let sample: Sample = serde_json::from_value(value).map_err(|e| format!("invalid sample: {e}"))?;
    if sample.thread_label.is_empty() {
        return Err("empty thread label".to_string());
    }
    Ok(JsonRecord::Sample(sample))
}
