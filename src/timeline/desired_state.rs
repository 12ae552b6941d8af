//! Extraction of the session sequence from a device shadow document.
//!
//! The cloud side writes the `app` subtree of the desired state as a flat map
//! with dotted keys (`"session.parts.0.type"`). It is expanded back into
//! nested objects and arrays before the session is read.

use super::types::RawSequence;
use crate::error::{Result, SequencerError};
use serde_json::{Map, Value};

/// Read `state.desired.app.session` from a shadow document.
/// Returns `Ok(None)` when the document carries no session.
pub fn extract_session(shadow: &Value) -> Result<Option<RawSequence>> {
    let Some(desired) = shadow.pointer("/state/desired") else {
        return Ok(None);
    };
    let Some(app) = desired.get("app") else {
        return Ok(None);
    };

    let app = unflatten(app);
    match app.get("session") {
        None | Some(Value::Null) => Ok(None),
        Some(session) => serde_json::from_value(session.clone())
            .map(Some)
            .map_err(|e| SequencerError::validation("desired_state", format!("malformed session: {e}"))),
    }
}

/// Expand dotted keys into nested values. Objects whose keys are exactly
/// `0..n` become arrays.
pub fn unflatten(value: &Value) -> Value {
    let Value::Object(flat) = value else {
        return value.clone();
    };

    let mut root = Map::new();
    for (key, child) in flat {
        let segments: Vec<&str> = key.split('.').collect();
        insert_path(&mut root, &segments, unflatten(child));
    }
    arrayify(Value::Object(root))
}

fn insert_path(target: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => match (target.get_mut(*last), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                for (key, child) in incoming {
                    insert_path(existing, &[key.as_str()], child);
                }
            }
            (_, value) => {
                target.insert((*last).to_string(), value);
            }
        },
        [head, rest @ ..] => {
            let entry = target
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}

fn arrayify(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let is_sequence = !map.is_empty()
                && (0..map.len()).all(|index| map.contains_key(&index.to_string()));
            if is_sequence {
                let mut map = map;
                let items = (0..map.len())
                    .filter_map(|index| map.remove(&index.to_string()))
                    .map(arrayify)
                    .collect();
                Value::Array(items)
            } else {
                Value::Object(map.into_iter().map(|(k, v)| (k, arrayify(v))).collect())
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(arrayify).collect()),
        other => other,
    }
}
