//! Reference pod session fixtures.

use crate::timeline::{RawPart, RawSequence};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};

/// Part types of the pod session, in order
pub const POD_PART_TYPES: [&str; 6] = ["pre", "hello", "warmup", "live", "bye", "post"];

/// The reference pod session: 780 seconds starting at `starts_at`
pub fn fake_pod_session(starts_at: DateTime<Utc>) -> RawSequence {
    let downloads = |name: &str| {
        json!({
            "countdown": 3,
            "downloadUrls": [
                format!("https://static.example.com/on-demand/{name}/master.m3u8"),
                format!("https://static.example.com/on-demand/{name}/manifest.mpd"),
            ]
        })
    };
    let props = |value: Value| match value {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let parts = vec![
        RawPart::new("pre", 0.0, 1.0),
        RawPart::new("hello", 1.0, 119.0),
        RawPart::new("warmup", 120.0, 120.0).with_props(props(downloads("warmup"))),
        RawPart::new("live", 240.0, 480.0).with_props(props(downloads("live"))),
        RawPart::new("bye", 720.0, 59.0),
        RawPart::new("post", 779.0, 1.0),
    ];

    let mut session = RawSequence::new(starts_at, 780.0, parts);
    session.ends_at = Some(starts_at + Duration::seconds(780));
    session.extra.insert(
        "booking".to_string(),
        json!({
            "id": 42,
            "client": { "preferredName": "Pod Tester" },
            "clientAttended": true
        }),
    );
    session
}

/// Shadow document carrying the pod session in the flat `app` encoding used
/// by the cloud side
pub fn fake_pod_shadow(starts_at: DateTime<Utc>) -> Value {
    let app = json!({ "session": fake_pod_session(starts_at) });
    json!({
        "state": {
            "desired": { "app": Value::Object(flatten(&app)) }
        },
        "version": 7
    })
}

/// Flatten nested objects and arrays into dotted keys
pub fn flatten(value: &Value) -> Map<String, Value> {
    let mut flat = Map::new();
    flatten_into(&mut flat, None, value);
    flat
}

fn flatten_into(flat: &mut Map<String, Value>, prefix: Option<String>, value: &Value) {
    let join = |key: &str| match &prefix {
        Some(prefix) => format!("{prefix}.{key}"),
        None => key.to_string(),
    };

    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(flat, Some(join(key)), child);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(flat, Some(join(&index.to_string())), child);
            }
        }
        leaf => {
            if let Some(key) = prefix {
                flat.insert(key, leaf.clone());
            }
        }
    }
}
