//! Watch event types and decoding.
//!
//! Transports deliver `RawEvent` envelopes (`{"type": ..., "object": ...}`).
//! `decode_event` turns an envelope into a typed `WatchEvent`, a bookmark, or a
//! transport failure reported in-band by the server.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{TransportError, WatchError, WatchResult};
use crate::resource::{DynamicResource, WatchResource};

/// Kind of change carried by a `WatchEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Object was created.
    Added,
    /// Object was updated.
    Modified,
    /// Object was deleted.
    Deleted,
}

impl EventType {
    /// Wire name of the event type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Undecoded watch envelope as delivered by a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// `ADDED`, `MODIFIED`, `DELETED`, `BOOKMARK` or `ERROR`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// The object (or a `Status` for `ERROR` envelopes).
    pub object: Value,
}

impl RawEvent {
    /// Creates an envelope.
    #[must_use]
    pub fn new(event_type: impl Into<String>, object: Value) -> Self {
        Self {
            event_type: event_type.into(),
            object,
        }
    }

    /// Parses one line of a newline-delimited watch response.
    pub fn from_json_line(line: &str) -> WatchResult<Self> {
        serde_json::from_str(line.trim()).map_err(|e| WatchError::decode(e.to_string()))
    }
}

/// A change to a single resource.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent<R = DynamicResource> {
    /// Kind of change.
    pub etype: EventType,
    /// The resource after (or, for deletes, at) the change.
    pub resource: R,
}

impl<R> WatchEvent<R> {
    /// Creates an event.
    #[must_use]
    pub const fn new(etype: EventType, resource: R) -> Self {
        Self { etype, resource }
    }
}

/// Options applied while decoding an envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Rewrite camelCase object keys to snake_case before typed deserialization.
    /// Free-form maps such as labels and annotations keep their keys. Defaults to
    /// `false`, which keeps the wire keys.
    pub translate: bool,
}

/// Result of decoding one envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent<R> {
    /// A resource change.
    Event(WatchEvent<R>),
    /// Cursor-only event carrying the bookmarked resource version.
    Bookmark(Option<u64>),
    /// In-band failure reported by the server.
    Failure(TransportError),
}

/// Decodes an envelope into a typed event.
pub fn decode_event<R: WatchResource>(
    raw: RawEvent,
    options: DecodeOptions,
) -> WatchResult<DecodedEvent<R>> {
    let etype = match raw.event_type.as_str() {
        "ADDED" => EventType::Added,
        "MODIFIED" => EventType::Modified,
        "DELETED" => EventType::Deleted,
        "BOOKMARK" => {
            let rv = raw
                .object
                .pointer("/metadata/resourceVersion")
                .and_then(Value::as_str)
                .and_then(|rv| rv.parse().ok());
            return Ok(DecodedEvent::Bookmark(rv));
        }
        "ERROR" => return Ok(DecodedEvent::Failure(status_to_error(&raw.object))),
        other => return Err(WatchError::decode(format!("unknown event type '{other}'"))),
    };

    if is_listing(&raw.object) {
        return Err(WatchError::decode(
            "listing objects cannot be delivered as watch events",
        ));
    }

    let mut object = raw.object;
    if options.translate {
        translate_keys(&mut object);
    }

    let resource: R = serde_json::from_value(object).map_err(|e| WatchError::decode(e.to_string()))?;
    Ok(DecodedEvent::Event(WatchEvent::new(etype, resource)))
}

fn is_listing(object: &Value) -> bool {
    let list_kind = object
        .get("kind")
        .and_then(Value::as_str)
        .is_some_and(|k| k.ends_with("List"));
    list_kind && object.get("items").is_some_and(Value::is_array)
}

/// Converts a `Status` object from an `ERROR` envelope into a transport error.
fn status_to_error(status: &Value) -> TransportError {
    let code = status
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|c| u16::try_from(c).ok())
        .unwrap_or(500);
    let reason = status.get("reason").and_then(Value::as_str).unwrap_or("");
    let message = status.get("message").and_then(Value::as_str).unwrap_or("");

    let text = match (reason.is_empty(), message.is_empty()) {
        (false, false) => format!("{reason}: {message}"),
        (false, true) => reason.to_string(),
        (true, _) => message.to_string(),
    };
    TransportError::api(code, text)
}

/// Keys whose values are user-keyed maps and must not be rewritten.
const FREEFORM_FIELDS: &[&str] = &[
    "labels",
    "annotations",
    "data",
    "binaryData",
    "stringData",
    "matchLabels",
    "nodeSelector",
    "capacity",
    "allocatable",
    "limits",
    "requests",
];

fn translate_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let old = std::mem::take(map);
            let mut out = Map::with_capacity(old.len());
            for (key, mut child) in old {
                if !FREEFORM_FIELDS.contains(&key.as_str()) {
                    translate_keys(&mut child);
                }
                out.insert(camel_to_snake(&key), child);
            }
            *map = out;
        }
        Value::Array(items) => items.iter_mut().for_each(translate_keys),
        _ => {}
    }
}

fn camel_to_snake(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(char::is_ascii_lowercase);
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower)
            {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}
