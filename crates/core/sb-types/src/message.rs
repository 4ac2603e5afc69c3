//! Message type carried through a stage.

use bytes::Bytes;
use serde_json::Value;
use std::collections::BTreeMap;

/// A batch of messages handed to a stage in one call.
pub type MessageBatch = Vec<Message>;

/// A single unit of data flowing through the pipeline.
///
/// The payload is held either as raw bytes or as a structured JSON value,
/// converting lazily between the two. Metadata keys are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    payload: Payload,
    metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
enum Payload {
    Bytes(Bytes),
    Structured(Value),
}

impl Message {
    /// Creates a message with a raw byte payload and no metadata.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: Payload::Bytes(payload.into()),
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a message with an empty payload.
    pub fn empty() -> Self {
        Self::new(Bytes::new())
    }

    /// Creates a message with a structured payload.
    pub fn from_structured(value: Value) -> Self {
        Self {
            payload: Payload::Structured(value),
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a metadata entry, builder style.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta_set(key, value);
        self
    }

    /// Returns the payload as bytes, serializing structured payloads to JSON.
    pub fn as_bytes(&self) -> Bytes {
        match &self.payload {
            Payload::Bytes(bytes) => bytes.clone(),
            Payload::Structured(value) => Bytes::from(value.to_string()),
        }
    }

    /// Replaces the payload with raw bytes.
    pub fn set_bytes(&mut self, payload: impl Into<Bytes>) {
        self.payload = Payload::Bytes(payload.into());
    }

    /// Returns a copy of the payload as a structured value.
    ///
    /// Raw payloads are parsed as JSON. The returned value is detached from
    /// the message; use [`set_structured`](Self::set_structured) to write back.
    pub fn as_structured(&self) -> Result<Value, serde_json::Error> {
        match &self.payload {
            Payload::Structured(value) => Ok(value.clone()),
            Payload::Bytes(bytes) => serde_json::from_slice(bytes),
        }
    }

    /// Replaces the payload with a structured value.
    pub fn set_structured(&mut self, value: Value) {
        self.payload = Payload::Structured(value);
    }

    /// Returns true if the payload is currently held in structured form.
    pub fn is_structured(&self) -> bool {
        matches!(self.payload, Payload::Structured(_))
    }

    /// Gets a metadata value.
    pub fn meta_get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Gets a metadata value coerced to a string.
    ///
    /// Strings are returned as-is, everything else is rendered as JSON.
    pub fn meta_get_str(&self, key: &str) -> Option<String> {
        self.metadata.get(key).map(value_to_string)
    }

    /// Sets a metadata value, replacing any previous value for the key.
    pub fn meta_set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Removes a metadata key, returning the previous value.
    pub fn meta_delete(&mut self, key: &str) -> Option<Value> {
        self.metadata.remove(key)
    }

    /// Returns all metadata entries.
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::empty()
    }
}

/// Renders a JSON value as a plain string.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_payload_parses_as_structured() {
        let msg = Message::new(r#"{"a":1}"#);
        assert!(!msg.is_structured());
        assert_eq!(msg.as_structured().unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_structured_payload_serializes_to_bytes() {
        let msg = Message::from_structured(json!({"b": [1, 2]}));
        assert_eq!(&msg.as_bytes()[..], br#"{"b":[1,2]}"#);
    }

    #[test]
    fn test_empty_payload_is_not_structured() {
        let msg = Message::empty();
        assert!(msg.as_structured().is_err());
    }

    #[test]
    fn test_structured_copy_is_detached() {
        let msg = Message::from_structured(json!({"a": 1}));
        let mut copy = msg.as_structured().unwrap();
        copy["a"] = json!(2);
        assert_eq!(msg.as_structured().unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_metadata_operations() {
        let mut msg = Message::empty().with_metadata("topic", "events");
        msg.meta_set("count", 3);

        assert_eq!(msg.meta_get_str("topic").as_deref(), Some("events"));
        assert_eq!(msg.meta_get_str("count").as_deref(), Some("3"));

        msg.meta_set("topic", "other");
        assert_eq!(msg.metadata().len(), 2);

        assert!(msg.meta_delete("topic").is_some());
        assert!(msg.meta_get("topic").is_none());
    }
}
