//! Status payload values.
//!
//! The wire form follows the mqtt-smarthome JSON convention:
//! `{"val": <value>, "ts": <unix-secs>, "lc": <unix-secs>}`. Payloads that
//! are not valid JSON in that shape are treated as bare string values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device value with its observation and last-changed timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ValueWire", into = "ValueWire")]
pub struct Value {
    pub value: serde_json::Value,
    pub time: DateTime<Utc>,
    pub last_changed: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct ValueWire {
    val: serde_json::Value,
    ts: i64,
    lc: i64,
}

impl From<ValueWire> for Value {
    fn from(wire: ValueWire) -> Self {
        Value {
            value: wire.val,
            time: DateTime::from_timestamp(wire.ts, 0).unwrap_or(DateTime::UNIX_EPOCH),
            last_changed: DateTime::from_timestamp(wire.lc, 0).unwrap_or(DateTime::UNIX_EPOCH),
        }
    }
}

impl From<Value> for ValueWire {
    fn from(value: Value) -> Self {
        ValueWire {
            val: value.value,
            ts: value.time.timestamp(),
            lc: value.last_changed.timestamp(),
        }
    }
}

impl Value {
    /// A fresh value observed now.
    pub fn new(value: impl Into<serde_json::Value>) -> Self {
        let now = Utc::now();
        Value {
            value: value.into(),
            time: now,
            last_changed: now,
        }
    }

    /// Decode a raw bus payload. Falls back to a bare string value when the
    /// payload is not in the JSON wire form.
    pub fn from_payload(data: &[u8]) -> Self {
        if let Ok(value) = serde_json::from_slice::<Value>(data) {
            return value;
        }
        Value::new(String::from_utf8_lossy(data).into_owned())
    }

    /// The canonical string form used for `when` comparisons: strings are
    /// taken verbatim, numbers, booleans and null are rendered as text.
    pub fn coerce_str(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Null => "null".to_string(),
            other => other.to_string(),
        }
    }
}
