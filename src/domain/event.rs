use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Class of device a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Patient,
    Robot,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Patient => "patient",
            EntityType::Robot => "robot",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar reading after flattening.
///
/// `Null` keeps an optional field that was sent without a value (a robot
/// with no error code) distinct from a present zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric view used by ordered comparisons. Strings are never coerced.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Int(i) => serde_json::Value::from(*i),
            FieldValue::Float(f) => serde_json::Value::from(*f),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Str(s) => serde_json::Value::String(s.clone()),
            FieldValue::Null => serde_json::Value::Null,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Null => f.write_str("null"),
        }
    }
}

/// One normalized reading. Built once by the router and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub timestamp: OffsetDateTime,
    /// The `timestamp` text exactly as the device sent it.
    pub source_timestamp: String,
    pub fields: Vec<(String, FieldValue)>,
}

impl TelemetryEvent {
    /// Looks up a flattened field. `None` means the key was never sent.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

/// A threshold violation, serialized as the outbound alert payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Copied verbatim from the source reading.
    pub timestamp: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub alert_type: String,
    #[serde(rename = "value")]
    pub observed_value: FieldValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn alert_serializes_to_publish_contract() {
        let alert = Alert {
            timestamp: "2024-05-20T12:00:00".into(),
            entity_type: EntityType::Robot,
            entity_id: "robot001".into(),
            alert_type: "Error Detected".into(),
            observed_value: FieldValue::Str("E002".into()),
        };

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "timestamp": "2024-05-20T12:00:00",
                "entityType": "robot",
                "entityId": "robot001",
                "alertType": "Error Detected",
                "value": "E002",
            })
        );
    }

    #[test]
    fn zero_is_not_null() {
        assert!(!FieldValue::Int(0).is_null());
        assert_eq!(FieldValue::Int(0).as_f64(), Some(0.0));
        assert_eq!(FieldValue::Str("12".into()).as_f64(), None);
    }

    #[test]
    fn field_distinguishes_absent_from_null() {
        let ev = TelemetryEvent {
            entity_type: EntityType::Robot,
            entity_id: "r1".into(),
            timestamp: datetime!(2024-05-20 12:00:00 UTC),
            source_timestamp: "2024-05-20T12:00:00Z".into(),
            fields: vec![("errorCode".into(), FieldValue::Null)],
        };
        assert_eq!(ev.field("errorCode"), Some(&FieldValue::Null));
        assert_eq!(ev.field("batteryLevel"), None);
    }
}
