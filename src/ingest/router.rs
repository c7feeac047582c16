use std::collections::HashSet;

use serde_json::{Map, Value};
use time::format_description::well_known::Iso8601;
use time::{OffsetDateTime, PrimitiveDateTime};

use super::schema::{self, DeviceSchema, FieldKind};
use crate::domain::{flatten, FieldValue, TelemetryEvent};

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("no device schema for topic {0}")]
    UnknownTopic(String),
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("field {field} must be {expected}")]
    FieldType { field: String, expected: &'static str },
    #[error("invalid timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: time::error::Parse,
    },
    #[error("field {0} appears twice after flattening")]
    DuplicateField(String),
}

/// Turns one inbound message into a telemetry event.
///
/// Pure: the topic picks the device schema, the payload is checked against
/// it, and the `data` tree is flattened.
pub fn route(topic: &str, payload: &[u8]) -> Result<TelemetryEvent, ParseError> {
    let schema = schema::for_topic(topic).ok_or_else(|| ParseError::UnknownTopic(topic.to_string()))?;
    let root = match serde_json::from_slice::<Value>(payload)? {
        Value::Object(map) => map,
        _ => return Err(ParseError::NotAnObject),
    };
    parse_envelope(schema, &root)
}

fn parse_envelope(schema: &DeviceSchema, root: &Map<String, Value>) -> Result<TelemetryEvent, ParseError> {
    let raw_ts = required_str(root, "timestamp")?;
    let timestamp = parse_timestamp(raw_ts)?;
    let entity_id = required_str(root, schema.id_key)?.to_string();

    let data = match root.get("data") {
        Some(Value::Object(data)) => data,
        Some(_) => {
            return Err(ParseError::FieldType {
                field: "data".into(),
                expected: "object",
            })
        }
        None => return Err(ParseError::MissingField("data")),
    };

    let fields = normalize_fields(schema, flatten(data))?;

    Ok(TelemetryEvent {
        entity_type: schema.entity_type,
        entity_id,
        timestamp,
        source_timestamp: raw_ts.to_string(),
        fields,
    })
}

fn required_str<'a>(root: &'a Map<String, Value>, key: &'static str) -> Result<&'a str, ParseError> {
    match root.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ParseError::FieldType {
            field: key.into(),
            expected: "string",
        }),
        None => Err(ParseError::MissingField(key)),
    }
}

/// Checks known fields against the schema and converts them to its types.
/// Fields the schema does not list pass through untouched.
fn normalize_fields(
    schema: &DeviceSchema,
    fields: Vec<(String, FieldValue)>,
) -> Result<Vec<(String, FieldValue)>, ParseError> {
    let mut seen = HashSet::with_capacity(fields.len());
    let mut out = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        if !seen.insert(name.clone()) {
            return Err(ParseError::DuplicateField(name));
        }
        let Some(spec) = schema.field(&name) else {
            out.push((name, value));
            continue;
        };
        if let (FieldKind::Timestamp, FieldValue::Str(s)) = (spec.kind, &value) {
            parse_timestamp(s)?;
        }
        match spec.kind.coerce(&value) {
            Some(value) => out.push((name, value)),
            None => {
                return Err(ParseError::FieldType {
                    field: name,
                    expected: spec.kind.describe(),
                })
            }
        }
    }
    Ok(out)
}

/// Parses an ISO-8601 instant. Datetimes without an offset are taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<OffsetDateTime, ParseError> {
    OffsetDateTime::parse(value, &Iso8601::DEFAULT)
        .or_else(|_| PrimitiveDateTime::parse(value, &Iso8601::DEFAULT).map(|dt| dt.assume_utc()))
        .map_err(|source| ParseError::Timestamp {
            value: value.to_string(),
            source,
        })
}
