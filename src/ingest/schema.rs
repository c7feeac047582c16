//! Device schemas as data.
//!
//! Each entity type is described once: where it shows up in the topic, how
//! its payload names the entity, where it is stored, and which fields it is
//! expected to carry. The router is written against this table rather than
//! against any single device.

use crate::domain::{EntityType, FieldValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Integral floats (`45.0`) are read as integers.
    Integer,
    /// Integers are widened; generators emit `z: 0` for floor-level positions.
    Float,
    Text,
    OptionalText,
    Timestamp,
}

impl FieldKind {
    /// Converts `value` to this kind's storage type, or `None` if it does not fit.
    ///
    /// A column always carries one type, which the store requires.
    pub fn coerce(&self, value: &FieldValue) -> Option<FieldValue> {
        match (self, value) {
            (FieldKind::Integer, FieldValue::Int(_)) => Some(value.clone()),
            (FieldKind::Integer, FieldValue::Float(f)) if f.fract() == 0.0 && f.abs() < MAX_EXACT_INT => {
                Some(FieldValue::Int(*f as i64))
            }
            (FieldKind::Float, FieldValue::Int(i)) => Some(FieldValue::Float(*i as f64)),
            (FieldKind::Float, FieldValue::Float(_)) => Some(value.clone()),
            (FieldKind::Text | FieldKind::Timestamp, FieldValue::Str(_)) => Some(value.clone()),
            (FieldKind::OptionalText, FieldValue::Str(_) | FieldValue::Null) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn accepts(&self, value: &FieldValue) -> bool {
        self.coerce(value).is_some()
    }

    pub fn describe(&self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Float => "number",
            FieldKind::Text => "string",
            FieldKind::OptionalText => "string or null",
            FieldKind::Timestamp => "ISO-8601 timestamp",
        }
    }
}

// 2^53: every integer below it is exact in an f64
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Flattened name.
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn spec(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

#[derive(Debug)]
pub struct DeviceSchema {
    pub entity_type: EntityType,
    /// Topic segment that selects this schema.
    pub topic_segment: &'static str,
    /// Top-level payload key holding the entity id.
    pub id_key: &'static str,
    pub measurement: &'static str,
    pub tag_key: &'static str,
    pub fields: &'static [FieldSpec],
}

impl DeviceSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

pub static PATIENT: DeviceSchema = DeviceSchema {
    entity_type: EntityType::Patient,
    topic_segment: "patients",
    id_key: "patientId",
    measurement: "patient_vitals",
    tag_key: "patient_id",
    fields: &[
        spec("heartRate", FieldKind::Integer),
        spec("bloodPressure_systolic", FieldKind::Integer),
        spec("bloodPressure_diastolic", FieldKind::Integer),
        spec("temperature", FieldKind::Float),
        spec("respiratoryRate", FieldKind::Integer),
        spec("oxygenSaturation", FieldKind::Integer),
    ],
};

pub static ROBOT: DeviceSchema = DeviceSchema {
    entity_type: EntityType::Robot,
    topic_segment: "robots",
    id_key: "robotId",
    measurement: "robot_status",
    tag_key: "robot_id",
    fields: &[
        spec("position_x", FieldKind::Float),
        spec("position_y", FieldKind::Float),
        spec("position_z", FieldKind::Float),
        spec("batteryLevel", FieldKind::Integer),
        spec("currentTask", FieldKind::Text),
        spec("errorCode", FieldKind::OptionalText),
        spec("lastMaintenance", FieldKind::Timestamp),
    ],
};

pub static SCHEMAS: [&DeviceSchema; 2] = [&PATIENT, &ROBOT];

impl EntityType {
    pub fn schema(&self) -> &'static DeviceSchema {
        match self {
            EntityType::Patient => &PATIENT,
            EntityType::Robot => &ROBOT,
        }
    }
}

/// Picks the schema whose keyword appears as a whole segment of `topic`.
pub fn for_topic(topic: &str) -> Option<&'static DeviceSchema> {
    topic
        .split('/')
        .find_map(|segment| SCHEMAS.iter().copied().find(|s| s.topic_segment == segment))
}

/// MQTT subscription filter for one schema under `root`.
pub fn topic_filter(root: &str, schema: &DeviceSchema) -> String {
    format!("{root}/+/+/+/{}/data", schema.topic_segment)
}
