//! Static threshold rules.
//!
//! The table is fixed for the life of the process. It defaults to the
//! clinical and fleet thresholds below and can be replaced wholesale from
//! configuration (`[[rules]]` entries).

use serde::Deserialize;

use crate::domain::{EntityType, FieldValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Comparator {
    LessThan,
    GreaterThan,
    /// Fires on any non-null value, or on a value equal to the bound when one is set.
    NonNullEquals,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdRule {
    pub entity_type: EntityType,
    pub field: String,
    pub comparator: Comparator,
    #[serde(default)]
    pub bound: Option<Bound>,
    pub alert_type: String,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RuleError {
    #[error("rule {index}: field name cannot be empty")]
    EmptyField { index: usize },
    #[error("rule {index}: alert type cannot be empty")]
    EmptyAlertType { index: usize },
    #[error("rule {index} ({field}): {comparator:?} needs a numeric bound")]
    NumericBoundRequired {
        index: usize,
        field: String,
        comparator: Comparator,
    },
}

impl ThresholdRule {
    fn new(
        entity_type: EntityType,
        field: &str,
        comparator: Comparator,
        bound: Option<Bound>,
        alert_type: &str,
    ) -> Self {
        Self {
            entity_type,
            field: field.to_string(),
            comparator,
            bound,
            alert_type: alert_type.to_string(),
        }
    }

    /// Applies the comparator to a present, non-null value.
    pub fn matches(&self, value: &FieldValue) -> bool {
        match (self.comparator, &self.bound) {
            (Comparator::LessThan, Some(Bound::Number(b))) => value.as_f64().is_some_and(|v| v < *b),
            (Comparator::GreaterThan, Some(Bound::Number(b))) => {
                value.as_f64().is_some_and(|v| v > *b)
            }
            (Comparator::NonNullEquals, None) => !value.is_null(),
            (Comparator::NonNullEquals, Some(Bound::Text(s))) => {
                matches!(value, FieldValue::Str(v) if v == s)
            }
            (Comparator::NonNullEquals, Some(Bound::Number(n))) => {
                value.as_f64().is_some_and(|v| v == *n)
            }
            // rejected by RuleSet::new
            (Comparator::LessThan | Comparator::GreaterThan, _) => false,
        }
    }
}

/// Ordered, immutable rule table. Table order is alert emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    rules: Vec<ThresholdRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ThresholdRule>) -> Result<Self, RuleError> {
        for (index, rule) in rules.iter().enumerate() {
            if rule.field.is_empty() {
                return Err(RuleError::EmptyField { index });
            }
            if rule.alert_type.is_empty() {
                return Err(RuleError::EmptyAlertType { index });
            }
            let ordered = matches!(rule.comparator, Comparator::LessThan | Comparator::GreaterThan);
            if ordered && !matches!(rule.bound, Some(Bound::Number(_))) {
                return Err(RuleError::NumericBoundRequired {
                    index,
                    field: rule.field.clone(),
                    comparator: rule.comparator,
                });
            }
        }
        Ok(Self { rules })
    }

    /// Uses the configured table if there is one, the defaults otherwise.
    pub fn from_config(rules: Option<Vec<ThresholdRule>>) -> Result<Self, RuleError> {
        match rules {
            Some(rules) => Self::new(rules),
            None => Ok(Self::default()),
        }
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    pub fn for_entity(&self, entity_type: EntityType) -> impl Iterator<Item = &ThresholdRule> {
        self.rules.iter().filter(move |r| r.entity_type == entity_type)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        use Comparator::*;
        use EntityType::*;

        let num = |v: f64| Some(Bound::Number(v));
        Self {
            rules: vec![
                ThresholdRule::new(Patient, "heartRate", LessThan, num(60.0), "Abnormal Heart Rate"),
                ThresholdRule::new(Patient, "heartRate", GreaterThan, num(100.0), "Abnormal Heart Rate"),
                ThresholdRule::new(Patient, "temperature", LessThan, num(35.0), "Abnormal Temperature"),
                ThresholdRule::new(Patient, "temperature", GreaterThan, num(38.0), "Abnormal Temperature"),
                ThresholdRule::new(Patient, "oxygenSaturation", LessThan, num(95.0), "Low Oxygen Saturation"),
                ThresholdRule::new(Robot, "batteryLevel", LessThan, num(20.0), "Low Battery"),
                ThresholdRule::new(Robot, "errorCode", NonNullEquals, None, "Error Detected"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_valid_and_ordered() {
        let set = RuleSet::default();
        assert_eq!(set.len(), 7);
        assert!(RuleSet::new(set.rules().to_vec()).is_ok());

        let patient: Vec<_> = set
            .for_entity(EntityType::Patient)
            .map(|r| r.field.as_str())
            .collect();
        assert_eq!(
            patient,
            ["heartRate", "heartRate", "temperature", "temperature", "oxygenSaturation"]
        );
    }

    #[test]
    fn ordered_comparator_without_numeric_bound_is_rejected() {
        let rule = ThresholdRule::new(
            EntityType::Robot,
            "batteryLevel",
            Comparator::LessThan,
            Some(Bound::Text("low".into())),
            "Low Battery",
        );
        assert_eq!(
            RuleSet::new(vec![rule]),
            Err(RuleError::NumericBoundRequired {
                index: 0,
                field: "batteryLevel".into(),
                comparator: Comparator::LessThan,
            })
        );
    }

    #[test]
    fn empty_names_are_rejected() {
        let rule = ThresholdRule::new(EntityType::Robot, "", Comparator::NonNullEquals, None, "x");
        assert_eq!(RuleSet::new(vec![rule]), Err(RuleError::EmptyField { index: 0 }));

        let rule = ThresholdRule::new(EntityType::Robot, "f", Comparator::NonNullEquals, None, "");
        assert_eq!(RuleSet::new(vec![rule]), Err(RuleError::EmptyAlertType { index: 0 }));
    }

    #[test]
    fn comparators() {
        let lt = ThresholdRule::new(EntityType::Robot, "b", Comparator::LessThan, Some(Bound::Number(20.0)), "a");
        assert!(lt.matches(&FieldValue::Int(0)));
        assert!(lt.matches(&FieldValue::Float(19.9)));
        assert!(!lt.matches(&FieldValue::Int(20)));
        assert!(!lt.matches(&FieldValue::Str("5".into())));

        let gt = ThresholdRule::new(EntityType::Patient, "t", Comparator::GreaterThan, Some(Bound::Number(38.0)), "a");
        assert!(gt.matches(&FieldValue::Float(38.1)));
        assert!(!gt.matches(&FieldValue::Float(38.0)));

        let any = ThresholdRule::new(EntityType::Robot, "e", Comparator::NonNullEquals, None, "a");
        assert!(any.matches(&FieldValue::Str("E001".into())));
        assert!(any.matches(&FieldValue::Str(String::new())));
        assert!(!any.matches(&FieldValue::Null));

        let exact = ThresholdRule::new(
            EntityType::Robot,
            "e",
            Comparator::NonNullEquals,
            Some(Bound::Text("E004".into())),
            "a",
        );
        assert!(exact.matches(&FieldValue::Str("E004".into())));
        assert!(!exact.matches(&FieldValue::Str("E001".into())));
    }

    #[test]
    fn rules_deserialize_from_config_shape() {
        let rule: ThresholdRule = serde_json::from_value(serde_json::json!({
            "entity_type": "patient",
            "field": "respiratoryRate",
            "comparator": "greaterThan",
            "bound": 20,
            "alert_type": "Abnormal Respiratory Rate",
        }))
        .unwrap();
        assert_eq!(rule.entity_type, EntityType::Patient);
        assert_eq!(rule.comparator, Comparator::GreaterThan);
        assert_eq!(rule.bound, Some(Bound::Number(20.0)));
    }
}
