use crate::domain::{Alert, TelemetryEvent};
use crate::rules::RuleSet;

/// Applies every matching rule to the event, in table order.
///
/// Absent and null fields are skipped; a present zero is evaluated like any
/// other number.
pub fn evaluate(rules: &RuleSet, event: &TelemetryEvent) -> Vec<Alert> {
    rules
        .for_entity(event.entity_type)
        .filter_map(|rule| {
            let value = event.field(&rule.field).filter(|v| !v.is_null())?;
            rule.matches(value).then(|| Alert {
                timestamp: event.source_timestamp.clone(),
                entity_type: event.entity_type,
                entity_id: event.entity_id.clone(),
                alert_type: rule.alert_type.clone(),
                observed_value: value.clone(),
            })
        })
        .collect()
}
