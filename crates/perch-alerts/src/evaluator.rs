//! Stateless matching of conditions against event properties.

use tracing::warn;

use crate::types::{AlertCondition, ConditionOperator, Properties, PropertyValue};

/// Returns true iff every condition matches. An empty list always matches.
pub fn evaluate_conditions(conditions: &[AlertCondition], properties: &Properties) -> bool {
    conditions
        .iter()
        .all(|condition| evaluate_condition(condition, properties))
}

/// Evaluates one condition. A missing property never matches.
pub fn evaluate_condition(condition: &AlertCondition, properties: &Properties) -> bool {
    let Some(value) = properties.get(&condition.property) else {
        return false;
    };
    matches_value(&condition.operator, value, &condition.value)
}

/// Compares a single property value against a string-encoded operand.
pub fn matches_value(operator: &ConditionOperator, value: &PropertyValue, operand: &str) -> bool {
    match operator {
        ConditionOperator::Is => eq_ignore_case(&value.to_string(), operand),
        ConditionOperator::IsNot => !eq_ignore_case(&value.to_string(), operand),
        ConditionOperator::Contains => contains_ignore_case(&value.to_string(), operand),
        ConditionOperator::NotContains => !contains_ignore_case(&value.to_string(), operand),
        numeric if numeric.is_numeric() => {
            let (Some(left), Ok(right)) = (value.as_f64(), operand.parse::<f64>()) else {
                return false;
            };
            numeric.compare(left, right)
        }
        other => {
            warn!(operator = %other, "unknown condition operator");
            false
        }
    }
}

fn eq_ignore_case(left: &str, right: &str) -> bool {
    left.to_lowercase() == right.to_lowercase()
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
