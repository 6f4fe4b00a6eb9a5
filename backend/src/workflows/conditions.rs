// Workflow Conditions - Gate a workflow run on the event context

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::context::EventContext;
use crate::error::ValidationBuilder;

/// Condition operators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    // Equality
    Equals,
    NotEquals,

    // String operations
    Contains,
    NotContains,
    StartsWith,
    EndsWith,

    // Numeric comparisons
    GreaterThan,
    LessThan,

    // List membership
    In,
    NotIn,

    // Empty checks
    IsEmpty,
    IsNotEmpty,

    /// Stored operator this build does not know; never holds.
    #[serde(other)]
    Unknown,
}

impl ConditionOperator {
    pub fn requires_value(&self) -> bool {
        !matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::GreaterThan | Self::LessThan)
    }
}

/// A single condition: `condition_type` names the context field to inspect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub id: Uuid,
    pub condition_type: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: &str, operator: ConditionOperator, value: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            condition_type: field.to_string(),
            operator,
            value,
        }
    }

    pub fn equals(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::Equals, value)
    }

    pub fn not_equals(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::NotEquals, value)
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Self::new(field, ConditionOperator::Contains, Value::String(value.to_string()))
    }

    pub fn greater_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::GreaterThan, serde_json::json!(value))
    }

    pub fn less_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::LessThan, serde_json::json!(value))
    }

    pub fn in_list(field: &str, values: Vec<Value>) -> Self {
        Self::new(field, ConditionOperator::In, Value::Array(values))
    }

    pub fn is_empty(field: &str) -> Self {
        Self::new(field, ConditionOperator::IsEmpty, Value::Null)
    }

    /// Save-time operand checks, reported under `field`.
    pub fn validate_into(&self, field: &str, errors: &mut ValidationBuilder) {
        if self.condition_type.trim().is_empty() {
            errors.push(field, "condition_type is required");
        }
        if self.operator == ConditionOperator::Unknown {
            errors.push(field, "Unknown condition operator");
            return;
        }
        if self.operator.requires_value() && self.value.is_null() {
            errors.push(field, "A comparison value is required");
        }
        if self.operator.is_numeric() && as_number(&self.value).is_none() {
            errors.push(field, "A numeric comparison value is required");
        }
        if matches!(self.operator, ConditionOperator::In | ConditionOperator::NotIn)
            && !matches!(self.value, Value::Array(_) | Value::String(_))
        {
            errors.push(field, "A list or comma-separated value is required");
        }
    }
}

/// Outcome of one condition, as reported for manual runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionCheck {
    pub condition_id: Uuid,
    pub condition_type: String,
    pub operator: ConditionOperator,
    pub passed: bool,
}

/// AND of all conditions, stopping at the first false. Empty is true.
pub fn evaluate_all<'a>(
    conditions: impl IntoIterator<Item = &'a Condition>,
    context: &EventContext,
) -> bool {
    conditions.into_iter().all(|c| evaluate(c, context))
}

/// Evaluate every condition without short-circuiting.
pub fn check_all(conditions: &[Condition], context: &EventContext) -> Vec<ConditionCheck> {
    conditions
        .iter()
        .map(|c| ConditionCheck {
            condition_id: c.id,
            condition_type: c.condition_type.clone(),
            operator: c.operator,
            passed: evaluate(c, context),
        })
        .collect()
}

pub fn evaluate(condition: &Condition, context: &EventContext) -> bool {
    let actual = context.get(&condition.condition_type).filter(|v| !v.is_null());
    let expected = &condition.value;

    let Some(actual) = actual else {
        return condition.operator == ConditionOperator::IsEmpty;
    };

    match condition.operator {
        ConditionOperator::Equals => values_equal(actual, expected),
        ConditionOperator::NotEquals => !expected.is_null() && !values_equal(actual, expected),
        ConditionOperator::Contains => contains(actual, expected),
        ConditionOperator::NotContains => !expected.is_null() && !contains(actual, expected),
        ConditionOperator::StartsWith => text_pair(actual, expected)
            .is_some_and(|(a, e)| a.starts_with(&e)),
        ConditionOperator::EndsWith => text_pair(actual, expected)
            .is_some_and(|(a, e)| a.ends_with(&e)),
        ConditionOperator::GreaterThan => {
            matches!((as_number(actual), as_number(expected)), (Some(a), Some(e)) if a > e)
        }
        ConditionOperator::LessThan => {
            matches!((as_number(actual), as_number(expected)), (Some(a), Some(e)) if a < e)
        }
        ConditionOperator::In => in_list(actual, expected),
        ConditionOperator::NotIn => !expected.is_null() && !in_list(actual, expected),
        ConditionOperator::IsEmpty => is_empty_value(actual),
        ConditionOperator::IsNotEmpty => !is_empty_value(actual),
        ConditionOperator::Unknown => false,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.to_lowercase()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string().to_lowercase()),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn text_pair(actual: &Value, expected: &Value) -> Option<(String, String)> {
    Some((as_text(actual)?, as_text(expected)?))
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    if let (Some(a), Some(e)) = (as_number(actual), as_number(expected)) {
        return a == e;
    }
    text_pair(actual, expected).is_some_and(|(a, e)| a == e)
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
        _ => text_pair(actual, expected).is_some_and(|(a, e)| a.contains(&e)),
    }
}

fn in_list(actual: &Value, expected: &Value) -> bool {
    match expected {
        Value::Array(options) => options.iter().any(|o| values_equal(actual, o)),
        Value::String(list) => list
            .split(',')
            .map(|o| Value::String(o.trim().to_string()))
            .any(|o| values_equal(actual, &o)),
        _ => false,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Common condition presets for CRM workflows
pub mod presets {
    use super::*;

    pub fn lead_stage(stage: &str) -> Condition {
        Condition::equals("lead_stage", serde_json::json!(stage))
    }

    pub fn has_tag(tag: &str) -> Condition {
        Condition::contains("contact_tags", tag)
    }

    pub fn subject_contains(keyword: &str) -> Condition {
        Condition::contains("email_subject", keyword)
    }

    pub fn email_from_domain(domain: &str) -> Condition {
        Condition::equals("email_from_domain", serde_json::json!(domain))
    }

    /// Contact not reached in more than `days` days
    pub fn quiet_for_days(days: i64) -> Condition {
        Condition::greater_than("days_since_last_contact", days as f64)
    }
}
