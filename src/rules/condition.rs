use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::email::MessageRecord;

/// Record attributes a condition can name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ExternalId,
    Sender,
    Subject,
    Snippet,
    ReceivedAt,
    IsRead,
    Labels,
}

/// Typed view of one record attribute
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Labels(&'a [String]),
}

impl Field {
    /// Resolve a field name from a rule file; the second name of each pair is
    /// the database column name accepted by older rule files
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "external_id" | "message_id" => Some(Field::ExternalId),
            "sender" | "from" => Some(Field::Sender),
            "subject" => Some(Field::Subject),
            "snippet" | "message_snippet" => Some(Field::Snippet),
            "received_at" | "received_datetime" => Some(Field::ReceivedAt),
            "is_read" => Some(Field::IsRead),
            "labels" => Some(Field::Labels),
            _ => None,
        }
    }

    /// Value of this field on the record, `None` when the record has none
    pub fn value_of(self, record: &MessageRecord) -> Option<FieldValue<'_>> {
        match self {
            Field::ExternalId => Some(FieldValue::Text(&record.external_id)),
            Field::Sender => record.sender.as_deref().map(FieldValue::Text),
            Field::Subject => record.subject.as_deref().map(FieldValue::Text),
            Field::Snippet => record.snippet.as_deref().map(FieldValue::Text),
            Field::ReceivedAt => Some(FieldValue::Timestamp(record.received_at)),
            Field::IsRead => Some(FieldValue::Bool(record.is_read)),
            Field::Labels => Some(FieldValue::Labels(&record.labels)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Contains,
    DoesNotContain,
    Equals,
    DoesNotEqual,
    /// Timestamp is more recent than `now - N days`
    LessThan,
    /// Timestamp is older than `now - N days`
    GreaterThan,
    /// Any predicate name this version does not know; never matches
    #[serde(other)]
    Unsupported,
}

/// One `{field, predicate, value}` entry of a rule
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Condition {
    pub field: String,
    pub predicate: Predicate,
    #[serde(deserialize_with = "scalar_as_string")]
    pub value: String,
}

impl Condition {
    pub fn new(field: &str, predicate: Predicate, value: &str) -> Self {
        Condition {
            field: field.to_string(),
            predicate,
            value: value.to_string(),
        }
    }

    /// Evaluate against a record with `now` as the reference for day offsets.
    ///
    /// Unknown fields, absent values, uncoercible rule values and predicates
    /// that do not apply to the field type all yield `false`.
    pub fn matches(&self, record: &MessageRecord, now: DateTime<Utc>) -> bool {
        let Some(field) = Field::from_name(&self.field) else {
            debug!("Unknown field '{}' in condition, treated as no match", self.field);
            return false;
        };
        let Some(actual) = field.value_of(record) else {
            return false;
        };

        debug!(
            "Checking condition: Field={}, Predicate={:?}, Value={}",
            self.field, self.predicate, self.value
        );

        match (self.predicate, actual) {
            (Predicate::Contains, actual) => contains(actual, &self.value).unwrap_or(false),
            (Predicate::DoesNotContain, actual) => contains(actual, &self.value)
                .map(|found| !found)
                .unwrap_or(false),
            (Predicate::Equals, actual) => equals(actual, &self.value).unwrap_or(false),
            (Predicate::DoesNotEqual, actual) => equals(actual, &self.value)
                .map(|equal| !equal)
                .unwrap_or(false),
            (Predicate::LessThan, FieldValue::Timestamp(received)) => {
                cutoff(&self.value, now).is_some_and(|cutoff| received > cutoff)
            }
            (Predicate::GreaterThan, FieldValue::Timestamp(received)) => {
                cutoff(&self.value, now).is_some_and(|cutoff| received < cutoff)
            }
            _ => false,
        }
    }
}

/// `None` when the field type has no notion of containment
fn contains(actual: FieldValue<'_>, expected: &str) -> Option<bool> {
    match actual {
        FieldValue::Text(text) => Some(text.contains(expected)),
        FieldValue::Labels(labels) => Some(labels.iter().any(|label| label == expected)),
        FieldValue::Bool(_) | FieldValue::Timestamp(_) => None,
    }
}

/// `None` when the field type cannot be compared to a rule literal
fn equals(actual: FieldValue<'_>, expected: &str) -> Option<bool> {
    match actual {
        FieldValue::Text(text) => Some(text == expected),
        FieldValue::Bool(value) => Some(value == expected.trim().eq_ignore_ascii_case("true")),
        FieldValue::Labels(labels) => Some(labels.join(",") == expected),
        FieldValue::Timestamp(_) => None,
    }
}

/// `now - N days`, with N read from the rule value
fn cutoff(days: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let days: i64 = days.trim().parse().ok()?;
    now.checked_sub_signed(Duration::try_days(days)?)
}

/// Rule files sometimes carry numbers or booleans where a string is expected
fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a string, number or boolean value, found {}",
            other
        ))),
    }
}
