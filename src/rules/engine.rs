use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Deserialize;
use std::fmt;

use super::condition::Condition;
use crate::email::MessageRecord;
use crate::store::{MessageStore, StoreError};

/// Boolean join over a rule's conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    All,
    Any,
    /// Missing or unknown combinator: the rule never matches
    #[default]
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    MarkAsRead,
    MarkAsUnread,
    /// Add the label with this name, creating it when the mailbox has none
    MoveToLabel(String),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::MarkAsRead => write!(f, "mark_as_read"),
            Action::MarkAsUnread => write!(f, "mark_as_unread"),
            Action::MoveToLabel(label) => write!(f, "move_message({})", label),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub conditions: Vec<Condition>,
    pub combinator: Combinator,
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn matches_at(&self, record: &MessageRecord, now: DateTime<Utc>) -> bool {
        match self.combinator {
            Combinator::All => self.conditions.iter().all(|c| c.matches(record, now)),
            Combinator::Any => self.conditions.iter().any(|c| c.matches(record, now)),
            Combinator::Unrecognized => false,
        }
    }
}

/// One rule that matched one record, with the actions it asks for
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub record: MessageRecord,
    pub rule_name: String,
    pub actions: Vec<Action>,
}

pub fn evaluate(record: &MessageRecord, rule: &Rule) -> bool {
    evaluate_at(record, rule, Utc::now())
}

pub fn evaluate_at(record: &MessageRecord, rule: &Rule, now: DateTime<Utc>) -> bool {
    rule.matches_at(record, now)
}

/// Pair every record with every rule it matches.
///
/// Records keep their order, rules keep file order within a record, and every
/// matching rule fires: a match never stops the remaining rules.
pub fn match_records(records: &[MessageRecord], rules: &[Rule], now: DateTime<Utc>) -> Vec<RuleMatch> {
    let mut matches = Vec::new();

    for record in records {
        for rule in rules {
            if rule.matches_at(record, now) {
                debug!("Email ID {} matches rule '{}'", record.external_id, rule.name);
                matches.push(RuleMatch {
                    record: record.clone(),
                    rule_name: rule.name.clone(),
                    actions: rule.actions.clone(),
                });
            }
        }
    }

    matches
}

/// Scan the whole store against the rules
pub async fn select_actions(store: &dyn MessageStore, rules: &[Rule]) -> Result<Vec<RuleMatch>, StoreError> {
    let records = store.query_all().await?;
    info!("Evaluating {} rule(s) against {} emails", rules.len(), records.len());
    Ok(match_records(&records, rules, Utc::now()))
}
