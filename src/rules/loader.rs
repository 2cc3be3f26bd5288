//! Reading rule definitions from their JSON source.
//!
//! ```json
//! {"rules": [{"name": "spam",
//!             "conditions": [{"field": "sender", "predicate": "contains", "value": "@spam.com"}],
//!             "predicate": "all",
//!             "actions": [{"action": "mark_as_read"}, {"action": "move_message", "label": "Spam"}]}]}
//! ```

use log::{info, warn, error};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::condition::Condition;
use super::engine::{Action, Combinator, Rule};

#[derive(Debug, thiserror::Error)]
pub enum RuleSourceError {
    #[error("unable to read rule file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed rule source: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct RuleSource {
    rules: Vec<RuleDef>,
}

#[derive(Debug, Deserialize)]
struct RuleDef {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    conditions: Vec<Condition>,
    #[serde(default, rename = "predicate")]
    combinator: Combinator,
    #[serde(default)]
    actions: Vec<ActionDef>,
}

#[derive(Debug, Deserialize)]
struct ActionDef {
    action: String,
    #[serde(default)]
    label: Option<String>,
}

impl ActionDef {
    fn into_action(self, rule_name: &str) -> Option<Action> {
        match self.action.as_str() {
            "mark_as_read" => Some(Action::MarkAsRead),
            "mark_as_unread" => Some(Action::MarkAsUnread),
            "move_message" | "move_to_label" => match self.label {
                Some(label) if !label.trim().is_empty() => Some(Action::MoveToLabel(label)),
                _ => {
                    warn!("Rule '{}': '{}' action without a label ignored", rule_name, self.action);
                    None
                }
            },
            other => {
                warn!("Rule '{}': unknown action '{}' ignored", rule_name, other);
                None
            }
        }
    }
}

/// Strict parse of a rule document
pub fn parse_rules(source: &str) -> Result<Vec<Rule>, RuleSourceError> {
    let document: RuleSource = serde_json::from_str(source)?;

    let rules = document
        .rules
        .into_iter()
        .enumerate()
        .map(|(index, def)| {
            let name = def.name.unwrap_or_else(|| format!("rule #{}", index + 1));
            if def.combinator == Combinator::Unrecognized {
                warn!("Rule '{}' has no valid predicate (expected \"all\" or \"any\"), it will never match", name);
            }
            let actions = def
                .actions
                .into_iter()
                .filter_map(|action| action.into_action(&name))
                .collect();
            Rule {
                name,
                conditions: def.conditions,
                combinator: def.combinator,
                actions,
            }
        })
        .collect();

    Ok(rules)
}

pub fn read_rules(path: &Path) -> Result<Vec<Rule>, RuleSourceError> {
    let content = std::fs::read_to_string(path).map_err(|source| RuleSourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_rules(&content)
}

/// Load rules, reporting any problem and falling back to an empty rule set
pub fn load_rules(path: &Path) -> Vec<Rule> {
    info!("Loading rules from {}...", path.display());
    match read_rules(path) {
        Ok(rules) => {
            info!("{} rule(s) loaded successfully", rules.len());
            rules
        }
        Err(e) => {
            error!("Error loading rules: {}", e);
            Vec::new()
        }
    }
}
