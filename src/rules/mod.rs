//! Declarative rules: loading, condition evaluation and rule selection
pub mod condition;
pub mod engine;
pub mod loader;

pub use condition::{Condition, Field, FieldValue, Predicate};
pub use engine::{evaluate, evaluate_at, match_records, select_actions, Action, Combinator, Rule, RuleMatch};
pub use loader::{load_rules, parse_rules, read_rules, RuleSourceError};
