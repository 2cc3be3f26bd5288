/// Common structures shared by ingestion and rule processing
use chrono::{DateTime, Utc};
use log::warn;

use crate::gateway::{MessageDetail, UNREAD_LABEL};

/// Local copy of one remote message.
///
/// `is_read` and `labels` reflect the provider state at ingestion time plus
/// whatever the action executor changed since. Changes made in the mailbox by
/// other clients are never picked up for an existing record, so both fields
/// are a cache that can be stale.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub external_id: String,
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    pub labels: Vec<String>,
}

impl MessageRecord {
    /// Build a record from a provider detail response
    pub fn from_detail(external_id: &str, detail: &MessageDetail) -> Self {
        let received_at = match detail.internal_date_millis.and_then(DateTime::from_timestamp_millis) {
            Some(date) => date,
            None => {
                warn!("No usable internal date for message {}, using current date", external_id);
                Utc::now()
            }
        };

        MessageRecord {
            external_id: external_id.to_string(),
            sender: detail.header("From").map(str::to_string),
            subject: detail.header("Subject").map(str::to_string),
            snippet: detail.snippet.clone(),
            received_at,
            is_read: !detail.label_ids.iter().any(|label| label == UNREAD_LABEL),
            labels: detail.label_ids.clone(),
        }
    }

    /// Labels in their persisted form
    pub fn labels_joined(&self) -> String {
        self.labels.join(",")
    }

    /// Inverse of [`MessageRecord::labels_joined`]
    pub fn split_labels(joined: &str) -> Vec<String> {
        joined
            .split(',')
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn has_label(&self, label_id: &str) -> bool {
        self.labels.iter().any(|label| label == label_id)
    }

    /// Append a label id, keeping the existing order and skipping duplicates
    pub fn add_label(&mut self, label_id: &str) {
        if !self.has_label(label_id) {
            self.labels.push(label_id.to_string());
        }
    }
}
