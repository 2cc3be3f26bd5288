//! Action executor: applies rule actions to the mailbox and to the local copy.

use log::{info, debug, warn, error};
use std::time::Duration;

use crate::email::MessageRecord;
use crate::gateway::{GatewayError, LabelModification, MailGateway, UNREAD_LABEL};
use crate::rules::Action;
use crate::store::{MessageStore, StoreError};

/// Bounded exponential backoff for single-message mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait after the `failures`-th consecutive transient failure (1-based)
    pub fn delay_after(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionFailure {
    #[error("gave up after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: GatewayError },

    #[error("{0}")]
    Remote(GatewayError),

    #[error("unable to find or create label '{label}': {source}")]
    Label { label: String, source: GatewayError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    Failed(ActionFailure),
}

/// Result of applying one action list to one record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub applied: usize,
    pub failed: usize,
    pub committed: bool,
}

pub struct ActionExecutor<'a> {
    gateway: &'a dyn MailGateway,
    retry: RetryPolicy,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(gateway: &'a dyn MailGateway, retry: RetryPolicy) -> Self {
        ActionExecutor { gateway, retry }
    }

    /// Apply one action. Local state changes only when the remote change succeeded.
    pub async fn apply(&self, record: &mut MessageRecord, action: &Action) -> ActionOutcome {
        let result = match action {
            Action::MarkAsRead => {
                info!("Marking email ID {} as read...", record.external_id);
                self.modify_with_retry(&record.external_id, &LabelModification::remove([UNREAD_LABEL]))
                    .await
                    .map(|()| record.is_read = true)
            }
            Action::MarkAsUnread => {
                info!("Marking email ID {} as unread...", record.external_id);
                self.modify_with_retry(&record.external_id, &LabelModification::add([UNREAD_LABEL]))
                    .await
                    .map(|()| record.is_read = false)
            }
            Action::MoveToLabel(label) => {
                info!("Moving email ID {} to label {}...", record.external_id, label);
                self.move_to_label(record, label).await
            }
        };

        match result {
            Ok(()) => ActionOutcome::Applied,
            Err(failure) => ActionOutcome::Failed(failure),
        }
    }

    /// Apply a whole action list in order, then persist the local changes in one transaction.
    ///
    /// If the commit fails the record is restored to its state before the pass.
    /// Remote changes already made are not undone.
    pub async fn apply_all(
        &self,
        store: &dyn MessageStore,
        record: &mut MessageRecord,
        actions: &[Action],
    ) -> PassReport {
        let snapshot = record.clone();
        let mut report = PassReport::default();

        for action in actions {
            match self.apply(record, action).await {
                ActionOutcome::Applied => report.applied += 1,
                ActionOutcome::Failed(failure) => {
                    error!("Action {} failed for email ID {}: {}", action, record.external_id, failure);
                    report.failed += 1;
                }
            }
        }

        match commit_state(store, record, *record != snapshot).await {
            Ok(()) => report.committed = true,
            Err(e) => {
                error!(
                    "An error occurred while updating the database for email ID {}: {}. Changes rolled back",
                    record.external_id, e
                );
                *record = snapshot;
            }
        }

        report
    }

    async fn move_to_label(&self, record: &mut MessageRecord, label: &str) -> Result<(), ActionFailure> {
        let label_ids = self.resolve_label(label).await.map_err(|source| ActionFailure::Label {
            label: label.to_string(),
            source,
        })?;

        self.modify_with_retry(&record.external_id, &LabelModification::add(label_ids.iter().cloned()))
            .await?;

        for id in &label_ids {
            record.add_label(id);
        }
        Ok(())
    }

    /// Ids of every label whose name matches case-insensitively; creates the
    /// label with the exact given casing when none does
    async fn resolve_label(&self, name: &str) -> Result<Vec<String>, GatewayError> {
        let wanted = name.to_lowercase();
        let existing: Vec<String> = self
            .gateway
            .list_labels()
            .await?
            .into_iter()
            .filter(|label| label.name.to_lowercase() == wanted)
            .map(|label| label.id)
            .collect();

        if !existing.is_empty() {
            debug!("Label '{}' resolved to {:?}", name, existing);
            return Ok(existing);
        }

        let created = self.gateway.create_label(name).await?;
        info!("Label '{}' created with ID {}", name, created.id);
        Ok(vec![created.id])
    }

    async fn modify_with_retry(&self, id: &str, modification: &LabelModification) -> Result<(), ActionFailure> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut failures = 0;

        loop {
            debug!("Modifying message ID {} with modifications: {}", id, modification);

            match self.gateway.modify_message(id, modification).await {
                Ok(()) => {
                    debug!("Modification successful for message ID {}", id);
                    return Ok(());
                }
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if failures >= max_attempts {
                        return Err(ActionFailure::RetriesExhausted {
                            attempts: failures,
                            last: e,
                        });
                    }
                    let wait = self.retry.delay_after(failures);
                    warn!("Retrying message ID {} due to error: {}. Waiting {:?}", id, e, wait);
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(ActionFailure::Remote(e)),
            }
        }
    }
}

async fn commit_state(store: &dyn MessageStore, record: &MessageRecord, changed: bool) -> Result<(), StoreError> {
    let mut transaction = store.begin().await?;

    if changed {
        if let Err(e) = transaction.update_state(record).await {
            if let Err(rollback_error) = transaction.rollback().await {
                warn!("Rollback failed: {}", rollback_error);
            }
            return Err(e);
        }
    }

    transaction.commit().await
}
