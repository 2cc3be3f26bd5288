use async_trait::async_trait;
use log::debug;
use std::sync::{Mutex, MutexGuard};

use super::{MessageStore, StoreError, StoreTransaction};
use crate::email::MessageRecord;

/// In-process store backing the test suite
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<MessageRecord>,
    commits: usize,
    failing_commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with records, as if they had been committed
    pub fn with_records(records: Vec<MessageRecord>) -> Self {
        MemoryStore {
            state: Mutex::new(MemoryState {
                records,
                ..Default::default()
            }),
        }
    }

    /// Make the next `count` commits fail
    pub fn fail_next_commits(&self, count: usize) {
        self.lock().failing_commits = count;
    }

    /// Number of successful commits so far
    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<MessageRecord>, StoreError> {
        Ok(self
            .lock()
            .records
            .iter()
            .find(|record| record.external_id == external_id)
            .cloned())
    }

    async fn query_all(&self) -> Result<Vec<MessageRecord>, StoreError> {
        Ok(self.lock().records.clone())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            store: self,
            inserts: Vec::new(),
            updates: Vec::new(),
        }))
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    inserts: Vec<MessageRecord>,
    updates: Vec<MessageRecord>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction<'_> {
    async fn exists(&mut self, external_id: &str) -> Result<bool, StoreError> {
        if self.inserts.iter().any(|r| r.external_id == external_id) {
            return Ok(true);
        }
        Ok(self
            .store
            .lock()
            .records
            .iter()
            .any(|r| r.external_id == external_id))
    }

    async fn insert(&mut self, record: &MessageRecord) -> Result<(), StoreError> {
        if self.exists(&record.external_id).await? {
            return Err(StoreError::Duplicate(record.external_id.clone()));
        }
        self.inserts.push(record.clone());
        Ok(())
    }

    async fn update_state(&mut self, record: &MessageRecord) -> Result<(), StoreError> {
        self.updates.retain(|r| r.external_id != record.external_id);
        self.updates.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let store = self.store;
        let mut state = store.lock();

        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            return Err(StoreError::Backend("commit rejected".to_string()));
        }

        // Validate everything before touching the records so a failure persists nothing
        for record in &self.inserts {
            if state.records.iter().any(|r| r.external_id == record.external_id) {
                return Err(StoreError::Duplicate(record.external_id.clone()));
            }
        }
        for record in &self.updates {
            let known = state.records.iter().any(|r| r.external_id == record.external_id)
                || self.inserts.iter().any(|r| r.external_id == record.external_id);
            if !known {
                return Err(StoreError::NotFound(record.external_id.clone()));
            }
        }

        let MemoryTransaction { inserts, updates, .. } = *self;
        debug!("Committing {} insert(s) and {} update(s)", inserts.len(), updates.len());

        state.records.extend(inserts);
        for update in updates {
            if let Some(existing) = state
                .records
                .iter_mut()
                .find(|r| r.external_id == update.external_id)
            {
                existing.is_read = update.is_read;
                existing.labels = update.labels;
            }
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        debug!(
            "Rolling back {} insert(s) and {} update(s)",
            self.inserts.len(),
            self.updates.len()
        );
        Ok(())
    }
}
