//! Message store contract: keyed records plus an explicit transaction scope
use async_trait::async_trait;

use crate::email::MessageRecord;

pub mod memory;

pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("message {0} already exists")]
    Duplicate(String),

    #[error("message {0} not found")]
    NotFound(String),

    #[error("store error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn find_by_external_id(&self, external_id: &str)
        -> Result<Option<MessageRecord>, StoreError>;

    /// Every record, in ingestion order
    async fn query_all(&self) -> Result<Vec<MessageRecord>, StoreError>;

    async fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError>;
}

/// Unit of atomicity for the store.
///
/// Nothing written through a transaction is visible to other readers before
/// `commit`. A transaction dropped without `commit` is rolled back, and a
/// failed `commit` persists nothing.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Whether the id exists, including rows inserted earlier in this transaction
    async fn exists(&mut self, external_id: &str) -> Result<bool, StoreError>;

    async fn insert(&mut self, record: &MessageRecord) -> Result<(), StoreError>;

    /// Persist the mutable state (`is_read`, `labels`) of an existing record
    async fn update_state(&mut self, record: &MessageRecord) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
