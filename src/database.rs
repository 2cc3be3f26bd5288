use anyhow::{Result, Context};
use async_trait::async_trait;
use log::{info, debug};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};

use crate::config::DatabaseConfig;
use crate::email::MessageRecord;
use crate::store::{MessageStore, StoreError, StoreTransaction};

const SELECT_COLUMNS: &str =
    "message_id, sender, subject, message_snippet, received_datetime, is_read, labels";

pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to PostgreSQL database");

        let pool = PgPool::connect(&config.url())
            .await
            .context("Unable to connect to the database")?;

        info!("Database connection established");

        let store = PgMessageStore { pool };

        // Create tables if they don't exist
        store.create_tables_if_not_exists().await?;

        Ok(store)
    }

    async fn create_tables_if_not_exists(&self) -> Result<()> {
        info!("Checking/creating database tables");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS emails (
                id BIGSERIAL PRIMARY KEY,
                message_id VARCHAR(255) UNIQUE NOT NULL,
                sender TEXT,
                subject TEXT,
                message_snippet TEXT,
                received_datetime TIMESTAMPTZ NOT NULL,
                is_read BOOLEAN NOT NULL DEFAULT FALSE,
                labels TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ DEFAULT NOW(),
                updated_at TIMESTAMPTZ DEFAULT NOW()
            )
            "#
        )
        .execute(&self.pool)
        .await
        .context("Unable to create emails table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_emails_received ON emails (received_datetime DESC)"
        )
        .execute(&self.pool)
        .await
        .context("Unable to create index on received_datetime")?;

        info!("Database tables checked/created successfully");
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        info!("Closing database connection");
        self.pool.close().await;
        Ok(())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        StoreError::Backend(format!("database error: {}", error))
    }
}

fn record_from_row(row: &PgRow) -> Result<MessageRecord, StoreError> {
    let labels: String = row.try_get("labels")?;

    Ok(MessageRecord {
        external_id: row.try_get("message_id")?,
        sender: row.try_get("sender")?,
        subject: row.try_get("subject")?,
        snippet: row.try_get("message_snippet")?,
        received_at: row.try_get("received_datetime")?,
        is_read: row.try_get("is_read")?,
        labels: MessageRecord::split_labels(&labels),
    })
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<MessageRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM emails WHERE message_id = $1", SELECT_COLUMNS))
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn query_all(&self) -> Result<Vec<MessageRecord>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {} FROM emails ORDER BY id", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        let transaction = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { transaction }))
    }
}

/// Wraps a sqlx transaction, which rolls back on drop unless committed
struct PgTransaction {
    transaction: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn exists(&mut self, external_id: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query("SELECT 1 FROM emails WHERE message_id = $1")
            .bind(external_id)
            .fetch_optional(&mut *self.transaction)
            .await?;

        Ok(exists.is_some())
    }

    async fn insert(&mut self, record: &MessageRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO emails
            (message_id, sender, subject, message_snippet, received_datetime, is_read, labels)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#
        )
        .bind(&record.external_id)
        .bind(&record.sender)
        .bind(&record.subject)
        .bind(&record.snippet)
        .bind(record.received_at)
        .bind(record.is_read)
        .bind(record.labels_joined())
        .execute(&mut *self.transaction)
        .await?;

        debug!("Email staged for insert: {}", record.external_id);
        Ok(())
    }

    async fn update_state(&mut self, record: &MessageRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE emails SET is_read = $2, labels = $3, updated_at = NOW() WHERE message_id = $1"
        )
        .bind(&record.external_id)
        .bind(record.is_read)
        .bind(record.labels_joined())
        .execute(&mut *self.transaction)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(record.external_id.clone()));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.transaction.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.transaction.rollback().await?;
        Ok(())
    }
}
