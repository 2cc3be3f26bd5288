//! Batch ingestion: pages through the remote listing, fetches details in
//! paced batches and inserts messages that are not stored yet.

use log::{info, debug, warn, error};

use crate::config::IngestConfig;
use crate::email::MessageRecord;
use crate::gateway::{BatchResponse, GatewayError, MailGateway};
use crate::store::{MessageStore, StoreError, StoreTransaction};

/// Counters for one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    pub pages: usize,
    pub batches: usize,
    /// Ids sent to the gateway in detail fetches
    pub fetched: usize,
    pub inserted: usize,
    pub skipped_existing: usize,
    /// Ids whose detail fetch failed
    pub failed: usize,
    /// Batches rolled back because the store rejected them
    pub failed_commits: usize,
}

/// Run one ingestion pass.
///
/// Only a failure of the listing itself is returned as an error; per-message
/// fetch errors and store failures are logged, counted, and skipped.
pub async fn ingest(
    gateway: &dyn MailGateway,
    store: &dyn MessageStore,
    config: &IngestConfig,
) -> Result<IngestionSummary, GatewayError> {
    let limit = config.total_limit;
    let batch_size = config.batch_size.max(1);
    let mut summary = IngestionSummary::default();
    let mut page_token: Option<String> = None;

    'pages: loop {
        if summary.fetched >= limit {
            info!("Reached the total email limit of {}. Stopping fetch.", limit);
            break;
        }

        debug!("Fetching email list page (token: {:?})", page_token);
        let page = gateway
            .list_messages(page_token.as_deref(), config.page_size)
            .await?;
        summary.pages += 1;

        if page.ids.is_empty() {
            debug!("Empty page, nothing left to fetch");
            break;
        }

        for group in page.ids.chunks(batch_size) {
            if summary.fetched >= limit {
                info!("Reached the total email limit of {}. Stopping batch processing.", limit);
                break 'pages;
            }

            let remaining = limit - summary.fetched;
            let batch: Vec<String> = group.iter().take(remaining).cloned().collect();
            for id in &batch {
                debug!("Adding message ID {} to batch request", id);
            }

            if summary.batches > 0 && !config.inter_batch_delay.is_zero() {
                debug!("Waiting {:?} before next batch", config.inter_batch_delay);
                tokio::time::sleep(config.inter_batch_delay).await;
            }

            summary.fetched += batch.len();
            summary.batches += 1;

            let responses = gateway.get_message_batch(&batch).await;
            match persist_batch(store, responses, &mut summary).await {
                Ok(inserted) => {
                    summary.inserted += inserted;
                    info!("Batch {} saved: {} new email(s) out of {}", summary.batches, inserted, batch.len());
                }
                Err(e) => {
                    summary.failed_commits += 1;
                    error!("Batch {} rolled back, store failure: {}", summary.batches, e);
                }
            }
        }

        match page.next_page_token.filter(|token| !token.is_empty()) {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    info!(
        "Ingestion completed: {} fetched, {} inserted, {} already stored, {} failed",
        summary.fetched, summary.inserted, summary.skipped_existing, summary.failed
    );

    Ok(summary)
}

/// Stage every new message of one batch and commit them together
async fn persist_batch(
    store: &dyn MessageStore,
    responses: BatchResponse,
    summary: &mut IngestionSummary,
) -> Result<usize, StoreError> {
    let mut transaction = store.begin().await?;

    let staged = match stage_batch(&mut *transaction, responses, summary).await {
        Ok(staged) => staged,
        Err(e) => {
            if let Err(rollback_error) = transaction.rollback().await {
                warn!("Rollback failed: {}", rollback_error);
            }
            return Err(e);
        }
    };

    transaction.commit().await?;
    Ok(staged)
}

async fn stage_batch(
    transaction: &mut (dyn StoreTransaction + '_),
    responses: BatchResponse,
    summary: &mut IngestionSummary,
) -> Result<usize, StoreError> {
    let mut staged = 0;

    for (id, response) in responses {
        let detail = match response {
            Ok(detail) => detail,
            Err(e) => {
                error!("An error occurred for message ID {} ({}): {}", id, e.class(), e);
                summary.failed += 1;
                continue;
            }
        };

        if transaction.exists(&id).await? {
            debug!("Email ID {} already exists in the database. Skipping...", id);
            summary.skipped_existing += 1;
            continue;
        }

        let record = MessageRecord::from_detail(&id, &detail);
        transaction.insert(&record).await?;
        staged += 1;
    }

    Ok(staged)
}
