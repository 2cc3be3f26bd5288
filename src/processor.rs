use anyhow::{Result, Context};
use chrono::Utc;
use log::{info, error};

use crate::actions::{ActionExecutor, RetryPolicy};
use crate::config::Config;
use crate::database::PgMessageStore;
use crate::gateway::MailGateway;
use crate::gmail_client::GmailGateway;
use crate::ingest::{ingest, IngestionSummary};
use crate::rules::{evaluate_at, load_rules, Rule};
use crate::store::{MessageStore, StoreError};

/// Counters for one rule application run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub records_scanned: usize,
    /// (record, rule) pairs that matched
    pub matches: usize,
    pub actions_applied: usize,
    pub actions_failed: usize,
    pub commits: usize,
    pub failed_commits: usize,
}

/// Evaluate every stored record against the rules and execute the matching actions.
///
/// Rules are checked in file order against the record as left by the previous
/// rule's pass, so a rule whose condition an earlier pass invalidated is skipped.
pub async fn apply_rules(
    gateway: &dyn MailGateway,
    store: &dyn MessageStore,
    rules: &[Rule],
    retry: RetryPolicy,
) -> Result<ApplySummary, StoreError> {
    let records = store.query_all().await?;
    info!("Applying {} rule(s) to {} emails...", rules.len(), records.len());

    let mut summary = ApplySummary {
        records_scanned: records.len(),
        ..Default::default()
    };

    let executor = ActionExecutor::new(gateway, retry);
    let now = Utc::now();

    for mut record in records {
        for rule in rules {
            if !evaluate_at(&record, rule, now) {
                continue;
            }
            summary.matches += 1;

            info!(
                "Email ID {} matches rule '{}', applying {} action(s)...",
                record.external_id,
                rule.name,
                rule.actions.len()
            );

            let report = executor.apply_all(store, &mut record, &rule.actions).await;
            summary.actions_applied += report.applied;
            summary.actions_failed += report.failed;
            if report.committed {
                summary.commits += 1;
            } else {
                summary.failed_commits += 1;
            }
        }
    }

    info!(
        "Rules applied: {} match(es), {} action(s) applied, {} failed",
        summary.matches, summary.actions_applied, summary.actions_failed
    );

    Ok(summary)
}

/// Production wiring: Gmail on one side, PostgreSQL on the other
pub struct MailProcessor {
    config: Config,
    gateway: GmailGateway,
    store: PgMessageStore,
}

impl MailProcessor {
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing mail processor");

        let gateway = GmailGateway::new(&config.gmail).await
            .context("Unable to connect to Gmail API")?;

        let store = PgMessageStore::new(&config.database).await
            .context("Unable to initialize database")?;

        Ok(MailProcessor {
            config,
            gateway,
            store,
        })
    }

    pub async fn fetch(&self) -> Result<IngestionSummary> {
        info!("Fetching emails...");
        let summary = ingest(&self.gateway, &self.store, &self.config.ingest).await
            .context("Unable to list messages")?;

        if summary.failed > 0 || summary.failed_commits > 0 {
            error!(
                "{} email(s) could not be fetched and {} batch(es) could not be saved",
                summary.failed, summary.failed_commits
            );
        }
        Ok(summary)
    }

    pub async fn apply_rules(&self) -> Result<ApplySummary> {
        let rules = load_rules(&self.config.rules_file);
        if rules.is_empty() {
            info!("No rules to apply");
        }

        apply_rules(&self.gateway, &self.store, &rules, RetryPolicy::default())
            .await
            .context("Unable to read emails from the database")
    }

    pub fn gateway(&self) -> &GmailGateway {
        &self.gateway
    }

    pub async fn close(self) -> Result<()> {
        info!("Closing mail processor");
        self.store.close().await
            .context("Error closing database")?;
        Ok(())
    }
}
