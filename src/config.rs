use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub gmail: GmailConfig,
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub rules_file: PathBuf,
    /// Gates diagnostic output only
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub credentials_path: String,
    pub token_cache_path: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }
}

/// Paging, batching and pacing of one ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Ids requested per listing page
    pub page_size: u32,
    /// Ids per batched detail fetch
    pub batch_size: usize,
    /// Pause between two detail fetches
    pub inter_batch_delay: Duration,
    /// Hard cap on ids fetched in one run
    pub total_limit: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            page_size: 50,
            batch_size: 10,
            inter_batch_delay: Duration::from_secs(2),
            total_limit: 500,
        }
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Fail early when mandatory variables are missing
        Self::check_required_vars(&lookup)?;

        let defaults = IngestConfig::default();
        let ingest = IngestConfig {
            page_size: parse_or(&lookup, "MAX_RESULTS", defaults.page_size)?,
            batch_size: parse_or(&lookup, "BATCH_SIZE", defaults.batch_size)?,
            inter_batch_delay: Duration::from_secs(parse_or(
                &lookup,
                "DELAY_BETWEEN_BATCHES",
                defaults.inter_batch_delay.as_secs(),
            )?),
            total_limit: parse_or(&lookup, "TOTAL_EMAILS_LIMIT", defaults.total_limit)?,
        };

        if ingest.page_size == 0 || ingest.batch_size == 0 {
            anyhow::bail!("MAX_RESULTS and BATCH_SIZE must be greater than zero");
        }

        Ok(Config {
            gmail: GmailConfig {
                credentials_path: lookup("GMAIL_CREDENTIALS_PATH").unwrap_or_default(),
                token_cache_path: lookup("GMAIL_TOKEN_CACHE_PATH")
                    .unwrap_or_else(|| "./gmail-token-cache.json".to_string()),
            },
            database: DatabaseConfig {
                host: lookup("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
                port: parse_or(&lookup, "DB_PORT", 5432)?,
                database: lookup("DB_NAME").unwrap_or_else(|| "mailsieve".to_string()),
                username: lookup("DB_USERNAME").unwrap_or_else(|| "postgres".to_string()),
                password: lookup("DB_PASSWORD").unwrap_or_default(),
            },
            ingest,
            rules_file: lookup("RULES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("rules.json")),
            verbose: parse_or(&lookup, "DEBUG", false)?,
        })
    }

    fn check_required_vars<F>(lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required_vars = ["GMAIL_CREDENTIALS_PATH"];

        let missing_vars: Vec<&str> = required_vars
            .iter()
            .copied()
            .filter(|var| lookup(*var).is_none())
            .collect();

        if !missing_vars.is_empty() {
            anyhow::bail!(
                "Missing environment variables: {}\n\
                 \n\
                 💡 Solutions:\n\
                 1. Create a .env file with your settings:\n\
                    GMAIL_CREDENTIALS_PATH=/path/to/client_credentials.json\n\
                    DB_PASSWORD=...\n\
                 \n\
                 2. Or export them manually:\n\
                    export GMAIL_CREDENTIALS_PATH=/path/to/client_credentials.json\n\
                    cargo run -- check-config",
                missing_vars.join(", ")
            );
        }

        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .to_lowercase()
            .parse()
            .with_context(|| format!("Invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
