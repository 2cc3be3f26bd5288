use anyhow::Result;
use log::{info, error};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mailsieve::config::Config;
use mailsieve::gateway::MailGateway;
use mailsieve::processor::MailProcessor;

#[derive(Parser)]
#[command(name = "mailsieve")]
#[command(about = "Fetch Gmail messages into PostgreSQL and apply JSON rules to them")]
#[command(version = "0.1.0")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Diagnostic output (same as DEBUG=true)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Rule file (default: RULES_FILE or ./rules.json)
    #[arg(short, long, global = true)]
    rules: Option<PathBuf>,

    /// Maximum number of emails fetched in one run (default: TOTAL_EMAILS_LIMIT or 500)
    #[arg(short = 'l', long, global = true)]
    limit: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Check the configuration without connecting
    CheckConfig,
    #[command(flatten)]
    Mail(MailCommand),
}

/// Commands that need Gmail and the database
#[derive(Subcommand)]
enum MailCommand {
    /// Fetch new emails into the database
    Fetch,
    /// Apply the rules to every stored email
    ApplyRules,
    /// Fetch, then apply the rules
    Run,
    /// List the Gmail labels with their IDs
    ListLabels,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load the .env file if present
    dotenv::dotenv().ok();

    let args = Args::parse();

    let mut config = Config::new()?;
    config.verbose |= args.verbose;
    if let Some(rules) = args.rules {
        config.rules_file = rules;
    }
    if let Some(limit) = args.limit {
        config.ingest.total_limit = limit;
    }

    // RUST_LOG wins over the verbose flag when set
    let default_level = if config.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let command = match args.command {
        Command::CheckConfig => {
            print_config(&config);
            return Ok(());
        }
        Command::Mail(command) => command,
    };

    info!("🚀 Starting mailsieve");

    let processor = MailProcessor::new(config).await?;

    let result = match command {
        MailCommand::Fetch => processor.fetch().await.map(|summary| {
            info!("✅ Fetch completed: {} new email(s) saved", summary.inserted);
        }),
        MailCommand::ApplyRules => processor.apply_rules().await.map(|summary| {
            info!("✅ Rules applied: {} action(s) on {} match(es)", summary.actions_applied, summary.matches);
        }),
        MailCommand::Run => match processor.fetch().await {
            Ok(fetched) => processor.apply_rules().await.map(|applied| {
                info!(
                    "✅ Run completed: {} new email(s), {} action(s) applied",
                    fetched.inserted, applied.actions_applied
                );
            }),
            Err(e) => Err(e),
        },
        MailCommand::ListLabels => print_labels(processor.gateway()).await,
    };

    processor.close().await?;

    if let Err(e) = &result {
        error!("❌ Error: {:#}", e);
    }
    result
}

fn print_config(config: &Config) {
    println!("✅ Configuration valid!");
    println!("🔑 Credentials: {}", config.gmail.credentials_path);
    println!("💾 Token cache: {}", config.gmail.token_cache_path);
    println!("🗄️  Database: {}@{}:{}/{}",
             config.database.username, config.database.host,
             config.database.port, config.database.database);
    println!("📜 Rules: {}", config.rules_file.display());
    println!("📦 Page size {}, batch size {}, delay {:?}, limit {}",
             config.ingest.page_size, config.ingest.batch_size,
             config.ingest.inter_batch_delay, config.ingest.total_limit);
}

async fn print_labels(gateway: &dyn MailGateway) -> Result<()> {
    let mut labels = gateway.list_labels().await?;

    if labels.is_empty() {
        println!("No labels found.");
        return Ok(());
    }

    labels.sort_by(|a, b| a.name.cmp(&b.name));

    println!("Found {} label(s):\n", labels.len());
    println!("{:<40} {:<30}", "Label Name", "Label ID");
    println!("{}", "=".repeat(70));
    for label in labels {
        println!("{:<40} {:<30}", label.name, label.id);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_check_config_needs_no_mail_command() {
        let args = Args::try_parse_from(["mailsieve", "check-config"]).unwrap();
        assert!(matches!(args.command, Command::CheckConfig));
    }

    #[test]
    fn test_mail_commands_keep_their_names() {
        let args = Args::try_parse_from(["mailsieve", "apply-rules", "--rules", "my.json", "-l", "20"]).unwrap();
        assert!(matches!(args.command, Command::Mail(MailCommand::ApplyRules)));
        assert_eq!(args.rules, Some(PathBuf::from("my.json")));
        assert_eq!(args.limit, Some(20));

        for name in ["fetch", "run", "list-labels"] {
            let args = Args::try_parse_from(["mailsieve", name]).unwrap();
            assert!(matches!(args.command, Command::Mail(_)), "{} should be a mail command", name);
        }
    }
}
