//! Command-line utility for operating bulkmail
//!
//! This tool works directly on local files, without the service running:
//! - Encrypting provider API keys for the `users` section of the config
//! - Checking a stored key decrypts under the current secret
//! - Splitting a recipient CSV the way the API does
//! - Reading send history, stats and batch summaries from a file ledger

use std::path::{Path, PathBuf};

use bulkmail_common::{BatchId, BatchResult, UserId, parse_csv_emails};
use bulkmail_ledger::{FileLogStore, LogQuery, LogStore};
use bulkmail_vault::Vault;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

/// Command-line utility for operating bulkmail
#[derive(Parser, Debug)]
#[command(name = "bulkmailctl")]
#[command(about = "Operate the bulkmail dispatch engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Environment variable holding the encryption secret
    #[arg(long, default_value = "ENCRYPTION_SECRET")]
    secret_env: String,

    /// Path to the file ledger (for history commands)
    #[arg(short, long, default_value = "/var/lib/bulkmail/ledger")]
    ledger_path: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt an API key read from stdin
    EncryptKey,
    /// Check that a stored key decrypts under the current secret
    DecryptCheck {
        /// The `salt:iv:ciphertext:tag` value from the config
        stored: String,
    },
    /// Split a CSV file into valid, invalid and duplicate recipients
    Recipients {
        /// File to read (`-` for stdin)
        file: PathBuf,
    },
    /// List a user's send history
    Logs {
        /// User whose history to show
        #[arg(short, long)]
        user: String,

        /// Filter by status
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,

        /// Only attempts queued on or after this day (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        from: Option<String>,

        /// Only attempts queued on or before this day (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        to: Option<String>,

        /// Case-insensitive match on recipient or subject
        #[arg(long)]
        search: Option<String>,

        #[arg(long, default_value = "1")]
        page: usize,

        #[arg(long, default_value = "20")]
        page_size: usize,
    },
    /// Show a user's send totals
    Stats {
        #[arg(short, long)]
        user: String,
    },
    /// Rebuild a batch summary from the ledger
    Batch {
        /// Batch id
        batch_id: String,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum StatusFilter {
    Queued,
    Sent,
    Failed,
}

impl StatusFilter {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::EncryptKey => cmd_encrypt_key(&cli.secret_env)?,
        Commands::DecryptCheck { stored } => cmd_decrypt_check(&cli.secret_env, &stored)?,
        Commands::Recipients { file } => cmd_recipients(&file, cli.format)?,
        Commands::Logs {
            user,
            status,
            from,
            to,
            search,
            page,
            page_size,
        } => {
            let query: LogQuery = serde_json::from_value(json!({
                "page": page,
                "pageSize": page_size,
                "status": status.map(StatusFilter::as_str),
                "dateFrom": from,
                "dateTo": to,
                "search": search,
            }))?;
            cmd_logs(&cli.ledger_path, &UserId::new(user), &query, cli.format).await?;
        }
        Commands::Stats { user } => {
            cmd_stats(&cli.ledger_path, &UserId::new(user), cli.format).await?;
        }
        Commands::Batch { batch_id } => {
            let batch_id: BatchId = batch_id
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid batch id {batch_id}: {e}"))?;
            cmd_batch(&cli.ledger_path, batch_id, cli.format).await?;
        }
    }

    Ok(())
}

fn open_ledger(path: &Path) -> anyhow::Result<FileLogStore> {
    if !path.is_dir() {
        anyhow::bail!("No ledger at {}", path.display());
    }

    Ok(FileLogStore::new(path)?)
}

fn cmd_encrypt_key(secret_env: &str) -> anyhow::Result<()> {
    let vault = Vault::from_env(secret_env)?;

    let key = std::io::read_to_string(std::io::stdin())?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("No API key on stdin");
    }

    println!("{}", vault.encrypt(key)?);
    Ok(())
}

fn cmd_decrypt_check(secret_env: &str, stored: &str) -> anyhow::Result<()> {
    let vault = Vault::from_env(secret_env)?;
    let key = vault.decrypt(stored)?;

    let visible: String = key.chars().take(4).collect();
    println!("OK: decrypts to a {}-character key starting {visible}...", key.chars().count());
    Ok(())
}

fn cmd_recipients(file: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let content = if file == Path::new("-") {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(file)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", file.display()))?
    };

    let parsed = parse_csv_emails(&content);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&parsed)?),
        OutputFormat::Text => {
            for email in &parsed.valid {
                println!("{email}");
            }

            if !parsed.invalid.is_empty() {
                eprintln!("\nInvalid ({}):", parsed.invalid.len());
                for entry in &parsed.invalid {
                    eprintln!("  - {entry}");
                }
            }

            if !parsed.duplicates.is_empty() {
                eprintln!("\nDuplicates ({}):", parsed.duplicates.len());
                for entry in &parsed.duplicates {
                    eprintln!("  - {entry}");
                }
            }

            eprintln!(
                "\nValid: {}, invalid: {}, duplicates: {}",
                parsed.valid.len(),
                parsed.invalid.len(),
                parsed.duplicates.len()
            );
        }
    }

    Ok(())
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }

    let mut short: String = value.chars().take(width.saturating_sub(3)).collect();
    short.push_str("...");
    short
}

async fn cmd_logs(
    ledger_path: &Path,
    user: &UserId,
    query: &LogQuery,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let store = open_ledger(ledger_path)?;
    let page = store.query(user, query).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&page)?),
        OutputFormat::Text => {
            println!(
                "{:<20} {:<7} {:<32} {:<30} {}",
                "QUEUED AT", "STATUS", "RECIPIENT", "SUBJECT", "ERROR"
            );
            println!("{}", "-".repeat(100));

            for attempt in &page.data {
                println!(
                    "{:<20} {:<7} {:<32} {:<30} {}",
                    attempt.queued_at.format("%Y-%m-%d %H:%M:%S"),
                    attempt.status(),
                    truncate(&attempt.recipient, 32),
                    truncate(&attempt.subject, 30),
                    attempt.error_message().unwrap_or_default()
                );
            }

            println!(
                "\nPage {} of {} ({} attempt(s))",
                page.page,
                page.total_pages.max(1),
                page.total
            );
        }
    }

    Ok(())
}

async fn cmd_stats(ledger_path: &Path, user: &UserId, format: OutputFormat) -> anyhow::Result<()> {
    let store = open_ledger(ledger_path)?;
    let stats = store.stats(user).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => {
            println!("Send statistics for {user}");
            println!("{}", "=".repeat(40));
            println!("Total:        {}", stats.total);
            println!("Sent:         {}", stats.sent);
            println!("Failed:       {}", stats.failed);
            println!("Queued:       {}", stats.queued);
            println!("Success rate: {:.1}%", stats.success_rate * 100.0);
            if let Some(last) = stats.last_sent_at {
                println!("Last sent:    {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
    }

    Ok(())
}

async fn cmd_batch(ledger_path: &Path, batch_id: BatchId, format: OutputFormat) -> anyhow::Result<()> {
    let store = open_ledger(ledger_path)?;
    let attempts = store.attempts_for_batch(batch_id).await?;

    let Some(first) = attempts.first() else {
        anyhow::bail!("No attempts recorded for batch {batch_id}");
    };

    let result = BatchResult::from_attempts(batch_id, &attempts);
    let queued = attempts.len() - result.total;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            println!("Batch:  {batch_id}");
            println!("User:   {}", first.user_id);
            println!("Total:  {}", result.total);
            println!("Sent:   {}", result.sent);
            println!("Failed: {}", result.failed);
            if queued > 0 {
                println!("Queued: {queued}");
            }

            if !result.errors.is_empty() {
                println!("\nErrors:");
                for error in &result.errors {
                    println!("  - {}: {}", error.recipient, error.error);
                }
            }
        }
    }

    Ok(())
}
