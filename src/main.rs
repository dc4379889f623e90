// Contract Vault command line
//
// Every command opens the SQLite vault named by the configuration. Commands
// touching records check the session password against the validation token
// first. Logging goes to stderr; RUST_LOG=contract_vault=debug for detail.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use contract_vault::backup::{backup_file_name, is_backup_file};
use contract_vault::notifications::{parse_due_date, ExpiryNotifier, LogRelay};
use contract_vault::{RecordFields, RecordId, SqliteStorage, Vault, VaultConfig};

#[derive(Parser)]
#[command(name = "contract-vault", about = "Local encrypted contract vault")]
struct Cli {
    /// Master (session) password
    #[arg(long, env = "VAULT_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Database URL, overrides VAULT_DATABASE_URL
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Set the master password
    Init {
        /// Replace an existing password; older records stay sealed under it
        #[arg(long)]
        force: bool,
    },
    /// Check the master password
    Check,
    /// Add a record from a JSON object
    Add { json: String },
    /// Print every record readable under the password
    List,
    /// Replace a record's fields, keeping its id
    Update { id: String, json: String },
    /// Delete a record
    Delete { id: String },
    /// Write an encrypted backup
    Export {
        /// Output file (defaults to a dated .cvb name)
        path: Option<PathBuf>,
        /// Password for the archive (defaults to the master password)
        #[arg(long)]
        export_password: Option<String>,
    },
    /// Add the records of an encrypted backup
    Import {
        path: PathBuf,
        /// Password the archive was exported with (defaults to the master password)
        #[arg(long)]
        import_password: Option<String>,
    },
    /// Show or edit the stored reminder email
    Notify {
        #[command(subcommand)]
        action: NotifyAction,
    },
    /// Send due-date reminders
    Remind {
        /// Pretend today is this date (YYYY-MM-DD)
        #[arg(long)]
        today: Option<String>,
    },
}

#[derive(Subcommand)]
enum NotifyAction {
    /// Print the reminder recipient
    Show,
    /// Store the reminder email
    Set { email: String },
    /// Forget the reminder email
    Clear,
}

fn parse_fields(json: &str) -> anyhow::Result<RecordFields> {
    serde_json::from_str(json).context("record must be a JSON object")
}

fn session_password(cli_password: Option<String>) -> anyhow::Result<String> {
    cli_password.context("a password is required (--password or VAULT_PASSWORD)")
}

async fn unlock(vault: &Vault<SqliteStorage>, password: Option<String>) -> anyhow::Result<String> {
    let password = session_password(password)?;
    if !vault.gate().has_password_set().await? {
        bail!("no master password set, run `contract-vault init` first");
    }
    if !vault.gate().validate_password(&password).await {
        bail!("wrong password");
    }
    Ok(password)
}

async fn delete(vault: &Vault<SqliteStorage>, password: Option<String>, id: String) -> anyhow::Result<()> {
    unlock(vault, password).await?;
    vault.delete_record(&RecordId::from(id)).await?;
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = VaultConfig::from_env()?;
    if let Some(database) = cli.database {
        config.database_url = database;
    }

    let storage = Arc::new(SqliteStorage::connect(&config.database_url).await?);
    let vault = Vault::with_config(Arc::clone(&storage), &config)?;

    match cli.command {
        Command::Init { force } => {
            let password = session_password(cli.password)?;
            if vault.gate().has_password_set().await? && !force {
                bail!("a master password is already set (use --force to replace it)");
            }
            vault.gate().set_password_validation(&password).await?;
            println!("Master password set.");
        }
        Command::Check => {
            let password = session_password(cli.password)?;
            if vault.gate().validate_password(&password).await {
                println!("Password OK.");
            } else {
                bail!("wrong password");
            }
        }
        Command::Add { json } => {
            let password = unlock(&vault, cli.password).await?;
            let id = vault.records().create(&parse_fields(&json)?, &password).await?;
            println!("{}", id);
        }
        Command::List => {
            let password = unlock(&vault, cli.password).await?;
            let report = vault
                .loader()
                .load_report(&password, |done, total| {
                    tracing::debug!(done, total, "decrypting");
                })
                .await?;

            let skipped = report.skipped_count();
            let mut records = report.into_records();
            records.sort_by(|a, b| a.id.cmp(&b.id));
            println!("{}", serde_json::to_string_pretty(&records)?);
            if skipped > 0 {
                eprintln!("{} record(s) could not be opened with this password", skipped);
            }
        }
        Command::Update { id, json } => {
            let password = unlock(&vault, cli.password).await?;
            vault
                .update_record(&RecordId::from(id), &parse_fields(&json)?, &password)
                .await?;
            println!("Updated.");
        }
        Command::Delete { id } => {
            delete(&vault, cli.password, id).await?;
            println!("Deleted.");
        }
        Command::Export { path, export_password } => {
            let password = unlock(&vault, cli.password).await?;
            let export_password = export_password.unwrap_or_else(|| password.clone());
            let path = path.unwrap_or_else(|| PathBuf::from(backup_file_name(Local::now().date_naive())));

            let archive = vault.backup().export_all_encrypted(&password, &export_password).await?;
            tokio::fs::write(&path, archive)
                .await
                .with_context(|| format!("could not write {}", path.display()))?;
            println!("Backup written to {}", path.display());
        }
        Command::Import { path, import_password } => {
            let password = unlock(&vault, cli.password).await?;
            if !is_backup_file(&path) {
                tracing::warn!(path = %path.display(), "file does not have the .cvb backup suffix");
            }
            let import_password = import_password.unwrap_or_else(|| password.clone());
            let archive = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("could not read {}", path.display()))?;

            let summary = vault
                .backup()
                .import_encrypted_archive(&archive, &import_password, &password)
                .await?;
            println!("Imported {} record(s).", summary.imported.len());
            if summary.skipped > 0 {
                eprintln!("{} archived record(s) could not be opened", summary.skipped);
            }
        }
        Command::Notify { action } => {
            unlock(&vault, cli.password).await?;
            match action {
                NotifyAction::Show => {
                    let stored = vault.preferences().get_email().await?;
                    match (&config.notify_email, stored) {
                        (Some(env), _) => println!("{} (from VAULT_NOTIFY_EMAIL)", env),
                        (None, Some(stored)) => println!("{}", stored),
                        (None, None) => println!("No reminder email set."),
                    }
                }
                NotifyAction::Set { email } => {
                    vault.preferences().save_email(&email).await?;
                    println!("Reminder email saved.");
                }
                NotifyAction::Clear => {
                    vault.preferences().clear_email().await?;
                    println!("Reminder email cleared.");
                }
            }
        }
        Command::Remind { today } => {
            let password = unlock(&vault, cli.password).await?;
            let today: NaiveDate = match today {
                Some(raw) => parse_due_date(&raw).context("--today must be YYYY-MM-DD")?,
                None => Local::now().date_naive(),
            };

            let records = vault.loader().load_all_decrypted(&password).await?;
            let notifier = ExpiryNotifier::new(storage, Arc::new(LogRelay), config.notify_email.clone());
            let summary = notifier.check_and_notify(&records, today).await?;
            println!(
                "Reminders sent: {}, records without a due date: {}, failures: {}",
                summary.sent,
                summary.skipped,
                summary.errors.len()
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("contract_vault=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
