use anyhow::{Context, Result};
use clap::Parser;
use keytrust_core::config::Config;
use keytrust_core::core_trust::{AcceptanceDecision, MemorySecretKeys, TrustStore};
use keytrust_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "keytrust")]
#[command(author, version, about = "Inspect and change key acceptance decisions", long_about = None)]
struct Args {
    /// Acceptance database file (overrides the configuration)
    #[arg(long)]
    db: Option<PathBuf>,

    /// TOML configuration file; KEYTRUST_* environment variables otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error); overrides the configuration
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging; overrides the configuration
    #[arg(long)]
    json_logs: bool,

    /// Email that has a usable secret key (repeatable)
    #[arg(long = "secret-key-email")]
    secret_key_emails: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
enum Command {
    /// Create the acceptance tables if they are missing
    Init,

    /// Show the acceptance of a fingerprint
    Show {
        fingerprint: String,

        /// Also report whether this email is decided for the key
        #[arg(long)]
        email: Option<String>,
    },

    /// Replace the decision and accepted emails of a fingerprint
    Set {
        fingerprint: String,

        /// undecided, unverified, verified, rejected or personal
        decision: String,

        emails: Vec<String>,
    },

    /// Accept one more email for a fingerprint
    AddEmail { fingerprint: String, email: String },

    /// Remove all acceptance state for a fingerprint
    Delete { fingerprint: String },

    /// Check whether any accepted key exists for an email
    HasAccepted { email: String },

    /// Accept a fingerprint as one of our own keys
    Personal { fingerprint: String },

    /// Remove personal acceptance of a fingerprint
    Unpersonal { fingerprint: String },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let path = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            Config::from_file(&path).with_context(|| format!("loading {}", path))?
        }
        None => Config::from_env()?,
    };

    if let Some(db) = &args.db {
        config.store.db_path = PathBuf::from(shellexpand::tilde(&db.to_string_lossy()).into_owned());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;

    let mut log_config = LogConfig::try_from(&config.logging)?;
    if let Some(level) = &args.log_level {
        log_config.level = level.parse::<LogLevel>()?;
    }
    if args.json_logs {
        log_config = log_config.json_format(true);
    }
    init_logging_with_config(log_config)?;

    debug!(db = %config.store.db_path.display(), "Using acceptance database");

    let keys = Arc::new(MemorySecretKeys::with_emails(&args.secret_key_emails));
    let store = TrustStore::open(&config, keys).await?;

    match args.command {
        Command::Init => {
            println!("{}", config.store.db_path.display());
        }
        Command::Show { fingerprint, email } => {
            let output = match email {
                Some(email) => {
                    let acceptance = store.get_acceptance(&fingerprint, &email).await?;
                    serde_json::json!({
                        "fingerprint": fingerprint.to_lowercase(),
                        "decision": acceptance.fingerprint_acceptance,
                        "email": email.to_lowercase(),
                        "email_decided": acceptance.email_decided,
                    })
                }
                None => {
                    let decision = store.get_fingerprint_acceptance(None, &fingerprint).await?;
                    let emails = store.accepted_emails(&fingerprint).await?;
                    serde_json::json!({
                        "fingerprint": fingerprint.to_lowercase(),
                        "decision": decision,
                        "emails": emails,
                    })
                }
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Set {
            fingerprint,
            decision,
            emails,
        } => {
            let decision: AcceptanceDecision = decision.parse()?;
            store.update_acceptance(&fingerprint, &emails, decision).await?;
            info!(%fingerprint, %decision, "Acceptance updated");
        }
        Command::AddEmail { fingerprint, email } => {
            store.add_accepted_email(&fingerprint, &email).await?;
        }
        Command::Delete { fingerprint } => {
            store.delete_acceptance(&fingerprint).await?;
        }
        Command::HasAccepted { email } => {
            let accepted = store.has_any_accepted_key_for_email(&email).await?;
            println!("{}", accepted);
        }
        Command::Personal { fingerprint } => {
            store.accept_as_personal_key(&fingerprint).await?;
        }
        Command::Unpersonal { fingerprint } => {
            store.delete_personal_key_acceptance(&fingerprint).await?;
        }
    }

    Ok(())
}
