//! Featurelock CLI - inspect and manage per-user feature locks

use clap::{Args, Parser, Subcommand};
use featurelock_core::config::Config;
use featurelock_core::domain::{FeatureKey, UserFeatureManager};
use featurelock_core::storage::{Database, DatabaseConfig};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "featurelock")]
#[command(author, version, about = "Per-user feature locks with attached properties", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// SQLite database file (overrides database.path)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// The `(user, tenant, feature)` triple every lock command acts on
#[derive(Args, Debug, Clone)]
struct Target {
    /// User identifier
    #[arg(short, long)]
    user: String,
    /// Tenant identifier
    #[arg(short, long, allow_negative_numbers = true)]
    tenant: i32,
    /// Feature identifier
    #[arg(short, long)]
    feature: String,
}

impl Target {
    fn key(&self) -> FeatureKey {
        FeatureKey::new(self.user.clone(), self.tenant, self.feature.clone())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the lock status of a feature
    Status {
        #[command(flatten)]
        target: Target,
    },

    /// Lock a feature
    Lock {
        #[command(flatten)]
        target: Target,
        /// Lock duration in milliseconds (negative locks indefinitely)
        #[arg(short, long, allow_negative_numbers = true, conflicts_with = "indefinite")]
        duration_ms: Option<i64>,
        /// Lock until explicitly unlocked
        #[arg(long)]
        indefinite: bool,
        /// Machine-readable reason code
        #[arg(long)]
        reason_code: Option<String>,
        /// Human-readable reason
        #[arg(long)]
        reason: Option<String>,
    },

    /// Unlock a feature
    Unlock {
        #[command(flatten)]
        target: Target,
    },

    /// Manage feature lock properties
    Props {
        #[command(subcommand)]
        action: PropsAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check database and configuration health
    Doctor,
}

#[derive(Subcommand)]
enum PropsAction {
    /// Show all properties, or one with --name
    Get {
        #[command(flatten)]
        target: Target,
        /// Single property to show
        #[arg(long)]
        name: Option<String>,
    },
    /// Merge NAME=VALUE pairs into the stored properties
    Set {
        #[command(flatten)]
        target: Target,
        /// Properties as NAME=VALUE
        #[arg(required = true, value_parser = parse_property)]
        properties: Vec<(String, String)>,
    },
    /// Delete the named properties
    Delete {
        #[command(flatten)]
        target: Target,
        /// Property names
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Delete every property
    Clear {
        #[command(flatten)]
        target: Target,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

/// Parse a `NAME=VALUE` pair
fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", raw)),
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_database(config: &Config, path: Option<PathBuf>) -> anyhow::Result<Database> {
    let db_config = match path {
        Some(path) => DatabaseConfig::with_path(path).max_connections(config.database.max_connections),
        None => DatabaseConfig::from_settings(&config.database),
    };
    debug!(path = %db_config.path.display(), "Opening database");
    Database::new(db_config).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("featurelock=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let result = run(cli).await;
    if let Err(err) = &result {
        if let Some(suggestion) = err
            .downcast_ref::<featurelock_core::Error>()
            .and_then(|e| e.suggestion())
        {
            eprintln!("Hint: {}", suggestion);
        }
    }
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Config { action } => cmd_config(action, quiet),
        Commands::Doctor => cmd_doctor(cli.database, quiet).await,
        command => {
            let config = Config::load()?;
            let db = open_database(&config, cli.database).await?;
            let manager = UserFeatureManager::new(db.pool().clone(), config.feature_locking);
            let result = dispatch(&manager, command, format, quiet).await;
            db.close().await;
            result
        }
    }
}

async fn dispatch(
    manager: &UserFeatureManager,
    command: Commands,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Status { target } => cmd_status(manager, &target, format).await,
        Commands::Lock {
            target,
            duration_ms,
            indefinite,
            reason_code,
            reason,
        } => {
            let duration_ms = if indefinite {
                -1
            } else {
                duration_ms.ok_or_else(|| {
                    anyhow::anyhow!("Either --duration-ms or --indefinite is required")
                })?
            };
            cmd_lock(
                manager,
                &target,
                duration_ms,
                reason_code.as_deref(),
                reason.as_deref(),
                format,
                quiet,
            )
            .await
        }
        Commands::Unlock { target } => {
            let key = target.key();
            manager.unlock_feature(&key).await?;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({ "unlocked": true }))?,
                OutputFormat::Text if !quiet => println!("Unlocked {}", key),
                OutputFormat::Text => {}
            }
            Ok(())
        }
        Commands::Props { action } => cmd_props(manager, action, format, quiet).await,
        Commands::Config { .. } | Commands::Doctor => {
            Err(anyhow::anyhow!("command does not use the feature manager"))
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_status(
    manager: &UserFeatureManager,
    target: &Target,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let key = target.key();
    let status = manager.get_feature_lock_status(&key).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Text => println!("{}: {}", key, status),
    }
    Ok(())
}

async fn cmd_lock(
    manager: &UserFeatureManager,
    target: &Target,
    duration_ms: i64,
    reason_code: Option<&str>,
    reason: Option<&str>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let key = target.key();
    let outcome = manager
        .lock_feature(&key, duration_ms, reason_code, reason)
        .await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "outcome": outcome }))?,
        OutputFormat::Text if !quiet => println!("Lock {} ({})", outcome, key),
        OutputFormat::Text => {}
    }
    Ok(())
}

async fn cmd_props(
    manager: &UserFeatureManager,
    action: PropsAction,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    match action {
        PropsAction::Get { target, name } => {
            let key = target.key();
            let properties: BTreeMap<String, String> = match name {
                Some(name) => manager
                    .properties()
                    .get_property(&key, &name)
                    .await?
                    .map(|value| (name, value))
                    .into_iter()
                    .collect(),
                None => manager.get_feature_properties(&key).await?.into_iter().collect(),
            };

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&properties)?),
                OutputFormat::Text => {
                    if properties.is_empty() && !quiet {
                        println!("No properties for {}.", key);
                    }
                    for (name, value) in properties {
                        println!("{} = {}", name, value);
                    }
                }
            }
        }
        PropsAction::Set { target, properties } => {
            let key = target.key();
            let properties: HashMap<String, String> = properties.into_iter().collect();
            let diff = manager.set_feature_properties(&key, &properties).await?;
            match format {
                OutputFormat::Json => {
                    let mut added: Vec<&String> = diff.to_add.keys().collect();
                    let mut updated: Vec<&String> = diff.to_update.keys().collect();
                    added.sort();
                    updated.sort();
                    print_json(&serde_json::json!({ "added": added, "updated": updated }))?;
                }
                OutputFormat::Text if !quiet => println!(
                    "Set {} properties for {} ({} added, {} updated)",
                    properties.len(),
                    key,
                    diff.to_add.len(),
                    diff.to_update.len()
                ),
                OutputFormat::Text => {}
            }
        }
        PropsAction::Delete { target, names } => {
            let key = target.key();
            let names: HashSet<String> = names.into_iter().collect();
            manager.delete_feature_properties(&key, &names).await?;
            match format {
                OutputFormat::Json => {
                    let mut deleted: Vec<&String> = names.iter().collect();
                    deleted.sort();
                    print_json(&serde_json::json!({ "deleted": deleted }))?;
                }
                OutputFormat::Text if !quiet => {
                    println!("Deleted {} property names for {}", names.len(), key)
                }
                OutputFormat::Text => {}
            }
        }
        PropsAction::Clear { target } => {
            let key = target.key();
            manager.delete_all_feature_properties(&key).await?;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({ "cleared": true }))?,
                OutputFormat::Text if !quiet => println!("Cleared properties for {}", key),
                OutputFormat::Text => {}
            }
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            // Environment overrides must not end up in the file
            let mut config = Config::load_from(&Config::config_path()?)?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(database: Option<PathBuf>, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("Featurelock Health Check");
        println!("========================");
        println!();
    }

    let config = match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
            config
        }
        Err(e) => {
            println!("[!!] Configuration: {}", e);
            return Err(e);
        }
    };

    if config.feature_locking.per_user_enabled {
        if !quiet {
            println!("[OK] Per-user feature locking: Enabled");
        }
    } else {
        warn!("Per-user feature locking is disabled");
        if !quiet {
            println!("[!!] Per-user feature locking: Disabled");
            println!("     Run `featurelock config set feature_locking.per_user_enabled true`");
        }
    }

    let db = open_database(&config, database).await?;
    db.health_check().await?;
    let status = db.migration_status().await?;
    if !quiet {
        println!(
            "[OK] Database: {} (schema v{}/{})",
            db.path().display(),
            status.current_version,
            status.target_version
        );
    }
    db.close().await;

    Ok(())
}
