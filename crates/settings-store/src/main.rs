//! Settings CLI - inspect and edit a settings table.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settings_store::{Scope, SettingsApp, SettingsConfig};

#[derive(Parser)]
#[command(name = "settings")]
#[command(author, version, about = "Key-value settings store", long_about = None)]
struct Cli {
    /// Scope column binding for the command, repeatable (e.g. --scope tenant_id=1)
    #[arg(short, long = "scope", global = true, value_parser = parse_binding)]
    scope: Vec<(String, String)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the settings table if it does not exist
    Init,
    /// Print a setting as JSON
    Get {
        key: String,
        /// JSON value printed when the setting is missing or null
        #[arg(short, long)]
        default: Option<String>,
    },
    /// Store a setting; VALUE is JSON, anything else is stored as a string
    Set { key: String, value: String },
    /// Exit with status 1 when the setting does not exist
    Has { key: String },
    /// Delete a setting
    Forget { key: String },
    /// Delete every setting in the given scope
    Flush,
    /// Delete every row in the table
    Truncate,
    /// Print every setting in the given scope, one JSON object per line
    List,
}

fn parse_binding(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))
}

fn parse_json(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Exit status of `has`: 0 when the setting exists, 1 otherwise.
fn has_status(exists: bool) -> u8 {
    if exists {
        0
    } else {
        1
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = SettingsConfig::from_env()?;
    let scope: Scope = config
        .schema
        .parse_scope(cli.scope.iter().map(|(n, v)| (n.as_str(), v.as_str())))?;

    let app = SettingsApp::connect(&config).await?;
    let settings = &app.settings;

    match cli.command {
        Commands::Init => {
            app.init().await?;
        }
        Commands::Get { key, default } => {
            let scoped = settings.set_extra_columns(scope);
            let value = match default {
                Some(default) => scoped.get_or(&key, parse_json(&default)).await?,
                None => scoped.get::<Value>(&key).await?.unwrap_or(Value::Null),
            };
            println!("{}", value);
        }
        Commands::Set { key, value } => {
            settings
                .set_extra_columns(scope)
                .set(&key, &parse_json(&value))
                .await?;
        }
        Commands::Has { key } => {
            let exists = settings.set_extra_columns(scope).has(&key).await?;
            println!("{}", exists);
            return Ok(ExitCode::from(has_status(exists)));
        }
        Commands::Forget { key } => {
            settings.set_extra_columns(scope).forget(&key).await?;
        }
        Commands::Flush => {
            let deleted = settings.set_extra_columns(scope).flush().await?;
            println!("{}", json!({ "deleted": deleted }));
        }
        Commands::Truncate => {
            let deleted = settings.truncate().await?;
            println!("{}", json!({ "deleted": deleted }));
        }
        Commands::List => {
            for row in settings.set_extra_columns(scope).all().await? {
                let value = match row.value.as_deref() {
                    Some(raw) => domain::decode_value::<Value>(raw)
                        .unwrap_or_else(|_| Value::String(raw.to_string())),
                    None => Value::Null,
                };
                println!(
                    "{}",
                    json!({ "key": row.key, "value": value, "scope": row.scope })
                );
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
