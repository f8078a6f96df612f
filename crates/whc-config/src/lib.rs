//! Static daemon configuration: broker URL, store file path, group-id
//! prefix, and log filter. Loads an optional YAML file, then applies
//! environment-variable overrides, then command-line flag overrides — each
//! layer wins over the one before it. There is no hot-reload; once loaded,
//! the configuration is fixed for the process lifetime.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

pub const ENV_BROKER_URL: &str = "WHC_BROKER_URL";
pub const ENV_DB_PATH: &str = "WHC_DATABASE_PATH";
pub const ENV_GROUP_ID: &str = "WHC_GROUP_ID";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    pub broker_url: String,
    pub db_path: String,
    pub group_id: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker_url: "amqp://127.0.0.1:5672/%2f".to_string(),
            db_path: "warehouse.db".to_string(),
            group_id: "whc_".to_string(),
            log_filter: default_log_filter(),
        }
    }
}

/// Command-line flags for the daemon binary. Every field is optional; each
/// one, when present, overrides the corresponding config-file/env value.
#[derive(Debug, Parser)]
#[command(name = "whc-daemon", about = "Warehouse fulfillment controller")]
pub struct Cli {
    /// Path to an optional YAML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub broker_url: Option<String>,
    #[arg(long)]
    pub db_path: Option<String>,
    #[arg(long)]
    pub group_id: Option<String>,
}

/// Load configuration: file (if given) → env overrides → CLI flag overrides.
pub fn load(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_yaml::from_str(&text)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config);
    apply_cli_overrides(&mut config, cli);

    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = std::env::var(ENV_BROKER_URL) {
        config.broker_url = url;
    }
    if let Ok(path) = std::env::var(ENV_DB_PATH) {
        config.db_path = path;
    }
    if let Ok(gid) = std::env::var(ENV_GROUP_ID) {
        config.group_id = gid;
    }
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(url) = &cli.broker_url {
        config.broker_url = url.clone();
    }
    if let Some(path) = &cli.db_path {
        config.db_path = path.clone();
    }
    if let Some(gid) = &cli.group_id {
        config.group_id = gid.clone();
    }
}
