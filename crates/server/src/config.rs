//! CLI parsing and layered configuration, following the teacher's
//! `ServerConfig` shape: a plain `Deserialize` struct with per-field
//! defaults, populated by layering sources through figment rather than
//! hand-rolled precedence logic.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_aggregation_seconds() -> u64 {
    30
}

fn default_keepalive_seconds() -> u64 {
    60
}

fn default_reconnect_backoff_seconds() -> u64 {
    20
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database_url: String,

    /// The reference disables TLS verification for every non-cloud
    /// hostname; this bridge instead requires an explicit opt-in.
    #[serde(default)]
    pub insecure_skip_verify: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_max_aggregation_seconds")]
    pub max_aggregation_seconds: u64,

    #[serde(default = "default_keepalive_seconds")]
    pub keepalive_seconds: u64,

    #[serde(default = "default_reconnect_backoff_seconds")]
    pub reconnect_backoff_seconds: u64,
}

#[derive(Parser, Debug)]
#[command(name = "loxone-bridge", about = "Miniserver telemetry bridge")]
pub struct Cli {
    #[arg(long, env = "LOXONE_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub user: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    #[arg(long)]
    pub database_url: Option<String>,

    #[arg(long)]
    pub insecure_skip_verify: bool,

    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decompress a previously retrieved configuration archive to a raw
    /// LoxAPP3.json on disk, without opening a live connection.
    Backup {
        archive: PathBuf,
        destination: PathBuf,
    },
}

#[derive(Serialize, Default)]
struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_level: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    insecure_skip_verify: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Layer, lowest precedence first: an optional TOML file, `LOXONE_*`
/// environment variables, then CLI flags.
pub fn load(cli: &Cli) -> Result<Config> {
    let mut figment = Figment::new();
    if let Some(path) = &cli.config {
        figment = figment.merge(Toml::file(path));
    }
    figment = figment.merge(Env::prefixed("LOXONE_"));

    let overrides = CliOverrides {
        host: cli.host.clone(),
        user: cli.user.clone(),
        password: cli.password.clone(),
        database_url: cli.database_url.clone(),
        log_level: cli.log_level.clone(),
        insecure_skip_verify: cli.insecure_skip_verify,
    };
    figment = figment.merge(Serialized::defaults(overrides));

    figment
        .extract()
        .map_err(|e| BridgeError::Config(e.to_string()))
}
