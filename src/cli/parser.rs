//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::Environment as AppEnvironment;

/// Channel-summarizing workflow service
#[derive(Parser, Debug)]
#[command(name = "chanflow")]
#[command(about = "Multi-tenant workflows that summarize chat channels with language models")]
#[command(long_about = "
chanflow runs user-defined workflows over synced chat channels: it gathers recent
messages, asks a language model for per-channel and combined summaries, and
settles the model cost against each user's credit balance.

EXAMPLES:
    chanflow serve
    chanflow serve --host 0.0.0.0 --port 8080
    chanflow --config /etc/chanflow/production.toml serve
    chanflow --env production serve --dry-run
    chanflow migrate --dry-run
    chanflow migrate --rollback 1
")]
#[command(version = crate::clap_long_version())]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Single TOML configuration file, replacing the layered config directory
    #[arg(short, long, value_name = "FILE", value_parser = parse_config_file)]
    pub config: Option<PathBuf>,

    /// Environment whose `{env}.toml` layer is loaded
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Error-level logging only
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the HTTP server and the workflow scheduler (default)
    Serve {
        /// Address to bind, e.g. 127.0.0.1 or 0.0.0.0
        #[arg(long, value_name = "ADDRESS", value_parser = parse_host)]
        host: Option<String>,

        /// Port to listen on (1-65535)
        #[arg(short, long, value_name = "PORT", value_parser = parse_port)]
        port: Option<u16>,

        /// Log level, overriding --verbose/--quiet and the config file
        #[arg(long, value_enum)]
        log_level: Option<LogLevel>,

        /// Validate configuration and exit
        #[arg(long)]
        dry_run: bool,
    },
    /// Apply, preview or roll back database migrations
    Migrate {
        /// List pending migrations without applying them
        #[arg(long, conflicts_with = "rollback")]
        dry_run: bool,

        /// Revert this many of the most recent migrations (1-100)
        #[arg(long, value_name = "STEPS", value_parser = clap::value_parser!(u32).range(1..=100))]
        rollback: Option<u32>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "test")]
    Test,
    #[value(name = "staging", alias = "stage")]
    Staging,
    #[value(name = "production", alias = "prod")]
    Production,
}

impl From<Environment> for AppEnvironment {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => AppEnvironment::Development,
            Environment::Test => AppEnvironment::Test,
            Environment::Staging => AppEnvironment::Staging,
            Environment::Production => AppEnvironment::Production,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    #[value(alias = "warning")]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn parse_port(value: &str) -> Result<u16, String> {
    match value.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("Port must be a number between 1 and 65535, got '{value}'")),
        Ok(port) => Ok(port),
    }
}

fn parse_host(value: &str) -> Result<String, String> {
    let host = value.trim();
    if host.is_empty() || host.contains(char::is_whitespace) || host.contains('/') {
        return Err(format!("Invalid host address '{value}'"));
    }
    Ok(host.to_string())
}

fn parse_config_file(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if !path.is_file() {
        return Err(format!("Configuration file does not exist or is not a file: '{value}'"));
    }
    Ok(path)
}
