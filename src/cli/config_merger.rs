//! Layers CLI flags over file and environment configuration.

use super::parser::{Cli, Commands};
use crate::config::error::ConfigError;
use crate::config::{ConfigLoader, Settings};

/// Loads settings for `cli`: `--config`/`--env` pick the sources, the remaining
/// flags override the loaded values, and the result is validated again.
pub fn load_settings(cli: &Cli) -> Result<Settings, ConfigError> {
    let mut loader = ConfigLoader::new()?;
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    if let Some(env) = cli.env {
        loader = loader.with_environment(env.into());
    }

    merge_cli_args(loader.load()?, cli)
}

/// Applies flag overrides. Command-level flags win over global ones.
pub fn merge_cli_args(mut settings: Settings, cli: &Cli) -> Result<Settings, ConfigError> {
    if cli.verbose {
        settings.logger.level = "debug".to_string();
    } else if cli.quiet {
        settings.logger.level = "error".to_string();
    }

    if let Some(Commands::Serve {
        host,
        port,
        log_level,
        ..
    }) = &cli.command
    {
        if let Some(host) = host {
            settings.server.host = host.clone();
        }
        if let Some(port) = port {
            settings.server.port = *port;
        }
        if let Some(level) = log_level {
            settings.logger.level = level.as_str().to_string();
        }
    }

    settings.validate()?;
    Ok(settings)
}
