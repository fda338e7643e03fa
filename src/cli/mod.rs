//! Command-line entry: argument parsing, configuration merging and dispatch.

pub mod config_merger;
pub mod handlers;
pub mod parser;

pub use config_merger::{load_settings, merge_cli_args};
pub use parser::{Cli, Commands, Environment, LogLevel};

use handlers::{MigrateCommandHandler, ServeCommandHandler};

/// Runs the parsed command line. No subcommand means `serve`.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings(&cli)?;
    crate::logger::init_logger(&settings.logger)?;

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
        log_level: None,
        dry_run: false,
    }) {
        Commands::Serve { dry_run, .. } => {
            let handler = ServeCommandHandler::new(settings);
            let handler = match cli.env {
                Some(env) => handler.with_environment(env.into()),
                None => handler,
            };
            handler.execute(dry_run).await
        }
        Commands::Migrate { dry_run, rollback } => {
            MigrateCommandHandler::new(settings)
                .execute(dry_run, rollback)
                .await?;
            Ok(())
        }
    }
}
