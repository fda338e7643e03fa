//! Serve command handler.

use crate::config::{Environment, SchedulerBackend, Settings};
use crate::error::AppResult;
use crate::server::Server;

pub struct ServeCommandHandler {
    config: Settings,
    environment: Environment,
}

impl ServeCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self {
            config,
            environment: Environment::from_env(),
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Starts the server, or only validates and reports when `dry_run` is set.
    pub async fn execute(self, dry_run: bool) -> anyhow::Result<()> {
        if dry_run {
            self.validate_only()?;
            return Ok(());
        }
        Server::new(self.config, self.environment).run().await
    }

    /// Checks everything `serve` needs without opening connections.
    pub fn validate_only(&self) -> AppResult<()> {
        self.config.validate()?;
        self.config.database.validate()?;

        println!("✓ Configuration is valid");
        println!("✓ Server would bind to: {}", self.config.server.address());
        println!(
            "✓ Model endpoint: {} (default model {})",
            self.config.llm.base_url, self.config.llm.default_model
        );
        match self.config.scheduler.backend {
            SchedulerBackend::Local => println!("✓ Schedules run in-process"),
            SchedulerBackend::Http => println!(
                "✓ Schedules delegated to {}, callbacks to {}",
                self.config.scheduler.service_url, self.config.scheduler.public_base_url
            ),
        }
        println!("Dry run completed successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Settings {
        let mut config = Settings::default();
        config.database.url = "postgres://localhost/chanflow".to_string();
        config
    }

    #[tokio::test]
    async fn test_dry_run_succeeds_with_valid_config() {
        let handler = ServeCommandHandler::new(valid_config());
        assert!(handler.execute(true).await.is_ok());
    }

    #[test]
    fn test_dry_run_requires_database_url() {
        let handler = ServeCommandHandler::new(Settings::default());
        assert!(handler.validate_only().is_err());
    }

    #[test]
    fn test_dry_run_rejects_invalid_port() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(ServeCommandHandler::new(config).validate_only().is_err());
    }
}
