//! Configuration validation logic
//!
//! This module provides validation methods for all configuration structures
//! to ensure configuration values are within acceptable ranges and formats.

use std::collections::HashSet;

use bigdecimal::{BigDecimal, Zero};

use crate::config::error::ConfigError;
use crate::config::settings::{
    CreditsConfig, DatabaseConfig, FileSettings, LlmConfig, LoggerSettings, SchedulerBackend,
    SchedulerConfig, ServerConfig, Settings, WorkflowConfig,
};

/// Valid log levels
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid log formats
const VALID_LOG_FORMATS: &[&str] = &["full", "compact", "json"];

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::validation(
                "server.port",
                "Port must be between 1 and 65535. Please specify a valid port number.",
            ));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::validation(
                "server.request_timeout",
                "Request timeout must be greater than 0 seconds.",
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    /// Validate database configuration
    ///
    /// Only checked by commands that actually connect, so a dry run can be
    /// performed without database credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::validation(
                "database.url",
                "Database URL is required. Please specify a valid database connection string.",
            ));
        }

        if !(self.url.starts_with("postgres://") || self.url.starts_with("postgresql://")) {
            return Err(ConfigError::validation(
                "database.url",
                "Invalid database URL format. Expected format: postgres://[user:password@]host[:port]/database",
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::validation(
                "database.max_connections",
                "Max connections must be greater than 0.",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::ValidationError {
                field: "database.min_connections".to_string(),
                message: format!(
                    "Min connections ({}) cannot exceed max connections ({}).",
                    self.min_connections, self.max_connections
                ),
            });
        }

        Ok(())
    }
}

impl FileSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.path.trim().is_empty() {
            return Err(ConfigError::validation(
                "logger.file.path",
                "File path is required when file logging is enabled.",
            ));
        }

        if !VALID_LOG_FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.file.format".to_string(),
                message: format!(
                    "Invalid log format '{}'. Valid formats are: {}",
                    self.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        Ok(())
    }
}

impl LoggerSettings {
    /// Validate logger settings
    ///
    /// The level may be a bare level or a full EnvFilter directive list; the
    /// bare form is checked against the known levels.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let is_directive = self.level.contains('=') || self.level.contains(',');
        if !is_directive && !VALID_LOG_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Valid levels are: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        if !self.console.enabled && !self.file.enabled {
            return Err(ConfigError::validation(
                "logger",
                "At least one output (console or file) must be enabled.",
            ));
        }

        self.file.validate()
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::validation(
                "llm.base_url",
                "Model endpoint must be an http(s) URL.",
            ));
        }

        if self.default_model.trim().is_empty() {
            return Err(ConfigError::validation(
                "llm.default_model",
                "A default model identifier is required.",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "llm.request_timeout_secs",
                "Model call timeout must be greater than 0 seconds.",
            ));
        }

        let negative = |p: &BigDecimal| p < &BigDecimal::zero();
        for pricing in self.pricing.iter().chain(std::iter::once(&self.default_pricing)) {
            if negative(&pricing.input_price) || negative(&pricing.output_price) {
                return Err(ConfigError::ValidationError {
                    field: "llm.pricing".to_string(),
                    message: format!("Prices for '{}' must not be negative.", pricing.model),
                });
            }
        }

        Ok(())
    }
}

impl CreditsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.commission_rate < BigDecimal::zero() || self.commission_rate > BigDecimal::from(1)
        {
            return Err(ConfigError::validation(
                "credits.commission_rate",
                "Commission rate must be between 0 and 1.",
            ));
        }

        if self.initial_credits < BigDecimal::zero() {
            return Err(ConfigError::validation(
                "credits.initial_credits",
                "Initial credits must not be negative.",
            ));
        }

        if self.initial_workflows < 0 {
            return Err(ConfigError::validation(
                "credits.initial_workflows",
                "Initial workflow slots must not be negative.",
            ));
        }

        let mut seen = HashSet::new();
        for package in &self.packages {
            if !seen.insert(package.id.as_str()) {
                return Err(ConfigError::ValidationError {
                    field: "credits.packages".to_string(),
                    message: format!("Duplicate package id '{}'.", package.id),
                });
            }
            if package.price <= BigDecimal::zero() || package.workflows <= 0 {
                return Err(ConfigError::ValidationError {
                    field: "credits.packages".to_string(),
                    message: format!(
                        "Package '{}' needs a positive price and slot count.",
                        package.id
                    ),
                });
            }
        }

        Ok(())
    }
}

impl WorkflowConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.context_char_budget == 0 {
            return Err(ConfigError::validation(
                "workflow.context_char_budget",
                "Context budget must be greater than 0 characters.",
            ));
        }

        if self.channel_concurrency == 0 {
            return Err(ConfigError::validation(
                "workflow.channel_concurrency",
                "Channel concurrency must be at least 1.",
            ));
        }

        Ok(())
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == SchedulerBackend::Http {
            if self.token.is_empty() {
                return Err(ConfigError::validation(
                    "scheduler.token",
                    "A schedule service token is required for the http backend.",
                ));
            }
            if self.callback_token.is_empty() {
                return Err(ConfigError::validation(
                    "scheduler.callback_token",
                    "A callback token is required for the http backend.",
                ));
            }
        }

        Ok(())
    }
}

impl Settings {
    /// Validate all configuration settings
    ///
    /// Returns the first validation error encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.logger.validate()?;
        self.llm.validate()?;
        self.credits.validate()?;
        self.workflow.validate()?;
        self.scheduler.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::WorkflowPackage;

    #[test]
    fn test_settings_default_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_server_config_invalid_port_zero() {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { field, .. }) if field == "server.port"
        ));
    }

    #[test]
    fn test_database_config_requires_postgres_url() {
        let mut config = DatabaseConfig::default();
        assert!(config.validate().is_err());

        config.url = "mysql://localhost/db".to_string();
        assert!(config.validate().is_err());

        config.url = "postgres://localhost/chanflow".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_config_min_exceeds_max() {
        let config = DatabaseConfig {
            url: "postgres://localhost/chanflow".to_string(),
            max_connections: 2,
            min_connections: 5,
            ..DatabaseConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cannot exceed"));
    }

    #[test]
    fn test_logger_accepts_filter_directive() {
        let settings = LoggerSettings {
            level: "chanflow=debug,tower_http=warn".to_string(),
            ..LoggerSettings::default()
        };
        assert!(settings.validate().is_ok());

        let settings = LoggerSettings {
            level: "loud".to_string(),
            ..LoggerSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_logger_requires_an_output() {
        let mut settings = LoggerSettings::default();
        settings.console.enabled = false;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_commission_rate_bounds() {
        let mut credits = CreditsConfig::default();
        credits.commission_rate = BigDecimal::from(2);
        assert!(credits.validate().is_err());
    }

    #[test]
    fn test_duplicate_package_rejected() {
        let mut credits = CreditsConfig::default();
        credits
            .packages
            .push(WorkflowPackage::new("basic", "Basic again", 1, 1));
        let err = credits.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate package id"));
    }

    #[test]
    fn test_http_scheduler_requires_tokens() {
        let config = SchedulerConfig {
            backend: SchedulerBackend::Http,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SchedulerConfig {
            backend: SchedulerBackend::Http,
            token: "qstash-token".to_string(),
            callback_token: "callback".to_string(),
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_workflow_concurrency_must_be_positive() {
        let config = WorkflowConfig {
            channel_concurrency: 0,
            ..WorkflowConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
