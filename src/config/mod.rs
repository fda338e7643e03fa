//! Configuration management module for chanflow
//!
//! # Configuration Priority (lowest to highest)
//! 1. `default.toml` - Base default configuration
//! 2. `{environment}.toml` - Environment-specific configuration
//! 3. `local.toml` - Local development overrides (not committed to version control)
//! 4. `CHANFLOW_*` environment variables

pub mod environment;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use environment::Environment;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use settings::{
    CreditsConfig, DatabaseConfig, JwtConfig, LlmConfig, LoggerSettings, ModelPricing,
    SchedulerBackend, SchedulerConfig, Settings, WorkflowConfig, WorkflowPackage,
};
