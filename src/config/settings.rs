//! Configuration settings structures for chanflow
//!
//! This module defines all configuration structures that can be loaded from
//! TOML files and environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "chanflow".to_string()
}

fn default_app_version() -> String {
    crate::pkg_version().to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> String {
    "logs/chanflow.log".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "google/gemini-2.0-flash-001".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_llm_timeout() -> u64 {
    120
}

fn decimal(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap_or_default()
}

fn default_pricing() -> Vec<ModelPricing> {
    vec![
        ModelPricing::new("google/gemini-2.0-flash-exp:free", "0", "0"),
        ModelPricing::new("google/gemini-2.0-flash-001", "0.1", "0.4"),
        ModelPricing::new("deepseek/deepseek-r1-distill-llama-70b:free", "0", "0"),
    ]
}

fn default_fallback_pricing() -> ModelPricing {
    ModelPricing::new("default", "0", "0")
}

fn default_commission_rate() -> BigDecimal {
    decimal("0.8")
}

fn default_initial_credits() -> BigDecimal {
    BigDecimal::from(5)
}

fn default_initial_workflows() -> i32 {
    1
}

fn default_packages() -> Vec<WorkflowPackage> {
    vec![
        WorkflowPackage::new("basic", "Basic", 5, 10),
        WorkflowPackage::new("standard", "Standard", 30, 100),
        WorkflowPackage::new("professional", "Professional", 100, 1000),
    ]
}

fn default_char_budget() -> usize {
    24_000
}

fn default_message_overhead() -> usize {
    50
}

fn default_channel_concurrency() -> usize {
    1
}

fn default_no_data_value() -> String {
    "No data available - all channels have no messages".to_string()
}

fn default_run_shutdown_grace() -> u64 {
    30
}

fn default_qstash_url() -> String {
    "https://qstash.upstash.io".to_string()
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

// ============================================================================
// Application Configuration
// ============================================================================

/// Application basic information configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Application version
    #[serde(default = "default_app_version")]
    pub version: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
        }
    }
}

// ============================================================================
// Server Configuration
// ============================================================================

/// Axum HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl ServerConfig {
    /// Get the full server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
        }
    }
}

// ============================================================================
// Database Configuration
// ============================================================================

/// Diesel database connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,

    /// Whether to automatically run pending migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout: default_connection_timeout(),
            auto_migrate: false,
        }
    }
}

// ============================================================================
// JWT Configuration
// ============================================================================

/// Bearer token verification. Tokens are issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JwtConfig {
    /// HS256 secret shared with the token issuer
    #[serde(default)]
    pub secret: String,
}

// ============================================================================
// Logger Settings
// ============================================================================

/// Console output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    /// Whether console output is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether to use colored output
    #[serde(default = "default_true")]
    pub colored: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            colored: default_true(),
        }
    }
}

/// File output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    /// Whether file output is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Path to the log file
    #[serde(default = "default_log_path")]
    pub path: String,

    /// Whether to append to existing file
    #[serde(default = "default_true")]
    pub append: bool,

    /// Log format: "full", "compact", or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl FileSettings {
    pub fn path_buf(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_log_path(),
            append: default_true(),
            format: default_log_format(),
        }
    }
}

/// Logger configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Log level or EnvFilter directive, e.g. "info" or "chanflow=debug,info"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Console output settings
    #[serde(default)]
    pub console: ConsoleSettings,

    /// File output settings
    #[serde(default)]
    pub file: FileSettings,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: ConsoleSettings::default(),
            file: FileSettings::default(),
        }
    }
}

// ============================================================================
// LLM Configuration
// ============================================================================

/// Per-million-token price of one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub model: String,
    pub input_price: BigDecimal,
    pub output_price: BigDecimal,
}

impl ModelPricing {
    pub fn new(model: &str, input_price: &str, output_price: &str) -> Self {
        Self {
            model: model.to_string(),
            input_price: decimal(input_price),
            output_price: decimal(output_price),
        }
    }
}

/// OpenAI-compatible chat completion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    /// Model used when a workflow does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upper bound for a single completion call, in seconds
    #[serde(default = "default_llm_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_pricing")]
    pub pricing: Vec<ModelPricing>,

    /// Price applied to models missing from `pricing`
    #[serde(default = "default_fallback_pricing")]
    pub default_pricing: ModelPricing,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: String::new(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_llm_timeout(),
            pricing: default_pricing(),
            default_pricing: default_fallback_pricing(),
        }
    }
}

// ============================================================================
// Credits Configuration
// ============================================================================

/// A purchasable bundle of workflow slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPackage {
    pub id: String,
    pub name: String,
    pub price: BigDecimal,
    pub workflows: i32,
}

impl WorkflowPackage {
    pub fn new(id: &str, name: &str, price: i64, workflows: i32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            price: BigDecimal::from(price),
            workflows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditsConfig {
    /// Share of a channel subscription fee paid to the channel owner
    #[serde(default = "default_commission_rate")]
    pub commission_rate: BigDecimal,

    /// Balance granted to a newly provisioned user
    #[serde(default = "default_initial_credits")]
    pub initial_credits: BigDecimal,

    /// Workflow slots granted to a newly provisioned user
    #[serde(default = "default_initial_workflows")]
    pub initial_workflows: i32,

    #[serde(default = "default_packages")]
    pub packages: Vec<WorkflowPackage>,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            commission_rate: default_commission_rate(),
            initial_credits: default_initial_credits(),
            initial_workflows: default_initial_workflows(),
            packages: default_packages(),
        }
    }
}

// ============================================================================
// Workflow Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Character budget of one channel context
    #[serde(default = "default_char_budget")]
    pub context_char_budget: usize,

    /// Characters charged per message on top of its text
    #[serde(default = "default_message_overhead")]
    pub message_overhead_chars: usize,

    /// Scratch directory for per-channel contexts; system temp dir when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Channels summarized at the same time within one run
    #[serde(default = "default_channel_concurrency")]
    pub channel_concurrency: usize,

    /// Aggregate value stored when every channel is empty
    #[serde(default = "default_no_data_value")]
    pub no_data_value: String,

    /// Seconds to wait for in-flight runs on shutdown
    #[serde(default = "default_run_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl WorkflowConfig {
    pub fn resolved_temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("data-workflow-temp"))
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            context_char_budget: default_char_budget(),
            message_overhead_chars: default_message_overhead(),
            temp_dir: None,
            channel_concurrency: default_channel_concurrency(),
            no_data_value: default_no_data_value(),
            shutdown_grace_secs: default_run_shutdown_grace(),
        }
    }
}

// ============================================================================
// Scheduler Configuration
// ============================================================================

/// Where recurring workflow triggers live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerBackend {
    /// In-process cron scheduler
    #[default]
    Local,
    /// External push service reached over HTTP
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub backend: SchedulerBackend,

    /// Schedule service endpoint (http backend)
    #[serde(default = "default_qstash_url")]
    pub service_url: String,

    /// Schedule service token (http backend)
    #[serde(default)]
    pub token: String,

    /// Externally reachable base URL of this server, used as the push destination
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Shared secret expected in `x-callback-token` on scheduler callbacks
    #[serde(default)]
    pub callback_token: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            backend: SchedulerBackend::default(),
            service_url: default_qstash_url(),
            token: String::new(),
            public_base_url: default_public_base_url(),
            callback_token: String::new(),
        }
    }
}

// ============================================================================
// Main Settings Structure
// ============================================================================

/// Complete application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub application: ApplicationConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub jwt: JwtConfig,

    #[serde(default)]
    pub logger: LoggerSettings,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub credits: CreditsConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_server_config() -> impl Strategy<Value = ServerConfig> {
        (
            prop_oneof!["127.0.0.1", "0.0.0.0", "localhost"],
            1u16..=65535,
            1u64..=300,
        )
            .prop_map(|(host, port, request_timeout)| ServerConfig {
                host: host.to_string(),
                port,
                request_timeout,
            })
    }

    fn arb_workflow_config() -> impl Strategy<Value = WorkflowConfig> {
        (1000usize..100_000, 0usize..200, 1usize..16, "[a-zA-Z ]{1,40}").prop_map(
            |(budget, overhead, concurrency, sentinel)| WorkflowConfig {
                context_char_budget: budget,
                message_overhead_chars: overhead,
                temp_dir: None,
                channel_concurrency: concurrency,
                no_data_value: sentinel,
                shutdown_grace_secs: 30,
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_settings_round_trip_serialization(
            server in arb_server_config(),
            workflow in arb_workflow_config(),
        ) {
            let settings = Settings { server, workflow, ..Settings::default() };

            let toml_str = toml::to_string(&settings)
                .expect("Settings should serialize to TOML");
            let deserialized: Settings = toml::from_str(&toml_str)
                .expect("TOML should deserialize back to Settings");

            prop_assert_eq!(settings, deserialized);
        }
    }

    #[test]
    fn test_application_config_defaults() {
        let config = ApplicationConfig::default();
        assert_eq!(config.name, "chanflow");
        assert_eq!(config.version, crate::pkg_version());
    }

    #[test]
    fn test_server_config_address() {
        let config = ServerConfig::default();
        assert_eq!(config.address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_credit_defaults() {
        let credits = CreditsConfig::default();
        assert_eq!(credits.commission_rate, decimal("0.8"));
        assert_eq!(credits.initial_credits, BigDecimal::from(5));
        assert_eq!(credits.initial_workflows, 1);
        let ids: Vec<_> = credits.packages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["basic", "standard", "professional"]);
    }

    #[test]
    fn test_workflow_defaults() {
        let workflow = WorkflowConfig::default();
        assert_eq!(workflow.context_char_budget, 24_000);
        assert_eq!(workflow.message_overhead_chars, 50);
        assert_eq!(workflow.channel_concurrency, 1);
        assert!(workflow.resolved_temp_dir().ends_with("data-workflow-temp"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [credits]
            commission_rate = "0.75"

            [scheduler]
            backend = "http"
            "#,
        )
        .unwrap();

        assert_eq!(settings.credits.commission_rate, decimal("0.75"));
        assert_eq!(settings.credits.initial_workflows, 1);
        assert_eq!(settings.scheduler.backend, SchedulerBackend::Http);
        assert_eq!(settings.llm.pricing.len(), 3);
    }
}
