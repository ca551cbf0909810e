use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TripweaveError};
use crate::types::{AgentRole, BudgetFlexibility};

/// Top-level Tripweave configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub negotiation: NegotiationConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Per-session JSONL audit logging.
    #[serde(default)]
    pub log: Option<LogConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry: None,
        }
    }
}

fn default_provider() -> String { "nvidia".to_string() }
fn default_model_id() -> String { "meta/llama-3.3-70b-instruct".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.2 }

/// Retry configuration for reasoning requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 2 }
fn default_initial_backoff() -> u64 { 500 }
fn default_max_backoff() -> u64 { 8000 }

/// Scheduling limits for the dependency graph executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Extra attempts per task after a transient failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
    /// Ceiling for the whole run; unresolved tasks fail once it passes.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            task_timeout_secs: default_task_timeout(),
            run_timeout_secs: default_run_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl WorkflowConfig {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
        }
    }
}

fn default_task_timeout() -> u64 { 180 }
fn default_run_timeout() -> u64 { 1200 }

/// Budget negotiation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Revision rounds after the initial proposals.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    #[serde(default)]
    pub shares: ShareConfig,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            tolerance: ToleranceConfig::default(),
            shares: ShareConfig::default(),
        }
    }
}

impl NegotiationConfig {
    /// Allowed overrun in percent for a flexibility level.
    pub fn tolerance_pct(&self, flexibility: BudgetFlexibility) -> f64 {
        match flexibility {
            BudgetFlexibility::Strict => self.tolerance.strict,
            BudgetFlexibility::Moderate => self.tolerance.moderate,
            BudgetFlexibility::Flexible => self.tolerance.flexible,
        }
    }

    /// Normalised fraction of the ceiling targeted for a negotiated role.
    pub fn share(&self, role: AgentRole) -> f64 {
        let s = &self.shares;
        let total = s.accommodation + s.transport + s.activities;
        let raw = match role {
            AgentRole::Accommodation => s.accommodation,
            AgentRole::Transport => s.transport,
            AgentRole::Activities => s.activities,
            _ => 0.0,
        };
        if total > 0.0 {
            raw / total
        } else {
            1.0 / 3.0
        }
    }
}

fn default_max_rounds() -> u32 { 3 }

/// Overrun tolerance in percent per flexibility level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToleranceConfig {
    #[serde(default)]
    pub strict: f64,
    #[serde(default = "default_moderate_tolerance")]
    pub moderate: f64,
    #[serde(default = "default_flexible_tolerance")]
    pub flexible: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            strict: 0.0,
            moderate: default_moderate_tolerance(),
            flexible: default_flexible_tolerance(),
        }
    }
}

fn default_moderate_tolerance() -> f64 { 10.0 }
fn default_flexible_tolerance() -> f64 { 20.0 }

/// Target split of the ceiling across the negotiated categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareConfig {
    #[serde(default = "default_accommodation_share")]
    pub accommodation: f64,
    #[serde(default = "default_transport_share")]
    pub transport: f64,
    #[serde(default = "default_activities_share")]
    pub activities: f64,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            accommodation: default_accommodation_share(),
            transport: default_transport_share(),
            activities: default_activities_share(),
        }
    }
}

fn default_accommodation_share() -> f64 { 0.45 }
fn default_transport_share() -> f64 { 0.35 }
fn default_activities_share() -> f64 { 0.20 }

/// External tool providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub search: Option<SearchConfig>,
    #[serde(default)]
    pub weather: WeatherConfig,
    /// FX providers, tried in order.
    #[serde(default = "default_currency_providers")]
    pub currency: Vec<CurrencyProviderConfig>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout(),
            search: None,
            weather: WeatherConfig::default(),
            currency: default_currency_providers(),
        }
    }
}

fn default_tool_timeout() -> u64 { 20 }

fn default_currency_providers() -> Vec<CurrencyProviderConfig> {
    vec![
        CurrencyProviderConfig::Unirate {
            api_key: None,
            base_url: None,
        },
        CurrencyProviderConfig::Yahoo { base_url: None },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    pub api_key: String,
    #[serde(default = "default_search_results")]
    pub max_results: u32,
}

fn default_search_provider() -> String { "tavily".to_string() }
fn default_search_results() -> u32 { 5 }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default)]
    pub geocoding_url: Option<String>,
    #[serde(default)]
    pub forecast_url: Option<String>,
}

/// One entry of the ordered currency provider chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum CurrencyProviderConfig {
    /// UniRate convert API. Falls back to `RATE_CONVERTER_API_KEY` when no key is set.
    Unirate {
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
    },
    /// Yahoo Finance forex pairs (`USDEUR=X`).
    Yahoo {
        #[serde(default)]
        base_url: Option<String>,
    },
    /// Fixed rates keyed by pair, e.g. `USDEUR = 0.92`.
    Static {
        #[serde(default)]
        rates: HashMap<String, f64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String { "~/.tripweave/sessions.db".to_string() }

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable run logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files. Default: ~/.tripweave/logs
    #[serde(default)]
    pub log_dir: Option<String>,
    /// Verbosity: 1=run summary, 2=task transitions, 3=negotiation rounds.
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: None,
            level: default_log_level(),
        }
    }
}

fn default_log_enabled() -> bool { true }
fn default_log_level() -> u8 { 2 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TripweaveError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: AppConfig =
            toml::from_str(&expanded).map_err(|e| TripweaveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.workflow.task_timeout_secs == 0 || self.workflow.run_timeout_secs == 0 {
            return Err(TripweaveError::Config(
                "workflow timeouts must be greater than zero".into(),
            ));
        }
        let t = &self.negotiation.tolerance;
        if t.strict < 0.0 || t.moderate < 0.0 || t.flexible < 0.0 {
            return Err(TripweaveError::Config(
                "negotiation tolerances must not be negative".into(),
            ));
        }
        let s = &self.negotiation.shares;
        if s.accommodation < 0.0 || s.transport < 0.0 || s.activities < 0.0 {
            return Err(TripweaveError::Config(
                "negotiation shares must not be negative".into(),
            ));
        }
        if self.tools.currency.is_empty() {
            return Err(TripweaveError::Config(
                "at least one currency provider is required".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the session database path (expand ~).
    pub fn store_path(&self) -> PathBuf {
        expand_home(&self.store.path)
    }

    /// Resolve the run log directory, if logging is enabled.
    pub fn log_dir(&self) -> Option<PathBuf> {
        let log = self.log.as_ref().filter(|l| l.enabled)?;
        Some(match &log.log_dir {
            Some(dir) => expand_home(dir),
            None => expand_home("~/.tripweave/logs"),
        })
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Leave unset variables as written
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_TRIPWEAVE_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_TRIPWEAVE_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_TRIPWEAVE_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_TRIPWEAVE_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_TRIPWEAVE_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.model.provider, "nvidia");
        assert_eq!(config.model.model_id, "meta/llama-3.3-70b-instruct");
        assert_eq!(config.workflow.max_retries, 2);
        assert_eq!(config.workflow.task_timeout_secs, 180);
        assert_eq!(config.negotiation.max_rounds, 3);
        assert_eq!(config.negotiation.tolerance.moderate, 10.0);
        assert_eq!(config.tools.currency.len(), 2);
        assert!(config.log.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tolerance_per_flexibility() {
        let config = NegotiationConfig::default();
        assert_eq!(config.tolerance_pct(BudgetFlexibility::Strict), 0.0);
        assert_eq!(config.tolerance_pct(BudgetFlexibility::Moderate), 10.0);
        assert_eq!(config.tolerance_pct(BudgetFlexibility::Flexible), 20.0);
    }

    #[test]
    fn test_shares_are_normalised() {
        let toml_str = r#"
[negotiation.shares]
accommodation = 2.0
transport = 1.0
activities = 1.0
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.negotiation.share(AgentRole::Accommodation), 0.5);
        assert_eq!(config.negotiation.share(AgentRole::Transport), 0.25);
        assert_eq!(config.negotiation.share(AgentRole::Weather), 0.0);
    }

    #[test]
    fn test_currency_chain_parses_in_order() {
        let toml_str = r#"
[[tools.currency]]
provider = "static"
rates = { EURUSD = 1.08 }

[[tools.currency]]
provider = "yahoo"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.tools.currency.len(), 2);
        assert!(matches!(
            config.tools.currency[0],
            CurrencyProviderConfig::Static { .. }
        ));
        assert_eq!(
            config.tools.currency[1],
            CurrencyProviderConfig::Yahoo { base_url: None }
        );
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = AppConfig::default();
        config.workflow.run_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(TripweaveError::Config(_))));
    }

    #[test]
    fn test_log_dir_only_when_enabled() {
        let mut config = AppConfig::default();
        assert!(config.log_dir().is_none());
        config.log = Some(LogConfig {
            log_dir: Some("/tmp/tw-logs".into()),
            ..LogConfig::default()
        });
        assert_eq!(config.log_dir(), Some(PathBuf::from("/tmp/tw-logs")));
        config.log.as_mut().unwrap().enabled = false;
        assert!(config.log_dir().is_none());
    }
}
