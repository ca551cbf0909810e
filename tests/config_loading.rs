use std::io::Write;

use tripweave_core::config::{AppConfig, CurrencyProviderConfig};
use tripweave_core::types::{AgentRole, BudgetFlexibility};

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[model]
provider = "nvidia"
model_id = "meta/llama-3.3-70b-instruct"
api_key = "nvapi-test"
base_url = "https://integrate.api.nvidia.com/v1/chat/completions"
max_tokens = 2048
temperature = 0.1

[model.retry]
max_retries = 4

[[fallback_models]]
provider = "openai"
model_id = "gpt-4o-mini"

[workflow]
max_retries = 1
task_timeout_secs = 90
run_timeout_secs = 600

[negotiation]
max_rounds = 2

[negotiation.tolerance]
moderate = 5.0

[negotiation.shares]
accommodation = 0.5
transport = 0.3
activities = 0.2

[tools]
tool_timeout_secs = 10

[tools.search]
api_key = "tvly-test"
max_results = 3

[[tools.currency]]
provider = "yahoo"

[[tools.currency]]
provider = "static"
rates = { EURUSD = 1.08 }

[store]
path = "/tmp/tripweave-test/sessions.db"

[log]
log_dir = "/tmp/tripweave-test/logs"
level = 3
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.model_id, "meta/llama-3.3-70b-instruct");
    assert_eq!(config.model.api_key, Some("nvapi-test".to_string()));
    assert_eq!(config.model.max_tokens, 2048);
    assert_eq!(config.model.retry.as_ref().map(|r| r.max_retries), Some(4));
    assert_eq!(config.fallback_models.len(), 1);
    assert_eq!(config.fallback_models[0].model_id, "gpt-4o-mini");

    assert_eq!(config.workflow.max_retries, 1);
    assert_eq!(config.workflow.task_timeout_secs, 90);
    assert_eq!(config.workflow.initial_backoff_ms, 500);

    assert_eq!(config.negotiation.max_rounds, 2);
    assert_eq!(config.negotiation.tolerance_pct(BudgetFlexibility::Moderate), 5.0);
    assert_eq!(config.negotiation.tolerance_pct(BudgetFlexibility::Flexible), 20.0);
    assert!((config.negotiation.share(AgentRole::Accommodation) - 0.5).abs() < 1e-9);

    let search = config.tools.search.as_ref().expect("search configured");
    assert_eq!(search.provider, "tavily");
    assert_eq!(search.max_results, 3);
    assert_eq!(config.tools.currency.len(), 2);
    assert_eq!(
        config.tools.currency[0],
        CurrencyProviderConfig::Yahoo { base_url: None }
    );

    assert_eq!(
        config.store_path().to_str(),
        Some("/tmp/tripweave-test/sessions.db")
    );
    assert_eq!(
        config.log_dir().and_then(|p| p.to_str().map(String::from)),
        Some("/tmp/tripweave-test/logs".to_string())
    );
    assert_eq!(config.log.map(|l| l.level), Some(3));
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("TRIPWEAVE_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
api_key = "${TRIPWEAVE_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("TRIPWEAVE_TEST_API_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[model]
model_id = "meta/llama-3.3-70b-instruct"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.provider, "nvidia");
    assert_eq!(config.workflow.max_retries, 2);
    assert_eq!(config.workflow.run_timeout_secs, 1200);
    assert_eq!(config.negotiation.max_rounds, 3);
    assert_eq!(config.negotiation.tolerance_pct(BudgetFlexibility::Strict), 0.0);
    assert!(config.tools.search.is_none());
    assert_eq!(config.tools.currency.len(), 2);
    assert!(config.log.is_none());
    assert!(config.log_dir().is_none());
}

#[test]
fn test_empty_currency_chain_is_rejected() {
    let toml_content = r#"
[tools]
currency = []
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(err.to_string().contains("currency provider"));
}

#[test]
fn test_missing_file_is_reported() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/tripweave.toml")).unwrap_err();
    assert!(err.to_string().contains("not found"));
}
