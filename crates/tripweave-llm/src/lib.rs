pub mod json;
pub mod providers;
pub mod retry;

use std::sync::Arc;

use tripweave_core::config::{AppConfig, ModelConfig};
use tripweave_core::traits::ReasoningClient;

pub use json::extract_json;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create a reasoning client for a model configuration.
///
/// Every supported provider speaks the OpenAI chat-completions protocol.
pub fn create_client(config: &ModelConfig) -> Box<dyn ReasoningClient> {
    Box::new(OpenAiClient::new(config.clone()))
}

/// Build the primary client wrapped with retry and the fallback chain.
pub fn client_from_config(config: &AppConfig) -> Arc<dyn ReasoningClient> {
    let primary = create_client(&config.model);
    if config.fallback_models.is_empty() && config.model.retry.is_none() {
        return Arc::from(primary);
    }

    let retry_config = config.model.retry.clone().unwrap_or_default();
    let fallbacks = config
        .fallback_models
        .iter()
        .map(|mc| (mc.model_id.clone(), create_client(mc)))
        .collect();
    Arc::new(RetryingClient::new(primary, fallbacks, retry_config))
}
