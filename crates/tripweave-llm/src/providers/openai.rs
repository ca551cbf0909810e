use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tripweave_core::config::ModelConfig;
use tripweave_core::error::{Result, TripweaveError};
use tripweave_core::traits::ReasoningClient;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const NVIDIA_API_URL: &str = "https://integrate.api.nvidia.com/v1/chat/completions";
const OLLAMA_API_URL: &str = "http://localhost:11434/v1/chat/completions";

/// OpenAI-compatible chat-completions client. Works with NVIDIA NIM, OpenAI,
/// Ollama, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
    config: ModelConfig,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    /// Endpoint for the configured provider unless `base_url` overrides it.
    pub fn endpoint(&self) -> &str {
        if let Some(url) = self.config.base_url.as_deref() {
            return url;
        }
        match self.config.provider.as_str() {
            "nvidia" | "nim" => NVIDIA_API_URL,
            "ollama" => OLLAMA_API_URL,
            _ => OPENAI_API_URL,
        }
    }

    fn api_key(&self) -> Option<String> {
        if let Some(key) = &self.config.api_key {
            return Some(key.clone());
        }
        let var = match self.config.provider.as_str() {
            "nvidia" | "nim" => "NVIDIA_API_KEY",
            "ollama" => return None,
            _ => "OPENAI_API_KEY",
        };
        std::env::var(var).ok()
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OaiMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct OaiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn parse_response(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| TripweaveError::ReasoningParse(format!("invalid response body: {}", e)))?;

    if let Some(usage) = &parsed.usage {
        debug!(
            input_tokens = usage.prompt_tokens,
            output_tokens = usage.completion_tokens,
            "Reasoning usage"
        );
    }

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| TripweaveError::ReasoningParse("response had no content".into()))
}

impl ReasoningClient for OpenAiClient {
    fn complete(&self, system: &str, prompt: &str) -> BoxFuture<'_, Result<String>> {
        let system = system.to_string();
        let prompt = prompt.to_string();

        Box::pin(async move {
            let body = ChatRequest {
                model: &self.config.model_id,
                messages: vec![
                    OaiMessage {
                        role: "system",
                        content: &system,
                    },
                    OaiMessage {
                        role: "user",
                        content: &prompt,
                    },
                ],
                max_tokens: self.config.max_tokens,
                temperature: if self.config.temperature > 0.0 {
                    Some(self.config.temperature)
                } else {
                    None
                },
                stream: false,
            };

            let mut req = self.http.post(self.endpoint()).json(&body);

            if let Some(api_key) = self.api_key() {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            let response = req
                .send()
                .await
                .map_err(|e| TripweaveError::Reasoning(e.to_string()))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| TripweaveError::Reasoning(e.to_string()))?;

            if !status.is_success() {
                return Err(TripweaveError::Reasoning(format!("HTTP {}: {}", status, text)));
            }

            parse_response(&text)
        })
    }
}
