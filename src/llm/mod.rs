mod gemini;
mod ollama;
mod openai;

use crate::types::Gender;
use async_trait::async_trait;
use std::time::Duration;

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// Sampling temperature used for guest whispers
pub const DEFAULT_TEMPERATURE: f32 = 1.2;

/// Request to generate a short text
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// The prompt text
    pub prompt: String,
    /// Maximum response length in tokens (provider-dependent)
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Timeout for the request
    pub timeout: Duration,
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// The generated text
    pub text: String,
    pub metadata: ResponseMetadata,
}

/// Metadata about the LLM response
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// Name of the provider (e.g., "openai", "gemini")
    pub provider: String,
    pub model: String,
    /// Tokens consumed (if reported)
    pub tokens_used: Option<u32>,
    pub latency_ms: u64,
}

/// Trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

/// Ordered list of providers; earlier providers are preferred
pub struct LlmManager {
    pub providers: Vec<Box<dyn LlmProvider>>,
    pub default_timeout: Duration,
    pub default_max_tokens: u32,
}

impl LlmManager {
    pub fn new(providers: Vec<Box<dyn LlmProvider>>) -> Self {
        let defaults = LlmConfig::default();
        Self {
            providers,
            default_timeout: defaults.default_timeout,
            default_max_tokens: defaults.default_max_tokens,
        }
    }

    /// Try providers in order and return the first successful response
    pub async fn generate_first(
        &self,
        request: GenerateRequest,
    ) -> LlmResult<(String, GenerateResponse)> {
        let mut last_error = None;

        for provider in &self.providers {
            match provider.generate(request.clone()).await {
                Ok(response) => {
                    tracing::debug!(
                        "Provider {} answered in {}ms using {}",
                        provider.name(),
                        response.metadata.latency_ms,
                        response.metadata.model
                    );
                    return Ok((provider.name().to_string(), response));
                }
                Err(e) => {
                    tracing::warn!("Provider {} failed: {}", provider.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::ConfigError("No LLM providers configured".to_string())))
    }

    /// Request with the manager's defaults
    pub fn request(&self, prompt: String) -> GenerateRequest {
        GenerateRequest {
            prompt,
            max_tokens: Some(self.default_max_tokens),
            temperature: Some(DEFAULT_TEMPERATURE),
            timeout: self.default_timeout,
        }
    }
}

/// Configuration for LLM providers
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    /// Ollama is only used when this is set
    pub ollama_base_url: Option<String>,
    pub ollama_model: String,
    /// Default timeout for LLM requests
    pub default_timeout: Duration,
    /// Default max tokens for responses
    pub default_max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            ollama_base_url: None,
            ollama_model: "llama3.2".to_string(),
            default_timeout: Duration::from_secs(10),
            default_max_tokens: 120,
        }
    }
}

/// Non-blank, trimmed value of an environment variable
fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

impl LlmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            openai_api_key: env_value("OPENAI_API_KEY"),
            openai_model: env_value("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            gemini_api_key: env_value("GEMINI_API_KEY"),
            gemini_model: env_value("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            ollama_base_url: env_value("OLLAMA_BASE_URL"),
            ollama_model: env_value("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            default_timeout: env_value("LLM_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_timeout),
            default_max_tokens: env_value("LLM_MAX_TOKENS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_max_tokens),
        }
    }

    /// Build an LlmManager with all configured providers, in preference order
    pub fn build_manager(&self) -> LlmResult<LlmManager> {
        let mut providers: Vec<Box<dyn LlmProvider>> = Vec::new();

        if let Some(api_key) = &self.gemini_api_key {
            providers.push(Box::new(GeminiProvider::new(
                api_key.clone(),
                self.gemini_model.clone(),
            )?));
        }

        if let Some(api_key) = &self.openai_api_key {
            providers.push(Box::new(OpenAiProvider::new(
                api_key.clone(),
                self.openai_model.clone(),
            )));
        }

        if let Some(base_url) = &self.ollama_base_url {
            providers.push(Box::new(OllamaProvider::new(
                base_url.clone(),
                self.ollama_model.clone(),
            )?));
        }

        if providers.is_empty() {
            return Err(LlmError::ConfigError(
                "No LLM providers configured. Set GEMINI_API_KEY, OPENAI_API_KEY or OLLAMA_BASE_URL"
                    .to_string(),
            ));
        }

        Ok(LlmManager {
            providers,
            default_timeout: self.default_timeout,
            default_max_tokens: self.default_max_tokens,
        })
    }
}

/// Shown when the provider answered with nothing
pub fn empty_reply_fallback(choice: Gender) -> String {
    format!("Thanks for supporting Team {}! 🎉", choice)
}

/// Shown when no provider is configured or all of them failed
pub fn error_fallback(choice: Gender) -> String {
    format!("You voted {}! Good luck! 🤞", choice)
}

fn prediction_prompt(name: &str, choice: Gender) -> String {
    let guess = match choice {
        Gender::Boy => "a baby boy",
        Gender::Girl => "a baby girl",
    };
    format!(
        "You are the baby still in the belly, whispering to a guest at your gender reveal party. \
         Write ONE short, funny and cheerful sentence to them, like sharing a secret with a friend. \
         Be playful and cute and use emoji. Do not reveal whether you are a boy or a girl.\n\
         The guest's name is {name} and they guessed {guess}.\n\
         Example: \"Hey {name}, you think I'm {guess}? Hold on, you'll find out when I come out! 👶\""
    )
}

/// Personalized whisper for a guest who just voted.
///
/// Never fails: falls back to a fixed message when generation is unavailable.
pub async fn generate_prediction(manager: Option<&LlmManager>, name: &str, choice: Gender) -> String {
    let Some(manager) = manager else {
        return error_fallback(choice);
    };

    let request = manager.request(prediction_prompt(name, choice));
    match manager.generate_first(request).await {
        Ok((_, response)) => {
            let text = response.text.trim();
            if text.is_empty() {
                tracing::warn!("Prediction for {} came back empty", name);
                empty_reply_fallback(choice)
            } else {
                text.to_string()
            }
        }
        Err(e) => {
            tracing::warn!("Prediction for {} failed: {}, using fallback", name, e);
            error_fallback(choice)
        }
    }
}
