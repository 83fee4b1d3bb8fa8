//! Model interaction: send page images plus instructions, get text back.
//!
//! The processor talks to the model only through the [`ModelClient`] trait,
//! so tests can script answers without a network. [`LlmModelClient`] is the
//! production adapter over an `edgequake_llm` provider.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! avoids thundering-herd: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s. Each attempt is bounded by `api_timeout_secs`.

use crate::config::ExtractionConfig;
use crate::error::{InvoiceError, ModelError};
use crate::prompts::USER_TURN;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Model used when a provider is named (or auto-selected) without one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Sampling settings for one completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionSettings {
    pub temperature: f32,
    pub max_output_tokens: usize,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_output_tokens: 1000,
        }
    }
}

impl CompletionSettings {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_tokens,
        }
    }
}

/// The model's text answer plus token accounting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Anything that can answer "here are some page images, do this".
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        images: &[ImageData],
        instructions: &str,
        settings: &CompletionSettings,
    ) -> Result<ModelResponse, ModelError>;
}

/// [`ModelClient`] backed by an `edgequake_llm` provider.
pub struct LlmModelClient {
    provider: Arc<dyn LLMProvider>,
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout: Duration,
}

impl LlmModelClient {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        let defaults = ExtractionConfig::default();
        Self {
            provider,
            max_retries: defaults.max_retries,
            retry_backoff_ms: defaults.retry_backoff_ms,
            timeout: Duration::from_secs(defaults.api_timeout_secs),
        }
    }

    /// Resolve the provider from `config` and take its retry and timeout knobs.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, InvoiceError> {
        let provider = resolve_provider(config)?;
        Ok(Self {
            provider,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout: Duration::from_secs(config.api_timeout_secs),
        })
    }

    pub fn with_retries(mut self, max_retries: u32, backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff_ms = backoff_ms;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ModelClient for LlmModelClient {
    /// Send one system turn with the instructions and one user turn carrying
    /// every image, retrying failed attempts with exponential backoff.
    async fn complete(
        &self,
        images: &[ImageData],
        instructions: &str,
        settings: &CompletionSettings,
    ) -> Result<ModelResponse, ModelError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(instructions),
            ChatMessage::user_with_images(USER_TURN, images.to_vec()),
        ];
        let options = build_options(settings);

        let mut last_err = ModelError::RequestFailed {
            retries: 0,
            detail: "no attempt made".to_string(),
        };

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Model call: retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(self.timeout, self.provider.chat(&messages, Some(&options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "Model call: {} images, {} input tokens, {} output tokens, {:?}",
                        images.len(),
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(ModelResponse {
                        text: response.content,
                        input_tokens: response.prompt_tokens as u64,
                        output_tokens: response.completion_tokens as u64,
                    });
                }
                Ok(Err(e)) => {
                    warn!("Model call: attempt {} failed: {}", attempt + 1, e);
                    last_err = ModelError::RequestFailed {
                        retries: attempt,
                        detail: e.to_string(),
                    };
                }
                Err(_) => {
                    warn!(
                        "Model call: attempt {} timed out after {}s",
                        attempt + 1,
                        self.timeout.as_secs()
                    );
                    last_err = ModelError::Timeout {
                        secs: self.timeout.as_secs(),
                    };
                }
            }
        }

        Err(last_err)
    }
}

/// Build `CompletionOptions` from the completion settings.
fn build_options(settings: &CompletionSettings) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(settings.temperature),
        max_tokens: Some(settings.max_output_tokens),
        ..Default::default()
    }
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, InvoiceError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        InvoiceError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), built through
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set, with [`DEFAULT_MODEL`] unless
///    `config.model` says otherwise.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, InvoiceError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| InvoiceError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
