/// Answer generation: the external capability the chat layer calls.
///
/// The core only needs `generate(prompt) -> text`. Every provider may be
/// unreachable, so failures come back as [`GenerateError`] and the caller
/// decides how to present them.
pub mod http;
pub mod mock;

use crate::config::{AssistantConfig, Provider};
use thiserror::Error;

pub use http::{AnthropicGenerator, OllamaGenerator, OpenAiGenerator};

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("no API key for {provider}; set it in the config file or {env_var}")]
    MissingApiKey {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("cannot reach {provider}: {source}")]
    Unavailable {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} returned an unreadable response: {reason}")]
    BadResponse {
        provider: &'static str,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Produces text for a prompt.
pub trait Generator {
    fn generate(&self, prompt: &str) -> Result<String, GenerateError>;

    /// Short label for logs and the chat banner.
    fn name(&self) -> &str;
}

/// Build the generator selected by `config`.
pub fn from_config(config: &AssistantConfig) -> Result<Box<dyn Generator>, GenerateError> {
    let generator: Box<dyn Generator> = match config.provider {
        Provider::Ollama => Box::new(OllamaGenerator::new(
            config.model.clone(),
            config.base_url.clone(),
        )?),
        Provider::OpenAi => {
            let key = require_key(config, Provider::OpenAi)?;
            Box::new(OpenAiGenerator::new(config.model.clone(), key, config.base_url.clone())?)
        }
        Provider::Anthropic => {
            let key = require_key(config, Provider::Anthropic)?;
            Box::new(AnthropicGenerator::new(
                config.model.clone(),
                key,
                config.base_url.clone(),
            )?)
        }
    };
    Ok(generator)
}

fn require_key(config: &AssistantConfig, provider: Provider) -> Result<String, GenerateError> {
    config
        .api_key(provider)
        .ok_or(GenerateError::MissingApiKey {
            provider: provider.as_str(),
            env_var: provider.key_env_var(),
        })
}
