/// HTTP-backed generators: local Ollama, OpenAI chat completions and the
/// Anthropic messages API. All calls are blocking and never retried.
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{GenerateError, Generator};

const OLLAMA_URL: &str = "http://localhost:11434";
const OPENAI_URL: &str = "https://api.openai.com";
const ANTHROPIC_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f32 = 0.7;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

fn build_client() -> Result<Client, GenerateError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("ath/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(GenerateError::Client)
}

/// Send `request` and decode a successful JSON body as `T`.
fn send_json<T: DeserializeOwned>(
    provider: &'static str,
    request: RequestBuilder,
) -> Result<T, GenerateError> {
    let resp = request
        .send()
        .map_err(|source| GenerateError::Unavailable { provider, source })?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        return Err(GenerateError::Status {
            provider,
            status: status.as_u16(),
            body,
        });
    }

    resp.json().map_err(|e| GenerateError::BadResponse {
        provider,
        reason: e.to_string(),
    })
}

fn endpoint(base_url: Option<String>, default: &str, path: &str) -> String {
    let base = base_url.unwrap_or_else(|| default.to_string());
    format!("{}{}", base.trim_end_matches('/'), path)
}

// ── Ollama ───────────────────────────────────────────────────────────

pub struct OllamaGenerator {
    model: String,
    url: String,
    client: Client,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: Option<String>,
}

impl OllamaGenerator {
    pub fn new(model: String, base_url: Option<String>) -> Result<Self, GenerateError> {
        Ok(Self {
            model,
            url: endpoint(base_url, OLLAMA_URL, "/api/generate"),
            client: build_client()?,
        })
    }
}

impl Generator for OllamaGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        debug!("POST {} (model {})", self.url, self.model);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let parsed: OllamaResponse = send_json("ollama", self.client.post(&self.url).json(&body))?;
        parsed.response.ok_or_else(|| GenerateError::BadResponse {
            provider: "ollama",
            reason: "missing `response` field".to_string(),
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

// ── OpenAI ───────────────────────────────────────────────────────────

pub struct OpenAiGenerator {
    model: String,
    api_key: String,
    url: String,
    client: Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(
        model: String,
        api_key: String,
        base_url: Option<String>,
    ) -> Result<Self, GenerateError> {
        Ok(Self {
            model,
            api_key,
            url: endpoint(base_url, OPENAI_URL, "/v1/chat/completions"),
            client: build_client()?,
        })
    }
}

impl Generator for OpenAiGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        debug!("POST {} (model {})", self.url, self.model);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
        });
        let request = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body);
        let parsed: ChatResponse = send_json("openai", request)?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| GenerateError::BadResponse {
                provider: "openai",
                reason: "no choices in response".to_string(),
            })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ── Anthropic ────────────────────────────────────────────────────────

pub struct AnthropicGenerator {
    model: String,
    api_key: String,
    url: String,
    client: Client,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl AnthropicGenerator {
    pub fn new(
        model: String,
        api_key: String,
        base_url: Option<String>,
    ) -> Result<Self, GenerateError> {
        Ok(Self {
            model,
            api_key,
            url: endpoint(base_url, ANTHROPIC_URL, "/v1/messages"),
            client: build_client()?,
        })
    }
}

impl Generator for AnthropicGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        debug!("POST {} (model {})", self.url, self.model);
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let request = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        let parsed: MessagesResponse = send_json("anthropic", request)?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(GenerateError::BadResponse {
                provider: "anthropic",
                reason: "no text content in response".to_string(),
            });
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
