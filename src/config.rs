/// Configuration for ath.
///
/// Two records live here:
/// - [`ProjectConfig`], written once into `<project>/.ath/config.json` by `init`;
/// - [`AssistantConfig`], the user's provider/model/API-key choice, loaded once
///   at startup and passed to whatever needs it.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Name of the per-project data directory.
pub const DATA_DIR_NAME: &str = ".ath";

const DB_FILENAME: &str = "data.db";
const PROJECT_CONFIG_FILENAME: &str = "config.json";
const ASSISTANT_CONFIG_FILENAME: &str = "assistant.json";
const KEY_MASK: &str = "••••••";

// ── Default value functions ──────────────────────────────────────────

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_max_context_chunks() -> usize {
    10
}

fn default_model() -> String {
    "codellama:7b".to_string()
}

// ── Project layout ───────────────────────────────────────────────────

/// Where a project's index lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
}

impl ProjectLayout {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Find the nearest ancestor of `start` (inclusive) holding a data directory.
    pub fn discover(start: &Path) -> Option<Self> {
        start
            .ancestors()
            .find(|dir| dir.join(DATA_DIR_NAME).is_dir())
            .map(Self::new)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR_NAME)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join(DB_FILENAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir().join(PROJECT_CONFIG_FILENAME)
    }
}

// ── Project config ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProjectConfig {
    #[serde(default = "default_version")]
    pub version: String,

    pub initialized_at: DateTime<Utc>,

    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    #[serde(default = "default_max_context_chunks")]
    pub max_context_chunks: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_context_chunks: default_max_context_chunks(),
        }
    }
}

impl ProjectConfig {
    /// A fresh record stamped with the current time.
    pub fn new() -> Self {
        Self {
            version: default_version(),
            initialized_at: Utc::now(),
            settings: Settings::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read project config: {}", path.display()))?;
        let cfg: ProjectConfig = serde_json::from_str(&data)
            .with_context(|| format!("invalid project config: {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write config: {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.settings.max_context_chunks > 0,
            "settings.max_context_chunks must be positive"
        );
        Ok(())
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Assistant config ─────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    /// Environment variable consulted when no key is configured.
    pub fn key_env_var(self) -> &'static str {
        match self {
            Provider::Ollama => "OLLAMA_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            other => anyhow::bail!("unknown provider: {other} (expected ollama, openai or anthropic)"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AssistantConfig {
    #[serde(default)]
    pub provider: Provider,

    #[serde(default = "default_model")]
    pub model: String,

    /// Provider name → API key.
    #[serde(default)]
    pub api_keys: HashMap<String, String>,

    /// Override for the provider endpoint (e.g. a remote Ollama).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: default_model(),
            api_keys: HashMap::new(),
            base_url: None,
        }
    }
}

impl AssistantConfig {
    /// `<config dir>/ath/assistant.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ath").join(ASSISTANT_CONFIG_FILENAME))
    }

    /// Load from `path`. A missing file yields defaults; so does invalid
    /// JSON, with a warning.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("{} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        match serde_json::from_str(&data) {
            Ok(cfg) => {
                info!("Loaded assistant configuration from {}", path.display());
                Ok(cfg)
            }
            Err(e) => {
                warn!("Invalid JSON in {}: {e}", path.display());
                warn!("Using default configuration");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Update one setting by name: `provider`, `model`, `base_url` or
    /// `<provider>_key`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "provider" => self.provider = value.parse()?,
            "model" => self.model = value.to_string(),
            "base_url" => {
                self.base_url = Some(value.to_string()).filter(|v| !v.is_empty());
            }
            _ => {
                let Some(provider) = key.strip_suffix("_key") else {
                    anyhow::bail!(
                        "unknown setting: {key} (expected provider, model, base_url or <provider>_key)"
                    );
                };
                let provider: Provider = provider.parse()?;
                self.api_keys
                    .insert(provider.as_str().to_string(), value.to_string());
            }
        }
        Ok(())
    }

    /// A copy safe to print: every configured key is replaced by a mask.
    pub fn masked(&self) -> Self {
        let api_keys = self
            .api_keys
            .iter()
            .map(|(provider, key)| {
                let shown = if key.is_empty() { "" } else { KEY_MASK };
                (provider.clone(), shown.to_string())
            })
            .collect();
        Self {
            api_keys,
            ..self.clone()
        }
    }

    /// API key for `provider`: the configured one, else its environment variable.
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        self.api_keys
            .get(provider.as_str())
            .filter(|k| !k.is_empty())
            .cloned()
            .or_else(|| {
                std::env::var(provider.key_env_var())
                    .ok()
                    .filter(|k| !k.is_empty())
            })
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_assistant_config() {
        let config = AssistantConfig::default();
        assert_eq!(config.provider, Provider::Ollama);
        assert_eq!(config.model, "codellama:7b");
        assert!(config.api_keys.is_empty());
    }

    #[test]
    fn test_assistant_config_from_json() {
        let json = r#"{"provider": "openai", "api_keys": {"openai": "sk-test"}}"#;
        let config: AssistantConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.provider, Provider::OpenAi);
        assert_eq!(config.model, "codellama:7b");
        assert_eq!(config.api_key(Provider::OpenAi).as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_assistant_config_missing_or_invalid_file() {
        let temp = tempdir().unwrap();
        let missing = AssistantConfig::load(&temp.path().join("none.json")).unwrap();
        assert_eq!(missing, AssistantConfig::default());

        let bad = temp.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert_eq!(AssistantConfig::load(&bad).unwrap(), AssistantConfig::default());
    }

    #[test]
    fn test_assistant_config_save_and_load() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("assistant.json");
        let mut config = AssistantConfig::default();
        config.provider = Provider::Anthropic;
        config.model = "claude-test".to_string();
        config.save(&path).unwrap();

        assert_eq!(AssistantConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_set_by_key_name() {
        let mut config = AssistantConfig::default();
        config.set("provider", "anthropic").unwrap();
        config.set("model", "claude-test").unwrap();
        config.set("openai_key", "sk-123").unwrap();
        config.set("base_url", "http://gpu-box:11434").unwrap();

        assert_eq!(config.provider, Provider::Anthropic);
        assert_eq!(config.model, "claude-test");
        assert_eq!(config.api_keys["openai"], "sk-123");
        assert_eq!(config.base_url.as_deref(), Some("http://gpu-box:11434"));

        config.set("base_url", "").unwrap();
        assert_eq!(config.base_url, None);

        assert!(config.set("temperature", "0.2").is_err());
        assert!(config.set("gpt4all_key", "x").is_err());
        assert!(config.set("provider", "gpt4all").is_err());
    }

    #[test]
    fn test_masked_hides_keys() {
        let mut config = AssistantConfig::default();
        config.set("openai_key", "sk-secret").unwrap();
        config.api_keys.insert("anthropic".to_string(), String::new());

        let shown = config.masked();
        assert_eq!(shown.api_keys["openai"], KEY_MASK);
        assert_eq!(shown.api_keys["anthropic"], "");
        assert_eq!(shown.model, config.model);

        let json = serde_json::to_string(&shown).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!("anthropic".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert!("gpt4all".parse::<Provider>().is_err());
    }

    #[test]
    fn test_project_config_written_once() {
        let temp = tempdir().unwrap();
        let layout = ProjectLayout::new(temp.path());
        std::fs::create_dir_all(layout.data_dir()).unwrap();

        let config = ProjectConfig::new();
        config.save(&layout.config_path()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(layout.config_path()).unwrap()).unwrap();
        assert_eq!(raw["settings"]["max_context_chunks"], 10);
        assert_eq!(raw["version"], env!("CARGO_PKG_VERSION"));

        let loaded = ProjectConfig::load(&layout.config_path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_project_config_rejects_zero_chunks() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"initialized_at": "2026-01-01T00:00:00Z", "settings": {"max_context_chunks": 0}}"#,
        )
        .unwrap();
        assert!(ProjectConfig::load(&path).is_err());
    }

    #[test]
    fn test_layout_discover_walks_up() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join(DATA_DIR_NAME)).unwrap();
        let nested = root.join("src").join("pkg");
        std::fs::create_dir_all(&nested).unwrap();

        let layout = ProjectLayout::discover(&nested).unwrap();
        assert_eq!(layout.root, root);
        assert_eq!(layout.db_path(), root.join(".ath").join("data.db"));
    }
}
