use crate::provider::types::DEFAULT_IDLE_TIMEOUT;
use crate::provider::{ChatSettings, ProviderKind, Sampling};
use anyhow::{anyhow, Context};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "你的名字叫布偶熊·觅语，用80%可爱和20%傲娇的风格回答问题，在回答问题前都要说：指挥官，你好。";

/// Overrides the API key stored in the config file.
pub const API_KEY_ENV: &str = "PET_CHAT_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Provider identifier: "zhipu", "qwen" or "ollama"
    pub provider: Option<String>,

    pub model: Option<String>,

    /// Chat completion endpoint
    pub api_url: Option<String>,

    /// Bearer credential; unused by ollama
    pub api_key: Option<String>,

    pub system_prompt: Option<String>,

    pub temperature: Option<f64>,
    pub top_p: Option<f64>,

    /// Seconds without response data before a request is abandoned.
    pub timeout_secs: Option<u64>,
}

/// Per-invocation values that win over the file (command-line flags).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_url: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown provider {0:?} (expected one of: zhipu, qwen, ollama)")]
    UnknownProvider(String),
    #[error("API key is empty (set `api_key` or PET_CHAT_API_KEY)")]
    EmptyApiKey,
    #[error("API URL {0:?} is not a valid http(s) URL")]
    InvalidUrl(String),
    #[error("model name {0:?} is empty or contains characters outside [A-Za-z0-9_.:-]")]
    InvalidModel(String),
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }

    /// Write to a sibling temp file, then rename over `path`.
    pub fn save_atomic(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory: {}", dir.display()))?;

        let tmp = tmp_path(path);
        let text = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(&tmp, text).with_context(|| format!("failed to write temp config: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to move config into place: {}", path.display()))?;
        Ok(())
    }

    /// Fill every gap with the defaults of the selected provider.
    pub fn resolve(&self, overrides: &Overrides) -> ChatSettings {
        let provider = overrides
            .provider
            .clone()
            .or_else(|| self.provider.clone())
            .unwrap_or_else(|| ProviderKind::Zhipu.id().to_string());

        // An unknown id is passed through untouched; the chat client rejects it.
        let defaults = provider.parse::<ProviderKind>().unwrap_or(ProviderKind::Zhipu);

        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone())
            .unwrap_or_default();

        ChatSettings {
            model: overrides
                .model
                .clone()
                .or_else(|| self.model.clone())
                .unwrap_or_else(|| defaults.default_model().to_string()),
            api_url: overrides
                .api_url
                .clone()
                .or_else(|| self.api_url.clone())
                .unwrap_or_else(|| defaults.default_url().to_string()),
            api_key,
            system_prompt: overrides
                .system_prompt
                .clone()
                .or_else(|| self.system_prompt.clone())
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            sampling: Sampling {
                temperature: self.temperature.unwrap_or(Sampling::default().temperature),
                top_p: self.top_p.unwrap_or(Sampling::default().top_p),
            },
            idle_timeout: Duration::from_secs(
                self.timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT.as_secs()).max(1),
            ),
            provider,
        }
    }

    /// Select `kind`, carrying over URL and model unless they belong to a
    /// different provider (or are unset).
    pub fn switch_provider(&mut self, kind: ProviderKind) {
        let others = || ProviderKind::ALL.into_iter().filter(move |k| *k != kind);

        let stale_url = match self.api_url.as_deref() {
            None => true,
            Some(url) => url.trim().is_empty() || others().any(|k| k.owns_url(url)),
        };
        if stale_url {
            self.api_url = Some(kind.default_url().to_string());
        }

        let stale_model = match self.model.as_deref() {
            None => true,
            Some(model) => model.trim().is_empty() || others().any(|k| k.owns_model(model)),
        };
        if stale_model {
            self.model = Some(kind.default_model().to_string());
        }

        self.provider = Some(kind.id().to_string());
    }

    /// Assign one field by its TOML key.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let text = || Some(value.to_string());
        match key {
            "provider" => {
                let kind: ProviderKind = value.parse()?;
                self.switch_provider(kind);
            }
            "model" => self.model = text(),
            "api_url" => self.api_url = text(),
            "api_key" => self.api_key = text(),
            "system_prompt" => self.system_prompt = text(),
            "temperature" => {
                self.temperature = Some(value.parse().with_context(|| format!("not a number: {value}"))?)
            }
            "top_p" => self.top_p = Some(value.parse().with_context(|| format!("not a number: {value}"))?),
            "timeout_secs" => {
                self.timeout_secs = Some(value.parse().with_context(|| format!("not a whole number: {value}"))?)
            }
            other => return Err(anyhow!("unknown config key: {other}")),
        }
        Ok(())
    }
}

/// Field checks run before settings are saved or used.
pub fn validate(settings: &ChatSettings) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let kind = match settings.provider.parse::<ProviderKind>() {
        Ok(k) => Some(k),
        Err(_) => {
            errors.push(ValidationError::UnknownProvider(settings.provider.clone()));
            None
        }
    };

    if kind.is_some_and(ProviderKind::requires_credential) && settings.api_key.trim().is_empty() {
        errors.push(ValidationError::EmptyApiKey);
    }

    let url_ok = Url::parse(settings.api_url.trim())
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false);
    if !url_ok {
        errors.push(ValidationError::InvalidUrl(settings.api_url.clone()));
    }

    let model_ok = !settings.model.is_empty()
        && settings
            .model
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if !model_ok {
        errors.push(ValidationError::InvalidModel(settings.model.clone()));
    }

    errors
}

/// `sk-abcdef123456` -> `sk-a…3456`
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut p = path.to_path_buf();
    let file = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "config.toml".to_string());
    p.set_file_name(format!("{file}.tmp"));
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ollama, qwen, zhipu};

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_optional(dir.path().join("config.toml")).unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.switch_provider(ProviderKind::Ollama);
        cfg.temperature = Some(0.5);
        cfg.save_atomic(&path).unwrap();

        let loaded = Config::load_optional(&path).unwrap().unwrap();
        assert_eq!(loaded, cfg);
        assert!(!dir.path().join("nested").join("config.toml.tmp").exists());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "provider = [").unwrap();
        assert!(Config::load_optional(&path).is_err());
    }

    #[test]
    fn empty_config_resolves_to_zhipu_defaults() {
        let settings = Config::default().resolve(&Overrides::default());
        assert_eq!(settings.provider, "zhipu");
        assert_eq!(settings.model, zhipu::DEFAULT_MODEL);
        assert_eq!(settings.api_url, zhipu::DEFAULT_URL);
        assert_eq!(settings.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(settings.sampling, Sampling::default());
        assert_eq!(settings.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn overrides_win_over_file() {
        let cfg = Config {
            provider: Some("qwen".into()),
            model: Some("qwen-max".into()),
            timeout_secs: Some(5),
            ..Config::default()
        };
        let settings = cfg.resolve(&Overrides {
            model: Some("qwen-plus".into()),
            ..Overrides::default()
        });
        assert_eq!(settings.provider, "qwen");
        assert_eq!(settings.model, "qwen-plus");
        assert_eq!(settings.api_url, qwen::DEFAULT_URL);
        assert_eq!(settings.idle_timeout, Duration::from_secs(5));
    }

    #[test]
    fn switching_provider_replaces_foreign_defaults() {
        let mut cfg = Config::default();
        cfg.switch_provider(ProviderKind::Zhipu);
        cfg.switch_provider(ProviderKind::Qwen);
        assert_eq!(cfg.api_url.as_deref(), Some(qwen::DEFAULT_URL));
        assert_eq!(cfg.model.as_deref(), Some(qwen::DEFAULT_MODEL));

        cfg.switch_provider(ProviderKind::Ollama);
        assert_eq!(cfg.api_url.as_deref(), Some(ollama::DEFAULT_URL));
        assert_eq!(cfg.model.as_deref(), Some(ollama::DEFAULT_MODEL));
        assert_eq!(cfg.provider.as_deref(), Some("ollama"));
    }

    #[test]
    fn switching_provider_keeps_custom_values() {
        let mut cfg = Config {
            api_url: Some("https://proxy.internal/v1/chat".into()),
            model: Some("my-finetune".into()),
            ..Config::default()
        };
        cfg.switch_provider(ProviderKind::Qwen);
        assert_eq!(cfg.api_url.as_deref(), Some("https://proxy.internal/v1/chat"));
        assert_eq!(cfg.model.as_deref(), Some("my-finetune"));
    }

    #[test]
    fn set_parses_values_and_rejects_unknown_keys() {
        let mut cfg = Config::default();
        cfg.set("provider", "Ollama").unwrap();
        cfg.set("top_p", "0.5").unwrap();
        cfg.set("timeout_secs", "30").unwrap();
        assert_eq!(cfg.provider.as_deref(), Some("ollama"));
        assert_eq!(cfg.top_p, Some(0.5));
        assert_eq!(cfg.timeout_secs, Some(30));

        assert!(cfg.set("provider", "openai").is_err());
        assert!(cfg.set("temperature", "warm").is_err());
        assert!(cfg.set("colour", "blue").is_err());
    }

    #[test]
    fn validation_requires_key_except_for_ollama() {
        let mut settings = Config::default().resolve(&Overrides::default());
        settings.api_key.clear();
        assert_eq!(validate(&settings), [ValidationError::EmptyApiKey]);

        let mut cfg = Config::default();
        cfg.switch_provider(ProviderKind::Ollama);
        let mut settings = cfg.resolve(&Overrides::default());
        settings.api_key.clear();
        assert!(validate(&settings).is_empty());
    }

    #[test]
    fn validation_reports_every_bad_field() {
        let mut settings = Config::default().resolve(&Overrides::default());
        settings.provider = "gpt".into();
        settings.api_url = "ftp://example.com".into();
        settings.model = "glm 4".into();

        let errors = validate(&settings);
        assert_eq!(
            errors,
            [
                ValidationError::UnknownProvider("gpt".into()),
                ValidationError::InvalidUrl("ftp://example.com".into()),
                ValidationError::InvalidModel("glm 4".into()),
            ]
        );
    }

    #[test]
    fn masks_secrets() {
        assert_eq!(mask_secret("sk-abcdef123456"), "sk-a…3456");
        assert_eq!(mask_secret("short"), "*****");
        assert_eq!(mask_secret(""), "");
    }
}
