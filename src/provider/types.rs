use super::ProviderKind;
use crate::chat::ChatError;
use reqwest::Url;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_TEMPERATURE: f64 = 0.9;
pub const DEFAULT_TOP_P: f64 = 0.7;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings as handed over by the configuration store.
///
/// Everything is a plain string here; `ChatRequest::from_settings` is where
/// they get checked.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub provider: String,
    pub model: String,
    pub api_url: String,
    pub api_key: String,
    pub system_prompt: String,
    pub sampling: Sampling,

    /// Longest silence tolerated between two body chunks.
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
        }
    }
}

/// One fully resolved request, built fresh for every message.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub provider: ProviderKind,
    pub model: String,
    pub endpoint: Url,
    pub credential: String,
    pub system_prompt: String,
    pub user_message: String,
    pub sampling: Sampling,
}

impl ChatRequest {
    pub fn from_settings(settings: &ChatSettings, user_message: &str) -> Result<Self, ChatError> {
        let provider: ProviderKind = settings.provider.parse()?;
        let endpoint = Url::parse(settings.api_url.trim()).map_err(|source| ChatError::InvalidUrl {
            url: settings.api_url.clone(),
            source,
        })?;

        Ok(Self {
            provider,
            model: settings.model.clone(),
            endpoint,
            credential: settings.api_key.clone(),
            system_prompt: settings.system_prompt.clone(),
            user_message: user_message.to_string(),
            sampling: settings.sampling,
        })
    }

    /// System prompt followed by the user turn; every provider sends this pair.
    pub fn messages(&self) -> Vec<Message<'_>> {
        vec![
            Message {
                role: "system",
                content: &self.system_prompt,
            },
            Message {
                role: "user",
                content: &self.user_message,
            },
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[cfg(test)]
pub(crate) fn test_settings(provider: &str, url: &str) -> ChatSettings {
    ChatSettings {
        provider: provider.to_string(),
        model: "glm-4v-flash".to_string(),
        api_url: url.to_string(),
        api_key: "sk-test".to_string(),
        system_prompt: "test".to_string(),
        sampling: Sampling::default(),
        idle_timeout: DEFAULT_IDLE_TIMEOUT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: &str, url: &str) -> ChatSettings {
        test_settings(provider, url)
    }

    #[test]
    fn resolves_provider_case_insensitively() {
        let req = ChatRequest::from_settings(&settings("Qwen", "https://example.com/v1"), "hi").unwrap();
        assert_eq!(req.provider, ProviderKind::Qwen);
        assert_eq!(req.endpoint.as_str(), "https://example.com/v1");
        assert_eq!(req.user_message, "hi");
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = ChatRequest::from_settings(&settings("unknown", "https://example.com"), "hi").unwrap_err();
        assert!(matches!(err, ChatError::UnknownProvider(ref p) if p == "unknown"));
        assert!(err.is_configuration());
    }

    #[test]
    fn rejects_unparseable_url() {
        let err = ChatRequest::from_settings(&settings("zhipu", "not a url"), "hi").unwrap_err();
        assert!(matches!(err, ChatError::InvalidUrl { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn messages_put_system_prompt_first() {
        let req = ChatRequest::from_settings(&settings("ollama", "http://localhost:11434/api/chat"), "你好").unwrap();
        let msgs = req.messages();
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[0].content, "test");
        assert_eq!(msgs[1].role, "user");
        assert_eq!(msgs[1].content, "你好");
    }
}
