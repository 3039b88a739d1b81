//! Chat completion backends.
//!
//! Each backend lives in its own module and provides two things: the JSON
//! body it expects and a parser for one line of its streamed response.
//! `ProviderKind` is the closed set of backends and dispatches to them.

pub mod ollama;
pub mod qwen;
mod sse;
pub mod types;
pub mod zhipu;

pub use types::{ChatRequest, ChatSettings, Sampling};

use crate::chat::ChatError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Zhipu GLM, OpenAI-style server-sent events.
    Zhipu,
    /// Alibaba DashScope (Tongyi Qianwen), server-sent events.
    Qwen,
    /// Local Ollama daemon, newline-delimited JSON.
    Ollama,
}

/// What a single line of a response body turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Delta(String),
    /// `data: [DONE]`.
    Sentinel,
    /// Blank lines, SSE comments and fields other than `data:`, envelopes
    /// without text.
    Ignored,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [ProviderKind::Zhipu, ProviderKind::Qwen, ProviderKind::Ollama];

    pub fn id(self) -> &'static str {
        match self {
            ProviderKind::Zhipu => "zhipu",
            ProviderKind::Qwen => "qwen",
            ProviderKind::Ollama => "ollama",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::Zhipu => "Zhipu GLM",
            ProviderKind::Qwen => "Tongyi Qianwen",
            ProviderKind::Ollama => "Ollama (local)",
        }
    }

    pub fn default_url(self) -> &'static str {
        match self {
            ProviderKind::Zhipu => zhipu::DEFAULT_URL,
            ProviderKind::Qwen => qwen::DEFAULT_URL,
            ProviderKind::Ollama => ollama::DEFAULT_URL,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Zhipu => zhipu::DEFAULT_MODEL,
            ProviderKind::Qwen => qwen::DEFAULT_MODEL,
            ProviderKind::Ollama => ollama::DEFAULT_MODEL,
        }
    }

    /// Whether requests carry `Authorization: Bearer <key>`.
    pub fn requires_credential(self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }

    /// Whether `url` points at this provider's hosted API.
    pub fn owns_url(self, url: &str) -> bool {
        match self {
            ProviderKind::Zhipu => url.contains("bigmodel"),
            ProviderKind::Qwen => url.contains("dashscope") || url.contains("aliyuncs"),
            ProviderKind::Ollama => url.contains(":11434"),
        }
    }

    /// Whether `model` looks like one of this provider's model names.
    pub fn owns_model(self, model: &str) -> bool {
        match self {
            ProviderKind::Zhipu => model.contains("glm"),
            ProviderKind::Qwen => model.contains("qwen"),
            // Ollama serves arbitrary local models; nothing to recognise.
            ProviderKind::Ollama => false,
        }
    }

    pub fn build_body(self, req: &ChatRequest) -> Result<Vec<u8>, ChatError> {
        let body = match self {
            ProviderKind::Zhipu => serde_json::to_vec(&zhipu::request_body(req)),
            ProviderKind::Qwen => serde_json::to_vec(&qwen::request_body(req)),
            ProviderKind::Ollama => serde_json::to_vec(&ollama::request_body(req)),
        };
        body.map_err(ChatError::Encode)
    }

    pub fn headers(self, credential: &str) -> Result<HeaderMap, ChatError> {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if self.requires_credential() {
            let mut v = HeaderValue::from_str(&format!("Bearer {credential}"))
                .map_err(|_| ChatError::InvalidCredential)?;
            v.set_sensitive(true);
            h.insert(AUTHORIZATION, v);
        }
        Ok(h)
    }

    /// Interpret one newline-stripped line of the response body.
    pub fn parse_line(self, line: &str) -> Result<Frame, ChatError> {
        match self {
            ProviderKind::Zhipu => zhipu::parse_line(line),
            ProviderKind::Qwen => qwen::parse_line(line),
            ProviderKind::Ollama => ollama::parse_line(line),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ProviderKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zhipu" => Ok(ProviderKind::Zhipu),
            "qwen" => Ok(ProviderKind::Qwen),
            "ollama" => Ok(ProviderKind::Ollama),
            _ => Err(ChatError::UnknownProvider(s.to_string())),
        }
    }
}
