use super::sse::{self, EmptyDelta};
use super::types::{ChatRequest, Message};
use super::Frame;
use crate::chat::ChatError;
use serde::Serialize;

pub const DEFAULT_URL: &str = "https://open.bigmodel.cn/api/paas/v4/chat/completions";
pub const DEFAULT_MODEL: &str = "glm-4v-flash";

#[derive(Debug, Serialize)]
pub struct RequestBody<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    top_p: f64,
    temperature: f64,
    stream: bool,
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
struct Tool {
    #[serde(rename = "type")]
    kind: &'static str,
    web_search: WebSearch,
}

#[derive(Debug, Serialize)]
struct WebSearch {
    enable: bool,
    search_engine: &'static str,
}

pub fn request_body(req: &ChatRequest) -> RequestBody<'_> {
    RequestBody {
        model: &req.model,
        messages: req.messages(),
        top_p: req.sampling.top_p,
        temperature: req.sampling.temperature,
        stream: true,
        tools: vec![Tool {
            kind: "web_search",
            web_search: WebSearch {
                enable: true,
                search_engine: "search_std",
            },
        }],
    }
}

/// GLM passes on every `delta.content` it sees, empty strings included.
pub fn parse_line(line: &str) -> Result<Frame, ChatError> {
    sse::parse_line(line, EmptyDelta::Forward)
}
