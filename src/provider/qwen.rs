use super::sse::{self, EmptyDelta};
use super::types::{ChatRequest, Message};
use super::Frame;
use crate::chat::ChatError;
use serde::Serialize;

pub const DEFAULT_URL: &str = "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation";
pub const DEFAULT_MODEL: &str = "qwen-turbo";

#[derive(Debug, Serialize)]
pub struct RequestBody<'a> {
    model: &'a str,
    input: Input<'a>,
    parameters: Parameters,
}

#[derive(Debug, Serialize)]
struct Input<'a> {
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Parameters {
    top_p: f64,
    temperature: f64,
    stream: bool,
    #[serde(rename = "type")]
    kind: &'static str,
}

pub fn request_body(req: &ChatRequest) -> RequestBody<'_> {
    RequestBody {
        model: &req.model,
        input: Input {
            messages: req.messages(),
        },
        parameters: Parameters {
            top_p: req.sampling.top_p,
            temperature: req.sampling.temperature,
            stream: true,
            kind: "json_object",
        },
    }
}

/// DashScope sends keep-alive envelopes with `content: ""`; those are dropped.
pub fn parse_line(line: &str) -> Result<Frame, ChatError> {
    sse::parse_line(line, EmptyDelta::Drop)
}
