use super::types::{ChatRequest, Message};
use super::Frame;
use crate::chat::ChatError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_URL: &str = "http://localhost:11434/api/chat";
pub const DEFAULT_MODEL: &str = "qwen2.5";

#[derive(Debug, Serialize)]
pub struct RequestBody<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f64,
    top_p: f64,
}

/// One line of `/api/chat` output.
#[derive(Debug, Clone, Deserialize)]
struct ChatLine {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub fn request_body(req: &ChatRequest) -> RequestBody<'_> {
    RequestBody {
        model: &req.model,
        messages: req.messages(),
        stream: true,
        options: Options {
            temperature: req.sampling.temperature,
            top_p: req.sampling.top_p,
        },
    }
}

/// Each line is a bare JSON object; there is no prefix and no end sentinel.
pub fn parse_line(line: &str) -> Result<Frame, ChatError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Frame::Ignored);
    }

    let parsed: ChatLine = serde_json::from_str(line).map_err(|source| ChatError::FrameDecode {
        line: line.to_string(),
        source,
    })?;

    if let Some(message) = parsed.error {
        return Err(ChatError::Remote(message));
    }

    Ok(match parsed.message.and_then(|m| m.content) {
        Some(text) if !text.is_empty() => Frame::Delta(text),
        _ => Frame::Ignored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::test_settings;
    use serde_json::json;

    #[test]
    fn body_carries_sampling_in_options() {
        let mut settings = test_settings("ollama", DEFAULT_URL);
        settings.model = DEFAULT_MODEL.to_string();
        let req = ChatRequest::from_settings(&settings, "hi").unwrap();
        let body = serde_json::to_value(request_body(&req)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "qwen2.5",
                "messages": [
                    {"role": "system", "content": "test"},
                    {"role": "user", "content": "hi"}
                ],
                "stream": true,
                "options": {"temperature": 0.9, "top_p": 0.7}
            })
        );
    }

    #[test]
    fn extracts_message_content() {
        let line = r#"{"model":"qwen2.5","message":{"role":"assistant","content":"Hi"},"done":false}"#;
        assert_eq!(parse_line(line).unwrap(), Frame::Delta("Hi".into()));
    }

    #[test]
    fn final_line_without_content_is_ignored() {
        let line = r#"{"model":"qwen2.5","message":{"role":"assistant","content":""},"done":true,"total_duration":1}"#;
        assert_eq!(parse_line(line).unwrap(), Frame::Ignored);
        assert_eq!(parse_line("   ").unwrap(), Frame::Ignored);
    }

    #[test]
    fn error_field_is_reported() {
        let err = parse_line(r#"{"error":"model 'nope' not found"}"#).unwrap_err();
        assert!(matches!(err, ChatError::Remote(ref m) if m == "model 'nope' not found"));
    }

    #[test]
    fn sse_prefixed_line_is_malformed() {
        let err = parse_line(r#"data: {"message":{"content":"x"}}"#).unwrap_err();
        assert!(matches!(err, ChatError::FrameDecode { .. }));
    }
}
