//! Line handling shared by the providers that answer with server-sent events.

use super::Frame;
use crate::chat::ChatError;
use serde::Deserialize;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Whether a `delta.content` of `""` is passed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum EmptyDelta {
    Forward,
    Drop,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Clone, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

pub(super) fn parse_line(line: &str, empty: EmptyDelta) -> Result<Frame, ChatError> {
    // Ignore other fields: event:, id:, retry:, comments
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(Frame::Ignored);
    };

    let payload = rest.trim();
    if payload == DONE_SENTINEL {
        return Ok(Frame::Sentinel);
    }

    let chunk: CompletionChunk = serde_json::from_str(payload).map_err(|source| ChatError::FrameDecode {
        line: payload.to_string(),
        source,
    })?;

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content);

    Ok(match content {
        Some(text) if !text.is_empty() || empty == EmptyDelta::Forward => Frame::Delta(text),
        _ => Frame::Ignored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_choice_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"a"}},{"delta":{"content":"b"}}]}"#;
        assert_eq!(parse_line(line, EmptyDelta::Drop).unwrap(), Frame::Delta("a".into()));
    }

    #[test]
    fn prefix_without_space_is_accepted() {
        let line = r#"data:{"choices":[{"delta":{"content":"x"}}]}"#;
        assert_eq!(parse_line(line, EmptyDelta::Drop).unwrap(), Frame::Delta("x".into()));
    }

    #[test]
    fn done_sentinel_is_not_json() {
        assert_eq!(parse_line("data: [DONE]", EmptyDelta::Drop).unwrap(), Frame::Sentinel);
        assert_eq!(parse_line("data:[DONE]  ", EmptyDelta::Forward).unwrap(), Frame::Sentinel);
    }

    #[test]
    fn non_data_lines_are_ignored() {
        for line in ["", ": keep-alive", "event: message", "id: 7", "retry: 1000"] {
            assert_eq!(parse_line(line, EmptyDelta::Drop).unwrap(), Frame::Ignored);
        }
    }

    #[test]
    fn envelopes_without_content_are_ignored() {
        for payload in [
            r#"data: {"choices":[]}"#,
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"finish_reason":"stop"}]}"#,
            r#"data: {"usage":{"total_tokens":3}}"#,
        ] {
            assert_eq!(parse_line(payload, EmptyDelta::Forward).unwrap(), Frame::Ignored);
        }
    }

    #[test]
    fn empty_content_policy() {
        let line = r#"data: {"choices":[{"delta":{"content":""}}]}"#;
        assert_eq!(parse_line(line, EmptyDelta::Forward).unwrap(), Frame::Delta(String::new()));
        assert_eq!(parse_line(line, EmptyDelta::Drop).unwrap(), Frame::Ignored);
    }

    #[test]
    fn malformed_json_reports_the_payload() {
        let err = parse_line("data: {\"choices\":[", EmptyDelta::Drop).unwrap_err();
        match err {
            ChatError::FrameDecode { line, .. } => assert_eq!(line, "{\"choices\":["),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
