use eventsource_stream::Eventsource;
use serde::Deserialize;
use tokio_stream::StreamExt;

use crate::error::LlmError;
use crate::provider::ChatStream;

/// Convert an OpenAI-compatible streaming response into a `ChatStream`.
pub(crate) fn openai_sse_to_stream(response: reqwest::Response) -> ChatStream {
    let event_stream = response.bytes_stream().eventsource();
    let mapped = event_stream.filter_map(|event| match event {
        Ok(event) => parse_openai_sse_event(&event.data),
        Err(e) => Some(Err(LlmError::SseParse(e.to_string()))),
    });
    Box::pin(mapped)
}

fn parse_openai_sse_event(data: &str) -> Option<Result<String, LlmError>> {
    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                return Some(Err(LlmError::SseParse(format!(
                    "stream error: {}",
                    err.message
                ))));
            }

            let content = chunk
                .choices
                .first()
                .and_then(|c| c.delta.content.as_deref())
                .unwrap_or_default();

            if content.is_empty() {
                None
            } else {
                Some(Ok(content.to_owned()))
            }
        }
        Err(e) => Some(Err(LlmError::SseParse(format!(
            "failed to parse SSE data: {e}"
        )))),
    }
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    error: Option<OpenAiStreamError>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiStreamError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_parse_text_chunk() {
        let data = r#"{"choices":[{"delta":{"content":"hi"},"finish_reason":null}]}"#;
        let result = parse_openai_sse_event(data);
        assert_eq!(result.unwrap().unwrap(), "hi");
    }

    #[test]
    fn openai_parse_done_signal() {
        let result = parse_openai_sse_event("[DONE]");
        assert!(result.is_none());
    }

    #[test]
    fn openai_parse_empty_content() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let result = parse_openai_sse_event(data);
        assert!(result.is_none());
    }

    #[test]
    fn openai_parse_role_only_delta() {
        let data = r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#;
        assert!(parse_openai_sse_event(data).is_none());
    }

    #[test]
    fn openai_parse_invalid_json() {
        let result = parse_openai_sse_event("not json");
        let err = result.unwrap().unwrap_err();
        assert!(err.to_string().contains("failed to parse SSE data"));
    }

    #[test]
    fn openai_parse_inline_error() {
        let data = r#"{"error":{"message":"quota exceeded","type":"insufficient_quota"}}"#;
        let err = parse_openai_sse_event(data).unwrap().unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    proptest::proptest! {
        #[test]
        fn parse_never_panics(data in ".*") {
            let _ = parse_openai_sse_event(&data);
        }

        #[test]
        fn content_roundtrips(content in "[a-zA-Z0-9 ]{1,40}") {
            let data = serde_json::json!({"choices": [{"delta": {"content": content}}]}).to_string();
            let parsed = parse_openai_sse_event(&data).unwrap().unwrap();
            proptest::prop_assert_eq!(parsed, content);
        }
    }
}
