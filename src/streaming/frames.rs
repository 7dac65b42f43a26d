use bytes::Bytes;
use chrono::Utc;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

/// Terminal event of a synthesized stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

pub const EVENT_STREAM: &str = "text/event-stream";

/// Wrap `payload` as one event-stream data frame.
pub fn data_frame(payload: &str) -> Bytes {
    Bytes::from(format!("data: {}\n\n", payload))
}

/// A `chat.completion.chunk` document carrying `text` as its only delta.
pub fn chunk_document(text: &str, model: &str, id: &str) -> Value {
    json!({
        "id": format!("chatcmpl-{}", id),
        "object": "chat.completion.chunk",
        "model": model,
        "created": Utc::now().timestamp(),
        "choices": [{
            "index": 0,
            "delta": { "content": text },
            "logprobs": null,
            "finish_reason": null
        }],
        "system_fingerprint": null
    })
}

/// Remove one leading ```` ```json ```` line and one trailing ```` ``` ````
/// line, if present.
pub fn strip_code_fence(text: &str) -> &str {
    static OPEN: OnceLock<Regex> = OnceLock::new();
    static CLOSE: OnceLock<Regex> = OnceLock::new();

    let open = OPEN.get_or_init(|| Regex::new(r"^\s*```(?:json)?[ \t]*\r?\n").expect("static pattern"));
    let close = CLOSE.get_or_init(|| Regex::new(r"\r?\n```\s*$").expect("static pattern"));

    let start = open.find(text).map_or(0, |m| m.end());
    let body = &text[start..];
    let end = close.find(body).map_or(body.len(), |m| m.start());
    &body[..end]
}

/// Longest prefix of `buf` that is complete UTF-8. Invalid sequences count
/// as complete so they surface as replacement characters instead of stalling
/// the stream.
pub fn utf8_boundary(buf: &[u8]) -> usize {
    match std::str::from_utf8(buf) {
        Ok(_) => buf.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => buf.len(),
    }
}
