use crate::streaming::frames::{
    chunk_document, data_frame, strip_code_fence, utf8_boundary, DONE_FRAME, EVENT_STREAM,
};
use crate::transform::rewrite_completion_model;
use crate::types::{ProxyError, Result};
use axum::body::Body;
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{Stream, StreamExt};
use http::header::{self, HeaderMap, HeaderValue};
use http::StatusCode;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

const DEFAULT_BODY_TIMEOUT: Duration = Duration::from_secs(120);

/// What the backend actually sent, judged by its content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamBody {
    EventStream,
    Json,
    Other,
}

impl UpstreamBody {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.contains(EVENT_STREAM) {
            UpstreamBody::EventStream
        } else if content_type.contains("application/json") {
            UpstreamBody::Json
        } else {
            UpstreamBody::Other
        }
    }
}

/// Reconciles the transport mode the client asked for with what the backend
/// returned, and points completion documents at the client-facing model.
#[derive(Debug, Clone)]
pub struct ResponseNormalizer {
    client_model: String,
    client_stream: bool,
    body_timeout: Duration,
}

impl ResponseNormalizer {
    pub fn new(client_model: impl Into<String>, client_stream: bool) -> Self {
        Self {
            client_model: client_model.into(),
            client_stream,
            body_timeout: DEFAULT_BODY_TIMEOUT,
        }
    }

    /// Deadline for bodies that are read in full before answering.
    /// Pass-through and re-chunked streams are not bounded by it.
    pub fn with_body_timeout(mut self, timeout: Duration) -> Self {
        self.body_timeout = timeout;
        self
    }

    async fn buffered<T, F>(&self, read: F) -> Result<T>
    where
        F: Future<Output = reqwest::Result<T>>,
    {
        match tokio::time::timeout(self.body_timeout, read).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::warn!(
                    model = %self.client_model,
                    timeout_ms = self.body_timeout.as_millis() as u64,
                    "Upstream body stalled"
                );
                Err(ProxyError::Timeout)
            }
        }
    }

    pub async fn normalize(&self, upstream: reqwest::Response) -> Result<Response> {
        let status = upstream.status();
        let kind = UpstreamBody::from_headers(upstream.headers());
        let headers = forwarded_headers(upstream.headers());

        match (self.client_stream, kind) {
            (true, UpstreamBody::Json) => {
                let raw = self.buffered(upstream.bytes()).await?;
                let body = self.synthesize_stream(&raw)?;
                Ok(build(status, headers, EVENT_STREAM, Body::from(body)))
            }
            (true, UpstreamBody::Other) => {
                let id = uuid::Uuid::new_v4().to_string();
                let frames = rechunk(upstream.bytes_stream(), self.client_model.clone(), id);
                Ok(build(status, headers, EVENT_STREAM, Body::from_stream(frames)))
            }
            (true, UpstreamBody::EventStream) => {
                Ok(passthrough(status, headers, Body::from_stream(upstream.bytes_stream())))
            }
            (false, UpstreamBody::Json) => {
                let raw = self.buffered(upstream.bytes()).await?;
                let body = match serde_json::from_slice::<Value>(&raw) {
                    Ok(json) => Bytes::from(serde_json::to_vec(&rewrite_completion_model(
                        json,
                        &self.client_model,
                    ))?),
                    Err(_) => raw,
                };
                Ok(passthrough(status, headers, Body::from(body)))
            }
            (false, UpstreamBody::EventStream | UpstreamBody::Other) => {
                let raw = self.buffered(upstream.text()).await?;
                let body = self.unfence(&raw)?;
                Ok(build(status, headers, "application/json", Body::from(body)))
            }
        }
    }

    /// One content frame plus the terminal frame, built from a complete JSON
    /// completion.
    pub fn synthesize_stream(&self, raw: &[u8]) -> Result<Bytes> {
        let json: Value = serde_json::from_slice(raw)
            .map_err(|e| ProxyError::MalformedUpstreamBody(e.to_string()))?;

        let first = json
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .ok_or(ProxyError::EmptyCompletion)?;

        let text = first
            .pointer("/message/content")
            .and_then(Value::as_str)
            .unwrap_or("");

        let id = json
            .get("id")
            .and_then(Value::as_str)
            .map(|id| id.strip_prefix("chatcmpl-").unwrap_or(id).to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let chunk = chunk_document(text, &self.client_model, &id);
        let mut body = BytesMut::new();
        body.extend_from_slice(&data_frame(&chunk.to_string()));
        body.extend_from_slice(DONE_FRAME.as_bytes());
        Ok(body.freeze())
    }

    /// Parse a possibly fenced JSON completion and rewrite its model.
    pub fn unfence(&self, raw: &str) -> Result<Bytes> {
        let json: Value = serde_json::from_str(strip_code_fence(raw))
            .map_err(|e| ProxyError::MalformedUpstreamBody(e.to_string()))?;
        let json = rewrite_completion_model(json, &self.client_model);
        Ok(Bytes::from(serde_json::to_vec(&json)?))
    }
}

/// Turn an unframed byte stream into chunk frames sharing one id, one frame
/// per read. A multi-byte character split across reads is held back until it
/// is complete. An upstream read error ends the client stream with an error.
pub fn rechunk<S, E>(
    upstream: S,
    model: String,
    id: String,
) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    async_stream::stream! {
        let mut upstream = Box::pin(upstream);
        let mut carry = BytesMut::new();

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    carry.extend_from_slice(&bytes);
                    let ready = carry.split_to(utf8_boundary(&carry));
                    if ready.is_empty() {
                        continue;
                    }
                    let text = String::from_utf8_lossy(&ready);
                    yield Ok(data_frame(&chunk_document(&text, &model, &id).to_string()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Upstream stream failed, closing client stream");
                    yield Err(std::io::Error::other(e));
                    return;
                }
            }
        }

        if !carry.is_empty() {
            let text = String::from_utf8_lossy(&carry);
            yield Ok(data_frame(&chunk_document(&text, &model, &id).to_string()));
        }
        yield Ok(Bytes::from_static(DONE_FRAME.as_bytes()));
    }
}

fn forwarded_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = upstream.clone();
    for name in [
        header::CONTENT_LENGTH,
        header::TRANSFER_ENCODING,
        header::CONNECTION,
    ] {
        headers.remove(name);
    }
    headers
}

fn passthrough(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn build(status: StatusCode, mut headers: HeaderMap, content_type: &'static str, body: Body) -> Response {
    headers.remove(header::CONTENT_ENCODING);
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if content_type == EVENT_STREAM {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    }
    passthrough(status, headers, body)
}
