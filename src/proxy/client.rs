use crate::config::RetryConfig;
use crate::routing::BackendDescriptor;
use crate::types::{ProxyError, Result};
use bytes::Bytes;
use http::HeaderMap;
use reqwest::{Client, ClientBuilder, Response};
use std::time::Duration;

/// Shared upstream HTTP client. One instance serves every backend. The
/// per-attempt deadline here covers the wait for response headers; buffered
/// bodies get the same deadline in the normalizer, streams get none.
#[derive(Clone)]
pub struct ProxyClient {
    client: Client,
    attempt_timeout: Duration,
}

impl ProxyClient {
    pub fn new(config: &RetryConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            attempt_timeout: config.attempt_timeout(),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// POST `body` to the backend's address.
    pub async fn send(
        &self,
        backend: &BackendDescriptor,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response> {
        let request = self
            .client
            .post(backend.address().clone())
            .headers(headers)
            .body(body)
            .send();

        match tokio::time::timeout(self.attempt_timeout, request).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ProxyError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;

    fn backend(address: &str) -> BackendDescriptor {
        BackendDescriptor::new(Url::parse(address).unwrap(), "sk-test", "gpt-4o")
    }

    #[test]
    fn test_client_creation() {
        let client = ProxyClient::new(&RetryConfig::default()).unwrap();
        assert_eq!(client.attempt_timeout(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_send_posts_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(r#"{"model":"gpt-4o"}"#)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = ProxyClient::new(&RetryConfig::default()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer sk-test".parse().unwrap());

        let response = client
            .send(
                &backend(&format!("{}/v1/chat/completions", server.url())),
                headers,
                Bytes::from_static(br#"{"model":"gpt-4o"}"#),
            )
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_connection_refused_is_http_error() {
        let client = ProxyClient::new(&RetryConfig::default()).unwrap();
        let err = client
            .send(
                &backend("http://127.0.0.1:1/v1/chat/completions"),
                HeaderMap::new(),
                Bytes::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::Http(_)));
    }
}
