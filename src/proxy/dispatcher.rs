use crate::config::{Config, HeaderConfig};
use crate::logging::RequestLogger;
use crate::proxy::retry::FailureKind;
use crate::proxy::{ModelRouter, ProxyClient};
use crate::routing::{BackendDescriptor, FailoverSelector, RoutingKey};
use crate::store::mark_dead;
use crate::streaming::ResponseNormalizer;
use crate::transform::outbound_headers;
use crate::types::openai::ChatCompletionRequest;
use crate::types::{ProxyError, Result};
use axum::response::Response;
use bytes::Bytes;
use http::HeaderMap;
use std::sync::Arc;
use std::time::Instant;

/// Runs one client request against the backend pool of its routing key,
/// failing over between backends until one answers with a 2xx or the
/// attempt budget is spent.
pub struct RequestDispatcher {
    router: Arc<ModelRouter>,
    client: ProxyClient,
    headers: HeaderConfig,
    logger: RequestLogger,
    max_attempts: usize,
    default_model: String,
}

impl RequestDispatcher {
    pub fn new(config: &Config, router: Arc<ModelRouter>) -> Result<Self> {
        Ok(Self {
            router,
            client: ProxyClient::new(&config.retry)?,
            headers: config.headers.clone(),
            logger: RequestLogger::new(config.logging.clone()),
            max_attempts: config.retry.max_attempts.max(1),
            default_model: config.routing.default_model.clone(),
        })
    }

    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }

    pub async fn dispatch(
        &self,
        incoming: &HeaderMap,
        request: ChatCompletionRequest,
    ) -> Result<Response> {
        let model = request.model_or(&self.default_model);
        let key = RoutingKey::new(&model, request.needs_function_calling());
        let selector = self.router.selector_for(&key).await?;
        let client_stream = request.stream;

        let mut last: Option<(BackendDescriptor, FailureKind)> = None;

        for attempt in 1..=self.max_attempts {
            let backend = match &last {
                None => selector.select(None, false),
                Some((failed, kind)) => selector.select(Some(failed), kind.strict()),
            }
            .ok_or_else(|| ProxyError::PoolExhausted(key.to_string()))?;

            let mut outbound = request.clone();
            outbound.model = Some(backend.target_model().to_string());
            outbound.stream = client_stream && backend.stream_capable();

            let body = Bytes::from(serde_json::to_vec(&outbound)?);
            let headers = outbound_headers(incoming, &self.headers, backend.credential())?;

            self.logger
                .log_upstream_request(&model, &backend, attempt, outbound.stream, &headers, Some(body.as_ref()));

            let started = Instant::now();
            let kind = match self.client.send(&backend, headers, body).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    self.logger.log_upstream_response(
                        &model,
                        &backend,
                        attempt,
                        status,
                        started.elapsed(),
                        response.headers(),
                    );

                    match FailureKind::classify(status) {
                        None => {
                            selector.unfreeze(&backend);
                            return ResponseNormalizer::new(model, client_stream)
                                .with_body_timeout(self.client.attempt_timeout())
                                .normalize(response)
                                .await;
                        }
                        Some(kind) => kind,
                    }
                }
                Err(e) => {
                    self.logger.log_upstream_failure(
                        &model,
                        &backend,
                        attempt,
                        started.elapsed(),
                        &e.to_string(),
                    );
                    FailureKind::NetworkFailure
                }
            };

            if kind.expires_credential() {
                self.expire(&key, &backend).await;
            }

            tracing::debug!(
                key = %key,
                backend = %backend,
                attempt = attempt,
                failure = %kind,
                "Attempt failed, switching provider"
            );
            last = Some((backend, kind));
        }

        self.give_up(&key, &selector, last.as_ref());
        Err(ProxyError::ServiceUnavailable {
            attempts: self.max_attempts,
        })
    }

    /// Persist the dead credential and drop every selector of the model so the
    /// next request rebuilds without it. The current request keeps its selector.
    async fn expire(&self, key: &RoutingKey, backend: &BackendDescriptor) {
        match mark_dead(self.router.store().as_ref(), key.model(), backend).await {
            Ok(_) => self.router.invalidate(key.model()),
            Err(e) => tracing::error!(
                key = %key,
                backend = %backend,
                error = %e,
                "Failed to mark provider dead"
            ),
        }
    }

    fn give_up(
        &self,
        key: &RoutingKey,
        selector: &FailoverSelector,
        last: Option<&(BackendDescriptor, FailureKind)>,
    ) {
        if let Some((backend, kind)) = last {
            selector.freeze(backend);
            tracing::error!(
                key = %key,
                backend = %backend,
                failure = %kind,
                attempts = self.max_attempts,
                "Retry budget exhausted"
            );
        }
    }
}
