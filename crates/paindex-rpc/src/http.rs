//! HTTP JSON-RPC transport backed by `reqwest`.
//!
//! Every attempt first takes a token from the shared rate limiter under the
//! network's provider key, then posts the request. Transient failures are
//! retried with exponential backoff; node-side execution errors are not.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::rate_limiter::{acquire_blocking, RateLimiter};
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::transport::RpcTransport;

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct HttpTransport {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    limiter: Arc<dyn RateLimiter>,
    limiter_key: String,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        url: impl Into<String>,
        limiter: Arc<dyn RateLimiter>,
        limiter_key: impl Into<String>,
        config: HttpConfig,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("building HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            retry: RetryPolicy::new(config.retry),
            limiter,
            limiter_key: limiter_key.into(),
            request_timeout: config.request_timeout,
        })
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        ms: self.request_timeout.as_millis() as u64,
                    }
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(TransportError::RateLimited {
                key: self.limiter_key.clone(),
                retry_after_ms: 1_000,
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {}: {body}", status.as_u16())));
        }

        let resp: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        match resp.error {
            Some(err) if err.is_rate_limit() => Err(TransportError::Rpc(err)),
            _ => Ok(resp),
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            acquire_blocking(self.limiter.as_ref(), &self.limiter_key).await;

            match self.send_once(&req).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            method = %req.method,
                            error = %e,
                            url = %self.url,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(
                            attempt,
                            method = %req.method,
                            error = %e,
                            url = %self.url,
                            "max retries exceeded"
                        );
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::KeyedRateLimiter;

    #[tokio::test]
    async fn unreachable_endpoint_fails_after_retries() {
        let limiter = Arc::new(KeyedRateLimiter::new(1_000.0));
        let transport = HttpTransport::new(
            "http://127.0.0.1:9",
            limiter,
            "local",
            HttpConfig {
                retry: RetryConfig {
                    max_retries: 1,
                    initial_backoff: Duration::from_millis(1),
                    max_backoff: Duration::from_millis(1),
                    multiplier: 1.0,
                },
                request_timeout: Duration::from_millis(500),
            },
        )
        .unwrap();
        let err = transport
            .send(JsonRpcRequest::new(1, "eth_blockNumber", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Http(_) | TransportError::Timeout { .. }
        ));
        assert_eq!(transport.url(), "http://127.0.0.1:9");
    }
}
