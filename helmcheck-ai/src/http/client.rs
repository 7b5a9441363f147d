//! HTTP client implementation using reqwest

use crate::http::auth::BearerAuth;
use crate::http::error::{map_http_error, map_transport_error};
use crate::providers::error::{ProviderError, ProviderResult};
use reqwest::{Client, ClientBuilder, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Maximum response size accepted from a backend (10MB)
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Authenticated JSON client bound to one provider's base URL
#[derive(Debug, Clone)]
pub struct HttpClient {
    /// The underlying reqwest client
    client: Client,

    /// Provider name used in errors and logs
    provider: String,

    /// Base URL without trailing slash
    base_url: String,

    auth: BearerAuth,

    /// Applied to unary calls; streams are bounded by the caller's context
    request_timeout: Duration,

    /// Maximum response size to prevent OOM
    max_response_size: usize,
}

impl HttpClient {
    /// Create a client with pooled connections and the given request timeout
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        auth: BearerAuth,
        request_timeout: Duration,
    ) -> ProviderResult<Self> {
        let provider = provider.into();
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(super::USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| {
                ProviderError::not_configured(&provider, format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            request_timeout,
            max_response_size: MAX_RESPONSE_SIZE,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth(&self) -> &BearerAuth {
        &self.auth
    }

    /// Build the full URL for an endpoint path
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send with correlation id, mapping transport failures and error statuses
    async fn send(&self, builder: RequestBuilder, accept: &str) -> ProviderResult<(Response, Uuid)> {
        let request_id = Uuid::new_v4();
        let builder = self
            .auth
            .apply(builder, accept)?
            .header("X-Request-ID", request_id.to_string());

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!("Request timeout for {} [request_id: {}]", self.provider, request_id);
            } else {
                error!("Request error for {} [request_id: {}]: {}", self.provider, request_id, e);
            }
            map_transport_error(&self.provider, &e, request_id)
        })?;

        let status = response.status();
        debug!("Response status: {} [request_id: {}]", status, request_id);

        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.ok();
            warn!(
                "Request failed with status {} for {} [request_id: {}]",
                status, self.provider, request_id
            );
            return Err(map_http_error(
                &self.provider,
                status,
                Some(&headers),
                body.as_deref(),
                request_id,
            ));
        }

        Ok((response, request_id))
    }

    /// Read and decode a JSON body with a size ceiling
    async fn read_json<T: DeserializeOwned>(&self, response: Response, request_id: Uuid) -> ProviderResult<T> {
        if let Some(length) = response.content_length() {
            if length as usize > self.max_response_size {
                return Err(ProviderError::invalid_response(
                    &self.provider,
                    format!("response size {} exceeds maximum {}", length, self.max_response_size),
                ));
            }
        }

        let text = response
            .text()
            .await
            .map_err(|e| map_transport_error(&self.provider, &e, request_id))?;
        if text.len() > self.max_response_size {
            return Err(ProviderError::invalid_response(
                &self.provider,
                format!("response size {} exceeds maximum {}", text.len(), self.max_response_size),
            ));
        }

        serde_json::from_str(&text).map_err(|e| {
            error!(
                "Failed to parse response from {} [request_id: {}]: {}",
                self.provider, request_id, e
            );
            ProviderError::invalid_response(
                &self.provider,
                format!("invalid response format: {} [request_id: {}]", e, request_id),
            )
        })
    }

    /// POST a JSON body and decode the JSON reply
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> ProviderResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!("Request URL: {}", url);
        let builder = self.client.post(&url).timeout(self.request_timeout).json(body);
        let (response, request_id) = self.send(builder, "application/json").await?;
        let parsed = self.read_json(response, request_id).await?;
        info!(
            "Request completed successfully for {} [request_id: {}]",
            self.provider, request_id
        );
        Ok(parsed)
    }

    /// GET and decode the JSON reply
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ProviderResult<T> {
        let url = self.url(path);
        let builder = self.client.get(&url).timeout(self.request_timeout);
        let (response, request_id) = self.send(builder, "application/json").await?;
        self.read_json(response, request_id).await
    }

    /// POST a JSON body and hand back the open event-stream response
    pub async fn post_stream<B>(&self, path: &str, body: &B) -> ProviderResult<Response>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(path);
        let (response, request_id) = self
            .send(self.client.post(&url).json(body), "text/event-stream")
            .await?;
        info!("Stream opened for {} [request_id: {}]", self.provider, request_id);
        Ok(response)
    }
}
