//! HTTP client for the generation endpoint.
//!
//! Sends `POST {endpoint}` with `{"prompt", "model"}` and expects image
//! bytes back, using [`reqwest`].

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

use crate::payload::sniff_image;
use crate::{BackendError, BackendFuture, GeneratedImage, GenerationRequest, ImageBackend};

const ERROR_BODY_CHARS: usize = 500;

/// Generation endpoint settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Full URL requests are posted to.
    pub endpoint: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/api/generate".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// HTTP implementation of [`ImageBackend`].
#[derive(Clone)]
pub struct HttpImageBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpImageBackend {
    /// Create a client for the configured endpoint.
    ///
    /// The config timeout becomes the client-wide default; each call still
    /// applies its own.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, config.endpoint))
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(
        &self,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<GeneratedImage, BackendError> {
        tracing::debug!(endpoint = %self.endpoint, model = %request.model, "Requesting image");

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::debug!(status = status.as_u16(), "Generation service refused request");
            return Err(BackendError::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_CHARS).collect(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::from_reqwest(e, timeout))?;

        sniff_image(bytes, content_type.as_deref())
    }
}

impl ImageBackend for HttpImageBackend {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
        timeout: Duration,
    ) -> BackendFuture<'a> {
        Box::pin(self.post(request, timeout))
    }
}
