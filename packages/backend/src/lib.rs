//! Client side of the external image generation service.
//!
//! The executor talks to the service through the [`ImageBackend`] trait;
//! [`HttpImageBackend`] is the production implementation and [`FnBackend`]
//! wraps a closure for tests and local experiments.

mod error;
mod http;
mod payload;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

pub use error::BackendError;
pub use http::{BackendConfig, HttpImageBackend};
pub use payload::sniff_image;

/// What the service is asked to draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
        }
    }
}

/// Validated image returned by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Bytes,
    /// File extension matching the detected format, without the dot.
    pub extension: &'static str,
}

/// Future type for backend calls.
pub type BackendFuture<'a> =
    Pin<Box<dyn Future<Output = Result<GeneratedImage, BackendError>> + Send + 'a>>;

/// An image generation service.
///
/// One call is one external request; implementations keep no per-job state.
pub trait ImageBackend: Send + Sync + 'static {
    /// Generate an image, giving up after `timeout`.
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
        timeout: Duration,
    ) -> BackendFuture<'a>;
}

/// A simple function-based backend.
pub struct FnBackend<F>
where
    F: Fn(GenerationRequest) -> BackendFuture<'static> + Send + Sync + 'static,
{
    handler: F,
}

impl<F> FnBackend<F>
where
    F: Fn(GenerationRequest) -> BackendFuture<'static> + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> ImageBackend for FnBackend<F>
where
    F: Fn(GenerationRequest) -> BackendFuture<'static> + Send + Sync + 'static,
{
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
        _timeout: Duration,
    ) -> BackendFuture<'a> {
        (self.handler)(request.clone())
    }
}
