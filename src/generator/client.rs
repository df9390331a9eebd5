//! Generator boundary types and trait definitions

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Text generation service - prompt in, text out. Each call is independent;
/// no retry logic lives behind this trait.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError>;
}

/// Errors that can occur at the generator boundary
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cancelled")]
    Cancelled,
}

impl GeneratorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GeneratorError::Timeout(_))
    }
}

/// Run one suspension point under a timeout, giving up early if the
/// session's cancellation token fires.
pub async fn bounded<T, E, F>(timeout: Duration, cancel: &CancellationToken, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<GeneratorError>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(GeneratorError::Cancelled.into()),
        outcome = tokio::time::timeout(timeout, fut) => match outcome {
            Ok(result) => result,
            Err(_) => Err(GeneratorError::Timeout(timeout).into()),
        },
    }
}

/// Shared handle a session uses to reach its generator.
#[derive(Clone)]
pub struct GeneratorHandle {
    generator: Arc<dyn Generator>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl GeneratorHandle {
    pub fn new(generator: Arc<dyn Generator>, timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            generator,
            timeout,
            cancel,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Call the generator once, bounded by the configured timeout.
    pub async fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        log::debug!("generator call ({} chars)", prompt.len());
        bounded(self.timeout, &self.cancel, self.generator.generate(prompt)).await
    }
}

impl std::fmt::Debug for GeneratorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorHandle")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
