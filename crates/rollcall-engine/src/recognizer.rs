//! The recognizer seam: whatever decides who was captured.

use async_trait::async_trait;
use rollcall_core::{Method, RecognitionOutcome, SessionToken};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),
    #[error("recognition failed: {0}")]
    Failed(String),
}

/// What the recognizer is told about the session it is deciding for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureContext {
    pub token: SessionToken,
    pub method: Method,
}

/// Maps a finished capture to an identity/confidence decision.
///
/// May be slow. The driver aborts the call on cancel/reset and drops any
/// result that arrives for a superseded session.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, ctx: CaptureContext) -> Result<RecognitionOutcome, RecognizerError>;
}

/// Returns a preset decision after a fixed delay. Used for simulated captures.
pub struct FixedRecognizer {
    result: Result<RecognitionOutcome, String>,
    delay: Duration,
}

impl FixedRecognizer {
    pub fn new(outcome: RecognitionOutcome, delay: Duration) -> Self {
        Self {
            result: Ok(outcome),
            delay,
        }
    }

    /// Always fails with `RecognizerError::Failed(message)`.
    pub fn failing(message: impl Into<String>, delay: Duration) -> Self {
        Self {
            result: Err(message.into()),
            delay,
        }
    }
}

#[async_trait]
impl Recognizer for FixedRecognizer {
    async fn recognize(&self, ctx: CaptureContext) -> Result<RecognitionOutcome, RecognizerError> {
        tracing::debug!(token = %ctx.token, method = %ctx.method, "simulated recognition");
        tokio::time::sleep(self.delay).await;
        self.result.clone().map_err(RecognizerError::Failed)
    }
}
