//! Handwriting recognition client.

use std::sync::Arc;

use scribe_core::{AttemptId, StepId, Transcription};
use scribe_renderer::encode_base64;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ServiceError;
use crate::retry::{run_with_retry, RetryConfig};
use crate::transport::FunctionTransport;

/// Turns a step raster into LaTeX.
#[derive(Clone)]
pub struct RecognitionClient {
    transport: Arc<dyn FunctionTransport>,
    function: String,
    retry: RetryConfig,
}

impl RecognitionClient {
    /// Create a client calling `function` through `transport`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn FunctionTransport>,
        function: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            transport,
            function: function.into(),
            retry,
        }
    }

    /// Transcribe a PNG snapshot.
    ///
    /// # Errors
    ///
    /// Returns the last [`ServiceError`] once retries are exhausted, or
    /// [`ServiceError::InvalidResponse`] if the response lacks a string
    /// `latex` or a numeric `confidence` in `[0, 1]`.
    pub async fn recognize(
        &self,
        attempt_id: AttemptId,
        step_id: StepId,
        image: &[u8],
    ) -> Result<Transcription, ServiceError> {
        let body = json!({
            "attemptId": attempt_id,
            "stepId": step_id,
            "imageBase64": encode_base64(image),
        });

        let value = run_with_retry(&self.retry, "recognition", |_| {
            self.transport.invoke(&self.function, body.clone())
        })
        .await?;

        let transcription = parse_transcription(&value)?;
        debug!(
            "Recognized step {} with confidence {:.2}",
            step_id, transcription.confidence
        );
        Ok(transcription)
    }
}

impl std::fmt::Debug for RecognitionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionClient")
            .field("function", &self.function)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn parse_transcription(value: &Value) -> Result<Transcription, ServiceError> {
    let latex = value
        .get("latex")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::InvalidResponse("missing string `latex`".into()))?;
    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| ServiceError::InvalidResponse("missing numeric `confidence`".into()))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ServiceError::InvalidResponse(format!(
            "confidence {confidence} outside [0, 1]"
        )));
    }
    Ok(Transcription {
        latex: latex.to_string(),
        confidence,
    })
}
