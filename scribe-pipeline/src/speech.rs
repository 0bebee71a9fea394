//! Hint speech synthesis client.

use std::sync::Arc;

use scribe_core::{AttemptId, StepId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ServiceError;
use crate::retry::{run_with_retry, RetryConfig};
use crate::transport::FunctionTransport;

/// Longest text sent for synthesis, in characters.
pub const MAX_SPEECH_CHARS: usize = 480;

/// Synthesized audio for a hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechClip {
    /// Short-lived playable URL.
    pub audio_url: String,
    /// Durable storage path, persisted with the step.
    pub storage_path: String,
}

/// Speaks hints and re-signs stored audio.
#[derive(Clone)]
pub struct SpeechClient {
    transport: Arc<dyn FunctionTransport>,
    function: String,
    retry: RetryConfig,
    voice: Option<String>,
}

impl SpeechClient {
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
            voice: None,
        }
    }

    /// Request a specific voice.
    #[must_use]
    pub fn with_voice(mut self, voice: Option<String>) -> Self {
        self.voice = voice;
        self
    }

    /// Synthesize `text`, truncated to [`MAX_SPEECH_CHARS`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Misconfigured`] when the service lacks
    /// credentials, [`ServiceError::InvalidResponse`] for a malformed
    /// response, or the underlying request error.
    pub async fn synthesize(
        &self,
        attempt_id: AttemptId,
        step_id: StepId,
        text: &str,
    ) -> Result<SpeechClip, ServiceError> {
        let mut body = json!({
            "attemptId": attempt_id,
            "stepId": step_id,
            "text": truncate_chars(text, MAX_SPEECH_CHARS),
        });
        if let Some(voice) = &self.voice {
            body["voice"] = Value::String(voice.clone());
        }
        self.call(body).await
    }

    /// Obtain a fresh playable URL for previously stored audio.
    ///
    /// # Errors
    ///
    /// Same as [`SpeechClient::synthesize`].
    pub async fn refresh(&self, storage_path: &str) -> Result<SpeechClip, ServiceError> {
        self.call(json!({ "storagePath": storage_path })).await
    }

    async fn call(&self, body: Value) -> Result<SpeechClip, ServiceError> {
        let value = run_with_retry(&self.retry, "speech", |_| {
            self.transport.invoke(&self.function, body.clone())
        })
        .await?;
        parse_clip(&value)
    }
}

impl std::fmt::Debug for SpeechClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechClient")
            .field("function", &self.function)
            .field("voice", &self.voice)
            .finish_non_exhaustive()
    }
}

fn parse_clip(value: &Value) -> Result<SpeechClip, ServiceError> {
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::InvalidResponse(format!("missing string `{name}`")))
    };
    Ok(SpeechClip {
        audio_url: field("audioUrl")?,
        storage_path: field("storagePath")?,
    })
}

/// Prefix of `text` holding at most `max` characters.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
