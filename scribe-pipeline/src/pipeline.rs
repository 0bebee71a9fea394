//! Shared services for a session.
//!
//! A [`Pipeline`] bundles the backend, the service clients and the snapshot
//! exporter. It is built once from a [`PipelineConfig`] and handed to each
//! [`crate::Session`]; there is no global state.

use std::sync::Arc;

use scribe_core::SurfaceBounds;
use scribe_renderer::SnapshotExporter;

use crate::backend::{AttemptBackend, HttpBackend};
use crate::config::PipelineConfig;
use crate::engine::ValidationEngine;
use crate::error::PipelineError;
use crate::recognition::RecognitionClient;
use crate::speech::SpeechClient;
use crate::transport::{FunctionTransport, HttpFunctions};
use crate::upload::Uploader;
use crate::validation::ValidationClient;

/// Services used by the commit pipeline.
#[derive(Clone)]
pub struct Pipeline {
    pub(crate) backend: Arc<dyn AttemptBackend>,
    pub(crate) exporter: SnapshotExporter,
    pub(crate) uploader: Uploader,
    pub(crate) recognition: RecognitionClient,
    pub(crate) engine: ValidationEngine,
    pub(crate) speech: SpeechClient,
    pub(crate) surface: SurfaceBounds,
    pub(crate) crop_padding: Option<f32>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("exporter", &self.exporter)
            .field("recognition", &self.recognition)
            .field("engine", &self.engine)
            .field("surface", &self.surface)
            .field("crop_padding", &self.crop_padding)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Assemble a pipeline over an explicit backend and function transport.
    #[must_use]
    pub fn new(
        backend: Arc<dyn AttemptBackend>,
        transport: Arc<dyn FunctionTransport>,
        config: &PipelineConfig,
    ) -> Self {
        let functions = &config.functions;
        let speech = SpeechClient::new(
            transport.clone(),
            functions.speech.clone(),
            config.retry.speech.clone(),
        )
        .with_voice(config.voice.clone());
        let validation = ValidationClient::new(
            transport.clone(),
            functions.validation.clone(),
            config.retry.validation.clone(),
        );

        Self {
            uploader: Uploader::new(backend.clone(), config.retry.upload.clone()),
            recognition: RecognitionClient::new(
                transport,
                functions.recognition.clone(),
                config.retry.recognition.clone(),
            ),
            engine: ValidationEngine::new(validation, config.voice_hints.then(|| speech.clone())),
            speech,
            exporter: SnapshotExporter::new(config.export_config()),
            surface: config.surface,
            crop_padding: config.crop_padding,
            backend,
        }
    }

    /// Assemble a pipeline talking to the configured hosted backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend URL is invalid or an HTTP client
    /// cannot be built.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let backend = HttpBackend::new(&config.backend_url, config.api_key.clone(), &config.bucket)?;
        Self::with_backend(Arc::new(backend), config)
    }

    /// Assemble a pipeline over `backend`, calling functions on the
    /// configured backend URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend URL is invalid.
    pub fn with_backend(
        backend: Arc<dyn AttemptBackend>,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let transport = HttpFunctions::new(&config.backend_url, config.api_key.clone())?;
        Ok(Self::new(backend, Arc::new(transport), config))
    }

    /// Backend rows and rasters are written to.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn AttemptBackend> {
        &self.backend
    }

    /// Drawing surface size.
    #[must_use]
    pub const fn surface(&self) -> SurfaceBounds {
        self.surface
    }
}
