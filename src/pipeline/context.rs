//! Shared collaborators and tunables for pipeline runs.

use super::error::{StageError, StageErrorKind, StageResultExt};
use super::layout::ArtifactLayout;
use super::stage::StageName;
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::generation::{GenerationRequest, TextGenerator};
use crate::metrics::PipelineMetrics;
use crate::raster::PageRasterizer;
use crate::registry::DocumentRegistry;
use crate::vector_store::VectorStore;
use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Tunables for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Root of the artifact tree.
    pub data_root: PathBuf,
    /// Width of the page extraction fan-out.
    pub page_concurrency: usize,
    /// Width of the chapter processing fan-out.
    pub chapter_concurrency: usize,
    /// Leading pages inspected for a table of contents.
    pub toc_page_limit: usize,
    /// Pages per fallback chapter detection call.
    pub structure_batch_size: usize,
    /// Deadline applied to each external call.
    pub call_timeout: Option<Duration>,
}

impl PipelineSettings {
    /// Default tunables rooted at `data_root`.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            page_concurrency: 5,
            chapter_concurrency: 10,
            toc_page_limit: 10,
            structure_batch_size: 10,
            call_timeout: None,
        }
    }

    /// Tunables taken from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            data_root: config.data_root.clone(),
            page_concurrency: config.page_concurrency,
            chapter_concurrency: config.chapter_concurrency,
            toc_page_limit: config.toc_page_limit,
            structure_batch_size: config.structure_batch_size,
            call_timeout: config.call_timeout,
        }
    }
}

/// Collaborators shared by every stage of every document.
pub struct PipelineContext {
    /// Tunables.
    pub settings: PipelineSettings,
    /// Artifact paths.
    pub layout: ArtifactLayout,
    /// Durable ledger.
    pub registry: Arc<DocumentRegistry>,
    /// Generation service.
    pub generator: Arc<dyn TextGenerator>,
    /// Embedding service.
    pub embedder: Arc<dyn EmbeddingClient>,
    /// Vector index backend.
    pub vector_store: Arc<dyn VectorStore>,
    /// Page renderer.
    pub rasterizer: Arc<dyn PageRasterizer>,
    /// Run counters.
    pub metrics: Arc<PipelineMetrics>,
}

impl PipelineContext {
    /// Assemble a context with fresh metrics.
    pub fn new(
        settings: PipelineSettings,
        registry: Arc<DocumentRegistry>,
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn EmbeddingClient>,
        vector_store: Arc<dyn VectorStore>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Self {
        Self {
            layout: ArtifactLayout::new(settings.data_root.clone()),
            settings,
            registry,
            generator,
            embedder,
            vector_store,
            rasterizer,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Share an existing metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Await an external call under the configured deadline.
    pub(crate) async fn bounded<T, E, F>(
        &self,
        stage: StageName,
        kind: StageErrorKind,
        call: F,
    ) -> Result<T, StageError>
    where
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        match self.settings.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.stage_err(stage, kind),
                Err(_) => Err(StageError::new(
                    stage,
                    StageErrorKind::Timeout,
                    format!("external call exceeded {}s", limit.as_secs_f64()),
                )),
            },
            None => call.await.stage_err(stage, kind),
        }
    }

    /// Run one generation request on behalf of `stage`.
    pub(crate) async fn generate(
        &self,
        stage: StageName,
        request: GenerationRequest,
    ) -> Result<String, StageError> {
        let task = request.task;
        let started = std::time::Instant::now();
        let output = self
            .bounded(stage, StageErrorKind::Generation, self.generator.generate(request))
            .await?;
        tracing::debug!(
            stage = stage.as_str(),
            task = task.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generation call finished"
        );
        Ok(output)
    }
}
