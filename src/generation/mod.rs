//! Text generation service used by every content-producing stage.
//!
//! Page extraction, structure mining, chapter summaries, chapter rewrites, and the document
//! abstract all go through [`TextGenerator::generate`]. The Ollama-backed client issues HTTP
//! requests directly to the runtime; page images travel as base64 attachments.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced while calling the generation service.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider was unreachable or the endpoint is missing.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// An image attachment could not be read from disk.
    #[error("Failed to read attachment {path}: {source}")]
    Attachment {
        /// Attachment path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// What a generation call is for. Providers may route tasks to different models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationTask {
    /// Transcribe one rasterized page.
    PageExtraction,
    /// Mine a table of contents from the leading pages.
    TocMining,
    /// Detect chapter starts in a batch of pages.
    ChapterDetection,
    /// Summarize one chapter.
    ChapterSummary,
    /// Rewrite and merge one chapter's content.
    ChapterRefactor,
    /// Produce the whole-document abstract.
    DocumentAbstract,
}

impl GenerationTask {
    /// Stable label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageExtraction => "page_extraction",
            Self::TocMining => "toc_mining",
            Self::ChapterDetection => "chapter_detection",
            Self::ChapterSummary => "chapter_summary",
            Self::ChapterRefactor => "chapter_refactor",
            Self::DocumentAbstract => "document_abstract",
        }
    }
}

/// Request passed to the generation service.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Purpose of the call.
    pub task: GenerationTask,
    /// Prompt assembled by the pipeline.
    pub prompt: String,
    /// Image files attached to the prompt.
    pub images: Vec<PathBuf>,
}

impl GenerationRequest {
    /// Build a text-only request.
    pub fn text(task: GenerationTask, prompt: impl Into<String>) -> Self {
        Self {
            task,
            prompt: prompt.into(),
            images: Vec::new(),
        }
    }

    /// Build a request with a single image attachment.
    pub fn with_image(task: GenerationTask, prompt: impl Into<String>, image: PathBuf) -> Self {
        Self {
            task,
            prompt: prompt.into(),
            images: vec![image],
        }
    }
}

/// Interface implemented by generation providers.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce text for the request.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

/// Ollama `/api/generate` client.
pub struct OllamaGenerator {
    http: Client,
    base_url: String,
    text_model: String,
    vision_model: String,
}

impl OllamaGenerator {
    /// Construct a client for the given runtime and models.
    pub fn new(
        base_url: impl Into<String>,
        text_model: impl Into<String>,
        vision_model: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .user_agent("rusty-index/generate")
            .build()
            .map_err(|error| GenerationError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            text_model: text_model.into(),
            vision_model: vision_model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }

    fn model_for(&self, request: &GenerationRequest) -> &str {
        if request.images.is_empty() {
            &self.text_model
        } else {
            &self.vision_model
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let mut images = Vec::with_capacity(request.images.len());
        for path in &request.images {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| GenerationError::Attachment {
                    path: path.clone(),
                    source,
                })?;
            images.push(BASE64.encode(bytes));
        }

        let model = self.model_for(&request);
        tracing::debug!(task = request.task.as_str(), model, images = images.len(), "Calling Ollama");

        let mut payload = json!({
            "model": model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": 0.1,
            }
        });
        if !images.is_empty() {
            payload["images"] = json!(images);
        }

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(GenerationError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}
