//! On-disk locations of per-document artifacts.

use std::path::{Path, PathBuf};

/// Artifact paths under one data root.
///
/// ```text
/// <root>/json_data/<doc>/{data,structure,chunks}.json
/// <root>/pdf_image/<doc>/page_<n>.png
/// <root>/vector_db/<doc>_data_index/
/// <root>/output/<doc>_brief_summary.md
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Data root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the JSON artifacts of one document.
    pub fn json_dir(&self, doc_name: &str) -> PathBuf {
        self.root.join("json_data").join(doc_name)
    }

    /// Page-indexed extraction file.
    pub fn data_file(&self, doc_name: &str) -> PathBuf {
        self.json_dir(doc_name).join("data.json")
    }

    /// Chapter agenda file.
    pub fn structure_file(&self, doc_name: &str) -> PathBuf {
        self.json_dir(doc_name).join("structure.json")
    }

    /// Per-chapter text file.
    pub fn chunks_file(&self, doc_name: &str) -> PathBuf {
        self.json_dir(doc_name).join("chunks.json")
    }

    /// Directory receiving rasterized pages.
    pub fn image_dir(&self, doc_name: &str) -> PathBuf {
        self.root.join("pdf_image").join(doc_name)
    }

    /// Vector index directory.
    pub fn vector_dir(&self, doc_name: &str) -> PathBuf {
        self.root.join("vector_db").join(format!("{doc_name}_data_index"))
    }

    /// Rendered document abstract.
    pub fn summary_file(&self, doc_name: &str) -> PathBuf {
        self.root
            .join("output")
            .join(format!("{doc_name}_brief_summary.md"))
    }
}
