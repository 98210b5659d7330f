//! PDF page rasterization.
//!
//! Rendering is delegated to poppler's `pdftoppm`. Output files are normalized to
//! `page_<n>.png` regardless of the zero padding `pdftoppm` picks for the page count.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

/// Errors raised while rasterizing a document.
#[derive(Debug, Error)]
pub enum RasterError {
    /// The renderer could not be launched.
    #[error("Failed to run {program}: {source}. Make sure poppler-utils is installed.")]
    Launch {
        /// Program name.
        program: &'static str,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The renderer exited unsuccessfully.
    #[error("Rasterization of {path} failed: {stderr}")]
    Failed {
        /// Source document.
        path: PathBuf,
        /// Captured standard error.
        stderr: String,
    },
    /// Output directory handling failed.
    #[error("Rasterizer I/O failed at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The renderer produced no pages.
    #[error("No pages rendered from {0}")]
    Empty(PathBuf),
}

/// Renders every page of a PDF into `out_dir/page_<n>.png`.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Rasterize `pdf` and return the page images ordered by page number.
    async fn rasterize(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, RasterError>;
}

/// `pdftoppm`-backed rasterizer.
pub struct PdftoppmRasterizer {
    dpi: u32,
}

impl PdftoppmRasterizer {
    /// Construct a rasterizer rendering at `dpi`.
    pub const fn new(dpi: u32) -> Self {
        Self { dpi }
    }
}

#[async_trait]
impl PageRasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, RasterError> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|source| RasterError::Io {
                path: out_dir.to_path_buf(),
                source,
            })?;

        let prefix = out_dir.join("render");
        let output = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(pdf)
            .arg(&prefix)
            .output()
            .await
            .map_err(|source| RasterError::Launch {
                program: "pdftoppm",
                source,
            })?;

        if !output.status.success() {
            return Err(RasterError::Failed {
                path: pdf.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let pages = normalize_page_names(out_dir, "render").await?;
        if pages.is_empty() {
            return Err(RasterError::Empty(pdf.to_path_buf()));
        }
        tracing::debug!(pdf = %pdf.display(), pages = pages.len(), dpi = self.dpi, "Rasterized document");
        Ok(pages)
    }
}

/// Page number encoded in a `<prefix>-<n>.png` file name.
fn rendered_page_number(file_name: &str, prefix: &str) -> Option<u32> {
    file_name
        .strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_suffix(".png")?
        .parse()
        .ok()
}

/// Canonical image name for a page.
pub fn page_image_name(page: u32) -> String {
    format!("page_{page}.png")
}

async fn normalize_page_names(out_dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, RasterError> {
    let io = |source| RasterError::Io {
        path: out_dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(out_dir).await.map_err(io)?;
    let mut pages = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(page) = rendered_page_number(&name, prefix) {
            let target = out_dir.join(page_image_name(page));
            tokio::fs::rename(entry.path(), &target).await.map_err(io)?;
            pages.push((page, target));
        }
    }
    pages.sort_by_key(|(page, _)| *page);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_padded_and_unpadded_page_numbers() {
        assert_eq!(rendered_page_number("render-1.png", "render"), Some(1));
        assert_eq!(rendered_page_number("render-007.png", "render"), Some(7));
        assert_eq!(rendered_page_number("render-x.png", "render"), None);
        assert_eq!(rendered_page_number("page_1.png", "render"), None);
    }

    #[tokio::test]
    async fn normalizes_rendered_files_in_page_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["render-10.png", "render-02.png", "render-01.png", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").expect("write");
        }

        let pages = normalize_page_names(dir.path(), "render").await.expect("normalize");
        let names: Vec<_> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page_1.png", "page_2.png", "page_10.png"]);
        assert!(dir.path().join("notes.txt").exists());
    }
}
