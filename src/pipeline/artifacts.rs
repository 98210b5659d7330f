//! Artifact file formats and tolerant loaders.
//!
//! Writers go through a temporary sibling and a rename so a reader never sees a half-written
//! file. Loaders return `None` for anything missing, unreadable, or malformed; callers treat
//! that as a cache miss.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Chapter title to the pages it spans.
pub type Agenda = BTreeMap<String, Vec<u32>>;

/// Extracted content of one page, as stored in `data.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// One-based page number.
    pub page: u32,
    /// Extracted text.
    pub content: String,
    /// Rasterized page image, when the page came from a PDF.
    #[serde(default)]
    pub image: Option<PathBuf>,
}

/// Chapter structure, as stored in `structure.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureOutput {
    /// Chapter title to page list.
    #[serde(rename = "agenda_dict")]
    pub agenda: Agenda,
    /// Whether the agenda came from a table of contents.
    #[serde(default)]
    pub has_toc: bool,
}

/// Accepted shapes of `structure.json`. Older runs wrote the bare agenda map, which only a
/// table of contents produced.
#[derive(Deserialize)]
#[serde(untagged)]
enum StructureFile {
    Current(StructureOutput),
    Legacy(Agenda),
}

/// Text of one chapter, as stored in `chunks.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterChunk {
    /// Page number to page text.
    pub data: BTreeMap<u32, String>,
    /// Pages in the chapter, ascending.
    pub pages: Vec<u32>,
}

impl ChapterChunk {
    /// Chapter text with pages joined in order.
    pub fn text(&self) -> String {
        self.data.values().map(String::as_str).collect::<Vec<_>>().join("\n\n")
    }

    /// First page of the chapter.
    pub fn first_page(&self) -> Option<u32> {
        self.pages.first().copied().or_else(|| self.data.keys().next().copied())
    }
}

pub(crate) async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> std::io::Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    write_bytes(path, &body).await
}

pub(crate) async fn write_bytes(path: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await
}

pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %error, "Artifact unreadable");
            }
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(path = %path.display(), error = %error, "Artifact malformed");
            None
        }
    }
}

/// Load `structure.json` in either accepted shape.
pub(crate) async fn read_structure(path: &Path) -> Option<StructureOutput> {
    match read_json::<StructureFile>(path).await? {
        StructureFile::Current(structure) => Some(structure),
        StructureFile::Legacy(agenda) => Some(StructureOutput {
            agenda,
            has_toc: true,
        }),
    }
}
