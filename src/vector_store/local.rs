//! Directory-backed vector store.
//!
//! Each index is a directory holding a single `index.json`. Builds are written into a
//! sibling staging directory and renamed into place, so a non-empty index directory always
//! denotes a completed write.

use super::{RecordKind, StoredRecord, VectorStore, VectorStoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    dimension: usize,
    records: Vec<StoredRecord>,
}

/// Vector store persisting records as JSON under one directory per index.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalVectorStore;

impl LocalVectorStore {
    /// Construct a store.
    pub const fn new() -> Self {
        Self
    }

    async fn load(&self, path: &Path) -> Result<IndexFile, VectorStoreError> {
        let file = path.join(INDEX_FILE);
        let bytes = tokio::fs::read(&file).await.map_err(|source| VectorStoreError::Io {
            path: file.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|source| VectorStoreError::Serialization { path: file, source })
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".into());
    path.with_file_name(format!(".{name}.staging-{}", Uuid::new_v4()))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> VectorStoreError + '_ {
    move |source| VectorStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Replace `path` with the finished staging directory.
async fn swap_into_place(staging: &Path, path: &Path) -> Result<(), VectorStoreError> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(path).await.map_err(io_error(path))?;
    }
    tokio::fs::rename(staging, path).await.map_err(io_error(path))
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn build(&self, path: &Path, records: Vec<StoredRecord>) -> Result<usize, VectorStoreError> {
        let dimension = records.first().map(|record| record.vector.len()).unwrap_or(0);
        if let Some(bad) = records.iter().find(|record| record.vector.len() != dimension) {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dimension,
                actual: bad.vector.len(),
            });
        }

        let count = records.len();
        let body = serde_json::to_vec(&IndexFile { dimension, records }).map_err(|source| {
            VectorStoreError::Serialization {
                path: path.to_path_buf(),
                source,
            }
        })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error(parent))?;
        }
        let staging = staging_path(path);
        tokio::fs::create_dir_all(&staging).await.map_err(io_error(&staging))?;
        let staged_file = staging.join(INDEX_FILE);
        if let Err(error) = tokio::fs::write(&staged_file, &body).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(io_error(&staged_file)(error));
        }

        if let Err(error) = swap_into_place(&staging, path).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(error);
        }

        tracing::debug!(path = %path.display(), records = count, dimension, "Vector index written");
        Ok(count)
    }

    async fn scan_by_tag(
        &self,
        path: &Path,
        kind: RecordKind,
    ) -> Result<Vec<StoredRecord>, VectorStoreError> {
        let index = self.load(path).await?;
        Ok(index
            .records
            .into_iter()
            .filter(|record| record.tag("type") == Some(kind.as_str()))
            .collect())
    }

    async fn is_populated(&self, path: &Path) -> bool {
        match tokio::fs::read_dir(path).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::payload::tagged_metadata;
    use serde_json::Value;

    fn record(kind: RecordKind, title: &str, vector: Vec<f32>) -> StoredRecord {
        let mut metadata = tagged_metadata(kind);
        metadata.insert("title".into(), Value::String(title.into()));
        StoredRecord {
            id: crate::vector_store::compute_record_id(kind, title, title),
            page_content: title.into(),
            metadata,
            vector,
        }
    }

    #[tokio::test]
    async fn build_then_scan_filters_by_tag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vector_db").join("doc_data_index");
        let store = LocalVectorStore::new();

        assert!(!store.is_populated(&path).await);
        let written = store
            .build(
                &path,
                vec![
                    record(RecordKind::Context, "One", vec![1.0, 0.0]),
                    record(RecordKind::Title, "One", vec![0.0, 1.0]),
                    record(RecordKind::Context, "Two", vec![0.5, 0.5]),
                ],
            )
            .await
            .expect("build");

        assert_eq!(written, 3);
        assert!(store.is_populated(&path).await);
        let contexts = store.scan_by_tag(&path, RecordKind::Context).await.expect("scan");
        assert_eq!(contexts.len(), 2);
        assert!(contexts.iter().all(|r| r.tag("type") == Some("context")));
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_index_without_leftovers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc_data_index");
        let store = LocalVectorStore::new();

        store
            .build(&path, vec![record(RecordKind::Title, "Old", vec![1.0])])
            .await
            .expect("first build");
        store
            .build(&path, vec![record(RecordKind::Title, "New", vec![1.0])])
            .await
            .expect("second build");

        let titles = store.scan_by_tag(&path, RecordKind::Title).await.expect("scan");
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].page_content, "New");

        let siblings: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .collect();
        assert_eq!(siblings.len(), 1, "staging directory must not linger");
    }

    #[tokio::test]
    async fn mixed_dimensions_are_rejected_before_writing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc_data_index");
        let store = LocalVectorStore::new();

        let error = store
            .build(
                &path,
                vec![
                    record(RecordKind::Title, "A", vec![1.0, 0.0]),
                    record(RecordKind::Title, "B", vec![1.0]),
                ],
            )
            .await
            .expect_err("dimension mismatch");

        assert!(matches!(error, VectorStoreError::DimensionMismatch { expected: 2, actual: 1 }));
        assert!(!store.is_populated(&path).await);
    }

    #[tokio::test]
    async fn scanning_garbage_reports_serialization_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc_data_index");
        std::fs::create_dir_all(&path).expect("mkdir");
        std::fs::write(path.join(INDEX_FILE), b"not json").expect("write");

        let store = LocalVectorStore::new();
        assert!(store.is_populated(&path).await);
        let error = store
            .scan_by_tag(&path, RecordKind::Context)
            .await
            .expect_err("garbage");
        assert!(matches!(error, VectorStoreError::Serialization { .. }));
    }

    #[tokio::test]
    async fn failed_swap_leaves_no_staging_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc_data_index");
        std::fs::write(&path, b"not a directory").expect("blocker");
        let store = LocalVectorStore::new();

        let result = store
            .build(&path, vec![record(RecordKind::Title, "Intro", vec![1.0, 0.0])])
            .await;

        assert!(matches!(result, Err(VectorStoreError::Io { .. })));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".staging-"))
            .collect();
        assert!(leftovers.is_empty(), "staging directory left behind");
    }
}
