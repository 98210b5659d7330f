//! Artifact deletion and size accounting for registry records.

use super::types::{CategoryStats, DeletionReport, DocumentRecord, FileStats};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory holding the page images; derived from the first recorded image.
fn images_dir(record: &DocumentRecord) -> Option<PathBuf> {
    record
        .generated_files
        .images
        .iter()
        .find_map(|image| image.parent())
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// Per-document JSON directory holding the extraction, structure, and chunk files.
fn json_dir(record: &DocumentRecord) -> Option<PathBuf> {
    record
        .generated_files
        .json_data
        .as_deref()
        .and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

fn remove_path(category: &str, path: &Path, report: &mut DeletionReport) {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(category, path = %path.display(), "Artifact already absent");
            report.missing.push(path.to_path_buf());
            return;
        }
        Err(error) => Err(error),
    };

    match result {
        Ok(()) => report.deleted.push(path.to_path_buf()),
        Err(error) => {
            tracing::warn!(category, path = %path.display(), error = %error, "Failed to delete artifact");
            report.failed.push(path.to_path_buf());
            report
                .errors
                .push(format!("{category}: {}: {error}", path.display()));
        }
    }
}

pub(super) fn delete_artifacts(record: &DocumentRecord, delete_source: bool) -> DeletionReport {
    let mut report = DeletionReport::default();

    if let Some(dir) = images_dir(record) {
        remove_path("images", &dir, &mut report);
    }
    if let Some(dir) = json_dir(record) {
        remove_path("json_data", &dir, &mut report);
    }
    if let Some(dir) = record.generated_files.vector_db.as_deref() {
        remove_path("vector_db", dir, &mut report);
    }
    let summaries: BTreeSet<_> = record.generated_files.summaries.iter().collect();
    for summary in summaries {
        remove_path("summaries", summary, &mut report);
    }
    if delete_source && !record.doc_path.as_os_str().is_empty() {
        remove_path("source", &record.doc_path, &mut report);
    }

    report.success = report.failed.is_empty();
    report
}

fn measure(paths: impl IntoIterator<Item = PathBuf>) -> CategoryStats {
    let mut stats = CategoryStats::default();
    for path in paths {
        if !path.exists() {
            continue;
        }
        stats.exists = true;
        for entry in WalkDir::new(&path).into_iter().filter_map(Result::ok) {
            if entry.file_type().is_file() {
                stats.files += 1;
                stats.bytes += entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            }
        }
    }
    stats
}

pub(super) fn collect_stats(record: &DocumentRecord) -> FileStats {
    let files = &record.generated_files;
    let images = match images_dir(record) {
        Some(dir) if dir.exists() => measure([dir]),
        _ => measure(files.images.iter().cloned()),
    };
    let json_data = measure(json_dir(record));
    let vector_db = measure(files.vector_db.clone());
    let summaries = measure(files.summaries.iter().cloned());
    let source = if record.doc_path.as_os_str().is_empty() {
        CategoryStats::default()
    } else {
        measure([record.doc_path.clone()])
    };

    let total_bytes = images.bytes + json_data.bytes + vector_db.bytes + summaries.bytes + source.bytes;
    FileStats {
        images,
        json_data,
        vector_db,
        summaries,
        source,
        total_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageName;
    use crate::registry::{DocType, DocumentRegistry, GeneratedFiles, Registration, StageStatus};
    use serde_json::Map;

    struct Fixture {
        _dir: tempfile::TempDir,
        registry: DocumentRegistry,
        doc_id: String,
        source: PathBuf,
        images: PathBuf,
        json: PathBuf,
        vector: PathBuf,
        summary: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        let source = root.join("manual.pdf");
        let images = root.join("pdf_image/manual");
        let json = root.join("json_data/manual");
        let vector = root.join("vector_db/manual_data_index");
        let summary = root.join("output/manual_brief_summary.md");
        std::fs::write(&source, b"%PDF").expect("source");
        std::fs::create_dir_all(&images).expect("images");
        std::fs::write(images.join("page_1.png"), b"12345").expect("page");
        std::fs::create_dir_all(&json).expect("json");
        std::fs::write(json.join("data.json"), b"[]").expect("data");
        std::fs::write(json.join("structure.json"), b"{}").expect("structure");
        std::fs::create_dir_all(&vector).expect("vector");
        std::fs::write(vector.join("index.json"), b"{}").expect("index");
        std::fs::create_dir_all(summary.parent().unwrap()).expect("output");
        std::fs::write(&summary, b"# manual").expect("summary");

        let registry = DocumentRegistry::open(root.join("registry.json")).expect("registry");
        let doc_id = registry
            .register(Registration {
                doc_name: "manual".into(),
                doc_path: source.clone(),
                doc_type: DocType::Pdf,
                index_path: Some(vector.clone()),
                brief_summary: "abstract".into(),
                metadata: Map::new(),
                generated_files: GeneratedFiles {
                    images: vec![images.join("page_1.png")],
                    json_data: Some(json.join("data.json")),
                    vector_db: Some(vector.clone()),
                    summaries: vec![summary.clone()],
                },
            })
            .expect("register");

        Fixture {
            _dir: dir,
            registry,
            doc_id,
            source,
            images,
            json,
            vector,
            summary,
        }
    }

    #[test]
    fn deletes_every_category_and_the_entry() {
        let fx = fixture();
        let report = fx
            .registry
            .delete_all_files(&fx.doc_id, true)
            .expect("delete");

        assert!(report.success);
        assert_eq!(report.deleted.len(), 5);
        assert!(report.missing.is_empty());
        for path in [&fx.images, &fx.json, &fx.vector, &fx.summary, &fx.source] {
            assert!(!path.exists(), "{} should be gone", path.display());
        }
        assert_eq!(fx.registry.count(), 0);
    }

    #[test]
    fn externally_removed_vector_store_is_reported_as_missing() {
        let fx = fixture();
        std::fs::remove_dir_all(&fx.vector).expect("external removal");

        let report = fx
            .registry
            .delete_all_files(&fx.doc_id, false)
            .expect("delete");

        assert!(report.success);
        assert_eq!(report.missing, vec![fx.vector.clone()]);
        assert!(!report.deleted.contains(&fx.vector));
        assert!(!fx.images.exists());
        assert!(!fx.json.exists());
        assert!(!fx.summary.exists());
        assert!(fx.source.exists(), "source kept unless requested");
        assert!(fx.registry.get(&fx.doc_id).is_none());
    }

    #[test]
    fn stage_history_does_not_affect_deletion() {
        let fx = fixture();
        fx.registry
            .update_stage_status("manual", StageName::Parse, StageStatus::Completed, vec![])
            .expect("stage");
        let report = fx.registry.delete_all_files(&fx.doc_id, false).expect("delete");
        assert_eq!(report.deleted.len(), 4);
    }

    #[test]
    fn file_stats_walk_directories() {
        let fx = fixture();
        let stats = fx.registry.get_file_stats(&fx.doc_id).expect("stats");

        assert!(stats.images.exists);
        assert_eq!(stats.images.files, 1);
        assert_eq!(stats.images.bytes, 5);
        assert_eq!(stats.json_data.files, 2);
        assert_eq!(stats.json_data.bytes, 4);
        assert_eq!(stats.vector_db.files, 1);
        assert_eq!(stats.summaries.bytes, 8);
        assert_eq!(stats.source.bytes, 4);
        assert_eq!(stats.total_bytes, 5 + 4 + 2 + 8 + 4);
    }
}
