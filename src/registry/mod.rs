//! Durable ledger of indexed documents and their per-stage status.
//!
//! The registry is an explicit repository object: construct it with
//! [`DocumentRegistry::open`] and share it through an `Arc`. The in-memory record set is
//! guarded by a mutex that is never held across an `.await`, and every mutation is written to
//! the journal before it becomes visible in memory.

mod files;
mod journal;
pub mod types;

use crate::pipeline::StageName;
use journal::{JournalEntry, RegistryStore};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

pub use types::{
    CategoryStats, DeletionReport, DocType, DocumentRecord, FileStats, GeneratedFiles,
    RecordStatus, Registration, RegistryStatistics, SortKey, StageEntry, StageStatus,
};

/// Errors raised by registry persistence and lookups.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Snapshot or journal access failed.
    #[error("Registry I/O failed at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A record could not be serialized.
    #[error("Failed to encode registry entry: {0}")]
    Encode(#[source] serde_json::Error),
    /// No record carries the requested identifier.
    #[error("Document {0} is not registered")]
    NotFound(String),
}

struct Inner {
    records: BTreeMap<String, DocumentRecord>,
    store: RegistryStore,
}

impl Inner {
    fn find_by_name(&self, name: &str) -> Option<&DocumentRecord> {
        self.records.values().find(|record| record.doc_name == name)
    }

    fn commit(&mut self, record: DocumentRecord) -> Result<(), RegistryError> {
        self.store.append(&JournalEntry::Upsert {
            record: record.clone(),
        })?;
        self.records.insert(record.doc_id.clone(), record);
        Ok(())
    }
}

/// Persistent per-document ledger.
pub struct DocumentRegistry {
    inner: Mutex<Inner>,
}

/// Current time formatted for ledger fields.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn parse_timestamp(value: Option<&str>) -> Option<OffsetDateTime> {
    value.and_then(|value| OffsetDateTime::parse(value, &Rfc3339).ok())
}

/// Newest first; records without a timestamp sort last.
fn newest_first(left: Option<&str>, right: Option<&str>) -> Ordering {
    match (parse_timestamp(left), parse_timestamp(right)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl DocumentRegistry {
    /// Load the registry rooted at `snapshot_path`, replaying and compacting its journal.
    pub fn open(snapshot_path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let (store, records) = RegistryStore::load(snapshot_path.as_ref())?;
        tracing::info!(
            path = %snapshot_path.as_ref().display(),
            documents = records.len(),
            "Document registry opened"
        );
        Ok(Self {
            inner: Mutex::new(Inner { records, store }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Location of the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.lock().store.snapshot_path().to_path_buf()
    }

    /// Upsert a document by name and return its identifier.
    ///
    /// Re-registering an existing name updates the record in place: `doc_id`, `created_at`,
    /// and `processing_stages` are kept, metadata keys are merged, and the generated-file
    /// manifest is replaced.
    pub fn register(&self, registration: Registration) -> Result<String, RegistryError> {
        let Registration {
            doc_name,
            doc_path,
            doc_type,
            index_path,
            brief_summary,
            metadata,
            generated_files,
        } = registration;
        let now = current_timestamp_rfc3339();

        let mut inner = self.lock();
        let record = match inner.find_by_name(&doc_name).cloned() {
            Some(mut existing) => {
                existing.doc_path = doc_path;
                existing.doc_type = doc_type;
                existing.index_path = index_path;
                existing.brief_summary = brief_summary;
                existing.metadata.extend(metadata);
                existing.generated_files = generated_files;
                existing.indexed_at = Some(now);
                existing.status = RecordStatus::Completed;
                existing
            }
            None => DocumentRecord {
                doc_id: Uuid::new_v4().to_string(),
                doc_name,
                doc_path,
                doc_type,
                index_path,
                brief_summary,
                created_at: now.clone(),
                indexed_at: Some(now),
                status: RecordStatus::Completed,
                metadata,
                generated_files,
                processing_stages: BTreeMap::new(),
            },
        };

        let doc_id = record.doc_id.clone();
        tracing::info!(doc_id = %doc_id, doc_name = %record.doc_name, "Document registered");
        inner.commit(record)?;
        Ok(doc_id)
    }

    /// Record the status of one stage, creating a placeholder record for unknown names.
    ///
    /// Placeholders created here carry no source location; prefer
    /// [`DocumentRegistry::update_source_stage_status`] when the source is known.
    pub fn update_stage_status(
        &self,
        doc_name: &str,
        stage: StageName,
        status: StageStatus,
        output_files: Vec<PathBuf>,
    ) -> Result<(), RegistryError> {
        self.upsert_stage(doc_name, None, stage, status, output_files)
    }

    /// Record the status of one stage for a document whose source is known.
    ///
    /// A placeholder created for an unknown name takes its path and type from the source, and an
    /// existing placeholder without a path is filled in.
    pub fn update_source_stage_status(
        &self,
        doc_name: &str,
        source: (&Path, DocType),
        stage: StageName,
        status: StageStatus,
        output_files: Vec<PathBuf>,
    ) -> Result<(), RegistryError> {
        self.upsert_stage(doc_name, Some(source), stage, status, output_files)
    }

    fn upsert_stage(
        &self,
        doc_name: &str,
        source: Option<(&Path, DocType)>,
        stage: StageName,
        status: StageStatus,
        output_files: Vec<PathBuf>,
    ) -> Result<(), RegistryError> {
        let now = current_timestamp_rfc3339();
        let mut inner = self.lock();
        let mut record = match inner.find_by_name(doc_name).cloned() {
            Some(record) => record,
            None => {
                tracing::debug!(doc_name, stage = stage.as_str(), "Creating placeholder record");
                let (doc_path, doc_type) = source
                    .map(|(path, kind)| (path.to_path_buf(), kind))
                    .unwrap_or((PathBuf::new(), DocType::Pdf));
                DocumentRecord {
                    doc_id: Uuid::new_v4().to_string(),
                    doc_name: doc_name.to_string(),
                    doc_path,
                    doc_type,
                    index_path: None,
                    brief_summary: String::new(),
                    created_at: now.clone(),
                    indexed_at: None,
                    status: RecordStatus::Processing,
                    metadata: Default::default(),
                    generated_files: GeneratedFiles::default(),
                    processing_stages: BTreeMap::new(),
                }
            }
        };
        if let Some((path, kind)) = source
            && record.doc_path.as_os_str().is_empty()
        {
            record.doc_path = path.to_path_buf();
            record.doc_type = kind;
        }

        record.processing_stages.insert(
            stage.as_str().to_string(),
            StageEntry {
                status,
                output_files,
                updated_at: now,
            },
        );
        inner.commit(record)
    }

    /// Fetch a record by identifier.
    pub fn get(&self, doc_id: &str) -> Option<DocumentRecord> {
        self.lock().records.get(doc_id).cloned()
    }

    /// Fetch a record by name.
    pub fn get_by_name(&self, doc_name: &str) -> Option<DocumentRecord> {
        self.lock().find_by_name(doc_name).cloned()
    }

    /// All records in the requested order.
    pub fn list_all(&self, sort_by: SortKey) -> Vec<DocumentRecord> {
        let mut records: Vec<_> = self.lock().records.values().cloned().collect();
        match sort_by {
            SortKey::IndexedAt => records.sort_by(|a, b| {
                newest_first(a.indexed_at.as_deref(), b.indexed_at.as_deref())
                    .then_with(|| a.doc_name.cmp(&b.doc_name))
            }),
            SortKey::CreatedAt => records.sort_by(|a, b| {
                newest_first(Some(&a.created_at), Some(&b.created_at))
                    .then_with(|| a.doc_name.cmp(&b.doc_name))
            }),
            SortKey::DocName => records.sort_by(|a, b| a.doc_name.cmp(&b.doc_name)),
        }
        records
    }

    /// Number of records.
    pub fn count(&self) -> usize {
        self.lock().records.len()
    }

    /// Counts by document type.
    pub fn get_statistics(&self) -> RegistryStatistics {
        let inner = self.lock();
        let mut stats = RegistryStatistics {
            total_documents: inner.records.len(),
            ..Default::default()
        };
        for record in inner.records.values() {
            *stats
                .by_type
                .entry(record.doc_type.as_str().to_string())
                .or_default() += 1;
            if record.status == RecordStatus::Completed {
                stats.completed += 1;
            }
        }
        stats
    }

    /// Sizes of every recorded artifact category for a document.
    pub fn get_file_stats(&self, doc_id: &str) -> Result<FileStats, RegistryError> {
        let record = self
            .get(doc_id)
            .ok_or_else(|| RegistryError::NotFound(doc_id.to_string()))?;
        Ok(files::collect_stats(&record))
    }

    /// Remove every artifact of a document, then its registry entry.
    ///
    /// Each category is attempted independently; failures are collected into the report and
    /// never stop the remaining deletions. The entry is removed regardless of partial failure.
    pub fn delete_all_files(
        &self,
        doc_id: &str,
        delete_source: bool,
    ) -> Result<DeletionReport, RegistryError> {
        let record = self
            .get(doc_id)
            .ok_or_else(|| RegistryError::NotFound(doc_id.to_string()))?;

        let report = files::delete_artifacts(&record, delete_source);

        let mut inner = self.lock();
        let entry = JournalEntry::Delete {
            doc_id: doc_id.to_string(),
        };
        inner.store.append(&entry)?;
        inner.records.remove(doc_id);
        tracing::info!(
            doc_id,
            doc_name = %record.doc_name,
            deleted = report.deleted.len(),
            missing = report.missing.len(),
            failed = report.failed.len(),
            "Document removed from registry"
        );
        Ok(report)
    }

    /// Fold the journal into a fresh snapshot.
    pub fn compact(&self) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        let Inner { records, store } = &mut *inner;
        store.compact(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    fn registration(name: &str) -> Registration {
        Registration {
            doc_name: name.to_string(),
            doc_path: PathBuf::from(format!("{name}.pdf")),
            doc_type: DocType::Pdf,
            index_path: None,
            brief_summary: "summary".into(),
            metadata: Map::new(),
            generated_files: GeneratedFiles::default(),
        }
    }

    fn open(dir: &tempfile::TempDir) -> DocumentRegistry {
        DocumentRegistry::open(dir.path().join("registry.json")).expect("open registry")
    }

    #[test]
    fn register_upserts_by_name_and_keeps_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = open(&dir);

        let first = registry.register(registration("manual")).expect("register");
        registry
            .update_stage_status("manual", StageName::Parse, StageStatus::Completed, vec![])
            .expect("stage");
        let created_at = registry.get(&first).expect("record").created_at;

        let mut again = registration("manual");
        again.brief_summary = "updated".into();
        again.metadata.insert("pages".into(), Value::from(12));
        let second = registry.register(again).expect("re-register");

        assert_eq!(first, second);
        assert_eq!(registry.count(), 1);
        let record = registry.get(&second).expect("record");
        assert_eq!(record.created_at, created_at);
        assert_eq!(record.brief_summary, "updated");
        assert_eq!(record.metadata["pages"], 12);
        assert!(record.processing_stages.contains_key("parse"));
    }

    #[test]
    fn stage_update_before_register_creates_one_placeholder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = open(&dir);

        registry
            .update_stage_status("report", StageName::Parse, StageStatus::Completed, vec![])
            .expect("stage");
        let placeholder = registry.get_by_name("report").expect("placeholder");
        assert_eq!(placeholder.status, RecordStatus::Processing);

        let doc_id = registry.register(registration("report")).expect("register");
        assert_eq!(doc_id, placeholder.doc_id);
        assert_eq!(registry.count(), 1);
        assert_eq!(
            registry.get(&doc_id).expect("record").status,
            RecordStatus::Completed
        );
    }

    #[test]
    fn stage_update_overwrites_previous_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = open(&dir);

        registry
            .update_stage_status("doc", StageName::BuildIndex, StageStatus::Failed, vec![])
            .expect("failed");
        registry
            .update_stage_status(
                "doc",
                StageName::BuildIndex,
                StageStatus::Completed,
                vec![PathBuf::from("vector_db/doc_data_index")],
            )
            .expect("completed");

        let record = registry.get_by_name("doc").expect("record");
        let entry = &record.processing_stages["build_index"];
        assert_eq!(entry.status, StageStatus::Completed);
        assert_eq!(entry.output_files.len(), 1);
    }

    #[test]
    fn reopening_replays_journal_and_compacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doc_id = {
            let registry = open(&dir);
            registry
                .update_stage_status("a", StageName::Parse, StageStatus::Completed, vec![])
                .expect("stage");
            registry.register(registration("b")).expect("register")
        };

        let journal = dir.path().join("registry.json.journal");
        assert!(std::fs::metadata(&journal).expect("journal").len() > 0);

        let registry = open(&dir);
        assert_eq!(registry.count(), 2);
        assert!(registry.get(&doc_id).is_some());
        assert_eq!(std::fs::metadata(&journal).expect("journal").len(), 0);

        let snapshot: BTreeMap<String, DocumentRecord> = serde_json::from_slice(
            &std::fs::read(dir.path().join("registry.json")).expect("snapshot"),
        )
        .expect("snapshot is a doc_id map");
        assert!(snapshot.contains_key(&doc_id));
    }

    #[test]
    fn torn_journal_tail_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let registry = open(&dir);
            registry.register(registration("kept")).expect("register");
        }
        let journal = dir.path().join("registry.json.journal");
        let mut content = std::fs::read_to_string(&journal).expect("journal");
        content.push_str("{\"op\":\"upsert\",\"record\":{\"doc_id\":");
        std::fs::write(&journal, content).expect("write");

        let registry = open(&dir);
        assert_eq!(registry.count(), 1);
        assert!(registry.get_by_name("kept").is_some());
    }

    #[test]
    fn corrupt_snapshot_is_quarantined() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("registry.json"), b"{ not json").expect("write");

        let registry = open(&dir);
        assert_eq!(registry.count(), 0);
        assert!(dir.path().join("registry.json.corrupt").exists());
    }

    #[test]
    fn list_all_orders_by_requested_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = open(&dir);
        registry.register(registration("beta")).expect("beta");
        std::thread::sleep(std::time::Duration::from_millis(5));
        registry.register(registration("alpha")).expect("alpha");
        std::thread::sleep(std::time::Duration::from_millis(5));
        registry
            .update_stage_status("gamma", StageName::Parse, StageStatus::Completed, vec![])
            .expect("placeholder");

        let by_name: Vec<_> = registry
            .list_all(SortKey::DocName)
            .into_iter()
            .map(|r| r.doc_name)
            .collect();
        assert_eq!(by_name, vec!["alpha", "beta", "gamma"]);

        let by_indexed: Vec<_> = registry
            .list_all(SortKey::IndexedAt)
            .into_iter()
            .map(|r| r.doc_name)
            .collect();
        assert_eq!(by_indexed, vec!["alpha", "beta", "gamma"]);

        let by_created: Vec<_> = registry
            .list_all(SortKey::CreatedAt)
            .into_iter()
            .map(|r| r.doc_name)
            .collect();
        assert_eq!(by_created[0], "gamma");
    }

    #[test]
    fn statistics_count_by_type() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = open(&dir);
        registry.register(registration("one")).expect("one");
        let mut url = registration("two");
        url.doc_type = DocType::Url;
        registry.register(url).expect("two");
        registry
            .update_stage_status("three", StageName::Parse, StageStatus::Failed, vec![])
            .expect("placeholder");

        let stats = registry.get_statistics();
        assert_eq!(stats.total_documents, 3);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.by_type["pdf"], 2);
        assert_eq!(stats.by_type["url"], 1);
    }

    #[test]
    fn unknown_document_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = open(&dir);
        assert!(matches!(
            registry.delete_all_files("missing", false),
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            registry.get_file_stats("missing"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn placeholder_records_keep_their_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = open(&dir);

        registry
            .update_source_stage_status(
                "news",
                (Path::new("https://example.com/news"), DocType::Url),
                StageName::Parse,
                StageStatus::Failed,
                vec![],
            )
            .expect("stage");
        registry
            .update_stage_status("bare", StageName::Parse, StageStatus::Completed, vec![])
            .expect("stage");
        registry
            .update_source_stage_status(
                "bare",
                (Path::new("docs/bare.pdf"), DocType::Pdf),
                StageName::ExtractStructure,
                StageStatus::Completed,
                vec![],
            )
            .expect("stage");

        let news = registry.get_by_name("news").expect("news");
        assert_eq!(news.doc_type, DocType::Url);
        assert_eq!(news.doc_path, PathBuf::from("https://example.com/news"));
        assert_eq!(news.status, RecordStatus::Processing);
        let bare = registry.get_by_name("bare").expect("bare");
        assert_eq!(bare.doc_path, PathBuf::from("docs/bare.pdf"));
        assert_eq!(bare.processing_stages.len(), 2);

        let stats = registry.get_statistics();
        assert_eq!(stats.by_type.get("url"), Some(&1));
        assert_eq!(stats.by_type.get("pdf"), Some(&1));
    }
}
