//! Helpers for tagging and identifying index records.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Record categories written by the index stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Chapter summary; metadata carries raw and rewritten content.
    Context,
    /// Chapter title; metadata carries the summary.
    Title,
    /// Whole-document chapter map.
    Structure,
}

impl RecordKind {
    /// Value stored under the `type` tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Title => "title",
            Self::Structure => "structure",
        }
    }
}

/// Compute a deterministic SHA-256 identifier for a record.
pub fn compute_record_id(kind: RecordKind, title: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(title.as_bytes());
    hasher.update([0]);
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Start a metadata map tagged with `kind`.
pub fn tagged_metadata(kind: RecordKind) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("type".into(), Value::String(kind.as_str().to_string()));
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_is_stable_and_kind_sensitive() {
        let a = compute_record_id(RecordKind::Context, "Intro", "text");
        let b = compute_record_id(RecordKind::Context, "Intro", "text");
        let c = compute_record_id(RecordKind::Title, "Intro", "text");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn field_boundaries_change_the_id() {
        let a = compute_record_id(RecordKind::Title, "ab", "c");
        let b = compute_record_id(RecordKind::Title, "a", "bc");
        assert_ne!(a, b);
    }

    #[test]
    fn tagged_metadata_sets_type() {
        let metadata = tagged_metadata(RecordKind::Structure);
        assert_eq!(metadata["type"], "structure");
    }
}
