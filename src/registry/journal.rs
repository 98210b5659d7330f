//! Snapshot plus append-only journal persistence for the registry.
//!
//! Every mutation appends one JSON line to `<snapshot>.journal` and syncs it before returning.
//! A failed append is truncated back to the last complete line, so a later append never lands on
//! a torn fragment. Loading reads the snapshot, replays the journal on top, and then
//! compacts: the merged map is written to a temporary file, renamed over the snapshot, and the
//! journal is truncated. Compaction assumes a single writer.

use super::RegistryError;
use super::types::DocumentRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// One durable registry mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum JournalEntry {
    /// Insert or replace a record.
    Upsert { record: DocumentRecord },
    /// Remove a record.
    Delete { doc_id: String },
}

impl JournalEntry {
    fn apply(self, records: &mut BTreeMap<String, DocumentRecord>) {
        match self {
            Self::Upsert { record } => {
                records.insert(record.doc_id.clone(), record);
            }
            Self::Delete { doc_id } => {
                records.remove(&doc_id);
            }
        }
    }
}

pub(crate) struct RegistryStore {
    snapshot_path: PathBuf,
    journal_path: PathBuf,
    journal: File,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> RegistryError + '_ {
    move |source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn open_journal(path: &Path) -> Result<File, RegistryError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error(path))
}

impl RegistryStore {
    /// Open the store at `snapshot_path`, returning the merged record set.
    pub(crate) fn load(
        snapshot_path: &Path,
    ) -> Result<(Self, BTreeMap<String, DocumentRecord>), RegistryError> {
        if let Some(parent) = snapshot_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let mut records = read_snapshot(snapshot_path)?;
        let journal_path = sibling(snapshot_path, ".journal");
        let replayed = replay_journal(&journal_path, &mut records)?;

        let mut store = Self {
            snapshot_path: snapshot_path.to_path_buf(),
            journal: open_journal(&journal_path)?,
            journal_path,
        };
        store.compact(&records)?;
        tracing::debug!(
            path = %snapshot_path.display(),
            records = records.len(),
            replayed,
            "Registry loaded"
        );
        Ok((store, records))
    }

    /// Durably record one mutation.
    pub(crate) fn append(&mut self, entry: &JournalEntry) -> Result<(), RegistryError> {
        let mut line = serde_json::to_vec(entry).map_err(RegistryError::Encode)?;
        line.push(b'\n');
        append_line(&mut self.journal, &line).map_err(io_error(&self.journal_path))
    }

    /// Rewrite the snapshot from `records` and truncate the journal.
    pub(crate) fn compact(
        &mut self,
        records: &BTreeMap<String, DocumentRecord>,
    ) -> Result<(), RegistryError> {
        let body = serde_json::to_vec_pretty(records).map_err(RegistryError::Encode)?;
        let tmp = sibling(&self.snapshot_path, ".tmp");
        fs::write(&tmp, body).map_err(io_error(&tmp))?;
        fs::rename(&tmp, &self.snapshot_path).map_err(io_error(&self.snapshot_path))?;

        self.journal
            .set_len(0)
            .map_err(io_error(&self.journal_path))?;
        self.journal = open_journal(&self.journal_path)?;
        Ok(())
    }

    pub(crate) fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }
}

/// File operations the journal relies on.
trait AppendTarget: Write {
    fn committed_len(&self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&self) -> io::Result<()>;
}

impl AppendTarget for File {
    fn committed_len(&self) -> io::Result<u64> {
        self.metadata().map(|meta| meta.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Write one complete line, or nothing at all.
fn append_line<T: AppendTarget>(target: &mut T, line: &[u8]) -> io::Result<()> {
    let committed = target.committed_len()?;
    let written = target
        .write_all(line)
        .and_then(|()| target.flush())
        .and_then(|()| target.sync());
    if let Err(error) = written {
        if let Err(rollback) = target.truncate_to(committed) {
            tracing::error!(
                error = %rollback,
                committed,
                "Failed to roll back a partial registry journal write"
            );
        }
        return Err(error);
    }
    Ok(())
}

fn read_snapshot(path: &Path) -> Result<BTreeMap<String, DocumentRecord>, RegistryError> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(error) => return Err(io_error(path)(error)),
    };
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }

    match serde_json::from_slice(&content) {
        Ok(records) => Ok(records),
        Err(error) => {
            // Keep the unreadable snapshot for inspection; artifacts on disk let the pipeline
            // reconverge the ledger on the next run.
            let quarantine = sibling(path, ".corrupt");
            tracing::error!(
                path = %path.display(),
                quarantine = %quarantine.display(),
                error = %error,
                "Registry snapshot unreadable; starting from an empty ledger"
            );
            fs::rename(path, &quarantine).map_err(io_error(path))?;
            Ok(BTreeMap::new())
        }
    }
}

fn replay_journal(
    path: &Path,
    records: &mut BTreeMap<String, DocumentRecord>,
) -> Result<usize, RegistryError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(error) => return Err(io_error(path)(error)),
    };

    let mut applied = 0;
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JournalEntry>(line) {
            Ok(entry) => {
                entry.apply(records);
                applied += 1;
            }
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %error,
                    "Skipping unreadable registry journal entry"
                );
            }
        }
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory journal whose writes stop after `limit` bytes.
    #[derive(Default)]
    struct ShortDisk {
        data: Vec<u8>,
        limit: Option<usize>,
    }

    impl Write for ShortDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.limit.map_or(buf.len(), |limit| limit.saturating_sub(self.data.len()));
            if room == 0 {
                return Err(io::Error::other("no space left on device"));
            }
            let take = room.min(buf.len());
            self.data.extend_from_slice(&buf[..take]);
            Ok(take)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl AppendTarget for ShortDisk {
        fn committed_len(&self) -> io::Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }

        fn sync(&self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn partial_append_is_rolled_back_before_the_next_line() {
        let mut disk = ShortDisk::default();
        append_line(&mut disk, b"{\"op\":\"delete\",\"doc_id\":\"a\"}\n").expect("first");
        let committed = disk.data.len();

        disk.limit = Some(committed + 5);
        let error = append_line(&mut disk, b"{\"op\":\"delete\",\"doc_id\":\"b\"}\n")
            .expect_err("short write");
        assert_eq!(error.kind(), io::ErrorKind::Other);
        assert_eq!(disk.data.len(), committed, "torn fragment must be removed");

        disk.limit = None;
        append_line(&mut disk, b"{\"op\":\"delete\",\"doc_id\":\"c\"}\n").expect("third");
        let text = String::from_utf8(disk.data).expect("utf8");
        let ids: Vec<String> = text
            .lines()
            .map(|line| match serde_json::from_str::<JournalEntry>(line).expect("entry") {
                JournalEntry::Delete { doc_id } => doc_id,
                JournalEntry::Upsert { record } => record.doc_id,
            })
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
