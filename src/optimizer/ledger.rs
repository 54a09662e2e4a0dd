//! Durable key/value log of restore records
//!
//! Every `put` reaches the disk before it returns, so a crash in the middle
//! of an optimize pass still leaves an undo record for each mutation that
//! was applied.

use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("ledger entry could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A durable string store.
pub trait ChangeLedger: Send {
    /// Stores `value` under `key`; durable once this returns `Ok`.
    fn put(&mut self, key: &str, value: &str) -> Result<(), LedgerError>;

    /// All stored values, in insertion order.
    fn values(&self) -> Vec<String>;

    fn count(&self) -> usize {
        self.values().len()
    }

    /// Removes every entry; durable once this returns `Ok`.
    fn clear_all(&mut self) -> Result<(), LedgerError>;
}

static KEY_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A key no earlier call in this process has returned: wall-clock
/// nanoseconds, a process-local sequence number and a hash of the value.
pub fn unique_key(value: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let sequence = KEY_SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);

    format!("{}-{}-{:016x}", nanos, sequence, hasher.finish())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerEntry {
    key: String,
    value: String,
}

/// JSON-lines ledger file: one `{"key":..,"value":..}` object per line.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    file: File,
    entries: Vec<LedgerEntry>,
}

impl FileLedger {
    /// Opens (creating if missing) the ledger at `path` and loads its entries.
    ///
    /// Lines that cannot be decoded are skipped with a warning; a later line
    /// with the same key replaces an earlier one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| LedgerError::Io {
            path: path.clone(),
            source,
        };

        // not append mode, Windows refuses set_len on append-only handles
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(io_err)?;

        let mut entries: Vec<LedgerEntry> = Vec::new();
        let reader = BufReader::new(File::open(&path).map_err(io_err)?);
        for (number, line) in reader.lines().enumerate() {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LedgerEntry>(&line) {
                Ok(entry) => upsert(&mut entries, entry),
                Err(e) => log::warn!(
                    "Skipping corrupt ledger line {} in {}: {}",
                    number + 1,
                    path.display(),
                    e
                ),
            }
        }

        log::debug!("Opened ledger {} with {} entries", path.display(), entries.len());
        Ok(Self {
            path,
            file,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn upsert(entries: &mut Vec<LedgerEntry>, entry: LedgerEntry) {
    match entries.iter_mut().find(|e| e.key == entry.key) {
        Some(existing) => existing.value = entry.value,
        None => entries.push(entry),
    }
}

impl ChangeLedger for FileLedger {
    fn put(&mut self, key: &str, value: &str) -> Result<(), LedgerError> {
        let entry = LedgerEntry {
            key: key.to_string(),
            value: value.to_string(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        self.file
            .seek(SeekFrom::End(0))
            .and_then(|_| self.file.write_all(line.as_bytes()))
            .and_then(|_| self.file.sync_all())
            .map_err(|e| self.io_err(e))?;

        upsert(&mut self.entries, entry);
        Ok(())
    }

    fn values(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.value.clone()).collect()
    }

    fn count(&self) -> usize {
        self.entries.len()
    }

    fn clear_all(&mut self) -> Result<(), LedgerError> {
        self.file
            .set_len(0)
            .and_then(|_| self.file.seek(SeekFrom::Start(0)))
            .and_then(|_| self.file.sync_all())
            .map_err(|e| self.io_err(e))?;
        self.entries.clear();
        Ok(())
    }
}

/// Non-durable ledger for tests.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    entries: Vec<(String, String)>,
}

#[cfg(test)]
impl ChangeLedger for MemoryLedger {
    fn put(&mut self, key: &str, value: &str) -> Result<(), LedgerError> {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }

    fn values(&self) -> Vec<String> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    fn clear_all(&mut self) -> Result<(), LedgerError> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unique_keys_for_identical_values() {
        let a = unique_key("1,32,null");
        let b = unique_key("1,32,null");
        assert_ne!(a, b);
    }

    #[test]
    fn test_put_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.jsonl");

        {
            let mut ledger = FileLedger::open(&path).unwrap();
            ledger.put("a", "first").unwrap();
            ledger.put("b", "second").unwrap();
            // dropped without any explicit flush or commit
        }

        let ledger = FileLedger::open(&path).unwrap();
        assert_eq!(ledger.count(), 2);
        assert_eq!(ledger.values(), vec!["first", "second"]);
    }

    #[test]
    fn test_clear_all_empties_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let mut ledger = FileLedger::open(&path).unwrap();
        ledger.put("a", "first").unwrap();
        ledger.clear_all().unwrap();
        assert_eq!(ledger.count(), 0);

        // appends after a clear start from an empty file
        ledger.put("c", "third").unwrap();
        drop(ledger);

        let reopened = FileLedger::open(&path).unwrap();
        assert_eq!(reopened.values(), vec!["third"]);
    }

    #[test]
    fn test_reopened_ledger_appends_and_clears() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.jsonl");
        FileLedger::open(&path).unwrap().put("a", "first").unwrap();

        let mut ledger = FileLedger::open(&path).unwrap();
        ledger.put("b", "second").unwrap();
        assert_eq!(FileLedger::open(&path).unwrap().values(), vec!["first", "second"]);

        ledger.clear_all().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        ledger.put("c", "third").unwrap();
        ledger.put("d", "fourth").unwrap();
        drop(ledger);

        let reopened = FileLedger::open(&path).unwrap();
        assert_eq!(reopened.values(), vec!["third", "fourth"]);
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.jsonl");
        std::fs::write(
            &path,
            "{\"key\":\"a\",\"value\":\"ok\"}\nnot json at all\n\n{\"key\":\"a\",\"value\":\"newer\"}\n",
        )
        .unwrap();

        let ledger = FileLedger::open(&path).unwrap();
        assert_eq!(ledger.values(), vec!["newer"]);
    }
}
