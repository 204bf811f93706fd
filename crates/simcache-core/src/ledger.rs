//! Durable record of the locations the user chose to keep offline.
//!
//! The ledger is a small keyed store persisted as one JSON file. It holds
//! named collections of auto-keyed records; the agent uses a single
//! collection, `ubicaciones`, whose records are lists of location codes.
//!
//! Opening the ledger performs a schema handshake: a missing file or a file
//! from an older schema is upgraded in place and the collection is created if
//! absent. A file written by a newer schema is refused.
//!
//! The selection consulted on startup is always the record at key 1. In
//! [`LedgerMode::Append`] later selections are appended and never read back;
//! in [`LedgerMode::Upsert`] key 1 is replaced on every save.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::utils::write_atomic;

pub const LEDGER_SCHEMA_VERSION: u32 = 1;
pub const LOCATIONS_COLLECTION: &str = "ubicaciones";

/// Key of the record read back as the user's selection.
pub const CANONICAL_KEY: u64 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    /// Every save appends a record; the first record stays canonical.
    #[default]
    Append,
    /// Every save replaces the canonical record.
    Upsert,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Ledger file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Ledger schema version {found} is newer than supported version {supported}")]
    IncompatibleVersion { found: u32, supported: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub codes: Vec<String>,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Collection {
    next_key: u64,
    records: BTreeMap<u64, SelectionRecord>,
}

impl Collection {
    fn new() -> Self {
        Self {
            next_key: CANONICAL_KEY,
            records: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerFile {
    schema_version: u32,
    #[serde(default)]
    collections: BTreeMap<String, Collection>,
}

pub struct LocationLedger {
    path: PathBuf,
    mode: LedgerMode,
    // Serializes read-modify-write cycles so each save is one atomic keyed write.
    write_lock: Mutex<()>,
}

/// Drop repeated codes, keeping first occurrences in order.
fn distinct(codes: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(codes.len());
    for code in codes {
        if !out.contains(code) {
            out.push(code.clone());
        }
    }
    out
}

impl LocationLedger {
    /// Open (and if needed create or upgrade) the ledger at `path`.
    pub async fn open(path: PathBuf, mode: LedgerMode) -> Result<Self, LedgerError> {
        let existing = Self::read_file(&path).await?;
        let mut file = match existing {
            Some(file) if file.schema_version > LEDGER_SCHEMA_VERSION => {
                return Err(LedgerError::IncompatibleVersion {
                    found: file.schema_version,
                    supported: LEDGER_SCHEMA_VERSION,
                });
            }
            Some(file) => file,
            None => LedgerFile::default(),
        };

        let needs_upgrade = file.schema_version < LEDGER_SCHEMA_VERSION
            || !file.collections.contains_key(LOCATIONS_COLLECTION);
        if needs_upgrade {
            file.schema_version = LEDGER_SCHEMA_VERSION;
            if !file.collections.contains_key(LOCATIONS_COLLECTION) {
                file.collections
                    .insert(LOCATIONS_COLLECTION.to_string(), Collection::new());
                info!(collection = LOCATIONS_COLLECTION, "Created ledger collection");
            }
            Self::write_file(&path, &file).await?;
        }

        debug!(path = %path.display(), ?mode, "Location ledger open");
        Ok(Self {
            path,
            mode,
            write_lock: Mutex::new(()),
        })
    }

    pub fn mode(&self) -> LedgerMode {
        self.mode
    }

    /// Persist a selection and return the key it was stored under.
    pub async fn save(&self, codes: &[String]) -> Result<u64, LedgerError> {
        let _guard = self.write_lock.lock().await;
        let mut file = Self::read_file(&self.path).await?.unwrap_or_default();
        file.schema_version = LEDGER_SCHEMA_VERSION;
        let collection = file
            .collections
            .entry(LOCATIONS_COLLECTION.to_string())
            .or_insert_with(Collection::new);

        let key = match self.mode {
            LedgerMode::Append => collection.next_key.max(CANONICAL_KEY),
            LedgerMode::Upsert => CANONICAL_KEY,
        };
        collection.records.insert(
            key,
            SelectionRecord {
                codes: distinct(codes),
                saved_at: Utc::now(),
            },
        );
        collection.next_key = collection.next_key.max(key + 1);

        Self::write_file(&self.path, &file).await?;
        debug!(key, count = codes.len(), "Saved location selection");
        Ok(key)
    }

    /// The canonical selection (record at key 1), if one was ever saved.
    pub async fn load(&self) -> Result<Option<Vec<String>>, LedgerError> {
        Ok(self
            .record(CANONICAL_KEY)
            .await?
            .map(|record| record.codes))
    }

    pub async fn record(&self, key: u64) -> Result<Option<SelectionRecord>, LedgerError> {
        let file = Self::read_file(&self.path).await?;
        Ok(file
            .and_then(|mut file| file.collections.remove(LOCATIONS_COLLECTION))
            .and_then(|mut collection| collection.records.remove(&key)))
    }

    pub async fn record_count(&self) -> Result<usize, LedgerError> {
        let file = Self::read_file(&self.path).await?;
        Ok(file
            .and_then(|file| file.collections.get(LOCATIONS_COLLECTION).map(|c| c.records.len()))
            .unwrap_or(0))
    }

    async fn read_file(path: &Path) -> Result<Option<LedgerFile>, LedgerError> {
        let contents = match fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LedgerError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|source| LedgerError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn write_file(path: &Path, file: &LedgerFile) -> Result<(), LedgerError> {
        let contents = serde_json::to_vec_pretty(file).map_err(|source| LedgerError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        write_atomic(path, &contents)
            .await
            .map_err(|source| LedgerError::Io {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn test_open_creates_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let ledger = LocationLedger::open(path.clone(), LedgerMode::Append).await.unwrap();

        assert!(path.exists());
        assert_eq!(ledger.load().await.unwrap(), None);
        assert_eq!(ledger.record_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_append_keeps_first_record_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LocationLedger::open(dir.path().join("ledger.json"), LedgerMode::Append)
            .await
            .unwrap();

        assert_eq!(ledger.save(&codes(&["EJ.1"])).await.unwrap(), 1);
        assert_eq!(ledger.save(&codes(&["EJ.2", "EJ.3"])).await.unwrap(), 2);

        assert_eq!(ledger.load().await.unwrap(), Some(codes(&["EJ.1"])));
        assert_eq!(ledger.record_count().await.unwrap(), 2);
        assert_eq!(
            ledger.record(2).await.unwrap().map(|r| r.codes),
            Some(codes(&["EJ.2", "EJ.3"]))
        );
    }

    #[tokio::test]
    async fn test_upsert_replaces_canonical_record() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LocationLedger::open(dir.path().join("ledger.json"), LedgerMode::Upsert)
            .await
            .unwrap();

        ledger.save(&codes(&["EJ.1"])).await.unwrap();
        assert_eq!(ledger.save(&codes(&["EJ.2"])).await.unwrap(), 1);

        assert_eq!(ledger.load().await.unwrap(), Some(codes(&["EJ.2"])));
        assert_eq!(ledger.record_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_selection_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        {
            let ledger = LocationLedger::open(path.clone(), LedgerMode::Append).await.unwrap();
            ledger.save(&codes(&["EJ.1", "EJ.1", "EJ.4"])).await.unwrap();
        }

        let reopened = LocationLedger::open(path, LedgerMode::Append).await.unwrap();
        assert_eq!(reopened.load().await.unwrap(), Some(codes(&["EJ.1", "EJ.4"])));
        assert_eq!(reopened.save(&codes(&["EJ.2"])).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_saves_do_not_lose_records() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LocationLedger::open(dir.path().join("ledger.json"), LedgerMode::Append)
            .await
            .unwrap();

        let selections: Vec<Vec<String>> = (0..8).map(|i| codes(&[&format!("EJ.{i}")])).collect();
        let mut keys = futures::future::try_join_all(selections.iter().map(|s| ledger.save(s)))
            .await
            .unwrap();

        keys.sort();
        assert_eq!(keys, (1..=8).collect::<Vec<u64>>());
        assert_eq!(ledger.record_count().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_newer_schema_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, r#"{"schema_version": 99, "collections": {}}"#).unwrap();

        let result = LocationLedger::open(path, LedgerMode::Append).await;
        assert!(matches!(
            result,
            Err(LedgerError::IncompatibleVersion { found: 99, .. })
        ));
    }

    #[tokio::test]
    async fn test_older_schema_is_upgraded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, r#"{"schema_version": 0}"#).unwrap();

        let ledger = LocationLedger::open(path, LedgerMode::Append).await.unwrap();
        assert_eq!(ledger.save(&codes(&["EJ.1"])).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "{not json").unwrap();

        let result = LocationLedger::open(path, LedgerMode::Append).await;
        assert!(matches!(result, Err(LedgerError::Corrupt { .. })));
    }
}
