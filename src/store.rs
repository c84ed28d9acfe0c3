//! Ledger snapshot persistence.
//!
//! The whole ledger is one JSON document, rewritten after every committed tick
//! via write-to-temp, fsync, rename.

use crate::domain::AccountLabel;
use crate::engine::AccountLedgerState;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Full persisted state: every account plus the last period boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSnapshot {
    /// Local date of the last scheduled period close.
    pub last_period_close: Option<NaiveDate>,
    pub accounts: BTreeMap<AccountLabel, AccountLedgerState>,
}

impl LedgerSnapshot {
    /// Ledger for `account`, created empty on first observation.
    pub fn account_mut(&mut self, account: &AccountLabel) -> &mut AccountLedgerState {
        self.accounts.entry(account.clone()).or_default()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt ledger snapshot {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// JSON file store for [`LedgerSnapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn io_err(&self, path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
        let path = path.to_path_buf();
        move |source| StoreError::Io { path, source }
    }

    /// Load the snapshot; a missing file is an empty ledger, a corrupt one is an error.
    pub async fn load(&self) -> Result<LedgerSnapshot, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no ledger snapshot, starting empty");
                return Ok(LedgerSnapshot::default());
            }
            Err(e) => return Err(self.io_err(&self.path)(e)),
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Atomically replace the snapshot on disk.
    pub async fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(snapshot).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(self.io_err(parent))?;
        }

        let temp_path = self.temp_path();
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(self.io_err(&temp_path))?;
        file.write_all(&json)
            .await
            .map_err(self.io_err(&temp_path))?;
        file.sync_all().await.map_err(self.io_err(&temp_path))?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(self.io_err(&self.path))?;
        Ok(())
    }
}
