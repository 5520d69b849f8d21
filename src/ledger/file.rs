use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::{NotificationLedger, NotifiedSet};
use crate::error::{LedgerReadError, LedgerWriteError};

pub const DEFAULT_LEDGER_PATH: &str = "state/notified_ids.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LedgerRecord {
    notified_ids: NotifiedSet,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Ledger kept as a single JSON document on disk.
#[derive(Debug, Clone)]
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl NotificationLedger for FileLedger {
    async fn already_notified_ids(&self) -> Result<NotifiedSet, LedgerReadError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.location(), "ledger record absent; starting empty");
                return Ok(NotifiedSet::empty());
            }
            Err(source) => {
                return Err(LedgerReadError::Io {
                    location: self.location(),
                    source,
                })
            }
        };

        let record: LedgerRecord =
            serde_json::from_str(&raw).map_err(|source| LedgerReadError::Corrupt {
                location: self.location(),
                source,
            })?;
        Ok(record.notified_ids)
    }

    async fn commit_notified_ids(&self, full: &NotifiedSet) -> Result<(), LedgerWriteError> {
        let io_err = |source| LedgerWriteError::Io {
            location: self.location(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.map_err(io_err)?;
        }

        let record = LedgerRecord {
            notified_ids: full.clone(),
            updated_at: Some(Utc::now()),
        };
        let bytes = serde_json::to_vec_pretty(&record)?;

        // write-then-rename so a crash never leaves a half-written record
        let tmp = self.tmp_path();
        fs::write(&tmp, bytes).await.map_err(io_err)?;
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;

        tracing::debug!(path = %self.location(), ids = full.len(), "ledger committed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmp_path_sits_next_to_record() {
        let l = FileLedger::new("state/notified_ids.json");
        assert_eq!(l.tmp_path(), PathBuf::from("state/notified_ids.json.tmp"));
    }

    #[test]
    fn record_uses_camel_case() {
        let rec = LedgerRecord {
            notified_ids: [4, 2].into_iter().collect(),
            updated_at: None,
        };
        let s = serde_json::to_string(&rec).unwrap();
        assert!(s.contains("\"notifiedIds\":[2,4]"), "{s}");
    }
}
