//! Decision Cache: document filename to relevance decision, mirrored to a JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use tenderflow_shared::{DecisionRecord, Result, TenderflowError};

/// Durable relevance decisions keyed by document filename.
///
/// Every [`put`](Self::put) rewrites the backing file before returning, so a
/// crash loses at most the decision being recorded.
#[derive(Debug)]
pub struct DecisionCache {
    path: PathBuf,
    entries: BTreeMap<String, DecisionRecord>,
}

impl DecisionCache {
    /// Load the cache at `path`.
    ///
    /// A missing file yields an empty cache. An unreadable or malformed file is
    /// logged as a warning and also yields an empty cache; it is replaced on the
    /// next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "decision cache is malformed, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "decision cache unreadable, starting empty");
                BTreeMap::new()
            }
        };
        info!(path = %path.display(), entries = entries.len(), "decision cache loaded");
        Self { path, entries }
    }

    pub fn get(&self, key: &str) -> Option<&DecisionRecord> {
        self.entries.get(key)
    }

    /// Record a decision and flush the whole cache to disk.
    pub fn put(&mut self, key: impl Into<String>, record: DecisionRecord) -> Result<()> {
        let key = key.into();
        debug!(key = %key, passes = record.passes_filter, "caching decision");
        self.entries.insert(key, record);
        self.flush()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TenderflowError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| TenderflowError::Storage(format!("failed to encode decision cache: {e}")))?;

        // Write-then-rename keeps the previous file intact if we die mid-write.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| TenderflowError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| TenderflowError::io(&self.path, e))?;
        Ok(())
    }
}
