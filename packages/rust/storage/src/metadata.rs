//! Per-document metadata files (`<base>_metadata.json`) under a flat root.

use std::path::{Path, PathBuf};

use tracing::debug;

use tenderflow_shared::{MetadataRecord, Result, TenderflowError};

pub(crate) const METADATA_SUFFIX: &str = "_metadata.json";

/// Writes and reads [`MetadataRecord`]s.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, base_name: &str) -> PathBuf {
        self.root.join(format!("{base_name}{METADATA_SUFFIX}"))
    }

    /// Write (or overwrite) the record for `base_name`; returns the file path.
    pub fn write(&self, base_name: &str, record: &MetadataRecord) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.root).map_err(|e| TenderflowError::io(&self.root, e))?;
        let path = self.path_for(base_name);
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| TenderflowError::Storage(format!("failed to encode metadata: {e}")))?;
        std::fs::write(&path, json).map_err(|e| TenderflowError::io(&path, e))?;
        debug!(path = %path.display(), forms = record.total_forms, "metadata written");
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<MetadataRecord> {
        let raw = std::fs::read_to_string(path).map_err(|e| TenderflowError::io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| {
            TenderflowError::parse(format!("invalid metadata file {}: {e}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenderflow_shared::{DeadlineInfo, FormDetection};

    fn record(forms: usize) -> MetadataRecord {
        let forms: Vec<FormDetection> = (0..forms)
            .map(|i| FormDetection::whole_document(&format!("doc{i}"), 3))
            .collect();
        MetadataRecord {
            pdf_name: "GeM-Bid-7.pdf".into(),
            total_forms: forms.len(),
            forms,
            deadline_info: DeadlineInfo::not_found(),
        }
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("metadata"));
        let path = store.write("GeM-Bid-7", &record(2)).unwrap();

        assert_eq!(path.file_name().unwrap(), "GeM-Bid-7_metadata.json");
        assert_eq!(MetadataStore::read(&path).unwrap(), record(2));
    }

    #[test]
    fn rewrite_overwrites_without_merging() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path());
        store.write("a", &record(3)).unwrap();
        let path = store.write("a", &record(1)).unwrap();

        let back = MetadataStore::read(&path).unwrap();
        assert_eq!(back.total_forms, 1);
        assert_eq!(back.forms.len(), 1);
    }
}
