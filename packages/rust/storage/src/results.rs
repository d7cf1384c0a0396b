//! Result listing and per-tender archives, read from the pipeline's output roots.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use tenderflow_shared::{Result, TenderflowError};

use crate::files::files_with_extension;
use crate::metadata::{METADATA_SUFFIX, MetadataStore};

/// One row of the results view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultEntry {
    pub tender_id: String,
    pub tender_name: String,
    pub description: String,
    pub last_date: String,
    pub forms_count: usize,
}

/// Build the results view from every `*_metadata.json` under `metadata_root`.
///
/// Unreadable files are skipped with a warning; a missing root is an empty list.
pub fn list_results(metadata_root: &Path) -> Result<Vec<ResultEntry>> {
    let dir = match std::fs::read_dir(metadata_root) {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(TenderflowError::io(metadata_root, e)),
    };

    let mut results = Vec::new();
    for entry in dir {
        let path = entry.map_err(|e| TenderflowError::io(metadata_root, e))?.path();
        let Some(tender_id) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(METADATA_SUFFIX))
            .map(str::to_string)
        else {
            continue;
        };

        let record = match MetadataStore::read(&path) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable metadata");
                continue;
            }
        };

        let description = record
            .forms
            .first()
            .map(|f| f.form_title.clone())
            .unwrap_or_else(|| "No forms found".to_string());
        let deadline = record.deadline_info;
        let last_date = deadline
            .deadline_date
            .filter(|d| deadline.deadline_found && !d.is_empty())
            .unwrap_or_else(|| "Not specified".to_string());

        results.push(ResultEntry {
            tender_id,
            tender_name: record.pdf_name,
            description,
            last_date,
            forms_count: record.total_forms,
        });
    }

    results.sort_by(|a, b| a.tender_id.cmp(&b.tender_id));
    Ok(results)
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

/// Zip a tender's extracted PDFs (`PDFs/`) and converted documents (`DOCX/`)
/// into `dest_dir/<tender>_forms.zip`.
pub fn archive_tender(
    extracted_root: &Path,
    docx_root: &Path,
    tender: &str,
    dest_dir: &Path,
) -> Result<PathBuf> {
    if tender.is_empty() || tender.contains("..") || tender.contains(['/', '\\']) {
        return Err(TenderflowError::validation(format!(
            "invalid tender name: {tender:?}"
        )));
    }
    let extracted = extracted_root.join(tender);
    if !extracted.is_dir() {
        return Err(TenderflowError::validation(format!("tender not found: {tender}")));
    }

    std::fs::create_dir_all(dest_dir).map_err(|e| TenderflowError::io(dest_dir, e))?;
    let safe: String = tender.chars().take(100).collect();
    let dest = dest_dir.join(format!("{safe}_forms.zip"));

    let file = File::create(&dest).map_err(|e| TenderflowError::io(&dest, e))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let converted = docx_root.join(tender);
    let mut files = 0;
    for (root, folder, ext) in [(&extracted, "PDFs", "pdf"), (&converted, "DOCX", "docx")] {
        for path in files_with_extension(root, ext) {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            let name = format!("{folder}/{}", rel.to_string_lossy().replace('\\', "/"));
            let bytes = std::fs::read(&path).map_err(|e| TenderflowError::io(&path, e))?;
            zip.start_file(name.as_str(), options)
                .map_err(|e| TenderflowError::Storage(format!("zip entry {name}: {e}")))?;
            zip.write_all(&bytes).map_err(|e| TenderflowError::io(&dest, e))?;
            files += 1;
        }
    }
    zip.finish()
        .map_err(|e| TenderflowError::Storage(format!("zip finalize: {e}")))?;

    info!(tender, files, archive = %dest.display(), "tender archived");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenderflow_shared::{DeadlineInfo, FormDetection, MetadataRecord};

    fn write_metadata(store: &MetadataStore, base: &str, forms: Vec<FormDetection>, deadline: DeadlineInfo) {
        store
            .write(
                base,
                &MetadataRecord {
                    pdf_name: format!("{base}.pdf"),
                    total_forms: forms.len(),
                    forms,
                    deadline_info: deadline,
                },
            )
            .unwrap();
    }

    #[test]
    fn lists_entries_sorted_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path());

        write_metadata(
            &store,
            "b-tender",
            vec![FormDetection {
                form_title: "ANNEXURE-I".into(),
                start_page: 2,
                end_page: 3,
                confidence: Default::default(),
            }],
            DeadlineInfo {
                deadline_found: true,
                deadline_date: Some("30-11-2026".into()),
                ..DeadlineInfo::default()
            },
        );
        write_metadata(&store, "a-tender", Vec::new(), DeadlineInfo::not_found());
        std::fs::write(dir.path().join("broken_metadata.json"), "nope").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let results = list_results(dir.path()).unwrap();
        assert_eq!(results.len(), 2);

        assert_eq!(results[0].tender_id, "a-tender");
        assert_eq!(results[0].description, "No forms found");
        assert_eq!(results[0].last_date, "Not specified");
        assert_eq!(results[0].forms_count, 0);

        assert_eq!(results[1].tender_name, "b-tender.pdf");
        assert_eq!(results[1].description, "ANNEXURE-I");
        assert_eq!(results[1].last_date, "30-11-2026");
        assert_eq!(results[1].forms_count, 1);
    }

    #[test]
    fn missing_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_results(&dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn archive_collects_pdfs_and_docx() {
        let dir = tempfile::tempdir().unwrap();
        let extracted = dir.path().join("extracted");
        let docx = dir.path().join("docx");
        std::fs::create_dir_all(extracted.join("T-1")).unwrap();
        std::fs::create_dir_all(docx.join("T-1")).unwrap();
        std::fs::write(extracted.join("T-1/FORM1_Bid.pdf"), b"%PDF").unwrap();
        std::fs::write(extracted.join("T-1/readme.txt"), b"skip").unwrap();
        std::fs::write(docx.join("T-1/FORM1_Bid.docx"), b"PK").unwrap();

        let zip_path = archive_tender(&extracted, &docx, "T-1", &dir.path().join("out")).unwrap();
        assert_eq!(zip_path.file_name().unwrap(), "T-1_forms.zip");

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["DOCX/FORM1_Bid.docx", "PDFs/FORM1_Bid.pdf"]);
    }

    #[test]
    fn archive_of_unknown_tender_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = archive_tender(dir.path(), dir.path(), "nope", dir.path()).unwrap_err();
        assert!(matches!(err, TenderflowError::Validation { .. }));
        assert!(archive_tender(dir.path(), dir.path(), "../etc", dir.path()).is_err());
    }
}
