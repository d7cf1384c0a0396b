//! Directory walking over the output trees.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Every file below `root` whose extension matches `ext` (case-insensitive), sorted.
///
/// A missing root and unreadable entries yield nothing.
pub fn files_with_extension(root: &Path, ext: &str) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ext))
        })
        .collect();
    found.sort();
    found
}
