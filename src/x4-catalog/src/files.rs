//! File system utilities for common traversal patterns

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Walk files in a directory tree, filtering by extension
///
/// Entries are visited in file-name order so repeated runs enumerate the
/// same tree identically. Extension should not include the dot.
pub fn walk_files_with_extension<F>(path: &Path, extensions: &[&str], mut handler: F)
where
    F: FnMut(&Path),
{
    for entry in WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let file_path = entry.path();

        let matches = file_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);

        if matches {
            handler(file_path);
        }
    }
}

/// Collect macro documents (`**/macros/*.xml`) below a structures directory
pub fn collect_macro_files(path: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if !path.is_dir() {
        return files;
    }

    walk_files_with_extension(path, &["xml"], |file_path| {
        let in_macros_dir = file_path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n == "macros")
            .unwrap_or(false);
        if in_macros_dir {
            files.push(file_path.to_path_buf());
        }
    });

    files
}

/// File name without extension, used as the entity id of a macro document
pub fn entity_id(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}
