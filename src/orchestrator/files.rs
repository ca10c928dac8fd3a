//! Target collection for directory runs.

use globset::GlobSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::context::relative_path;
use crate::error::LintError;

/// Directories never worth descending into.
const SKIPPED_DIRS: &[&str] = &["node_modules", "__pycache__", "venv"];

/// Collect files under `dir` in lexical order.
///
/// Hidden and vendored directories are skipped, as is anything matching an
/// `exclude` glob (matched against the project-root relative path). The
/// language of each file is not checked here.
pub fn collect_files(
    project_root: &Path,
    dir: &Path,
    recursive: bool,
    exclude: &GlobSet,
) -> Result<Vec<PathBuf>, LintError> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    let walker = WalkDir::new(dir)
        .follow_links(false)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            if e.file_type().is_dir() && (name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())) {
                return false;
            }
            !exclude.is_match(relative_path(project_root, e.path()))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
            Err(e) => {
                return Err(LintError::Walk {
                    path: dir.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}
