#![forbid(unsafe_code)]

use super::StoreError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub(crate) fn read_text(path: &Path) -> Result<String, StoreError> {
    std::fs::read_to_string(path).map_err(StoreError::io(path))
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    std::fs::create_dir_all(dir).map_err(StoreError::io(dir))
}

/// Writes `contents` next to `path` and renames it into place.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    ensure_dir(dir)?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = dir.join(tmp_name);
    std::fs::write(&tmp, contents).map_err(StoreError::io(&tmp))?;
    std::fs::rename(&tmp, path).map_err(StoreError::io(path))?;
    Ok(())
}

/// Files under `dir` with extension `ext`, sorted by path.
///
/// Top-level directories named in `skip` are not descended into. A missing
/// `dir` yields an empty list.
pub(crate) fn collect_files(
    dir: &Path,
    ext: &str,
    skip: &[&str],
) -> Result<Vec<PathBuf>, StoreError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.depth() == 1
                && entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| skip.contains(&name)))
        });
    for entry in walker {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(dir).to_path_buf();
            let source = err
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            StoreError::Io { path, source }
        })?;
        let path = entry.path();
        if entry.file_type().is_file()
            && path.extension().and_then(|value| value.to_str()) == Some(ext)
        {
            out.push(path.to_path_buf());
        }
    }
    Ok(out)
}
