use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;

use crate::error::CatalogError;

pub fn parent_dir(path: &Utf8Path) -> &Utf8Path {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    }
}

pub fn ensure_dir(dir: &Utf8Path) -> Result<(), CatalogError> {
    fs::create_dir_all(dir.as_std_path())
        .map_err(|err| CatalogError::Filesystem(format!("create {dir}: {err}")))
}

/// Creates a temporary file in the same directory as `path`, so that
/// persisting it is a rename on one filesystem.
pub fn temp_file_beside(path: &Utf8Path) -> Result<NamedTempFile, CatalogError> {
    let parent = parent_dir(path);
    ensure_dir(parent)?;
    tempfile::Builder::new()
        .prefix(".hero-catalog")
        .suffix(".part")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CatalogError::Filesystem(format!("temp file in {parent}: {err}")))
}

pub fn persist(temp: NamedTempFile, dest: &Utf8Path) -> Result<(), CatalogError> {
    temp.persist(dest.as_std_path())
        .map_err(|err| CatalogError::Filesystem(format!("persist {dest}: {}", err.error)))?;
    Ok(())
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CatalogError> {
    let mut temp = temp_file_beside(path)?;
    temp.write_all(content)
        .and_then(|_| temp.flush())
        .map_err(|err| CatalogError::Filesystem(format!("write {path}: {err}")))?;
    persist(temp, path)
}

/// Regular files directly inside `dir`, sorted by name.
pub fn list_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, CatalogError> {
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| CatalogError::Filesystem(format!("read dir {dir}: {err}")))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(entry.path()).map_err(|path| {
            CatalogError::Filesystem(format!("non-utf8 path {}", path.display()))
        })?;
        if path.as_std_path().is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
