//! Document identifier to local path resolution.

use std::path::{Path, PathBuf};

use url::Url;

#[derive(Debug, thiserror::Error)]
#[error("cannot convert path to file URI: {}", path.display())]
pub struct PathToUriError {
    path: PathBuf,
}

/// Resolve a document URI to a local path.
///
/// Only `file:` URIs resolve; everything else (untitled buffers, remote
/// schemes) yields `None` and is ignored downstream.
#[must_use]
pub fn resolve_local_path(uri: &Url) -> Option<PathBuf> {
    if uri.scheme() != "file" {
        return None;
    }
    uri.to_file_path().ok()
}

/// The directory a document belongs to; the unit of session sharing.
#[must_use]
pub fn containing_directory(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => path.to_path_buf(),
    }
}

/// Dependency roots for `directory`: `<ancestor>/<dir_name>` for the
/// directory itself and every ancestor, nearest first.
#[must_use]
pub fn search_roots(directory: &Path, dir_name: &str) -> Vec<PathBuf> {
    directory
        .ancestors()
        .filter(|ancestor| !ancestor.as_os_str().is_empty())
        .map(|ancestor| ancestor.join(dir_name))
        .collect()
}

pub fn path_to_file_uri(path: &Path) -> Result<Url, PathToUriError> {
    Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}
