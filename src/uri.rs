//! `file://` URI helpers.
//!
//! Tracks, albums and collection roots are identified by URI strings in the
//! database. Only the `file` scheme is walkable; other schemes are treated as
//! non-existent by the filesystem helpers.

use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{Error, Result};

/// Turn a configured root or CLI argument into a URI string.
///
/// Accepts URIs as-is and converts plain (possibly relative) paths to
/// `file://` URIs.
pub fn normalize(input: &str) -> Result<String> {
    // Windows drive letters parse as one-letter schemes, so require more.
    if let Ok(url) = Url::parse(input)
        && url.scheme().len() > 1
    {
        return Ok(url.to_string());
    }
    let path = std::path::absolute(input).map_err(|_| Error::invalid_uri(input))?;
    from_path(&path)
}

/// Convert an absolute path to a `file://` URI.
pub fn from_path(path: &Path) -> Result<String> {
    Url::from_file_path(path)
        .map(|url| url.to_string())
        .map_err(|_| Error::invalid_uri(path.display().to_string()))
}

/// Convert a `file://` URI to a local path.
pub fn to_path(uri: &str) -> Result<PathBuf> {
    let url = Url::parse(uri).map_err(|_| Error::invalid_uri(uri))?;
    if url.scheme() != "file" {
        return Err(Error::invalid_uri(uri));
    }
    url.to_file_path().map_err(|_| Error::invalid_uri(uri))
}

/// True if the URI points to an existing local file or directory.
pub fn exists(uri: &str) -> bool {
    to_path(uri).map(|p| p.exists()).unwrap_or(false)
}

/// Last path segment, percent-decoded.
pub fn basename(uri: &str) -> String {
    match to_path(uri) {
        Ok(path) => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        Err(_) => uri
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

/// URI of the directory containing `uri`.
pub fn parent(uri: &str) -> Option<String> {
    let path = to_path(uri).ok()?;
    from_path(path.parent()?).ok()
}

/// True if `uri` lies inside (or is) `root`, compared component-wise.
pub fn is_under(uri: &str, root: &str) -> bool {
    match (to_path(uri), to_path(root)) {
        (Ok(path), Ok(root)) => path.starts_with(root),
        _ => {
            let root = root.trim_end_matches('/');
            uri == root || uri.starts_with(&format!("{root}/"))
        }
    }
}
