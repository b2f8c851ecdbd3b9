//! Content directory enumeration.
//!
//! A content directory is listed lazily and non-recursively: each regular file becomes
//! one upload, subdirectories are ignored. Listing order is whatever the filesystem
//! returns.

use std::fs::{self, ReadDir};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Failed to read content directory {path}: {source}")]
    Directory { path: PathBuf, source: io::Error },

    #[error("Failed to read content file {path}: {source}")]
    File { path: PathBuf, source: io::Error },

    #[error("Content file name is not valid UTF-8: {0:?}")]
    InvalidName(PathBuf),
}

/// Media type for a file extension, or `None` when the extension is not recognized.
pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "xml" => "text/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/vnd.microsoft.icon",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => return None,
    };
    Some(mime)
}

/// One file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    /// File name, used as the object key.
    pub file_name: String,
    pub path: PathBuf,
    pub content_type: Option<&'static str>,
}

impl ContentEntry {
    /// Hex SHA-256 of the file body, streamed from disk.
    pub fn digest(&self) -> Result<String, ContentError> {
        let file_err = |source| ContentError::File {
            path: self.path.clone(),
            source,
        };
        let mut file = fs::File::open(&self.path).map_err(file_err)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = file.read(&mut buf).map_err(file_err)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Lazy iterator over the regular files of a directory.
#[derive(Debug)]
pub struct ContentEntries {
    dir: PathBuf,
    inner: ReadDir,
}

impl Iterator for ContentEntries {
    type Item = Result<ContentEntry, ContentError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(source) => {
                    return Some(Err(ContentError::Directory {
                        path: self.dir.clone(),
                        source,
                    }))
                }
            };
            let path = entry.path();
            // Follows symlinks, so a link to a file counts as a file.
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => continue,
                Err(source) => return Some(Err(ContentError::File { path, source })),
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
                return Some(Err(ContentError::InvalidName(path)));
            };
            let content_type = mime_type_for(&path);
            return Some(Ok(ContentEntry {
                file_name,
                path,
                content_type,
            }));
        }
    }
}

/// List the files directly inside `dir`.
pub fn enumerate(dir: &Path) -> Result<ContentEntries, ContentError> {
    let inner = fs::read_dir(dir).map_err(|source| ContentError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(ContentEntries {
        dir: dir.to_path_buf(),
        inner,
    })
}
