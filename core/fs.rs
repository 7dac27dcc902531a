use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Unknown,
}

impl EntryKind {
    fn from_file_type(ft: std::fs::FileType) -> Self {
        if ft.is_symlink() {
            EntryKind::Symlink
        } else if ft.is_dir() {
            EntryKind::Directory
        } else if ft.is_file() {
            EntryKind::File
        } else {
            EntryKind::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub kind: EntryKind,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn stat(&self, path: &Path) -> Result<FileStat>;

    async fn read_directory(&self, path: &Path) -> Result<Vec<DirEntry>>;

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Creates the directory and any missing parents.
    async fn create_directory(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct TokioFileSystem;

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn stat(&self, path: &Path) -> Result<FileStat> {
        let meta = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|e| AppError::Stat {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(FileStat {
            kind: EntryKind::from_file_type(meta.file_type()),
            size: meta.len(),
        })
    }

    async fn read_directory(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let dir_err = |e: std::io::Error| AppError::DirRead {
            path: path.to_path_buf(),
            source: e,
        };
        let mut reader = tokio::fs::read_dir(path).await.map_err(dir_err)?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(dir_err)? {
            let kind = match entry.file_type().await {
                Ok(ft) => EntryKind::from_file_type(ft),
                Err(e) => {
                    log::debug!(
                        "Could not determine type of {}: {}",
                        entry.path().display(),
                        e
                    );
                    EntryKind::Unknown
                }
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        Ok(entries)
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|e| AppError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| AppError::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })
    }

    async fn create_directory(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| AppError::DirCreation {
                path: path.to_path_buf(),
                source: e,
            })
    }
}

/// Builds a `file://` URI for an absolute path.
pub fn file_uri(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut out = String::with_capacity(raw.len() + 8);
    out.push_str("file://");
    if !raw.starts_with('/') {
        out.push('/');
    }
    for ch in raw.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            _ => out.push(ch),
        }
    }
    out
}

/// Inverse of [`file_uri`]. Returns `None` for anything that isn't a `file://` URI.
pub fn path_from_uri(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    let mut bytes = Vec::with_capacity(rest.len());
    let mut raw = rest.bytes();
    while let Some(b) = raw.next() {
        if b == b'%' {
            let hi = raw.next()?;
            let lo = raw.next()?;
            let hex = [hi, lo];
            let hex = std::str::from_utf8(&hex).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
        } else {
            bytes.push(b);
        }
    }
    let mut decoded = String::from_utf8(bytes).ok()?;
    // Windows drive paths come out as "/C:/..."
    if cfg!(windows) && decoded.len() > 2 && decoded.as_bytes()[2] == b':' {
        decoded.remove(0);
    }
    Some(PathBuf::from(decoded))
}
