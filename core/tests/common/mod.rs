#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use xbundle_core::{AppError, DirEntry, EntryKind, FileStat, FileSystem, Result};

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
    Symlink,
}

/// In-memory filesystem with per-path failure injection.
///
/// `read_directory` deliberately lists children in reverse name order so tests notice
/// when callers rely on the listing order.
#[derive(Debug, Default)]
pub struct FakeFileSystem {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
    failing_stats: HashSet<PathBuf>,
    failing_dirs: HashSet<PathBuf>,
    failing_reads: HashSet<PathBuf>,
    root: PathBuf,
}

impl FakeFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut nodes = BTreeMap::new();
        nodes.insert(root.clone(), Node::Dir);
        Self {
            nodes: Mutex::new(nodes),
            root,
            ..Self::default()
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn insert(self, rel: &str, node: Node) -> Self {
        {
            let mut nodes = self.nodes.lock().unwrap();
            let path = self.root.join(rel);
            let mut parent = path.parent();
            while let Some(p) = parent {
                if p == self.root || !p.starts_with(&self.root) {
                    break;
                }
                nodes.entry(p.to_path_buf()).or_insert(Node::Dir);
                parent = p.parent();
            }
            nodes.insert(path, node);
        }
        self
    }

    pub fn file(self, rel: &str, content: impl AsRef<[u8]>) -> Self {
        let bytes = content.as_ref().to_vec();
        self.insert(rel, Node::File(bytes))
    }

    pub fn dir(self, rel: &str) -> Self {
        self.insert(rel, Node::Dir)
    }

    pub fn symlink(self, rel: &str) -> Self {
        self.insert(rel, Node::Symlink)
    }

    pub fn fail_stat(mut self, rel: &str) -> Self {
        self.failing_stats.insert(self.root.join(rel));
        self
    }

    pub fn fail_dir(mut self, rel: &str) -> Self {
        self.failing_dirs.insert(self.root.join(rel));
        self
    }

    pub fn fail_read(mut self, rel: &str) -> Self {
        self.failing_reads.insert(self.root.join(rel));
        self
    }

    pub fn uri(&self, rel: &str) -> String {
        xbundle_core::file_uri(&self.root.join(rel))
    }
}

fn denied() -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, "injected failure")
}

fn kind_of(node: &Node) -> EntryKind {
    match node {
        Node::File(_) => EntryKind::File,
        Node::Dir => EntryKind::Directory,
        Node::Symlink => EntryKind::Symlink,
    }
}

#[async_trait]
impl FileSystem for FakeFileSystem {
    async fn stat(&self, path: &Path) -> Result<FileStat> {
        if self.failing_stats.contains(path) {
            return Err(AppError::Stat {
                path: path.to_path_buf(),
                source: denied(),
            });
        }
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(node) => Ok(FileStat {
                kind: kind_of(node),
                size: match node {
                    Node::File(bytes) => bytes.len() as u64,
                    _ => 0,
                },
            }),
            None => Err(AppError::Stat {
                path: path.to_path_buf(),
                source: io::Error::from(io::ErrorKind::NotFound),
            }),
        }
    }

    async fn read_directory(&self, path: &Path) -> Result<Vec<DirEntry>> {
        if self.failing_dirs.contains(path) {
            return Err(AppError::DirRead {
                path: path.to_path_buf(),
                source: denied(),
            });
        }
        let nodes = self.nodes.lock().unwrap();
        let mut children: Vec<DirEntry> = nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(path))
            .map(|(p, node)| DirEntry {
                name: p.file_name().unwrap().to_string_lossy().into_owned(),
                kind: kind_of(node),
            })
            .collect();
        children.reverse();
        Ok(children)
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        if self.failing_reads.contains(path) {
            return Err(AppError::FileRead {
                path: path.to_path_buf(),
                source: denied(),
            });
        }
        match self.nodes.lock().unwrap().get(path) {
            Some(Node::File(bytes)) => Ok(bytes.clone()),
            _ => Err(AppError::FileRead {
                path: path.to_path_buf(),
                source: io::Error::from(io::ErrorKind::NotFound),
            }),
        }
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.nodes
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Node::File(contents.to_vec()));
        Ok(())
    }

    async fn create_directory(&self, path: &Path) -> Result<()> {
        self.nodes
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_insert(Node::Dir);
        Ok(())
    }
}
