use crate::config::ScanConfig;
use crate::error::{AppError, Result};
use crate::fs::{EntryKind, FileSystem, file_uri};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// URIs the user has checked. May name files and directories.
pub type CheckedSet = HashSet<String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemEntry {
    pub uri: String,
    pub is_file: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub name: String,
    // `/`-separated, relative to the scan root.
    pub relative_path: String,
}

impl FileSystemEntry {
    pub fn depth(&self) -> usize {
        self.relative_path.split('/').count()
    }

    pub fn parent_relative_path(&self) -> Option<&str> {
        self.relative_path.rsplit_once('/').map(|(parent, _)| parent)
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.name).extension().and_then(|e| e.to_str())
    }
}

/// Hands out scan tickets; starting a scan obsoletes every ticket issued before it.
#[derive(Debug, Clone, Default)]
pub struct ScanCoordinator {
    generation: Arc<AtomicU64>,
}

impl ScanCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> ScanTicket {
        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        log::trace!("Issued scan ticket #{}", id);
        ScanTicket {
            id,
            generation: Some(Arc::clone(&self.generation)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanTicket {
    id: u64,
    generation: Option<Arc<AtomicU64>>,
    cancelled: Arc<AtomicBool>,
}

impl ScanTicket {
    pub fn detached() -> Self {
        Self {
            id: 0,
            generation: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_current(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        self.generation
            .as_ref()
            .is_none_or(|g| g.load(Ordering::SeqCst) == self.id)
    }

    fn check(&self) -> Result<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(AppError::ScanSuperseded { ticket: self.id })
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntryCatalog {
    root: PathBuf,
    root_name: String,
    entries: IndexMap<String, FileSystemEntry>,
    by_relative_path: HashMap<String, String>,
    warnings: Vec<String>,
}

struct Pending {
    path: PathBuf,
    relative_path: String,
    depth: usize,
}

impl EntryCatalog {
    pub async fn scan(
        root: &Path,
        fs: &dyn FileSystem,
        options: &ScanConfig,
        ticket: &ScanTicket,
    ) -> Result<Self> {
        log::info!("Scanning directory: {}", root.display());
        ticket.check()?;
        let root_stat = fs.stat(root).await?;
        if root_stat.kind != EntryKind::Directory {
            return Err(AppError::InvalidArgument(format!(
                "Scan root '{}' is not a directory",
                root.display()
            )));
        }

        let mut catalog = Self::empty(root);
        // Children are pushed in reverse so they pop in name order: depth-first pre-order.
        let mut stack = vec![Pending {
            path: root.to_path_buf(),
            relative_path: String::new(),
            depth: 0,
        }];

        while let Some(dir) = stack.pop() {
            ticket.check()?;
            let mut children = match fs.read_directory(&dir.path).await {
                Ok(children) => children,
                Err(e) => {
                    log::warn!("Skipping unreadable directory {}: {}", dir.path.display(), e);
                    catalog.warnings.push(e.to_string());
                    continue;
                }
            };
            children.sort_by(|a, b| a.name.cmp(&b.name));

            let mut subdirs = Vec::new();
            for child in children {
                if options.skip_names.iter().any(|s| s == &child.name) {
                    log::trace!("Skipping built-in ignored name: {}", child.name);
                    continue;
                }
                let path = dir.path.join(&child.name);
                let relative_path = if dir.relative_path.is_empty() {
                    child.name.clone()
                } else {
                    format!("{}/{}", dir.relative_path, child.name)
                };
                let depth = dir.depth + 1;

                let (is_file, size) = match child.kind {
                    EntryKind::Directory => (false, None),
                    EntryKind::Symlink => (true, None),
                    EntryKind::File => {
                        ticket.check()?;
                        match fs.stat(&path).await {
                            Ok(stat) => (true, Some(stat.size)),
                            Err(e) => {
                                log::warn!("Skipping entry {}: {}", path.display(), e);
                                catalog.warnings.push(e.to_string());
                                continue;
                            }
                        }
                    }
                    EntryKind::Unknown => {
                        log::trace!("Skipping entry of unknown type: {}", path.display());
                        continue;
                    }
                };

                catalog.insert(FileSystemEntry {
                    uri: file_uri(&path),
                    is_file,
                    size,
                    name: child.name,
                    relative_path: relative_path.clone(),
                });

                let may_descend = options.max_depth.is_none_or(|max| depth < max);
                if !is_file && may_descend {
                    subdirs.push(Pending {
                        path,
                        relative_path,
                        depth,
                    });
                }
            }
            while let Some(sub) = subdirs.pop() {
                stack.push(sub);
            }
        }

        log::info!(
            "Scan complete: {} entries ({} warnings)",
            catalog.len(),
            catalog.warnings.len()
        );
        Ok(catalog)
    }

    // Parents must precede their children and relative paths must be unique.
    pub fn from_entries(root: &Path, entries: Vec<FileSystemEntry>) -> Result<Self> {
        let mut catalog = Self::empty(root);
        for entry in entries {
            if catalog.by_relative_path.contains_key(&entry.relative_path) {
                return Err(AppError::InvalidArgument(format!(
                    "Duplicate relative path in catalog: {}",
                    entry.relative_path
                )));
            }
            if let Some(parent) = entry.parent_relative_path() {
                let parent_is_dir = catalog
                    .get_by_relative_path(parent)
                    .is_some_and(|p| !p.is_file);
                if !parent_is_dir {
                    return Err(AppError::InvalidArgument(format!(
                        "Entry '{}' has no parent directory '{}' in the catalog",
                        entry.relative_path, parent
                    )));
                }
            }
            catalog.insert(entry);
        }
        Ok(catalog)
    }

    fn empty(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            root_name: root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| root.to_string_lossy().into_owned()),
            entries: IndexMap::new(),
            by_relative_path: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    fn insert(&mut self, entry: FileSystemEntry) {
        log::trace!("Catalogued {}", entry.relative_path);
        self.by_relative_path
            .insert(entry.relative_path.clone(), entry.uri.clone());
        self.entries.insert(entry.uri.clone(), entry);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn get(&self, uri: &str) -> Option<&FileSystemEntry> {
        self.entries.get(uri)
    }

    pub fn get_by_relative_path(&self, relative_path: &str) -> Option<&FileSystemEntry> {
        let key = relative_path.trim_matches('/');
        self.by_relative_path
            .get(key)
            .and_then(|uri| self.entries.get(uri))
    }

    pub fn entries(&self) -> impl Iterator<Item = &FileSystemEntry> {
        self.entries.values()
    }

    pub fn files(&self) -> impl Iterator<Item = &FileSystemEntry> {
        self.entries.values().filter(|e| e.is_file)
    }

    pub fn uri_for(&self, relative_path: &str) -> String {
        file_uri(&self.absolute_path(relative_path))
    }

    pub fn absolute_path(&self, relative_path: &str) -> PathBuf {
        relative_path
            .split('/')
            .filter(|c| !c.is_empty())
            .fold(self.root.clone(), |acc, c| acc.join(c))
    }

    pub fn descendant_files(&self, uri: &str) -> Vec<&FileSystemEntry> {
        let Some(entry) = self.get(uri) else {
            return Vec::new();
        };
        if entry.is_file {
            return vec![entry];
        }
        self.files()
            .filter(|f| is_descendant_path(&entry.relative_path, &f.relative_path))
            .collect()
    }
}

pub fn is_descendant_path(ancestor: &str, candidate: &str) -> bool {
    candidate.len() > ancestor.len()
        && candidate.starts_with(ancestor)
        && candidate.as_bytes()[ancestor.len()] == b'/'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(root: &Path, rel: &str, is_file: bool) -> FileSystemEntry {
        FileSystemEntry {
            uri: file_uri(&root.join(rel)),
            is_file,
            size: is_file.then_some(1),
            name: rel.rsplit('/').next().unwrap().to_string(),
            relative_path: rel.to_string(),
        }
    }

    #[test]
    fn from_entries_rejects_orphans_and_duplicates() {
        let root = Path::new("/p");
        let orphan = EntryCatalog::from_entries(root, vec![entry(root, "src/lib.rs", true)]);
        assert!(matches!(orphan, Err(AppError::InvalidArgument(_))));

        let dup = EntryCatalog::from_entries(
            root,
            vec![entry(root, "a.txt", true), entry(root, "a.txt", true)],
        );
        assert!(matches!(dup, Err(AppError::InvalidArgument(_))));

        let under_file = EntryCatalog::from_entries(
            root,
            vec![entry(root, "a.txt", true), entry(root, "a.txt/b", true)],
        );
        assert!(under_file.is_err());
    }

    #[test]
    fn descendant_files_follow_catalog_order() {
        let root = Path::new("/p");
        let catalog = EntryCatalog::from_entries(
            root,
            vec![
                entry(root, "src", false),
                entry(root, "src/a.rs", true),
                entry(root, "src/util", false),
                entry(root, "src/util/b.rs", true),
                entry(root, "srcx.rs", true),
            ],
        )
        .unwrap();
        let src = catalog.uri_for("src");
        let names: Vec<&str> = catalog
            .descendant_files(&src)
            .into_iter()
            .map(|e| e.relative_path.as_str())
            .collect();
        assert_eq!(names, vec!["src/a.rs", "src/util/b.rs"]);
        assert_eq!(catalog.get_by_relative_path("src/util/").unwrap().name, "util");
        assert_eq!(catalog.get(&src).unwrap().depth(), 1);
    }

    #[test]
    fn tickets_are_superseded_by_newer_scans() {
        let coordinator = ScanCoordinator::new();
        let first = coordinator.begin();
        assert!(first.is_current());
        let second = coordinator.begin();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(matches!(
            first.check(),
            Err(AppError::ScanSuperseded { ticket: 1 })
        ));

        second.cancel();
        assert!(!second.is_current());

        let detached = ScanTicket::detached();
        coordinator.begin();
        assert!(detached.is_current());
    }

    #[test]
    fn descendant_path_requires_separator() {
        assert!(is_descendant_path("src", "src/a.rs"));
        assert!(!is_descendant_path("src", "srcx.rs"));
        assert!(!is_descendant_path("src", "src"));
    }
}
