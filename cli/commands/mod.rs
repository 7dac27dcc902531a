pub mod bundle;
pub mod completion;
pub mod config;
pub mod state;
pub mod tokens;
pub mod tree;

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use xbundle_core::{
    AppError, CheckedSet, Config, EntryCatalog, FileSystem, FilterDecision, FilterDecisions,
    FilterEngine, JsonFileStore, ScanTicket, SelectionStateStore, checked_set,
};

use crate::cli_args::{ProjectConfigOpts, SelectionOpts};

/// A scanned and classified project, shared by the commands that work on a selection.
pub struct Project {
    pub root: PathBuf,
    pub config: Config,
    pub catalog: EntryCatalog,
    pub engine: FilterEngine,
    pub decisions: FilterDecisions,
}

impl Project {
    pub async fn open(opts: &ProjectConfigOpts, fs: &dyn FileSystem) -> Result<Self> {
        let root = Config::determine_project_root(opts.project_root.as_ref())
            .context("Failed to determine project root")?;
        let config = crate::load_config_for_command(&root, opts)?;
        let catalog = EntryCatalog::scan(&root, fs, &config.scan, &ScanTicket::detached())
            .await
            .with_context(|| format!("Failed to scan project at {}", root.display()))?;
        let engine = FilterEngine::new(config.effective_file_groups());
        let decisions = engine.classify_catalog(&catalog);
        Ok(Self {
            root,
            config,
            catalog,
            engine,
            decisions,
        })
    }

    pub fn state_store(&self) -> SelectionStateStore {
        state_store_for(&self.root, &self.config)
    }

    /// Catalog URI for a path given on the command line, relative to the project root or
    /// absolute inside it.
    pub fn uri_for_path(&self, path: &Path) -> Result<String> {
        let relative = if path.is_absolute() {
            pathdiff::diff_paths(path, &self.root).unwrap_or_else(|| path.to_path_buf())
        } else {
            path.to_path_buf()
        };
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => {
                    return Err(AppError::InvalidArgument(format!(
                        "'{}' is outside the project root {}",
                        path.display(),
                        self.root.display()
                    ))
                    .into());
                }
            }
        }
        let key = parts.join("/");
        self.catalog
            .get_by_relative_path(&key)
            .map(|e| e.uri.clone())
            .ok_or_else(|| {
                AppError::InvalidArgument(format!(
                    "'{}' is not in the project catalog (missing or skipped by [scan])",
                    path.display()
                ))
                .into()
            })
    }

    /// Everything a plain bundle takes when nothing was selected: files that are not
    /// hidden and not reserved for explicit selection.
    pub fn default_selection(&self) -> CheckedSet {
        self.catalog
            .files()
            .filter(|f| {
                matches!(
                    self.decisions.get(&f.uri),
                    FilterDecision::AlwaysShow | FilterDecision::Normal
                )
            })
            .map(|f| f.uri.clone())
            .collect()
    }

    /// Checked set from `--state` and `--select`; falls back on the default selection.
    pub async fn resolve_checked(&self, selection: &SelectionOpts) -> Result<CheckedSet> {
        let mut checked = CheckedSet::new();
        if let Some(id) = &selection.state {
            let items = self
                .state_store()
                .load_state(id)
                .await?
                .ok_or_else(|| {
                    AppError::InvalidArgument(format!("No saved state with id '{}'", id))
                })?;
            log::info!("Loaded {} checked items from state {}", items.len(), id);
            checked.extend(checked_set(&items));
        }
        for path in &selection.select {
            checked.insert(self.uri_for_path(path)?);
        }
        if selection.is_empty() {
            log::debug!("No selection given; using every visible file");
            checked = self.default_selection();
        }
        Ok(checked)
    }
}

pub fn state_store_for(project_root: &Path, config: &Config) -> SelectionStateStore {
    let path = config.effective_state_path(project_root);
    log::debug!("Using state file {}", path.display());
    SelectionStateStore::new(Arc::new(JsonFileStore::new(path)))
}
