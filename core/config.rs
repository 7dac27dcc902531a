use crate::error::{AppError, Result};
use crate::output_formats::get_default_file_groups;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_DIR: &str = ".xtools/xbundle";
pub const DEFAULT_CONFIG_FILENAME: &str = "xbundle.toml";
pub const DEFAULT_STATE_FILE: &str = ".xtools/xbundle/state.json";
pub const DEFAULT_MAX_TOKENS: usize = 32_000;
pub const DEFAULT_HEADER_OVERHEAD_TOKENS: usize = 8;
pub const DEFAULT_ENCODING: &str = "cl100k_base";
pub const DEFAULT_OFF_THREAD_THRESHOLD_BYTES: usize = 256 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub state: StateConfig,
    /// `None` means "use the embedded defaults"; an empty table disables filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_groups: Option<IndexMap<String, FileGroup>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    #[serde(default)]
    pub project_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    #[serde(default = "default_skip_names")]
    pub skip_names: Vec<String>,
    #[serde(default)]
    pub max_depth: Option<usize>,
}

/// Budget limits handed to the assembler on every call.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_header_overhead")]
    pub header_overhead_tokens: usize,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default = "default_off_thread_threshold")]
    pub off_thread_threshold_bytes: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TreeConfig {
    #[serde(default = "default_true")]
    pub show_sizes: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub include_tree: bool,
    #[serde(default = "default_true")]
    pub include_timestamp: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    #[serde(default = "default_state_file")]
    pub store_path: PathBuf,
}

/// A named set of glob patterns. The group name decides which filter tier it feeds.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileGroup {
    #[serde(default = "default_true")]
    pub initially_visible: bool,
    #[serde(default)]
    pub items: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_format() -> String {
    "text".to_string()
}
fn default_skip_names() -> Vec<String> {
    vec![".git".to_string()]
}
fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}
fn default_header_overhead() -> usize {
    DEFAULT_HEADER_OVERHEAD_TOKENS
}
fn default_encoding() -> String {
    DEFAULT_ENCODING.to_string()
}
fn default_off_thread_threshold() -> usize {
    DEFAULT_OFF_THREAD_THRESHOLD_BYTES
}
fn default_state_file() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_FILE)
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            skip_names: default_skip_names(),
            max_depth: None,
        }
    }
}
impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            header_overhead_tokens: default_header_overhead(),
            encoding: default_encoding(),
            off_thread_threshold_bytes: default_off_thread_threshold(),
        }
    }
}
impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            show_sizes: default_true(),
        }
    }
}
impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            include_tree: default_true(),
            include_timestamp: default_true(),
        }
    }
}
impl Default for StateConfig {
    fn default() -> Self {
        Self {
            store_path: default_state_file(),
        }
    }
}

impl BudgetConfig {
    pub fn with_max_tokens(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            ..Self::default()
        }
    }
}

impl Config {
    pub fn determine_project_root(cli_project_root: Option<&PathBuf>) -> Result<PathBuf> {
        let path_str_opt = cli_project_root
            .map(|p| p.to_string_lossy().to_string())
            .or_else(|| env::var("PROJECT_ROOT").ok().filter(|s| !s.is_empty()));

        let path_to_resolve = match path_str_opt {
            Some(p_str) => PathBuf::from(shellexpand::tilde(&p_str).as_ref()),
            None => env::current_dir().map_err(AppError::Io)?,
        };

        path_to_resolve.canonicalize().map_err(|e| {
            AppError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to canonicalize project root '{}': {}",
                    path_to_resolve.display(),
                    e
                ),
            ))
        })
    }

    pub fn resolve_config_path(
        project_root: &Path,
        cli_config_file: Option<&String>,
        cli_disable_config: bool,
    ) -> Result<Option<PathBuf>> {
        if cli_disable_config {
            log::debug!("Config file loading disabled via CLI flag.");
            return Ok(None);
        }

        let path_to_check = match cli_config_file {
            Some(p_str) => {
                let expanded = shellexpand::tilde(p_str);
                let mut path = PathBuf::from(expanded.as_ref());
                let looks_like_path = path.is_absolute()
                    || path.components().count() > 1
                    || p_str.contains(['/', '\\']);

                if looks_like_path {
                    if !path.exists() && path.extension().is_none() {
                        path.set_extension("toml");
                    }
                    if !path.exists() {
                        return Err(AppError::Config(format!(
                            "Specified config file not found at path: {}",
                            path.display()
                        )));
                    }
                    log::debug!("Using specified config file path: {}", path.display());
                    Some(path)
                } else {
                    let filename = if path.extension().is_none_or(|e| e != "toml") {
                        format!("{}.toml", path.to_string_lossy())
                    } else {
                        path.to_string_lossy().to_string()
                    };
                    let full_path = project_root.join(DEFAULT_CONFIG_DIR).join(filename);
                    if !full_path.exists() {
                        return Err(AppError::Config(format!(
                            "Specified config file '{}' not found in default directory: {}",
                            path.display(),
                            project_root.join(DEFAULT_CONFIG_DIR).display()
                        )));
                    }
                    log::debug!(
                        "Using specified config filename in default directory: {}",
                        full_path.display()
                    );
                    Some(full_path)
                }
            }
            None => {
                let default_path = project_root
                    .join(DEFAULT_CONFIG_DIR)
                    .join(DEFAULT_CONFIG_FILENAME);
                if default_path.exists() {
                    log::debug!("Using default config file path: {}", default_path.display());
                    Some(default_path)
                } else {
                    log::debug!(
                        "No config file specified and default not found at: {}",
                        default_path.display()
                    );
                    None
                }
            }
        };
        Ok(path_to_check)
    }

    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        log::info!("Loading configuration from: {}", config_path.display());
        let toml_content = fs::read_to_string(config_path).map_err(|e| AppError::FileRead {
            path: config_path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&toml_content).map_err(|e| match e {
            AppError::TomlParse(msg) => AppError::TomlParse(format!(
                "Error parsing config file '{}': {}. Check TOML syntax and structure.",
                config_path.display(),
                msg
            )),
            other => other,
        })
    }

    pub fn from_toml_str(toml_content: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_content)
            .map_err(|e| AppError::TomlParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.budget.max_tokens == 0 {
            return Err(AppError::Config(
                "[budget].max_tokens must be greater than 0".to_string(),
            ));
        }
        match self.output.format.to_lowercase().as_str() {
            "text" | "json" | "yaml" | "yml" => Ok(()),
            other => Err(AppError::Config(format!(
                "Unsupported [output].format '{}'. Use text, json or yaml.",
                other
            ))),
        }
    }

    /// Config rendered as TOML with the effective file groups spelled out.
    pub fn default_toml() -> Result<String> {
        let mut config = Config::default();
        config.file_groups = Some(get_default_file_groups().clone());
        Ok(toml::to_string_pretty(&config)?)
    }

    pub fn effective_file_groups(&self) -> &IndexMap<String, FileGroup> {
        self.file_groups
            .as_ref()
            .unwrap_or_else(|| get_default_file_groups())
    }

    pub fn effective_state_path(&self, project_root: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(&self.state.store_path.to_string_lossy()).into_owned();
        let path = PathBuf::from(expanded);
        if path.is_absolute() {
            path
        } else {
            project_root.join(path)
        }
    }

    pub fn get_effective_project_name(&self, project_root: &Path) -> String {
        self.general.project_name.clone().unwrap_or_else(|| {
            project_root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "UnknownProject".to_string())
        })
    }
}
