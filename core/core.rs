pub mod assembler;
pub mod bundle;
pub mod catalog;
pub mod config;
pub mod error;
pub mod filter;
pub mod fs;
pub mod output_formats;
pub mod persistence;
pub mod state;
pub mod tokens;
pub mod tree;

pub use assembler::{AssemblyResult, SkipReason, SkippedFile, assemble, expand_selection};
pub use bundle::Bundle;
pub use catalog::{CheckedSet, EntryCatalog, FileSystemEntry, ScanCoordinator, ScanTicket};
pub use config::{Config, FileGroup};
pub use error::{AppError, Result};
pub use filter::{FilterDecision, FilterDecisions, FilterEngine};
pub use fs::{DirEntry, EntryKind, FileStat, FileSystem, TokioFileSystem, file_uri, path_from_uri};
pub use output_formats::{OutputFormat, get_default_file_groups};
pub use persistence::{JsonFileStore, KeyValueStore, MemoryStore};
pub use state::{CheckboxState, CheckedItem, SavedStateItem, SelectionStateStore, checked_set};
pub use tokens::{CostModel, TokenEstimator, heuristic_estimate};
pub use tree::{TreeFormatterNode, TreeOptions, format_tree};
