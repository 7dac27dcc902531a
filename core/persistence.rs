use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value` under `key`; `None` removes the key.
    async fn update(&self, key: &str, value: Option<Value>) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn update(&self, key: &str, value: Option<Value>) -> Result<()> {
        let mut values = self.values.write().await;
        match value {
            Some(v) => {
                values.insert(key.to_string(), v);
            }
            None => {
                values.remove(key);
            }
        }
        Ok(())
    }
}

/// Store holding every key in a single JSON object file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Map<String, Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::trace!("State file {} does not exist yet", self.path.display());
                return Ok(Map::new());
            }
            Err(e) => {
                return Err(AppError::Persistence(format!(
                    "Failed to read state file '{}': {}",
                    self.path.display(),
                    e
                )));
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(AppError::Persistence(format!(
                "State file '{}' must contain a JSON object, found {}",
                self.path.display(),
                json_kind(&other)
            ))),
            Err(e) => Err(AppError::Persistence(format!(
                "State file '{}' is not valid JSON: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn write_document(&self, doc: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    AppError::Persistence(format!(
                        "Failed to create state directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(|e| {
            AppError::Persistence(format!(
                "Failed to write state file '{}': {}",
                tmp.display(),
                e
            ))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            AppError::Persistence(format!(
                "Failed to replace state file '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let doc = self.read_document().await?;
        Ok(doc.get(key).cloned())
    }

    async fn update(&self, key: &str, value: Option<Value>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document().await?;
        match value {
            Some(v) => {
                doc.insert(key.to_string(), v);
            }
            None => {
                doc.remove(key);
            }
        }
        self.write_document(&doc).await?;
        log::trace!("Persisted key '{}' to {}", key, self.path.display());
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
