use crate::catalog::CheckedSet;
use crate::error::{AppError, Result};
use crate::persistence::KeyValueStore;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Every saved state lives under this one key, as a JSON array.
pub const SAVED_STATES_KEY: &str = "xbundle.savedStates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CheckboxState {
    Unchecked = 0,
    Checked = 1,
}

impl TryFrom<u8> for CheckboxState {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(CheckboxState::Unchecked),
            1 => Ok(CheckboxState::Checked),
            other => Err(format!("invalid checkbox state {}, expected 0 or 1", other)),
        }
    }
}

impl From<CheckboxState> for u8 {
    fn from(state: CheckboxState) -> Self {
        state as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckedItem {
    pub uri_string: String,
    pub checkbox_state: CheckboxState,
}

impl CheckedItem {
    pub fn checked(uri: impl Into<String>) -> Self {
        Self {
            uri_string: uri.into(),
            checkbox_state: CheckboxState::Checked,
        }
    }
}

pub fn checked_set(items: &[CheckedItem]) -> CheckedSet {
    items
        .iter()
        .filter(|i| i.checkbox_state == CheckboxState::Checked)
        .map(|i| i.uri_string.clone())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedStateItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub timestamp: i64,
    pub checked_items: Vec<CheckedItem>,
}

impl SavedStateItem {
    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

pub struct SelectionStateStore {
    store: Arc<dyn KeyValueStore>,
    lock: Mutex<()>,
    counter: AtomicU64,
}

impl std::fmt::Debug for SelectionStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionStateStore")
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

impl SelectionStateStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
            counter: AtomicU64::new(0),
        }
    }

    async fn read_all(&self) -> Result<Vec<SavedStateItem>> {
        match self.store.get(SAVED_STATES_KEY).await? {
            None => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value).map_err(|e| {
                AppError::Persistence(format!(
                    "Saved states under '{}' are malformed: {}",
                    SAVED_STATES_KEY, e
                ))
            }),
        }
    }

    async fn write_all(&self, states: &[SavedStateItem]) -> Result<()> {
        let value = serde_json::to_value(states)?;
        self.store.update(SAVED_STATES_KEY, Some(value)).await
    }

    fn next_id(&self, now_millis: i64, taken: &HashSet<&str>) -> String {
        loop {
            let counter = self.counter.fetch_add(1, Ordering::Relaxed);
            let id = format!(
                "{}-{}",
                to_base36(now_millis.max(0) as u64),
                to_base36(counter)
            );
            if !taken.contains(id.as_str()) {
                return id;
            }
            log::debug!("State id {} already taken, drawing another", id);
        }
    }

    pub async fn save_state(&self, label: Option<&str>, items: Vec<CheckedItem>) -> Result<String> {
        let _guard = self.lock.lock().await;
        let mut states = self.read_all().await?;
        let timestamp = Utc::now().timestamp_millis();
        let id = {
            let taken: HashSet<&str> = states.iter().map(|s| s.id.as_str()).collect();
            self.next_id(timestamp, &taken)
        };
        log::info!("Saving selection state {} ({} items)", id, items.len());
        states.push(SavedStateItem {
            id: id.clone(),
            label: normalize_label(label),
            timestamp,
            checked_items: items,
        });
        self.write_all(&states).await?;
        Ok(id)
    }

    pub async fn get_state(&self, id: &str) -> Result<Option<SavedStateItem>> {
        let states = self.read_all().await?;
        Ok(states.into_iter().find(|s| s.id == id))
    }

    pub async fn load_state(&self, id: &str) -> Result<Option<Vec<CheckedItem>>> {
        Ok(self.get_state(id).await?.map(|s| s.checked_items))
    }

    // Newest first; saves from the same millisecond stay most-recent-first.
    pub async fn load_all_saved_states(&self) -> Result<Vec<SavedStateItem>> {
        let states = self.read_all().await?;
        let mut indexed: Vec<(usize, SavedStateItem)> = states.into_iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));
        Ok(indexed.into_iter().map(|(_, s)| s).collect())
    }

    pub async fn delete_state(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut states = self.read_all().await?;
        let before = states.len();
        states.retain(|s| s.id != id);
        if states.len() == before {
            log::debug!("No selection state {} to delete", id);
            return Ok(false);
        }
        self.write_all(&states).await?;
        log::info!("Deleted selection state {}", id);
        Ok(true)
    }

    pub async fn rename_state(&self, id: &str, label: Option<&str>) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut states = self.read_all().await?;
        let Some(state) = states.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        state.label = normalize_label(label);
        self.write_all(&states).await?;
        log::info!("Renamed selection state {}", id);
        Ok(true)
    }
}

fn normalize_label(label: Option<&str>) -> Option<String> {
    label
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use serde_json::json;

    #[test]
    fn base36_encoding() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn checkbox_state_is_an_integer_on_the_wire() {
        let item = CheckedItem::checked("file:///a");
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({"uriString": "file:///a", "checkboxState": 1})
        );
        let bad = serde_json::from_value::<CheckedItem>(
            json!({"uriString": "file:///a", "checkboxState": 2}),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn checked_set_ignores_unchecked_items() {
        let items = vec![
            CheckedItem::checked("file:///a"),
            CheckedItem {
                uri_string: "file:///b".into(),
                checkbox_state: CheckboxState::Unchecked,
            },
        ];
        let set = checked_set(&items);
        assert!(set.contains("file:///a"));
        assert!(!set.contains("file:///b"));
    }

    #[tokio::test]
    async fn ids_are_unique_even_within_one_millisecond() {
        let store = SelectionStateStore::new(Arc::new(MemoryStore::new()));
        let mut ids = HashSet::new();
        for _ in 0..20 {
            ids.insert(store.save_state(None, Vec::new()).await.unwrap());
        }
        assert_eq!(ids.len(), 20);
    }

    #[tokio::test]
    async fn malformed_stored_value_is_a_persistence_error() {
        let kv = Arc::new(MemoryStore::new());
        kv.update(SAVED_STATES_KEY, Some(json!({"not": "an array"})))
            .await
            .unwrap();
        let store = SelectionStateStore::new(kv);
        let err = store.load_all_saved_states().await.unwrap_err();
        assert!(err.is_persistence());
    }
}
