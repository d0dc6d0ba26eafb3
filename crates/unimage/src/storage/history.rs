//! Generated-image history: an id index plus one record per item.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::asset::AspectRatio;
use crate::error::StorageError;

use super::kv::KvStore;

pub const HISTORY_INDEX_KEY: &str = "unimage_history_ids";

/// A style reference attached to a generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceImage {
    pub id: String,
    pub name: String,
    /// Base64 payload.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<AspectRatio>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub original_image: String,
    pub mime_type: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_aspect_ratio: Option<AspectRatio>,
    #[serde(default)]
    pub reference_images: Vec<ReferenceImage>,
    #[serde(default)]
    pub is_fusion_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_image: Option<String>,
}

impl HistoryItem {
    pub fn new(original_image: &str, mime_type: &str, prompt: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            original_image: original_image.to_string(),
            mime_type: mime_type.to_string(),
            prompt: prompt.to_string(),
            generated_image: None,
            detected_aspect_ratio: None,
            reference_images: Vec::new(),
            is_fusion_mode: false,
            product_image: None,
        }
    }
}

fn record_key(id: &str) -> String {
    format!("history_{}", id)
}

#[derive(Clone)]
pub struct HistoryStore {
    kv: Arc<KvStore>,
}

impl HistoryStore {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    fn ids(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.kv.get(HISTORY_INDEX_KEY)?.unwrap_or_default())
    }

    /// All items, newest first. Ids whose record is gone are skipped.
    pub fn list(&self) -> Result<Vec<HistoryItem>, StorageError> {
        let keys: Vec<String> = self.ids()?.iter().map(|id| record_key(id)).collect();
        let mut items: Vec<HistoryItem> = Vec::with_capacity(keys.len());
        for (key, item) in keys.iter().zip(self.kv.get_many::<HistoryItem>(&keys)?) {
            match item {
                Some(item) => items.push(item),
                None => log::debug!("History record {} missing, skipping", key),
            }
        }
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(items)
    }

    /// Stores the record, then adds its id to the index once.
    pub fn save(&self, item: &HistoryItem) -> Result<(), StorageError> {
        self.kv.set(&record_key(&item.id), item)?;
        let mut ids = self.ids()?;
        if !ids.contains(&item.id) {
            ids.push(item.id.clone());
            self.kv.set(HISTORY_INDEX_KEY, &ids)?;
        }
        log::debug!("Saved history item {}", item.id);
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.kv.delete(&record_key(id))?;
        let ids: Vec<String> = self.ids()?.into_iter().filter(|i| i != id).collect();
        self.kv.set(HISTORY_INDEX_KEY, &ids)?;
        log::debug!("Deleted history item {}", id);
        Ok(())
    }

    pub fn clear_all(&self) -> Result<usize, StorageError> {
        let ids = self.ids()?;
        for id in &ids {
            self.kv.delete(&record_key(id))?;
        }
        self.kv.delete(HISTORY_INDEX_KEY)?;
        log::info!("Cleared {} history items", ids.len());
        Ok(ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn store() -> (TempDir, HistoryStore) {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::open(dir.path(), 10 * 1024 * 1024).unwrap();
        (dir, HistoryStore::new(Arc::new(kv)))
    }

    fn item(prompt: &str, age_secs: i64) -> HistoryItem {
        let mut item = HistoryItem::new("orig", "image/png", prompt);
        item.timestamp = Utc::now() - Duration::seconds(age_secs);
        item.generated_image = Some(format!("gen-{}", prompt));
        item
    }

    #[test]
    fn test_list_sorted_newest_first() {
        let (_dir, store) = store();
        store.save(&item("old", 100)).unwrap();
        store.save(&item("new", 1)).unwrap();
        store.save(&item("mid", 50)).unwrap();

        let prompts: Vec<String> = store.list().unwrap().into_iter().map(|i| i.prompt).collect();
        assert_eq!(prompts, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_save_twice_indexes_once() {
        let (_dir, store) = store();
        let item = item("a", 0);
        store.save(&item).unwrap();
        store.save(&item).unwrap();
        assert_eq!(store.ids().unwrap().len(), 1);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_and_dangling_ids() {
        let (_dir, store) = store();
        let a = item("a", 2);
        let b = item("b", 1);
        store.save(&a).unwrap();
        store.save(&b).unwrap();

        store.delete(&a.id).unwrap();
        assert_eq!(store.list().unwrap(), vec![b.clone()]);

        // A record removed behind the index's back is skipped
        store.kv.delete(&record_key(&b.id)).unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_clear_all() {
        let (_dir, store) = store();
        store.save(&item("a", 0)).unwrap();
        store.save(&item("b", 0)).unwrap();
        assert_eq!(store.clear_all().unwrap(), 2);
        assert!(store.list().unwrap().is_empty());
        assert_eq!(store.clear_all().unwrap(), 0);
    }

    #[test]
    fn test_item_serializes_camel_case() {
        let json = serde_json::to_value(item("a", 0)).unwrap();
        assert_eq!(json["originalImage"], "orig");
        assert_eq!(json["isFusionMode"], false);
        assert!(json.get("productImage").is_none());
    }
}
