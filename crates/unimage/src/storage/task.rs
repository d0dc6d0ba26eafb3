//! Cache of the in-flight task so a restart can resume where it left off.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentRole;
use crate::asset::{AspectRatio, Asset};
use crate::error::StorageError;
use crate::layout::LayoutElement;
use crate::studio::{Language, PromptCache, PromptHistory, StageResult, StudioMode, StudioState};

use super::history::ReferenceImage;
use super::kv::KvStore;

pub const TASK_CACHE_KEY: &str = "unimage_current_task";

/// Persisted subset of [`StudioState`]. The history list is stored
/// separately and never part of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub source: Option<Asset>,
    #[serde(default)]
    pub mode: StudioMode,
    #[serde(default)]
    pub product: Option<Asset>,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub video_duration: Option<f64>,
    #[serde(default)]
    pub results: BTreeMap<AgentRole, StageResult>,
    #[serde(default)]
    pub editable_prompt: String,
    #[serde(default)]
    pub prompt_history: PromptHistory,
    #[serde(default)]
    pub generated_image: Option<String>,
    #[serde(default)]
    pub generated_images: Vec<String>,
    #[serde(default)]
    pub layout: Option<Vec<LayoutElement>>,
    #[serde(default)]
    pub prompt_cache: PromptCache,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub selected_history_index: Option<usize>,
    #[serde(default)]
    pub reference_images: Vec<ReferenceImage>,
    #[serde(default)]
    pub use_reference_image: bool,
    pub saved_at: DateTime<Utc>,
}

impl TaskSnapshot {
    pub fn capture(state: &StudioState) -> Self {
        Self {
            source: state.source.clone(),
            mode: state.mode,
            product: state.product.clone(),
            aspect_ratio: state.aspect_ratio,
            video_duration: state.video_duration,
            results: state.results.clone(),
            editable_prompt: state.editable_prompt.clone(),
            prompt_history: state.prompt_history.clone(),
            generated_image: state.generated_image.clone(),
            generated_images: state.generated_images.clone(),
            layout: state.layout.clone(),
            prompt_cache: state.prompt_cache.clone(),
            language: state.language,
            selected_history_index: state.selected_history_index,
            reference_images: state.reference_images.clone(),
            use_reference_image: state.use_reference_image,
            saved_at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct TaskCache {
    kv: Arc<KvStore>,
}

impl TaskCache {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    pub fn save(&self, snapshot: &TaskSnapshot) -> Result<(), StorageError> {
        self.kv.set(TASK_CACHE_KEY, snapshot)
    }

    /// The cached task. A record that no longer parses is treated as absent.
    pub fn load(&self) -> Result<Option<TaskSnapshot>, StorageError> {
        match self.kv.get(TASK_CACHE_KEY) {
            Ok(snapshot) => Ok(snapshot),
            Err(StorageError::Corrupt { key, source }) => {
                log::warn!("Ignoring unreadable task cache '{}': {}", key, source);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.kv.delete(TASK_CACHE_KEY)
    }
}
