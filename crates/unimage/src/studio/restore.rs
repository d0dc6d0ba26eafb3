//! Startup restore of the cached task and the history list.

use tracing::info;

use crate::error::Result;
use crate::storage::{HistoryItem, TaskSnapshot};

use super::state::StudioState;
use super::Studio;

/// Merges the cached task with the stored history. Returns `None` when
/// there is nothing to restore.
///
/// The generated image list comes from history whenever history holds
/// images, and from the snapshot otherwise.
pub fn merge_restored(
    snapshot: Option<TaskSnapshot>,
    history: Vec<HistoryItem>,
) -> Option<StudioState> {
    let history_images: Vec<String> = history
        .iter()
        .filter_map(|item| item.generated_image.clone())
        .collect();
    let newest_image = history.first().and_then(|item| item.generated_image.clone());

    match snapshot {
        Some(snapshot) => {
            let generated_images = if history_images.is_empty() {
                snapshot.generated_images
            } else {
                history_images
            };
            Some(StudioState {
                source: snapshot.source,
                product: snapshot.product,
                mode: snapshot.mode,
                aspect_ratio: snapshot.aspect_ratio,
                video_duration: snapshot.video_duration,
                results: snapshot.results,
                editable_prompt: snapshot.editable_prompt,
                prompt_history: snapshot.prompt_history,
                prompt_cache: snapshot.prompt_cache,
                language: snapshot.language,
                generated_image: snapshot.generated_image.or(newest_image),
                generated_images,
                use_reference_image: snapshot.use_reference_image,
                reference_images: snapshot.reference_images,
                layout: snapshot.layout,
                selected_history_index: Some(snapshot.selected_history_index.unwrap_or(0)),
                history,
                ..StudioState::default()
            })
        }
        None if !history.is_empty() => Some(StudioState {
            generated_image: newest_image,
            generated_images: history_images,
            history,
            ..StudioState::default()
        }),
        None => None,
    }
}

impl Studio {
    /// Loads the cached task and history into the studio. Returns whether
    /// anything was restored.
    pub fn restore(&self) -> Result<bool> {
        let history = self.inner.history.list()?;
        let snapshot = self.inner.task_cache.load()?;
        let Some(restored) = merge_restored(snapshot, history) else {
            return Ok(false);
        };
        info!(
            history = restored.history.len(),
            has_source = restored.source.is_some(),
            "Restored previous session"
        );
        let mut state = self.lock_state();
        self.next_task();
        *state = restored;
        drop(state);
        self.emit_view();
        Ok(true)
    }
}
