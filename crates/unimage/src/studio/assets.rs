//! Loading source assets, generating images and managing the history.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::asset::{self, AspectRatio, Asset, LoadedAsset};
use crate::broadcast::NoticeLevel;
use crate::client::{GenerationConfig, GenerationRequest, Part};
use crate::error::Result;
use crate::storage::{HistoryItem, ReferenceImage};

use super::state::{ActiveView, StudioMode};
use super::Studio;

/// Inputs of an image generation request, captured from the state up front.
struct GenerationJob {
    source: Asset,
    prompt: String,
    aspect_ratio: AspectRatio,
    reference: Option<Asset>,
    fusion: bool,
    product: Option<Asset>,
    references: Vec<ReferenceImage>,
}

impl Studio {
    /// Loads an image or video from disk as the new source asset.
    pub fn load_asset<P: AsRef<Path>>(&self, path: P, video_duration: Option<f64>) -> Result<()> {
        let loaded = asset::load_asset(path)?;
        self.load_loaded_asset(loaded, video_duration);
        Ok(())
    }

    /// Starts a new task from `loaded`. Everything but history, generated
    /// images and mode is reset.
    pub fn load_loaded_asset(&self, loaded: LoadedAsset, video_duration: Option<f64>) {
        info!(
            mime_type = %loaded.asset.mime_type,
            aspect_ratio = %loaded.aspect_ratio,
            "Source asset loaded"
        );
        self.update(|state| {
            self.next_task();
            let mut fresh = state.cleared();
            fresh.source = Some(loaded.asset);
            fresh.aspect_ratio = loaded.aspect_ratio;
            fresh.video_duration = video_duration;
            fresh.selected_history_index = None;
            fresh.active_view = ActiveView::Studio;
            *state = fresh;
        });
        self.emit_view();
    }

    /// Loads the product image used by fusion mode.
    pub fn load_product<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let loaded = asset::load_asset(path)?;
        self.set_product(loaded.asset);
        Ok(())
    }

    pub fn set_product(&self, product: Asset) {
        self.update(|state| state.product = Some(product));
        self.notify(NoticeLevel::Success, "Product reference image loaded");
    }

    /// Generates `count` images from `prompt` (or the editable prompt) and
    /// records each one in the history. Returns the new history items.
    pub async fn generate_images(
        &self,
        prompt: Option<&str>,
        count: usize,
    ) -> Result<Vec<HistoryItem>> {
        let job = {
            let mut state = self.lock_state();
            if state.is_generating_image {
                info!("Image generation already in progress");
                return Ok(Vec::new());
            }
            let Some(source) = state.source.clone() else {
                self.notify(NoticeLevel::Info, "Load an image first");
                return Ok(Vec::new());
            };
            state.is_generating_image = true;
            GenerationJob {
                prompt: prompt
                    .map(str::to_string)
                    .unwrap_or_else(|| state.editable_prompt.clone()),
                aspect_ratio: state.aspect_ratio,
                reference: state.use_reference_image.then(|| source.clone()),
                fusion: state.mode == StudioMode::Fusion,
                product: state.product.clone(),
                references: state.reference_images.clone(),
                source,
            }
        };

        let result = if self.require_credentials() {
            self.run_generation(&job, count).await
        } else {
            Ok(Vec::new())
        };

        self.update(|state| state.is_generating_image = false);
        match &result {
            Ok(items) if !items.is_empty() => self.notify(
                NoticeLevel::Success,
                format!("Generated {} image(s)", items.len()),
            ),
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Image generation failed");
                self.notify(NoticeLevel::Error, "Image generation failed");
            }
        }
        result
    }

    async fn run_generation(&self, job: &GenerationJob, count: usize) -> Result<Vec<HistoryItem>> {
        let mut items = Vec::new();
        for index in 0..count {
            let mut parts = Vec::new();
            if let Some(reference) = &job.reference {
                parts.push(reference.to_part());
            }
            parts.push(Part::text(job.prompt.clone()));
            let request = GenerationRequest::new(self.config().models.image.clone(), parts)
                .with_config(GenerationConfig::image(job.aspect_ratio.as_str()));

            let response = self.inner.client.generate(request).await?;
            let Some(generated) = response.inline_data().map(|d| d.data.clone()) else {
                warn!(index, "Model returned no image");
                continue;
            };

            let mut item = HistoryItem::new(&job.source.data, &job.source.mime_type, &job.prompt);
            item.generated_image = Some(generated.clone());
            item.detected_aspect_ratio = Some(job.aspect_ratio);
            item.reference_images = job.references.clone();
            item.is_fusion_mode = job.fusion;
            item.product_image = job.product.as_ref().map(|p| p.data.clone());
            self.inner.history.save(&item)?;

            self.update(|state| {
                state.generated_image = Some(generated.clone());
                state.generated_images.insert(0, generated);
                state.history.insert(0, item.clone());
                state.selected_history_index = Some(0);
            });
            items.push(item);
        }
        Ok(items)
    }

    /// Makes history entry `index` the current task. Returns `false` when the
    /// index is out of range.
    pub fn load_history_item(&self, index: usize) -> bool {
        let loaded = self.update(|state| {
            let Some(item) = state.history.get(index).cloned() else {
                return false;
            };
            self.next_task();
            state.selected_history_index = Some(index);
            state.editable_prompt = item.prompt.clone();
            state.prompt_cache.cn = item.prompt.clone();
            state.source = Some(Asset::new(item.original_image, item.mime_type));
            if item.is_fusion_mode {
                state.mode = StudioMode::Fusion;
            } else if state.mode == StudioMode::Fusion {
                state.mode = StudioMode::Replicate;
            }
            state.product = item.product_image.map(Asset::sniffed);
            state.aspect_ratio = item.detected_aspect_ratio.unwrap_or_default();
            state.generated_image = item.generated_image;
            true
        });
        if loaded {
            self.emit_view();
        }
        loaded
    }

    /// Deletes history entry `index` from the store and the state.
    pub fn delete_history_item(&self, index: usize) -> Result<bool> {
        let id = match self.lock_state().history.get(index) {
            Some(item) => item.id.clone(),
            None => return Ok(false),
        };
        self.inner.history.delete(&id)?;
        self.update(|state| {
            if index < state.generated_images.len() {
                state.generated_images.remove(index);
            }
            if index < state.history.len() {
                state.history.remove(index);
            }
            let selected = match state.selected_history_index {
                Some(sel) if index <= sel => sel.saturating_sub(1),
                Some(sel) => sel,
                None => 0,
            };
            state.selected_history_index = Some(selected);
            state.generated_image = state.generated_images.get(selected).cloned();
        });
        self.notify(NoticeLevel::Info, "Record deleted");
        Ok(true)
    }

    /// Removes every history record. Returns how many were deleted.
    pub fn clear_history(&self) -> Result<usize> {
        let removed = self.inner.history.clear_all()?;
        self.update(|state| {
            state.history.clear();
            state.generated_images.clear();
            state.generated_image = None;
            state.selected_history_index = None;
        });
        info!(removed, "History cleared");
        Ok(removed)
    }

    /// Writes generated image `index` to `path` as PNG.
    pub fn export_image(&self, index: usize, path: &Path) -> Result<Option<PathBuf>> {
        let Some(data) = self.lock_state().generated_images.get(index).cloned() else {
            return Ok(None);
        };
        asset::export_png(&data, path)?;
        self.notify(
            NoticeLevel::Success,
            format!("Saved {}", path.display()),
        );
        Ok(Some(path.to_path_buf()))
    }
}
