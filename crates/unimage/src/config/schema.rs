use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Studio configuration, constructed once and shared by `Arc`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudioConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    #[default]
    Official,
    Custom,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub mode: ApiMode,
    /// Direct key value. Prefer `api_key_file` or `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Only used in custom mode.
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_reasoning_model")]
    pub reasoning: String,
    #[serde(default = "default_fast_model")]
    pub fast: String,
    #[serde(default = "default_image_model")]
    pub image: String,
}

fn default_reasoning_model() -> String {
    "gemini-3-flash-preview".to_string()
}

fn default_fast_model() -> String {
    "gemini-3-flash-preview".to_string()
}

fn default_image_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            reasoning: default_reasoning_model(),
            fast: default_fast_model(),
            image: default_image_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Defaults to `<data_dir>/unimage`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,
}

fn default_quota_bytes() -> u64 {
    256 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            quota_bytes: default_quota_bytes(),
        }
    }
}

impl StorageConfig {
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("unimage")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Delay between the end of an analysis run and hiding its progress view.
    #[serde(default = "default_completion_delay_ms")]
    pub completion_delay_ms: u64,
    #[serde(default = "default_video_completion_delay_ms")]
    pub video_completion_delay_ms: u64,
}

fn default_completion_delay_ms() -> u64 {
    2000
}

fn default_video_completion_delay_ms() -> u64 {
    1500
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            completion_delay_ms: default_completion_delay_ms(),
            video_completion_delay_ms: default_video_completion_delay_ms(),
        }
    }
}
