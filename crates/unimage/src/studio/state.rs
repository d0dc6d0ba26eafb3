use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agents::AgentRole;
use crate::asset::{AspectRatio, Asset};
use crate::layout::LayoutElement;
use crate::storage::{HistoryItem, ReferenceImage};

use super::chat::ChatMessage;
use super::prompt_history::PromptHistory;

/// What an analysis run does with the loaded asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudioMode {
    /// Four-stage analysis of a single image.
    #[default]
    Replicate,
    /// Scene image plus a product image.
    Fusion,
    /// Single-stage video director analysis.
    Video,
}

impl StudioMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudioMode::Replicate => "replicate",
            StudioMode::Fusion => "fusion",
            StudioMode::Video => "video",
        }
    }
}

impl std::fmt::Display for StudioMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StudioMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replicate" => Ok(StudioMode::Replicate),
            "fusion" => Ok(StudioMode::Fusion),
            "video" => Ok(StudioMode::Video),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// Result of one analysis stage as shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StageResult {
    #[default]
    Idle,
    Streaming {
        content: String,
    },
    Complete {
        content: String,
    },
    Failed {
        content: String,
        error: String,
    },
}

impl StageResult {
    pub fn content(&self) -> &str {
        match self {
            StageResult::Idle => "",
            StageResult::Streaming { content }
            | StageResult::Complete { content }
            | StageResult::Failed { content, .. } => content,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StageResult::Complete { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", content = "role", rename_all = "snake_case")]
pub enum ActiveView {
    #[default]
    Studio,
    Stage(AgentRole),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "CN")]
    Cn,
    #[serde(rename = "EN")]
    En,
}

impl Language {
    pub fn toggled(self) -> Language {
        match self {
            Language::Cn => Language::En,
            Language::En => Language::Cn,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Cn => write!(f, "CN"),
            Language::En => write!(f, "EN"),
        }
    }
}

/// Editable prompt per language; an empty entry means "not translated yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptCache {
    #[serde(rename = "CN", default)]
    pub cn: String,
    #[serde(rename = "EN", default)]
    pub en: String,
}

impl PromptCache {
    pub fn get(&self, language: Language) -> Option<&str> {
        let value = match language {
            Language::Cn => &self.cn,
            Language::En => &self.en,
        };
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    pub fn set(&mut self, language: Language, prompt: impl Into<String>) {
        match language {
            Language::Cn => self.cn = prompt.into(),
            Language::En => self.en = prompt.into(),
        }
    }
}

/// Everything the studio shows. Owned by [`super::Studio`] behind a mutex;
/// callers receive clones.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioState {
    pub source: Option<Asset>,
    pub product: Option<Asset>,
    pub mode: StudioMode,
    pub aspect_ratio: AspectRatio,
    pub video_duration: Option<f64>,

    pub is_processing: bool,
    pub results: BTreeMap<AgentRole, StageResult>,
    pub active_view: ActiveView,
    pub progress_visible: bool,

    pub editable_prompt: String,
    pub prompt_history: PromptHistory,
    pub prompt_cache: PromptCache,
    pub language: Language,
    pub is_refining_prompt: bool,

    pub generated_image: Option<String>,
    pub generated_images: Vec<String>,
    pub is_generating_image: bool,
    pub use_reference_image: bool,
    pub reference_images: Vec<ReferenceImage>,

    pub layout: Option<Vec<LayoutElement>>,
    pub is_analyzing_layout: bool,
    pub suggestions: Vec<String>,
    pub is_checking_quality: bool,

    pub chat: Vec<ChatMessage>,
    pub is_chatting: bool,

    pub history: Vec<HistoryItem>,
    pub selected_history_index: Option<usize>,
}

impl StudioState {
    pub fn result(&self, role: AgentRole) -> &StageResult {
        static IDLE: StageResult = StageResult::Idle;
        self.results.get(&role).unwrap_or(&IDLE)
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Fresh task state that keeps the library-level fields: history,
    /// generated images and mode.
    pub(crate) fn cleared(&self) -> StudioState {
        StudioState {
            history: self.history.clone(),
            generated_images: self.generated_images.clone(),
            mode: self.mode,
            ..StudioState::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_result_content() {
        assert_eq!(StageResult::Idle.content(), "");
        let failed = StageResult::Failed {
            content: "partial".into(),
            error: "boom".into(),
        };
        assert_eq!(failed.content(), "partial");
        assert!(!failed.is_complete());
        assert!(StageResult::Complete {
            content: "x".into()
        }
        .is_complete());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Fusion".parse::<StudioMode>().unwrap(), StudioMode::Fusion);
        assert!("sketch".parse::<StudioMode>().is_err());
    }

    #[test]
    fn test_prompt_cache() {
        let mut cache = PromptCache::default();
        assert_eq!(cache.get(Language::En), None);
        cache.set(Language::En, "hello");
        assert_eq!(cache.get(Language::En), Some("hello"));
        assert_eq!(Language::En.toggled(), Language::Cn);
        let json = serde_json::to_value(&cache).unwrap();
        assert_eq!(json["EN"], "hello");
    }

    #[test]
    fn test_cleared_keeps_library_fields() {
        let state = StudioState {
            source: Some(Asset::new("img", "image/png")),
            mode: StudioMode::Video,
            editable_prompt: "prompt".into(),
            generated_images: vec!["g1".into()],
            generated_image: Some("g1".into()),
            ..Default::default()
        };
        let cleared = state.cleared();
        assert!(cleared.source.is_none());
        assert!(cleared.editable_prompt.is_empty());
        assert_eq!(cleared.mode, StudioMode::Video);
        assert_eq!(cleared.generated_images, vec!["g1".to_string()]);
        assert!(cleared.generated_image.is_none());
    }
}
