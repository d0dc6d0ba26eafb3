pub mod agents;
pub mod asset;
pub mod broadcast;
pub mod client;
pub mod config;
pub mod error;
pub mod layout;
pub mod pipeline;
pub mod storage;
pub mod studio;

pub use agents::{AgentRole, FUSION_ORDER, PIPELINE_ORDER};
pub use asset::{load_asset, AspectRatio, Asset, LoadedAsset};
pub use broadcast::{NoticeLevel, StudioEvent, StudioEventBroadcaster};
pub use client::{ClientError, GeminiClient, GenerationClient, StubClient};
pub use config::{load_config, resolve_api_key, StudioConfig};
pub use error::{AssetError, ConfigError, Result, StorageError, UnimageError};
pub use layout::{parse_layout_response, LayoutElement};
pub use pipeline::{PipelineProgress, PipelineRunner, PipelineStep, PipelineTracker, StepStatus};
pub use storage::{HistoryItem, HistoryStore, KvStore, PromptLibrary, TaskCache, TaskSnapshot};
pub use studio::{
    detect_intent, ActiveView, ChatMessage, ChatRole, Language, RunOutcome, SkillIntent, SkipReason,
    StageResult, Studio, StudioMode, StudioState,
};
