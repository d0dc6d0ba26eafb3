//! The studio: owns application state and orchestrates every user action
//! against the generation client and local persistence.

pub mod assets;
pub mod chat;
pub mod prompt_history;
pub mod restore;
pub mod run;
pub mod state;
pub mod tools;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::broadcast::{NoticeLevel, StudioEvent, StudioEventBroadcaster};
use crate::client::{GeminiClient, GenerationClient};
use crate::config::StudioConfig;
use crate::error::Result;
use crate::pipeline::{PipelineProgress, PipelineRunner, PipelineTracker, TrackerError};
use crate::storage::{HistoryStore, KvStore, PromptLibrary, TaskCache, TaskSnapshot};

pub use chat::{detect_intent, ChatMessage, ChatRole, SkillIntent};
pub use prompt_history::{PromptHistory, PROMPT_HISTORY_LIMIT};
pub use run::{RunOutcome, SkipReason};
pub use state::{ActiveView, Language, PromptCache, StageResult, StudioMode, StudioState};

const STORAGE_FULL_MESSAGE: &str = "Local storage is full";

struct Inner {
    config: Arc<StudioConfig>,
    client: Arc<dyn GenerationClient>,
    runner: PipelineRunner,
    task_cache: TaskCache,
    history: HistoryStore,
    prompts: PromptLibrary,
    state: Mutex<StudioState>,
    tracker: Mutex<PipelineTracker>,
    events: StudioEventBroadcaster,
    /// Single in-flight analysis latch.
    running: AtomicBool,
    /// Bumped on every run start and cancel; delayed completion work only
    /// applies while it is unchanged.
    generation: AtomicU64,
    /// Bumped whenever a different task replaces the current one. Stage
    /// results only land while it matches the value seen at run start.
    task: AtomicU64,
    /// Set after a quota failure was reported; cleared by the next good save.
    storage_full: AtomicBool,
}

/// Cheaply cloneable handle; clones share state.
#[derive(Clone)]
pub struct Studio {
    inner: Arc<Inner>,
}

impl Studio {
    pub fn new(
        config: Arc<StudioConfig>,
        client: Arc<dyn GenerationClient>,
        kv: Arc<KvStore>,
    ) -> Self {
        let runner = PipelineRunner::new(Arc::clone(&client), config.models.reasoning.clone());
        Self {
            inner: Arc::new(Inner {
                runner,
                client,
                task_cache: TaskCache::new(Arc::clone(&kv)),
                history: HistoryStore::new(Arc::clone(&kv)),
                prompts: PromptLibrary::new(kv),
                state: Mutex::new(StudioState::default()),
                tracker: Mutex::new(PipelineTracker::new()),
                events: StudioEventBroadcaster::default(),
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                task: AtomicU64::new(0),
                storage_full: AtomicBool::new(false),
                config,
            }),
        }
    }

    /// Production constructor: opens the configured data directory and
    /// builds the HTTP client.
    pub fn from_config(config: StudioConfig) -> Result<Self> {
        let kv = KvStore::open(
            config.storage.resolved_data_dir(),
            config.storage.quota_bytes,
        )?;
        let client = GeminiClient::from_config(&config)?;
        Ok(Self::new(Arc::new(config), Arc::new(client), Arc::new(kv)))
    }

    pub fn config(&self) -> &StudioConfig {
        &self.inner.config
    }

    pub fn history_store(&self) -> &HistoryStore {
        &self.inner.history
    }

    pub fn prompt_library(&self) -> &PromptLibrary {
        &self.inner.prompts
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StudioEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> &StudioEventBroadcaster {
        &self.inner.events
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> StudioState {
        self.lock_state().clone()
    }

    /// Snapshot of the visible run progress, `None` when no run is shown.
    pub fn progress(&self) -> Option<PipelineProgress> {
        self.lock_tracker().snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    fn lock_state(&self) -> MutexGuard<'_, StudioState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tracker(&self) -> MutexGuard<'_, PipelineTracker> {
        self.inner
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `f` to the state, then autosaves the task while an asset is
    /// loaded. The save happens under the state lock so the last write
    /// always reflects the latest state.
    fn update<R>(&self, f: impl FnOnce(&mut StudioState) -> R) -> R {
        let mut state = self.lock_state();
        let result = f(&mut state);
        if state.source.is_some() {
            self.persist(&TaskSnapshot::capture(&state));
        }
        result
    }

    /// Saves the task snapshot. A full store is reported once until a save
    /// succeeds again.
    fn persist(&self, snapshot: &TaskSnapshot) {
        match self.inner.task_cache.save(snapshot) {
            Ok(()) => self.inner.storage_full.store(false, Ordering::Release),
            Err(e) if e.is_quota_exceeded() => {
                if self.inner.storage_full.swap(true, Ordering::AcqRel) {
                    debug!(error = %e, "Current task not saved, store still full");
                } else {
                    warn!(error = %e, "Current task not saved, store is full");
                    self.inner
                        .events
                        .notify(NoticeLevel::Error, STORAGE_FULL_MESSAGE);
                }
            }
            Err(e) => warn!(error = %e, "Failed to save current task"),
        }
    }

    /// Runs a tracker mutation and broadcasts the resulting progress. A
    /// discarded tracker ignores the call.
    fn track(&self, f: impl FnOnce(&mut PipelineTracker) -> std::result::Result<(), TrackerError>) {
        let snapshot = {
            let mut tracker = self.lock_tracker();
            match f(&mut tracker) {
                Ok(()) => tracker.snapshot(),
                Err(TrackerError::NoActiveRun) => {
                    debug!("Progress update ignored: no active run");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Progress update rejected");
                    return;
                }
            }
        };
        self.inner
            .events
            .send(StudioEvent::Progress { progress: snapshot });
    }

    fn emit_view(&self) {
        let (view, progress_visible) = {
            let state = self.lock_state();
            (state.active_view, state.progress_visible)
        };
        self.inner.events.send(StudioEvent::View {
            view,
            progress_visible,
        });
    }

    fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        self.inner.events.notify(level, message);
    }

    /// Emits `CredentialRequired` and returns `false` when no API key is set.
    fn require_credentials(&self) -> bool {
        if self.inner.client.has_credentials() {
            return true;
        }
        self.inner.events.send(StudioEvent::CredentialRequired {
            message: "An API key is required. Configure one or set API_KEY / GEMINI_API_KEY."
                .to_string(),
        });
        false
    }

    fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    fn next_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn current_task(&self) -> u64 {
        self.inner.task.load(Ordering::Acquire)
    }

    /// Marks the current task as replaced. Call under the state lock.
    fn next_task(&self) {
        self.inner.task.fetch_add(1, Ordering::AcqRel);
    }

    /// Switches the analysis mode.
    pub fn set_mode(&self, mode: StudioMode) {
        self.update(|state| state.mode = mode);
    }

    pub fn set_use_reference_image(&self, enabled: bool) {
        self.update(|state| state.use_reference_image = enabled);
    }

    pub fn set_editable_prompt(&self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        self.update(|state| state.editable_prompt = prompt);
    }

    /// Clears the current task and its cache. History, generated images,
    /// selection and mode are kept.
    pub fn reset(&self) -> Result<()> {
        self.update(|state| {
            self.next_task();
            let mut fresh = state.cleared();
            fresh.generated_image = state.generated_image.take();
            fresh.selected_history_index = state.selected_history_index;
            *state = fresh;
        });
        self.inner.task_cache.clear()?;
        self.emit_view();
        Ok(())
    }
}

/// RAII guard for the in-flight latch; dropping it releases the latch on
/// every exit path.
struct RunLatch<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunLatch<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunLatch<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
