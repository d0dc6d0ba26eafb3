//! Local persistence: a quota-bounded JSON record store and the task cache,
//! history and prompt library built on it.

pub mod history;
pub mod kv;
pub mod prompts;
pub mod task;

pub use history::{HistoryItem, HistoryStore, ReferenceImage, HISTORY_INDEX_KEY};
pub use kv::KvStore;
pub use prompts::{PromptLibrary, PromptVersion};
pub use task::{TaskCache, TaskSnapshot, TASK_CACHE_KEY};
