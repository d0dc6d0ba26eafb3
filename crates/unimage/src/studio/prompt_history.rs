use serde::{Deserialize, Serialize};

/// Maximum number of entries kept.
pub const PROMPT_HISTORY_LIMIT: usize = 20;

/// Recent prompts, newest first. Entries read `[source] HH:MM:SS\n<prompt>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptHistory {
    entries: Vec<String>,
}

impl PromptHistory {
    pub fn from_entries(entries: Vec<String>) -> Self {
        let mut history = Self { entries };
        history.entries.truncate(PROMPT_HISTORY_LIMIT);
        history
    }

    /// Records `prompt` from `source`. Blank prompts are ignored.
    pub fn push(&mut self, prompt: &str, source: &str) -> bool {
        let time = chrono::Local::now().format("%H:%M:%S").to_string();
        self.push_at(prompt, source, &time)
    }

    /// Front-inserts the entry after removing any identical one.
    pub fn push_at(&mut self, prompt: &str, source: &str, time: &str) -> bool {
        if prompt.trim().is_empty() {
            return false;
        }
        let entry = format!("[{}] {}\n{}", source, time, prompt);
        self.entries.retain(|existing| existing != &entry);
        self.entries.insert(0, entry);
        self.entries.truncate(PROMPT_HISTORY_LIMIT);
        true
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn latest(&self) -> Option<&str> {
        self.entries.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
