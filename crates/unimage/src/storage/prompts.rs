//! Per-role prompt library: named system-instruction versions with one
//! optionally active version per role.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentRole;
use crate::error::StorageError;

use super::kv::KvStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptVersion {
    pub id: String,
    pub name: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

impl PromptVersion {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            content: content.into(),
            updated_at: Utc::now(),
        }
    }
}

fn versions_key(role: AgentRole) -> String {
    format!("prompt_versions_{}", role.as_str())
}

fn active_key(role: AgentRole) -> String {
    format!("prompt_active_{}", role.as_str())
}

#[derive(Clone)]
pub struct PromptLibrary {
    kv: Arc<KvStore>,
}

impl PromptLibrary {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    pub fn versions(&self, role: AgentRole) -> Result<Vec<PromptVersion>, StorageError> {
        Ok(self.kv.get(&versions_key(role))?.unwrap_or_default())
    }

    pub fn active_version_id(&self, role: AgentRole) -> Result<Option<String>, StorageError> {
        self.kv.get(&active_key(role))
    }

    /// Inserts `version`, or replaces the one with the same id.
    pub fn save_version(&self, role: AgentRole, version: PromptVersion) -> Result<(), StorageError> {
        let mut versions = self.versions(role)?;
        match versions.iter_mut().find(|v| v.id == version.id) {
            Some(existing) => *existing = version,
            None => versions.push(version),
        }
        self.kv.set(&versions_key(role), &versions)
    }

    /// Returns `false` when no version with `id` exists for `role`.
    pub fn set_active_version(&self, role: AgentRole, id: &str) -> Result<bool, StorageError> {
        if !self.versions(role)?.iter().any(|v| v.id == id) {
            return Ok(false);
        }
        self.kv.set(&active_key(role), id)?;
        log::info!("Activated prompt version {} for {}", id, role);
        Ok(true)
    }

    pub fn clear_active_version(&self, role: AgentRole) -> Result<(), StorageError> {
        self.kv.delete(&active_key(role))
    }

    /// Removes a version; deleting the active one falls back to the built-in
    /// instruction.
    pub fn delete_version(&self, role: AgentRole, id: &str) -> Result<(), StorageError> {
        let versions: Vec<PromptVersion> = self
            .versions(role)?
            .into_iter()
            .filter(|v| v.id != id)
            .collect();
        self.kv.set(&versions_key(role), &versions)?;
        if self.active_version_id(role)?.as_deref() == Some(id) {
            self.clear_active_version(role)?;
        }
        Ok(())
    }

    /// Content of the active version, if one is set and still exists.
    pub fn instruction_for(&self, role: AgentRole) -> Result<Option<String>, StorageError> {
        let Some(active) = self.active_version_id(role)? else {
            return Ok(None);
        };
        Ok(self
            .versions(role)?
            .into_iter()
            .find(|v| v.id == active)
            .map(|v| v.content))
    }

    /// Active overrides for `roles`.
    pub fn resolve_all(
        &self,
        roles: &[AgentRole],
    ) -> Result<BTreeMap<AgentRole, String>, StorageError> {
        let mut instructions = BTreeMap::new();
        for role in roles {
            if let Some(content) = self.instruction_for(*role)? {
                instructions.insert(*role, content);
            }
        }
        Ok(instructions)
    }
}
