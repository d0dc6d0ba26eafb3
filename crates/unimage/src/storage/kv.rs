//! Directory-backed key/value store: one JSON file per key.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

const RECORD_EXTENSION: &str = "json";

pub struct KvStore {
    dir: PathBuf,
    quota_bytes: u64,
}

impl KvStore {
    /// Opens (creating if needed) the store rooted at `dir`. Writes that
    /// would push the total size of all records past `quota_bytes` fail with
    /// [`StorageError::QuotaExceeded`].
    pub fn open<P: AsRef<Path>>(dir: P, quota_bytes: u64) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::CreateDirectory {
            path: dir.clone(),
            source: e,
        })?;
        log::debug!("Opened store at {}", dir.display());
        Ok(Self { dir, quota_bytes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.{}", name, RECORD_EXTENSION))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let path = self.path_for(key);
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::ReadFile { path, source: e }),
        };
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                key: key.to_string(),
                source: e,
            })
    }

    /// Values for `keys` in order; missing keys yield `None`.
    pub fn get_many<T: DeserializeOwned>(
        &self,
        keys: &[String],
    ) -> Result<Vec<Option<T>>, StorageError> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Writes `value` under `key`, replacing any previous value.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let content = serde_json::to_vec(value).map_err(|e| StorageError::Serialize {
            key: key.to_string(),
            source: e,
        })?;
        let path = self.path_for(key);

        let existing = file_size(&path);
        let needed = self.usage()?.saturating_sub(existing) + content.len() as u64;
        if needed > self.quota_bytes {
            log::warn!(
                "Refusing to write '{}': {} bytes needed, quota {}",
                key,
                needed,
                self.quota_bytes
            );
            return Err(StorageError::QuotaExceeded {
                needed,
                quota: self.quota_bytes,
            });
        }

        // Write to a unique temp file, then rename over the record
        let tmp = self
            .dir
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        std::fs::write(&tmp, &content).map_err(|e| StorageError::WriteFile {
            path: tmp.clone(),
            source: e,
        })?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(StorageError::WriteFile { path, source: e });
        }
        Ok(())
    }

    /// Removes `key`. Removing a missing key is not an error.
    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFile { path, source: e }),
        }
    }

    /// Total size in bytes of all stored records.
    pub fn usage(&self) -> Result<u64, StorageError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| StorageError::ReadFile {
            path: self.dir.clone(),
            source: e,
        })?;
        let total = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry.path().extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
            })
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum();
        Ok(total)
    }
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
