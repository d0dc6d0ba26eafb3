//! API key resolution.
//!
//! Sources are tried in priority order:
//!
//! 1. **Direct value** - `api.api_key` in the config file
//! 2. **File reference** - `api.api_key_file`, e.g. a mounted secret
//! 3. **Named env var** - `api.api_key_env`
//! 4. **Well-known env vars** - `API_KEY`, then `GEMINI_API_KEY`

use secrecy::SecretString;
use std::fs;

use crate::config::schema::ApiConfig;
use crate::error::ConfigError;

const FALLBACK_ENV_VARS: [&str; 2] = ["API_KEY", "GEMINI_API_KEY"];

/// Resolves the API key, returning `None` when no source provides one.
///
/// A configured key file that cannot be read is an error; an unset env var
/// just moves on to the next source.
pub fn resolve_api_key(api: &ApiConfig) -> Result<Option<SecretString>, ConfigError> {
    // Priority 1: Direct value
    if let Some(value) = non_empty(api.api_key.as_deref()) {
        return Ok(Some(SecretString::from(value.to_string())));
    }

    // Priority 2: File
    if let Some(path) = non_empty(api.api_key_file.as_deref()) {
        let expanded = expand_home(path);
        let content = fs::read_to_string(&expanded).map_err(|e| ConfigError::KeyFile {
            path: expanded.clone(),
            source: e,
        })?;
        let trimmed = content.trim();
        if !trimmed.is_empty() {
            log::debug!("API key loaded from file {}", expanded);
            return Ok(Some(SecretString::from(trimmed.to_string())));
        }
    }

    // Priority 3 and 4: Environment variables
    let named = non_empty(api.api_key_env.as_deref());
    for name in named.into_iter().chain(FALLBACK_ENV_VARS) {
        if let Some(value) = read_env(name)? {
            log::debug!("API key loaded from ${}", name);
            return Ok(Some(value));
        }
    }

    Ok(None)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn read_env(name: &str) -> Result<Option<SecretString>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => {
            // Env vars may have trailing newlines
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(SecretString::from(trimmed)))
            }
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::EnvVarNotUnicode {
            name: name.to_string(),
        }),
    }
}

fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
