use std::path::{Path, PathBuf};

use crate::config::schema::{ApiMode, StudioConfig};
use crate::error::ConfigError;

/// `<config_dir>/unimage/config.yaml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("unimage").join("config.yaml"))
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<StudioConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Loads `path`, or the default location when `None`. A missing file yields
/// the default configuration.
pub fn load_config_or_default(path: Option<&Path>) -> Result<StudioConfig, ConfigError> {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => path,
        None => return Ok(StudioConfig::default()),
    };
    if !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(StudioConfig::default());
    }
    log::info!("Loading config from {}", path.display());
    load_config(&path)
}

pub fn load_config_from_str(content: &str) -> Result<StudioConfig, ConfigError> {
    if content.trim().is_empty() {
        return Ok(StudioConfig::default());
    }
    let config: StudioConfig = serde_yaml::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &StudioConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("models.reasoning", &config.models.reasoning),
        ("models.fast", &config.models.fast),
        ("models.image", &config.models.image),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("{} must not be empty", name),
            });
        }
    }

    if let Some(url) = &config.api.base_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Validation {
                message: format!("api.base_url must be an http(s) URL, got '{}'", url),
            });
        }
    }

    if config.api.mode == ApiMode::Custom && config.api.base_url.is_none() {
        log::warn!("api.mode is custom but no base_url is set; using the official endpoint");
    }

    if config.storage.quota_bytes == 0 {
        return Err(ConfigError::Validation {
            message: "storage.quota_bytes must be greater than zero".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.models.image, "gemini-2.5-flash-image");
        assert_eq!(config.pipeline.completion_delay_ms, 2000);
        assert_eq!(config.pipeline.video_completion_delay_ms, 1500);
        assert_eq!(config.api.mode, ApiMode::Official);
    }

    #[test]
    fn test_partial_config() {
        let yaml = r#"
api:
  mode: custom
  base_url: https://proxy.example.com
  api_key_env: MY_KEY
models:
  fast: fast-model
pipeline:
  completion_delay_ms: 0
"#;
        let config = load_config_from_str(yaml).unwrap();
        assert_eq!(config.api.mode, ApiMode::Custom);
        assert_eq!(config.api.api_key_env.as_deref(), Some("MY_KEY"));
        assert_eq!(config.models.fast, "fast-model");
        assert_eq!(config.models.reasoning, "gemini-3-flash-preview");
        assert_eq!(config.pipeline.completion_delay_ms, 0);
        assert_eq!(config.pipeline.video_completion_delay_ms, 1500);
    }

    #[test]
    fn test_rejects_empty_model() {
        let err = load_config_from_str("models:\n  image: \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let err = load_config_from_str("api:\n  base_url: ftp://x\n").unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_rejects_zero_quota() {
        let err = load_config_from_str("storage:\n  quota_bytes: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = load_config_from_str("models: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::ParseYaml(_)));
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "storage:\n  quota_bytes: 1024").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.storage.quota_bytes, 1024);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            load_config(&missing),
            Err(ConfigError::ReadFile { .. })
        ));
        let config = load_config_or_default(Some(&missing)).unwrap();
        assert_eq!(config.storage.quota_bytes, 256 * 1024 * 1024);
    }
}
