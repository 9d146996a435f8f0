use std::path::Path;
use thiserror::Error;

use crate::settings::types::EdgecastConfig;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load a config from a JSON file, returning defaults on missing file.
pub fn load(path: &Path) -> Result<EdgecastConfig, SettingsError> {
    if !path.exists() {
        tracing::debug!("no config at {}, using defaults", path.display());
        return Ok(EdgecastConfig::default());
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Save a config to disk atomically (write .tmp then rename).
pub fn save(path: &Path, config: &EdgecastConfig) -> Result<(), SettingsError> {
    let json = serde_json::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::types::SourceKind;
    use tempfile::TempDir;

    #[test]
    fn load_returns_default_when_file_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nonexistent.json");
        assert_eq!(load(&path).unwrap(), EdgecastConfig::default());
    }

    #[test]
    fn load_parses_valid_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("edgecast.json");
        std::fs::write(&path, r#"{"source":{"kind":"webcam","fps":15}}"#).unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.source.kind, SourceKind::Webcam);
        assert_eq!(config.source.fps, 15);
        assert_eq!(config.source.width, 640);
    }

    #[test]
    fn load_returns_error_for_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("edgecast.json");
        std::fs::write(&path, "not valid json!!!").unwrap();

        assert!(matches!(load(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn save_round_trips_through_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("edgecast.json");
        let mut config = EdgecastConfig::default();
        config.relay.jpeg_quality = 55;
        config.filter.enabled = false;
        save(&path, &config).unwrap();

        assert_eq!(load(&path).unwrap(), config);
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deep").join("edgecast.json");
        save(&path, &EdgecastConfig::default()).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn save_is_atomic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("edgecast.json");
        save(&path, &EdgecastConfig::default()).unwrap();

        // The temporary file must not survive the rename.
        assert!(!dir.path().join("edgecast.json.tmp").exists());
        assert!(path.exists());
    }
}
