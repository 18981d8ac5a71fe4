//! App configuration loaded from JSON or YAML files.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use quay_engine::{ResolutionPolicy, SecurityPriority};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "QUAY_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse JSON config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to parse YAML config {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("openapi_path '{0}' must start with '/'")]
    InvalidOpenApiPath(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    /// Where the OpenAPI document is served; `None` disables it.
    pub openapi_path: Option<String>,
    pub security_priority: SecurityPriority,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "API".into(),
            version: "0.1.0".into(),
            description: None,
            openapi_path: Some("/openapi.json".into()),
            security_priority: SecurityPriority::default(),
        }
    }
}

impl AppConfig {
    /// Loads the file named by `QUAY_CONFIG_PATH`, or the defaults when it is unset.
    pub fn load() -> Result<Self, ConfigError> {
        match config_path_from(env::var(CONFIG_PATH_ENV).ok().as_deref()) {
            Some(path) => Self::from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Loads a config file; `.json` files are read as JSON and anything else as YAML.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
        let config: Self = if is_json {
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        };
        config.validate()?;
        debug!(path = %path.display(), title = %config.title, "loaded app config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.openapi_path {
            Some(path) if !path.starts_with('/') => Err(ConfigError::InvalidOpenApiPath(path.clone())),
            _ => Ok(()),
        }
    }

    pub fn policy(&self) -> ResolutionPolicy {
        ResolutionPolicy {
            security_priority: self.security_priority,
        }
    }
}

fn config_path_from(value: Option<&str>) -> Option<PathBuf> {
    value.map(str::trim).filter(|path| !path.is_empty()).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_and_json_files_are_detected_by_extension() {
        let temp_dir = tempfile::tempdir().unwrap();

        let yaml_path = temp_dir.path().join("quay.yaml");
        fs::write(&yaml_path, "title: Shop\nversion: \"2.0\"\nsecurity_priority: after_validation\n").unwrap();
        let config = AppConfig::from_path(&yaml_path).unwrap();
        assert_eq!(config.title, "Shop");
        assert_eq!(config.version, "2.0");
        assert_eq!(config.security_priority, SecurityPriority::AfterValidation);
        assert_eq!(config.openapi_path.as_deref(), Some("/openapi.json"));

        let json_path = temp_dir.path().join("quay.json");
        fs::write(&json_path, r#"{"description": "docs", "openapi_path": null}"#).unwrap();
        let config = AppConfig::from_path(&json_path).unwrap();
        assert_eq!(config.title, "API");
        assert_eq!(config.description.as_deref(), Some("docs"));
        assert_eq!(config.openapi_path, None);
    }

    #[test]
    fn invalid_files_report_their_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "{").unwrap();
        let error = AppConfig::from_path(&path).unwrap_err();
        assert!(matches!(error, ConfigError::Json { .. }));
        assert!(error.to_string().contains("broken.json"));

        let missing = AppConfig::from_path(&temp_dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }

    #[test]
    fn openapi_path_must_be_absolute() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("quay.yml");
        fs::write(&path, "openapi_path: docs.json\n").unwrap();
        assert!(matches!(AppConfig::from_path(&path), Err(ConfigError::InvalidOpenApiPath(_))));
    }

    #[test]
    fn blank_environment_values_fall_back_to_defaults() {
        assert_eq!(config_path_from(None), None);
        assert_eq!(config_path_from(Some("  ")), None);
        assert_eq!(config_path_from(Some("/etc/quay.yaml")), Some(PathBuf::from("/etc/quay.yaml")));
    }
}
