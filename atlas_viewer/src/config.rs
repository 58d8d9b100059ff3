//! Viewer configuration.
//!
//! Loaded from `viewer_config.json`, overridable by `--config` or the
//! `ATLAS_VIEWER_CONFIG_PATH` environment variable.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use atlas_runtime::{MessageBundle, ServerDefinition};
use serde::Deserialize;
use thiserror::Error;

pub const BUILTIN_VIEWER_CONFIG: &str = include_str!("data/viewer_config.json");
pub const VIEWER_CONFIG_ENV: &str = "ATLAS_VIEWER_CONFIG_PATH";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub servers: Vec<ServerDefinition>,
    pub default_server: Option<String>,
    pub messages: MessageBundle,
    pub sidebar_state_path: Option<PathBuf>,
    pub request_timeout_ms: u64,
    /// Pending operations drained from each queue per poll cycle.
    pub render_batch_size: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            default_server: None,
            messages: MessageBundle::new(),
            sidebar_state_path: None,
            request_timeout_ms: 10_000,
            render_batch_size: 50,
        }
    }
}

impl ViewerConfig {
    pub fn builtin() -> Self {
        serde_json::from_str(BUILTIN_VIEWER_CONFIG).expect("builtin viewer config should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, ViewerConfigError> {
        let config: ViewerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ViewerConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ViewerConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ViewerConfig::from_json_str(&contents)
    }

    fn validate(&self) -> Result<(), ViewerConfigError> {
        if self.servers.is_empty() {
            return Err(ViewerConfigError::NoServers);
        }
        if let Some(default) = &self.default_server {
            if self.server(default).is_none() {
                return Err(ViewerConfigError::UnknownDefaultServer(default.clone()));
            }
        }
        Ok(())
    }

    pub fn server(&self, id: &str) -> Option<&ServerDefinition> {
        self.servers.iter().find(|server| server.id == id)
    }

    /// Server to connect to: an explicit request, then the configured
    /// default, then the first listed server.
    pub fn initial_server(&self, requested: Option<&str>) -> Option<&ServerDefinition> {
        match requested.or(self.default_server.as_deref()) {
            Some(id) => self.server(id),
            None => self.servers.first(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Error)]
pub enum ViewerConfigError {
    #[error("failed to parse viewer config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read viewer config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("viewer config lists no servers")]
    NoServers,
    #[error("viewer config default server {0} is not listed")]
    UnknownDefaultServer(String),
}

/// Load the viewer configuration from `--config`, then the environment, then
/// the builtin copy. Returns the file path used, if any.
pub fn load_viewer_config(cli_path: Option<PathBuf>) -> (ViewerConfig, Option<PathBuf>) {
    let override_path = cli_path.or_else(|| env::var(VIEWER_CONFIG_ENV).ok().map(PathBuf::from));

    if let Some(path) = override_path {
        match ViewerConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "atlas::config",
                    path = %path.display(),
                    "viewer_config.loaded=file"
                );
                return (config, Some(path));
            }
            Err(err) => {
                tracing::warn!(
                    target: "atlas::config",
                    path = %path.display(),
                    error = %err,
                    "viewer_config.load_failed"
                );
            }
        }
    }

    tracing::info!(target: "atlas::config", "viewer_config.loaded=builtin");
    (ViewerConfig::builtin(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_parses() {
        let config = ViewerConfig::builtin();
        config.validate().unwrap();
        assert_eq!(config.initial_server(None).unwrap().id, "local");
        assert_eq!(
            config.messages.get("chatErrorCooldown").map(String::as_str),
            Some("You may only chat once every %interval% seconds")
        );
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config = ViewerConfig::from_json_str(
            r#"{"servers":[{"id":"a","endpoints":{"configuration":"c","update":"u","markers":"m","sendmessage":"s"}}]}"#,
        )
        .unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.render_batch_size, 50);
        assert!(config.sidebar_state_path.is_none());
        assert_eq!(config.initial_server(None).unwrap().id, "a");
        assert!(config.initial_server(Some("b")).is_none());
    }

    #[test]
    fn unknown_default_server_is_rejected() {
        let err = ViewerConfig::from_json_str(
            r#"{"default_server":"b","servers":[{"id":"a","endpoints":{"configuration":"c","update":"u","markers":"m","sendmessage":"s"}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ViewerConfigError::UnknownDefaultServer(id) if id == "b"));
        assert!(matches!(
            ViewerConfig::from_json_str("{}"),
            Err(ViewerConfigError::NoServers)
        ));
    }

    #[test]
    fn explicit_path_wins_and_bad_files_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.json");
        fs::write(
            &path,
            r#"{"request_timeout_ms":250,"servers":[{"id":"x","endpoints":{"configuration":"c","update":"u","markers":"m","sendmessage":"s"}}]}"#,
        )
        .unwrap();

        let (config, source) = load_viewer_config(Some(path.clone()));
        assert_eq!(source.as_deref(), Some(path.as_path()));
        assert_eq!(config.request_timeout(), Duration::from_millis(250));

        fs::write(&path, "{broken").unwrap();
        let (config, source) = load_viewer_config(Some(path));
        assert!(source.is_none());
        assert_eq!(config.initial_server(None).unwrap().id, "local");
    }
}
