use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::inference::ResizeFilter;

pub const CONFIG_PATH_VAR: &str = "CASTING_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "config/server.yaml";
const MODEL_FILE: &str = "CastingModel.pt";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid value {value:?} for {key}")]
    InvalidOverride { key: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_any_origin: bool,
    pub allowed_origins: Vec<String>,
    pub max_age: usize,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_any_origin: true,
            allowed_origins: Vec::new(),
            max_age: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub workers: Option<usize>,
    pub warmup: bool,
    pub resize_filter: ResizeFilter,
    pub max_payload_bytes: usize,
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            model_path: default_model_path(),
            workers: None,
            warmup: true,
            resize_filter: ResizeFilter::default(),
            max_payload_bytes: usize::MAX,
            cors: CorsConfig::default(),
        }
    }
}

/// The model and config ship next to the backend crate; outside cargo, look
/// in the working directory.
fn relative_to_workspace(manifest_dir: Option<&str>, file: &str) -> PathBuf {
    match manifest_dir {
        Some(manifest_dir) => Path::new(manifest_dir).join("..").join(file),
        None => PathBuf::from(file),
    }
}

fn default_model_path() -> PathBuf {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").ok();
    relative_to_workspace(manifest_dir.as_deref(), MODEL_FILE)
}

/// An explicit path always wins; otherwise the default file is used only if
/// it exists.
pub fn resolve_config_path(
    explicit: Option<PathBuf>,
    manifest_dir: Option<&str>,
) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }
    let candidate = relative_to_workspace(manifest_dir, DEFAULT_CONFIG_FILE);
    candidate.exists().then_some(candidate)
}

impl ServerConfig {
    /// Defaults, then the YAML file (if any), then environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from);
        let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").ok();
        let mut config = match resolve_config_path(explicit, manifest_dir.as_deref()) {
            Some(path) => {
                log::info!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&config_str).map_err(|source| ConfigError::Yaml {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, serde_yaml::Error> {
        if config_str.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(config_str)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = parse_override("PORT", &port)?;
        }
        if let Some(model_path) = lookup("MODEL_PATH") {
            self.model_path = PathBuf::from(model_path);
        }
        if let Some(workers) = lookup("WORKERS") {
            self.workers = Some(parse_override("WORKERS", &workers)?);
        }
        if let Some(warmup) = lookup("WARMUP") {
            self.warmup = parse_override("WARMUP", &warmup)?;
        }
        Ok(())
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

fn parse_override<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride {
            key,
            value: value.to_string(),
        })
}
