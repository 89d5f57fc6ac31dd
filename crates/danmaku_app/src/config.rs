use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use danmaku_core::{BreakerPolicy, DEFAULT_CHUNK_SIZE};
use danmaku_engine::EngineSettings;
use engine_logging::{engine_info, engine_warn};
use serde::{Deserialize, Serialize};

use crate::persist::{write_atomic, PersistError};

pub const DEFAULT_CONFIG_PATH: &str = "danmaku.ron";
pub const DEFAULT_LOG_PATH: &str = "auto_send_log.txt";

/// Everything the front-end remembers between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub room_id: String,
    pub interval_secs: f64,
    pub randomize: bool,
    /// One message per entry; used unless `use_file` is set.
    pub messages: Vec<String>,
    pub cookie: String,
    pub use_file: bool,
    pub file: PathBuf,
    pub chunk_size: usize,
    pub half_weight: bool,
    pub require_login: bool,
    pub breaker_http_statuses: Vec<u16>,
    pub breaker_server_codes: Vec<i64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let breaker = BreakerPolicy::default();
        Self {
            room_id: String::new(),
            interval_secs: 2.0,
            randomize: false,
            messages: Vec::new(),
            cookie: String::new(),
            use_file: false,
            file: PathBuf::from("message.txt"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            half_weight: false,
            require_login: true,
            breaker_http_statuses: breaker.http_statuses,
            breaker_server_codes: breaker.server_codes,
        }
    }
}

impl AppConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            breaker: BreakerPolicy {
                http_statuses: self.breaker_http_statuses.clone(),
                server_codes: self.breaker_server_codes.clone(),
            },
            ..EngineSettings::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
    #[error("failed to write config: {0}")]
    Persist(#[from] PersistError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Loads the config, falling back to defaults when it is missing or unreadable.
pub fn load(path: &Path) -> AppConfig {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return AppConfig::default();
        }
        Err(err) => {
            engine_warn!("Failed to read config from {:?}: {}", path, err);
            return AppConfig::default();
        }
    };

    match ron::from_str(&content) {
        Ok(config) => {
            engine_info!("Loaded config from {:?}", path);
            config
        }
        Err(err) => {
            engine_warn!("Failed to parse config from {:?}: {}", path, err);
            AppConfig::default()
        }
    }
}

pub fn save(path: &Path, config: &AppConfig) -> Result<(), ConfigFileError> {
    let pretty = ron::ser::PrettyConfig::new();
    let content = ron::ser::to_string_pretty(config, pretty)?;
    write_atomic(path, &content)?;
    engine_info!("Saved config to {:?}", path);
    Ok(())
}

/// Removes the saved config. Returns `false` when there was nothing to remove.
pub fn delete(path: &Path) -> Result<bool, ConfigFileError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}
