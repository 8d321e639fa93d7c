use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use statekeep_core::ProjectScheme;
use thiserror::Error;

use crate::paths::PathRoots;
use crate::util::write_atomic;

pub const CONFIG_VERSION: u32 = 1;

/// 儲存設定可能發生的錯誤。 / Errors raised while loading or saving the storage configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read storage config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse storage config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize storage config {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write storage config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 專案配置的設定值。 / Project layout as written in the configuration file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeSetting {
    #[default]
    Default,
    Directory,
}

impl From<SchemeSetting> for ProjectScheme {
    fn from(setting: SchemeSetting) -> Self {
        match setting {
            SchemeSetting::Default => ProjectScheme::Default,
            SchemeSetting::Directory => ProjectScheme::DirectoryBased,
        }
    }
}

/// 檔案儲存後端的設定。 / Configuration of the file-system storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub paths: PathRoots,
    #[serde(default)]
    pub scheme: SchemeSetting,
    #[serde(default = "default_true")]
    pub watch: bool,
    #[serde(default = "default_temp_suffix")]
    pub temp_suffix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            paths: PathRoots::default(),
            scheme: SchemeSetting::default(),
            watch: true,
            temp_suffix: default_temp_suffix(),
        }
    }
}

impl StorageConfig {
    /// 載入設定；檔案不存在時回傳預設值。 / Loads the configuration, returning defaults when the file is missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut config: StorageConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        config.sanitize();
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).map_err(|source| ConfigError::Serialize {
                path: path.to_path_buf(),
                source,
            })?;
        write_atomic(path, payload.as_bytes(), &self.temp_suffix).map_err(|source| {
            ConfigError::Write {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// 修正不合法的值。 / Replaces out-of-range values with their defaults.
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = CONFIG_VERSION;
        }
        let suffix = self.temp_suffix.trim().trim_start_matches('.');
        if suffix.is_empty() || suffix.contains(['/', '\\']) {
            self.temp_suffix = default_temp_suffix();
        } else {
            self.temp_suffix = suffix.to_string();
        }
    }

    pub fn project_scheme(&self) -> ProjectScheme {
        self.scheme.into()
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_true() -> bool {
    true
}

fn default_temp_suffix() -> String {
    "tmp".to_string()
}
