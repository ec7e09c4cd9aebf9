use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_FS_NAME: &str = "hookfs";

/// Where a hooked filesystem comes from and where it is served.
///
/// ```toml
/// original = "/srv/data"
/// mountpoint = "/mnt/hooked"
/// fs_name = "hookfs"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    /// Directory whose contents are passed through.
    pub original: PathBuf,
    pub mountpoint: PathBuf,
    #[serde(default = "default_fs_name")]
    pub fs_name: String,
}

fn default_fs_name() -> String {
    DEFAULT_FS_NAME.to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {message}")]
    Invalid { message: String },
}

impl MountConfig {
    pub fn new(original: impl Into<PathBuf>, mountpoint: impl Into<PathBuf>) -> Self {
        Self {
            original: original.into(),
            mountpoint: mountpoint.into(),
            fs_name: default_fs_name(),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks that do not depend on the mount having happened yet.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fs_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "fs_name must not be empty".to_string(),
            });
        }
        if self.mountpoint.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                message: "mountpoint must not be empty".to_string(),
            });
        }
        if !self.original.is_dir() {
            return Err(ConfigError::Invalid {
                message: format!("original {} is not a directory", self.original.display()),
            });
        }
        Ok(())
    }
}
