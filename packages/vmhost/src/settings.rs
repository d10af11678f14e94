//! Settings consumed when the runtime is launched.
//!
//! The host only needs three values: where the runtime is installed, how
//! large its heap may grow, and (optionally) a default class path. They are
//! kept in a small JSON document so hosts can persist them between runs.

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Environment variable overriding [`VmSettings::java_path`].
pub const JAVA_PATH_VAR: &str = "VMHOST_JAVA_PATH";

/// Environment variable overriding [`VmSettings::max_heap_mb`].
pub const MAX_HEAP_VAR: &str = "VMHOST_MAX_HEAP_MB";

lazy_static! {
    static ref DEFAULT_SETTINGS_PATH: Option<PathBuf> =
        dirs::config_dir().map(|dir| dir.join("vmhost").join("settings.json"));
}

fn default_max_heap_mb() -> u32 {
    512
}

/// Runtime launch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmSettings {
    /// Installation directory of the runtime, if known.
    pub java_path: Option<PathBuf>,

    /// Maximum heap size in megabytes.
    #[serde(default = "default_max_heap_mb")]
    pub max_heap_mb: u32,

    /// Class path used when the caller does not supply one.
    pub class_path: Option<String>,
}

impl Default for VmSettings {
    fn default() -> Self {
        Self {
            java_path: None,
            max_heap_mb: default_max_heap_mb(),
            class_path: None,
        }
    }
}

impl VmSettings {
    /// The per-user settings file, if the platform has a config directory.
    pub fn default_path() -> Option<&'static Path> {
        DEFAULT_SETTINGS_PATH.as_deref()
    }

    /// Load settings from a JSON file.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write settings to a JSON file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `VMHOST_JAVA_PATH` and `VMHOST_MAX_HEAP_MB` from the environment.
    pub fn with_env_overrides(self) -> Result<Self, SettingsError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        if let Some(java_path) = lookup(JAVA_PATH_VAR).filter(|v| !v.is_empty()) {
            self.java_path = Some(PathBuf::from(java_path));
        }
        if let Some(heap) = lookup(MAX_HEAP_VAR) {
            self.max_heap_mb = heap
                .trim()
                .parse()
                .map_err(|_| SettingsError::InvalidOverride {
                    name: MAX_HEAP_VAR,
                    value: heap,
                })?;
        }
        Ok(self)
    }
}
