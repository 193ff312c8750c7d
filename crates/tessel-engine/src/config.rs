//! Engine configuration.
//!
//! Settings are read from `tessel.toml` when present and can be overridden
//! from the environment for one-off runs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::logging::LoggingConfig;

/// How a copy whose source and destination are the same pixmap is executed.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfCopyPolicy {
    /// Always stage through a temporary surface.
    #[default]
    AlwaysTemp,
    /// Copy in place behind a texture barrier when the device has one and the
    /// source and destination do not overlap.
    BarrierWhenDisjoint,
}

/// Device a context is opened on.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendChoice {
    #[default]
    Wgpu,
    Soft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Caps the block size of large pixmaps below the device maximum.
    pub max_tile_size: Option<u32>,
    pub self_copy: SelfCopyPolicy,
    /// Destroyed surfaces kept for reuse per (size, format).
    pub surface_pool_per_key: usize,
    /// Texel bytes the surface pool may hold across all keys.
    pub surface_pool_bytes: u64,
    pub backend: BackendChoice,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tile_size: None,
            self_copy: SelfCopyPolicy::AlwaysTemp,
            surface_pool_per_key: 4,
            surface_pool_bytes: 64 << 20,
            backend: BackendChoice::Wgpu,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub const DEFAULT_PATH: &'static str = "tessel.toml";

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_err = |reason: String| EngineError::Config {
            path: path.display().to_string(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| config_err(e.to_string()))?;
        Self::from_toml(&content).map_err(|e| match e {
            EngineError::Config { reason, .. } => config_err(reason),
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| EngineError::Config {
            path: "<inline>".into(),
            reason: e.to_string(),
        })
    }

    /// Loads `tessel.toml` from the working directory, or the defaults when
    /// it is missing or unreadable.
    pub fn load_or_default() -> Self {
        match Self::load_from_file(Self::DEFAULT_PATH) {
            Ok(c) => c,
            Err(e) => {
                if Path::new(Self::DEFAULT_PATH).exists() {
                    log::warn!("{e}; using defaults");
                }
                Self::default()
            }
        }
    }

    /// Applies `TESSEL_*` environment overrides. Unparsable values are
    /// ignored with a warning.
    pub fn merge_with_env(&mut self) {
        self.merge_from(|key| std::env::var(key).ok());
    }

    fn merge_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(val) = get("TESSEL_MAX_TILE") {
            match val.parse::<u32>() {
                Ok(0) => self.max_tile_size = None,
                Ok(n) => self.max_tile_size = Some(n),
                Err(_) => log::warn!("ignoring TESSEL_MAX_TILE={val}"),
            }
        }
        if let Some(val) = get("TESSEL_BACKEND") {
            match val.to_ascii_lowercase().as_str() {
                "wgpu" | "gpu" => self.backend = BackendChoice::Wgpu,
                "soft" | "software" => self.backend = BackendChoice::Soft,
                _ => log::warn!("ignoring TESSEL_BACKEND={val}"),
            }
        }
        if let Some(val) = get("TESSEL_SELF_COPY") {
            match val.to_ascii_lowercase().as_str() {
                "temp" | "always_temp" => self.self_copy = SelfCopyPolicy::AlwaysTemp,
                "barrier" | "barrier_when_disjoint" => {
                    self.self_copy = SelfCopyPolicy::BarrierWhenDisjoint
                }
                _ => log::warn!("ignoring TESSEL_SELF_COPY={val}"),
            }
        }
        if let Some(val) = get("TESSEL_LOG") {
            self.logging.filter = Some(val);
        }
    }
}
