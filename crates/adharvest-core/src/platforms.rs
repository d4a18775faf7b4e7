use std::collections::HashMap;
use std::num::NonZeroU32;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chunking::ChunkSize;
use crate::domain::{CollectionType, Platform};
use crate::ConfigError;

const fn default_max_retry_attempts() -> u32 {
    3
}

/// Static per-platform tuning. Read-only at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub platform: Platform,
    pub display_name: String,
    /// Days per chunk for ad-level collection.
    pub chunk_size_days: NonZeroU32,
    /// Days per chunk for demographic breakdowns. Falls back to
    /// `chunk_size_days` when unset.
    #[serde(default)]
    pub demographics_chunk_size_days: Option<NonZeroU32>,
    /// Pause between sequential requests on the direct collection path.
    #[serde(default)]
    pub rate_limit_delay_ms: u64,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default)]
    pub oauth_enabled: bool,
    #[serde(default)]
    pub oauth_scopes: Vec<String>,
    /// API version segment, e.g. `v21.0` for the Graph API.
    #[serde(default)]
    pub api_version: Option<String>,
}

impl PlatformConfig {
    /// Chunk size to plan `collection_type` with.
    #[must_use]
    pub fn chunk_size_for(&self, collection_type: CollectionType) -> ChunkSize {
        match collection_type {
            CollectionType::Ads => ChunkSize::Days(self.chunk_size_days),
            CollectionType::Demographics => ChunkSize::Days(
                self.demographics_chunk_size_days
                    .unwrap_or(self.chunk_size_days),
            ),
            CollectionType::Creatives => ChunkSize::Unbounded,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlatformsFile {
    pub platforms: Vec<PlatformConfig>,
}

/// Lookup table of validated platform configs.
#[derive(Debug, Clone, Default)]
pub struct PlatformRegistry {
    configs: HashMap<Platform, PlatformConfig>,
}

impl PlatformRegistry {
    /// Builds a registry from already-parsed configs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] on duplicate platforms or an
    /// OAuth-enabled platform without scopes.
    pub fn from_configs(configs: Vec<PlatformConfig>) -> Result<Self, ConfigError> {
        let mut map = HashMap::with_capacity(configs.len());
        for config in configs {
            if config.oauth_enabled && config.oauth_scopes.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "platform '{}' enables OAuth but lists no oauth_scopes",
                    config.platform
                )));
            }
            let platform = config.platform;
            if map.insert(platform, config).is_some() {
                return Err(ConfigError::Validation(format!(
                    "duplicate platform entry: '{platform}'"
                )));
            }
        }
        Ok(Self { configs: map })
    }

    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<&PlatformConfig> {
        self.configs.get(&platform)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlatformConfig> {
        self.configs.values()
    }
}

/// Load and validate platform configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_platforms(path: &Path) -> Result<PlatformRegistry, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::PlatformsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_platforms(&content)
}

/// Parse and validate platform configuration from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_platforms(content: &str) -> Result<PlatformRegistry, ConfigError> {
    let file: PlatformsFile =
        serde_yaml::from_str(content).map_err(ConfigError::PlatformsFileParse)?;
    PlatformRegistry::from_configs(file.platforms)
}
