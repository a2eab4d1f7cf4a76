//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::CoreConfig;
use crate::error::ApiError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the global file and environment, then validate it.
    pub fn load() -> Result<CoreConfig, ApiError> {
        let config = MergeService::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file, then validate it.
    pub fn load_from_file(path: &Path) -> Result<CoreConfig, ApiError> {
        let config = MergeService::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Create default configuration.
    pub fn default() -> CoreConfig {
        CoreConfig::default()
    }
}
