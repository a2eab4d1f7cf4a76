//! MergeService: orchestrates sources, applies merge policy, deserializes to CoreConfig.

use crate::config::merge::builder_with_defaults;
use crate::config::sources::{environment, global_file};
use crate::config::CoreConfig;
use config::ConfigError;
use std::path::Path;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config from standard sources.
    /// Precedence: defaults (lowest) -> global file -> environment (highest).
    pub fn load() -> Result<CoreConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }

    /// Load config from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<CoreConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_file(builder, path, true);
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }
}
