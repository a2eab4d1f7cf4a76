//! Global config file source: `$XDG_CONFIG_HOME/guardian/config.toml`, optional.

use crate::config::paths::xdg_root;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};
use std::path::Path;

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    match xdg_root::global_config_path() {
        Ok(path) => Ok(add_file(builder, &path, false)),
        Err(_) => Ok(builder),
    }
}

/// Add a TOML file; a missing file is only an error when `required`.
pub fn add_file(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
    required: bool,
) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        File::from(path)
            .format(FileFormat::Toml)
            .required(required),
    )
}
