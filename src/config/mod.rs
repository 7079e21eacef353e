//! Run configuration: loading and types.

mod types;

pub use types::{Config, FormatInfo, PreResizeConfig, TargetFormat, TranscodeConfig};

use anyhow::{Context, Result};
use std::path::Path;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "slidecast.toml";

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Load configuration, falling back to defaults when no file exists.
///
/// An explicit `path` that cannot be read or parsed is an error; the
/// implicit default location is allowed to be absent.
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.exists() {
                load_config(default)
            } else {
                Ok(Config::default())
            }
        }
    }
}
