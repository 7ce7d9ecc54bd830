//! CLI command implementations for `toolcast`.
//!
//! - [`validate`] -- Envelope stream validation.
//! - [`emit`] -- One-shot fallback delivery.
//! - [`config_cmd`] -- Resolved configuration.

pub mod config_cmd;
pub mod emit;
pub mod validate;

use std::path::Path;

use toolcast_types::ToolcastConfig;
use toolcast_types::config::{load_config_from, load_config as discover_and_load};

/// Load configuration from the given path override or via auto-discovery.
///
/// An explicit path must exist. Without one, `TOOLCAST_CONFIG` and then
/// `~/.toolcast/config.json` are tried, falling back to defaults.
pub fn load_config(config_override: Option<&Path>) -> anyhow::Result<ToolcastConfig> {
    match config_override {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            Ok(load_config_from(path)?)
        }
        None => Ok(discover_and_load()?),
    }
}
