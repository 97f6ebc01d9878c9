//! Configuration file loading.

#[expect(clippy::module_inception, reason = "mirrors the file layout of the other modules")]
mod config;

pub use config::{CONFIG_FILE_CANDIDATES, Config, DEFAULT_CONFIG_YAML};
