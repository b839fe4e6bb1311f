//! Configuration system (spec §2.1, §9.1).
//!
//! Layered the way the teacher's `config.rs` does: `config.toml` as the base,
//! `config.local.toml` for git-ignored local overrides, then `SEARCHGATE_*`
//! environment variables on top, all merged with `figment`.

use std::path::PathBuf;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub search: SearchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for on-disk snapshots/bulk import staging (unused by the
    /// in-memory engine today, kept for the persistent engine this one will
    /// eventually be swapped for).
    pub data_dir: PathBuf,

    #[serde(default = "default_true")]
    pub auto_create_indexes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_size")]
    pub default_size: usize,

    /// Default scroll ttl in the `<int><unit>` grammar (spec §4.7).
    #[serde(default = "default_scroll_ttl")]
    pub default_scroll_ttl: String,

    /// Hard cap on a requested scroll ttl, same grammar.
    #[serde(default = "default_scroll_ttl_cap")]
    pub scroll_ttl_cap: String,

    #[serde(default = "default_composite_batch_size")]
    pub composite_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_true() -> bool {
    true
}
fn default_search_size() -> usize {
    10
}
fn default_scroll_ttl() -> String {
    "1m".to_string()
}
fn default_scroll_ttl_cap() -> String {
    "1h".to_string()
}
fn default_composite_batch_size() -> usize {
    10_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Loads configuration from the default locations.
    ///
    /// Merges in order:
    /// 1. `config.toml` (base configuration)
    /// 2. `config.local.toml` (local overrides, git-ignored)
    /// 3. Environment variables (`SEARCHGATE_*` prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("SEARCHGATE_").split("__"))
            .extract()
    }

    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SEARCHGATE_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig { data_dir: PathBuf::from("./data"), auto_create_indexes: true },
            search: SearchConfig {
                default_size: default_search_size(),
                default_scroll_ttl: default_scroll_ttl(),
                scroll_ttl_cap: default_scroll_ttl_cap(),
                composite_batch_size: default_composite_batch_size(),
            },
            logging: LoggingConfig { level: default_log_level(), format: default_log_format() },
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level(), format: default_log_format() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_search_values() {
        let config = Config::default();
        assert_eq!(config.search.default_size, 10);
        assert_eq!(config.search.scroll_ttl_cap, "1h");
    }

    #[test]
    fn env_override_layers_over_base_config() {
        std::env::set_var("SEARCHGATE_SEARCH__DEFAULT_SIZE", "25");
        let config: Config = Figment::new()
            .merge(Toml::string("[storage]\ndata_dir = \"./data\"\n[search]\ndefault_size = 10\n"))
            .merge(Env::prefixed("SEARCHGATE_").split("__"))
            .extract()
            .unwrap();
        std::env::remove_var("SEARCHGATE_SEARCH__DEFAULT_SIZE");
        assert_eq!(config.search.default_size, 25);
    }
}
