//! Service configuration.
//!
//! Values are resolved in layers, later layers overriding earlier ones:
//! built-in defaults, an optional JSON config file, then environment
//! variables and CLI arguments (both handled by clap).

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Default production senseBox IDs from openSenseMap.
pub const DEFAULT_BOX_IDS: [&str; 3] = [
    "5c647389a100840019eea656",
    "66268770eaca630008ec4f9e",
    "6570eb180db9850007f21abe",
];

pub const DEFAULT_API_BASE: &str = "https://api.opensensemap.org";
/// German name used by openSenseMap for the temperature phenomenon.
pub const DEFAULT_PHENOMENON: &str = "Temperatur";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "senseBox temperature aggregation service", version)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    #[clap(long, env = "HIVEBOX_PORT", help = "Port to listen on.")]
    pub port: Option<u16>,

    #[clap(long, env = "HIVEBOX_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(
        long,
        env = "SENSEBOX_IDS",
        value_delimiter = ',',
        help = "Comma-separated senseBox IDs to aggregate."
    )]
    pub box_ids: Option<Vec<String>>,

    #[clap(long, env = "SENSEBOX_API_BASE", help = "Base URL of the openSenseMap API.")]
    pub api_base: Option<String>,

    #[clap(long, env = "SENSEBOX_PHENOMENON", help = "Sensor title identifying the temperature phenomenon.")]
    pub phenomenon: Option<String>,

    #[clap(long, env = "SENSEBOX_CONNECT_TIMEOUT", help = "Connect timeout in seconds for senseBox requests.")]
    pub connect_timeout_seconds: Option<u64>,

    #[clap(long, env = "SENSEBOX_READ_TIMEOUT", help = "Read timeout in seconds for senseBox requests.")]
    pub read_timeout_seconds: Option<u64>,

    #[clap(long, env = "HIVEBOX_FRESHNESS_WINDOW_SECONDS", help = "Maximum age of a reading to count toward the average.")]
    pub freshness_window_seconds: Option<u64>,

    #[clap(long, env = "HIVEBOX_CACHE_MAX_AGE_SECONDS", help = "Cache age beyond which readiness considers data stale.")]
    pub cache_max_age_seconds: Option<u64>,

    #[clap(long, env = "HIVEBOX_REFRESH_INTERVAL_SECONDS", help = "Interval between senseBox refresh cycles.")]
    pub refresh_interval_seconds: Option<u64>,

    #[clap(long, env = "HIVEBOX_FLUSH_INTERVAL_SECONDS", help = "Interval between storage flush cycles.")]
    pub flush_interval_seconds: Option<u64>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_level: other.log_level.or(self.log_level),
            box_ids: other.box_ids.or(self.box_ids),
            api_base: other.api_base.or(self.api_base),
            phenomenon: other.phenomenon.or(self.phenomenon),
            connect_timeout_seconds: other.connect_timeout_seconds.or(self.connect_timeout_seconds),
            read_timeout_seconds: other.read_timeout_seconds.or(self.read_timeout_seconds),
            freshness_window_seconds: other
                .freshness_window_seconds
                .or(self.freshness_window_seconds),
            cache_max_age_seconds: other.cache_max_age_seconds.or(self.cache_max_age_seconds),
            refresh_interval_seconds: other
                .refresh_interval_seconds
                .or(self.refresh_interval_seconds),
            flush_interval_seconds: other.flush_interval_seconds.or(self.flush_interval_seconds),
        }
    }
}

/// Fully resolved configuration, every field concrete.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub log_level: String,
    pub box_ids: Vec<String>,
    pub api_base: String,
    pub phenomenon: String,
    pub connect_timeout_seconds: u64,
    pub read_timeout_seconds: u64,
    pub freshness_window_seconds: u64,
    pub cache_max_age_seconds: u64,
    pub refresh_interval_seconds: u64,
    pub flush_interval_seconds: u64,
}

impl Settings {
    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.freshness_window_seconds as i64)
    }
}

fn defaults() -> Config {
    Config {
        port: Some(5000),
        log_level: Some("info".to_string()),
        box_ids: Some(DEFAULT_BOX_IDS.iter().map(|s| s.to_string()).collect()),
        api_base: Some(DEFAULT_API_BASE.to_string()),
        phenomenon: Some(DEFAULT_PHENOMENON.to_string()),
        connect_timeout_seconds: Some(2),
        read_timeout_seconds: Some(5),
        freshness_window_seconds: Some(3600),
        cache_max_age_seconds: Some(300),
        refresh_interval_seconds: Some(60),
        flush_interval_seconds: Some(300),
        ..Default::default()
    }
}

fn resolve(config: Config) -> Settings {
    // `config` is defaults merged under file/env/CLI, so every field is Some;
    // the unwrap fallbacks only restate the defaults.
    Settings {
        port: config.port.unwrap_or(5000),
        log_level: config.log_level.unwrap_or_else(|| "info".to_string()),
        box_ids: config.box_ids.unwrap_or_default(),
        api_base: config.api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        phenomenon: config
            .phenomenon
            .unwrap_or_else(|| DEFAULT_PHENOMENON.to_string()),
        connect_timeout_seconds: config.connect_timeout_seconds.unwrap_or(2),
        read_timeout_seconds: config.read_timeout_seconds.unwrap_or(5),
        freshness_window_seconds: config.freshness_window_seconds.unwrap_or(3600),
        cache_max_age_seconds: config.cache_max_age_seconds.unwrap_or(300),
        refresh_interval_seconds: config.refresh_interval_seconds.unwrap_or(60),
        flush_interval_seconds: config.flush_interval_seconds.unwrap_or(300),
    }
}

pub fn load() -> Settings {
    // 1. Built-in defaults.
    let mut current = defaults();

    // 2. Optional JSON config file; its path may itself come from CLI/env.
    let cli_args = Config::parse();
    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("hivebox.conf"));

    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
                Ok(file_config) => current = current.merge(file_config),
                Err(e) => eprintln!(
                    "Failed to parse config file {}: {e}. Falling back to other sources.",
                    config_file_path.display()
                ),
            },
            Err(e) => eprintln!(
                "Failed to read config file {}: {e}. Falling back to other sources.",
                config_file_path.display()
            ),
        }
    }

    // 3. Environment variables and CLI arguments override the file.
    current = current.merge(cli_args);

    resolve(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_override() {
        let base = defaults();
        let over = Config {
            port: Some(9000),
            box_ids: Some(vec!["abc".to_string()]),
            ..Default::default()
        };

        let merged = base.merge(over);
        assert_eq!(merged.port, Some(9000));
        assert_eq!(merged.box_ids.as_deref(), Some(&["abc".to_string()][..]));
        // Untouched fields keep their defaults.
        assert_eq!(merged.flush_interval_seconds, Some(300));
    }

    #[test]
    fn test_defaults_resolve_to_three_boxes() {
        let settings = resolve(defaults());
        assert_eq!(settings.box_ids.len(), 3);
        assert_eq!(settings.port, 5000);
        assert_eq!(settings.freshness_window_seconds, 3600);
        assert_eq!(settings.cache_max_age_seconds, 300);
    }

    #[test]
    fn test_config_file_shape_parses() {
        let file: Config = serde_json::from_str(
            r#"{ "port": 8080, "boxIds": ["a", "b"], "flushIntervalSeconds": 60 }"#,
        )
        .unwrap();
        let settings = resolve(defaults().merge(file));
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.box_ids, vec!["a", "b"]);
        assert_eq!(settings.flush_interval_seconds, 60);
    }
}
