//! `proflens.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::Path;

use crate::{DEFAULT_LEAK_LIMIT, DEFAULT_LEAK_THRESHOLD, LeakOptions, OutputFormat};

pub const DEFAULT_CONFIG_FILE: &str = "proflens.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Rows per ranked section when `--top-n` is not given.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Default report format for `analyze`.
    #[serde(default = "default_format")]
    pub format: OutputFormat,

    /// Minimum growth fraction for `leaks`.
    #[serde(default = "default_leak_threshold")]
    pub leak_threshold: f64,

    #[serde(default = "default_leak_limit")]
    pub leak_limit: usize,
}

fn default_top_n() -> usize {
    5
}

fn default_format() -> OutputFormat {
    OutputFormat::Text
}

fn default_leak_threshold() -> f64 {
    DEFAULT_LEAK_THRESHOLD
}

fn default_leak_limit() -> usize {
    DEFAULT_LEAK_LIMIT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            format: default_format(),
            leak_threshold: default_leak_threshold(),
            leak_limit: default_leak_limit(),
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// Leak options with CLI overrides applied on top of the config values.
    pub fn leak_options(&self, threshold: Option<f64>, limit: Option<usize>) -> LeakOptions {
        LeakOptions {
            threshold: threshold.unwrap_or(self.leak_threshold),
            limit: limit.unwrap_or(self.leak_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("proflens-config-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = Config::load_optional(&temp_path("absent.toml"));
        assert_eq!(cfg.top_n, 5);
        assert_eq!(cfg.format, OutputFormat::Text);
        assert_eq!(cfg.leak_threshold, 0.10);
        assert_eq!(cfg.leak_limit, 10);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let path = temp_path(DEFAULT_CONFIG_FILE);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "top_n = 12\nformat = \"flamegraph-json\"\n").expect("write");
        let cfg = Config::load_optional(&path);
        assert_eq!(cfg.top_n, 12);
        assert_eq!(cfg.format, OutputFormat::FlamegraphJson);
        assert_eq!(cfg.leak_limit, 10);
    }

    #[test]
    fn malformed_file_falls_back() {
        let path = temp_path(DEFAULT_CONFIG_FILE);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "top_n = \"many\"").expect("write");
        let cfg = Config::load_optional(&path);
        assert_eq!(cfg.top_n, 5);
    }

    #[test]
    fn cli_overrides_win() {
        let cfg = Config {
            leak_threshold: 0.5,
            leak_limit: 3,
            ..Config::default()
        };
        let opts = cfg.leak_options(Some(0.2), None);
        assert_eq!(opts.threshold, 0.2);
        assert_eq!(opts.limit, 3);
    }
}
