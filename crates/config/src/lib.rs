use std::fs::{read_to_string, write};

use camino::Utf8Path;
use eyre::{Result as EyreResult, WrapErr};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "xds-cache.toml";

/// Histogram buckets, in seconds, for every duration the cache records.
pub const DEFAULT_DURATION_BUCKETS: &[f64] = &[0.01, 0.03, 0.1, 0.3, 0.5, 1.0, 3.0, 5.0, 10.0];

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[non_exhaustive]
pub struct CacheConfig {
    #[serde(default)]
    pub broadcast: BroadcastPolicy,

    #[serde(default)]
    pub reopen: ReopenPolicy,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// What a snapshot broadcast does when assigning to one node fails.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BroadcastPolicy {
    /// Stop at the first failed assignment and report it.
    #[default]
    FailFast,
    /// Attempt every member node, then report the first failure.
    BestEffort,
}

/// What opening an already registered stream ID does.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReopenPolicy {
    /// Restart the stream's timer and forget its node binding.
    #[default]
    Reset,
    /// Refuse the open and leave the existing registration untouched.
    Reject,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct MetricsConfig {
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            duration_buckets: default_duration_buckets(),
        }
    }
}

fn default_duration_buckets() -> Vec<f64> {
    DEFAULT_DURATION_BUCKETS.to_vec()
}

impl CacheConfig {
    #[must_use]
    pub const fn new(
        broadcast: BroadcastPolicy,
        reopen: ReopenPolicy,
        metrics: MetricsConfig,
    ) -> Self {
        Self {
            broadcast,
            reopen,
            metrics,
        }
    }

    #[must_use]
    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(CONFIG_FILE).is_file()
    }

    pub fn load(dir: &Utf8Path) -> EyreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let content = read_to_string(&path)
            .wrap_err_with(|| format!("failed to read configuration from {path:?}"))?;

        toml::from_str(&content)
            .wrap_err_with(|| format!("failed to parse configuration from {path:?}"))
    }

    pub fn save(&self, dir: &Utf8Path) -> EyreResult<()> {
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;

        write(&path, content)
            .wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn test_defaults_match_observed_behavior() {
        let config = CacheConfig::default();

        assert_eq!(config.broadcast, BroadcastPolicy::FailFast);
        assert_eq!(config.reopen, ReopenPolicy::Reset);
        assert_eq!(config.metrics.duration_buckets, DEFAULT_DURATION_BUCKETS);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config: CacheConfig = toml::from_str("broadcast = \"best-effort\"\n").unwrap();

        assert_eq!(config.broadcast, BroadcastPolicy::BestEffort);
        assert_eq!(config.reopen, ReopenPolicy::Reset);
        assert_eq!(config.metrics.duration_buckets.len(), 9);
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new("xds-cache-config").unwrap();
        let dir = Utf8PathBuf::from_path_buf(tmp.path().to_owned()).unwrap();

        assert!(!CacheConfig::exists(&dir), "fresh directory has no config");

        let config = CacheConfig::new(
            BroadcastPolicy::BestEffort,
            ReopenPolicy::Reject,
            MetricsConfig {
                duration_buckets: vec![0.5, 1.0],
            },
        );
        config.save(&dir).unwrap();

        assert!(CacheConfig::exists(&dir), "config was just written");

        let loaded = CacheConfig::load(&dir).unwrap();
        assert_eq!(loaded.broadcast, BroadcastPolicy::BestEffort);
        assert_eq!(loaded.reopen, ReopenPolicy::Reject);
        assert_eq!(loaded.metrics.duration_buckets, vec![0.5, 1.0]);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let tmp = TempDir::new("xds-cache-config").unwrap();
        let dir = Utf8PathBuf::from_path_buf(tmp.path().to_owned()).unwrap();

        let err = CacheConfig::load(&dir).unwrap_err();
        assert!(
            err.to_string().contains("failed to read configuration"),
            "unexpected error: {err}"
        );
    }
}
