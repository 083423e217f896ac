// Configuration structs

use super::constants::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Per-lane overrides applied when a queue is constructed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneConfig {
    /// Maximum simultaneously active tasks (clamped to at least 1)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_max_concurrent() -> usize {
    1
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Wait threshold (ms) before an admission is reported as slow
    #[serde(default = "default_warn_after_ms")]
    pub default_warn_after_ms: u64,

    /// Dedup window (ms) for slow-wait warnings
    #[serde(default = "default_wait_dedup_window_ms")]
    pub wait_dedup_window_ms: u64,

    /// Dedup window (ms) for task error logs
    #[serde(default = "default_error_dedup_window_ms")]
    pub error_dedup_window_ms: u64,

    /// Lanes starting with any of these never emit task-error logs
    #[serde(default = "default_quiet_lane_prefixes")]
    pub quiet_lane_prefixes: Vec<String>,

    /// Initial concurrency per lane name
    #[serde(default)]
    pub lanes: HashMap<String, LaneConfig>,
}

fn default_warn_after_ms() -> u64 {
    DEFAULT_WARN_AFTER_MS
}

fn default_wait_dedup_window_ms() -> u64 {
    LANE_WAIT_WARN_DEDUP_MS
}

fn default_error_dedup_window_ms() -> u64 {
    LANE_TASK_ERROR_DEDUP_MS
}

fn default_quiet_lane_prefixes() -> Vec<String> {
    DEFAULT_QUIET_LANE_PREFIXES
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_warn_after_ms: default_warn_after_ms(),
            wait_dedup_window_ms: default_wait_dedup_window_ms(),
            error_dedup_window_ms: default_error_dedup_window_ms(),
            quiet_lane_prefixes: default_quiet_lane_prefixes(),
            lanes: HashMap::new(),
        }
    }
}

impl QueueConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: QueueConfig = toml::from_str(contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse queue config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_warn_after(&self) -> Duration {
        Duration::from_millis(self.default_warn_after_ms)
    }

    pub fn wait_dedup_window(&self) -> Duration {
        Duration::from_millis(self.wait_dedup_window_ms)
    }

    pub fn error_dedup_window(&self) -> Duration {
        Duration::from_millis(self.error_dedup_window_ms)
    }

    /// Validate configuration and return helpful errors
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_warn_after_ms == 0 {
            anyhow::bail!(
                "default_warn_after_ms must be greater than 0\n\n\
                 Every admission would be reported as slow. Typical value: 2000"
            );
        }

        if self.wait_dedup_window_ms == 0 {
            anyhow::bail!("wait_dedup_window_ms must be greater than 0");
        }

        if self.error_dedup_window_ms == 0 {
            anyhow::bail!("error_dedup_window_ms must be greater than 0");
        }

        for (idx, prefix) in self.quiet_lane_prefixes.iter().enumerate() {
            if prefix.trim().is_empty() {
                anyhow::bail!(
                    "quiet_lane_prefixes[{}] is empty\n\n\
                     An empty prefix matches every lane and silences all task errors. \
                     Remove the entry instead.",
                    idx
                );
            }
        }

        for (name, lane) in &self.lanes {
            if name.trim().is_empty() {
                anyhow::bail!("Lane names in [lanes] must not be blank");
            }
            if lane.max_concurrent == 0 {
                anyhow::bail!(
                    "lanes.{}.max_concurrent must be at least 1 (use 1 for a serial lane)",
                    name
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.default_warn_after(), Duration::from_secs(2));
        assert_eq!(config.wait_dedup_window(), Duration::from_secs(30));
        assert_eq!(config.error_dedup_window(), Duration::from_secs(30));
        assert_eq!(
            config.quiet_lane_prefixes,
            vec!["auth-probe:".to_string(), "session:probe-".to_string()]
        );
        assert!(config.lanes.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_empty_document_uses_defaults() {
        let config = QueueConfig::from_toml_str("").unwrap();
        assert_eq!(config, QueueConfig::default());
    }

    #[test]
    fn test_parse_lanes_and_overrides() {
        let config = QueueConfig::from_toml_str(
            r#"
            default_warn_after_ms = 500
            quiet_lane_prefixes = ["healthcheck:"]

            [lanes.cron]
            max_concurrent = 4

            [lanes.main]
            "#,
        )
        .unwrap();

        assert_eq!(config.default_warn_after_ms, 500);
        assert_eq!(config.wait_dedup_window_ms, LANE_WAIT_WARN_DEDUP_MS);
        assert_eq!(config.quiet_lane_prefixes, vec!["healthcheck:".to_string()]);
        assert_eq!(config.lanes["cron"].max_concurrent, 4);
        assert_eq!(config.lanes["main"].max_concurrent, 1);
    }

    #[test]
    fn test_rejects_zero_lane_concurrency() {
        let err = QueueConfig::from_toml_str("[lanes.cron]\nmax_concurrent = 0\n").unwrap_err();
        assert!(err.to_string().contains("lanes.cron.max_concurrent"));
    }

    #[test]
    fn test_rejects_empty_quiet_prefix() {
        let mut config = QueueConfig::default();
        config.quiet_lane_prefixes.push("  ".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("quiet_lane_prefixes[2]"));
    }

    #[test]
    fn test_rejects_zero_windows() {
        let config = QueueConfig {
            error_dedup_window_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = QueueConfig {
            default_warn_after_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = QueueConfig::from_toml_str("default_warn_after_ms = \"soon\"").unwrap_err();
        assert!(err.to_string().contains("Failed to parse queue config"));
    }
}
