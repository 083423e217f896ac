// Scheduler-wide constants
//
// Centralised here so thresholds and windows have one source of truth.
// Import via `use crate::config::constants::*;`.

/// Wait (ms) before an admitted entry is reported as slow.
pub const DEFAULT_WARN_AFTER_MS: u64 = 2_000;

/// Dedup window (ms) for "lane wait exceeded" warnings.
pub const LANE_WAIT_WARN_DEDUP_MS: u64 = 30_000;

/// Dedup window (ms) for "lane task error" logs.
pub const LANE_TASK_ERROR_DEDUP_MS: u64 = 30_000;

/// Lanes whose failures are expected and transient (auth checks, probes).
pub const DEFAULT_QUIET_LANE_PREFIXES: &[&str] = &["auth-probe:", "session:probe-"];

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "LANE_QUEUE_CONFIG";
