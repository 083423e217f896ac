// Well-known lane identifiers
//
// Lanes are free-form strings. These are the ones the rest of the system
// agrees on; anything else (per-session, per-probe) is built by callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lane names shared across callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandLane {
    /// Primary serial lane. Default target for `enqueue`.
    Main,
    /// Scheduled background jobs
    Cron,
    /// Spawned sub-agent runs
    Subagent,
    /// Work started from inside another lane's task
    Nested,
}

impl CommandLane {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandLane::Main => "main",
            CommandLane::Cron => "cron",
            CommandLane::Subagent => "subagent",
            CommandLane::Nested => "nested",
        }
    }
}

impl fmt::Display for CommandLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for CommandLane {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Trim a lane identifier, falling back to the main lane when blank.
pub fn resolve_lane_name(lane: &str) -> &str {
    let trimmed = lane.trim();
    if trimmed.is_empty() {
        CommandLane::Main.as_str()
    } else {
        trimmed
    }
}

/// Whether `lane` starts with any of `prefixes`.
pub fn matches_any_prefix<S: AsRef<str>>(lane: &str, prefixes: &[S]) -> bool {
    prefixes.iter().any(|p| lane.starts_with(p.as_ref()))
}
