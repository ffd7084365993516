use std::time::Duration;

use serde::Serialize;

/// Time bounds for a multi-source fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub per_source_timeout: Duration,
    pub batch_timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            per_source_timeout: Duration::from_secs(15),
            batch_timeout: Duration::from_secs(60),
        }
    }
}

/// Aggregate outcome of a `fetch_all` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.timed_out == 0
    }

    /// One-line status suitable for a status bar.
    pub fn status_line(&self) -> String {
        let mut line = format!("Fetched {}/{} feeds", self.succeeded, self.requested);
        if self.failed > 0 {
            line.push_str(&format!(", {} failed", self.failed));
        }
        if self.timed_out > 0 {
            line.push_str(&format!(", {} timed out", self.timed_out));
        }
        line
    }
}
