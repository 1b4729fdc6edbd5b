//! Sweep report
//!
//! One serializable record per run: what was deleted per cache root, how
//! long it took, and which configuration produced it.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sweep_engine::{RootOutcome, SweepSummary, Timestamp};

use crate::config::ConfigSource;

/// Schema version for the JSON report
pub const SWEEP_REPORT_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for the JSON report
pub const SWEEP_REPORT_SCHEMA_ID: &str = "cache-sweep/report@1";

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub schema_version: u32,
    pub schema_id: String,

    /// Run identifier
    pub run_id: String,

    /// When the sweep started
    pub started_at: DateTime<Utc>,

    /// Entries last accessed before this instant (epoch millis) were eligible
    pub deadline: Timestamp,

    /// Wall-clock duration of the sweep in milliseconds
    pub duration_ms: u64,

    pub dry_run: bool,

    /// Primary entries deleted across all roots
    pub deleted: usize,

    /// Primary entries selected across all roots
    pub planned: usize,

    /// Roots that ended in the errored state
    pub errored_roots: usize,

    /// Candidate-level failures across all roots
    pub failures: usize,

    pub roots: Vec<RootOutcome>,

    /// Children of the caches directory that matched no layout
    pub ignored: Vec<PathBuf>,

    /// Set when the journal could not be written back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_error: Option<String>,

    pub config_sources: Vec<ConfigSource>,
}

impl SweepReport {
    pub fn new(
        run_id: String,
        started_at: DateTime<Utc>,
        deadline: Timestamp,
        dry_run: bool,
        summary: SweepSummary,
    ) -> Self {
        Self {
            schema_version: SWEEP_REPORT_SCHEMA_VERSION,
            schema_id: SWEEP_REPORT_SCHEMA_ID.to_string(),
            run_id,
            started_at,
            deadline,
            duration_ms: 0,
            dry_run,
            deleted: summary.deleted(),
            planned: summary.planned(),
            errored_roots: summary.errored(),
            failures: summary.failures(),
            roots: summary.roots,
            ignored: summary.ignored,
            journal_error: None,
            config_sources: Vec::new(),
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_journal_error(mut self, error: impl Into<String>) -> Self {
        self.journal_error = Some(error.into());
        self
    }

    pub fn with_config_sources(mut self, sources: Vec<ConfigSource>) -> Self {
        self.config_sources = sources;
        self
    }

    /// Final console line.
    pub fn human_line(&self) -> String {
        if self.dry_run {
            format!(
                "Would delete {} in {}ms (dry run)",
                self.planned, self.duration_ms
            )
        } else {
            format!("Deleted {} in {}ms", self.deleted, self.duration_ms)
        }
    }

    /// Multi-line human summary, one line per root followed by the final line.
    pub fn to_human(&self) -> String {
        let mut lines = Vec::with_capacity(self.roots.len() + 1);
        for root in &self.roots {
            let mut line = format!(
                "  {} [{}] {:?}: scanned {}, planned {}, deleted {}, pruned {}",
                root.path.display(),
                root.kind,
                root.state,
                root.scanned,
                root.planned,
                root.deleted,
                root.pruned
            );
            if !root.failures.is_empty() {
                line.push_str(&format!(", {} failed", root.failures.len()));
            }
            if let Some(ref error) = root.error {
                line.push_str(&format!(" ({})", error));
            }
            lines.push(line);
        }
        lines.push(self.human_line());
        lines.join("\n")
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
