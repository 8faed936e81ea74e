//! Shared deterministic types for the run pipeline.
//!
//! These types define stable contracts between the pipeline, the reporters and
//! the notifiers. They do not depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::diff::DiffCounts;

/// Maintenance step executed through `snapraid-btrfs`.
///
/// Variants are declared in execution order; `Ord` follows that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Touch,
    Diff,
    Sync,
    Pool,
    Cleanup,
    Scrub,
}

impl Step {
    /// Every step in the fixed execution order.
    pub const ALL: [Step; 6] = [
        Step::Touch,
        Step::Diff,
        Step::Sync,
        Step::Pool,
        Step::Cleanup,
        Step::Scrub,
    ];

    /// Subcommand name passed to `snapraid-btrfs`.
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Touch => "touch",
            Step::Diff => "diff",
            Step::Sync => "sync",
            Step::Pool => "pool",
            Step::Cleanup => "cleanup",
            Step::Scrub => "scrub",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a single step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The tool exited with an accepted status code.
    Ok,
    /// The tool exited with an unaccepted status, timed out, or could not be spawned.
    Failed,
    /// The step was enabled but not invoked (sync after a diff with no
    /// changes). Skipped entries are still part of the transcript, in step
    /// order, so reports show every enabled step.
    Skipped,
}

/// Record of one step in the run transcript. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: Step,
    pub status: StepStatus,
    /// Process exit code; `None` when the process was not run, was killed, or failed to spawn.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Number of deleted files reported by `diff`. Only set for the diff step.
    pub deleted: Option<u64>,
    /// Short human-readable annotation (skip reason, spawn error, timeout).
    pub note: Option<String>,
    pub duration_ms: u64,
}

impl StepResult {
    /// A step that was enabled but deliberately not invoked.
    pub fn skipped(step: Step, note: impl Into<String>) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            deleted: None,
            note: Some(note.into()),
            duration_ms: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// Overall classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Every enabled step completed.
    Success,
    /// Every fatal step completed but a best-effort step failed.
    Warning,
    /// `diff` reported more deletions than the configured threshold.
    Aborted,
    /// A fatal step failed, or the run could not start.
    Failed,
}

impl Verdict {
    /// Whether the run counts as successful for exit codes and notifications.
    pub fn is_success(self) -> bool {
        matches!(self, Verdict::Success | Verdict::Warning)
    }

    pub fn label(self) -> &'static str {
        match self {
            Verdict::Success => "SUCCESS",
            Verdict::Warning => "WARNING",
            Verdict::Aborted => "ABORTED",
            Verdict::Failed => "ERROR",
        }
    }
}

/// Aggregate result of one invocation, handed read-only to reporters and notifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub verdict: Verdict,
    /// Transcript in execution order.
    pub results: Vec<StepResult>,
    /// Parsed diff counts, when diff ran successfully.
    pub diff: Option<DiffCounts>,
    /// Why the run stopped early, if it did.
    pub reason: Option<String>,
}

impl RunOutcome {
    /// Steps in the order they appear in the transcript.
    pub fn steps(&self) -> Vec<Step> {
        self.results.iter().map(|result| result.step).collect()
    }

    pub fn result(&self, step: Step) -> Option<&StepResult> {
        self.results.iter().find(|result| result.step == step)
    }
}
