//! Step failure and threshold policy.
//!
//! - `touch`, `diff`, `sync` and `scrub` are fatal: a failure stops the run.
//! - `pool` and `cleanup` are best-effort: a failure is recorded and downgrades
//!   an otherwise successful run to `Warning`.
//! - `diff` additionally accepts exit code 2, which snapraid uses to signal
//!   that differences were found.

use crate::core::types::{Step, StepResult, Verdict};

/// Whether a failure of `step` stops the pipeline.
pub fn is_fatal(step: Step) -> bool {
    !is_best_effort(step)
}

pub fn is_best_effort(step: Step) -> bool {
    matches!(step, Step::Pool | Step::Cleanup)
}

/// Exit codes accepted as success for `step`.
pub fn accepted_exit_codes(step: Step) -> &'static [i32] {
    match step {
        Step::Diff => &[0, 2],
        _ => &[0],
    }
}

/// Classify an exit code; `None` (killed, timed out, not spawned) is never accepted.
pub fn exit_code_accepted(step: Step, exit_code: Option<i32>) -> bool {
    exit_code.is_some_and(|code| accepted_exit_codes(step).contains(&code))
}

/// Strictly-greater-than comparison; a missing threshold never aborts.
pub fn exceeds_threshold(deleted: u64, threshold: Option<u64>) -> bool {
    threshold.is_some_and(|limit| deleted > limit)
}

/// Verdict for a pipeline that ran every enabled step to the end.
pub fn completed_verdict(results: &[StepResult]) -> Verdict {
    if results
        .iter()
        .any(|result| result.is_failed() && is_best_effort(result.step))
    {
        Verdict::Warning
    } else {
        Verdict::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StepStatus;

    fn result(step: Step, status: StepStatus) -> StepResult {
        StepResult {
            step,
            status,
            exit_code: Some(if status == StepStatus::Failed { 1 } else { 0 }),
            stdout: String::new(),
            stderr: String::new(),
            deleted: None,
            note: None,
            duration_ms: 0,
        }
    }

    #[test]
    fn only_pool_and_cleanup_are_best_effort() {
        let best_effort: Vec<Step> = Step::ALL
            .into_iter()
            .filter(|step| is_best_effort(*step))
            .collect();
        assert_eq!(best_effort, vec![Step::Pool, Step::Cleanup]);
        assert!(is_fatal(Step::Sync));
        assert!(is_fatal(Step::Scrub));
    }

    #[test]
    fn diff_accepts_differences_found_code() {
        assert!(exit_code_accepted(Step::Diff, Some(2)));
        assert!(!exit_code_accepted(Step::Sync, Some(2)));
        assert!(!exit_code_accepted(Step::Diff, Some(1)));
        assert!(!exit_code_accepted(Step::Diff, None));
    }

    #[test]
    fn threshold_boundary_is_exclusive() {
        assert!(!exceeds_threshold(10, Some(10)));
        assert!(exceeds_threshold(11, Some(10)));
        assert!(!exceeds_threshold(1_000_000, None));
        assert!(exceeds_threshold(1, Some(0)));
    }

    #[test]
    fn best_effort_failure_downgrades_to_warning() {
        let ok = vec![
            result(Step::Diff, StepStatus::Ok),
            result(Step::Sync, StepStatus::Ok),
        ];
        assert_eq!(completed_verdict(&ok), Verdict::Success);

        let warned = vec![
            result(Step::Diff, StepStatus::Ok),
            result(Step::Cleanup, StepStatus::Failed),
            result(Step::Scrub, StepStatus::Ok),
        ];
        assert_eq!(completed_verdict(&warned), Verdict::Warning);
    }

    #[test]
    fn skipped_steps_do_not_warn() {
        let results = vec![
            result(Step::Diff, StepStatus::Ok),
            result(Step::Sync, StepStatus::Skipped),
        ];
        assert_eq!(completed_verdict(&results), Verdict::Success);
    }
}
