//! Orchestration of one maintenance run.
//!
//! Enabled steps run strictly in order (`touch → diff → sync → pool → cleanup
//! → scrub`), each at most once. The pipeline never returns an error: every
//! failure is folded into the [`RunOutcome`] so reporting always happens.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use crate::core::diff::{DiffCounts, DiffTally};
use crate::core::policy::{completed_verdict, exceeds_threshold, exit_code_accepted, is_fatal};
use crate::core::settings::Configuration;
use crate::core::types::{RunOutcome, Step, StepResult, StepStatus, Verdict};
use crate::io::tools::{ToolRequest, ToolRunner};

/// Receiver for transcript entries as they are appended.
pub trait TranscriptSink {
    fn record(&mut self, result: &StepResult);
}

impl TranscriptSink for Vec<StepResult> {
    fn record(&mut self, result: &StepResult) {
        self.push(result.clone());
    }
}

/// Sink that writes a one-line summary per step to the log.
pub struct LogSink;

impl TranscriptSink for LogSink {
    fn record(&mut self, result: &StepResult) {
        let note = result.note.as_deref().unwrap_or("");
        match result.status {
            StepStatus::Ok => info!(
                step = %result.step,
                exit_code = ?result.exit_code,
                duration_ms = result.duration_ms,
                "{} completed",
                result.step
            ),
            StepStatus::Skipped => info!(step = %result.step, "{} skipped: {note}", result.step),
            StepStatus::Failed => error!(
                step = %result.step,
                exit_code = ?result.exit_code,
                "{} failed: {note}",
                result.step
            ),
        }
        info!("{}", "*".repeat(60));
    }
}

/// Run every enabled step of `config` through `runner`.
#[instrument(skip_all)]
pub fn run_pipeline<R: ToolRunner, S: TranscriptSink>(
    config: &Configuration,
    runner: &R,
    sink: &mut S,
) -> RunOutcome {
    let started_at = Utc::now();
    let mut transcript = Transcript {
        results: Vec::new(),
        sink,
    };
    let mut diff: Option<DiffCounts> = None;
    let mut stop: Option<(Verdict, String)> = None;

    for step in config.steps.iter() {
        if step == Step::Sync
            && let Some(counts) = &diff
            && counts.changes() == 0
        {
            info!("No changes detected, no sync required");
            transcript.append(StepResult::skipped(Step::Sync, "no changes detected"));
            continue;
        }

        info!("Running {step}...");
        let (result, counts) = run_step(config, runner, step);

        if result.is_failed() {
            let note = result.note.clone().unwrap_or_default();
            transcript.append(result);
            if is_fatal(step) {
                stop = Some((Verdict::Failed, format!("{step} failed: {note}")));
                break;
            }
            warn!(step = %step, "best-effort step failed, continuing");
            continue;
        }

        transcript.append(result);

        if let Some(counts) = counts {
            info!(
                "Diff results: {} added, {} removed, {} moved, {} modified",
                counts.added, counts.removed, counts.moved, counts.updated
            );
            diff = Some(counts);
            if exceeds_threshold(counts.removed, config.delete_threshold) {
                let threshold = config.delete_threshold.unwrap_or_default();
                error!(
                    removed = counts.removed,
                    threshold, "Deleted files exceed delete threshold of {threshold}, aborting"
                );
                error!("Run again with --ignore-deletethreshold to sync anyways");
                stop = Some((
                    Verdict::Aborted,
                    format!(
                        "{} deleted files exceed delete threshold of {threshold}",
                        counts.removed
                    ),
                ));
                break;
            }
        }
    }

    let results = transcript.results;
    let (verdict, reason) = match stop {
        Some((verdict, reason)) => (verdict, Some(reason)),
        None => (completed_verdict(&results), None),
    };

    RunOutcome {
        run_id: run_id(started_at),
        started_at: started_at.to_rfc3339(),
        finished_at: Utc::now().to_rfc3339(),
        verdict,
        results,
        diff,
        reason,
    }
}

/// Outcome for a run that could not start (e.g. missing executables).
pub fn not_started(reason: impl Into<String>) -> RunOutcome {
    let now = Utc::now();
    RunOutcome {
        run_id: run_id(now),
        started_at: now.to_rfc3339(),
        finished_at: now.to_rfc3339(),
        verdict: Verdict::Failed,
        results: Vec::new(),
        diff: None,
        reason: Some(reason.into()),
    }
}

/// Append-only transcript that mirrors each entry into the sink.
struct Transcript<'a, S: TranscriptSink> {
    results: Vec<StepResult>,
    sink: &'a mut S,
}

impl<S: TranscriptSink> Transcript<'_, S> {
    fn append(&mut self, result: StepResult) {
        self.sink.record(&result);
        self.results.push(result);
    }
}

/// Invoke one step; the diff counts are returned only for a successful diff.
fn run_step<R: ToolRunner>(
    config: &Configuration,
    runner: &R,
    step: Step,
) -> (StepResult, Option<DiffCounts>) {
    let request = ToolRequest::for_step(config, step);
    let mut tally = DiffTally::default();
    let started = Instant::now();
    let run = runner.run(&request, &mut |line: &str| tally.observe(line));
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let output = match run {
        Ok(output) => output,
        Err(err) => {
            let result = StepResult {
                step,
                status: StepStatus::Failed,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                deleted: None,
                note: Some(format!("could not run: {err:#}")),
                duration_ms,
            };
            return (result, None);
        }
    };

    let accepted = !output.timed_out && exit_code_accepted(step, output.exit_code);
    let note = if output.timed_out {
        config
            .step_timeout
            .map(|limit| format!("timed out after {}s", limit.as_secs()))
            .or_else(|| Some("timed out".to_string()))
    } else if !accepted {
        Some(match output.exit_code {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        })
    } else {
        None
    };

    let counts = (accepted && step == Step::Diff).then(|| tally.finish());
    let result = StepResult {
        step,
        status: if accepted {
            StepStatus::Ok
        } else {
            StepStatus::Failed
        },
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
        deleted: counts.map(|c| c.removed),
        note,
        duration_ms,
    };
    (result, counts)
}

/// Sortable run id with millisecond resolution, e.g. `20260101T000000.123Z`.
fn run_id(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedRun, ScriptedToolRunner};

    fn config(steps: &[Step], threshold: Option<u64>) -> Configuration {
        let mut config = Configuration::with_steps(steps.iter().copied());
        config.delete_threshold = threshold;
        config
    }

    #[test]
    fn diff_exit_code_two_is_success() {
        let runner = ScriptedToolRunner::new(vec![
            ScriptedRun::exit(Step::Diff, 2).stdout("add a\n"),
            ScriptedRun::ok(Step::Sync),
        ]);
        let mut sink = Vec::new();
        let outcome = run_pipeline(&config(&[Step::Diff, Step::Sync], Some(0)), &runner, &mut sink);

        assert_eq!(outcome.verdict, Verdict::Success);
        assert_eq!(outcome.steps(), vec![Step::Diff, Step::Sync]);
        assert_eq!(outcome.diff.map(|d| d.added), Some(1));
    }

    #[test]
    fn sync_skipped_when_no_changes() {
        let runner = ScriptedToolRunner::new(vec![
            ScriptedRun::ok(Step::Diff).stdout("     10 equal\n      0 removed\n"),
            ScriptedRun::ok(Step::Scrub),
        ]);
        let mut sink = Vec::new();
        let outcome = run_pipeline(
            &config(&[Step::Diff, Step::Sync, Step::Scrub], Some(10)),
            &runner,
            &mut sink,
        );

        assert_eq!(outcome.verdict, Verdict::Success);
        assert_eq!(runner.invoked(), vec![Step::Diff, Step::Scrub]);
        let sync = outcome.result(Step::Sync).expect("sync recorded");
        assert_eq!(sync.status, StepStatus::Skipped);
        assert_eq!(outcome.steps(), vec![Step::Diff, Step::Sync, Step::Scrub]);
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn spawn_error_fails_fatal_step() {
        let runner = ScriptedToolRunner::new(vec![ScriptedRun::spawn_error(Step::Touch)]);
        let mut sink = Vec::new();
        let outcome = run_pipeline(&config(&[Step::Touch, Step::Diff], None), &runner, &mut sink);

        assert_eq!(outcome.verdict, Verdict::Failed);
        assert_eq!(outcome.steps(), vec![Step::Touch]);
        let touch = &outcome.results[0];
        assert_eq!(touch.exit_code, None);
        assert!(touch.note.as_deref().unwrap_or("").contains("could not run"));
        assert!(outcome.reason.as_deref().unwrap_or("").starts_with("touch failed"));
    }

    #[test]
    fn timed_out_step_is_failure() {
        let runner = ScriptedToolRunner::new(vec![ScriptedRun::timed_out(Step::Scrub)]);
        let mut sink = Vec::new();
        let outcome = run_pipeline(&config(&[Step::Scrub], None), &runner, &mut sink);

        assert_eq!(outcome.verdict, Verdict::Failed);
        assert_eq!(outcome.results[0].note.as_deref(), Some("timed out"));
    }

    #[test]
    fn failed_diff_does_not_report_counts() {
        let runner = ScriptedToolRunner::new(vec![
            ScriptedRun::exit(Step::Diff, 1).stdout("remove a\nremove b\n"),
        ]);
        let mut sink = Vec::new();
        let outcome = run_pipeline(&config(&[Step::Diff, Step::Sync], Some(0)), &runner, &mut sink);

        assert_eq!(outcome.verdict, Verdict::Failed);
        assert_eq!(outcome.diff, None);
        assert_eq!(outcome.results[0].deleted, None);
    }

    #[test]
    fn run_id_has_millisecond_resolution() {
        let at = DateTime::parse_from_rfc3339("2026-03-04T05:06:07.089Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        assert_eq!(run_id(at), "20260304T050607.089Z");
    }

    #[test]
    fn not_started_is_failed_with_empty_transcript() {
        let outcome = not_started("snapper executable not found");
        assert_eq!(outcome.verdict, Verdict::Failed);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.reason.as_deref(), Some("snapper executable not found"));
    }
}
