//! Run report rendering and persistence.

use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{RunOutcome, StepResult, StepStatus, Verdict};

/// How a report body is rendered.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Leave tool output out of the body.
    pub short: bool,
    /// Cap on the transcript part of the body; `None` keeps everything.
    pub max_bytes: Option<usize>,
    /// Prefix for the subject line; the verdict label is appended.
    pub subject: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            short: false,
            max_bytes: Some(500 * 1024),
            subject: "[SnapRAID] Status Report:".to_string(),
        }
    }
}

/// Rendered report, ready for a notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub subject: String,
    pub body: String,
}

pub fn render_report(outcome: &RunOutcome, options: &ReportOptions) -> Report {
    let subject = format!("{} {}", options.subject, outcome.verdict.label());

    let mut body = String::from(headline(outcome.verdict));
    body.push_str("\n\n\n");

    let mut transcript = summary(outcome);
    for result in &outcome.results {
        transcript.push('\n');
        push_step(&mut transcript, result, options.short);
    }

    match options.max_bytes {
        Some(max) if max > 0 && transcript.len() > max => {
            body.push_str(&truncate_middle(&transcript, max));
        }
        _ => body.push_str(&transcript),
    }

    Report { subject, body }
}

fn headline(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Success => "SnapRAID job completed successfully:",
        Verdict::Warning => "SnapRAID job completed with warnings:",
        Verdict::Aborted => "SnapRAID job aborted:",
        Verdict::Failed => "Error during SnapRAID job:",
    }
}

fn summary(outcome: &RunOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Run {}: {}", outcome.run_id, outcome.verdict.label());
    let _ = writeln!(out, "Started:  {}", outcome.started_at);
    let _ = writeln!(out, "Finished: {}", outcome.finished_at);
    if let Some(reason) = &outcome.reason {
        let _ = writeln!(out, "Reason:   {reason}");
    }
    if let Some(diff) = &outcome.diff {
        let _ = writeln!(
            out,
            "Diff results: {} added, {} removed, {} moved, {} modified",
            diff.added, diff.removed, diff.moved, diff.updated
        );
    }
    let steps: Vec<String> = outcome
        .results
        .iter()
        .map(|r| format!("{}={}", r.step, status_label(r)))
        .collect();
    let _ = writeln!(out, "Steps:    {}", steps.join(", "));
    out
}

fn status_label(result: &StepResult) -> &'static str {
    match result.status {
        StepStatus::Ok => "ok",
        StepStatus::Failed => "failed",
        StepStatus::Skipped => "skipped",
    }
}

fn push_step(out: &mut String, result: &StepResult, short: bool) {
    let exit = result
        .exit_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "-".to_string());
    let _ = writeln!(
        out,
        "=== {}: {} (exit {}, {} ms) ===",
        result.step,
        status_label(result),
        exit,
        result.duration_ms
    );
    if let Some(note) = &result.note {
        let _ = writeln!(out, "{note}");
    }
    if short {
        return;
    }
    if !result.stdout.is_empty() {
        out.push_str("--- stdout ---\n");
        out.push_str(&result.stdout);
        if !result.stdout.ends_with('\n') {
            out.push('\n');
        }
    }
    if !result.stderr.is_empty() {
        out.push_str("--- stderr ---\n");
        out.push_str(&result.stderr);
        if !result.stderr.ends_with('\n') {
            out.push('\n');
        }
    }
}

const TRUNCATION_HEADER: &str = "NOTE: Log was too big and was shortened\n\n";

/// Cut the middle out of `text` so the result, notices included, fits in
/// `max_bytes`.
///
/// The head and tail are kept in equal parts and the gap is replaced with a
/// notice stating how many lines were removed. Only a `max_bytes` smaller than
/// the notices themselves yields a longer result.
pub fn truncate_middle(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    // Removed lines never exceed the total, so this bounds the notice size.
    let overhead = TRUNCATION_HEADER.len() + truncation_notice(text.matches('\n').count()).len();
    let half = max_bytes.saturating_sub(overhead) / 2;
    let mut head_end = half;
    while !text.is_char_boundary(head_end) {
        head_end -= 1;
    }
    let mut tail_start = text.len() - half;
    while !text.is_char_boundary(tail_start) {
        tail_start += 1;
    }
    let removed_lines = text[head_end..tail_start].matches('\n').count();
    format!(
        "{TRUNCATION_HEADER}{}{}{}",
        &text[..head_end],
        truncation_notice(removed_lines),
        &text[tail_start..]
    )
}

fn truncation_notice(removed_lines: usize) -> String {
    format!("[...]\n\n\n --- LOG WAS TOO BIG - {removed_lines} LINES REMOVED --\n\n\n[...]")
}

#[derive(Debug, Clone)]
pub struct RunReportPaths {
    pub dir: PathBuf,
    pub outcome_path: PathBuf,
    pub transcript_path: PathBuf,
}

impl RunReportPaths {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            outcome_path: dir.join("outcome.json"),
            transcript_path: dir.join("transcript.log"),
            dir,
        }
    }

    /// Create a fresh directory for `run_id` under `root`.
    ///
    /// An existing directory is never reused; `-1`, `-2`, ... is appended
    /// until the name is free.
    pub fn create(root: &Path, run_id: &str) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("create report dir {}", root.display()))?;
        let mut dir = root.join(run_id);
        let mut attempt = 0u32;
        loop {
            match fs::create_dir(&dir) {
                Ok(()) => return Ok(Self::new(dir)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    attempt += 1;
                    dir = root.join(format!("{run_id}-{attempt}"));
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("create report dir {}", dir.display()));
                }
            }
        }
    }
}

/// Persist the outcome (JSON) and rendered report (text) in a new directory
/// `root/<run_id>/`.
pub fn write_run_report(
    root: &Path,
    outcome: &RunOutcome,
    report: &Report,
) -> Result<RunReportPaths> {
    let paths = RunReportPaths::create(root, &outcome.run_id)?;

    write_json(&paths.outcome_path, outcome)?;
    let mut text = format!("Subject: {}\n\n", report.subject);
    text.push_str(&report.body);
    if !text.ends_with('\n') {
        text.push('\n');
    }
    write_text(&paths.transcript_path, &text)?;

    debug!(dir = %paths.dir.display(), "run report written");
    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
