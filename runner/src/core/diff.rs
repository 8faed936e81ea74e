//! Extraction of change counts from `snapraid diff` output.
//!
//! snapraid prints one line per changed file (`add <path>`, `remove <path>`,
//! `move <old> -> <new>`, ...) followed by a summary block (`      3 removed`).
//! The summary is authoritative when present; per-file lines are the fallback
//! for output where the summary was suppressed.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static SUMMARY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s+(equal|added|removed|updated|moved|copied|restored)\s*$")
        .expect("summary line regex is valid")
});

/// File counts reported by a diff run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffCounts {
    pub equal: u64,
    pub added: u64,
    pub removed: u64,
    pub updated: u64,
    pub moved: u64,
    pub copied: u64,
    pub restored: u64,
}

impl DiffCounts {
    /// Parse a complete diff output.
    pub fn parse(output: &str) -> Self {
        let mut tally = DiffTally::default();
        for line in output.lines() {
            tally.observe(line);
        }
        tally.finish()
    }

    /// Total number of changed files (everything except `equal`).
    pub fn changes(&self) -> u64 {
        self.added + self.removed + self.updated + self.moved + self.copied + self.restored
    }
}

/// Incremental diff counter, fed one output line at a time.
#[derive(Debug, Default)]
pub struct DiffTally {
    per_file: DiffCounts,
    summary: DiffCounts,
    saw_summary: bool,
}

impl DiffTally {
    pub fn observe(&mut self, line: &str) {
        if let Some(caps) = SUMMARY_LINE.captures(line) {
            let Ok(count) = caps[1].parse::<u64>() else {
                return;
            };
            self.saw_summary = true;
            let slot = match &caps[2] {
                "equal" => &mut self.summary.equal,
                "added" => &mut self.summary.added,
                "removed" => &mut self.summary.removed,
                "updated" => &mut self.summary.updated,
                "moved" => &mut self.summary.moved,
                "copied" => &mut self.summary.copied,
                _ => &mut self.summary.restored,
            };
            *slot = count;
            return;
        }

        let slot = match line.split(' ').next() {
            Some("add") => &mut self.per_file.added,
            Some("remove") => &mut self.per_file.removed,
            Some("update") => &mut self.per_file.updated,
            Some("move") => &mut self.per_file.moved,
            Some("copy") => &mut self.per_file.copied,
            Some("restore") => &mut self.per_file.restored,
            _ => return,
        };
        *slot += 1;
    }

    pub fn finish(self) -> DiffCounts {
        if self.saw_summary {
            self.summary
        } else {
            self.per_file
        }
    }
}
