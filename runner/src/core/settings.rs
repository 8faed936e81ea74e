//! Resolved, immutable run configuration.
//!
//! Built once from the config file plus command-line overrides
//! (see [`crate::io::config::RunnerConfig::resolve`]) and passed by reference
//! into the pipeline. Nothing mutates it during a run.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use crate::core::types::Step;

/// Executables and files the pipeline hands to `snapraid-btrfs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub snapraid_btrfs: PathBuf,
    pub snapper: PathBuf,
    pub snapraid: PathBuf,
    /// snapraid's own configuration file (`--conf`).
    pub snapraid_config: PathBuf,
}

/// Set of enabled steps, iterated in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepSet(BTreeSet<Step>);

impl StepSet {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self(steps.into_iter().collect())
    }

    pub fn contains(&self, step: Step) -> bool {
        self.0.contains(&step)
    }

    pub fn insert(&mut self, step: Step) {
        self.0.insert(step);
    }

    /// Enabled steps in execution order.
    pub fn iter(&self) -> impl Iterator<Item = Step> + '_ {
        self.0.iter().copied()
    }
}

/// Scrub selection passed as `--plan`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrubPlan {
    /// Scrub this percentage of the array, limited to blocks older than `older_than_days`.
    Percent { percent: u32, older_than_days: u32 },
    /// A named snapraid plan such as `new`, `bad` or `full`.
    Named(String),
}

/// Which snapper configs `snapraid-btrfs` should operate on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapperSelection {
    /// Comma-separated snapper config names (`--snapper-configs`).
    pub configs: Option<String>,
    /// File listing snapper configs (`--snapper-configs-file`).
    pub configs_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub tools: ToolPaths,
    pub steps: StepSet,
    /// Maximum tolerated deletions reported by diff; `None` disables the check.
    pub delete_threshold: Option<u64>,
    pub snapper: SnapperSelection,
    /// Target directory for `pool` (`--pool-dir`).
    pub pool_dir: Option<PathBuf>,
    pub scrub_plan: ScrubPlan,
    /// Extra arguments appended after the step's own arguments.
    pub extra_args: BTreeMap<Step, Vec<String>>,
    /// Per-step wall-clock limit; `None` waits for the tool indefinitely.
    pub step_timeout: Option<Duration>,
    /// Bound on captured stdout/stderr per step.
    pub output_limit_bytes: usize,
}

impl Configuration {
    /// Configuration with the given steps and default everything else.
    ///
    /// Tool names are resolved through `PATH` at preflight time.
    pub fn with_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            tools: ToolPaths {
                snapraid_btrfs: PathBuf::from("snapraid-btrfs"),
                snapper: PathBuf::from("snapper"),
                snapraid: PathBuf::from("snapraid"),
                snapraid_config: PathBuf::from("/etc/snapraid.conf"),
            },
            steps: StepSet::new(steps),
            delete_threshold: None,
            snapper: SnapperSelection::default(),
            pool_dir: None,
            scrub_plan: ScrubPlan::Percent {
                percent: 12,
                older_than_days: 10,
            },
            extra_args: BTreeMap::new(),
            step_timeout: None,
            output_limit_bytes: 10_000_000,
        }
    }

    pub fn extra_args(&self, step: Step) -> &[String] {
        self.extra_args.get(&step).map(Vec::as_slice).unwrap_or(&[])
    }
}
