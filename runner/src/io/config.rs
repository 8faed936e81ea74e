//! Runner configuration file (`snapraid-btrfs-runner.toml`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::settings::{Configuration, ScrubPlan, SnapperSelection, StepSet, ToolPaths};
use crate::core::types::Step;
use crate::io::notify::NotifyOn;
use crate::io::report::ReportOptions;

/// Runner configuration (TOML).
///
/// This file is edited by humans. Missing fields and tables fall back to the
/// defaults below; empty strings mean "not set".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct RunnerConfig {
    pub snapraid_btrfs: SnapraidBtrfsSection,
    pub snapper: SnapperSection,
    pub snapraid: SnapraidSection,
    pub scrub: ScrubSection,
    pub extra_args: ExtraArgsSection,
    pub run: RunSection,
    pub logging: LoggingSection,
    pub notify: NotifySection,
    pub discord: DiscordSection,
    pub report: ReportSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SnapraidBtrfsSection {
    pub executable: String,
    /// Comma-separated snapper config names.
    pub snapper_configs: String,
    pub snapper_configs_file: String,
    /// Run `pool` after sync.
    pub pool: bool,
    pub pool_dir: String,
    /// Run `cleanup` after pool.
    pub cleanup: bool,
}

impl Default for SnapraidBtrfsSection {
    fn default() -> Self {
        Self {
            executable: "snapraid-btrfs".to_string(),
            snapper_configs: String::new(),
            snapper_configs_file: String::new(),
            pool: false,
            pool_dir: String::new(),
            cleanup: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SnapperSection {
    pub executable: String,
}

impl Default for SnapperSection {
    fn default() -> Self {
        Self {
            executable: "snapper".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SnapraidSection {
    pub executable: String,
    /// snapraid's own config file.
    pub config: String,
    /// Abort before sync when diff reports more deletions than this. Negative disables.
    pub deletethreshold: i64,
    /// Run `touch` before diff.
    pub touch: bool,
    pub diff: bool,
    pub sync: bool,
}

impl Default for SnapraidSection {
    fn default() -> Self {
        Self {
            executable: "snapraid".to_string(),
            config: "/etc/snapraid.conf".to_string(),
            deletethreshold: 40,
            touch: false,
            diff: true,
            sync: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScrubSection {
    pub enabled: bool,
    /// Percentage (`"12"`) or named plan (`"new"`, `"bad"`, `"full"`).
    pub plan: String,
    /// Only scrub blocks older than this many days. Ignored with named plans.
    pub older_than: u32,
    /// Legacy spelling of a numeric `plan`; takes precedence when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u32>,
}

impl Default for ScrubSection {
    fn default() -> Self {
        Self {
            enabled: false,
            plan: "12".to_string(),
            older_than: 10,
            percentage: None,
        }
    }
}

/// Extra arguments appended to each step's command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExtraArgsSection {
    pub touch: Vec<String>,
    pub diff: Vec<String>,
    pub sync: Vec<String>,
    pub pool: Vec<String>,
    pub cleanup: Vec<String>,
    pub scrub: Vec<String>,
}

impl ExtraArgsSection {
    fn for_step(&self, step: Step) -> &[String] {
        match step {
            Step::Touch => &self.touch,
            Step::Diff => &self.diff,
            Step::Sync => &self.sync,
            Step::Pool => &self.pool,
            Step::Cleanup => &self.cleanup,
            Step::Scrub => &self.scrub,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct RunSection {
    /// Per-step wall-clock limit in seconds; 0 waits indefinitely.
    pub step_timeout_secs: u64,
    /// Truncate captured stdout/stderr of each step beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            step_timeout_secs: 0,
            output_limit_bytes: 10_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingSection {
    /// Append log output to this file as well as the console.
    pub file: String,
    /// Default filter directive; `RUST_LOG` overrides it.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            file: String::new(),
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct NotifySection {
    /// Verdict classes that trigger a notification.
    pub sendon: Vec<NotifyOn>,
    /// Leave tool output out of the report body.
    pub short: bool,
    /// Maximum report size in KiB; 0 disables the cap.
    pub maxsize: u64,
    pub subject: String,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            sendon: vec![NotifyOn::Error],
            short: false,
            maxsize: 500,
            subject: "[SnapRAID] Status Report:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct DiscordSection {
    /// Webhook URL; empty disables Discord notifications.
    pub webhook_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReportSection {
    /// Directory for persisted run reports; empty disables them.
    pub dir: String,
}

/// Command-line overrides applied on top of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub pool: Option<bool>,
    pub cleanup: Option<bool>,
    pub scrub: Option<bool>,
    pub delete_threshold: Option<i64>,
    pub ignore_delete_threshold: bool,
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.snapraid_btrfs.executable.trim().is_empty() {
            return Err(anyhow!("snapraid-btrfs.executable must not be empty"));
        }
        if self.snapper.executable.trim().is_empty() {
            return Err(anyhow!("snapper.executable must not be empty"));
        }
        if self.snapraid.executable.trim().is_empty() {
            return Err(anyhow!("snapraid.executable must not be empty"));
        }
        if self.snapraid.config.trim().is_empty() {
            return Err(anyhow!("snapraid.config must not be empty"));
        }
        if self.run.output_limit_bytes == 0 {
            return Err(anyhow!("run.output-limit-bytes must be > 0"));
        }
        if self.scrub.plan.trim().is_empty() && self.scrub.percentage.is_none() {
            return Err(anyhow!("scrub.plan must not be empty"));
        }
        if let Some(percent) = self.scrub_percent()
            && percent > 100
        {
            return Err(anyhow!("scrub.plan percentage must be <= 100, got {percent}"));
        }
        Ok(())
    }

    fn scrub_percent(&self) -> Option<u32> {
        self.scrub
            .percentage
            .or_else(|| self.scrub.plan.trim().parse().ok())
    }

    /// Build the immutable run configuration, applying command-line overrides.
    pub fn resolve(&self, overrides: &CliOverrides) -> Configuration {
        let mut steps = StepSet::default();
        let toggles = [
            (Step::Touch, self.snapraid.touch),
            (Step::Diff, self.snapraid.diff),
            (Step::Sync, self.snapraid.sync),
            (Step::Pool, overrides.pool.unwrap_or(self.snapraid_btrfs.pool)),
            (
                Step::Cleanup,
                overrides.cleanup.unwrap_or(self.snapraid_btrfs.cleanup),
            ),
            (Step::Scrub, overrides.scrub.unwrap_or(self.scrub.enabled)),
        ];
        for (step, enabled) in toggles {
            if enabled {
                steps.insert(step);
            }
        }

        let delete_threshold = if overrides.ignore_delete_threshold {
            None
        } else {
            let raw = overrides
                .delete_threshold
                .unwrap_or(self.snapraid.deletethreshold);
            u64::try_from(raw).ok()
        };

        let scrub_plan = match self.scrub_percent() {
            Some(percent) => ScrubPlan::Percent {
                percent,
                older_than_days: self.scrub.older_than,
            },
            None => {
                let name = self.scrub.plan.trim().to_string();
                if steps.contains(Step::Scrub) && self.scrub.older_than > 0 {
                    warn!("Ignoring 'older-than' config item with scrub plan '{name}'");
                }
                ScrubPlan::Named(name)
            }
        };

        let extra_args: BTreeMap<Step, Vec<String>> = Step::ALL
            .into_iter()
            .filter_map(|step| {
                let args = self.extra_args.for_step(step);
                (!args.is_empty()).then(|| (step, args.to_vec()))
            })
            .collect();

        Configuration {
            tools: ToolPaths {
                snapraid_btrfs: PathBuf::from(self.snapraid_btrfs.executable.trim()),
                snapper: PathBuf::from(self.snapper.executable.trim()),
                snapraid: PathBuf::from(self.snapraid.executable.trim()),
                snapraid_config: PathBuf::from(self.snapraid.config.trim()),
            },
            steps,
            delete_threshold,
            snapper: SnapperSelection {
                configs: non_empty(&self.snapraid_btrfs.snapper_configs),
                configs_file: non_empty(&self.snapraid_btrfs.snapper_configs_file)
                    .map(PathBuf::from),
            },
            pool_dir: non_empty(&self.snapraid_btrfs.pool_dir).map(PathBuf::from),
            scrub_plan,
            extra_args,
            step_timeout: (self.run.step_timeout_secs > 0)
                .then(|| Duration::from_secs(self.run.step_timeout_secs)),
            output_limit_bytes: self.run.output_limit_bytes,
        }
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        non_empty(&self.logging.file).map(PathBuf::from)
    }

    pub fn report_dir(&self) -> Option<PathBuf> {
        non_empty(&self.report.dir).map(PathBuf::from)
    }

    pub fn discord_webhook(&self) -> Option<String> {
        non_empty(&self.discord.webhook_url)
    }

    pub fn report_options(&self) -> ReportOptions {
        let max_bytes = usize::try_from(self.notify.maxsize)
            .ok()
            .filter(|kib| *kib > 0)
            .map(|kib| kib.saturating_mul(1024));
        ReportOptions {
            short: self.notify.short,
            max_bytes,
            subject: self.notify.subject.trim().to_string(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Load and validate config from a TOML file. The file must exist.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.is_file() {
        return Err(anyhow!("configuration file not found: {}", path.display()));
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
