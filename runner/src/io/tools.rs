//! Tool runner abstraction for `snapraid-btrfs` invocations.
//!
//! The [`ToolRunner`] trait decouples the pipeline from actual process
//! execution. Tests use scripted runners that return predetermined outputs
//! without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::command::step_args;
use crate::core::settings::Configuration;
use crate::core::types::Step;
use crate::io::process::run_command_streaming;

/// Parameters for one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequest {
    pub step: Step,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Maximum time to wait for the tool; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl ToolRequest {
    /// Request for running `step` through `snapraid-btrfs` with `config`.
    pub fn for_step(config: &Configuration, step: Step) -> Self {
        Self {
            step,
            program: config.tools.snapraid_btrfs.clone(),
            args: step_args(config, step),
            timeout: config.step_timeout,
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    /// Shell-like rendering for logs and reports.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Result of a finished tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Abstraction over tool execution backends.
pub trait ToolRunner {
    /// Run the tool described by `request`.
    ///
    /// Every stdout line must be passed to `on_stdout_line` as it is produced.
    /// An `Err` means the tool could not be run at all (e.g. spawn failure).
    fn run(
        &self,
        request: &ToolRequest,
        on_stdout_line: &mut (dyn FnMut(&str)),
    ) -> Result<ToolOutput>;
}

/// Runner that spawns the requested program as a child process.
pub struct ProcessToolRunner;

impl ToolRunner for ProcessToolRunner {
    #[instrument(skip_all, fields(step = %request.step))]
    fn run(
        &self,
        request: &ToolRequest,
        on_stdout_line: &mut (dyn FnMut(&str)),
    ) -> Result<ToolOutput> {
        info!(command = %request.command_line(), "running {}", request.step);

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args);

        let output = run_command_streaming(
            cmd,
            request.timeout,
            request.output_limit_bytes,
            |line| on_stdout_line(line),
        )
        .with_context(|| format!("run {}", request.program.display()))?;

        let label = request.step.as_str();
        let mut stdout = output.stdout.clone();
        stdout.push_str(&output.stdout_truncated_notice(label));
        let mut stderr = output.stderr.clone();
        stderr.push_str(&output.stderr_truncated_notice(label));

        if output.timed_out {
            warn!(step = %request.step, "tool timed out");
        } else {
            debug!(step = %request.step, exit_code = ?output.status.code(), "tool finished");
        }

        Ok(ToolOutput {
            exit_code: if output.timed_out {
                None
            } else {
                output.status.code()
            },
            stdout,
            stderr,
            timed_out: output.timed_out,
        })
    }
}
