//! Test-only helpers: scripted tool runners and fake tool installations.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::core::settings::Configuration;
use crate::core::types::Step;
use crate::io::tools::{ToolOutput, ToolRequest, ToolRunner};

/// One scripted tool invocation.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    pub step: Step,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub spawn_error: bool,
}

impl ScriptedRun {
    pub fn exit(step: Step, code: i32) -> Self {
        Self {
            step,
            exit_code: Some(code),
            stdout: String::new(),
            stderr: String::new(),
            timed_out: false,
            spawn_error: false,
        }
    }

    pub fn ok(step: Step) -> Self {
        Self::exit(step, 0)
    }

    pub fn timed_out(step: Step) -> Self {
        Self {
            exit_code: None,
            timed_out: true,
            ..Self::ok(step)
        }
    }

    pub fn spawn_error(step: Step) -> Self {
        Self {
            exit_code: None,
            spawn_error: true,
            ..Self::ok(step)
        }
    }

    pub fn stdout(mut self, text: &str) -> Self {
        self.stdout = text.to_string();
        self
    }

    pub fn stderr(mut self, text: &str) -> Self {
        self.stderr = text.to_string();
        self
    }

    /// Diff run whose output lists `removed` deleted files and nothing else.
    pub fn diff_removing(removed: usize) -> Self {
        let mut stdout = String::new();
        for i in 0..removed {
            stdout.push_str(&format!("remove dir/file-{i}.dat\n"));
        }
        Self::exit(Step::Diff, if removed > 0 { 2 } else { 0 }).stdout(&stdout)
    }
}

/// Tool runner that replays scripted results in order and records invocations.
pub struct ScriptedToolRunner {
    queue: RefCell<VecDeque<ScriptedRun>>,
    requests: RefCell<Vec<ToolRequest>>,
}

impl ScriptedToolRunner {
    pub fn new(runs: Vec<ScriptedRun>) -> Self {
        Self {
            queue: RefCell::new(runs.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Steps actually invoked, in order.
    pub fn invoked(&self) -> Vec<Step> {
        self.requests.borrow().iter().map(|r| r.step).collect()
    }

    pub fn requests(&self) -> Vec<ToolRequest> {
        self.requests.borrow().clone()
    }
}

impl ToolRunner for ScriptedToolRunner {
    fn run(
        &self,
        request: &ToolRequest,
        on_stdout_line: &mut (dyn FnMut(&str)),
    ) -> Result<ToolOutput> {
        self.requests.borrow_mut().push(request.clone());
        let run = self
            .queue
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted run left for {}", request.step))?;
        if run.step != request.step {
            return Err(anyhow!(
                "scripted run for {} but {} was requested",
                run.step,
                request.step
            ));
        }
        if run.spawn_error {
            return Err(anyhow!(
                "spawn {}: No such file or directory",
                request.program.display()
            ));
        }
        for line in run.stdout.lines() {
            on_stdout_line(line);
        }
        Ok(ToolOutput {
            exit_code: run.exit_code,
            stdout: run.stdout,
            stderr: run.stderr,
            timed_out: run.timed_out,
        })
    }
}

/// Behaviour of one subcommand of a fake `snapraid-btrfs` script.
#[derive(Debug, Clone)]
pub struct FakeStep {
    pub step: Step,
    pub stdout: String,
    pub exit_code: i32,
}

impl FakeStep {
    pub fn new(step: Step, stdout: &str, exit_code: i32) -> Self {
        Self {
            step,
            stdout: stdout.to_string(),
            exit_code,
        }
    }
}

/// Temporary directory holding fake `snapraid-btrfs`, `snapper` and `snapraid`
/// executables plus a snapraid config file.
///
/// The fake wrapper appends each invoked subcommand to `calls.log`.
/// Subcommands without a [`FakeStep`] print nothing and exit 0.
#[cfg(unix)]
pub struct FakeTools {
    dir: tempfile::TempDir,
}

#[cfg(unix)]
impl FakeTools {
    pub fn new(steps: &[FakeStep]) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let calls = dir.path().join("calls.log");

        let mut script = String::from(
            "#!/bin/sh\ncmd=\"\"\nfor arg in \"$@\"; do\n  case \"$arg\" in\n    touch|diff|sync|pool|cleanup|scrub) cmd=\"$arg\"; break;;\n  esac\ndone\n",
        );
        script.push_str(&format!("echo \"$cmd\" >> '{}'\n", calls.display()));
        script.push_str("case \"$cmd\" in\n");
        for fake in steps {
            script.push_str(&format!("  {})\n    cat <<'FAKE_OUTPUT_END'\n", fake.step));
            script.push_str(&fake.stdout);
            if !fake.stdout.is_empty() && !fake.stdout.ends_with('\n') {
                script.push('\n');
            }
            script.push_str(&format!("FAKE_OUTPUT_END\n    exit {};;\n", fake.exit_code));
        }
        script.push_str("  *) exit 0;;\nesac\n");

        write_executable(&dir.path().join("snapraid-btrfs"), &script)?;
        write_executable(&dir.path().join("snapper"), "#!/bin/sh\nexit 0\n")?;
        write_executable(&dir.path().join("snapraid"), "#!/bin/sh\nexit 0\n")?;
        fs::write(dir.path().join("snapraid.conf"), "parity /mnt/parity/snapraid.parity\n")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn wrapper(&self) -> PathBuf {
        self.path().join("snapraid-btrfs")
    }

    pub fn snapper(&self) -> PathBuf {
        self.path().join("snapper")
    }

    pub fn snapraid(&self) -> PathBuf {
        self.path().join("snapraid")
    }

    pub fn snapraid_config(&self) -> PathBuf {
        self.path().join("snapraid.conf")
    }

    /// Subcommands invoked so far, in order.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Configuration pointing at the fake tools with the given steps enabled.
    pub fn configuration(&self, steps: &[Step]) -> Configuration {
        let mut config = Configuration::with_steps(steps.iter().copied());
        config.tools.snapraid_btrfs = self.wrapper();
        config.tools.snapper = self.snapper();
        config.tools.snapraid = self.snapraid();
        config.tools.snapraid_config = self.snapraid_config();
        config
    }

    /// TOML config body pointing at the fake tools.
    ///
    /// `snapraid_keys` is inserted into the `[snapraid]` table; `extra` is
    /// appended verbatim after it.
    pub fn config_toml(&self, snapraid_keys: &str, extra: &str) -> String {
        format!(
            "[snapraid-btrfs]\nexecutable = '{}'\n\n[snapper]\nexecutable = '{}'\n\n[snapraid]\nexecutable = '{}'\nconfig = '{}'\n{snapraid_keys}\n\n{extra}",
            self.wrapper().display(),
            self.snapper().display(),
            self.snapraid().display(),
            self.snapraid_config().display(),
        )
    }
}

#[cfg(unix)]
fn write_executable(path: &Path, contents: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::write(path, contents)?;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}
