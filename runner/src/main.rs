//! Scheduled `snapraid-btrfs` maintenance runner.
//!
//! Loads `snapraid-btrfs-runner.toml`, runs the enabled steps once, reports
//! the outcome and exits with a status reflecting the verdict.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};

use snapraid_btrfs_runner::core::types::RunOutcome;
use snapraid_btrfs_runner::exit_codes;
use snapraid_btrfs_runner::io::config::{CliOverrides, RunnerConfig, load_config};
use snapraid_btrfs_runner::io::notify::{DiscordNotifier, Notifier, dispatch};
use snapraid_btrfs_runner::io::preflight::preflight;
use snapraid_btrfs_runner::io::report::{render_report, write_run_report};
use snapraid_btrfs_runner::io::tools::ProcessToolRunner;
use snapraid_btrfs_runner::logging;
use snapraid_btrfs_runner::pipeline::{LogSink, not_started, run_pipeline};

#[derive(Debug, Parser)]
#[command(
    name = "snapraid-btrfs-runner",
    version,
    about = "Runner for snapraid-btrfs: diff, sync, pool, cleanup and scrub in one go"
)]
struct Cli {
    /// Configuration file.
    #[arg(short = 'c', long = "conf", default_value = "snapraid-btrfs-runner.toml")]
    conf: PathBuf,
    /// Do not run `pool`, even if enabled in the config file.
    #[arg(long)]
    no_pool: bool,
    /// Do not run `cleanup`, even if enabled in the config file.
    #[arg(long)]
    no_cleanup: bool,
    /// Do not run `scrub`, even if enabled in the config file.
    #[arg(long)]
    no_scrub: bool,
    /// Sync regardless of how many files diff reports as deleted.
    #[arg(long = "ignore-deletethreshold")]
    ignore_delete_threshold: bool,
    /// Override the delete threshold; negative disables the check.
    #[arg(
        short = 'd',
        long = "deletethreshold",
        allow_negative_numbers = true,
        conflicts_with = "ignore_delete_threshold"
    )]
    delete_threshold: Option<i64>,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            pool: self.no_pool.then_some(false),
            cleanup: self.no_cleanup.then_some(false),
            scrub: self.no_scrub.then_some(false),
            delete_threshold: self.delete_threshold,
            ignore_delete_threshold: self.ignore_delete_threshold,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    std::process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    let file_config = match load_config(&cli.conf) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{err:#}");
            return exit_codes::CONFIG;
        }
    };
    let log_file = file_config.log_file();
    if let Err(err) = logging::init(&file_config.logging.level, log_file.as_deref()) {
        eprintln!("{err:#}");
        return exit_codes::CONFIG;
    }

    info!("{}", "=".repeat(60));
    info!("Run started");
    info!("{}", "=".repeat(60));

    let config = file_config.resolve(&cli.overrides());
    let outcome = match preflight(&config) {
        Ok(()) => run_pipeline(&config, &ProcessToolRunner, &mut LogSink),
        Err(err) => {
            error!(err = %format!("{err:#}"), "preflight failed");
            not_started(format!("{err:#}"))
        }
    };

    publish(&file_config, &outcome);

    if outcome.verdict.is_success() {
        info!("Run finished successfully");
        exit_codes::OK
    } else {
        error!("Run failed");
        exit_codes::FAILED
    }
}

/// Persist and send the report. Failures here are logged only.
fn publish(file_config: &RunnerConfig, outcome: &RunOutcome) {
    let report = render_report(outcome, &file_config.report_options());

    if let Some(dir) = file_config.report_dir() {
        match write_run_report(&dir, outcome, &report) {
            Ok(paths) => info!(dir = %paths.dir.display(), "run report written"),
            Err(err) => warn!(err = %format!("{err:#}"), "failed to write run report"),
        }
    }

    let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();
    if let Some(url) = file_config.discord_webhook() {
        match DiscordNotifier::new(url) {
            Ok(notifier) => notifiers.push(Box::new(notifier)),
            Err(err) => warn!(err = %format!("{err:#}"), "Discord notifier unavailable"),
        }
    }
    dispatch(&notifiers, &file_config.notify.sendon, outcome, &report);
}
