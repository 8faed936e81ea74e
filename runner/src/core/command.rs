//! Argument templates for `snapraid-btrfs` invocations.
//!
//! Layout: `[wrapper options] <step> [snapraid options] [extra args]`.
//! Wrapper options tell `snapraid-btrfs` where snapper, snapraid and the
//! snapraid config live; snapraid options are forwarded to snapraid itself.

use crate::core::settings::{Configuration, ScrubPlan};
use crate::core::types::Step;

/// Full argument vector (without the program) for running `step`.
pub fn step_args(config: &Configuration, step: Step) -> Vec<String> {
    let mut args = wrapper_args(config, step);
    args.push(step.as_str().to_string());
    args.extend(snapraid_args(config, step));
    args.extend(config.extra_args(step).iter().cloned());
    args
}

fn wrapper_args(config: &Configuration, step: Step) -> Vec<String> {
    let mut args = vec![
        "--quiet".to_string(),
        "--conf".to_string(),
        config.tools.snapraid_config.display().to_string(),
        "--snapper-path".to_string(),
        config.tools.snapper.display().to_string(),
        "--snapraid-path".to_string(),
        config.tools.snapraid.display().to_string(),
    ];
    if let Some(configs) = &config.snapper.configs {
        args.push("--snapper-configs".to_string());
        args.push(configs.clone());
    }
    if let Some(file) = &config.snapper.configs_file {
        args.push("--snapper-configs-file".to_string());
        args.push(file.display().to_string());
    }
    if step == Step::Pool
        && let Some(dir) = &config.pool_dir
    {
        args.push("--pool-dir".to_string());
        args.push(dir.display().to_string());
    }
    args
}

fn snapraid_args(config: &Configuration, step: Step) -> Vec<String> {
    let mut args = Vec::new();
    // cleanup is handled by snapraid-btrfs alone and rejects snapraid options.
    if step != Step::Cleanup {
        args.push("--quiet".to_string());
    }
    if step == Step::Scrub {
        args.extend(scrub_plan_args(&config.scrub_plan));
    }
    args
}

pub fn scrub_plan_args(plan: &ScrubPlan) -> Vec<String> {
    match plan {
        ScrubPlan::Percent {
            percent,
            older_than_days,
        } => vec![
            "--plan".to_string(),
            percent.to_string(),
            "--older-than".to_string(),
            older_than_days.to_string(),
        ],
        ScrubPlan::Named(name) => vec!["--plan".to_string(), name.clone()],
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn config() -> Configuration {
        let mut config = Configuration::with_steps(Step::ALL);
        config.tools.snapraid_btrfs = PathBuf::from("/usr/bin/snapraid-btrfs");
        config.tools.snapper = PathBuf::from("/usr/bin/snapper");
        config.tools.snapraid = PathBuf::from("/usr/bin/snapraid");
        config.tools.snapraid_config = PathBuf::from("/etc/snapraid.conf");
        config
    }

    #[test]
    fn diff_args_follow_wrapper_then_snapraid_layout() {
        let args = step_args(&config(), Step::Diff);
        assert_eq!(
            args,
            vec![
                "--quiet",
                "--conf",
                "/etc/snapraid.conf",
                "--snapper-path",
                "/usr/bin/snapper",
                "--snapraid-path",
                "/usr/bin/snapraid",
                "diff",
                "--quiet",
            ]
        );
    }

    #[test]
    fn cleanup_has_no_snapraid_quiet() {
        let args = step_args(&config(), Step::Cleanup);
        assert_eq!(args.last().map(String::as_str), Some("cleanup"));
    }

    #[test]
    fn snapper_selection_and_pool_dir() {
        let mut config = config();
        config.snapper.configs = Some("data1,data2".to_string());
        config.snapper.configs_file = Some(PathBuf::from("/etc/snapper-configs"));
        config.pool_dir = Some(PathBuf::from("/mnt/pool"));

        let pool = step_args(&config, Step::Pool);
        let joined = pool.join(" ");
        assert!(joined.contains("--snapper-configs data1,data2"));
        assert!(joined.contains("--snapper-configs-file /etc/snapper-configs"));
        assert!(joined.contains("--pool-dir /mnt/pool pool --quiet"));

        let sync = step_args(&config, Step::Sync).join(" ");
        assert!(!sync.contains("--pool-dir"));
        assert!(sync.contains("--snapper-configs data1,data2"));
    }

    #[test]
    fn scrub_percent_plan_includes_older_than() {
        let mut config = config();
        config.scrub_plan = ScrubPlan::Percent {
            percent: 5,
            older_than_days: 20,
        };
        let args = step_args(&config, Step::Scrub);
        let tail: Vec<&str> = args.iter().rev().take(5).rev().map(String::as_str).collect();
        assert_eq!(tail, vec!["--quiet", "--plan", "5", "--older-than", "20"]);
    }

    #[test]
    fn scrub_named_plan_omits_older_than() {
        let mut config = config();
        config.scrub_plan = ScrubPlan::Named("new".to_string());
        let args = step_args(&config, Step::Scrub);
        assert!(args.ends_with(&["--plan".to_string(), "new".to_string()]));
        assert!(!args.contains(&"--older-than".to_string()));
    }

    #[test]
    fn extra_args_are_appended_last() {
        let mut config = config();
        config
            .extra_args
            .insert(Step::Sync, vec!["--force-zero".to_string()]);
        let args = step_args(&config, Step::Sync);
        assert_eq!(args.last().map(String::as_str), Some("--force-zero"));
        assert_eq!(args[args.len() - 2], "--quiet");
    }
}
