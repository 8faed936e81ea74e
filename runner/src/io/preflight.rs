//! Checks run before any tool is invoked.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tracing::{debug, instrument};

use crate::core::settings::Configuration;

/// Verify that every executable resolves and snapraid's config file exists.
#[instrument(skip_all)]
pub fn preflight(config: &Configuration) -> Result<()> {
    let tools = [
        ("snapraid-btrfs", &config.tools.snapraid_btrfs),
        ("snapper", &config.tools.snapper),
        ("snapraid", &config.tools.snapraid),
    ];
    for (name, program) in tools {
        let resolved = resolve_executable(program, env::var_os("PATH").as_deref())
            .ok_or_else(|| anyhow!("{name} executable not found: {}", program.display()))?;
        debug!(tool = name, path = %resolved.display(), "executable resolved");
    }

    let snapraid_config = &config.tools.snapraid_config;
    if !snapraid_config.is_file() {
        return Err(anyhow!(
            "snapraid configuration file not found: {}",
            snapraid_config.display()
        ));
    }
    Ok(())
}

/// Resolve `program` the way a shell would.
///
/// A path with a directory component must name an executable file; a bare
/// name is looked up in each entry of `search_path`.
pub fn resolve_executable(program: &Path, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if program.as_os_str().is_empty() {
        return None;
    }
    if program.components().count() > 1 || program.is_absolute() {
        return is_executable(program).then(|| program.to_path_buf());
    }
    env::split_paths(search_path?)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
