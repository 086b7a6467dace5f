//! Helper invocation
//!
//! Two ways of running a helper:
//! 1. [`HelperRunner`] - synchronous, waits for exit and captures stdout
//!    (discovery and capability queries)
//! 2. [`ProcessLauncher`] - asynchronous, returns as soon as the helper is
//!    running (capture sessions)

use extcap_core::{ExtcapError, ExtcapResult};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::{debug, warn};

/// Output of a helper that ran to completion
#[derive(Debug, Clone, Default)]
pub struct HelperOutput {
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl HelperOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a helper and waits for it to exit
pub trait HelperRunner: Send + Sync {
    fn run(&self, helper: &Path, args: &[String]) -> std::io::Result<HelperOutput>;
}

/// [`HelperRunner`] backed by `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl HelperRunner for SystemRunner {
    fn run(&self, helper: &Path, args: &[String]) -> std::io::Result<HelperOutput> {
        let mut cmd = Command::new(helper);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Helpers run from their own directory
        if let Some(dir) = helper.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        let output = cmd.output()?;
        Ok(HelperOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run `helper` and return its stdout, turning every way it can fail into
/// [`ExtcapError::ProbeFailed`]
pub fn probe_helper(
    runner: &dyn HelperRunner,
    helper: &Path,
    args: &[String],
) -> ExtcapResult<String> {
    debug!("Running {} {}", helper.display(), args.join(" "));

    let output = runner
        .run(helper, args)
        .map_err(|e| ExtcapError::probe(helper, format!("could not start: {}", e)))?;

    if !output.success() {
        if !output.stderr.trim().is_empty() {
            debug!("{} stderr: {}", helper.display(), output.stderr.trim());
        }
        let reason = match output.exit_code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        };
        return Err(ExtcapError::probe(helper, reason));
    }

    Ok(output.stdout)
}

/// A spawned capture helper
#[derive(Debug)]
pub struct HelperProcess {
    pid: u32,
    child: Option<Child>,
}

impl HelperProcess {
    pub fn from_child(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Some(child),
        }
    }

    /// Process known only by id (no handle to release)
    pub fn detached(pid: u32) -> Self {
        Self { pid, child: None }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit status if the helper has already exited. Never blocks.
    pub fn try_status(&mut self) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!("Cannot query helper PID {}: {}", self.pid, e);
                None
            }
        }
    }

    /// Drop host-side bookkeeping. No signal is sent: a helper that is still
    /// running is left to notice the closed channel on its own and is reaped
    /// by a detached thread once it exits.
    pub fn release(mut self) -> Option<ExitStatus> {
        let status = self.try_status();
        match status {
            Some(status) => debug!("Helper PID {} exited: {}", self.pid, status),
            None => {
                debug!("Releasing helper PID {} while still running", self.pid);
                if let Some(child) = self.child.take() {
                    reap_in_background(self.pid, child);
                }
            }
        }
        status
    }
}

fn reap_in_background(pid: u32, mut child: Child) {
    let spawned = std::thread::Builder::new()
        .name(format!("reap-{}", pid))
        .spawn(move || match child.wait() {
            Ok(status) => debug!("Helper PID {} exited: {}", pid, status),
            Err(e) => warn!("Cannot wait for helper PID {}: {}", pid, e),
        });
    if let Err(e) = spawned {
        warn!("Cannot start reaper for helper PID {}: {}", pid, e);
    }
}

/// Starts a helper without waiting for it
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, helper: &Path, args: &[String]) -> std::io::Result<HelperProcess>;
}

/// [`ProcessLauncher`] backed by `std::process::Command::spawn`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, helper: &Path, args: &[String]) -> std::io::Result<HelperProcess> {
        let child = Command::new(helper)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()?;
        Ok(HelperProcess::from_child(child))
    }
}

/// Executable entries directly under `directory`, sorted by file name
pub fn helper_candidates(directory: &Path) -> std::io::Result<Vec<PathBuf>> {
    let directory = std::path::absolute(directory)?;
    let mut candidates = Vec::new();

    for entry in std::fs::read_dir(&directory)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", directory.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if is_executable(&path) {
            candidates.push(path);
        } else {
            debug!("Not a helper candidate: {}", path.display());
        }
    }

    candidates.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(candidates)
}

/// Regular file with an execute bit set (any regular file off Unix)
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}
