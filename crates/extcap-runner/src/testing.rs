//! Test doubles for runners, launchers and pipe factories

use crate::runner::{HelperOutput, HelperProcess, HelperRunner, ProcessLauncher};
use extcap_core::protocol;
use extcap_core::{ExtcapError, ExtcapResult};
use extcap_pipe::{Channel, PipeFactory};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use tempfile::TempDir;

/// Runner answering from a table keyed by `(helper path, verb)` and
/// recording every invocation
#[derive(Default)]
pub struct ScriptedRunner {
    root: PathBuf,
    responses: HashMap<(PathBuf, String), (i32, String)>,
    calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl ScriptedRunner {
    /// Create helper files in a fresh directory, each answering the
    /// list-interfaces verb with `(exit code, stdout)`
    pub fn with_helpers(helpers: &[(&str, i32, &str)]) -> (TempDir, Self) {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = Self {
            root: std::path::absolute(dir.path()).unwrap(),
            ..Default::default()
        };
        for (name, code, stdout) in helpers {
            write_helper(dir.path(), name, "#!/bin/sh\nexit 0\n");
            runner.respond(name, protocol::ARG_LIST_INTERFACES, *code, stdout);
        }
        (dir, runner)
    }

    /// Answer `verb` sent to helper `name`
    pub fn respond(&mut self, name: &str, verb: &str, code: i32, stdout: &str) {
        self.responses
            .insert((self.path_of(name), verb.to_string()), (code, stdout.to_string()));
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn calls_to(&self, name: &str) -> usize {
        let path = self.path_of(name);
        self.calls.lock().iter().filter(|(p, _)| *p == path).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn last_args(&self, name: &str) -> Option<Vec<String>> {
        let path = self.path_of(name);
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|(p, _)| *p == path)
            .map(|(_, args)| args.clone())
    }
}

impl HelperRunner for ScriptedRunner {
    fn run(&self, helper: &Path, args: &[String]) -> std::io::Result<HelperOutput> {
        self.calls.lock().push((helper.to_path_buf(), args.to_vec()));

        let verb = args.first().cloned().unwrap_or_default();
        match self.responses.get(&(helper.to_path_buf(), verb)) {
            Some((code, stdout)) => Ok(HelperOutput {
                exit_code: Some(*code),
                stdout: stdout.clone(),
                stderr: String::new(),
            }),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no scripted response",
            )),
        }
    }
}

/// Write an executable helper file
pub fn write_helper(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    std::path::absolute(path).unwrap()
}

/// Launcher that records launches and hands out fake pids.
/// Helpers listed in `fail_for` fail to spawn.
#[derive(Default)]
pub struct RecordingLauncher {
    next_pid: AtomicU32,
    pub fail_for: Vec<PathBuf>,
    pub launches: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl RecordingLauncher {
    /// Launcher whose spawns of `helpers` fail
    pub fn failing_for(helpers: Vec<PathBuf>) -> Self {
        Self {
            fail_for: helpers,
            ..Default::default()
        }
    }
}

impl ProcessLauncher for RecordingLauncher {
    fn launch(&self, helper: &Path, args: &[String]) -> std::io::Result<HelperProcess> {
        if self.fail_for.iter().any(|p| p == helper) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "scripted spawn failure",
            ));
        }
        self.launches.lock().push((helper.to_path_buf(), args.to_vec()));
        Ok(HelperProcess::detached(1000 + self.next_pid.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Pipe factory creating plain files, failing once `limit` channels exist
pub struct FileChannelFactory {
    dir: PathBuf,
    created: AtomicUsize,
    limit: usize,
}

impl FileChannelFactory {
    pub fn new(dir: &Path) -> Self {
        Self::failing_after(dir, usize::MAX)
    }

    pub fn failing_after(dir: &Path, limit: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            created: AtomicUsize::new(0),
            limit,
        }
    }
}

impl PipeFactory for FileChannelFactory {
    fn create_channel(&self) -> ExtcapResult<Channel> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        if n >= self.limit {
            return Err(ExtcapError::ChannelCreation("scripted failure".into()));
        }
        let path = self.dir.join(format!("extcap_host_test_{}", n));
        std::fs::write(&path, b"")?;
        Ok(Channel::from_path(path))
    }
}
