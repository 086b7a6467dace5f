//! Capture session lifecycle
//!
//! Each helper-backed entry of a [`Session`] moves through
//! `Configured -> ChannelCreated -> ProcessSpawned -> Running -> Stopped`.
//! Native entries are left alone.

use crate::runner::{HelperProcess, ProcessLauncher};
use extcap_core::protocol;
use extcap_core::{ExtcapError, ExtcapResult, InterfaceOptions, Session};
use extcap_pipe::{Channel, PipeFactory};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle state of one helper-backed session entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Configured,
    ChannelCreated,
    ProcessSpawned,
    Running,
    Stopped,
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntryState::Configured => "configured",
            EntryState::ChannelCreated => "channel-created",
            EntryState::ProcessSpawned => "process-spawned",
            EntryState::Running => "running",
            EntryState::Stopped => "stopped",
        };
        f.pad(s)
    }
}

/// Host-side resources held for one entry
#[derive(Default)]
struct EntryResources {
    channel: Option<Channel>,
    process: Option<HelperProcess>,
}

/// Starts and stops the helpers of one capture session
pub struct SessionManager {
    session: Session,
    pipes: Arc<dyn PipeFactory>,
    launcher: Arc<dyn ProcessLauncher>,
    states: BTreeMap<usize, EntryState>,
    resources: BTreeMap<usize, EntryResources>,
}

impl SessionManager {
    pub fn new(
        session: Session,
        pipes: Arc<dyn PipeFactory>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let states = session
            .helper_indices()
            .into_iter()
            .map(|i| (i, EntryState::Configured))
            .collect();

        Self {
            session,
            pipes,
            launcher,
            states,
            resources: BTreeMap::new(),
        }
    }

    /// Current revision of every entry
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// State of the entry at `index`, `None` for native or unknown entries
    pub fn state(&self, index: usize) -> Option<EntryState> {
        self.states.get(&index).copied()
    }

    /// `(index, state)` of every helper-backed entry
    pub fn states(&self) -> impl Iterator<Item = (usize, EntryState)> + '_ {
        self.states.iter().map(|(i, s)| (*i, *s))
    }

    pub fn pid(&self, index: usize) -> Option<u32> {
        self.session.get(index).and_then(|e| e.pid())
    }

    /// Number of entries whose helper is running
    pub fn running(&self) -> usize {
        self.states
            .values()
            .filter(|s| **s == EntryState::Running)
            .count()
    }

    fn advance(&mut self, index: usize, to: EntryState) {
        if let Some(state) = self.states.get_mut(&index) {
            if to > *state {
                debug!("Entry {}: {} -> {}", index, state, to);
                *state = to;
            }
        }
    }

    fn revise(&mut self, index: usize, f: impl FnOnce(InterfaceOptions) -> InterfaceOptions) {
        if let Some(current) = self.session.get(index).cloned() {
            self.session.replace(index, f(current));
        }
    }

    /// Create a channel and spawn the helper for every configured entry, in
    /// order.
    ///
    /// A channel failure aborts the call. Channels created earlier in the
    /// same call stay in place until [`stop`](Self::stop). A helper that
    /// cannot be spawned is logged and leaves its entry without a pid.
    pub fn init(&mut self) -> ExtcapResult<()> {
        let pending: Vec<usize> = self
            .states
            .iter()
            .filter(|(_, s)| **s == EntryState::Configured)
            .map(|(i, _)| *i)
            .collect();

        for index in pending {
            let Some(entry) = self.session.get(index).cloned() else {
                continue;
            };
            let Some(helper) = entry.helper_path().map(|p| p.to_path_buf()) else {
                continue;
            };

            let channel = self.pipes.create_channel().map_err(|e| {
                error!("Cannot create channel for {}: {}", entry.name(), e);
                e
            })?;
            let channel_path = channel.path().to_path_buf();
            self.resources.entry(index).or_default().channel = Some(channel);
            self.revise(index, |e| e.with_channel(&channel_path));
            self.advance(index, EntryState::ChannelCreated);

            let args =
                protocol::run_capture_args(entry.name(), &channel_path, entry.extra_args());
            debug!("Launching {} {}", helper.display(), args.join(" "));

            match self.launcher.launch(&helper, &args) {
                Ok(mut process) => {
                    let pid = process.pid();
                    let exited = process.try_status();
                    self.revise(index, |e| e.with_pid(Some(pid)));
                    self.resources.entry(index).or_default().process = Some(process);
                    self.advance(index, EntryState::ProcessSpawned);

                    match exited {
                        None => {
                            info!(
                                "Capturing {} with {} (PID {})",
                                entry.name(),
                                helper.display(),
                                pid
                            );
                            self.advance(index, EntryState::Running);
                        }
                        Some(status) => {
                            warn!("Helper for {} exited immediately: {}", entry.name(), status);
                        }
                    }
                }
                Err(source) => {
                    let err = ExtcapError::Spawn { helper, source };
                    error!("{}", err);
                    self.revise(index, |e| e.with_pid(None));
                    self.advance(index, EntryState::ProcessSpawned);
                }
            }
        }

        Ok(())
    }

    /// Tear every helper-backed entry down, in order.
    ///
    /// Channels are closed (handles flushed and disconnected, files deleted)
    /// and process bookkeeping is released. Helpers are not signalled; they
    /// exit once their channel is gone. One entry failing does not keep the
    /// others from being torn down; the first failure is returned. Calling
    /// this again is a no-op.
    pub fn stop(&mut self) -> ExtcapResult<()> {
        let indices: Vec<usize> = self.states.keys().copied().collect();
        let mut first_error = None;

        for index in indices {
            if self.state(index) == Some(EntryState::Stopped) {
                continue;
            }

            let resources = self.resources.remove(&index).unwrap_or_default();
            if let Some(mut channel) = resources.channel {
                if let Err(e) = channel.close() {
                    warn!("Teardown of entry {} failed: {}", index, e);
                    first_error.get_or_insert(e);
                }
            }
            if let Some(process) = resources.process {
                process.release();
            }

            self.revise(index, InterfaceOptions::cleared);
            self.advance(index, EntryState::Stopped);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
