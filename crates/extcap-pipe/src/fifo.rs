//! FIFO channels for Unix platforms

use crate::{channel_name, Channel, PipeFactory};
use extcap_core::{ExtcapError, ExtcapResult};
use nix::sys::stat::Mode;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Creates `mkfifo` channels with mode 0600
#[derive(Debug, Clone)]
pub struct FifoFactory {
    directory: PathBuf,
    prefix: String,
}

impl FifoFactory {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
        }
    }

    /// Directory the FIFOs are created in
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create a FIFO at exactly `path`, replacing whatever is there
    pub fn create_at(&self, path: &Path) -> ExtcapResult<Channel> {
        debug!("Creating fifo: {}", path.display());

        if path.symlink_metadata().is_ok() {
            std::fs::remove_file(path).map_err(|e| {
                ExtcapError::ChannelCreation(format!(
                    "cannot remove stale {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }

        nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|e| {
            error!("mkfifo {} failed: {}", path.display(), e);
            ExtcapError::ChannelCreation(format!("mkfifo {}: {}", path.display(), e))
        })?;

        Ok(Channel::from_path(path))
    }
}

impl PipeFactory for FifoFactory {
    fn create_channel(&self) -> ExtcapResult<Channel> {
        let path = self.directory.join(channel_name(&self.prefix));
        self.create_at(&path)
    }
}
