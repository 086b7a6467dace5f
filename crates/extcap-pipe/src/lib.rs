//! Capture channel creation
//!
//! Every helper-backed interface in a capture session writes its frames into a
//! uniquely named channel:
//!
//! - Unix: a FIFO with owner-only permissions in a temporary directory
//! - Windows: a message-mode duplex Named Pipe whose handle is inheritable
//!
//! Callers only depend on [`PipeFactory`] and [`Channel`] (a path plus an
//! optional platform handle).

#[cfg(unix)]
pub mod fifo;
#[cfg(target_os = "windows")]
pub mod named_pipe;

use extcap_core::config::PipeSettings;
use extcap_core::{ExtcapError, ExtcapResult};
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(unix)]
pub use fifo::FifoFactory;
#[cfg(target_os = "windows")]
pub use named_pipe::{NamedPipeFactory, PipeHandle};

/// Creates capture channels
pub trait PipeFactory: Send + Sync {
    /// Create a fresh channel. Failures are always reported, never swallowed.
    fn create_channel(&self) -> ExtcapResult<Channel>;
}

/// A created capture channel
#[derive(Debug)]
pub struct Channel {
    path: PathBuf,
    #[cfg(target_os = "windows")]
    handle: Option<PipeHandle>,
    closed: bool,
}

impl Channel {
    /// Channel backed by a filesystem object at `path`
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            #[cfg(target_os = "windows")]
            handle: None,
            closed: false,
        }
    }

    /// Named Pipe channel owning `handle`
    #[cfg(target_os = "windows")]
    pub fn with_handle(path: impl Into<PathBuf>, handle: PipeHandle) -> Self {
        Self {
            path: path.into(),
            handle: Some(handle),
            closed: false,
        }
    }

    /// Path handed to the helper as its capture destination
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Platform handle, if the channel has one
    #[cfg(target_os = "windows")]
    pub fn handle(&self) -> Option<&PipeHandle> {
        self.handle.as_ref()
    }

    pub fn has_handle(&self) -> bool {
        #[cfg(target_os = "windows")]
        {
            self.handle.is_some()
        }
        #[cfg(not(target_os = "windows"))]
        {
            false
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the channel: flush, disconnect and close the handle if there
    /// is one, otherwise delete the channel file. Safe to call repeatedly;
    /// a file that is already gone is not an error.
    pub fn close(&mut self) -> ExtcapResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        #[cfg(target_os = "windows")]
        {
            if let Some(handle) = self.handle.take() {
                debug!("Closing named pipe {}", self.path.display());
                return handle.close();
            }
        }

        remove_channel_file(&self.path)
    }
}

/// Delete a channel file, treating absence as success
pub fn remove_channel_file(path: &Path) -> ExtcapResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed channel {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ExtcapError::Io(e)),
    }
}

/// Unique channel name: `<prefix>_<local timestamp>_<ulid>`
pub fn channel_name(prefix: &str) -> String {
    format!(
        "{}_{}_{}",
        prefix,
        chrono::Local::now().format("%Y%m%d%H%M%S"),
        ulid::Ulid::new()
    )
}

/// Factory used on platforms without channel support
#[derive(Debug, Default)]
pub struct UnsupportedPipeFactory;

impl PipeFactory for UnsupportedPipeFactory {
    fn create_channel(&self) -> ExtcapResult<Channel> {
        Err(ExtcapError::ChannelCreation(
            "capture channels are not supported on this platform".into(),
        ))
    }
}

/// Create the platform-appropriate factory
pub fn default_factory(settings: &PipeSettings) -> Box<dyn PipeFactory> {
    #[cfg(unix)]
    {
        Box::new(FifoFactory::new(
            settings.resolved_directory(),
            settings.prefix.clone(),
        ))
    }

    #[cfg(target_os = "windows")]
    {
        Box::new(NamedPipeFactory::new(settings.prefix.clone()))
    }

    #[cfg(not(any(unix, target_os = "windows")))]
    {
        let _ = settings;
        Box::new(UnsupportedPipeFactory)
    }
}
