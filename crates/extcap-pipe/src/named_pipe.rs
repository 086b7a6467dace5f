//! Named Pipe channels for Windows
//!
//! The pipe is created in message mode with an inheritable handle so the
//! spawned helper can connect to it by name and write its frames.

use crate::{channel_name, Channel, PipeFactory};
use extcap_core::{ExtcapError, ExtcapResult};
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use tracing::{debug, error};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE, TRUE};
use windows::Win32::Security::SECURITY_ATTRIBUTES;
use windows::Win32::Storage::FileSystem::{FlushFileBuffers, PIPE_ACCESS_DUPLEX};
use windows::Win32::System::Pipes::{
    CreateNamedPipeW, DisconnectNamedPipe, PIPE_READMODE_MESSAGE, PIPE_TYPE_MESSAGE, PIPE_WAIT,
};

/// Named pipe namespace prefix
pub const PIPE_NAMESPACE: &str = r"\\.\pipe\";

const MAX_INSTANCES: u32 = 5;
const BUFFER_SIZE: u32 = 65536;
const DEFAULT_TIMEOUT_MS: u32 = 300;

/// Owned Named Pipe handle
#[derive(Debug)]
pub struct PipeHandle(HANDLE);

// The handle is only used by the session that created it.
unsafe impl Send for PipeHandle {}
unsafe impl Sync for PipeHandle {}

impl PipeHandle {
    pub fn raw(&self) -> HANDLE {
        self.0
    }

    /// Flush, disconnect, then close. Flush and disconnect fail when no
    /// helper ever connected; only a failed close is reported.
    pub fn close(self) -> ExtcapResult<()> {
        if let Err(e) = unsafe { FlushFileBuffers(self.0) } {
            debug!("Named pipe flush failed: {}", e);
        }
        if let Err(e) = unsafe { DisconnectNamedPipe(self.0) } {
            debug!("Named pipe disconnect failed: {}", e);
        }
        unsafe { CloseHandle(self.0) }
            .map_err(|e| ExtcapError::Io(std::io::Error::other(e.to_string())))
    }
}

/// Creates Named Pipe channels under `\\.\pipe\`
#[derive(Debug, Clone)]
pub struct NamedPipeFactory {
    prefix: String,
}

impl NamedPipeFactory {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl PipeFactory for NamedPipeFactory {
    fn create_channel(&self) -> ExtcapResult<Channel> {
        let pipe_path = format!("{}{}", PIPE_NAMESPACE, channel_name(&self.prefix));

        let pipe_path_wide: Vec<u16> = OsStr::new(&pipe_path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let security = SECURITY_ATTRIBUTES {
            nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: std::ptr::null_mut(),
            bInheritHandle: TRUE,
        };

        let pipe_handle = unsafe {
            CreateNamedPipeW(
                PCWSTR::from_raw(pipe_path_wide.as_ptr()),
                PIPE_ACCESS_DUPLEX,
                PIPE_TYPE_MESSAGE | PIPE_READMODE_MESSAGE | PIPE_WAIT,
                MAX_INSTANCES,
                BUFFER_SIZE,
                BUFFER_SIZE,
                DEFAULT_TIMEOUT_MS,
                Some(&security as *const SECURITY_ATTRIBUTES),
            )
        };

        if pipe_handle == INVALID_HANDLE_VALUE || pipe_handle.is_invalid() {
            let err = std::io::Error::last_os_error();
            error!("Error creating pipe {}: {}", pipe_path, err);
            return Err(ExtcapError::ChannelCreation(format!(
                "CreateNamedPipe {}: {}",
                pipe_path, err
            )));
        }

        debug!("Created pipe {}", pipe_path);
        Ok(Channel::with_handle(pipe_path, PipeHandle(pipe_handle)))
    }
}
