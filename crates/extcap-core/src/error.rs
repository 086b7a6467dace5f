//! Error types for extcap-core and the crates built on top of it

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while probing, querying or running capture helpers
#[derive(Debug, Error)]
pub enum ExtcapError {
    /// Helper could not start, exited nonzero, or produced unusable output
    #[error("Probe of {helper} failed: {reason}")]
    ProbeFailed { helper: PathBuf, reason: String },

    /// A second helper advertised an interface that is already owned
    #[error("Interface \"{interface}\" is already provided by {owner} (ignoring {claimant})")]
    OwnershipConflict {
        interface: String,
        owner: PathBuf,
        claimant: PathBuf,
    },

    /// Capture channel could not be created
    #[error("Failed to create capture channel: {0}")]
    ChannelCreation(String),

    /// Interface name is not in the registry
    #[error("Unknown helper interface: {0}")]
    UnknownInterface(String),

    /// Owning helper answered but produced no usable records
    #[error("Helper for \"{interface}\" returned no {what}")]
    NoData { interface: String, what: &'static str },

    /// Sentence stream could not be parsed
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Helper process could not be spawned
    #[error("Failed to spawn {helper}: {source}")]
    Spawn {
        helper: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtcapError {
    /// Whether the failure only costs the data of one helper and the
    /// surrounding pass should carry on
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExtcapError::ProbeFailed { .. }
                | ExtcapError::OwnershipConflict { .. }
                | ExtcapError::Parse { .. }
                | ExtcapError::NoData { .. }
                | ExtcapError::Spawn { .. }
        )
    }

    /// Create a probe failure for the given helper
    pub fn probe(helper: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ExtcapError::ProbeFailed {
            helper: helper.into(),
            reason: reason.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        ExtcapError::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Result type for extcap operations
pub type ExtcapResult<T> = Result<T, ExtcapError>;
