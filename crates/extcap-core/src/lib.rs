//! extcap Core - data model, helper protocol and interface registry
//!
//! This crate provides the foundational types shared by the extcap host:
//!
//! - **Types**: interface records, capabilities and session options
//! - **Protocol**: the command line verbs spoken to capture helpers
//! - **Registry**: interface name to owning helper mapping
//! - **Parser**: sentence stream parsing for helper output
//! - **Config**: TOML configuration loading

pub mod config;
pub mod error;
pub mod parser;
pub mod protocol;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use error::{ExtcapError, ExtcapResult};
pub use parser::{ParsedInterface, SentenceParser, SentenceTokenizer};
pub use registry::InterfaceRegistry;
pub use types::{
    ArgumentValue, CaptureCapabilities, ConfigurationArgument, InterfaceKind, InterfaceOptions,
    InterfaceRecord, LinkType, Session,
};

/// Host version
pub const HOST_VERSION: &str = env!("CARGO_PKG_VERSION");
