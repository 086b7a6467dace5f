//! Helper discovery, capability queries and capture sessions
//!
//! Flow:
//! 1. [`DiscoveryProber`] asks every helper in a directory for its interfaces
//!    and fills the [`InterfaceRegistry`](extcap_core::InterfaceRegistry)
//! 2. [`CapabilityQuery`] routes link-type and configuration queries to the
//!    helper that owns an interface
//! 3. [`SessionManager`] creates a channel per helper-backed interface,
//!    spawns the helpers and tears everything down again
//!
//! [`ExtcapHost`] bundles the three around a shared registry.

pub mod discovery;
pub mod host;
pub mod query;
pub mod runner;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use discovery::{DiscoveryProber, DiscoveryReport, HelperScan};
pub use host::ExtcapHost;
pub use query::CapabilityQuery;
pub use runner::{
    helper_candidates, probe_helper, HelperOutput, HelperProcess, HelperRunner, ProcessLauncher,
    SystemLauncher, SystemRunner,
};
pub use session::{EntryState, SessionManager};
