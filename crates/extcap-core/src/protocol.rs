//! Command line protocol spoken to capture helpers
//!
//! One verb per invocation. The flags match Wireshark's extcap interface so
//! existing helpers can be dropped into the helper directory unchanged.

use std::collections::BTreeMap;
use std::path::Path;

/// List the interfaces a helper provides
pub const ARG_LIST_INTERFACES: &str = "--extcap-interfaces";

/// List the link-layer types of one interface
pub const ARG_LIST_DLTS: &str = "--extcap-dlts";

/// List the configuration arguments of one interface
pub const ARG_CONFIG: &str = "--extcap-config";

/// Start capturing
pub const ARG_RUN_CAPTURE: &str = "--capture";

/// Interface selector, followed by the interface name
pub const ARG_INTERFACE: &str = "--extcap-interface";

/// Capture destination, followed by the channel path
pub const ARG_FIFO: &str = "--fifo";

/// Arguments for the list-interfaces probe
pub fn list_interfaces_args() -> Vec<String> {
    vec![ARG_LIST_INTERFACES.to_string()]
}

/// Arguments for the list-dlts query
pub fn list_dlts_args(interface: &str) -> Vec<String> {
    interface_query(ARG_LIST_DLTS, interface)
}

/// Arguments for the get-config query
pub fn get_config_args(interface: &str) -> Vec<String> {
    interface_query(ARG_CONFIG, interface)
}

fn interface_query(verb: &str, interface: &str) -> Vec<String> {
    vec![
        verb.to_string(),
        ARG_INTERFACE.to_string(),
        interface.to_string(),
    ]
}

/// Arguments for a capture run.
///
/// Extra arguments are flattened in map order; a key without value is
/// passed as a bare flag.
pub fn run_capture_args(
    interface: &str,
    channel: &Path,
    extra: &BTreeMap<String, Option<String>>,
) -> Vec<String> {
    let mut args = vec![
        ARG_RUN_CAPTURE.to_string(),
        ARG_INTERFACE.to_string(),
        interface.to_string(),
        ARG_FIFO.to_string(),
        channel.to_string_lossy().to_string(),
    ];

    for (key, value) in extra {
        args.push(key.clone());
        if let Some(value) = value {
            args.push(value.clone());
        }
    }

    args
}
