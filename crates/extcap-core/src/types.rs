//! Data model shared by discovery, capability queries and capture sessions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// An interface advertised by a capture helper during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceRecord {
    /// Machine name passed back to the helper (`--extcap-interface`)
    pub call: String,

    /// Human readable name
    pub display: String,

    /// Helper program that owns the interface
    pub helper: PathBuf,
}

/// One link-layer type a helper interface can produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkType {
    /// Numeric DLT
    pub dlt: i32,

    /// Short name, e.g. `EN10MB`
    pub name: String,

    /// Display description
    pub description: String,
}

/// Capture capabilities reported for a helper interface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureCapabilities {
    /// Whether monitor mode can be enabled. Helpers cannot express this, so it is always false.
    pub can_set_rfmon: bool,

    /// Supported link-layer types, in helper order
    pub link_types: Vec<LinkType>,
}

/// A selectable value of a configuration argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentValue {
    pub value: String,
    pub display: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Configuration argument definition produced by the sentence parser.
///
/// The core never interprets these; they are handed to whatever surface
/// renders interface options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationArgument {
    /// Argument number, used to attach `value` sentences
    pub number: u32,

    /// Command line flag the helper expects, e.g. `--delay`
    pub call: String,

    /// Display label
    pub display: String,

    /// Argument kind as declared by the helper (`string`, `integer`, `selector`, ...)
    pub kind: String,

    /// Any further keys of the sentence (`tooltip`, `range`, `default`, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    /// Selectable values for menu-like kinds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<ArgumentValue>,
}

/// How an interface in a session is captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceKind {
    /// Native capture device, not handled by this crate family
    Native,

    /// Capture delegated to a helper program
    Helper { helper: PathBuf },
}

/// Per-session options of one interface.
///
/// Values are immutable revisions: attaching a channel or a process id
/// yields a new value that replaces the old one in the [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceOptions {
    name: String,
    kind: InterfaceKind,
    channel: Option<PathBuf>,
    pid: Option<u32>,
    extra_args: BTreeMap<String, Option<String>>,
}

impl InterfaceOptions {
    /// Options for a native capture interface
    pub fn native(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: InterfaceKind::Native,
            channel: None,
            pid: None,
            extra_args: BTreeMap::new(),
        }
    }

    /// Options for an interface captured by `helper`
    pub fn helper(name: impl Into<String>, helper: impl Into<PathBuf>) -> Self {
        Self {
            kind: InterfaceKind::Helper {
                helper: helper.into(),
            },
            ..Self::native(name)
        }
    }

    /// Add an operator supplied `key value` argument
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_args.insert(key.into(), Some(value.into()));
        self
    }

    /// Add an operator supplied flag without value
    pub fn with_flag(mut self, key: impl Into<String>) -> Self {
        self.extra_args.insert(key.into(), None);
        self
    }

    /// Revision with the capture channel attached
    pub fn with_channel(self, channel: impl Into<PathBuf>) -> Self {
        Self {
            channel: Some(channel.into()),
            ..self
        }
    }

    /// Revision with the process id recorded (`None` when spawning failed)
    pub fn with_pid(self, pid: Option<u32>) -> Self {
        Self { pid, ..self }
    }

    /// Revision with channel and process id detached
    pub fn cleared(self) -> Self {
        Self {
            channel: None,
            pid: None,
            ..self
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &InterfaceKind {
        &self.kind
    }

    /// Owning helper, `None` for native interfaces
    pub fn helper_path(&self) -> Option<&Path> {
        match &self.kind {
            InterfaceKind::Helper { helper } => Some(helper),
            InterfaceKind::Native => None,
        }
    }

    pub fn is_helper(&self) -> bool {
        matches!(self.kind, InterfaceKind::Helper { .. })
    }

    pub fn channel(&self) -> Option<&Path> {
        self.channel.as_deref()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn extra_args(&self) -> &BTreeMap<String, Option<String>> {
        &self.extra_args
    }
}

/// The configured interfaces of one capture run, addressed by index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    entries: Vec<InterfaceOptions>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append
    pub fn with_interface(mut self, options: InterfaceOptions) -> Self {
        self.entries.push(options);
        self
    }

    pub fn push(&mut self, options: InterfaceOptions) -> usize {
        self.entries.push(options);
        self.entries.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&InterfaceOptions> {
        self.entries.get(index)
    }

    /// Install a new revision of the entry at `index`, returning the previous one
    pub fn replace(
        &mut self,
        index: usize,
        revision: InterfaceOptions,
    ) -> Option<InterfaceOptions> {
        self.entries
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, revision))
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterfaceOptions> {
        self.entries.iter()
    }

    /// Indices of helper-backed entries, in configured order
    pub fn helper_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_helper())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
