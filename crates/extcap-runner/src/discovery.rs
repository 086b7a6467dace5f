//! Helper discovery
//!
//! Every executable in the helper directory is asked for its interfaces.
//! Helpers that fail or print garbage contribute nothing; the pass always
//! runs to the end of the directory.

use crate::runner::{helper_candidates, probe_helper, HelperRunner};
use extcap_core::protocol;
use extcap_core::{
    ExtcapError, ExtcapResult, InterfaceRecord, InterfaceRegistry, SentenceParser,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Lazy sequence of `(helper, probe result)` pairs over a helper directory.
///
/// Each helper is only invoked when the iterator is advanced.
pub struct HelperScan<'a> {
    candidates: std::vec::IntoIter<PathBuf>,
    runner: &'a dyn HelperRunner,
    args: Vec<String>,
}

impl<'a> HelperScan<'a> {
    pub fn new(
        directory: &Path,
        runner: &'a dyn HelperRunner,
        args: Vec<String>,
    ) -> std::io::Result<Self> {
        Ok(Self {
            candidates: helper_candidates(directory)?.into_iter(),
            runner,
            args,
        })
    }
}

impl Iterator for HelperScan<'_> {
    type Item = (PathBuf, ExtcapResult<String>);

    fn next(&mut self) -> Option<Self::Item> {
        let helper = self.candidates.next()?;
        let result = probe_helper(self.runner, &helper, &self.args);
        Some((helper, result))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.candidates.size_hint()
    }
}

/// Outcome of one discovery pass
#[derive(Debug, Default, Serialize)]
pub struct DiscoveryReport {
    /// Accepted interfaces: directory order, then helper emission order
    pub interfaces: Vec<InterfaceRecord>,

    /// Number of helpers that were invoked
    pub helpers_probed: usize,

    /// Helpers that failed to start, exited nonzero or printed unparsable output
    #[serde(skip)]
    pub failures: Vec<ExtcapError>,

    /// Interface claims rejected because another helper already owns the name
    #[serde(skip)]
    pub conflicts: Vec<ExtcapError>,
}

/// Enumerates helpers and fills the registry
pub struct DiscoveryProber<'a> {
    runner: &'a dyn HelperRunner,
    parser: &'a dyn SentenceParser,
}

impl<'a> DiscoveryProber<'a> {
    pub fn new(runner: &'a dyn HelperRunner, parser: &'a dyn SentenceParser) -> Self {
        Self { runner, parser }
    }

    /// Start a lazy list-interfaces scan of `directory`
    pub fn scan(&self, directory: &Path) -> std::io::Result<HelperScan<'a>> {
        HelperScan::new(directory, self.runner, protocol::list_interfaces_args())
    }

    /// Interfaces provided by the helpers in `directory`.
    ///
    /// Resets `registry` first, then registers every accepted interface.
    pub fn enumerate(
        &self,
        directory: &Path,
        registry: &mut InterfaceRegistry,
    ) -> Vec<InterfaceRecord> {
        self.discover(directory, registry).interfaces
    }

    /// Like [`enumerate`](Self::enumerate), also returning what was rejected
    pub fn discover(&self, directory: &Path, registry: &mut InterfaceRegistry) -> DiscoveryReport {
        registry.reset();

        let scan = match self.scan(directory) {
            Ok(scan) => scan,
            Err(e) => {
                warn!("Cannot read helper directory {}: {}", directory.display(), e);
                return DiscoveryReport::default();
            }
        };

        let report = scan.fold(DiscoveryReport::default(), |mut report, (helper, result)| {
            report.helpers_probed += 1;
            match result.and_then(|out| self.parser.parse_interfaces(&out)) {
                Ok(candidates) => {
                    debug!(
                        "Helper {} advertised {} interfaces",
                        helper.display(),
                        candidates.len()
                    );
                    for candidate in candidates {
                        if registry.owns(&candidate.call, &helper) {
                            debug!("  Interface [{}] repeated, ignoring", candidate.call);
                            continue;
                        }
                        match registry.register(&candidate.call, &helper) {
                            Ok(()) => {
                                debug!(
                                    "  Interface [{}] \"{}\"",
                                    candidate.call, candidate.display
                                );
                                report.interfaces.push(InterfaceRecord {
                                    call: candidate.call,
                                    display: candidate.display,
                                    helper: helper.clone(),
                                });
                            }
                            Err(conflict) => {
                                warn!("{}", conflict);
                                report.conflicts.push(conflict);
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Helper {} contributed no interfaces: {}", helper.display(), e);
                    let failure = if matches!(e, ExtcapError::ProbeFailed { .. }) {
                        e
                    } else {
                        ExtcapError::probe(&helper, e.to_string())
                    };
                    report.failures.push(failure);
                }
            }
            report
        });

        info!(
            "Discovered {} helper interfaces from {} helpers in {}",
            report.interfaces.len(),
            report.helpers_probed,
            directory.display()
        );
        report
    }
}
