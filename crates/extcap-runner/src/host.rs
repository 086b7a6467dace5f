//! Host-side entry point tying discovery, queries and sessions together

use crate::discovery::{DiscoveryProber, DiscoveryReport};
use crate::query::CapabilityQuery;
use crate::runner::{HelperRunner, ProcessLauncher, SystemLauncher, SystemRunner};
use crate::session::SessionManager;
use extcap_core::config::HostConfig;
use extcap_core::{
    CaptureCapabilities, ConfigurationArgument, ExtcapError, ExtcapResult, InterfaceOptions,
    InterfaceRegistry, SentenceParser, SentenceTokenizer, Session,
};
use extcap_pipe::PipeFactory;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Owns the interface registry and the collaborators used to talk to helpers.
///
/// Discovery takes the registry write lock for the whole pass, so concurrent
/// passes are serialized and queries never observe a half-built registry.
pub struct ExtcapHost {
    registry: RwLock<InterfaceRegistry>,
    helper_dir: PathBuf,
    runner: Arc<dyn HelperRunner>,
    parser: Arc<dyn SentenceParser>,
    pipes: Arc<dyn PipeFactory>,
    launcher: Arc<dyn ProcessLauncher>,
}

impl ExtcapHost {
    pub fn new(helper_dir: impl Into<PathBuf>, pipes: Arc<dyn PipeFactory>) -> Self {
        Self {
            registry: RwLock::new(InterfaceRegistry::new()),
            helper_dir: helper_dir.into(),
            runner: Arc::new(SystemRunner),
            parser: Arc::new(SentenceTokenizer::new()),
            pipes,
            launcher: Arc::new(SystemLauncher),
        }
    }

    /// Host using the configured helper directory and the platform pipe factory
    pub fn from_config(config: &HostConfig) -> Self {
        let pipes: Arc<dyn PipeFactory> = Arc::from(extcap_pipe::default_factory(&config.pipes));
        Self::new(config.helpers.resolved_directory(), pipes)
    }

    pub fn with_runner(mut self, runner: Arc<dyn HelperRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn SentenceParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_pipes(mut self, pipes: Arc<dyn PipeFactory>) -> Self {
        self.pipes = pipes;
        self
    }

    pub fn helper_dir(&self) -> &Path {
        &self.helper_dir
    }

    /// Rebuild the registry from the helper directory
    pub fn discover(&self) -> DiscoveryReport {
        self.discover_in(&self.helper_dir)
    }

    /// Rebuild the registry from `directory`
    pub fn discover_in(&self, directory: &Path) -> DiscoveryReport {
        let mut registry = self.registry.write();
        DiscoveryProber::new(self.runner.as_ref(), self.parser.as_ref())
            .discover(directory, &mut registry)
    }

    /// Helper owning `interface`, if discovery found one
    pub fn owner_of(&self, interface: &str) -> Option<PathBuf> {
        self.registry.read().lookup(interface).map(Path::to_path_buf)
    }

    /// Number of registered helper interfaces
    pub fn interface_count(&self) -> usize {
        self.registry.read().len()
    }

    pub fn link_types(&self, interface: &str) -> ExtcapResult<CaptureCapabilities> {
        let registry = self.registry.read();
        self.query().list_link_types(&registry, interface)
    }

    pub fn configuration(&self, interface: &str) -> ExtcapResult<Vec<ConfigurationArgument>> {
        let registry = self.registry.read();
        self.query().get_configuration(&registry, interface)
    }

    /// Monitor mode support; any query failure counts as unsupported
    pub fn has_monitor_mode(&self, interface: &str) -> bool {
        match self.link_types(interface) {
            Ok(caps) => caps.can_set_rfmon,
            Err(e) => {
                warn!("Assuming no monitor mode for {}: {}", interface, e);
                false
            }
        }
    }

    /// Session options for a registered helper interface
    pub fn helper_options(&self, interface: &str) -> ExtcapResult<InterfaceOptions> {
        self.owner_of(interface)
            .map(|helper| InterfaceOptions::helper(interface, helper))
            .ok_or_else(|| ExtcapError::UnknownInterface(interface.to_string()))
    }

    /// Session manager for `session` after checking every helper entry
    /// against the registry. Nothing is created or spawned yet.
    pub fn prepare_session(&self, session: Session) -> ExtcapResult<SessionManager> {
        {
            let registry = self.registry.read();
            for entry in session.iter() {
                let Some(helper) = entry.helper_path() else {
                    continue;
                };
                match registry.lookup(entry.name()) {
                    None => return Err(ExtcapError::UnknownInterface(entry.name().to_string())),
                    Some(owner) if owner != helper => {
                        return Err(ExtcapError::OwnershipConflict {
                            interface: entry.name().to_string(),
                            owner: owner.to_path_buf(),
                            claimant: helper.to_path_buf(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(SessionManager::new(
            session,
            self.pipes.clone(),
            self.launcher.clone(),
        ))
    }

    /// Prepare and start `session`.
    ///
    /// If starting fails, whatever the manager already created is torn
    /// down before the error is returned.
    pub fn start_session(&self, session: Session) -> ExtcapResult<SessionManager> {
        let mut manager = self.prepare_session(session)?;
        if let Err(e) = manager.init() {
            if let Err(cleanup) = manager.stop() {
                warn!("Cleanup after failed start also failed: {}", cleanup);
            }
            return Err(e);
        }
        info!("Session started with {} running helpers", manager.running());
        Ok(manager)
    }

    fn query(&self) -> CapabilityQuery<'_> {
        CapabilityQuery::new(self.runner.as_ref(), self.parser.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::EntryState;
    use crate::testing::{FileChannelFactory, RecordingLauncher, ScriptedRunner};
    use extcap_core::protocol;

    fn scripted_host() -> (tempfile::TempDir, tempfile::TempDir, Arc<ScriptedRunner>, ExtcapHost) {
        let (helpers, mut runner) = ScriptedRunner::with_helpers(&[
            ("a_helper", 0, "interface {value=eth-ext}\ninterface {value=usb-ext}"),
            ("b_helper", 0, "interface {value=eth-ext}\ninterface {value=ble-ext}"),
        ]);
        runner.respond("a_helper", protocol::ARG_LIST_DLTS, 0, "dlt {number=1}{name=EN10MB}");
        runner.respond("b_helper", protocol::ARG_LIST_DLTS, 0, "dlt {number=147}{name=USER0}");
        let runner = Arc::new(runner);
        let pipes = tempfile::tempdir().unwrap();

        let host = ExtcapHost::new(helpers.path(), Arc::new(FileChannelFactory::new(pipes.path())))
            .with_runner(runner.clone())
            .with_launcher(Arc::new(RecordingLauncher::default()));
        (helpers, pipes, runner, host)
    }

    #[test]
    fn test_discover_then_query_owner() {
        let (_helpers, _pipes, runner, host) = scripted_host();
        let report = host.discover();
        assert_eq!(report.interfaces.len(), 3);
        assert_eq!(host.interface_count(), 3);
        assert_eq!(host.owner_of("eth-ext"), Some(runner.path_of("a_helper")));
        assert_eq!(host.owner_of("ble-ext"), Some(runner.path_of("b_helper")));

        let before = runner.calls_to("b_helper");
        let caps = host.link_types("eth-ext").unwrap();
        assert_eq!(caps.link_types[0].name, "EN10MB");
        assert_eq!(runner.calls_to("b_helper"), before);
    }

    #[test]
    fn test_monitor_mode_degrades_to_false() {
        let (_helpers, _pipes, _runner, host) = scripted_host();
        host.discover();
        assert!(!host.has_monitor_mode("eth-ext"));
        assert!(!host.has_monitor_mode("not-registered"));
        // No configuration answer scripted
        assert!(host.configuration("usb-ext").is_err());
    }

    #[test]
    fn test_session_requires_registered_owner() {
        let (_helpers, _pipes, runner, host) = scripted_host();
        host.discover();

        let unknown = Session::new().with_interface(InterfaceOptions::helper("nope", "/x"));
        assert!(matches!(
            host.prepare_session(unknown),
            Err(ExtcapError::UnknownInterface(_))
        ));

        let wrong_owner = Session::new()
            .with_interface(InterfaceOptions::helper("eth-ext", runner.path_of("b_helper")));
        assert!(matches!(
            host.prepare_session(wrong_owner),
            Err(ExtcapError::OwnershipConflict { .. })
        ));
    }

    #[test]
    fn test_start_and_stop_session() {
        let (_helpers, pipes, _runner, host) = scripted_host();
        host.discover();

        let session = Session::new()
            .with_interface(InterfaceOptions::native("eth0"))
            .with_interface(host.helper_options("usb-ext").unwrap());
        let mut manager = host.start_session(session).unwrap();
        assert_eq!(manager.state(1), Some(EntryState::Running));
        assert_eq!(std::fs::read_dir(pipes.path()).unwrap().count(), 1);

        manager.stop().unwrap();
        assert_eq!(std::fs::read_dir(pipes.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_start_cleans_up() {
        let (_helpers, pipes, _runner, host) = scripted_host();
        let host = host.with_pipes(Arc::new(FileChannelFactory::failing_after(pipes.path(), 1)));
        host.discover();

        let session = Session::new()
            .with_interface(host.helper_options("usb-ext").unwrap())
            .with_interface(host.helper_options("ble-ext").unwrap());
        assert!(host.start_session(session).is_err());
        assert_eq!(std::fs::read_dir(pipes.path()).unwrap().count(), 0);
    }

    /// Real helpers that append to a counter file on every invocation
    #[cfg(unix)]
    #[test]
    fn test_real_helpers_route_to_first_owner() {
        use crate::testing::write_helper;

        let helpers = tempfile::tempdir().unwrap();
        let counters = tempfile::tempdir().unwrap();
        let pipes = tempfile::tempdir().unwrap();

        let script = |counter: &Path, interfaces: &str| {
            format!(
                "#!/bin/sh\n\
                 echo \"$1\" >> '{}'\n\
                 case \"$1\" in\n\
                 --extcap-interfaces) printf '{}' ;;\n\
                 --extcap-dlts) echo 'dlt {{number=1}}{{name=EN10MB}}{{display=Ethernet}}' ;;\n\
                 *) exit 1 ;;\n\
                 esac\n",
                counter.display(),
                interfaces
            )
        };
        let count_a = counters.path().join("a.calls");
        let count_b = counters.path().join("b.calls");
        write_helper(
            helpers.path(),
            "a_helper",
            &script(&count_a, "interface {value=eth-ext}\\ninterface {value=usb-ext}\\n"),
        );
        write_helper(
            helpers.path(),
            "b_helper",
            &script(&count_b, "interface {value=eth-ext}\\ninterface {value=ble-ext}\\n"),
        );

        let host = ExtcapHost::new(helpers.path(), Arc::new(FileChannelFactory::new(pipes.path())));
        let report = host.discover();
        let calls: Vec<_> = report.interfaces.iter().map(|r| r.call.as_str()).collect();
        assert_eq!(calls, vec!["eth-ext", "usb-ext", "ble-ext"]);

        let caps = host.link_types("eth-ext").unwrap();
        assert_eq!(caps.link_types[0].dlt, 1);

        let lines = |p: &Path| std::fs::read_to_string(p).unwrap().lines().count();
        assert_eq!(lines(&count_a), 2);
        assert_eq!(lines(&count_b), 1);
    }
}
