//! Per-interface capability queries
//!
//! A query is only ever sent to the helper the registry records as owner of
//! the interface. Names the registry does not know never reach a process.

use crate::runner::{probe_helper, HelperRunner};
use extcap_core::protocol;
use extcap_core::{
    CaptureCapabilities, ConfigurationArgument, ExtcapError, ExtcapResult, InterfaceRegistry,
    SentenceParser,
};
use std::path::Path;
use tracing::{debug, warn};

/// Routes link-type and configuration queries to owning helpers
pub struct CapabilityQuery<'a> {
    runner: &'a dyn HelperRunner,
    parser: &'a dyn SentenceParser,
}

impl<'a> CapabilityQuery<'a> {
    pub fn new(runner: &'a dyn HelperRunner, parser: &'a dyn SentenceParser) -> Self {
        Self { runner, parser }
    }

    /// Link-layer types of `interface`.
    ///
    /// Monitor mode is never reported as available.
    pub fn list_link_types(
        &self,
        registry: &InterfaceRegistry,
        interface: &str,
    ) -> ExtcapResult<CaptureCapabilities> {
        let helper = owner(registry, interface)?;
        let output = probe_helper(self.runner, helper, &protocol::list_dlts_args(interface))?;
        let link_types = self.parser.parse_dlts(&output).map_err(|e| {
            warn!("Unparsable DLT list from {}: {}", helper.display(), e);
            e
        })?;

        if link_types.is_empty() {
            return Err(ExtcapError::NoData {
                interface: interface.to_string(),
                what: "DLTs",
            });
        }

        debug!("{} supports {} link types", interface, link_types.len());
        Ok(CaptureCapabilities {
            can_set_rfmon: false,
            link_types,
        })
    }

    /// Configuration arguments `interface` accepts
    pub fn get_configuration(
        &self,
        registry: &InterfaceRegistry,
        interface: &str,
    ) -> ExtcapResult<Vec<ConfigurationArgument>> {
        let helper = owner(registry, interface)?;
        let output = probe_helper(self.runner, helper, &protocol::get_config_args(interface))?;
        let arguments = self.parser.parse_arguments(&output).map_err(|e| {
            warn!("Unparsable configuration from {}: {}", helper.display(), e);
            e
        })?;

        if arguments.is_empty() {
            return Err(ExtcapError::NoData {
                interface: interface.to_string(),
                what: "configuration arguments",
            });
        }

        Ok(arguments)
    }
}

fn owner<'r>(registry: &'r InterfaceRegistry, interface: &str) -> ExtcapResult<&'r Path> {
    registry.lookup(interface).ok_or_else(|| {
        debug!("Refusing query for unregistered interface {}", interface);
        ExtcapError::UnknownInterface(interface.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryProber;
    use crate::testing::ScriptedRunner;
    use extcap_core::SentenceTokenizer;

    /// Two helpers both claiming `eth-ext`; `a_helper` scans first
    fn contested() -> (tempfile::TempDir, ScriptedRunner) {
        let (dir, mut runner) = ScriptedRunner::with_helpers(&[
            ("a_helper", 0, "interface {value=eth-ext}{display=Ethernet A}"),
            ("b_helper", 0, "interface {value=eth-ext}{display=Ethernet B}"),
        ]);
        for name in ["a_helper", "b_helper"] {
            runner.respond(
                name,
                protocol::ARG_LIST_DLTS,
                0,
                "dlt {number=147}{name=USER0}{display=Demo}",
            );
            runner.respond(
                name,
                protocol::ARG_CONFIG,
                0,
                "arg {number=0}{call=--delay}{display=Delay}{type=integer}",
            );
        }
        (dir, runner)
    }

    #[test]
    fn test_queries_route_to_first_owner_only() {
        let (dir, runner) = contested();
        let parser = SentenceTokenizer::new();
        let mut registry = InterfaceRegistry::new();
        DiscoveryProber::new(&runner, &parser).enumerate(dir.path(), &mut registry);
        let probes_b = runner.calls_to("b_helper");

        let query = CapabilityQuery::new(&runner, &parser);
        let caps = query.list_link_types(&registry, "eth-ext").unwrap();
        let config = query.get_configuration(&registry, "eth-ext").unwrap();

        assert!(!caps.can_set_rfmon);
        assert_eq!(caps.link_types[0].dlt, 147);
        assert_eq!(config[0].call, "--delay");
        assert_eq!(runner.calls_to("b_helper"), probes_b);
        assert_eq!(
            runner.last_args("a_helper").unwrap(),
            protocol::get_config_args("eth-ext")
        );
    }

    #[test]
    fn test_unknown_interface_runs_nothing() {
        let runner = ScriptedRunner::default();
        let parser = SentenceTokenizer::new();
        let registry = InterfaceRegistry::new();
        let query = CapabilityQuery::new(&runner, &parser);

        let err = query.list_link_types(&registry, "nope").unwrap_err();
        assert!(matches!(err, ExtcapError::UnknownInterface(_)));
        assert!(query.get_configuration(&registry, "nope").is_err());
        assert_eq!(runner.total_calls(), 0);
    }

    #[test]
    fn test_empty_answer_is_no_data() {
        let (dir, mut runner) =
            ScriptedRunner::with_helpers(&[("a_helper", 0, "interface {value=usb-ext}")]);
        runner.respond("a_helper", protocol::ARG_LIST_DLTS, 0, "");
        runner.respond("a_helper", protocol::ARG_CONFIG, 0, "\n");
        let parser = SentenceTokenizer::new();
        let mut registry = InterfaceRegistry::new();
        DiscoveryProber::new(&runner, &parser).enumerate(dir.path(), &mut registry);

        let query = CapabilityQuery::new(&runner, &parser);
        let err = query.list_link_types(&registry, "usb-ext").unwrap_err();
        assert!(matches!(err, ExtcapError::NoData { what: "DLTs", .. }));
        let err = query.get_configuration(&registry, "usb-ext").unwrap_err();
        assert!(matches!(err, ExtcapError::NoData { .. }));
    }

    #[test]
    fn test_failing_or_garbled_helper_is_reported() {
        let (dir, mut runner) =
            ScriptedRunner::with_helpers(&[("a_helper", 0, "interface {value=usb-ext}")]);
        runner.respond("a_helper", protocol::ARG_LIST_DLTS, 3, "");
        runner.respond("a_helper", protocol::ARG_CONFIG, 0, "arg {number=0");
        let parser = SentenceTokenizer::new();
        let mut registry = InterfaceRegistry::new();
        DiscoveryProber::new(&runner, &parser).enumerate(dir.path(), &mut registry);

        let query = CapabilityQuery::new(&runner, &parser);
        let err = query.list_link_types(&registry, "usb-ext").unwrap_err();
        assert!(matches!(err, ExtcapError::ProbeFailed { .. }));
        let err = query.get_configuration(&registry, "usb-ext").unwrap_err();
        assert!(matches!(err, ExtcapError::Parse { .. }));
    }
}
