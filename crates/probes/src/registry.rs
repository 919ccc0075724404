//! Default probe factories

use crate::exposure::ServiceDiscoveryProbe;
use crate::tls::TlsProbe;

use exposcan_core::{Category, Config, Orchestrator, ProbeFactory, Result, ScanMode, Scanner, Target};
use std::sync::Arc;

/// Builds [`ServiceDiscoveryProbe`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceDiscoveryFactory;

impl ProbeFactory for ServiceDiscoveryFactory {
    fn category(&self) -> Category {
        Category::InternetExposure
    }

    fn build(&self, target: &Target, mode: ScanMode, config: Arc<Config>) -> Result<Box<dyn Scanner>> {
        Ok(Box::new(ServiceDiscoveryProbe::from_target(target.clone(), mode, config)))
    }
}

/// Builds [`TlsProbe`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct TlsFactory;

impl ProbeFactory for TlsFactory {
    fn category(&self) -> Category {
        Category::TlsSecurity
    }

    fn build(&self, target: &Target, mode: ScanMode, config: Arc<Config>) -> Result<Box<dyn Scanner>> {
        Ok(Box::new(TlsProbe::from_target(target.clone(), mode, config)))
    }
}

/// Register every probe this crate implements
pub fn register_default_probes(orchestrator: &mut Orchestrator) {
    orchestrator.register(Arc::new(ServiceDiscoveryFactory));
    orchestrator.register(Arc::new(TlsFactory));
}

/// Orchestrator with the default probes. Categories without a probe are
/// still scheduled and report as not possible.
pub fn default_orchestrator(config: Config) -> Orchestrator {
    let mut orchestrator = Orchestrator::new(config);
    register_default_probes(&mut orchestrator);
    orchestrator
}
