//! Network probes for exposcan
//!
//! This crate provides the two network-facing probe categories:
//! - Service discovery: nmap when available, otherwise a bounded TCP
//!   connect scan, with banner grabbing and OS fingerprinting
//! - TLS/SSL analysis: protocol versions, certificate chain, cipher
//!   suites and HSTS
//!
//! [`registry::default_orchestrator`] wires both into an
//! [`Orchestrator`](exposcan_core::Orchestrator).

pub mod banner_grabbing;
pub mod common;
pub mod exposure;
pub mod native;
pub mod os_fingerprinting;
pub mod registry;
pub mod service_detection;
pub mod tcp;
pub mod tls;

// Re-export commonly used types
pub use banner_grabbing::{BannerGrabber, BannerOptions};
pub use common::{ProbeError, ProbeResult};
pub use exposure::ServiceDiscoveryProbe;
pub use native::{NativePort, NativeScanner};
pub use registry::{default_orchestrator, register_default_probes, ServiceDiscoveryFactory, TlsFactory};
pub use tcp::{TcpScanOptions, TcpScanner};
pub use tls::handshake::TlsVersion;
pub use tls::TlsProbe;

#[cfg(test)]
mod tests {
    use super::*;
    use exposcan_core::{Category, Config};

    #[test]
    fn test_registry_covers_network_categories() {
        let orchestrator = default_orchestrator(Config::default());
        assert!(orchestrator.has_probe(Category::InternetExposure));
        assert!(orchestrator.has_probe(Category::TlsSecurity));
    }

    #[test]
    fn test_weak_suites_are_weak() {
        for suite in tls::handshake::WEAK_SUITES {
            let name = tls::handshake::cipher_suite_name(*suite);
            assert!(tls::handshake::is_weak_cipher(&name), "{} should be weak", name);
        }
    }
}
