//! TLS/SSL analysis
//!
//! The probe walks the configured TLS ports, keeps the ones that complete a
//! handshake, and then reports:
//!
//! - protocol versions each port accepts, probed with one pinned
//!   ClientHello per version
//! - the leaf certificate and served chain from the first TLS-capable port
//! - the negotiated cipher, plus any weak suite the server still accepts
//!   (full mode only)
//! - the Strict-Transport-Security header on web-facing ports
//!
//! Only "no TLS port at all" fails the probe. Every other step degrades to
//! an absent field.

pub mod certificate;
pub mod handshake;
pub mod hsts;
pub mod session;

use crate::common::{resolve_target, tcp_connect};
use certificate::{ParsedCertificate, EXPIRY_WARNING_DAYS};
use handshake::TlsVersion;
use session::SessionInfo;

use exposcan_core::results::{CipherSuite, TlsPayload, TlsService};
use exposcan_core::{
    finding_types, Category, Config, Finding, Payload, Result, ScanBase, ScanFailure, ScanMode, ScanOutcome,
    ScanTimer, Scanner, Severity, Target,
};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, info};

const OPERATION: &str = "TLS/SSL analysis";
const SERVICE: &str = "TLS/SSL services";

/// Label for a well-known TLS port
pub fn port_protocol(port: u16) -> &'static str {
    match port {
        443 => "HTTPS",
        993 => "IMAPS",
        995 => "POP3S",
        465 => "SMTPS",
        587 => "SMTP with STARTTLS",
        636 => "LDAPS",
        989 => "FTPS Data",
        990 => "FTPS Control",
        8443 => "HTTPS",
        _ => "TLS",
    }
}

/// A port that completed at least one handshake
#[derive(Debug, Clone)]
struct TlsPort {
    port: u16,
    versions: Vec<TlsVersion>,
    session: Option<SessionInfo>,
}

/// Certificate data from whichever handshake produced it
#[derive(Debug, Default)]
struct Presented {
    chain: Vec<Vec<u8>>,
    cipher: Option<CipherSuite>,
}

pub struct TlsProbe {
    base: ScanBase,
}

impl TlsProbe {
    pub fn new(target: &str, mode: ScanMode, config: Arc<Config>) -> Result<Self> {
        Ok(Self {
            base: ScanBase::new(Category::TlsSecurity, target, mode, config)?,
        })
    }

    pub fn from_target(target: Target, mode: ScanMode, config: Arc<Config>) -> Self {
        Self {
            base: ScanBase::from_target(Category::TlsSecurity, target, mode, config),
        }
    }

    fn candidate_versions(&self) -> Vec<TlsVersion> {
        TlsVersion::ALL
            .iter()
            .copied()
            .filter(|v| *v != TlsVersion::Ssl3 || self.base.config().tls.probe_sslv3)
            .collect()
    }

    fn server_name(&self) -> Option<String> {
        let target = self.base.target();
        target.is_domain().then(|| target.host())
    }

    /// Versions accepted on a port; every version is tried on its own
    /// connection
    async fn accepted_versions(&self, ip: IpAddr, port: u16) -> Vec<TlsVersion> {
        let limit = self.base.config().timing.handshake_timeout;
        let sni = self.server_name();
        let candidates = self.candidate_versions();
        let probes = candidates
            .iter()
            .map(|version| handshake::probe_version(ip, port, *version, sni.as_deref(), limit));
        let accepted = join_all(probes).await;

        candidates
            .into_iter()
            .zip(accepted)
            .filter_map(|(version, ok)| ok.then_some(version))
            .collect()
    }

    async fn examine_port(&self, ip: IpAddr, port: u16) -> Option<TlsPort> {
        let timing = &self.base.config().timing;
        if let Err(e) = tcp_connect(SocketAddr::new(ip, port), timing.connect_timeout).await {
            debug!(port, "TLS port unreachable: {}", e);
            return None;
        }

        let versions = self.accepted_versions(ip, port).await;
        let session = if versions.is_empty() {
            // Servers that reject crafted hellos may still finish a real handshake
            session::establish(ip, port, &self.base.target().host(), timing.handshake_timeout)
                .await
                .ok()
        } else {
            None
        };

        if versions.is_empty() && session.is_none() {
            debug!(port, "No TLS handshake completed");
            return None;
        }

        let versions = if versions.is_empty() {
            session
                .as_ref()
                .and_then(|s| s.protocol.as_deref())
                .and_then(|label| TlsVersion::ALL.iter().copied().find(|v| v.label() == label))
                .into_iter()
                .collect()
        } else {
            versions
        };

        info!(port, versions = ?versions, "TLS service found");
        Some(TlsPort { port, versions, session })
    }

    async fn discover(&self, ip: IpAddr) -> Vec<TlsPort> {
        let ports = self.base.config().tls.ports_for_mode(self.base.mode()).to_vec();
        let mut found = Vec::new();
        for port in ports {
            if let Some(tls_port) = self.examine_port(ip, port).await {
                found.push(tls_port);
                if self.base.quick_mode() {
                    break;
                }
            }
        }
        found
    }

    /// Chain and cipher from a full handshake, falling back to the raw
    /// legacy certificate flight
    async fn presented(&self, ip: IpAddr, tls_port: &TlsPort) -> Presented {
        let limit = self.base.config().timing.handshake_timeout;
        let session = match &tls_port.session {
            Some(session) => Some(session.clone()),
            None => session::establish(ip, tls_port.port, &self.base.target().host(), limit)
                .await
                .map_err(|e| debug!(port = tls_port.port, "TLS session failed: {}", e))
                .ok(),
        };

        if let Some(session) = session.filter(|s| !s.certificates.is_empty()) {
            let cipher = session.cipher_suite.as_ref().map(|name| CipherSuite {
                bits: handshake::cipher_bits(name),
                name: name.clone(),
                version: session.protocol.clone().unwrap_or_default(),
            });
            return Presented {
                chain: session.certificates,
                cipher,
            };
        }

        let legacy = tls_port
            .versions
            .iter()
            .rev()
            .find(|v| **v <= TlsVersion::Tls12)
            .copied();
        let version = match legacy {
            Some(version) => version,
            None => return Presented::default(),
        };

        let sni = self.server_name();
        match handshake::legacy_certificate_flight(ip, tls_port.port, version, sni.as_deref(), limit).await {
            Ok((hello, chain)) => {
                let name = handshake::cipher_suite_name(hello.cipher_suite);
                let version_label = TlsVersion::from_wire(hello.version).unwrap_or(version);
                Presented {
                    chain,
                    cipher: Some(CipherSuite {
                        bits: handshake::cipher_bits(&name),
                        name,
                        version: version_label.label().to_string(),
                    }),
                }
            }
            Err(e) => {
                debug!(port = tls_port.port, "Legacy certificate flight failed: {}", e);
                Presented::default()
            }
        }
    }

    /// Weak suite still accepted under the newest legacy version, if any
    async fn accepted_weak_suite(&self, ip: IpAddr, tls_port: &TlsPort) -> Option<CipherSuite> {
        let version = tls_port.versions.iter().rev().find(|v| **v <= TlsVersion::Tls12).copied()?;
        let sni = self.server_name();
        let limit = self.base.config().timing.handshake_timeout;
        let hello = handshake::probe_weak_suite(ip, tls_port.port, version, sni.as_deref(), limit).await?;
        let name = handshake::cipher_suite_name(hello.cipher_suite);
        Some(CipherSuite {
            bits: handshake::cipher_bits(&name),
            name,
            version: version.label().to_string(),
        })
    }
}

fn version_findings(versions: &BTreeSet<TlsVersion>) -> Vec<Finding> {
    versions
        .iter()
        .filter(|v| v.is_deprecated())
        .map(|v| {
            let severity = if v.is_removed() { Severity::High } else { Severity::Medium };
            Finding::new(
                finding_types::WEAK_TLS_VERSION,
                severity,
                format!("{} is deprecated and vulnerable to attacks", v),
            )
            .with_recommendation(format!("Disable {} and require TLS 1.2 or later", v))
        })
        .collect()
}

fn certificate_findings(parsed: &ParsedCertificate) -> Vec<Finding> {
    let mut findings = Vec::new();
    let days = parsed.record.days_until_expiry;
    if days < EXPIRY_WARNING_DAYS {
        let severity = if days < 0 { Severity::High } else { Severity::Medium };
        findings.push(
            Finding::new(
                finding_types::CERTIFICATE_EXPIRY,
                severity,
                format!("Certificate expires in {} days", days),
            )
            .with_recommendation("Renew the TLS certificate"),
        );
    }
    if parsed.weak_key() {
        findings.push(
            Finding::new(
                finding_types::WEAK_KEY_SIZE,
                Severity::Medium,
                format!("Certificate uses weak key size: {} bits", parsed.record.key_size_bits),
            )
            .with_recommendation("Reissue the certificate with at least a 2048-bit RSA or 256-bit EC key"),
        );
    }
    findings
}

fn weak_cipher_finding(cipher: &CipherSuite) -> Finding {
    Finding::new(
        finding_types::WEAK_CIPHER,
        Severity::Medium,
        format!("Weak cipher suite supported: {}", cipher.name),
    )
    .with_recommendation("Disable RC4, DES, 3DES and MD5 based cipher suites")
}

#[async_trait]
impl Scanner for TlsProbe {
    fn base(&self) -> &ScanBase {
        &self.base
    }

    async fn execute(&self, timer: &ScanTimer) -> ScanOutcome {
        let config = self.base.config();
        let ip = resolve_target(self.base.target(), config.timing.connect_timeout)
            .await
            .map_err(|e| ScanFailure::network(OPERATION, e))?;

        let tls_ports = self.discover(ip).await;
        let first = tls_ports.first().ok_or_else(|| ScanFailure::service_not_found(SERVICE))?;

        let mut payload = TlsPayload {
            services: tls_ports
                .iter()
                .map(|p| TlsService {
                    port: p.port,
                    protocol: port_protocol(p.port).to_string(),
                })
                .collect(),
            ..Default::default()
        };
        let mut findings = Vec::new();

        let versions: BTreeSet<TlsVersion> = tls_ports.iter().flat_map(|p| p.versions.iter().copied()).collect();
        payload.tls_versions = versions.iter().map(|v| v.label().to_string()).collect();
        findings.extend(version_findings(&versions));

        let presented = self.presented(ip, first).await;
        if let Some(leaf) = presented.chain.first() {
            match certificate::parse_leaf(leaf, Utc::now()) {
                Some(parsed) => {
                    findings.extend(certificate_findings(&parsed));
                    payload.certificate = Some(parsed.record);
                }
                None => debug!(port = first.port, "Leaf certificate could not be parsed"),
            }
            payload.certificate_chain = certificate::chain_links(&presented.chain);
        }

        if !self.base.quick_mode() {
            if let Some(cipher) = presented.cipher {
                if handshake::is_weak_cipher(&cipher.name) {
                    findings.push(weak_cipher_finding(&cipher));
                }
                payload.cipher_suites.push(cipher);
            }
            if let Some(weak) = self.accepted_weak_suite(ip, first).await {
                if !payload.cipher_suites.iter().any(|c| c.name == weak.name) {
                    findings.push(weak_cipher_finding(&weak));
                    payload.cipher_suites.push(weak);
                }
            }
        }

        let hsts_port = tls_ports
            .iter()
            .map(|p| p.port)
            .find(|port| config.tls.hsts_ports.contains(port));
        if let Some(port) = hsts_port {
            match hsts::check_hsts(self.base.target(), port, config.timing.http_timeout).await {
                Ok(status) => {
                    payload.hsts_enabled = status.enabled;
                    payload.hsts_max_age = status.max_age;
                    if !status.enabled {
                        findings.push(
                            Finding::new(finding_types::MISSING_HSTS, Severity::Low, "HSTS header not configured")
                                .with_recommendation("Enable HTTP Strict Transport Security"),
                        );
                    }
                }
                Err(e) => debug!(port, "HSTS check failed: {}", e),
            }
        }

        info!(
            ports = payload.services.len(),
            versions = ?payload.tls_versions,
            findings = findings.len(),
            "TLS analysis finished"
        );
        Ok(self.base.completed(timer, Payload::Tls(payload), findings))
    }
}
