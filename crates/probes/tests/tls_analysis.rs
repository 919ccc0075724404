//! TLS probe against a loopback rustls server

use exposcan_core::results::TlsPayload;
use exposcan_core::{finding_types, Config, Payload, ProbeResult, ScanMode, Scanner, Severity};
use exposcan_probes::TlsProbe;
use tokio_test::assert_ok;

use chrono::{Datelike, Duration as ChronoDuration, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls::pki_types::PrivatePkcs8KeyDer;
use rustls::ServerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

fn certificate_params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::new(vec!["exposcan.test".to_string()]).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params
}

fn server_config(params: CertificateParams) -> Arc<ServerConfig> {
    let key_pair = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key_pair).unwrap();
    let key = PrivatePkcs8KeyDer::from(key_pair.serialize_der());

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key.into())
        .unwrap();
    Arc::new(config)
}

/// TLS 1.2/1.3 listener presenting a self-signed certificate
async fn tls_server(params: CertificateParams) -> u16 {
    let acceptor = TlsAcceptor::from(server_config(params));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(mut tls) = acceptor.accept(socket).await {
                    let _ = tls.shutdown().await;
                }
            });
        }
    });
    port
}

fn tls_config(port: u16) -> Config {
    let mut config = Config::default();
    config.tls.ports = vec![port];
    config.tls.quick_ports = vec![port];
    config.timing.connect_timeout = Duration::from_secs(1);
    config.timing.handshake_timeout = Duration::from_secs(2);
    config
}

fn tls_payload(result: &ProbeResult) -> &TlsPayload {
    match result.payload.as_ref() {
        Some(Payload::Tls(payload)) => payload,
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_modern_server_is_clean() {
    let port = tls_server(certificate_params("exposcan.test")).await;

    let probe = assert_ok!(TlsProbe::new("127.0.0.1", ScanMode::Full, Arc::new(tls_config(port))));
    let result = probe.scan().await;

    assert!(result.is_completed(), "note: {:?}", result.note);
    assert!(result.findings.is_empty(), "findings: {:?}", result.findings);

    let payload = tls_payload(&result);
    assert_eq!(payload.services.len(), 1);
    assert_eq!(payload.services[0].port, port);
    assert_eq!(payload.services[0].protocol, "TLS");
    assert_eq!(payload.tls_versions, vec!["TLSv1.2", "TLSv1.3"]);

    let cert = payload.certificate.as_ref().expect("leaf certificate");
    assert!(cert.subject.contains("CN=exposcan.test"), "subject: {}", cert.subject);
    assert_eq!(cert.subject, cert.issuer);
    assert_eq!(cert.key_size_bits, 256);
    assert_eq!(cert.signature_algorithm, "ecdsa-with-SHA256");
    assert!(cert.days_until_expiry > 365);
    assert!(!cert.serial_number.is_empty());

    assert_eq!(payload.certificate_chain.len(), 1);
    assert_eq!(payload.certificate_chain[0].subject, cert.subject);

    assert_eq!(payload.cipher_suites.len(), 1);
    let cipher = &payload.cipher_suites[0];
    assert!(cipher.name.starts_with("TLS13_"), "cipher: {}", cipher.name);
    assert_eq!(cipher.version, "TLSv1.3");
    assert!(cipher.bits >= 128);

    // Port is outside the HSTS list, so no header check was made
    assert!(!payload.hsts_enabled);
}

#[tokio::test]
async fn test_expiring_certificate_is_reported() {
    let soon = Utc::now() + ChronoDuration::days(10);
    let mut params = certificate_params("expiring.exposcan.test");
    params.not_after = rcgen::date_time_ymd(soon.year(), soon.month() as u8, soon.day() as u8);
    let port = tls_server(params).await;

    let probe = assert_ok!(TlsProbe::new("127.0.0.1", ScanMode::Quick, Arc::new(tls_config(port))));
    let result = probe.scan().await;

    assert!(result.is_completed(), "note: {:?}", result.note);
    let payload = tls_payload(&result);
    let days = payload.certificate.as_ref().map(|c| c.days_until_expiry).unwrap_or_default();
    assert!((8..=10).contains(&days), "days until expiry: {}", days);
    // Quick mode skips cipher inspection
    assert!(payload.cipher_suites.is_empty());

    assert_eq!(result.findings.len(), 1);
    let finding = &result.findings[0];
    assert_eq!(finding.finding_type, finding_types::CERTIFICATE_EXPIRY);
    assert_eq!(finding.severity, Severity::Medium);
    assert_eq!(finding.description, format!("Certificate expires in {} days", days));
}
