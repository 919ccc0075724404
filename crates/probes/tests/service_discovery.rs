//! Service discovery and TLS probes against loopback listeners

use exposcan_core::results::ExposurePayload;
use exposcan_core::{Config, NativeToolPolicy, Payload, ScanMethod, ScanMode, Scanner};
use exposcan_probes::{ServiceDiscoveryProbe, TlsProbe};
use tokio_test::assert_ok;

use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Listener that greets every connection with `greeting`
async fn greeting_server(greeting: &'static [u8]) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = socket.write_all(greeting).await;
                tokio::time::sleep(Duration::from_millis(500)).await;
            });
        }
    });
    port
}

fn loopback_config(ports: Vec<u16>) -> Config {
    let mut config = Config::default();
    config.scan.native_tool = NativeToolPolicy::Disabled;
    config.scan.custom_ports = ports.clone();
    config.scan.common_ports = ports;
    config.timing.connect_timeout = Duration::from_secs(1);
    config.timing.banner_timeout = Duration::from_millis(500);
    config.timing.handshake_timeout = Duration::from_secs(1);
    config
}

fn exposure(payload: Option<&Payload>) -> &ExposurePayload {
    match payload {
        Some(Payload::ServiceDiscovery(payload)) => payload,
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_socket_scan_finds_open_ports() {
    let ssh = greeting_server(b"SSH-2.0-OpenSSH_9.6\r\n").await;
    let closed = unused_port().await;

    let config = Arc::new(loopback_config(vec![ssh, closed]));
    let probe = assert_ok!(ServiceDiscoveryProbe::new("127.0.0.1", ScanMode::Custom, config));
    let result = probe.scan().await;

    assert!(result.is_completed(), "note: {:?}", result.note);
    let payload = exposure(result.payload.as_ref());
    assert_eq!(payload.scan_method, ScanMethod::SocketFallback);
    assert_eq!(payload.total_ports_scanned, 2);
    assert_eq!(payload.open_ports.len(), 1);

    let open = &payload.open_ports[0];
    assert_eq!(open.port, ssh);
    assert_eq!(open.state, "open");
    assert_eq!(open.banner.as_deref(), Some("SSH-2.0-OpenSSH_9.6"));
    assert_eq!(open.product.as_deref(), Some("OpenSSH"));
    assert_eq!(open.version.as_deref(), Some("9.6"));
    assert!(payload.os_fingerprint.is_none());
}

#[tokio::test]
async fn test_quick_scan_skips_banners() {
    let port = greeting_server(b"220 mail.example.com ESMTP\r\n").await;

    let config = Arc::new(loopback_config(vec![port]));
    let probe = assert_ok!(ServiceDiscoveryProbe::new("127.0.0.1", ScanMode::Quick, config));
    let result = probe.scan().await;

    let payload = exposure(result.payload.as_ref());
    assert_eq!(payload.open_ports.len(), 1);
    assert!(payload.open_ports[0].banner.is_none());
}

#[tokio::test]
async fn test_no_open_ports_still_completes() {
    let closed = unused_port().await;
    let config = Arc::new(loopback_config(vec![closed]));
    let probe = assert_ok!(ServiceDiscoveryProbe::new("127.0.0.1", ScanMode::Custom, config));
    let result = probe.scan().await;

    assert!(result.is_completed());
    assert!(exposure(result.payload.as_ref()).open_ports.is_empty());
}

#[tokio::test]
async fn test_tls_probe_without_tls_port_is_not_possible() {
    let closed = unused_port().await;
    let mut config = loopback_config(vec![closed]);
    config.tls.ports = vec![closed];
    config.tls.quick_ports = vec![closed];

    let probe = assert_ok!(TlsProbe::new("127.0.0.1", ScanMode::Full, Arc::new(config)));
    let result = probe.scan().await;

    assert!(result.is_failed());
    assert_eq!(
        result.note.as_deref(),
        Some("Scanning not possible; TLS/SSL services not detected or available")
    );
    assert!(result.payload.is_none());
}

#[tokio::test]
async fn test_tls_probe_ignores_plaintext_service() {
    let port = greeting_server(b"220 ftp.example.com FTP ready\r\n").await;
    let mut config = loopback_config(vec![port]);
    config.tls.quick_ports = vec![port];

    let probe = assert_ok!(TlsProbe::new("127.0.0.1", ScanMode::Quick, Arc::new(config)));
    let result = probe.scan().await;

    assert!(result.is_failed());
}
