//! Full TLS sessions through rustls
//!
//! Certificate validation is switched off: the point is to read what the
//! server presents, including expired or self-signed chains.

use crate::common::{tcp_connect, ProbeError, ProbeResult};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::trace;

/// Accepts every certificate while still checking handshake signatures
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// What an established session revealed
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// DER chain, leaf first
    pub certificates: Vec<Vec<u8>>,
    /// Suite name as rustls reports it, e.g. `TLS13_AES_256_GCM_SHA384`
    pub cipher_suite: Option<String>,
    /// Protocol label, e.g. `TLSv1.3`
    pub protocol: Option<String>,
}

fn client_config() -> ProbeResult<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
        .map_err(|e| ProbeError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    Ok(config)
}

fn protocol_label(version: rustls::ProtocolVersion) -> String {
    match version {
        rustls::ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        rustls::ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        other => format!("{:?}", other),
    }
}

/// Complete a handshake and report the chain and negotiated parameters
pub async fn establish(ip: IpAddr, port: u16, server_name: &str, limit: Duration) -> ProbeResult<SessionInfo> {
    let connector = TlsConnector::from(Arc::new(client_config()?));
    let name = ServerName::try_from(server_name.to_string())
        .map_err(|e| ProbeError::Tls(format!("invalid server name {}: {}", server_name, e)))?;

    let stream = tcp_connect(SocketAddr::new(ip, port), limit).await?;
    let tls = match timeout(limit, connector.connect(name, stream)).await {
        Ok(Ok(tls)) => tls,
        Ok(Err(e)) => {
            trace!(port, "TLS session failed: {}", e);
            return Err(ProbeError::Tls(e.to_string()));
        }
        Err(_) => return Err(ProbeError::Timeout),
    };

    let (_, connection) = tls.get_ref();
    let certificates = connection
        .peer_certificates()
        .map(|chain| chain.iter().map(|c| c.as_ref().to_vec()).collect())
        .unwrap_or_default();
    let cipher_suite = connection
        .negotiated_cipher_suite()
        .map(|suite| format!("{:?}", suite.suite()));
    let protocol = connection.protocol_version().map(protocol_label);

    trace!(port, ?cipher_suite, ?protocol, "TLS session established");
    Ok(SessionInfo {
        certificates,
        cipher_suite,
        protocol,
    })
}
