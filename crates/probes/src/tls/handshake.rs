//! Raw TLS handshakes for version and cipher probing
//!
//! Each probe sends one crafted ClientHello pinned to a single protocol
//! version and reads the server's first flight. Nothing past the
//! ServerHello (or the certificate flight for TLS 1.2 and below) is ever
//! negotiated, so these probes work against servers that a modern TLS
//! library refuses to talk to.

use crate::common::{tcp_connect, ProbeError, ProbeResult};

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tracing::trace;

const CONTENT_HANDSHAKE: u8 = 0x16;
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;
const HANDSHAKE_SERVER_HELLO: u8 = 0x02;
const HANDSHAKE_CERTIFICATE: u8 = 0x0B;
const HANDSHAKE_SERVER_HELLO_DONE: u8 = 0x0E;

const EXT_SERVER_NAME: u16 = 0x0000;
const EXT_SUPPORTED_GROUPS: u16 = 0x000A;
const EXT_EC_POINT_FORMATS: u16 = 0x000B;
const EXT_SIGNATURE_ALGORITHMS: u16 = 0x000D;
const EXT_SUPPORTED_VERSIONS: u16 = 0x002B;
const EXT_KEY_SHARE: u16 = 0x0033;

const GROUP_X25519: u16 = 0x001D;

/// X25519 public key from RFC 7748 section 6.1; any valid point will do
/// since the handshake is abandoned after the ServerHello.
const X25519_PUBLIC: [u8; 32] = [
    0x85, 0x20, 0xf0, 0x09, 0x89, 0x30, 0xa7, 0x54, 0x74, 0x8b, 0x7d, 0xdc, 0xb4, 0x3e, 0xf7, 0x5a,
    0x0d, 0xbf, 0x3a, 0x0d, 0x26, 0x38, 0x1a, 0xf4, 0xeb, 0xa4, 0xa9, 0x8e, 0xaa, 0x9b, 0x4e, 0x6a,
];

/// Upper bound on bytes read from one server flight
const MAX_FLIGHT_BYTES: usize = 64 * 1024;

/// Protocol versions that can be probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TlsVersion {
    Ssl3,
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl TlsVersion {
    pub const ALL: [TlsVersion; 5] = [
        TlsVersion::Ssl3,
        TlsVersion::Tls10,
        TlsVersion::Tls11,
        TlsVersion::Tls12,
        TlsVersion::Tls13,
    ];

    /// Wire value used in hello messages
    pub fn wire(&self) -> u16 {
        match self {
            TlsVersion::Ssl3 => 0x0300,
            TlsVersion::Tls10 => 0x0301,
            TlsVersion::Tls11 => 0x0302,
            TlsVersion::Tls12 => 0x0303,
            TlsVersion::Tls13 => 0x0304,
        }
    }

    pub fn from_wire(value: u16) -> Option<Self> {
        TlsVersion::ALL.iter().copied().find(|v| v.wire() == value)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TlsVersion::Ssl3 => "SSLv3",
            TlsVersion::Tls10 => "TLSv1.0",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }

    /// Removed protocols rather than merely deprecated ones
    pub fn is_removed(&self) -> bool {
        matches!(self, TlsVersion::Ssl3)
    }

    pub fn is_deprecated(&self) -> bool {
        matches!(self, TlsVersion::Ssl3 | TlsVersion::Tls10 | TlsVersion::Tls11)
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Suites offered to servers speaking TLS 1.2 or below. Legacy suites are
/// included so that old servers still answer.
const LEGACY_SUITES: &[u16] = &[
    0xC02F, // TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256
    0xC030, // TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384
    0xC02B, // TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
    0xC02C, // TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384
    0xCCA8, // TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256
    0xC027, // TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256
    0xC013, // TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA
    0xC014, // TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA
    0xC009, // TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA
    0xC00A, // TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA
    0x009C, // TLS_RSA_WITH_AES_128_GCM_SHA256
    0x009D, // TLS_RSA_WITH_AES_256_GCM_SHA384
    0x002F, // TLS_RSA_WITH_AES_128_CBC_SHA
    0x0035, // TLS_RSA_WITH_AES_256_CBC_SHA
    0x0033, // TLS_DHE_RSA_WITH_AES_128_CBC_SHA
    0x0039, // TLS_DHE_RSA_WITH_AES_256_CBC_SHA
    0x000A, // TLS_RSA_WITH_3DES_EDE_CBC_SHA
];

const TLS13_SUITES: &[u16] = &[0x1301, 0x1302, 0x1303];

/// Suites considered weak; offered on their own to see if a server accepts any
pub const WEAK_SUITES: &[u16] = &[
    0x0004, 0x0005, 0xC011, 0xC007, 0x000A, 0xC012, 0x0016, 0x0009, 0x0003, 0x0008,
];

/// IANA name of a cipher suite, hex code when unknown
pub fn cipher_suite_name(suite: u16) -> String {
    let name = match suite {
        0x1301 => "TLS_AES_128_GCM_SHA256",
        0x1302 => "TLS_AES_256_GCM_SHA384",
        0x1303 => "TLS_CHACHA20_POLY1305_SHA256",
        0xC02F => "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        0xC030 => "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        0xC02B => "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
        0xC02C => "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
        0xCCA8 => "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
        0xC027 => "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256",
        0xC013 => "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
        0xC014 => "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
        0xC009 => "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA",
        0xC00A => "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA",
        0x009C => "TLS_RSA_WITH_AES_128_GCM_SHA256",
        0x009D => "TLS_RSA_WITH_AES_256_GCM_SHA384",
        0x002F => "TLS_RSA_WITH_AES_128_CBC_SHA",
        0x0035 => "TLS_RSA_WITH_AES_256_CBC_SHA",
        0x0033 => "TLS_DHE_RSA_WITH_AES_128_CBC_SHA",
        0x0039 => "TLS_DHE_RSA_WITH_AES_256_CBC_SHA",
        0x000A => "TLS_RSA_WITH_3DES_EDE_CBC_SHA",
        0xC012 => "TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA",
        0x0016 => "TLS_DHE_RSA_WITH_3DES_EDE_CBC_SHA",
        0x0009 => "TLS_RSA_WITH_DES_CBC_SHA",
        0x0004 => "TLS_RSA_WITH_RC4_128_MD5",
        0x0005 => "TLS_RSA_WITH_RC4_128_SHA",
        0xC011 => "TLS_ECDHE_RSA_WITH_RC4_128_SHA",
        0xC007 => "TLS_ECDHE_ECDSA_WITH_RC4_128_SHA",
        0x0003 => "TLS_RSA_EXPORT_WITH_RC4_40_MD5",
        0x0008 => "TLS_RSA_EXPORT_WITH_DES40_CBC_SHA",
        other => return format!("0x{:04X}", other),
    };
    name.to_string()
}

/// Symmetric key strength implied by a suite name
pub fn cipher_bits(name: &str) -> u16 {
    let upper = name.to_uppercase();
    if upper.contains("_40_") || upper.contains("DES40") {
        40
    } else if upper.contains("3DES") {
        112
    } else if upper.contains("DES_CBC") {
        56
    } else if upper.contains("AES_256") || upper.contains("CHACHA20") {
        256
    } else if upper.contains("AES_128") || upper.contains("RC4_128") {
        128
    } else {
        0
    }
}

/// Known-weak algorithm markers in a cipher name
pub fn is_weak_cipher(name: &str) -> bool {
    let upper = name.to_uppercase();
    ["RC4", "DES", "3DES", "MD5"].iter().any(|marker| upper.contains(marker))
}

/// What the server answered with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    /// Negotiated version, taking supported_versions into account
    pub version: u16,
    pub cipher_suite: u16,
}

/// Build a ClientHello offering exactly one protocol version
pub fn build_client_hello(version: TlsVersion, hostname: Option<&str>, suites: &[u16]) -> Vec<u8> {
    let tls13 = version == TlsVersion::Tls13;
    let legacy_version = if tls13 { 0x0303 } else { version.wire() };

    let mut body = Vec::with_capacity(512);
    body.extend_from_slice(&legacy_version.to_be_bytes());
    body.extend_from_slice(&client_random());

    // Session id: TLS 1.3 middlebox compatibility mode sends 32 bytes
    if tls13 {
        body.push(32);
        body.extend(std::iter::repeat(0xA5).take(32));
    } else {
        body.push(0);
    }

    let offered: &[u16] = if suites.is_empty() {
        if tls13 {
            TLS13_SUITES
        } else {
            LEGACY_SUITES
        }
    } else {
        suites
    };
    body.extend_from_slice(&((offered.len() * 2) as u16).to_be_bytes());
    for suite in offered {
        body.extend_from_slice(&suite.to_be_bytes());
    }

    // Compression: null only
    body.extend_from_slice(&[0x01, 0x00]);

    if version != TlsVersion::Ssl3 {
        let extensions = build_extensions(version, hostname);
        body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
        body.extend_from_slice(&extensions);
    }

    let mut handshake = Vec::with_capacity(body.len() + 4);
    handshake.push(HANDSHAKE_CLIENT_HELLO);
    push_u24(&mut handshake, body.len());
    handshake.extend_from_slice(&body);

    let record_version: u16 = if version == TlsVersion::Ssl3 { 0x0300 } else { 0x0301 };
    let mut record = Vec::with_capacity(handshake.len() + 5);
    record.push(CONTENT_HANDSHAKE);
    record.extend_from_slice(&record_version.to_be_bytes());
    record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
    record.extend_from_slice(&handshake);
    record
}

fn client_random() -> [u8; 32] {
    let mut random = [0u8; 32];
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    random[..4].copy_from_slice(&(ts.as_secs() as u32).to_be_bytes());
    let nanos = ts.subsec_nanos();
    for (i, byte) in random[4..].iter_mut().enumerate() {
        *byte = (nanos.rotate_left(i as u32) as u8).wrapping_mul(31).wrapping_add(i as u8);
    }
    random
}

/// Longest name sent as SNI; DNS names never exceed it
const MAX_SERVER_NAME_LEN: usize = 255;

/// SNI extension body; `None` for names longer than a DNS name can be
fn server_name_extension(host: &str) -> Option<Vec<u8>> {
    let host = host.as_bytes();
    if host.is_empty() || host.len() > MAX_SERVER_NAME_LEN {
        return None;
    }
    let name_len = u16::try_from(host.len()).ok()?;
    let list_len = name_len.checked_add(3)?;
    let mut data = Vec::with_capacity(host.len() + 5);
    data.extend_from_slice(&list_len.to_be_bytes());
    data.push(0x00);
    data.extend_from_slice(&name_len.to_be_bytes());
    data.extend_from_slice(host);
    Some(data)
}

fn build_extensions(version: TlsVersion, hostname: Option<&str>) -> Vec<u8> {
    let mut exts = Vec::new();

    if let Some(data) = hostname.and_then(server_name_extension) {
        append_extension(&mut exts, EXT_SERVER_NAME, &data);
    }

    let groups: &[u16] = &[GROUP_X25519, 0x0017, 0x0018];
    append_extension(&mut exts, EXT_SUPPORTED_GROUPS, &u16_list(groups));
    append_extension(&mut exts, EXT_EC_POINT_FORMATS, &[0x01, 0x00]);

    if version >= TlsVersion::Tls12 {
        let algorithms: &[u16] = &[0x0403, 0x0503, 0x0804, 0x0805, 0x0806, 0x0401, 0x0501, 0x0601, 0x0201];
        append_extension(&mut exts, EXT_SIGNATURE_ALGORITHMS, &u16_list(algorithms));
    }

    if version == TlsVersion::Tls13 {
        append_extension(&mut exts, EXT_SUPPORTED_VERSIONS, &[0x02, 0x03, 0x04]);

        let mut share = Vec::with_capacity(38);
        share.extend_from_slice(&((X25519_PUBLIC.len() + 4) as u16).to_be_bytes());
        share.extend_from_slice(&GROUP_X25519.to_be_bytes());
        share.extend_from_slice(&(X25519_PUBLIC.len() as u16).to_be_bytes());
        share.extend_from_slice(&X25519_PUBLIC);
        append_extension(&mut exts, EXT_KEY_SHARE, &share);
    }

    exts
}

fn u16_list(values: &[u16]) -> Vec<u8> {
    let mut data = Vec::with_capacity(values.len() * 2 + 2);
    data.extend_from_slice(&((values.len() * 2) as u16).to_be_bytes());
    for v in values {
        data.extend_from_slice(&v.to_be_bytes());
    }
    data
}

fn append_extension(buf: &mut Vec<u8>, ext_type: u16, data: &[u8]) {
    buf.extend_from_slice(&ext_type.to_be_bytes());
    buf.extend_from_slice(&(data.len() as u16).to_be_bytes());
    buf.extend_from_slice(data);
}

fn push_u24(buf: &mut Vec<u8>, value: usize) {
    buf.push((value >> 16) as u8);
    buf.push((value >> 8) as u8);
    buf.push(value as u8);
}

fn read_u24(data: &[u8]) -> usize {
    ((data[0] as usize) << 16) | ((data[1] as usize) << 8) | (data[2] as usize)
}

/// Concatenate the payloads of all handshake records; alerts and other
/// content types are skipped
pub fn collect_handshake_payloads(data: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    let mut pos = 0;
    while pos + 5 <= data.len() {
        let content_type = data[pos];
        let len = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
        let end = (pos + 5 + len).min(data.len());
        if content_type == CONTENT_HANDSHAKE {
            payload.extend_from_slice(&data[pos + 5..end]);
        }
        pos = end;
    }
    payload
}

/// Iterate complete handshake messages as `(type, body)`
fn handshake_messages(payload: &[u8]) -> Vec<(u8, &[u8])> {
    let mut messages = Vec::new();
    let mut pos = 0;
    while pos + 4 <= payload.len() {
        let len = read_u24(&payload[pos + 1..pos + 4]);
        if pos + 4 + len > payload.len() {
            break;
        }
        messages.push((payload[pos], &payload[pos + 4..pos + 4 + len]));
        pos += 4 + len;
    }
    messages
}

/// Parse the version and cipher out of a ServerHello body
pub fn parse_server_hello_body(body: &[u8]) -> Option<ServerHello> {
    // version(2) + random(32) + session id length(1)
    if body.len() < 35 {
        return None;
    }
    let mut version = u16::from_be_bytes([body[0], body[1]]);
    let pos = 35 + body[34] as usize;
    if body.len() < pos + 3 {
        return None;
    }
    let cipher_suite = u16::from_be_bytes([body[pos], body[pos + 1]]);

    let mut ext_pos = pos + 3;
    if body.len() >= ext_pos + 2 {
        let total = u16::from_be_bytes([body[ext_pos], body[ext_pos + 1]]) as usize;
        ext_pos += 2;
        let end = (ext_pos + total).min(body.len());
        while ext_pos + 4 <= end {
            let ext_type = u16::from_be_bytes([body[ext_pos], body[ext_pos + 1]]);
            let ext_len = u16::from_be_bytes([body[ext_pos + 2], body[ext_pos + 3]]) as usize;
            if ext_type == EXT_SUPPORTED_VERSIONS && ext_len == 2 && ext_pos + 6 <= end {
                version = u16::from_be_bytes([body[ext_pos + 4], body[ext_pos + 5]]);
            }
            ext_pos += 4 + ext_len;
        }
    }

    Some(ServerHello { version, cipher_suite })
}

/// First ServerHello in a server flight
pub fn parse_server_hello(flight: &[u8]) -> Option<ServerHello> {
    let payload = collect_handshake_payloads(flight);
    handshake_messages(&payload)
        .into_iter()
        .find(|(kind, _)| *kind == HANDSHAKE_SERVER_HELLO)
        .and_then(|(_, body)| parse_server_hello_body(body))
}

/// DER certificates from the Certificate message of a TLS 1.2-or-older flight
pub fn parse_certificate_flight(flight: &[u8]) -> Vec<Vec<u8>> {
    let payload = collect_handshake_payloads(flight);
    let body = match handshake_messages(&payload)
        .into_iter()
        .find(|(kind, _)| *kind == HANDSHAKE_CERTIFICATE)
    {
        Some((_, body)) => body,
        None => return Vec::new(),
    };

    if body.len() < 3 {
        return Vec::new();
    }
    let end = (3 + read_u24(body)).min(body.len());
    let mut pos = 3;
    let mut certs = Vec::new();
    while pos + 3 <= end {
        let len = read_u24(&body[pos..pos + 3]);
        pos += 3;
        let cert_end = (pos + len).min(end);
        if cert_end > pos {
            certs.push(body[pos..cert_end].to_vec());
        }
        pos = cert_end;
    }
    certs
}

fn flight_complete(flight: &[u8], until_done: bool) -> bool {
    let payload = collect_handshake_payloads(flight);
    let messages = handshake_messages(&payload);
    if until_done {
        messages.iter().any(|(kind, _)| *kind == HANDSHAKE_SERVER_HELLO_DONE)
    } else {
        messages.iter().any(|(kind, _)| *kind == HANDSHAKE_SERVER_HELLO)
    }
}

/// Send a hello and collect the response. Stops at the ServerHello, or at
/// ServerHelloDone when `until_done`, or when the server closes.
pub async fn exchange(addr: SocketAddr, hello: &[u8], limit: Duration, until_done: bool) -> ProbeResult<Vec<u8>> {
    let mut stream = tcp_connect(addr, limit).await?;
    match timeout(limit, stream.write_all(hello)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(ProbeError::from_io(&e)),
        Err(_) => return Err(ProbeError::Timeout),
    }

    let deadline = Instant::now() + limit;
    let mut flight = Vec::with_capacity(8192);
    let mut chunk = [0u8; 4096];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || flight.len() >= MAX_FLIGHT_BYTES {
            break;
        }
        match timeout(remaining, stream.read(&mut chunk)).await {
            Ok(Ok(n)) if n > 0 => {
                flight.extend_from_slice(&chunk[..n]);
                if flight_complete(&flight, until_done) {
                    break;
                }
            }
            _ => break,
        }
    }

    if flight.is_empty() {
        return Err(ProbeError::Tls("no handshake response".to_string()));
    }
    Ok(flight)
}

/// True when the server negotiates exactly `version`
pub async fn probe_version(
    ip: IpAddr,
    port: u16,
    version: TlsVersion,
    hostname: Option<&str>,
    limit: Duration,
) -> bool {
    let hello = build_client_hello(version, hostname, &[]);
    match exchange(SocketAddr::new(ip, port), &hello, limit, false).await {
        Ok(flight) => {
            let accepted = parse_server_hello(&flight).map_or(false, |sh| sh.version == version.wire());
            trace!(port, version = %version, accepted, "Version probe");
            accepted
        }
        Err(e) => {
            trace!(port, version = %version, "Version probe failed: {}", e);
            false
        }
    }
}

/// Certificate chain and chosen cipher from a TLS 1.2-or-older handshake
pub async fn legacy_certificate_flight(
    ip: IpAddr,
    port: u16,
    version: TlsVersion,
    hostname: Option<&str>,
    limit: Duration,
) -> ProbeResult<(ServerHello, Vec<Vec<u8>>)> {
    let hello = build_client_hello(version, hostname, &[]);
    let flight = exchange(SocketAddr::new(ip, port), &hello, limit, true).await?;
    let server_hello = parse_server_hello(&flight).ok_or_else(|| ProbeError::Tls("no ServerHello".to_string()))?;
    Ok((server_hello, parse_certificate_flight(&flight)))
}

/// Offer only weak suites; the server's choice, if any, is a weak suite it accepts
pub async fn probe_weak_suite(
    ip: IpAddr,
    port: u16,
    version: TlsVersion,
    hostname: Option<&str>,
    limit: Duration,
) -> Option<ServerHello> {
    if version == TlsVersion::Tls13 {
        return None;
    }
    let hello = build_client_hello(version, hostname, WEAK_SUITES);
    let flight = exchange(SocketAddr::new(ip, port), &hello, limit, false).await.ok()?;
    parse_server_hello(&flight).filter(|sh| WEAK_SUITES.contains(&sh.cipher_suite))
}
