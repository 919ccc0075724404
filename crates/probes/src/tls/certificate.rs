//! X.509 parsing for served certificate chains

use exposcan_core::results::{CertificateRecord, ChainLink};

use chrono::{DateTime, Utc};
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

/// Minimum acceptable RSA/DSA modulus
pub const MIN_RSA_BITS: u32 = 2048;
/// Minimum acceptable elliptic curve size
pub const MIN_EC_BITS: u32 = 224;

/// Days before expiry at which a certificate is reported
pub const EXPIRY_WARNING_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Rsa,
    Dsa,
    Ec,
    Other,
}

/// Leaf certificate with the key assessment
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCertificate {
    pub record: CertificateRecord,
    pub key_kind: KeyKind,
}

impl ParsedCertificate {
    pub fn weak_key(&self) -> bool {
        is_weak_key(self.key_kind, self.record.key_size_bits)
    }
}

/// Key-size rule: RSA and DSA below 2048 bits, EC below 224 bits
pub fn is_weak_key(kind: KeyKind, bits: u32) -> bool {
    match kind {
        KeyKind::Rsa | KeyKind::Dsa => bits > 0 && bits < MIN_RSA_BITS,
        KeyKind::Ec => bits > 0 && bits < MIN_EC_BITS,
        KeyKind::Other => false,
    }
}

/// Whole days remaining, rounded down; negative once expired
pub fn days_until(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (not_after - now).num_seconds().div_euclid(86_400)
}

fn signature_algorithm_name(oid: &str) -> String {
    match oid {
        "1.2.840.113549.1.1.4" => "md5WithRSAEncryption".into(),
        "1.2.840.113549.1.1.5" => "sha1WithRSAEncryption".into(),
        "1.2.840.113549.1.1.11" => "sha256WithRSAEncryption".into(),
        "1.2.840.113549.1.1.12" => "sha384WithRSAEncryption".into(),
        "1.2.840.113549.1.1.13" => "sha512WithRSAEncryption".into(),
        "1.2.840.113549.1.1.10" => "RSASSA-PSS".into(),
        "1.2.840.10045.4.3.2" => "ecdsa-with-SHA256".into(),
        "1.2.840.10045.4.3.3" => "ecdsa-with-SHA384".into(),
        "1.2.840.10045.4.3.4" => "ecdsa-with-SHA512".into(),
        "1.3.101.112" => "Ed25519".into(),
        "1.3.101.113" => "Ed448".into(),
        other => other.into(),
    }
}

fn curve_bits(oid: &str) -> u32 {
    match oid {
        "1.2.840.10045.3.1.7" => 256,
        "1.3.132.0.34" => 384,
        "1.3.132.0.35" => 521,
        "1.3.132.0.33" => 224,
        "1.2.840.10045.3.1.1" => 192,
        _ => 0,
    }
}

fn utc(time: ASN1Time) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.timestamp(), 0)
}

fn key_info(cert: &X509Certificate<'_>) -> (KeyKind, u32) {
    let spki = cert.public_key();
    match spki.parsed() {
        Ok(PublicKey::RSA(rsa)) => (KeyKind::Rsa, rsa.key_size() as u32),
        Ok(PublicKey::DSA(y)) => (KeyKind::Dsa, (y.len() * 8) as u32),
        Ok(PublicKey::EC(_)) => {
            let bits = spki
                .algorithm
                .parameters
                .as_ref()
                .and_then(|p| p.as_oid().ok())
                .map(|oid| curve_bits(&oid.to_id_string()))
                .unwrap_or(0);
            (KeyKind::Ec, bits)
        }
        _ => {
            let bits = match spki.algorithm.algorithm.to_id_string().as_str() {
                "1.3.101.112" => 256,
                "1.3.101.113" => 456,
                _ => 0,
            };
            (KeyKind::Other, bits)
        }
    }
}

/// Parse a leaf certificate. `None` when the DER is unusable.
pub fn parse_leaf(der: &[u8], now: DateTime<Utc>) -> Option<ParsedCertificate> {
    let (_, cert) = X509Certificate::from_der(der).ok()?;
    let validity = cert.validity();
    let valid_from = utc(validity.not_before)?;
    let valid_until = utc(validity.not_after)?;
    let (key_kind, key_size_bits) = key_info(&cert);

    Some(ParsedCertificate {
        record: CertificateRecord {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            valid_from,
            valid_until,
            days_until_expiry: days_until(valid_until, now),
            serial_number: cert.tbs_certificate.serial.to_string(),
            key_size_bits,
            signature_algorithm: signature_algorithm_name(&cert.signature_algorithm.algorithm.to_id_string()),
        },
        key_kind,
    })
}

/// Subject, issuer and expiry of every parseable certificate in the chain
pub fn chain_links(chain: &[Vec<u8>]) -> Vec<ChainLink> {
    chain
        .iter()
        .filter_map(|der| {
            let (_, cert) = X509Certificate::from_der(der).ok()?;
            Some(ChainLink {
                subject: cert.subject().to_string(),
                issuer: cert.issuer().to_string(),
                valid_until: utc(cert.validity().not_after)?,
            })
        })
        .collect()
}
