//! Strict-Transport-Security header check

use crate::common::{ProbeError, ProbeResult};
use exposcan_core::{Target, USER_AGENT};

use reqwest::header::STRICT_TRANSPORT_SECURITY;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// HSTS state of a web endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HstsStatus {
    pub enabled: bool,
    pub max_age: Option<u64>,
}

/// `max-age` directive of a header value, case-insensitive
pub fn parse_max_age(header: &str) -> Option<u64> {
    header.split(';').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("max-age") {
            return None;
        }
        value.trim().trim_matches('"').parse().ok()
    })
}

pub fn https_url(target: &Target, port: u16) -> String {
    if port == 443 {
        format!("https://{}/", target.url_host())
    } else {
        format!("https://{}:{}/", target.url_host(), port)
    }
}

/// Fetch the landing page and read the header
pub async fn check_hsts(target: &Target, port: u16, limit: Duration) -> ProbeResult<HstsStatus> {
    let client = Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(limit)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProbeError::Tls(e.to_string()))?;

    let url = https_url(target, port);
    let response = client.get(&url).send().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout
        } else {
            ProbeError::Io(e.to_string())
        }
    })?;

    let header = response
        .headers()
        .get(STRICT_TRANSPORT_SECURITY)
        .and_then(|v| v.to_str().ok());
    debug!(url = %url, hsts = ?header, "HSTS check");

    Ok(match header {
        Some(value) => HstsStatus {
            enabled: true,
            max_age: parse_max_age(value),
        },
        None => HstsStatus::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_max_age() {
        assert_eq!(parse_max_age("max-age=31536000; includeSubDomains"), Some(31536000));
        assert_eq!(parse_max_age("includeSubDomains; Max-Age=\"600\""), Some(600));
        assert_eq!(parse_max_age("preload"), None);
        assert_eq!(parse_max_age("max-age=abc"), None);
    }

    #[test]
    fn test_https_url() {
        let domain: Target = "example.com".parse().unwrap();
        assert_eq!(https_url(&domain, 443), "https://example.com/");
        assert_eq!(https_url(&domain, 8443), "https://example.com:8443/");
    }
}
