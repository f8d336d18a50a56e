//! Connection-level facts (L3/L4 + TLS).

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Facts about the downstream connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionInfo {
    /// Remote (peer) address.
    #[serde(default)]
    pub source: Option<SocketAddr>,
    /// Local address the connection was accepted on.
    #[serde(default)]
    pub destination: Option<SocketAddr>,
    /// SNI presented in the TLS ClientHello.
    #[serde(default)]
    pub requested_server_name: Option<String>,
    /// TLS session facts; `None` for plaintext connections.
    #[serde(default)]
    pub tls: Option<TlsInfo>,
}

/// TLS session facts, including the peer certificate identities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsInfo {
    /// Negotiated protocol version (e.g. `TLSv1.3`).
    #[serde(default)]
    pub version: Option<String>,
    /// Whether the peer presented a certificate.
    #[serde(default)]
    pub peer_certificate_presented: bool,
    /// URI SANs of the peer certificate.
    #[serde(default)]
    pub uri_san_peer_certificate: Vec<String>,
    /// DNS SANs of the peer certificate.
    #[serde(default)]
    pub dns_san_peer_certificate: Vec<String>,
    /// Subject of the peer certificate.
    #[serde(default)]
    pub subject_peer_certificate: Option<String>,
}

impl ConnectionInfo {
    pub fn source_ip(&self) -> Option<IpAddr> {
        self.source.map(|a| a.ip())
    }

    pub fn source_port(&self) -> Option<u16> {
        self.source.map(|a| a.port())
    }

    pub fn destination_ip(&self) -> Option<IpAddr> {
        self.destination.map(|a| a.ip())
    }

    pub fn destination_port(&self) -> Option<u16> {
        self.destination.map(|a| a.port())
    }

    pub fn requested_server_name(&self) -> Option<&str> {
        self.requested_server_name.as_deref().filter(|s| !s.is_empty())
    }

    /// True when the peer authenticated with a certificate.
    pub fn is_mtls(&self) -> bool {
        self.tls
            .as_ref()
            .is_some_and(|t| t.peer_certificate_presented)
    }

    /// Peer identities in lookup order: URI SANs, then DNS SANs, then the
    /// certificate subject. Empty unless the peer presented a certificate.
    pub fn peer_principals(&self) -> Vec<&str> {
        let Some(tls) = self.tls.as_ref().filter(|t| t.peer_certificate_presented) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = tls
            .uri_san_peer_certificate
            .iter()
            .chain(tls.dns_san_peer_certificate.iter())
            .map(String::as_str)
            .collect();
        if let Some(subject) = tls.subject_peer_certificate.as_deref() {
            out.push(subject);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_connection_has_no_principals() {
        let c = ConnectionInfo {
            source: "10.0.0.1:5555".parse().ok(),
            ..Default::default()
        };
        assert!(!c.is_mtls());
        assert!(c.peer_principals().is_empty());
        assert_eq!(c.source_port(), Some(5555));
        assert_eq!(c.destination_ip(), None);
    }

    #[test]
    fn principals_follow_san_order() {
        let c = ConnectionInfo {
            tls: Some(TlsInfo {
                peer_certificate_presented: true,
                uri_san_peer_certificate: vec!["spiffe://cluster.local/ns/a/sa/web".into()],
                dns_san_peer_certificate: vec!["web.a.svc".into()],
                subject_peer_certificate: Some("CN=web".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            c.peer_principals(),
            vec!["spiffe://cluster.local/ns/a/sa/web", "web.a.svc", "CN=web"]
        );
    }

    #[test]
    fn empty_sni_is_absent() {
        let c = ConnectionInfo {
            requested_server_name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(c.requested_server_name(), None);
    }
}
