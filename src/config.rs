//! TLS policy configuration
//!
//! The surrounding client parses its configuration elsewhere; this module
//! carries the subset a secure-transport backend consults. Which of these
//! fields the framework may populate is governed by the backend's
//! capability flags.

use serde::{Deserialize, Serialize};

/// Per-connection TLS policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Verify the peer's credentials during the handshake
    pub verify_peer: bool,

    /// CA material handed to the platform trust store, as an in-memory blob
    pub ca_blob: Option<Vec<u8>>,

    /// Cipher list for TLS 1.2 and earlier
    pub cipher_list: Option<String>,

    /// Ciphersuite list for TLS 1.3
    pub tls13_ciphersuites: Option<String>,

    /// ALPN protocols offered during the handshake
    pub alpn: Vec<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            verify_peer: true,
            ca_blob: None,
            cipher_list: None,
            tls13_ciphersuites: None,
            alpn: Vec::new(),
        }
    }
}

impl TlsConfig {
    /// Policy with peer verification switched off. Explicit insecure mode,
    /// never the default.
    pub fn insecure() -> Self {
        Self {
            verify_peer: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_verifies_peer() {
        assert!(TlsConfig::default().verify_peer);
    }

    #[test]
    fn test_insecure_disables_verification_only() {
        let cfg = TlsConfig::insecure();
        assert!(!cfg.verify_peer);
        assert!(cfg.ca_blob.is_none());
        assert!(cfg.alpn.is_empty());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let cfg: TlsConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.verify_peer);
        assert!(cfg.cipher_list.is_none());
    }

    #[test]
    fn test_round_trips_through_json() {
        let cfg = TlsConfig {
            cipher_list: Some("HIGH:!aNULL".into()),
            alpn: vec!["h2".into(), "http/1.1".into()],
            ..TlsConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let parsed: TlsConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.cipher_list, cfg.cipher_list);
        assert_eq!(parsed.alpn, cfg.alpn);
    }
}
