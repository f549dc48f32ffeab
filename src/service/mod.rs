//! Secure-transport service interface
//!
//! The platform library that performs the actual handshake, cipher
//! negotiation and record encryption is an external collaborator. This
//! module specifies it at its interface:
//!
//! - [`SecureProvider`] creates connection handles and exposes platform
//!   metadata
//! - [`SecureSession`] is one connection handle; every operation on it
//!   completes asynchronously via a callback on the session's execution
//!   queue
//!
//! A loopback implementation lives in [`loopback`] for exercising the
//! backend without a real platform library.

mod loopback;

pub use loopback::LoopbackProvider;

use std::fmt;
use std::sync::Arc;

use crate::config::TlsConfig;
use crate::error::Result;
use crate::queue::SerialQueue;

/// Hostname/port pair identifying the peer; immutable for the lifetime of
/// one connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Lifecycle states reported by a session's state-change observer.
///
/// `Preparing` is the progress notification; `Ready`, `Waiting`, `Invalid`
/// and `Failed` are terminal for a connect attempt; `Cancelled` is the
/// terminal notification of an explicit teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Setup,
    Preparing,
    Waiting,
    Ready,
    Failed,
    Cancelled,
    Invalid,
}

/// Domain a transport-level error originates from.
///
/// `Invalid` doubles as the bucket for unrecognized domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDomain {
    /// Socket-level failure
    Posix,
    /// Host/address resolution failure
    Dns,
    /// Secure-transport (handshake or record layer) failure
    Tls,
    /// Anything else
    Invalid,
}

/// An error reported by the underlying service, opaque except for its
/// domain and a diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub domain: ErrorDomain,
    pub code: i32,
    pub message: String,
}

impl ServiceError {
    pub fn new(domain: ErrorDomain, code: i32, message: impl Into<String>) -> Self {
        Self {
            domain,
            code,
            message: message.into(),
        }
    }
}

/// Credentials a peer presents during the handshake, as the trust
/// evaluation sees them.
#[derive(Debug, Clone)]
pub struct PeerCredentials {
    /// Subject name on the presented certificate
    pub subject: String,
    /// Whether the platform trust store would accept it
    pub trusted: bool,
}

impl PeerCredentials {
    pub fn trusted(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            trusted: true,
        }
    }

    pub fn untrusted(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            trusted: false,
        }
    }
}

impl Default for PeerCredentials {
    fn default() -> Self {
        Self::trusted("peer.invalid")
    }
}

/// Trust-evaluation override consulted instead of the platform's default
/// certificate validation. Installing one is an explicit insecure mode.
pub type TrustOverride = Arc<dyn Fn(&PeerCredentials) -> bool + Send + Sync>;

/// State-change observer. A session holds exactly one; installing a new
/// observer fully replaces the previous one.
pub type StateHandler = Box<dyn FnMut(SessionState, Option<&ServiceError>) + Send>;

/// Completion for one send operation.
pub type SendCompletion = Box<dyn FnOnce(Option<ServiceError>) + Send>;

/// Completion for one receive operation: delivered content (`None` means
/// end of stream), a content-complete marker, and an optional error.
pub type ReceiveCompletion = Box<dyn FnOnce(Option<Vec<u8>>, bool, Option<ServiceError>) + Send>;

/// Connection parameters, constructed once per connect attempt.
pub struct SessionParameters {
    pub verify_peer: bool,
    pub trust_override: Option<TrustOverride>,
    pub ca_blob: Option<Vec<u8>>,
    pub cipher_list: Option<String>,
    pub tls13_ciphersuites: Option<String>,
    pub alpn: Vec<String>,
}

impl SessionParameters {
    /// Derive parameters from the caller's TLS policy.
    pub fn from_config(cfg: &TlsConfig) -> Self {
        Self {
            verify_peer: cfg.verify_peer,
            trust_override: None,
            ca_blob: cfg.ca_blob.clone(),
            cipher_list: cfg.cipher_list.clone(),
            tls13_ciphersuites: cfg.tls13_ciphersuites.clone(),
            alpn: cfg.alpn.clone(),
        }
    }
}

impl Default for SessionParameters {
    fn default() -> Self {
        Self::from_config(&TlsConfig::default())
    }
}

/// One in-progress or established secure connection.
///
/// All callbacks fire on the execution queue the session was created with,
/// in FIFO order for that session.
pub trait SecureSession: Send + Sync {
    /// Replace the state-change observer.
    fn set_state_handler(&self, handler: StateHandler);

    /// Begin connecting. State changes are delivered to the observer.
    fn start(&self);

    /// Submit one send. `is_final` marks the data as the last message of
    /// its content context.
    fn send(&self, data: Vec<u8>, is_final: bool, completion: SendCompletion);

    /// Request between `min_len` and `max_len` bytes of decrypted content.
    fn receive(&self, min_len: usize, max_len: usize, completion: ReceiveCompletion);

    /// Request cancellation; the observer sees `Cancelled` when done.
    fn cancel(&self);
}

/// Factory for sessions plus platform metadata.
pub trait SecureProvider: Send + Sync {
    /// Create a connection handle bound to the given execution queue.
    fn create_session(
        &self,
        endpoint: &Endpoint,
        params: SessionParameters,
        queue: Arc<SerialQueue>,
    ) -> Result<Arc<dyn SecureSession>>;

    /// Short name of the underlying platform library.
    fn name(&self) -> &'static str;

    /// Version string probed from platform metadata, when available.
    fn platform_version(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_display() {
        let peer = Endpoint::new("example.com", 443);
        assert_eq!(peer.to_string(), "example.com:443");
    }

    #[test]
    fn test_parameters_default_to_verification() {
        let params = SessionParameters::default();
        assert!(params.verify_peer);
        assert!(params.trust_override.is_none());
    }

    #[test]
    fn test_parameters_carry_policy_fields() {
        let cfg = TlsConfig {
            cipher_list: Some("HIGH".into()),
            alpn: vec!["h2".into()],
            ..TlsConfig::default()
        };
        let params = SessionParameters::from_config(&cfg);
        assert_eq!(params.cipher_list.as_deref(), Some("HIGH"));
        assert_eq!(params.alpn, vec!["h2".to_string()]);
    }
}
