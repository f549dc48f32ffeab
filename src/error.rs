//! Error types for SecLink
//!
//! Every operation surfaces exactly one outcome code from the unified
//! taxonomy below. Transport-domain errors reported by the underlying
//! secure-transport service are classified by domain only; the
//! classification is a pure function with no I/O and no side effects.

use thiserror::Error;

use crate::service::{ErrorDomain, ServiceError};

/// Main error type for SecLink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Could not resolve host: {0}")]
    ResolveHost(String),

    #[error("Could not connect: {0}")]
    Connect(String),

    #[error("TLS connect error: {0}")]
    TlsConnect(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Send error: {0}")]
    Send(String),

    #[error("Receive error: {0}")]
    Recv(String),

    #[error("Read error: {0}")]
    Read(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for SecLink
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify a transport-domain error into the unified taxonomy.
    ///
    /// The mapping depends on the error domain alone:
    /// - address-resolution domain maps to [`Error::ResolveHost`]
    /// - socket domain maps to [`Error::Write`]
    /// - secure-transport domain maps to [`Error::TlsConnect`]
    /// - anything else maps to [`Error::Connect`]
    pub fn from_service(err: &ServiceError) -> Self {
        match err.domain {
            ErrorDomain::Dns => Error::ResolveHost(err.message.clone()),
            ErrorDomain::Posix => Error::Write(err.message.clone()),
            ErrorDomain::Tls => Error::TlsConnect(err.message.clone()),
            ErrorDomain::Invalid => Error::Connect(err.message.clone()),
        }
    }

    /// Classify an optional transport-domain error: absence means success.
    pub fn outcome(err: Option<&ServiceError>) -> Result<()> {
        match err {
            None => Ok(()),
            Some(e) => Err(Error::from_service(e)),
        }
    }
}
