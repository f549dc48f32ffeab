//! Backend contract for the generic secure-transport abstraction
//!
//! The surrounding connection-filter framework drives every backend through
//! the [`TlsBackend`] trait and decides which configuration options it may
//! pass down from the [`Capabilities`] flags. The framework also owns the
//! connect-phase progress enumeration ([`ConnectingState`]); a backend
//! advances it through a shared [`ConnectingStateCell`] while the framework
//! polls it to decide whether to re-invoke the non-blocking connect entry
//! point.

mod platform;

pub use platform::{PlatformBackend, PLATFORM_DESCRIPTOR};

use std::sync::atomic::{AtomicU8, Ordering};

use crate::config::TlsConfig;
use crate::error::Result;
use crate::service::{Endpoint, SecureSession};

/// Identity of one pluggable backend implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendId {
    PlatformNative,
}

/// Static identity a backend registers under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendInfo {
    pub id: BackendId,
    pub name: &'static str,
}

/// Feature flags the framework consults before passing configuration down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Accepts CA material as an in-memory blob
    pub ca_blob: bool,
    /// Supports caching the parsed CA store
    pub ca_cache: bool,
    /// Honors an OpenSSL-style cipher list
    pub cipher_list: bool,
    /// Honors a TLS 1.3 ciphersuite list
    pub tls13_ciphersuites: bool,
    /// Can tunnel through an HTTPS proxy
    pub https_proxy: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        ca_blob: true,
        ca_cache: true,
        cipher_list: true,
        tls13_ciphersuites: true,
        https_proxy: true,
    };
}

/// Static declaration of one backend: identity, feature flags, the size of
/// its per-connection state, and the process-wide lifecycle hooks.
pub struct BackendDescriptor {
    pub info: BackendInfo,
    pub capabilities: Capabilities,
    pub state_size: usize,
    pub init: fn() -> Result<()>,
    pub cleanup: fn(),
}

/// Connect-phase progress, owned by the framework and written by the
/// backend: `Negotiating` on the first progress notification, `Complete`
/// on the first terminal notification, each exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectingState {
    Idle = 0,
    Negotiating = 1,
    Complete = 2,
}

/// Shared cell the framework polls while a backend advances it.
///
/// Transitions are monotonic and fire at most once each, so a state-change
/// observer delivering repeated notifications cannot re-advance the cell.
#[derive(Debug, Default)]
pub struct ConnectingStateCell(AtomicU8);

impl ConnectingStateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(ConnectingState::Idle as u8))
    }

    pub fn load(&self) -> ConnectingState {
        match self.0.load(Ordering::SeqCst) {
            0 => ConnectingState::Idle,
            1 => ConnectingState::Negotiating,
            _ => ConnectingState::Complete,
        }
    }

    /// Advance Idle to Negotiating; false when already past it.
    pub fn set_negotiating(&self) -> bool {
        self.0
            .compare_exchange(
                ConnectingState::Idle as u8,
                ConnectingState::Negotiating as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Advance to Complete; false when already terminal.
    pub fn set_complete(&self) -> bool {
        self.0.swap(ConnectingState::Complete as u8, Ordering::SeqCst)
            != ConnectingState::Complete as u8
    }
}

/// The function table the framework invokes on one backend instance.
///
/// Connect must have reported completion before `send`/`recv` are valid;
/// invoking them earlier is a caller contract violation.
pub trait TlsBackend: Send {
    /// Static identity of this backend
    fn info(&self) -> BackendInfo;

    /// Feature flags of this backend
    fn capabilities(&self) -> Capabilities;

    /// Version string of the underlying platform library
    fn version(&self) -> Option<String>;

    /// Connect, returning only on success or definitive failure.
    fn connect_blocking(&mut self, peer: &Endpoint, cfg: &TlsConfig) -> Result<()>;

    /// Connect poll: `Ok(false)` means still negotiating, call again.
    fn connect_nonblocking(&mut self, peer: &Endpoint, cfg: &TlsConfig) -> Result<bool>;

    /// Send the whole buffer, returning the number of bytes written.
    fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Receive up to `buf.len()` bytes; `Ok(0)` signals end of stream.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Tear the connection down; `Ok(true)` once teardown has finished.
    fn shutdown(&mut self) -> Result<bool>;

    /// Release the connection handle. Idempotent.
    fn close(&mut self);

    /// Whether decrypted data is buffered beyond the last read
    fn data_pending(&self) -> bool;

    /// Borrow the raw connection handle for introspection
    fn raw_session(&self) -> Option<&dyn SecureSession>;

    /// Fill `buf` with cryptographically secure random bytes.
    fn random(&self, buf: &mut [u8]) -> Result<()>;

    /// Compute a SHA-256 digest of `data`.
    fn sha256(&self, data: &[u8]) -> [u8; 32];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connecting_state_cell_starts_idle() {
        let cell = ConnectingStateCell::new();
        assert_eq!(cell.load(), ConnectingState::Idle);
    }

    #[test]
    fn test_negotiating_advances_exactly_once() {
        let cell = ConnectingStateCell::new();
        assert!(cell.set_negotiating());
        assert!(!cell.set_negotiating());
        assert_eq!(cell.load(), ConnectingState::Negotiating);
    }

    #[test]
    fn test_complete_advances_exactly_once() {
        let cell = ConnectingStateCell::new();
        assert!(cell.set_negotiating());
        assert!(cell.set_complete());
        assert!(!cell.set_complete());
        assert_eq!(cell.load(), ConnectingState::Complete);
    }

    #[test]
    fn test_no_negotiating_after_complete() {
        let cell = ConnectingStateCell::new();
        assert!(cell.set_complete());
        assert!(!cell.set_negotiating());
        assert_eq!(cell.load(), ConnectingState::Complete);
    }

    #[test]
    fn test_capabilities_default_to_none() {
        assert_eq!(Capabilities::default(), Capabilities {
            ca_blob: false,
            ca_cache: false,
            cipher_list: false,
            tls13_ciphersuites: false,
            https_proxy: false,
        });
    }
}
