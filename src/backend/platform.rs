//! Platform-native secure transport backend
//!
//! Bridges the callback-driven platform service into the blocking call
//! pattern the filter chain expects. Every operation submits one
//! asynchronous request and parks the calling thread on a fresh completion
//! rendezvous until the matching callback fires on the shared execution
//! queue:
//!
//! - **connect** installs a state-change observer that drives the
//!   framework's connecting-state and signals on the first terminal
//!   notification, then swaps in an error-only observer
//! - **send/recv** are one-shot round trips through the service, gated on
//!   their own rendezvous
//! - **shutdown** cancels the session and waits for the terminal
//!   notification before releasing the handle
//!
//! The blocking waits are unbounded; the underlying service is responsible
//! for eventually delivering a terminal notification for every started
//! operation.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

use super::{
    BackendDescriptor, BackendId, BackendInfo, Capabilities, ConnectingStateCell, TlsBackend,
};
use crate::config::TlsConfig;
use crate::error::{Error, Result};
use crate::queue;
use crate::rendezvous;
use crate::service::{
    Endpoint, SecureProvider, SecureSession, ServiceError, SessionParameters, SessionState,
};

/// Backend name advertised to the framework
const BACKEND_NAME: &str = "platform-native";

/// Registry entry for this backend
pub static PLATFORM_DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    info: BackendInfo {
        id: BackendId::PlatformNative,
        name: BACKEND_NAME,
    },
    capabilities: Capabilities::ALL,
    state_size: mem::size_of::<PlatformBackend>(),
    init: queue::init,
    cleanup: queue::cleanup,
};

/// Connect-attempt state crossing the queue boundary.
///
/// `error` and `done` are written only from callbacks running on the
/// execution queue; the calling thread reads them only after a rendezvous
/// has signaled, so every write happens-before the corresponding read.
struct ConnectShared {
    done: AtomicBool,
    connected: AtomicBool,
    error: Mutex<Option<Error>>,
}

impl ConnectShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            done: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            error: Mutex::new(None),
        })
    }

    fn record(&self, error: Error) {
        *self.error.lock() = Some(error);
    }

    fn record_service(&self, error: &ServiceError) {
        self.record(Error::from_service(error));
    }

    fn current_error(&self) -> Option<Error> {
        self.error.lock().clone()
    }
}

/// Per-connection backend state: the session handle, the shared execution
/// queue, and the connect-attempt flags.
pub struct PlatformBackend {
    provider: Arc<dyn SecureProvider>,
    connecting: Arc<ConnectingStateCell>,
    session: Option<Arc<dyn SecureSession>>,
    shared: Arc<ConnectShared>,
}

impl PlatformBackend {
    /// Allocate backend state for one connection attempt.
    ///
    /// `connecting` is the framework-owned progress cell this backend
    /// advances while the framework polls it.
    pub fn new(provider: Arc<dyn SecureProvider>, connecting: Arc<ConnectingStateCell>) -> Self {
        Self {
            provider,
            connecting,
            session: None,
            shared: ConnectShared::new(),
        }
    }

    /// Whether the connect attempt reached `Ready`
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Create the session, start it, and block until the first terminal
    /// state-change notification.
    fn connect_start(&mut self, peer: &Endpoint, cfg: &TlsConfig) -> Result<()> {
        let shared_queue = queue::shared()?;

        let mut params = SessionParameters::from_config(cfg);
        if !cfg.verify_peer {
            // Explicit insecure mode: accept whatever the peer presents
            warn!("TLS: peer verification disabled for {}", peer);
            params.trust_override = Some(Arc::new(|_credentials| true));
        }

        debug!("TLS: connecting to {}", peer);
        let session = self
            .provider
            .create_session(peer, params, Arc::clone(&shared_queue))?;

        let (waiter, completer) = rendezvous::pair::<()>();
        let shared = Arc::clone(&self.shared);
        let connecting = Arc::clone(&self.connecting);
        session.set_state_handler(Box::new(move |state, error| {
            if let Some(err) = error {
                shared.record_service(err);
            }
            match state {
                SessionState::Setup => {}
                SessionState::Preparing => {
                    if connecting.set_negotiating() {
                        trace!("TLS: negotiation started");
                    }
                }
                SessionState::Ready
                | SessionState::Waiting
                | SessionState::Invalid
                | SessionState::Failed
                | SessionState::Cancelled => {
                    if state == SessionState::Ready {
                        shared.connected.store(true, Ordering::SeqCst);
                    }
                    shared.done.store(true, Ordering::SeqCst);
                    connecting.set_complete();
                    completer.complete(());
                }
            }
        }));

        session.start();
        waiter.wait();

        // The connect observer has served its purpose; later async faults
        // are still recorded but can no longer signal the stale rendezvous.
        let shared = Arc::clone(&self.shared);
        session.set_state_handler(Box::new(move |_state, error| {
            if let Some(err) = error {
                shared.record_service(err);
            }
        }));
        self.session = Some(session);

        match self.shared.current_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Connect entry point shared by the blocking and non-blocking paths.
    ///
    /// The first call performs one full blocking round trip; any later call
    /// is a query reflecting the `done` flag and the last captured error.
    fn connect_common(&mut self, peer: &Endpoint, cfg: &TlsConfig) -> Result<bool> {
        if self.session.is_none() {
            self.connect_start(peer, cfg)?;
        }

        match self.shared.current_error() {
            Some(err) => Err(err),
            None => Ok(self.shared.done.load(Ordering::SeqCst)),
        }
    }
}

impl TlsBackend for PlatformBackend {
    fn info(&self) -> BackendInfo {
        PLATFORM_DESCRIPTOR.info
    }

    fn capabilities(&self) -> Capabilities {
        PLATFORM_DESCRIPTOR.capabilities
    }

    fn version(&self) -> Option<String> {
        let version = self.provider.platform_version()?;
        Some(format!("{}/{}", self.provider.name(), version))
    }

    fn connect_blocking(&mut self, peer: &Endpoint, cfg: &TlsConfig) -> Result<()> {
        let done = self.connect_common(peer, cfg)?;
        debug_assert!(done);
        Ok(())
    }

    fn connect_nonblocking(&mut self, peer: &Endpoint, cfg: &TlsConfig) -> Result<bool> {
        self.connect_common(peer, cfg)
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| Error::Send("Not connected".into()))?;

        // The caller's buffer is not guaranteed to outlive this call
        let owned = data.to_vec();
        let len = data.len();

        let (waiter, completer) = rendezvous::pair::<Result<()>>();
        session.send(
            owned,
            true,
            Box::new(move |error| {
                let outcome = match error {
                    Some(err) => Err(Error::Send(err.message)),
                    None => Ok(()),
                };
                completer.complete(outcome);
            }),
        );

        waiter.wait()?;
        trace!("TLS: sent {} bytes", len);
        Ok(len)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| Error::Recv("Not connected".into()))?;
        if buf.is_empty() {
            return Ok(0);
        }

        let max_len = buf.len();
        let (waiter, completer) = rendezvous::pair::<Result<Vec<u8>>>();
        session.receive(
            1,
            max_len,
            Box::new(move |content, _is_complete, error| {
                let outcome = match error {
                    Some(err) => Err(Error::Recv(err.message)),
                    // No content means the peer finished the stream
                    None => Ok(content.unwrap_or_default()),
                };
                completer.complete(outcome);
            }),
        );

        let delivered = waiter.wait()?;
        let count = delivered.len().min(max_len);
        buf[..count].copy_from_slice(&delivered[..count]);
        if count == 0 {
            trace!("TLS: end of stream");
        } else {
            trace!("TLS: received {} bytes", count);
        }
        Ok(count)
    }

    fn shutdown(&mut self) -> Result<bool> {
        let Some(session) = self.session.take() else {
            return Ok(true);
        };

        let shared = Arc::clone(&self.shared);
        let (waiter, completer) = rendezvous::pair::<Result<()>>();
        session.set_state_handler(Box::new(move |state, error| {
            if let Some(err) = error {
                shared.record_service(err);
            }
            match state {
                SessionState::Cancelled => {
                    completer.complete(Ok(()));
                }
                SessionState::Invalid | SessionState::Failed => {
                    let err = Error::Read("Connection failed during teardown".into());
                    shared.record(err.clone());
                    completer.complete(Err(err));
                }
                _ => {}
            }
        }));

        debug!("TLS: shutting down");
        session.cancel();
        waiter.wait()?;

        match self.shared.current_error() {
            Some(err) => Err(err),
            None => Ok(true),
        }
    }

    fn close(&mut self) {
        if self.session.take().is_some() {
            debug!("TLS: session released");
        }
    }

    fn data_pending(&self) -> bool {
        // This backend never buffers ahead of the caller
        false
    }

    fn raw_session(&self) -> Option<&dyn SecureSession> {
        self.session.as_deref()
    }

    fn random(&self, buf: &mut [u8]) -> Result<()> {
        OsRng.fill_bytes(buf);
        Ok(())
    }

    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }
}
