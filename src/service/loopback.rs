//! Loopback secure-transport service
//!
//! An in-memory implementation of the service interface for exercising the
//! backend without a real platform library. Sent bytes are echoed into the
//! session's own receive buffer after the simulated handshake; trust
//! evaluation is driven by the credentials the provider is configured to
//! present. All callbacks are dispatched on the session's execution queue,
//! preserving the FIFO ordering contract of the real service.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    Endpoint, ErrorDomain, PeerCredentials, ReceiveCompletion, SecureProvider, SecureSession,
    SendCompletion, ServiceError, SessionParameters, SessionState, StateHandler,
};
use crate::error::Result;
use crate::queue::SerialQueue;

// ============================================================================
// LoopbackProvider
// ============================================================================

/// Session factory presenting configurable credentials and faults
pub struct LoopbackProvider {
    credentials: PeerCredentials,
    version: Option<String>,
    fail_domain: Option<ErrorDomain>,
    eof_when_drained: bool,
    sessions_created: Arc<AtomicUsize>,
}

impl LoopbackProvider {
    pub fn new() -> Self {
        Self {
            credentials: PeerCredentials::default(),
            version: Some("1.0".to_string()),
            fail_domain: None,
            eof_when_drained: false,
            sessions_created: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Present the given credentials during the handshake
    pub fn with_credentials(mut self, credentials: PeerCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Fail every connect attempt with an error in the given domain
    pub fn failing(mut self, domain: ErrorDomain) -> Self {
        self.fail_domain = Some(domain);
        self
    }

    /// Report end of stream once the echo buffer is drained, instead of
    /// parking the receive until more data arrives
    pub fn eof_when_drained(mut self) -> Self {
        self.eof_when_drained = true;
        self
    }

    /// Simulate a platform whose metadata probe fails
    pub fn without_version(mut self) -> Self {
        self.version = None;
        self
    }

    /// Counter of sessions created by this provider
    pub fn session_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.sessions_created)
    }
}

impl Default for LoopbackProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureProvider for LoopbackProvider {
    fn create_session(
        &self,
        _endpoint: &Endpoint,
        params: SessionParameters,
        queue: Arc<SerialQueue>,
    ) -> Result<Arc<dyn SecureSession>> {
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(LoopbackSession {
            inner: Arc::new(Inner {
                queue,
                params,
                credentials: self.credentials.clone(),
                fail_domain: self.fail_domain,
                eof_when_drained: self.eof_when_drained,
                handler: Mutex::new(None),
                buffer: Mutex::new(VecDeque::new()),
                pending: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }))
    }

    fn name(&self) -> &'static str {
        "loopback"
    }

    fn platform_version(&self) -> Option<String> {
        self.version.clone()
    }
}

// ============================================================================
// LoopbackSession
// ============================================================================

/// A receive waiting for data to arrive in the echo buffer
struct Pending {
    max_len: usize,
    completion: ReceiveCompletion,
}

struct Inner {
    queue: Arc<SerialQueue>,
    params: SessionParameters,
    credentials: PeerCredentials,
    fail_domain: Option<ErrorDomain>,
    eof_when_drained: bool,
    handler: Mutex<Option<StateHandler>>,
    buffer: Mutex<VecDeque<u8>>,
    pending: Mutex<Option<Pending>>,
    closed: AtomicBool,
}

impl Inner {
    fn fire(&self, state: SessionState, error: Option<&ServiceError>) {
        if let Some(handler) = self.handler.lock().as_mut() {
            handler(state, error);
        }
    }

    fn deliver(&self, max_len: usize, completion: ReceiveCompletion) {
        let mut buffer = self.buffer.lock();
        if !buffer.is_empty() {
            let count = buffer.len().min(max_len);
            let bytes: Vec<u8> = buffer.drain(..count).collect();
            drop(buffer);
            completion(Some(bytes), true, None);
        } else if self.closed.load(Ordering::SeqCst) || self.eof_when_drained {
            drop(buffer);
            completion(None, true, None);
        } else {
            drop(buffer);
            *self.pending.lock() = Some(Pending {
                max_len,
                completion,
            });
        }
    }
}

/// One loopback connection handle
pub struct LoopbackSession {
    inner: Arc<Inner>,
}

impl SecureSession for LoopbackSession {
    fn set_state_handler(&self, handler: StateHandler) {
        *self.inner.handler.lock() = Some(handler);
    }

    fn start(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner.queue.dispatch(move || {
            inner.fire(SessionState::Preparing, None);

            if let Some(domain) = inner.fail_domain {
                let error = ServiceError::new(domain, -1, "simulated connect failure");
                inner.closed.store(true, Ordering::SeqCst);
                inner.fire(SessionState::Failed, Some(&error));
                return;
            }

            let accepted = match &inner.params.trust_override {
                Some(evaluate) => evaluate(&inner.credentials),
                None => inner.credentials.trusted,
            };
            if accepted {
                inner.fire(SessionState::Ready, None);
            } else {
                let error = ServiceError::new(ErrorDomain::Tls, -2, "peer credentials rejected");
                inner.closed.store(true, Ordering::SeqCst);
                inner.fire(SessionState::Failed, Some(&error));
            }
        });
    }

    fn send(&self, data: Vec<u8>, _is_final: bool, completion: SendCompletion) {
        let inner = Arc::clone(&self.inner);
        self.inner.queue.dispatch(move || {
            if inner.closed.load(Ordering::SeqCst) {
                completion(Some(ServiceError::new(
                    ErrorDomain::Posix,
                    -3,
                    "connection is closed",
                )));
                return;
            }
            inner.buffer.lock().extend(data);
            // A parked receive drains the freshly echoed bytes
            let parked = inner.pending.lock().take();
            if let Some(pending) = parked {
                inner.deliver(pending.max_len, pending.completion);
            }
            completion(None);
        });
    }

    fn receive(&self, _min_len: usize, max_len: usize, completion: ReceiveCompletion) {
        let inner = Arc::clone(&self.inner);
        self.inner.queue.dispatch(move || {
            inner.deliver(max_len, completion);
        });
    }

    fn cancel(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner.queue.dispatch(move || {
            inner.closed.store(true, Ordering::SeqCst);
            if let Some(pending) = inner.pending.lock().take() {
                (pending.completion)(None, true, None);
            }
            inner.fire(SessionState::Cancelled, None);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendezvous;

    fn test_queue() -> Arc<SerialQueue> {
        SerialQueue::spawn("test-loopback").unwrap()
    }

    fn peer() -> Endpoint {
        Endpoint::new("localhost", 4433)
    }

    /// Start a session and wait until the observer sees a terminal state.
    fn start_and_wait(
        provider: &LoopbackProvider,
        params: SessionParameters,
    ) -> (Arc<dyn SecureSession>, SessionState, Option<ServiceError>) {
        let session = provider
            .create_session(&peer(), params, test_queue())
            .unwrap();
        let (waiter, completer) = rendezvous::pair::<(SessionState, Option<ServiceError>)>();
        session.set_state_handler(Box::new(move |state, error| match state {
            SessionState::Setup | SessionState::Preparing => {}
            _ => {
                completer.complete((state, error.cloned()));
            }
        }));
        session.start();
        let (state, error) = waiter.wait();
        (session, state, error)
    }

    #[test]
    fn test_handshake_reaches_ready() {
        let provider = LoopbackProvider::new();
        let (_session, state, error) = start_and_wait(&provider, SessionParameters::default());
        assert_eq!(state, SessionState::Ready);
        assert!(error.is_none());
    }

    #[test]
    fn test_untrusted_credentials_rejected() {
        let provider =
            LoopbackProvider::new().with_credentials(PeerCredentials::untrusted("mallory"));
        let (_session, state, error) = start_and_wait(&provider, SessionParameters::default());
        assert_eq!(state, SessionState::Failed);
        assert_eq!(error.unwrap().domain, ErrorDomain::Tls);
    }

    #[test]
    fn test_trust_override_accepts_rejected_credentials() {
        let provider =
            LoopbackProvider::new().with_credentials(PeerCredentials::untrusted("mallory"));
        let params = SessionParameters {
            trust_override: Some(Arc::new(|_credentials| true)),
            ..SessionParameters::default()
        };
        let (_session, state, _error) = start_and_wait(&provider, params);
        assert_eq!(state, SessionState::Ready);
    }

    #[test]
    fn test_send_echoes_into_receive() {
        let provider = LoopbackProvider::new();
        let (session, _state, _error) = start_and_wait(&provider, SessionParameters::default());

        let (sent, send_done) = rendezvous::pair::<Option<ServiceError>>();
        session.send(b"ping".to_vec(), true, Box::new(move |error| {
            send_done.complete(error);
        }));
        assert!(sent.wait().is_none());

        let (received, recv_done) = rendezvous::pair::<Option<Vec<u8>>>();
        session.receive(1, 64, Box::new(move |content, _is_complete, _error| {
            recv_done.complete(content);
        }));
        assert_eq!(received.wait().unwrap(), b"ping");
    }

    #[test]
    fn test_receive_parks_until_data_arrives() {
        let provider = LoopbackProvider::new();
        let (session, _state, _error) = start_and_wait(&provider, SessionParameters::default());

        let (received, recv_done) = rendezvous::pair::<Option<Vec<u8>>>();
        session.receive(1, 64, Box::new(move |content, _is_complete, _error| {
            recv_done.complete(content);
        }));
        session.send(b"late".to_vec(), true, Box::new(|_error| {}));

        assert_eq!(received.wait().unwrap(), b"late");
    }

    #[test]
    fn test_eof_when_drained() {
        let provider = LoopbackProvider::new().eof_when_drained();
        let (session, _state, _error) = start_and_wait(&provider, SessionParameters::default());

        let (received, recv_done) = rendezvous::pair::<Option<Vec<u8>>>();
        session.receive(1, 64, Box::new(move |content, _is_complete, error| {
            assert!(error.is_none());
            recv_done.complete(content);
        }));
        assert!(received.wait().is_none());
    }

    #[test]
    fn test_cancel_fires_cancelled_and_fails_later_sends() {
        let provider = LoopbackProvider::new();
        let (session, _state, _error) = start_and_wait(&provider, SessionParameters::default());

        let (cancelled, cancel_seen) = rendezvous::pair::<SessionState>();
        session.set_state_handler(Box::new(move |state, _error| {
            cancel_seen.complete(state);
        }));
        session.cancel();
        assert_eq!(cancelled.wait(), SessionState::Cancelled);

        let (sent, send_done) = rendezvous::pair::<Option<ServiceError>>();
        session.send(b"x".to_vec(), true, Box::new(move |error| {
            send_done.complete(error);
        }));
        assert_eq!(sent.wait().unwrap().domain, ErrorDomain::Posix);
    }

    #[test]
    fn test_session_counter_tracks_creations() {
        let provider = LoopbackProvider::new();
        let counter = provider.session_counter();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        let _first = provider
            .create_session(&peer(), SessionParameters::default(), test_queue())
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
