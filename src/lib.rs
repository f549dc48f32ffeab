//! SecLink - a pluggable secure-transport backend
//!
//! # Architecture (Callback-to-Blocking Bridge)
//!
//! ```text
//! filter chain (blocking calls)
//! → TlsBackend contract (connect / send / recv / shutdown)
//! → PlatformBackend (state machine + completion rendezvous)
//! → SecureSession (callback-driven platform service)
//! → serial execution queue (one worker, FIFO per session)
//! ```
//!
//! ## Core Principles
//!
//! - The platform service completes everything asynchronously; the filter
//!   chain expects calls that return only on genuine progress
//! - Every operation bridges the two through one fresh, one-shot rendezvous
//! - The connection handle has exactly one owner; callbacks only borrow
//! - Errors are classified by transport domain into one unified taxonomy
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── backend/         # Backend contract + platform-native implementation
//! ├── service/         # Secure-transport service interface + loopback double
//! ├── queue.rs         # Shared serial execution queue
//! ├── rendezvous.rs    # One-shot completion rendezvous
//! ├── config.rs        # TLS policy consumed by the backend
//! └── error.rs         # Unified error taxonomy
//! ```

// Core types
pub mod config;
pub mod error;

// Concurrency primitives
pub mod queue;
pub mod rendezvous;

// Service interface and backend
pub mod backend;
pub mod service;

// Re-exports for convenience
pub use backend::{
    BackendDescriptor, BackendInfo, Capabilities, ConnectingState, ConnectingStateCell,
    PlatformBackend, TlsBackend, PLATFORM_DESCRIPTOR,
};
pub use config::TlsConfig;
pub use error::{Error, Result};
pub use service::{Endpoint, SecureProvider, SecureSession};
