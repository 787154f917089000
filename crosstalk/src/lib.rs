//! # Crosstalk
//!
//! Cross-context message passing for independently loaded execution contexts
//! that share no heap and potentially no origin.
//!
//! This crate provides:
//! - **Engine**: service registration, calls with one-shot reply correlation
//! - **Transports**: four delivery mechanisms probed once at startup, with a
//!   per-call relay fallback
//! - **Relay framing**: chunked payloads over URL fragments, reassembled out
//!   of order
//! - **Host providers**: traits abstracting the embedding environment, with
//!   a deterministic [`SimHost`](sim::SimHost) for tests
//!
//! Delivery is best-effort with a single fallback chain; payload semantics
//! and anything beyond opaque shared-secret comparison are out of scope.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Pending-call correlation store.
pub mod calls;
/// Relay fragment grammar and chunked-payload reassembly.
pub mod chunk;
/// Engine configuration.
pub mod config;
/// Inbound dispatch: parsing, validation, handler invocation.
mod dispatch;
/// Engine facade.
pub mod engine;
/// Envelope construction, wire encoding, and lenient parsing.
pub mod envelope;
/// Error types.
pub mod error;
/// Pooled hidden delivery frames and the popup pull queue.
pub mod frame_pool;
/// Host provider traits abstracting the embedding environment.
pub mod host;
/// Service registry and handler context.
pub mod registry;
/// One-shot reply primitives.
pub mod reply;
/// Deterministic in-memory host for testing.
pub mod sim;
/// Engine operation counters.
pub mod stats;
/// Per-target delivery parameters and auth validation.
pub mod target;
/// Transport strategies and selection.
pub mod transport;

pub use calls::{CallTable, ReplyCallback};
pub use chunk::{ChunkAssembler, Fragment};
pub use config::EngineConfig;
pub use engine::Engine;
pub use envelope::{Envelope, CALLBACK_SERVICE, DEFAULT_SERVICE, PARENT_SENTINEL};
pub use error::EngineError;
pub use host::{ContextEndpoint, FrameHost, FrameId, Host, MessagePorts, Scheduler};
pub use registry::{CallContext, ServiceRegistry};
pub use reply::{ReplyFuture, ReplySlot};
pub use sim::SimHost;
pub use stats::EngineStats;
pub use target::{TargetConfig, TargetTable};
pub use transport::{
    FrameReferenceChannel, NativeChannel, OpaqueHandleChannel, RelayFrameChannel, Transport,
    TransportError, TransportKind, TransportSelector,
};
