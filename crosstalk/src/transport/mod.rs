//! Transport strategies for moving envelopes between contexts.
//!
//! Exactly one delivery mechanism is chosen per engine, by probing host
//! capabilities in priority order at startup; the choice is frozen and never
//! re-evaluated per call. The relay frame channel is additionally kept around
//! as the universal call-site fallback.

mod frame_ref;
mod native;
mod opaque;
mod relay;

pub use frame_ref::FrameReferenceChannel;
pub use native::NativeChannel;
pub use opaque::OpaqueHandleChannel;
pub use relay::RelayFrameChannel;

use std::rc::Rc;

use crate::envelope::Envelope;
use crate::host::{Host, MessagePorts};

/// The four delivery mechanisms, in probe priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Native cross-context message passing.
    Native,
    /// Historical same-process trusted-handle channel.
    OpaqueHandle,
    /// Parent/child function-reference delivery.
    FrameReference,
    /// Hidden-frame navigation to a relay resource; the universal fallback.
    RelayFrame,
}

impl TransportKind {
    /// Short name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Native => "native",
            TransportKind::OpaqueHandle => "opaque-handle",
            TransportKind::FrameReference => "frame-reference",
            TransportKind::RelayFrame => "relay-frame",
        }
    }
}

/// Errors raised by a transport send.
///
/// Internal to the engine: the call site catches every variant and retries
/// once through the relay channel; nothing here reaches the facade.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// No live handle into the target context.
    #[error("no live handle for target {target:?}")]
    NoHandle {
        /// The unreachable target id.
        target: String,
    },

    /// The channel is not usable for this target.
    #[error("channel unavailable: {message}")]
    Unavailable {
        /// Details about the unavailability.
        message: String,
    },

    /// The send itself failed.
    #[error("send failed: {message}")]
    SendFailed {
        /// Details about the failure.
        message: String,
    },
}

/// One concrete delivery mechanism.
pub trait Transport<H: Host> {
    /// Which variant this is.
    fn kind(&self) -> TransportKind;

    /// One-time per-target handshake, run eagerly when an auth token is
    /// configured. Most variants need none.
    fn setup(&self, _target: &str) {}

    /// Deliver an envelope to the target context.
    fn send(&self, target: &str, envelope: &Envelope) -> Result<(), TransportError>;
}

/// Probes capabilities once and freezes the delivery choice.
pub struct TransportSelector;

impl TransportSelector {
    /// Probe available mechanisms in priority order.
    pub fn probe<H: Host>(host: &H) -> TransportKind {
        let ports = host.ports();
        if ports.native_available() {
            TransportKind::Native
        } else if ports.opaque_available() {
            TransportKind::OpaqueHandle
        } else if ports.frame_refs_available() {
            TransportKind::FrameReference
        } else {
            TransportKind::RelayFrame
        }
    }

    /// Build the active transport for the probed kind.
    ///
    /// The relay channel instance is shared: when the probe lands on the
    /// fallback itself, no second channel is constructed.
    pub fn select<H: Host>(host: &H, relay: Rc<RelayFrameChannel<H>>) -> Rc<dyn Transport<H>> {
        let kind = Self::probe(host);
        tracing::debug!(transport = kind.as_str(), "delivery mechanism selected");
        match kind {
            TransportKind::Native => Rc::new(NativeChannel::new(host)),
            TransportKind::OpaqueHandle => Rc::new(OpaqueHandleChannel::new(host)),
            TransportKind::FrameReference => Rc::new(FrameReferenceChannel::new(host)),
            TransportKind::RelayFrame => relay,
        }
    }
}
