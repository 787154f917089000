//! Historical same-process trusted-handle channel.
//!
//! A relic of platforms that allowed passing an opaque trusted handle
//! between same-process contexts. Modeled as a complete variant for
//! completeness, but modern hosts report it unavailable, so the selector
//! never chooses it outside of tests that force the capability on.

use crate::envelope::Envelope;
use crate::host::{Host, MessagePorts};
use crate::transport::{Transport, TransportError, TransportKind};

/// Transport over the host's trusted-handle surface.
pub struct OpaqueHandleChannel<H: Host> {
    ports: H::Ports,
}

impl<H: Host> OpaqueHandleChannel<H> {
    /// Create a channel bound to the host's message ports.
    pub fn new(host: &H) -> Self {
        Self {
            ports: host.ports().clone(),
        }
    }
}

impl<H: Host> Transport<H> for OpaqueHandleChannel<H> {
    fn kind(&self) -> TransportKind {
        TransportKind::OpaqueHandle
    }

    fn send(&self, target: &str, envelope: &Envelope) -> Result<(), TransportError> {
        let raw = envelope.to_wire().map_err(|e| TransportError::SendFailed {
            message: e.to_string(),
        })?;
        self.ports.post_opaque(target, &raw)
    }
}
