//! Parent/child function-reference channel.
//!
//! Delivery through a function reference obtained across the frame
//! boundary. Unlike the same-domain fast path, the envelope still crosses in
//! serialized form and the receiver still validates the auth token.

use crate::envelope::Envelope;
use crate::host::{Host, MessagePorts};
use crate::transport::{Transport, TransportError, TransportKind};

/// Transport over cross-frame function references.
pub struct FrameReferenceChannel<H: Host> {
    ports: H::Ports,
}

impl<H: Host> FrameReferenceChannel<H> {
    /// Create a channel bound to the host's message ports.
    pub fn new(host: &H) -> Self {
        Self {
            ports: host.ports().clone(),
        }
    }
}

impl<H: Host> Transport<H> for FrameReferenceChannel<H> {
    fn kind(&self) -> TransportKind {
        TransportKind::FrameReference
    }

    fn send(&self, target: &str, envelope: &Envelope) -> Result<(), TransportError> {
        let handle = self
            .ports
            .frame_handle(target)
            .ok_or_else(|| TransportError::NoHandle {
                target: target.to_string(),
            })?;
        let raw = envelope.to_wire().map_err(|e| TransportError::SendFailed {
            message: e.to_string(),
        })?;
        handle.on_message(&raw);
        Ok(())
    }
}
