//! Native cross-context message channel.
//!
//! Preferred variant wherever the host exposes native message passing. The
//! engine's single process-wide inbound listener is registered at attach
//! time and feeds received envelopes straight into the dispatcher. Messages
//! to one target arrive in send order on this channel.

use crate::envelope::Envelope;
use crate::host::{Host, MessagePorts};
use crate::transport::{Transport, TransportError, TransportKind};

/// Transport over the host's native messaging surface.
pub struct NativeChannel<H: Host> {
    ports: H::Ports,
}

impl<H: Host> NativeChannel<H> {
    /// Create a channel bound to the host's message ports.
    pub fn new(host: &H) -> Self {
        Self {
            ports: host.ports().clone(),
        }
    }
}

impl<H: Host> Transport<H> for NativeChannel<H> {
    fn kind(&self) -> TransportKind {
        TransportKind::Native
    }

    fn send(&self, target: &str, envelope: &Envelope) -> Result<(), TransportError> {
        let raw = envelope.to_wire().map_err(|e| TransportError::SendFailed {
            message: e.to_string(),
        })?;
        self.ports.post_native(target, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimHost;
    use serde_json::json;

    #[test]
    fn test_send_fails_for_unregistered_target() {
        let host = SimHost::new();
        let channel: NativeChannel<SimHost> = NativeChannel::new(&host);
        let envelope = Envelope::new("svc", "a", 0, vec![json!(1)], None);

        let err = channel.send("nobody", &envelope).unwrap_err();
        assert!(matches!(err, TransportError::NoHandle { .. }));
    }
}
