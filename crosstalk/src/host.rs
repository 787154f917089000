//! Host provider traits abstracting the embedding environment.
//!
//! The engine never touches the real document, frames, or messaging surface
//! directly. Everything environment-specific sits behind these traits, so the
//! same engine runs against a production host or the deterministic
//! [`SimHost`](crate::sim::SimHost) used in tests.

use std::rc::Rc;
use std::time::Duration;

use crate::envelope::Envelope;
use crate::transport::TransportError;

/// Opaque identifier of a hidden delivery frame.
pub type FrameId = u64;

/// Work deferred to a later scheduler tick.
pub type DeferredTask = Box<dyn FnOnce()>;

/// Inbound surface of one registered execution context.
///
/// An engine registers exactly one endpoint with the host at attach time.
/// The host routes raw channel traffic to `on_message`, relay fragments to
/// `on_fragment`, and same-domain direct deliveries to `deliver_local`.
pub trait ContextEndpoint {
    /// Raw serialized envelope arriving over a message channel.
    fn on_message(&self, raw: &str);

    /// Relay fragment arriving via a frame navigation or pull-queue drain.
    fn on_fragment(&self, fragment: &str);

    /// Same-domain fast-path delivery: the envelope crosses without
    /// serialization and without the auth-token check.
    fn deliver_local(&self, envelope: Envelope);
}

/// Provider for deferring work to the next event-loop turn.
pub trait Scheduler: Clone + 'static {
    /// Queue work for a later tick. Never runs synchronously.
    fn defer(&self, task: DeferredTask);

    /// Current host time, used for reassembly-buffer aging.
    fn now(&self) -> Duration;
}

/// Provider for hidden delivery frames.
pub trait FrameHost: Clone + 'static {
    /// Create an invisible zero-size frame, returning its id.
    fn create_frame(&self) -> FrameId;

    /// Navigate a frame. `on_load` fires when the navigation completes.
    fn navigate(&self, frame: FrameId, url: &str, on_load: DeferredTask);

    /// Remove a frame from the document.
    fn dispose(&self, frame: FrameId);

    /// Whether frames can safely be navigated again after use. Hosts where
    /// re-navigation is unsafe get fresh frames every time.
    fn recycling_safe(&self) -> bool;

    /// Whether the target context can be reached by frame navigation at all.
    /// Child popups outside the document tree are not.
    fn frame_reachable(&self, target: &str) -> bool;
}

/// Provider for direct message channels between contexts.
pub trait MessagePorts: Clone + 'static {
    /// Register the inbound endpoint for a context id. Called once per
    /// engine at attach time.
    fn register_context(&self, id: &str, endpoint: Rc<dyn ContextEndpoint>);

    /// Whether native cross-context messaging is available.
    fn native_available(&self) -> bool;

    /// Deliver a serialized envelope over the native channel.
    fn post_native(&self, target: &str, raw: &str) -> Result<(), TransportError>;

    /// Whether the historical trusted-handle channel is available.
    fn opaque_available(&self) -> bool;

    /// Deliver a serialized envelope over the trusted-handle channel.
    fn post_opaque(&self, target: &str, raw: &str) -> Result<(), TransportError>;

    /// Whether parent/child function-reference delivery is available.
    fn frame_refs_available(&self) -> bool;

    /// Function-reference handle into the target context, if obtainable.
    fn frame_handle(&self, target: &str) -> Option<Rc<dyn ContextEndpoint>>;

    /// Direct dispatch handle into a same-domain target context.
    fn direct_handle(&self, target: &str) -> Option<Rc<dyn ContextEndpoint>>;
}

/// Bundle of the three provider types for a runtime environment.
///
/// Associated types keep everything statically dispatched; accessor methods
/// give convenient access to the individual providers.
pub trait Host: Clone + 'static {
    /// Scheduler provider type.
    type Scheduler: Scheduler;
    /// Frame provider type.
    type Frames: FrameHost;
    /// Message-channel provider type.
    type Ports: MessagePorts;

    /// Get the scheduler provider.
    fn scheduler(&self) -> &Self::Scheduler;

    /// Get the frame provider.
    fn frames(&self) -> &Self::Frames;

    /// Get the message-channel provider.
    fn ports(&self) -> &Self::Ports;
}
