//! Engine facade: the single public surface for cross-context calls.
//!
//! One engine instance per execution context. The engine owns every table
//! (services, pending calls, target configs, reassembly buffers) and exposes
//! `&self` facade operations; externally it is a cheap-clone handle over
//! shared state, and the host only ever sees its registered endpoint.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::calls::{CallTable, ReplyCallback};
use crate::chunk::ChunkAssembler;
use crate::config::EngineConfig;
use crate::envelope::{normalize_sender, normalize_target, Envelope, CALLBACK_SERVICE};
use crate::error::EngineError;
use crate::host::{ContextEndpoint, Host, MessagePorts, Scheduler};
use crate::registry::{CallContext, ServiceRegistry};
use crate::reply::ReplyFuture;
use crate::stats::EngineStats;
use crate::target::TargetTable;
use crate::transport::{RelayFrameChannel, Transport, TransportKind, TransportSelector};

/// Long-lived engine state, exclusively owned, shared by handle.
pub(crate) struct EngineShared<H: Host> {
    pub(crate) context_id: String,
    pub(crate) host: H,
    pub(crate) registry: ServiceRegistry,
    pub(crate) calls: CallTable,
    pub(crate) targets: Rc<TargetTable>,
    pub(crate) assembler: ChunkAssembler,
    pub(crate) stats: Rc<RefCell<EngineStats>>,
    pub(crate) active: Rc<dyn Transport<H>>,
    pub(crate) relay: Rc<RelayFrameChannel<H>>,
}

impl<H: Host> EngineShared<H> {
    /// Build an envelope and deliver it, fast path first, then the active
    /// transport, then the single synchronous relay fallback.
    pub(crate) fn call(
        self: &Rc<Self>,
        target: &str,
        service: &str,
        callback: Option<ReplyCallback>,
        args: Vec<Value>,
    ) {
        let target = normalize_target(target);
        let call_id = self.calls.issue(callback);
        self.stats.borrow_mut().calls_issued += 1;

        let envelope = Envelope::new(
            service,
            self.context_id.clone(),
            call_id,
            args,
            self.targets.auth_token(&target),
        );

        if self.try_fast_path(&target, &envelope) {
            return;
        }

        if let Err(error) = self.active.send(&target, &envelope) {
            tracing::debug!(
                %error,
                transport = self.active.kind().as_str(),
                dest = %target,
                "active transport failed at call time"
            );
            if self.active.kind() == TransportKind::RelayFrame {
                tracing::warn!(dest = %target, "relay transport failed with no further fallback, message dropped");
                return;
            }
            self.stats.borrow_mut().relay_fallbacks += 1;
            if let Err(error) = self.relay.send(&target, &envelope) {
                tracing::warn!(%error, dest = %target, "relay fallback failed, message dropped");
            }
        }
    }

    /// Same-domain direct delivery: no serialization, no token check, but
    /// handler invocation is still deferred to the next tick so reply
    /// semantics match the transported path.
    fn try_fast_path(self: &Rc<Self>, target: &str, envelope: &Envelope) -> bool {
        if self.targets.same_domain(target) == Some(false) {
            return false;
        }
        let handle = self.host.ports().direct_handle(target);
        if self.targets.same_domain(target).is_none() {
            self.targets.cache_same_domain(target, handle.is_some());
        }
        let Some(handle) = handle else {
            return false;
        };

        let envelope = envelope.clone();
        self.host
            .scheduler()
            .defer(Box::new(move || handle.deliver_local(envelope)));
        true
    }
}

/// The engine's inbound surface, registered once with the host at attach
/// time. Holds only a weak reference: a dropped engine stops receiving.
struct EngineEndpoint<H: Host> {
    shared: Weak<EngineShared<H>>,
}

impl<H: Host> ContextEndpoint for EngineEndpoint<H> {
    fn on_message(&self, raw: &str) {
        if let Some(shared) = self.shared.upgrade() {
            if let Err(error) = shared.dispatch_raw(raw, true) {
                tracing::warn!(%error, context = %shared.context_id, "inbound message dropped");
            }
        }
    }

    fn on_fragment(&self, fragment: &str) {
        if let Some(shared) = self.shared.upgrade() {
            if let Err(error) = shared.receive_fragment(fragment) {
                tracing::warn!(%error, context = %shared.context_id, "inbound fragment dropped");
            }
        }
    }

    fn deliver_local(&self, envelope: Envelope) {
        if let Some(shared) = self.shared.upgrade() {
            // Fast-path deliveries skip the token check by design.
            if let Err(error) = shared.dispatch_envelope(envelope, false) {
                tracing::warn!(%error, context = %shared.context_id, "local delivery dropped");
            }
        }
    }
}

/// Facade over one execution context's messaging engine.
pub struct Engine<H: Host> {
    shared: Rc<EngineShared<H>>,
}

impl<H: Host> Clone for Engine<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<H: Host> Engine<H> {
    /// Create an engine for `context_id` with default configuration.
    pub fn new(host: H, context_id: &str) -> Self {
        Self::with_config(host, context_id, EngineConfig::default())
    }

    /// Create an engine with explicit configuration.
    ///
    /// Probes the host's delivery capabilities exactly once and freezes the
    /// transport choice, then registers the single inbound endpoint.
    pub fn with_config(host: H, context_id: &str, config: EngineConfig) -> Self {
        let stats = Rc::new(RefCell::new(EngineStats::new()));
        let targets = Rc::new(TargetTable::new());
        let relay = Rc::new(RelayFrameChannel::new(
            host.clone(),
            targets.clone(),
            &config,
            stats.clone(),
        ));
        let active = TransportSelector::select(&host, relay.clone());

        let shared = Rc::new(EngineShared {
            context_id: normalize_sender(context_id),
            host: host.clone(),
            registry: ServiceRegistry::new(),
            calls: CallTable::new(),
            targets,
            assembler: ChunkAssembler::new(config.reassembly_ttl),
            stats,
            active,
            relay,
        });

        // The reserved callback service resolves pending calls: args are the
        // original call id and the reply value.
        let weak = Rc::downgrade(&shared);
        shared
            .registry
            .install_reserved(CALLBACK_SERVICE, move |_ctx: &CallContext, args: &[Value]| {
                if let Some(shared) = weak.upgrade() {
                    let call_id = args.first().and_then(Value::as_u64).unwrap_or(0);
                    let value = args.get(1).cloned().unwrap_or(Value::Null);
                    if shared.calls.resolve(call_id, value) {
                        shared.stats.borrow_mut().replies_matched += 1;
                    }
                }
                None
            });

        let endpoint = Rc::new(EngineEndpoint {
            shared: Rc::downgrade(&shared),
        });
        host.ports().register_context(&shared.context_id, endpoint);

        Engine { shared }
    }

    /// Canonical id of this engine's context.
    pub fn context_id(&self) -> &str {
        &self.shared.context_id
    }

    /// Register a service handler.
    ///
    /// # Errors
    ///
    /// [`EngineError::ReservedName`] for the callback and default names.
    pub fn register<F>(&self, name: &str, handler: F) -> Result<(), EngineError>
    where
        F: Fn(&CallContext, &[Value]) -> Option<Value> + 'static,
    {
        self.shared.registry.register(name, handler)
    }

    /// Remove a service handler. Absent names are a no-op.
    ///
    /// # Errors
    ///
    /// [`EngineError::ReservedName`] for the callback and default names.
    pub fn unregister(&self, name: &str) -> Result<(), EngineError> {
        self.shared.registry.unregister(name)
    }

    /// Install the fallback handler for unknown service names.
    pub fn register_default<F>(&self, handler: F)
    where
        F: Fn(&CallContext, &[Value]) -> Option<Value> + 'static,
    {
        self.shared.registry.register_default(handler)
    }

    /// Remove the fallback handler.
    pub fn unregister_default(&self) {
        self.shared.registry.unregister_default()
    }

    /// Invoke `service` on `target`, optionally wiring a one-shot reply
    /// callback. Returns synchronously; delivery and reply are asynchronous
    /// and best-effort. An empty target or the parent sentinel addresses the
    /// container context.
    pub fn call(
        &self,
        target: &str,
        service: &str,
        callback: Option<ReplyCallback>,
        args: Vec<Value>,
    ) {
        self.shared.call(target, service, callback, args)
    }

    /// Like [`Engine::call`] with a callback, but returns a future for the
    /// reply. Resolves to `None` if the engine is dropped before a reply
    /// arrives; there is no built-in timeout.
    pub fn call_with_reply(&self, target: &str, service: &str, args: Vec<Value>) -> ReplyFuture {
        let (tx, rx) = oneshot::channel();
        self.call(
            target,
            service,
            Some(Box::new(move |value| {
                let _ = tx.send(value);
            })),
            args,
        );
        ReplyFuture::new(rx)
    }

    /// Store delivery parameters for a target.
    pub fn set_relay_url(&self, target: &str, url: &str, legacy: bool, multi_part: bool) {
        let target = normalize_target(target);
        self.shared.targets.set_relay_url(&target, url, legacy, multi_part);
    }

    /// Store the shared secret for a target and run the active transport's
    /// one-time handshake for it.
    pub fn set_auth_token(&self, target: &str, token: Value) {
        let target = normalize_target(target);
        self.shared.targets.set_auth_token(&target, token);
        self.shared.active.setup(&target);
    }

    /// Relay-channel delivery entry point.
    ///
    /// # Errors
    ///
    /// [`EngineError::AuthMismatch`] when a completed payload fails token
    /// validation; malformed fragments are silently ignored.
    pub fn receive(&self, fragment: &str) -> Result<(), EngineError> {
        self.shared.receive_fragment(fragment)
    }

    /// Drain fragments queued for an unreachable popup target.
    pub fn drain_pull_queue(&self, target: &str) -> Vec<String> {
        self.shared.relay.drain_pull(target)
    }

    /// Snapshot of the engine's counters.
    pub fn stats(&self) -> EngineStats {
        self.shared.stats.borrow().clone()
    }

    /// Number of calls still awaiting a reply.
    pub fn pending_call_count(&self) -> usize {
        self.shared.calls.pending_count()
    }

    /// Number of hidden delivery frames currently pooled.
    pub fn pooled_frame_count(&self) -> usize {
        self.shared.relay.pooled_frame_count()
    }
}
