//! Inbound processing: raw data → validated envelope → handler invocation.
//!
//! The dispatcher side of the engine. Raw inbound data is parsed leniently
//! (unrelated traffic on a shared channel is ignored, never errored), the
//! sender id is normalized, the auth token validated, and the handler
//! resolved through the service registry. Correlated calls get a one-shot
//! reply slot that re-enters the call path toward the sender with the
//! reserved callback service and the original call id.

use std::rc::Rc;

use serde_json::Value;

use crate::chunk::parse_fragment;
use crate::engine::EngineShared;
use crate::envelope::{normalize_sender, Envelope, CALLBACK_SERVICE};
use crate::error::EngineError;
use crate::host::{Host, Scheduler};
use crate::registry::CallContext;
use crate::reply::ReplySlot;

impl<H: Host> EngineShared<H> {
    /// Parse and dispatch raw inbound data.
    ///
    /// Malformed input is counted and silently ignored. `check_auth` is false
    /// only on the same-domain fast path.
    pub(crate) fn dispatch_raw(self: &Rc<Self>, raw: &str, check_auth: bool) -> Result<(), EngineError> {
        let Some(envelope) = Envelope::parse_lenient(raw) else {
            self.stats.borrow_mut().malformed_dropped += 1;
            tracing::debug!(context = %self.context_id, "unparseable inbound data ignored");
            return Ok(());
        };
        self.dispatch_envelope(envelope, check_auth)
    }

    /// Validate and dispatch a parsed envelope.
    pub(crate) fn dispatch_envelope(
        self: &Rc<Self>,
        envelope: Envelope,
        check_auth: bool,
    ) -> Result<(), EngineError> {
        let from = normalize_sender(&envelope.from);

        if check_auth {
            if let Err(error) = self.targets.validate_inbound(&from, envelope.auth_token.as_ref()) {
                self.stats.borrow_mut().auth_failures += 1;
                return Err(error);
            }
        }

        let Some(handler) = self.registry.resolve(&envelope.service) else {
            tracing::debug!(
                context = %self.context_id,
                service = %envelope.service,
                "no handler for service, message dropped"
            );
            return Ok(());
        };
        self.stats.borrow_mut().envelopes_dispatched += 1;

        let reply = (envelope.call_id != 0).then(|| {
            let weak = Rc::downgrade(self);
            let to = from.clone();
            let call_id = envelope.call_id;
            ReplySlot::new(move |value| {
                if let Some(shared) = weak.upgrade() {
                    shared.call(&to, CALLBACK_SERVICE, None, vec![Value::from(call_id), value]);
                }
            })
        });

        let ctx = CallContext {
            from,
            call_id: envelope.call_id,
            reply,
        };
        let result = handler(&ctx, &envelope.args);

        // Both handler styles work: a returned value fires the slot here, a
        // proactive ctx.reply() already consumed it, so no double-reply.
        if envelope.call_id != 0 {
            if let Some(value) = result {
                ctx.reply(value);
            }
        }
        Ok(())
    }

    /// Relay-channel entry point: store a fragment, dispatch on completion.
    pub(crate) fn receive_fragment(self: &Rc<Self>, raw: &str) -> Result<(), EngineError> {
        self.stats.borrow_mut().fragments_received += 1;

        let Some(fragment) = parse_fragment(raw) else {
            self.stats.borrow_mut().malformed_dropped += 1;
            tracing::debug!(context = %self.context_id, "malformed fragment ignored");
            return Ok(());
        };

        let now = self.host.scheduler().now();
        let evicted = self.assembler.sweep(now);
        self.stats.borrow_mut().reassemblies_evicted += evicted as u64;

        let was_multi_part = fragment.total > 1;
        if let Some(payload) = self.assembler.insert(fragment, now) {
            if was_multi_part {
                self.stats.borrow_mut().reassemblies_completed += 1;
            }
            return self.dispatch_raw(&payload, true);
        }
        Ok(())
    }
}
