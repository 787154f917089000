//! ServiceRegistry: name → handler routing.
//!
//! Routes dispatched envelopes by service name to registered handlers.
//! Resolution order: exact name match, then the default handler, then the
//! message is dropped with no observable error.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::envelope::{CALLBACK_SERVICE, DEFAULT_SERVICE};
use crate::error::EngineError;
use crate::reply::ReplySlot;

/// Execution context handed to every service handler.
///
/// Carries the sender's canonical id and, for correlated calls, a one-shot
/// reply slot. Handlers may reply proactively through [`CallContext::reply`]
/// or simply return a value and let the dispatcher fire the slot.
pub struct CallContext {
    /// Canonical id of the calling context.
    pub from: String,
    /// Correlation id of the call, 0 for fire-and-forget.
    pub call_id: u64,
    pub(crate) reply: Option<ReplySlot>,
}

impl CallContext {
    /// Send a reply to the caller. No-op for fire-and-forget calls and for
    /// calls that were already replied to.
    pub fn reply(&self, value: Value) {
        match &self.reply {
            Some(slot) => slot.send(value),
            None => tracing::debug!(from = %self.from, "reply requested for uncorrelated call"),
        }
    }

    /// Whether the caller supplied a callback and no reply has fired yet.
    pub fn can_reply(&self) -> bool {
        self.reply.as_ref().is_some_and(|slot| !slot.is_fulfilled())
    }
}

/// Handler signature for registered services.
///
/// Invoked with the call context and positional args. Returning `Some(value)`
/// on a correlated call sends that value back automatically.
pub type ServiceFn = dyn Fn(&CallContext, &[Value]) -> Option<Value>;

/// Maps service names to handlers, with a fallback default slot.
///
/// The callback service and the empty default name are reserved: the engine
/// installs the callback receiver itself, and the default slot is managed
/// through `register_default`/`unregister_default` only.
pub struct ServiceRegistry {
    services: RefCell<HashMap<String, Rc<ServiceFn>>>,
    default_handler: RefCell<Option<Rc<ServiceFn>>>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            services: RefCell::new(HashMap::new()),
            default_handler: RefCell::new(None),
        }
    }

    fn is_reserved(name: &str) -> bool {
        name == CALLBACK_SERVICE || name == DEFAULT_SERVICE
    }

    /// Register a handler under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ReservedName`] for the built-in names.
    pub fn register<F>(&self, name: &str, handler: F) -> Result<(), EngineError>
    where
        F: Fn(&CallContext, &[Value]) -> Option<Value> + 'static,
    {
        if Self::is_reserved(name) {
            return Err(EngineError::ReservedName {
                name: name.to_string(),
            });
        }
        self.services
            .borrow_mut()
            .insert(name.to_string(), Rc::new(handler));
        Ok(())
    }

    /// Remove a handler. Removing an absent name is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ReservedName`] for the built-in names.
    pub fn unregister(&self, name: &str) -> Result<(), EngineError> {
        if Self::is_reserved(name) {
            return Err(EngineError::ReservedName {
                name: name.to_string(),
            });
        }
        self.services.borrow_mut().remove(name);
        Ok(())
    }

    /// Install the fallback handler invoked for unknown service names.
    pub fn register_default<F>(&self, handler: F)
    where
        F: Fn(&CallContext, &[Value]) -> Option<Value> + 'static,
    {
        *self.default_handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Remove the fallback handler.
    pub fn unregister_default(&self) {
        *self.default_handler.borrow_mut() = None;
    }

    /// Install a reserved built-in service, bypassing the reserved-name check.
    ///
    /// Only the engine uses this, for the callback receiver.
    pub(crate) fn install_reserved<F>(&self, name: &str, handler: F)
    where
        F: Fn(&CallContext, &[Value]) -> Option<Value> + 'static,
    {
        self.services
            .borrow_mut()
            .insert(name.to_string(), Rc::new(handler));
    }

    /// Resolve a service name: exact match, else the default handler.
    pub fn resolve(&self, name: &str) -> Option<Rc<ServiceFn>> {
        if let Some(handler) = self.services.borrow().get(name) {
            return Some(Rc::clone(handler));
        }
        self.default_handler.borrow().clone()
    }

    /// Number of explicitly registered services (reserved entries included).
    pub fn service_count(&self) -> usize {
        self.services.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> impl Fn(&CallContext, &[Value]) -> Option<Value> {
        |_, _| None
    }

    fn tagged(tag: &'static str) -> impl Fn(&CallContext, &[Value]) -> Option<Value> {
        move |_, _| Some(Value::String(tag.to_string()))
    }

    fn invoke(registry: &ServiceRegistry, name: &str) -> Option<Value> {
        let ctx = CallContext {
            from: "peer".to_string(),
            call_id: 0,
            reply: None,
        };
        registry.resolve(name).and_then(|h| h(&ctx, &[]))
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = ServiceRegistry::new();
        registry.register("echo", tagged("echo")).expect("register");

        assert_eq!(invoke(&registry, "echo"), Some(Value::String("echo".into())));
        assert!(registry.resolve("missing").is_none());
    }

    #[test]
    fn test_reserved_names_rejected() {
        let registry = ServiceRegistry::new();

        let err = registry.register(CALLBACK_SERVICE, noop()).unwrap_err();
        assert!(matches!(err, EngineError::ReservedName { .. }));

        let err = registry.register(DEFAULT_SERVICE, noop()).unwrap_err();
        assert!(matches!(err, EngineError::ReservedName { .. }));

        let err = registry.unregister(CALLBACK_SERVICE).unwrap_err();
        assert!(matches!(err, EngineError::ReservedName { .. }));
    }

    #[test]
    fn test_unregister_absent_is_noop() {
        let registry = ServiceRegistry::new();
        registry.unregister("never-registered").expect("no-op");
    }

    #[test]
    fn test_unregistered_name_falls_back_to_default() {
        let registry = ServiceRegistry::new();
        registry.register("a", tagged("f")).expect("register");
        registry.register_default(tagged("d"));
        registry.unregister("a").expect("unregister");

        assert_eq!(invoke(&registry, "a"), Some(Value::String("d".into())));
    }

    #[test]
    fn test_reregistration_replaces_only_that_entry() {
        let registry = ServiceRegistry::new();
        registry.register("a", tagged("f1")).expect("register");
        registry.register("b", tagged("f2")).expect("register");

        registry.unregister("a").expect("unregister");
        registry.register("a", tagged("f3")).expect("register");

        assert_eq!(invoke(&registry, "a"), Some(Value::String("f3".into())));
        assert_eq!(invoke(&registry, "b"), Some(Value::String("f2".into())));
    }

    #[test]
    fn test_default_handler_removal() {
        let registry = ServiceRegistry::new();
        registry.register_default(tagged("d"));
        assert!(registry.resolve("anything").is_some());

        registry.unregister_default();
        assert!(registry.resolve("anything").is_none());
    }

    #[test]
    fn test_install_reserved_bypasses_check() {
        let registry = ServiceRegistry::new();
        registry.install_reserved(CALLBACK_SERVICE, tagged("cb"));
        assert!(registry.resolve(CALLBACK_SERVICE).is_some());
    }

    #[test]
    fn test_context_without_slot_cannot_reply() {
        let ctx = CallContext {
            from: "peer".to_string(),
            call_id: 0,
            reply: None,
        };
        assert!(!ctx.can_reply());
        ctx.reply(Value::Null); // must not panic
    }
}
