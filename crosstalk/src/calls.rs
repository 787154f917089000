//! CallTable: pending-callback correlation store.
//!
//! Callbacks are keyed by a strictly increasing call id issued at call time.
//! An entry exists only while its reply is outstanding: the first matching
//! resolution removes and invokes it, later duplicates are no-ops. There is
//! no timeout; an entry whose reply never arrives simply persists.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use serde_json::Value;

/// Callback invoked with the reply value of a correlated call.
pub type ReplyCallback = Box<dyn FnOnce(Value)>;

/// Correlation store for pending calls.
///
/// Uses `Cell`/`RefCell` interior mutability so the owning engine can expose
/// `&self` facade methods in its single-threaded context.
pub struct CallTable {
    /// Next id handed out to a correlated call. Ids start at 1; 0 is the
    /// fire-and-forget marker and never stored.
    next_id: Cell<u64>,
    pending: RefCell<HashMap<u64, ReplyCallback>>,
}

impl Default for CallTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            pending: RefCell::new(HashMap::new()),
        }
    }

    /// Issue a call id for the given callback.
    ///
    /// With a callback, returns a fresh id (strictly increasing from 1) and
    /// stores the entry. Without one, returns 0 and stores nothing.
    pub fn issue(&self, callback: Option<ReplyCallback>) -> u64 {
        match callback {
            Some(callback) => {
                let id = self.next_id.get();
                self.next_id.set(id + 1);
                self.pending.borrow_mut().insert(id, callback);
                id
            }
            None => 0,
        }
    }

    /// Resolve a pending call, invoking and discarding its callback.
    ///
    /// Returns whether a callback ran. Resolving an unknown or already
    /// resolved id is a no-op, so duplicate replies are harmless.
    pub fn resolve(&self, call_id: u64, value: Value) -> bool {
        let callback = self.pending.borrow_mut().remove(&call_id);
        match callback {
            Some(callback) => {
                callback(value);
                true
            }
            None => {
                tracing::debug!(call_id, "reply for unknown or already resolved call");
                false
            }
        }
    }

    /// Number of calls still awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Whether a specific call id is still pending.
    pub fn has_pending(&self, call_id: u64) -> bool {
        self.pending.borrow().contains_key(&call_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<Value>>>, ReplyCallback) {
        let seen: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        (seen, Box::new(move |v| seen_clone.borrow_mut().push(v)))
    }

    #[test]
    fn test_ids_strictly_increasing_from_one() {
        let table = CallTable::new();
        let (_, cb1) = recorder();
        let (_, cb2) = recorder();
        let (_, cb3) = recorder();

        assert_eq!(table.issue(Some(cb1)), 1);
        assert_eq!(table.issue(Some(cb2)), 2);
        assert_eq!(table.issue(Some(cb3)), 3);
    }

    #[test]
    fn test_fire_and_forget_uses_zero_and_stores_nothing() {
        let table = CallTable::new();
        assert_eq!(table.issue(None), 0);
        assert_eq!(table.pending_count(), 0);

        // The counter is not consumed by fire-and-forget calls.
        let (_, cb) = recorder();
        assert_eq!(table.issue(Some(cb)), 1);
    }

    #[test]
    fn test_resolve_invokes_and_discards() {
        let table = CallTable::new();
        let (seen, cb) = recorder();
        let id = table.issue(Some(cb));

        assert!(table.resolve(id, json!("pong")));
        assert_eq!(*seen.borrow(), vec![json!("pong")]);
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn test_duplicate_resolve_is_noop() {
        let table = CallTable::new();
        let (seen, cb) = recorder();
        let id = table.issue(Some(cb));

        assert!(table.resolve(id, json!(1)));
        assert!(!table.resolve(id, json!(2)));
        assert_eq!(*seen.borrow(), vec![json!(1)]);
    }

    #[test]
    fn test_concurrent_calls_resolve_independently() {
        let table = CallTable::new();
        let (seen1, cb1) = recorder();
        let (seen2, cb2) = recorder();
        let id1 = table.issue(Some(cb1));
        let id2 = table.issue(Some(cb2));

        assert!(table.resolve(id2, json!("second")));
        assert!(seen1.borrow().is_empty());
        assert_eq!(*seen2.borrow(), vec![json!("second")]);
        assert!(table.has_pending(id1));
        assert!(!table.has_pending(id2));
    }

    #[test]
    fn test_resolve_unknown_id_is_noop() {
        let table = CallTable::new();
        assert!(!table.resolve(99, json!("lost")));
    }

    #[test]
    fn test_unresolved_entry_persists() {
        let table = CallTable::new();
        let (_, cb) = recorder();
        let id = table.issue(Some(cb));

        // No timeout exists; the entry stays until resolved.
        assert!(table.has_pending(id));
        assert_eq!(table.pending_count(), 1);
    }
}
