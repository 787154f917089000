//! One-shot reply primitives.
//!
//! A handler invoked with a nonzero call id gets a [`ReplySlot`]: a single-use
//! channel back to the caller. The slot may be fired proactively from inside
//! the handler, or automatically when the handler returns a value; the
//! fulfilled flag makes double-reply impossible either way.
//!
//! [`ReplyFuture`] is the client-side counterpart used by the
//! `call_with_reply` convenience: a future fulfilled by the pending-call
//! callback when the reply envelope arrives.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;

/// Type alias for the injected reply sender.
type ReplySender = Box<dyn FnOnce(Value)>;

/// One-shot slot for sending a reply to the caller.
///
/// The sender function is injected by the dispatcher and re-enters the call
/// path toward the origin context; the slot only guarantees it runs at most
/// once.
///
/// Uses `Rc<Cell/RefCell>` internally - not thread-safe but efficient for
/// single-threaded event-loop use.
#[derive(Clone)]
pub struct ReplySlot {
    inner: Rc<ReplySlotInner>,
}

struct ReplySlotInner {
    fulfilled: Cell<bool>,
    sender: RefCell<Option<ReplySender>>,
}

impl ReplySlot {
    /// Create a new slot around the given sender function.
    pub fn new<F>(sender: F) -> Self
    where
        F: FnOnce(Value) + 'static,
    {
        Self {
            inner: Rc::new(ReplySlotInner {
                fulfilled: Cell::new(false),
                sender: RefCell::new(Some(Box::new(sender))),
            }),
        }
    }

    /// Send the reply. A second call is a silent no-op.
    pub fn send(&self, value: Value) {
        if self.inner.fulfilled.get() {
            tracing::debug!("reply slot already fulfilled, ignoring duplicate reply");
            return;
        }
        self.inner.fulfilled.set(true);
        if let Some(sender) = self.inner.sender.borrow_mut().take() {
            sender(value);
        }
    }

    /// Whether a reply has already been sent through this slot.
    pub fn is_fulfilled(&self) -> bool {
        self.inner.fulfilled.get()
    }
}

/// Future resolving to the reply of a correlated call.
///
/// Created by `call_with_reply`. Resolves to `None` if the engine is dropped
/// before a reply arrives; there is no built-in timeout - callers race this
/// future against their own timer if they need one.
pub struct ReplyFuture {
    rx: oneshot::Receiver<Value>,
}

impl ReplyFuture {
    /// Create a future from the receiving half of a reply channel.
    pub(crate) fn new(rx: oneshot::Receiver<Value>) -> Self {
        Self { rx }
    }
}

impl Future for ReplyFuture {
    type Output = Option<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(Some(value)),
            Poll::Ready(Err(_)) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
