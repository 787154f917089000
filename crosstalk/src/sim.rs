//! Deterministic in-memory host for testing.
//!
//! `SimHost` implements every provider trait over one shared state cell and
//! pumps deferred work and frame navigations in FIFO order, so multi-context
//! scenarios run deterministically inside a single test. Capability toggles
//! steer the transport probe; logical time only moves when the pump runs or
//! a test advances it explicitly.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use crate::host::{ContextEndpoint, DeferredTask, FrameHost, FrameId, Host, MessagePorts, Scheduler};
use crate::transport::TransportError;

/// Simulated time consumed per processed pump item.
const TICK: Duration = Duration::from_millis(1);

struct PendingNavigation {
    frame: FrameId,
    url: String,
    on_load: DeferredTask,
}

struct SimHostInner {
    contexts: HashMap<String, Rc<dyn ContextEndpoint>>,
    tasks: VecDeque<DeferredTask>,
    navigations: VecDeque<PendingNavigation>,
    navigated_log: Vec<String>,
    live_frames: HashSet<FrameId>,
    next_frame: FrameId,
    now: Duration,
    native: bool,
    opaque: bool,
    frame_refs: bool,
    recycling_safe: bool,
    same_domain: HashSet<String>,
    unreachable: HashSet<String>,
}

/// Deterministic host shared by every context in a test.
///
/// Cheap-clone handle over `Rc<RefCell<..>>` state.
#[derive(Clone)]
pub struct SimHost {
    inner: Rc<RefCell<SimHostInner>>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    /// Create a host with modern default capabilities: native messaging and
    /// frame references on, the trusted-handle channel off, frame recycling
    /// safe.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SimHostInner {
                contexts: HashMap::new(),
                tasks: VecDeque::new(),
                navigations: VecDeque::new(),
                navigated_log: Vec::new(),
                live_frames: HashSet::new(),
                next_frame: 1,
                now: Duration::ZERO,
                native: true,
                opaque: false,
                frame_refs: true,
                recycling_safe: true,
                same_domain: HashSet::new(),
                unreachable: HashSet::new(),
            })),
        }
    }

    /// Toggle native messaging availability.
    pub fn set_native(&self, available: bool) {
        self.inner.borrow_mut().native = available;
    }

    /// Toggle the historical trusted-handle channel.
    pub fn set_opaque(&self, available: bool) {
        self.inner.borrow_mut().opaque = available;
    }

    /// Toggle frame-reference availability.
    pub fn set_frame_refs(&self, available: bool) {
        self.inner.borrow_mut().frame_refs = available;
    }

    /// Toggle whether used frames may be navigated again.
    pub fn set_recycling_safe(&self, safe: bool) {
        self.inner.borrow_mut().recycling_safe = safe;
    }

    /// Mark a target as same-domain: direct handles become obtainable.
    pub fn set_same_domain(&self, target: &str) {
        self.inner.borrow_mut().same_domain.insert(target.to_string());
    }

    /// Mark a target as unreachable by frame navigation (popup).
    pub fn set_unreachable(&self, target: &str) {
        self.inner.borrow_mut().unreachable.insert(target.to_string());
    }

    /// Advance logical time without processing work.
    pub fn advance(&self, delta: Duration) {
        self.inner.borrow_mut().now += delta;
    }

    /// Number of frames currently in the document.
    pub fn live_frame_count(&self) -> usize {
        self.inner.borrow().live_frames.len()
    }

    /// URLs of every navigation processed so far, in order.
    pub fn navigated_urls(&self) -> Vec<String> {
        self.inner.borrow().navigated_log.clone()
    }

    /// Pump deferred tasks and frame navigations until nothing is queued.
    ///
    /// Tasks drain before navigations, matching an event loop that runs
    /// microtask-deferred work ahead of frame loads. Each processed item
    /// advances logical time by one tick.
    pub fn run_until_idle(&self) {
        enum Item {
            Task(DeferredTask),
            Nav(PendingNavigation),
        }
        loop {
            let item = {
                let mut inner = self.inner.borrow_mut();
                if let Some(task) = inner.tasks.pop_front() {
                    inner.now += TICK;
                    Item::Task(task)
                } else if let Some(nav) = inner.navigations.pop_front() {
                    inner.now += TICK;
                    inner.navigated_log.push(nav.url.clone());
                    Item::Nav(nav)
                } else {
                    return;
                }
            };
            match item {
                Item::Task(task) => task(),
                Item::Nav(nav) => self.deliver_navigation(nav),
            }
        }
    }

    /// Route a completed navigation's fragment to its target context, then
    /// fire the frame's load callback.
    fn deliver_navigation(&self, nav: PendingNavigation) {
        if let Some((_, fragment)) = nav.url.split_once('#') {
            let target = fragment.split('&').next().unwrap_or_default().to_string();
            let endpoint = self.inner.borrow().contexts.get(&target).cloned();
            match endpoint {
                Some(endpoint) => endpoint.on_fragment(fragment),
                None => {
                    tracing::debug!(dest = %target, "navigation fragment for unknown context dropped")
                }
            }
        } else {
            tracing::debug!(url = %nav.url, frame = nav.frame, "navigation carried no fragment");
        }
        (nav.on_load)();
    }
}

impl Scheduler for SimHost {
    fn defer(&self, task: DeferredTask) {
        self.inner.borrow_mut().tasks.push_back(task);
    }

    fn now(&self) -> Duration {
        self.inner.borrow().now
    }
}

impl FrameHost for SimHost {
    fn create_frame(&self) -> FrameId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_frame;
        inner.next_frame += 1;
        inner.live_frames.insert(id);
        id
    }

    fn navigate(&self, frame: FrameId, url: &str, on_load: DeferredTask) {
        self.inner.borrow_mut().navigations.push_back(PendingNavigation {
            frame,
            url: url.to_string(),
            on_load,
        });
    }

    fn dispose(&self, frame: FrameId) {
        self.inner.borrow_mut().live_frames.remove(&frame);
    }

    fn recycling_safe(&self) -> bool {
        self.inner.borrow().recycling_safe
    }

    fn frame_reachable(&self, target: &str) -> bool {
        !self.inner.borrow().unreachable.contains(target)
    }
}

impl MessagePorts for SimHost {
    fn register_context(&self, id: &str, endpoint: Rc<dyn ContextEndpoint>) {
        self.inner.borrow_mut().contexts.insert(id.to_string(), endpoint);
    }

    fn native_available(&self) -> bool {
        self.inner.borrow().native
    }

    fn post_native(&self, target: &str, raw: &str) -> Result<(), TransportError> {
        if !self.native_available() {
            return Err(TransportError::Unavailable {
                message: "native messaging disabled".to_string(),
            });
        }
        let endpoint = self.inner.borrow().contexts.get(target).cloned();
        let endpoint = endpoint.ok_or_else(|| TransportError::NoHandle {
            target: target.to_string(),
        })?;
        let raw = raw.to_string();
        // Delivery is asynchronous but FIFO per queue, preserving send order.
        self.defer(Box::new(move || endpoint.on_message(&raw)));
        Ok(())
    }

    fn opaque_available(&self) -> bool {
        self.inner.borrow().opaque
    }

    fn post_opaque(&self, target: &str, raw: &str) -> Result<(), TransportError> {
        if !self.opaque_available() {
            return Err(TransportError::Unavailable {
                message: "trusted-handle channel disabled".to_string(),
            });
        }
        let endpoint = self.inner.borrow().contexts.get(target).cloned();
        let endpoint = endpoint.ok_or_else(|| TransportError::NoHandle {
            target: target.to_string(),
        })?;
        let raw = raw.to_string();
        self.defer(Box::new(move || endpoint.on_message(&raw)));
        Ok(())
    }

    fn frame_refs_available(&self) -> bool {
        self.inner.borrow().frame_refs
    }

    fn frame_handle(&self, target: &str) -> Option<Rc<dyn ContextEndpoint>> {
        let inner = self.inner.borrow();
        if !inner.frame_refs {
            return None;
        }
        inner.contexts.get(target).cloned()
    }

    fn direct_handle(&self, target: &str) -> Option<Rc<dyn ContextEndpoint>> {
        let inner = self.inner.borrow();
        if !inner.same_domain.contains(target) {
            return None;
        }
        inner.contexts.get(target).cloned()
    }
}

impl Host for SimHost {
    type Scheduler = SimHost;
    type Frames = SimHost;
    type Ports = SimHost;

    fn scheduler(&self) -> &Self::Scheduler {
        self
    }

    fn frames(&self) -> &Self::Frames {
        self
    }

    fn ports(&self) -> &Self::Ports {
        self
    }
}
