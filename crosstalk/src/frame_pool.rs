//! Pooled hidden frames for relay delivery, plus the popup pull queue.
//!
//! Every relay send navigates a hidden frame to the target's relay resource.
//! Frames are pooled: an entry whose previous navigation completed is reused
//! instead of creating a fresh one, except on hosts where re-navigating a
//! used frame is unsafe, where completed entries are discarded. Navigation is
//! always deferred to the next scheduler tick so it never disturbs caller
//! execution.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::host::{FrameHost, FrameId, Host, Scheduler};
use crate::stats::EngineStats;

struct PooledFrame {
    id: FrameId,
    /// Set by the frame's load callback once its navigation completes.
    recyclable: Rc<Cell<bool>>,
    /// Cleared on eviction; a late load callback must not touch an evicted
    /// entry.
    alive: Rc<Cell<bool>>,
}

/// Bounded set of reusable hidden delivery frames.
pub struct FramePool<H: Host> {
    host: H,
    frames: RefCell<Vec<PooledFrame>>,
    soft_cap: usize,
    stats: Rc<RefCell<EngineStats>>,
}

impl<H: Host> FramePool<H> {
    /// Create an empty pool.
    pub fn new(host: H, soft_cap: usize, stats: Rc<RefCell<EngineStats>>) -> Self {
        Self {
            host,
            frames: RefCell::new(Vec::new()),
            soft_cap,
            stats,
        }
    }

    /// Navigate a pooled frame to `url` on the next scheduler tick.
    pub fn emit(&self, url: String) {
        let (id, recyclable, alive) = self.acquire();
        recyclable.set(false);

        let frames = self.host.frames().clone();
        self.host.scheduler().defer(Box::new(move || {
            if !alive.get() {
                return;
            }
            let alive_for_load = alive.clone();
            frames.navigate(
                id,
                &url,
                Box::new(move || {
                    if alive_for_load.get() {
                        recyclable.set(true);
                    }
                }),
            );
        }));
    }

    /// Find a reusable frame or create a new one.
    fn acquire(&self) -> (FrameId, Rc<Cell<bool>>, Rc<Cell<bool>>) {
        let mut frames = self.frames.borrow_mut();

        if self.host.frames().recycling_safe() {
            if let Some(entry) = frames.iter().find(|f| f.recyclable.get()) {
                self.stats.borrow_mut().frames_reused += 1;
                return (entry.id, entry.recyclable.clone(), entry.alive.clone());
            }
        } else {
            // Re-navigation is unsafe here: evict completed frames rather
            // than reuse them.
            frames.retain(|entry| {
                if entry.recyclable.get() {
                    entry.alive.set(false);
                    self.host.frames().dispose(entry.id);
                    false
                } else {
                    true
                }
            });
        }

        let id = self.host.frames().create_frame();
        self.stats.borrow_mut().frames_created += 1;
        if frames.len() + 1 > self.soft_cap {
            tracing::warn!(
                live = frames.len() + 1,
                soft_cap = self.soft_cap,
                "delivery frame pool exceeds its soft cap"
            );
        }
        let entry = PooledFrame {
            id,
            recyclable: Rc::new(Cell::new(false)),
            alive: Rc::new(Cell::new(true)),
        };
        let handles = (entry.id, entry.recyclable.clone(), entry.alive.clone());
        frames.push(entry);
        handles
    }

    /// Number of frames currently owned by the pool.
    pub fn live_count(&self) -> usize {
        self.frames.borrow().len()
    }
}

/// Capped per-target queues for popup contexts unreachable by frame
/// navigation. The popup drains its queue through the engine facade.
pub struct PullQueue {
    queues: RefCell<HashMap<String, VecDeque<String>>>,
    capacity: usize,
    stats: Rc<RefCell<EngineStats>>,
}

impl PullQueue {
    /// Create an empty queue set with the given per-target capacity.
    pub fn new(capacity: usize, stats: Rc<RefCell<EngineStats>>) -> Self {
        Self {
            queues: RefCell::new(HashMap::new()),
            capacity,
            stats,
        }
    }

    /// Append a fragment for the target, evicting the oldest at capacity.
    pub fn push(&self, target: &str, fragment: String) {
        let mut queues = self.queues.borrow_mut();
        let queue = queues.entry(target.to_string()).or_default();
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.stats.borrow_mut().pull_queue_evictions += 1;
            tracing::debug!(dest = %target, "pull queue at capacity, evicted oldest entry");
        }
        queue.push_back(fragment);
    }

    /// Remove and return everything queued for the target.
    pub fn drain(&self, target: &str) -> Vec<String> {
        self.queues
            .borrow_mut()
            .remove(target)
            .map(|queue| queue.into_iter().collect())
            .unwrap_or_default()
    }

    /// Number of fragments queued for the target.
    pub fn queued_count(&self, target: &str) -> usize {
        self.queues.borrow().get(target).map_or(0, VecDeque::len)
    }
}
