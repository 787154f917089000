//! RelayFrameChannel: the universal fallback transport.
//!
//! The envelope is serialized, percent-encoded, split into fragments when
//! multi-part is enabled for the target, and each fragment is delivered by
//! navigating a pooled hidden frame to `<relay_url>#<fragment>`. Targets the
//! host cannot reach by frame navigation (child popups) get their fragments
//! queued for polling instead.

use std::cell::RefCell;
use std::rc::Rc;

use crate::chunk::encode_fragments;
use crate::config::EngineConfig;
use crate::envelope::Envelope;
use crate::frame_pool::{FramePool, PullQueue};
use crate::host::{FrameHost, Host};
use crate::stats::EngineStats;
use crate::target::TargetTable;
use crate::transport::{Transport, TransportError, TransportKind};

/// Fallback transport delivering fragments via hidden frame navigation.
pub struct RelayFrameChannel<H: Host> {
    host: H,
    frame_pool: FramePool<H>,
    pull: PullQueue,
    targets: Rc<TargetTable>,
    max_fragment_chunk: usize,
}

impl<H: Host> RelayFrameChannel<H> {
    /// Create the channel and its frame pool.
    pub fn new(
        host: H,
        targets: Rc<TargetTable>,
        config: &EngineConfig,
        stats: Rc<RefCell<EngineStats>>,
    ) -> Self {
        Self {
            frame_pool: FramePool::new(host.clone(), config.frame_pool_soft_cap, stats.clone()),
            pull: PullQueue::new(config.pull_queue_capacity, stats),
            host,
            targets,
            max_fragment_chunk: config.max_fragment_chunk,
        }
    }

    /// Drain the pull queue of an unreachable popup target.
    pub fn drain_pull(&self, target: &str) -> Vec<String> {
        self.pull.drain(target)
    }

    /// Number of delivery frames currently pooled.
    pub fn pooled_frame_count(&self) -> usize {
        self.frame_pool.live_count()
    }
}

impl<H: Host> Transport<H> for RelayFrameChannel<H> {
    fn kind(&self) -> TransportKind {
        TransportKind::RelayFrame
    }

    fn send(&self, target: &str, envelope: &Envelope) -> Result<(), TransportError> {
        let config = self.targets.config(target);

        let payload = if config.use_legacy_protocol {
            envelope.to_wire_legacy()
        } else {
            envelope.to_wire()
        }
        .map_err(|e| TransportError::SendFailed {
            message: e.to_string(),
        })?;

        // The legacy protocol predates packet framing.
        let multi_part = config.use_multi_part && !config.use_legacy_protocol;
        let fragments = encode_fragments(
            target,
            &envelope.from,
            envelope.call_id,
            &payload,
            multi_part,
            self.max_fragment_chunk,
        );

        if !self.host.frames().frame_reachable(target) {
            tracing::debug!(dest = %target, count = fragments.len(), "target unreachable, queueing for poll");
            for fragment in fragments {
                self.pull.push(target, fragment);
            }
            return Ok(());
        }

        let relay_url = config
            .relay_url
            .ok_or_else(|| TransportError::Unavailable {
                message: format!("no relay url configured for target {target:?}"),
            })?;

        for fragment in fragments {
            self.frame_pool.emit(format!("{relay_url}#{fragment}"));
        }
        Ok(())
    }
}
