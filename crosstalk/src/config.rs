//! Configuration for engine behavior and resource ceilings.

use std::time::Duration;

/// Tunables for one engine instance.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Maximum entries in the pull queue of an unreachable popup target.
    /// The oldest entry is evicted when the cap is hit.
    pub pull_queue_capacity: usize,

    /// Idle time after which an incomplete reassembly buffer is evicted.
    pub reassembly_ttl: Duration,

    /// Maximum encoded chunk length carried by one relay fragment.
    pub max_fragment_chunk: usize,

    /// Advisory ceiling on live delivery frames; exceeding it is logged,
    /// not enforced.
    pub frame_pool_soft_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pull_queue_capacity: 20,
            reassembly_ttl: Duration::from_secs(60),
            max_fragment_chunk: 1400,
            frame_pool_soft_cap: 8,
        }
    }
}

impl EngineConfig {
    /// Configuration for hosts with small URL ceilings.
    pub fn tight_urls() -> Self {
        Self {
            max_fragment_chunk: 500,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.pull_queue_capacity, 20);
        assert_eq!(config.reassembly_ttl, Duration::from_secs(60));
        assert!(config.max_fragment_chunk > 0);
    }

    #[test]
    fn test_tight_urls_preset() {
        let config = EngineConfig::tight_urls();
        assert!(config.max_fragment_chunk < EngineConfig::default().max_fragment_chunk);
        assert_eq!(config.pull_queue_capacity, 20);
    }
}
