//! Per-target delivery parameters and shared-secret validation.

use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::Value;

use crate::envelope::tokens_match;
use crate::error::EngineError;

/// Delivery parameters for one remote context.
///
/// Created lazily the first time a relay URL or auth token is configured for
/// the target, and never torn down afterwards.
#[derive(Debug, Clone, Default)]
pub struct TargetConfig {
    /// Same-origin relay resource navigated to by the relay transport.
    pub relay_url: Option<String>,
    /// Opaque shared secret expected on inbound envelopes from this target.
    pub auth_token: Option<Value>,
    /// Whether the target speaks the legacy positional protocol.
    pub use_legacy_protocol: bool,
    /// Whether oversized relay payloads may be split into indexed packets.
    pub use_multi_part: bool,
    /// Cached outcome of the first same-domain direct-handle attempt.
    pub same_domain: Option<bool>,
}

/// Table of per-target configuration, keyed by target id.
pub struct TargetTable {
    targets: RefCell<HashMap<String, TargetConfig>>,
}

impl Default for TargetTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            targets: RefCell::new(HashMap::new()),
        }
    }

    /// Store delivery parameters for a target.
    pub fn set_relay_url(&self, target: &str, url: &str, legacy: bool, multi_part: bool) {
        let mut targets = self.targets.borrow_mut();
        let config = targets.entry(target.to_string()).or_default();
        config.relay_url = Some(url.to_string());
        config.use_legacy_protocol = legacy;
        config.use_multi_part = multi_part;
    }

    /// Store the shared secret for a target.
    pub fn set_auth_token(&self, target: &str, token: Value) {
        let mut targets = self.targets.borrow_mut();
        targets.entry(target.to_string()).or_default().auth_token = Some(token);
    }

    /// Snapshot the configuration for a target, defaults if never configured.
    pub fn config(&self, target: &str) -> TargetConfig {
        self.targets.borrow().get(target).cloned().unwrap_or_default()
    }

    /// Token to stamp on outbound envelopes for a target.
    pub fn auth_token(&self, target: &str) -> Option<Value> {
        self.targets
            .borrow()
            .get(target)
            .and_then(|c| c.auth_token.clone())
    }

    /// Cached same-domain probe outcome for a target.
    pub fn same_domain(&self, target: &str) -> Option<bool> {
        self.targets.borrow().get(target).and_then(|c| c.same_domain)
    }

    /// Record the outcome of a same-domain direct-handle attempt.
    pub fn cache_same_domain(&self, target: &str, reachable: bool) {
        let mut targets = self.targets.borrow_mut();
        targets.entry(target.to_string()).or_default().same_domain = Some(reachable);
    }

    /// Validate an inbound envelope's token against the sender's entry.
    ///
    /// Passes when no token is on file for the sender. Comparison is loose:
    /// values match by canonical string rendering.
    ///
    /// # Errors
    ///
    /// [`EngineError::AuthMismatch`] when a token is on file and the
    /// presented token is absent or different.
    pub fn validate_inbound(&self, from: &str, presented: Option<&Value>) -> Result<(), EngineError> {
        let targets = self.targets.borrow();
        let Some(expected) = targets.get(from).and_then(|c| c.auth_token.as_ref()) else {
            return Ok(());
        };
        match presented {
            Some(token) if tokens_match(expected, token) => Ok(()),
            _ => Err(EngineError::AuthMismatch {
                from: from.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lazy_creation_on_first_set() {
        let table = TargetTable::new();
        assert!(table.config("w1").relay_url.is_none());

        table.set_relay_url("w1", "/relay", false, true);
        let config = table.config("w1");
        assert_eq!(config.relay_url.as_deref(), Some("/relay"));
        assert!(config.use_multi_part);
        assert!(!config.use_legacy_protocol);
    }

    #[test]
    fn test_token_and_relay_settings_merge() {
        let table = TargetTable::new();
        table.set_auth_token("w1", json!("secret"));
        table.set_relay_url("w1", "/relay", true, false);

        let config = table.config("w1");
        assert_eq!(config.auth_token, Some(json!("secret")));
        assert_eq!(config.relay_url.as_deref(), Some("/relay"));
        assert!(config.use_legacy_protocol);
    }

    #[test]
    fn test_validate_passes_without_token_on_file() {
        let table = TargetTable::new();
        table
            .validate_inbound("unknown", Some(&json!("anything")))
            .expect("no token on file");
        table.validate_inbound("unknown", None).expect("no token on file");
    }

    #[test]
    fn test_validate_matches_loosely() {
        let table = TargetTable::new();
        table.set_auth_token("w1", json!(123));

        table.validate_inbound("w1", Some(&json!("123"))).expect("loose match");
        table.validate_inbound("w1", Some(&json!(123))).expect("exact match");
    }

    #[test]
    fn test_validate_rejects_wrong_or_missing_token() {
        let table = TargetTable::new();
        table.set_auth_token("w1", json!("secret"));

        let err = table.validate_inbound("w1", Some(&json!("wrong"))).unwrap_err();
        assert!(matches!(err, EngineError::AuthMismatch { ref from } if from == "w1"));

        let err = table.validate_inbound("w1", None).unwrap_err();
        assert!(matches!(err, EngineError::AuthMismatch { .. }));
    }

    #[test]
    fn test_same_domain_cache() {
        let table = TargetTable::new();
        assert_eq!(table.same_domain("w1"), None);

        table.cache_same_domain("w1", false);
        assert_eq!(table.same_domain("w1"), Some(false));

        table.cache_same_domain("w1", true);
        assert_eq!(table.same_domain("w1"), Some(true));
    }
}
