//! Envelope construction, wire encoding, and lenient parsing.
//!
//! The wire form is a JSON object `{"s","f","c","a","t"}` (service, from,
//! call id, args, optional token). Peers running the legacy protocol encode
//! the same fields as a positional array `[s, f, c, a]`; receivers accept
//! both forms unconditionally so mixed deployments interoperate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

/// Reserved service name carrying replies back to the caller.
pub const CALLBACK_SERVICE: &str = "__cb";

/// Reserved name of the default (fallback) service slot.
pub const DEFAULT_SERVICE: &str = "";

/// Target id addressing the container/parent context.
pub const PARENT_SENTINEL: &str = "..";

/// A message exchanged between execution contexts.
///
/// Built once per call and immutable once sent. `call_id` is 0 for
/// fire-and-forget calls; any other value correlates an eventual reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Name of the service to invoke on the target.
    pub service: String,
    /// Id of the sending context.
    pub from: String,
    /// Correlation id, or 0 when no reply is expected.
    pub call_id: u64,
    /// Positional arguments, opaque to the engine.
    pub args: Vec<Value>,
    /// Shared secret for the target, when one is configured.
    pub auth_token: Option<Value>,
}

/// Serde mirror of the compact object wire form.
#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    s: String,
    f: String,
    c: u64,
    a: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    t: Option<Value>,
}

impl Envelope {
    /// Create a new envelope.
    pub fn new(
        service: impl Into<String>,
        from: impl Into<String>,
        call_id: u64,
        args: Vec<Value>,
        auth_token: Option<Value>,
    ) -> Self {
        Self {
            service: service.into(),
            from: from.into(),
            call_id,
            args,
            auth_token,
        }
    }

    /// Serialize to the compact object wire form.
    pub fn to_wire(&self) -> Result<String, EngineError> {
        let wire = WireEnvelope {
            s: self.service.clone(),
            f: self.from.clone(),
            c: self.call_id,
            a: self.args.clone(),
            t: self.auth_token.clone(),
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Serialize to the legacy positional wire form `[s, f, c, a]`.
    ///
    /// The legacy form predates auth tokens, so the token is not carried.
    pub fn to_wire_legacy(&self) -> Result<String, EngineError> {
        let arr = Value::Array(vec![
            Value::String(self.service.clone()),
            Value::String(self.from.clone()),
            Value::from(self.call_id),
            Value::Array(self.args.clone()),
        ]);
        Ok(serde_json::to_string(&arr)?)
    }

    /// Parse raw inbound data, tolerating anything that is not an envelope.
    ///
    /// Requires a string service, a string sender id, and an array of args;
    /// everything else yields `None` so unrelated traffic sharing the channel
    /// is ignored rather than errored. A missing or non-numeric call id is
    /// read as 0.
    pub fn parse_lenient(raw: &str) -> Option<Envelope> {
        let value: Value = serde_json::from_str(raw).ok()?;
        match value {
            Value::Object(ref map) => {
                let service = map.get("s")?.as_str()?.to_string();
                let from = map.get("f")?.as_str()?.to_string();
                let args = map.get("a")?.as_array()?.clone();
                let call_id = map.get("c").and_then(Value::as_u64).unwrap_or(0);
                let auth_token = map.get("t").filter(|t| !t.is_null()).cloned();
                Some(Envelope {
                    service,
                    from,
                    call_id,
                    args,
                    auth_token,
                })
            }
            Value::Array(ref fields) => {
                // Legacy positional form.
                if fields.len() != 4 {
                    return None;
                }
                let service = fields[0].as_str()?.to_string();
                let from = fields[1].as_str()?.to_string();
                let call_id = fields[2].as_u64().unwrap_or(0);
                let args = fields[3].as_array()?.clone();
                Some(Envelope {
                    service,
                    from,
                    call_id,
                    args,
                    auth_token: None,
                })
            }
            _ => None,
        }
    }
}

/// Normalize a sender id to its canonical form.
///
/// The empty id and the parent sentinel both mean "the container context";
/// the sentinel is canonical.
pub fn normalize_sender(from: &str) -> String {
    if from.is_empty() {
        PARENT_SENTINEL.to_string()
    } else {
        from.to_string()
    }
}

/// Normalize a call target the same way sender ids are normalized.
pub fn normalize_target(target: &str) -> String {
    normalize_sender(target)
}

/// Loose token equality: values compare by canonical string rendering,
/// so the string `"123"` matches the number `123`.
pub fn tokens_match(expected: &Value, presented: &Value) -> bool {
    fn render(v: &Value) -> String {
        match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
    render(expected) == render(presented)
}
