//! Error types for the crosstalk engine.

/// Errors surfaced by the engine facade.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Attempt to register or unregister a built-in service name.
    ///
    /// The callback service and the empty default-service name are owned by
    /// the engine itself. Hitting this is a programmer error, never retried.
    #[error("service name is reserved: {name:?}")]
    ReservedName {
        /// The rejected service name.
        name: String,
    },

    /// Inbound envelope carried a token that does not match the one on file.
    ///
    /// Raised synchronously from the receive path; the message is dropped and
    /// never retried.
    #[error("auth token mismatch from sender {from:?}")]
    AuthMismatch {
        /// Canonical id of the sender whose token failed validation.
        from: String,
    },

    /// Failed to serialize an envelope for the wire.
    #[error("envelope encode failed: {message}")]
    Encode {
        /// Details about the serialization failure.
        message: String,
    },
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Encode {
            message: err.to_string(),
        }
    }
}
