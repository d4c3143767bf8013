//! Error types for the core update model.

use thiserror::Error;

/// Returned when a payload of one type is requested from an update that
/// carries a different variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// The update does not carry the requested payload variant.
    #[error("payload mismatch: expected '{expected}', got '{got}'")]
    Mismatch {
        /// Name of the requested payload type.
        expected: &'static str,
        /// Kind name of the update that was inspected.
        got: String,
    },
}

/// Returned by [`UpdateKind::from_str`](crate::UpdateKind) for names that are
/// not one of the recognised update kinds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown update kind: '{0}'")]
pub struct UnknownUpdateKind(pub String);

/// Errors raised while decoding an update from its JSON form.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The update object carried no payload field besides `update_id`.
    #[error("update {update_id} carries no payload")]
    EmptyUpdate {
        /// Identifier of the offending update.
        update_id: i64,
    },

    /// A recognised payload failed to decode.
    #[error("failed to decode '{kind}' payload: {source}")]
    Payload {
        /// Kind name of the payload.
        kind: &'static str,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for payload extraction.
pub type PayloadResult<T> = Result<T, PayloadError>;
