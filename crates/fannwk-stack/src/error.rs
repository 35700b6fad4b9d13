//! Stack error types.
//!
//! [`RequestError`] is what a caller sees in a failed confirm. [`StoreError`]
//! covers the persisted record store; it is logged by the layer and never
//! surfaced through a confirm.

use fannwk_models::{EncodeError, InvalidQos, Port};

use crate::mac::MacStatus;
use crate::request::AttributeId;

/// Failure status carried by a confirm.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The processing loop did not answer in time or has shut down.
    #[error("network layer unavailable")]
    ServiceUnavailable,

    /// No further request handles can be issued.
    #[error("transaction overflow")]
    TransactionOverflow,

    /// No route exists for the requested destination.
    #[error("no route to destination")]
    NoRoute,

    /// Data requests are rejected while the layer is idle.
    #[error("network layer is not operational")]
    NotOperational,

    /// The MAC refused the frame because it is not running.
    #[error("MAC layer is idle")]
    MacIdle,

    /// The MAC reported a transmit failure.
    #[error("MAC failure: {0}")]
    MacFailure(MacStatus),

    /// A confirm or purge referenced an unknown handle.
    #[error("invalid handle {0}")]
    InvalidHandle(u16),

    /// The requested QoS code is not in the QoS table.
    #[error("invalid QoS code {0:#04x}")]
    InvalidQos(u8),

    /// The frame could not be encoded.
    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),

    /// The attribute cannot be written.
    #[error("attribute {0} is read-only")]
    ReadOnlyAttribute(AttributeId),

    /// A supplied value failed validation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A handler is already registered on the port.
    #[error("port {0} already has a handler")]
    PortInUse(Port),
}

impl From<InvalidQos> for RequestError {
    fn from(e: InvalidQos) -> Self {
        RequestError::InvalidQos(e.0)
    }
}

/// Errors from the persisted record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be serialized or parsed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store has no usable location.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
