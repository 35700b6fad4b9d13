//! QoS codes and the link parameters they select.
//!
//! A QoS code is a 6-bit value. The upper three bits carry the priority
//! class and the lower three bits are either `000` (no acknowledgement) or
//! `111` (acknowledged). Only the fourteen codes in [`QOS_TABLE`] are valid;
//! anything else is rejected on both the send and receive paths.

use serde::{Deserialize, Serialize};

use crate::error::InvalidQos;

/// Width of the QoS field on the wire.
pub const QOS_BITS: usize = 6;

/// Reliability class requested from the MAC.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum Reliability {
    /// Best effort.
    Low,
    /// Limited retries.
    Medium,
    /// Full retry budget.
    High,
}

/// MAC-level parameters derived from a QoS code.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct QosParams {
    /// Request a link-layer acknowledgement.
    pub ack_required: bool,
    /// Transmit priority, 1 (lowest) to 7 (highest).
    pub priority: u8,
    /// The MAC may drop the frame under congestion.
    pub droppable: bool,
    /// Retry policy.
    pub reliability: Reliability,
}

const fn entry(
    code: u8,
    ack_required: bool,
    priority: u8,
    droppable: bool,
    reliability: Reliability,
) -> (u8, QosParams) {
    (
        code,
        QosParams {
            ack_required,
            priority,
            droppable,
            reliability,
        },
    )
}

/// Every valid QoS code and its parameters.
pub const QOS_TABLE: [(u8, QosParams); 14] = [
    entry(0x00, false, 1, true, Reliability::Low),
    entry(0x08, false, 2, true, Reliability::Low),
    entry(0x10, false, 3, true, Reliability::Low),
    entry(0x18, false, 4, false, Reliability::Medium),
    entry(0x20, false, 5, false, Reliability::Medium),
    entry(0x28, false, 6, false, Reliability::High),
    entry(0x30, false, 7, false, Reliability::High),
    entry(0x0F, true, 1, false, Reliability::Low),
    entry(0x17, true, 2, false, Reliability::Low),
    entry(0x1F, true, 3, false, Reliability::Medium),
    entry(0x27, true, 4, false, Reliability::Medium),
    entry(0x2F, true, 5, false, Reliability::High),
    entry(0x37, true, 6, false, Reliability::High),
    entry(0x3F, true, 7, false, Reliability::High),
];

/// Look up the link parameters for a QoS code.
pub fn qos_to_params(qos: u8) -> Result<QosParams, InvalidQos> {
    QOS_TABLE
        .iter()
        .find(|(code, _)| *code == qos)
        .map(|(_, params)| *params)
        .ok_or(InvalidQos(qos))
}

/// A validated QoS code.
///
/// # Examples
///
/// ```
/// use fannwk_models::{Qos, Reliability};
///
/// let qos = Qos::new(0x3F).unwrap();
/// assert!(qos.params().ack_required);
/// assert_eq!(qos.params().reliability, Reliability::High);
/// assert!(Qos::new(0x3E).is_err());
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub struct Qos(u8);

impl Qos {
    /// Highest priority, acknowledged.
    pub const CRITICAL: Self = Self(0x3F);
    /// Lowest priority, droppable.
    pub const BEST_EFFORT: Self = Self(0x00);

    /// Validate a raw code.
    pub fn new(code: u8) -> Result<Self, InvalidQos> {
        qos_to_params(code).map(|_| Self(code))
    }

    /// The 6-bit wire code.
    pub fn code(self) -> u8 {
        self.0
    }

    /// The link parameters for this code.
    pub fn params(self) -> QosParams {
        // Construction guarantees the code is in the table.
        qos_to_params(self.0).unwrap_or(QOS_TABLE[0].1)
    }
}

impl TryFrom<u8> for Qos {
    type Error = InvalidQos;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::new(code)
    }
}

impl From<Qos> for u8 {
    fn from(qos: Qos) -> Self {
        qos.0
    }
}
