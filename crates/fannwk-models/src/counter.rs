//! Statistics counter identifiers.
//!
//! Every drop path in the layer is attributed to exactly one
//! [`StatCounter`]. A counter is indexed either by the physical link the
//! frame travelled on or by the logical port it was addressed to; see
//! [`StatCounter::dimension`].

use serde::{Deserialize, Serialize};
use strum::EnumCount;

use crate::port::Port;

// ---------------------------------------------------------------------------
// PhysicalLink
// ---------------------------------------------------------------------------

/// The physical link a frame was received on or is sent over.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumCount,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum PhysicalLink {
    /// The wireless mesh link.
    Rf,
    /// The wired backhaul link (relay-capable nodes only).
    Backhaul,
}

impl PhysicalLink {
    /// Number of physical links tracked by the statistics block.
    pub const COUNT: usize = <Self as EnumCount>::COUNT;

    /// Index of this link in per-link counter arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// CounterDimension
// ---------------------------------------------------------------------------

/// What a counter's index selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterDimension {
    /// Indexed by [`PhysicalLink::index`].
    Link,
    /// Indexed by [`Port::index`].
    Port,
}

impl CounterDimension {
    /// Number of valid indices in this dimension.
    pub fn len(self) -> usize {
        match self {
            Self::Link => PhysicalLink::COUNT,
            Self::Port => Port::COUNT,
        }
    }

    /// Clamp an arbitrary index to the last valid slot of this dimension.
    pub fn clamp(self, index: usize) -> usize {
        index.min(self.len() - 1)
    }
}

// ---------------------------------------------------------------------------
// StatCounter
// ---------------------------------------------------------------------------

/// Identifier of a single network-layer statistics counter.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum StatCounter {
    /// Frames accepted by the decoder.
    InReceives,
    /// Octets of accepted frames.
    InOctets,
    /// Truncated frames, bad version or invalid QoS.
    InHeaderErrors,
    /// Unsupported address modes or destinations not meant for this node.
    InAddrErrors,
    /// Asymmetric or unsupported transport ports.
    InUnknownProtos,
    /// Malformed next-hop headers (16-bit counter).
    InNextHopErrors,
    /// Frames addressed elsewhere that this node cannot route.
    InNoRoutes,
    /// Frames dropped because the layer was idle.
    InDiscards,
    /// Frames forwarded toward another node.
    ForwDatagrams,
    /// Data requests confirmed by the MAC.
    OutRequests,
    /// Payload octets of confirmed data requests.
    OutOctets,
    /// Outbound requests or forwards rejected locally or by the MAC.
    OutDiscards,
    /// Outbound requests without a usable route.
    OutNoRoutes,
    /// Indications delivered to a registered port handler.
    InDelivers,
    /// Indications for a port with no registered handler.
    InPortDiscards,
    /// Confirmed data requests per originating port.
    OutPortRequests,
}

impl StatCounter {
    /// The dimension used to index this counter.
    pub fn dimension(self) -> CounterDimension {
        match self {
            Self::InDelivers | Self::InPortDiscards | Self::OutPortRequests => {
                CounterDimension::Port
            }
            _ => CounterDimension::Link,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn clamp_never_exceeds_dimension() {
        assert_eq!(CounterDimension::Link.clamp(0), 0);
        assert_eq!(CounterDimension::Link.clamp(1), 1);
        assert_eq!(CounterDimension::Link.clamp(usize::MAX), PhysicalLink::COUNT - 1);
        assert_eq!(CounterDimension::Port.clamp(99), Port::COUNT - 1);
    }

    #[test]
    fn port_counters_use_port_dimension() {
        let port_counters: Vec<_> = StatCounter::iter()
            .filter(|c| c.dimension() == CounterDimension::Port)
            .collect();
        assert_eq!(
            port_counters,
            vec![
                StatCounter::InDelivers,
                StatCounter::InPortDiscards,
                StatCounter::OutPortRequests
            ]
        );
    }

    #[test]
    fn counter_display_is_snake_case() {
        assert_eq!(StatCounter::InUnknownProtos.to_string(), "in_unknown_protos");
        assert_eq!(PhysicalLink::Backhaul.to_string(), "backhaul");
    }
}
