//! Network-layer statistics.
//!
//! Counters are free-running: 32-bit, except [`StatCounter::InNextHopErrors`]
//! which is 16-bit. They wrap on overflow. Indexes are clamped to the
//! counter's dimension so a bad index can never fault.

use chrono::{DateTime, Utc};
use fannwk_models::{PhysicalLink, Port, StatCounter};
use serde::{Deserialize, Serialize};

const LINKS: usize = PhysicalLink::COUNT;
const PORTS: usize = Port::COUNT;

/// The persisted statistics record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct StatisticsBlock {
    pub in_receives: [u32; LINKS],
    pub in_octets: [u32; LINKS],
    pub in_header_errors: [u32; LINKS],
    pub in_addr_errors: [u32; LINKS],
    pub in_unknown_protos: [u32; LINKS],
    pub in_next_hop_errors: [u16; LINKS],
    pub in_no_routes: [u32; LINKS],
    pub in_discards: [u32; LINKS],
    pub forw_datagrams: [u32; LINKS],
    pub out_requests: [u32; LINKS],
    pub out_octets: [u32; LINKS],
    pub out_discards: [u32; LINKS],
    pub out_no_routes: [u32; LINKS],
    pub in_delivers: [u32; PORTS],
    pub in_port_discards: [u32; PORTS],
    pub out_port_requests: [u32; PORTS],
    /// When the counters were last cleared.
    pub last_reset: Option<DateTime<Utc>>,
}

impl StatisticsBlock {
    fn wide(&self, counter: StatCounter) -> Option<&[u32]> {
        Some(match counter {
            StatCounter::InReceives => &self.in_receives,
            StatCounter::InOctets => &self.in_octets,
            StatCounter::InHeaderErrors => &self.in_header_errors,
            StatCounter::InAddrErrors => &self.in_addr_errors,
            StatCounter::InUnknownProtos => &self.in_unknown_protos,
            StatCounter::InNoRoutes => &self.in_no_routes,
            StatCounter::InDiscards => &self.in_discards,
            StatCounter::ForwDatagrams => &self.forw_datagrams,
            StatCounter::OutRequests => &self.out_requests,
            StatCounter::OutOctets => &self.out_octets,
            StatCounter::OutDiscards => &self.out_discards,
            StatCounter::OutNoRoutes => &self.out_no_routes,
            StatCounter::InDelivers => &self.in_delivers,
            StatCounter::InPortDiscards => &self.in_port_discards,
            StatCounter::OutPortRequests => &self.out_port_requests,
            StatCounter::InNextHopErrors => return None,
        })
    }

    fn wide_mut(&mut self, counter: StatCounter) -> Option<&mut [u32]> {
        Some(match counter {
            StatCounter::InReceives => &mut self.in_receives,
            StatCounter::InOctets => &mut self.in_octets,
            StatCounter::InHeaderErrors => &mut self.in_header_errors,
            StatCounter::InAddrErrors => &mut self.in_addr_errors,
            StatCounter::InUnknownProtos => &mut self.in_unknown_protos,
            StatCounter::InNoRoutes => &mut self.in_no_routes,
            StatCounter::InDiscards => &mut self.in_discards,
            StatCounter::ForwDatagrams => &mut self.forw_datagrams,
            StatCounter::OutRequests => &mut self.out_requests,
            StatCounter::OutOctets => &mut self.out_octets,
            StatCounter::OutDiscards => &mut self.out_discards,
            StatCounter::OutNoRoutes => &mut self.out_no_routes,
            StatCounter::InDelivers => &mut self.in_delivers,
            StatCounter::InPortDiscards => &mut self.in_port_discards,
            StatCounter::OutPortRequests => &mut self.out_port_requests,
            StatCounter::InNextHopErrors => return None,
        })
    }
}

/// Owner of the live [`StatisticsBlock`].
///
/// The layer persists the block after every call that returns `true`.
#[derive(Debug, Clone, Default)]
pub struct StatisticsStore {
    block: StatisticsBlock,
}

impl StatisticsStore {
    /// Resume from a previously persisted block.
    pub fn from_block(block: StatisticsBlock) -> Self {
        Self { block }
    }

    /// The current block.
    pub fn block(&self) -> &StatisticsBlock {
        &self.block
    }

    /// Read one counter; `index` is clamped.
    pub fn get(&self, counter: StatCounter, index: usize) -> u32 {
        let i = counter.dimension().clamp(index);
        match self.block.wide(counter) {
            Some(values) => values[i],
            None => u32::from(self.block.in_next_hop_errors[i]),
        }
    }

    /// Add `amount` to a counter with rollover; `index` is clamped.
    ///
    /// Returns whether the block changed.
    pub fn increment(&mut self, counter: StatCounter, amount: u32, index: usize) -> bool {
        if amount == 0 {
            return false;
        }
        let i = counter.dimension().clamp(index);
        match self.block.wide_mut(counter) {
            Some(values) => values[i] = values[i].wrapping_add(amount),
            None => {
                // 16-bit on the wire; only the low half of `amount` matters.
                #[allow(clippy::cast_possible_truncation)]
                let amount = amount as u16;
                let value = &mut self.block.in_next_hop_errors[i];
                *value = value.wrapping_add(amount);
            }
        }
        true
    }

    /// Clear every counter and stamp the reset time.
    pub fn reset(&mut self) {
        self.block = StatisticsBlock {
            last_reset: Some(Utc::now()),
            ..StatisticsBlock::default()
        };
    }

    /// When the counters were last cleared.
    pub fn last_reset(&self) -> Option<DateTime<Utc>> {
        self.block.last_reset
    }
}
