//! The MAC boundary.
//!
//! The layer hands frames to a [`MacService`] and learns the outcome later,
//! when the host posts a [`MacConfirm`] carrying the same handle. Inbound
//! frames arrive as [`MacIndication`]s.

use fannwk_models::{ExtensionId, PhysicalLink, Reliability};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Link-level destination of a transmitted frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacDestination {
    /// A single neighbour.
    Unicast(ExtensionId),
    /// Every neighbour in range (or the single upstream peer on the backhaul).
    Broadcast,
}

/// Channel-set selector passed to the MAC.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum ChannelSet {
    UnicastOutbound = 0,
    UnicastInbound = 1,
    BroadcastOutbound = 2,
    BroadcastInbound = 3,
}

impl ChannelSet {
    /// Default channel set for a destination.
    pub fn for_destination(destination: MacDestination) -> Self {
        match destination {
            MacDestination::Unicast(_) => Self::UnicastOutbound,
            MacDestination::Broadcast => Self::BroadcastOutbound,
        }
    }

    /// Index passed to the radio.
    pub fn index(self) -> u8 {
        self as u8
    }
}

/// One frame handed to the MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacDataRequest {
    /// Correlates the later [`MacConfirm`].
    pub handle: u16,
    pub link: PhysicalLink,
    pub destination: MacDestination,
    /// Encoded network-layer frame.
    pub payload: Vec<u8>,
    pub ack_required: bool,
    /// 1 (lowest) to 7 (highest).
    pub priority: u8,
    pub droppable: bool,
    pub reliability: Reliability,
    pub channel_set: ChannelSet,
}

/// Transmit outcome reported by the MAC.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum MacStatus {
    Success,
    NoAck,
    ChannelAccessFailure,
    TransactionExpired,
    Purged,
}

/// Completion of an earlier [`MacDataRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacConfirm {
    pub handle: u16,
    pub status: MacStatus,
}

/// A frame received by the MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacIndication {
    pub link: PhysicalLink,
    /// Link-layer source, used to resolve an elided network source.
    pub source: ExtensionId,
    pub destination: MacDestination,
    /// Encoded network-layer frame.
    pub payload: Vec<u8>,
}

/// Synchronous refusal from [`MacService::send`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MacError {
    /// The MAC is not running.
    #[error("MAC is idle")]
    Idle,
    /// The MAC transmit queue is full.
    #[error("MAC queue full")]
    QueueFull,
    /// The MAC side of the link has gone away.
    #[error("MAC disconnected")]
    Disconnected,
}

/// Transmit side of the MAC layer.
pub trait MacService: Send {
    /// Queue a frame for transmission. A later [`MacConfirm`] reports the outcome.
    fn send(&mut self, request: MacDataRequest) -> Result<(), MacError>;

    /// Best-effort cancellation of a queued frame. Not acknowledged.
    fn purge(&mut self, handle: u16);
}

/// A command emitted by [`ChannelMac`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacCommand {
    Send(MacDataRequest),
    Purge(u16),
}

/// A [`MacService`] that forwards every call over a channel.
///
/// Lets a radio driver running in its own task consume transmit requests.
#[derive(Debug, Clone)]
pub struct ChannelMac {
    tx: mpsc::UnboundedSender<MacCommand>,
}

impl ChannelMac {
    /// Create the service and the receiving end the driver reads from.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MacCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MacService for ChannelMac {
    fn send(&mut self, request: MacDataRequest) -> Result<(), MacError> {
        self.tx
            .send(MacCommand::Send(request))
            .map_err(|_| MacError::Disconnected)
    }

    fn purge(&mut self, handle: u16) {
        // Fire-and-forget: a gone driver has nothing left to purge.
        let _ = self.tx.send(MacCommand::Purge(handle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(handle: u16) -> MacDataRequest {
        MacDataRequest {
            handle,
            link: PhysicalLink::Rf,
            destination: MacDestination::Broadcast,
            payload: vec![1, 2, 3],
            ack_required: false,
            priority: 1,
            droppable: true,
            reliability: Reliability::Low,
            channel_set: ChannelSet::BroadcastOutbound,
        }
    }

    #[test]
    fn channel_set_follows_destination() {
        assert_eq!(
            ChannelSet::for_destination(MacDestination::Broadcast),
            ChannelSet::BroadcastOutbound
        );
        let unicast = MacDestination::Unicast(ExtensionId::new([1; 5]));
        assert_eq!(ChannelSet::for_destination(unicast).index(), 0);
    }

    #[test]
    fn channel_mac_forwards_commands() {
        let (mut mac, mut rx) = ChannelMac::new();
        mac.send(request(4)).unwrap();
        mac.purge(4);
        assert_eq!(rx.try_recv().unwrap(), MacCommand::Send(request(4)));
        assert_eq!(rx.try_recv().unwrap(), MacCommand::Purge(4));
    }

    #[test]
    fn channel_mac_reports_disconnect() {
        let (mut mac, rx) = ChannelMac::new();
        drop(rx);
        assert_eq!(mac.send(request(1)), Err(MacError::Disconnected));
        mac.purge(1);
    }
}
