//! Request, confirm and indication vocabulary.
//!
//! Every request carries a `u16` handle chosen by the caller side; the
//! matching [`Confirm`] echoes it back through a [`ConfirmSink`].

use chrono::{DateTime, Utc};
use fannwk_models::{Address, ExtensionId, PhysicalLink, Port, Qos, StatCounter};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::StaticRoute;
use crate::error::RequestError;
use crate::mac::ChannelSet;

/// Operating state of the layer.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum LayerState {
    /// Data requests are rejected and inbound frames dropped.
    #[default]
    Idle,
    /// Normal operation.
    Operational,
}

// ---------------------------------------------------------------------------
// Data requests
// ---------------------------------------------------------------------------

/// Forces the physical link or addressing of a data request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkOverride {
    /// Infer from the destination.
    #[default]
    None,
    /// Send on the wired backhaul (relay nodes only).
    Backhaul,
    /// Unicast straight to the destination id, ignoring static routes.
    DirectMac,
}

/// Forces the MAC channel set of a data request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkSettingsOverride {
    /// Infer from the MAC destination.
    #[default]
    None,
    /// Force [`ChannelSet::UnicastOutbound`].
    UnicastOutbound,
    /// Force [`ChannelSet::UnicastInbound`].
    UnicastInbound,
    /// Force [`ChannelSet::BroadcastOutbound`].
    BroadcastOutbound,
    /// Force [`ChannelSet::BroadcastInbound`].
    BroadcastInbound,
}

impl LinkSettingsOverride {
    /// The forced channel set, if any.
    pub fn channel_set(self) -> Option<ChannelSet> {
        match self {
            Self::None => None,
            Self::UnicastOutbound => Some(ChannelSet::UnicastOutbound),
            Self::UnicastInbound => Some(ChannelSet::UnicastInbound),
            Self::BroadcastOutbound => Some(ChannelSet::BroadcastOutbound),
            Self::BroadcastInbound => Some(ChannelSet::BroadcastInbound),
        }
    }
}

/// An application payload to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    /// Port written as both source and destination port.
    pub port: Port,
    /// Raw QoS code; validated by the layer.
    pub qos: u8,
    pub destination: Address,
    pub payload: Vec<u8>,
    /// Bypass normal link selection.
    pub link_override: LinkOverride,
    /// Bypass channel-set inference.
    pub link_settings_override: LinkSettingsOverride,
}

impl DataRequest {
    /// A request with critical QoS and no overrides.
    pub fn new(port: Port, destination: Address, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            port,
            qos: Qos::CRITICAL.code(),
            destination,
            payload: payload.into(),
            link_override: LinkOverride::None,
            link_settings_override: LinkSettingsOverride::None,
        }
    }

    /// Set the raw QoS code.
    pub fn with_qos(mut self, qos: u8) -> Self {
        self.qos = qos;
        self
    }

    /// Force the link or MAC addressing.
    pub fn with_link_override(mut self, link_override: LinkOverride) -> Self {
        self.link_override = link_override;
        self
    }

    /// Force the MAC channel set.
    pub fn with_link_settings_override(mut self, settings: LinkSettingsOverride) -> Self {
        self.link_settings_override = settings;
        self
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Identifies a readable attribute.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AttributeId {
    State,
    LocalId,
    HeadEndContext,
    StaticRoutes,
    LastResetTime,
    /// One statistics counter at one link or port index.
    Statistic { counter: StatCounter, index: usize },
}

/// An attribute together with its value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    State(LayerState),
    LocalId(ExtensionId),
    HeadEndContext(u8),
    StaticRoutes(Vec<StaticRoute>),
    LastResetTime(Option<DateTime<Utc>>),
    Statistic {
        counter: StatCounter,
        index: usize,
        value: u32,
    },
}

impl AttributeValue {
    /// Which attribute this value belongs to.
    pub fn id(&self) -> AttributeId {
        match self {
            Self::State(_) => AttributeId::State,
            Self::LocalId(_) => AttributeId::LocalId,
            Self::HeadEndContext(_) => AttributeId::HeadEndContext,
            Self::StaticRoutes(_) => AttributeId::StaticRoutes,
            Self::LastResetTime(_) => AttributeId::LastResetTime,
            Self::Statistic { counter, index, .. } => AttributeId::Statistic {
                counter: *counter,
                index: *index,
            },
        }
    }
}

/// What `Reset` clears.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ResetKind {
    /// Configuration back to defaults and statistics cleared.
    All,
    /// Statistics only.
    Statistics,
}

// ---------------------------------------------------------------------------
// Request / Confirm
// ---------------------------------------------------------------------------

/// A request to the layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get(AttributeId),
    Set(AttributeValue),
    Reset(ResetKind),
    Start,
    Stop,
    Data(DataRequest),
}

/// The answer to a [`Request`], tagged the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirm {
    Get {
        handle: u16,
        result: Result<AttributeValue, RequestError>,
    },
    Set {
        handle: u16,
        result: Result<(), RequestError>,
    },
    Reset {
        handle: u16,
        result: Result<(), RequestError>,
    },
    Start {
        handle: u16,
        result: Result<(), RequestError>,
    },
    Stop {
        handle: u16,
        result: Result<(), RequestError>,
    },
    Data {
        handle: u16,
        result: Result<(), RequestError>,
    },
}

impl Confirm {
    /// The handle of the request this answers.
    pub fn handle(&self) -> u16 {
        match self {
            Self::Get { handle, .. }
            | Self::Set { handle, .. }
            | Self::Reset { handle, .. }
            | Self::Start { handle, .. }
            | Self::Stop { handle, .. }
            | Self::Data { handle, .. } => *handle,
        }
    }

    /// Success or the failure status, dropping any returned value.
    pub fn status(&self) -> Result<(), RequestError> {
        match self {
            Self::Get { result, .. } => result.as_ref().map(|_| ()).map_err(Clone::clone),
            Self::Set { result, .. }
            | Self::Reset { result, .. }
            | Self::Start { result, .. }
            | Self::Stop { result, .. }
            | Self::Data { result, .. } => result.clone(),
        }
    }
}

/// Where a [`Confirm`] is delivered.
pub enum ConfirmSink {
    /// Wake a caller awaiting the matching receiver.
    Reply(oneshot::Sender<Confirm>),
    /// Invoke a callback from the processing context.
    Callback(Box<dyn FnOnce(Confirm) + Send>),
    /// Nobody is interested.
    Discard,
}

impl ConfirmSink {
    /// Hand over the confirm. A caller that stopped waiting is not an error.
    pub fn deliver(self, confirm: Confirm) {
        match self {
            Self::Reply(tx) => {
                if let Err(confirm) = tx.send(confirm) {
                    debug!(handle = confirm.handle(), "confirm receiver dropped");
                }
            }
            Self::Callback(callback) => callback(confirm),
            Self::Discard => {}
        }
    }
}

impl std::fmt::Debug for ConfirmSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Reply(_) => "Reply",
            Self::Callback(_) => "Callback",
            Self::Discard => "Discard",
        })
    }
}

// ---------------------------------------------------------------------------
// Indications
// ---------------------------------------------------------------------------

/// A frame delivered to an upper-layer port handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataIndication {
    pub port: Port,
    /// Network source, resolved to the link peer when elided on the wire.
    pub source: Address,
    /// Network destination, resolved to this node when elided on the wire.
    pub destination: Address,
    pub qos: Qos,
    pub link: PhysicalLink,
    pub payload: Vec<u8>,
}

/// Receives indications for one port.
pub trait PortHandler: Send {
    fn on_indication(&mut self, indication: DataIndication);
}

impl<F> PortHandler for F
where
    F: FnMut(DataIndication) + Send,
{
    fn on_indication(&mut self, indication: DataIndication) {
        self(indication);
    }
}
