//! # FAN NWK Stack
//!
//! The stateful half of the network layer: routing, statistics, persisted
//! configuration and the request / confirm / indication loop that sits
//! between the MAC and the application port handlers.
//!
//! ## Usage
//!
//! ```no_run
//! use fannwk_models::{ExtensionId, Port};
//! use fannwk_stack::{
//!     ChannelMac, DataIndication, DataRequest, MemoryStore, NetworkLayer, NodeIdentity,
//!     RuntimeConfig,
//! };
//!
//! # async fn example() -> Result<(), fannwk_stack::RequestError> {
//! let (mac, _radio) = ChannelMac::new();
//! let identity = NodeIdentity::endpoint(ExtensionId::new([0x11, 0x22, 0x33, 0x44, 0x55]));
//! let layer = NetworkLayer::new(identity, mac, MemoryStore::new(), RuntimeConfig::from_env());
//! let (nwk, _task) = layer.spawn();
//!
//! nwk.register_port_handler(Port::Plain, |ind: DataIndication| {
//!     println!("{} bytes from {}", ind.payload.len(), ind.source);
//! })
//! .await?;
//! nwk.start().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`config`] | Node identity, persisted protocol config, env-driven runtime config |
//! | [`store`] | Named-slot record store (JSON files or memory) |
//! | [`statistics`] | Counter block with clamping and rollover |
//! | [`router`] | Inbound and outbound routing decisions |
//! | [`mac`] | MAC boundary types and the transmit trait |
//! | [`request`] | Requests, confirms, attributes, indications |
//! | [`layer`] | The state machine |
//! | [`handle`] | Task spawn and the cloneable async handle |
//! | [`error`] | Request and store errors |

pub mod config;
pub mod error;
pub mod handle;
pub mod layer;
pub mod mac;
pub mod request;
pub mod router;
pub mod statistics;
pub mod store;

pub use config::{NodeIdentity, NwkConfig, RuntimeConfig, StaticRoute};
pub use error::{RequestError, StoreError};
pub use handle::NetworkLayerHandle;
pub use layer::NetworkLayer;
pub use mac::{
    ChannelMac, ChannelSet, MacCommand, MacConfirm, MacDataRequest, MacDestination, MacError,
    MacIndication, MacService, MacStatus,
};
pub use request::{
    AttributeId, AttributeValue, Confirm, ConfirmSink, DataIndication, DataRequest, LayerState,
    LinkOverride, LinkSettingsOverride, PortHandler, Request, ResetKind,
};
pub use statistics::{StatisticsBlock, StatisticsStore};
pub use store::{JsonFileStore, MemoryStore, RecordStore};
