//! Layer configuration.
//!
//! Three pieces with different lifetimes:
//!
//! - [`NodeIdentity`] is fixed for the life of the process and supplied by
//!   the host at construction.
//! - [`NwkConfig`] is the persisted protocol configuration, writable through
//!   `Set` and restored to defaults by `Reset(All)`.
//! - [`RuntimeConfig`] holds process tuning read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use fannwk_models::{Address, DeviceClass, EncodeError, ExtensionId, NextHopHeader};
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "fannwk";

/// Who this node is on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeIdentity {
    /// Local extension identifier, also the MAC source address.
    pub extension_id: ExtensionId,
    /// Selects the multicast groups this node accepts.
    pub device_class: DeviceClass,
    /// Whether the node has a backhaul link and may relay head-end traffic.
    pub relay_capable: bool,
}

impl NodeIdentity {
    /// A leaf endpoint with the given identifier.
    pub fn endpoint(extension_id: ExtensionId) -> Self {
        Self {
            extension_id,
            device_class: DeviceClass::Endpoint,
            relay_capable: false,
        }
    }

    /// Mark this node as relay-capable.
    pub fn with_relay(mut self, relay_capable: bool) -> Self {
        self.relay_capable = relay_capable;
        self
    }

    /// Override the device class.
    pub fn with_device_class(mut self, device_class: DeviceClass) -> Self {
        self.device_class = device_class;
        self
    }

    /// The local identity as an [`Address`].
    pub fn address(&self) -> Address {
        Address::ExtensionId(self.extension_id)
    }
}

/// A configured source route to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    /// Final destination the route applies to.
    pub destination: ExtensionId,
    /// Ordered hops; the first is the MAC destination.
    pub hops: Vec<ExtensionId>,
    /// Keep the full hop list on every hop instead of consuming it.
    pub persist: bool,
}

impl StaticRoute {
    /// The next-hop header carried by frames using this route.
    pub fn header(&self) -> Result<NextHopHeader, EncodeError> {
        NextHopHeader::new(
            self.persist,
            self.hops.iter().copied().map(Address::from).collect(),
        )
    }

    /// First hop, i.e. the link neighbour the frame is handed to.
    pub fn first_hop(&self) -> Option<ExtensionId> {
        self.hops.first().copied()
    }
}

/// Persisted protocol configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NwkConfig {
    /// Context byte that identifies the head-end.
    pub head_end_context: u8,
    /// Source routes keyed by destination.
    pub static_routes: Vec<StaticRoute>,
}

impl NwkConfig {
    /// The configured route to `destination`, if any.
    pub fn route_to(&self, destination: &ExtensionId) -> Option<&StaticRoute> {
        self.static_routes
            .iter()
            .find(|r| r.destination == *destination)
    }

    /// Check that every route encodes and that destinations are unique.
    pub fn validate_routes(routes: &[StaticRoute]) -> Result<(), String> {
        for (i, route) in routes.iter().enumerate() {
            route
                .header()
                .map_err(|e| format!("route to {}: {e}", route.destination))?;
            if routes[..i].iter().any(|r| r.destination == route.destination) {
                return Err(format!("duplicate route to {}", route.destination));
            }
        }
        Ok(())
    }
}

/// Process-level tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Directory for persisted records.
    pub store_dir: PathBuf,
    /// How long a blocking Get/Set/Start/Stop/Reset call waits for its confirm.
    pub request_timeout: Duration,
    /// How long a Data request may wait for its MAC confirm.
    pub confirm_timeout: Duration,
    /// Period of the pending-request watchdog tick.
    pub sweep_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            request_timeout: Duration::from_secs(10),
            confirm_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl RuntimeConfig {
    /// Build the configuration from environment variables.
    ///
    /// | Variable                    | Default              | Description                       |
    /// |-----------------------------|----------------------|-----------------------------------|
    /// | `NWK_STORE_DIR`             | `<data dir>/fannwk`  | Persisted record directory        |
    /// | `NWK_REQUEST_TIMEOUT_SECS`  | `10`                 | Blocking request timeout          |
    /// | `NWK_CONFIRM_TIMEOUT_SECS`  | `30`                 | MAC confirm watchdog              |
    /// | `NWK_SWEEP_INTERVAL_SECS`   | `1`                  | Watchdog tick period              |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, fallback: Duration| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .map_or(fallback, |s| Duration::from_secs(s.max(1)))
        };

        Self {
            store_dir: lookup("NWK_STORE_DIR").map_or(defaults.store_dir, PathBuf::from),
            request_timeout: secs("NWK_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            confirm_timeout: secs("NWK_CONFIRM_TIMEOUT_SECS", defaults.confirm_timeout),
            sweep_interval: secs("NWK_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
        }
    }
}

fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}
