//! The network layer state machine.
//!
//! [`NetworkLayer`] owns every piece of mutable layer state: configuration,
//! statistics, the port-handler table and the pending data request. Its
//! `handle_*` methods are the only way in; [`NetworkLayer::spawn`] runs them
//! from a single task fed by a queue so the state has exactly one writer.

use std::collections::HashMap;
use std::time::Instant;

use fannwk_models::{build_data_frame, ExtensionId, Frame, PhysicalLink, Port, Qos, StatCounter};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{NodeIdentity, NwkConfig, RuntimeConfig};
use crate::error::RequestError;
use crate::mac::{
    ChannelSet, MacConfirm, MacDataRequest, MacDestination, MacError, MacIndication, MacService,
    MacStatus,
};
use crate::request::{
    AttributeId, AttributeValue, Confirm, ConfirmSink, DataIndication, DataRequest, LayerState,
    LinkOverride, PortHandler, Request, ResetKind,
};
use crate::router::{route_inbound, route_outbound, ForwardPlan, RouteContext, RouteDecision};
use crate::statistics::{StatisticsBlock, StatisticsStore};
use crate::store::{load_record, save_record, RecordStore, CONFIG_SLOT, STATS_SLOT};

/// Forwarded frames awaiting a MAC confirm before new forwards are refused.
pub const MAX_FORWARDS_IN_FLIGHT: usize = 16;

/// The data request currently handed to the MAC.
#[derive(Debug)]
struct PendingData {
    handle: u16,
    mac_handle: u16,
    port: Port,
    link: PhysicalLink,
    payload_len: usize,
    deadline: Instant,
    sink: ConfirmSink,
}

/// A forwarded frame awaiting its MAC confirm.
#[derive(Debug, Clone, Copy)]
struct InFlightForward {
    link: PhysicalLink,
    deadline: Instant,
}

/// The network layer.
pub struct NetworkLayer {
    identity: NodeIdentity,
    config: NwkConfig,
    state: LayerState,
    stats: StatisticsStore,
    runtime: RuntimeConfig,
    store: Box<dyn RecordStore>,
    mac: Box<dyn MacService>,
    handlers: [Option<Box<dyn PortHandler>>; Port::COUNT],
    pending: Option<PendingData>,
    forwards: HashMap<u16, InFlightForward>,
    next_mac_handle: u16,
}

impl NetworkLayer {
    /// Build the layer, restoring configuration and statistics from `store`.
    ///
    /// Missing or unreadable records fall back to defaults.
    pub fn new(
        identity: NodeIdentity,
        mac: impl MacService + 'static,
        store: impl RecordStore + 'static,
        runtime: RuntimeConfig,
    ) -> Self {
        let config = restore::<NwkConfig>(&store, CONFIG_SLOT).unwrap_or_default();
        let stats = restore::<StatisticsBlock>(&store, STATS_SLOT).unwrap_or_default();
        info!(
            local_id = %identity.extension_id,
            device_class = %identity.device_class,
            relay_capable = identity.relay_capable,
            head_end_context = config.head_end_context,
            static_routes = config.static_routes.len(),
            "network layer created"
        );

        Self {
            identity,
            config,
            state: LayerState::Idle,
            stats: StatisticsStore::from_block(stats),
            runtime,
            store: Box::new(store),
            mac: Box::new(mac),
            handlers: std::array::from_fn(|_| None),
            pending: None,
            forwards: HashMap::new(),
            next_mac_handle: 0,
        }
    }

    /// Current operating state.
    pub fn state(&self) -> LayerState {
        self.state
    }

    /// Live statistics.
    pub fn statistics(&self) -> &StatisticsStore {
        &self.stats
    }

    /// Current protocol configuration.
    pub fn config(&self) -> &NwkConfig {
        &self.config
    }

    /// Process-level tuning this layer was built with.
    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    /// Install the handler for `port`. One handler per port.
    pub fn register_port_handler(
        &mut self,
        port: Port,
        handler: Box<dyn PortHandler>,
    ) -> Result<(), RequestError> {
        let slot = &mut self.handlers[port.index()];
        if slot.is_some() {
            return Err(RequestError::PortInUse(port));
        }
        *slot = Some(handler);
        debug!(%port, "port handler registered");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Execute a request and deliver its confirm.
    ///
    /// Everything except `Data` confirms before returning. A `Data` request
    /// that reaches the MAC confirms when the MAC confirm arrives.
    pub fn handle_request(&mut self, handle: u16, request: Request, sink: ConfirmSink) {
        let confirm = match request {
            Request::Get(id) => Confirm::Get {
                handle,
                result: self.get(id),
            },
            Request::Set(value) => Confirm::Set {
                handle,
                result: self.set(value),
            },
            Request::Reset(kind) => {
                self.reset(kind);
                Confirm::Reset {
                    handle,
                    result: Ok(()),
                }
            }
            Request::Start => {
                self.start();
                Confirm::Start {
                    handle,
                    result: Ok(()),
                }
            }
            Request::Stop => {
                self.stop();
                Confirm::Stop {
                    handle,
                    result: Ok(()),
                }
            }
            Request::Data(data) => match self.submit_data(handle, data, sink) {
                Ok(()) => return,
                Err((sink, e)) => {
                    sink.deliver(Confirm::Data {
                        handle,
                        result: Err(e),
                    });
                    return;
                }
            },
        };
        sink.deliver(confirm);
    }

    /// Read an attribute.
    pub fn get(&self, id: AttributeId) -> Result<AttributeValue, RequestError> {
        Ok(match id {
            AttributeId::State => AttributeValue::State(self.state),
            AttributeId::LocalId => AttributeValue::LocalId(self.identity.extension_id),
            AttributeId::HeadEndContext => AttributeValue::HeadEndContext(self.config.head_end_context),
            AttributeId::StaticRoutes => AttributeValue::StaticRoutes(self.config.static_routes.clone()),
            AttributeId::LastResetTime => AttributeValue::LastResetTime(self.stats.last_reset()),
            AttributeId::Statistic { counter, index } => {
                if index >= counter.dimension().len() {
                    return Err(RequestError::InvalidParameter(format!(
                        "index {index} out of range for {counter}"
                    )));
                }
                AttributeValue::Statistic {
                    counter,
                    index,
                    value: self.stats.get(counter, index),
                }
            }
        })
    }

    /// Write an attribute. Only configuration attributes are writable.
    pub fn set(&mut self, value: AttributeValue) -> Result<(), RequestError> {
        match value {
            AttributeValue::HeadEndContext(context) => {
                self.config.head_end_context = context;
            }
            AttributeValue::StaticRoutes(routes) => {
                NwkConfig::validate_routes(&routes).map_err(RequestError::InvalidParameter)?;
                self.config.static_routes = routes;
            }
            other => return Err(RequestError::ReadOnlyAttribute(other.id())),
        }
        info!(
            head_end_context = self.config.head_end_context,
            static_routes = self.config.static_routes.len(),
            "configuration updated"
        );
        self.persist_config();
        Ok(())
    }

    fn reset(&mut self, kind: ResetKind) {
        if kind == ResetKind::All {
            self.config = NwkConfig::default();
            self.persist_config();
        }
        self.stats.reset();
        self.persist_stats();
        info!(%kind, "network layer reset");
    }

    fn start(&mut self) {
        if self.state != LayerState::Operational {
            self.state = LayerState::Operational;
            info!(local_id = %self.identity.extension_id, "network layer operational");
        }
    }

    fn stop(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.mac.purge(pending.mac_handle);
            pending.sink.deliver(Confirm::Data {
                handle: pending.handle,
                result: Err(RequestError::NotOperational),
            });
        }
        if self.state != LayerState::Idle {
            self.state = LayerState::Idle;
            info!("network layer idle");
        }
    }

    // -----------------------------------------------------------------------
    // Data path
    // -----------------------------------------------------------------------

    fn submit_data(
        &mut self,
        handle: u16,
        request: DataRequest,
        sink: ConfirmSink,
    ) -> Result<(), (ConfirmSink, RequestError)> {
        match self.prepare_data(&request) {
            Ok((mac_request, link)) => {
                let mac_handle = mac_request.handle;
                if let Err(e) = self.mac.send(mac_request) {
                    self.count(StatCounter::OutDiscards, link.index());
                    return Err((sink, mac_error(e)));
                }
                debug!(handle, mac_handle, %link, port = %request.port, "data request sent");

                if let Some(stale) = self.pending.take() {
                    warn!(
                        stale_handle = stale.handle,
                        handle, "data request overlaps an unconfirmed one; discarding the older"
                    );
                }
                self.pending = Some(PendingData {
                    handle,
                    mac_handle,
                    port: request.port,
                    link,
                    payload_len: request.payload.len(),
                    deadline: Instant::now() + self.runtime.confirm_timeout,
                    sink,
                });
                Ok(())
            }
            Err(e) => {
                let counter = if e == RequestError::NoRoute {
                    StatCounter::OutNoRoutes
                } else {
                    StatCounter::OutDiscards
                };
                let link = match request.link_override {
                    LinkOverride::Backhaul => PhysicalLink::Backhaul,
                    LinkOverride::None | LinkOverride::DirectMac => PhysicalLink::Rf,
                };
                self.count(counter, link.index());
                debug!(handle, error = %e, "data request rejected");
                Err((sink, e))
            }
        }
    }

    fn prepare_data(
        &mut self,
        request: &DataRequest,
    ) -> Result<(MacDataRequest, PhysicalLink), RequestError> {
        if self.state != LayerState::Operational {
            return Err(RequestError::NotOperational);
        }
        let qos = Qos::new(request.qos)?;
        let route = route_outbound(request, self.route_context())?;
        let frame = build_data_frame(
            &request.payload,
            &route.frame_destination,
            qos,
            route.next_hop.as_ref(),
            request.port,
            request.port,
        )?;
        let handle = self.allocate_mac_handle()?;
        let channel_set = request
            .link_settings_override
            .channel_set()
            .unwrap_or_else(|| ChannelSet::for_destination(route.mac_destination));

        Ok((
            mac_request(handle, route.link, route.mac_destination, frame, qos, channel_set),
            route.link,
        ))
    }

    /// Apply a MAC transmit outcome.
    pub fn handle_mac_confirm(&mut self, confirm: MacConfirm) {
        let success = confirm.status == MacStatus::Success;

        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.mac_handle == confirm.handle)
        {
            let Some(pending) = self.pending.take() else {
                return;
            };
            let result = if success {
                let link = pending.link.index();
                self.count(StatCounter::OutRequests, link);
                self.count_by(StatCounter::OutOctets, octets(pending.payload_len), link);
                self.count(StatCounter::OutPortRequests, pending.port.index());
                Ok(())
            } else {
                self.count(StatCounter::OutDiscards, pending.link.index());
                Err(RequestError::MacFailure(confirm.status))
            };
            debug!(handle = pending.handle, status = %confirm.status, "data request confirmed");
            pending.sink.deliver(Confirm::Data {
                handle: pending.handle,
                result,
            });
        } else if let Some(forward) = self.forwards.remove(&confirm.handle) {
            if !success {
                self.count(StatCounter::OutDiscards, forward.link.index());
                debug!(mac_handle = confirm.handle, status = %confirm.status, "forward failed");
            }
        } else {
            warn!(
                error = %RequestError::InvalidHandle(confirm.handle),
                status = %confirm.status,
                "MAC confirm for unknown handle"
            );
        }
    }

    /// Expire work whose MAC confirm is overdue.
    ///
    /// An overdue data request is purged and confirmed `ServiceUnavailable`.
    /// Overdue forwards are purged and released from the forward table.
    pub fn sweep(&mut self, now: Instant) {
        self.expire_forwards(now);
        if !self.pending.as_ref().is_some_and(|p| p.deadline <= now) {
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };
        warn!(
            handle = pending.handle,
            mac_handle = pending.mac_handle,
            "MAC confirm overdue; purging"
        );
        self.mac.purge(pending.mac_handle);
        self.count(StatCounter::OutDiscards, pending.link.index());
        pending.sink.deliver(Confirm::Data {
            handle: pending.handle,
            result: Err(RequestError::ServiceUnavailable),
        });
    }

    fn expire_forwards(&mut self, now: Instant) {
        let mut expired: Vec<(u16, PhysicalLink)> = self
            .forwards
            .iter()
            .filter(|(_, forward)| forward.deadline <= now)
            .map(|(&handle, forward)| (handle, forward.link))
            .collect();
        if expired.is_empty() {
            return;
        }
        expired.sort_unstable_by_key(|&(handle, _)| handle);
        warn!(count = expired.len(), "forward confirms overdue; purging");

        for (handle, link) in expired {
            self.forwards.remove(&handle);
            self.mac.purge(handle);
            self.count(StatCounter::OutDiscards, link.index());
        }
    }

    // -----------------------------------------------------------------------
    // Receive path
    // -----------------------------------------------------------------------

    /// Decode, route and deliver or forward one received frame.
    pub fn handle_mac_indication(&mut self, indication: MacIndication) {
        let link = indication.link;
        if self.state != LayerState::Operational {
            self.count(StatCounter::InDiscards, link.index());
            return;
        }

        let len = indication.payload.len();
        let frame = match Frame::decode(indication.payload) {
            Ok(frame) => frame,
            Err(e) => {
                let counter = e.counter();
                warn!(%link, peer = %indication.source, error = %e, %counter, "dropping malformed frame");
                self.count(counter, link.index());
                return;
            }
        };
        self.count(StatCounter::InReceives, link.index());
        self.count_by(StatCounter::InOctets, octets(len), link.index());

        match route_inbound(&frame, link, self.route_context()) {
            RouteDecision::Deliver => self.deliver(frame, link, indication.source),
            RouteDecision::Forward(plan) => self.forward(frame, plan, indication.source),
            RouteDecision::Drop(counter) => {
                debug!(%link, destination = %frame.destination(), %counter, "frame dropped");
                self.count(counter, link.index());
            }
        }
    }

    fn deliver(&mut self, frame: Frame, link: PhysicalLink, peer: ExtensionId) {
        let port = frame.port();
        let Some(handler) = self.handlers[port.index()].as_mut() else {
            debug!(%port, "no handler registered; discarding");
            self.count(StatCounter::InPortDiscards, port.index());
            return;
        };

        let indication = DataIndication {
            port,
            source: frame.source().resolve(peer),
            destination: frame.destination().resolve(self.identity.extension_id),
            qos: frame.qos(),
            link,
            payload: frame.payload().to_vec(),
        };
        debug!(%port, source = %indication.source, len = indication.payload.len(), "delivering");
        handler.on_indication(indication);
        self.count(StatCounter::InDelivers, port.index());
    }

    fn forward(&mut self, mut frame: Frame, plan: ForwardPlan, peer: ExtensionId) {
        let out = plan.link.index();
        if let Err(e) = frame.expand_source(peer) {
            warn!(error = %e, "cannot make source explicit; dropping forward");
            self.count(StatCounter::OutDiscards, out);
            return;
        }
        if plan.consume_hop {
            frame.consume_one_hop();
        }
        if plan.elide_destination {
            frame.elide_destination();
        }

        if self.forwards.len() >= MAX_FORWARDS_IN_FLIGHT {
            warn!(in_flight = self.forwards.len(), "forward table full");
            self.count(StatCounter::OutDiscards, out);
            return;
        }
        let handle = match self.allocate_mac_handle() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "no MAC handle for forward");
                self.count(StatCounter::OutDiscards, out);
                return;
            }
        };

        let qos = frame.qos();
        let channel_set = ChannelSet::for_destination(plan.next_hop);
        let request = mac_request(handle, plan.link, plan.next_hop, frame.into_bytes(), qos, channel_set);
        match self.mac.send(request) {
            Ok(()) => {
                debug!(mac_handle = handle, link = %plan.link, "frame forwarded");
                self.forwards.insert(
                    handle,
                    InFlightForward {
                        link: plan.link,
                        deadline: Instant::now() + self.runtime.confirm_timeout,
                    },
                );
                self.count(StatCounter::ForwDatagrams, out);
            }
            Err(e) => {
                warn!(error = %e, "MAC refused forward");
                self.count(StatCounter::OutDiscards, out);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn route_context(&self) -> RouteContext<'_> {
        RouteContext {
            identity: &self.identity,
            config: &self.config,
        }
    }

    fn allocate_mac_handle(&mut self) -> Result<u16, RequestError> {
        // The pending request plus the forward table bound the handles in use,
        // so a free one is found long before the space is exhausted.
        for _ in 0..=MAX_FORWARDS_IN_FLIGHT + 1 {
            let candidate = self.next_mac_handle;
            self.next_mac_handle = self.next_mac_handle.wrapping_add(1);
            let in_use = self.forwards.contains_key(&candidate)
                || self.pending.as_ref().is_some_and(|p| p.mac_handle == candidate);
            if !in_use {
                return Ok(candidate);
            }
        }
        Err(RequestError::TransactionOverflow)
    }

    fn count(&mut self, counter: StatCounter, index: usize) {
        self.count_by(counter, 1, index);
    }

    fn count_by(&mut self, counter: StatCounter, amount: u32, index: usize) {
        if self.stats.increment(counter, amount, index) {
            self.persist_stats();
        }
    }

    fn persist_config(&mut self) {
        let config = self.config.clone();
        self.persist(CONFIG_SLOT, &config);
    }

    fn persist_stats(&mut self) {
        let block = self.stats.block().clone();
        self.persist(STATS_SLOT, &block);
    }

    fn persist<T: Serialize>(&mut self, slot: &str, value: &T) {
        if let Err(e) = save_record(self.store.as_mut(), slot, value) {
            warn!(slot, error = %e, "failed to persist record");
        }
    }
}

impl std::fmt::Debug for NetworkLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkLayer")
            .field("identity", &self.identity)
            .field("state", &self.state)
            .field("config", &self.config)
            .field("pending", &self.pending.as_ref().map(|p| p.handle))
            .field("forwards", &self.forwards.len())
            .finish_non_exhaustive()
    }
}

fn restore<T: serde::de::DeserializeOwned>(store: &dyn RecordStore, slot: &str) -> Option<T> {
    match load_record(store, slot) {
        Ok(record) => record,
        Err(e) => {
            warn!(slot, error = %e, "ignoring unreadable record");
            None
        }
    }
}

fn mac_request(
    handle: u16,
    link: PhysicalLink,
    destination: MacDestination,
    payload: Vec<u8>,
    qos: Qos,
    channel_set: ChannelSet,
) -> MacDataRequest {
    let params = qos.params();
    MacDataRequest {
        handle,
        link,
        destination,
        payload,
        ack_required: params.ack_required,
        priority: params.priority,
        droppable: params.droppable,
        reliability: params.reliability,
        channel_set,
    }
}

fn mac_error(e: MacError) -> RequestError {
    match e {
        MacError::Idle => RequestError::MacIdle,
        MacError::QueueFull => RequestError::TransactionOverflow,
        MacError::Disconnected => RequestError::ServiceUnavailable,
    }
}

fn octets(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
