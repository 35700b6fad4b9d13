//! Routing decisions.
//!
//! Both directions are pure functions of the frame or request plus the node
//! identity and configuration. The layer applies the result.

use fannwk_models::{Address, Frame, NextHopHeader, PhysicalLink, StatCounter};
use tracing::debug;

use crate::config::{NodeIdentity, NwkConfig};
use crate::error::RequestError;
use crate::mac::MacDestination;
use crate::request::{DataRequest, LinkOverride};

/// What the router sees of the layer.
#[derive(Debug, Clone, Copy)]
pub struct RouteContext<'a> {
    /// This node's address and capabilities.
    pub identity: &'a NodeIdentity,
    /// Head-end context and static routes.
    pub config: &'a NwkConfig,
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// How to re-send a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardPlan {
    /// Link to transmit on.
    pub link: PhysicalLink,
    /// MAC-level receiver of the re-sent frame.
    pub next_hop: MacDestination,
    /// The next hop is the final destination; drop the destination field.
    pub elide_destination: bool,
    /// Strip this node's entry from a non-persistent route.
    pub consume_hop: bool,
}

/// Outcome of routing one received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Hand to the local port handler.
    Deliver,
    /// Send on toward another node.
    Forward(ForwardPlan),
    /// Discard and count against the named counter.
    Drop(StatCounter),
}

/// Decide what to do with a decoded frame that arrived on `arrival`.
pub fn route_inbound(frame: &Frame, arrival: PhysicalLink, ctx: RouteContext<'_>) -> RouteDecision {
    let local = ctx.identity.address();

    match *frame.destination() {
        Address::Elided => RouteDecision::Deliver,
        Address::ExtensionId(id) if id == ctx.identity.extension_id => RouteDecision::Deliver,
        destination @ Address::ExtensionId(_) => match frame.next_hop() {
            Some(route) => forward_by_route(route, &local, &destination),
            None => RouteDecision::Drop(StatCounter::InNoRoutes),
        },
        Address::Context(context) if context == ctx.config.head_end_context => {
            if arrival == PhysicalLink::Backhaul {
                // Already on the backhaul; re-broadcasting it there would loop.
                debug!(context, "head-end frame arrived on the backhaul");
                RouteDecision::Drop(StatCounter::InNoRoutes)
            } else if ctx.identity.relay_capable {
                RouteDecision::Forward(ForwardPlan {
                    link: PhysicalLink::Backhaul,
                    next_hop: MacDestination::Broadcast,
                    elide_destination: false,
                    consume_hop: false,
                })
            } else {
                // Head-end traffic never goes back out over RF.
                RouteDecision::Drop(StatCounter::InNoRoutes)
            }
        }
        Address::Context(_) => RouteDecision::Drop(StatCounter::InAddrErrors),
        Address::Multicast(group) => {
            if ctx.identity.device_class.accepts(&group) {
                RouteDecision::Deliver
            } else {
                RouteDecision::Drop(StatCounter::InAddrErrors)
            }
        }
        Address::FullIpv6(_) => RouteDecision::Drop(StatCounter::InAddrErrors),
    }
}

fn forward_by_route(route: &NextHopHeader, local: &Address, destination: &Address) -> RouteDecision {
    let Some(next) = route.next_destination(local, destination) else {
        debug!(%destination, "not on the source route");
        return RouteDecision::Drop(StatCounter::InNoRoutes);
    };
    let Some(next_id) = next.extension_id() else {
        return RouteDecision::Drop(StatCounter::InAddrErrors);
    };
    RouteDecision::Forward(ForwardPlan {
        link: PhysicalLink::Rf,
        next_hop: MacDestination::Unicast(next_id),
        elide_destination: next == *destination,
        consume_hop: !route.persist(),
    })
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Where and how a locally originated frame is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRoute {
    /// Link to transmit on.
    pub link: PhysicalLink,
    /// MAC-level receiver of the frame.
    pub mac_destination: MacDestination,
    /// Destination as written into the frame.
    pub frame_destination: Address,
    /// Source-route header from a matching static route.
    pub next_hop: Option<NextHopHeader>,
}

impl OutboundRoute {
    /// A single-hop route with no next-hop header.
    fn direct(link: PhysicalLink, mac_destination: MacDestination, frame_destination: Address) -> Self {
        Self {
            link,
            mac_destination,
            frame_destination,
            next_hop: None,
        }
    }
}

/// Resolve the link, MAC destination and encoding for a data request.
pub fn route_outbound(
    request: &DataRequest,
    ctx: RouteContext<'_>,
) -> Result<OutboundRoute, RequestError> {
    let destination = request.destination;

    match (request.link_override, destination) {
        (_, Address::Elided | Address::FullIpv6(_)) => Err(RequestError::NoRoute),

        (LinkOverride::Backhaul, _) if !ctx.identity.relay_capable => Err(RequestError::NoRoute),
        (LinkOverride::Backhaul, _) => Ok(OutboundRoute::direct(
            PhysicalLink::Backhaul,
            MacDestination::Broadcast,
            destination,
        )),

        (LinkOverride::DirectMac, Address::ExtensionId(id)) => Ok(OutboundRoute::direct(
            PhysicalLink::Rf,
            MacDestination::Unicast(id),
            Address::Elided,
        )),
        (LinkOverride::DirectMac, _) => Err(RequestError::NoRoute),

        (LinkOverride::None, Address::ExtensionId(id)) => match ctx.config.route_to(&id) {
            Some(route) => {
                let header = route
                    .header()
                    .map_err(|e| RequestError::InvalidParameter(e.to_string()))?;
                let first = route.first_hop().ok_or(RequestError::NoRoute)?;
                Ok(OutboundRoute {
                    link: PhysicalLink::Rf,
                    mac_destination: MacDestination::Unicast(first),
                    frame_destination: destination,
                    next_hop: Some(header),
                })
            }
            // Implicit one-hop route: the MAC destination already names the node.
            None => Ok(OutboundRoute::direct(
                PhysicalLink::Rf,
                MacDestination::Unicast(id),
                Address::Elided,
            )),
        },
        (LinkOverride::None, Address::Context(_)) if ctx.identity.relay_capable => {
            Ok(OutboundRoute::direct(
                PhysicalLink::Backhaul,
                MacDestination::Broadcast,
                destination,
            ))
        }
        (LinkOverride::None, Address::Context(_) | Address::Multicast(_)) => Ok(
            OutboundRoute::direct(PhysicalLink::Rf, MacDestination::Broadcast, destination),
        ),
    }
}
