//! Per-domain forwarding strategies.
//!
//! Every domain carries a [`ForwardingInfo`] supplying the delay and message
//! filter contributed by one hop through that domain. The default is
//! neutral: zero delay, no filter.

use crate::ids::{ActorId, DomainId, Endpoint, GroupId};
use crate::message::{Message, MessageFilter};
use crate::sim::World;
use std::rc::Rc;

/// One end of a single hop: the previous or next station on a route.
///
/// Hops at the edges of a route name endpoints; interior hops name domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    /// An actor endpoint.
    Actor(ActorId),
    /// A group endpoint.
    Group(GroupId),
    /// An intermediate domain.
    Domain(DomainId),
}

impl From<Endpoint> for Hop {
    fn from(endpoint: Endpoint) -> Self {
        match endpoint {
            Endpoint::Actor(id) => Hop::Actor(id),
            Endpoint::Group(id) => Hop::Group(id),
        }
    }
}

/// The delay and filter one domain contributes to a hop.
///
/// `domain` is the domain whose tables are being consulted; `from` is the
/// previous station (the sending endpoint on the first hop, a domain
/// afterwards) and `to` the next one (a domain, or the receiving endpoint on
/// the final hop).
pub trait ForwardingInfo {
    /// Delay in ticks contributed by this hop.
    fn local_delay(
        &self,
        world: &World,
        domain: DomainId,
        from: Hop,
        msg: &Message,
        to: Hop,
    ) -> u64 {
        let _ = (world, domain, from, msg, to);
        0
    }

    /// Filter contributed by this hop, if any.
    fn local_filter(
        &self,
        world: &World,
        domain: DomainId,
        from: Hop,
        msg: &Message,
        to: Hop,
    ) -> Option<Rc<dyn MessageFilter>> {
        let _ = (world, domain, from, msg, to);
        None
    }
}

/// The default forwarding info: zero delay, no filter on every hop.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralForwarding;

impl ForwardingInfo for NeutralForwarding {}
