//! Route resolution and per-route accumulation.
//!
//! [`RouteInfo`] names the three domains a message crosses: the source-side
//! domain, the common ancestor, and the destination-side domain. The router
//! ([`router`]) finds a route by scanning the sender's domains in
//! `(priority, name)` order; the accumulator ([`accumulate`]) turns a route
//! into the hop-by-hop sequence of domains and sums their delays and
//! filters.

pub(crate) mod accumulate;
pub(crate) mod router;

use crate::ids::DomainId;

/// A resolved route between two endpoints.
///
/// `source` contains the sender, `dest` contains (or leads down to) the
/// receiver, and `ancestor` is the communication-domain ancestor that
/// granted the route. A *trivial* route has all three equal: both endpoints
/// share the domain and no forest traversal happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteInfo {
    /// The domain containing the sender.
    pub source: DomainId,
    /// The common ancestor that granted the route.
    pub ancestor: DomainId,
    /// The domain containing, or leading down to, the receiver.
    pub dest: DomainId,
}

impl RouteInfo {
    /// Whether both endpoints share one domain.
    pub fn is_trivial(&self) -> bool {
        self.source == self.ancestor && self.ancestor == self.dest
    }
}
