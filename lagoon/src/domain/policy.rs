//! Overridable routing decisions.
//!
//! Two hooks shape route resolution: whether two co-located endpoints may
//! talk at all, and what route a common ancestor grants across domains. The
//! defaults allow everything.

use crate::ids::{DomainId, Endpoint};
use crate::routing::RouteInfo;
use crate::sim::World;

/// Per-domain route policy.
pub trait RoutePolicy {
    /// Whether `src` may send to `dest` when both are members of `domain`.
    ///
    /// Returning `false` rejects this candidate domain only; the route
    /// search continues with the source's next domain.
    fn same_domain(&self, world: &World, domain: DomainId, src: Endpoint, dest: Endpoint) -> bool {
        let _ = (world, domain, src, dest);
        true
    }

    /// Route granted when this domain is the common ancestor of `src_domain`
    /// (containing `src`) and `dest_domain` (containing or leading to
    /// `dest`).
    ///
    /// Returning `None` rejects the communication; the decision of the first
    /// qualifying ancestor is final for the candidate branch.
    fn across_ancestor(
        &self,
        world: &World,
        ancestor: DomainId,
        src: Endpoint,
        dest: Endpoint,
        src_domain: DomainId,
        dest_domain: DomainId,
    ) -> Option<RouteInfo> {
        let _ = (world, src, dest);
        Some(RouteInfo {
            source: src_domain,
            ancestor,
            dest: dest_domain,
        })
    }
}

/// The default policy: co-located endpoints may always talk, and any common
/// ancestor grants the straightforward route.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl RoutePolicy for AllowAll {}
