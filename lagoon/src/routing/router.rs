//! Route search over the sender's domains.

use crate::domain::{CommTypeSet, UNSEARCHABLE};
use crate::ids::{DomainId, Endpoint};
use crate::routing::RouteInfo;
use crate::sim::World;
use tracing::trace;

/// Find a route from `src` to `dest`.
///
/// The sender's joined domains are scanned in `(priority, name)` order.
/// Domains whose primary type is outside `types` (when given) are skipped
/// before anything else; a domain at the [`UNSEARCHABLE`] priority then
/// aborts the whole search; non-communication domains are skipped; the first
/// domain whose match succeeds supplies the route. A failed match only
/// disqualifies that candidate.
pub(crate) fn resolve(
    world: &World,
    src: Endpoint,
    dest: Endpoint,
    types: Option<&CommTypeSet>,
    pinned: Option<DomainId>,
) -> Option<RouteInfo> {
    let type_matches = |id: DomainId| {
        let Some(types) = types else {
            return true;
        };
        world
            .domains
            .get(id.index())
            .and_then(|d| d.primary_type.as_ref())
            .is_some_and(|ty| types.contains(ty))
    };
    if let Some(domain) = pinned {
        if !type_matches(domain) || !world.is_comm(domain) {
            return None;
        }
        return communication_match(world, domain, src, dest);
    }
    let keys = match src {
        Endpoint::Actor(a) => world.actor_domain_keys(a),
        Endpoint::Group(g) => world
            .groups
            .get(g.index())
            .map(|group| group.domains.iter().cloned().collect())
            .unwrap_or_default(),
    };
    for key in keys {
        if !type_matches(key.id) {
            continue;
        }
        if key.priority == UNSEARCHABLE {
            trace!(domain = %key.id, "route search hit unsearchable domain");
            return None;
        }
        if !world.is_comm(key.id) {
            continue;
        }
        if let Some(route) = communication_match(world, key.id, src, dest) {
            trace!(%src, %dest, ?route, "route resolved");
            return Some(route);
        }
    }
    None
}

/// Try to route `src` -> `dest` through communication domain `d`.
///
/// When both endpoints are members, the domain's own policy decides. When
/// only the sender is a member, the ancestor chain above `d` is walked
/// looking for an ancestor that either contains the destination or appears
/// in the destination's ancestor index; the first such ancestor's policy
/// decision is final. When only the receiver is a member, the chain above
/// `d` is walked for an ancestor containing the sender. The walks stop at
/// the first non-communication ancestor.
fn communication_match(
    world: &World,
    d: DomainId,
    src: Endpoint,
    dest: Endpoint,
) -> Option<RouteInfo> {
    let src_member = world.domain_contains(d, src);
    let dest_member = world.domain_contains(d, dest);
    let policy_of = |id: DomainId| world.domains.get(id.index()).map(|dom| dom.policy.clone());

    if src_member && dest_member {
        let policy = policy_of(d)?;
        if policy.same_domain(world, d, src, dest) {
            return Some(RouteInfo {
                source: d,
                ancestor: d,
                dest: d,
            });
        }
        return None;
    }

    if src_member {
        let mut p = Some(d);
        while let Some(anc) = p {
            if !world.is_comm(anc) {
                break;
            }
            let direct = world.domain_contains(anc, dest).then_some(anc);
            let indexed = world.first_child_domain_under(dest, anc);
            if let Some(d2) = direct.or(indexed) {
                let policy = policy_of(anc)?;
                return policy.across_ancestor(world, anc, src, dest, d, d2);
            }
            p = world.domains.get(anc.index()).and_then(|dom| dom.parent);
        }
        return None;
    }

    if dest_member {
        let mut p = world.domains.get(d.index()).and_then(|dom| dom.parent);
        while let Some(anc) = p {
            if !world.is_comm(anc) {
                break;
            }
            if world.domain_contains(anc, src) {
                let policy = policy_of(anc)?;
                return policy.across_ancestor(world, anc, src, dest, anc, d);
            }
            p = world.domains.get(anc.index()).and_then(|dom| dom.parent);
        }
        return None;
    }

    None
}

impl World {
    /// Resolve a route from `src` to `dest`, optionally restricted to
    /// domains whose primary communication-domain type lies in `types`.
    ///
    /// `None` means the endpoints cannot communicate.
    pub fn resolve_route(
        &self,
        src: impl Into<Endpoint>,
        dest: impl Into<Endpoint>,
        types: Option<&CommTypeSet>,
    ) -> Option<RouteInfo> {
        resolve(self, src.into(), dest.into(), types, None)
    }

    /// Resolve a route through one specific communication domain, bypassing
    /// the ordered search. A type restriction still applies to the pinned
    /// domain itself.
    pub fn resolve_route_via(
        &self,
        domain: DomainId,
        src: impl Into<Endpoint>,
        dest: impl Into<Endpoint>,
        types: Option<&CommTypeSet>,
    ) -> Option<RouteInfo> {
        resolve(self, src.into(), dest.into(), types, Some(domain))
    }
}
