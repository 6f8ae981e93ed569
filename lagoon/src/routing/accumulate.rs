//! Hop-by-hop accumulation of delays and filters along a route.

use crate::domain::forwarding::Hop;
use crate::ids::{DomainId, Endpoint};
use crate::message::{CompoundFilter, Message};
use crate::routing::RouteInfo;
use crate::sim::World;

/// One consulted domain on a route, with the stations before and after it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HopStep {
    pub(crate) domain: DomainId,
    pub(crate) from: Hop,
    pub(crate) to: Hop,
}

/// The domains consulted for a route, in traversal order.
///
/// A route whose source and destination domains coincide consults that one
/// domain once, whatever its ancestor. Otherwise the sequence climbs from
/// the source domain to just below the ancestor, crosses the ancestor, and
/// descends to the destination domain; each step records the previous and
/// next station handed to that domain's forwarding info. The first station
/// is the sending endpoint and the last is the receiving one. `None` means
/// a parent chain no longer connects the route's domains, which counts as
/// no route.
pub(crate) fn hop_sequence(
    world: &World,
    route: &RouteInfo,
    src: Endpoint,
    dest: Endpoint,
) -> Option<Vec<HopStep>> {
    let src: Hop = src.into();
    let dest: Hop = dest.into();
    if route.source == route.dest {
        return Some(vec![HopStep {
            domain: route.source,
            from: src,
            to: dest,
        }]);
    }

    let up = chain_below(world, route.source, route.ancestor)?;
    let down = {
        let mut d = chain_below(world, route.dest, route.ancestor)?;
        d.reverse();
        d
    };

    let mut steps = Vec::with_capacity(up.len() + down.len() + 1);
    for (i, &u) in up.iter().enumerate() {
        steps.push(HopStep {
            domain: u,
            from: if i == 0 { src } else { Hop::Domain(up[i - 1]) },
            to: Hop::Domain(up.get(i + 1).copied().unwrap_or(route.ancestor)),
        });
    }

    let into_ancestor = up.last().map(|&u| Hop::Domain(u)).unwrap_or(src);
    if route.dest == route.ancestor {
        steps.push(HopStep {
            domain: route.ancestor,
            from: into_ancestor,
            to: dest,
        });
        return Some(steps);
    }
    steps.push(HopStep {
        domain: route.ancestor,
        from: into_ancestor,
        to: Hop::Domain(down[0]),
    });

    if down[0] == route.dest {
        steps.push(HopStep {
            domain: route.dest,
            from: Hop::Domain(route.ancestor),
            to: dest,
        });
        return Some(steps);
    }
    // The first descending step keeps the last source-side domain as its
    // previous station.
    let last_source_side = up.last().copied().unwrap_or(route.source);
    for (j, &v) in down.iter().enumerate() {
        steps.push(HopStep {
            domain: v,
            from: Hop::Domain(if j == 0 { last_source_side } else { down[j - 1] }),
            to: down
                .get(j + 1)
                .map(|&next| Hop::Domain(next))
                .unwrap_or(dest),
        });
    }
    Some(steps)
}

/// Total delay over the route's hops.
pub(crate) fn delay_over(world: &World, steps: &[HopStep], msg: &Message) -> u64 {
    steps
        .iter()
        .map(|step| {
            world
                .domains
                .get(step.domain.index())
                .map(|d| {
                    d.forwarding
                        .local_delay(world, step.domain, step.from, msg, step.to)
                })
                .unwrap_or(0)
        })
        .sum()
}

/// The compound of every per-hop filter along the route, in hop order.
pub(crate) fn filter_over(world: &World, steps: &[HopStep], msg: &Message) -> CompoundFilter {
    let mut compound = CompoundFilter::new();
    for step in steps {
        if let Some(d) = world.domains.get(step.domain.index()) {
            if let Some(f) = d
                .forwarding
                .local_filter(world, step.domain, step.from, msg, step.to)
            {
                compound.push(f);
            }
        }
    }
    compound
}

/// Domains from `from` up to but excluding `ancestor`. Empty when
/// `from == ancestor`; `None` when the parent chain never reaches it.
fn chain_below(world: &World, from: DomainId, ancestor: DomainId) -> Option<Vec<DomainId>> {
    let mut out = Vec::new();
    let mut cur = from;
    while cur != ancestor {
        out.push(cur);
        cur = world.domains.get(cur.index()).and_then(|d| d.parent)?;
    }
    Some(out)
}

impl World {
    /// Total forwarding delay, in ticks, a message would accrue over
    /// `route`.
    ///
    /// `None` when the route's domains are no longer connected.
    pub fn route_delay(
        &self,
        route: &RouteInfo,
        src: impl Into<Endpoint>,
        dest: impl Into<Endpoint>,
        msg: &Message,
    ) -> Option<u64> {
        let steps = hop_sequence(self, route, src.into(), dest.into())?;
        Some(delay_over(self, &steps, msg))
    }
}
