//! # Lagoon
//!
//! Discrete-event actor simulation with domain-based message routing.
//!
//! Actors exchange messages through *domains*: named groupings arranged in
//! priority-ordered forests. Two actors in the same domain talk directly;
//! actors in different branches talk through the nearest common ancestor,
//! and every domain crossed on the way contributes a delay and an optional
//! message filter. *Groups* are endpoints that fan a message out to their
//! members, and *conditions* push change notifications to every actor that
//! joined an observing domain with tracking enabled.
//!
//! Key properties:
//! - **Deterministic**: same seed and same call sequence produce identical
//!   runs. Ties on the event queue break in scheduling order and domain
//!   iteration follows `(priority, name)` order.
//! - **Single-threaded**: the [`World`] owns everything; behaviors run
//!   synchronously to completion, one event at a time.
//! - **Open routing**: per-domain [`ForwardingInfo`](domain::forwarding::ForwardingInfo)
//!   and [`RoutePolicy`](domain::policy::RoutePolicy) hooks shape delays,
//!   filtering, and which routes are granted at all.
//!
//! ## Quick start
//!
//! ```
//! use lagoon::{CommDomainType, Message, World};
//!
//! let mut world = World::new();
//! let top = world.create_domain("campus", 0)?;
//! world.configure_as_communication_domain(top, CommDomainType::of("net"))?;
//! let left = world.create_child_domain("left", 1, top)?;
//! let right = world.create_child_domain("right", 1, top)?;
//!
//! let alice = world.create_sink_actor("alice")?;
//! let bob = world.create_sink_actor("bob")?;
//! assert!(world.actor_join(alice, left, false));
//! assert!(world.actor_join(bob, right, false));
//!
//! // alice -> left -> campus -> right -> bob
//! let route = world.resolve_route(alice, bob, None).unwrap();
//! assert!(!route.is_trivial());
//!
//! assert!(world.send(alice, bob, Message::new("hello")));
//! world.run();
//! # Ok::<(), lagoon::ConfigError>(())
//! ```
//!
//! ## Routing in one paragraph
//!
//! A send scans the sender's domains in `(priority, name)` order and asks
//! each communication domain for a match; the first success yields a
//! [`RouteInfo`] naming the source-side domain, the granting ancestor, and
//! the destination-side domain. A domain at the [`UNSEARCHABLE`] priority
//! ends the scan early, which makes the searchable portion of an actor's
//! domains an explicit prefix. The route is then unrolled into hops, one
//! per domain crossed, and their delays and filters accumulate in traversal
//! order.

#![warn(missing_docs)]

pub mod actor;
pub mod condition;
pub mod domain;
pub mod error;
pub mod group;
pub mod ids;
pub mod message;
pub mod routing;
mod sim;

pub use actor::{ActorBehavior, MessageSource};
pub use condition::{ConditionChange, ConditionMode};
pub use domain::{CommDomainType, CommTypeSet, UNSEARCHABLE};
pub use error::{ConfigError, DeleteError};
pub use group::{GroupBehavior, RelayToAll};
pub use ids::{ActorId, ConditionId, DomainId, Endpoint, GroupId, MemberId};
pub use message::{CompoundFilter, FilterOutcome, Message, MessageFilter};
pub use routing::RouteInfo;
pub use sim::{EventHandle, World};
