//! Opaque identifiers for world-owned entities.
//!
//! Every entity (domain, actor, group, membership, condition) lives in an
//! arena owned by the [`World`](crate::World) and is referred to by one of
//! these ids. Slots are never reused, so an id for a deleted entity simply
//! stops resolving instead of aliasing a newer one.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(u32);

        impl $name {
            pub(crate) fn from_index(index: usize) -> Self {
                Self(index as u32)
            }

            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier for a domain.
    DomainId,
    "domain"
);
entity_id!(
    /// Identifier for an actor.
    ActorId,
    "actor"
);
entity_id!(
    /// Identifier for a group.
    GroupId,
    "group"
);
entity_id!(
    /// Identifier for a domain membership record, shared or private.
    MemberId,
    "member"
);
entity_id!(
    /// Identifier for a condition.
    ConditionId,
    "condition"
);

/// A message source or sink: an actor or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// An actor endpoint.
    Actor(ActorId),
    /// A group endpoint.
    Group(GroupId),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Actor(id) => write!(f, "{id}"),
            Endpoint::Group(id) => write!(f, "{id}"),
        }
    }
}

impl From<ActorId> for Endpoint {
    fn from(id: ActorId) -> Self {
        Endpoint::Actor(id)
    }
}

impl From<GroupId> for Endpoint {
    fn from(id: GroupId) -> Self {
        Endpoint::Group(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_index() {
        assert_eq!(DomainId::from_index(3).to_string(), "domain-3");
        assert_eq!(ActorId::from_index(0).to_string(), "actor-0");
        assert_eq!(ConditionId::from_index(12).to_string(), "condition-12");
    }

    #[test]
    fn ids_order_by_index() {
        assert!(DomainId::from_index(1) < DomainId::from_index(2));
    }

    #[test]
    fn endpoint_conversions() {
        let a = ActorId::from_index(4);
        let g = GroupId::from_index(7);
        assert_eq!(Endpoint::from(a), Endpoint::Actor(a));
        assert_eq!(Endpoint::from(g), Endpoint::Group(g));
        assert_eq!(Endpoint::from(a).to_string(), "actor-4");
    }
}
