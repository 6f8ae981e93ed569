//! Error types for configuration and lifecycle operations.
//!
//! Routing has no error type of its own: a failed route resolution and a
//! message deleted by a filter are expected outcomes, reported through
//! `Option` and `bool` returns rather than `Result`.

use crate::ids::{ActorId, ConditionId, DomainId, GroupId, MemberId};
use thiserror::Error;

/// Rejected configuration operations.
///
/// These are fatal to the operation that caused them, never to the
/// simulation as a whole.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The requested name is already registered for this entity kind.
    #[error("name `{0}` is already in use")]
    NameInUse(String),

    /// A communication-domain type was configured after it was sealed.
    ///
    /// Reading the communication flag or type seals the configuration;
    /// reconfiguring with the same primary type is a no-op, anything else
    /// lands here.
    #[error("communication-domain configuration of {0} is sealed")]
    TypeSealed(DomainId),

    /// A child domain was linked under a parent that is not a
    /// communication domain.
    #[error("parent {0} is not a communication domain")]
    ParentNotCommDomain(DomainId),

    /// A shared membership and one of its actors both tried to join the
    /// same domain.
    #[error("shared membership and actor would overlap in {0}")]
    DomainConflict(DomainId),

    /// The membership is not shared, so it cannot be attached to actors
    /// or deleted on its own.
    #[error("membership {0} is not shared")]
    NotShared(MemberId),

    /// Registering this group member would create a membership cycle.
    #[error("adding {member} to {group} would create a group cycle")]
    GroupCycle {
        /// The group being registered into.
        group: GroupId,
        /// The group that was being added as a member.
        member: GroupId,
    },

    /// The domain id does not resolve to a live domain.
    #[error("unknown domain {0}")]
    UnknownDomain(DomainId),

    /// The actor id does not resolve to a live actor.
    #[error("unknown actor {0}")]
    UnknownActor(ActorId),

    /// The group id does not resolve to a live group.
    #[error("unknown group {0}")]
    UnknownGroup(GroupId),

    /// The membership id does not resolve to a live membership.
    #[error("unknown membership {0}")]
    UnknownMembership(MemberId),

    /// The condition id does not resolve to a live condition.
    #[error("unknown condition {0}")]
    UnknownCondition(ConditionId),
}

/// Rejected deletions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeleteError {
    /// The domain still has child domains and cannot be deleted.
    #[error("domain {domain} still has {children} child domain(s)")]
    HasChildren {
        /// The domain whose deletion was rejected.
        domain: DomainId,
        /// Number of live children.
        children: usize,
    },

    /// The target does not resolve to a live entity (already deleted).
    #[error(transparent)]
    Unknown(#[from] ConfigError),
}
