//! Domains: named nodes in priority-ordered forests.
//!
//! A domain groups endpoints. Domains flagged as *communication domains*
//! carry a type tag and may be linked into a forest; messages between
//! endpoints in different domains are routed through the forest (see
//! [`crate::routing`]). Each domain contributes a per-hop delay and filter
//! through its [`ForwardingInfo`] and shapes route resolution through its
//! [`RoutePolicy`].

pub mod forwarding;
pub(crate) mod membership;
pub mod policy;

use crate::error::{ConfigError, DeleteError};
use crate::ids::{ConditionId, DomainId, Endpoint, GroupId, MemberId};
use crate::sim::World;
use forwarding::{ForwardingInfo, NeutralForwarding};
use policy::{AllowAll, RoutePolicy};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// The sentinel priority marking a domain as unsearchable.
///
/// During route resolution, reaching an unsearchable domain in the source's
/// ordered domain iteration aborts the entire search, so unsearchable
/// domains mark the end of the searchable prefix rather than being skipped.
pub const UNSEARCHABLE: i32 = i32::MAX;

/// The type tag of a communication domain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommDomainType(String);

impl CommDomainType {
    /// A communication-domain type with the given name.
    pub fn of(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The type name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommDomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A set of communication-domain types, used to restrict route searches.
pub type CommTypeSet = BTreeSet<CommDomainType>;

/// Ordering key for domain sets: `(priority, name)`.
///
/// Names are unique and priorities immutable, so the order is total and
/// stable for the lifetime of a domain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct DomainKey {
    pub(crate) priority: i32,
    pub(crate) name: String,
    pub(crate) id: DomainId,
}

pub(crate) struct Domain {
    pub(crate) name: String,
    pub(crate) priority: i32,
    pub(crate) parent: Option<DomainId>,
    pub(crate) child_count: usize,

    pub(crate) communication: bool,
    pub(crate) primary_type: Option<CommDomainType>,
    pub(crate) type_set: CommTypeSet,
    /// Set by reads as well as writes; once set, the communication
    /// configuration cannot change.
    pub(crate) sealed: Cell<bool>,
    pub(crate) types_extended: Cell<bool>,

    /// Memberships (private and shared) that joined this domain.
    pub(crate) members: BTreeSet<MemberId>,
    pub(crate) tracking_members: BTreeSet<MemberId>,
    pub(crate) groups: BTreeSet<GroupId>,
    pub(crate) conditions: BTreeSet<ConditionId>,
    /// Cached count of actors reachable through `members`.
    pub(crate) actor_count: usize,

    pub(crate) forwarding: Rc<dyn ForwardingInfo>,
    pub(crate) policy: Rc<dyn RoutePolicy>,
}

impl Domain {
    fn new(name: String, priority: i32) -> Self {
        Self {
            name,
            priority,
            parent: None,
            child_count: 0,
            communication: false,
            primary_type: None,
            type_set: CommTypeSet::new(),
            sealed: Cell::new(false),
            types_extended: Cell::new(false),
            members: BTreeSet::new(),
            tracking_members: BTreeSet::new(),
            groups: BTreeSet::new(),
            conditions: BTreeSet::new(),
            actor_count: 0,
            forwarding: Rc::new(NeutralForwarding),
            policy: Rc::new(AllowAll),
        }
    }
}

impl World {
    /// Create a root domain with the given priority.
    ///
    /// Use [`UNSEARCHABLE`] for domains that should never be selected by
    /// the default route search.
    pub fn create_domain(&mut self, name: &str, priority: i32) -> Result<DomainId, ConfigError> {
        if self.domain_names.contains_key(name) {
            return Err(ConfigError::NameInUse(name.to_string()));
        }
        let id = DomainId::from_index(self.domains.insert(Domain::new(name.to_string(), priority)));
        self.domain_names.insert(name.to_string(), id);
        debug!(domain = %name, %id, priority, "created domain");
        Ok(id)
    }

    /// Create a domain under `parent`.
    ///
    /// The parent must already be a communication domain; this call seals
    /// its configuration. The child is sealed as a communication domain
    /// with the parent's type, and the parent link is permanent.
    pub fn create_child_domain(
        &mut self,
        name: &str,
        priority: i32,
        parent: DomainId,
    ) -> Result<DomainId, ConfigError> {
        let parent_type = {
            let p = self
                .domains
                .get(parent.index())
                .ok_or(ConfigError::UnknownDomain(parent))?;
            p.sealed.set(true);
            if !p.communication {
                return Err(ConfigError::ParentNotCommDomain(parent));
            }
            p.primary_type.clone()
        };
        let id = self.create_domain(name, priority)?;
        if let Some(d) = self.domains.get_mut(id.index()) {
            d.parent = Some(parent);
            d.communication = true;
            d.primary_type = parent_type.clone();
            if let Some(ty) = parent_type {
                d.type_set.insert(ty);
            }
            d.sealed.set(true);
        }
        if let Some(p) = self.domains.get_mut(parent.index()) {
            p.child_count += 1;
        }
        debug!(domain = %name, %parent, "created child domain");
        Ok(id)
    }

    /// Flag a domain as a communication domain with the given type.
    ///
    /// Calling again with the same type is a no-op; once the configuration
    /// is sealed (by this call, or by any read of the communication flag or
    /// type), any other reconfiguration is rejected.
    pub fn configure_as_communication_domain(
        &mut self,
        id: DomainId,
        ty: CommDomainType,
    ) -> Result<(), ConfigError> {
        let d = self
            .domains
            .get_mut(id.index())
            .ok_or(ConfigError::UnknownDomain(id))?;
        if d.sealed.get() {
            if d.primary_type.as_ref() == Some(&ty) {
                return Ok(());
            }
            return Err(ConfigError::TypeSealed(id));
        }
        d.communication = true;
        d.type_set.insert(ty.clone());
        d.primary_type = Some(ty);
        d.sealed.set(true);
        Ok(())
    }

    /// Flag a domain as a communication domain with a primary type plus
    /// additional type tags.
    ///
    /// Rejected if the configuration is sealed with a different primary
    /// type or the type set was already extended.
    pub fn configure_comm_domain_types<I>(
        &mut self,
        id: DomainId,
        ty: CommDomainType,
        additional: I,
    ) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = CommDomainType>,
    {
        let d = self
            .domains
            .get_mut(id.index())
            .ok_or(ConfigError::UnknownDomain(id))?;
        if d.sealed.get() && (d.primary_type.as_ref() != Some(&ty) || d.types_extended.get()) {
            return Err(ConfigError::TypeSealed(id));
        }
        d.communication = true;
        d.type_set = additional.into_iter().collect();
        d.type_set.insert(ty.clone());
        d.primary_type = Some(ty);
        d.sealed.set(true);
        d.types_extended.set(true);
        Ok(())
    }

    /// Whether the domain is a communication domain. Seals the domain's
    /// communication configuration.
    pub fn is_communication_domain(&self, id: DomainId) -> Result<bool, ConfigError> {
        let d = self
            .domains
            .get(id.index())
            .ok_or(ConfigError::UnknownDomain(id))?;
        d.sealed.set(true);
        Ok(d.communication)
    }

    /// The communication-domain type. Seals the configuration.
    pub fn comm_domain_type(&self, id: DomainId) -> Result<Option<CommDomainType>, ConfigError> {
        let d = self
            .domains
            .get(id.index())
            .ok_or(ConfigError::UnknownDomain(id))?;
        d.sealed.set(true);
        Ok(d.primary_type.clone())
    }

    /// The full communication-domain type set (primary plus additional).
    /// Seals the configuration and the type set.
    pub fn comm_domain_types(&self, id: DomainId) -> Result<CommTypeSet, ConfigError> {
        let d = self
            .domains
            .get(id.index())
            .ok_or(ConfigError::UnknownDomain(id))?;
        d.sealed.set(true);
        d.types_extended.set(true);
        Ok(d.type_set.clone())
    }

    /// Look up a domain by name.
    pub fn find_domain(&self, name: &str) -> Option<DomainId> {
        self.domain_names.get(name).copied()
    }

    /// A domain's name.
    pub fn domain_name(&self, id: DomainId) -> Result<&str, ConfigError> {
        self.domains
            .get(id.index())
            .map(|d| d.name.as_str())
            .ok_or(ConfigError::UnknownDomain(id))
    }

    /// A domain's priority.
    pub fn domain_priority(&self, id: DomainId) -> Result<i32, ConfigError> {
        self.domains
            .get(id.index())
            .map(|d| d.priority)
            .ok_or(ConfigError::UnknownDomain(id))
    }

    /// A domain's parent, if any.
    pub fn domain_parent(&self, id: DomainId) -> Result<Option<DomainId>, ConfigError> {
        self.domains
            .get(id.index())
            .map(|d| d.parent)
            .ok_or(ConfigError::UnknownDomain(id))
    }

    /// Number of live domains naming this one as parent.
    pub fn domain_child_count(&self, id: DomainId) -> Result<usize, ConfigError> {
        self.domains
            .get(id.index())
            .map(|d| d.child_count)
            .ok_or(ConfigError::UnknownDomain(id))
    }

    /// Cached count of actors reachable through the domain's memberships.
    pub fn domain_actor_count(&self, id: DomainId) -> Result<usize, ConfigError> {
        self.domains
            .get(id.index())
            .map(|d| d.actor_count)
            .ok_or(ConfigError::UnknownDomain(id))
    }

    /// The conditions a domain observes.
    pub fn domain_conditions(&self, id: DomainId) -> Result<Vec<ConditionId>, ConfigError> {
        self.domains
            .get(id.index())
            .map(|d| d.conditions.iter().copied().collect())
            .ok_or(ConfigError::UnknownDomain(id))
    }

    /// Replace a domain's forwarding info. `None` restores the neutral
    /// default.
    pub fn set_forwarding(
        &mut self,
        id: DomainId,
        forwarding: Option<Rc<dyn ForwardingInfo>>,
    ) -> Result<(), ConfigError> {
        let d = self
            .domains
            .get_mut(id.index())
            .ok_or(ConfigError::UnknownDomain(id))?;
        d.forwarding = forwarding.unwrap_or_else(|| Rc::new(NeutralForwarding));
        Ok(())
    }

    /// Replace a domain's route policy. `None` restores the allow-all
    /// default.
    pub fn set_route_policy(
        &mut self,
        id: DomainId,
        policy: Option<Rc<dyn RoutePolicy>>,
    ) -> Result<(), ConfigError> {
        let d = self
            .domains
            .get_mut(id.index())
            .ok_or(ConfigError::UnknownDomain(id))?;
        d.policy = policy.unwrap_or_else(|| Rc::new(AllowAll));
        Ok(())
    }

    /// Delete a domain.
    ///
    /// Rejected while the domain has child domains. Deletion force-removes
    /// every member group and membership (tracking memberships receive
    /// observer-left notifications for the domain's conditions), detaches
    /// the domain's conditions, and releases the parent's child count.
    pub fn delete_domain(&mut self, id: DomainId) -> Result<(), DeleteError> {
        let (parent, groups, members, conditions) = {
            let d = self
                .domains
                .get(id.index())
                .ok_or(ConfigError::UnknownDomain(id))?;
            if d.child_count > 0 {
                return Err(DeleteError::HasChildren {
                    domain: id,
                    children: d.child_count,
                });
            }
            (
                d.parent,
                d.groups.iter().copied().collect::<Vec<_>>(),
                d.members.iter().copied().collect::<Vec<_>>(),
                d.conditions.iter().copied().collect::<Vec<_>>(),
            )
        };
        for g in groups {
            crate::group::detach_domain(self, g, id);
        }
        for m in members {
            self.member_forced_leave(m, id);
        }
        for c in conditions {
            if let Some(cond) = self.conditions.get_mut(c.index()) {
                cond.domains.remove(&id);
            }
        }
        if let Some(p) = parent {
            if let Some(pd) = self.domains.get_mut(p.index()) {
                pd.child_count = pd.child_count.saturating_sub(1);
            }
        }
        if let Some(d) = self.domains.remove(id.index()) {
            self.domain_names.remove(&d.name);
            debug!(domain = %d.name, "deleted domain");
        }
        Ok(())
    }

    pub(crate) fn domain_key(&self, id: DomainId) -> Option<DomainKey> {
        self.domains.get(id.index()).map(|d| DomainKey {
            priority: d.priority,
            name: d.name.clone(),
            id,
        })
    }

    /// Whether `endpoint` is a member of `domain` (through either of an
    /// actor's memberships).
    pub(crate) fn domain_contains(&self, domain: DomainId, endpoint: Endpoint) -> bool {
        let Some(d) = self.domains.get(domain.index()) else {
            return false;
        };
        match endpoint {
            Endpoint::Actor(a) => {
                let Some(state) = self.actors.get(a.index()) else {
                    return false;
                };
                d.members.contains(&state.member)
                    || state.shared.is_some_and(|m| d.members.contains(&m))
            }
            Endpoint::Group(g) => d.groups.contains(&g),
        }
    }

    /// Communication-domain ancestors of `domain`, nearest first, stopping
    /// at the first non-communication ancestor.
    pub(crate) fn comm_ancestors(&self, domain: DomainId) -> Vec<DomainId> {
        let mut out = Vec::new();
        let mut next = self.domains.get(domain.index()).and_then(|d| d.parent);
        while let Some(p) = next {
            let Some(pd) = self.domains.get(p.index()) else {
                break;
            };
            if !pd.communication {
                break;
            }
            out.push(p);
            next = pd.parent;
        }
        out
    }

    /// All ancestors of `domain`, nearest first.
    pub(crate) fn all_ancestors(&self, domain: DomainId) -> Vec<DomainId> {
        let mut out = Vec::new();
        let mut next = self.domains.get(domain.index()).and_then(|d| d.parent);
        while let Some(p) = next {
            out.push(p);
            next = self.domains.get(p.index()).and_then(|d| d.parent);
        }
        out
    }

    /// Type set without sealing; the pinned send path carries it into the
    /// delivery event so relay legs re-resolve under the same restriction.
    pub(crate) fn comm_types_of(&self, domain: DomainId) -> Option<CommTypeSet> {
        self.domains
            .get(domain.index())
            .filter(|d| !d.type_set.is_empty())
            .map(|d| d.type_set.clone())
    }

    /// Communication flag without sealing; internal walks must not freeze
    /// a domain's configuration.
    pub(crate) fn is_comm(&self, domain: DomainId) -> bool {
        self.domains
            .get(domain.index())
            .map(|d| d.communication)
            .unwrap_or(false)
    }
}
