//! Domain membership records.
//!
//! Every actor owns a private (unshared) membership; a *shared* membership
//! is a named entity that many actors reference so identical domain
//! configurations are stored once. Memberships keep their joined domains in
//! `(priority, name)` order and maintain an index from communication-domain
//! ancestors to the joined domains below them, so the router answers "does
//! any of my domains sit under ancestor X" without scanning.

use crate::condition::{ConditionChange, ConditionMode};
use crate::domain::DomainKey;
use crate::error::ConfigError;
use crate::ids::{ActorId, DomainId, MemberId};
use crate::sim::World;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace};

pub(crate) struct Membership {
    pub(crate) shared: bool,
    /// Shared memberships are named and addressable; private ones are not.
    pub(crate) name: Option<String>,
    /// Actors referencing this membership: exactly one for private
    /// memberships, any number for shared ones.
    pub(crate) actors: BTreeSet<ActorId>,
    pub(crate) domains: BTreeSet<DomainKey>,
    pub(crate) tracking: HashMap<DomainId, bool>,
    /// Communication-domain ancestor -> joined domains below it.
    pub(crate) ancestor_index: HashMap<DomainId, BTreeSet<DomainKey>>,
    /// Shared only: domains independently joined by this membership's
    /// actors (through their private memberships), with a join count.
    pub(crate) independent_joins: HashMap<DomainId, usize>,
}

impl Membership {
    pub(crate) fn private() -> Self {
        Self {
            shared: false,
            name: None,
            actors: BTreeSet::new(),
            domains: BTreeSet::new(),
            tracking: HashMap::new(),
            ancestor_index: HashMap::new(),
            independent_joins: HashMap::new(),
        }
    }

    pub(crate) fn shared(name: String) -> Self {
        Self {
            shared: true,
            name: Some(name),
            ..Self::private()
        }
    }

    pub(crate) fn actor_joined(&mut self, domain: DomainId) {
        *self.independent_joins.entry(domain).or_insert(0) += 1;
    }

    pub(crate) fn actor_left(&mut self, domain: DomainId) {
        if let Some(count) = self.independent_joins.get_mut(&domain) {
            *count -= 1;
            if *count == 0 {
                self.independent_joins.remove(&domain);
            }
        }
    }
}

impl World {
    /// Create a named, shared membership that several actors can attach to.
    pub fn create_shared_membership(&mut self, name: &str) -> Result<MemberId, ConfigError> {
        if self.membership_names.contains_key(name) {
            return Err(ConfigError::NameInUse(name.to_string()));
        }
        let id = MemberId::from_index(self.memberships.insert(Membership::shared(name.to_string())));
        self.membership_names.insert(name.to_string(), id);
        debug!(membership = %name, %id, "created shared membership");
        Ok(id)
    }

    /// Look up a shared membership by name.
    pub fn find_membership(&self, name: &str) -> Option<MemberId> {
        self.membership_names.get(name).copied()
    }

    /// Whether a membership is shared.
    pub fn membership_is_shared(&self, id: MemberId) -> Result<bool, ConfigError> {
        self.memberships
            .get(id.index())
            .map(|m| m.shared)
            .ok_or(ConfigError::UnknownMembership(id))
    }

    /// The domains a membership has joined, in `(priority, name)` order.
    pub fn membership_domains(&self, id: MemberId) -> Result<Vec<DomainId>, ConfigError> {
        self.memberships
            .get(id.index())
            .map(|m| m.domains.iter().map(|k| k.id).collect())
            .ok_or(ConfigError::UnknownMembership(id))
    }

    /// Whether a membership has joined a domain.
    pub fn membership_in_domain(&self, id: MemberId, domain: DomainId) -> bool {
        let Some(m) = self.memberships.get(id.index()) else {
            return false;
        };
        m.tracking.contains_key(&domain)
    }

    /// The actors referencing a membership.
    pub fn membership_actors(&self, id: MemberId) -> Result<Vec<ActorId>, ConfigError> {
        self.memberships
            .get(id.index())
            .map(|m| m.actors.iter().copied().collect())
            .ok_or(ConfigError::UnknownMembership(id))
    }

    /// Join a domain through a membership.
    ///
    /// Returns `false` without any state change when the membership already
    /// joined the domain, when the domain is unknown, or when a shared
    /// membership conflicts with a domain one of its actors joined
    /// independently.
    ///
    /// On success the membership's actors are counted into the domain; if
    /// `track_condition` is set, each of them is notified with
    /// [`ConditionMode::ObserverJoinedDomain`] for every condition the
    /// domain currently observes.
    pub fn membership_join(
        &mut self,
        id: MemberId,
        domain: DomainId,
        track_condition: bool,
    ) -> bool {
        let Some(key) = self.domain_key(domain) else {
            return false;
        };
        let actors: Vec<ActorId> = {
            let Some(m) = self.memberships.get(id.index()) else {
                return false;
            };
            if m.shared && m.independent_joins.contains_key(&domain) {
                trace!(%id, %domain, "join rejected: independent actor join");
                return false;
            }
            m.actors.iter().copied().collect()
        };
        let (is_comm, conditions) = {
            let Some(d) = self.domains.get_mut(domain.index()) else {
                return false;
            };
            if !d.members.insert(id) {
                return false;
            }
            if track_condition {
                d.tracking_members.insert(id);
            }
            d.actor_count += actors.len();
            let conditions = if track_condition {
                d.conditions.iter().copied().collect()
            } else {
                Vec::new()
            };
            (d.communication, conditions)
        };
        if let Some(m) = self.memberships.get_mut(id.index()) {
            m.domains.insert(key.clone());
            m.tracking.insert(domain, track_condition);
        }
        if is_comm {
            for ancestor in self.comm_ancestors(domain) {
                if let Some(m) = self.memberships.get_mut(id.index()) {
                    m.ancestor_index
                        .entry(ancestor)
                        .or_default()
                        .insert(key.clone());
                }
            }
        }
        trace!(%id, %domain, track_condition, "joined domain");
        self.notify_membership_conditions(
            &actors,
            &conditions,
            ConditionMode::ObserverJoinedDomain,
            domain,
        );
        true
    }

    /// Leave a domain.
    ///
    /// Returns `false` if the membership had not joined the domain. When the
    /// membership was tracking conditions, every actor receives
    /// [`ConditionMode::ObserverLeftDomain`] for each of the domain's
    /// conditions, delivered while the membership record is still intact so
    /// callbacks observe the pre-leave state.
    pub fn membership_leave(&mut self, id: MemberId, domain: DomainId) -> bool {
        let Some(key) = self.domain_key(domain) else {
            return false;
        };
        let actors: Vec<ActorId> = {
            let Some(m) = self.memberships.get(id.index()) else {
                return false;
            };
            m.actors.iter().copied().collect()
        };
        let (was_tracking, conditions) = {
            let Some(d) = self.domains.get(domain.index()) else {
                return false;
            };
            if !d.members.contains(&id) {
                return false;
            }
            let was_tracking = d.tracking_members.contains(&id);
            let conditions = if was_tracking {
                d.conditions.iter().copied().collect()
            } else {
                Vec::new()
            };
            (was_tracking, conditions)
        };
        if was_tracking {
            self.notify_membership_conditions(
                &actors,
                &conditions,
                ConditionMode::ObserverLeftDomain,
                domain,
            );
        }
        {
            let Some(d) = self.domains.get_mut(domain.index()) else {
                return true;
            };
            // a notified callback may have completed this leave already
            if !d.members.remove(&id) {
                return true;
            }
            d.tracking_members.remove(&id);
            d.actor_count = d.actor_count.saturating_sub(actors.len());
        }
        if let Some(m) = self.memberships.get_mut(id.index()) {
            m.domains.remove(&key);
            m.tracking.remove(&domain);
        }
        self.remove_member_ancestors(id, domain, &key);
        trace!(%id, %domain, "left domain");
        true
    }

    /// Delete a shared membership: leave every domain, then detach every
    /// actor.
    pub fn delete_shared_membership(&mut self, id: MemberId) -> Result<(), ConfigError> {
        let m = self
            .memberships
            .get(id.index())
            .ok_or(ConfigError::UnknownMembership(id))?;
        if !m.shared {
            return Err(ConfigError::NotShared(id));
        }
        let domains: Vec<DomainId> = m.domains.iter().map(|k| k.id).collect();
        let actors: Vec<ActorId> = m.actors.iter().copied().collect();
        for d in domains {
            self.membership_leave(id, d);
        }
        for a in actors {
            if let Some(state) = self.actors.get_mut(a.index()) {
                if state.shared == Some(id) {
                    state.shared = None;
                }
            }
        }
        if let Some(m) = self.memberships.remove(id.index()) {
            if let Some(name) = m.name {
                self.membership_names.remove(&name);
                debug!(membership = %name, "deleted shared membership");
            }
        }
        Ok(())
    }

    /// Forced leave used by domain deletion: member-side bookkeeping plus
    /// tracking notifications, without touching the dying domain's sets.
    /// Notifications go out before the membership record is removed, as in
    /// [`World::membership_leave`].
    pub(crate) fn member_forced_leave(&mut self, id: MemberId, domain: DomainId) {
        let Some(key) = self.domain_key(domain) else {
            return;
        };
        let conditions: Vec<_> = self
            .domains
            .get(domain.index())
            .map(|d| d.conditions.iter().copied().collect())
            .unwrap_or_default();
        let (was_tracking, actors) = {
            let Some(m) = self.memberships.get(id.index()) else {
                return;
            };
            if !m.domains.contains(&key) {
                return;
            }
            let was_tracking = m.tracking.get(&domain).copied().unwrap_or(false);
            (was_tracking, m.actors.iter().copied().collect::<Vec<_>>())
        };
        if was_tracking {
            self.notify_membership_conditions(
                &actors,
                &conditions,
                ConditionMode::ObserverLeftDomain,
                domain,
            );
        }
        {
            let Some(m) = self.memberships.get_mut(id.index()) else {
                return;
            };
            if !m.domains.remove(&key) {
                return;
            }
            m.tracking.remove(&domain);
        }
        self.remove_member_ancestors(id, domain, &key);
    }

    fn remove_member_ancestors(&mut self, id: MemberId, domain: DomainId, key: &DomainKey) {
        if !self.is_comm(domain) {
            return;
        }
        for ancestor in self.comm_ancestors(domain) {
            if let Some(m) = self.memberships.get_mut(id.index()) {
                if let Some(set) = m.ancestor_index.get_mut(&ancestor) {
                    set.remove(key);
                    if set.is_empty() {
                        m.ancestor_index.remove(&ancestor);
                    }
                }
            }
        }
    }

    fn notify_membership_conditions(
        &mut self,
        actors: &[ActorId],
        conditions: &[crate::ids::ConditionId],
        mode: ConditionMode,
        domain: DomainId,
    ) {
        if conditions.is_empty() {
            return;
        }
        let changes: Vec<ConditionChange> = conditions
            .iter()
            .map(|&condition| ConditionChange {
                condition,
                mode,
                domain: Some(domain),
            })
            .collect();
        for &a in actors {
            crate::actor::notify_actor(self, a, changes.clone());
        }
    }

    /// The joined-domain keys of an actor: ordered union of its private and
    /// shared memberships.
    pub(crate) fn actor_domain_keys(&self, actor: ActorId) -> Vec<DomainKey> {
        let Some(state) = self.actors.get(actor.index()) else {
            return Vec::new();
        };
        let mut keys: BTreeSet<DomainKey> = BTreeSet::new();
        if let Some(m) = self.memberships.get(state.member.index()) {
            keys.extend(m.domains.iter().cloned());
        }
        if let Some(shared) = state.shared {
            if let Some(m) = self.memberships.get(shared.index()) {
                keys.extend(m.domains.iter().cloned());
            }
        }
        keys.into_iter().collect()
    }

    /// First joined domain (in key order) below `ancestor`, looking at both
    /// of an actor's memberships or a group's domain set.
    pub(crate) fn first_child_domain_under(
        &self,
        endpoint: crate::ids::Endpoint,
        ancestor: DomainId,
    ) -> Option<DomainId> {
        use crate::ids::Endpoint;
        match endpoint {
            Endpoint::Actor(a) => {
                let state = self.actors.get(a.index())?;
                let mut best: Option<&DomainKey> = None;
                let mut consider = |m: MemberId| {
                    if let Some(member) = self.memberships.get(m.index()) {
                        if let Some(set) = member.ancestor_index.get(&ancestor) {
                            if let Some(first) = set.iter().next() {
                                if best.map_or(true, |b| first < b) {
                                    best = Some(first);
                                }
                            }
                        }
                    }
                };
                consider(state.member);
                if let Some(shared) = state.shared {
                    consider(shared);
                }
                best.map(|k| k.id)
            }
            Endpoint::Group(g) => {
                let group = self.groups.get(g.index())?;
                group
                    .ancestor_index
                    .get(&ancestor)
                    .and_then(|set| set.iter().next())
                    .map(|k| k.id)
            }
        }
    }
}
