//! Groups: endpoints that relay messages to their members.
//!
//! A group's members are actors and other groups, each optionally carrying
//! registration info. When a message reaches a group it fans out through
//! the group's [`GroupBehavior`], which picks recipients and contributes a
//! per-recipient delay and filter; when the original send was routed, each
//! outgoing leg is re-routed from the group to its recipient.

use crate::domain::{CommTypeSet, DomainKey};
use crate::error::ConfigError;
use crate::ids::{ActorId, DomainId, Endpoint, GroupId};
use crate::message::{FilterOutcome, Message, MessageFilter};
use crate::routing::{accumulate, router};
use crate::sim::World;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;
use tracing::{debug, trace};

/// User-supplied relay behavior for a group.
pub trait GroupBehavior {
    /// Actor recipients for one relayed message. Defaults to every actor
    /// member.
    fn actor_recipients(
        &mut self,
        world: &World,
        this: GroupId,
        msg: &Message,
        source: ActorId,
    ) -> Vec<ActorId> {
        let _ = (msg, source);
        world.group_actor_members(this).unwrap_or_default()
    }

    /// Group recipients for one relayed message. Defaults to every group
    /// member.
    fn group_recipients(
        &mut self,
        world: &World,
        this: GroupId,
        msg: &Message,
        source: ActorId,
    ) -> Vec<GroupId> {
        let _ = (msg, source);
        world.group_group_members(this).unwrap_or_default()
    }

    /// Delay the group itself adds on the leg to `dest`.
    fn relay_delay(&self, world: &World, this: GroupId, msg: &Message, dest: Endpoint) -> u64 {
        let _ = (world, this, msg, dest);
        0
    }

    /// Filter the group itself applies on the leg to `dest`.
    fn relay_filter(
        &self,
        world: &World,
        this: GroupId,
        msg: &Message,
        dest: Endpoint,
    ) -> Option<Rc<dyn MessageFilter>> {
        let _ = (world, this, msg, dest);
        None
    }

    /// Called after fan-out with the number of legs actually scheduled.
    fn message_relayed(
        &mut self,
        world: &mut World,
        this: GroupId,
        source: ActorId,
        msg: &Message,
        delivered: usize,
    ) {
        let _ = (world, this, source, msg, delivered);
    }
}

/// The default behavior: relay to every member, no delay, no filter.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelayToAll;

impl GroupBehavior for RelayToAll {}

pub(crate) struct GroupState {
    pub(crate) name: String,
    /// Actor members with their registration info.
    pub(crate) actor_members: BTreeMap<ActorId, Option<Rc<dyn Any>>>,
    /// Group members with their registration info.
    pub(crate) group_members: BTreeMap<GroupId, Option<Rc<dyn Any>>>,
    pub(crate) domains: BTreeSet<DomainKey>,
    /// Ancestor -> joined domains below it, over every ancestor.
    pub(crate) ancestor_index: HashMap<DomainId, BTreeSet<DomainKey>>,
    behavior: Option<Box<dyn GroupBehavior>>,
}

impl World {
    /// Create a group that relays to every member.
    pub fn create_group(&mut self, name: &str) -> Result<GroupId, ConfigError> {
        if self.group_names.contains_key(name) {
            return Err(ConfigError::NameInUse(name.to_string()));
        }
        let id = GroupId::from_index(self.groups.insert(GroupState {
            name: name.to_string(),
            actor_members: BTreeMap::new(),
            group_members: BTreeMap::new(),
            domains: BTreeSet::new(),
            ancestor_index: HashMap::new(),
            behavior: Some(Box::new(RelayToAll)),
        }));
        self.group_names.insert(name.to_string(), id);
        debug!(group = %name, %id, "created group");
        Ok(id)
    }

    /// Look up a group by name.
    pub fn find_group(&self, name: &str) -> Option<GroupId> {
        self.group_names.get(name).copied()
    }

    /// A group's name.
    pub fn group_name(&self, id: GroupId) -> Result<&str, ConfigError> {
        self.groups
            .get(id.index())
            .map(|g| g.name.as_str())
            .ok_or(ConfigError::UnknownGroup(id))
    }

    /// Replace a group's behavior. `None` restores relay-to-all.
    pub fn set_group_behavior(
        &mut self,
        id: GroupId,
        behavior: Option<Box<dyn GroupBehavior>>,
    ) -> Result<(), ConfigError> {
        let g = self
            .groups
            .get_mut(id.index())
            .ok_or(ConfigError::UnknownGroup(id))?;
        g.behavior = Some(behavior.unwrap_or_else(|| Box::new(RelayToAll)));
        Ok(())
    }

    /// Register a member, with optional registration info.
    ///
    /// Returns `true` when the member is new; registering an existing
    /// member replaces its info and returns `false`. Registering a group
    /// that already reaches this group through member chains is rejected,
    /// as is self-registration.
    pub fn join_group(
        &mut self,
        group: GroupId,
        member: impl Into<Endpoint>,
        info: Option<Rc<dyn Any>>,
    ) -> Result<bool, ConfigError> {
        let member = member.into();
        if !self.groups.contains(group.index()) {
            return Err(ConfigError::UnknownGroup(group));
        }
        let newly = match member {
            Endpoint::Actor(a) => {
                if !self.actors.contains(a.index()) {
                    return Err(ConfigError::UnknownActor(a));
                }
                let newly = self
                    .groups
                    .get_mut(group.index())
                    .is_some_and(|g| g.actor_members.insert(a, info).is_none());
                if let Some(state) = self.actors.get_mut(a.index()) {
                    state.groups.insert(group);
                }
                newly
            }
            Endpoint::Group(m) => {
                if !self.groups.contains(m.index()) {
                    return Err(ConfigError::UnknownGroup(m));
                }
                if m == group || self.reaches(m, group) {
                    return Err(ConfigError::GroupCycle { group, member: m });
                }
                self.groups
                    .get_mut(group.index())
                    .is_some_and(|g| g.group_members.insert(m, info).is_none())
            }
        };
        trace!(%group, %member, newly, "registered group member");
        Ok(newly)
    }

    /// Deregister a member. Returns `false` when it was not registered.
    pub fn leave_group(&mut self, group: GroupId, member: impl Into<Endpoint>) -> bool {
        let member = member.into();
        let removed = match member {
            Endpoint::Actor(a) => {
                let removed = self
                    .groups
                    .get_mut(group.index())
                    .is_some_and(|g| g.actor_members.remove(&a).is_some());
                if removed {
                    if let Some(state) = self.actors.get_mut(a.index()) {
                        state.groups.remove(&group);
                    }
                }
                removed
            }
            Endpoint::Group(m) => self
                .groups
                .get_mut(group.index())
                .is_some_and(|g| g.group_members.remove(&m).is_some()),
        };
        if removed {
            trace!(%group, %member, "deregistered group member");
        }
        removed
    }

    /// A member's registration info.
    pub fn group_member_info(
        &self,
        group: GroupId,
        member: impl Into<Endpoint>,
    ) -> Option<Rc<dyn Any>> {
        let g = self.groups.get(group.index())?;
        match member.into() {
            Endpoint::Actor(a) => g.actor_members.get(&a).cloned().flatten(),
            Endpoint::Group(m) => g.group_members.get(&m).cloned().flatten(),
        }
    }

    /// The group's actor members, in id order.
    pub fn group_actor_members(&self, id: GroupId) -> Result<Vec<ActorId>, ConfigError> {
        self.groups
            .get(id.index())
            .map(|g| g.actor_members.keys().copied().collect())
            .ok_or(ConfigError::UnknownGroup(id))
    }

    /// The group's group members, in id order.
    pub fn group_group_members(&self, id: GroupId) -> Result<Vec<GroupId>, ConfigError> {
        self.groups
            .get(id.index())
            .map(|g| g.group_members.keys().copied().collect())
            .ok_or(ConfigError::UnknownGroup(id))
    }

    /// Join a domain as a group.
    ///
    /// Groups count as domain members for routing but never add to the
    /// domain's actor count. The group's ancestor index covers every
    /// ancestor, not only communication-domain ones.
    pub fn group_join_domain(&mut self, id: GroupId, domain: DomainId) -> bool {
        let Some(key) = self.domain_key(domain) else {
            return false;
        };
        if !self.groups.contains(id.index()) {
            return false;
        }
        {
            let Some(d) = self.domains.get_mut(domain.index()) else {
                return false;
            };
            if !d.groups.insert(id) {
                return false;
            }
        }
        let ancestors = self.all_ancestors(domain);
        if let Some(g) = self.groups.get_mut(id.index()) {
            g.domains.insert(key.clone());
            for a in ancestors {
                g.ancestor_index.entry(a).or_default().insert(key.clone());
            }
        }
        trace!(group = %id, %domain, "group joined domain");
        true
    }

    /// Leave a domain as a group.
    pub fn group_leave_domain(&mut self, id: GroupId, domain: DomainId) -> bool {
        {
            let Some(d) = self.domains.get_mut(domain.index()) else {
                return false;
            };
            if !d.groups.remove(&id) {
                return false;
            }
        }
        detach_domain(self, id, domain);
        true
    }

    /// Whether a group is in a domain.
    pub fn group_in_domain(&self, id: GroupId, domain: DomainId) -> bool {
        self.domain_contains(domain, Endpoint::Group(id))
    }

    /// The domains a group is in, in `(priority, name)` order.
    pub fn group_domains(&self, id: GroupId) -> Result<Vec<DomainId>, ConfigError> {
        self.groups
            .get(id.index())
            .map(|g| g.domains.iter().map(|k| k.id).collect())
            .ok_or(ConfigError::UnknownGroup(id))
    }

    /// Delete a group: leave every domain, drop it from its members'
    /// back-references and from every group that registered it.
    pub fn delete_group(&mut self, id: GroupId) -> Result<(), ConfigError> {
        let (domains, actor_members) = {
            let g = self
                .groups
                .get(id.index())
                .ok_or(ConfigError::UnknownGroup(id))?;
            (
                g.domains.iter().map(|k| k.id).collect::<Vec<_>>(),
                g.actor_members.keys().copied().collect::<Vec<_>>(),
            )
        };
        for d in domains {
            self.group_leave_domain(id, d);
        }
        for a in actor_members {
            if let Some(state) = self.actors.get_mut(a.index()) {
                state.groups.remove(&id);
            }
        }
        let parents: Vec<GroupId> = self
            .groups
            .iter()
            .filter(|(_, g)| g.group_members.contains_key(&id))
            .map(|(i, _)| GroupId::from_index(i))
            .collect();
        for p in parents {
            if let Some(g) = self.groups.get_mut(p.index()) {
                g.group_members.remove(&id);
            }
        }
        if let Some(g) = self.groups.remove(id.index()) {
            self.group_names.remove(&g.name);
            debug!(group = %g.name, "deleted group");
        }
        Ok(())
    }

    /// Whether `to` is reachable from `from` through group-member edges.
    fn reaches(&self, from: GroupId, to: GroupId) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![from];
        while let Some(g) = stack.pop() {
            if g == to {
                return true;
            }
            if !seen.insert(g) {
                continue;
            }
            if let Some(state) = self.groups.get(g.index()) {
                stack.extend(state.group_members.keys().copied());
            }
        }
        false
    }
}

/// Remove one domain from a group's own bookkeeping. The domain side is
/// untouched; domain deletion and `group_leave_domain` handle it.
pub(crate) fn detach_domain(world: &mut World, group: GroupId, domain: DomainId) {
    let Some(key) = world.domain_key(domain) else {
        return;
    };
    let ancestors = world.all_ancestors(domain);
    let Some(g) = world.groups.get_mut(group.index()) else {
        return;
    };
    g.domains.remove(&key);
    for a in ancestors {
        if let Some(set) = g.ancestor_index.get_mut(&a) {
            set.remove(&key);
            if set.is_empty() {
                g.ancestor_index.remove(&a);
            }
        }
    }
}

/// Fan a delivered message out to the group's recipients.
///
/// Each leg gets the group's own filter and delay first; when the original
/// send was routed, the leg is then re-routed from the group to the
/// recipient with the original type restriction and picks up that route's
/// filters and delay on top. Legs whose message is deleted, or that cannot
/// be routed, are skipped and do not count as delivered.
pub(crate) fn relay(
    world: &mut World,
    group: GroupId,
    msg: Message,
    source: ActorId,
    comm_types: Option<CommTypeSet>,
    routed: bool,
    _relay_from: Option<GroupId>,
) {
    let mut behavior = {
        let Some(g) = world.groups.get_mut(group.index()) else {
            return;
        };
        match g.behavior.take() {
            Some(b) => b,
            None => return,
        }
    };
    let mut recipients: Vec<Endpoint> = behavior
        .actor_recipients(world, group, &msg, source)
        .into_iter()
        .map(Endpoint::Actor)
        .collect();
    recipients.extend(
        behavior
            .group_recipients(world, group, &msg, source)
            .into_iter()
            .map(Endpoint::Group),
    );

    let mut delivered = recipients.len();
    for dest in recipients {
        if !relay_one(
            world,
            group,
            behavior.as_ref(),
            msg.clone(),
            source,
            dest,
            comm_types.as_ref(),
            routed,
        ) {
            delivered -= 1;
        }
    }
    behavior.message_relayed(world, group, source, &msg, delivered);
    if let Some(g) = world.groups.get_mut(group.index()) {
        g.behavior = Some(behavior);
    }
}

#[allow(clippy::too_many_arguments)]
fn relay_one(
    world: &mut World,
    group: GroupId,
    behavior: &dyn GroupBehavior,
    msg: Message,
    source: ActorId,
    dest: Endpoint,
    comm_types: Option<&CommTypeSet>,
    routed: bool,
) -> bool {
    let msg = match behavior.relay_filter(world, group, &msg, dest) {
        Some(f) => match f.filter(msg) {
            FilterOutcome::Pass(m) => m,
            FilterOutcome::Deleted => return false,
        },
        None => msg,
    };
    let mut delay = behavior.relay_delay(world, group, &msg, dest);

    if !routed {
        world.schedule_delivery(delay, msg, source, dest, comm_types.cloned(), None, Some(group));
        return true;
    }

    let src = Endpoint::Group(group);
    let Some(route) = router::resolve(world, src, dest, comm_types, None) else {
        trace!(%group, %dest, "relay leg dropped: no route");
        return false;
    };
    let Some(steps) = accumulate::hop_sequence(world, &route, src, dest) else {
        return false;
    };
    delay += accumulate::delay_over(world, &steps, &msg);
    match accumulate::filter_over(world, &steps, &msg).apply(msg) {
        FilterOutcome::Pass(m) => {
            world.schedule_delivery(
                delay,
                m,
                source,
                dest,
                comm_types.cloned(),
                Some(route.dest),
                Some(group),
            );
            true
        }
        FilterOutcome::Deleted => false,
    }
}
