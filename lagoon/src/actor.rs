//! Actors: named endpoints with user-supplied behavior.
//!
//! An actor owns a private domain membership and may additionally reference
//! one shared membership. Its [`ActorBehavior`] runs synchronously when a
//! scheduled message arrives or a tracked condition changes; while a
//! behavior is running, anything else aimed at the same actor queues up and
//! drains before the behavior is put back.

use crate::condition::ConditionChange;
use crate::domain::membership::Membership;
use crate::domain::CommTypeSet;
use crate::error::ConfigError;
use crate::ids::{ActorId, DomainId, Endpoint, GroupId, MemberId};
use crate::message::{FilterOutcome, Message};
use crate::routing::{accumulate, router};
use crate::sim::{EventHandle, World};
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, trace};

/// Where a delivered message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSource {
    /// The actor that originally sent the message.
    pub sender: ActorId,
    /// The group that relayed the message, if any.
    pub relay: Option<GroupId>,
    /// The destination-side domain the message arrived through, or `None`
    /// for direct and unrouted deliveries.
    pub domain: Option<DomainId>,
}

/// User-supplied actor behavior.
pub trait ActorBehavior {
    /// Handle one delivered message.
    fn receive(&mut self, world: &mut World, this: ActorId, msg: &Message, source: MessageSource);

    /// Handle condition changes observed through tracking memberships.
    fn condition_changed(&mut self, world: &mut World, this: ActorId, changes: &[ConditionChange]) {
        let _ = (world, this, changes);
    }
}

pub(crate) struct ActorState {
    pub(crate) name: String,
    /// The actor's private membership.
    pub(crate) member: MemberId,
    /// Attached shared membership, if any.
    pub(crate) shared: Option<MemberId>,
    pub(crate) groups: BTreeSet<GroupId>,
    behavior: Option<Box<dyn ActorBehavior>>,
    /// True while the behavior is taken out for a callback.
    in_dispatch: bool,
    queueing: bool,
    inbox: VecDeque<(Message, MessageSource)>,
    pending: VecDeque<Vec<ConditionChange>>,
}

impl World {
    /// Create an actor with the given behavior.
    pub fn create_actor(
        &mut self,
        name: &str,
        behavior: Box<dyn ActorBehavior>,
    ) -> Result<ActorId, ConfigError> {
        self.new_actor(name, Some(behavior))
    }

    /// Create an actor that ignores everything delivered to it.
    pub fn create_sink_actor(&mut self, name: &str) -> Result<ActorId, ConfigError> {
        self.new_actor(name, None)
    }

    fn new_actor(
        &mut self,
        name: &str,
        behavior: Option<Box<dyn ActorBehavior>>,
    ) -> Result<ActorId, ConfigError> {
        if self.actor_names.contains_key(name) {
            return Err(ConfigError::NameInUse(name.to_string()));
        }
        let member = MemberId::from_index(self.memberships.insert(Membership::private()));
        let id = ActorId::from_index(self.actors.insert(ActorState {
            name: name.to_string(),
            member,
            shared: None,
            groups: BTreeSet::new(),
            behavior,
            in_dispatch: false,
            queueing: false,
            inbox: VecDeque::new(),
            pending: VecDeque::new(),
        }));
        if let Some(m) = self.memberships.get_mut(member.index()) {
            m.actors.insert(id);
        }
        self.actor_names.insert(name.to_string(), id);
        debug!(actor = %name, %id, "created actor");
        Ok(id)
    }

    /// Look up an actor by name.
    pub fn find_actor(&self, name: &str) -> Option<ActorId> {
        self.actor_names.get(name).copied()
    }

    /// An actor's name.
    pub fn actor_name(&self, id: ActorId) -> Result<&str, ConfigError> {
        self.actors
            .get(id.index())
            .map(|a| a.name.as_str())
            .ok_or(ConfigError::UnknownActor(id))
    }

    /// Replace an actor's behavior. `None` leaves the actor ignoring
    /// deliveries.
    pub fn set_actor_behavior(
        &mut self,
        id: ActorId,
        behavior: Option<Box<dyn ActorBehavior>>,
    ) -> Result<(), ConfigError> {
        let a = self
            .actors
            .get_mut(id.index())
            .ok_or(ConfigError::UnknownActor(id))?;
        a.behavior = behavior;
        Ok(())
    }

    /// Join a domain through the actor's private membership.
    ///
    /// Returns `false` when already joined, or when the actor's shared
    /// membership is in the domain already.
    pub fn actor_join(&mut self, id: ActorId, domain: DomainId, track_condition: bool) -> bool {
        let (member, shared) = {
            let Some(a) = self.actors.get(id.index()) else {
                return false;
            };
            (a.member, a.shared)
        };
        if let Some(shared) = shared {
            if self.membership_in_domain(shared, domain) {
                trace!(%id, %domain, "join rejected: shared membership overlap");
                return false;
            }
        }
        if !self.membership_join(member, domain, track_condition) {
            return false;
        }
        if let Some(shared) = shared {
            if let Some(m) = self.memberships.get_mut(shared.index()) {
                m.actor_joined(domain);
            }
        }
        true
    }

    /// Leave a domain joined through the actor's private membership.
    pub fn actor_leave(&mut self, id: ActorId, domain: DomainId) -> bool {
        let (member, shared) = {
            let Some(a) = self.actors.get(id.index()) else {
                return false;
            };
            (a.member, a.shared)
        };
        if !self.membership_leave(member, domain) {
            return false;
        }
        if let Some(shared) = shared {
            if let Some(m) = self.memberships.get_mut(shared.index()) {
                m.actor_left(domain);
            }
        }
        true
    }

    /// Whether an actor is in a domain through either membership.
    pub fn actor_in_domain(&self, id: ActorId, domain: DomainId) -> bool {
        self.domain_contains(domain, Endpoint::Actor(id))
    }

    /// The domains an actor is in, in `(priority, name)` order, merged
    /// across both memberships.
    pub fn actor_domains(&self, id: ActorId) -> Vec<DomainId> {
        self.actor_domain_keys(id).into_iter().map(|k| k.id).collect()
    }

    /// The actor's shared membership, if attached.
    pub fn actor_shared_membership(&self, id: ActorId) -> Result<Option<MemberId>, ConfigError> {
        self.actors
            .get(id.index())
            .map(|a| a.shared)
            .ok_or(ConfigError::UnknownActor(id))
    }

    /// Attach a shared membership to an actor, or detach with `None`.
    ///
    /// Rejected when the membership is not shared, or when it is in a
    /// domain the actor has joined privately. Attaching counts the actor
    /// into every domain the membership joined (with joined/left condition
    /// notifications for tracked ones); detaching reverses that.
    pub fn set_shared_membership(
        &mut self,
        id: ActorId,
        membership: Option<MemberId>,
    ) -> Result<(), ConfigError> {
        let (private, old) = {
            let a = self
                .actors
                .get(id.index())
                .ok_or(ConfigError::UnknownActor(id))?;
            (a.member, a.shared)
        };
        if let Some(new) = membership {
            if !self.membership_is_shared(new)? {
                return Err(ConfigError::NotShared(new));
            }
            for domain in self.membership_domains(new)? {
                if self.membership_in_domain(private, domain) {
                    return Err(ConfigError::DomainConflict(domain));
                }
            }
        }
        if old == membership {
            return Ok(());
        }
        if let Some(old) = old {
            self.detach_shared(id, private, old);
        }
        if let Some(a) = self.actors.get_mut(id.index()) {
            a.shared = membership;
        }
        if let Some(new) = membership {
            self.attach_shared(id, private, new);
        }
        Ok(())
    }

    fn attach_shared(&mut self, id: ActorId, private: MemberId, shared: MemberId) {
        let private_domains = self.membership_domains(private).unwrap_or_default();
        let domains = {
            let Some(m) = self.memberships.get_mut(shared.index()) else {
                return;
            };
            m.actors.insert(id);
            for &d in &private_domains {
                m.actor_joined(d);
            }
            m.domains.iter().map(|k| k.id).collect::<Vec<_>>()
        };
        for domain in domains {
            self.shared_count_change(id, shared, domain, true);
        }
    }

    fn detach_shared(&mut self, id: ActorId, private: MemberId, shared: MemberId) {
        let private_domains = self.membership_domains(private).unwrap_or_default();
        let domains = {
            let Some(m) = self.memberships.get_mut(shared.index()) else {
                return;
            };
            m.actors.remove(&id);
            for &d in &private_domains {
                m.actor_left(d);
            }
            m.domains.iter().map(|k| k.id).collect::<Vec<_>>()
        };
        for domain in domains {
            self.shared_count_change(id, shared, domain, false);
        }
    }

    /// Adjust one domain's actor count for an attach/detach and notify the
    /// actor if the membership tracks conditions there.
    fn shared_count_change(&mut self, id: ActorId, shared: MemberId, domain: DomainId, add: bool) {
        let tracking = self
            .memberships
            .get(shared.index())
            .and_then(|m| m.tracking.get(&domain).copied())
            .unwrap_or(false);
        let conditions: Vec<_> = {
            let Some(d) = self.domains.get_mut(domain.index()) else {
                return;
            };
            if add {
                d.actor_count += 1;
            } else {
                d.actor_count = d.actor_count.saturating_sub(1);
            }
            if tracking {
                d.conditions.iter().copied().collect()
            } else {
                Vec::new()
            }
        };
        if conditions.is_empty() {
            return;
        }
        let mode = if add {
            crate::condition::ConditionMode::ObserverJoinedDomain
        } else {
            crate::condition::ConditionMode::ObserverLeftDomain
        };
        let changes: Vec<ConditionChange> = conditions
            .into_iter()
            .map(|condition| ConditionChange {
                condition,
                mode,
                domain: Some(domain),
            })
            .collect();
        notify_actor(self, id, changes);
    }

    /// Delete an actor: leave every domain and group, detach the shared
    /// membership, and drop the private one.
    pub fn delete_actor(&mut self, id: ActorId) -> Result<(), ConfigError> {
        let (private, shared, groups) = {
            let a = self
                .actors
                .get(id.index())
                .ok_or(ConfigError::UnknownActor(id))?;
            (a.member, a.shared, a.groups.iter().copied().collect::<Vec<_>>())
        };
        for domain in self.membership_domains(private).unwrap_or_default() {
            self.actor_leave(id, domain);
        }
        if let Some(shared) = shared {
            self.detach_shared(id, private, shared);
        }
        for g in groups {
            self.leave_group(g, Endpoint::Actor(id));
        }
        self.memberships.remove(private.index());
        if let Some(a) = self.actors.remove(id.index()) {
            self.actor_names.remove(&a.name);
            debug!(actor = %a.name, "deleted actor");
        }
        Ok(())
    }

    /// Switch message queueing for an actor.
    ///
    /// While queueing is on, deliveries pile up in arrival order; turning
    /// it off drains them through the behavior immediately.
    pub fn set_actor_queueing(&mut self, id: ActorId, queueing: bool) -> Result<(), ConfigError> {
        let in_dispatch = {
            let a = self
                .actors
                .get_mut(id.index())
                .ok_or(ConfigError::UnknownActor(id))?;
            a.queueing = queueing;
            a.in_dispatch
        };
        if !queueing && !in_dispatch {
            drain(self, id);
        }
        Ok(())
    }

    /// Send a message, routing through the sender's domains.
    ///
    /// Returns `true` when the message entered the network, including when
    /// a filter deleted it in transit, and `false` when no route exists.
    pub fn send(&mut self, src: ActorId, dest: impl Into<Endpoint>, msg: Message) -> bool {
        self.send_message(src, dest.into(), msg, None, None)
    }

    /// Send a message, restricting the route search to domains whose
    /// primary type is in `types`.
    pub fn send_with_types(
        &mut self,
        src: ActorId,
        dest: impl Into<Endpoint>,
        msg: Message,
        types: &CommTypeSet,
    ) -> bool {
        self.send_message(src, dest.into(), msg, Some(types.clone()), None)
    }

    /// Send a message through one specific communication domain.
    ///
    /// The domain's type set travels with the delivery, so a group relaying
    /// the message re-resolves its legs under the same restriction.
    pub fn send_via(
        &mut self,
        src: ActorId,
        dest: impl Into<Endpoint>,
        msg: Message,
        domain: DomainId,
    ) -> bool {
        let types = self.comm_types_of(domain);
        self.send_message(src, dest.into(), msg, types, Some(domain))
    }

    /// Deliver a message after an explicit delay, bypassing domains.
    pub fn send_after(
        &mut self,
        src: ActorId,
        dest: impl Into<Endpoint>,
        msg: Message,
        delay: u64,
    ) -> EventHandle {
        self.schedule_delivery(delay, msg, src, dest.into(), None, None, None)
    }

    fn send_message(
        &mut self,
        src: ActorId,
        dest: Endpoint,
        msg: Message,
        types: Option<CommTypeSet>,
        pinned: Option<DomainId>,
    ) -> bool {
        let source = Endpoint::Actor(src);
        let Some(route) = router::resolve(self, source, dest, types.as_ref(), pinned) else {
            trace!(%src, %dest, "send failed: no route");
            return false;
        };
        let Some(steps) = accumulate::hop_sequence(self, &route, source, dest) else {
            trace!(%src, %dest, "send failed: disconnected route");
            return false;
        };
        let delay = accumulate::delay_over(self, &steps, &msg);
        let filter = accumulate::filter_over(self, &steps, &msg);
        match filter.apply(msg) {
            FilterOutcome::Deleted => {
                trace!(%src, %dest, "message deleted in transit");
                true
            }
            FilterOutcome::Pass(msg) => {
                self.schedule_delivery(delay, msg, src, dest, types, Some(route.dest), None);
                true
            }
        }
    }
}

/// Deliver a scheduled message to an actor.
pub(crate) fn deliver(world: &mut World, actor: ActorId, msg: Message, source: MessageSource) {
    let Some(a) = world.actors.get_mut(actor.index()) else {
        return;
    };
    a.inbox.push_back((msg, source));
    if !a.queueing && !a.in_dispatch {
        drain(world, actor);
    }
}

/// Hand condition changes to an actor, queueing behind a running callback.
pub(crate) fn notify_actor(world: &mut World, actor: ActorId, changes: Vec<ConditionChange>) {
    let Some(a) = world.actors.get_mut(actor.index()) else {
        return;
    };
    a.pending.push_back(changes);
    if !a.in_dispatch {
        drain(world, actor);
    }
}

/// Run the actor's behavior over everything pending: condition changes
/// first, then (unless queueing) the inbox, until both are idle. The
/// behavior is taken out for the duration so callbacks can reach the world.
fn drain(world: &mut World, actor: ActorId) {
    let mut behavior = {
        let Some(a) = world.actors.get_mut(actor.index()) else {
            return;
        };
        let Some(behavior) = a.behavior.take() else {
            a.pending.clear();
            if !a.queueing {
                a.inbox.clear();
            }
            return;
        };
        a.in_dispatch = true;
        behavior
    };
    loop {
        let next = {
            let Some(a) = world.actors.get_mut(actor.index()) else {
                return;
            };
            if let Some(changes) = a.pending.pop_front() {
                Some(Work::Changes(changes))
            } else if !a.queueing {
                a.inbox.pop_front().map(|(msg, source)| Work::Msg(msg, source))
            } else {
                None
            }
        };
        match next {
            Some(Work::Changes(changes)) => behavior.condition_changed(world, actor, &changes),
            Some(Work::Msg(msg, source)) => behavior.receive(world, actor, &msg, source),
            None => break,
        }
    }
    if let Some(a) = world.actors.get_mut(actor.index()) {
        a.behavior = Some(behavior);
        a.in_dispatch = false;
    }
}

enum Work {
    Changes(Vec<ConditionChange>),
    Msg(Message, MessageSource),
}
