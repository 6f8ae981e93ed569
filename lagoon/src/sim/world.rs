//! The world: single owner of every entity and the event loop.

use crate::actor::{ActorState, MessageSource};
use crate::condition::ConditionState;
use crate::domain::membership::Membership;
use crate::domain::{CommTypeSet, Domain};
use crate::group::GroupState;
use crate::ids::{ActorId, ConditionId, DomainId, Endpoint, GroupId, MemberId};
use crate::message::Message;
use crate::sim::arena::Arena;
use crate::sim::events::{EventHandle, EventKind, EventQueue};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use tracing::trace;

/// The simulation world.
///
/// The world owns every domain, actor, group, membership and condition in
/// homogeneous arenas; entities refer to each other through opaque ids
/// validated against those arenas. It also owns the tick clock and the
/// event queue, and drives all processing on the calling thread: handlers
/// run synchronously to completion, one event at a time.
///
/// Runs are deterministic: events scheduled for the same tick fire in
/// scheduling order, domain iteration follows `(priority, name)` order, and
/// randomness comes from a RNG seeded at construction.
pub struct World {
    pub(crate) domains: Arena<Domain>,
    pub(crate) memberships: Arena<Membership>,
    pub(crate) actors: Arena<ActorState>,
    pub(crate) groups: Arena<GroupState>,
    pub(crate) conditions: Arena<ConditionState>,

    pub(crate) domain_names: HashMap<String, DomainId>,
    pub(crate) actor_names: HashMap<String, ActorId>,
    pub(crate) group_names: HashMap<String, GroupId>,
    pub(crate) membership_names: HashMap<String, MemberId>,
    pub(crate) condition_names: HashMap<String, ConditionId>,

    clock: u64,
    queue: EventQueue,
    rng: ChaCha8Rng,
}

impl World {
    /// Create a world with the default seed.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create a world whose RNG is seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            domains: Arena::new(),
            memberships: Arena::new(),
            actors: Arena::new(),
            groups: Arena::new(),
            conditions: Arena::new(),
            domain_names: HashMap::new(),
            actor_names: HashMap::new(),
            group_names: HashMap::new(),
            membership_names: HashMap::new(),
            condition_names: HashMap::new(),
            clock: 0,
            queue: EventQueue::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// The current simulation tick.
    pub fn now(&self) -> u64 {
        self.clock
    }

    /// The deterministic simulation RNG.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Schedule a task to run after `delay` ticks.
    pub fn schedule<F>(&mut self, delay: u64, task: F) -> EventHandle
    where
        F: FnOnce(&mut World) + 'static,
    {
        let due = self.clock + delay;
        trace!(due, "scheduling task");
        self.queue.push(due, EventKind::Task(Box::new(task)))
    }

    pub(crate) fn schedule_delivery(
        &mut self,
        delay: u64,
        msg: Message,
        source: ActorId,
        dest: Endpoint,
        comm_types: Option<CommTypeSet>,
        via_domain: Option<DomainId>,
        relay: Option<GroupId>,
    ) -> EventHandle {
        let due = self.clock + delay;
        trace!(%source, %dest, due, "scheduling delivery");
        self.queue.push(
            due,
            EventKind::Deliver {
                msg,
                source,
                dest,
                comm_types,
                via_domain,
                relay,
            },
        )
    }

    /// Process the earliest pending event. Returns `false` when the queue
    /// is empty.
    pub fn step(&mut self) -> bool {
        let Some((due, kind)) = self.queue.pop() else {
            return false;
        };
        self.clock = due;
        self.dispatch(kind);
        true
    }

    /// Run until the event queue is empty.
    pub fn run(&mut self) {
        while self.step() {}
    }

    /// Run every event due at or before `tick`, then advance the clock to
    /// `tick`.
    pub fn run_until(&mut self, tick: u64) {
        while let Some(due) = self.queue.next_due() {
            if due > tick {
                break;
            }
            self.step();
        }
        if self.clock < tick {
            self.clock = tick;
        }
    }

    fn dispatch(&mut self, kind: EventKind) {
        match kind {
            EventKind::Task(task) => task(self),
            EventKind::Deliver {
                msg,
                source,
                dest,
                comm_types,
                via_domain,
                relay,
            } => match dest {
                Endpoint::Actor(actor) => crate::actor::deliver(
                    self,
                    actor,
                    msg,
                    MessageSource {
                        sender: source,
                        relay,
                        domain: via_domain,
                    },
                ),
                Endpoint::Group(group) => crate::group::relay(
                    self,
                    group,
                    msg,
                    source,
                    comm_types,
                    via_domain.is_some(),
                    relay,
                ),
            },
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn clock_advances_with_events() {
        let mut world = World::new();
        let fired = Rc::new(RefCell::new(Vec::new()));
        for delay in [5u64, 2, 9] {
            let fired = fired.clone();
            world.schedule(delay, move |w| fired.borrow_mut().push(w.now()));
        }
        world.run();
        assert_eq!(*fired.borrow(), vec![2, 5, 9]);
        assert_eq!(world.now(), 9);
    }

    #[test]
    fn run_until_stops_at_tick() {
        let mut world = World::new();
        let fired = Rc::new(RefCell::new(0u32));
        for delay in [1u64, 2, 10] {
            let fired = fired.clone();
            world.schedule(delay, move |_| *fired.borrow_mut() += 1);
        }
        world.run_until(5);
        assert_eq!(*fired.borrow(), 2);
        assert_eq!(world.now(), 5);
        world.run();
        assert_eq!(*fired.borrow(), 3);
    }

    #[test]
    fn cancelled_task_never_runs() {
        let mut world = World::new();
        let fired = Rc::new(RefCell::new(false));
        let handle = {
            let fired = fired.clone();
            world.schedule(3, move |_| *fired.borrow_mut() = true)
        };
        handle.cancel();
        world.run();
        assert!(!*fired.borrow());
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        use rand::RngCore;
        let mut a = World::with_seed(42);
        let mut b = World::with_seed(42);
        assert_eq!(a.rng().next_u64(), b.rng().next_u64());
    }
}
