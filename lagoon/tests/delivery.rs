//! End-to-end message delivery: per-hop delays, filters in transit,
//! queueing, group fan-out, and run determinism.

use lagoon::domain::forwarding::{ForwardingInfo, Hop};
use lagoon::{
    ActorBehavior, ActorId, CommDomainType, DomainId, Endpoint, FilterOutcome, GroupBehavior,
    GroupId, Message, MessageFilter, MessageSource, RouteInfo, World,
};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, PartialEq, Eq)]
struct Delivery {
    tick: u64,
    text: String,
    source: MessageSource,
}

type Log = Rc<RefCell<Vec<Delivery>>>;

struct Recorder {
    log: Log,
}

impl ActorBehavior for Recorder {
    fn receive(&mut self, world: &mut World, _this: ActorId, msg: &Message, source: MessageSource) {
        let text = msg.downcast_ref::<String>().cloned().unwrap_or_default();
        self.log.borrow_mut().push(Delivery {
            tick: world.now(),
            text,
            source,
        });
    }
}

fn recorder(world: &mut World, name: &str) -> (ActorId, Log) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let id = world
        .create_actor(name, Box::new(Recorder { log: log.clone() }))
        .unwrap();
    (id, log)
}

struct FixedDelay(u64);

impl ForwardingInfo for FixedDelay {
    fn local_delay(&self, _: &World, _: DomainId, _: Hop, _: &Message, _: Hop) -> u64 {
        self.0
    }
}

struct DropAll;

impl MessageFilter for DropAll {
    fn filter(&self, _: Message) -> FilterOutcome {
        FilterOutcome::Deleted
    }
}

struct DropForwarding;

impl ForwardingInfo for DropForwarding {
    fn local_filter(
        &self,
        _: &World,
        _: DomainId,
        _: Hop,
        _: &Message,
        _: Hop,
    ) -> Option<Rc<dyn MessageFilter>> {
        Some(Rc::new(DropAll))
    }
}

struct AppendMark;

impl MessageFilter for AppendMark {
    fn filter(&self, msg: Message) -> FilterOutcome {
        match msg.downcast_ref::<String>() {
            Some(s) => FilterOutcome::Pass(Message::new(format!("{s}*"))),
            None => FilterOutcome::Pass(msg),
        }
    }
}

struct MarkForwarding;

impl ForwardingInfo for MarkForwarding {
    fn local_filter(
        &self,
        _: &World,
        _: DomainId,
        _: Hop,
        _: &Message,
        _: Hop,
    ) -> Option<Rc<dyn MessageFilter>> {
        Some(Rc::new(AppendMark))
    }
}

/// mid under top, leaf1 and leaf2 under mid; each domain with its own delay.
fn delay_tree(world: &mut World) -> (DomainId, DomainId, DomainId, DomainId) {
    let top = world.create_domain("top", 0).unwrap();
    world
        .configure_as_communication_domain(top, CommDomainType::of("net"))
        .unwrap();
    let mid = world.create_child_domain("mid", 1, top).unwrap();
    let leaf1 = world.create_child_domain("leaf1", 1, mid).unwrap();
    let leaf2 = world.create_child_domain("leaf2", 2, mid).unwrap();
    world.set_forwarding(top, Some(Rc::new(FixedDelay(8)))).unwrap();
    world.set_forwarding(mid, Some(Rc::new(FixedDelay(2)))).unwrap();
    world
        .set_forwarding(leaf1, Some(Rc::new(FixedDelay(1))))
        .unwrap();
    world
        .set_forwarding(leaf2, Some(Rc::new(FixedDelay(4))))
        .unwrap();
    (top, mid, leaf1, leaf2)
}

#[test]
fn delays_add_up_per_consulted_domain() {
    let mut world = World::new();
    let (_top, _mid, leaf1, leaf2) = delay_tree(&mut world);
    let a = world.create_sink_actor("a").unwrap();
    let (b, log) = recorder(&mut world, "b");
    assert!(world.actor_join(a, leaf1, false));
    assert!(world.actor_join(b, leaf2, false));

    let route = world.resolve_route(a, b, None).unwrap();
    // leaf1 + mid + leaf2, the top domain is never consulted
    assert_eq!(world.route_delay(&route, a, b, &Message::new(())), Some(7));

    assert!(world.send(a, b, Message::new("ping".to_string())));
    world.run();
    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].tick, 7);
    assert_eq!(log[0].text, "ping");
    assert_eq!(
        log[0].source,
        MessageSource {
            sender: a,
            relay: None,
            domain: Some(leaf2),
        }
    );
}

#[test]
fn trivial_route_consults_its_domain_once() {
    let mut world = World::new();
    let (_top, mid, _leaf1, _leaf2) = delay_tree(&mut world);
    let a = world.create_sink_actor("a").unwrap();
    let (b, log) = recorder(&mut world, "b");
    assert!(world.actor_join(a, mid, false));
    assert!(world.actor_join(b, mid, false));
    assert!(world.send(a, b, Message::new("hi".to_string())));
    world.run();
    assert_eq!(log.borrow()[0].tick, 2);
}

struct CountingFilter {
    calls: Rc<RefCell<u32>>,
}

impl MessageFilter for CountingFilter {
    fn filter(&self, msg: Message) -> FilterOutcome {
        *self.calls.borrow_mut() += 1;
        FilterOutcome::Pass(msg)
    }
}

struct CountingForwarding {
    calls: Rc<RefCell<u32>>,
}

impl ForwardingInfo for CountingForwarding {
    fn local_filter(
        &self,
        _: &World,
        _: DomainId,
        _: Hop,
        _: &Message,
        _: Hop,
    ) -> Option<Rc<dyn MessageFilter>> {
        Some(Rc::new(CountingFilter {
            calls: self.calls.clone(),
        }))
    }
}

#[test]
fn deleted_in_transit_still_counts_as_sent() {
    let mut world = World::new();
    let (_top, mid, leaf1, leaf2) = delay_tree(&mut world);
    world
        .set_forwarding(mid, Some(Rc::new(DropForwarding)))
        .unwrap();
    // deletion at the middle hop must short-circuit the last hop's filter
    let later_calls = Rc::new(RefCell::new(0));
    world
        .set_forwarding(
            leaf2,
            Some(Rc::new(CountingForwarding {
                calls: later_calls.clone(),
            })),
        )
        .unwrap();
    let a = world.create_sink_actor("a").unwrap();
    let (b, log) = recorder(&mut world, "b");
    assert!(world.actor_join(a, leaf1, false));
    assert!(world.actor_join(b, leaf2, false));

    assert!(world.send(a, b, Message::new("gone".to_string())));
    world.run();
    assert!(log.borrow().is_empty());
    assert_eq!(*later_calls.borrow(), 0);
}

#[test]
fn filters_rewrite_in_hop_order() {
    let mut world = World::new();
    let (_top, mid, leaf1, leaf2) = delay_tree(&mut world);
    for d in [leaf1, mid, leaf2] {
        world.set_forwarding(d, Some(Rc::new(MarkForwarding))).unwrap();
    }
    let a = world.create_sink_actor("a").unwrap();
    let (b, log) = recorder(&mut world, "b");
    assert!(world.actor_join(a, leaf1, false));
    assert!(world.actor_join(b, leaf2, false));

    assert!(world.send(a, b, Message::new("m".to_string())));
    world.run();
    // one mark per consulted domain
    assert_eq!(log.borrow()[0].text, "m***");
}

#[test]
fn matching_end_domains_take_the_single_hop_path() {
    let mut world = World::new();
    let (_top, mid, leaf1, _leaf2) = delay_tree(&mut world);
    let a = world.create_sink_actor("a").unwrap();
    let b = world.create_sink_actor("b").unwrap();
    assert!(world.actor_join(a, leaf1, false));
    assert!(world.actor_join(b, leaf1, false));

    // a policy may grant a route whose endpoints share a domain while
    // naming a higher ancestor; only the shared domain is consulted
    let route = RouteInfo {
        source: leaf1,
        ancestor: mid,
        dest: leaf1,
    };
    assert!(!route.is_trivial());
    assert_eq!(world.route_delay(&route, a, b, &Message::new(())), Some(1));
}

#[test]
fn unroutable_send_returns_false() {
    let mut world = World::new();
    let a = world.create_sink_actor("a").unwrap();
    let b = world.create_sink_actor("b").unwrap();
    assert!(!world.send(a, b, Message::new(())));
}

#[test]
fn send_after_bypasses_domains() {
    let mut world = World::new();
    let a = world.create_sink_actor("a").unwrap();
    let (b, log) = recorder(&mut world, "b");
    world.send_after(a, b, Message::new("direct".to_string()), 11);
    let cancelled = world.send_after(a, b, Message::new("never".to_string()), 12);
    cancelled.cancel();
    world.run();
    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert_eq!(
        (log[0].tick, log[0].text.as_str(), log[0].source.domain),
        (11, "direct", None)
    );
}

#[test]
fn queueing_holds_messages_until_switched_off() {
    let mut world = World::new();
    let a = world.create_sink_actor("a").unwrap();
    let (b, log) = recorder(&mut world, "b");
    world.set_actor_queueing(b, true).unwrap();
    world.send_after(a, b, Message::new("one".to_string()), 1);
    world.send_after(a, b, Message::new("two".to_string()), 2);
    world.run();
    assert!(log.borrow().is_empty());

    world.set_actor_queueing(b, false).unwrap();
    let texts: Vec<_> = log.borrow().iter().map(|d| d.text.clone()).collect();
    assert_eq!(texts, vec!["one", "two"]);
    // drained at the current clock, not their original due ticks
    assert!(log.borrow().iter().all(|d| d.tick == 2));
}

struct SlowRelay {
    delivered: Rc<RefCell<Vec<usize>>>,
}

impl GroupBehavior for SlowRelay {
    fn relay_delay(&self, _: &World, _: GroupId, _: &Message, _: Endpoint) -> u64 {
        2
    }

    fn message_relayed(
        &mut self,
        _: &mut World,
        _: GroupId,
        _: ActorId,
        _: &Message,
        delivered: usize,
    ) {
        self.delivered.borrow_mut().push(delivered);
    }
}

#[test]
fn group_relay_adds_its_own_delay_to_each_leg() {
    let mut world = World::new();
    let d = world.create_domain("net", 1).unwrap();
    world
        .configure_as_communication_domain(d, CommDomainType::of("net"))
        .unwrap();
    world.set_forwarding(d, Some(Rc::new(FixedDelay(1)))).unwrap();

    let src = world.create_sink_actor("src").unwrap();
    let (m1, log1) = recorder(&mut world, "m1");
    let (m2, log2) = recorder(&mut world, "m2");
    for a in [src, m1, m2] {
        assert!(world.actor_join(a, d, false));
    }
    let g = world.create_group("fanout").unwrap();
    assert!(world.group_join_domain(g, d));
    world.join_group(g, m1, None).unwrap();
    world.join_group(g, m2, None).unwrap();
    let delivered = Rc::new(RefCell::new(Vec::new()));
    world
        .set_group_behavior(
            g,
            Some(Box::new(SlowRelay {
                delivered: delivered.clone(),
            })),
        )
        .unwrap();

    assert!(world.send(src, g, Message::new("all".to_string())));
    world.run();

    // src -> group costs 1 tick; each leg costs 2 (group) + 1 (domain)
    for log in [&log1, &log2] {
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].tick, 4);
        assert_eq!(
            log[0].source,
            MessageSource {
                sender: src,
                relay: Some(g),
                domain: Some(d),
            }
        );
    }
    assert_eq!(*delivered.borrow(), vec![2]);
}

#[test]
fn unrouted_group_relay_skips_domain_costs() {
    let mut world = World::new();
    let src = world.create_sink_actor("src").unwrap();
    let (m1, log1) = recorder(&mut world, "m1");
    let g = world.create_group("fanout").unwrap();
    world.join_group(g, m1, None).unwrap();
    let delivered = Rc::new(RefCell::new(Vec::new()));
    world
        .set_group_behavior(
            g,
            Some(Box::new(SlowRelay {
                delivered: delivered.clone(),
            })),
        )
        .unwrap();

    // direct send to the group: no domain was involved, legs stay unrouted
    world.send_after(src, g, Message::new("hi".to_string()), 3);
    world.run();
    let log = log1.borrow();
    assert_eq!(log[0].tick, 5);
    assert_eq!(log[0].source.domain, None);
    assert_eq!(log[0].source.relay, Some(g));
    assert_eq!(*delivered.borrow(), vec![1]);
}

#[test]
fn pinned_send_restricts_relay_legs_to_its_types() {
    let mut world = World::new();
    let wire = world.create_domain("wire", 1).unwrap();
    world
        .configure_as_communication_domain(wire, CommDomainType::of("wire"))
        .unwrap();
    world.set_forwarding(wire, Some(Rc::new(FixedDelay(10)))).unwrap();
    let radio = world.create_domain("radio", 2).unwrap();
    world
        .configure_as_communication_domain(radio, CommDomainType::of("radio"))
        .unwrap();
    world.set_forwarding(radio, Some(Rc::new(FixedDelay(1)))).unwrap();

    let src = world.create_sink_actor("src").unwrap();
    let (m, log) = recorder(&mut world, "m");
    let g = world.create_group("fanout").unwrap();
    for d in [wire, radio] {
        assert!(world.actor_join(src, d, false));
        assert!(world.actor_join(m, d, false));
        assert!(world.group_join_domain(g, d));
    }
    world.join_group(g, m, None).unwrap();

    assert!(world.send_via(src, g, Message::new("tuned".to_string()), radio));
    world.run();

    // an unrestricted leg would ride the lower-priority wire domain; the
    // pinned domain's type set keeps the relay on radio
    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].tick, 2);
    assert_eq!(log[0].source.domain, Some(radio));
}

#[test]
fn nested_groups_relay_transitively() {
    let mut world = World::new();
    let src = world.create_sink_actor("src").unwrap();
    let (m, log) = recorder(&mut world, "m");
    let outer = world.create_group("outer").unwrap();
    let inner = world.create_group("inner").unwrap();
    world.join_group(outer, inner, None).unwrap();
    world.join_group(inner, m, None).unwrap();

    world.send_after(src, outer, Message::new("deep".to_string()), 0);
    world.run();
    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].source.relay, Some(inner));
    assert_eq!(log[0].source.sender, src);
}

#[test]
fn identical_seeds_replay_identically() {
    fn run_one(seed: u64) -> Vec<u64> {
        use rand::Rng;
        let mut world = World::with_seed(seed);
        let fired = Rc::new(RefCell::new(Vec::new()));
        for _ in 0..16 {
            let delay = world.rng().gen_range(0..50);
            let fired = fired.clone();
            world.schedule(delay, move |w| fired.borrow_mut().push(w.now()));
        }
        world.run();
        let out = fired.borrow().clone();
        out
    }
    assert_eq!(run_one(7), run_one(7));
    assert_ne!(run_one(7), run_one(8));
}
