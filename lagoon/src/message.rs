//! Messages and message filters.
//!
//! A [`Message`] is an immutable, cheaply clonable payload. Filters map a
//! message to either a (possibly different) message or the deleted outcome;
//! a [`CompoundFilter`] chains per-hop filters in traversal order and stops
//! at the first deletion.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// An immutable message payload.
///
/// Cloning a message clones a reference, not the payload, so a message can
/// fan out to many recipients without copying.
#[derive(Clone)]
pub struct Message {
    payload: Rc<dyn Any>,
}

impl Message {
    /// Wrap a payload into a message.
    pub fn new<T: 'static>(payload: T) -> Self {
        Self {
            payload: Rc::new(payload),
        }
    }

    /// Borrow the payload as `T`, if that is its type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Whether the payload has type `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.payload.is::<T>()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message").finish_non_exhaustive()
    }
}

/// The result of applying a message filter.
#[derive(Debug, Clone)]
pub enum FilterOutcome {
    /// The message continues, possibly rewritten.
    Pass(Message),
    /// The message is dropped in transit. Dropping is not an error: the
    /// send that produced it still counts as delivered-into-the-network.
    Deleted,
}

/// A single-hop message filter.
pub trait MessageFilter {
    /// Filter one message.
    fn filter(&self, msg: Message) -> FilterOutcome;
}

/// Filters composed in hop order.
///
/// Member filters run in insertion order; the first [`FilterOutcome::Deleted`]
/// short-circuits the rest.
#[derive(Clone, Default)]
pub struct CompoundFilter {
    parts: Vec<Rc<dyn MessageFilter>>,
}

impl CompoundFilter {
    /// An empty compound filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter to run after the ones already present.
    pub fn push(&mut self, filter: Rc<dyn MessageFilter>) {
        self.parts.push(filter);
    }

    /// Whether no member filters are present.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Number of member filters.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Run the member filters in order, short-circuiting on deletion.
    pub fn apply(&self, msg: Message) -> FilterOutcome {
        let mut msg = msg;
        for part in &self.parts {
            match part.filter(msg) {
                FilterOutcome::Pass(next) => msg = next,
                FilterOutcome::Deleted => return FilterOutcome::Deleted,
            }
        }
        FilterOutcome::Pass(msg)
    }
}

impl MessageFilter for CompoundFilter {
    fn filter(&self, msg: Message) -> FilterOutcome {
        self.apply(msg)
    }
}

impl fmt::Debug for CompoundFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompoundFilter")
            .field("len", &self.parts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Tag(&'static str);

    struct CountingFilter {
        calls: Rc<Cell<u32>>,
        delete: bool,
    }

    impl MessageFilter for CountingFilter {
        fn filter(&self, msg: Message) -> FilterOutcome {
            self.calls.set(self.calls.get() + 1);
            if self.delete {
                FilterOutcome::Deleted
            } else {
                FilterOutcome::Pass(msg)
            }
        }
    }

    #[test]
    fn downcast_roundtrip() {
        let msg = Message::new(Tag("ping"));
        assert!(msg.is::<Tag>());
        assert_eq!(msg.downcast_ref::<Tag>().map(|t| t.0), Some("ping"));
        assert!(msg.downcast_ref::<u32>().is_none());
    }

    #[test]
    fn clone_shares_payload() {
        let msg = Message::new(41u64);
        let copy = msg.clone();
        assert_eq!(copy.downcast_ref::<u64>(), Some(&41));
    }

    #[test]
    fn compound_applies_in_order_and_short_circuits() {
        let calls = Rc::new(Cell::new(0));
        let mut compound = CompoundFilter::new();
        compound.push(Rc::new(CountingFilter {
            calls: calls.clone(),
            delete: false,
        }));
        compound.push(Rc::new(CountingFilter {
            calls: calls.clone(),
            delete: true,
        }));
        compound.push(Rc::new(CountingFilter {
            calls: calls.clone(),
            delete: false,
        }));

        match compound.apply(Message::new(())) {
            FilterOutcome::Deleted => {}
            FilterOutcome::Pass(_) => panic!("expected deletion"),
        }
        // the third filter never ran
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn empty_compound_passes_through() {
        let compound = CompoundFilter::new();
        assert!(compound.is_empty());
        match compound.apply(Message::new(7i32)) {
            FilterOutcome::Pass(msg) => assert_eq!(msg.downcast_ref::<i32>(), Some(&7)),
            FilterOutcome::Deleted => panic!("empty filter must pass"),
        }
    }
}
