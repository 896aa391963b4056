//! Multicast events that can be monitored
//!
//! A host exposes an event by registering a [`MulticastEvent`] on its type.
//! Event-backed units attach a counting handler on creation and detach it when
//! dropped, so the subscriber count they report includes that handler unless
//! it is subtracted.
//!
//! An event built with [`MulticastEvent::with_placeholder`] starts with a
//! no-op handler, so its invocation list is never empty. The placeholder is
//! part of [`MulticastEvent::len`]; the default event count subtracts one
//! entry and the "true count" reports the full length.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Handle returned by [`MulticastEvent::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<A> = Rc<dyn Fn(&A)>;

/// Ordered list of handlers invoked together
pub struct MulticastEvent<A> {
    handlers: RefCell<Vec<(HandlerId, Handler<A>)>>,
    next_id: Cell<u64>,
}

impl<A> Default for MulticastEvent<A> {
    fn default() -> Self {
        Self {
            handlers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }
}

impl<A: 'static> std::fmt::Debug for MulticastEvent<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MulticastEvent")
            .field("handlers", &self.len())
            .finish()
    }
}

impl<A: 'static> MulticastEvent<A> {
    /// Create an event with no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an event holding a single no-op handler
    pub fn with_placeholder() -> Self {
        let event = Self::default();
        event.subscribe(|_| {});
        event
    }

    /// Append a handler
    pub fn subscribe(&self, handler: impl Fn(&A) + 'static) -> HandlerId {
        let id = HandlerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.handlers.borrow_mut().push((id, Rc::new(handler)));
        id
    }

    /// Remove a handler, returning whether it was attached
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        match handlers.iter().position(|(h, _)| *h == id) {
            Some(index) => {
                handlers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Call every handler in subscription order
    ///
    /// Handlers may subscribe or unsubscribe while running; changes apply to
    /// the next invocation.
    pub fn invoke(&self, args: &A) {
        let snapshot: Vec<Handler<A>> = self
            .handlers
            .borrow()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in snapshot {
            handler(args);
        }
    }

    /// Number of attached handlers
    pub fn len(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Type-erased view of an event used by event-backed units
pub trait EventSource {
    /// Length of the invocation list
    fn invocation_len(&self) -> usize;

    /// Attach a handler that increments `counter` on every invocation
    fn subscribe_counter(&self, counter: Rc<Cell<u64>>) -> HandlerId;

    /// Detach a handler
    fn unsubscribe(&self, id: HandlerId) -> bool;
}

impl<A: 'static> EventSource for MulticastEvent<A> {
    fn invocation_len(&self) -> usize {
        self.len()
    }

    fn subscribe_counter(&self, counter: Rc<Cell<u64>>) -> HandlerId {
        self.subscribe(move |_| counter.set(counter.get() + 1))
    }

    fn unsubscribe(&self, id: HandlerId) -> bool {
        MulticastEvent::unsubscribe(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_invoke_unsubscribe() {
        let event = MulticastEvent::<i32>::new();
        let total = Rc::new(Cell::new(0));

        let t = total.clone();
        let id = event.subscribe(move |v| t.set(t.get() + *v));
        event.invoke(&5);
        event.invoke(&2);
        assert_eq!(total.get(), 7);

        assert!(event.unsubscribe(id));
        assert!(!event.unsubscribe(id));
        event.invoke(&100);
        assert_eq!(total.get(), 7);
        assert!(event.is_empty());
    }

    #[test]
    fn test_counter_through_event_source() {
        let event = MulticastEvent::<()>::new();
        let counter = Rc::new(Cell::new(0));

        let source: &dyn EventSource = &event;
        let id = source.subscribe_counter(counter.clone());
        assert_eq!(source.invocation_len(), 1);

        event.invoke(&());
        event.invoke(&());
        assert_eq!(counter.get(), 2);

        assert!(source.unsubscribe(id));
        assert_eq!(source.invocation_len(), 0);
    }

    #[test]
    fn test_placeholder_is_a_handler() {
        let event = MulticastEvent::<u8>::with_placeholder();
        assert_eq!(event.len(), 1);
        assert!(!event.is_empty());
        assert_eq!(format!("{:?}", event), "MulticastEvent { handlers: 1 }");

        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        event.subscribe(move |_| c.set(c.get() + 1));
        event.invoke(&1);
        assert_eq!(calls.get(), 1);
        assert_eq!(event.len(), 2);
    }

    #[test]
    fn test_handler_may_unsubscribe_during_invoke() {
        let event = Rc::new(MulticastEvent::<()>::new());
        let calls = Rc::new(Cell::new(0));

        let id_slot = Rc::new(Cell::new(None));
        let (ev, slot, c) = (event.clone(), id_slot.clone(), calls.clone());
        let id = event.subscribe(move |_| {
            c.set(c.get() + 1);
            if let Some(id) = slot.get() {
                ev.unsubscribe(id);
            }
        });
        id_slot.set(Some(id));

        event.invoke(&());
        event.invoke(&());
        assert_eq!(calls.get(), 1);
    }
}
