// ============================================================================
// spark-dom - Type Definitions
// Type-erased traits and base types for the reactive graph
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use super::constants::*;
use crate::error::isolate;

// =============================================================================
// TYPE-ERASED TRAITS
// =============================================================================
//
// Graph operations (track a read, mark dependents dirty, swap dependency sets)
// never need the value type T. Only reading/writing/notifying needs T, so
// the graph stores:
// - Vec<Rc<dyn AnySource>> as a reaction's dependency list
// - Vec<Weak<dyn AnyReaction>> as a source's dependent list
// =============================================================================

/// Type-erased source interface for reactive graph operations.
///
/// Implemented by `SourceInner<T>`, the cell behind every `Stream<T>`.
pub trait AnySource: Any {
    /// Read version stamp (for dependency deduplication within one run)
    fn read_version(&self) -> u32;

    fn set_read_version(&self, version: u32);

    /// Topological depth: 0 for plain streams, the owning reaction's depth
    /// for the output stream of a computation
    fn depth(&self) -> u32;

    fn set_depth(&self, depth: u32);

    /// Number of reactions depending on this source
    fn reaction_count(&self) -> usize;

    /// Add a reaction that depends on this source
    fn add_reaction(&self, reaction: Weak<dyn AnyReaction>);

    /// Remove a specific reaction (and any dropped ones) from this source
    fn remove_reaction(&self, reaction: &Rc<dyn AnyReaction>);

    /// Call f for each live reaction
    fn for_each_reaction(&self, f: &mut dyn FnMut(Rc<dyn AnyReaction>));

    /// Remove dead (dropped) reactions from the list
    fn cleanup_dead_reactions(&self);

    fn as_any(&self) -> &dyn Any;
}

/// Type-erased reaction interface for scheduling and re-evaluation.
///
/// Implemented by `EffectInner`, which backs both effects and computations.
pub trait AnyReaction: Any {
    fn flags(&self) -> u32;

    fn set_flags(&self, flags: u32);

    /// Incremented on every run; queued runs stamped with an older
    /// generation are stale and skipped.
    fn generation(&self) -> u64;

    /// 1 + the maximum depth of the dependencies read during the last run
    fn depth(&self) -> u32;

    /// Number of dependencies recorded by the last run
    fn dep_count(&self) -> usize;

    /// Re-evaluate the reaction with dependency tracking
    fn run(&self);

    fn is_dirty(&self) -> bool {
        self.flags() & DIRTY != 0
    }

    fn is_clean(&self) -> bool {
        self.flags() & CLEAN != 0
    }

    fn is_destroyed(&self) -> bool {
        self.flags() & DESTROYED != 0
    }

    fn is_updating(&self) -> bool {
        self.flags() & REACTION_IS_UPDATING != 0
    }

    fn mark_dirty(&self) {
        self.set_flags((self.flags() & STATUS_MASK) | DIRTY);
    }

    fn mark_clean(&self) {
        self.set_flags((self.flags() & STATUS_MASK) | CLEAN);
    }

    fn as_any(&self) -> &dyn Any;
}

/// A source whose subscriber notification was deferred by a batch.
pub trait PendingNotify {
    /// Deliver the latest value to every subscriber.
    fn deliver(&self);
}

/// Compare two type-erased sources by allocation.
pub fn same_source(a: &Rc<dyn AnySource>, b: &Rc<dyn AnySource>) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

// =============================================================================
// SOURCE INNER (the data behind Stream<T>)
// =============================================================================

/// Subscriber callback stored by a stream.
pub type SubscriberFn<T> = Rc<dyn Fn(&T)>;

/// The internal data for a stream.
///
/// Separate from `Stream<T>` so it can be stored as `Rc<dyn AnySource>`.
pub struct SourceInner<T> {
    /// The current value
    value: RefCell<T>,

    /// Number of writes so far
    writes: Cell<u64>,

    read_version: Cell<u32>,

    depth: Cell<u32>,

    /// Direct subscribers, in subscription order
    subscribers: RefCell<Vec<(u64, SubscriberFn<T>)>>,

    next_subscriber: Cell<u64>,

    /// Reactions that read this source (weak refs to avoid cycles)
    reactions: RefCell<Vec<Weak<dyn AnyReaction>>>,

    /// Set while a deferred notification is waiting for the settle pass
    queued: Cell<bool>,

    /// Set while subscribers are being called
    notifying: Cell<bool>,

    /// Values written during a notification pass, delivered after it
    outbox: RefCell<VecDeque<T>>,
}

impl<T> SourceInner<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RefCell::new(value),
            writes: Cell::new(0),
            read_version: Cell::new(0),
            depth: Cell::new(0),
            subscribers: RefCell::new(Vec::new()),
            next_subscriber: Cell::new(0),
            reactions: RefCell::new(Vec::new()),
            queued: Cell::new(false),
            notifying: Cell::new(false),
            outbox: RefCell::new(VecDeque::new()),
        }
    }

    /// Get the current value (cloning)
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.value.borrow().clone()
    }

    /// Access the current value with a closure (avoids clone)
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// Replace the value. Always counts as a write: there is no equality check.
    pub fn replace(&self, value: T) {
        *self.value.borrow_mut() = value;
        self.writes.set(self.writes.get() + 1);
    }

    /// Mutate the value in place. Always counts as a write.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.value.borrow_mut());
        self.writes.set(self.writes.get() + 1);
    }

    pub fn writes(&self) -> u64 {
        self.writes.get()
    }

    pub fn add_subscriber(&self, callback: SubscriberFn<T>) -> u64 {
        let id = self.next_subscriber.get();
        self.next_subscriber.set(id + 1);
        self.subscribers.borrow_mut().push((id, callback));
        id
    }

    pub fn remove_subscriber(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Mark as waiting for the settle pass. Returns false if already queued.
    pub fn mark_queued(&self) -> bool {
        !self.queued.replace(true)
    }

    /// Call every subscriber with the current value, in subscription order.
    ///
    /// The subscriber list is snapshotted per value: callbacks added during a
    /// pass do not see that value. A write made by a subscriber is queued and
    /// delivered to everyone once the current pass ends, so every subscriber
    /// sees every value in write order. A panicking callback does not stop
    /// the rest; its message is returned.
    pub fn notify_subscribers(&self) -> Vec<String>
    where
        T: Clone,
    {
        if self.subscribers.borrow().is_empty() {
            return Vec::new();
        }

        self.outbox.borrow_mut().push_back(self.value.borrow().clone());
        if self.notifying.replace(true) {
            // Re-entrant write: the running pass picks it up
            return Vec::new();
        }

        let mut failures = Vec::new();
        loop {
            // BORROW SAFETY: take the value and snapshot the callbacks, then
            // release the borrows so callbacks may read or write this stream
            let Some(value) = self.outbox.borrow_mut().pop_front() else {
                break;
            };
            let callbacks: Vec<SubscriberFn<T>> = self
                .subscribers
                .borrow()
                .iter()
                .map(|(_, cb)| cb.clone())
                .collect();
            failures.extend(
                callbacks
                    .iter()
                    .filter_map(|cb| isolate(|| cb(&value)).err()),
            );
        }
        self.notifying.set(false);
        failures
    }
}

impl<T: 'static> AnySource for SourceInner<T> {
    fn read_version(&self) -> u32 {
        self.read_version.get()
    }

    fn set_read_version(&self, version: u32) {
        self.read_version.set(version);
    }

    fn depth(&self) -> u32 {
        self.depth.get()
    }

    fn set_depth(&self, depth: u32) {
        self.depth.set(depth);
    }

    fn reaction_count(&self) -> usize {
        self.reactions.borrow().len()
    }

    fn add_reaction(&self, reaction: Weak<dyn AnyReaction>) {
        self.reactions.borrow_mut().push(reaction);
    }

    fn remove_reaction(&self, reaction: &Rc<dyn AnyReaction>) {
        let target = Rc::as_ptr(reaction) as *const ();
        self.reactions
            .borrow_mut()
            .retain(|weak| weak.strong_count() > 0 && Weak::as_ptr(weak) as *const () != target);
    }

    fn for_each_reaction(&self, f: &mut dyn FnMut(Rc<dyn AnyReaction>)) {
        let live: Vec<Rc<dyn AnyReaction>> = self
            .reactions
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for reaction in live {
            f(reaction);
        }
    }

    fn cleanup_dead_reactions(&self) {
        self.reactions.borrow_mut().retain(|w| w.strong_count() > 0);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T: Clone + 'static> PendingNotify for SourceInner<T> {
    fn deliver(&self) {
        self.queued.set(false);
        let failures = self.notify_subscribers();
        if !failures.is_empty() {
            crate::error::report(crate::error::Error::SubscriberPanicked { failures });
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
