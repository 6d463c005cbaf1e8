// ============================================================================
// spark-dom - ObservableArray
// An ordered collection that emits structured change records
// ============================================================================
//
// Listeners receive what changed (insert/remove/replace at an index) rather
// than "the value changed", so list bindings can patch instead of rebuild.
// Computations that read the array re-run through a version stream bumped
// after every delivered notification.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{isolate, report, Error, Result};
use crate::primitives::stream::{Stream, Subscription};
use crate::reactivity::batching::batch;

// =============================================================================
// CHANGE RECORDS
// =============================================================================

/// Kind of an [`ArrayChange`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Remove,
    Replace,
    Reset,
    Batch,
}

/// A structured description of one mutation.
///
/// Indices are valid against the array as it was immediately before that
/// particular mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayChange<T> {
    /// `items` now start at `index`
    Insert { index: usize, items: Vec<T> },
    /// `items` were removed starting at `index`
    Remove { index: usize, items: Vec<T> },
    /// The item at `index` was overwritten
    Replace { index: usize, old: T, new: T },
    /// The whole content was replaced
    Reset,
    /// Several changes, in the order they happened
    Batch(Vec<ArrayChange<T>>),
}

impl<T> ArrayChange<T> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ArrayChange::Insert { .. } => ChangeKind::Insert,
            ArrayChange::Remove { .. } => ChangeKind::Remove,
            ArrayChange::Replace { .. } => ChangeKind::Replace,
            ArrayChange::Reset => ChangeKind::Reset,
            ArrayChange::Batch(_) => ChangeKind::Batch,
        }
    }

    /// Start index, for records that have one.
    pub fn index(&self) -> Option<usize> {
        match self {
            ArrayChange::Insert { index, .. }
            | ArrayChange::Remove { index, .. }
            | ArrayChange::Replace { index, .. } => Some(*index),
            ArrayChange::Reset | ArrayChange::Batch(_) => None,
        }
    }

    /// Number of items affected.
    pub fn count(&self) -> usize {
        match self {
            ArrayChange::Insert { items, .. } | ArrayChange::Remove { items, .. } => items.len(),
            ArrayChange::Replace { .. } => 1,
            ArrayChange::Reset => 0,
            ArrayChange::Batch(changes) => changes.iter().map(ArrayChange::count).sum(),
        }
    }

    /// Expand nested batches into a flat list of leaf records.
    pub fn flatten(self) -> Vec<ArrayChange<T>> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(self, out: &mut Vec<ArrayChange<T>>) {
        match self {
            ArrayChange::Batch(changes) => {
                for change in changes {
                    change.flatten_into(out);
                }
            }
            leaf => out.push(leaf),
        }
    }
}

// =============================================================================
// ARRAY INNER
// =============================================================================

type ListenerFn<T> = Rc<dyn Fn(&ArrayChange<T>)>;

struct ArrayInner<T> {
    items: RefCell<Vec<T>>,
    listeners: RefCell<Vec<(u64, ListenerFn<T>)>>,
    next_listener: Cell<u64>,

    /// Open `apply_changes` scopes
    batch_depth: Cell<u32>,

    /// Records held back by an open `apply_changes` scope
    pending: RefCell<Vec<ArrayChange<T>>>,

    /// Set while listeners run; records emitted meanwhile wait in `outbox`
    delivering: Cell<bool>,
    outbox: RefCell<VecDeque<ArrayChange<T>>>,

    /// Bumped after each delivered notification; read to track the array
    version: Stream<u64>,
}

impl<T: Clone + 'static> ArrayInner<T> {
    fn emit(&self, change: ArrayChange<T>) {
        if self.batch_depth.get() > 0 {
            self.pending.borrow_mut().extend(change.flatten());
            return;
        }
        self.deliver(change);
    }

    fn deliver(&self, change: ArrayChange<T>) {
        self.outbox.borrow_mut().push_back(change);
        if self.delivering.replace(true) {
            // Emitted by a listener: delivered after the current record
            return;
        }

        loop {
            let Some(change) = self.outbox.borrow_mut().pop_front() else {
                break;
            };
            tracing::trace!(kind = ?change.kind(), count = change.count(), "array change");

            // BORROW SAFETY: snapshot listeners so they may mutate this array
            let listeners: Vec<ListenerFn<T>> = self
                .listeners
                .borrow()
                .iter()
                .map(|(_, l)| l.clone())
                .collect();

            let failures: Vec<String> = listeners
                .iter()
                .filter_map(|listener| isolate(|| listener(&change)).err())
                .collect();

            if !failures.is_empty() {
                report(Error::SubscriberPanicked { failures });
            }

            self.version.update(|v| *v += 1);
        }
        self.delivering.set(false);
    }

    fn track(&self) {
        self.version.with(|_| ());
    }
}

// =============================================================================
// OBSERVABLE ARRAY
// =============================================================================

/// An ordered, mutable sequence that reports structured changes.
///
/// A cheap-clone handle: clones share the same array.
///
/// ```
/// use spark_dom::{ArrayChange, ObservableArray};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let numbers = ObservableArray::from_vec(vec![1, 2, 3]);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let l = log.clone();
/// let _sub = numbers.add_listener(move |change| l.borrow_mut().push(change.clone()));
///
/// numbers.splice(1, 1, []).unwrap();
///
/// assert_eq!(numbers.to_vec(), vec![1, 3]);
/// assert_eq!(
///     *log.borrow(),
///     vec![ArrayChange::Remove { index: 1, items: vec![2] }]
/// );
/// ```
pub struct ObservableArray<T> {
    inner: Rc<ArrayInner<T>>,
}

impl<T> Clone for ObservableArray<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> ObservableArray<T> {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                items: RefCell::new(items),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
                batch_depth: Cell::new(0),
                pending: RefCell::new(Vec::new()),
                delivering: Cell::new(false),
                outbox: RefCell::new(VecDeque::new()),
                version: Stream::new(0),
            }),
        }
    }

    // =========================================================================
    // READS (tracked)
    // =========================================================================

    pub fn len(&self) -> usize {
        self.inner.track();
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.track();
        self.inner.items.borrow().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.inner.track();
        self.inner.items.borrow().clone()
    }

    /// Read the items without cloning them.
    ///
    /// Mutating the array from inside `f` panics (the items are borrowed).
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        self.inner.track();
        f(&self.inner.items.borrow())
    }

    /// Copy of the items without registering a dependency.
    pub fn peek(&self) -> Vec<T> {
        self.inner.items.borrow().clone()
    }

    pub fn position(&self, item: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.inner.track();
        self.inner.items.borrow().iter().position(|x| x == item)
    }

    /// Number of delivered notifications so far.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Append one item. Emits `Insert { index: old_len, .. }`.
    pub fn push(&self, item: T) {
        let index = {
            let mut items = self.inner.items.borrow_mut();
            items.push(item.clone());
            items.len() - 1
        };
        self.inner.emit(ArrayChange::Insert {
            index,
            items: vec![item],
        });
    }

    /// Remove `remove_count` items at `index` and insert `new_items` there.
    ///
    /// `index` past the end is an error; a `remove_count` running past the end
    /// is clamped. Emits a `Remove` and/or an `Insert` record (grouped into one
    /// `Batch` when both happen); a splice that changes nothing emits nothing.
    /// Returns the removed items.
    pub fn splice(
        &self,
        index: usize,
        remove_count: usize,
        new_items: impl IntoIterator<Item = T>,
    ) -> Result<Vec<T>> {
        let new_items: Vec<T> = new_items.into_iter().collect();

        let removed: Vec<T> = {
            let mut items = self.inner.items.borrow_mut();
            let len = items.len();
            if index > len {
                tracing::debug!(index, len, "splice out of range");
                return Err(Error::SpliceOutOfRange { index, len });
            }
            let end = index.saturating_add(remove_count).min(len);
            items.splice(index..end, new_items.iter().cloned()).collect()
        };

        let mut changes = Vec::with_capacity(2);
        if !removed.is_empty() {
            changes.push(ArrayChange::Remove {
                index,
                items: removed.clone(),
            });
        }
        if !new_items.is_empty() {
            changes.push(ArrayChange::Insert {
                index,
                items: new_items,
            });
        }

        match changes.len() {
            0 => {}
            1 => {
                if let Some(change) = changes.pop() {
                    self.inner.emit(change);
                }
            }
            _ => self.inner.emit(ArrayChange::Batch(changes)),
        }

        Ok(removed)
    }

    /// Insert one item at `index` (`index == len` appends).
    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        self.splice(index, 0, [item]).map(|_| ())
    }

    /// Remove the first item equal to `item`. Removing a non-member is a
    /// no-op and emits nothing.
    pub fn remove(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        let position = self.inner.items.borrow().iter().position(|x| x == item);
        match position {
            Some(index) => self.splice(index, 1, []).is_ok(),
            None => false,
        }
    }

    /// Remove and return the item at `index`.
    pub fn remove_at(&self, index: usize) -> Result<T> {
        let len = self.inner.items.borrow().len();
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        let mut removed = self.splice(index, 1, [])?;
        removed.pop().ok_or(Error::IndexOutOfRange { index, len })
    }

    pub fn pop(&self) -> Option<T> {
        let len = self.inner.items.borrow().len();
        if len == 0 {
            return None;
        }
        self.splice(len - 1, 1, []).ok().and_then(|mut v| v.pop())
    }

    /// Overwrite the item at `index`, returning the old one. Emits `Replace`.
    pub fn set(&self, index: usize, item: T) -> Result<T> {
        let old = {
            let mut items = self.inner.items.borrow_mut();
            let len = items.len();
            match items.get_mut(index) {
                Some(slot) => std::mem::replace(slot, item.clone()),
                None => return Err(Error::IndexOutOfRange { index, len }),
            }
        };
        self.inner.emit(ArrayChange::Replace {
            index,
            old: old.clone(),
            new: item,
        });
        Ok(old)
    }

    /// Remove everything. Emits one `Remove` record, or nothing when empty.
    pub fn clear(&self) {
        let len = self.inner.items.borrow().len();
        if len > 0 {
            let _ = self.splice(0, len, []);
        }
    }

    /// Replace the whole content. Emits `Reset`.
    pub fn replace_all(&self, items: impl IntoIterator<Item = T>) {
        *self.inner.items.borrow_mut() = items.into_iter().collect();
        self.inner.emit(ArrayChange::Reset);
    }

    /// Keep only items matching `keep`, as one coalesced notification.
    pub fn retain(&self, mut keep: impl FnMut(&T) -> bool) {
        let doomed: Vec<usize> = self
            .inner
            .items
            .borrow()
            .iter()
            .enumerate()
            .filter(|(_, item)| !keep(*item))
            .map(|(i, _)| i)
            .collect();

        if doomed.is_empty() {
            return;
        }

        self.apply_changes(|| {
            // Back to front so earlier indices stay valid
            for index in doomed.into_iter().rev() {
                let _ = self.splice(index, 1, []);
            }
        });
    }

    // =========================================================================
    // COALESCING
    // =========================================================================

    /// Run `f`, delivering every change it makes as one `Batch` afterwards.
    ///
    /// Nested scopes flatten into the outermost one. The scope is also a
    /// scalar [`batch`], so stream writes inside settle once. An empty scope
    /// emits nothing.
    pub fn apply_changes<R>(&self, f: impl FnOnce() -> R) -> R {
        struct ScopeGuard<T: Clone + 'static> {
            inner: Rc<ArrayInner<T>>,
        }

        impl<T: Clone + 'static> Drop for ScopeGuard<T> {
            fn drop(&mut self) {
                let depth = self.inner.batch_depth.get().saturating_sub(1);
                self.inner.batch_depth.set(depth);
                if depth == 0 {
                    let pending = self.inner.pending.take();
                    if !pending.is_empty() {
                        self.inner.deliver(ArrayChange::Batch(pending));
                    }
                }
            }
        }

        batch(|| {
            self.inner.batch_depth.set(self.inner.batch_depth.get() + 1);
            let _guard = ScopeGuard {
                inner: self.inner.clone(),
            };
            f()
        })
    }

    // =========================================================================
    // LISTENERS
    // =========================================================================

    /// Register a listener for change records.
    pub fn add_listener(&self, listener: impl Fn(&ArrayChange<T>) + 'static) -> Subscription {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));

        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// True while an `apply_changes` scope is holding records back.
    pub(crate) fn in_change_scope(&self) -> bool {
        self.inner.batch_depth.get() > 0
    }

    // =========================================================================
    // IDENTITY
    // =========================================================================

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    /// A handle that does not keep the array alive.
    pub fn downgrade(&self) -> WeakObservableArray<T> {
        WeakObservableArray {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Default for ObservableArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> From<Vec<T>> for ObservableArray<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items)
    }
}

impl<T: Clone + 'static> FromIterator<T> for ObservableArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableArray")
            .field("items", &*self.inner.items.borrow())
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

/// Weak counterpart of [`ObservableArray`].
pub struct WeakObservableArray<T> {
    inner: Weak<ArrayInner<T>>,
}

impl<T> Clone for WeakObservableArray<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> WeakObservableArray<T> {
    pub fn upgrade(&self) -> Option<ObservableArray<T>> {
        self.inner.upgrade().map(|inner| ObservableArray { inner })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::take_errors;
    use crate::{compute, value_stream};

    fn recorder<T: Clone + 'static>(
        array: &ObservableArray<T>,
    ) -> (Rc<RefCell<Vec<ArrayChange<T>>>>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        let sub = array.add_listener(move |c| l.borrow_mut().push(c.clone()));
        (log, sub)
    }

    #[test]
    fn splice_removal_emits_one_record() {
        let a = ObservableArray::from_vec(vec![1, 2, 3]);
        let (log, _sub) = recorder(&a);

        let removed = a.splice(1, 1, []).unwrap();

        assert_eq!(removed, vec![2]);
        assert_eq!(a.to_vec(), vec![1, 3]);
        assert_eq!(a.len(), 2);
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind(), ChangeKind::Remove);
        assert_eq!(log[0].index(), Some(1));
        assert_eq!(log[0].count(), 1);
    }

    #[test]
    fn push_reports_old_length_as_index() {
        let a = ObservableArray::from_vec(vec!['a']);
        let (log, _sub) = recorder(&a);
        a.push('b');
        assert_eq!(
            *log.borrow(),
            vec![ArrayChange::Insert {
                index: 1,
                items: vec!['b']
            }]
        );
    }

    #[test]
    fn splice_replace_groups_remove_and_insert() {
        let a = ObservableArray::from_vec(vec![1, 2, 3]);
        let (log, _sub) = recorder(&a);

        a.splice(1, 2, [7, 8, 9]).unwrap();

        assert_eq!(a.to_vec(), vec![1, 7, 8, 9]);
        assert_eq!(
            *log.borrow(),
            vec![ArrayChange::Batch(vec![
                ArrayChange::Remove {
                    index: 1,
                    items: vec![2, 3]
                },
                ArrayChange::Insert {
                    index: 1,
                    items: vec![7, 8, 9]
                },
            ])]
        );
    }

    #[test]
    fn splice_clamps_remove_count() {
        let a = ObservableArray::from_vec(vec![1, 2, 3]);
        let removed = a.splice(2, 100, []).unwrap();
        assert_eq!(removed, vec![3]);
        assert_eq!(a.to_vec(), vec![1, 2]);
    }

    #[test]
    fn splice_at_end_appends() {
        let a = ObservableArray::from_vec(vec![1]);
        a.splice(1, 5, [2]).unwrap();
        assert_eq!(a.to_vec(), vec![1, 2]);
    }

    #[test]
    fn splice_past_end_is_an_error() {
        let a = ObservableArray::from_vec(vec![1, 2]);
        let (log, _sub) = recorder(&a);
        assert_eq!(
            a.splice(3, 0, [9]),
            Err(Error::SpliceOutOfRange { index: 3, len: 2 })
        );
        assert_eq!(a.to_vec(), vec![1, 2]);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn no_op_splice_emits_nothing() {
        let a = ObservableArray::from_vec(vec![1]);
        let (log, _sub) = recorder(&a);
        a.splice(0, 0, []).unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(a.version(), 0);
    }

    #[test]
    fn remove_first_structural_match() {
        let a = ObservableArray::from_vec(vec!["x", "y", "x"]);
        let (log, _sub) = recorder(&a);

        assert!(a.remove(&"x"));
        assert_eq!(a.to_vec(), vec!["y", "x"]);

        assert!(!a.remove(&"zzz"));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn set_emits_replace() {
        let a = ObservableArray::from_vec(vec![1, 2]);
        let (log, _sub) = recorder(&a);

        assert_eq!(a.set(1, 5), Ok(2));
        assert_eq!(a.set(2, 5), Err(Error::IndexOutOfRange { index: 2, len: 2 }));
        assert_eq!(
            *log.borrow(),
            vec![ArrayChange::Replace {
                index: 1,
                old: 2,
                new: 5
            }]
        );
    }

    #[test]
    fn pop_insert_remove_at_and_clear() {
        let a = ObservableArray::from_vec(vec![1, 2, 3]);
        assert_eq!(a.pop(), Some(3));
        a.insert(0, 0).unwrap();
        assert_eq!(a.to_vec(), vec![0, 1, 2]);
        assert_eq!(a.remove_at(1), Ok(1));
        assert!(a.remove_at(5).is_err());

        let (log, _sub) = recorder(&a);
        a.clear();
        a.clear();
        assert!(a.is_empty());
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(a.pop(), None);
    }

    #[test]
    fn apply_changes_coalesces_and_flattens() {
        let a = ObservableArray::from_vec(vec![1, 2, 3]);
        let (log, _sub) = recorder(&a);

        a.apply_changes(|| {
            a.push(4);
            a.apply_changes(|| {
                a.splice(0, 1, [9]).unwrap();
            });
            assert!(log.borrow().is_empty());
            a.remove(&2);
        });

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        let ArrayChange::Batch(changes) = &log[0] else {
            panic!("expected a batch, got {:?}", log[0]);
        };
        let kinds: Vec<_> = changes.iter().map(ArrayChange::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Insert,
                ChangeKind::Remove,
                ChangeKind::Insert,
                ChangeKind::Remove
            ]
        );
        assert_eq!(a.to_vec(), vec![9, 3, 4]);
    }

    #[test]
    fn empty_apply_changes_emits_nothing() {
        let a: ObservableArray<i32> = ObservableArray::new();
        let (log, _sub) = recorder(&a);
        let out = a.apply_changes(|| 5);
        assert_eq!(out, 5);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn retain_removes_back_to_front_in_one_batch() {
        let a = ObservableArray::from_vec(vec![1, 2, 3, 4, 5]);
        let (log, _sub) = recorder(&a);
        a.retain(|n| n % 2 == 1);
        assert_eq!(a.to_vec(), vec![1, 3, 5]);

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        let leaves = log[0].clone().flatten();
        assert_eq!(
            leaves,
            vec![
                ArrayChange::Remove {
                    index: 3,
                    items: vec![4]
                },
                ArrayChange::Remove {
                    index: 1,
                    items: vec![2]
                },
            ]
        );
    }

    #[test]
    fn replace_all_emits_reset() {
        let a = ObservableArray::from_vec(vec![1]);
        let (log, _sub) = recorder(&a);
        a.replace_all([4, 5]);
        assert_eq!(a.to_vec(), vec![4, 5]);
        assert_eq!(*log.borrow(), vec![ArrayChange::Reset]);
    }

    #[test]
    fn computations_reading_the_array_rerun() {
        let a = ObservableArray::from_vec(vec![1, 2]);
        let a2 = a.clone();
        let total = compute(move || a2.with(|items| items.iter().sum::<i32>()));
        assert_eq!(total.get(), 3);

        a.push(10);
        assert_eq!(total.get(), 13);

        a.apply_changes(|| {
            a.push(1);
            a.push(1);
        });
        assert_eq!(total.get(), 15);
    }

    #[test]
    fn listener_writes_are_delivered_in_order() {
        let a = ObservableArray::from_vec(vec![1]);
        let weak = a.downgrade();
        let _echo = a.add_listener(move |change| {
            if let (Some(a), ArrayChange::Insert { items, .. }) = (weak.upgrade(), change) {
                if items == &[2] {
                    a.push(3);
                }
            }
        });
        let (log, _sub) = recorder(&a);

        a.push(2);

        assert_eq!(a.to_vec(), vec![1, 2, 3]);
        assert_eq!(
            *log.borrow(),
            vec![
                ArrayChange::Insert { index: 1, items: vec![2] },
                ArrayChange::Insert { index: 2, items: vec![3] },
            ]
        );
        assert_eq!(a.version(), 2);
    }

    #[test]
    fn apply_changes_batches_stream_writes() {
        let a: ObservableArray<i32> = ObservableArray::new();
        let s = value_stream(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sn = seen.clone();
        let _sub = s.subscribe(move |v| sn.borrow_mut().push(*v));

        a.apply_changes(|| {
            s.set(1);
            s.set(2);
        });
        assert_eq!(*seen.borrow(), vec![2]);
    }

    #[test]
    fn listener_panic_is_isolated() {
        let a = ObservableArray::from_vec(vec![0]);
        let _bad = a.add_listener(|_| panic!("listener broke"));
        let (log, _sub) = recorder(&a);

        a.push(1);

        assert_eq!(log.borrow().len(), 1);
        assert!(matches!(
            take_errors().as_slice(),
            [Error::SubscriberPanicked { .. }]
        ));
    }

    #[test]
    fn dropped_listener_stops_receiving() {
        let a = ObservableArray::from_vec(vec![0]);
        let (log, sub) = recorder(&a);
        drop(sub);
        a.push(1);
        assert!(log.borrow().is_empty());
        assert_eq!(a.listener_count(), 0);
    }

    #[test]
    fn weak_handle_does_not_keep_array_alive() {
        let a = ObservableArray::from_vec(vec![1]);
        let weak = a.downgrade();
        assert!(weak.upgrade().is_some_and(|b| b.ptr_eq(&a)));
        drop(a);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn count_and_flatten_helpers() {
        let change = ArrayChange::Batch(vec![
            ArrayChange::Insert {
                index: 0,
                items: vec![1, 2],
            },
            ArrayChange::Batch(vec![ArrayChange::Replace {
                index: 0,
                old: 1,
                new: 3,
            }]),
        ]);
        assert_eq!(change.count(), 3);
        assert_eq!(change.index(), None);
        assert_eq!(change.flatten().len(), 2);
    }
}
