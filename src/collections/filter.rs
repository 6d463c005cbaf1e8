// ============================================================================
// spark-dom - Filter
// A derived ObservableArray holding the source items that match a predicate
// ============================================================================
//
// The filtered view is always a subsequence of the source, in source order.
// The filter keeps one membership flag per source position. Source change
// records shift the flags (and drop removed items from the view), then a
// single pass compares old and new flags and splices the view where they
// differ. All edits of one re-application share one `apply_changes` scope,
// so bound lists see a single notification.
//
// The predicate runs untracked. If it reads streams, whoever changes them must
// call `apply_filter()` afterwards.
// ============================================================================

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::collections::observable_array::{ArrayChange, ObservableArray};
use crate::primitives::stream::Subscription;
use crate::reactivity::batching::untrack;

type PredicateFn<T> = Rc<dyn Fn(&T) -> bool>;

struct FilterInner<T> {
    source: ObservableArray<T>,
    filtered: ObservableArray<T>,
    predicate: RefCell<PredicateFn<T>>,
    /// `shown[k]`: source item `k` is in the view
    shown: RefCell<Vec<bool>>,
    listener: RefCell<Option<Subscription>>,
}

/// One contiguous edit of the filtered view, in its own coordinates.
#[derive(Debug, PartialEq)]
struct Run<T> {
    at: usize,
    remove: usize,
    insert: Vec<T>,
}

impl<T: Clone + 'static> FilterInner<T> {
    fn on_change(&self, change: &ArrayChange<T>) {
        self.filtered.apply_changes(|| {
            self.follow(change);
            self.apply();
        });
    }

    /// Shift membership flags to match a source change record.
    fn follow(&self, change: &ArrayChange<T>) {
        match change {
            ArrayChange::Insert { index, items } => {
                let mut shown = self.shown.borrow_mut();
                let at = (*index).min(shown.len());
                shown.splice(at..at, std::iter::repeat_n(false, items.len()));
            }
            ArrayChange::Remove { index, items } => self.hide(*index, items.len(), true),
            ArrayChange::Replace { index, .. } => self.hide(*index, 1, false),
            ArrayChange::Reset => {
                self.filtered.clear();
                *self.shown.borrow_mut() = vec![false; untrack(|| self.source.len())];
            }
            ArrayChange::Batch(changes) => {
                // A reset rebuilds from the final source, so nothing else counts
                if changes.iter().any(|c| matches!(c, ArrayChange::Reset)) {
                    self.follow(&ArrayChange::Reset);
                } else {
                    changes.iter().for_each(|c| self.follow(c));
                }
            }
        }
    }

    /// Take `count` source positions from `index` out of the view, dropping
    /// the positions themselves when `discard` is set.
    fn hide(&self, index: usize, count: usize, discard: bool) {
        let (at, visible) = {
            let mut shown = self.shown.borrow_mut();
            let start = index.min(shown.len());
            let end = index.saturating_add(count).min(shown.len());
            let at = shown[..start].iter().filter(|s| **s).count();
            let visible = shown[start..end].iter().filter(|s| **s).count();
            if discard {
                shown.drain(start..end);
            } else {
                shown[start..end].fill(false);
            }
            (at, visible)
        };
        if visible > 0 {
            let _ = self.filtered.splice(at, visible, []);
        }
    }

    fn apply(&self) {
        if self.source.in_change_scope() {
            // Picked up when the scope delivers its records
            return;
        }

        let predicate = self.predicate.borrow().clone();
        let items = self.source.peek();
        let keep: Vec<bool> = untrack(|| items.iter().map(|item| predicate(item)).collect());

        let out_of_step = self.shown.borrow().len() != keep.len();
        if out_of_step {
            tracing::debug!(source = keep.len(), "filter out of step with source, rebuilding");
            self.filtered.clear();
            *self.shown.borrow_mut() = vec![false; keep.len()];
        }

        let runs = {
            let mut shown = self.shown.borrow_mut();
            let runs = diff(&shown, &keep, &items);
            *shown = keep;
            runs
        };
        if runs.is_empty() {
            return;
        }

        tracing::trace!(runs = runs.len(), len = items.len(), "filter re-applied");

        self.filtered.apply_changes(|| {
            for run in runs {
                // Runs are built against the view as it is at this point
                let _ = self.filtered.splice(run.at, run.remove, run.insert);
            }
        });
    }
}

/// Splices turning the view described by `shown` into the one described by
/// `keep`, in one pass over the source.
///
/// Hidden source items occupy no view position, so edits separated only by
/// hidden items merge into one run.
fn diff<T: Clone>(shown: &[bool], keep: &[bool], items: &[T]) -> Vec<Run<T>> {
    let mut runs = Vec::new();
    let mut pending: Option<Run<T>> = None;
    let mut pos = 0;

    for (k, item) in items.iter().enumerate() {
        match (shown[k], keep[k]) {
            (true, true) => {
                if let Some(run) = pending.take() {
                    pos = run.at + run.insert.len();
                    runs.push(run);
                }
                pos += 1;
            }
            (false, false) => {}
            (was, _) => {
                let run = pending.get_or_insert_with(|| Run {
                    at: pos,
                    remove: 0,
                    insert: Vec::new(),
                });
                if was {
                    run.remove += 1;
                } else {
                    run.insert.push(item.clone());
                }
            }
        }
    }

    runs.extend(pending);
    runs
}

/// A filtered view over an [`ObservableArray`].
///
/// The filter listens to the source and re-applies itself on every change.
/// Clones share the same view. The listener is released when the last clone
/// is dropped.
///
/// ```
/// use spark_dom::{Filter, ObservableArray};
///
/// let numbers = ObservableArray::from_vec(vec![1, 2, 3, 4]);
/// let evens = Filter::new(&numbers, |n: &i32| n % 2 == 0);
/// assert_eq!(evens.filtered().to_vec(), vec![2, 4]);
///
/// numbers.push(5);
/// numbers.push(6);
/// assert_eq!(evens.filtered().to_vec(), vec![2, 4, 6]);
/// ```
pub struct Filter<T> {
    inner: Rc<FilterInner<T>>,
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Filter<T> {
    pub fn new(source: &ObservableArray<T>, predicate: impl Fn(&T) -> bool + 'static) -> Self {
        let inner = Rc::new(FilterInner {
            source: source.clone(),
            filtered: ObservableArray::new(),
            predicate: RefCell::new(Rc::new(predicate)),
            shown: RefCell::new(vec![false; untrack(|| source.len())]),
            listener: RefCell::new(None),
        });

        let weak = Rc::downgrade(&inner);
        let listener = source.add_listener(move |change| {
            if let Some(inner) = weak.upgrade() {
                inner.on_change(change);
            }
        });
        *inner.listener.borrow_mut() = Some(listener);

        inner.apply();
        Self { inner }
    }

    /// The derived view. Bind lists to it like any other array.
    pub fn filtered(&self) -> ObservableArray<T> {
        self.inner.filtered.clone()
    }

    pub fn source(&self) -> ObservableArray<T> {
        self.inner.source.clone()
    }

    /// Bring the view up to date with the source and predicate.
    /// Emits nothing when it already is.
    pub fn apply_filter(&self) {
        self.inner.apply();
    }

    /// Swap the predicate and re-apply.
    pub fn set_predicate(&self, predicate: impl Fn(&T) -> bool + 'static) {
        *self.inner.predicate.borrow_mut() = Rc::new(predicate);
        self.inner.apply();
    }
}

impl<T: fmt::Debug> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("filtered", &self.inner.filtered)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::observable_array::ArrayChange;
    use crate::value_stream;
    use std::cell::Cell;

    fn change_log<T: Clone + 'static>(
        array: &ObservableArray<T>,
    ) -> (Rc<RefCell<Vec<ArrayChange<T>>>>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        let sub = array.add_listener(move |c| l.borrow_mut().push(c.clone()));
        (log, sub)
    }

    #[test]
    fn follows_source_pushes() {
        let source = ObservableArray::from_vec(vec![1, 2, 3, 4]);
        let evens = Filter::new(&source, |n: &i32| n % 2 == 0);
        let (log, _sub) = change_log(&evens.filtered());

        source.push(5);
        assert!(log.borrow().is_empty());

        source.push(6);
        assert_eq!(evens.filtered().to_vec(), vec![2, 4, 6]);

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(
            log[0].clone().flatten(),
            vec![ArrayChange::Insert {
                index: 2,
                items: vec![6]
            }]
        );
    }

    #[test]
    fn apply_filter_is_idempotent() {
        let source = ObservableArray::from_vec(vec![1, 2, 3]);
        let odd = Filter::new(&source, |n: &i32| n % 2 == 1);
        let (log, _sub) = change_log(&odd.filtered());

        odd.apply_filter();
        odd.apply_filter();

        assert!(log.borrow().is_empty());
        assert_eq!(odd.filtered().to_vec(), vec![1, 3]);
    }

    #[test]
    fn source_removal_removes_from_view() {
        let source = ObservableArray::from_vec(vec!["a", "bb", "c", "dd"]);
        let long = Filter::new(&source, |s: &&str| s.len() > 1);

        assert!(source.remove(&"bb"));
        assert_eq!(long.filtered().to_vec(), vec!["dd"]);

        source.set(0, "aa").unwrap();
        assert_eq!(long.filtered().to_vec(), vec!["aa", "dd"]);
    }

    #[test]
    fn predicate_streams_need_explicit_reapply() {
        let threshold = value_stream(2);
        let source = ObservableArray::from_vec(vec![1, 2, 3, 4]);
        let t = threshold.clone();
        let above = Filter::new(&source, move |n: &i32| *n > t.get());
        assert_eq!(above.filtered().to_vec(), vec![3, 4]);

        threshold.set(0);
        assert_eq!(above.filtered().to_vec(), vec![3, 4]);

        above.apply_filter();
        assert_eq!(above.filtered().to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn set_predicate_emits_minimal_edits() {
        let source = ObservableArray::from_vec(vec![1, 2, 3, 4, 5, 6]);
        let f = Filter::new(&source, |n: &i32| n % 2 == 0);
        let (log, _sub) = change_log(&f.filtered());

        f.set_predicate(|n: &i32| n % 3 == 0);
        assert_eq!(f.filtered().to_vec(), vec![3, 6]);

        let leaves = log.borrow()[0].clone().flatten();
        // [2,4,6] -> [3,6]: 2 and 4 go, 3 comes in, 6 stays
        assert_eq!(
            leaves,
            vec![
                ArrayChange::Remove {
                    index: 0,
                    items: vec![2, 4]
                },
                ArrayChange::Insert {
                    index: 0,
                    items: vec![3]
                },
            ]
        );
    }

    #[test]
    fn dropping_filter_releases_listener() {
        let source = ObservableArray::from_vec(vec![1]);
        let f = Filter::new(&source, |_: &i32| true);
        assert_eq!(source.listener_count(), 1);
        let view = f.filtered();
        drop(f);
        assert_eq!(source.listener_count(), 0);

        source.push(2);
        assert_eq!(view.to_vec(), vec![1]);
    }

    #[test]
    fn predicate_runs_untracked() {
        let gate = value_stream(true);
        let source = ObservableArray::from_vec(vec![1, 2]);
        let g = gate.clone();
        let f = Filter::new(&source, move |_: &i32| g.get());
        let view = f.filtered();

        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        let _len = crate::compute(move || {
            r.set(r.get() + 1);
            view.len()
        });
        assert_eq!(runs.get(), 1);

        // The computation depends on the view only, never on `gate`
        gate.set(false);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn diff_merges_edits_across_hidden_items() {
        let items = [1, 2, 3, 4, 5];
        let shown = [true, false, true, false, true];
        let keep = [false, true, false, false, true];

        assert_eq!(
            diff(&shown, &keep, &items),
            vec![Run {
                at: 0,
                remove: 2,
                insert: vec![2]
            }]
        );
        assert!(diff(&keep, &keep, &items).is_empty());
    }

    #[test]
    fn source_moves_and_resets() {
        let source = ObservableArray::from_vec(vec![1, 2, 3, 4]);
        let evens = Filter::new(&source, |n: &i32| n % 2 == 0);

        source.apply_changes(|| {
            let last = source.pop().unwrap();
            source.insert(0, last).unwrap();
        });
        assert_eq!(evens.filtered().to_vec(), vec![4, 2]);

        source.replace_all([6, 5, 8]);
        assert_eq!(evens.filtered().to_vec(), vec![6, 8]);

        // A reset inside a scope wins over the edits around it
        source.apply_changes(|| {
            source.push(10);
            source.replace_all([2, 3]);
            source.push(12);
        });
        assert_eq!(evens.filtered().to_vec(), vec![2, 12]);
    }

    #[test]
    fn reapply_inside_source_scope_waits_for_delivery() {
        let source = ObservableArray::from_vec(vec![1, 2, 3]);
        let f = Filter::new(&source, |n: &i32| n % 2 == 1);
        let (log, _sub) = change_log(&f.filtered());

        source.apply_changes(|| {
            source.push(5);
            f.set_predicate(|n: &i32| *n > 1);
            assert_eq!(f.filtered().to_vec(), vec![1, 3]);
        });

        assert_eq!(f.filtered().to_vec(), vec![2, 3, 5]);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn items_need_no_equality() {
        struct Job {
            done: Cell<bool>,
        }

        let jobs: ObservableArray<Rc<Job>> = (0..4)
            .map(|i| Rc::new(Job { done: Cell::new(i % 2 == 0) }))
            .collect();
        let pending = Filter::new(&jobs, |job: &Rc<Job>| !job.done.get());
        assert_eq!(pending.filtered().len(), 2);

        jobs.peek()[1].done.set(true);
        pending.apply_filter();
        assert_eq!(pending.filtered().len(), 1);
        assert!(Rc::ptr_eq(&pending.filtered().peek()[0], &jobs.peek()[3]));
    }

    #[test]
    fn large_refilter_is_exact() {
        let source: ObservableArray<u32> = (0..20_000).collect();
        let modulus = value_stream(2u32);
        let m = modulus.clone();
        let f = Filter::new(&source, move |n: &u32| n % m.get() == 0);
        let (log, _sub) = change_log(&f.filtered());

        modulus.set(3);
        f.apply_filter();

        let expected: Vec<u32> = (0..20_000).filter(|n| n % 3 == 0).collect();
        assert_eq!(f.filtered().to_vec(), expected);
        assert_eq!(log.borrow().len(), 1);

        // Removing a hidden item touches nothing; a shown one, one record
        source.remove_at(1).unwrap();
        source.remove_at(0).unwrap();
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(f.filtered().peek()[0], 3);
    }
}
