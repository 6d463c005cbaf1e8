// ============================================================================
// spark-dom - List binder
// Keeps one element's children in step with an ObservableArray
// ============================================================================
//
// Each item is rendered once and then kept for as long as its key stays in
// the array. On every change notification the binder reconciles by key:
//
// 1. Removed keys: scope stopped, then node detached
// 2. Surviving keys: nodes kept; those outside the longest increasing
//    subsequence of their old positions are moved
// 3. New keys: rendered and inserted
//
// Placement walks the array backwards, putting each node in front of the
// node placed after it, so a rotation like [A, B, C] -> [C, A, B] costs exactly one move.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::collections::{ObservableArray, WeakObservableArray};
use crate::dom::attrs::AttrsArg;
use crate::dom::children::Child;
use crate::dom::host::Host;
use crate::dom::node::BoundNode;
use crate::dom::Dom;
use crate::error::{isolate, report, Error, Result};
use crate::primitives::scope::BindingScope;
use crate::primitives::stream::Stream;
use crate::reactivity::batching::untrack;

// =============================================================================
// IDENTITY
// =============================================================================

/// Reference identity used as the default list key.
///
/// Two items are the same item only if they are the same allocation.
pub trait Identity {
    fn identity(&self) -> usize;
}

impl<U: ?Sized> Identity for Rc<U> {
    fn identity(&self) -> usize {
        Rc::as_ptr(self) as *const () as usize
    }
}

impl<U: 'static> Identity for Stream<U> {
    fn identity(&self) -> usize {
        self.addr()
    }
}

impl<U: Clone + 'static> Identity for ObservableArray<U> {
    fn identity(&self) -> usize {
        self.addr()
    }
}

// =============================================================================
// RECONCILER
// =============================================================================

type RenderFn<N, T> = Rc<dyn Fn(&N, &T) -> Result<BoundNode<N>>>;

struct Entry<T, K, N> {
    key: K,
    /// Held so an identity key's allocation cannot be reused while its node lives
    _item: T,
    node: N,
    scope: BindingScope,
}

struct ListState<T, K, H: Host> {
    host: Rc<H>,
    element: H::Node,
    entries: RefCell<Vec<Entry<T, K, H::Node>>>,
    render: RenderFn<H::Node, T>,
    key_fn: Rc<dyn Fn(&T) -> K>,
    duplicate_reported: Cell<bool>,
}

impl<T, K, H> ListState<T, K, H>
where
    T: Clone + 'static,
    K: Clone + Eq + Hash + fmt::Debug + 'static,
    H: Host,
{
    /// Render one item. A panicking renderer becomes `CallbackPanicked`.
    fn render_entry(&self, key: K, item: &T) -> Result<Entry<T, K, H::Node>> {
        let rendered = isolate(|| (self.render)(&self.element, item)).unwrap_or_else(|message| {
            Err(Error::CallbackPanicked {
                context: "list render",
                message,
            })
        });
        let (node, scope) = rendered?.into_parts();
        Ok(Entry {
            key,
            _item: item.clone(),
            node,
            scope,
        })
    }

    fn reconcile(&self, items: &[T]) {
        // Keys in array order, first occurrence wins
        let mut seen = HashSet::with_capacity(items.len());
        let mut wanted: Vec<(K, &T)> = Vec::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            let key = (self.key_fn)(item);
            if !seen.insert(key.clone()) {
                if !self.duplicate_reported.replace(true) {
                    report(Error::DuplicateKey {
                        key: format!("{key:?}"),
                        position,
                    });
                }
                continue;
            }
            wanted.push((key, item));
        }

        let old: Vec<Entry<T, K, H::Node>> = self.entries.borrow_mut().drain(..).collect();
        let old_len = old.len();

        // Removals go first: stop the bindings, then detach
        let mut survivors: HashMap<K, (usize, Entry<T, K, H::Node>)> = HashMap::with_capacity(old_len);
        let mut removed = 0;
        for entry in old {
            if seen.contains(&entry.key) {
                let position = survivors.len();
                survivors.insert(entry.key.clone(), (position, entry));
            } else {
                entry.scope.stop();
                self.host.remove_child(&self.element, &entry.node);
                removed += 1;
            }
        }

        // Next entries in array order, with their old position among survivors
        let mut next: Vec<(Option<Entry<T, K, H::Node>>, Option<usize>)> = Vec::with_capacity(wanted.len());
        for (key, _) in &wanted {
            match survivors.remove(key) {
                Some((position, entry)) => next.push((Some(entry), Some(position))),
                None => next.push((None, None)),
            }
        }

        let old_positions: Vec<Option<usize>> = next.iter().map(|(_, p)| *p).collect();
        let stable = longest_increasing(&old_positions);

        // Walk backwards, placing each node in front of the one after it
        let mut placed: Vec<Option<Entry<T, K, H::Node>>> = Vec::with_capacity(next.len());
        placed.resize_with(next.len(), || None);
        let mut anchor: Option<H::Node> = None;
        let (mut moved, mut created) = (0, 0);

        for (i, (entry, old_position)) in next.into_iter().enumerate().rev() {
            let entry = match entry {
                Some(entry) => Some(entry),
                None => {
                    let (key, item) = &wanted[i];
                    match self.render_entry(key.clone(), item) {
                        Ok(entry) => {
                            created += 1;
                            Some(entry)
                        }
                        Err(error) => {
                            report(error);
                            None
                        }
                    }
                }
            };
            let Some(entry) = entry else {
                continue;
            };

            if !stable.contains(&i) {
                if old_position.is_some() {
                    moved += 1;
                }
                self.host
                    .insert_before(&self.element, &entry.node, anchor.as_ref());
            }

            anchor = Some(entry.node.clone());
            placed[i] = Some(entry);
        }

        *self.entries.borrow_mut() = placed.into_iter().flatten().collect();

        tracing::debug!(
            before = old_len,
            after = self.entries.borrow().len(),
            removed,
            moved,
            created,
            "list reconciled"
        );
    }

    fn stop_all(&self) {
        let entries: Vec<_> = self.entries.borrow_mut().drain(..).collect();
        for entry in entries {
            entry.scope.stop();
        }
    }
}

/// Indices (into `positions`) of one longest strictly increasing subsequence
/// of the `Some` entries.
fn longest_increasing(positions: &[Option<usize>]) -> HashSet<usize> {
    // tails[k] = index of the smallest tail of an increasing run of length k+1
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; positions.len()];

    for (i, position) in positions.iter().enumerate() {
        let Some(value) = *position else {
            continue;
        };
        let k = tails.partition_point(|&t| positions[t].is_some_and(|p| p < value));
        if k > 0 {
            previous[i] = Some(tails[k - 1]);
        }
        if k == tails.len() {
            tails.push(i);
        } else {
            tails[k] = i;
        }
    }

    let mut result = HashSet::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        result.insert(i);
        cursor = previous[i];
    }
    result
}

// =============================================================================
// BINDER
// =============================================================================

impl<H: Host> Dom<H> {
    /// Bind the children of a new `tag` element to `array`, keyed by item
    /// identity.
    ///
    /// `render` builds one item's node; it receives the list element. A
    /// renderer that fails or panics after binding is reported and its item
    /// is left out until the array changes again.
    ///
    /// ```
    /// use spark_dom::{Attrs, Dom, MemoryHost, ObservableArray, Stream, value_stream};
    ///
    /// let dom = Dom::new(MemoryHost::new());
    /// let todos: ObservableArray<Stream<String>> = ObservableArray::new();
    /// let inner = dom.clone();
    /// let ul = dom
    ///     .element_list("ul", Attrs::new(), &todos, move |_, title| {
    ///         inner.h("li", Attrs::new(), title)
    ///     })
    ///     .unwrap();
    ///
    /// todos.push(value_stream("milk".to_string()));
    /// todos.push(value_stream("eggs".to_string()));
    /// assert_eq!(
    ///     dom.host().render_html(*ul.node()),
    ///     "<ul><li>milk</li><li>eggs</li></ul>"
    /// );
    /// ```
    pub fn element_list<T>(
        &self,
        tag: &str,
        attrs: impl Into<AttrsArg<H::Node>>,
        array: &ObservableArray<T>,
        render: impl Fn(&H::Node, &T) -> Result<BoundNode<H::Node>> + 'static,
    ) -> Result<BoundNode<H::Node>>
    where
        T: Identity + Clone + 'static,
    {
        self.element_list_keyed(tag, attrs, array, render, |item: &T| item.identity())
    }

    /// Like [`element_list`](Self::element_list) with an explicit key.
    ///
    /// Duplicate keys fail the bind with [`Error::DuplicateKey`]. Once bound,
    /// a duplicate is reported once per list and the later item is skipped.
    pub fn element_list_keyed<T, K>(
        &self,
        tag: &str,
        attrs: impl Into<AttrsArg<H::Node>>,
        array: &ObservableArray<T>,
        render: impl Fn(&H::Node, &T) -> Result<BoundNode<H::Node>> + 'static,
        key_fn: impl Fn(&T) -> K + 'static,
    ) -> Result<BoundNode<H::Node>>
    where
        T: Clone + 'static,
        K: Clone + Eq + Hash + fmt::Debug + 'static,
    {
        let items = array.peek();
        let mut seen = HashSet::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            let key = key_fn(item);
            if !seen.insert(key.clone()) {
                return Err(Error::DuplicateKey {
                    key: format!("{key:?}"),
                    position,
                });
            }
        }

        let list = self.h(tag, attrs, Child::Empty)?;
        let (element, scope) = list.into_parts();

        let state = Rc::new(ListState {
            host: self.host().clone(),
            element: element.clone(),
            entries: RefCell::new(Vec::with_capacity(items.len())),
            render: Rc::new(render),
            key_fn: Rc::new(key_fn),
            duplicate_reported: Cell::new(false),
        });

        for item in &items {
            let key = (state.key_fn)(item);
            let entry = untrack(|| state.render_entry(key, item))?;
            state.host.insert_before(&element, &entry.node, None);
            state.entries.borrow_mut().push(entry);
        }

        let weak: WeakObservableArray<T> = array.downgrade();
        let s = state.clone();
        scope.add_subscription(array.add_listener(move |_change| {
            if let Some(array) = weak.upgrade() {
                let items = array.peek();
                untrack(|| s.reconcile(&items));
            }
        }));
        scope.add_cleanup(move || state.stop_all());

        tracing::trace!(tag, items = items.len(), "bound list");
        Ok(BoundNode::new(element, scope))
    }
}
