// ============================================================================
// spark-dom - Children
// Child descriptions and the slot tree that places them under an element
// ============================================================================
//
// Every child item gets its own slot. A slot holds either host nodes or a
// nested list of slots (for `Many`), and knows its offset among the element's
// children by summing the sizes of the slots in front of it. Updating one slot
// never touches its siblings.
//
// A dynamic region re-runs its function inside an effect. A single text
// result over a single text node is patched with `set_text`; anything else
// tears down the region's scope and nodes and renders the new result in place.
// ============================================================================

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::dom::host::Host;
use crate::dom::node::BoundNode;
use crate::dom::prop::{Observe, Value};
use crate::primitives::compose::Computed;
use crate::primitives::effect::effect;
use crate::primitives::scope::BindingScope;
use crate::primitives::stream::Stream;
use crate::reactivity::batching::untrack;

// =============================================================================
// CHILD
// =============================================================================

/// What an element contains.
pub enum Child<N> {
    Empty,
    Text(String),
    /// A text node following a stream; its text is rewritten on every write
    Value(Rc<dyn Observe<Value>>),
    /// A reactive region, see [`dynamic`]
    Dynamic(Rc<dyn Fn() -> Child<N>>),
    Node(BoundNode<N>),
    Many(Vec<Child<N>>),
}

impl<N> Child<N> {
    pub fn is_empty(&self) -> bool {
        match self {
            Child::Empty => true,
            Child::Many(children) => children.iter().all(Child::is_empty),
            _ => false,
        }
    }
}

impl<N> Default for Child<N> {
    fn default() -> Self {
        Child::Empty
    }
}

impl<N: fmt::Debug> fmt::Debug for Child<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Child::Empty => f.write_str("Empty"),
            Child::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Child::Value(_) => f.write_str("Value(..)"),
            Child::Dynamic(_) => f.write_str("Dynamic(..)"),
            Child::Node(n) => f.debug_tuple("Node").field(n.node()).finish(),
            Child::Many(c) => f.debug_tuple("Many").field(c).finish(),
        }
    }
}

/// A reactive child region.
///
/// `f` runs inside an effect; the region is re-rendered whenever a stream it
/// read changes. Its siblings are left alone.
///
/// ```
/// use spark_dom::{dynamic, value_stream, Attrs, Dom, MemoryHost};
///
/// let dom = Dom::new(MemoryHost::new());
/// let left = value_stream(2);
/// let l = left.clone();
/// let span = dom
///     .h(
///         "span",
///         Attrs::new(),
///         dynamic(move || if l.get() == 1 { "1 item left" } else { "items left" }),
///     )
///     .unwrap();
///
/// assert_eq!(dom.host().text_content(*span.node()), "items left");
/// left.set(1);
/// assert_eq!(dom.host().text_content(*span.node()), "1 item left");
/// ```
pub fn dynamic<N, C>(f: impl Fn() -> C + 'static) -> Child<N>
where
    C: Into<Child<N>>,
{
    Child::Dynamic(Rc::new(move || f().into()))
}

impl<N> From<&str> for Child<N> {
    fn from(s: &str) -> Self {
        Child::Text(s.to_string())
    }
}

impl<N> From<String> for Child<N> {
    fn from(s: String) -> Self {
        Child::Text(s)
    }
}

macro_rules! child_from_number {
    ($($t:ty),*) => {
        $(
            impl<N> From<$t> for Child<N> {
                fn from(n: $t) -> Self {
                    Child::Text(Value::from(n).to_text())
                }
            }
        )*
    };
}

child_from_number!(i32, i64, u32, u64, usize, f64);

impl<N, T: Clone + Into<Value> + 'static> From<Stream<T>> for Child<N> {
    fn from(stream: Stream<T>) -> Self {
        Child::Value(Rc::new(stream))
    }
}

impl<N, T: Clone + Into<Value> + 'static> From<&Stream<T>> for Child<N> {
    fn from(stream: &Stream<T>) -> Self {
        Child::Value(Rc::new(stream.clone()))
    }
}

impl<N, T: Clone + Into<Value> + 'static> From<Computed<T>> for Child<N> {
    fn from(computed: Computed<T>) -> Self {
        Child::Value(Rc::new(computed))
    }
}

impl<N> From<BoundNode<N>> for Child<N> {
    fn from(node: BoundNode<N>) -> Self {
        Child::Node(node)
    }
}

impl<N> From<Vec<Child<N>>> for Child<N> {
    fn from(children: Vec<Child<N>>) -> Self {
        Child::Many(children)
    }
}

impl<N> From<Vec<BoundNode<N>>> for Child<N> {
    fn from(nodes: Vec<BoundNode<N>>) -> Self {
        Child::Many(nodes.into_iter().map(Child::Node).collect())
    }
}

impl<N, C: Into<Child<N>>> From<Option<C>> for Child<N> {
    fn from(child: Option<C>) -> Self {
        child.map_or(Child::Empty, Into::into)
    }
}

// =============================================================================
// SLOT TREE
// =============================================================================

enum SlotContent<N> {
    /// A text node a dynamic region may patch in place
    Text(N),
    Nodes(Vec<N>),
    List(Rc<SlotList<N>>),
}

pub(crate) struct Slot<N> {
    list: Weak<SlotList<N>>,
    content: RefCell<SlotContent<N>>,
}

pub(crate) struct SlotList<N> {
    owner: Weak<Slot<N>>,
    slots: RefCell<Vec<Rc<Slot<N>>>>,
}

impl<N: Clone> SlotList<N> {
    pub(crate) fn root() -> Rc<Self> {
        Rc::new(Self {
            owner: Weak::new(),
            slots: RefCell::new(Vec::new()),
        })
    }

    fn nested(owner: &Rc<Slot<N>>) -> Rc<Self> {
        Rc::new(Self {
            owner: Rc::downgrade(owner),
            slots: RefCell::new(Vec::new()),
        })
    }

    pub(crate) fn push_slot(self: &Rc<Self>) -> Rc<Slot<N>> {
        let slot = Rc::new(Slot {
            list: Rc::downgrade(self),
            content: RefCell::new(SlotContent::Nodes(Vec::new())),
        });
        self.slots.borrow_mut().push(slot.clone());
        slot
    }

    fn offset(&self) -> usize {
        self.owner.upgrade().map_or(0, |owner| owner.offset())
    }

    fn size(&self) -> usize {
        self.slots.borrow().iter().map(|s| s.size()).sum()
    }

    fn collect_nodes(&self, out: &mut Vec<N>) {
        for slot in self.slots.borrow().iter() {
            slot.collect_nodes(out);
        }
    }
}

impl<N: Clone> Slot<N> {
    fn size(&self) -> usize {
        match &*self.content.borrow() {
            SlotContent::Text(_) => 1,
            SlotContent::Nodes(nodes) => nodes.len(),
            SlotContent::List(list) => list.size(),
        }
    }

    /// Index of this slot's first node among the element's children.
    fn offset(&self) -> usize {
        let Some(list) = self.list.upgrade() else {
            return 0;
        };
        let mut offset = list.offset();
        for sibling in list.slots.borrow().iter() {
            if std::ptr::eq(Rc::as_ptr(sibling), self) {
                break;
            }
            offset += sibling.size();
        }
        offset
    }

    fn collect_nodes(&self, out: &mut Vec<N>) {
        match &*self.content.borrow() {
            SlotContent::Text(node) => out.push(node.clone()),
            SlotContent::Nodes(nodes) => out.extend(nodes.iter().cloned()),
            SlotContent::List(list) => list.collect_nodes(out),
        }
    }

    /// Empty the slot, returning every node it held.
    fn take_nodes(&self) -> Vec<N> {
        let mut out = Vec::new();
        self.collect_nodes(&mut out);
        *self.content.borrow_mut() = SlotContent::Nodes(Vec::new());
        out
    }
}

// =============================================================================
// RENDERING
// =============================================================================

/// Render `child` into `slot` under `parent`, registering bindings in `scope`.
pub(crate) fn render_child<H: Host>(
    host: &Rc<H>,
    parent: &H::Node,
    slot: &Rc<Slot<H::Node>>,
    child: Child<H::Node>,
    scope: &BindingScope,
) {
    match child {
        Child::Empty => {}
        Child::Text(text) => {
            let node = host.create_text(&text);
            host.insert_child(parent, &node, slot.offset());
            *slot.content.borrow_mut() = SlotContent::Text(node);
        }
        Child::Value(source) => {
            let node = host.create_text(&source.current().to_text());
            host.insert_child(parent, &node, slot.offset());
            let (h, n) = (host.clone(), node.clone());
            scope.add_subscription(
                source.observe(Box::new(move |value: Value| h.set_text(&n, &value.to_text()))),
            );
            *slot.content.borrow_mut() = SlotContent::Nodes(vec![node]);
        }
        Child::Node(bound) => {
            let (node, child_scope) = bound.into_parts();
            host.insert_child(parent, &node, slot.offset());
            scope.adopt(child_scope);
            *slot.content.borrow_mut() = SlotContent::Nodes(vec![node]);
        }
        Child::Many(children) => {
            let list = SlotList::nested(slot);
            *slot.content.borrow_mut() = SlotContent::List(list.clone());
            for child in children {
                let item = list.push_slot();
                render_child(host, parent, &item, child, scope);
            }
        }
        Child::Dynamic(f) => bind_region(host, parent, slot, f, scope),
    }
}

fn bind_region<H: Host>(
    host: &Rc<H>,
    parent: &H::Node,
    slot: &Rc<Slot<H::Node>>,
    f: Rc<dyn Fn() -> Child<H::Node>>,
    scope: &BindingScope,
) {
    let region: Rc<RefCell<Option<BindingScope>>> = Rc::new(RefCell::new(None));

    let (host, parent, slot, r) = (host.clone(), parent.clone(), slot.clone(), region.clone());
    scope.add_effect(effect(move || {
        let child = f();
        untrack(|| {
            if let Child::Text(text) = &child {
                if let SlotContent::Text(node) = &*slot.content.borrow() {
                    host.set_text(node, text);
                    return;
                }
            }

            let previous = r.borrow_mut().take();
            if let Some(previous) = previous {
                previous.stop();
            }
            for node in slot.take_nodes() {
                host.remove_child(&parent, &node);
            }

            let next = BindingScope::new();
            render_child(&host, &parent, &slot, child, &next);
            *r.borrow_mut() = Some(next);
        });
    }));

    scope.add_cleanup(move || {
        let inner = region.borrow_mut().take();
        if let Some(inner) = inner {
            inner.stop();
        }
    });
}
