// ============================================================================
// spark-dom - Host interface
// The seam between the binders and a concrete document tree
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Handle returned by [`Host::add_event_listener`].
pub type ListenerId = u64;

/// Callback registered for a host event.
pub type EventHandler<N> = Rc<dyn Fn(&Event<N>)>;

/// An event delivered by the host.
///
/// `props` is a snapshot of the target's attributes and properties taken at
/// dispatch time, with properties (such as an input's live `value`) winning
/// over attributes of the same name.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<N> {
    pub name: String,
    pub target: N,
    pub props: BTreeMap<String, String>,
}

impl<N> Event<N> {
    pub fn new(name: impl Into<String>, target: N) -> Self {
        Self {
            name: name.into(),
            target,
            props: BTreeMap::new(),
        }
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Named property of the target at dispatch time.
    pub fn prop(&self, name: &str) -> Option<&str> {
        self.props.get(name).map(String::as_str)
    }
}

/// A document tree the binders can build and patch.
///
/// All methods take `&self`; implementations keep their tree behind interior
/// mutability. Nodes are cheap handles compared by identity.
pub trait Host: 'static {
    type Node: Clone + PartialEq + fmt::Debug + 'static;

    fn create_element(&self, tag: &str) -> Self::Node;

    fn create_text(&self, text: &str) -> Self::Node;

    fn set_attribute(&self, node: &Self::Node, name: &str, value: &str);

    fn remove_attribute(&self, node: &Self::Node, name: &str);

    /// Replace the content of a text node.
    fn set_text(&self, node: &Self::Node, text: &str);

    /// Insert `child` so that it ends up at `index` among `parent`'s children.
    ///
    /// An attached child is detached first (from any parent), and `index` is
    /// read against the list without it. Indices past the end append.
    fn insert_child(&self, parent: &Self::Node, child: &Self::Node, index: usize);

    /// Insert `child` in front of `before`, or last when `before` is `None`.
    ///
    /// An attached child is moved. A `before` that is not a child of
    /// `parent` appends.
    fn insert_before(&self, parent: &Self::Node, child: &Self::Node, before: Option<&Self::Node>);

    fn remove_child(&self, parent: &Self::Node, child: &Self::Node);

    fn replace_child(&self, parent: &Self::Node, old: &Self::Node, new: &Self::Node);

    fn add_event_listener(
        &self,
        node: &Self::Node,
        event: &str,
        handler: EventHandler<Self::Node>,
    ) -> ListenerId;

    fn remove_event_listener(&self, node: &Self::Node, id: ListenerId);

    fn child_count(&self, node: &Self::Node) -> usize;
}
