// ============================================================================
// spark-dom - MemoryHost
// An arena-backed document tree for headless rendering and tests
// ============================================================================
//
// Every structural or attribute change is appended to a mutation log, so tests
// can assert how much churn an update caused. `set_property` models user input
// (typing, ticking a checkbox) and is not logged.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use crate::dom::host::{Event, EventHandler, Host, ListenerId};

/// Index of a node in a [`MemoryHost`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One logged host operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateElement { node: NodeId, tag: String },
    CreateText { node: NodeId, text: String },
    SetAttribute { node: NodeId, name: String, value: String },
    RemoveAttribute { node: NodeId, name: String },
    SetText { node: NodeId, text: String },
    Insert { parent: NodeId, child: NodeId, index: usize },
    Remove { parent: NodeId, child: NodeId },
    Replace { parent: NodeId, old: NodeId, new: NodeId },
    AddListener { node: NodeId, event: String },
    RemoveListener { node: NodeId, event: String },
}

enum NodeKind {
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
        properties: BTreeMap<String, String>,
    },
    Text(String),
}

struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    listeners: Vec<(ListenerId, String, EventHandler<NodeId>)>,
}

const VOID_ELEMENTS: &[&str] = &["area", "br", "col", "hr", "img", "input", "link", "meta"];

/// In-memory [`Host`].
#[derive(Default)]
pub struct MemoryHost {
    nodes: RefCell<Vec<NodeData>>,
    log: RefCell<Vec<Mutation>>,
    next_listener: Cell<ListenerId>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&self, kind: NodeKind) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
        });
        NodeId(nodes.len() - 1)
    }

    fn record(&self, mutation: Mutation) {
        self.log.borrow_mut().push(mutation);
    }

    fn detach(nodes: &mut [NodeData], child: NodeId) {
        if let Some(parent) = nodes[child.0].parent.take() {
            nodes[parent.0].children.retain(|c| *c != child);
        }
    }

    // =========================================================================
    // USER INPUT
    // =========================================================================

    /// Set a live property, as user input would. Not logged.
    pub fn set_property(&self, node: NodeId, name: &str, value: impl Into<String>) {
        if let NodeKind::Element { properties, .. } = &mut self.nodes.borrow_mut()[node.0].kind {
            properties.insert(name.to_string(), value.into());
        }
    }

    pub fn property(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.nodes.borrow()[node.0].kind {
            NodeKind::Element { properties, .. } => properties.get(name).cloned(),
            NodeKind::Text(_) => None,
        }
    }

    /// Fire `event` at `node`. Returns how many handlers ran.
    pub fn dispatch(&self, node: NodeId, event: &str) -> usize {
        let (props, handlers) = {
            let nodes = self.nodes.borrow();
            let data = &nodes[node.0];
            let props = match &data.kind {
                NodeKind::Element {
                    attributes,
                    properties,
                    ..
                } => {
                    let mut props = attributes.clone();
                    props.extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
                    props
                }
                NodeKind::Text(_) => BTreeMap::new(),
            };
            // BORROW SAFETY: handlers mutate the tree, so release it first
            let handlers: Vec<EventHandler<NodeId>> = data
                .listeners
                .iter()
                .filter(|(_, name, _)| name == event)
                .map(|(_, _, h)| h.clone())
                .collect();
            (props, handlers)
        };

        tracing::trace!(%node, event, handlers = handlers.len(), "dispatch");

        let event = Event {
            name: event.to_string(),
            target: node,
            props,
        };
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    pub fn tag(&self, node: NodeId) -> Option<String> {
        match &self.nodes.borrow()[node.0].kind {
            NodeKind::Element { tag, .. } => Some(tag.clone()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.nodes.borrow()[node.0].kind {
            NodeKind::Element { attributes, .. } => attributes.get(name).cloned(),
            NodeKind::Text(_) => None,
        }
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    /// Concatenated text of `node` and its descendants.
    pub fn text_content(&self, node: NodeId) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        collect_text(&nodes, node, &mut out);
        out
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes.borrow()[node.0].children.clone()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.borrow()[node.0].parent
    }

    pub fn listener_count(&self, node: NodeId) -> usize {
        self.nodes.borrow()[node.0].listeners.len()
    }

    /// Total number of nodes ever created.
    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Serialize `node` as HTML. Attributes are written in name order.
    pub fn render_html(&self, node: NodeId) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        write_html(&nodes, node, &mut out);
        out
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.log.borrow().clone()
    }

    pub fn clear_mutations(&self) {
        self.log.borrow_mut().clear();
    }
}

fn collect_text(nodes: &[NodeData], node: NodeId, out: &mut String) {
    match &nodes[node.0].kind {
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Element { .. } => {
            for child in &nodes[node.0].children {
                collect_text(nodes, *child, out);
            }
        }
    }
}

fn escape(text: &str, out: &mut String, in_attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

fn write_html(nodes: &[NodeData], node: NodeId, out: &mut String) {
    let data = &nodes[node.0];
    match &data.kind {
        NodeKind::Text(text) => escape(text, out, false),
        NodeKind::Element {
            tag, attributes, ..
        } => {
            let _ = write!(out, "<{tag}");
            for (name, value) in attributes {
                if value.is_empty() {
                    let _ = write!(out, " {name}");
                } else {
                    let _ = write!(out, " {name}=\"");
                    escape(value, out, true);
                    out.push('"');
                }
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag.as_str()) && data.children.is_empty() {
                return;
            }
            for child in &data.children {
                write_html(nodes, *child, out);
            }
            let _ = write!(out, "</{tag}>");
        }
    }
}

impl Host for MemoryHost {
    type Node = NodeId;

    fn create_element(&self, tag: &str) -> NodeId {
        let node = self.alloc(NodeKind::Element {
            tag: tag.to_string(),
            attributes: BTreeMap::new(),
            properties: BTreeMap::new(),
        });
        self.record(Mutation::CreateElement {
            node,
            tag: tag.to_string(),
        });
        node
    }

    fn create_text(&self, text: &str) -> NodeId {
        let node = self.alloc(NodeKind::Text(text.to_string()));
        self.record(Mutation::CreateText {
            node,
            text: text.to_string(),
        });
        node
    }

    fn set_attribute(&self, node: &NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes.borrow_mut()[node.0].kind {
            attributes.insert(name.to_string(), value.to_string());
        }
        self.record(Mutation::SetAttribute {
            node: *node,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn remove_attribute(&self, node: &NodeId, name: &str) {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes.borrow_mut()[node.0].kind {
            attributes.remove(name);
        }
        self.record(Mutation::RemoveAttribute {
            node: *node,
            name: name.to_string(),
        });
    }

    fn set_text(&self, node: &NodeId, text: &str) {
        if let NodeKind::Text(current) = &mut self.nodes.borrow_mut()[node.0].kind {
            *current = text.to_string();
        }
        self.record(Mutation::SetText {
            node: *node,
            text: text.to_string(),
        });
    }

    fn insert_child(&self, parent: &NodeId, child: &NodeId, index: usize) {
        let index = {
            let mut nodes = self.nodes.borrow_mut();
            Self::detach(&mut nodes, *child);
            let siblings = &mut nodes[parent.0].children;
            let index = index.min(siblings.len());
            siblings.insert(index, *child);
            nodes[child.0].parent = Some(*parent);
            index
        };
        self.record(Mutation::Insert {
            parent: *parent,
            child: *child,
            index,
        });
    }

    fn insert_before(&self, parent: &NodeId, child: &NodeId, before: Option<&NodeId>) {
        let index = {
            let mut nodes = self.nodes.borrow_mut();
            Self::detach(&mut nodes, *child);
            let siblings = &mut nodes[parent.0].children;
            let index = before
                .and_then(|b| siblings.iter().position(|c| c == b))
                .unwrap_or(siblings.len());
            siblings.insert(index, *child);
            nodes[child.0].parent = Some(*parent);
            index
        };
        self.record(Mutation::Insert {
            parent: *parent,
            child: *child,
            index,
        });
    }

    fn remove_child(&self, parent: &NodeId, child: &NodeId) {
        {
            let mut nodes = self.nodes.borrow_mut();
            if nodes[child.0].parent != Some(*parent) {
                tracing::debug!(%parent, %child, "remove_child: not a child");
                return;
            }
            Self::detach(&mut nodes, *child);
        }
        self.record(Mutation::Remove {
            parent: *parent,
            child: *child,
        });
    }

    fn replace_child(&self, parent: &NodeId, old: &NodeId, new: &NodeId) {
        {
            let mut nodes = self.nodes.borrow_mut();
            let Some(index) = nodes[parent.0].children.iter().position(|c| c == old) else {
                return;
            };
            Self::detach(&mut nodes, *new);
            // Detaching `new` may have shifted `old`
            let index = nodes[parent.0]
                .children
                .iter()
                .position(|c| c == old)
                .unwrap_or(index);
            nodes[parent.0].children[index] = *new;
            nodes[old.0].parent = None;
            nodes[new.0].parent = Some(*parent);
        }
        self.record(Mutation::Replace {
            parent: *parent,
            old: *old,
            new: *new,
        });
    }

    fn add_event_listener(
        &self,
        node: &NodeId,
        event: &str,
        handler: EventHandler<NodeId>,
    ) -> ListenerId {
        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        self.nodes.borrow_mut()[node.0]
            .listeners
            .push((id, event.to_string(), handler));
        self.record(Mutation::AddListener {
            node: *node,
            event: event.to_string(),
        });
        id
    }

    fn remove_event_listener(&self, node: &NodeId, id: ListenerId) {
        let removed = {
            let mut nodes = self.nodes.borrow_mut();
            let listeners = &mut nodes[node.0].listeners;
            listeners
                .iter()
                .position(|(lid, _, _)| *lid == id)
                .map(|i| listeners.remove(i))
        };
        if let Some((_, event, _)) = removed {
            self.record(Mutation::RemoveListener { node: *node, event });
        }
    }

    fn child_count(&self, node: &NodeId) -> usize {
        self.nodes.borrow()[node.0].children.len()
    }
}

impl fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHost")
            .field("nodes", &self.nodes.borrow().len())
            .field("mutations", &self.log.borrow().len())
            .finish()
    }
}
