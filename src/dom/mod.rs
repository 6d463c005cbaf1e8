// ============================================================================
// spark-dom - Binders
// `h` builds one element with live attribute and child bindings;
// `element_list` keeps an element's children in step with an ObservableArray
// ============================================================================
//
// The binders hang off an explicit `Dom<H>` context instead of ambient
// globals: it owns the host, the attribute configuration, and the scopes of
// everything mounted through it.
// ============================================================================

pub mod attrs;
pub mod children;
pub mod events;
pub mod host;
pub mod list;
pub mod memory;
pub mod node;
pub mod prop;

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::primitives::scope::BindingScope;

use attrs::{bind_attrs, AttrsArg};
use children::{render_child, Child, SlotList};
use host::Host;
use node::BoundNode;

// =============================================================================
// CONFIG
// =============================================================================

/// Attribute names treated as present/absent flags by default.
pub const DEFAULT_BOOLEAN_ATTRIBUTES: &[&str] = &[
    "disabled",
    "checked",
    "hidden",
    "readonly",
    "selected",
    "autofocus",
    "required",
    "multiple",
    "open",
];

/// Runtime options for a [`Dom`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomConfig {
    /// Attributes added as `""` when truthy and removed otherwise
    pub boolean_attributes: BTreeSet<String>,
}

impl Default for DomConfig {
    fn default() -> Self {
        Self {
            boolean_attributes: DEFAULT_BOOLEAN_ATTRIBUTES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl DomConfig {
    pub fn with_boolean_attribute(mut self, name: impl Into<String>) -> Self {
        self.boolean_attributes.insert(name.into());
        self
    }

    pub fn is_boolean(&self, name: &str) -> bool {
        self.boolean_attributes.contains(name)
    }
}

// =============================================================================
// DOM
// =============================================================================

struct Mounted<N> {
    parent: N,
    node: N,
    scope: BindingScope,
}

struct DomInner<H: Host> {
    host: Rc<H>,
    config: Rc<DomConfig>,
    mounted: RefCell<Vec<Mounted<H::Node>>>,
}

/// Binding context over a [`Host`]. Cheap to clone.
///
/// ```
/// use spark_dom::{Attrs, Dom, MemoryHost, value_stream};
///
/// let dom = Dom::new(MemoryHost::new());
/// let title = value_stream(String::from("Buy milk"));
///
/// let label = dom
///     .h("label", Attrs::new().attr("class", "title"), &title)
///     .unwrap();
/// assert_eq!(
///     dom.host().render_html(*label.node()),
///     r#"<label class="title">Buy milk</label>"#
/// );
///
/// title.set("Buy eggs".into());
/// assert_eq!(dom.host().text_content(*label.node()), "Buy eggs");
/// ```
pub struct Dom<H: Host> {
    inner: Rc<DomInner<H>>,
}

impl<H: Host> Clone for Dom<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H: Host> Dom<H> {
    pub fn new(host: H) -> Self {
        Self::with_config(host, DomConfig::default())
    }

    pub fn with_config(host: H, config: DomConfig) -> Self {
        Self {
            inner: Rc::new(DomInner {
                host: Rc::new(host),
                config: Rc::new(config),
                mounted: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn host(&self) -> &Rc<H> {
        &self.inner.host
    }

    pub fn config(&self) -> &DomConfig {
        &self.inner.config
    }

    /// Create `tag` with bound attributes and children.
    ///
    /// Static values are applied once, streams are subscribed, and
    /// [`reactive`](crate::reactive) functions run in effects. Every binding
    /// is owned by the returned node's scope.
    ///
    /// Fails with [`Error::InvalidTag`] for an empty or whitespace tag, and
    /// with [`Error::ReactiveAttributes`] when handed a function producing the
    /// whole attribute map.
    pub fn h(
        &self,
        tag: &str,
        attrs: impl Into<AttrsArg<H::Node>>,
        children: impl Into<Child<H::Node>>,
    ) -> Result<BoundNode<H::Node>> {
        if tag.is_empty() || tag.chars().any(char::is_whitespace) {
            return Err(Error::InvalidTag(tag.to_string()));
        }
        let attrs = match attrs.into() {
            AttrsArg::Map(attrs) => attrs,
            AttrsArg::Computed(_) => {
                tracing::debug!(tag, "rejected attribute function");
                return Err(Error::ReactiveAttributes {
                    tag: tag.to_string(),
                });
            }
        };

        let host = &self.inner.host;
        let node = host.create_element(tag);
        let scope = BindingScope::new();
        bind_attrs(host, &self.inner.config, &node, attrs, &scope);

        let children = children.into();
        if !children.is_empty() {
            let root = SlotList::root();
            let slot = root.push_slot();
            render_child(host, &node, &slot, children, &scope);
            scope.add_cleanup(move || drop(root));
        }

        tracing::trace!(tag, bindings = scope.len(), "bound element");
        Ok(BoundNode::new(node, scope))
    }

    /// Attach `node` as the last child of `parent` and keep its bindings alive
    /// until [`unmount`](Self::unmount).
    pub fn mount(&self, parent: &H::Node, node: BoundNode<H::Node>) -> H::Node {
        let (node, scope) = node.into_parts();
        let host = &self.inner.host;
        host.insert_child(parent, &node, host.child_count(parent));
        self.inner.mounted.borrow_mut().push(Mounted {
            parent: parent.clone(),
            node: node.clone(),
            scope,
        });
        node
    }

    /// Stop a mounted node's bindings, then detach it. Returns false when the
    /// node was not mounted here.
    pub fn unmount(&self, node: &H::Node) -> bool {
        let entry = {
            let mut mounted = self.inner.mounted.borrow_mut();
            mounted
                .iter()
                .position(|m| &m.node == node)
                .map(|i| mounted.remove(i))
        };
        match entry {
            Some(m) => {
                m.scope.stop();
                self.inner.host.remove_child(&m.parent, &m.node);
                true
            }
            None => false,
        }
    }

    pub fn mounted_count(&self) -> usize {
        self.inner.mounted.borrow().len()
    }
}

impl<H: Host + fmt::Debug> fmt::Debug for Dom<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dom")
            .field("host", &self.inner.host)
            .field("mounted", &self.inner.mounted.borrow().len())
            .finish()
    }
}
