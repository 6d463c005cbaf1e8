// ============================================================================
// spark-dom - Attributes
// Per-key attribute, class, style and event bindings for one element
// ============================================================================
//
// Every key owns its own binding. Class toggles and the `class` attribute are
// merged into a single class list per node; style properties (and a `style`
// attribute) into a single declaration list. The host only sees a write when
// the merged text actually changes.
// ============================================================================

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::dom::host::{Event, EventHandler, Host};
use crate::dom::prop::{Prop, Value};
use crate::dom::DomConfig;
use crate::error::{isolate, report, Error};
use crate::primitives::scope::BindingScope;

enum AttrEntry<N> {
    Attr(String, Prop<Value>),
    Class(String, Prop<bool>),
    Style(String, Prop<Value>),
    Event(String, EventHandler<N>),
}

/// Attribute map for [`Dom::h`](crate::Dom::h), built key by key.
///
/// ```
/// use spark_dom::{reactive, value_stream, Attrs, NodeId};
///
/// let done = value_stream(false);
/// let attrs: Attrs<NodeId> = Attrs::new()
///     .attr("id", "main")
///     .attr("title", reactive(|| "computed"))
///     .class("completed", &done)
///     .style("display", "none")
///     .on("click", |_| {});
/// assert_eq!(attrs.len(), 5);
/// ```
pub struct Attrs<N> {
    entries: Vec<AttrEntry<N>>,
}

impl<N> Default for Attrs<N> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<N: 'static> Attrs<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Prop<Value>>) -> Self {
        self.entries
            .push(AttrEntry::Attr(name.into(), value.into()));
        self
    }

    /// Toggle one class name.
    pub fn class(mut self, name: impl Into<String>, on: impl Into<Prop<bool>>) -> Self {
        self.entries.push(AttrEntry::Class(name.into(), on.into()));
        self
    }

    pub fn classes<K: Into<String>>(mut self, toggles: impl IntoIterator<Item = (K, Prop<bool>)>) -> Self {
        for (name, on) in toggles {
            self.entries.push(AttrEntry::Class(name.into(), on));
        }
        self
    }

    /// Set one style property. Empty or absent values leave it out.
    pub fn style(mut self, property: impl Into<String>, value: impl Into<Prop<Value>>) -> Self {
        self.entries
            .push(AttrEntry::Style(property.into(), value.into()));
        self
    }

    pub fn styles<K: Into<String>>(mut self, properties: impl IntoIterator<Item = (K, Prop<Value>)>) -> Self {
        for (property, value) in properties {
            self.entries.push(AttrEntry::Style(property.into(), value));
        }
        self
    }

    pub fn on(mut self, event: impl Into<String>, handler: impl Fn(&Event<N>) + 'static) -> Self {
        self.entries
            .push(AttrEntry::Event(event.into(), Rc::new(handler)));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N> fmt::Debug for Attrs<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .entries
            .iter()
            .map(|e| match e {
                AttrEntry::Attr(name, _) => name.clone(),
                AttrEntry::Class(name, _) => format!("class.{name}"),
                AttrEntry::Style(name, _) => format!("style.{name}"),
                AttrEntry::Event(name, _) => format!("on{name}"),
            })
            .collect();
        f.debug_struct("Attrs").field("keys", &keys).finish()
    }
}

/// What `h` accepts as attributes.
///
/// Only [`AttrsArg::Map`] binds. A function producing the whole map is kept
/// as its own variant so it can be refused with
/// [`Error::ReactiveAttributes`].
pub enum AttrsArg<N> {
    Map(Attrs<N>),
    Computed(Rc<dyn Fn() -> Attrs<N>>),
}

impl<N> From<Attrs<N>> for AttrsArg<N> {
    fn from(attrs: Attrs<N>) -> Self {
        AttrsArg::Map(attrs)
    }
}

impl<N, F> From<F> for AttrsArg<N>
where
    F: Fn() -> Attrs<N> + 'static,
{
    fn from(f: F) -> Self {
        AttrsArg::Computed(Rc::new(f))
    }
}

// =============================================================================
// MERGED LISTS
// =============================================================================

#[derive(Default)]
struct ClassList {
    base: Vec<String>,
    toggles: Vec<(String, bool)>,
    written: Option<String>,
}

impl ClassList {
    fn render(&self) -> String {
        let mut names: Vec<&str> = self.base.iter().map(String::as_str).collect();
        for (name, on) in &self.toggles {
            if *on && !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names.join(" ")
    }
}

#[derive(Default)]
struct StyleList {
    base: String,
    properties: Vec<(String, Option<String>)>,
    written: Option<String>,
}

impl StyleList {
    fn render(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        let base = self.base.trim().trim_end_matches(';');
        if !base.is_empty() {
            parts.push(base.to_string());
        }
        for (property, value) in &self.properties {
            if let Some(value) = value {
                parts.push(format!("{property}: {value}"));
            }
        }
        parts.join("; ")
    }
}

/// Write `text` to `name`, removing the attribute when empty, skipping
/// writes that would not change anything.
fn write_merged<H: Host>(host: &H, node: &H::Node, name: &str, text: String, written: &mut Option<String>) {
    if written.as_deref() == Some(text.as_str()) || (written.is_none() && text.is_empty()) {
        return;
    }
    if text.is_empty() {
        host.remove_attribute(node, name);
        *written = None;
    } else {
        host.set_attribute(node, name, &text);
        *written = Some(text);
    }
}

// =============================================================================
// BINDING
// =============================================================================

pub(crate) fn apply_attribute<H: Host>(
    host: &H,
    config: &DomConfig,
    node: &H::Node,
    name: &str,
    value: &Value,
) {
    match value {
        Value::Absent => host.remove_attribute(node, name),
        Value::Bool(on) => set_flag(host, node, name, *on),
        v if config.is_boolean(name) => set_flag(host, node, name, v.is_truthy()),
        v => host.set_attribute(node, name, &v.to_text()),
    }
}

fn set_flag<H: Host>(host: &H, node: &H::Node, name: &str, on: bool) {
    if on {
        host.set_attribute(node, name, "");
    } else {
        host.remove_attribute(node, name);
    }
}

/// Bind every entry of `attrs` to `node`, registering releases in `scope`.
pub(crate) fn bind_attrs<H: Host>(
    host: &Rc<H>,
    config: &Rc<DomConfig>,
    node: &H::Node,
    attrs: Attrs<H::Node>,
    scope: &BindingScope,
) {
    let classes = Rc::new(RefCell::new(ClassList::default()));
    let styles = Rc::new(RefCell::new(StyleList::default()));

    for entry in attrs.entries {
        match entry {
            AttrEntry::Attr(name, prop) if name == "class" => {
                let (host, node, classes) = (host.clone(), node.clone(), classes.clone());
                prop.bind(scope, move |value| {
                    let mut list = classes.borrow_mut();
                    list.base = value
                        .to_text()
                        .split_whitespace()
                        .map(str::to_string)
                        .collect();
                    let text = list.render();
                    write_merged(&*host, &node, "class", text, &mut list.written);
                });
            }
            AttrEntry::Attr(name, prop) if name == "style" => {
                let (host, node, styles) = (host.clone(), node.clone(), styles.clone());
                prop.bind(scope, move |value| {
                    let mut list = styles.borrow_mut();
                    list.base = value.to_text();
                    let text = list.render();
                    write_merged(&*host, &node, "style", text, &mut list.written);
                });
            }
            AttrEntry::Attr(name, prop) => {
                let (host, config, node) = (host.clone(), config.clone(), node.clone());
                prop.bind(scope, move |value| {
                    apply_attribute(&*host, &config, &node, &name, &value);
                });
            }
            AttrEntry::Class(name, prop) => {
                let slot = {
                    let mut list = classes.borrow_mut();
                    list.toggles.push((name, false));
                    list.toggles.len() - 1
                };
                let (host, node, classes) = (host.clone(), node.clone(), classes.clone());
                prop.bind(scope, move |on| {
                    let mut list = classes.borrow_mut();
                    list.toggles[slot].1 = on;
                    let text = list.render();
                    write_merged(&*host, &node, "class", text, &mut list.written);
                });
            }
            AttrEntry::Style(property, prop) => {
                let slot = {
                    let mut list = styles.borrow_mut();
                    list.properties.push((property, None));
                    list.properties.len() - 1
                };
                let (host, node, styles) = (host.clone(), node.clone(), styles.clone());
                prop.bind(scope, move |value| {
                    let mut list = styles.borrow_mut();
                    let text = value.to_text();
                    list.properties[slot].1 = (!text.is_empty()).then_some(text);
                    let text = list.render();
                    write_merged(&*host, &node, "style", text, &mut list.written);
                });
            }
            AttrEntry::Event(event, handler) => bind_event(host, node, event, handler, scope),
        }
    }
}

fn bind_event<H: Host>(
    host: &Rc<H>,
    node: &H::Node,
    event: String,
    handler: EventHandler<H::Node>,
    scope: &BindingScope,
) {
    let label = event.clone();
    let isolated: EventHandler<H::Node> = Rc::new(move |e: &Event<H::Node>| {
        if let Err(message) = isolate(|| handler(e)) {
            tracing::warn!(event = %label, "event handler panicked");
            report(Error::CallbackPanicked {
                context: "event handler",
                message,
            });
        }
    });

    let id = host.add_event_listener(node, &event, isolated);
    let (host, node) = (host.clone(), node.clone());
    scope.add_cleanup(move || host.remove_event_listener(&node, id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::{MemoryHost, NodeId};
    use crate::{reactive, take_errors, value_stream};

    fn setup() -> (Rc<MemoryHost>, Rc<DomConfig>, NodeId) {
        let host = Rc::new(MemoryHost::new());
        let node = host.create_element("div");
        (host, Rc::new(DomConfig::default()), node)
    }

    #[test]
    fn boolean_attributes_add_or_remove() {
        let (host, config, node) = setup();
        let disabled = value_stream(true);
        let scope = BindingScope::new();
        bind_attrs(
            &host,
            &config,
            &node,
            Attrs::new()
                .attr("disabled", &disabled)
                .attr("data-n", 3)
                .attr("hidden", "false"),
            &scope,
        );

        assert_eq!(host.attribute(node, "disabled").as_deref(), Some(""));
        assert_eq!(host.attribute(node, "data-n").as_deref(), Some("3"));
        assert!(!host.has_attribute(node, "hidden"));

        disabled.set(false);
        assert!(!host.has_attribute(node, "disabled"));
    }

    #[test]
    fn class_attribute_and_toggles_merge() {
        let (host, config, node) = setup();
        let done = value_stream(false);
        let editing = value_stream(false);
        let scope = BindingScope::new();
        let e = editing.clone();
        bind_attrs(
            &host,
            &config,
            &node,
            Attrs::new()
                .attr("class", "todo")
                .class("completed", &done)
                .class("editing", reactive(move || e.get())),
            &scope,
        );
        assert_eq!(host.attribute(node, "class").as_deref(), Some("todo"));

        done.set(true);
        editing.set(true);
        assert_eq!(
            host.attribute(node, "class").as_deref(),
            Some("todo completed editing")
        );

        done.set(false);
        assert_eq!(host.attribute(node, "class").as_deref(), Some("todo editing"));
    }

    #[test]
    fn class_writes_only_when_text_changes() {
        let (host, config, node) = setup();
        let done = value_stream(false);
        let scope = BindingScope::new();
        bind_attrs(&host, &config, &node, Attrs::new().class("done", &done), &scope);
        assert!(!host.has_attribute(node, "class"));

        host.clear_mutations();
        done.set(false);
        assert!(host.mutations().is_empty());

        done.set(true);
        done.set(false);
        assert_eq!(host.mutations().len(), 2);
        assert!(!host.has_attribute(node, "class"));
    }

    #[test]
    fn style_properties_merge() {
        let (host, config, node) = setup();
        let display = value_stream(String::from("none"));
        let scope = BindingScope::new();
        bind_attrs(
            &host,
            &config,
            &node,
            Attrs::new()
                .style("display", &display)
                .style("color", "red"),
            &scope,
        );
        assert_eq!(
            host.attribute(node, "style").as_deref(),
            Some("display: none; color: red")
        );

        display.set(String::new());
        assert_eq!(host.attribute(node, "style").as_deref(), Some("color: red"));
    }

    #[test]
    fn events_are_removed_with_scope() {
        let (host, config, node) = setup();
        let clicks = value_stream(0);
        let scope = BindingScope::new();
        let c = clicks.clone();
        bind_attrs(
            &host,
            &config,
            &node,
            Attrs::new().on("click", move |_| c.update(|n| *n += 1)),
            &scope,
        );

        host.dispatch(node, "click");
        assert_eq!(clicks.get(), 1);

        scope.stop();
        assert_eq!(host.dispatch(node, "click"), 0);
        assert_eq!(host.listener_count(node), 0);
    }

    #[test]
    fn panicking_handler_is_reported() {
        let (host, config, node) = setup();
        let scope = BindingScope::new();
        bind_attrs(
            &host,
            &config,
            &node,
            Attrs::new().on("click", |_| panic!("handler broke")),
            &scope,
        );
        host.dispatch(node, "click");
        assert_eq!(
            take_errors(),
            vec![Error::CallbackPanicked {
                context: "event handler",
                message: "handler broke".into()
            }]
        );
    }
}
