// ============================================================================
// spark-dom - Event helpers
// ============================================================================

use crate::dom::host::Event;
use crate::primitives::stream::Stream;

/// Adapt a handler taking one target property into an event handler.
///
/// The handler is skipped when the target has no such property.
///
/// ```
/// use spark_dom::{target_attr, Event};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let titles = Rc::new(RefCell::new(Vec::new()));
/// let t = titles.clone();
/// let on_change = target_attr("value", move |v| t.borrow_mut().push(v));
///
/// on_change(&Event::new("change", 0u32).with_prop("value", "milk"));
/// on_change(&Event::new("change", 0u32));
/// assert_eq!(*titles.borrow(), vec!["milk".to_string()]);
/// ```
pub fn target_attr<N>(
    name: impl Into<String>,
    handler: impl Fn(String) + 'static,
) -> impl Fn(&Event<N>) + 'static {
    let name = name.into();
    move |event: &Event<N>| {
        if let Some(value) = event.prop(&name) {
            handler(value.to_string());
        }
    }
}

/// Event handler writing a target property into `stream`.
pub fn bind_target_attr<N>(
    name: impl Into<String>,
    stream: &Stream<String>,
) -> impl Fn(&Event<N>) + 'static {
    let stream = stream.clone();
    target_attr(name, move |value| stream.set(value))
}
