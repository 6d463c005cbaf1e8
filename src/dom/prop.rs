// ============================================================================
// spark-dom - Binding values
// Static values, streams, and reactive functions accepted by the binders
// ============================================================================

use std::fmt;
use std::rc::Rc;

use crate::primitives::compose::Computed;
use crate::primitives::effect::effect;
use crate::primitives::scope::BindingScope;
use crate::primitives::stream::{Stream, Subscription};
use crate::reactivity::batching::untrack;

// =============================================================================
// VALUE
// =============================================================================

/// An attribute or text value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    Text(String),
    Bool(bool),
    Number(f64),
    /// Removes the attribute
    #[default]
    Absent,
}

impl Value {
    /// Text form used for attribute values and text nodes.
    pub fn to_text(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Absent => String::new(),
        }
    }

    /// Presence of a boolean attribute.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Text(s) => !s.is_empty() && s != "false",
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Absent => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! value_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

value_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Absent, Into::into)
    }
}

// =============================================================================
// OBSERVE
// =============================================================================

/// A source the binders can read once and then follow.
pub trait Observe<V> {
    /// Current value, read untracked.
    fn current(&self) -> V;

    /// Call `sink` with every later value.
    fn observe(&self, sink: Box<dyn Fn(V)>) -> Subscription;
}

impl<T, V> Observe<V> for Stream<T>
where
    T: Clone + Into<V> + 'static,
    V: 'static,
{
    fn current(&self) -> V {
        self.peek().into()
    }

    fn observe(&self, sink: Box<dyn Fn(V)>) -> Subscription {
        self.subscribe(move |value: &T| sink(value.clone().into()))
    }
}

impl<T, V> Observe<V> for Computed<T>
where
    T: Clone + Into<V> + 'static,
    V: 'static,
{
    fn current(&self) -> V {
        self.peek().into()
    }

    fn observe(&self, sink: Box<dyn Fn(V)>) -> Subscription {
        self.subscribe(move |value: &T| sink(value.clone().into()))
    }
}

// =============================================================================
// PROP
// =============================================================================

/// A bound value: fixed, following a stream, or recomputed reactively.
///
/// A function is only reactive when wrapped with [`reactive`]. Calling a
/// function before binding gives a static value.
pub enum Prop<V> {
    Static(V),
    Stream(Rc<dyn Observe<V>>),
    Func(Rc<dyn Fn() -> V>),
}

impl<V> Clone for Prop<V>
where
    V: Clone,
{
    fn clone(&self) -> Self {
        match self {
            Prop::Static(v) => Prop::Static(v.clone()),
            Prop::Stream(s) => Prop::Stream(s.clone()),
            Prop::Func(f) => Prop::Func(f.clone()),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Prop<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prop::Static(v) => f.debug_tuple("Static").field(v).finish(),
            Prop::Stream(_) => f.write_str("Stream(..)"),
            Prop::Func(_) => f.write_str("Func(..)"),
        }
    }
}

impl<V: Clone + 'static> Prop<V> {
    /// Current value, untracked.
    pub fn current(&self) -> V {
        match self {
            Prop::Static(v) => v.clone(),
            Prop::Stream(s) => s.current(),
            Prop::Func(f) => untrack(|| f()),
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Prop::Static(_))
    }

    /// Apply the value now and on every change, for as long as `scope` lives.
    pub(crate) fn bind(self, scope: &BindingScope, apply: impl Fn(V) + 'static) {
        match self {
            Prop::Static(v) => apply(v),
            Prop::Stream(source) => {
                apply(source.current());
                scope.add_subscription(source.observe(Box::new(apply)));
            }
            Prop::Func(f) => {
                scope.add_effect(effect(move || {
                    let value = f();
                    untrack(|| apply(value));
                }));
            }
        }
    }
}

/// A function binding built by [`reactive`].
pub struct Reactive<R>(Rc<dyn Fn() -> R>);

impl<R> Clone for Reactive<R> {
    fn clone(&self) -> Self {
        Reactive(self.0.clone())
    }
}

/// Mark a function as a reactive binding.
///
/// The binder runs it inside an effect and re-applies the result whenever a
/// stream it read changes.
///
/// ```
/// use spark_dom::{reactive, value_stream, Prop, Value};
///
/// let count = value_stream(2);
/// let c = count.clone();
/// let label: Prop<Value> = reactive(move || format!("{} items", c.get())).into();
/// assert_eq!(label.current(), Value::from("2 items"));
/// ```
pub fn reactive<R: 'static>(f: impl Fn() -> R + 'static) -> Reactive<R> {
    Reactive(Rc::new(f))
}

// =============================================================================
// CONVERSIONS
// =============================================================================

macro_rules! prop_value_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Prop<Value> {
                fn from(v: $t) -> Self {
                    Prop::Static(v.into())
                }
            }
        )*
    };
}

prop_value_from!(&str, String, &String, bool, i32, i64, u32, u64, usize, f32, f64, Value);

impl<T: Clone + Into<Value> + 'static> From<Stream<T>> for Prop<Value> {
    fn from(stream: Stream<T>) -> Self {
        Prop::Stream(Rc::new(stream))
    }
}

impl<T: Clone + Into<Value> + 'static> From<&Stream<T>> for Prop<Value> {
    fn from(stream: &Stream<T>) -> Self {
        Prop::Stream(Rc::new(stream.clone()))
    }
}

impl<T: Clone + Into<Value> + 'static> From<Computed<T>> for Prop<Value> {
    fn from(computed: Computed<T>) -> Self {
        Prop::Stream(Rc::new(computed))
    }
}

impl<R: Into<Value> + 'static> From<Reactive<R>> for Prop<Value> {
    fn from(r: Reactive<R>) -> Self {
        let f = r.0;
        Prop::Func(Rc::new(move || f().into()))
    }
}

impl From<bool> for Prop<bool> {
    fn from(b: bool) -> Self {
        Prop::Static(b)
    }
}

impl From<Stream<bool>> for Prop<bool> {
    fn from(stream: Stream<bool>) -> Self {
        Prop::Stream(Rc::new(stream))
    }
}

impl From<&Stream<bool>> for Prop<bool> {
    fn from(stream: &Stream<bool>) -> Self {
        Prop::Stream(Rc::new(stream.clone()))
    }
}

impl From<Computed<bool>> for Prop<bool> {
    fn from(computed: Computed<bool>) -> Self {
        Prop::Stream(Rc::new(computed))
    }
}

impl From<Reactive<bool>> for Prop<bool> {
    fn from(r: Reactive<bool>) -> Self {
        Prop::Func(r.0)
    }
}
