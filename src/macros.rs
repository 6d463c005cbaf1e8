// ============================================================================
// spark-dom - Macros
// ============================================================================

/// Clone handles into a move closure.
///
/// Streams, arrays and `Dom` contexts are cheap `Rc` handles; this saves the
/// `let x = x.clone();` lines before every binding closure.
///
/// ```rust
/// use spark_dom::{cloned, compute, value_stream};
///
/// let a = value_stream(1);
/// let b = value_stream(2);
///
/// let sum = compute(cloned!(a, b => move || a.get() + b.get()));
/// a.set(10);
/// assert_eq!(sum.get(), 12);
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Create a computation, cloning the listed handles first.
///
/// ```rust
/// use spark_dom::{compute, value_stream};
/// let first = value_stream("Ada".to_string());
/// let last = value_stream("Lovelace".to_string());
///
/// let full = compute!(first, last => format!("{} {}", first.get(), last.get()));
/// assert_eq!(full.get(), "Ada Lovelace");
/// ```
#[macro_export]
macro_rules! compute {
    ($($deps:ident),+ => $body:expr) => {
        $crate::compute($crate::cloned!($($deps),+ => move || $body))
    };
    ($body:expr) => {
        $crate::compute(move || $body)
    };
}

/// Create an effect, cloning the listed handles first.
///
/// ```rust
/// use spark_dom::{effect, value_stream};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let count = value_stream(0);
/// let seen = Rc::new(Cell::new(0));
///
/// let _e = effect!(count, seen => seen.set(count.get()));
/// count.set(7);
/// assert_eq!(seen.get(), 7);
/// ```
#[macro_export]
macro_rules! effect {
    ($($deps:ident),+ => $body:expr) => {
        $crate::effect($crate::cloned!($($deps),+ => move || { $body; }))
    };
    ($body:expr) => {
        $crate::effect(move || { $body; })
    };
}

/// Build a `Vec<Child<_>>` from anything convertible into a child.
///
/// ```rust
/// use spark_dom::{children, value_stream, Attrs, Dom, MemoryHost};
///
/// let dom = Dom::new(MemoryHost::new());
/// let name = value_stream("world".to_string());
/// let p = dom
///     .h("p", Attrs::new(), children!["hello ", &name, "!"])
///     .unwrap();
/// assert_eq!(dom.host().text_content(*p.node()), "hello world!");
/// ```
#[macro_export]
macro_rules! children {
    () => {
        ::std::vec::Vec::<$crate::Child<_>>::new()
    };
    ($($child:expr),+ $(,)?) => {
        ::std::vec![$($crate::Child::from($child)),+]
    };
}
