// ============================================================================
// spark-dom - Stream Primitive
// The writable observable value cell
// ============================================================================

use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::context::with_context;
use crate::core::types::{AnySource, SourceInner};
use crate::error::{report, Error, Result};
use crate::reactivity::tracking::{notify_write, track_read};

// =============================================================================
// SUBSCRIPTION - Release capability for a callback registration
// =============================================================================

/// Handle to a registered callback.
///
/// Dropping it unsubscribes. Call [`Subscription::leak`] to keep the callback
/// alive for as long as its source lives.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe now.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    /// Keep the callback registered for the lifetime of its source.
    pub fn leak(mut self) {
        self.cancel = None;
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// =============================================================================
// STREAM<T> - The public stream handle
// =============================================================================

/// An observable value cell.
///
/// Reading never has side effects beyond registering the read with the
/// running computation. Writing replaces the value and synchronously calls
/// every subscriber, in subscription order, with the new value. There is no
/// equality check: writing an equal value notifies again.
///
/// # Example
///
/// ```
/// use spark_dom::value_stream;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let name = value_stream(String::from("x"));
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let seen2 = seen.clone();
/// let _sub = name.subscribe(move |v| seen2.borrow_mut().push(v.clone()));
///
/// name.set("y".into());
/// assert_eq!(name.get(), "y");
/// assert_eq!(*seen.borrow(), vec!["y".to_string()]);
/// ```
pub struct Stream<T> {
    inner: Rc<SourceInner<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Stream<T> {
    /// Create a stream holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(SourceInner::new(value)),
        }
    }

    /// Access the current value with a closure (avoids cloning).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        track_read(self.inner.clone() as Rc<dyn AnySource>);
        self.inner.with(f)
    }

    /// Access the current value without registering a dependency.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }

    /// Register a callback invoked with every written value.
    ///
    /// The callback does not see writes made before it was registered.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let id = self.inner.add_subscriber(Rc::new(callback));
        let weak: Weak<SourceInner<T>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove_subscriber(id);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    /// Number of writes so far.
    pub fn write_count(&self) -> u64 {
        self.inner.writes()
    }

    /// Whether two handles refer to the same stream.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Address of the shared cell, stable for the stream's lifetime.
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    /// The stream as a type-erased graph source.
    pub fn as_any_source(&self) -> Rc<dyn AnySource> {
        self.inner.clone()
    }

    pub(crate) fn set_depth(&self, depth: u32) {
        self.inner.set_depth(depth);
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// Get the current value, registering the read with the running
    /// computation.
    pub fn get(&self) -> T {
        track_read(self.inner.clone() as Rc<dyn AnySource>);
        self.inner.get()
    }

    /// Get the current value without registering a dependency.
    pub fn peek(&self) -> T {
        self.inner.get()
    }

    /// Replace the value and notify.
    ///
    /// Subscriber panics are isolated: the remaining subscribers still run,
    /// and the failures go to the error channel (see [`crate::take_errors`]).
    pub fn set(&self, value: T) {
        self.inner.replace(value);
        let failures = self.publish();
        if !failures.is_empty() {
            report(Error::SubscriberPanicked { failures });
        }
    }

    /// Like [`Stream::set`], but returns subscriber failures to the caller
    /// instead of the error channel.
    ///
    /// Inside a batch, notification is deferred and this always succeeds.
    pub fn try_set(&self, value: T) -> Result<()> {
        self.inner.replace(value);
        let failures = self.publish();
        if failures.is_empty() {
            Ok(())
        } else {
            tracing::debug!(count = failures.len(), "subscribers panicked");
            Err(Error::SubscriberPanicked { failures })
        }
    }

    /// Mutate the value in place and notify.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.inner.update(f);
        let failures = self.publish();
        if !failures.is_empty() {
            report(Error::SubscriberPanicked { failures });
        }
    }

    /// Notify subscribers (now, or at batch close) and dependents.
    fn publish(&self) -> Vec<String> {
        let batching = with_context(|ctx| ctx.is_batching());
        let failures = if batching {
            if self.inner.mark_queued() {
                let pending = self.inner.clone();
                with_context(|ctx| ctx.add_pending_notification(pending));
            }
            Vec::new()
        } else {
            self.inner.notify_subscribers()
        };

        notify_write(self.inner.clone() as Rc<dyn AnySource>);
        failures
    }
}

impl<T: Default + 'static> Default for Stream<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner
            .with(|v| f.debug_struct("Stream").field("value", v).finish())
    }
}

// =============================================================================
// FACTORY
// =============================================================================

/// Create a stream. A stream always has a value.
///
/// ```
/// use spark_dom::value_stream;
///
/// let count = value_stream(0);
/// count.set(42);
/// assert_eq!(count.get(), 42);
/// ```
pub fn value_stream<T: 'static>(initial: T) -> Stream<T> {
    Stream::new(initial)
}

// =============================================================================
// TESTS
// =============================================================================
