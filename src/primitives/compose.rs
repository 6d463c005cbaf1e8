// ============================================================================
// spark-dom - Derived Streams
// Computations over streams and map/filter pipelines
// ============================================================================
//
// A Computed is an effect that writes its result into an output stream. The
// output stream sits at the effect's depth in the graph, so anything reading
// both the output and one of the computation's inputs runs after it.
// ============================================================================

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::core::constants::{COMPUTED, EFFECT};
use crate::core::types::AnyReaction;
use crate::error::{Error, Result};
use crate::primitives::effect::{destroy_effect, run_effect, Effect, EffectInner};
use crate::primitives::stream::{Stream, Subscription};
use crate::reactivity::batching::batch;

// =============================================================================
// COMPUTED<T>
// =============================================================================

/// A stream whose value is derived from other streams.
///
/// Dropping the last handle disposes the computation.
///
/// ```
/// use spark_dom::{compute, value_stream};
///
/// let first = value_stream("Ada".to_string());
/// let last = value_stream("Lovelace".to_string());
///
/// let (f, l) = (first.clone(), last.clone());
/// let full = compute(move || format!("{} {}", f.get(), l.get()));
/// assert_eq!(full.get(), "Ada Lovelace");
///
/// first.set("Augusta".into());
/// assert_eq!(full.get(), "Augusta Lovelace");
/// ```
pub struct Computed<T> {
    output: Stream<T>,
    effect: Effect,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            output: self.output.clone(),
            effect: self.effect.clone(),
        }
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Build a computation from a step that may decline to produce a value.
    ///
    /// The first run happens now. If it declines (or panics), `fallback`
    /// supplies the initial value; with no fallback the panic message is
    /// returned as an error.
    fn build(
        mut step: impl FnMut() -> Option<T> + 'static,
        fallback: impl FnOnce() -> Option<T>,
    ) -> Result<Self> {
        let slot: Rc<OnceCell<Stream<T>>> = Rc::new(OnceCell::new());
        let first: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));

        let (slot2, first2) = (slot.clone(), first.clone());
        let inner = EffectInner::new(
            EFFECT | COMPUTED,
            "computed",
            Box::new(move || {
                if let Some(value) = step() {
                    match slot2.get() {
                        Some(output) => output.set(value),
                        None => *first2.borrow_mut() = Some(value),
                    }
                }
            }),
        );

        let outcome = batch(|| run_effect(&inner));

        let initial = first.borrow_mut().take().or_else(fallback);
        let Some(initial) = initial else {
            destroy_effect(&inner);
            return Err(Error::CallbackPanicked {
                context: "computed",
                message: outcome
                    .err()
                    .unwrap_or_else(|| "computation produced no initial value".into()),
            });
        };
        if let Err(message) = outcome {
            crate::error::report(Error::CallbackPanicked {
                context: "computed",
                message,
            });
        }

        let output = Stream::new(initial);
        inner.set_output(output.as_any_source());
        // `slot` was empty a moment ago, so this cannot fail
        let _ = slot.set(output.clone());

        tracing::trace!(dependencies = inner.dep_count(), "computed created");
        Ok(Self {
            output,
            effect: Effect::from_inner(inner),
        })
    }

    /// Get the current value, registering the read with the running
    /// computation.
    pub fn get(&self) -> T {
        self.output.get()
    }

    /// Get the current value without registering a dependency.
    pub fn peek(&self) -> T {
        self.output.peek()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.output.with(f)
    }

    /// Subscribe to every recomputed value.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.output.subscribe(callback)
    }

    /// The output stream. Writing it directly is overwritten by the next run.
    pub fn stream(&self) -> Stream<T> {
        self.output.clone()
    }

    /// Stop recomputing. The last value stays readable.
    pub fn dispose(&self) {
        self.effect.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.effect.is_disposed()
    }

    /// Number of sources read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.effect.dependency_count()
    }
}

impl<T: fmt::Debug + Clone + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("value", &self.peek())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}

/// Derive a stream from whatever `f` reads.
///
/// `f` runs now, and again whenever a stream it read during its previous run
/// is written; each result is written to the output stream, which notifies
/// its own subscribers.
///
/// # Panics
///
/// Panics if the first run of `f` panics, since there is no initial value.
/// Use [`try_compute`] to get an error instead.
pub fn compute<T: Clone + 'static>(f: impl FnMut() -> T + 'static) -> Computed<T> {
    match try_compute(f) {
        Ok(computed) => computed,
        Err(error) => panic!("{error}"),
    }
}

/// Like [`compute`], but a panic during the first run is returned as
/// [`Error::CallbackPanicked`].
pub fn try_compute<T: Clone + 'static>(mut f: impl FnMut() -> T + 'static) -> Result<Computed<T>> {
    Computed::build(move || Some(f()), || None)
}

// =============================================================================
// PIPELINE STAGES
// =============================================================================

/// One transform step of a pipeline.
///
/// `apply` returns `None` to stop a value from reaching the output.
pub trait Stage<In> {
    type Out;

    fn apply(&self, input: In) -> Option<Self::Out>;

    /// Feed this stage's output into `next`.
    fn then<S>(self, next: S) -> Chain<Self, S>
    where
        Self: Sized,
        S: Stage<Self::Out>,
    {
        Chain {
            first: self,
            second: next,
        }
    }
}

/// Stage built by [`map`].
pub struct MapStage<F, In, Out> {
    f: F,
    _marker: PhantomData<fn(In) -> Out>,
}

impl<F, In, Out> Stage<In> for MapStage<F, In, Out>
where
    F: Fn(In) -> Out,
{
    type Out = Out;

    fn apply(&self, input: In) -> Option<Out> {
        Some((self.f)(input))
    }
}

/// Stage built by [`filter`].
pub struct FilterStage<P, T> {
    predicate: P,
    _marker: PhantomData<fn(&T)>,
}

impl<P, T> Stage<T> for FilterStage<P, T>
where
    P: Fn(&T) -> bool,
{
    type Out = T;

    fn apply(&self, input: T) -> Option<T> {
        (self.predicate)(&input).then_some(input)
    }
}

/// Two stages run in sequence.
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<In, A, B> Stage<In> for Chain<A, B>
where
    A: Stage<In>,
    B: Stage<A::Out>,
{
    type Out = B::Out;

    fn apply(&self, input: In) -> Option<B::Out> {
        self.first.apply(input).and_then(|v| self.second.apply(v))
    }
}

/// Transform every value.
pub fn map<In, Out, F: Fn(In) -> Out>(f: F) -> MapStage<F, In, Out> {
    MapStage {
        f,
        _marker: PhantomData,
    }
}

/// Forward only values matching `predicate`.
pub fn filter<T, P: Fn(&T) -> bool>(predicate: P) -> FilterStage<P, T> {
    FilterStage {
        predicate,
        _marker: PhantomData,
    }
}

/// Push every value of `source` through `stage`.
///
/// The initial output is the stage applied to the current source value, or
/// `Default` when the stage rejects it. Later rejected values leave the
/// output unchanged and notify nobody.
///
/// ```
/// use spark_dom::{compose, filter, map, value_stream, Stage};
///
/// let input = value_stream(3);
/// let evens_doubled = compose(
///     &input,
///     filter(|n: &i32| n % 2 == 0).then(map(|n: i32| n * 2)),
/// );
/// assert_eq!(evens_doubled.get(), 0);
///
/// input.set(4);
/// assert_eq!(evens_doubled.get(), 8);
///
/// input.set(5);
/// assert_eq!(evens_doubled.get(), 8);
/// ```
pub fn compose<In, S>(source: &Stream<In>, stage: S) -> Computed<S::Out>
where
    In: Clone + 'static,
    S: Stage<In> + 'static,
    S::Out: Clone + Default + 'static,
{
    let source = source.clone();
    let step = move || {
        let value = source.get();
        stage.apply(value)
    };
    match Computed::build(step, || Some(S::Out::default())) {
        Ok(computed) => computed,
        // The fallback always yields a value
        Err(error) => unreachable!("{error}"),
    }
}

// =============================================================================
// TESTS
// =============================================================================
