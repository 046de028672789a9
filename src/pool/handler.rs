//! # Unit-side computation contract.
//!
//! A [`TaskHandler`] computes one result per task. Each unit owns its own handler
//! instance (created by the pool's factory), so `&mut self` state such as memo tables
//! is unit-local and never shared across units.

use std::marker::PhantomData;

/// Computation run by a Task Unit.
///
/// Return `Err(reason)` for an ordinary failure of this one task. A panic is treated as a
/// fatal fault of the unit itself.
pub trait TaskHandler: Send + 'static {
    /// Task payload.
    type Task: Send + 'static;
    /// Success value.
    type Output: Send + 'static;

    /// Computes the result for one task.
    fn handle(&mut self, task: Self::Task) -> Result<Self::Output, String>;
}

/// Closure-backed handler.
///
/// ## Example
/// ```rust
/// use clustervisor::{HandlerFn, TaskHandler};
///
/// let mut double = HandlerFn::new(|n: u64| Ok::<_, String>(n * 2));
/// assert_eq!(double.handle(21), Ok(42));
/// ```
pub struct HandlerFn<F, T, O> {
    f: F,
    _marker: PhantomData<fn(T) -> O>,
}

impl<F, T, O> HandlerFn<F, T, O> {
    /// Wraps a closure.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F, T, O> TaskHandler for HandlerFn<F, T, O>
where
    F: FnMut(T) -> Result<O, String> + Send + 'static,
    T: Send + 'static,
    O: Send + 'static,
{
    type Task = T;
    type Output = O;

    fn handle(&mut self, task: T) -> Result<O, String> {
        (self.f)(task)
    }
}
