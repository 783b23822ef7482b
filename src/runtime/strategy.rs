//! The user-facing strategy trait.

use async_trait::async_trait;

use crate::error::{LifecycleError, StepError};

/// A user-supplied control strategy driven by the [`Runner`].
///
/// The runner invokes `on_start` once, then `on_step` repeatedly until
/// cancellation, then `on_stop` exactly once. Every method may suspend on
/// device I/O or timed sleeps; a step typically ends by sleeping for its own
/// chosen cycle interval.
///
/// Failure contract: an error from `on_step` is logged and the loop
/// continues (a single cycle's device trouble must not kill the process).
/// Errors from `on_start` or `on_stop` are fatal and propagate.
///
/// [`Runner`]: crate::runtime::Runner
#[async_trait]
pub trait Strategy: Send {
    /// One-time setup before the step loop.
    async fn on_start(&mut self) -> Result<(), LifecycleError>;

    /// One control cycle: read, decide, write, sleep.
    async fn on_step(&mut self) -> Result<(), StepError>;

    /// Cleanup after cancellation. Implementations should release every
    /// override they own; the runner masks duplicate invocations, but a
    /// strategy must still tolerate being asked to stop after a failed start.
    async fn on_stop(&mut self) -> Result<(), LifecycleError>;
}
