//! The lifecycle runner: start, step loop, heartbeat, and guaranteed stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::LifecycleError;

use super::strategy::Strategy;

/// Keep-alive counter incremented once per second while the runner is alive.
///
/// Clones share the same counter; hosts can poll [`Heartbeat::ticks`] as a
/// process-liveness signal.
#[derive(Debug, Clone, Default)]
pub struct Heartbeat {
    ticks: Arc<AtomicU64>,
}

impl Heartbeat {
    /// Number of heartbeat ticks since the runner started.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn beat(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

/// Drives a [`Strategy`] through its `on_start -> (on_step)* -> on_stop`
/// lifecycle with cooperative cancellation.
///
/// Guarantees:
/// - `on_start` runs once before the first step.
/// - `on_step` errors are logged and the loop continues.
/// - `on_stop` runs exactly once, even when cancellation arrives while a step
///   is suspended on I/O, and completes before [`Runner::run`] returns.
/// - A background heartbeat task runs on a fixed 1-second cadence,
///   independent of step timing, for as long as the loop is alive.
pub struct Runner<S: Strategy> {
    strategy: S,
    cancel: CancellationToken,
    heartbeat: Heartbeat,
    stopped: bool,
}

impl<S: Strategy> Runner<S> {
    /// Creates a runner with a fresh cancellation token.
    pub fn new(strategy: S) -> Self {
        Self::with_cancel(strategy, CancellationToken::new())
    }

    /// Creates a runner sharing an externally-owned cancellation token.
    pub fn with_cancel(strategy: S, cancel: CancellationToken) -> Self {
        Self {
            strategy,
            cancel,
            heartbeat: Heartbeat::default(),
            stopped: false,
        }
    }

    /// Handle that cancels this runner when triggered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Handle onto the keep-alive counter.
    pub fn heartbeat(&self) -> Heartbeat {
        self.heartbeat.clone()
    }

    /// Runs the full lifecycle until the cancellation token fires.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`LifecycleError`] from `on_start` or
    /// `on_stop`. A failed start still attempts `on_stop` before
    /// propagating, and the start error wins if both fail.
    pub async fn run(&mut self) -> Result<(), LifecycleError> {
        let heartbeat_task = spawn_heartbeat(self.heartbeat.clone(), self.cancel.clone());

        if let Err(start_err) = self.strategy.on_start().await {
            error!(error = %start_err, "strategy start failed; attempting cleanup");
            if let Err(stop_err) = self.stop().await {
                error!(error = %stop_err, "cleanup after failed start also failed");
            }
            self.cancel.cancel();
            heartbeat_task.abort();
            return Err(start_err);
        }
        info!("strategy started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("cancellation observed; leaving step loop");
                    break;
                }
                step = self.strategy.on_step() => {
                    if let Err(err) = step {
                        warn!(error = %err, "step failed; continuing next cycle");
                    }
                }
            }
        }

        heartbeat_task.abort();
        let result = self.stop().await;
        match &result {
            Ok(()) => info!("strategy stopped"),
            Err(err) => error!(error = %err, "strategy stop failed"),
        }
        result
    }

    /// Runs the lifecycle, cancelling on Ctrl-C.
    ///
    /// # Errors
    ///
    /// Same contract as [`Runner::run`].
    pub async fn run_until_shutdown(&mut self) -> Result<(), LifecycleError> {
        let cancel = self.cancel.clone();
        let signal_task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                cancel.cancel();
            }
        });
        let result = self.run().await;
        // The listener must not outlive the lifecycle it guards.
        signal_task.abort();
        result
    }

    /// Invokes the strategy's `on_stop` once; later calls are no-ops.
    ///
    /// Public so hosts that deliver duplicate termination signals can call it
    /// defensively without double-releasing overrides.
    ///
    /// # Errors
    ///
    /// Propagates the strategy's fatal stop error.
    pub async fn stop(&mut self) -> Result<(), LifecycleError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.strategy.on_stop().await
    }

    /// Consumes the runner, returning the strategy.
    pub fn into_strategy(self) -> S {
        self.strategy
    }
}

fn spawn_heartbeat(heartbeat: Heartbeat, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        // The immediate first tick is not a heartbeat.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => heartbeat.beat(),
            }
        }
    })
}
