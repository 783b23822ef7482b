//! Duct static-pressure reset strategy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bacnet::DeviceLink;
use crate::engines::{PressureResetConfig, PressureResetEngine};
use crate::error::{ConfigError, LifecycleError, StepError};
use crate::runtime::{KillSwitch, Strategy};
use crate::schedule::OccupancyOracle;

/// Drives a [`PressureResetEngine`] on its configured period.
///
/// Honors the startup delay `Td` once before the first cycle. Each cycle
/// checks the kill-switch (disabled releases the AHU override) and, when an
/// occupancy oracle is attached, skips adjustment outside occupied hours.
pub struct PressureResetBot<L> {
    link: Arc<L>,
    engine: PressureResetEngine,
    kill_switch: KillSwitch,
    cancel: CancellationToken,
    oracle: Option<Arc<dyn OccupancyOracle>>,
    interval_override: Option<Duration>,
    max_cycles: Option<u64>,
    cycles: u64,
}

impl<L: DeviceLink> PressureResetBot<L> {
    /// Validates the configuration and builds the bot.
    ///
    /// # Errors
    ///
    /// Returns the engine's fail-fast `ConfigError`.
    pub fn new(
        link: Arc<L>,
        config: PressureResetConfig,
        kill_switch: KillSwitch,
        cancel: CancellationToken,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            link,
            engine: PressureResetEngine::new(config)?,
            kill_switch,
            cancel,
            oracle: None,
            interval_override: None,
            max_cycles: None,
            cycles: 0,
        })
    }

    /// Gates adjustment behind an occupancy schedule.
    pub fn with_schedule(mut self, oracle: Arc<dyn OccupancyOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Overrides the configured adjustment period `T`.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_override = Some(interval);
        self
    }

    /// Stops the loop after `max` cycles. Test escape hatch.
    pub fn with_max_cycles(mut self, max: u64) -> Self {
        self.max_cycles = Some(max);
        self
    }

    /// The underlying engine, for state inspection.
    pub fn engine(&self) -> &PressureResetEngine {
        &self.engine
    }

    fn cycle_interval(&self) -> Duration {
        self.interval_override
            .unwrap_or_else(|| self.engine.config().adjust_period())
    }
}

#[async_trait]
impl<L: DeviceLink> Strategy for PressureResetBot<L> {
    async fn on_start(&mut self) -> Result<(), LifecycleError> {
        let delay = self.engine.config().startup_delay();
        info!(
            setpoint = self.engine.current_setpoint(),
            vav_count = self.engine.config().vav_boxes.len(),
            delay_secs = delay.as_secs_f64(),
            "pressure-reset strategy starting"
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn on_step(&mut self) -> Result<(), StepError> {
        if let Some(max) = self.max_cycles {
            if self.cycles >= max {
                info!(cycles = self.cycles, "cycle limit reached; requesting stop");
                self.cancel.cancel();
                return Ok(());
            }
        }
        self.cycles += 1;

        if !self.kill_switch.is_enabled() {
            debug!("optimization disabled; releasing pressure override");
            self.engine.release(self.link.as_ref()).await;
        } else if self.occupied() {
            self.engine.step(self.link.as_ref()).await;
        } else {
            debug!("building unoccupied; skipping pressure adjustment");
        }

        tokio::time::sleep(self.cycle_interval()).await;
        Ok(())
    }

    async fn on_stop(&mut self) -> Result<(), LifecycleError> {
        self.engine.release(self.link.as_ref()).await;
        info!("pressure-reset strategy stopped");
        Ok(())
    }
}

impl<L> PressureResetBot<L> {
    fn occupied(&self) -> bool {
        match &self.oracle {
            Some(oracle) => oracle.is_occupied(Local::now().naive_local()),
            None => true,
        }
    }
}
