//! Staged load-shed strategy.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bacnet::DeviceLink;
use crate::engines::{LoadShedConfig, LoadShedEngine};
use crate::error::{ConfigError, LifecycleError, StepError};
use crate::runtime::{KillSwitch, Strategy};

/// Drives a [`LoadShedEngine`] on its configured cadence.
///
/// Each cycle checks the kill-switch first: disabled means every engaged
/// stage is released and control stays suspended until the switch reads
/// enabled again. On stop, all stages are released.
pub struct LoadShedBot<L> {
    link: Arc<L>,
    engine: LoadShedEngine,
    kill_switch: KillSwitch,
    cancel: CancellationToken,
    max_cycles: Option<u64>,
    cycles: u64,
}

impl<L: DeviceLink> LoadShedBot<L> {
    /// Validates the configuration and builds the bot.
    ///
    /// The cancellation token is shared with the runner so the bot can stop
    /// the loop when a cycle limit is configured.
    ///
    /// # Errors
    ///
    /// Returns the engine's fail-fast `ConfigError`.
    pub fn new(
        link: Arc<L>,
        config: LoadShedConfig,
        kill_switch: KillSwitch,
        cancel: CancellationToken,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            link,
            engine: LoadShedEngine::new(config)?,
            kill_switch,
            cancel,
            max_cycles: None,
            cycles: 0,
        })
    }

    /// Stops the loop after `max` cycles. Test escape hatch.
    pub fn with_max_cycles(mut self, max: u64) -> Self {
        self.max_cycles = Some(max);
        self
    }

    /// The underlying engine, for state inspection.
    pub fn engine(&self) -> &LoadShedEngine {
        &self.engine
    }
}

#[async_trait]
impl<L: DeviceLink> Strategy for LoadShedBot<L> {
    async fn on_start(&mut self) -> Result<(), LifecycleError> {
        info!(
            stages = self.engine.config().stages.len(),
            threshold_kw = self.engine.config().power_threshold_kw,
            "load-shed strategy starting"
        );
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

        let now = Instant::now();
        if self.kill_switch.is_enabled() {
            self.engine.step(self.link.as_ref(), now).await;
        } else {
            debug!("optimization disabled; releasing all stages");
            self.engine.release_all(self.link.as_ref(), now).await;
        }

        tokio::time::sleep(self.engine.config().sleep_interval()).await;
        Ok(())
    }

    async fn on_stop(&mut self) -> Result<(), LifecycleError> {
        self.engine
            .release_all(self.link.as_ref(), Instant::now())
            .await;
        info!("load-shed strategy stopped");
        Ok(())
    }
}
