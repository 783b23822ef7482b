//! Timer-gated multi-stage load-shed (demand response) engine.
//!
//! Stages form an ordered commitment: stage 1 engages first and releases
//! last. Each control cycle compares the building power meter against a
//! threshold and, once the relevant stage timer has expired, engages the next
//! stage or releases the highest active one. Failing to read the meter holds
//! the current stage; it is never treated as "power is low" or "power is
//! high".

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bacnet::{DeviceLink, ObjectId, PointRef, Value};
use crate::error::ConfigError;

/// One point written when a stage engages and released when it unwinds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShedPoint {
    /// Device network address.
    pub address: String,
    /// Object whose present-value is overridden.
    pub object: ObjectId,
    /// Value commanded when the stage engages.
    pub engage_value: Value,
    /// Value written on release; normally the `"null"` sentinel so the
    /// priority-array override is relinquished rather than overwritten.
    pub release_value: Value,
    /// BACnet write priority (1..=16).
    pub priority: u8,
}

impl ShedPoint {
    /// Reference to the present-value property this point commands.
    pub fn point_ref(&self) -> PointRef {
        PointRef::present_value(&self.address, self.object.clone())
    }
}

/// One increment of demand reduction, engaged and released as a unit.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShedStage {
    /// Operator-facing description, e.g. `"Reset zone setpoints upward"`.
    pub description: String,
    /// Points written in list order when the stage engages or releases.
    pub points: Vec<ShedPoint>,
}

/// Load-shed engine configuration.
///
/// Defaults match the reference demand-response deployment: 60 s cycle,
/// 5-minute stage timers, 120 kW threshold. Load from TOML with
/// [`LoadShedConfig::from_toml_str`] or build in code; construction of
/// [`LoadShedEngine`] validates eagerly and fails fast.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadShedConfig {
    /// Address of the building power meter device.
    pub power_meter_address: String,
    /// Object holding the building power reading.
    pub power_meter_object: ObjectId,
    /// Demand threshold separating shed from release (kW).
    #[serde(default = "default_power_threshold_kw")]
    pub power_threshold_kw: f64,
    /// Pause between control cycles (seconds).
    #[serde(default = "default_sleep_interval_secs")]
    pub sleep_interval_secs: f64,
    /// Minimum dwell before engaging another stage (seconds).
    #[serde(default = "default_stage_timer_secs")]
    pub stage_up_timer_secs: f64,
    /// Minimum dwell before releasing a stage (seconds). Independent of the
    /// up timer, so hysteresis may be asymmetric.
    #[serde(default = "default_stage_timer_secs")]
    pub stage_down_timer_secs: f64,
    /// Ordered stage list; index order is the commitment order.
    pub stages: Vec<ShedStage>,
}

fn default_power_threshold_kw() -> f64 {
    120.0
}

fn default_sleep_interval_secs() -> f64 {
    60.0
}

fn default_stage_timer_secs() -> f64 {
    300.0
}

/// Upper bound on configured intervals: one year in seconds. Keeps every
/// accepted value well inside `Duration::from_secs_f64` range.
const MAX_INTERVAL_SECS: f64 = 31_536_000.0;

impl LoadShedConfig {
    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid, a required key is
    /// missing, or a value has the wrong type.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("load_shed", e.to_string()))
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or parsed.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("load_shed", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.power_meter_address.is_empty() {
            errors.push(ConfigError::new("power_meter_address", "must not be empty"));
        }
        if !self.power_threshold_kw.is_finite() {
            errors.push(ConfigError::new("power_threshold_kw", "must be finite"));
        }
        if !(self.sleep_interval_secs > 0.0) || self.sleep_interval_secs > MAX_INTERVAL_SECS {
            errors.push(ConfigError::new(
                "sleep_interval_secs",
                "must be > 0 and at most one year in seconds",
            ));
        }
        if !(self.stage_up_timer_secs >= 0.0) || self.stage_up_timer_secs > MAX_INTERVAL_SECS {
            errors.push(ConfigError::new(
                "stage_up_timer_secs",
                "must be >= 0 and at most one year in seconds",
            ));
        }
        if !(self.stage_down_timer_secs >= 0.0) || self.stage_down_timer_secs > MAX_INTERVAL_SECS {
            errors.push(ConfigError::new(
                "stage_down_timer_secs",
                "must be >= 0 and at most one year in seconds",
            ));
        }
        if self.stages.is_empty() {
            errors.push(ConfigError::new("stages", "at least one stage is required"));
        }

        for (i, stage) in self.stages.iter().enumerate() {
            if stage.description.is_empty() {
                errors.push(ConfigError::new(
                    format!("stages[{i}].description"),
                    "must not be empty",
                ));
            }
            if stage.points.is_empty() {
                errors.push(ConfigError::new(
                    format!("stages[{i}].points"),
                    "must list at least one point",
                ));
            }
            for (j, point) in stage.points.iter().enumerate() {
                if point.address.is_empty() {
                    errors.push(ConfigError::new(
                        format!("stages[{i}].points[{j}].address"),
                        "must not be empty",
                    ));
                }
                if !(1..=16).contains(&point.priority) {
                    errors.push(ConfigError::new(
                        format!("stages[{i}].points[{j}].priority"),
                        "must be in [1, 16]",
                    ));
                }
            }
        }

        errors
    }

    /// Pause between control cycles.
    pub fn sleep_interval(&self) -> Duration {
        Duration::from_secs_f64(self.sleep_interval_secs)
    }

    /// Minimum dwell before engaging another stage.
    pub fn stage_up_timer(&self) -> Duration {
        Duration::from_secs_f64(self.stage_up_timer_secs)
    }

    /// Minimum dwell before releasing a stage.
    pub fn stage_down_timer(&self) -> Duration {
        Duration::from_secs_f64(self.stage_down_timer_secs)
    }

    /// Reference to the building power meter's present-value.
    pub fn power_meter(&self) -> PointRef {
        PointRef::present_value(&self.power_meter_address, self.power_meter_object.clone())
    }
}

/// Returns `true` when demand is high enough, and the dwell timer has
/// expired, for another stage to engage. `elapsed = None` means no
/// transition has happened yet and the timer gate is open.
pub fn should_initiate_stage(
    building_power_kw: f64,
    threshold_kw: f64,
    elapsed: Option<Duration>,
    stage_up_timer: Duration,
) -> bool {
    building_power_kw > threshold_kw && timer_expired(elapsed, stage_up_timer)
}

/// Returns `true` when demand has fallen back and the dwell timer has
/// expired, so the highest active stage may release.
pub fn should_release_stage(
    building_power_kw: f64,
    threshold_kw: f64,
    elapsed: Option<Duration>,
    stage_down_timer: Duration,
) -> bool {
    building_power_kw <= threshold_kw && timer_expired(elapsed, stage_down_timer)
}

fn timer_expired(elapsed: Option<Duration>, timer: Duration) -> bool {
    elapsed.is_none_or(|e| e >= timer)
}

#[derive(Clone, Copy)]
enum StageAction {
    Engage,
    Release,
}

/// Staged load-shed state machine.
///
/// `current_stage` counts engaged stages and always satisfies
/// `0 <= current_stage <= stages.len()`. Only [`LoadShedEngine::evaluate`]
/// and [`LoadShedEngine::release_all`] mutate it.
pub struct LoadShedEngine {
    config: LoadShedConfig,
    current_stage: usize,
    last_transition: Option<Instant>,
}

impl LoadShedEngine {
    /// Validates the configuration and creates an engine at stage zero.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found; an engine never starts on an
    /// invalid configuration.
    pub fn new(config: LoadShedConfig) -> Result<Self, ConfigError> {
        if let Some(err) = config.validate().into_iter().next() {
            return Err(err);
        }
        Ok(Self {
            config,
            current_stage: 0,
            last_transition: None,
        })
    }

    /// Number of currently engaged stages.
    pub fn current_stage(&self) -> usize {
        self.current_stage
    }

    /// The validated configuration.
    pub fn config(&self) -> &LoadShedConfig {
        &self.config
    }

    /// Runs one control cycle: read the meter, then stage up or down.
    ///
    /// A failed or non-numeric meter read holds the current stage and is
    /// retried next cycle.
    pub async fn step<L: DeviceLink + ?Sized>(&mut self, link: &L, now: Instant) {
        let meter = self.config.power_meter();
        let building_power_kw = match link.read(&meter).await {
            Ok(value) => match value.as_f64() {
                Some(kw) => kw,
                None => {
                    warn!(point = %meter, %value, "power reading is not numeric; holding stages");
                    return;
                }
            },
            Err(err) => {
                warn!(point = %meter, error = %err, "power meter read failed; holding stages");
                return;
            }
        };
        self.evaluate(link, building_power_kw, now).await;
    }

    /// Applies the staging rules to an already-obtained power reading.
    pub async fn evaluate<L: DeviceLink + ?Sized>(
        &mut self,
        link: &L,
        building_power_kw: f64,
        now: Instant,
    ) {
        let threshold = self.config.power_threshold_kw;
        let elapsed = self.last_transition.map(|t| now.duration_since(t));

        if should_initiate_stage(building_power_kw, threshold, elapsed, self.config.stage_up_timer())
        {
            if self.current_stage < self.config.stages.len() {
                let index = self.current_stage;
                info!(
                    stage = index + 1,
                    power_kw = building_power_kw,
                    description = %self.config.stages[index].description,
                    "initiating load-shed stage"
                );
                self.write_stage(link, index, StageAction::Engage).await;
                self.current_stage += 1;
                self.last_transition = Some(now);
            } else {
                warn!(
                    stage = self.current_stage,
                    power_kw = building_power_kw,
                    "already at maximum stage; nothing left to shed"
                );
            }
        } else if self.current_stage > 0
            && should_release_stage(
                building_power_kw,
                threshold,
                elapsed,
                self.config.stage_down_timer(),
            )
        {
            self.current_stage -= 1;
            let index = self.current_stage;
            info!(
                stage = index + 1,
                power_kw = building_power_kw,
                "releasing load-shed stage"
            );
            self.write_stage(link, index, StageAction::Release).await;
            self.last_transition = Some(now);
        } else {
            debug!(
                power_kw = building_power_kw,
                stage = self.current_stage,
                "within hysteresis window; no stage change"
            );
        }
    }

    /// Releases every engaged stage, highest first, and resets to stage zero.
    ///
    /// Invoked when the kill-switch reads disabled and on strategy stop. A
    /// no-op when nothing is engaged, so repeated calls never double-release.
    pub async fn release_all<L: DeviceLink + ?Sized>(&mut self, link: &L, now: Instant) {
        if self.current_stage == 0 {
            return;
        }
        info!(active_stages = self.current_stage, "releasing all load-shed stages");
        for index in (0..self.current_stage).rev() {
            self.write_stage(link, index, StageAction::Release).await;
        }
        self.current_stage = 0;
        self.last_transition = Some(now);
    }

    /// Writes one stage's points in list order. A failed point is logged and
    /// skipped; there is no rollback across devices, so a partial failure
    /// leaves the stage mixed until the next transition.
    async fn write_stage<L: DeviceLink + ?Sized>(
        &self,
        link: &L,
        index: usize,
        action: StageAction,
    ) {
        let Some(stage) = self.config.stages.get(index) else {
            return;
        };
        for point in &stage.points {
            let value = match action {
                StageAction::Engage => point.engage_value,
                StageAction::Release => point.release_value,
            };
            let target = point.point_ref();
            if let Err(err) = link.write(&target, value, point.priority).await {
                warn!(
                    point = %target,
                    %value,
                    error = %err,
                    "stage write failed; point left in previous state"
                );
            }
        }
    }
}
