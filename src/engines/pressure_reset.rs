//! Trim-and-respond duct static pressure reset for one AHU.
//!
//! Each cycle polls the VAV fleet, counts "more pressure please" requests
//! from zones whose dampers are nearly wide open and whose airflow
//! undershoots its setpoint, and nudges the AHU duct static pressure
//! setpoint: up proportionally to outstanding requests (bounded by a
//! cumulative cap), down by the trim amount when nobody is asking.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::bacnet::{DeviceLink, ObjectId, PointRef, Value};
use crate::error::ConfigError;

/// One VAV terminal unit polled for damper position and airflow.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VavBox {
    /// Device network address.
    pub address: String,
    /// Damper position object (percent open).
    pub damper_object: ObjectId,
    /// Measured airflow object.
    pub airflow_object: ObjectId,
    /// Airflow setpoint object.
    pub airflow_setpoint_object: ObjectId,
}

/// Optional supply-fan precondition: skip adjustment entirely while the fan
/// is not actually running.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FanGate {
    /// AHU device address.
    pub address: String,
    /// Fan speed object.
    pub speed_object: ObjectId,
    /// Speeds at or below this threshold count as "not running".
    pub min_speed: f64,
}

/// Static-pressure-reset configuration (G36 trim-and-respond parameters).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PressureResetConfig {
    /// AHU device address.
    pub ahu_address: String,
    /// Duct static pressure setpoint object on the AHU.
    pub static_pressure_object: ObjectId,
    /// BACnet write priority (1..=16).
    pub priority: u8,
    /// Initial setpoint, inches WC.
    pub sp0: f64,
    /// Minimum setpoint, inches WC.
    pub sp_min: f64,
    /// Maximum setpoint, inches WC.
    pub sp_max: f64,
    /// Trim applied per cycle with zero requests (normally negative).
    pub sp_trim: f64,
    /// Response increase per cycle with outstanding requests.
    pub sp_res: f64,
    /// Cap on cumulative increase since engine construction.
    pub sp_res_max: f64,
    /// Ignore count `I`: the I most-open dampers are excluded from request
    /// counting so a few aggressive zones cannot dominate.
    pub ignore_top_requests: usize,
    /// Startup delay `Td` honored once before the first cycle (minutes).
    pub startup_delay_mins: f64,
    /// Adjustment period `T` between cycles (minutes).
    pub adjust_period_mins: f64,
    /// Supply-fan running precondition, if configured.
    #[serde(default)]
    pub fan: Option<FanGate>,
    /// VAV fleet feeding this AHU.
    pub vav_boxes: Vec<VavBox>,
}

/// Upper bound on configured delays and periods: one year in minutes. Keeps
/// every accepted value well inside `Duration::from_secs_f64` range.
const MAX_PERIOD_MINS: f64 = 525_600.0;

impl PressureResetConfig {
    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid, a required key is
    /// missing, or a value has the wrong type.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("pressure_reset", e.to_string()))
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or parsed.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new(
                "pressure_reset",
                format!("cannot read \"{}\": {e}", path.display()),
            )
        })?;
        Self::from_toml_str(&content)
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.ahu_address.is_empty() {
            errors.push(ConfigError::new("ahu_address", "must not be empty"));
        }
        if !(1..=16).contains(&self.priority) {
            errors.push(ConfigError::new("priority", "must be in [1, 16]"));
        }
        if self.sp_min > self.sp_max {
            errors.push(ConfigError::new("sp_min", "must be <= sp_max"));
        }
        if !(self.sp_min..=self.sp_max).contains(&self.sp0) {
            errors.push(ConfigError::new("sp0", "must be in [sp_min, sp_max]"));
        }
        if !(self.sp_res > 0.0) {
            errors.push(ConfigError::new("sp_res", "must be > 0"));
        }
        if !(self.sp_res_max >= 0.0) {
            errors.push(ConfigError::new("sp_res_max", "must be >= 0"));
        }
        if !self.sp_trim.is_finite() {
            errors.push(ConfigError::new("sp_trim", "must be finite"));
        }
        if !(self.startup_delay_mins >= 0.0) || self.startup_delay_mins > MAX_PERIOD_MINS {
            errors.push(ConfigError::new(
                "startup_delay_mins",
                "must be >= 0 and at most one year in minutes",
            ));
        }
        if !(self.adjust_period_mins > 0.0) || self.adjust_period_mins > MAX_PERIOD_MINS {
            errors.push(ConfigError::new(
                "adjust_period_mins",
                "must be > 0 and at most one year in minutes",
            ));
        }
        if self.vav_boxes.is_empty() {
            errors.push(ConfigError::new("vav_boxes", "at least one VAV box is required"));
        }
        for (i, vav) in self.vav_boxes.iter().enumerate() {
            if vav.address.is_empty() {
                errors.push(ConfigError::new(
                    format!("vav_boxes[{i}].address"),
                    "must not be empty",
                ));
            }
        }
        if let Some(fan) = &self.fan {
            if fan.address.is_empty() {
                errors.push(ConfigError::new("fan.address", "must not be empty"));
            }
            if !(fan.min_speed >= 0.0) {
                errors.push(ConfigError::new("fan.min_speed", "must be >= 0"));
            }
        }

        errors
    }

    /// Startup delay before the first cycle.
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs_f64(self.startup_delay_mins * 60.0)
    }

    /// Period between adjustment cycles.
    pub fn adjust_period(&self) -> Duration {
        Duration::from_secs_f64(self.adjust_period_mins * 60.0)
    }

    /// Reference to the AHU duct static pressure setpoint.
    pub fn static_pressure_point(&self) -> PointRef {
        PointRef::present_value(&self.ahu_address, self.static_pressure_object.clone())
    }
}

/// Fresh per-cycle reading from one VAV box. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VavSample {
    /// Damper position, percent open.
    pub damper_position_pct: f64,
    /// Measured airflow.
    pub airflow: f64,
    /// Airflow setpoint.
    pub airflow_setpoint: f64,
}

/// Reset requests generated by one zone: 0 unless the damper is nearly wide
/// open (> 95 %) with a positive airflow setpoint, otherwise 1 to 3 depending
/// on how far measured airflow undershoots its setpoint.
pub fn reset_requests(sample: &VavSample) -> u32 {
    if sample.airflow_setpoint <= 0.0 || sample.damper_position_pct <= 95.0 {
        return 0;
    }
    if sample.airflow < 0.5 * sample.airflow_setpoint {
        3
    } else if sample.airflow < 0.7 * sample.airflow_setpoint {
        2
    } else {
        1
    }
}

/// Sorts samples descending by damper position, drops the `ignore_top`
/// most-open zones, and sums the remaining zones' reset requests.
pub fn total_reset_requests(samples: &mut [VavSample], ignore_top: usize) -> u32 {
    samples.sort_by(|a, b| {
        b.damper_position_pct
            .partial_cmp(&a.damper_position_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    samples.iter().skip(ignore_top).map(reset_requests).sum()
}

/// Trim-and-respond state machine for one AHU.
///
/// Invariants: the setpoint stays within `[sp_min, sp_max]` and the
/// cumulative increase within `[0, sp_res_max]` for every input sequence.
/// The cumulative increase never decays; it resets only when a new engine is
/// constructed (process restart).
pub struct PressureResetEngine {
    config: PressureResetConfig,
    current_setpoint: f64,
    total_increase: f64,
    engaged: bool,
}

impl PressureResetEngine {
    /// Validates the configuration and creates an engine at `sp0`.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found; an engine never starts on an
    /// invalid configuration.
    pub fn new(config: PressureResetConfig) -> Result<Self, ConfigError> {
        if let Some(err) = config.validate().into_iter().next() {
            return Err(err);
        }
        Ok(Self {
            current_setpoint: config.sp0,
            total_increase: 0.0,
            engaged: false,
            config,
        })
    }

    /// The commanded setpoint, inches WC.
    pub fn current_setpoint(&self) -> f64 {
        self.current_setpoint
    }

    /// Cumulative increase applied since construction.
    pub fn total_increase(&self) -> f64 {
        self.total_increase
    }

    /// The validated configuration.
    pub fn config(&self) -> &PressureResetConfig {
        &self.config
    }

    /// Runs one control cycle: fan gate, VAV poll, trim-and-respond, write.
    ///
    /// Any unavailable reading drops that sample for the cycle; if no sample
    /// survives, the setpoint holds (a fleet-wide comms failure must never
    /// read as "nobody is requesting pressure").
    pub async fn step<L: DeviceLink + ?Sized>(&mut self, link: &L) {
        if !self.fan_running(link).await {
            return;
        }

        let mut samples = self.read_vav_samples(link).await;
        if samples.is_empty() {
            warn!("no VAV samples available this cycle; holding setpoint");
            return;
        }

        let requests = total_reset_requests(&mut samples, self.config.ignore_top_requests);
        let setpoint = self.apply_requests(requests);
        self.write_setpoint(link, setpoint).await;
    }

    /// Applies the trim-and-respond rules for one cycle and returns the new
    /// setpoint. Pure state-machine step; no device I/O.
    pub fn apply_requests(&mut self, total_requests: u32) -> f64 {
        let cfg = &self.config;
        if total_requests > 0 {
            if self.total_increase < cfg.sp_res_max {
                let increase = cfg.sp_res.min(cfg.sp_res_max - self.total_increase);
                let previous = self.current_setpoint;
                self.current_setpoint = (previous + increase).min(cfg.sp_max);
                // Account only the delta actually applied, so the cumulative
                // cap keeps honest headroom when sp_max binds first.
                self.total_increase += self.current_setpoint - previous;
                info!(
                    requests = total_requests,
                    setpoint = self.current_setpoint,
                    "responding to reset requests"
                );
            } else {
                info!(
                    cap = cfg.sp_res_max,
                    "maximum cumulative increase reached; holding setpoint"
                );
            }
        } else {
            self.current_setpoint =
                (self.current_setpoint + cfg.sp_trim).clamp(cfg.sp_min, cfg.sp_max);
            debug!(setpoint = self.current_setpoint, "no requests; trimming setpoint");
        }
        self.current_setpoint
    }

    /// Releases the AHU setpoint override if one is outstanding.
    ///
    /// Writes the `"null"` sentinel at the configured priority. The engaged
    /// flag clears only on a successful write, so a failed release retries
    /// next cycle instead of silently abandoning the override.
    pub async fn release<L: DeviceLink + ?Sized>(&mut self, link: &L) {
        if !self.engaged {
            return;
        }
        let point = self.config.static_pressure_point();
        info!(point = %point, "releasing duct static pressure override");
        match link.write(&point, Value::Null, self.config.priority).await {
            Ok(()) => self.engaged = false,
            Err(err) => warn!(point = %point, error = %err, "release write failed; will retry"),
        }
    }

    async fn fan_running<L: DeviceLink + ?Sized>(&self, link: &L) -> bool {
        let Some(fan) = &self.config.fan else {
            return true;
        };
        let point = PointRef::present_value(&fan.address, fan.speed_object.clone());
        match link.read(&point).await {
            Ok(value) => match value.as_f64() {
                Some(speed) if speed > fan.min_speed => true,
                Some(speed) => {
                    debug!(speed, "supply fan not running; skipping adjustment");
                    false
                }
                None => {
                    warn!(point = %point, %value, "fan speed reading is not numeric; skipping adjustment");
                    false
                }
            },
            Err(err) => {
                warn!(point = %point, error = %err, "fan speed read failed; skipping adjustment");
                false
            }
        }
    }

    async fn read_vav_samples<L: DeviceLink + ?Sized>(&self, link: &L) -> Vec<VavSample> {
        let mut samples = Vec::with_capacity(self.config.vav_boxes.len());
        for vav in &self.config.vav_boxes {
            let points = [
                PointRef::present_value(&vav.address, vav.damper_object.clone()),
                PointRef::present_value(&vav.address, vav.airflow_object.clone()),
                PointRef::present_value(&vav.address, vav.airflow_setpoint_object.clone()),
            ];
            let mut values = Vec::with_capacity(points.len());
            for (point, result) in link.read_multiple(&points).await {
                match result {
                    Ok(value) => match value.as_f64() {
                        Some(v) => values.push(v),
                        None => {
                            warn!(point = %point, %value, "non-numeric VAV reading; dropping sample this cycle");
                        }
                    },
                    Err(err) => {
                        warn!(point = %point, error = %err, "VAV read failed; dropping sample this cycle");
                    }
                }
            }
            if let [damper, airflow, setpoint] = values[..] {
                samples.push(VavSample {
                    damper_position_pct: damper,
                    airflow,
                    airflow_setpoint: setpoint,
                });
            }
        }
        samples
    }

    async fn write_setpoint<L: DeviceLink + ?Sized>(&mut self, link: &L, setpoint: f64) {
        let point = self.config.static_pressure_point();
        match link
            .write(&point, Value::Real(setpoint), self.config.priority)
            .await
        {
            Ok(()) => {
                self.engaged = true;
                debug!(point = %point, setpoint, "duct static pressure setpoint written");
            }
            Err(err) => {
                warn!(point = %point, setpoint, error = %err, "setpoint write failed; retrying next cycle");
            }
        }
    }
}
