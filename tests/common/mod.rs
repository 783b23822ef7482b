//! Shared test fixtures: a recording device link and engine configurations.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use bacnet_supervisor::bacnet::{DeviceLink, PointRef, Value};
use bacnet_supervisor::engines::{LoadShedConfig, PressureResetConfig};
use bacnet_supervisor::error::LinkError;

/// One write observed by the [`RecordingLink`].
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub address: String,
    pub object: String,
    pub value: Value,
    pub priority: u8,
}

/// In-memory `DeviceLink` double: reads come from a scripted table, writes
/// are recorded in order. Unscripted points answer `DeviceNotFound`.
#[derive(Default)]
pub struct RecordingLink {
    reads: Mutex<HashMap<String, Result<Value, LinkError>>>,
    write_errors: Mutex<HashMap<String, LinkError>>,
    writes: Mutex<Vec<WriteRecord>>,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(address: &str, object: &str) -> String {
        format!("{address}/{object}")
    }

    /// Scripts a constant read value for one point.
    pub fn set_read(&self, address: &str, object: &str, value: Value) {
        self.reads
            .lock()
            .expect("reads lock poisoned")
            .insert(Self::key(address, object), Ok(value));
    }

    /// Scripts a read failure for one point.
    pub fn set_read_error(&self, address: &str, object: &str, error: LinkError) {
        self.reads
            .lock()
            .expect("reads lock poisoned")
            .insert(Self::key(address, object), Err(error));
    }

    /// Scripts a write failure for one point.
    pub fn set_write_error(&self, address: &str, object: &str, error: LinkError) {
        self.write_errors
            .lock()
            .expect("write errors lock poisoned")
            .insert(Self::key(address, object), error);
    }

    /// Everything written so far, in order.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().expect("writes lock poisoned").clone()
    }

    /// Drops the recorded writes, keeping the read script.
    pub fn clear_writes(&self) {
        self.writes.lock().expect("writes lock poisoned").clear();
    }
}

#[async_trait]
impl DeviceLink for RecordingLink {
    async fn read(&self, point: &PointRef) -> Result<Value, LinkError> {
        self.reads
            .lock()
            .expect("reads lock poisoned")
            .get(&Self::key(&point.address, &point.object.to_string()))
            .cloned()
            .unwrap_or_else(|| Err(LinkError::DeviceNotFound(point.address.clone())))
    }

    async fn write(&self, point: &PointRef, value: Value, priority: u8) -> Result<(), LinkError> {
        let key = Self::key(&point.address, &point.object.to_string());
        if let Some(err) = self
            .write_errors
            .lock()
            .expect("write errors lock poisoned")
            .get(&key)
        {
            return Err(err.clone());
        }
        self.writes
            .lock()
            .expect("writes lock poisoned")
            .push(WriteRecord {
                address: point.address.clone(),
                object: point.object.to_string(),
                value,
                priority,
            });
        Ok(())
    }
}

pub const METER_ADDR: &str = "10.200.200.233";
pub const METER_OBJECT: &str = "analog-input,7";

/// Single-stage load-shed config: threshold 120 kW, no stage timers, one
/// zone-setpoint point written at priority 10.
pub fn single_stage_config() -> LoadShedConfig {
    LoadShedConfig::from_toml_str(
        r#"
power_meter_address = "10.200.200.233"
power_meter_object = "analog-input,7"
power_threshold_kw = 120.0
sleep_interval_secs = 60.0
stage_up_timer_secs = 0.0
stage_down_timer_secs = 0.0

[[stages]]
description = "Reset zone setpoints upward"

[[stages.points]]
address = "10.200.200.233"
object = "analog-value,2"
engage_value = 78.0
release_value = "null"
priority = 10
"#,
    )
    .expect("fixture config should be valid")
}

/// Two-stage config (zone setpoints, then lighting) with explicit timers.
pub fn two_stage_config(up_timer_secs: f64, down_timer_secs: f64) -> LoadShedConfig {
    let mut config = LoadShedConfig::from_toml_str(
        r#"
power_meter_address = "10.200.200.233"
power_meter_object = "analog-input,7"
power_threshold_kw = 120.0
sleep_interval_secs = 60.0

[[stages]]
description = "Reset zone setpoints upward"

[[stages.points]]
address = "10.200.200.233"
object = "analog-value,2"
engage_value = 78.0
release_value = "null"
priority = 10

[[stages]]
description = "Turn off non-essential lighting"

[[stages.points]]
address = "10.200.200.233"
object = "analog-value,3"
engage_value = 50.0
release_value = "null"
priority = 10
"#,
    )
    .expect("fixture config should be valid");
    config.stage_up_timer_secs = up_timer_secs;
    config.stage_down_timer_secs = down_timer_secs;
    config
}

pub const AHU_ADDR: &str = "10.200.200.233";
pub const AHU_PRESSURE_OBJECT: &str = "analog-output,1";
pub const VAV1_ADDR: &str = "10.200.200.101";
pub const VAV2_ADDR: &str = "10.200.200.102";

/// Two-box trim-and-respond config: SP0 1.5 in [0.5, 2.0], trim -0.1,
/// respond 0.06 capped at 0.13, priority 8.
pub fn pressure_config(ignore_top_requests: usize) -> PressureResetConfig {
    let toml = format!(
        r#"
ahu_address = "10.200.200.233"
static_pressure_object = "analog-output,1"
priority = 8
sp0 = 1.5
sp_min = 0.5
sp_max = 2.0
sp_trim = -0.1
sp_res = 0.06
sp_res_max = 0.13
ignore_top_requests = {ignore_top_requests}
startup_delay_mins = 0.0
adjust_period_mins = 1.0

[[vav_boxes]]
address = "10.200.200.101"
damper_object = "analog-input,1"
airflow_object = "analog-input,2"
airflow_setpoint_object = "analog-input,3"

[[vav_boxes]]
address = "10.200.200.102"
damper_object = "analog-input,1"
airflow_object = "analog-input,2"
airflow_setpoint_object = "analog-input,3"
"#
    );
    PressureResetConfig::from_toml_str(&toml).expect("fixture config should be valid")
}

/// Scripts one VAV box's damper position, airflow, and airflow setpoint.
pub fn script_vav(link: &RecordingLink, address: &str, damper: f64, airflow: f64, setpoint: f64) {
    link.set_read(address, "analog-input,1", Value::Real(damper));
    link.set_read(address, "analog-input,2", Value::Real(airflow));
    link.set_read(address, "analog-input,3", Value::Real(setpoint));
}
