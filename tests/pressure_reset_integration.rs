//! Integration tests for the trim-and-respond engine and bot.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use bacnet_supervisor::engines::pressure_reset::FanGate;
use bacnet_supervisor::engines::PressureResetEngine;
use bacnet_supervisor::error::LinkError;
use bacnet_supervisor::runtime::{KillSwitch, Strategy};
use bacnet_supervisor::strategies::PressureResetBot;
use bacnet_supervisor::{ObjectId, Value};

use common::{
    pressure_config, script_vav, RecordingLink, AHU_ADDR, AHU_PRESSURE_OBJECT, VAV1_ADDR,
    VAV2_ADDR,
};

#[tokio::test]
async fn trims_setpoint_when_no_zone_requests_pressure() {
    let link = RecordingLink::new();
    script_vav(&link, VAV1_ADDR, 40.0, 0.9, 1.0);
    script_vav(&link, VAV2_ADDR, 55.0, 0.8, 1.0);
    let mut engine = PressureResetEngine::new(pressure_config(0)).expect("valid config");

    engine.step(&link).await;

    let writes = link.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].address, AHU_ADDR);
    assert_eq!(writes[0].object, AHU_PRESSURE_OBJECT);
    assert_eq!(writes[0].value, Value::Real(1.4));
    assert_eq!(writes[0].priority, 8);
    assert!((engine.current_setpoint() - 1.4).abs() < 1e-9);
}

#[tokio::test]
async fn responds_to_starved_zone_when_nothing_is_ignored() {
    let link = RecordingLink::new();
    // VAV1 is wide open and starved for air; VAV2 is satisfied.
    script_vav(&link, VAV1_ADDR, 100.0, 0.1, 1.0);
    script_vav(&link, VAV2_ADDR, 50.0, 0.9, 1.0);
    let mut engine = PressureResetEngine::new(pressure_config(0)).expect("valid config");

    engine.step(&link).await;

    assert!((engine.current_setpoint() - 1.56).abs() < 1e-9);
    assert_eq!(link.writes().last().map(|w| w.value), Some(Value::Real(1.56)));
}

#[tokio::test]
async fn ignore_count_discards_the_most_open_damper() {
    let link = RecordingLink::new();
    // Same fleet, but the starved 100 % zone is excluded by I = 1, and the
    // remaining 90 % zone is below the damper threshold. Net: trim.
    script_vav(&link, VAV1_ADDR, 100.0, 0.1, 1.0);
    script_vav(&link, VAV2_ADDR, 90.0, 0.9, 1.0);
    let mut engine = PressureResetEngine::new(pressure_config(1)).expect("valid config");

    engine.step(&link).await;

    assert!((engine.current_setpoint() - 1.4).abs() < 1e-9);
}

#[tokio::test]
async fn fan_gate_skips_adjustment_while_fan_is_off() {
    let link = RecordingLink::new();
    script_vav(&link, VAV1_ADDR, 100.0, 0.1, 1.0);
    script_vav(&link, VAV2_ADDR, 100.0, 0.1, 1.0);
    link.set_read(AHU_ADDR, "analog-output,2", Value::Real(0.0));

    let mut config = pressure_config(0);
    config.fan = Some(FanGate {
        address: AHU_ADDR.to_string(),
        speed_object: ObjectId::new("analog-output", 2),
        min_speed: 5.0,
    });
    let mut engine = PressureResetEngine::new(config).expect("valid config");

    engine.step(&link).await;
    assert!(link.writes().is_empty());
    assert!((engine.current_setpoint() - 1.5).abs() < 1e-9);

    // Fan comes up; the starved zones now drive a response.
    link.set_read(AHU_ADDR, "analog-output,2", Value::Real(60.0));
    engine.step(&link).await;
    assert_eq!(link.writes().len(), 1);
    assert!((engine.current_setpoint() - 1.56).abs() < 1e-9);
}

#[tokio::test]
async fn fleet_wide_read_failure_holds_the_setpoint() {
    // Nothing is scripted, so every VAV read answers DeviceNotFound.
    let link = RecordingLink::new();
    let mut engine = PressureResetEngine::new(pressure_config(0)).expect("valid config");

    engine.step(&link).await;

    assert!(link.writes().is_empty());
    assert!((engine.current_setpoint() - 1.5).abs() < 1e-9);
}

#[tokio::test]
async fn single_failed_box_is_dropped_but_the_rest_still_count() {
    let link = RecordingLink::new();
    // VAV1 is unreachable; VAV2 reports a satisfied zone. The surviving
    // sample is enough to run a trim cycle.
    script_vav(&link, VAV2_ADDR, 40.0, 0.9, 1.0);
    let mut engine = PressureResetEngine::new(pressure_config(0)).expect("valid config");

    engine.step(&link).await;

    assert_eq!(link.writes().len(), 1);
    assert!((engine.current_setpoint() - 1.4).abs() < 1e-9);
}

#[tokio::test]
async fn failed_release_is_retried_until_it_succeeds() {
    let link = RecordingLink::new();
    script_vav(&link, VAV1_ADDR, 40.0, 0.9, 1.0);
    script_vav(&link, VAV2_ADDR, 40.0, 0.9, 1.0);
    let mut engine = PressureResetEngine::new(pressure_config(0)).expect("valid config");

    engine.step(&link).await;
    assert_eq!(link.writes().len(), 1);

    link.set_write_error(
        AHU_ADDR,
        AHU_PRESSURE_OBJECT,
        LinkError::Timeout(AHU_ADDR.into()),
    );
    link.clear_writes();
    engine.release(&link).await;
    assert!(link.writes().is_empty());

    // The override is still considered outstanding, so the next release
    // attempt writes the null sentinel once the device recovers.
    let recovered = RecordingLink::new();
    engine.release(&recovered).await;
    let writes = recovered.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].value, Value::Null);
    assert_eq!(writes[0].priority, 8);

    // Released; nothing further to write.
    engine.release(&recovered).await;
    assert_eq!(recovered.writes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn bot_releases_override_when_kill_switch_disables() {
    let link = Arc::new(RecordingLink::new());
    script_vav(&link, VAV1_ADDR, 40.0, 0.9, 1.0);
    script_vav(&link, VAV2_ADDR, 40.0, 0.9, 1.0);
    let kill_switch = KillSwitch::new();
    let mut bot = PressureResetBot::new(
        link.clone(),
        pressure_config(0),
        kill_switch.clone(),
        CancellationToken::new(),
    )
    .expect("valid config")
    .with_interval(Duration::from_secs(1));

    bot.on_step().await.expect("step should succeed");
    assert_eq!(link.writes().len(), 1);
    link.clear_writes();

    kill_switch.command(false);
    bot.on_step().await.expect("step should succeed");

    let writes = link.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].object, AHU_PRESSURE_OBJECT);
    assert_eq!(writes[0].value, Value::Null);

    // Still disabled: no adjustment, and no repeated release either.
    link.clear_writes();
    bot.on_step().await.expect("step should succeed");
    assert!(link.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn bot_stop_releases_the_override() {
    let link = Arc::new(RecordingLink::new());
    script_vav(&link, VAV1_ADDR, 40.0, 0.9, 1.0);
    script_vav(&link, VAV2_ADDR, 40.0, 0.9, 1.0);
    let mut bot = PressureResetBot::new(
        link.clone(),
        pressure_config(0),
        KillSwitch::new(),
        CancellationToken::new(),
    )
    .expect("valid config")
    .with_interval(Duration::from_secs(1));

    bot.on_step().await.expect("step should succeed");
    link.clear_writes();

    bot.on_stop().await.expect("stop should succeed");
    let writes = link.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].value, Value::Null);
}
