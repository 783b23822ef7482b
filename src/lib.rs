//! Supervisory control-strategy runtime for BACnet building automation.
//!
//! A [`Runner`](runtime::Runner) drives a user-supplied
//! [`Strategy`](runtime::Strategy) through `on_start -> (on_step)* ->
//! on_stop` with cooperative cancellation, while the staged engines
//! ([`engines::load_shed`], [`engines::pressure_reset`]) decide what to read
//! and write through the narrow [`DeviceLink`](bacnet::DeviceLink) seam onto
//! an external BACnet stack. Every strategy consults the shared
//! [`KillSwitch`](runtime::KillSwitch) at the top of each cycle and releases
//! its overrides when commanded off.

pub mod bacnet;
pub mod engines;
pub mod error;
/// Lifecycle runner, strategy trait, and kill-switch.
pub mod runtime;
/// Weekly occupancy oracle.
pub mod schedule;
pub mod strategies;

pub use bacnet::{DeviceLink, ObjectId, PointRef, Value};
pub use error::{ConfigError, LifecycleError, LinkError, StepError};
pub use runtime::{KillSwitch, Runner, Strategy};
