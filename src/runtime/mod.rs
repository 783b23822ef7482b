//! Strategy lifecycle: the runner, the strategy trait, and the kill-switch.

pub mod killswitch;
pub mod runner;
pub mod strategy;

pub use killswitch::KillSwitch;
pub use runner::{Heartbeat, Runner};
pub use strategy::Strategy;
