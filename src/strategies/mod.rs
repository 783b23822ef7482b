//! Ready-made strategies composing an engine with the runtime plumbing.
//!
//! Each bot is a thin composition: a [`DeviceLink`] handle, one engine, the
//! shared kill-switch, and its cycle cadence. All control logic lives in the
//! engines.
//!
//! [`DeviceLink`]: crate::bacnet::DeviceLink

pub mod load_shed_bot;
pub mod pressure_reset_bot;

pub use load_shed_bot::LoadShedBot;
pub use pressure_reset_bot::PressureResetBot;
