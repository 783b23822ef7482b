//! The staged-control engines: load shed and duct static-pressure reset.

pub mod load_shed;
pub mod pressure_reset;

pub use load_shed::{LoadShedConfig, LoadShedEngine, ShedPoint, ShedStage};
pub use pressure_reset::{PressureResetConfig, PressureResetEngine, VavBox, VavSample};
