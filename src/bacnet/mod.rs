//! Point addressing, property values, and the device-link seam.

pub mod link;
pub mod types;

pub use link::DeviceLink;
pub use types::{ObjectId, PointRef, Value};
