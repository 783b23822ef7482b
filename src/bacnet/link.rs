//! The narrow read/write interface onto the underlying BACnet stack.

use async_trait::async_trait;

use crate::error::LinkError;

use super::types::{PointRef, Value};

/// Narrow abstraction over the external BACnet stack.
///
/// The supervisor only ever talks to devices through this seam; wire-level
/// encoding, segmentation, and discovery live on the other side of it. Each
/// call owns its own timeout policy — "no answer within the deadline" comes
/// back as [`LinkError::Timeout`], never as an indefinite block.
///
/// Writing [`Value::Null`] at a priority is a *release* of that priority
/// level's override, per BACnet priority-array semantics.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Reads one property.
    async fn read(&self, point: &PointRef) -> Result<Value, LinkError>;

    /// Writes one property at the given priority (1..=16).
    async fn write(&self, point: &PointRef, value: Value, priority: u8) -> Result<(), LinkError>;

    /// Reads several properties from one device.
    ///
    /// The default implementation issues sequential reads; links backed by a
    /// stack with read-property-multiple support should override it.
    async fn read_multiple(
        &self,
        points: &[PointRef],
    ) -> Vec<(PointRef, Result<Value, LinkError>)> {
        let mut results = Vec::with_capacity(points.len());
        for point in points {
            let value = self.read(point).await;
            results.push((point.clone(), value));
        }
        results
    }
}
