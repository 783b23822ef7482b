//! The shared "optimization enabled" boolean.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Externally-commandable kill-switch consulted by every strategy.
///
/// Defaults to enabled. The host process exposes the backing point for
/// external override (a BACnet client writing the commandable binary value);
/// strategies only ever read it. When it reads `false`, every active engine
/// must release all outstanding writes it owns within one step cycle and must
/// not re-engage until it reads `true` again.
///
/// Clones share the same underlying flag.
#[derive(Debug, Clone)]
pub struct KillSwitch {
    enabled: Arc<AtomicBool>,
}

impl KillSwitch {
    /// Creates a kill-switch in the enabled state.
    pub fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Returns whether optimization is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Commands the switch. Reserved for the external commanding path; step
    /// code must never call this.
    pub fn command(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}
