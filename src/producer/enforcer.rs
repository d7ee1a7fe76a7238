use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::producer::listener::CycleStatus;
use crate::types::Version;

/// Arbitrates which producer process may publish.
///
/// A cycle checks [`is_primary`](Self::is_primary) before minting a version;
/// leadership changes take effect between cycles, never during one.
pub trait SingleProducerEnforcer: Send + Sync {
    fn enable(&self);
    fn disable(&self);
    fn is_primary(&self) -> bool;
    fn on_cycle_start(&self, _version: Version) {}
    fn on_cycle_complete(&self, _status: &CycleStatus, _elapsed: Duration) {}
}

/// In-process enforcer toggled by hand. Starts enabled.
#[derive(Debug)]
pub struct BasicSingleProducerEnforcer {
    state: Mutex<EnforcerState>,
}

#[derive(Debug)]
struct EnforcerState {
    enabled: bool,
    in_cycle: bool,
    pending_disable: bool,
}

impl BasicSingleProducerEnforcer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EnforcerState {
                enabled: true,
                in_cycle: false,
                pending_disable: false,
            }),
        }
    }
}

impl Default for BasicSingleProducerEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleProducerEnforcer for BasicSingleProducerEnforcer {
    fn enable(&self) {
        let mut state = self.state.lock();
        state.enabled = true;
        state.pending_disable = false;
    }

    /// Disabling during a cycle takes effect once the cycle completes.
    fn disable(&self) {
        let mut state = self.state.lock();
        if state.in_cycle {
            state.pending_disable = true;
        } else {
            state.enabled = false;
        }
    }

    fn is_primary(&self) -> bool {
        self.state.lock().enabled
    }

    fn on_cycle_start(&self, _version: Version) {
        self.state.lock().in_cycle = true;
    }

    fn on_cycle_complete(&self, _status: &CycleStatus, _elapsed: Duration) {
        let mut state = self.state.lock();
        state.in_cycle = false;
        if state.pending_disable {
            state.pending_disable = false;
            state.enabled = false;
            info!("Producer leadership released after cycle completion");
        }
    }
}
