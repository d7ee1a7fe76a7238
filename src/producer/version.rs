use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Version;

/// Source of new version identifiers.
///
/// Minted versions must be strictly increasing across calls and must never
/// be [`Version::NONE`] or [`Version::LATEST`].
pub trait VersionMinter: Send + Sync {
    fn mint(&self) -> Version;
}

/// Wall-clock milliseconds since the Unix epoch, bumped by one whenever the
/// clock has not moved past the previously minted version.
#[derive(Debug, Default)]
pub struct TimestampVersionMinter {
    last: AtomicU64,
}

impl TimestampVersionMinter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VersionMinter for TimestampVersionMinter {
    fn mint(&self) -> Version {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let next = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Version::new(next),
                Err(observed) => last = observed,
            }
        }
    }
}

/// Deterministic counter, starting at a chosen version.
#[derive(Debug)]
pub struct CounterVersionMinter {
    next: AtomicU64,
}

impl CounterVersionMinter {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.max(1)),
        }
    }
}

impl Default for CounterVersionMinter {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionMinter for CounterVersionMinter {
    fn mint(&self) -> Version {
        Version::new(self.next.fetch_add(1, Ordering::AcqRel))
    }
}
