//! Mutual exclusion between the rebalance and unwind paths
//!
//! A single `AtomicBool` guard; acquiring returns an RAII permit that
//! releases on drop, so an early return or `?` can never leave it held.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct OperationGuard {
    in_flight: Arc<AtomicBool>,
}

/// Held while a plan is executing
#[derive(Debug)]
pub struct OperationPermit {
    in_flight: Arc<AtomicBool>,
    operation: &'static str,
}

impl OperationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if another operation is in flight
    pub fn try_acquire(&self, operation: &'static str) -> Option<OperationPermit> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| {
                tracing::debug!(operation, "[GUARD] Operation guard acquired");
                OperationPermit {
                    in_flight: self.in_flight.clone(),
                    operation,
                }
            })
    }

    pub fn is_held(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl OperationPermit {
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Explicit release; same as dropping the permit
    pub fn release(self) {}
}

impl Drop for OperationPermit {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
        tracing::debug!(operation = self.operation, "[GUARD] Operation guard released");
    }
}
