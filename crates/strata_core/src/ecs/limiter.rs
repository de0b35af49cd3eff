//! # Instance Limiter
//!
//! Engine-wide enforcement of "at most K live instances of component
//! type X". The counter map is guarded by a single mutex: limit checks
//! must be synchronous so a burst of concurrent `add_component` calls
//! cannot all pass the check before any counter moves.

use std::any::TypeId;
use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{EcsError, EcsResult};

/// Shared map from component type to its live-instance count.
#[derive(Default)]
pub struct InstanceLimiter {
    counts: Mutex<HashMap<TypeId, usize>>,
}

impl InstanceLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves one instance of `type_id`, failing without mutating the
    /// counter if the live count is already at `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InstanceLimitReached`] when the live count is
    /// at the limit. The failure is also logged.
    pub fn try_reserve(
        &self,
        type_id: TypeId,
        type_name: &'static str,
        limit: usize,
    ) -> EcsResult<()> {
        let mut counts = self.counts.lock();
        let count = counts.entry(type_id).or_insert(0);
        if *count >= limit {
            tracing::error!(type_name, limit, "component instance limit reached");
            return Err(EcsError::InstanceLimitReached { type_name, limit });
        }
        *count += 1;
        Ok(())
    }

    /// Releases one instance of `type_id`, floored at zero.
    pub fn release(&self, type_id: TypeId) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(&type_id) {
            *count = count.saturating_sub(1);
        }
    }

    /// Returns the current live count for `type_id`.
    #[must_use]
    pub fn live_count(&self, type_id: TypeId) -> usize {
        self.counts.lock().get(&type_id).copied().unwrap_or(0)
    }
}
