//! # Phase Action Tables
//!
//! Collaborators (rendering, audio, animation) can hook a closure into a
//! dispatch phase without defining a behavior type. Actions are keyed by
//! id so unregistering is O(1), and the table is drained before running
//! so an action can freely register or unregister actions (including
//! itself) mid-pass.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::ecs::registry::{guarded, EntityComponentSystem};

/// Monotonic id source for actions.
static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle identifying a registered action, used to unregister it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ActionId(u64);

impl ActionId {
    fn next() -> Self {
        Self(NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Context handed to registered actions and scheduled one-shot tasks.
pub struct ActionContext<'a> {
    /// The registry running the dispatch pass.
    pub ecs: &'a Arc<EntityComponentSystem>,
    /// Time since the previous pass of this phase.
    pub delta: Duration,
    /// Lane name for tick passes, `None` during update passes.
    pub lane: Option<&'a str>,
}

/// A repeating phase action.
pub(crate) type Action = Box<dyn FnMut(&ActionContext<'_>) + Send>;

/// A one-shot task scheduled by tick count.
pub(crate) struct TickTask {
    /// Remaining default-lane tick passes before the task runs.
    pub remaining: u64,
    /// The task body.
    pub action: Box<dyn FnOnce(&ActionContext<'_>) + Send>,
}

/// A one-shot task scheduled by wall-clock delay.
pub(crate) struct FrameTask {
    /// The instant after which the task runs.
    pub due: Instant,
    /// The task body.
    pub action: Box<dyn FnOnce(&ActionContext<'_>) + Send>,
}

/// Id-keyed table of repeating actions for one phase (or one lane).
#[derive(Default)]
pub(crate) struct ActionTable {
    entries: Mutex<HashMap<ActionId, Action>>,
    /// Ids unregistered while their entry was checked out by `run`.
    tombstones: Mutex<HashSet<ActionId>>,
}

impl ActionTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, action: Action) -> ActionId {
        let id = ActionId::next();
        self.entries.lock().insert(id, action);
        id
    }

    pub(crate) fn remove(&self, id: ActionId) {
        if self.entries.lock().remove(&id).is_none() {
            // The entry is checked out by a running pass; drop it on merge.
            self.tombstones.lock().insert(id);
        }
    }

    /// Runs every action in registration order, each under the dispatch
    /// panic guard. Entries are checked out for the duration so action
    /// bodies can touch the table without deadlocking.
    pub(crate) fn run(&self, ctx: &ActionContext<'_>) {
        let mut taken: Vec<(ActionId, Action)> = self.entries.lock().drain().collect();
        if taken.is_empty() {
            return;
        }
        taken.sort_by_key(|(id, _)| *id);

        for (_, action) in &mut taken {
            guarded("registered action", || action(ctx));
        }

        let mut tombstones = self.tombstones.lock();
        let mut entries = self.entries.lock();
        for (id, action) in taken {
            if !tombstones.remove(&id) {
                entries.entry(id).or_insert(action);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::registry::EntityComponentSystem;
    use std::sync::atomic::AtomicUsize;

    fn ctx_for<'a>(ecs: &'a Arc<EntityComponentSystem>) -> ActionContext<'a> {
        ActionContext {
            ecs,
            delta: Duration::ZERO,
            lane: None,
        }
    }

    #[test]
    fn test_actions_run_in_registration_order() {
        let ecs = EntityComponentSystem::new();
        let table = ActionTable::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..4u32 {
            let order = Arc::clone(&order);
            table.insert(Box::new(move |_| order.lock().push(tag)));
        }
        table.run(&ctx_for(&ecs));
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_unregister_during_run_takes_effect_next_pass() {
        let ecs = EntityComponentSystem::new();
        let table = Arc::new(ActionTable::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let id_cell = Arc::new(Mutex::new(None::<ActionId>));
        let id = {
            let inner_table = Arc::clone(&table);
            let hits = Arc::clone(&hits);
            let id_cell = Arc::clone(&id_cell);
            table.insert(Box::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *id_cell.lock() {
                    inner_table.remove(id);
                }
            }))
        };
        *id_cell.lock() = Some(id);

        table.run(&ctx_for(&ecs));
        table.run(&ctx_for(&ecs));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_action_does_not_stop_the_pass() {
        let ecs = EntityComponentSystem::new();
        let table = ActionTable::new();
        let hits = Arc::new(AtomicUsize::new(0));

        table.insert(Box::new(|_| panic!("misbehaving collaborator")));
        {
            let hits = Arc::clone(&hits);
            table.insert(Box::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }
        table.run(&ctx_for(&ecs));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
