//! # Registry
//!
//! [`EntityComponentSystem`] is the process-wide state: the two sentinel
//! roots, the deferred-mutation queues, the per-phase callback tables,
//! the scheduled one-shot tasks and the instance counters, plus the
//! per-cycle dispatch algorithm ([`EntityComponentSystem::update`] for
//! the render thread, [`EntityComponentSystem::tick`] for lane worker
//! threads).
//!
//! ## Dispatch discipline
//!
//! Structural steps (flush, destroy processing) run under a single
//! non-reentrant flush lock; any thread may own dispatch, but two
//! flushes never run concurrently. User callbacks always run *outside*
//! that lock and under a panic guard: one misbehaving component is
//! logged and skipped, never allowed to halt the cycle for others.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::ecs::actions::{ActionContext, ActionId, ActionTable, FrameTask, TickTask};
use crate::ecs::component::{Behavior, BehaviorContext, Component, ComponentId};
use crate::ecs::deferred::PendingOp;
use crate::ecs::entity::Entity;
use crate::ecs::limiter::InstanceLimiter;

/// The lane that runs tick-phase callbacks with no explicit affinity.
pub const DEFAULT_LANE: &str = "Main";

/// Runs `f` under the dispatch panic guard: a panic is caught, logged
/// with context, and the pass continues.
pub(crate) fn guarded(what: &str, f: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        tracing::error!(callback = what, panic = %msg, "callback panicked; continuing pass");
    }
}

/// Process-wide entity-component state and the per-cycle dispatcher.
pub struct EntityComponentSystem {
    self_weak: Weak<Self>,
    root: Arc<Entity>,
    destroyed_root: Arc<Entity>,

    /// Entities with pending structural ops, one entry per dirty entity.
    dirty_tx: Sender<Arc<Entity>>,
    dirty_rx: Receiver<Arc<Entity>>,

    /// Entities whose destruction was requested.
    removal_tx: Sender<Arc<Entity>>,
    removal_rx: Receiver<Arc<Entity>>,

    /// Components attached since the last pass, awaiting their start.
    pending_start: Mutex<Vec<Arc<Component>>>,

    /// Update-phase callback table, keyed for O(1) unregister.
    update_table: RwLock<HashMap<ComponentId, Arc<Component>>>,
    /// Tick-phase callback tables, one per lane.
    tick_tables: RwLock<HashMap<String, HashMap<ComponentId, Arc<Component>>>>,

    update_actions: ActionTable,
    tick_actions: RwLock<HashMap<String, Arc<ActionTable>>>,

    /// One-shots counted in default-lane tick passes.
    tick_tasks: Mutex<Vec<TickTask>>,
    /// One-shots due by wall clock, run during update passes.
    frame_tasks: Mutex<Vec<FrameTask>>,

    limiter: InstanceLimiter,

    /// Single-flusher discipline; flush is not reentrant.
    flush_lock: Mutex<()>,

    last_update: Mutex<Option<Instant>>,
    frames: AtomicU64,
    ticks: AtomicU64,
}

impl EntityComponentSystem {
    /// Creates a registry with fresh sentinel roots.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let (dirty_tx, dirty_rx) = unbounded();
            let (removal_tx, removal_rx) = unbounded();
            Self {
                self_weak: weak.clone(),
                root: Entity::sentinel("Root", weak.clone()),
                destroyed_root: Entity::sentinel("Destroyed", weak.clone()),
                dirty_tx,
                dirty_rx,
                removal_tx,
                removal_rx,
                pending_start: Mutex::new(Vec::new()),
                update_table: RwLock::new(HashMap::new()),
                tick_tables: RwLock::new(HashMap::new()),
                update_actions: ActionTable::new(),
                tick_actions: RwLock::new(HashMap::new()),
                tick_tasks: Mutex::new(Vec::new()),
                frame_tasks: Mutex::new(Vec::new()),
                limiter: InstanceLimiter::new(),
                flush_lock: Mutex::new(()),
                last_update: Mutex::new(None),
                frames: AtomicU64::new(0),
                ticks: AtomicU64::new(0),
            }
        })
    }

    /// Returns the live sentinel root.
    #[must_use]
    pub fn root(&self) -> &Arc<Entity> {
        &self.root
    }

    /// Returns the destroyed-root sentinel holding entities pending
    /// external release.
    #[must_use]
    pub fn destroyed_root(&self) -> &Arc<Entity> {
        &self.destroyed_root
    }

    /// Returns the engine-wide instance limiter.
    #[must_use]
    pub fn limiter(&self) -> &InstanceLimiter {
        &self.limiter
    }

    /// Returns the current live-instance count for behavior type `B`.
    #[must_use]
    pub fn live_instances<B: Behavior>(&self) -> usize {
        self.limiter.live_count(TypeId::of::<B>())
    }

    /// Returns how many update passes have completed.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Returns how many tick passes have completed, across all lanes.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Creates an entity named `name`, parented under the live root.
    ///
    /// The parent reference is set immediately; membership in the root's
    /// children list becomes visible at the next flush.
    pub fn create_entity(self: &Arc<Self>, name: impl Into<String>) -> Arc<Entity> {
        let entity = Entity::new(name, self.self_weak.clone(), &self.root);
        self.root
            .enqueue(PendingOp::AddChild(Arc::clone(&entity)), self);
        entity
    }

    /// Registers a repeating action on the update phase.
    pub fn register_update_action(
        &self,
        action: impl FnMut(&ActionContext<'_>) + Send + 'static,
    ) -> ActionId {
        self.update_actions.insert(Box::new(action))
    }

    /// Unregisters an update-phase action.
    pub fn unregister_update_action(&self, id: ActionId) {
        self.update_actions.remove(id);
    }

    /// Registers a repeating action on `lane`'s tick phase.
    pub fn register_tick_action(
        &self,
        lane: &str,
        action: impl FnMut(&ActionContext<'_>) + Send + 'static,
    ) -> ActionId {
        let table = {
            let mut tables = self.tick_actions.write();
            Arc::clone(tables.entry(lane.to_owned()).or_default())
        };
        table.insert(Box::new(action))
    }

    /// Unregisters a tick-phase action from `lane`.
    pub fn unregister_tick_action(&self, lane: &str, id: ActionId) {
        if let Some(table) = self.tick_actions.read().get(lane) {
            table.remove(id);
        }
    }

    /// Schedules `action` to run once, after at most `ticks` passes of
    /// the default lane.
    pub fn schedule_in_ticks(
        &self,
        ticks: u64,
        action: impl FnOnce(&ActionContext<'_>) + Send + 'static,
    ) {
        self.tick_tasks.lock().push(TickTask {
            remaining: ticks,
            action: Box::new(action),
        });
    }

    /// Schedules `action` to run once, during the first update pass
    /// after `delay` has elapsed.
    pub fn schedule_after(
        &self,
        delay: Duration,
        action: impl FnOnce(&ActionContext<'_>) + Send + 'static,
    ) {
        self.frame_tasks.lock().push(FrameTask {
            due: Instant::now() + delay,
            action: Box::new(action),
        });
    }

    /// Update-phase dispatch. Called once per frame, on the render
    /// thread, between the barrier rendezvous points.
    ///
    /// Fixed order: flush deferred mutations, run one-shot starts,
    /// process the removal queue, run due wall-clock tasks, run update
    /// actions, invoke enabled update callbacks (skipping components
    /// started this same pass).
    pub fn update(self: &Arc<Self>) {
        let delta = {
            let mut last = self.last_update.lock();
            let now = Instant::now();
            let delta = last.map_or(Duration::ZERO, |t| now.duration_since(t));
            *last = Some(now);
            delta
        };

        let detached = self.flush_deferred();
        self.teardown_detached(detached);

        let started = self.run_starts(delta, None);

        let torn = self.process_removals();
        self.teardown_detached(torn);

        self.run_due_frame_tasks(delta);

        let ctx = ActionContext {
            ecs: self,
            delta,
            lane: None,
        };
        self.update_actions.run(&ctx);

        let mut components: Vec<_> = self.update_table.read().values().cloned().collect();
        components.sort_by_key(|c| c.id());
        for component in components {
            if started.contains(&component.id()) || component.is_new() {
                continue;
            }
            if !component.is_enabled() {
                continue;
            }
            let Some(entity) = component.entity() else {
                continue;
            };
            if entity.is_destroyed() || !entity.is_enabled() {
                continue;
            }
            let ctx = BehaviorContext {
                entity: &entity,
                ecs: self,
                delta,
                lane: None,
            };
            guarded("on_update", || component.invoke_on_update(&ctx));
        }

        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Tick-phase dispatch for one lane. Called once per worker-thread
    /// cycle with the lane's measured delta.
    ///
    /// Runs the same structural steps as [`EntityComponentSystem::update`]
    /// (flush, starts, removals), then the lane's due one-shots (default
    /// lane only), tick actions, and tick callbacks whose affinity
    /// matches `lane` (no affinity means the default lane). A component
    /// still new at tick time is started in place before its tick
    /// callback runs in the same pass.
    pub fn tick(self: &Arc<Self>, lane: &str, delta: Duration) {
        let detached = self.flush_deferred();
        self.teardown_detached(detached);

        self.run_starts(delta, Some(lane));

        let torn = self.process_removals();
        self.teardown_detached(torn);

        if lane == DEFAULT_LANE {
            self.run_due_tick_tasks(delta, lane);
        }

        let actions = self.tick_actions.read().get(lane).cloned();
        if let Some(table) = actions {
            let ctx = ActionContext {
                ecs: self,
                delta,
                lane: Some(lane),
            };
            table.run(&ctx);
        }

        let mut components: Vec<_> = self
            .tick_tables
            .read()
            .get(lane)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default();
        components.sort_by_key(|c| c.id());
        for component in components {
            let Some(entity) = component.entity() else {
                continue;
            };
            if entity.is_destroyed() {
                continue;
            }
            if component.is_new() {
                self.start_component(&component, &entity, delta, Some(lane));
            }
            if !component.is_enabled() || !entity.is_enabled() {
                continue;
            }
            let ctx = BehaviorContext {
                entity: &entity,
                ecs: self,
                delta,
                lane: Some(lane),
            };
            guarded("on_tick", || component.invoke_on_tick(&ctx));
        }

        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Hands a dirty entity to the flush queue. Called from
    /// [`Entity::enqueue`] on the first pending op.
    pub(crate) fn enqueue_dirty(&self, entity: Arc<Entity>) {
        let _ = self.dirty_tx.send(entity);
    }

    /// Hands an entity to the removal queue. Called from
    /// [`Entity::destroy`].
    pub(crate) fn enqueue_removal(&self, entity: Arc<Entity>) {
        let _ = self.removal_tx.send(entity);
    }

    /// Applies all deferred structural mutations, in FIFO order per
    /// entity. Returns components detached in the process; their
    /// teardown notifications run outside the flush lock.
    fn flush_deferred(&self) -> Vec<Arc<Component>> {
        let _guard = self.flush_lock.lock();
        let mut detached = Vec::new();
        while let Ok(entity) = self.dirty_rx.try_recv() {
            entity.clear_dirty();
            for op in entity.take_pending() {
                self.apply(&entity, op, &mut detached);
            }
        }
        detached
    }

    fn apply(&self, entity: &Arc<Entity>, op: PendingOp, detached: &mut Vec<Arc<Component>>) {
        match op {
            PendingOp::AddComponent(component) => {
                if entity.is_destroyed() {
                    // The attach raced a destroy; tear straight down.
                    detached.push(component);
                    return;
                }
                entity.attach_component(Arc::clone(&component));
                self.register_component(&component);
                self.pending_start.lock().push(component);
            }
            PendingOp::RemoveComponent(id) => {
                if let Some(component) = entity.detach_component(id) {
                    detached.push(component);
                }
            }
            PendingOp::AddChild(child) => {
                if child.is_destroyed() || entity.is_destroyed() {
                    return;
                }
                if Self::would_cycle(entity, &child) {
                    tracing::warn!(
                        parent = %entity.name(),
                        child = %child.name(),
                        "skipping re-parent that would create a cycle"
                    );
                    return;
                }
                if let Some(old_parent) = child.parent() {
                    old_parent.detach_child(child.id());
                }
                child.set_parent_ref(entity);
                entity.adopt_child(child);
            }
            PendingOp::RemoveChild(id) => {
                if let Some(child) = entity.detach_child(id) {
                    child.set_parent_ref(&self.root);
                    self.root.adopt_child(child);
                }
            }
        }
    }

    /// Walks `entity`'s ancestor chain looking for `child`.
    fn would_cycle(entity: &Arc<Entity>, child: &Arc<Entity>) -> bool {
        if entity.id() == child.id() {
            return true;
        }
        let mut node = entity.parent();
        while let Some(ancestor) = node {
            if ancestor.id() == child.id() {
                return true;
            }
            node = ancestor.parent();
        }
        false
    }

    /// Drains the removal queue: detaches each destroyed entity from its
    /// parent and flattens its whole subtree under the destroyed-root
    /// sentinel. Returns the components needing teardown.
    fn process_removals(&self) -> Vec<Arc<Component>> {
        let _guard = self.flush_lock.lock();
        let mut torn = Vec::new();
        while let Ok(entity) = self.removal_rx.try_recv() {
            if entity.is_destroyed() {
                continue;
            }
            tracing::debug!(entity = %entity.name(), "destroying entity subtree");

            let mut nodes = Vec::new();
            let mut stack = vec![Arc::clone(&entity)];
            while let Some(node) = stack.pop() {
                stack.extend(node.children());
                nodes.push(node);
            }

            if let Some(parent) = entity.parent() {
                parent.detach_child(entity.id());
            }
            for node in nodes {
                node.mark_destroyed();
                node.clear_children();
                node.set_parent_ref(&self.destroyed_root);
                torn.extend(node.take_components());
                self.destroyed_root.adopt_child(node);
            }
        }
        torn
    }

    /// Tears down detached components in the fixed order: disable,
    /// removal notification, callback-table unregister, instance-counter
    /// release.
    fn teardown_detached(&self, detached: Vec<Arc<Component>>) {
        for component in detached {
            if component.swap_disabled() {
                guarded("on_disabled", || component.invoke_on_disabled());
            }
            guarded("on_removed", || component.invoke_on_removed());
            self.unregister_component(&component);
            if component.descriptor().instance_limit.is_some() {
                self.limiter.release(component.behavior_type_id());
            }
            component.clear_entity();
        }
    }

    /// Runs the one-shot start of every component attached since the
    /// last pass. Returns the ids started here so the update pass can
    /// skip their update callback this cycle.
    fn run_starts(self: &Arc<Self>, delta: Duration, lane: Option<&str>) -> HashSet<ComponentId> {
        let pending = std::mem::take(&mut *self.pending_start.lock());
        let mut started = HashSet::new();
        for component in pending {
            let Some(entity) = component.entity() else {
                continue;
            };
            if entity.is_destroyed() {
                continue;
            }
            if self.start_component(&component, &entity, delta, lane) {
                started.insert(component.id());
            }
        }
        started
    }

    /// Start-exactly-once: fires the enabled notification (if enabled)
    /// and the start callback. Returns whether this call did the start.
    fn start_component(
        self: &Arc<Self>,
        component: &Arc<Component>,
        entity: &Arc<Entity>,
        delta: Duration,
        lane: Option<&str>,
    ) -> bool {
        if !component.mark_started() {
            return false;
        }
        if component.is_enabled() {
            guarded("on_enabled", || component.invoke_on_enabled());
        }
        let ctx = BehaviorContext {
            entity,
            ecs: self,
            delta,
            lane,
        };
        guarded("on_start", || component.invoke_on_start(&ctx));
        true
    }

    fn register_component(&self, component: &Arc<Component>) {
        let descriptor = component.descriptor();
        if descriptor.update {
            self.update_table
                .write()
                .insert(component.id(), Arc::clone(component));
        }
        if descriptor.tick {
            let lane = descriptor.lane.unwrap_or(DEFAULT_LANE);
            self.tick_tables
                .write()
                .entry(lane.to_owned())
                .or_default()
                .insert(component.id(), Arc::clone(component));
        }
    }

    fn unregister_component(&self, component: &Arc<Component>) {
        self.update_table.write().remove(&component.id());
        let lane = component.descriptor().lane.unwrap_or(DEFAULT_LANE);
        if let Some(table) = self.tick_tables.write().get_mut(lane) {
            table.remove(&component.id());
        }
    }

    /// Runs wall-clock one-shots whose delay has elapsed, in insertion
    /// order, removing them from the pending list.
    fn run_due_frame_tasks(self: &Arc<Self>, delta: Duration) {
        let now = Instant::now();
        let due: Vec<FrameTask> = {
            let mut tasks = self.frame_tasks.lock();
            let all = std::mem::take(&mut *tasks);
            let mut due = Vec::new();
            for task in all {
                if task.due <= now {
                    due.push(task);
                } else {
                    tasks.push(task);
                }
            }
            due
        };
        if due.is_empty() {
            return;
        }
        let ctx = ActionContext {
            ecs: self,
            delta,
            lane: None,
        };
        for task in due {
            let action = task.action;
            guarded("scheduled frame task", || action(&ctx));
        }
    }

    /// Counts down tick-scheduled one-shots and runs the due ones in
    /// insertion order.
    fn run_due_tick_tasks(self: &Arc<Self>, delta: Duration, lane: &str) {
        let due: Vec<TickTask> = {
            let mut tasks = self.tick_tasks.lock();
            let all = std::mem::take(&mut *tasks);
            let mut due = Vec::new();
            for mut task in all {
                task.remaining = task.remaining.saturating_sub(1);
                if task.remaining == 0 {
                    due.push(task);
                } else {
                    tasks.push(task);
                }
            }
            due
        };
        if due.is_empty() {
            return;
        }
        let ctx = ActionContext {
            ecs: self,
            delta,
            lane: Some(lane),
        };
        for task in due {
            let action = task.action;
            guarded("scheduled tick task", || action(&ctx));
        }
    }
}
