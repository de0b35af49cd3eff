//! # Entity Tree
//!
//! An entity is a named node in a tree: one parent (never dangling, a
//! sentinel root stands in for "no real owner"), ordered children, and
//! ordered attached components.
//!
//! All structural mutation is deferred: the mutating methods below only
//! enqueue a [`PendingOp`] and return; the mutation becomes visible at
//! the registry's next flush. The one documented exception is
//! [`Entity::get_component`], which also searches the not-yet-flushed
//! add queue so a caller can retrieve a component it attached earlier in
//! the same dispatch pass.

use std::any::TypeId;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::ecs::component::{Behavior, Component};
use crate::ecs::deferred::PendingOp;
use crate::ecs::registry::EntityComponentSystem;
use crate::error::{EcsError, EcsResult};

/// Monotonic id source for entities.
static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an entity, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    fn next() -> Self {
        Self(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// A node in the entity tree.
///
/// Entities are created through
/// [`EntityComponentSystem::create_entity`] and shared as `Arc<Entity>`;
/// interior locks make the structural state readable from any thread
/// between flushes.
pub struct Entity {
    id: EntityId,
    name: String,
    is_sentinel: bool,
    enabled: AtomicBool,
    /// Destruction has been requested (enqueued, not yet flushed).
    doomed: AtomicBool,
    /// Destruction has been applied; the entity sits under the
    /// destroyed-root sentinel.
    destroyed: AtomicBool,
    parent: RwLock<Weak<Entity>>,
    children: RwLock<Vec<Arc<Entity>>>,
    components: RwLock<Vec<Arc<Component>>>,
    pending: Mutex<Vec<PendingOp>>,
    dirty: AtomicBool,
    ecs: Weak<EntityComponentSystem>,
}

impl Entity {
    /// Creates an entity parented (pre-flush) under `parent`.
    pub(crate) fn new(
        name: impl Into<String>,
        ecs: Weak<EntityComponentSystem>,
        parent: &Arc<Entity>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: EntityId::next(),
            name: name.into(),
            is_sentinel: false,
            enabled: AtomicBool::new(true),
            doomed: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            parent: RwLock::new(Arc::downgrade(parent)),
            children: RwLock::new(Vec::new()),
            components: RwLock::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            dirty: AtomicBool::new(false),
            ecs,
        })
    }

    /// Creates a sentinel root: no parent, cannot be mutated or destroyed.
    pub(crate) fn sentinel(name: &str, ecs: Weak<EntityComponentSystem>) -> Arc<Self> {
        Arc::new(Self {
            id: EntityId::next(),
            name: name.to_owned(),
            is_sentinel: true,
            enabled: AtomicBool::new(true),
            doomed: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            components: RwLock::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            dirty: AtomicBool::new(false),
            ecs,
        })
    }

    /// Returns this entity's unique id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Returns this entity's name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether this is one of the two sentinel roots.
    #[inline]
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.is_sentinel
    }

    /// Returns whether this entity is enabled. A disabled entity's
    /// components receive no update or tick callbacks.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Sets the enabled flag. Unlike components, entities fire no
    /// notification on the transition.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Returns whether destruction has been applied at a flush.
    #[inline]
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Returns the parent entity. `None` only for sentinel roots or an
    /// entity whose registry has been dropped.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<Entity>> {
        self.parent.read().upgrade()
    }

    /// Returns a snapshot of the current (flushed) children.
    #[must_use]
    pub fn children(&self) -> Vec<Arc<Entity>> {
        self.children.read().clone()
    }

    /// Returns a snapshot of the current (flushed) components.
    #[must_use]
    pub fn components(&self) -> Vec<Arc<Component>> {
        self.components.read().clone()
    }

    /// Constructs a component from `behavior` and enqueues its
    /// attachment to this entity.
    ///
    /// If the behavior type declares an instance limit, the engine-wide
    /// counter is reserved *synchronously* before anything is enqueued,
    /// so a burst of concurrent calls cannot overshoot the limit. The
    /// component appears in [`Entity::components`] only after the next
    /// flush, but is immediately retrievable through
    /// [`Entity::get_component`].
    ///
    /// # Errors
    ///
    /// [`EcsError::InstanceLimitReached`] when the type is at its limit
    /// (no counter is mutated), [`EcsError::EntityDestroyed`] /
    /// [`EcsError::SentinelEntity`] for dead or sentinel targets, and
    /// [`EcsError::RegistryGone`] if the registry was dropped.
    pub fn add_component<B: Behavior>(self: &Arc<Self>, behavior: B) -> EcsResult<Arc<Component>> {
        let ecs = self.ecs()?;
        if self.is_sentinel {
            return Err(EcsError::SentinelEntity(self.name.clone()));
        }
        if self.is_doomed() {
            return Err(EcsError::EntityDestroyed(self.name.clone()));
        }

        let descriptor = B::descriptor();
        if let Some(limit) = descriptor.instance_limit {
            ecs.limiter()
                .try_reserve(TypeId::of::<B>(), std::any::type_name::<B>(), limit)?;
        }

        let component = Component::new(behavior);
        component.bind_entity(self);
        self.enqueue(PendingOp::AddComponent(Arc::clone(&component)), &ecs);
        Ok(component)
    }

    /// Enqueues detachment of `component` from this entity.
    ///
    /// Always deferred: the issuing thread never races a concurrent
    /// flush on the same entity.
    pub fn remove_component(self: &Arc<Self>, component: &Arc<Component>) {
        if let Ok(ecs) = self.ecs() {
            self.enqueue(PendingOp::RemoveComponent(component.id()), &ecs);
        }
    }

    /// Finds an attached component wrapping a behavior of type `B`.
    ///
    /// Searches both the flushed component list and the pending add
    /// queue, so a component attached earlier in the same dispatch pass
    /// is already retrievable. A component with a pending removal is
    /// *not* returned, even though it is still in the flushed list.
    #[must_use]
    pub fn get_component<B: Behavior>(&self) -> Option<Arc<Component>> {
        self.find_component(|c| c.is::<B>())
    }

    /// Finds an attached component matching `pred`, with the same
    /// pending-queue visibility as [`Entity::get_component`].
    #[must_use]
    pub fn find_component(&self, pred: impl Fn(&Arc<Component>) -> bool) -> Option<Arc<Component>> {
        let pending = self.pending.lock();
        let removed: HashSet<_> = pending
            .iter()
            .filter_map(|op| match op {
                PendingOp::RemoveComponent(id) => Some(*id),
                _ => None,
            })
            .collect();

        for component in self.components.read().iter() {
            if !removed.contains(&component.id()) && pred(component) {
                return Some(Arc::clone(component));
            }
        }
        for op in pending.iter() {
            if let PendingOp::AddComponent(component) = op {
                if !removed.contains(&component.id()) && pred(component) {
                    return Some(Arc::clone(component));
                }
            }
        }
        None
    }

    /// Enqueues adoption of `child` under this entity. At flush the
    /// child is detached from its current parent and re-parented here.
    ///
    /// # Errors
    ///
    /// Sentinels cannot be re-parented and destroyed entities cannot
    /// adopt or be adopted.
    pub fn add_child(self: &Arc<Self>, child: &Arc<Entity>) -> EcsResult<()> {
        let ecs = self.ecs()?;
        if child.is_sentinel {
            return Err(EcsError::SentinelEntity(child.name.clone()));
        }
        if self.is_doomed() {
            return Err(EcsError::EntityDestroyed(self.name.clone()));
        }
        if child.is_doomed() {
            return Err(EcsError::EntityDestroyed(child.name.clone()));
        }
        self.enqueue(PendingOp::AddChild(Arc::clone(child)), &ecs);
        Ok(())
    }

    /// Enqueues adoption of every entity in `children`.
    ///
    /// # Errors
    ///
    /// Stops at the first child that cannot be adopted; earlier children
    /// stay enqueued.
    pub fn add_children<'a>(
        self: &Arc<Self>,
        children: impl IntoIterator<Item = &'a Arc<Entity>>,
    ) -> EcsResult<()> {
        for child in children {
            self.add_child(child)?;
        }
        Ok(())
    }

    /// Enqueues re-parenting of this entity under `parent`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Entity::add_child`].
    pub fn set_parent(self: &Arc<Self>, parent: &Arc<Entity>) -> EcsResult<()> {
        parent.add_child(self)
    }

    /// Enqueues removal of `child` from this entity. At flush the child
    /// is re-parented under the live root sentinel; it is not destroyed.
    pub fn remove_child(self: &Arc<Self>, child: &Arc<Entity>) {
        if let Ok(ecs) = self.ecs() {
            self.enqueue(PendingOp::RemoveChild(child.id()), &ecs);
        }
    }

    /// Enqueues removal of every entity in `children`.
    pub fn remove_children<'a>(
        self: &Arc<Self>,
        children: impl IntoIterator<Item = &'a Arc<Entity>>,
    ) {
        for child in children {
            self.remove_child(child);
        }
    }

    /// Requests destruction of every current child (and, transitively,
    /// their descendants).
    pub fn destroy_children(self: &Arc<Self>) {
        for child in self.children() {
            child.destroy();
        }
    }

    /// Requests destruction of this entity and its whole subtree.
    ///
    /// Only enqueues: at the next flush the entity is detached from its
    /// parent, every node of the subtree is re-parented under the
    /// destroyed-root sentinel, and every component is disabled,
    /// notified, unregistered and released from its instance counter.
    /// Afterwards the entity is only reachable through externally held
    /// references.
    pub fn destroy(self: &Arc<Self>) {
        if self.is_sentinel {
            tracing::warn!(entity = %self.name, "ignoring destroy of sentinel root");
            return;
        }
        if self.doomed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(ecs) = self.ecs() {
            ecs.enqueue_removal(Arc::clone(self));
        }
    }

    /// Returns whether destruction has been requested or applied.
    pub(crate) fn is_doomed(&self) -> bool {
        self.doomed.load(Ordering::SeqCst) || self.is_destroyed()
    }

    fn ecs(&self) -> EcsResult<Arc<EntityComponentSystem>> {
        self.ecs.upgrade().ok_or(EcsError::RegistryGone)
    }

    /// Appends an op and marks this entity dirty, collapsing multiple
    /// pending ops into one flush visit.
    pub(crate) fn enqueue(self: &Arc<Self>, op: PendingOp, ecs: &Arc<EntityComponentSystem>) {
        self.pending.lock().push(op);
        if !self.dirty.swap(true, Ordering::SeqCst) {
            ecs.enqueue_dirty(Arc::clone(self));
        }
    }

    /// Clears the dirty flag. Must happen before [`Entity::take_pending`]
    /// so a concurrent enqueue cannot slip between the two unobserved.
    pub(crate) fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    /// Drains the pending ops in FIFO order.
    pub(crate) fn take_pending(&self) -> Vec<PendingOp> {
        std::mem::take(&mut self.pending.lock())
    }

    /// Flush-side: appends a flushed component.
    pub(crate) fn attach_component(&self, component: Arc<Component>) {
        self.components.write().push(component);
    }

    /// Flush-side: removes a flushed component by id.
    pub(crate) fn detach_component(
        &self,
        id: crate::ecs::component::ComponentId,
    ) -> Option<Arc<Component>> {
        let mut components = self.components.write();
        let pos = components.iter().position(|c| c.id() == id)?;
        Some(components.remove(pos))
    }

    /// Flush-side: drains all flushed components (destroy teardown).
    pub(crate) fn take_components(&self) -> Vec<Arc<Component>> {
        std::mem::take(&mut self.components.write())
    }

    /// Flush-side: appends a child.
    pub(crate) fn adopt_child(&self, child: Arc<Entity>) {
        self.children.write().push(child);
    }

    /// Flush-side: removes a child by id.
    pub(crate) fn detach_child(&self, id: EntityId) -> Option<Arc<Entity>> {
        let mut children = self.children.write();
        let pos = children.iter().position(|c| c.id() == id)?;
        Some(children.remove(pos))
    }

    /// Flush-side: clears the children list (destroy teardown).
    pub(crate) fn clear_children(&self) {
        self.children.write().clear();
    }

    /// Flush-side: rewrites the parent reference.
    pub(crate) fn set_parent_ref(&self, parent: &Arc<Entity>) {
        *self.parent.write() = Arc::downgrade(parent);
    }

    /// Flush-side: marks destruction as applied.
    pub(crate) fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("enabled", &self.is_enabled())
            .field("destroyed", &self.is_destroyed())
            .field("children", &self.children.read().len())
            .field("components", &self.components.read().len())
            .finish()
    }
}
