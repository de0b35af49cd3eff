//! # Component Lifecycle
//!
//! A component is a behavior unit attached to exactly one entity. The
//! runtime wraps user behavior state in [`Component`], which owns the
//! enabled/disabled state machine and the `is_new` start-once flag.
//!
//! ## No reflection
//!
//! Phase membership, lane affinity and instance limits are declared up
//! front through [`BehaviorDescriptor`], returned by a static method on
//! the behavior type. There is no runtime method discovery: the registry
//! only ever invokes callbacks the descriptor opted into.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::ecs::entity::Entity;
use crate::ecs::registry::EntityComponentSystem;

/// Monotonic id source for components.
static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a component instance.
///
/// Ids are process-wide monotonic, never reused, and key the registry's
/// callback tables so unregistering is O(1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ComponentId(u64);

impl ComponentId {
    fn next() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Type-level metadata for a behavior, declared once per concrete type.
///
/// Built with const methods so a behavior can expose it as a constant:
///
/// ```rust,ignore
/// impl Behavior for Physics {
///     fn descriptor() -> BehaviorDescriptor {
///         BehaviorDescriptor::new().ticks_on("Physics").limited(64)
///     }
/// }
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct BehaviorDescriptor {
    /// Maximum concurrently attached instances of this type engine-wide.
    pub instance_limit: Option<usize>,
    /// Simulation lane whose tick pass invokes `on_tick`. `None` means
    /// the default "Main" lane.
    pub lane: Option<&'static str>,
    /// Whether this type participates in the update (render-rate) phase.
    pub update: bool,
    /// Whether this type participates in the tick (lane-rate) phase.
    pub tick: bool,
}

impl BehaviorDescriptor {
    /// Creates a descriptor with no phase membership and no limits.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            instance_limit: None,
            lane: None,
            update: false,
            tick: false,
        }
    }

    /// Opts into the update phase.
    #[must_use]
    pub const fn updates(mut self) -> Self {
        self.update = true;
        self
    }

    /// Opts into the tick phase on the default lane.
    #[must_use]
    pub const fn ticks(mut self) -> Self {
        self.tick = true;
        self
    }

    /// Opts into the tick phase on a specific lane.
    #[must_use]
    pub const fn ticks_on(mut self, lane: &'static str) -> Self {
        self.tick = true;
        self.lane = Some(lane);
        self
    }

    /// Caps the engine-wide live-instance count for this type.
    #[must_use]
    pub const fn limited(mut self, max: usize) -> Self {
        self.instance_limit = Some(max);
        self
    }
}

/// Context handed to behavior callbacks.
pub struct BehaviorContext<'a> {
    /// The entity the component is attached to.
    pub entity: &'a Arc<Entity>,
    /// The registry running the dispatch pass.
    pub ecs: &'a Arc<EntityComponentSystem>,
    /// Time since the previous pass of this phase.
    pub delta: Duration,
    /// Lane name for tick passes, `None` during update passes.
    pub lane: Option<&'a str>,
}

/// Downcast support for boxed behaviors.
///
/// Blanket-implemented for every sized type, so user behaviors get it
/// for free; only the runtime calls it.
pub trait AsAny {
    /// Borrows the value as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
    /// Borrows the value as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A behavior attached to an entity.
///
/// Every callback is optional; the registry invokes only the phases the
/// descriptor opted into, plus the lifecycle notifications. Callbacks
/// take `&mut self`: behavior state lives behind the component's lock.
#[allow(unused_variables)]
pub trait Behavior: AsAny + Send + 'static {
    /// Static metadata for this concrete type.
    fn descriptor() -> BehaviorDescriptor
    where
        Self: Sized,
    {
        BehaviorDescriptor::new()
    }

    /// Invoked exactly once, after the attaching flush and before any
    /// update or tick callback on this component.
    fn on_start(&mut self, ctx: &BehaviorContext<'_>) {}

    /// Invoked once per update pass while component and entity are enabled.
    fn on_update(&mut self, ctx: &BehaviorContext<'_>) {}

    /// Invoked once per tick pass of the affine lane while component and
    /// entity are enabled.
    fn on_tick(&mut self, ctx: &BehaviorContext<'_>) {}

    /// Invoked when the component transitions to enabled.
    fn on_enabled(&mut self) {}

    /// Invoked when the component transitions to disabled.
    fn on_disabled(&mut self) {}

    /// Invoked when the component is detached from its entity.
    fn on_removed(&mut self) {}
}

/// Runtime wrapper around a user behavior.
///
/// Owns the back-reference to the entity (cleared on removal), the
/// enabled flag, and the `is_new` flag that distinguishes "attached but
/// never started" from steady state.
pub struct Component {
    id: ComponentId,
    type_id: TypeId,
    type_name: &'static str,
    descriptor: BehaviorDescriptor,
    entity: RwLock<Weak<Entity>>,
    enabled: AtomicBool,
    is_new: AtomicBool,
    behavior: Mutex<Box<dyn Behavior>>,
}

impl Component {
    /// Wraps `behavior` in a new, not-yet-attached component.
    pub(crate) fn new<B: Behavior>(behavior: B) -> Arc<Self> {
        Arc::new(Self {
            id: ComponentId::next(),
            type_id: TypeId::of::<B>(),
            type_name: std::any::type_name::<B>(),
            descriptor: B::descriptor(),
            entity: RwLock::new(Weak::new()),
            enabled: AtomicBool::new(true),
            is_new: AtomicBool::new(true),
            behavior: Mutex::new(Box::new(behavior)),
        })
    }

    /// Returns this component's unique id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Returns the `TypeId` of the wrapped behavior.
    #[inline]
    #[must_use]
    pub fn behavior_type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name of the wrapped behavior.
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the type-level metadata of the wrapped behavior.
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &BehaviorDescriptor {
        &self.descriptor
    }

    /// Checks whether the wrapped behavior is of concrete type `B`.
    #[must_use]
    pub fn is<B: Behavior>(&self) -> bool {
        self.type_id == TypeId::of::<B>()
    }

    /// Returns the owning entity, if still attached.
    #[must_use]
    pub fn entity(&self) -> Option<Arc<Entity>> {
        self.entity.read().upgrade()
    }

    /// Returns whether the component is enabled.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Returns whether the component is attached but not yet started.
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new.load(Ordering::SeqCst)
    }

    /// Sets the enabled flag; a transition fires the matching
    /// notification on the behavior.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        if was == enabled {
            return;
        }
        let mut behavior = self.behavior.lock();
        if enabled {
            behavior.on_enabled();
        } else {
            behavior.on_disabled();
        }
    }

    /// Runs `f` against the wrapped behavior if it is of type `B`.
    ///
    /// This is the typed access path after [`Entity::get_component`];
    /// the behavior lock is held for the duration of `f`.
    ///
    /// [`Entity::get_component`]: crate::ecs::entity::Entity::get_component
    pub fn with<B: Behavior, R>(&self, f: impl FnOnce(&mut B) -> R) -> Option<R> {
        let mut behavior = self.behavior.lock();
        // Dispatch through the trait object, not the box or the guard:
        // only the wrapped value's own TypeId can match `B`.
        (**behavior).as_any_mut().downcast_mut::<B>().map(f)
    }

    /// Binds the back-reference to the owning entity.
    pub(crate) fn bind_entity(&self, entity: &Arc<Entity>) {
        *self.entity.write() = Arc::downgrade(entity);
    }

    /// Clears the back-reference on removal.
    pub(crate) fn clear_entity(&self) {
        *self.entity.write() = Weak::new();
    }

    /// Clears `is_new`, returning whether this call did the clearing.
    ///
    /// The swap guarantees start-exactly-once even when an update pass
    /// and a tick pass race over a freshly attached component.
    pub(crate) fn mark_started(&self) -> bool {
        self.is_new.swap(false, Ordering::SeqCst)
    }

    /// Forces the enabled flag off without firing the notification,
    /// returning the previous value. Teardown fires `on_disabled`
    /// itself, under the dispatch panic guard.
    pub(crate) fn swap_disabled(&self) -> bool {
        self.enabled.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn invoke_on_start(&self, ctx: &BehaviorContext<'_>) {
        self.behavior.lock().on_start(ctx);
    }

    pub(crate) fn invoke_on_update(&self, ctx: &BehaviorContext<'_>) {
        self.behavior.lock().on_update(ctx);
    }

    pub(crate) fn invoke_on_tick(&self, ctx: &BehaviorContext<'_>) {
        self.behavior.lock().on_tick(ctx);
    }

    pub(crate) fn invoke_on_enabled(&self) {
        self.behavior.lock().on_enabled();
    }

    pub(crate) fn invoke_on_disabled(&self) {
        self.behavior.lock().on_disabled();
    }

    pub(crate) fn invoke_on_removed(&self) {
        self.behavior.lock().on_removed();
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("type", &self.type_name)
            .field("enabled", &self.is_enabled())
            .field("is_new", &self.is_new())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Toggle {
        enabled_fired: u32,
        disabled_fired: u32,
    }

    impl Behavior for Toggle {
        fn on_enabled(&mut self) {
            self.enabled_fired += 1;
        }

        fn on_disabled(&mut self) {
            self.disabled_fired += 1;
        }
    }

    #[test]
    fn test_enabled_transitions_fire_once() {
        let component = Component::new(Toggle::default());
        assert!(component.is_enabled());

        // Same-state writes are not transitions.
        component.set_enabled(true);
        component.set_enabled(false);
        component.set_enabled(false);
        component.set_enabled(true);

        let counts = component
            .with::<Toggle, _>(|t| (t.enabled_fired, t.disabled_fired))
            .unwrap();
        assert_eq!(counts, (1, 1));
    }

    #[test]
    fn test_typed_access_checks_concrete_type() {
        struct Other;
        impl Behavior for Other {}

        let component = Component::new(Toggle::default());
        assert!(component.is::<Toggle>());
        assert!(!component.is::<Other>());
        assert!(component.with::<Other, _>(|_| ()).is_none());
    }

    #[test]
    fn test_mark_started_is_one_shot() {
        let component = Component::new(Toggle::default());
        assert!(component.is_new());
        assert!(component.mark_started());
        assert!(!component.mark_started());
        assert!(!component.is_new());
    }
}
