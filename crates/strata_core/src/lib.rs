//! # STRATA Core
//!
//! The entity-component runtime: a shared, traversed entity tree that
//! multiple independently-clocked simulation threads mutate safely
//! through deferred, queue-based structural operations.
//!
//! ## Units
//!
//! - [`ecs`]: entity tree, component lifecycle, registry dispatch,
//!   instance limiter
//! - [`error`]: the recoverable error taxonomy
//!
//! Thread scheduling (lanes, the render barrier) lives in
//! `strata_runtime`; this crate only requires that whoever calls
//! [`ecs::EntityComponentSystem::tick`] passes a lane name.

pub mod ecs;
pub mod error;

pub use ecs::{
    ActionContext, ActionId, AsAny, Behavior, BehaviorContext, BehaviorDescriptor, Component,
    ComponentId, Entity, EntityComponentSystem, EntityId, InstanceLimiter, DEFAULT_LANE,
};
pub use error::{EcsError, EcsResult};
