//! # Entity-Component Runtime
//!
//! A concurrent entity tree with deferred structural mutation.
//!
//! ## Design
//!
//! - Entities form a tree under a live sentinel root; destroyed
//!   subtrees move under a second "destroyed" sentinel
//! - Structural mutation is enqueued and applied at flush points,
//!   never in place
//! - Components declare phase membership, lane affinity and instance
//!   limits through an explicit descriptor, not reflection
//! - Dispatch runs on whichever thread owns the pass; flushes are
//!   serialized by a single non-reentrant lock

mod actions;
mod component;
mod deferred;
mod entity;
mod limiter;
mod registry;

pub use actions::{ActionContext, ActionId};
pub use component::{AsAny, Behavior, BehaviorContext, BehaviorDescriptor, Component, ComponentId};
pub use entity::{Entity, EntityId};
pub use limiter::InstanceLimiter;
pub use registry::{EntityComponentSystem, DEFAULT_LANE};
