//! # Deferred Structural Mutation
//!
//! Every structural operation on the entity tree is captured as a
//! [`PendingOp`] on the target entity instead of being applied in place.
//! A separate "dirty" channel in the registry carries the entities that
//! have pending work, so any number of operations on one entity collapse
//! into a single flush visit.
//!
//! This is message passing into a single-consumer flush step: writers on
//! any thread enqueue; whichever thread owns dispatch drains, under the
//! registry's flush lock. Between enqueue and flush, readers see the
//! pre-mutation state; after flush, the post-mutation state; never a
//! partially applied operation.

use std::sync::Arc;

use crate::ecs::component::{Component, ComponentId};
use crate::ecs::entity::{Entity, EntityId};

/// A structural mutation waiting for the next flush.
///
/// Ops are applied in FIFO enqueue order per entity.
pub(crate) enum PendingOp {
    /// Attach an already-constructed component.
    AddComponent(Arc<Component>),
    /// Detach the component with this id.
    RemoveComponent(ComponentId),
    /// Adopt an entity as a child, detaching it from its current parent.
    AddChild(Arc<Entity>),
    /// Remove the child with this id, re-parenting it under the live root.
    RemoveChild(EntityId),
}
