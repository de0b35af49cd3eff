//! # Core Error Types
//!
//! All recoverable errors the entity-component runtime can report.
//!
//! Capacity and lifecycle errors are recoverable: the caller checks the
//! result and moves on. Nothing in this crate terminates the process.

use thiserror::Error;

/// Errors that can occur inside the entity-component runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The engine-wide live-instance count for a component type is
    /// already at that type's declared limit.
    #[error("instance limit reached for {type_name}: {limit} live instances")]
    InstanceLimitReached {
        /// Name of the component type that hit its limit.
        type_name: &'static str,
        /// The declared limit.
        limit: usize,
    },

    /// The target entity has been destroyed (or its destruction is
    /// pending) and no longer accepts components or children.
    #[error("entity \"{0}\" is destroyed")]
    EntityDestroyed(String),

    /// The operation targeted a sentinel root, which cannot be mutated.
    #[error("entity \"{0}\" is a sentinel root and cannot be mutated")]
    SentinelEntity(String),

    /// The registry that owns this entity has been dropped.
    #[error("the owning registry has been dropped")]
    RegistryGone,
}

/// Result alias for runtime operations.
pub type EcsResult<T> = Result<T, EcsError>;
