//! # STRATA
//!
//! A concurrent entity-component runtime: a deferred-mutation entity
//! tree, per-type instance limits, and multi-lane tick scheduling with
//! a render-thread rendezvous.
//!
//! This crate is the facade. The entity/component model lives in
//! [`strata_core`], the threaded lane scheduler in [`strata_runtime`];
//! both are re-exported here.
//!
//! ## Quick start
//!
//! ```no_run
//! use strata::{Behavior, BehaviorDescriptor, Engine, RuntimeConfig};
//!
//! struct Spinner {
//!     angle: f32,
//! }
//!
//! impl Behavior for Spinner {
//!     fn descriptor() -> BehaviorDescriptor {
//!         BehaviorDescriptor::new().ticks_on("Physics")
//!     }
//!
//!     fn on_tick(&mut self, ctx: &strata::BehaviorContext<'_>) {
//!         self.angle += ctx.delta.as_secs_f32();
//!     }
//! }
//!
//! # fn main() -> Result<(), strata::RuntimeError> {
//! let config = RuntimeConfig::main_lane(100, true).with_lane("Physics", 50, true);
//! let mut engine = Engine::new(&config)?;
//!
//! let entity = engine.ecs().create_entity("spinner");
//! entity.add_component(Spinner { angle: 0.0 }).unwrap();
//!
//! for _ in 0..10 {
//!     engine.frame(|_ecs| {
//!         // submit draw calls
//!     });
//! }
//! engine.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod engine;

pub use engine::Engine;

pub use strata_core::{
    ActionContext, ActionId, Behavior, BehaviorContext, BehaviorDescriptor, Component,
    ComponentId, EcsError, EcsResult, Entity, EntityComponentSystem, EntityId, InstanceLimiter,
    DEFAULT_LANE,
};
pub use strata_runtime::{
    Barrier, BarrierHandle, ConfigError, Lane, LaneConfig, LaneStats, RuntimeConfig, RuntimeError,
    TickManager,
};
