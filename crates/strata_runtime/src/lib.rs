//! # STRATA Runtime
//!
//! The threaded half of the runtime: lane configuration, the tick
//! manager that drives [`strata_core`]'s tick dispatch from per-lane
//! worker threads, and the generation barrier that rendezvous
//! synchronized lanes with the render thread.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_core::EntityComponentSystem;
//! use strata_runtime::{Barrier, RuntimeConfig, TickManager};
//!
//! # fn main() -> Result<(), strata_runtime::RuntimeError> {
//! let ecs = EntityComponentSystem::new();
//! let barrier = Barrier::new();
//! let mut render = barrier.register("Render");
//!
//! let config = RuntimeConfig::main_lane(100, true).with_lane("Physics", 50, true);
//! let manager = TickManager::start(&ecs, &barrier, &config)?;
//!
//! for _ in 0..3 {
//!     render.request_tick();
//!     ecs.update();
//!     // ... submit draw calls against the now-stable tree ...
//!     render.free_threads();
//! }
//!
//! manager.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod barrier;
pub mod config;
pub mod error;
pub mod tick;

pub use barrier::{Barrier, BarrierHandle};
pub use config::{LaneConfig, RuntimeConfig};
pub use error::{ConfigError, RuntimeError};
pub use tick::{Lane, LaneStats, TickManager};
