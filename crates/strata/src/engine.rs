//! # Engine
//!
//! The assembled runtime: one registry, one generation barrier, one
//! tick manager, and the render thread's seat at the barrier. The
//! thread that creates the [`Engine`] is the render thread; it drives
//! frames through [`Engine::frame`] while the lane workers tick in the
//! background.

use std::sync::Arc;

use strata_core::EntityComponentSystem;
use strata_runtime::{Barrier, BarrierHandle, RuntimeConfig, RuntimeError, TickManager};
use tracing::info;

/// Name under which the render thread participates in the barrier.
const RENDER_PARTICIPANT: &str = "Render";

/// The assembled STRATA runtime.
///
/// Owns the registry, the lane worker threads and the render thread's
/// barrier membership. Shut down explicitly with
/// [`shutdown`](Engine::shutdown); dropping the engine also winds the
/// workers down, in the right order.
pub struct Engine {
    // Field order matters on drop: the render handle must leave the
    // barrier before the manager joins the lane threads, otherwise
    // sync lanes would wait forever for a render rendezvous.
    render: BarrierHandle,
    manager: TickManager,
    ecs: Arc<EntityComponentSystem>,
    barrier: Arc<Barrier>,
}

impl Engine {
    /// Builds the registry, registers the render thread with the
    /// barrier, and starts the lane workers.
    ///
    /// # Errors
    ///
    /// Configuration validation failures and thread spawn failures;
    /// see [`RuntimeError`].
    pub fn new(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let ecs = EntityComponentSystem::new();
        let barrier = Barrier::new();
        let render = barrier.register(RENDER_PARTICIPANT);
        let manager = TickManager::start(&ecs, &barrier, config)?;
        info!(lanes = manager.lanes().len(), "engine up");
        Ok(Self {
            render,
            manager,
            ecs,
            barrier,
        })
    }

    /// The registry.
    #[must_use]
    pub fn ecs(&self) -> &Arc<EntityComponentSystem> {
        &self.ecs
    }

    /// The lane scheduler.
    #[must_use]
    pub fn manager(&self) -> &TickManager {
        &self.manager
    }

    /// Number of completed barrier generations.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.barrier.generation()
    }

    /// Runs one frame on the calling (render) thread.
    ///
    /// Rendezvous with every sync lane, runs the update pass, hands the
    /// now-stable tree to `render` for draw submission, then releases
    /// the lanes into their next cycle.
    pub fn frame<R>(&mut self, render: impl FnOnce(&Arc<EntityComponentSystem>) -> R) -> R {
        self.render.request_tick();
        self.ecs.update();
        let out = render(&self.ecs);
        self.render.free_threads();
        out
    }

    /// Stops the lane workers and joins their threads.
    pub fn shutdown(self) {
        info!(generations = self.barrier.generation(), "engine down");
        // Dropping `self` leaves the barrier first, then joins.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_runtime::ConfigError;

    #[test]
    fn test_engine_requires_main_lane() {
        let config = RuntimeConfig::default().with_lane("Physics", 50, true);
        assert!(matches!(
            Engine::new(&config),
            Err(RuntimeError::Config(ConfigError::MissingMainLane))
        ));
    }

    #[test]
    fn test_frame_returns_render_output() {
        let mut engine = Engine::new(&RuntimeConfig::main_lane(100, true)).unwrap();
        let frames = engine.frame(|ecs| ecs.frame_count());
        assert_eq!(frames, 1);
        // Entering the second cycle proves the first one closed.
        engine.frame(|_| {});
        assert!(engine.generation() >= 1);
        engine.shutdown();
    }
}
