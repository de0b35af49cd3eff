//! End-to-end test: an engine with two synchronized lanes driving a
//! component's tick callbacks while the render thread runs frames.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use strata::{Behavior, BehaviorContext, BehaviorDescriptor, Engine, RuntimeConfig};

struct Counter {
    updates: Arc<AtomicU64>,
    ticks: Arc<AtomicU64>,
}

impl Behavior for Counter {
    fn descriptor() -> BehaviorDescriptor {
        BehaviorDescriptor::new().updates().ticks_on("Physics")
    }

    fn on_update(&mut self, _ctx: &BehaviorContext<'_>) {
        self.updates.fetch_add(1, Ordering::SeqCst);
    }

    fn on_tick(&mut self, ctx: &BehaviorContext<'_>) {
        assert_eq!(ctx.lane, Some("Physics"));
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn frames_drive_update_and_lane_ticks() {
    let config = RuntimeConfig::main_lane(100, true).with_lane("Physics", 50, true);
    let mut engine = Engine::new(&config).unwrap();

    let updates = Arc::new(AtomicU64::new(0));
    let ticks = Arc::new(AtomicU64::new(0));
    let entity = engine.ecs().create_entity("counter");
    entity
        .add_component(Counter {
            updates: Arc::clone(&updates),
            ticks: Arc::clone(&ticks),
        })
        .unwrap();

    for _ in 0..10 {
        engine.frame(|_ecs| {});
    }

    // The lanes may still be departing the last cycle, so the counters
    // lag the frame count by at most one.
    assert!(engine.generation() >= 9);
    assert_eq!(engine.ecs().frame_count(), 10);
    let physics_ticks = engine
        .manager()
        .lane("Physics")
        .unwrap()
        .stats()
        .ticks();
    engine.shutdown();

    assert!(physics_ticks >= 9);
    assert!(updates.load(Ordering::SeqCst) >= 1);
    assert!(ticks.load(Ordering::SeqCst) >= 1);
}

#[test]
fn dropping_the_engine_winds_workers_down() {
    let config = RuntimeConfig::main_lane(100, true).with_lane("Physics", 50, true);
    let mut engine = Engine::new(&config).unwrap();
    engine.frame(|_ecs| {});
    // Drop without an explicit shutdown; the render seat leaves the
    // barrier before the lane threads are joined, so this returns.
    drop(engine);
}
