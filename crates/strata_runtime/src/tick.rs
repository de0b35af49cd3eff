//! # Tick Manager
//!
//! Spawns one worker thread per configured simulation lane and drives
//! the registry's tick dispatch from each. Synchronized lanes
//! rendezvous with the render thread through the generation barrier
//! every cycle; unsynchronized lanes free-run at their own rate.
//!
//! A lane's target frequency is a ceiling: each iteration sleeps off
//! whatever remains of its period, and a lane that overruns simply
//! starts the next iteration immediately rather than trying to catch
//! up. A frequency of zero means the lane ticks exactly once after
//! startup and then idles until the frequency is raised.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use strata_core::EntityComponentSystem;
use tracing::{debug, info, warn};

use crate::barrier::{Barrier, BarrierHandle};
use crate::config::RuntimeConfig;
use crate::error::RuntimeError;

/// Sleep granularity for idle lanes (frequency zero, already ticked).
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Rolling counters for one lane, readable from any thread.
#[derive(Debug, Default)]
pub struct LaneStats {
    tick_count: AtomicU64,
    delta_nanos: AtomicU64,
    elapsed_nanos: AtomicU64,
    tps_bits: AtomicU32,
}

impl LaneStats {
    /// Total ticks executed by this lane.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.tick_count.load(Ordering::Acquire)
    }

    /// Wall-clock time between the starts of the last two iterations.
    #[must_use]
    pub fn delta(&self) -> Duration {
        Duration::from_nanos(self.delta_nanos.load(Ordering::Acquire))
    }

    /// Time the last iteration spent working, sleep excluded.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::Acquire))
    }

    /// Ticks per second measured over the last completed one-second
    /// window.
    #[must_use]
    pub fn ticks_per_second(&self) -> f32 {
        f32::from_bits(self.tps_bits.load(Ordering::Acquire))
    }

    fn record_iteration_start(&self, delta: Duration) {
        self.delta_nanos
            .store(delta.as_nanos() as u64, Ordering::Release);
    }

    fn record_tick(&self, spent: Duration) {
        self.tick_count.fetch_add(1, Ordering::AcqRel);
        self.elapsed_nanos
            .store(spent.as_nanos() as u64, Ordering::Release);
    }

    fn record_tps(&self, tps: f32) {
        self.tps_bits.store(tps.to_bits(), Ordering::Release);
    }
}

/// One simulation lane: a named tick channel driven by its own worker
/// thread.
#[derive(Debug)]
pub struct Lane {
    name: String,
    sync: bool,
    frequency_hz: AtomicU32,
    stats: LaneStats,
}

impl Lane {
    /// Lane name; tick callbacks registered for this name run on this
    /// lane's thread.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this lane rendezvous with the render thread.
    #[must_use]
    pub fn is_sync(&self) -> bool {
        self.sync
    }

    /// Current target frequency in Hz.
    #[must_use]
    pub fn frequency(&self) -> u32 {
        self.frequency_hz.load(Ordering::Acquire)
    }

    /// Retunes the lane's target frequency. Takes effect on the next
    /// iteration; raising a zero-frequency lane wakes it from idle.
    pub fn set_frequency(&self, hz: u32) {
        self.frequency_hz.store(hz, Ordering::Release);
    }

    /// This lane's rolling counters.
    #[must_use]
    pub fn stats(&self) -> &LaneStats {
        &self.stats
    }
}

/// Owns the lane worker threads.
///
/// Threads run until [`shutdown`](TickManager::shutdown) or drop.
#[derive(Debug)]
pub struct TickManager {
    lanes: Vec<Arc<Lane>>,
    handles: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl TickManager {
    /// Validates the configuration, registers every synchronized lane
    /// with the barrier, and spawns one worker thread per lane.
    ///
    /// Barrier registration happens here, on the caller's thread,
    /// before any worker starts: the render thread must never observe a
    /// participant set that is still growing lane by lane.
    ///
    /// # Errors
    ///
    /// Configuration validation failures, or a thread spawn refused by
    /// the OS.
    pub fn start(
        ecs: &Arc<EntityComponentSystem>,
        barrier: &Arc<Barrier>,
        config: &RuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let stop = Arc::new(AtomicBool::new(false));
        let mut lanes = Vec::with_capacity(config.lanes.len());
        let mut handles = Vec::with_capacity(config.lanes.len());

        // Register every sync lane before spawning anything: a worker
        // must never cycle against a participant set that is still
        // growing lane by lane.
        let mut seats = Vec::with_capacity(config.lanes.len());
        for lane_config in &config.lanes {
            let lane = Arc::new(Lane {
                name: lane_config.name.clone(),
                sync: lane_config.sync,
                frequency_hz: AtomicU32::new(lane_config.frequency_hz),
                stats: LaneStats::default(),
            });
            let barrier_handle = lane
                .sync
                .then(|| barrier.register(lane.name.clone()));
            seats.push((lane, barrier_handle));
        }

        for (lane, barrier_handle) in seats {
            let spawned = thread::Builder::new()
                .name(format!("strata-lane-{}", lane.name))
                .spawn({
                    let lane = Arc::clone(&lane);
                    let ecs = Arc::clone(ecs);
                    let stop = Arc::clone(&stop);
                    move || lane_loop(&lane, &ecs, barrier_handle, &stop)
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(io) => {
                    // Let the already-spawned workers wind down on
                    // their own; joining here could block forever on a
                    // sync lane waiting for participants that will
                    // never arrive. Startup is aborting anyway.
                    stop.store(true, Ordering::Release);
                    return Err(RuntimeError::Spawn(io));
                }
            }
            lanes.push(lane);
        }

        info!(lanes = lanes.len(), "tick manager started");
        Ok(Self {
            lanes,
            handles,
            stop,
        })
    }

    /// All configured lanes, in configuration order.
    #[must_use]
    pub fn lanes(&self) -> &[Arc<Lane>] {
        &self.lanes
    }

    /// Looks up a lane by name.
    #[must_use]
    pub fn lane(&self, name: &str) -> Option<&Arc<Lane>> {
        self.lanes.iter().find(|lane| lane.name == name)
    }

    /// Retunes a lane's target frequency. Returns false if no lane by
    /// that name exists.
    pub fn set_frequency(&self, name: &str, hz: u32) -> bool {
        match self.lane(name) {
            Some(lane) => {
                lane.set_frequency(hz);
                true
            }
            None => false,
        }
    }

    /// True once every lane thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(JoinHandle::is_finished)
    }

    /// Signals every lane to stop and joins their threads.
    ///
    /// Sync lanes drop their barrier handles on the way out, so the
    /// render thread's participant set shrinks back to itself.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        for handle in self.handles.drain(..) {
            if let Err(panic) = handle.join() {
                warn!(?panic, "lane thread panicked");
            }
        }
    }
}

impl Drop for TickManager {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// Body of a lane worker thread.
///
/// The barrier handle, if any, is dropped when the loop exits, which
/// deregisters the lane from the render rendezvous.
fn lane_loop(
    lane: &Arc<Lane>,
    ecs: &Arc<EntityComponentSystem>,
    mut barrier_handle: Option<BarrierHandle>,
    stop: &AtomicBool,
) {
    debug!(lane = %lane.name, sync = lane.sync, "lane thread up");
    let mut last_start = Instant::now();
    let mut window_start = Instant::now();
    let mut window_ticks = 0u64;

    while !stop.load(Ordering::Acquire) {
        let frequency = lane.frequency();
        if frequency == 0 && lane.stats.ticks() > 0 {
            // One-shot lane that has had its shot. Poll for a frequency
            // change or shutdown.
            thread::sleep(IDLE_POLL);
            continue;
        }

        let iteration_start = Instant::now();
        let delta = iteration_start - last_start;
        last_start = iteration_start;
        lane.stats.record_iteration_start(delta);

        if let Some(handle) = barrier_handle.as_mut() {
            handle.request_tick();
        }
        ecs.tick(&lane.name, delta);
        if let Some(handle) = barrier_handle.as_mut() {
            handle.free_threads();
        }

        let spent = iteration_start.elapsed();
        lane.stats.record_tick(spent);
        window_ticks += 1;
        let window = window_start.elapsed();
        if window >= Duration::from_secs(1) {
            lane.stats
                .record_tps(window_ticks as f32 / window.as_secs_f32());
            window_start = Instant::now();
            window_ticks = 0;
        }

        if frequency > 0 {
            let period = Duration::from_secs(1) / frequency;
            if let Some(remaining) = period.checked_sub(iteration_start.elapsed()) {
                thread::sleep(remaining);
            }
            // Overruns are not repaid; the next iteration just starts
            // late with a larger delta.
        }
    }
    drop(barrier_handle);
    debug!(lane = %lane.name, ticks = lane.stats.ticks(), "lane thread down");
}
