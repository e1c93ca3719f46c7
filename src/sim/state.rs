//! Simulation state
//!
//! Everything one run owns: the particle store, the terrain, the registered
//! spawners and the seeded RNG used for per-particle forces.

use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::collision::CollisionParams;
use super::integrator::GlobalAcceleration;
use super::spawner::{ParticleDescriptor, Spawner};
use super::store::ParticleStore;
use super::terrain::{Heightfield, TerrainError};
use crate::settings::Settings;

/// Lifecycle of a simulation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimPhase {
    /// Built, spawners may still be registered
    #[default]
    Idle,
    Running,
    Paused,
    /// Shut down; ticks are ignored
    Terminated,
}

/// Running totals since start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimStats {
    pub ticks: u64,
    pub spawned: u64,
    /// Descriptors refused because the store was full
    pub dropped: u64,
    pub expired: u64,
    pub bounced: u64,
    pub truncated: u64,
    pub absorbed: u64,
    pub lost: u64,
}

/// Complete simulation state
pub struct SimState {
    /// Sanitized copy of the run settings
    pub settings: Settings,
    pub params: CollisionParams,
    pub phase: SimPhase,
    pub store: ParticleStore,
    pub terrain: Heightfield,
    pub gravity: GlobalAcceleration,
    /// Simulation tick counter (ticks spent running)
    pub time_ticks: u64,
    pub stats: SimStats,
    spawners: Vec<Box<dyn Spawner>>,
    /// Samples per-particle forces at insertion
    rng: Pcg32,
    /// Reused descriptor buffer for spawner batches
    scratch: Vec<ParticleDescriptor>,
}

impl SimState {
    /// Build an idle simulation over `terrain` with no spawners
    pub fn new(settings: Settings, terrain: Heightfield) -> Self {
        let settings = settings.sanitized();
        let store = ParticleStore::new(settings.capacity);
        log::info!(
            "Simulation created: {} slots, {}x{} heightfield",
            store.capacity(),
            terrain.width(),
            terrain.depth()
        );

        Self {
            params: CollisionParams::from_settings(&settings),
            phase: SimPhase::Idle,
            gravity: GlobalAcceleration::new(settings.base_acceleration, settings.delta_acceleration),
            time_ticks: 0,
            stats: SimStats::default(),
            spawners: Vec::new(),
            rng: Pcg32::seed_from_u64(settings.seed),
            scratch: Vec::with_capacity(store.capacity()),
            store,
            terrain,
            settings,
        }
    }

    /// Build terrain and spawners from `settings`
    pub fn from_settings(settings: Settings) -> Result<Self, TerrainError> {
        let terrain = settings.terrain.build()?;
        let spawners: Vec<_> = settings
            .spawners
            .iter()
            .enumerate()
            .map(|(i, s)| s.build(settings.spawner_seed(i)))
            .collect();

        let mut state = Self::new(settings, terrain);
        for spawner in spawners {
            state.add_spawner(spawner);
        }
        Ok(state)
    }

    /// Register a spawner; initial batches are drained in registration order
    pub fn add_spawner(&mut self, spawner: Box<dyn Spawner>) {
        if self.phase != SimPhase::Idle {
            log::debug!("spawner registered while {:?}; its initial batch is skipped", self.phase);
        }
        self.spawners.push(spawner);
    }

    pub fn spawner_count(&self) -> usize {
        self.spawners.len()
    }

    /// Drain every spawner's initial batch and start running
    ///
    /// Returns the number of particles admitted. Does nothing unless idle.
    pub fn start(&mut self) -> usize {
        if self.phase != SimPhase::Idle {
            log::warn!("start() ignored in phase {:?}", self.phase);
            return 0;
        }
        let spawned = self.replenish(true, self.settings.fixed_dt);
        self.phase = SimPhase::Running;
        log::info!(
            "Simulation started: {} particles from {} spawners",
            spawned,
            self.spawners.len()
        );
        spawned
    }

    /// Stop the run and free every particle
    pub fn shutdown(&mut self) {
        if self.phase == SimPhase::Terminated {
            return;
        }
        self.store.clear();
        self.store.take_modified();
        self.phase = SimPhase::Terminated;
        log::info!(
            "Simulation shut down after {} ticks ({} absorbed, {} expired)",
            self.time_ticks,
            self.stats.absorbed,
            self.stats.expired
        );
    }

    /// Offer each spawner's batch to the store
    ///
    /// `initial` selects the start-up batch, otherwise the per-tick one.
    /// Descriptors beyond the free capacity are dropped, never queued.
    pub(crate) fn replenish(&mut self, initial: bool, dt: f32) -> usize {
        let force_range = self.settings.force_range;
        let mut spawned = 0;

        for spawner in &mut self.spawners {
            let requested = if initial {
                spawner.initial_count()
            } else {
                spawner.per_tick_count()
            };
            if requested == 0 {
                continue;
            }

            // The whole batch is drawn so a spawner's stream does not depend on store load
            self.scratch.clear();
            spawner.fill_batch(requested, &mut self.scratch);

            let admitted = self
                .store
                .insert_batch(&self.scratch, dt, || force_range.sample(&mut self.rng));
            spawned += admitted;

            let dropped = requested - admitted;
            if dropped > 0 {
                log::debug!("store full: dropped {dropped} of {requested} descriptors");
                self.stats.dropped += dropped as u64;
            }
        }

        self.stats.spawned += spawned as u64;
        spawned
    }
}
