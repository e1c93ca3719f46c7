//! Fixed timestep simulation tick
//!
//! One tick: replenish from spawners, advance and collide every active particle
//! (last to first, removing in place), commit terrain deposits, then drift the
//! global acceleration.

use super::collision::{CollisionOutcome, resolve};
use super::integrator::{advance, particle_acceleration};
use super::state::{SimPhase, SimState};
use super::store::Visit;

/// Control input for a single tick
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Pause toggle
    pub pause: bool,
}

/// What happened during one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub spawned: usize,
    pub expired: usize,
    pub bounced: usize,
    /// Bounced particles whose bounce budget ran out
    pub truncated: usize,
    pub absorbed: usize,
    pub lost: usize,
    /// The active index list changed (renderers must rebuild index buffers)
    pub indices_modified: bool,
    /// Pending terrain deposits were committed
    pub terrain_flushed: bool,
}

impl TickReport {
    /// Particles removed this tick
    pub fn removed(&self) -> usize {
        self.expired + self.absorbed + self.lost
    }
}

/// Advance the simulation by one fixed timestep
pub fn tick(state: &mut SimState, input: &TickInput, dt: f32) -> TickReport {
    if input.pause {
        match state.phase {
            SimPhase::Running => {
                state.phase = SimPhase::Paused;
                log::info!("Simulation paused at tick {}", state.time_ticks);
                return TickReport::default();
            }
            SimPhase::Paused => {
                state.phase = SimPhase::Running;
                log::info!("Simulation resumed at tick {}", state.time_ticks);
            }
            _ => {}
        }
    }

    if state.phase != SimPhase::Running {
        return TickReport::default();
    }

    let mut report = TickReport {
        spawned: state.replenish(false, dt),
        ..Default::default()
    };

    let mass = state.settings.particle_mass;
    let global = state.gravity.current;
    let params = state.params;
    let terrain = &mut state.terrain;

    state.store.for_each_active_reverse(|p| {
        if *p.time_to_live <= dt {
            *p.time_to_live = 0.0;
            report.expired += 1;
            return Visit::Remove;
        }
        *p.time_to_live -= dt;

        let acceleration = particle_acceleration(p.force, mass, global);
        let (next, _) = advance(*p.position, *p.prior_position, acceleration, dt);
        let resolution = resolve(terrain, &params, *p.position, next);

        *p.position = resolution.position;
        *p.prior_position = resolution.prior_position;

        match resolution.outcome {
            CollisionOutcome::Airborne => {}
            CollisionOutcome::Bounced { truncated, .. } => {
                report.bounced += 1;
                if truncated {
                    report.truncated += 1;
                }
            }
            CollisionOutcome::Absorbed { .. } => report.absorbed += 1,
            CollisionOutcome::Lost(_) => report.lost += 1,
        }

        if resolution.outcome.is_terminal() {
            *p.time_to_live = 0.0;
            Visit::Remove
        } else {
            Visit::Keep
        }
    });

    report.terrain_flushed = state.terrain.flush_deferred();
    state.gravity.step(dt);
    report.indices_modified = state.store.take_modified();

    state.time_ticks += 1;
    let stats = &mut state.stats;
    stats.ticks += 1;
    stats.expired += report.expired as u64;
    stats.bounced += report.bounced as u64;
    stats.truncated += report.truncated as u64;
    stats.absorbed += report.absorbed as u64;
    stats.lost += report.lost as u64;

    if report.spawned > 0 || report.removed() > 0 {
        log::debug!(
            "tick {}: +{} -{} ({} absorbed, {} lost), {} active",
            state.time_ticks,
            report.spawned,
            report.removed(),
            report.absorbed,
            report.lost,
            state.store.len()
        );
    }

    report
}
