//! Terrain collision response
//!
//! A particle's step is the segment from its current position to its predicted
//! next position. When the end of that segment is under the terrain the segment
//! is cast against the triangulated heightfield and the particle either bounces
//! (and the rest of the step is replayed along the reflected direction) or is
//! absorbed into the terrain.
//!
//! Velocities here are per-step displacements, not per-second rates.

use glam::{UVec2, Vec3};

use super::terrain::{Heightfield, TerrainHit};
use super::triangle::{reflect, sanitize_weights};
use crate::consts::{COLLISION_EPSILON, RAY_SLACK, SURFACE_OFFSET};
use crate::settings::{NormalMode, Settings};

/// Terrain response parameters, taken from [`Settings`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionParams {
    pub restitution: f32,
    pub absorption_velocity: f32,
    pub absorption_height_modifier: f32,
    pub particle_mass: f32,
    /// Maximum bounces resolved in one step
    pub recursion_depth: u32,
    pub normal_mode: NormalMode,
}

impl CollisionParams {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            restitution: settings.terrain_restitution,
            absorption_velocity: settings.absorption_velocity,
            absorption_height_modifier: settings.absorption_height_modifier,
            particle_mass: settings.particle_mass,
            recursion_depth: settings.recursion_depth,
            normal_mode: settings.normal_mode,
        }
    }
}

impl Default for CollisionParams {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Why a particle was dropped without being absorbed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossReason {
    /// Ended under the terrain but the ray found no triangle
    RayMiss,
    /// Left the heightfield footprint
    OutOfBounds,
}

/// What happened to a particle during one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionOutcome {
    Airborne,
    Bounced {
        bounces: u32,
        /// The bounce budget ran out with the particle still under the surface
        truncated: bool,
    },
    Absorbed {
        cell: UVec2,
        /// Total height queued on the cell corners
        deposited: f32,
    },
    Lost(LossReason),
}

impl CollisionOutcome {
    /// Whether the particle must be removed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Absorbed { .. } | Self::Lost(_))
    }
}

/// Post-collision state of a particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub position: Vec3,
    pub prior_position: Vec3,
    pub outcome: CollisionOutcome,
}

impl Resolution {
    /// Particle at `position` moving with per-step displacement `velocity`
    fn moving(position: Vec3, velocity: Vec3, outcome: CollisionOutcome) -> Self {
        Self {
            position,
            prior_position: position - velocity,
            outcome,
        }
    }

    fn stopped(position: Vec3, outcome: CollisionOutcome) -> Self {
        Self {
            position,
            prior_position: position,
            outcome,
        }
    }
}

/// Resolve one step from `current` to the predicted `next` against the terrain
///
/// Penetration is measured against the triangulated surface the rays are cast
/// at, and every position handed back lies on or above that surface.
/// Absorption only queues height deltas; the heightfield is not changed until
/// [`Heightfield::flush_deferred`].
pub fn resolve(
    terrain: &mut Heightfield,
    params: &CollisionParams,
    current: Vec3,
    next: Vec3,
) -> Resolution {
    let mut velocity = next - current;
    let mut origin = current;
    let mut remaining = velocity;
    let mut bounces = 0u32;

    loop {
        let end = origin + remaining;

        let Some(surface) = terrain.surface_height_at_world(end) else {
            return Resolution::moving(end, velocity, CollisionOutcome::Lost(LossReason::OutOfBounds));
        };

        if end.y >= surface - COLLISION_EPSILON {
            let outcome = if bounces == 0 {
                CollisionOutcome::Airborne
            } else {
                CollisionOutcome::Bounced {
                    bounces,
                    truncated: false,
                }
            };
            return Resolution::moving(above(end, surface), velocity, outcome);
        }

        if bounces >= params.recursion_depth {
            log::debug!("bounce budget of {} exhausted at {end}", params.recursion_depth);
            return Resolution::moving(
                above(end, surface),
                velocity,
                CollisionOutcome::Bounced {
                    bounces,
                    truncated: true,
                },
            );
        }

        // Terrain raised by last tick's deposits can bury a resting particle
        let start = terrain
            .surface_height_at_world(origin)
            .map_or(origin, |ground| above(origin, ground));
        let segment = end - start;
        let step = segment.length();
        let Some(hit) = terrain.raycast(start, segment, step * (1.0 + RAY_SLACK)) else {
            log::warn!("particle ended {:.4} under the terrain at {end} but the ray missed", surface - end.y);
            return Resolution::moving(end, velocity, CollisionOutcome::Lost(LossReason::RayMiss));
        };

        if velocity.length() <= params.absorption_velocity {
            return absorb(terrain, params, &hit);
        }

        let normal = match params.normal_mode {
            NormalMode::Interpolated => terrain.normal_at_world(hit.point).unwrap_or(hit.normal),
            NormalMode::Face => hit.normal,
        };
        let traveled = if step > 0.0 { (hit.distance / step).min(1.0) } else { 1.0 };

        velocity = reflect(velocity, normal, params.restitution);
        origin = hit.point + normal * SURFACE_OFFSET;
        remaining = velocity * (1.0 - traveled);
        bounces += 1;
    }
}

/// `p` raised to `ground` when it sits below it
#[inline]
fn above(p: Vec3, ground: f32) -> Vec3 {
    Vec3::new(p.x, p.y.max(ground), p.z)
}

fn absorb(terrain: &mut Heightfield, params: &CollisionParams, hit: &TerrainHit) -> Resolution {
    let raw = hit.triangle.triangle.barycentric(hit.point);
    let weights = sanitize_weights(raw);
    if weights.corrected {
        log::warn!("barycentric weights {raw} out of range at {}, clamped", hit.point);
    }

    let amount = params.particle_mass * params.absorption_height_modifier;
    let mut deltas = [0.0f32; 4];
    for (corner, w) in hit.triangle.corners.iter().zip(weights.values.to_array()) {
        deltas[corner.index()] += amount * w;
    }

    match terrain.deposit_height(hit.cell, deltas) {
        Ok(()) => Resolution::stopped(
            hit.point,
            CollisionOutcome::Absorbed {
                cell: hit.cell,
                deposited: amount,
            },
        ),
        Err(err) => {
            log::warn!("absorption deposit rejected: {err}");
            Resolution::stopped(hit.point, CollisionOutcome::Lost(LossReason::OutOfBounds))
        }
    }
}
