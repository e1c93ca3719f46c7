//! Position Verlet integration
//!
//! Velocity is never stored: it is the difference between the current and the
//! prior position. Anything that moves a particle must move its prior position
//! consistently or it injects velocity on the next step.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Advance one particle by one step
///
/// Returns `(next_position, next_prior_position)`. `acceleration` is in world
/// units per second squared and already includes any `1 / mass` scaling.
#[inline]
pub fn advance(position: Vec3, prior_position: Vec3, acceleration: Vec3, dt: f32) -> (Vec3, Vec3) {
    let implicit_velocity = position - prior_position;
    let next = position + implicit_velocity + acceleration * (dt * dt);
    (next, position)
}

/// Acceleration of one particle: its own constant force over mass, plus the global field
#[inline]
pub fn particle_acceleration(force: Vec3, mass: f32, global: Vec3) -> Vec3 {
    force / mass + global
}

/// Global acceleration with a constant per-second drift
///
/// The drift is applied once per tick, after every particle has advanced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalAcceleration {
    pub current: Vec3,
    pub delta: Vec3,
}

impl GlobalAcceleration {
    pub fn new(base: Vec3, delta: Vec3) -> Self {
        Self {
            current: base,
            delta,
        }
    }

    /// Apply one tick of drift
    pub fn step(&mut self, dt: f32) {
        self.current += self.delta * dt;
    }
}
