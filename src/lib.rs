//! Verlet Terrain - fixed-capacity particle simulation over a deformable heightfield
//!
//! Core modules:
//! - `sim`: Deterministic simulation (particle arena, integrator, terrain collision)
//! - `renderer`: GPU-ready point and terrain buffers for a rendering host
//! - `persistence`: Heightfield export/import envelope
//! - `settings`: Data-driven simulation configuration

pub mod persistence;
pub mod renderer;
pub mod settings;
pub mod sim;

pub use settings::{NormalMode, Settings};

use glam::Vec3;

/// Simulation configuration constants
pub mod consts {
    /// Fixed simulation timestep (50 Hz physics step)
    pub const SIM_DT: f32 = 1.0 / 50.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Hard upper bound on particle slots
    pub const MAX_CAPACITY: usize = 65_000;
    /// Mass used when the configured mass is unusable
    pub const DEFAULT_PARTICLE_MASS: f32 = 1.0;
    /// Bounce resolutions allowed per particle per tick
    pub const DEFAULT_RECURSION_DEPTH: u32 = 10;
    /// Upper clamp for the bounce budget
    pub const MAX_RECURSION_DEPTH: u32 = 64;

    /// Penetration below the surface tolerated before a collision is reported
    ///
    /// Tolerated end points are still clamped onto the surface.
    pub const COLLISION_EPSILON: f32 = 1e-4;
    /// Offset along the normal applied to a bounce point so the next ray starts above the surface
    pub const SURFACE_OFFSET: f32 = 1e-4;
    /// Extra reach given to collision rays, as a fraction of the step
    pub const RAY_SLACK: f32 = 0.05;
    /// Collision rays start this far behind their origin so a particle resting
    /// on a triangle still hits it; such hits report distance 0
    pub const RAY_BACKTRACK: f32 = 1e-3;
    /// Negative barycentric weights smaller than this are treated as zero
    pub const BARYCENTRIC_TOLERANCE: f32 = 1e-4;
}

/// Component-wise lerp between two bounds, `t` in `[0, 1]` per axis
#[inline]
pub fn lerp3(min: Vec3, max: Vec3, t: Vec3) -> Vec3 {
    min + (max - min) * t
}

/// Inverse lerp clamped to `[0, 1]`; degenerate spans map to 0
#[inline]
pub fn inverse_lerp(a: f32, b: f32, value: f32) -> f32 {
    if (b - a).abs() <= f32::EPSILON {
        0.0
    } else {
        ((value - a) / (b - a)).clamp(0.0, 1.0)
    }
}
