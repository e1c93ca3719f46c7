//! Simulation settings
//!
//! Loaded from JSON; every field has a default. Invalid values are corrected by
//! [`Settings::sanitize`] with a logged warning instead of failing start-up.

use std::path::Path;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::*;
use crate::sim::spawner::{ParticleDescriptor, PointSpawner, Range3, RectangularPrismSpawner, Spawner};
use crate::sim::terrain::{Heightfield, TerrainError};

/// Errors raised while reading settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Capacity presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QualityPreset {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityPreset {
    /// Particle slots for this preset
    pub fn max_particles(&self) -> usize {
        match self {
            QualityPreset::Low => 1_000,
            QualityPreset::Medium => 10_000,
            QualityPreset::High => MAX_CAPACITY,
        }
    }
}

/// Which normal a bounce reflects about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NormalMode {
    /// Bilinear blend of the sample normals around the impact point
    #[default]
    Interpolated,
    /// Flat normal of the triangle that was hit
    Face,
}

/// Procedural height profile for the demo terrain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerrainShape {
    Flat,
    /// `amplitude * sin(2πx/λ) * cos(2πz/λ)` on top of the base height
    Ripple { amplitude: f32, wavelength: f32 },
}

/// Heightfield layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    pub width: u32,
    pub depth: u32,
    /// Sample spacing along x and z
    pub spacing: Vec2,
    pub origin: Vec3,
    pub base_height: f32,
    pub shape: TerrainShape,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            width: 65,
            depth: 65,
            spacing: Vec2::ONE,
            origin: Vec3::new(-32.0, 0.0, -32.0),
            base_height: 0.0,
            shape: TerrainShape::Ripple {
                amplitude: 1.0,
                wavelength: 16.0,
            },
        }
    }
}

impl TerrainSettings {
    pub fn build(&self) -> Result<Heightfield, TerrainError> {
        let base = self.base_height;
        match self.shape {
            TerrainShape::Ripple {
                amplitude,
                wavelength,
            } if wavelength > 0.0 => {
                let k = std::f32::consts::TAU / wavelength;
                let spacing = self.spacing;
                Heightfield::from_fn(self.width, self.depth, spacing, self.origin, |gx, gz| {
                    let x = gx as f32 * spacing.x;
                    let z = gz as f32 * spacing.y;
                    base + amplitude * (k * x).sin() * (k * z).cos()
                })
            }
            _ => Heightfield::flat(self.width, self.depth, self.spacing, self.origin, base),
        }
    }
}

/// Spawner definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpawnerSettings {
    RectangularPrism {
        position: Range3,
        velocity: Range3,
        time_to_live: f32,
        #[serde(default)]
        initial_count: usize,
        #[serde(default)]
        per_tick_count: usize,
    },
    Point {
        descriptor: ParticleDescriptor,
        #[serde(default)]
        initial_count: usize,
        #[serde(default)]
        per_tick_count: usize,
    },
}

impl SpawnerSettings {
    pub fn build(&self, seed: u64) -> Box<dyn Spawner> {
        match *self {
            SpawnerSettings::RectangularPrism {
                position,
                velocity,
                time_to_live,
                initial_count,
                per_tick_count,
            } => Box::new(
                RectangularPrismSpawner::new(position, velocity, time_to_live, seed)
                    .with_counts(initial_count, per_tick_count),
            ),
            SpawnerSettings::Point {
                descriptor,
                initial_count,
                per_tick_count,
            } => Box::new(PointSpawner::new(descriptor, initial_count).with_per_tick(per_tick_count)),
        }
    }
}

/// Simulation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Particle slots, fixed for the lifetime of the simulation
    pub capacity: usize,
    pub particle_mass: f32,

    // === Forces ===
    /// Global acceleration at start (world units / s²)
    pub base_acceleration: Vec3,
    /// Drift of the global acceleration per second
    pub delta_acceleration: Vec3,
    /// Per-particle constant force, sampled once at spawn
    pub force_range: Range3,

    // === Terrain response ===
    /// Fraction of normal speed kept by a bounce (0 = dead stop, 1 = elastic)
    pub terrain_restitution: f32,
    /// Per-tick displacement at or below which a particle is absorbed
    pub absorption_velocity: f32,
    /// Height added per unit of absorbed mass
    pub absorption_height_modifier: f32,
    /// Bounces resolved per particle per tick
    pub recursion_depth: u32,
    pub normal_mode: NormalMode,

    // === Timing / determinism ===
    pub fixed_dt: f32,
    pub seed: u64,

    pub terrain: TerrainSettings,
    pub spawners: Vec<SpawnerSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            capacity: QualityPreset::Medium.max_particles(),
            particle_mass: DEFAULT_PARTICLE_MASS,

            base_acceleration: Vec3::new(0.0, -9.81, 0.0),
            delta_acceleration: Vec3::ZERO,
            force_range: Range3::ZERO,

            terrain_restitution: 0.5,
            absorption_velocity: 0.05,
            absorption_height_modifier: 0.001,
            recursion_depth: DEFAULT_RECURSION_DEPTH,
            normal_mode: NormalMode::Interpolated,

            fixed_dt: SIM_DT,
            seed: 0x5EED,

            terrain: TerrainSettings::default(),
            spawners: vec![SpawnerSettings::RectangularPrism {
                position: Range3::new(Vec3::new(-8.0, 20.0, -8.0), Vec3::new(8.0, 24.0, 8.0)),
                velocity: Range3::new(Vec3::new(-1.0, -2.0, -1.0), Vec3::new(1.0, 0.0, 1.0)),
                time_to_live: 12.0,
                initial_count: 500,
                per_tick_count: 20,
            }],
        }
    }
}

impl Settings {
    /// Create settings from a quality preset
    pub fn from_preset(preset: QualityPreset) -> Self {
        Self {
            capacity: preset.max_particles(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let settings = Self::from_json(&json)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Seed for the spawner at `index`, derived from the run seed
    pub fn spawner_seed(&self, index: usize) -> u64 {
        self.seed
            .wrapping_add(1)
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(index as u64)
    }

    /// Replace invalid values with safe defaults; returns how many fields were corrected
    pub fn sanitize(&mut self) -> usize {
        let mut corrected = 0;

        if self.capacity == 0 || self.capacity > MAX_CAPACITY {
            log::warn!(
                "capacity set to invalid value {}, reset to {}",
                self.capacity,
                MAX_CAPACITY
            );
            self.capacity = MAX_CAPACITY;
            corrected += 1;
        }

        if !(self.particle_mass.is_finite() && self.particle_mass > 0.0) {
            log::warn!(
                "particle_mass invalid ({}), reset to {}",
                self.particle_mass,
                DEFAULT_PARTICLE_MASS
            );
            self.particle_mass = DEFAULT_PARTICLE_MASS;
            corrected += 1;
        }

        let restitution = if self.terrain_restitution.is_finite() {
            self.terrain_restitution.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if restitution != self.terrain_restitution {
            log::warn!(
                "terrain_restitution {} outside [0, 1], clamped to {}",
                self.terrain_restitution,
                restitution
            );
            self.terrain_restitution = restitution;
            corrected += 1;
        }

        if !(self.absorption_velocity.is_finite() && self.absorption_velocity >= 0.0) {
            log::warn!(
                "absorption_velocity invalid ({}), reset to 0",
                self.absorption_velocity
            );
            self.absorption_velocity = 0.0;
            corrected += 1;
        }

        if !self.absorption_height_modifier.is_finite() {
            log::warn!("absorption_height_modifier is not finite, reset to 0");
            self.absorption_height_modifier = 0.0;
            corrected += 1;
        }

        let depth = self.recursion_depth.clamp(1, MAX_RECURSION_DEPTH);
        if depth != self.recursion_depth {
            log::warn!(
                "recursion_depth {} outside [1, {}], clamped to {}",
                self.recursion_depth,
                MAX_RECURSION_DEPTH,
                depth
            );
            self.recursion_depth = depth;
            corrected += 1;
        }

        if !(self.fixed_dt.is_finite() && self.fixed_dt > 0.0) {
            log::warn!("fixed_dt invalid ({}), reset to {}", self.fixed_dt, SIM_DT);
            self.fixed_dt = SIM_DT;
            corrected += 1;
        }

        if !self.force_range.is_ordered() {
            log::warn!("force_range min exceeds max on some axis, reordered");
            self.force_range = self.force_range.ordered();
            corrected += 1;
        }

        if !(self.base_acceleration.is_finite() && self.delta_acceleration.is_finite()) {
            log::warn!("acceleration settings are not finite, reset to defaults");
            let defaults = Self::default();
            self.base_acceleration = defaults.base_acceleration;
            self.delta_acceleration = defaults.delta_acceleration;
            corrected += 1;
        }

        corrected
    }

    /// Sanitized copy
    pub fn sanitized(mut self) -> Self {
        self.sanitize();
        self
    }
}
