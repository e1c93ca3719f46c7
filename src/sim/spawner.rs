//! Particle spawners
//!
//! A spawner produces particle descriptors; the simulation decides how many
//! of them fit. Each spawner owns its own seeded RNG so runs are reproducible.

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::lerp3;

/// Initial state of a particle handed to the store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleDescriptor {
    pub position: Vec3,
    /// World units per second
    pub velocity: Vec3,
    /// Seconds until natural expiry
    pub time_to_live: f32,
}

/// Axis-aligned box of vectors, sampled uniformly per component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range3 {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Range3 {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Range3 {
    pub const ZERO: Self = Self {
        min: Vec3::ZERO,
        max: Vec3::ZERO,
    };

    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Degenerate range that always samples `value`
    pub const fn point(value: Vec3) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Same range with `min <= max` on every axis
    pub fn ordered(self) -> Self {
        Self {
            min: self.min.min(self.max),
            max: self.min.max(self.max),
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        let t = Vec3::new(rng.random(), rng.random(), rng.random());
        lerp3(self.min, self.max, t)
    }
}

/// Producer of new particles
pub trait Spawner {
    /// Produce one descriptor
    fn generate_particle(&mut self) -> ParticleDescriptor;

    /// Produce `n` descriptors
    fn generate_batch(&mut self, n: usize) -> Vec<ParticleDescriptor> {
        (0..n).map(|_| self.generate_particle()).collect()
    }

    /// Append `n` descriptors to `out` (lets the caller reuse a buffer)
    fn fill_batch(&mut self, n: usize, out: &mut Vec<ParticleDescriptor>) {
        for _ in 0..n {
            out.push(self.generate_particle());
        }
    }

    /// Descriptors drained once when the simulation starts
    fn initial_count(&self) -> usize;

    /// Descriptors offered on every tick after start
    fn per_tick_count(&self) -> usize {
        0
    }
}

/// Spawns particles uniformly inside a box with uniformly random velocities
#[derive(Debug, Clone)]
pub struct RectangularPrismSpawner {
    pub position: Range3,
    pub velocity: Range3,
    pub time_to_live: f32,
    pub initial_count: usize,
    pub per_tick_count: usize,
    rng: Pcg32,
}

impl RectangularPrismSpawner {
    pub fn new(position: Range3, velocity: Range3, time_to_live: f32, seed: u64) -> Self {
        Self {
            position,
            velocity,
            time_to_live,
            initial_count: 0,
            per_tick_count: 0,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    pub fn with_counts(mut self, initial_count: usize, per_tick_count: usize) -> Self {
        self.initial_count = initial_count;
        self.per_tick_count = per_tick_count;
        self
    }
}

impl Spawner for RectangularPrismSpawner {
    fn generate_particle(&mut self) -> ParticleDescriptor {
        let position = self.position.sample(&mut self.rng);
        let velocity = self.velocity.sample(&mut self.rng);
        ParticleDescriptor {
            position,
            velocity,
            time_to_live: self.time_to_live,
        }
    }

    fn initial_count(&self) -> usize {
        self.initial_count
    }

    fn per_tick_count(&self) -> usize {
        self.per_tick_count
    }
}

/// Emits copies of a single descriptor (scripted drops, tests)
#[derive(Debug, Clone)]
pub struct PointSpawner {
    pub descriptor: ParticleDescriptor,
    pub initial_count: usize,
    pub per_tick_count: usize,
}

impl PointSpawner {
    pub fn new(descriptor: ParticleDescriptor, initial_count: usize) -> Self {
        Self {
            descriptor,
            initial_count,
            per_tick_count: 0,
        }
    }

    pub fn with_per_tick(mut self, per_tick_count: usize) -> Self {
        self.per_tick_count = per_tick_count;
        self
    }
}

impl Spawner for PointSpawner {
    fn generate_particle(&mut self) -> ParticleDescriptor {
        self.descriptor
    }

    fn initial_count(&self) -> usize {
        self.initial_count
    }

    fn per_tick_count(&self) -> usize {
        self.per_tick_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prism(seed: u64) -> RectangularPrismSpawner {
        RectangularPrismSpawner::new(
            Range3::new(Vec3::new(-1.0, 4.0, -1.0), Vec3::new(1.0, 6.0, 1.0)),
            Range3::new(Vec3::new(0.0, -3.0, 0.0), Vec3::new(0.5, -1.0, 0.5)),
            8.0,
            seed,
        )
        .with_counts(20, 2)
    }

    #[test]
    fn test_prism_samples_inside_ranges() {
        let mut spawner = prism(7);
        for p in spawner.generate_batch(200) {
            assert!(spawner.position.contains(p.position), "{:?}", p.position);
            assert!(spawner.velocity.contains(p.velocity), "{:?}", p.velocity);
            assert_eq!(p.time_to_live, 8.0);
        }
    }

    #[test]
    fn test_prism_is_deterministic_per_seed() {
        let a = prism(42).generate_batch(10);
        let b = prism(42).generate_batch(10);
        let c = prism(43).generate_batch(10);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_counts_and_fill_batch() {
        let mut spawner = prism(1);
        assert_eq!(spawner.initial_count(), 20);
        assert_eq!(spawner.per_tick_count(), 2);

        let mut out = Vec::new();
        spawner.fill_batch(3, &mut out);
        spawner.fill_batch(2, &mut out);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_point_spawner_repeats_descriptor() {
        let d = ParticleDescriptor {
            position: Vec3::new(0.0, 5.0, 0.0),
            velocity: Vec3::new(0.0, -10.0, 0.0),
            time_to_live: 10.0,
        };
        let mut spawner = PointSpawner::new(d, 1);
        assert_eq!(spawner.generate_batch(3), vec![d; 3]);
        assert_eq!(spawner.per_tick_count(), 0);
        assert_eq!(spawner.with_per_tick(4).per_tick_count(), 4);
    }

    #[test]
    fn test_range_ordering() {
        let r = Range3::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
        assert!(!r.is_ordered());
        let o = r.ordered();
        assert!(o.is_ordered());
        assert_eq!(o.min, Vec3::ZERO);
        assert_eq!(o.max, Vec3::new(1.0, 1.0, 0.0));

        let mut rng = Pcg32::seed_from_u64(3);
        assert_eq!(Range3::point(Vec3::ONE).sample(&mut rng), Vec3::ONE);
    }
}
