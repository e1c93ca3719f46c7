//! Deterministic particle simulation
//!
//! All simulation logic lives here. This module must stay deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (active list, last to first)
//! - No rendering or platform dependencies

pub mod collision;
pub mod integrator;
pub mod spawner;
pub mod state;
pub mod store;
pub mod terrain;
pub mod tick;
pub mod triangle;

pub use collision::{CollisionOutcome, CollisionParams, LossReason, Resolution, resolve};
pub use integrator::{GlobalAcceleration, advance, particle_acceleration};
pub use spawner::{ParticleDescriptor, PointSpawner, Range3, RectangularPrismSpawner, Spawner};
pub use state::{SimPhase, SimState, SimStats};
pub use store::{ParticleMut, ParticleStore, Visit};
pub use terrain::{CellTriangle, Corner, Heightfield, TerrainError, TerrainHit};
pub use tick::{TickInput, TickReport, tick};
pub use triangle::{Triangle, Weights, reflect, sanitize_weights};
