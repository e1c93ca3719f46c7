//! CPU-side render buffers
//!
//! The simulation never draws. These buffers mirror the particle store and the
//! heightfield in GPU-ready layouts so a renderer can upload them as-is.

pub mod shapes;
pub mod vertex;

pub use vertex::{PointVertex, TerrainVertex};

use crate::sim::store::ParticleStore;
use crate::sim::terrain::Heightfield;

/// Particle positions indexed by store slot, plus the active slot index list
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    vertices: Vec<PointVertex>,
    indices: Vec<u32>,
    /// Bumped every time the index list is rebuilt
    index_generation: u64,
}

impl PointCloud {
    pub fn new(capacity: usize) -> Self {
        Self {
            vertices: vec![PointVertex::default(); capacity],
            indices: Vec::with_capacity(capacity),
            index_generation: 0,
        }
    }

    /// Copy positions from `store`; rebuild indices only when they changed
    ///
    /// Returns true when the index list was rebuilt.
    pub fn sync(&mut self, store: &ParticleStore, indices_modified: bool) -> bool {
        if self.vertices.len() != store.capacity() {
            self.vertices.resize(store.capacity(), PointVertex::default());
        }
        for (v, p) in self.vertices.iter_mut().zip(store.positions()) {
            *v = PointVertex::new(*p);
        }

        if !indices_modified {
            return false;
        }
        self.indices.clear();
        self.indices.extend_from_slice(store.active_indices());
        self.index_generation += 1;
        true
    }

    pub fn vertices(&self) -> &[PointVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn index_generation(&self) -> u64 {
        self.index_generation
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Heightfield triangle mesh; topology is fixed, vertices follow height edits
#[derive(Debug, Clone)]
pub struct TerrainMesh {
    vertices: Vec<TerrainVertex>,
    indices: Vec<u32>,
}

impl TerrainMesh {
    pub fn new(terrain: &Heightfield) -> Self {
        let mut vertices = Vec::with_capacity(terrain.heights().len());
        shapes::terrain_vertices(terrain, &mut vertices);
        Self {
            vertices,
            indices: shapes::terrain_indices(terrain.width(), terrain.depth()),
        }
    }

    /// Rebuild vertices after deposits were flushed
    pub fn refresh(&mut self, terrain: &Heightfield) {
        shapes::terrain_vertices(terrain, &mut self.vertices);
    }

    pub fn vertices(&self) -> &[TerrainVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::spawner::ParticleDescriptor;
    use glam::{UVec2, Vec2, Vec3};

    fn descriptor(x: f32) -> ParticleDescriptor {
        ParticleDescriptor {
            position: Vec3::new(x, 1.0, 0.0),
            velocity: Vec3::ZERO,
            time_to_live: 1.0,
        }
    }

    #[test]
    fn test_point_cloud_sync() {
        let mut store = ParticleStore::new(4);
        store.insert(&descriptor(1.0), 0.02, Vec3::ZERO);
        store.insert(&descriptor(2.0), 0.02, Vec3::ZERO);

        let mut cloud = PointCloud::new(4);
        assert!(cloud.sync(&store, store.is_modified()));
        assert_eq!(cloud.indices(), &[0, 1]);
        assert_eq!(cloud.vertices()[1].position, [2.0, 1.0, 0.0]);
        assert_eq!(cloud.vertex_bytes().len(), 4 * 12);
        assert_eq!(cloud.index_bytes().len(), 2 * 4);
        assert_eq!(cloud.index_generation(), 1);

        // Positions follow, indices stay until told otherwise
        store.remove_at(0);
        assert!(!cloud.sync(&store, false));
        assert_eq!(cloud.indices(), &[0, 1]);
        assert!(cloud.sync(&store, true));
        assert_eq!(cloud.indices(), &[1]);
        assert_eq!(cloud.index_generation(), 2);
    }

    #[test]
    fn test_terrain_mesh_refresh_after_flush() {
        let mut t = Heightfield::flat(3, 3, Vec2::ONE, Vec3::ZERO, 0.0).unwrap();
        let mut mesh = TerrainMesh::new(&t);
        assert_eq!(mesh.vertices().len(), 9);
        assert_eq!(mesh.indices().len(), 24);
        assert_eq!(mesh.index_bytes().len(), 24 * 4);

        t.deposit_height(UVec2::ZERO, [0.0, 0.0, 0.0, 1.0]).unwrap();
        t.flush_deferred();
        mesh.refresh(&t);
        assert_eq!(mesh.vertices()[4].position, [1.0, 1.0, 1.0]);
        assert_eq!(mesh.vertex_bytes().len(), 9 * 24);
    }
}
