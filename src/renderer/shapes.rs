//! Mesh generation for the heightfield

use super::vertex::TerrainVertex;
use crate::sim::terrain::Heightfield;

/// Write one vertex per heightfield sample into `out`, row-major
///
/// Normals are the per-sample central-difference normals.
pub fn terrain_vertices(terrain: &Heightfield, out: &mut Vec<TerrainVertex>) {
    out.clear();
    let origin = terrain.origin();
    let spacing = terrain.spacing();
    let heights = terrain.heights();

    for gz in 0..terrain.depth() {
        for gx in 0..terrain.width() {
            let i = (gz * terrain.width() + gx) as usize;
            let position = origin
                + glam::Vec3::new(gx as f32 * spacing.x, heights[i], gz as f32 * spacing.y);
            out.push(TerrainVertex::new(position, terrain.sample_normal(gx, gz)));
        }
    }
}

/// Triangle list for a `width` x `depth` grid
///
/// Each cell emits its lower triangle `(C00, C10, C11)` then its upper
/// triangle `(C00, C11, C01)`, the same split the collision code uses.
pub fn terrain_indices(width: u32, depth: u32) -> Vec<u32> {
    if width < 2 || depth < 2 {
        return Vec::new();
    }
    let mut indices = Vec::with_capacity(((width - 1) * (depth - 1) * 6) as usize);
    for gz in 0..depth - 1 {
        for gx in 0..width - 1 {
            let c00 = gz * width + gx;
            let c10 = c00 + 1;
            let c01 = c00 + width;
            let c11 = c01 + 1;
            indices.extend_from_slice(&[c00, c10, c11, c00, c11, c01]);
        }
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    #[test]
    fn test_terrain_indices_follow_cell_split() {
        let indices = terrain_indices(3, 3);
        assert_eq!(indices.len(), 24);
        assert_eq!(&indices[..6], &[0, 1, 4, 0, 4, 3]);
        assert!(indices.iter().all(|&i| i < 9));
        assert!(terrain_indices(1, 5).is_empty());
    }

    #[test]
    fn test_terrain_vertices_positions() {
        let t = Heightfield::from_fn(3, 2, Vec2::new(2.0, 1.0), Vec3::new(-1.0, 5.0, 0.0), |gx, gz| {
            (gx + gz) as f32
        })
        .unwrap();
        let mut out = Vec::new();
        terrain_vertices(&t, &mut out);
        assert_eq!(out.len(), 6);
        assert_eq!(out[0].position, [-1.0, 5.0, 0.0]);
        assert_eq!(out[5].position, [3.0, 8.0, 1.0]);
        assert!(out.iter().all(|v| v.normal[1] > 0.0));
    }
}
