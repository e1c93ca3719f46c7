//! Heightfield terrain
//!
//! A regular grid of height samples laid out on the world x/z plane. Heights
//! are stored relative to `origin.y` in row-major order (`gz * width + gx`).
//!
//! Every cell is split into two triangles along the diagonal from corner
//! `(0,0)` to corner `(1,1)`. A point with in-cell coordinates `(u, v)` lies in
//! the lower triangle `(0,0),(1,0),(1,1)` when `u > v` and in the upper triangle
//! `(0,0),(1,1),(0,1)` otherwise.
//!
//! Height edits made during a tick go to a pending buffer and are committed in
//! one pass by [`Heightfield::flush_deferred`].

use glam::{IVec2, UVec2, Vec2, Vec3};
use thiserror::Error;

use super::triangle::Triangle;
use crate::consts::RAY_BACKTRACK;

/// Errors raised by heightfield construction and edits
#[derive(Debug, Error, PartialEq)]
pub enum TerrainError {
    #[error("heightfield needs at least 2x2 samples, got {width}x{depth}")]
    TooSmall { width: u32, depth: u32 },
    #[error("grid spacing must be positive and finite, got {0}")]
    InvalidSpacing(Vec2),
    #[error("expected {expected} height samples, got {got}")]
    ShapeMismatch { expected: usize, got: usize },
    #[error("cell ({x}, {y}) is outside the heightfield")]
    OutOfBounds { x: u32, y: u32 },
}

/// One of the four grid samples bounding a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    C00,
    C10,
    C01,
    C11,
}

impl Corner {
    /// Position in the `[C00, C10, C01, C11]` delta array
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Corner::C00 => 0,
            Corner::C10 => 1,
            Corner::C01 => 2,
            Corner::C11 => 3,
        }
    }

    /// Grid offset from the cell's `C00` sample
    #[inline]
    pub fn offset(self) -> UVec2 {
        match self {
            Corner::C00 => UVec2::new(0, 0),
            Corner::C10 => UVec2::new(1, 0),
            Corner::C01 => UVec2::new(0, 1),
            Corner::C11 => UVec2::new(1, 1),
        }
    }
}

/// A cell triangle together with the grid corners its vertices came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellTriangle {
    pub triangle: Triangle,
    pub corners: [Corner; 3],
}

/// Result of a terrain raycast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainHit {
    pub point: Vec3,
    /// Distance from the ray origin to `point`
    pub distance: f32,
    /// Face normal of the hit triangle (points up)
    pub normal: Vec3,
    pub cell: UVec2,
    pub triangle: CellTriangle,
}

/// Regular heightfield with deferred height edits
#[derive(Debug, Clone)]
pub struct Heightfield {
    origin: Vec3,
    spacing: Vec2,
    width: u32,
    depth: u32,
    heights: Vec<f32>,
    pending: Vec<f32>,
    dirty: bool,
}

impl Heightfield {
    /// Build a heightfield from explicit samples
    pub fn from_heights(
        width: u32,
        depth: u32,
        spacing: Vec2,
        origin: Vec3,
        heights: Vec<f32>,
    ) -> Result<Self, TerrainError> {
        if width < 2 || depth < 2 {
            return Err(TerrainError::TooSmall { width, depth });
        }
        if !(spacing.is_finite() && spacing.x > 0.0 && spacing.y > 0.0) {
            return Err(TerrainError::InvalidSpacing(spacing));
        }
        let expected = width as usize * depth as usize;
        if heights.len() != expected {
            return Err(TerrainError::ShapeMismatch {
                expected,
                got: heights.len(),
            });
        }

        Ok(Self {
            origin,
            spacing,
            width,
            depth,
            heights,
            pending: vec![0.0; expected],
            dirty: false,
        })
    }

    /// Build a heightfield by sampling `f(gx, gz)` at every grid point
    pub fn from_fn<F>(
        width: u32,
        depth: u32,
        spacing: Vec2,
        origin: Vec3,
        f: F,
    ) -> Result<Self, TerrainError>
    where
        F: Fn(u32, u32) -> f32,
    {
        let mut heights = Vec::with_capacity(width as usize * depth as usize);
        for gz in 0..depth {
            for gx in 0..width {
                heights.push(f(gx, gz));
            }
        }
        Self::from_heights(width, depth, spacing, origin, heights)
    }

    /// Build a heightfield with every sample at `height`
    pub fn flat(
        width: u32,
        depth: u32,
        spacing: Vec2,
        origin: Vec3,
        height: f32,
    ) -> Result<Self, TerrainError> {
        Self::from_fn(width, depth, spacing, origin, |_, _| height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn spacing(&self) -> Vec2 {
        self.spacing
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// World-space extent of the grid on x/z
    pub fn size(&self) -> Vec2 {
        Vec2::new(
            (self.width - 1) as f32 * self.spacing.x,
            (self.depth - 1) as f32 * self.spacing.y,
        )
    }

    /// Whether deposits are waiting for [`Self::flush_deferred`]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    fn sample_index(&self, gx: u32, gz: u32) -> usize {
        gz as usize * self.width as usize + gx as usize
    }

    /// Committed height of a grid sample, relative to `origin.y`
    pub fn height(&self, gx: u32, gz: u32) -> Option<f32> {
        (gx < self.width && gz < self.depth).then(|| self.heights[self.sample_index(gx, gz)])
    }

    /// Height with grid indices clamped into range (used for edge differences)
    fn clamped_height(&self, gx: i64, gz: i64) -> f32 {
        let gx = gx.clamp(0, self.width as i64 - 1) as u32;
        let gz = gz.clamp(0, self.depth as i64 - 1) as u32;
        self.heights[self.sample_index(gx, gz)]
    }

    /// World position of a grid sample; indices must be in range
    fn sample_world(&self, gx: u32, gz: u32) -> Vec3 {
        Vec3::new(
            self.origin.x + gx as f32 * self.spacing.x,
            self.origin.y + self.heights[self.sample_index(gx, gz)],
            self.origin.z + gz as f32 * self.spacing.y,
        )
    }

    /// Continuous grid coordinates of a world position
    ///
    /// The integer part selects a cell, the fractional part is the in-cell parameter.
    pub fn world_to_grid(&self, world: Vec3) -> Vec2 {
        Vec2::new(
            (world.x - self.origin.x) / self.spacing.x,
            (world.z - self.origin.z) / self.spacing.y,
        )
    }

    /// World position mapped to `[0, 1]` across the grid (clamped)
    pub fn world_to_normalized(&self, world: Vec3) -> Vec2 {
        let size = self.size();
        Vec2::new(
            crate::inverse_lerp(0.0, size.x, world.x - self.origin.x),
            crate::inverse_lerp(0.0, size.y, world.z - self.origin.z),
        )
    }

    /// Whether a world position lies over the heightfield footprint
    pub fn contains_world(&self, world: Vec3) -> bool {
        self.cell_at(self.world_to_grid(world)).is_some()
    }

    /// Cell index and in-cell `(u, v)` for continuous grid coordinates
    ///
    /// Samples on the far edge belong to the last cell with `u` (or `v`) = 1.
    pub fn cell_at(&self, grid: Vec2) -> Option<(UVec2, Vec2)> {
        let max = Vec2::new((self.width - 1) as f32, (self.depth - 1) as f32);
        if !grid.is_finite() || grid.x < 0.0 || grid.y < 0.0 || grid.x > max.x || grid.y > max.y {
            return None;
        }
        let cell = grid.floor().min(max - Vec2::ONE);
        Some((cell.as_uvec2(), grid - cell))
    }

    /// Bilinear height of a cell at `(u, v)`, relative to `origin.y`
    fn bilinear_height(&self, cell: UVec2, uv: Vec2) -> f32 {
        let [h00, h10, h01, h11] = self.corner_heights(cell);
        let (u, v) = (uv.x, uv.y);
        h00 * (1.0 - u) * (1.0 - v) + h10 * u * (1.0 - v) + h01 * (1.0 - u) * v + h11 * u * v
    }

    fn corner_heights(&self, cell: UVec2) -> [f32; 4] {
        [Corner::C00, Corner::C10, Corner::C01, Corner::C11].map(|corner| {
            let p = cell + corner.offset();
            self.heights[self.sample_index(p.x, p.y)]
        })
    }

    fn normalized_to_cell(&self, nx: f32, ny: f32) -> (UVec2, Vec2) {
        let grid = Vec2::new(
            nx.clamp(0.0, 1.0) * (self.width - 1) as f32,
            ny.clamp(0.0, 1.0) * (self.depth - 1) as f32,
        );
        // Clamped normalized coordinates always land on the grid
        self.cell_at(grid).unwrap_or((UVec2::ZERO, Vec2::ZERO))
    }

    /// Bilinear world-space height at normalized coordinates (clamped to `[0, 1]`)
    pub fn interpolated_height(&self, nx: f32, ny: f32) -> f32 {
        let (cell, uv) = self.normalized_to_cell(nx, ny);
        self.origin.y + self.bilinear_height(cell, uv)
    }

    /// Bilinear blend of sample normals at normalized coordinates (clamped to `[0, 1]`)
    pub fn interpolated_normal(&self, nx: f32, ny: f32) -> Vec3 {
        let (cell, uv) = self.normalized_to_cell(nx, ny);
        let [n00, n10, n01, n11] = [Corner::C00, Corner::C10, Corner::C01, Corner::C11].map(|c| {
            let p = cell + c.offset();
            self.sample_normal(p.x, p.y)
        });
        let (u, v) = (uv.x, uv.y);
        let n = n00 * (1.0 - u) * (1.0 - v) + n10 * u * (1.0 - v) + n01 * (1.0 - u) * v + n11 * u * v;
        n.try_normalize().unwrap_or(Vec3::Y)
    }

    /// Central-difference normal at a grid sample (one-sided at the borders)
    pub fn sample_normal(&self, gx: u32, gz: u32) -> Vec3 {
        let (x, z) = (gx as i64, gz as i64);
        let x0 = (x - 1).max(0);
        let x1 = (x + 1).min(self.width as i64 - 1);
        let z0 = (z - 1).max(0);
        let z1 = (z + 1).min(self.depth as i64 - 1);

        let dhdx = (self.clamped_height(x1, z) - self.clamped_height(x0, z))
            / ((x1 - x0) as f32 * self.spacing.x);
        let dhdz = (self.clamped_height(x, z1) - self.clamped_height(x, z0))
            / ((z1 - z0) as f32 * self.spacing.y);

        Vec3::new(-dhdx, 1.0, -dhdz).normalize()
    }

    /// Bilinear world-space height under a world position, `None` off the grid
    pub fn height_at_world(&self, world: Vec3) -> Option<f32> {
        let (cell, uv) = self.cell_at(self.world_to_grid(world))?;
        Some(self.origin.y + self.bilinear_height(cell, uv))
    }

    /// Height of the triangulated surface under a world position, `None` off the grid
    ///
    /// This is the surface the collision rays test against. It matches the
    /// bilinear height at the samples and along cell edges, but can sit below
    /// or above it inside a cell.
    pub fn surface_height_at_world(&self, world: Vec3) -> Option<f32> {
        let (cell, uv) = self.cell_at(self.world_to_grid(world))?;
        Some(self.origin.y + self.triangulated_height(cell, uv))
    }

    /// Plane height of the landing triangle at `(u, v)`, relative to `origin.y`
    fn triangulated_height(&self, cell: UVec2, uv: Vec2) -> f32 {
        let [h00, h10, h01, h11] = self.corner_heights(cell);
        let (u, v) = (uv.x, uv.y);
        if u > v {
            h00 + u * (h10 - h00) + v * (h11 - h10)
        } else {
            h00 + u * (h11 - h01) + v * (h01 - h00)
        }
    }

    /// Interpolated normal under a world position, `None` off the grid
    pub fn normal_at_world(&self, world: Vec3) -> Option<Vec3> {
        if !self.contains_world(world) {
            return None;
        }
        let n = self.world_to_normalized(world);
        Some(self.interpolated_normal(n.x, n.y))
    }

    /// Both triangles of a cell: `[lower, upper]`
    ///
    /// The caller must pass a cell inside the grid (as returned by [`Self::cell_at`]).
    pub fn cell_triangles(&self, cell: UVec2) -> [CellTriangle; 2] {
        let corner = |c: Corner| {
            let p = cell + c.offset();
            self.sample_world(p.x, p.y)
        };
        let (p00, p10, p01, p11) = (
            corner(Corner::C00),
            corner(Corner::C10),
            corner(Corner::C01),
            corner(Corner::C11),
        );

        [
            CellTriangle {
                triangle: Triangle::new(p00, p10, p11),
                corners: [Corner::C00, Corner::C10, Corner::C11],
            },
            CellTriangle {
                triangle: Triangle::new(p00, p11, p01),
                corners: [Corner::C00, Corner::C11, Corner::C01],
            },
        ]
    }

    /// Triangle of `cell` containing in-cell coordinates `uv`
    pub fn landing_triangle(&self, cell: UVec2, uv: Vec2) -> CellTriangle {
        let [lower, upper] = self.cell_triangles(cell);
        if uv.x > uv.y { lower } else { upper }
    }

    /// Cast a ray segment of length `max_distance` against the terrain triangles
    ///
    /// Cells are visited in order along the segment, so the first cell that
    /// reports a hit holds the nearest one. The cell under the segment's end
    /// point (the landing cell) is always tested. The segment starts
    /// [`RAY_BACKTRACK`] behind `origin`, so an origin lying on a triangle still
    /// hits it at distance 0. Returns `None` when the end point is off the grid,
    /// the direction is degenerate, or nothing is hit.
    pub fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<TerrainHit> {
        let dir = direction.try_normalize()?;
        if !(max_distance.is_finite() && max_distance > 0.0) {
            return None;
        }
        let end = origin + dir * max_distance;
        let (landing, _) = self.cell_at(self.world_to_grid(end))?;

        let start = origin - dir * RAY_BACKTRACK;
        let reach = max_distance + RAY_BACKTRACK;
        let mut hit = None;
        let mut landing_seen = false;
        self.walk_cells(self.world_to_grid(start), self.world_to_grid(end), |cell| {
            landing_seen |= cell == landing;
            hit = self.cell_hit(cell, start, dir, reach);
            hit.is_some()
        });

        if hit.is_none() && !landing_seen {
            hit = self.cell_hit(landing, start, dir, reach);
        }
        hit.map(|h| TerrainHit {
            distance: (h.distance - RAY_BACKTRACK).max(0.0),
            ..h
        })
    }

    /// Nearest hit against both triangles of one cell
    fn cell_hit(&self, cell: UVec2, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<TerrainHit> {
        self.cell_triangles(cell)
            .into_iter()
            .filter_map(|tri| {
                let t = tri.triangle.intersect_ray(origin, dir)?;
                (t <= max_distance).then_some((t, tri))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(t, tri)| TerrainHit {
                point: origin + dir * t,
                distance: t,
                normal: tri.triangle.upward_normal(),
                cell,
                triangle: tri,
            })
    }

    /// Visit the in-range cells crossed by the grid-space segment `from -> to`
    ///
    /// Grid traversal in the style of Amanatides and Woo. Stops early when
    /// `visit` returns true.
    fn walk_cells<F>(&self, from: Vec2, to: Vec2, mut visit: F)
    where
        F: FnMut(UVec2) -> bool,
    {
        if !(from.is_finite() && to.is_finite()) {
            return;
        }
        let delta = to - from;
        let step = IVec2::new(axis_step(delta.x), axis_step(delta.y));
        let mut cell = from.floor().as_ivec2();
        let end = to.floor().as_ivec2();

        let first_boundary = |c: i32, s: i32| if s > 0 { (c + 1) as f32 } else { c as f32 };
        let mut t_max = Vec2::new(
            if step.x != 0 { (first_boundary(cell.x, step.x) - from.x) / delta.x } else { f32::INFINITY },
            if step.y != 0 { (first_boundary(cell.y, step.y) - from.y) / delta.y } else { f32::INFINITY },
        );
        let t_delta = Vec2::new(
            if step.x != 0 { 1.0 / delta.x.abs() } else { f32::INFINITY },
            if step.y != 0 { 1.0 / delta.y.abs() } else { f32::INFINITY },
        );

        let last = IVec2::new(self.width as i32 - 2, self.depth as i32 - 2);
        let span = (end - cell).abs();
        let steps = (span.x as i64 + span.y as i64 + 1).min(2 * (self.width as i64 + self.depth as i64));

        for _ in 0..steps {
            let in_range = cell.cmpge(IVec2::ZERO).all() && cell.cmple(last).all();
            if in_range && visit(cell.as_uvec2()) {
                return;
            }
            if cell == end {
                return;
            }
            if t_max.x < t_max.y {
                cell.x += step.x;
                t_max.x += t_delta.x;
            } else {
                cell.y += step.y;
                t_max.y += t_delta.y;
            }
        }
    }

    /// Queue height deltas for the four corners of a cell (`[C00, C10, C01, C11]`)
    ///
    /// Nothing is queued when the cell is outside the grid.
    pub fn deposit_height(&mut self, cell: UVec2, deltas: [f32; 4]) -> Result<(), TerrainError> {
        if cell.x >= self.width - 1 || cell.y >= self.depth - 1 {
            return Err(TerrainError::OutOfBounds {
                x: cell.x,
                y: cell.y,
            });
        }
        for corner in [Corner::C00, Corner::C10, Corner::C01, Corner::C11] {
            let p = cell + corner.offset();
            let i = self.sample_index(p.x, p.y);
            self.pending[i] += deltas[corner.index()];
        }
        self.dirty = true;
        Ok(())
    }

    /// Commit pending deposits to the live heights
    ///
    /// Returns true when there was something to commit.
    pub fn flush_deferred(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        for (h, p) in self.heights.iter_mut().zip(self.pending.iter_mut()) {
            *h += *p;
            *p = 0.0;
        }
        self.dirty = false;
        true
    }

    /// Sum of all committed heights (relative to `origin.y`)
    pub fn total_height(&self) -> f32 {
        self.heights.iter().sum()
    }

    /// Sum of all queued deltas
    pub fn pending_total(&self) -> f32 {
        self.pending.iter().sum()
    }

    /// Committed heights, row-major
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    /// Copy of the committed heights for persistence
    pub fn export_heights(&self) -> Vec<f32> {
        self.heights.clone()
    }

    /// Replace all committed heights; pending edits are discarded
    pub fn import_heights(&mut self, heights: &[f32]) -> Result<(), TerrainError> {
        if heights.len() != self.heights.len() {
            return Err(TerrainError::ShapeMismatch {
                expected: self.heights.len(),
                got: heights.len(),
            });
        }
        self.heights.copy_from_slice(heights);
        self.pending.fill(0.0);
        self.dirty = false;
        Ok(())
    }
}

#[inline]
fn axis_step(d: f32) -> i32 {
    if d > 0.0 {
        1
    } else if d < 0.0 {
        -1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(height: f32) -> Heightfield {
        Heightfield::flat(5, 5, Vec2::ONE, Vec3::ZERO, height).unwrap()
    }

    /// Plane h = x (rises along +x by one unit per sample)
    fn ramp() -> Heightfield {
        Heightfield::from_fn(5, 5, Vec2::ONE, Vec3::ZERO, |gx, _| gx as f32).unwrap()
    }

    #[test]
    fn test_construction_errors() {
        assert_eq!(
            Heightfield::flat(1, 4, Vec2::ONE, Vec3::ZERO, 0.0).unwrap_err(),
            TerrainError::TooSmall { width: 1, depth: 4 }
        );
        assert!(matches!(
            Heightfield::flat(4, 4, Vec2::new(0.0, 1.0), Vec3::ZERO, 0.0),
            Err(TerrainError::InvalidSpacing(_))
        ));
        assert_eq!(
            Heightfield::from_heights(2, 2, Vec2::ONE, Vec3::ZERO, vec![0.0; 3]).unwrap_err(),
            TerrainError::ShapeMismatch { expected: 4, got: 3 }
        );
    }

    #[test]
    fn test_world_to_grid_and_cell() {
        let t = Heightfield::flat(5, 5, Vec2::new(2.0, 0.5), Vec3::new(-4.0, 0.0, 1.0), 0.0)
            .unwrap();
        let g = t.world_to_grid(Vec3::new(-1.0, 7.0, 1.25));
        assert!((g - Vec2::new(1.5, 0.5)).length() < 1e-6);

        let (cell, uv) = t.cell_at(g).unwrap();
        assert_eq!(cell, UVec2::new(1, 0));
        assert!((uv - Vec2::new(0.5, 0.5)).length() < 1e-6);

        // Far edge belongs to the last cell
        let (cell, uv) = t.cell_at(Vec2::new(4.0, 4.0)).unwrap();
        assert_eq!(cell, UVec2::new(3, 3));
        assert_eq!(uv, Vec2::ONE);

        assert!(t.cell_at(Vec2::new(-0.1, 1.0)).is_none());
        assert!(t.cell_at(Vec2::new(1.0, 4.01)).is_none());
    }

    #[test]
    fn test_interpolated_height_bilinear() {
        let t = Heightfield::from_heights(
            2,
            2,
            Vec2::ONE,
            Vec3::new(0.0, 10.0, 0.0),
            vec![0.0, 1.0, 2.0, 3.0],
        )
        .unwrap();
        assert!((t.interpolated_height(0.0, 0.0) - 10.0).abs() < 1e-6);
        assert!((t.interpolated_height(1.0, 1.0) - 13.0).abs() < 1e-6);
        assert!((t.interpolated_height(0.5, 0.5) - 11.5).abs() < 1e-6);
        // Clamped outside [0, 1]
        assert!((t.interpolated_height(2.0, -1.0) - 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_interpolated_normal() {
        assert!((flat(3.0).interpolated_normal(0.3, 0.6) - Vec3::Y).length() < 1e-6);

        let n = ramp().interpolated_normal(0.5, 0.5);
        let expected = Vec3::new(-1.0, 1.0, 0.0).normalize();
        assert!((n - expected).length() < 1e-5);
    }

    #[test]
    fn test_height_at_world_off_grid() {
        let t = flat(2.0);
        assert_eq!(t.height_at_world(Vec3::new(1.0, 0.0, 1.0)), Some(2.0));
        assert_eq!(t.height_at_world(Vec3::new(-0.5, 0.0, 1.0)), None);
        assert_eq!(t.height_at_world(Vec3::new(1.0, 0.0, 4.5)), None);
    }

    #[test]
    fn test_landing_triangle_diagonal_rule() {
        let t = flat(0.0);
        let cell = UVec2::new(1, 1);

        let lower = t.landing_triangle(cell, Vec2::new(0.7, 0.2));
        assert_eq!(lower.corners, [Corner::C00, Corner::C10, Corner::C11]);

        let upper = t.landing_triangle(cell, Vec2::new(0.2, 0.7));
        assert_eq!(upper.corners, [Corner::C00, Corner::C11, Corner::C01]);

        // Ties go to the upper triangle
        let tie = t.landing_triangle(cell, Vec2::new(0.5, 0.5));
        assert_eq!(tie.corners, upper.corners);
    }

    #[test]
    fn test_cell_triangles_share_diagonal() {
        let t = ramp();
        let [lower, upper] = t.cell_triangles(UVec2::new(2, 1));
        assert_eq!(lower.triangle.a, upper.triangle.a);
        assert_eq!(lower.triangle.c, upper.triangle.b);
        assert_eq!(lower.triangle.a, Vec3::new(2.0, 2.0, 1.0));
        assert_eq!(lower.triangle.c, Vec3::new(3.0, 3.0, 2.0));
    }

    #[test]
    fn test_raycast_hits_flat_terrain() {
        let t = flat(1.0);
        let hit = t
            .raycast(Vec3::new(2.3, 3.0, 1.6), Vec3::NEG_Y, 4.0)
            .expect("should hit");
        assert!((hit.point - Vec3::new(2.3, 1.0, 1.6)).length() < 1e-5);
        assert!((hit.distance - 2.0).abs() < 1e-5);
        assert!((hit.normal - Vec3::Y).length() < 1e-6);
        assert_eq!(hit.cell, UVec2::new(2, 1));
    }

    #[test]
    fn test_raycast_respects_max_distance() {
        let t = flat(1.0);
        assert!(t.raycast(Vec3::new(2.3, 3.0, 1.6), Vec3::NEG_Y, 1.5).is_none());
        assert!(t.raycast(Vec3::new(2.3, 3.0, 1.6), Vec3::ZERO, 5.0).is_none());
    }

    #[test]
    fn test_raycast_on_slope_returns_face_normal() {
        let t = ramp();
        let hit = t
            .raycast(Vec3::new(1.5, 5.0, 1.2), Vec3::NEG_Y, 10.0)
            .expect("should hit");
        assert!((hit.point.y - 1.5).abs() < 1e-5);
        let expected = Vec3::new(-1.0, 1.0, 0.0).normalize();
        assert!((hit.normal - expected).length() < 1e-5);
    }

    #[test]
    fn test_raycast_finds_wall_before_landing_cell() {
        // V-shaped valley along z with its floor at x = 2
        let t = Heightfield::from_fn(5, 4, Vec2::ONE, Vec3::ZERO, |gx, _| {
            4.0 * (gx as f32 - 2.0).abs()
        })
        .unwrap();
        let origin = Vec3::new(1.5, 2.5, 1.5);
        let step = Vec3::new(2.0, -0.2, 0.0);

        let hit = t.raycast(origin, step, step.length()).expect("should hit the wall");
        assert_eq!(hit.cell, UVec2::new(2, 1));
        assert!((hit.point.x - 10.65 / 4.1).abs() < 1e-3, "{:?}", hit.point);
        assert!(hit.distance < step.length());
        let expected = Vec3::new(-4.0, 1.0, 0.0).normalize();
        assert!((hit.normal - expected).length() < 1e-5);
    }

    #[test]
    fn test_surface_height_follows_triangles() {
        // Saddle: the diagonal corners are low, the other two high
        let t = Heightfield::from_heights(2, 2, Vec2::ONE, Vec3::ZERO, vec![0.0, 1.0, 1.0, 0.0]).unwrap();
        let centre = Vec3::new(0.5, 0.0, 0.5);
        assert!((t.height_at_world(centre).unwrap() - 0.5).abs() < 1e-6);
        assert!(t.surface_height_at_world(centre).unwrap().abs() < 1e-6);

        // Upper triangle (u < v): plane through (0,0,0), (1,0,1), (0,1,1)
        let p = Vec3::new(0.3, 0.0, 0.6);
        assert!((t.surface_height_at_world(p).unwrap() - 0.3).abs() < 1e-6);
        assert!((t.height_at_world(p).unwrap() - 0.54).abs() < 1e-6);

        // Samples agree with the bilinear surface
        let corner = Vec3::new(1.0, 0.0, 0.0);
        assert_eq!(t.surface_height_at_world(corner), t.height_at_world(corner));
        assert_eq!(t.surface_height_at_world(Vec3::new(1.5, 0.0, 0.5)), None);
    }

    #[test]
    fn test_raycast_from_resting_origin_hits_at_zero() {
        let t = flat(0.0);
        let hit = t
            .raycast(Vec3::new(2.3, 0.0, 1.6), Vec3::NEG_Y, 0.5)
            .expect("a particle resting on the surface should hit it");
        assert!(hit.distance < 1e-6);
        assert!(hit.point.y.abs() < 1e-6);

        // Grid sample shared by several cells
        let hit = t.raycast(Vec3::new(2.0, 0.0, 2.0), Vec3::NEG_Y, 1.0).expect("should hit");
        assert!(hit.distance < 1e-6);
    }

    #[test]
    fn test_raycast_landing_off_grid() {
        let t = flat(0.0);
        assert!(t.raycast(Vec3::new(3.5, 1.0, 2.0), Vec3::new(2.0, -1.0, 0.0), 3.0).is_none());
    }

    #[test]
    fn test_deposit_is_deferred_until_flush() {
        let mut t = flat(0.0);
        t.deposit_height(UVec2::new(1, 1), [0.1, 0.2, 0.3, 0.4]).unwrap();
        assert!(t.is_dirty());
        assert_eq!(t.height(1, 1), Some(0.0));
        assert!((t.pending_total() - 1.0).abs() < 1e-5);

        assert!(t.flush_deferred());
        assert!(!t.is_dirty());
        assert_eq!(t.height(1, 1), Some(0.1));
        assert_eq!(t.height(2, 1), Some(0.2));
        assert_eq!(t.height(1, 2), Some(0.3));
        assert_eq!(t.height(2, 2), Some(0.4));
        assert_eq!(t.pending_total(), 0.0);

        // Nothing left to commit
        assert!(!t.flush_deferred());
    }

    #[test]
    fn test_deposit_out_of_bounds_rejected() {
        let mut t = flat(0.0);
        let err = t.deposit_height(UVec2::new(4, 0), [1.0; 4]).unwrap_err();
        assert_eq!(err, TerrainError::OutOfBounds { x: 4, y: 0 });

        let err = t.deposit_height(UVec2::new(u32::MAX, 0), [1.0; 4]).unwrap_err();
        assert_eq!(err, TerrainError::OutOfBounds { x: u32::MAX, y: 0 });
        assert!(t.deposit_height(UVec2::new(0, u32::MAX), [1.0; 4]).is_err());
        assert!(t.deposit_height(UVec2::MAX, [1.0; 4]).is_err());
        assert!(!t.is_dirty());
        assert_eq!(t.pending_total(), 0.0);
    }

    #[test]
    fn test_import_export_heights() {
        let mut t = flat(0.0);
        let mut heights = t.export_heights();
        heights[7] = 2.5;
        t.deposit_height(UVec2::ZERO, [1.0; 4]).unwrap();

        t.import_heights(&heights).unwrap();
        assert_eq!(t.height(2, 1), Some(2.5));
        assert!(!t.is_dirty());
        assert_eq!(t.pending_total(), 0.0);

        assert!(t.import_heights(&[0.0; 3]).is_err());
    }
}
