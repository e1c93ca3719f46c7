//! Triangle geometry for terrain collision
//!
//! Ray intersection, barycentric weights and restitution-scaled reflection.

use glam::Vec3;

use crate::consts::BARYCENTRIC_TOLERANCE;

/// Determinant magnitude below which a ray is considered parallel to a triangle
const PARALLEL_EPSILON: f32 = 1e-8;
/// Slack on the barycentric bounds so rays through a shared edge hit one side
const EDGE_EPSILON: f32 = 1e-6;

/// A triangle in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl Triangle {
    pub const fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    /// Unit face normal, oriented to point up (+y)
    pub fn upward_normal(&self) -> Vec3 {
        let n = (self.b - self.a).cross(self.c - self.a).normalize_or_zero();
        if n.y < 0.0 { -n } else { n }
    }

    /// Intersect a ray with this triangle (Möller–Trumbore)
    ///
    /// `direction` need not be normalized; the returned `t` is in units of
    /// `direction`, so the hit point is `origin + direction * t`.
    /// Hits behind the origin (t <= 0) are rejected.
    pub fn intersect_ray(&self, origin: Vec3, direction: Vec3) -> Option<f32> {
        let e1 = self.b - self.a;
        let e2 = self.c - self.a;

        let p = direction.cross(e2);
        let det = e1.dot(p);
        if det.abs() < PARALLEL_EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;

        let to_origin = origin - self.a;
        let u = to_origin.dot(p) * inv_det;
        if !(-EDGE_EPSILON..=1.0 + EDGE_EPSILON).contains(&u) {
            return None;
        }

        let q = to_origin.cross(e1);
        let v = direction.dot(q) * inv_det;
        if v < -EDGE_EPSILON || u + v > 1.0 + EDGE_EPSILON {
            return None;
        }

        let t = e2.dot(q) * inv_det;
        (t > f32::EPSILON).then_some(t)
    }

    /// Barycentric weights `(wa, wb, wc)` of `p` projected onto this triangle's plane
    pub fn barycentric(&self, p: Vec3) -> Vec3 {
        let v0 = self.b - self.a;
        let v1 = self.c - self.a;
        let v2 = p - self.a;

        let d00 = v0.dot(v0);
        let d01 = v0.dot(v1);
        let d11 = v1.dot(v1);
        let d20 = v2.dot(v0);
        let d21 = v2.dot(v1);
        let denom = d00 * d11 - d01 * d01;
        if denom.abs() <= f32::EPSILON {
            // Degenerate triangle: put everything on the first vertex
            return Vec3::X;
        }

        let v = (d11 * d20 - d01 * d21) / denom;
        let w = (d00 * d21 - d01 * d20) / denom;
        Vec3::new(1.0 - v - w, v, w)
    }
}

/// Barycentric weights after validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    /// Non-negative weights summing to 1
    pub values: Vec3,
    /// True when the raw weights had a component below `-BARYCENTRIC_TOLERANCE`
    pub corrected: bool,
}

/// Clamp negative weights to zero and renormalize so they sum to 1
pub fn sanitize_weights(raw: Vec3) -> Weights {
    let corrected = raw.min_element() < -BARYCENTRIC_TOLERANCE || !raw.is_finite();
    let clamped = if raw.is_finite() { raw.max(Vec3::ZERO) } else { Vec3::ZERO };
    let sum = clamped.element_sum();
    let values = if sum > f32::EPSILON {
        clamped / sum
    } else {
        Vec3::splat(1.0 / 3.0)
    };
    Weights { values, corrected }
}

/// Reflect a velocity off a surface with restitution `r`
///
/// The normal component is scaled by `-r`; the tangential component is kept.
#[inline]
pub fn reflect(vel: Vec3, normal: Vec3, restitution: f32) -> Vec3 {
    vel - (1.0 + restitution) * vel.dot(normal) * normal
}
