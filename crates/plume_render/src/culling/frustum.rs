//! Frustum planes for view-dependent particle culling.
//!
//! Planes are extracted from the view-projection matrix and instances are
//! tested as spheres around their position.

use bytemuck::{Pod, Zeroable};

/// Most planes a single cull request evaluates.
pub const MAX_CULL_PLANES: usize = 6;

/// A plane in 3D space (Ax + By + Cz + D = 0).
///
/// The normal points into the kept half-space.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Plane {
    /// Normal X component.
    pub a: f32,
    /// Normal Y component.
    pub b: f32,
    /// Normal Z component.
    pub c: f32,
    /// Distance from origin.
    pub d: f32,
}

impl Plane {
    /// Creates a new plane.
    #[must_use]
    pub const fn new(a: f32, b: f32, c: f32, d: f32) -> Self {
        Self { a, b, c, d }
    }

    /// Builds a plane through `point` whose normal faces `normal`.
    #[must_use]
    pub fn from_point_normal(point: [f32; 3], normal: [f32; 3]) -> Self {
        let d = -(normal[0] * point[0] + normal[1] * point[1] + normal[2] * point[2]);
        Self::new(normal[0], normal[1], normal[2], d).normalized()
    }

    /// Normalizes the plane.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = (self.a * self.a + self.b * self.b + self.c * self.c).sqrt();
        if len > 0.0 {
            Self {
                a: self.a / len,
                b: self.b / len,
                c: self.c / len,
                d: self.d / len,
            }
        } else {
            self
        }
    }

    /// Returns the signed distance from a point to the plane.
    #[inline]
    #[must_use]
    pub fn distance_to_point(&self, p: [f32; 3]) -> f32 {
        self.a * p[0] + self.b * p[1] + self.c * p[2] + self.d
    }

    /// Converts to array format.
    #[must_use]
    pub const fn as_array(&self) -> [f32; 4] {
        [self.a, self.b, self.c, self.d]
    }
}

/// Up to six half-planes an instance must lie inside.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    planes: [Plane; MAX_CULL_PLANES],
    len: usize,
}

impl Frustum {
    /// Left plane index.
    pub const LEFT: usize = 0;
    /// Right plane index.
    pub const RIGHT: usize = 1;
    /// Bottom plane index.
    pub const BOTTOM: usize = 2;
    /// Top plane index.
    pub const TOP: usize = 3;
    /// Near plane index.
    pub const NEAR: usize = 4;
    /// Far plane index.
    pub const FAR: usize = 5;

    /// Builds a frustum from an explicit plane list.
    ///
    /// Planes past the sixth are ignored.
    #[must_use]
    pub fn from_planes(planes: &[Plane]) -> Self {
        let len = planes.len().min(MAX_CULL_PLANES);
        if planes.len() > MAX_CULL_PLANES {
            tracing::warn!(
                given = planes.len(),
                kept = MAX_CULL_PLANES,
                "too many cull planes, extra planes ignored"
            );
        }
        let mut out = [Plane::default(); MAX_CULL_PLANES];
        out[..len].copy_from_slice(&planes[..len]);
        Self { planes: out, len }
    }

    /// Extracts frustum planes from a view-projection matrix.
    ///
    /// The matrix is column-major (`m[column][row]`). Clip depth spans
    /// `[-w, w]`.
    #[must_use]
    pub fn from_view_projection(m: &[[f32; 4]; 4]) -> Self {
        let row = |r: usize| [m[0][r], m[1][r], m[2][r], m[3][r]];
        let w = row(3);
        let combine = |other: [f32; 4], sign: f32| {
            Plane::new(
                w[0] + sign * other[0],
                w[1] + sign * other[1],
                w[2] + sign * other[2],
                w[3] + sign * other[3],
            )
            .normalized()
        };

        let mut planes = [Plane::default(); MAX_CULL_PLANES];
        planes[Self::LEFT] = combine(row(0), 1.0);
        planes[Self::RIGHT] = combine(row(0), -1.0);
        planes[Self::BOTTOM] = combine(row(1), 1.0);
        planes[Self::TOP] = combine(row(1), -1.0);
        planes[Self::NEAR] = combine(row(2), 1.0);
        planes[Self::FAR] = combine(row(2), -1.0);

        Self {
            planes,
            len: MAX_CULL_PLANES,
        }
    }

    /// Active planes.
    #[must_use]
    pub fn planes(&self) -> &[Plane] {
        &self.planes[..self.len]
    }

    /// True when no planes are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Tests a sphere against every active plane.
    ///
    /// A zero radius reduces to a point-in-half-space test.
    #[inline]
    #[must_use]
    pub fn contains_sphere(&self, center: [f32; 3], radius: f32) -> bool {
        self.planes()
            .iter()
            .all(|plane| plane.distance_to_point(center) >= -radius)
    }

    /// Plane data packed for upload to a compute pass.
    #[must_use]
    pub fn as_arrays(&self) -> Vec<[f32; 4]> {
        self.planes().iter().map(Plane::as_array).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: [[f32; 4]; 4] = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];

    #[test]
    fn test_plane_normalization() {
        let plane = Plane::new(3.0, 4.0, 0.0, 10.0).normalized();
        let len = (plane.a * plane.a + plane.b * plane.b + plane.c * plane.c).sqrt();
        assert!((len - 1.0).abs() < 0.001);
        assert!((plane.d - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_point_normal_plane() {
        let plane = Plane::from_point_normal([0.0, 0.0, 5.0], [0.0, 0.0, 2.0]);
        assert!((plane.distance_to_point([0.0, 0.0, 7.0]) - 2.0).abs() < 1e-6);
        assert!(plane.distance_to_point([0.0, 0.0, 4.0]) < 0.0);
    }

    #[test]
    fn test_identity_frustum_is_clip_cube() {
        let frustum = Frustum::from_view_projection(&IDENTITY);
        assert_eq!(frustum.planes().len(), MAX_CULL_PLANES);

        assert!(frustum.contains_sphere([0.0, 0.0, 0.0], 0.0));
        assert!(frustum.contains_sphere([0.99, -0.99, 0.5], 0.0));
        assert!(!frustum.contains_sphere([2.0, 0.0, 0.0], 0.0));
        assert!(!frustum.contains_sphere([0.0, 0.0, -1.5], 0.0));
    }

    #[test]
    fn test_radius_extends_acceptance() {
        let frustum = Frustum::from_view_projection(&IDENTITY);
        assert!(!frustum.contains_sphere([1.5, 0.0, 0.0], 0.25));
        assert!(frustum.contains_sphere([1.5, 0.0, 0.0], 0.75));
    }

    #[test]
    fn test_from_planes_caps_at_six() {
        let planes = [Plane::new(1.0, 0.0, 0.0, 0.0); 8];
        let frustum = Frustum::from_planes(&planes);
        assert_eq!(frustum.planes().len(), MAX_CULL_PLANES);
        assert_eq!(frustum.as_arrays().len(), MAX_CULL_PLANES);
    }

    #[test]
    fn test_empty_frustum_accepts_everything() {
        let frustum = Frustum::from_planes(&[]);
        assert!(frustum.is_empty());
        assert!(frustum.contains_sphere([1.0e9, -1.0e9, 0.0], 0.0));
    }
}
