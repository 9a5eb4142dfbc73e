//! Off-axis frustum solver
//!
//! Given a planar quad in world space and an eye position in front of it,
//! produces the asymmetric projection and the view matrix under which the quad
//! exactly fills the rendered image ("looking through a hole in the wall").
//!
//! Pure math: no device state, so every result is unit-testable.

use glam::{Mat3, Mat4, Vec3, Vec4};

/// Near plane used for all surface passes.
pub const NEAR: f32 = 0.001;
/// Far plane used for all surface passes.
pub const FAR: f32 = 1000.0;

/// Smallest eye-to-plane distance for which a frustum is produced.
pub const MIN_EYE_DISTANCE: f32 = 1e-4;

/// Below this, the cross product of the unit tangents is considered zero.
const DEGENERATE_EPSILON: f32 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum FrustumError {
    #[error("surface corners do not span a plane")]
    DegenerateSurface,
    #[error("eye is {distance} units in front of the surface plane (behind or too close)")]
    EyeBehindSurface { distance: f32 },
}

/// Asymmetric viewing volume for one eye looking at one surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OffAxisFrustum {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
    /// Change of basis into (right, up, normal) surface space.
    pub rotation: Mat4,
    /// Moves the eye to the origin.
    pub translation: Mat4,
}

impl OffAxisFrustum {
    pub fn projection(&self) -> Mat4 {
        frustum_matrix(self.left, self.right, self.bottom, self.top, self.near, self.far)
    }

    pub fn view(&self) -> Mat4 {
        self.rotation * self.translation
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }
}

/// Unit right, up and normal axes of the plane through `corners`, or `None`
/// when a tangent is zero or the two tangents are parallel. Independent of
/// the surface's size.
pub fn plane_basis(corners: &[Vec3; 4]) -> Option<(Vec3, Vec3, Vec3)> {
    let vr = (corners[1] - corners[0]).try_normalize()?;
    let vu = (corners[3] - corners[0]).try_normalize()?;
    let normal = vr.cross(vu);
    if normal.length_squared() <= DEGENERATE_EPSILON {
        return None;
    }
    Some((vr, vu, normal.normalize()))
}

/// Solves the frustum for `corners` (bottom-left, bottom-right, top-right,
/// top-left) seen from `eye`.
pub fn solve(
    corners: &[Vec3; 4],
    eye: Vec3,
    near: f32,
    far: f32,
) -> Result<OffAxisFrustum, FrustumError> {
    let (vr, vu, vn) = plane_basis(corners).ok_or(FrustumError::DegenerateSurface)?;

    let va = corners[0] - eye;
    let vb = corners[1] - eye;
    let vc = corners[3] - eye;

    let distance = -vn.dot(va);
    if !(distance >= MIN_EYE_DISTANCE) {
        return Err(FrustumError::EyeBehindSurface { distance });
    }

    let scale = near / distance;
    let rotation = Mat4::from_mat3(Mat3::from_cols(vr, vu, vn).transpose());

    Ok(OffAxisFrustum {
        left: vr.dot(va) * scale,
        right: vr.dot(vb) * scale,
        bottom: vu.dot(va) * scale,
        top: vu.dot(vc) * scale,
        near,
        far,
        rotation,
        translation: Mat4::from_translation(-eye),
    })
}

/// Right-handed perspective frustum with a [0, 1] depth range.
pub fn frustum_matrix(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let x_scale = 2.0 * near / (right - left);
    let y_scale = 2.0 * near / (top - bottom);
    let x_offset = (right + left) / (right - left);
    let y_offset = (top + bottom) / (top - bottom);
    let z_scale = far / (near - far);
    let z_offset = near * far / (near - far);

    Mat4::from_cols(
        Vec4::new(x_scale, 0.0, 0.0, 0.0),
        Vec4::new(0.0, y_scale, 0.0, 0.0),
        Vec4::new(x_offset, y_offset, z_scale, -1.0),
        Vec4::new(0.0, 0.0, z_offset, 0.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    impl OffAxisFrustum {
        fn is_symmetric(&self, epsilon: f32) -> bool {
            (self.left + self.right).abs() <= epsilon && (self.bottom + self.top).abs() <= epsilon
        }
    }

    fn unit_quad() -> [Vec3; 4] {
        [
            Vec3::new(-0.5, -0.5, 0.0),
            Vec3::new(0.5, -0.5, 0.0),
            Vec3::new(0.5, 0.5, 0.0),
            Vec3::new(-0.5, 0.5, 0.0),
        ]
    }

    fn to_ndc(m: Mat4, p: Vec3) -> Vec3 {
        let clip = m * p.extend(1.0);
        assert!(clip.w > 0.0, "corner behind the eye: {clip:?}");
        clip.truncate() / clip.w
    }

    fn assert_frames_exactly(corners: &[Vec3; 4], eye: Vec3) {
        let frustum = solve(corners, eye, NEAR, FAR).unwrap();
        let expected = [
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 1.0),
        ];
        for (corner, want) in corners.iter().zip(expected) {
            let ndc = to_ndc(frustum.view_projection(), *corner);
            assert!(
                ndc.truncate().abs_diff_eq(want, 1e-3),
                "corner {corner} from eye {eye} landed at {ndc}, expected {want}"
            );
            assert!((0.0..=1.0).contains(&ndc.z), "depth out of range: {}", ndc.z);
        }
    }

    #[test]
    fn centered_eye_gives_symmetric_frustum() {
        let frustum = solve(&unit_quad(), Vec3::new(0.0, 0.0, 5.0), NEAR, FAR).unwrap();
        assert!(frustum.is_symmetric(1e-9));
        assert!((frustum.left + 0.5 * NEAR / 5.0).abs() < 1e-9);
        assert!((frustum.top - 0.5 * NEAR / 5.0).abs() < 1e-9);
    }

    #[test]
    fn offset_eye_gives_asymmetric_frustum() {
        let frustum = solve(&unit_quad(), Vec3::new(2.0, 0.0, 5.0), NEAR, FAR).unwrap();
        assert!(frustum.left.abs() != frustum.right.abs());
        assert!(frustum.left < frustum.right);
        // Both edges are to the left of the eye.
        assert!(frustum.right < 0.0);
        assert!((frustum.bottom + frustum.top).abs() < 1e-9);
    }

    #[test]
    fn corners_map_to_canonical_quad() {
        for eye in [
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::new(2.0, 0.0, 5.0),
            Vec3::new(-0.3, 1.7, 0.4),
            Vec3::new(10.0, -4.0, 0.01),
        ] {
            assert_frames_exactly(&unit_quad(), eye);
        }
    }

    #[test]
    fn tilted_surface_maps_to_canonical_quad() {
        let transform = Mat4::from_rotation_y(0.8)
            * Mat4::from_rotation_x(-0.3)
            * Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0));
        let corners = unit_quad().map(|c| transform.transform_point3(c));
        assert_frames_exactly(&corners, Vec3::new(0.1, 0.2, 0.0));
    }

    #[test]
    fn view_moves_eye_to_origin() {
        let eye = Vec3::new(0.4, -0.2, 3.0);
        let frustum = solve(&unit_quad(), eye, NEAR, FAR).unwrap();
        assert!(frustum.view().transform_point3(eye).abs_diff_eq(Vec3::ZERO, 1e-6));
    }

    #[test]
    fn eye_behind_surface_is_rejected() {
        let err = solve(&unit_quad(), Vec3::new(0.0, 0.0, -5.0), NEAR, FAR).unwrap_err();
        assert_eq!(err, FrustumError::EyeBehindSurface { distance: -5.0 });
    }

    #[test]
    fn eye_on_plane_is_rejected() {
        let err = solve(&unit_quad(), Vec3::new(0.3, 0.3, 0.0), NEAR, FAR).unwrap_err();
        assert!(matches!(err, FrustumError::EyeBehindSurface { .. }));
    }

    #[test]
    fn degenerate_corners_are_rejected() {
        let line = [
            Vec3::ZERO,
            Vec3::X,
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 0.0),
        ];
        assert_eq!(
            solve(&line, Vec3::Z, NEAR, FAR),
            Err(FrustumError::DegenerateSurface)
        );
    }

    #[test]
    fn small_surface_is_solvable() {
        let tiny = unit_quad().map(|c| c * 0.015);
        assert_frames_exactly(&tiny, Vec3::new(0.0, 0.0, 0.5));
        assert_frames_exactly(&tiny, Vec3::new(0.004, -0.002, 0.01));
    }

    #[test]
    fn parallel_tangents_are_degenerate() {
        let sliver = [
            Vec3::ZERO,
            Vec3::X,
            Vec3::new(1.0, 1e-5, 0.0),
            Vec3::new(1.0, 1e-5, 0.0),
        ];
        assert_eq!(plane_basis(&sliver), None);
        assert_eq!(plane_basis(&[Vec3::ONE; 4]), None);
        assert_eq!(
            solve(&sliver, Vec3::Z, NEAR, FAR),
            Err(FrustumError::DegenerateSurface)
        );
    }

    #[test]
    fn non_finite_eye_is_rejected() {
        let err = solve(&unit_quad(), Vec3::new(0.0, 0.0, f32::NAN), NEAR, FAR).unwrap_err();
        assert!(matches!(err, FrustumError::EyeBehindSurface { .. }));
    }
}
