//! CAVE projection surfaces
//!
//! Each surface is the unit quad `[-1, 1]²` (facing +Z) placed once by a
//! static transform. Corners are kept in world space in the order
//! bottom-left, bottom-right, top-right, top-left, so `corners[1] - corners[0]`
//! is the surface's right tangent and `corners[3] - corners[0]` its up tangent.

use std::ops::{Index, IndexMut};

use glam::{Mat4, Vec3};

use crate::frustum::plane_basis;

/// Corners of the unit quad in its own space.
pub const QUAD_CORNERS: [Vec3; 4] = [
    Vec3::new(-1.0, -1.0, 0.0),
    Vec3::new(1.0, -1.0, 0.0),
    Vec3::new(1.0, 1.0, 0.0),
    Vec3::new(-1.0, 1.0, 0.0),
];

/// Uniform scale applied to every surface of the standard layout.
const LAYOUT_SCALE: f32 = 1.2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    LeftWall,
    RightWall,
    Floor,
}

impl SurfaceKind {
    pub const ALL: [SurfaceKind; 3] = [SurfaceKind::LeftWall, SurfaceKind::RightWall, SurfaceKind::Floor];

    /// Tint used when the surface is drawn without its rendered texture.
    pub fn debug_color(self) -> Vec3 {
        match self {
            SurfaceKind::LeftWall => Vec3::new(0.0, 0.7, 0.0),
            SurfaceKind::RightWall => Vec3::new(0.0, 0.0, 0.7),
            SurfaceKind::Floor => Vec3::new(0.7, 0.0, 0.0),
        }
    }

    /// Colour of the projection-volume wireframe.
    pub fn wireframe_color(self) -> Vec3 {
        match self {
            SurfaceKind::LeftWall => Vec3::new(0.0, 0.0, 1.0),
            SurfaceKind::RightWall => Vec3::new(1.0, 0.0, 0.0),
            SurfaceKind::Floor => Vec3::new(0.0, 1.0, 0.0),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SurfaceKind::LeftWall => "left wall",
            SurfaceKind::RightWall => "right wall",
            SurfaceKind::Floor => "floor",
        }
    }
}

/// One value per CAVE surface.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SurfaceSet<T> {
    pub left_wall: T,
    pub right_wall: T,
    pub floor: T,
}

impl<T> SurfaceSet<T> {
    pub fn from_fn(mut f: impl FnMut(SurfaceKind) -> T) -> Self {
        Self {
            left_wall: f(SurfaceKind::LeftWall),
            right_wall: f(SurfaceKind::RightWall),
            floor: f(SurfaceKind::Floor),
        }
    }

    pub fn try_from_fn<E>(mut f: impl FnMut(SurfaceKind) -> Result<T, E>) -> Result<Self, E> {
        Ok(Self {
            left_wall: f(SurfaceKind::LeftWall)?,
            right_wall: f(SurfaceKind::RightWall)?,
            floor: f(SurfaceKind::Floor)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (SurfaceKind, &T)> {
        [
            (SurfaceKind::LeftWall, &self.left_wall),
            (SurfaceKind::RightWall, &self.right_wall),
            (SurfaceKind::Floor, &self.floor),
        ]
        .into_iter()
    }
}

impl<T> Index<SurfaceKind> for SurfaceSet<T> {
    type Output = T;

    fn index(&self, kind: SurfaceKind) -> &T {
        match kind {
            SurfaceKind::LeftWall => &self.left_wall,
            SurfaceKind::RightWall => &self.right_wall,
            SurfaceKind::Floor => &self.floor,
        }
    }
}

impl<T> IndexMut<SurfaceKind> for SurfaceSet<T> {
    fn index_mut(&mut self, kind: SurfaceKind) -> &mut T {
        match kind {
            SurfaceKind::LeftWall => &mut self.left_wall,
            SurfaceKind::RightWall => &mut self.right_wall,
            SurfaceKind::Floor => &mut self.floor,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum SurfaceError {
    #[error("{0:?} corners are degenerate (tangents do not span a plane)")]
    Degenerate(SurfaceKind),
    #[error("{0:?} corners are not coplanar (off by {1})")]
    NotCoplanar(SurfaceKind, f32),
}

/// A planar projection surface at its fixed place in the room.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaveSurface {
    pub kind: SurfaceKind,
    pub transform: Mat4,
    pub corners: [Vec3; 4],
}

impl CaveSurface {
    /// Places the unit quad with `transform`.
    pub fn new(kind: SurfaceKind, transform: Mat4) -> Result<Self, SurfaceError> {
        Self::from_corners(kind, transform, QUAD_CORNERS.map(|c| transform.transform_point3(c)))
    }

    pub fn from_corners(
        kind: SurfaceKind,
        transform: Mat4,
        corners: [Vec3; 4],
    ) -> Result<Self, SurfaceError> {
        let (_, _, normal) = plane_basis(&corners).ok_or(SurfaceError::Degenerate(kind))?;
        let off_plane = normal.dot(corners[2] - corners[0]);
        if off_plane.abs() > 1e-4 {
            return Err(SurfaceError::NotCoplanar(kind, off_plane));
        }
        Ok(Self { kind, transform, corners })
    }
}

/// Static transform of each surface in the standard room.
pub fn standard_transform(kind: SurfaceKind) -> Mat4 {
    let place = Mat4::from_scale(Vec3::splat(LAYOUT_SCALE)) * Mat4::from_translation(Vec3::new(0.0, 0.0, -1.0));
    match kind {
        SurfaceKind::LeftWall => Mat4::from_rotation_y(45f32.to_radians()) * place,
        SurfaceKind::RightWall => Mat4::from_rotation_y(-45f32.to_radians()) * place,
        SurfaceKind::Floor => {
            Mat4::from_rotation_x(-90f32.to_radians()) * Mat4::from_rotation_z(45f32.to_radians()) * place
        }
    }
}

/// Two walls meeting in front of the viewer at a right angle, over a square floor.
pub fn standard_layout() -> Result<SurfaceSet<CaveSurface>, SurfaceError> {
    SurfaceSet::try_from_fn(|kind| CaveSurface::new(kind, standard_transform(kind)))
}
