//! Per-eye records
//!
//! Everything that exists once per eye is stored in a [`PerEye`] and indexed by
//! [`Eye`], never by a bare `0`/`1`.

use std::ops::{Index, IndexMut};

use glam::{Mat4, Quat, Vec3};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const ALL: [Eye; 2] = [Eye::Left, Eye::Right];

    /// -1 for the left eye, +1 for the right eye.
    pub fn sign(self) -> f32 {
        match self {
            Eye::Left => -1.0,
            Eye::Right => 1.0,
        }
    }
}

/// One value per eye.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerEye<T> {
    pub left: T,
    pub right: T,
}

impl<T> PerEye<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    pub fn from_fn(mut f: impl FnMut(Eye) -> T) -> Self {
        Self {
            left: f(Eye::Left),
            right: f(Eye::Right),
        }
    }
}

impl<T> Index<Eye> for PerEye<T> {
    type Output = T;

    fn index(&self, eye: Eye) -> &T {
        match eye {
            Eye::Left => &self.left,
            Eye::Right => &self.right,
        }
    }
}

impl<T> IndexMut<Eye> for PerEye<T> {
    fn index_mut(&mut self, eye: Eye) -> &mut T {
        match eye {
            Eye::Left => &mut self.left,
            Eye::Right => &mut self.right,
        }
    }
}

/// Rigid pose reported by the tracking system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackedPose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for TrackedPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

impl TrackedPose {
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self { position, orientation }
    }

    /// Pose-to-world transform (translation after rotation).
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position)
    }

    /// World-to-pose transform, i.e. the view matrix of a camera at this pose.
    pub fn view_matrix(&self) -> Mat4 {
        self.to_matrix().inverse()
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.orientation.is_finite()
    }
}

/// Physical per-eye camera: HMD optics projection plus the tracked head view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EyeView {
    pub projection: Mat4,
    pub view: Mat4,
}

impl EyeView {
    pub fn from_pose(projection: Mat4, pose: &TrackedPose) -> Self {
        Self {
            projection,
            view: pose.view_matrix(),
        }
    }
}
