//! Scene state shared by the render passes
//!
//! Owns the CAVE surfaces, the manipulable object, the interaction flags and
//! the per-eye positions the off-axis frusta are solved from. Contains no GPU
//! handles; those live in [`crate::renderer::CaveRenderer`].

use glam::{Mat4, Vec3};
use log::debug;

use crate::config::CaveConfig;
use crate::eye::{Eye, PerEye};
use crate::frustum::{self, FrustumError, OffAxisFrustum};
use crate::input::FrameInput;
use crate::interaction::{InteractionEvents, InteractionState, SceneObject};
use crate::surface::{self, CaveSurface, SurfaceError, SurfaceKind, SurfaceSet};

/// Uniform scale of both skyboxes.
pub const SKYBOX_SCALE: f32 = 20.0;

pub struct CaveScene {
    pub surfaces: SurfaceSet<CaveSurface>,
    pub object: SceneObject,
    pub interaction: InteractionState,
    /// Eye positions the surface passes render from. Frozen while tracking is off.
    eye_positions: PerEye<Vec3>,
    near: f32,
    far: f32,
    controller_eye_offset: f32,
}

impl CaveScene {
    pub fn new(config: &CaveConfig) -> Result<Self, SurfaceError> {
        Ok(Self::with_surfaces(surface::standard_layout()?, config))
    }

    pub fn with_surfaces(surfaces: SurfaceSet<CaveSurface>, config: &CaveConfig) -> Self {
        Self {
            surfaces,
            object: SceneObject::default(),
            interaction: InteractionState::new(),
            eye_positions: PerEye::default(),
            near: config.near,
            far: config.far,
            controller_eye_offset: config.controller_eye_offset,
        }
    }

    /// Per-frame update: interaction first, then the off-axis eye positions.
    pub fn update(&mut self, input: &FrameInput) -> InteractionEvents {
        let events = self.interaction.apply(&input.buttons, &mut self.object);

        if !self.interaction.tracking_enabled {
            return events;
        }
        for eye in Eye::ALL {
            self.eye_positions[eye] = match (self.interaction.view_from_controller, input.hand) {
                (true, Some(hand)) => {
                    hand.position + Vec3::X * eye.sign() * self.controller_eye_offset
                }
                _ => input.head[eye].position,
            };
        }
        if events.tracking_toggled {
            debug!("Eye positions resumed at {:?}", self.eye_positions);
        }
        events
    }

    /// Position the surface passes for `eye` are rendered from.
    pub fn off_axis_eye(&self, eye: Eye) -> Vec3 {
        self.eye_positions[eye]
    }

    pub fn frustum(&self, kind: SurfaceKind, eye: Eye) -> Result<OffAxisFrustum, FrustumError> {
        frustum::solve(&self.surfaces[kind].corners, self.eye_positions[eye], self.near, self.far)
    }

    pub fn frusta(&self, eye: Eye) -> SurfaceSet<Result<OffAxisFrustum, FrustumError>> {
        SurfaceSet::from_fn(|kind| self.frustum(kind, eye))
    }

    pub fn skybox_transform(&self) -> Mat4 {
        Mat4::from_scale(Vec3::splat(SKYBOX_SCALE))
    }
}
