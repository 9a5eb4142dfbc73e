//! Off-axis surface passes
//!
//! Each frame renders the scene six times, once per (surface, eye), into the
//! matching render target. The projection is the solved off-axis frustum
//! with its view folded in, so the scene's own view matrix is identity.
//! Planning is kept separate from command recording so it can be checked
//! without a GPU.

use glam::Mat4;
use log::{info, warn};

use crate::eye::{Eye, PerEye};
use crate::frustum::{FrustumError, OffAxisFrustum};
use crate::scene::CaveScene;
use crate::surface::{SurfaceKind, SurfaceSet};
use crate::uniforms::{DrawUniforms, UniformArena};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneDrawKind {
    /// The manipulable box, depth-tested and depth-writing.
    Object,
    /// The per-eye skybox behind everything else.
    Skybox,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneDraw {
    pub kind: SceneDrawKind,
    pub uniforms: DrawUniforms,
}

/// One planned pass for a (surface, eye) pair.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfacePass {
    pub surface: SurfaceKind,
    pub eye: Eye,
    pub frustum: Result<OffAxisFrustum, FrustumError>,
    /// Empty when the frustum could not be solved; the pass then only clears.
    pub draws: Vec<SceneDraw>,
}

/// Plans the three passes for `eye`, in [`SurfaceKind::ALL`] order.
pub fn plan_surface_passes(scene: &CaveScene, eye: Eye) -> Vec<SurfacePass> {
    let frusta = scene.frusta(eye);
    SurfaceKind::ALL
        .into_iter()
        .map(|surface| {
            let frustum = frusta[surface];
            let draws = match &frustum {
                Ok(f) => scene_draws(f.view_projection(), scene),
                Err(_) => Vec::new(),
            };
            SurfacePass {
                surface,
                eye,
                frustum,
                draws,
            }
        })
        .collect()
}

fn scene_draws(view_projection: Mat4, scene: &CaveScene) -> Vec<SceneDraw> {
    vec![
        SceneDraw {
            kind: SceneDrawKind::Object,
            uniforms: DrawUniforms::new(view_projection, Mat4::IDENTITY, scene.object.model_matrix()),
        },
        SceneDraw {
            kind: SceneDrawKind::Skybox,
            uniforms: DrawUniforms::new(view_projection, Mat4::IDENTITY, scene.skybox_transform()),
        },
    ]
}

/// Logs solver failures once when a pass becomes unsolvable, and once more
/// when it recovers.
#[derive(Debug, Default)]
pub struct PassHealth {
    failing: SurfaceSet<PerEye<bool>>,
}

impl PassHealth {
    pub fn observe(&mut self, pass: &SurfacePass) {
        let failing = &mut self.failing[pass.surface][pass.eye];
        match (&pass.frustum, *failing) {
            (Err(e), false) => {
                warn!(
                    "{} pass for {:?} eye skipped: {e}",
                    pass.surface.label(),
                    pass.eye
                );
                *failing = true;
            }
            (Ok(_), true) => {
                info!("{} pass for {:?} eye recovered", pass.surface.label(), pass.eye);
                *failing = false;
            }
            _ => {}
        }
    }
}

/// GPU state the surface passes draw with.
pub struct SceneResources<'a> {
    pub object_pipeline: &'a wgpu::RenderPipeline,
    pub skybox_pipeline: &'a wgpu::RenderPipeline,
    pub uniforms: &'a wgpu::BindGroup,
    pub object_texture: &'a wgpu::BindGroup,
    pub eye_skybox: PerEye<&'a wgpu::BindGroup>,
    pub cube_vertices: &'a wgpu::Buffer,
    pub cube_vertex_count: u32,
}

/// Records one planned pass into `encoder`, clearing `color` and `depth`.
pub fn record_surface_pass(
    encoder: &mut wgpu::CommandEncoder,
    pass: &SurfacePass,
    color: &wgpu::TextureView,
    depth: &wgpu::TextureView,
    clear_color: wgpu::Color,
    resources: &SceneResources<'_>,
    arena: &mut UniformArena,
) {
    let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(pass.surface.label()),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: color,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(clear_color),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    });

    render_pass.set_vertex_buffer(0, resources.cube_vertices.slice(..));
    for draw in &pass.draws {
        let Some(offset) = arena.push(draw.uniforms) else {
            continue;
        };
        match draw.kind {
            SceneDrawKind::Object => {
                render_pass.set_pipeline(resources.object_pipeline);
                render_pass.set_bind_group(1, resources.object_texture, &[]);
            }
            SceneDrawKind::Skybox => {
                render_pass.set_pipeline(resources.skybox_pipeline);
                render_pass.set_bind_group(1, resources.eye_skybox[pass.eye], &[]);
            }
        }
        render_pass.set_bind_group(0, resources.uniforms, &[offset]);
        render_pass.draw(0..resources.cube_vertex_count, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaveConfig;
    use crate::eye::TrackedPose;
    use crate::input::FrameInput;
    use crate::surface::{CaveSurface, QUAD_CORNERS};
    use glam::{Quat, Vec3, Vec4};
    use pretty_assertions::assert_eq;

    impl PassHealth {
        fn is_failing(&self, surface: SurfaceKind, eye: Eye) -> bool {
            self.failing[surface][eye]
        }
    }

    fn scene_with_head(center: Vec3) -> CaveScene {
        let mut scene = CaveScene::new(&CaveConfig::default()).unwrap();
        scene.update(&FrameInput {
            head: PerEye::from_fn(|eye| TrackedPose::new(center + Vec3::X * eye.sign() * 0.03, Quat::IDENTITY)),
            ..Default::default()
        });
        scene
    }

    #[test]
    fn plans_three_passes_per_eye_with_box_then_skybox() {
        let scene = scene_with_head(Vec3::ZERO);
        for eye in Eye::ALL {
            let passes = plan_surface_passes(&scene, eye);
            let surfaces: Vec<_> = passes.iter().map(|p| p.surface).collect();
            assert_eq!(surfaces, SurfaceKind::ALL.to_vec());
            for pass in &passes {
                assert_eq!(pass.eye, eye);
                let kinds: Vec<_> = pass.draws.iter().map(|d| d.kind).collect();
                assert_eq!(kinds, vec![SceneDrawKind::Object, SceneDrawKind::Skybox]);
            }
        }
    }

    #[test]
    fn scene_view_is_identity_and_projection_maps_corners() {
        let scene = scene_with_head(Vec3::new(0.1, 0.05, 0.0));
        for pass in plan_surface_passes(&scene, Eye::Right) {
            let draw = pass.draws[0].uniforms;
            assert_eq!(draw.view, Mat4::IDENTITY.to_cols_array_2d());

            let projection = Mat4::from_cols_array_2d(&draw.projection);
            let expected = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
            for (corner, (x, y)) in scene.surfaces[pass.surface].corners.iter().zip(expected) {
                let clip = projection * corner.extend(1.0);
                let ndc = clip / clip.w;
                assert!((ndc.x - x).abs() < 1e-3 && (ndc.y - y).abs() < 1e-3, "{ndc}");
            }
        }
    }

    #[test]
    fn object_draw_uses_model_matrix() {
        let mut scene = scene_with_head(Vec3::ZERO);
        scene.object.scale = 0.5;
        let pass = &plan_surface_passes(&scene, Eye::Left)[0];
        assert_eq!(
            pass.draws[0].uniforms.transform,
            scene.object.model_matrix().to_cols_array_2d()
        );
        assert_eq!(
            Mat4::from_cols_array_2d(&pass.draws[1].uniforms.transform) * Vec4::new(1.0, 0.0, 0.0, 1.0),
            Vec4::new(20.0, 0.0, 0.0, 1.0)
        );
    }

    #[test]
    fn unsolvable_pass_only_clears() {
        let mut scene = scene_with_head(Vec3::ZERO);
        // A wall facing away from the eye.
        scene.surfaces.left_wall = CaveSurface::from_corners(
            SurfaceKind::LeftWall,
            Mat4::from_translation(Vec3::new(0.0, 0.0, 1.0)),
            QUAD_CORNERS.map(|c| c + Vec3::Z),
        )
        .unwrap();
        let passes = plan_surface_passes(&scene, Eye::Left);
        assert!(matches!(passes[0].frustum, Err(FrustumError::EyeBehindSurface { .. })));
        assert!(passes[0].draws.is_empty());
        assert_eq!(passes[1].draws.len(), 2);
    }

    #[test]
    fn health_logs_on_state_change_only() {
        let mut health = PassHealth::default();
        let failing = SurfacePass {
            surface: SurfaceKind::Floor,
            eye: Eye::Right,
            frustum: Err(FrustumError::EyeBehindSurface { distance: -1.0 }),
            draws: Vec::new(),
        };
        health.observe(&failing);
        health.observe(&failing);
        assert!(health.is_failing(SurfaceKind::Floor, Eye::Right));
        assert!(!health.is_failing(SurfaceKind::Floor, Eye::Left));

        let scene = scene_with_head(Vec3::ZERO);
        let ok = plan_surface_passes(&scene, Eye::Right).swap_remove(2);
        health.observe(&ok);
        assert!(!health.is_failing(SurfaceKind::Floor, Eye::Right));
    }
}
