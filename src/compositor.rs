//! Compositor
//!
//! Draws the CAVE as seen from the physical eye: environment skybox, the three
//! surface quads textured with their off-axis renders, and optionally the
//! debug wireframes. Surface quads are placed with their static transforms
//! only; where the off-axis eye sits never moves them.

use glam::Mat4;

use crate::eye::{Eye, EyeView};
use crate::hmd::Viewport;
use crate::mesh::{self, Vertex, PYRAMID_LINE_VERTICES};
use crate::scene::CaveScene;
use crate::surface::{CaveSurface, SurfaceKind, SurfaceSet};
use crate::uniforms::{DrawUniforms, UniformArena, MODE_BROKEN, MODE_TEXTURED};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shading {
    Textured,
    /// Solid debug colour instead of the render target.
    Broken,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceDraw {
    pub surface: SurfaceKind,
    pub shading: Shading,
    pub uniforms: DrawUniforms,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WireframeDraw {
    pub surface: SurfaceKind,
    pub vertices: [Vertex; PYRAMID_LINE_VERTICES],
    pub uniforms: DrawUniforms,
}

/// Everything drawn into one eye's half of the eye buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositePlan {
    pub eye: Eye,
    pub environment: DrawUniforms,
    pub surfaces: Vec<SurfaceDraw>,
    pub wireframes: Vec<WireframeDraw>,
}

/// Uniforms that place `surface` in front of the physical eye.
pub fn surface_placement(view: &EyeView, surface: &CaveSurface) -> DrawUniforms {
    DrawUniforms::new(view.projection, view.view, surface.transform)
}

pub fn plan_composite(scene: &CaveScene, eye: Eye, view: &EyeView) -> CompositePlan {
    let flags = &scene.interaction;

    let surfaces = SurfaceKind::ALL
        .into_iter()
        .map(|kind| {
            let broken = flags.fault_injection && kind == SurfaceKind::Floor && eye == Eye::Right;
            let uniforms = surface_placement(view, &scene.surfaces[kind]).with_color(kind.debug_color());
            let (shading, mode) = if broken {
                (Shading::Broken, MODE_BROKEN)
            } else {
                (Shading::Textured, MODE_TEXTURED)
            };
            SurfaceDraw {
                surface: kind,
                shading,
                uniforms: uniforms.with_mode(mode),
            }
        })
        .collect();

    let wireframes = if flags.debug_overlay {
        let apex = scene.off_axis_eye(eye);
        SurfaceKind::ALL
            .into_iter()
            .map(|kind| WireframeDraw {
                surface: kind,
                vertices: mesh::pyramid_lines(apex, &scene.surfaces[kind].corners),
                uniforms: DrawUniforms::new(view.projection, view.view, Mat4::IDENTITY)
                    .with_color(kind.wireframe_color()),
            })
            .collect()
    } else {
        Vec::new()
    };

    CompositePlan {
        eye,
        environment: DrawUniforms::new(view.projection, view.view, scene.skybox_transform()),
        surfaces,
        wireframes,
    }
}

/// GPU state the compositor draws with.
pub struct CompositeResources<'a> {
    pub skybox_pipeline: &'a wgpu::RenderPipeline,
    pub surface_pipeline: &'a wgpu::RenderPipeline,
    pub wire_pipeline: &'a wgpu::RenderPipeline,
    pub uniforms: &'a wgpu::BindGroup,
    pub environment: &'a wgpu::BindGroup,
    /// Render target bind groups for the eye being composited.
    pub surface_textures: SurfaceSet<&'a wgpu::BindGroup>,
    pub cube_vertices: &'a wgpu::Buffer,
    pub cube_vertex_count: u32,
    pub quad_vertices: &'a wgpu::Buffer,
    pub wire_vertices: &'a wgpu::Buffer,
}

/// Records one eye into its viewport of the eye buffer. `wire_base` is the
/// index of this plan's first wireframe vertex in `wire_vertices`.
#[allow(clippy::too_many_arguments)]
pub fn record_composite(
    encoder: &mut wgpu::CommandEncoder,
    plan: &CompositePlan,
    color: &wgpu::TextureView,
    depth: &wgpu::TextureView,
    viewport: Viewport,
    wire_base: u32,
    resources: &CompositeResources<'_>,
    arena: &mut UniformArena,
) {
    let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Compositor Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: color,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    render_pass.set_viewport(viewport.x, viewport.y, viewport.width, viewport.height, 0.0, 1.0);

    if let Some(offset) = arena.push(plan.environment) {
        render_pass.set_pipeline(resources.skybox_pipeline);
        render_pass.set_vertex_buffer(0, resources.cube_vertices.slice(..));
        render_pass.set_bind_group(0, resources.uniforms, &[offset]);
        render_pass.set_bind_group(1, resources.environment, &[]);
        render_pass.draw(0..resources.cube_vertex_count, 0..1);
    }

    render_pass.set_pipeline(resources.surface_pipeline);
    render_pass.set_vertex_buffer(0, resources.quad_vertices.slice(..));
    for draw in &plan.surfaces {
        let Some(offset) = arena.push(draw.uniforms) else {
            continue;
        };
        render_pass.set_bind_group(0, resources.uniforms, &[offset]);
        render_pass.set_bind_group(1, resources.surface_textures[draw.surface], &[]);
        render_pass.draw(0..6, 0..1);
    }

    if plan.wireframes.is_empty() {
        return;
    }
    render_pass.set_pipeline(resources.wire_pipeline);
    render_pass.set_vertex_buffer(0, resources.wire_vertices.slice(..));
    let count = PYRAMID_LINE_VERTICES as u32;
    for (first, draw) in (0u32..).map(|i| wire_base + i * count).zip(&plan.wireframes) {
        let Some(offset) = arena.push(draw.uniforms) else {
            continue;
        };
        render_pass.set_bind_group(0, resources.uniforms, &[offset]);
        render_pass.draw(first..first + count, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaveConfig;
    use crate::eye::{PerEye, TrackedPose};
    use crate::input::FrameInput;
    use crate::interaction::InputSnapshot;
    use glam::{Quat, Vec3};
    use pretty_assertions::assert_eq;

    fn frame(center: Vec3, buttons: InputSnapshot) -> FrameInput {
        FrameInput {
            head: PerEye::from_fn(|eye| TrackedPose::new(center + Vec3::X * eye.sign() * 0.03, Quat::IDENTITY)),
            hand: None,
            buttons,
        }
    }

    fn eye_view(position: Vec3) -> EyeView {
        let projection = Mat4::perspective_rh(90f32.to_radians(), 0.84, 0.001, 1000.0);
        EyeView::from_pose(projection, &TrackedPose::new(position, Quat::IDENTITY))
    }

    #[test]
    fn placement_ignores_off_axis_eye() {
        let mut scene = CaveScene::new(&CaveConfig::default()).unwrap();
        let view = eye_view(Vec3::ZERO);

        scene.update(&frame(Vec3::ZERO, InputSnapshot::default()));
        let frustum_before = scene.frustum(SurfaceKind::LeftWall, Eye::Left).unwrap();
        let before = surface_placement(&view, &scene.surfaces[SurfaceKind::LeftWall]);

        scene.update(&frame(Vec3::new(0.3, -0.1, 0.2), InputSnapshot::default()));
        let frustum_after = scene.frustum(SurfaceKind::LeftWall, Eye::Left).unwrap();
        let after = surface_placement(&view, &scene.surfaces[SurfaceKind::LeftWall]);

        assert_ne!(frustum_before, frustum_after);
        assert_eq!(before, after);
    }

    #[test]
    fn placement_maps_quad_to_surface_corners() {
        let scene = CaveScene::new(&CaveConfig::default()).unwrap();
        let surface = &scene.surfaces[SurfaceKind::Floor];
        let uniforms = surface_placement(&eye_view(Vec3::ZERO), surface);
        let model = Mat4::from_cols_array_2d(&uniforms.transform);
        for (quad, corner) in crate::surface::QUAD_CORNERS.iter().zip(surface.corners) {
            assert!(model.transform_point3(*quad).abs_diff_eq(corner, 1e-5));
        }
    }

    #[test]
    fn fault_breaks_only_right_eye_floor() {
        let mut scene = CaveScene::new(&CaveConfig::default()).unwrap();
        let toggle = InputSnapshot {
            button_x: true,
            ..Default::default()
        };
        scene.update(&frame(Vec3::ZERO, toggle));
        assert!(scene.interaction.fault_injection);

        for eye in Eye::ALL {
            let plan = plan_composite(&scene, eye, &eye_view(Vec3::ZERO));
            for draw in &plan.surfaces {
                let expected = if eye == Eye::Right && draw.surface == SurfaceKind::Floor {
                    Shading::Broken
                } else {
                    Shading::Textured
                };
                assert_eq!(draw.shading, expected, "{eye:?} {:?}", draw.surface);
            }
        }
        let plan = plan_composite(&scene, Eye::Right, &eye_view(Vec3::ZERO));
        assert_eq!(plan.surfaces[2].uniforms.flags[0], MODE_BROKEN);
        assert_eq!(plan.surfaces[2].uniforms.color, [0.7, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn wireframes_follow_debug_overlay_and_off_axis_eye() {
        let mut scene = CaveScene::new(&CaveConfig::default()).unwrap();
        scene.update(&frame(Vec3::ZERO, InputSnapshot::default()));
        assert!(plan_composite(&scene, Eye::Left, &eye_view(Vec3::ZERO)).wireframes.is_empty());

        let toggle = InputSnapshot {
            button_a: true,
            ..Default::default()
        };
        scene.update(&frame(Vec3::new(0.1, 0.0, 0.0), toggle));
        let plan = plan_composite(&scene, Eye::Left, &eye_view(Vec3::ZERO));
        assert_eq!(plan.wireframes.len(), 3);
        let apex = scene.off_axis_eye(Eye::Left).to_array();
        for wire in &plan.wireframes {
            assert_eq!(wire.vertices[0].position, apex);
            assert_eq!(wire.uniforms.color, wire.surface.wireframe_color().extend(1.0).to_array());
        }
    }

    #[test]
    fn environment_uses_physical_view() {
        let scene = CaveScene::new(&CaveConfig::default()).unwrap();
        let view = eye_view(Vec3::new(0.0, 0.1, 0.0));
        let plan = plan_composite(&scene, Eye::Left, &view);
        assert_eq!(plan.environment.view, view.view.to_cols_array_2d());
        assert_eq!(plan.environment.transform, scene.skybox_transform().to_cols_array_2d());
    }
}
