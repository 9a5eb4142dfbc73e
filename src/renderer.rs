//! wgpu Renderer module
//!
//! Handles GPU initialization and owns every GPU resource the CAVE needs:
//! pipelines, meshes, textures, the surface render targets and the per-draw
//! uniform arena. One call to [`CaveRenderer::render_frame`] records the six
//! off-axis passes and both compositor passes into a single encoder.

use std::sync::Arc;

use log::{debug, info};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::assets::{self, AssetManifest, CubeFaces};
use crate::compositor::{self, CompositeResources};
use crate::config::CaveConfig;
use crate::error::SetupError;
use crate::eye::{Eye, EyeView, PerEye, TrackedPose};
use crate::hmd::HmdSession;
use crate::mesh::{self, Vertex, PYRAMID_LINE_VERTICES};
use crate::passes::{self, PassHealth, SceneResources};
use crate::render_targets::{RenderTargets, COLOR_FORMAT, DEPTH_FORMAT};
use crate::resources::{ResourceLedger, Tracked};
use crate::scene::CaveScene;
use crate::surface::SurfaceSet;
use crate::uniforms::UniformArena;

/// Draws per frame: 12 in the surface passes, up to 14 in the compositor.
const UNIFORM_SLOTS: u32 = 64;

const WIRE_VERTEX_CAPACITY: usize = 2 * 3 * PYRAMID_LINE_VERTICES;

pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Creates a device able to present to `window`, along with its surface.
    pub fn for_window(window: &Arc<Window>) -> Result<(Self, wgpu::Surface<'static>), SetupError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        // SAFETY: the surface is owned by `DesktopHmd`, which also holds an
        // `Arc` of this window and drops the surface first.
        let surface = unsafe {
            let target = wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: window.display_handle()?.as_raw(),
                raw_window_handle: window.window_handle()?.as_raw(),
            };
            instance.create_surface_unsafe(target)?
        };

        let gpu = pollster::block_on(Self::request(instance, Some(&surface)))?;
        Ok((gpu, surface))
    }

    /// Creates a device with no presentation surface.
    pub fn headless() -> Result<Self, SetupError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        pollster::block_on(Self::request(instance, None))
    }

    async fn request(instance: wgpu::Instance, surface: Option<&wgpu::Surface<'_>>) -> Result<Self, SetupError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(SetupError::NoAdapter)?;
        let adapter_info = adapter.get_info();
        info!("Using {} ({:?})", adapter_info.name, adapter_info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("CAVE Device"),
                    ..Default::default()
                },
                None,
            )
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }
}

/// How a pipeline uses the depth buffer.
#[derive(Clone, Copy)]
enum DepthMode {
    /// Tested and written.
    Opaque,
    /// Tested against, never written; drawn behind or on top of opaque geometry.
    ReadOnly,
    /// Neither tested nor written; always drawn over what is already there.
    Overlay,
}

impl DepthMode {
    /// Depth write flag and compare function.
    fn state(self) -> (bool, wgpu::CompareFunction) {
        match self {
            DepthMode::Opaque => (true, wgpu::CompareFunction::Less),
            DepthMode::ReadOnly => (false, wgpu::CompareFunction::LessEqual),
            DepthMode::Overlay => (false, wgpu::CompareFunction::Always),
        }
    }
}

struct PipelineDesc<'a> {
    label: &'static str,
    shader: &'a wgpu::ShaderModule,
    layout: &'a wgpu::PipelineLayout,
    topology: wgpu::PrimitiveTopology,
    cull_mode: Option<wgpu::Face>,
    depth: DepthMode,
}

fn create_pipeline(device: &wgpu::Device, desc: PipelineDesc<'_>) -> wgpu::RenderPipeline {
    let (depth_write_enabled, depth_compare) = desc.depth.state();
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(desc.layout),
        vertex: wgpu::VertexState {
            module: desc.shader,
            entry_point: Some("vs_main"),
            buffers: &[Vertex::layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: desc.shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: COLOR_FORMAT,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: desc.topology,
            cull_mode: desc.cull_mode,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled,
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn texture_layout(device: &wgpu::Device, label: &'static str, view_dimension: wgpu::TextureViewDimension) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

fn texture_bind_group(
    device: &wgpu::Device,
    label: &'static str,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

/// A cube map kept alive for the ledger, plus the bind group sampling it.
struct CubeBinding {
    _texture: Tracked<wgpu::Texture>,
    bind_group: wgpu::BindGroup,
}

pub struct CaveRenderer {
    clear_color: wgpu::Color,
    targets: RenderTargets,

    object_pipeline: wgpu::RenderPipeline,
    skybox_pipeline: wgpu::RenderPipeline,
    surface_pipeline: wgpu::RenderPipeline,
    wire_pipeline: wgpu::RenderPipeline,

    uniform_buffer: Tracked<wgpu::Buffer>,
    uniform_bind_group: wgpu::BindGroup,
    arena: UniformArena,

    cube_vertices: Tracked<wgpu::Buffer>,
    cube_vertex_count: u32,
    quad_vertices: Tracked<wgpu::Buffer>,
    wire_vertices: Tracked<wgpu::Buffer>,

    object_texture: CubeBinding,
    eye_skybox: PerEye<CubeBinding>,
    environment: CubeBinding,
    surface_textures: SurfaceSet<PerEye<wgpu::BindGroup>>,

    pass_health: PassHealth,
}

impl CaveRenderer {
    pub fn new(
        gpu: &GpuContext,
        config: &CaveConfig,
        manifest: &AssetManifest,
        ledger: &ResourceLedger,
    ) -> Result<Self, SetupError> {
        let device = &gpu.device;
        let targets = RenderTargets::new(device, ledger, config.render_target_size)?;

        // --- Uniforms ---
        let arena = UniformArena::new(device.limits().min_uniform_buffer_offset_alignment, UNIFORM_SLOTS);
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Uniforms"),
            size: arena.buffer_size(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Uniforms Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: Some(UniformArena::binding_size()),
                },
                count: None,
            }],
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Uniforms Bind Group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size: Some(UniformArena::binding_size()),
                }),
            }],
        });

        // --- Textures ---
        let cube_layout = texture_layout(device, "Cube Texture Layout", wgpu::TextureViewDimension::Cube);
        let flat_layout = texture_layout(device, "Surface Texture Layout", wgpu::TextureViewDimension::D2);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Clamp Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let upload = |label: &'static str, cube: CubeFaces| {
            let (texture, view) = assets::upload_cube(device, &gpu.queue, ledger, label, cube);
            CubeBinding {
                bind_group: texture_bind_group(device, label, &cube_layout, &view, &sampler),
                _texture: texture,
            }
        };

        let pattern = assets::load_image(&manifest.test_pattern())?;
        let object_texture = upload("Test Pattern Cube", CubeFaces::uniform(pattern));
        let left_sky = assets::load_cube(&manifest.eye_skybox(Eye::Left))?;
        let left_sky = upload("Left Eye Skybox", left_sky);
        let right_sky = assets::load_cube(&manifest.eye_skybox(Eye::Right))?;
        let right_sky = upload("Right Eye Skybox", right_sky);
        let environment = upload("Environment Skybox", assets::load_cube(&manifest.environment())?);
        info!("Textures uploaded");

        let surface_textures = SurfaceSet::from_fn(|kind| {
            PerEye::from_fn(|eye| {
                texture_bind_group(device, kind.label(), &flat_layout, targets.color(kind, eye), &sampler)
            })
        });

        // --- Pipelines ---
        let cube_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Cube Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/cube.wgsl").into()),
        });
        let surface_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Surface Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/surface.wgsl").into()),
        });
        let wire_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Wireframe Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/wire.wgsl").into()),
        });

        let cube_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cube Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &cube_layout],
            push_constant_ranges: &[],
        });
        let surface_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Surface Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &flat_layout],
            push_constant_ranges: &[],
        });
        let wire_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Wireframe Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });

        let object_pipeline = create_pipeline(
            device,
            PipelineDesc {
                label: "Object Pipeline",
                shader: &cube_shader,
                layout: &cube_pipeline_layout,
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                depth: DepthMode::Opaque,
            },
        );
        // Seen from inside, so no culling.
        let skybox_pipeline = create_pipeline(
            device,
            PipelineDesc {
                label: "Skybox Pipeline",
                shader: &cube_shader,
                layout: &cube_pipeline_layout,
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                depth: DepthMode::ReadOnly,
            },
        );
        let surface_pipeline = create_pipeline(
            device,
            PipelineDesc {
                label: "Surface Pipeline",
                shader: &surface_shader,
                layout: &surface_pipeline_layout,
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                depth: DepthMode::Opaque,
            },
        );
        let wire_pipeline = create_pipeline(
            device,
            PipelineDesc {
                label: "Wireframe Pipeline",
                shader: &wire_shader,
                layout: &wire_pipeline_layout,
                topology: wgpu::PrimitiveTopology::LineList,
                cull_mode: None,
                // The pyramid bases lie on the surface quads.
                depth: DepthMode::Overlay,
            },
        );

        // --- Meshes ---
        let box_mesh = mesh::box_vertices();
        let cube_vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Box Vertices"),
            contents: bytemuck::cast_slice(&box_mesh),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let quad_vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertices"),
            contents: bytemuck::cast_slice(&mesh::quad_vertices()),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let wire_vertices = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Wireframe Vertices"),
            size: (WIRE_VERTEX_CAPACITY * std::mem::size_of::<Vertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let [r, g, b] = config.clear_color.map(f64::from);
        debug!("Renderer created with {}px surface targets", targets.size());

        Ok(Self {
            clear_color: wgpu::Color { r, g, b, a: 1.0 },
            targets,
            object_pipeline,
            skybox_pipeline,
            surface_pipeline,
            wire_pipeline,
            uniform_buffer: ledger.track("Draw Uniforms", uniform_buffer),
            uniform_bind_group,
            arena,
            cube_vertices: ledger.track("Box Vertices", cube_vertices),
            cube_vertex_count: box_mesh.len() as u32,
            quad_vertices: ledger.track("Quad Vertices", quad_vertices),
            wire_vertices: ledger.track("Wireframe Vertices", wire_vertices),
            object_texture,
            eye_skybox: PerEye::new(left_sky, right_sky),
            environment,
            surface_textures,
            pass_health: PassHealth::default(),
        })
    }

    /// Renders and presents one frame. `head` is the live physical pose,
    /// used by the compositor even while off-axis tracking is frozen.
    pub fn render_frame<H: HmdSession>(
        &mut self,
        gpu: &GpuContext,
        scene: &CaveScene,
        head: &PerEye<TrackedPose>,
        hmd: &mut H,
    ) {
        if !hmd.begin_frame(gpu) {
            return;
        }
        self.arena.reset();

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        // 1. Off-axis surface passes
        let eye_skybox = PerEye::from_fn(|eye| &self.eye_skybox[eye].bind_group);
        let scene_resources = SceneResources {
            object_pipeline: &self.object_pipeline,
            skybox_pipeline: &self.skybox_pipeline,
            uniforms: &self.uniform_bind_group,
            object_texture: &self.object_texture.bind_group,
            eye_skybox,
            cube_vertices: &self.cube_vertices,
            cube_vertex_count: self.cube_vertex_count,
        };
        for eye in Eye::ALL {
            for pass in passes::plan_surface_passes(scene, eye) {
                self.pass_health.observe(&pass);
                passes::record_surface_pass(
                    &mut encoder,
                    &pass,
                    self.targets.color(pass.surface, eye),
                    self.targets.depth(),
                    self.clear_color,
                    &scene_resources,
                    &mut self.arena,
                );
            }
        }

        // 2. Compositor
        let plans = Eye::ALL.map(|eye| {
            let view = EyeView::from_pose(hmd.eye_projection(eye), &head[eye]);
            compositor::plan_composite(scene, eye, &view)
        });
        let wire: Vec<Vertex> = plans
            .iter()
            .flat_map(|plan| plan.wireframes.iter().flat_map(|w| w.vertices))
            .collect();
        if !wire.is_empty() {
            gpu.queue.write_buffer(&self.wire_vertices, 0, bytemuck::cast_slice(&wire));
        }

        {
            let buffer = hmd.eye_buffer();
            clear_eye_buffer(&mut encoder, buffer.color, buffer.depth);
            let mut wire_base = 0;
            for plan in &plans {
                let composite_resources = CompositeResources {
                    skybox_pipeline: &self.skybox_pipeline,
                    surface_pipeline: &self.surface_pipeline,
                    wire_pipeline: &self.wire_pipeline,
                    uniforms: &self.uniform_bind_group,
                    environment: &self.environment.bind_group,
                    surface_textures: SurfaceSet::from_fn(|kind| &self.surface_textures[kind][plan.eye]),
                    cube_vertices: &self.cube_vertices,
                    cube_vertex_count: self.cube_vertex_count,
                    quad_vertices: &self.quad_vertices,
                    wire_vertices: &self.wire_vertices,
                };
                compositor::record_composite(
                    &mut encoder,
                    plan,
                    buffer.color,
                    buffer.depth,
                    hmd.eye_viewport(plan.eye),
                    wire_base,
                    &composite_resources,
                    &mut self.arena,
                );
                wire_base += (plan.wireframes.len() * PYRAMID_LINE_VERTICES) as u32;
            }
        }

        // Everything staged above lands before the submit below.
        self.arena.flush(&gpu.queue, &self.uniform_buffer);
        hmd.submit(gpu, encoder);
    }
}

fn clear_eye_buffer(encoder: &mut wgpu::CommandEncoder, color: &wgpu::TextureView, depth: &wgpu::TextureView) {
    let _render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Eye Buffer Clear"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: color,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
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
}
