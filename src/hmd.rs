//! HMD session
//!
//! The renderer talks to the display through [`HmdSession`]: a side-by-side
//! eye buffer, per-eye viewports and projections, and one submit per frame.
//! [`DesktopHmd`] implements it with an on-screen mirror window that shows
//! the eye buffer scaled down.

use std::sync::Arc;

use glam::Mat4;
use log::{debug, info, warn};
use winit::window::Window;

use crate::config::CaveConfig;
use crate::error::SetupError;
use crate::eye::Eye;
use crate::render_targets::{COLOR_FORMAT, DEPTH_FORMAT};
use crate::renderer::GpuContext;
use crate::resources::{ResourceLedger, Tracked};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    /// Left or right half of a side-by-side buffer holding two `eye_size` images.
    pub fn side_by_side(eye_size: (u32, u32), eye: Eye) -> Self {
        let (width, height) = (eye_size.0 as f32, eye_size.1 as f32);
        let x = match eye {
            Eye::Left => 0.0,
            Eye::Right => width,
        };
        Self {
            x,
            y: 0.0,
            width,
            height,
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width / self.height
    }
}

/// Symmetric per-eye projection with `[0, 1]` depth.
pub fn eye_projection(fov_y_degrees: f32, viewport: Viewport, near: f32, far: f32) -> Mat4 {
    Mat4::perspective_rh(fov_y_degrees.to_radians(), viewport.aspect(), near, far)
}

/// Colour and depth views of the eye buffer.
pub struct EyeBufferViews<'a> {
    pub color: &'a wgpu::TextureView,
    pub depth: &'a wgpu::TextureView,
}

pub trait HmdSession {
    fn eye_viewport(&self, eye: Eye) -> Viewport;

    fn eye_projection(&self, eye: Eye) -> Mat4;

    fn eye_buffer(&self) -> EyeBufferViews<'_>;

    /// Acquires the output for a new frame. `false` means skip this frame.
    fn begin_frame(&mut self, gpu: &GpuContext) -> bool;

    /// Submits the frame's commands and presents. Called once per frame,
    /// after a successful [`HmdSession::begin_frame`].
    fn submit(&mut self, gpu: &GpuContext, encoder: wgpu::CommandEncoder);
}

/// Side-by-side stereo render target.
pub struct EyeBuffer {
    eye_size: (u32, u32),
    _color: Tracked<wgpu::Texture>,
    color_view: wgpu::TextureView,
    _depth: Tracked<wgpu::Texture>,
    depth_view: wgpu::TextureView,
}

impl EyeBuffer {
    pub fn new(device: &wgpu::Device, ledger: &ResourceLedger, eye_size: (u32, u32)) -> Result<Self, SetupError> {
        let width = eye_size.0 * 2;
        let height = eye_size.1;
        let max = device.limits().max_texture_dimension_2d;
        if eye_size.0 == 0 || height == 0 || width > max || height > max {
            return Err(SetupError::RenderTarget {
                label: "eye buffer".to_owned(),
                reason: format!("{width}x{height} is outside 1..={max}"),
            });
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Eye Buffer"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Eye Buffer Depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            eye_size,
            _color: ledger.track("Eye Buffer", color),
            color_view,
            _depth: ledger.track("Eye Buffer Depth", depth),
            depth_view,
        })
    }

    pub fn eye_size(&self) -> (u32, u32) {
        self.eye_size
    }

    pub fn views(&self) -> EyeBufferViews<'_> {
        EyeBufferViews {
            color: &self.color_view,
            depth: &self.depth_view,
        }
    }

    pub fn color_view(&self) -> &wgpu::TextureView {
        &self.color_view
    }
}

/// Desktop stand-in for a headset: renders the eye buffer offscreen and
/// mirrors it into a window.
pub struct DesktopHmd {
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    eye_buffer: EyeBuffer,
    mirror_pipeline: wgpu::RenderPipeline,
    mirror_bind_group: wgpu::BindGroup,
    frame: Option<wgpu::SurfaceTexture>,
    frames_submitted: u64,
    fov_y_degrees: f32,
    near: f32,
    far: f32,
    // Declared after `surface` so the surface is dropped first.
    window: Arc<Window>,
}

impl DesktopHmd {
    pub fn new(
        gpu: &GpuContext,
        surface: wgpu::Surface<'static>,
        window: Arc<Window>,
        config: &CaveConfig,
        ledger: &ResourceLedger,
    ) -> Result<Self, SetupError> {
        let device = &gpu.device;
        let size = window.inner_size();

        let caps = surface.get_capabilities(&gpu.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or(SetupError::NoSurfaceFormat)?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(device, &surface_config);
        debug!("Mirror surface {format:?} {}x{}", surface_config.width, surface_config.height);

        let eye_buffer = EyeBuffer::new(device, ledger, (config.eye_size[0], config.eye_size[1]))?;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Mirror Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mirror Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
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
        });
        let mirror_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mirror Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(eye_buffer.color_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mirror Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/mirror.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mirror Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let mirror_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Mirror Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        info!(
            "Desktop HMD ready: eye buffer {}x{}, mirror {}x{}",
            config.eye_size[0] * 2,
            config.eye_size[1],
            surface_config.width,
            surface_config.height
        );

        Ok(Self {
            surface,
            surface_config,
            eye_buffer,
            mirror_pipeline,
            mirror_bind_group,
            frame: None,
            frames_submitted: 0,
            fov_y_degrees: config.eye_fov_y_degrees,
            near: config.near,
            far: config.far,
            window,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.surface.configure(device, &self.surface_config);
        }
    }
}

impl HmdSession for DesktopHmd {
    fn eye_viewport(&self, eye: Eye) -> Viewport {
        Viewport::side_by_side(self.eye_buffer.eye_size(), eye)
    }

    fn eye_projection(&self, eye: Eye) -> Mat4 {
        eye_projection(self.fov_y_degrees, self.eye_viewport(eye), self.near, self.far)
    }

    fn eye_buffer(&self) -> EyeBufferViews<'_> {
        self.eye_buffer.views()
    }

    fn begin_frame(&mut self, gpu: &GpuContext) -> bool {
        match self.surface.get_current_texture() {
            Ok(frame) => {
                self.frame = Some(frame);
                true
            }
            Err(e) => {
                debug!("Skipping frame, surface unavailable: {e}");
                self.surface.configure(&gpu.device, &self.surface_config);
                false
            }
        }
    }

    fn submit(&mut self, gpu: &GpuContext, mut encoder: wgpu::CommandEncoder) {
        let Some(frame) = self.frame.take() else {
            warn!("Frame submitted without begin_frame, dropping it");
            return;
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mirror Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(&self.mirror_pipeline);
            render_pass.set_bind_group(0, &self.mirror_bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        frame.present();
        self.frames_submitted += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;
    use pretty_assertions::assert_eq;

    #[test]
    fn viewports_split_the_buffer() {
        let left = Viewport::side_by_side((1344, 1600), Eye::Left);
        let right = Viewport::side_by_side((1344, 1600), Eye::Right);
        assert_eq!((left.x, left.width, left.height), (0.0, 1344.0, 1600.0));
        assert_eq!(right.x, 1344.0);
        assert_eq!(left.aspect(), 0.84);
    }

    #[test]
    fn eye_projection_has_zero_to_one_depth() {
        let viewport = Viewport::side_by_side((100, 100), Eye::Left);
        let projection = eye_projection(90.0, viewport, 0.5, 10.0);
        let near = projection * Vec4::new(0.0, 0.0, -0.5, 1.0);
        let far = projection * Vec4::new(0.0, 0.0, -10.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-6);
        assert!((far.z / far.w - 1.0).abs() < 1e-6);
        // 90 degrees: the top of the near plane maps to y = 1.
        let top = projection * Vec4::new(0.0, 0.5, -0.5, 1.0);
        assert!((top.y / top.w - 1.0).abs() < 1e-6);
    }
}
