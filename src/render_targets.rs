//! Intermediate render targets for the off-axis surface passes.

use log::debug;

use crate::error::SetupError;
use crate::eye::{Eye, PerEye};
use crate::resources::{ResourceLedger, Tracked};
use crate::surface::{SurfaceKind, SurfaceSet};

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub struct SurfaceTarget {
    _texture: Tracked<wgpu::Texture>,
    pub view: wgpu::TextureView,
}

/// One colour texture per (surface, eye) and a depth buffer shared by all
/// six passes. Passes run sequentially and clear depth on entry.
pub struct RenderTargets {
    size: u32,
    color: SurfaceSet<PerEye<SurfaceTarget>>,
    _depth: Tracked<wgpu::Texture>,
    depth_view: wgpu::TextureView,
}

/// Checks a square target size against the device limit.
pub fn validate_size(size: u32, max_dimension: u32) -> Result<(), SetupError> {
    let reason = if size == 0 {
        "size must be non-zero".to_owned()
    } else if size > max_dimension {
        format!("{size} exceeds the device limit of {max_dimension}")
    } else {
        return Ok(());
    };
    Err(SetupError::RenderTarget {
        label: "surface targets".to_owned(),
        reason,
    })
}

impl RenderTargets {
    pub fn new(device: &wgpu::Device, ledger: &ResourceLedger, size: u32) -> Result<Self, SetupError> {
        validate_size(size, device.limits().max_texture_dimension_2d)?;

        let create = |label: &'static str, format, usage| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (ledger.track(label, texture), view)
        };

        let color = SurfaceSet::from_fn(|kind| {
            PerEye::from_fn(|eye| {
                let (texture, view) = create(
                    target_label(kind, eye),
                    COLOR_FORMAT,
                    wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                );
                SurfaceTarget {
                    _texture: texture,
                    view,
                }
            })
        });
        let (depth, depth_view) = create(
            "Surface Depth",
            DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        debug!("Created 6 surface targets at {size}x{size}");

        Ok(Self {
            size,
            color,
            _depth: depth,
            depth_view,
        })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn color(&self, kind: SurfaceKind, eye: Eye) -> &wgpu::TextureView {
        &self.color[kind][eye].view
    }

    pub fn depth(&self) -> &wgpu::TextureView {
        &self.depth_view
    }
}

fn target_label(kind: SurfaceKind, eye: Eye) -> &'static str {
    match (kind, eye) {
        (SurfaceKind::LeftWall, Eye::Left) => "Left Wall Target (left eye)",
        (SurfaceKind::LeftWall, Eye::Right) => "Left Wall Target (right eye)",
        (SurfaceKind::RightWall, Eye::Left) => "Right Wall Target (left eye)",
        (SurfaceKind::RightWall, Eye::Right) => "Right Wall Target (right eye)",
        (SurfaceKind::Floor, Eye::Left) => "Floor Target (left eye)",
        (SurfaceKind::Floor, Eye::Right) => "Floor Target (right eye)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_is_rejected() {
        let err = validate_size(0, 8192).unwrap_err();
        assert!(err.to_string().contains("non-zero"), "{err}");
    }

    #[test]
    fn oversized_target_is_rejected() {
        let err = validate_size(16384, 8192).unwrap_err();
        assert!(err.to_string().contains("8192"), "{err}");
        assert!(validate_size(8192, 8192).is_ok());
    }

    #[test]
    fn labels_are_unique() {
        let mut labels: Vec<_> = SurfaceKind::ALL
            .into_iter()
            .flat_map(|kind| Eye::ALL.map(|eye| target_label(kind, eye)))
            .collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), 6);
    }
}
