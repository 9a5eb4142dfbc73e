//! Mesh primitives
//!
//! Box, quad and wireframe-pyramid vertex generation, plus the vertex format
//! all pipelines share.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::surface::QUAD_CORNERS;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

    pub fn new(position: Vec3, uv: [f32; 2]) -> Self {
        Self {
            position: position.to_array(),
            uv,
        }
    }

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Cube spanning `[-1, 1]³` as a triangle list. Cube-map shaders sample by
/// position, so the UVs are unused but kept per face.
pub fn box_vertices() -> Vec<Vertex> {
    // (normal axis, right axis, up axis) per face
    let faces = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];
    faces
        .into_iter()
        .flat_map(|(normal, right, up)| {
            let corner = |u: f32, v: f32| Vertex::new(normal + right * u + up * v, [(u + 1.0) / 2.0, (1.0 - v) / 2.0]);
            [
                corner(-1.0, -1.0),
                corner(1.0, -1.0),
                corner(1.0, 1.0),
                corner(-1.0, -1.0),
                corner(1.0, 1.0),
                corner(-1.0, 1.0),
            ]
        })
        .collect()
}

/// The unit quad as two triangles. Texture row 0 is the top of the image, so
/// the bottom corners get v = 1.
pub fn quad_vertices() -> [Vertex; 6] {
    let [bl, br, tr, tl] = QUAD_CORNERS;
    [
        Vertex::new(bl, [0.0, 1.0]),
        Vertex::new(br, [1.0, 1.0]),
        Vertex::new(tr, [1.0, 0.0]),
        Vertex::new(bl, [0.0, 1.0]),
        Vertex::new(tr, [1.0, 0.0]),
        Vertex::new(tl, [0.0, 0.0]),
    ]
}

/// Number of vertices [`pyramid_lines`] produces.
pub const PYRAMID_LINE_VERTICES: usize = 16;

/// Wireframe pyramid as a line list: four edges from `apex` to the base
/// corners, then the base outline.
pub fn pyramid_lines(apex: Vec3, base: &[Vec3; 4]) -> [Vertex; PYRAMID_LINE_VERTICES] {
    let v = |p: Vec3| Vertex::new(p, [0.0, 0.0]);
    [
        v(apex),
        v(base[0]),
        v(apex),
        v(base[1]),
        v(apex),
        v(base[2]),
        v(apex),
        v(base[3]),
        v(base[0]),
        v(base[1]),
        v(base[1]),
        v(base[2]),
        v(base[2]),
        v(base[3]),
        v(base[3]),
        v(base[0]),
    ]
}
