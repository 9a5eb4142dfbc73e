//! Per-draw uniforms
//!
//! All draws of a frame write their uniforms into one buffer at distinct,
//! aligned offsets, so the last write before `submit` no longer wins for
//! every draw. The buffer is bound with a dynamic offset per draw.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use log::warn;

/// Surface shading modes understood by `surface.wgsl`.
pub const MODE_TEXTURED: u32 = 0;
pub const MODE_BROKEN: u32 = 2;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub transform: [[f32; 4]; 4],
    pub color: [f32; 4],
    // x = surface mode
    pub flags: [u32; 4],
}

impl DrawUniforms {
    pub fn new(projection: Mat4, view: Mat4, transform: Mat4) -> Self {
        Self {
            projection: projection.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            transform: transform.to_cols_array_2d(),
            color: [1.0; 4],
            flags: [MODE_TEXTURED, 0, 0, 0],
        }
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color.extend(1.0).to_array();
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.flags[0] = mode;
        self
    }
}

/// CPU-side staging of one frame's [`DrawUniforms`] with their offsets.
pub struct UniformArena {
    stride: u64,
    capacity: u32,
    staging: Vec<u8>,
    len: u32,
}

impl UniformArena {
    pub fn new(alignment: u32, capacity: u32) -> Self {
        let size = std::mem::size_of::<DrawUniforms>() as u64;
        let alignment = u64::from(alignment.max(1));
        let stride = size.div_ceil(alignment) * alignment;
        Self {
            stride,
            capacity,
            staging: vec![0; (stride * u64::from(capacity)) as usize],
            len: 0,
        }
    }

    pub fn buffer_size(&self) -> u64 {
        self.stride * u64::from(self.capacity)
    }

    pub fn binding_size() -> wgpu::BufferSize {
        wgpu::BufferSize::new(std::mem::size_of::<DrawUniforms>() as u64)
            .unwrap_or(wgpu::BufferSize::MIN)
    }

    pub fn reset(&mut self) {
        self.len = 0;
    }

    /// Stages `uniforms` and returns the dynamic offset to bind them with,
    /// or `None` when the frame has run out of slots.
    pub fn push(&mut self, uniforms: DrawUniforms) -> Option<u32> {
        if self.len >= self.capacity {
            warn!("Uniform arena full ({} draws), dropping draw", self.capacity);
            return None;
        }
        let offset = self.stride * u64::from(self.len);
        let bytes = bytemuck::bytes_of(&uniforms);
        let start = offset as usize;
        self.staging[start..start + bytes.len()].copy_from_slice(bytes);
        self.len += 1;
        u32::try_from(offset).ok()
    }

    /// Copies everything staged this frame into `buffer`.
    pub fn flush(&self, queue: &wgpu::Queue, buffer: &wgpu::Buffer) {
        if self.len > 0 {
            let used = (self.stride * u64::from(self.len)) as usize;
            queue.write_buffer(buffer, 0, &self.staging[..used]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    impl DrawUniforms {
        fn clip_from_object(&self) -> Mat4 {
            Mat4::from_cols_array_2d(&self.projection)
                * Mat4::from_cols_array_2d(&self.view)
                * Mat4::from_cols_array_2d(&self.transform)
        }
    }

    impl UniformArena {
        fn get(&self, offset: u32) -> DrawUniforms {
            let start = offset as usize;
            bytemuck::pod_read_unaligned(&self.staging[start..start + std::mem::size_of::<DrawUniforms>()])
        }
    }

    #[test]
    fn offsets_respect_alignment() {
        let mut arena = UniformArena::new(256, 4);
        let a = DrawUniforms::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY);
        let b = a.with_mode(MODE_BROKEN).with_color(Vec3::X);
        assert_eq!(arena.push(a), Some(0));
        assert_eq!(arena.push(b), Some(256));
        assert_eq!(arena.get(256), b);
        assert_eq!(arena.get(0), a);
        assert_eq!(arena.buffer_size(), 1024);
    }

    #[test]
    fn full_arena_refuses_draws_until_reset() {
        let mut arena = UniformArena::new(64, 2);
        let u = DrawUniforms::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY);
        assert!(arena.push(u).is_some());
        assert!(arena.push(u).is_some());
        assert_eq!(arena.push(u), None);
        arena.reset();
        assert_eq!(arena.len, 0);
        assert_eq!(arena.push(u), Some(0));
    }

    #[test]
    fn clip_from_object_composes_in_order() {
        let projection = Mat4::from_scale(Vec3::splat(2.0));
        let view = Mat4::from_translation(Vec3::X);
        let transform = Mat4::from_rotation_z(1.0);
        let u = DrawUniforms::new(projection, view, transform);
        assert!(u.clip_from_object().abs_diff_eq(projection * view * transform, 1e-6));
    }
}
