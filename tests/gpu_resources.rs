//! GPU resource lifetime tests. Skipped when no adapter is available.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use glam::{Mat4, Quat, Vec3};
use pretty_assertions::assert_eq;

use cave_vr::assets::{self, AssetManifest, CubeFaces, ImageData};
use cave_vr::config::CaveConfig;
use cave_vr::eye::{Eye, PerEye, TrackedPose};
use cave_vr::hmd::{self, EyeBuffer, EyeBufferViews, HmdSession, Viewport};
use cave_vr::input::FrameInput;
use cave_vr::interaction::InputSnapshot;
use cave_vr::render_targets::RenderTargets;
use cave_vr::renderer::{CaveRenderer, GpuContext};
use cave_vr::resources::ResourceLedger;
use cave_vr::scene::CaveScene;

fn gpu() -> Option<GpuContext> {
    match GpuContext::headless() {
        Ok(gpu) => Some(gpu),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

/// Offscreen stand-in for a headset.
struct HeadlessHmd {
    eye_buffer: EyeBuffer,
    frames_begun: u32,
    frames_submitted: u32,
}

impl HmdSession for HeadlessHmd {
    fn eye_viewport(&self, eye: Eye) -> Viewport {
        Viewport::side_by_side(self.eye_buffer.eye_size(), eye)
    }

    fn eye_projection(&self, eye: Eye) -> Mat4 {
        hmd::eye_projection(90.0, self.eye_viewport(eye), 0.01, 100.0)
    }

    fn eye_buffer(&self) -> EyeBufferViews<'_> {
        self.eye_buffer.views()
    }

    fn begin_frame(&mut self, _gpu: &GpuContext) -> bool {
        self.frames_begun += 1;
        true
    }

    fn submit(&mut self, gpu: &GpuContext, encoder: wgpu::CommandEncoder) {
        gpu.queue.submit(std::iter::once(encoder.finish()));
        self.frames_submitted += 1;
    }
}

fn write_ppm(path: &Path, size: u32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut bytes = format!("P6\n{size} {size}\n255\n").into_bytes();
    bytes.extend((0..size * size).flat_map(|i| [(i * 7 % 256) as u8, 128, 64]));
    fs::write(path, bytes).unwrap();
}

fn test_config() -> CaveConfig {
    CaveConfig {
        render_target_size: 64,
        eye_size: [48, 40],
        ..CaveConfig::default()
    }
}

#[test]
fn render_targets_release_everything_on_drop() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();

    let targets = RenderTargets::new(&gpu.device, &ledger, 32).unwrap();
    assert_eq!(targets.size(), 32);
    assert_eq!(ledger.live(), 7);
    drop(targets);
    assert_eq!((ledger.live(), ledger.created()), (0, 7));
}

#[test]
fn oversized_render_targets_are_rejected_up_front() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();
    let too_big = gpu.device.limits().max_texture_dimension_2d + 1;
    assert!(RenderTargets::new(&gpu.device, &ledger, too_big).is_err());
    assert_eq!(ledger.created(), 0);
}

#[test]
fn cube_upload_frees_host_pixels() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();
    let cube = CubeFaces::uniform(ImageData {
        width: 4,
        height: 4,
        rgba: vec![200; 4 * 4 * 4].into(),
    });
    let pixels = Rc::downgrade(&cube.faces[0].rgba);
    assert_eq!(pixels.strong_count(), 6);

    let (texture, view) = assets::upload_cube(&gpu.device, &gpu.queue, &ledger, "Host Release Cube", cube);
    assert!(pixels.upgrade().is_none());
    assert_eq!(ledger.live(), 1);

    drop(view);
    drop(texture);
    assert_eq!(ledger.live(), 0);
}

#[test]
fn renderer_draws_frames_and_shuts_down_cleanly() {
    let Some(gpu) = gpu() else { return };
    let dir = tempfile::tempdir().unwrap();
    let manifest = AssetManifest::new(dir.path());
    for path in manifest.all() {
        write_ppm(&path, 8);
    }
    manifest.check_present().unwrap();

    let config = test_config();
    let ledger = ResourceLedger::new();
    let mut hmd = HeadlessHmd {
        eye_buffer: EyeBuffer::new(&gpu.device, &ledger, (48, 40)).unwrap(),
        frames_begun: 0,
        frames_submitted: 0,
    };
    let mut renderer = CaveRenderer::new(&gpu, &config, &manifest, &ledger).unwrap();
    assert!(ledger.live() > 0);

    let mut scene = CaveScene::new(&config).unwrap();
    let head = PerEye::from_fn(|eye| TrackedPose::new(Vec3::X * eye.sign() * 0.032, Quat::IDENTITY));
    let frames = [
        InputSnapshot::default(),
        // Debug overlay and fault injection on.
        InputSnapshot {
            button_a: true,
            button_x: true,
            ..Default::default()
        },
        InputSnapshot::default(),
    ];
    for buttons in frames {
        let input = FrameInput {
            head,
            hand: None,
            buttons,
        };
        scene.update(&input);
        renderer.render_frame(&gpu, &scene, &input.head, &mut hmd);
    }
    assert!(scene.interaction.debug_overlay && scene.interaction.fault_injection);
    assert_eq!((hmd.frames_begun, hmd.frames_submitted), (3, 3));

    gpu.device.poll(wgpu::Maintain::Wait);
    drop(renderer);
    drop(hmd);
    assert_eq!(ledger.live(), 0);
}

#[test]
fn missing_asset_fails_renderer_creation() {
    let Some(gpu) = gpu() else { return };
    let dir = tempfile::tempdir().unwrap();
    let manifest = AssetManifest::new(dir.path());
    let ledger = ResourceLedger::new();

    let result = CaveRenderer::new(&gpu, &test_config(), &manifest, &ledger);
    assert!(result.is_err());
    assert_eq!(ledger.live(), 0);
}
