//! Texture assets
//!
//! Decodes images from disk and uploads them as GPU textures. Decoded pixel
//! data is moved into the upload functions and freed as soon as the copy to
//! the GPU has been queued.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, info};

use crate::eye::Eye;
use crate::resources::{ResourceLedger, Tracked};

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("could not locate {path:?}")]
    NotFound { path: PathBuf },

    #[error("{path:?} has zero width or height")]
    Empty { path: PathBuf },

    #[error("could not decode {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{path:?} is {found:?}, expected {expected:?}")]
    FaceMismatch {
        path: PathBuf,
        expected: (u32, u32),
        found: (u32, u32),
    },
}

/// Decoded RGBA8 pixels. Clones share the pixel buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Rc<[u8]>,
}

/// Decodes `path` to RGBA8. Never returns an empty image.

pub fn load_image(path: &Path) -> Result<ImageData, AssetError> {
    if !path.is_file() {
        return Err(AssetError::NotFound { path: path.to_owned() });
    }
    let image = image::open(path)
        .map_err(|source| AssetError::Decode {
            path: path.to_owned(),
            source,
        })?
        .to_rgba8();
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(AssetError::Empty { path: path.to_owned() });
    }
    debug!("Loaded {path:?} ({width}x{height})");
    Ok(ImageData {
        width,
        height,
        rgba: image.into_raw().into(),
    })
}

/// Six square faces in +X, -X, +Y, -Y, +Z, -Z order.
#[derive(Clone, Debug)]
pub struct CubeFaces {
    pub size: u32,
    pub faces: [ImageData; 6],
}

impl CubeFaces {
    /// The same image on every face, cropped to a square if needed.
    pub fn uniform(image: ImageData) -> Self {
        let image = if image.width == image.height {
            image
        } else {
            crop_square(image)
        };
        Self {
            size: image.width,
            faces: std::array::from_fn(|_| image.clone()),
        }
    }
}

fn crop_square(image: ImageData) -> ImageData {
    let side = image.width.min(image.height);
    let row_bytes = (image.width * 4) as usize;
    let rgba: Rc<[u8]> = image
        .rgba
        .chunks_exact(row_bytes)
        .take(side as usize)
        .flat_map(|row| &row[..(side * 4) as usize])
        .copied()
        .collect();
    ImageData {
        width: side,
        height: side,
        rgba,
    }
}

pub fn load_cube(paths: &[PathBuf; 6]) -> Result<CubeFaces, AssetError> {
    let [px, nx, py, ny, pz, nz] = paths.each_ref().map(|path| load_image(path));
    let faces = [px?, nx?, py?, ny?, pz?, nz?];

    let size = faces[0].width;
    for (path, face) in paths.iter().zip(&faces) {
        if (face.width, face.height) != (size, size) {
            return Err(AssetError::FaceMismatch {
                path: path.clone(),
                expected: (size, size),
                found: (face.width, face.height),
            });
        }
    }
    Ok(CubeFaces { size, faces })
}

/// Relative locations of the textures the scene needs.
#[derive(Clone, Debug)]
pub struct AssetManifest {
    root: PathBuf,
}

impl AssetManifest {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Calibration pattern shown on every face of the manipulable box.
    pub fn test_pattern(&self) -> PathBuf {
        self.root.join("vr_test_pattern.ppm")
    }

    /// Stereo skybox faces rendered behind the box in the surface passes.
    pub fn eye_skybox(&self, eye: Eye) -> [PathBuf; 6] {
        let dir = match eye {
            Eye::Left => "left-ppm",
            Eye::Right => "right-ppm",
        };
        ["px", "nx", "py", "ny", "pz", "nz"].map(|face| self.root.join(dir).join(format!("{face}.ppm")))
    }

    /// Sunset skybox surrounding the CAVE itself.
    pub fn environment(&self) -> [PathBuf; 6] {
        ["Left", "Right", "Up", "Down", "Front", "Back"]
            .map(|face| self.root.join("bsk").join(format!("SunSet{face}2048.ppm")))
    }

    pub fn all(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.test_pattern()];
        paths.extend(self.eye_skybox(Eye::Left));
        paths.extend(self.eye_skybox(Eye::Right));
        paths.extend(self.environment());
        paths
    }

    /// Fails on the first missing file, before anything is decoded.
    pub fn check_present(&self) -> Result<(), AssetError> {
        match self.all().into_iter().find(|path| !path.is_file()) {
            Some(path) => Err(AssetError::NotFound { path }),
            None => {
                info!("All assets present under {:?}", self.root);
                Ok(())
            }
        }
    }
}

/// Uploads a cube map; `cube` is consumed and its host memory freed here.
pub fn upload_cube(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    ledger: &ResourceLedger,
    label: &'static str,
    cube: CubeFaces,
) -> (Tracked<wgpu::Texture>, wgpu::TextureView) {
    let size = wgpu::Extent3d {
        width: cube.size,
        height: cube.size,
        depth_or_array_layers: 6,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    for (layer, face) in (0u32..).zip(cube.faces) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            &face.rgba[..],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(cube.size * 4),
                rows_per_image: Some(cube.size),
            },
            wgpu::Extent3d {
                width: cube.size,
                height: cube.size,
                depth_or_array_layers: 1,
            },
        );
        // The queue has its own staging copy; `face` drops here.
    }

    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(label),
        dimension: Some(wgpu::TextureViewDimension::Cube),
        ..Default::default()
    });
    (ledger.track(label, texture), view)
}
