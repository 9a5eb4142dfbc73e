//! Fatal setup errors
//!
//! Anything in here aborts startup. Per-frame problems have their own, local
//! error types ([`crate::frustum::FrustumError`], [`crate::input::InputError`]).

use std::path::PathBuf;

use crate::assets::AssetError;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("failed to load asset")]
    Asset(#[from] AssetError),

    #[error("failed to create rendering window")]
    Window(#[from] winit::error::OsError),

    #[error("window has no usable raw handle")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    #[error("failed to create rendering surface")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("failed to create GPU device")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,

    #[error("render target {label:?} is incomplete: {reason}")]
    RenderTarget { label: String, reason: String },

    #[error("invalid configuration in {path:?}: {reason}")]
    Config { path: Option<PathBuf>, reason: String },
}
