//! Run configuration
//!
//! Built-in defaults, optionally overridden by a JSON file and then by
//! command-line flags. Nothing is ever written back.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::SetupError;
use crate::frustum;

/// Command-line options.
#[derive(Clone, Debug, clap::Parser)]
#[command(name = "cave-vr", about = "Virtual CAVE rendered inside a head-mounted display")]
pub struct CaveArgs {
    /// Directory containing the texture assets.
    #[arg(long = "assets", value_name = "DIR", default_value = "../Project3-Assets")]
    pub assets: PathBuf,

    /// JSON file overriding the default configuration.
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Side length of the square off-axis render targets, in pixels.
    #[arg(long = "target-size", value_name = "PIXELS")]
    pub target_size: Option<u32>,

    /// Additional logging to stderr.
    #[arg(long = "verbose", short = 'v')]
    pub verbose: bool,
}

impl CaveArgs {
    /// Resolves the effective configuration for this run.
    pub fn build_config(&self) -> Result<CaveConfig, SetupError> {
        let mut config = match &self.config {
            Some(path) => CaveConfig::from_file(path)?,
            None => CaveConfig::default(),
        };
        if let Some(size) = self.target_size {
            config.render_target_size = size;
        }
        config.validate().map_err(|reason| SetupError::Config {
            path: self.config.clone(),
            reason,
        })?;
        Ok(config)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaveConfig {
    /// Side length of each off-axis render target.
    pub render_target_size: u32,
    /// Near plane of the off-axis frusta.
    pub near: f32,
    /// Far plane of the off-axis frusta.
    pub far: f32,
    /// Lateral eye offset when viewing from the controller.
    pub controller_eye_offset: f32,
    /// Inter-pupillary distance of the simulated headset.
    pub ipd: f32,
    /// Vertical field of view of each headset eye, in degrees.
    pub eye_fov_y_degrees: f32,
    /// Per-eye buffer resolution of the simulated headset.
    pub eye_size: [u32; 2],
    /// The mirror window is the eye buffer divided by this.
    pub mirror_divisor: u32,
    pub clear_color: [f32; 3],
}

impl Default for CaveConfig {
    fn default() -> Self {
        Self {
            render_target_size: 1024,
            near: frustum::NEAR,
            far: frustum::FAR,
            controller_eye_offset: 0.0325,
            ipd: 0.064,
            eye_fov_y_degrees: 90.0,
            eye_size: [1344, 1600],
            mirror_divisor: 4,
            clear_color: [0.5, 0.5, 0.5],
        }
    }
}

impl CaveConfig {
    pub fn from_file(path: &Path) -> Result<Self, SetupError> {
        let config_error = |reason: String| SetupError::Config {
            path: Some(path.to_owned()),
            reason,
        };
        let text = fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| config_error(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.render_target_size == 0 {
            return Err("render_target_size must be positive".into());
        }
        if !(self.near > 0.0 && self.near < self.far) {
            return Err(format!("need 0 < near < far, got near={} far={}", self.near, self.far));
        }
        if self.eye_size.contains(&0) || self.mirror_divisor == 0 {
            return Err("eye_size and mirror_divisor must be positive".into());
        }
        if !(self.eye_fov_y_degrees > 0.0 && self.eye_fov_y_degrees < 180.0) {
            return Err(format!("eye_fov_y_degrees out of range: {}", self.eye_fov_y_degrees));
        }
        Ok(())
    }

    /// Size of the on-screen mirror window.
    pub fn mirror_size(&self) -> (u32, u32) {
        (
            (self.eye_size[0] * 2 / self.mirror_divisor).max(1),
            (self.eye_size[1] / self.mirror_divisor).max(1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    #[test]
    fn defaults_are_valid() {
        let config = CaveConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.mirror_size(), (672, 400));
    }

    #[test]
    fn json_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "render_target_size": 512, "ipd": 0.07 }}"#).unwrap();

        let config = CaveConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config,
            CaveConfig {
                render_target_size: 512,
                ipd: 0.07,
                ..CaveConfig::default()
            }
        );
    }

    #[test]
    fn unknown_field_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "render_target_sise": 512 }}"#).unwrap();
        assert!(matches!(
            CaveConfig::from_file(file.path()),
            Err(SetupError::Config { .. })
        ));
    }

    #[test]
    fn invalid_planes_fail_validation() {
        let config = CaveConfig {
            near: 10.0,
            far: 1.0,
            ..CaveConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn command_line_overrides_target_size() {
        let args = CaveArgs::parse_from(["cave-vr", "--target-size", "256", "--assets", "assets"]);
        assert_eq!(args.assets, PathBuf::from("assets"));
        let config = args.build_config().unwrap();
        assert_eq!(config.render_target_size, 256);

        let zero = CaveArgs::parse_from(["cave-vr", "--target-size", "0"]);
        assert!(matches!(zero.build_config(), Err(SetupError::Config { path: None, .. })));
    }
}
