//! Interaction controller
//!
//! Maps one sampled [`InputSnapshot`] per frame to scene mutations. Toggles are
//! edge-triggered through [`ButtonLatch`], so holding a button fires its action
//! exactly once.

use glam::{Mat4, Vec2, Vec3};
use log::info;

/// Scale the manipulable object starts at and resets to.
pub const DEFAULT_SCALE: f32 = 0.2;
/// Smallest accepted object scale (inclusive).
pub const MIN_SCALE: f32 = 0.01;
/// Largest accepted object scale (exclusive).
pub const MAX_SCALE: f32 = 1.0;

/// Scale change per frame at full stick deflection.
const SCALE_STEP: f32 = 0.01;
/// Translation per frame at full stick deflection.
const MOVE_STEP: f32 = 0.01;
/// Hand trigger value above which the controller becomes the eye.
pub const TRIGGER_THRESHOLD: f32 = 0.5;

/// Raw button and axis state for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputSnapshot {
    pub button_a: bool,
    pub button_b: bool,
    pub button_x: bool,
    pub left_thumb: bool,
    pub left_stick: Vec2,
    pub right_stick: Vec2,
    /// Right hand trigger, 0.0 to 1.0.
    pub hand_trigger: f32,
}

/// Two-state latch for one logical button.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ButtonLatch {
    #[default]
    Released,
    Pressed,
}

impl ButtonLatch {
    /// Feeds the current physical state; returns true only on a fresh press.
    pub fn update(&mut self, pressed: bool) -> bool {
        match (*self, pressed) {
            (ButtonLatch::Released, true) => {
                *self = ButtonLatch::Pressed;
                true
            }
            (ButtonLatch::Pressed, false) => {
                *self = ButtonLatch::Released;
                false
            }
            _ => false,
        }
    }
}

/// The object the user can move and resize.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneObject {
    pub transform: Mat4,
    pub scale: f32,
}

impl Default for SceneObject {
    fn default() -> Self {
        Self {
            transform: Mat4::from_translation(Vec3::new(0.0, 0.0, -1.0)),
            scale: DEFAULT_SCALE,
        }
    }
}

impl SceneObject {
    pub fn model_matrix(&self) -> Mat4 {
        self.transform * Mat4::from_scale(Vec3::splat(self.scale))
    }

    pub fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }
}

/// What changed this frame, for logging and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InteractionEvents {
    pub debug_toggled: bool,
    pub tracking_toggled: bool,
    pub fault_toggled: bool,
    pub scale_reset: bool,
}

/// Mode flags and button latches; lives for the whole run.
#[derive(Clone, Debug, PartialEq)]
pub struct InteractionState {
    debug_latch: ButtonLatch,
    tracking_latch: ButtonLatch,
    fault_latch: ButtonLatch,
    pub tracking_enabled: bool,
    pub debug_overlay: bool,
    pub fault_injection: bool,
    pub view_from_controller: bool,
}

impl Default for InteractionState {
    fn default() -> Self {
        Self {
            debug_latch: ButtonLatch::Released,
            tracking_latch: ButtonLatch::Released,
            fault_latch: ButtonLatch::Released,
            tracking_enabled: true,
            debug_overlay: false,
            fault_injection: false,
            view_from_controller: false,
        }
    }
}

impl InteractionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one frame of input to the mode flags and to `object`.
    pub fn apply(&mut self, input: &InputSnapshot, object: &mut SceneObject) -> InteractionEvents {
        let mut events = InteractionEvents::default();

        // Left stick X resizes
        if input.left_stick.x != 0.0 {
            let candidate = object.scale + input.left_stick.x * SCALE_STEP;
            if (MIN_SCALE..MAX_SCALE).contains(&candidate) {
                object.scale = candidate;
            }
        }

        // Left stick click resets size
        if input.left_thumb {
            object.scale = DEFAULT_SCALE;
            events.scale_reset = true;
        }

        // Right stick moves in X/Y, left stick Y moves in depth
        let delta = Vec3::new(
            input.right_stick.x * MOVE_STEP,
            input.right_stick.y * MOVE_STEP,
            -input.left_stick.y * MOVE_STEP,
        );
        if delta != Vec3::ZERO {
            object.transform *= Mat4::from_translation(delta);
        }

        if self.debug_latch.update(input.button_a) {
            self.debug_overlay = !self.debug_overlay;
            events.debug_toggled = true;
            info!("Debug overlay: {}", self.debug_overlay);
        }

        if self.tracking_latch.update(input.button_b) {
            self.tracking_enabled = !self.tracking_enabled;
            events.tracking_toggled = true;
            info!("Tracking: {}", if self.tracking_enabled { "on" } else { "frozen" });
        }

        if self.fault_latch.update(input.button_x) {
            self.fault_injection = !self.fault_injection;
            events.fault_toggled = true;
            info!("Fault injection: {}", self.fault_injection);
        }

        let from_controller = input.hand_trigger > TRIGGER_THRESHOLD;
        if from_controller != self.view_from_controller {
            info!("Viewing from {}", if from_controller { "controller" } else { "headset" });
        }
        self.view_from_controller = from_controller;

        events
    }
}
