//! Input handling module
//!
//! Per-frame pose and button sampling. The core only sees [`FrameInput`]
//! through the [`PoseSource`] trait; [`DesktopPoseSource`] stands in for a
//! headset with a keyboard-driven head and a gamepad (or keyboard) controller.

use gilrs::{Axis, Button, Event, EventType, Gilrs};
use glam::{EulerRot, Quat, Vec2, Vec3};
use log::{info, warn};
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::eye::{Eye, PerEye, TrackedPose};
use crate::interaction::InputSnapshot;

/// Everything the core reads from the tracking system in one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameInput {
    pub head: PerEye<TrackedPose>,
    pub hand: Option<TrackedPose>,
    pub buttons: InputSnapshot,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("tracking returned a non-finite pose")]
    InvalidPose,
    #[error("tracking device unavailable: {0}")]
    Unavailable(String),
}

/// Supplies one [`FrameInput`] per frame.
pub trait PoseSource {
    fn sample(&mut self) -> Result<FrameInput, InputError>;

    /// Makes the current head position the origin.
    fn recenter(&mut self) {}
}

/// Wraps a [`PoseSource`] so a failed sample reuses the previous frame.
pub struct LastGoodInput<S> {
    source: S,
    last: FrameInput,
    failing: bool,
}

impl<S: PoseSource> LastGoodInput<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            last: FrameInput::default(),
            failing: false,
        }
    }

    pub fn sample(&mut self) -> FrameInput {
        match self.source.sample() {
            Ok(input) => {
                if self.failing {
                    info!("Tracking recovered");
                    self.failing = false;
                }
                self.last = input;
            }
            Err(e) => {
                if !self.failing {
                    warn!("Input sample failed, reusing previous frame: {e}");
                    self.failing = true;
                }
            }
        }
        self.last
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

/// Keyboard state for the simulated headset and controller.
#[derive(Clone, Copy, Debug, Default)]
struct KeyState {
    forward: bool,
    back: bool,
    left: bool,
    right: bool,
    up: bool,
    down: bool,
    yaw_left: bool,
    yaw_right: bool,
    pitch_up: bool,
    pitch_down: bool,
    button_a: bool,
    button_b: bool,
    button_x: bool,
    left_thumb: bool,
    trigger: bool,
    grow: bool,
    shrink: bool,
    move_left: bool,
    move_right: bool,
    move_up: bool,
    move_down: bool,
    move_near: bool,
    move_far: bool,
}

/// Gamepad state accumulated from gilrs events.
#[derive(Clone, Copy, Debug, Default)]
struct PadState {
    south: bool,
    east: bool,
    west: bool,
    left_thumb: bool,
    left_stick: Vec2,
    right_stick: Vec2,
    right_trigger: f32,
}

/// Simulated headset and controller for desktop runs.
pub struct DesktopPoseSource {
    gilrs: Option<Gilrs>,
    keys: KeyState,
    pad: PadState,
    head_position: Vec3,
    yaw: f32,
    pitch: f32,
    ipd: f32,
}

impl DesktopPoseSource {
    /// Head translation per frame while a movement key is held.
    const MOVE_SPEED: f32 = 0.01;
    /// Head rotation per frame while a look key is held (radians).
    const TURN_SPEED: f32 = 0.02;
    /// Stick values below this are treated as zero.
    const DEADZONE: f32 = 0.1;
    /// Controller position relative to the head.
    const HAND_OFFSET: Vec3 = Vec3::new(0.2, -0.25, -0.3);

    pub fn new(ipd: f32) -> Self {
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Gamepad system initialized");
                Some(g)
            }
            Err(e) => {
                info!("No gamepad support: {:?}", e);
                None
            }
        };

        Self {
            gilrs,
            keys: KeyState::default(),
            pad: PadState::default(),
            head_position: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            ipd,
        }
    }

    /// Tracks key state from window events.
    pub fn handle_keyboard_input(&mut self, event: &KeyEvent) {
        let pressed = event.state == ElementState::Pressed;
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let keys = &mut self.keys;
        match code {
            KeyCode::KeyW => keys.forward = pressed,
            KeyCode::KeyS => keys.back = pressed,
            KeyCode::KeyA => keys.left = pressed,
            KeyCode::KeyD => keys.right = pressed,
            KeyCode::KeyE => keys.up = pressed,
            KeyCode::KeyQ => keys.down = pressed,
            KeyCode::ArrowLeft => keys.yaw_left = pressed,
            KeyCode::ArrowRight => keys.yaw_right = pressed,
            KeyCode::ArrowUp => keys.pitch_up = pressed,
            KeyCode::ArrowDown => keys.pitch_down = pressed,
            KeyCode::Digit1 => keys.button_a = pressed,
            KeyCode::Digit2 => keys.button_b = pressed,
            KeyCode::Digit3 => keys.button_x = pressed,
            KeyCode::KeyF => keys.left_thumb = pressed,
            KeyCode::KeyT => keys.trigger = pressed,
            KeyCode::Equal => keys.grow = pressed,
            KeyCode::Minus => keys.shrink = pressed,
            KeyCode::KeyJ => keys.move_left = pressed,
            KeyCode::KeyL => keys.move_right = pressed,
            KeyCode::KeyI => keys.move_up = pressed,
            KeyCode::KeyK => keys.move_down = pressed,
            KeyCode::KeyU => keys.move_far = pressed,
            KeyCode::KeyO => keys.move_near = pressed,
            _ => {}
        }
    }

    fn poll_gamepad(&mut self) {
        // Collect events first to avoid borrow checker issues
        let events: Vec<_> = if let Some(gilrs) = &mut self.gilrs {
            let mut events = Vec::new();
            while let Some(Event { event, .. }) = gilrs.next_event() {
                events.push(event);
            }
            events
        } else {
            Vec::new()
        };

        for event in events {
            match event {
                EventType::ButtonPressed(button, _) => self.handle_button(button, true),
                EventType::ButtonReleased(button, _) => self.handle_button(button, false),
                EventType::ButtonChanged(Button::RightTrigger2, value, _) => {
                    self.pad.right_trigger = value;
                }
                EventType::AxisChanged(axis, value, _) => self.handle_axis(axis, value),
                EventType::Disconnected => {
                    info!("Gamepad disconnected");
                    self.pad = PadState::default();
                }
                _ => {}
            }
        }
    }

    fn handle_button(&mut self, button: Button, pressed: bool) {
        match button {
            Button::South => self.pad.south = pressed,
            Button::East => self.pad.east = pressed,
            Button::West => self.pad.west = pressed,
            Button::LeftThumb => self.pad.left_thumb = pressed,
            _ => {}
        }
    }

    fn handle_axis(&mut self, axis: Axis, value: f32) {
        let value = if value.abs() < Self::DEADZONE { 0.0 } else { value };

        match axis {
            Axis::LeftStickX => self.pad.left_stick.x = value,
            Axis::LeftStickY => self.pad.left_stick.y = value,
            Axis::RightStickX => self.pad.right_stick.x = value,
            Axis::RightStickY => self.pad.right_stick.y = value,
            Axis::RightZ => self.pad.right_trigger = value.max(0.0),
            _ => {}
        }
    }

    fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    fn step_head(&mut self) {
        let keys = self.keys;
        let axis = |pos: bool, neg: bool| f32::from(u8::from(pos)) - f32::from(u8::from(neg));

        self.yaw += axis(keys.yaw_left, keys.yaw_right) * Self::TURN_SPEED;
        self.pitch = (self.pitch + axis(keys.pitch_up, keys.pitch_down) * Self::TURN_SPEED)
            .clamp(-1.5, 1.5);

        let local = Vec3::new(
            axis(keys.right, keys.left),
            axis(keys.up, keys.down),
            axis(keys.back, keys.forward),
        );
        let heading = Quat::from_rotation_y(self.yaw);
        self.head_position += heading * local * Self::MOVE_SPEED;
    }

    fn buttons(&self) -> InputSnapshot {
        let keys = self.keys;
        let pad = self.pad;
        let axis = |pos: bool, neg: bool| f32::from(u8::from(pos)) - f32::from(u8::from(neg));
        let or_key = |stick: f32, key: f32| if stick != 0.0 { stick } else { key };

        InputSnapshot {
            button_a: pad.south || keys.button_a,
            button_b: pad.east || keys.button_b,
            button_x: pad.west || keys.button_x,
            left_thumb: pad.left_thumb || keys.left_thumb,
            left_stick: Vec2::new(
                or_key(pad.left_stick.x, axis(keys.grow, keys.shrink)),
                or_key(pad.left_stick.y, axis(keys.move_far, keys.move_near)),
            ),
            right_stick: Vec2::new(
                or_key(pad.right_stick.x, axis(keys.move_right, keys.move_left)),
                or_key(pad.right_stick.y, axis(keys.move_up, keys.move_down)),
            ),
            hand_trigger: if keys.trigger { 1.0 } else { pad.right_trigger },
        }
    }
}

impl PoseSource for DesktopPoseSource {
    fn sample(&mut self) -> Result<FrameInput, InputError> {
        self.poll_gamepad();
        self.step_head();

        let orientation = self.orientation();
        let head_right = orientation * Vec3::X;
        let head = PerEye::from_fn(|eye: Eye| {
            TrackedPose::new(
                self.head_position + head_right * eye.sign() * self.ipd / 2.0,
                orientation,
            )
        });
        let hand = TrackedPose::new(
            self.head_position + Quat::from_rotation_y(self.yaw) * Self::HAND_OFFSET,
            orientation,
        );

        if !(head.left.is_finite() && head.right.is_finite() && hand.is_finite()) {
            return Err(InputError::InvalidPose);
        }

        Ok(FrameInput {
            head,
            hand: Some(hand),
            buttons: self.buttons(),
        })
    }

    fn recenter(&mut self) {
        info!("Recentering tracking origin");
        self.head_position = Vec3::ZERO;
        self.yaw = 0.0;
        self.pitch = 0.0;
    }
}
