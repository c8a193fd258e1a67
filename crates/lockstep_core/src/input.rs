//! Packed per-tick player input
//!
//! Layout of the 64-bit value:
//! - bits  0-7  : eight digital buttons
//! - bits  8-15 : hat X (i8)
//! - bits 16-23 : hat Y (i8)
//! - bits 24-31 : mouse dX (i8)
//! - bits 32-39 : mouse dY (i8)
//! - bits 40-63 : reserved, zero

use crate::time::Tick;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Digital buttons, by bit index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    Forward = 0,
    Back = 1,
    Left = 2,
    Right = 3,
    Primary = 4,
    Secondary = 5,
    Aim = 6,
    Sprint = 7,
}

impl Button {
    pub const ALL: [Button; 8] = [
        Button::Forward,
        Button::Back,
        Button::Left,
        Button::Right,
        Button::Primary,
        Button::Secondary,
        Button::Aim,
        Button::Sprint,
    ];

    pub fn bit(self) -> u32 {
        self as u32
    }
}

const HAT_X_SHIFT: u32 = 8;
const HAT_Y_SHIFT: u32 = 16;
const MOUSE_DX_SHIFT: u32 = 24;
const MOUSE_DY_SHIFT: u32 = 32;

/// One tick of player input packed into 64 bits.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct PackedInput {
    pub packed: u64,
}

impl PackedInput {
    pub const NONE: PackedInput = PackedInput { packed: 0 };

    pub const fn from_bits(packed: u64) -> Self {
        Self { packed }
    }

    pub fn from_buttons(buttons: &[Button]) -> Self {
        let mut input = Self::NONE;
        for &b in buttons {
            input.set_button(b, true);
        }
        input
    }

    pub fn button(&self, button: Button) -> bool {
        self.packed & (1u64 << button.bit()) != 0
    }

    pub fn set_button(&mut self, button: Button, down: bool) {
        let mask = 1u64 << button.bit();
        if down {
            self.packed |= mask;
        } else {
            self.packed &= !mask;
        }
    }

    pub fn with_button(mut self, button: Button) -> Self {
        self.set_button(button, true);
        self
    }

    pub fn hat_x(&self) -> i8 {
        self.axis(HAT_X_SHIFT)
    }

    pub fn hat_y(&self) -> i8 {
        self.axis(HAT_Y_SHIFT)
    }

    pub fn mouse_dx(&self) -> i8 {
        self.axis(MOUSE_DX_SHIFT)
    }

    pub fn mouse_dy(&self) -> i8 {
        self.axis(MOUSE_DY_SHIFT)
    }

    pub fn set_hat_x(&mut self, v: i8) {
        self.set_axis(HAT_X_SHIFT, v);
    }

    pub fn set_hat_y(&mut self, v: i8) {
        self.set_axis(HAT_Y_SHIFT, v);
    }

    pub fn set_mouse_dx(&mut self, v: i8) {
        self.set_axis(MOUSE_DX_SHIFT, v);
    }

    pub fn set_mouse_dy(&mut self, v: i8) {
        self.set_axis(MOUSE_DY_SHIFT, v);
    }

    fn axis(&self, shift: u32) -> i8 {
        ((self.packed >> shift) & 0xFF) as u8 as i8
    }

    fn set_axis(&mut self, shift: u32, v: i8) {
        self.packed = (self.packed & !(0xFFu64 << shift)) | ((v as u8 as u64) << shift);
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("input frame needs 12 bytes, got {actual}")]
pub struct FrameTooShort {
    pub actual: usize,
}

/// Input for one tick, as stored in ring buffers.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct InputFrame {
    pub tick: Tick,
    pub data: PackedInput,
}

impl InputFrame {
    /// u32 tick + u64 packed input, little-endian.
    pub const SIZE: usize = 12;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..4].copy_from_slice(&self.tick.to_le_bytes());
        out[4..].copy_from_slice(&self.data.packed.to_le_bytes());
        out
    }

    pub fn from_bytes(src: &[u8]) -> Result<Self, FrameTooShort> {
        let (Some(tick), Some(packed)) = (src.get(..4), src.get(4..Self::SIZE)) else {
            return Err(FrameTooShort { actual: src.len() });
        };
        // slice lengths are fixed above
        let tick = u32::from_le_bytes([tick[0], tick[1], tick[2], tick[3]]);
        let mut raw = [0u8; 8];
        raw.copy_from_slice(packed);
        Ok(Self {
            tick,
            data: PackedInput::from_bits(u64::from_le_bytes(raw)),
        })
    }
}

/// Where the engine reads the local player's input, once per tick.
pub trait InputSource {
    fn current(&mut self) -> PackedInput;
}

impl<F> InputSource for F
where
    F: FnMut() -> PackedInput,
{
    fn current(&mut self) -> PackedInput {
        self()
    }
}

impl InputSource for PackedInput {
    fn current(&mut self) -> PackedInput {
        *self
    }
}
