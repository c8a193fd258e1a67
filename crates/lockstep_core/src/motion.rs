//! Reference motion rule
//!
//! Unit-speed movement on the XZ plane plus a one-unit hop on the primary
//! button. Both the Host (for every remote peer) and each process (for its own
//! peer) advance entities with the same function, so identical input streams
//! give identical positions.

use crate::input::{Button, PackedInput};
use crate::math::{Position, Vec3};
use crate::time::TICK_DURATION_SECS;

/// Units per second.
pub const UNIT_SPEED: f32 = 1.0;

/// Height added by one tick with the primary button held.
pub const HOP_HEIGHT: f32 = 1.0;

/// Advance `position` by one tick of `input`.
pub fn unit_motion(position: Position, input: PackedInput) -> Position {
    let mut delta = Vec3::ZERO;

    if input.button(Button::Forward) {
        delta += Vec3::Z;
    }
    if input.button(Button::Back) {
        delta -= Vec3::Z;
    }
    if input.button(Button::Left) {
        delta -= Vec3::X;
    }
    if input.button(Button::Right) {
        delta += Vec3::X;
    }

    // diagonal still moves at unit speed; opposing keys cancel to zero
    let mut delta = delta.normalize_or_zero() * (UNIT_SPEED * TICK_DURATION_SECS as f32);

    if input.button(Button::Primary) {
        delta.y += HOP_HEIGHT;
    }

    position + delta
}
