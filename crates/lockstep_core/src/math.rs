//! Deterministic math utilities
//!
//! Re-exports glam; positions are plain `Vec3` values.

pub use glam::*;

/// World-space position of an entity.
pub type Position = Vec3;

/// Raw IEEE-754 bit patterns of a position, x/y/z order.
pub fn position_to_bits(pos: Position) -> [u32; 3] {
    [pos.x.to_bits(), pos.y.to_bits(), pos.z.to_bits()]
}

pub fn position_from_bits(bits: [u32; 3]) -> Position {
    Vec3::new(
        f32::from_bits(bits[0]),
        f32::from_bits(bits[1]),
        f32::from_bits(bits[2]),
    )
}
