//! Wire codec
//!
//! Four fixed-layout packets, one opcode byte each, little-endian fields:
//!
//! | Opcode | Value | Direction     | Layout                                              |
//! |--------|-------|---------------|-----------------------------------------------------|
//! | HELLO  | 0x01  | client → host | op                                                  |
//! | ACK_ID | 0x02  | host → client | op, u8 peer                                         |
//! | INPUT  | 0x03  | client → host | op, u8 peer, u16 tick, u64 input                    |
//! | SNAP   | 0x04  | host → client | op, u32 tick, u8 count, count × (u8 peer, 3 × f32)  |
//!
//! Floats travel as raw IEEE-754 bit patterns.

use crate::replication::{SnapshotEntry, WorldSnapshot};
use crate::PeerId;
use lockstep_core::math::{position_from_bits, position_to_bits};
use lockstep_core::PackedInput;
use thiserror::Error;

pub const HELLO: u8 = 0x01;
pub const ACK_ID: u8 = 0x02;
pub const INPUT: u8 = 0x03;
pub const SNAP: u8 = 0x04;

pub const HELLO_LEN: usize = 1;
pub const ACK_ID_LEN: usize = 2;
pub const INPUT_LEN: usize = 12;
pub const SNAP_HEADER_LEN: usize = 6;
pub const SNAP_ENTRY_LEN: usize = 13;

/// The count field is a single byte.
pub const MAX_SNAPSHOT_ENTRIES: usize = u8::MAX as usize;

/// Largest datagram this protocol produces.
pub const MAX_PACKET_LEN: usize = SNAP_HEADER_LEN + SNAP_ENTRY_LEN * MAX_SNAPSHOT_ENTRIES;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,

    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),

    #[error("opcode 0x{opcode:02X} needs {expected} bytes, got {actual}")]
    Truncated {
        opcode: u8,
        expected: usize,
        actual: usize,
    },

    #[error("snapshot declares {declared} entries but only {available} fit")]
    SnapshotOverrun { declared: usize, available: usize },
}

/// A decoded datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Hello,
    AckId {
        peer: PeerId,
    },
    /// Only the low 16 bits of the tick travel; the Host widens them.
    Input {
        peer: PeerId,
        tick: u16,
        input: PackedInput,
    },
    Snapshot(WorldSnapshot),
}

impl Packet {
    pub fn opcode(&self) -> u8 {
        match self {
            Packet::Hello => HELLO,
            Packet::AckId { .. } => ACK_ID,
            Packet::Input { .. } => INPUT,
            Packet::Snapshot(_) => SNAP,
        }
    }

    /// Exact size of the encoded packet.
    pub fn encoded_len(&self) -> usize {
        match self {
            Packet::Hello => HELLO_LEN,
            Packet::AckId { .. } => ACK_ID_LEN,
            Packet::Input { .. } => INPUT_LEN,
            Packet::Snapshot(snap) => {
                SNAP_HEADER_LEN + SNAP_ENTRY_LEN * snap.entries.len().min(MAX_SNAPSHOT_ENTRIES)
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Append the encoded packet to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.opcode());
        match self {
            Packet::Hello => {}
            Packet::AckId { peer } => out.push(peer.0),
            Packet::Input { peer, tick, input } => {
                out.push(peer.0);
                out.extend_from_slice(&tick.to_le_bytes());
                out.extend_from_slice(&input.packed.to_le_bytes());
            }
            Packet::Snapshot(snap) => {
                let entries = &snap.entries[..snap.entries.len().min(MAX_SNAPSHOT_ENTRIES)];
                out.extend_from_slice(&snap.tick.to_le_bytes());
                out.push(entries.len() as u8);
                for entry in entries {
                    out.push(entry.peer.0);
                    for bits in position_to_bits(entry.position) {
                        out.extend_from_slice(&bits.to_le_bytes());
                    }
                }
            }
        }
    }

    /// Decode one datagram. Trailing bytes past the layout are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
        let &opcode = bytes.first().ok_or(DecodeError::Empty)?;

        let min = match opcode {
            HELLO => HELLO_LEN,
            ACK_ID => ACK_ID_LEN,
            INPUT => INPUT_LEN,
            SNAP => SNAP_HEADER_LEN,
            other => return Err(DecodeError::UnknownOpcode(other)),
        };
        if bytes.len() < min {
            return Err(DecodeError::Truncated {
                opcode,
                expected: min,
                actual: bytes.len(),
            });
        }

        let packet = match opcode {
            HELLO => Packet::Hello,
            ACK_ID => Packet::AckId {
                peer: PeerId(bytes[1]),
            },
            INPUT => Packet::Input {
                peer: PeerId(bytes[1]),
                tick: u16::from_le_bytes(array_at(bytes, 2)),
                input: PackedInput::from_bits(u64::from_le_bytes(array_at(bytes, 4))),
            },
            _ => Packet::Snapshot(decode_snapshot(bytes)?),
        };
        Ok(packet)
    }
}

fn decode_snapshot(bytes: &[u8]) -> Result<WorldSnapshot, DecodeError> {
    let tick = u32::from_le_bytes(array_at(bytes, 1));
    let declared = bytes[5] as usize;

    let body = &bytes[SNAP_HEADER_LEN..];
    let available = body.len() / SNAP_ENTRY_LEN;
    if declared > available {
        return Err(DecodeError::SnapshotOverrun {
            declared,
            available,
        });
    }

    let entries = body
        .chunks_exact(SNAP_ENTRY_LEN)
        .take(declared)
        .map(|chunk| SnapshotEntry {
            peer: PeerId(chunk[0]),
            position: position_from_bits([
                u32::from_le_bytes(array_at(chunk, 1)),
                u32::from_le_bytes(array_at(chunk, 5)),
                u32::from_le_bytes(array_at(chunk, 9)),
            ]),
        })
        .collect();

    Ok(WorldSnapshot { tick, entries })
}

// Callers check lengths before reading.
fn array_at<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[at..at + N]);
    out
}
