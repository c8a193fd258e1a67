//! Link statistics
//!
//! Transport and protocol failures are never surfaced to callers; they are
//! counted here instead.

use std::fmt;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub sent: u64,
    pub send_failed: u64,
    pub received: u64,
    /// Failed to decode, or wrong length for its opcode.
    pub malformed: u64,
    /// Valid packet this role does not accept (or a duplicate ACK_ID).
    pub unexpected: u64,
    /// INPUT naming a peer the Host never admitted.
    pub unknown_peer: u64,
    /// SNAP not newer than the last one applied.
    pub stale: u64,
}

impl LinkStats {
    pub fn record_send(&mut self, ok: bool) {
        if ok {
            self.sent += 1;
        } else {
            self.send_failed += 1;
        }
    }

    pub fn dropped(&self) -> u64 {
        self.malformed + self.unexpected + self.unknown_peer + self.stale
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for LinkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent {} (failed {}), received {}, dropped {} (malformed {}, unexpected {}, unknown peer {}, stale {})",
            self.sent,
            self.send_failed,
            self.received,
            self.dropped(),
            self.malformed,
            self.unexpected,
            self.unknown_peer,
            self.stale,
        )
    }
}
