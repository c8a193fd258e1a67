//! Property tests for the fixed-step clock and input frames.

use std::time::Duration;

use lockstep_core::time::TICK_RATE_HZ;
use lockstep_core::{InputFrame, PackedInput, TickClock};
use proptest::prelude::*;

/// Feed every chunk, draining the backlog after each one; count fired ticks.
fn run_chunks(chunks: &[u64]) -> u64 {
    let mut clock = TickClock::new();
    let mut fired = 0;
    for &nanos in chunks {
        if clock.step(Duration::from_nanos(nanos)) {
            fired += 1;
            while clock.step(Duration::ZERO) {
                fired += 1;
            }
        }
    }
    assert_eq!(fired, clock.tick() as u64);
    fired
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn tick_count_is_independent_of_chunking(chunks in prop::collection::vec(0u64..200_000_000, 0..64)) {
        let total: u128 = chunks.iter().map(|&n| n as u128).sum();
        let expected = (total * TICK_RATE_HZ as u128 / 1_000_000_000) as u64;

        prop_assert_eq!(run_chunks(&chunks), expected);

        // same total in one call
        let one = [total as u64];
        prop_assert_eq!(run_chunks(&one), expected);
    }

    #[test]
    fn zero_step_only_drains_residual(first in 0u64..100_000_000) {
        let mut clock = TickClock::new();
        clock.step(Duration::from_nanos(first));
        let before = clock.tick();
        let pending = clock.pending_ticks();

        let mut drained = 0;
        while clock.step(Duration::ZERO) {
            drained += 1;
        }

        prop_assert_eq!(drained, pending);
        prop_assert_eq!(clock.tick(), before + pending as u32);
        prop_assert!(!clock.step(Duration::ZERO));
    }

    #[test]
    fn input_frame_bytes_are_bit_exact(tick in any::<u32>(), packed in any::<u64>()) {
        let frame = InputFrame { tick, data: PackedInput::from_bits(packed) };
        let back = InputFrame::from_bytes(&frame.to_bytes()).unwrap();

        prop_assert_eq!(back.tick, tick);
        prop_assert_eq!(back.data.packed, packed);
    }
}
