// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schedule generators: the collaborator that produces the deterministic
//! inter-packet send-time deltas a session was supposed to follow.
//!
//! The wire format and transport that actually drove a live session are
//! out of scope for this crate; what matters to the statistics engine is
//! only that, given the same seed, the same sequence of deltas comes back
//! out after a [`ScheduleGenerator::reset`]. That's expressed as a trait
//! so tests can swap in a fixed sequence.

use crate::header::{Slot, SlotType, TestSpec};
use crate::time::Num64;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Exp};

/// Produces the next inter-packet send delta, in seconds.
pub trait ScheduleGenerator {
    fn next_delta(&mut self) -> f64;

    /// Rewind to the state immediately after construction. Must produce
    /// the same sequence of deltas as a fresh generator with the same
    /// seed.
    fn reset(&mut self);
}

/// Minimal concrete schedule generator: draws inter-packet intervals from
/// an exponential distribution, one slot at a time, seeded
/// deterministically from the session id.
pub struct ExponentialSchedule {
    seed: u64,
    slots: Vec<Slot>,
    rng: StdRng,
    slot_index: usize,
    reps_remaining: u32,
}

impl ExponentialSchedule {
    pub fn new(sid: &[u8; 16], test_spec: &TestSpec) -> Self {
        let seed = seed_from_sid(sid);
        let mut s = ExponentialSchedule {
            seed,
            slots: test_spec.slots.clone(),
            rng: StdRng::seed_from_u64(seed),
            slot_index: 0,
            reps_remaining: 0,
        };
        s.prime_reps();
        s
    }

    fn prime_reps(&mut self) {
        self.reps_remaining = self
            .slots
            .get(self.slot_index)
            .map(|s| s.nreps)
            .unwrap_or(0);
    }
}

fn seed_from_sid(sid: &[u8; 16]) -> u64 {
    let mut acc = 0u64;
    for chunk in sid.chunks(8) {
        let mut buf = [0u8; 8];
        buf[..chunk.len()].copy_from_slice(chunk);
        acc ^= u64::from_le_bytes(buf);
    }
    acc
}

impl ScheduleGenerator for ExponentialSchedule {
    fn next_delta(&mut self) -> f64 {
        while self.reps_remaining == 0 && self.slot_index + 1 < self.slots.len() {
            self.slot_index += 1;
            self.prime_reps();
        }
        let Some(slot) = self.slots.get(self.slot_index) else {
            // No schedule left: fall back to the last known mean, or a
            // one-second default if no slots were ever configured.
            return 1.0;
        };
        self.reps_remaining = self.reps_remaining.saturating_sub(1);
        match slot.slot_type {
            SlotType::Exponential => {
                let mean = slot.mean_delay.to_f64().max(1e-9);
                let exp = Exp::new(1.0 / mean).expect("positive mean");
                exp.sample(&mut self.rng)
            }
            SlotType::Literal => slot.mean_delay.to_f64(),
        }
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.slot_index = 0;
        self.prime_reps();
    }
}

/// Test-only schedule generator returning a pre-supplied sequence of
/// deltas, then repeating the last one indefinitely.
pub struct FixedSchedule {
    deltas: Vec<f64>,
    index: usize,
}

impl FixedSchedule {
    pub fn new(deltas: Vec<f64>) -> Self {
        assert!(!deltas.is_empty(), "FixedSchedule needs at least one delta");
        FixedSchedule { deltas, index: 0 }
    }
}

impl ScheduleGenerator for FixedSchedule {
    fn next_delta(&mut self) -> f64 {
        let d = self.deltas[self.index.min(self.deltas.len() - 1)];
        if self.index + 1 < self.deltas.len() {
            self.index += 1;
        }
        d
    }

    fn reset(&mut self) {
        self.index = 0;
    }
}

/// Advances `cursor`/`endnum` by one schedule step, matching the C
/// `OWPScheduleContextGenerateNextDelta` + running-sum idiom.
pub fn advance(gen: &mut dyn ScheduleGenerator, endnum: Num64) -> Num64 {
    let delta = gen.next_delta();
    endnum.add_secs(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_schedule_repeats_last() {
        let mut s = FixedSchedule::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(s.next_delta(), 1.0);
        assert_eq!(s.next_delta(), 2.0);
        assert_eq!(s.next_delta(), 3.0);
        assert_eq!(s.next_delta(), 3.0);
    }

    #[test]
    fn fixed_schedule_reset_is_deterministic() {
        let mut s = FixedSchedule::new(vec![1.0, 2.0, 3.0]);
        let first_pass: Vec<f64> = (0..3).map(|_| s.next_delta()).collect();
        s.reset();
        let second_pass: Vec<f64> = (0..3).map(|_| s.next_delta()).collect();
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn exponential_schedule_reset_is_deterministic() {
        let sid = [7u8; 16];
        let spec = TestSpec {
            start_time: Num64::ZERO,
            slots: vec![Slot {
                slot_type: SlotType::Exponential,
                mean_delay: Num64::from_f64(1.0),
                nreps: 1000,
            }],
            npackets: 1000,
            loss_timeout: Num64::from_f64(10.0),
            packet_size_padding: 0,
            type_p: 0,
            two_way: false,
        };
        let mut gen = ExponentialSchedule::new(&sid, &spec);
        let first_pass: Vec<f64> = (0..20).map(|_| gen.next_delta()).collect();
        gen.reset();
        let second_pass: Vec<f64> = (0..20).map(|_| gen.next_delta()).collect();
        assert_eq!(first_pass, second_pass);
    }
}
