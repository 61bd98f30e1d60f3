// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet Window: a sliding map from sequence number to [`PacketSlot`],
//! bounded by a loss-timeout-derived size heuristic.
//!
//! Slots live in an arena (`Vec<PacketSlot>`) with a free-index stack,
//! replacing the original's intrusive free-list-through-struct-field
//! pattern with plain indices — no raw pointers, no double-free risk.

use crate::accumulator::StatsAccumulator;
use crate::error::{Result, StatsError};
use crate::header::SkipRange;
use crate::schedule::ScheduleGenerator;
use crate::time::Num64;
use std::collections::HashMap;

/// One entry in the Packet Window: everything known about a scheduled
/// send slot while it's still inside the loss-timeout horizon.
#[derive(Debug, Clone, Copy)]
pub struct PacketSlot {
    pub seq: u32,
    pub scheduled_send_time: Num64,
    /// 0 = not yet observed, 1 = received once, >1 = duplicates.
    pub seen_count: u32,
    pub lost: bool,
    next: Option<u32>,
}

/// Size heuristic: `max(10, rate * loss_timeout * 3.5)`, capped to
/// `i32::MAX`. For two-way sessions the client's send rate is unknown to
/// the reflector side, so the window is kept at the floor.
pub fn plistlen(packet_rate: f64, loss_timeout: Num64, two_way: bool) -> usize {
    if two_way {
        return 10;
    }
    let estimate = packet_rate * loss_timeout.to_f64() * 3.5;
    (estimate.max(10.0).min(i32::MAX as f64)) as usize
}

pub struct PacketWindow {
    arena: Vec<PacketSlot>,
    free: Vec<u32>,
    index: HashMap<u32, u32>,
    pbegin: Option<u32>,
    pend: Option<u32>,
    first: u32,
    last: u32,
    block_size: usize,
}

impl PacketWindow {
    pub fn new(first: u32, last: u32, block_size: usize) -> Self {
        PacketWindow {
            arena: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            pbegin: None,
            pend: None,
            first,
            last,
            block_size: block_size.max(1),
        }
    }

    /// Drop all live entries, returning the window to its just-constructed
    /// state without deallocating the backing arena.
    pub fn clear(&mut self, first: u32, last: u32) {
        self.free.clear();
        self.free.extend(0..self.arena.len() as u32);
        self.index.clear();
        self.pbegin = None;
        self.pend = None;
        self.first = first;
        self.last = last;
    }

    fn alloc_slot(&mut self) -> u32 {
        if let Some(idx) = self.free.pop() {
            return idx;
        }
        let base = self.arena.len() as u32;
        tracing::info!(block_size = self.block_size, "packet window growing arena");
        for _ in 0..self.block_size {
            self.arena.push(PacketSlot {
                seq: 0,
                scheduled_send_time: Num64::ZERO,
                seen_count: 0,
                lost: false,
                next: None,
            });
        }
        base
    }

    /// Materialize the very first window entry. Must be called before
    /// any [`PacketWindow::get`].
    pub fn allocate_initial(&mut self, seq: u32, scheduled_send_time: Num64) -> Result<()> {
        if seq > self.last {
            return Err(StatsError::InvalidSeq {
                seq,
                reason: "initial seq beyond last",
            });
        }
        let idx = self.alloc_slot();
        self.arena[idx as usize] = PacketSlot {
            seq,
            scheduled_send_time,
            seen_count: 0,
            lost: false,
            next: None,
        };
        self.index.insert(seq, idx);
        self.pbegin = Some(idx);
        self.pend = Some(idx);
        Ok(())
    }

    fn pend_slot(&self) -> &PacketSlot {
        &self.arena[self.pend.expect("window initialized") as usize]
    }

    /// Look up (materializing as needed) the window entry for `seq`,
    /// pulling schedule deltas forward from `pend` to cover the gap.
    pub fn get(
        &mut self,
        seq: u32,
        schedule: &mut dyn ScheduleGenerator,
    ) -> Result<u32> {
        if seq < self.first || seq >= self.last {
            return Err(StatsError::InvalidSeq {
                seq,
                reason: "seq outside [first, last)",
            });
        }
        let pend_seq = self.pend_slot().seq;
        if seq <= pend_seq {
            if let Some(&idx) = self.index.get(&seq) {
                return Ok(idx);
            }
            return Err(StatsError::InvalidSeq {
                seq,
                reason: "seq already flushed",
            });
        }

        let mut cursor_seq = pend_seq;
        let mut cursor_time = self.pend_slot().scheduled_send_time;
        let mut cursor_idx = self.pend.unwrap();
        while cursor_seq < seq {
            let next_seq = cursor_seq + 1;
            let next_time = crate::schedule::advance(schedule, cursor_time);
            let idx = self.alloc_slot();
            self.arena[idx as usize] = PacketSlot {
                seq: next_seq,
                scheduled_send_time: next_time,
                seen_count: 0,
                lost: false,
                next: None,
            };
            self.arena[cursor_idx as usize].next = Some(idx);
            self.index.insert(next_seq, idx);
            debug_assert_eq!(self.arena[cursor_idx as usize].seq + 1, next_seq);
            cursor_idx = idx;
            cursor_seq = next_seq;
            cursor_time = next_time;
        }
        self.pend = Some(cursor_idx);
        Ok(cursor_idx)
    }

    pub fn slot(&self, idx: u32) -> &PacketSlot {
        &self.arena[idx as usize]
    }

    pub fn slot_mut(&mut self, idx: u32) -> &mut PacketSlot {
        &mut self.arena[idx as usize]
    }

    /// Flush the oldest live entry: fold it into `stats` (unless it falls
    /// within a skip range) and free its slot. Returns `false` when there
    /// is no successor to advance `pbegin` to (the window is now empty).
    pub fn flush_begin(
        &mut self,
        stats: &mut StatsAccumulator,
        skips: &[SkipRange],
        iskip: &mut usize,
    ) -> bool {
        let Some(begin_idx) = self.pbegin else {
            return false;
        };
        let node = self.arena[begin_idx as usize];

        while *iskip < skips.len() && node.seq > skips[*iskip].end {
            *iskip += 1;
        }
        let skipped = *iskip < skips.len() && skips[*iskip].contains(node.seq);

        if !skipped {
            if node.lost {
                stats.lost += 1;
            } else if node.seen_count > 1 {
                stats.dups += node.seen_count - 1;
            }
        }
        stats.end_time = node.scheduled_send_time;

        let successor = node.next;
        self.index.remove(&node.seq);
        self.free.push(begin_idx);

        match successor {
            Some(next_idx) => {
                self.pbegin = Some(next_idx);
                true
            }
            None => {
                self.pbegin = None;
                self.pend = None;
                false
            }
        }
    }

    pub fn pbegin_seq(&self) -> Option<u32> {
        self.pbegin.map(|idx| self.arena[idx as usize].seq)
    }

    pub fn pbegin_time(&self) -> Option<Num64> {
        self.pbegin.map(|idx| self.arena[idx as usize].scheduled_send_time)
    }

    pub fn pend_seq(&self) -> Option<u32> {
        self.pend.map(|idx| self.arena[idx as usize].seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::FixedSchedule;

    fn stats() -> StatsAccumulator {
        StatsAccumulator::new()
    }

    #[test]
    fn materializes_intermediate_slots() {
        let mut w = PacketWindow::new(0, 100, 4);
        w.allocate_initial(0, Num64::ZERO).unwrap();
        let mut sched = FixedSchedule::new(vec![1.0]);
        let idx = w.get(3, &mut sched).unwrap();
        assert_eq!(w.slot(idx).seq, 3);
        assert!((w.slot(idx).scheduled_send_time.to_f64() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_seq_below_first() {
        let mut w = PacketWindow::new(5, 100, 4);
        w.allocate_initial(5, Num64::ZERO).unwrap();
        let mut sched = FixedSchedule::new(vec![1.0]);
        assert!(w.get(2, &mut sched).is_err());
    }

    #[test]
    fn flush_reports_loss_and_dup() {
        let mut w = PacketWindow::new(0, 100, 4);
        w.allocate_initial(0, Num64::ZERO).unwrap();
        let mut sched = FixedSchedule::new(vec![1.0]);
        let i1 = w.get(1, &mut sched).unwrap();
        w.slot_mut(i1).lost = true;
        let i0 = w.get(0, &mut sched).unwrap();
        w.slot_mut(i0).seen_count = 2;

        let mut st = stats();
        let mut iskip = 0usize;
        assert!(w.flush_begin(&mut st, &[], &mut iskip));
        assert_eq!(st.dups, 1);
        assert!(w.flush_begin(&mut st, &[], &mut iskip));
        assert_eq!(st.lost, 1);
    }

    #[test]
    fn skip_range_excludes_from_stats() {
        let mut w = PacketWindow::new(0, 100, 4);
        w.allocate_initial(0, Num64::ZERO).unwrap();
        let mut sched = FixedSchedule::new(vec![1.0]);
        let i0 = w.get(0, &mut sched).unwrap();
        w.slot_mut(i0).lost = true;

        let mut st = stats();
        let mut iskip = 0usize;
        let skips = vec![SkipRange { begin: 0, end: 0 }];
        w.flush_begin(&mut st, &skips, &mut iskip);
        assert_eq!(st.lost, 0);
    }
}
