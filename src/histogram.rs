// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bucket Histogram: a streaming delay histogram whose bucket set is not
//! known ahead of time, backed by the same arena + free-index-stack
//! shape as the Packet Window.

use crate::time::Num64;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    index: i64,
    count: u64,
}

/// `clamp(loss_timeout / bucket_width, 10, 2048)`.
pub fn blistlen(loss_timeout: Num64, bucket_width: f64) -> usize {
    let estimate = loss_timeout.to_f64() / bucket_width;
    (estimate.max(10.0).min(2048.0)) as usize
}

pub struct BucketHistogram {
    width: f64,
    arena: Vec<Bucket>,
    free: Vec<u32>,
    index: HashMap<i64, u32>,
    block_size: usize,
    sorted: Vec<i64>,
}

impl BucketHistogram {
    pub fn new(width: f64, block_size: usize) -> Self {
        assert!(width > 0.0, "bucket width must be positive");
        BucketHistogram {
            width,
            arena: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            block_size: block_size.max(1),
            sorted: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.free.clear();
        self.free.extend(0..self.arena.len() as u32);
        self.index.clear();
        self.sorted.clear();
    }

    fn bucket_index(&self, delay: f64) -> i64 {
        let ratio = delay / self.width;
        if delay >= 0.0 {
            ratio.ceil() as i64
        } else {
            ratio.floor() as i64
        }
    }

    fn alloc_slot(&mut self) -> u32 {
        if let Some(idx) = self.free.pop() {
            return idx;
        }
        let base = self.arena.len() as u32;
        for _ in 0..self.block_size {
            self.arena.push(Bucket { index: 0, count: 0 });
        }
        base
    }

    pub fn increment(&mut self, delay: f64) {
        let b = self.bucket_index(delay);
        if let Some(&idx) = self.index.get(&b) {
            self.arena[idx as usize].count += 1;
        } else {
            let idx = self.alloc_slot();
            self.arena[idx as usize] = Bucket { index: b, count: 1 };
            self.index.insert(b, idx);
        }
    }

    /// Sort the live bucket set ascending by bucket index. Must be called
    /// once after ingestion completes and before [`BucketHistogram::percentile`].
    pub fn sort(&mut self) {
        self.sorted = self.index.keys().copied().collect();
        self.sorted.sort_unstable();
    }

    /// The sorted `(delay, count)` pairs, valid after [`BucketHistogram::sort`].
    pub fn buckets(&self) -> Vec<(f64, u64)> {
        self.sorted
            .iter()
            .filter_map(|b| {
                self.index
                    .get(b)
                    .map(|&idx| (*b as f64 * self.width, self.arena[idx as usize].count))
            })
            .collect()
    }

    pub fn total_count(&self) -> u64 {
        self.index.values().map(|&idx| self.arena[idx as usize].count).sum()
    }

    /// The smallest delay `d` (quantized to a bucket boundary) such that
    /// the cumulative count up to and including `d`'s bucket is at least
    /// `alpha * sent`. Returns `None` when no bucket satisfies this (e.g.
    /// `sort` was never called, or there are no samples).
    pub fn percentile(&self, alpha: f64, sent: u64) -> Option<f64> {
        if self.sorted.is_empty() {
            return None;
        }
        let target = (alpha * sent as f64).ceil() as u64;
        let mut cumulative = 0u64;
        for &b in &self.sorted {
            let idx = *self.index.get(&b)?;
            cumulative += self.arena[idx as usize].count;
            if cumulative >= target {
                return Some(b as f64 * self.width);
            }
        }
        self.sorted
            .last()
            .map(|&b| b as f64 * self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_index_biased_away_from_zero() {
        let h = BucketHistogram::new(0.01, 4);
        assert_eq!(h.bucket_index(0.015), 2);
        assert_eq!(h.bucket_index(-0.015), -2);
        assert_eq!(h.bucket_index(0.0), 0);
    }

    #[test]
    fn percentile_monotonic() {
        let mut h = BucketHistogram::new(0.01, 4);
        for d in [0.01, 0.02, 0.02, 0.03, 0.05] {
            h.increment(d);
        }
        h.sort();
        let p50 = h.percentile(0.5, 5).unwrap();
        let p95 = h.percentile(0.95, 5).unwrap();
        assert!(p50 <= p95);
    }

    #[test]
    fn total_matches_insert_count() {
        let mut h = BucketHistogram::new(0.01, 4);
        for d in [0.01, 0.02, 0.02, 0.03] {
            h.increment(d);
        }
        assert_eq!(h.total_count(), 4);
    }
}
