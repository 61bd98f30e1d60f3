// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session Driver: drives record iteration against a [`RecordSource`],
//! reconciling the scheduled send stream with the observed receive
//! stream and producing a frozen [`Summary`].

use crate::accumulator::{inf_delay, StatsAccumulator};
use crate::error::{Result, StatsError};
use crate::header::{SessionHeader, SkipRange};
use crate::histogram::{blistlen, BucketHistogram};
use crate::record::{DataRecord, TwoWayRecord};
use crate::reorder::ReorderTracker;
use crate::schedule::ScheduleGenerator;
use crate::time::Num64;
use crate::window::{plistlen, PacketWindow};
use std::io::Write;

/// One record pulled off a session's recorded stream. Carries either a
/// one-way or a two-way record depending on the session's `two_way` flag;
/// the driver dispatches on [`SessionHeader::test_spec`] rather than
/// making the caller guess.
pub enum SourceRecord {
    OneWay(DataRecord),
    TwoWay(TwoWayRecord),
}

/// External collaborator supplying the recorded stream in file order.
/// Implemented for file-backed sessions by [`crate::sessionfile::SessionFile`];
/// tests implement it directly over an in-memory `Vec`.
pub trait RecordSource {
    /// Seek to the given byte offset within the data-record area.
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Current byte offset within the data-record area.
    fn tell(&self) -> u64;

    /// Size in bytes of one data record, used to compute `next_oset`.
    fn record_size(&self) -> u64;

    /// Pull the next record in file order, or `None` at end of stream.
    fn next_record(&mut self) -> Result<Option<SourceRecord>>;
}

/// A frozen snapshot of one `parse()` call's results, separate from the
/// live, mutable accumulator state so a caller can re-render a report
/// without re-parsing.
#[derive(Clone)]
pub struct Summary {
    pub header: SessionHeader,
    pub from_label: Option<String>,
    pub to_label: Option<String>,
    pub first_seq: u32,
    pub last_seq: u32,
    pub start_time: Num64,
    pub accumulator: StatsAccumulator,
    pub reorder_counts: Vec<u64>,
    pub bucket_width: f64,
    histogram_sorted: std::sync::Arc<BucketHistogram>,
    /// Byte offset of the first record with `seq >= last_seq`, for
    /// chaining summaries across contiguous sub-ranges of one file.
    pub next_oset: Option<u64>,
}

impl Summary {
    pub fn percentile(&self, alpha: f64) -> Option<f64> {
        self.histogram_sorted
            .percentile(alpha, self.accumulator.sent as u64)
    }

    pub fn bucket_counts(&self) -> Vec<(f64, u64)> {
        self.histogram_sorted.buckets()
    }
}

/// Drives one or more `parse()` calls over a `RecordSource`, reusing its
/// Packet Window, Bucket Histogram, Reorder Tracker, and Stats
/// Accumulator across calls (each call clears them first).
pub struct SessionDriver {
    header: SessionHeader,
    from_label: Option<String>,
    to_label: Option<String>,
    bucket_width: f64,
    window: PacketWindow,
    histogram: BucketHistogram,
    reorder: ReorderTracker,
    accumulator: StatsAccumulator,
    skip_ranges: Vec<SkipRange>,
}

impl SessionDriver {
    pub fn create(
        header: SessionHeader,
        from_label: Option<String>,
        to_label: Option<String>,
        bucket_width: f64,
    ) -> Result<Self> {
        if header.version < SessionHeader::MIN_VERSION {
            return Err(StatsError::InvalidArgument(format!(
                "unsupported session file version {}",
                header.version
            )));
        }
        if bucket_width <= 0.0 {
            return Err(StatsError::InvalidArgument(
                "bucket_width must be positive".into(),
            ));
        }

        let packet_rate = estimate_packet_rate(&header);
        let plen = plistlen(packet_rate, header.test_spec.loss_timeout, header.test_spec.two_way);
        let blen = blistlen(header.test_spec.loss_timeout, bucket_width);

        let mut skip_ranges = header.skip_ranges.clone();
        skip_ranges.sort_by_key(|r| r.begin);

        Ok(SessionDriver {
            window: PacketWindow::new(0, header.test_spec.npackets, plen),
            histogram: BucketHistogram::new(bucket_width, blen),
            reorder: ReorderTracker::new(plen),
            accumulator: StatsAccumulator::new(),
            skip_ranges,
            bucket_width,
            from_label,
            to_label,
            header,
        })
    }

    /// Run the 9-step summarization algorithm over `[first, last)`.
    pub fn parse(
        &mut self,
        source: &mut dyn RecordSource,
        mut output: Option<&mut dyn Write>,
        begin_oset: u64,
        first: u32,
        last: Option<u32>,
        schedule: &mut dyn ScheduleGenerator,
    ) -> Result<Summary> {
        let npackets = self.header.test_spec.npackets;
        let last = last.unwrap_or(npackets);
        if first > last || last > npackets {
            return Err(StatsError::InvalidArgument(format!(
                "invalid range [{first}, {last}) against npackets={npackets}"
            )));
        }

        let rec_size = source.record_size();
        let begin_oset = begin_oset.max(0);
        source.seek(begin_oset)?;

        // Step 4: schedule repositioning. Every `parse()` call clears the
        // Packet Window (step 5), so there is no persistent `isctx` to
        // compare `first` against across calls: each call always resets
        // the schedule and replays deltas up to `first` from scratch.
        schedule.reset();
        let mut endnum = self.header.test_spec.start_time;
        for _ in 0..first {
            endnum = crate::schedule::advance(schedule, endnum);
        }
        let start_time = endnum;

        // Step 5: clear accumulators.
        self.window.clear(first, last);
        self.histogram.clear();
        self.reorder.clear();
        self.accumulator.clear(self.header.test_spec.loss_timeout);

        // Step 6: allocate the initial window node.
        self.window.allocate_initial(first, start_time)?;

        let mut iskip = 0usize;
        let mut next_oset: Option<u64> = None;
        let mut record_index: u64 = 0;

        // Step 7: iterate records.
        while let Some(rec) = source.next_record()? {
            let seq = match &rec {
                SourceRecord::OneWay(r) => r.seq_no(),
                SourceRecord::TwoWay(r) => r.seq_no(),
            };

            if next_oset.is_none() && seq >= last {
                next_oset = Some(begin_oset + record_index * rec_size);
            }
            if seq < first || seq >= last {
                record_index += 1;
                continue;
            }

            self.pre_flush(&rec)?;
            let idx = self.window.get(seq, schedule)?;

            let skipped = self.skip_ranges.iter().any(|r| r.contains(seq));
            if !skipped {
                match &rec {
                    SourceRecord::OneWay(r) => self.ingest_one_way(idx, r, &mut output)?,
                    SourceRecord::TwoWay(r) => self.ingest_two_way(idx, r, &mut output)?,
                }
            }

            record_index += 1;
        }

        // Step 8: drain remaining window entries.
        while self.window.flush_begin(&mut self.accumulator, &self.skip_ranges, &mut iskip) {}
        // Final entry (pbegin with no successor) still needs folding in;
        // flush_begin already folded every entry it visited, including
        // the last one, before returning false.

        // Step 9: sort buckets.
        self.histogram.sort();

        Ok(Summary {
            header: self.header.clone(),
            from_label: self.from_label.clone(),
            to_label: self.to_label.clone(),
            first_seq: first,
            last_seq: last,
            start_time,
            accumulator: self.accumulator.clone(),
            reorder_counts: self.reorder.counts().to_vec(),
            bucket_width: self.bucket_width,
            histogram_sorted: std::sync::Arc::new(std::mem::replace(
                &mut self.histogram,
                BucketHistogram::new(self.bucket_width, 1),
            )),
            next_oset,
        })
    }

    fn pre_flush(&mut self, rec: &SourceRecord) -> Result<()> {
        match rec {
            SourceRecord::OneWay(DataRecord::Lost { seq_no, .. })
            | SourceRecord::TwoWay(TwoWayRecord {
                sent: DataRecord::Lost { seq_no, .. },
                ..
            }) => self.flush_while(|begin_seq, _| begin_seq < *seq_no),
            SourceRecord::OneWay(DataRecord::Received { recv, .. })
            | SourceRecord::TwoWay(TwoWayRecord {
                sent: DataRecord::Received { recv, .. },
                ..
            }) => {
                let thresh = recv.owptime.add_secs(-self.header.test_spec.loss_timeout.to_f64());
                self.flush_while(|_, begin_time| begin_time < thresh);
            }
        }
        Ok(())
    }

    /// Drain window entries from the head while `pred(seq, scheduled_send_time)`
    /// holds, folding each into the accumulator as it's flushed.
    fn flush_while(&mut self, pred: impl Fn(u32, Num64) -> bool) {
        let mut iskip = 0usize;
        while let (Some(seq), Some(time)) = (self.window.pbegin_seq(), self.window.pbegin_time()) {
            if !pred(seq, time) {
                break;
            }
            self.window
                .flush_begin(&mut self.accumulator, &self.skip_ranges, &mut iskip);
        }
    }

    fn ingest_one_way(
        &mut self,
        idx: u32,
        rec: &DataRecord,
        output: &mut Option<&mut dyn Write>,
    ) -> Result<()> {
        match rec {
            DataRecord::Lost { recv, ttl: _, .. } => {
                let slot = self.window.slot(idx);
                if slot.seen_count != 0 {
                    return Err(StatsError::InvariantViolation(
                        "lost record for a seq already seen",
                    ));
                }
                self.window.slot_mut(idx).lost = true;
                self.accumulator.sent += 1;
                self.accumulator.note_sync(recv.sync);
                self.accumulator.note_error(recv.error_estimate);
                if let Some(w) = output.as_mut() {
                    let _ = writeln!(w, "seq_no={} *LOST*", self.window.slot(idx).seq);
                }
            }
            DataRecord::Received {
                send, recv, ttl, ..
            } => {
                let slot = self.window.slot(idx);
                if slot.lost {
                    return Err(StatsError::InvariantViolation(
                        "received record for a seq already marked lost",
                    ));
                }
                let first_observation = slot.seen_count == 0;
                if first_observation {
                    self.accumulator.sent += 1;
                }
                self.window.slot_mut(idx).seen_count += 1;

                let d = recv.owptime - send.owptime;
                self.accumulator
                    .note_error(send.error_estimate + recv.error_estimate);
                self.accumulator.note_sync(send.sync && recv.sync);
                self.accumulator.note_delay(d);

                if first_observation {
                    self.histogram.increment(d);
                    self.accumulator.note_ttl(*ttl);
                    self.reorder.observe(self.window.slot(idx).seq);
                }

                if let Some(w) = output.as_mut() {
                    let _ = writeln!(w, "seq_no={} delay={:.6}", self.window.slot(idx).seq, d);
                }
            }
        }
        Ok(())
    }

    fn ingest_two_way(
        &mut self,
        idx: u32,
        rec: &TwoWayRecord,
        output: &mut Option<&mut dyn Write>,
    ) -> Result<()> {
        match &rec.sent {
            DataRecord::Lost { recv, .. } => {
                let slot = self.window.slot(idx);
                if slot.seen_count != 0 {
                    return Err(StatsError::InvariantViolation(
                        "lost record for a seq already seen",
                    ));
                }
                self.window.slot_mut(idx).lost = true;
                self.accumulator.sent += 1;
                self.accumulator.note_sync(recv.sync);
                self.accumulator.note_error(recv.error_estimate);
                if let Some(w) = output.as_mut() {
                    let _ = writeln!(w, "seq_no={} *LOST*", self.window.slot(idx).seq);
                }
            }
            DataRecord::Received {
                send, recv, ttl, ..
            } => {
                let slot = self.window.slot(idx);
                if slot.lost {
                    return Err(StatsError::InvariantViolation(
                        "received record for a seq already marked lost",
                    ));
                }
                let first_observation = slot.seen_count == 0;
                if first_observation {
                    self.accumulator.sent += 1;
                }
                self.window.slot_mut(idx).seen_count += 1;

                let Some(reflected) = rec.reflected else {
                    return Err(StatsError::CorruptSession(
                        "two-way record missing reflected timestamps for a received packet".into(),
                    ));
                };

                let proc_d = reflected.send.owptime - recv.owptime;
                let rtt = reflected.recv.owptime - send.owptime;
                let d = rtt - proc_d;

                self.accumulator.note_error(
                    send.error_estimate + reflected.recv.error_estimate + recv.error_estimate,
                );
                self.accumulator
                    .note_sync(send.sync && recv.sync && reflected.send.sync && reflected.recv.sync);
                self.accumulator.note_delay(d);
                self.accumulator.note_proc_delay(proc_d);

                if first_observation {
                    self.histogram.increment(d);
                    self.accumulator.note_ttl(*ttl);
                    self.reorder.observe(self.window.slot(idx).seq);
                }

                if let Some(w) = output.as_mut() {
                    let _ = writeln!(
                        w,
                        "seq_no={} delay={:.6} proc_delay={:.6}",
                        self.window.slot(idx).seq,
                        d,
                        proc_d
                    );
                }
            }
        }
        Ok(())
    }
}

fn estimate_packet_rate(header: &SessionHeader) -> f64 {
    let mean: f64 = header
        .test_spec
        .slots
        .iter()
        .map(|s| s.mean_delay.to_f64())
        .sum::<f64>()
        / header.test_spec.slots.len().max(1) as f64;
    if mean > 0.0 {
        1.0 / mean
    } else {
        1.0
    }
}

pub fn loss_inf(header: &SessionHeader) -> f64 {
    inf_delay(header.test_spec.loss_timeout)
}
