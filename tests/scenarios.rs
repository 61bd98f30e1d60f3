// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Literal end-to-end scenarios (S1-S6) built over an in-memory
//! `RecordSource` fixture and a `FixedSchedule`.

use owstats::driver::{RecordSource, SessionDriver, SourceRecord};
use owstats::error::Result;
use owstats::header::{FinishedStatus, SessionHeader, Sid, SkipRange, Slot, SlotType, TestSpec};
use owstats::record::{DataRecord, TimeStamp};
use owstats::schedule::FixedSchedule;
use owstats::time::Num64;
use std::collections::VecDeque;

struct FixtureSource {
    records: VecDeque<SourceRecord>,
    record_size: u64,
    pos: u64,
}

impl FixtureSource {
    fn new(records: Vec<SourceRecord>) -> Self {
        FixtureSource {
            records: records.into_iter().collect(),
            record_size: 8,
            pos: 0,
        }
    }
}

impl RecordSource for FixtureSource {
    fn seek(&mut self, offset: u64) -> Result<()> {
        self.pos = offset;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn record_size(&self) -> u64 {
        self.record_size
    }

    fn next_record(&mut self) -> Result<Option<SourceRecord>> {
        Ok(self.records.pop_front())
    }
}

fn ts(secs: f64) -> TimeStamp {
    TimeStamp {
        owptime: Num64::from_f64(secs),
        sync: true,
        error_estimate: 0.0001,
    }
}

fn header(npackets: u32) -> SessionHeader {
    SessionHeader {
        sid: Sid([3u8; 16]),
        from: "127.0.0.1:5000".parse().unwrap(),
        to: "127.0.0.1:5001".parse().unwrap(),
        test_spec: TestSpec {
            start_time: Num64::from_f64(1_000_000.0),
            slots: vec![Slot {
                slot_type: SlotType::Literal,
                mean_delay: Num64::from_f64(1.0),
                nreps: npackets,
            }],
            npackets,
            loss_timeout: Num64::from_f64(10.0),
            packet_size_padding: 0,
            type_p: 0,
            two_way: false,
        },
        skip_ranges: vec![],
        finished_status: FinishedStatus::Normal,
        record_size: 30,
        version: 2,
    }
}

fn received(seq: u32, send_secs: f64, delay: f64, ttl: u8) -> SourceRecord {
    SourceRecord::OneWay(DataRecord::Received {
        seq_no: seq,
        send: ts(send_secs),
        recv: ts(send_secs + delay),
        ttl,
    })
}

fn lost(seq: u32, ttl: u8) -> SourceRecord {
    SourceRecord::OneWay(DataRecord::Lost {
        seq_no: seq,
        recv: ts(1_000_000.0 + seq as f64),
        ttl,
    })
}

#[test]
fn s1_no_loss_no_dup_in_order() {
    let hdr = header(5);
    let mut driver = SessionDriver::create(hdr, None, None, 0.005).unwrap();
    let mut source = FixtureSource::new(vec![
        received(0, 1_000_000.0, 0.010, 64),
        received(1, 1_000_001.0, 0.020, 64),
        received(2, 1_000_002.0, 0.015, 64),
        received(3, 1_000_003.0, 0.025, 64),
        received(4, 1_000_004.0, 0.030, 64),
    ]);
    let mut schedule = FixedSchedule::new(vec![1.0]);
    let summary = driver
        .parse(&mut source, None, 0, 0, None, &mut schedule)
        .unwrap();

    assert_eq!(summary.accumulator.sent, 5);
    assert_eq!(summary.accumulator.lost, 0);
    assert_eq!(summary.accumulator.dups, 0);
    assert!((summary.accumulator.min_delay - 0.010).abs() < 1e-9);
    assert!((summary.accumulator.max_delay - 0.030).abs() < 1e-9);
    assert!((summary.percentile(0.5).unwrap() - 0.020).abs() < 1e-9);
    assert!(summary.reorder_counts.iter().all(|&c| c == 0));
}

#[test]
fn s2_single_loss() {
    let hdr = header(5);
    let mut driver = SessionDriver::create(hdr, None, None, 0.005).unwrap();
    let mut source = FixtureSource::new(vec![
        received(0, 1_000_000.0, 0.010, 64),
        received(1, 1_000_001.0, 0.020, 64),
        lost(2, 64),
        received(3, 1_000_003.0, 0.025, 64),
        received(4, 1_000_004.0, 0.030, 64),
    ]);
    let mut schedule = FixedSchedule::new(vec![1.0]);
    let summary = driver
        .parse(&mut source, None, 0, 0, None, &mut schedule)
        .unwrap();

    assert_eq!(summary.accumulator.sent, 5);
    assert_eq!(summary.accumulator.lost, 1);
    assert!((summary.accumulator.loss_percent() - 20.0).abs() < 1e-6);
}

#[test]
fn s3_duplicate() {
    let hdr = header(5);
    let mut driver = SessionDriver::create(hdr, None, None, 0.005).unwrap();
    let mut source = FixtureSource::new(vec![
        received(0, 1_000_000.0, 0.010, 64),
        received(1, 1_000_001.0, 0.020, 64),
        received(2, 1_000_002.0, 0.015, 64),
        received(3, 1_000_003.0, 0.025, 64),
        received(3, 1_000_003.0, 0.025, 64),
        received(4, 1_000_004.0, 0.030, 64),
    ]);
    let mut schedule = FixedSchedule::new(vec![1.0]);
    let summary = driver
        .parse(&mut source, None, 0, 0, None, &mut schedule)
        .unwrap();

    assert_eq!(summary.accumulator.sent, 5);
    assert_eq!(summary.accumulator.lost, 0);
    assert_eq!(summary.accumulator.dups, 1);
    let total: u64 = summary.bucket_counts().iter().map(|(_, c)| c).sum();
    assert_eq!(total, 5);
}

#[test]
fn s4_reorder() {
    let hdr = header(5);
    let mut driver = SessionDriver::create(hdr, None, None, 0.005).unwrap();
    let mut source = FixtureSource::new(vec![
        received(0, 1_000_000.0, 0.010, 64),
        received(1, 1_000_001.0, 0.020, 64),
        received(2, 1_000_002.0, 0.015, 64),
        received(4, 1_000_004.0, 0.030, 64),
        received(3, 1_000_003.0, 0.025, 64),
    ]);
    let mut schedule = FixedSchedule::new(vec![1.0]);
    let summary = driver
        .parse(&mut source, None, 0, 0, None, &mut schedule)
        .unwrap();

    assert_eq!(summary.reorder_counts[0], 1);
    assert!(summary.reorder_counts[1..].iter().all(|&c| c == 0));
}

#[test]
fn s5_skip_range_excludes_packet() {
    let mut hdr = header(5);
    hdr.skip_ranges = vec![SkipRange { begin: 2, end: 2 }];
    let mut driver = SessionDriver::create(hdr, None, None, 0.005).unwrap();
    let mut source = FixtureSource::new(vec![
        received(0, 1_000_000.0, 0.010, 64),
        received(1, 1_000_001.0, 0.020, 64),
        lost(2, 64),
        received(3, 1_000_003.0, 0.025, 64),
        received(4, 1_000_004.0, 0.030, 64),
    ]);
    let mut schedule = FixedSchedule::new(vec![1.0]);
    let summary = driver
        .parse(&mut source, None, 0, 0, None, &mut schedule)
        .unwrap();

    assert_eq!(summary.accumulator.sent, 4);
    assert_eq!(summary.accumulator.lost, 0);
    assert_eq!(summary.accumulator.dups, 0);
}

#[test]
fn s6_ttl_hops() {
    let hdr = header(3);
    let mut driver = SessionDriver::create(hdr, None, None, 0.005).unwrap();
    let mut source = FixtureSource::new(vec![
        received(0, 1_000_000.0, 0.010, 255),
        received(1, 1_000_001.0, 0.015, 254),
        received(2, 1_000_002.0, 0.020, 255),
    ]);
    let mut schedule = FixedSchedule::new(vec![1.0]);
    let summary = driver
        .parse(&mut source, None, 0, 0, None, &mut schedule)
        .unwrap();

    assert_eq!(summary.accumulator.min_ttl(), Some(254));
    assert_eq!(summary.accumulator.max_ttl(), Some(255));

    let mut buf = Vec::new();
    owstats::report::print_summary(&summary, &mut buf, 'm', &[]).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.contains("Hops takes 2 values; Min Hops = 0, Max Hops = 1"));
}
