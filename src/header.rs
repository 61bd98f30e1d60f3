// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session descriptor types: the fixed metadata a completed session file
//! carries about the test that produced it.

use crate::time::Num64;
use std::fmt;
use std::net::SocketAddr;

/// A 16-byte session identifier, also used to seed the schedule PRNG.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sid(pub [u8; 16]);

impl fmt::Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sid({})", self)
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// A single schedule slot: a distribution family plus its mean interval.
///
/// Only the exponential family is implemented by [`crate::schedule::ExponentialSchedule`];
/// other slot types are preserved in the descriptor for round-tripping
/// session files produced by implementations that use them, but are
/// rejected by the schedule generator with [`crate::error::StatsError::CorruptSession`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub slot_type: SlotType,
    pub mean_delay: Num64,
    pub nreps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotType {
    Exponential,
    Literal,
}

/// An inclusive sequence-number range excluded from aggregation, e.g. to
/// drop a warm-up period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipRange {
    pub begin: u32,
    pub end: u32,
}

impl SkipRange {
    pub fn contains(&self, seq: u32) -> bool {
        seq >= self.begin && seq <= self.end
    }
}

/// Whether the session ran to completion or was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishedStatus {
    Unknown,
    Normal,
    Aborted,
}

/// Parameters of the test that produced the session: the portion of a
/// session file's header that the driver's schedule repositioning and
/// loss-timeout logic depend on.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSpec {
    pub start_time: Num64,
    pub slots: Vec<Slot>,
    pub npackets: u32,
    pub loss_timeout: Num64,
    pub packet_size_padding: u32,
    /// DSCP/TOS byte (`typeP`); DSCP occupies the high-order 6 bits.
    pub type_p: u8,
    pub two_way: bool,
}

impl TestSpec {
    pub fn dscp(&self) -> u8 {
        self.type_p >> 2
    }
}

/// Full descriptor of a completed session, as read from a session file's
/// header (and any embedded skip records).
#[derive(Debug, Clone)]
pub struct SessionHeader {
    pub sid: Sid,
    pub from: SocketAddr,
    pub to: SocketAddr,
    pub test_spec: TestSpec,
    pub skip_ranges: Vec<SkipRange>,
    pub finished_status: FinishedStatus,
    pub record_size: u32,
    pub version: u32,
}

impl SessionHeader {
    /// Lowest supported session-file version.
    pub const MIN_VERSION: u32 = 2;
}
