// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OWAMP/TWAMP session statistics engine.
//!
//! Reconciles a scheduled send stream against an observed receive stream
//! recorded from a completed one-way (OWAMP) or two-way (TWAMP)
//! measurement session, producing loss, duplicate, reordering, delay, and
//! TTL statistics.
//!
//! # Quick start
//!
//! ```no_run
//! use owstats::driver::SessionDriver;
//! use owstats::schedule::ExponentialSchedule;
//! use owstats::sessionfile::SessionFile;
//!
//! # fn main() -> owstats::error::Result<()> {
//! let (mut source, header) = SessionFile::open("session.owss")?;
//! let mut schedule = ExponentialSchedule::new(&header.sid.0, &header.test_spec);
//! let npackets = header.test_spec.npackets;
//! let mut driver = SessionDriver::create(header, None, None, 0.0001)?;
//! let summary = driver.parse(&mut source, None, 0, 0, Some(npackets), &mut schedule)?;
//! owstats::report::print_summary(&summary, &mut std::io::stdout(), 'm', &[])?;
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
pub mod driver;
pub mod error;
pub mod header;
pub mod histogram;
pub mod record;
pub mod reorder;
pub mod report;
pub mod schedule;
pub mod sessionfile;
pub mod time;
pub mod window;

pub use accumulator::StatsAccumulator;
pub use driver::{RecordSource, SessionDriver, SourceRecord, Summary};
pub use error::{Result, StatsError};
pub use header::{FinishedStatus, SessionHeader, Sid, SkipRange, Slot, SlotType, TestSpec};
pub use record::{DataRecord, ReflectedTimestamps, TimeStamp, TwoWayRecord};
pub use schedule::{ExponentialSchedule, FixedSchedule, ScheduleGenerator};
pub use sessionfile::SessionFile;
pub use time::Num64;
