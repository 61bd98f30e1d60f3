// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session file format (.owss): the on-disk layout a completed
//! measurement session is recorded to, and the engine's own
//! [`crate::driver::RecordSource`] implementation over it.
//!
//! # Format Overview
//!
//! ```text
//! +---------------------------------------------------------+
//! |                   File Header (fixed)                    |
//! |  Magic (8) | Version (4) | Flags (4) | Sid (16)          |
//! |  From/To addr (var) | TestSpec (var) | RecSize (4)       |
//! |  OsetDataRecs (8) | OsetSkipRecs (8) | NumSkipRecs (4)    |
//! |  Skip records (8 bytes each) | HeaderCrc32 (4)            |
//! +---------------------------------------------------------+
//! |                   Data records (fixed size each)          |
//! +---------------------------------------------------------+
//! ```
//!
//! `HeaderCrc32` is a CRC-32 (`crc32fast`) over every header byte that
//! precedes it (magic through the skip records); [`read_header`] recomputes
//! it and rejects the file with [`StatsError::CorruptSession`] on mismatch.
//!
//! One-way data record (fixed, 28 bytes): seq (4) | send Num64 (8) |
//! recv Num64 (8) | send_sync+recv_sync+lost flags (1) | ttl (1) |
//! send_err (4, f32) | recv_err (4, f32). Two-way records append the
//! reflected send/recv Num64 pair and their own sync/error fields.

use crate::error::{Result, StatsError};
use crate::header::{FinishedStatus, SessionHeader, Sid, SkipRange, Slot, SlotType, TestSpec};
use crate::record::{DataRecord, ReflectedTimestamps, TimeStamp, TwoWayRecord};
use crate::time::Num64;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::net::SocketAddr;
use std::path::Path;

/// Magic bytes: "OWSTATS\0"
pub const MAGIC: [u8; 8] = *b"OWSTATS\0";

pub const FORMAT_VERSION: u32 = 2;

const ONE_WAY_RECORD_SIZE: u32 = 30;
const TWO_WAY_RECORD_SIZE: u32 = 46;
const SKIP_RECORD_SIZE: u64 = 8;

const LOST_FLAG: u8 = 0x01;
const SEND_SYNC_FLAG: u8 = 0x02;
const RECV_SYNC_FLAG: u8 = 0x04;
const REFL_SEND_SYNC_FLAG: u8 = 0x08;
const REFL_RECV_SYNC_FLAG: u8 = 0x10;

/// A session-file-backed reader implementing [`crate::driver::RecordSource`].
pub struct SessionFile {
    reader: BufReader<File>,
    oset_datarecs: u64,
    record_size: u32,
    two_way: bool,
    npackets: u32,
    records_read: u32,
}

impl SessionFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, SessionHeader)> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let header = read_header(&mut reader)?;

        let mut sf = SessionFile {
            reader,
            oset_datarecs: header.oset_datarecs,
            record_size: header.session.record_size,
            two_way: header.session.test_spec.two_way,
            npackets: header.session.test_spec.npackets,
            records_read: 0,
        };
        sf.reader.seek(SeekFrom::Start(sf.oset_datarecs))?;
        Ok((sf, header.session))
    }
}

impl crate::driver::RecordSource for SessionFile {
    fn seek(&mut self, offset: u64) -> Result<()> {
        self.reader
            .seek(SeekFrom::Start(self.oset_datarecs + offset))?;
        self.records_read = (offset / self.record_size as u64) as u32;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.records_read as u64 * self.record_size as u64
    }

    fn record_size(&self) -> u64 {
        self.record_size as u64
    }

    fn next_record(&mut self) -> Result<Option<crate::driver::SourceRecord>> {
        if self.records_read >= self.npackets {
            return Ok(None);
        }
        let rec = if self.two_way {
            read_two_way_record(&mut self.reader)?
        } else {
            read_one_way_record(&mut self.reader)?
        };
        self.records_read += 1;
        Ok(Some(rec))
    }
}

fn timestamp_io_err(e: io::Error) -> StatsError {
    StatsError::from(e)
}

fn read_timestamp<R: Read>(r: &mut R, sync: bool) -> Result<TimeStamp> {
    let owptime = Num64::read(r).map_err(timestamp_io_err)?;
    let error_estimate = r.read_f32::<BigEndian>().map_err(timestamp_io_err)? as f64;
    Ok(TimeStamp {
        owptime,
        sync,
        error_estimate,
    })
}

fn write_timestamp<W: Write>(w: &mut W, ts: &TimeStamp) -> io::Result<()> {
    ts.owptime.write(w)?;
    w.write_f32::<BigEndian>(ts.error_estimate as f32)?;
    Ok(())
}

fn read_one_way_record<R: Read>(r: &mut R) -> Result<crate::driver::SourceRecord> {
    let seq_no = r.read_u32::<BigEndian>()?;
    let flags = r.read_u8()?;
    let ttl = r.read_u8()?;
    let lost = flags & LOST_FLAG != 0;
    let recv = read_timestamp(r, flags & RECV_SYNC_FLAG != 0)?;
    let send = read_timestamp(r, flags & SEND_SYNC_FLAG != 0)?;

    let rec = if lost {
        DataRecord::Lost { seq_no, recv, ttl }
    } else {
        DataRecord::Received {
            seq_no,
            send,
            recv,
            ttl,
        }
    };
    Ok(crate::driver::SourceRecord::OneWay(rec))
}

fn read_two_way_record<R: Read>(r: &mut R) -> Result<crate::driver::SourceRecord> {
    let seq_no = r.read_u32::<BigEndian>()?;
    let flags = r.read_u8()?;
    let ttl = r.read_u8()?;
    let lost = flags & LOST_FLAG != 0;
    let recv = read_timestamp(r, flags & RECV_SYNC_FLAG != 0)?;
    let send = read_timestamp(r, flags & SEND_SYNC_FLAG != 0)?;

    let sent = if lost {
        DataRecord::Lost { seq_no, recv, ttl }
    } else {
        DataRecord::Received {
            seq_no,
            send,
            recv,
            ttl,
        }
    };

    let reflected = if lost {
        None
    } else {
        let refl_send = read_timestamp(r, flags & REFL_SEND_SYNC_FLAG != 0)?;
        let refl_recv = read_timestamp(r, flags & REFL_RECV_SYNC_FLAG != 0)?;
        Some(ReflectedTimestamps {
            send: refl_send,
            recv: refl_recv,
        })
    };

    Ok(crate::driver::SourceRecord::TwoWay(TwoWayRecord {
        sent,
        reflected,
        ttl,
    }))
}

struct ParsedHeader {
    session: SessionHeader,
    oset_datarecs: u64,
    oset_skiprecs: u64,
    num_skiprecs: u32,
}

fn read_socket_addr<R: Read>(r: &mut R) -> Result<SocketAddr> {
    let mut len_buf = [0u8; 2];
    r.read_exact(&mut len_buf)?;
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    let text = String::from_utf8(buf)
        .map_err(|e| StatsError::CorruptSession(format!("invalid address utf-8: {e}")))?;
    text.parse()
        .map_err(|e| StatsError::CorruptSession(format!("invalid socket address {text:?}: {e}")))
}

fn write_socket_addr<W: Write>(w: &mut W, addr: &SocketAddr) -> io::Result<()> {
    let text = addr.to_string();
    w.write_u16::<BigEndian>(text.len() as u16)?;
    w.write_all(text.as_bytes())
}

fn read_header<R: Read + Seek>(r: &mut R) -> Result<ParsedHeader> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(StatsError::CorruptSession(
            "bad session file magic".into(),
        ));
    }

    let version = r.read_u32::<BigEndian>()?;
    if version < SessionHeader::MIN_VERSION {
        return Err(StatsError::CorruptSession(format!(
            "unsupported session file version {version}"
        )));
    }

    let mut sid = [0u8; 16];
    r.read_exact(&mut sid)?;

    let from = read_socket_addr(r)?;
    let to = read_socket_addr(r)?;

    let start_time = Num64::read(r)?;
    let npackets = r.read_u32::<BigEndian>()?;
    let loss_timeout = Num64::read(r)?;
    let packet_size_padding = r.read_u32::<BigEndian>()?;
    let type_p = r.read_u8()?;
    let two_way = r.read_u8()? != 0;

    let nslots = r.read_u32::<BigEndian>()?;
    let mut slots = Vec::with_capacity(nslots as usize);
    for _ in 0..nslots {
        let slot_type = match r.read_u8()? {
            0 => SlotType::Exponential,
            1 => SlotType::Literal,
            other => {
                return Err(StatsError::CorruptSession(format!(
                    "unknown slot type tag {other}"
                )))
            }
        };
        let mean_delay = Num64::read(r)?;
        let nreps = r.read_u32::<BigEndian>()?;
        slots.push(Slot {
            slot_type,
            mean_delay,
            nreps,
        });
    }

    let finished_status = match r.read_u8()? {
        0 => FinishedStatus::Unknown,
        1 => FinishedStatus::Normal,
        2 => FinishedStatus::Aborted,
        other => {
            return Err(StatsError::CorruptSession(format!(
                "unknown finished-status tag {other}"
            )))
        }
    };

    let record_size = r.read_u32::<BigEndian>()?;
    let oset_datarecs = r.read_u64::<BigEndian>()?;
    let oset_skiprecs = r.read_u64::<BigEndian>()?;
    let num_skiprecs = r.read_u32::<BigEndian>()?;

    // Skip ranges are written immediately following `num_skiprecs`, at
    // exactly `oset_skiprecs`; read them in place rather than seeking,
    // since the cursor is already there.
    debug_assert_eq!(r.stream_position()?, oset_skiprecs);
    let mut skip_ranges = Vec::with_capacity(num_skiprecs as usize);
    for _ in 0..num_skiprecs {
        let begin = r.read_u32::<BigEndian>()?;
        let end = r.read_u32::<BigEndian>()?;
        skip_ranges.push(SkipRange { begin, end });
    }

    let pos_before_crc = r.stream_position()?;
    let stored_crc = r.read_u32::<BigEndian>()?;
    debug_assert_eq!(r.stream_position()?, oset_datarecs);

    let mut header_bytes = vec![0u8; pos_before_crc as usize];
    r.seek(SeekFrom::Start(0))?;
    r.read_exact(&mut header_bytes)?;
    r.seek(SeekFrom::Start(oset_datarecs))?;
    if crc32(&header_bytes) != stored_crc {
        return Err(StatsError::CorruptSession(
            "session file header checksum mismatch".into(),
        ));
    }

    let session = SessionHeader {
        sid: Sid(sid),
        from,
        to,
        test_spec: TestSpec {
            start_time,
            slots,
            npackets,
            loss_timeout,
            packet_size_padding,
            type_p,
            two_way,
        },
        skip_ranges,
        finished_status,
        record_size,
        version,
    };

    Ok(ParsedHeader {
        session,
        oset_datarecs,
        oset_skiprecs,
        num_skiprecs,
    })
}

/// Writes session files in the layout [`read_header`] understands.
/// Provided so the reader above is actually exercisable end to end in
/// tests without depending on a pre-supplied binary fixture.
pub struct SessionFileWriter {
    writer: BufWriter<File>,
}

impl SessionFileWriter {
    pub fn create<P: AsRef<Path>>(path: P, header: &SessionHeader) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        write_header(&mut writer, header)?;
        Ok(SessionFileWriter { writer })
    }

    pub fn write_one_way(&mut self, rec: &DataRecord) -> Result<()> {
        write_one_way_record(&mut self.writer, rec)?;
        Ok(())
    }

    pub fn write_two_way(&mut self, rec: &TwoWayRecord) -> Result<()> {
        write_two_way_record(&mut self.writer, rec)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

fn write_header<W: Write>(w: &mut W, header: &SessionHeader) -> Result<()> {
    // Addresses and slots are variable-length, so the absolute byte
    // offsets stamped into `oset_datarecs`/`oset_skiprecs` can't be known
    // until everything ahead of them has actually been serialized. Stage
    // into an in-memory buffer, patch the two offset fields once their
    // real values are known, then write the whole header in one shot.
    let mut buf: Vec<u8> = Vec::new();

    buf.write_all(&MAGIC)?;
    buf.write_u32::<BigEndian>(FORMAT_VERSION)?;
    buf.write_all(&header.sid.0)?;
    write_socket_addr(&mut buf, &header.from)?;
    write_socket_addr(&mut buf, &header.to)?;
    header.test_spec.start_time.write(&mut buf)?;
    buf.write_u32::<BigEndian>(header.test_spec.npackets)?;
    header.test_spec.loss_timeout.write(&mut buf)?;
    buf.write_u32::<BigEndian>(header.test_spec.packet_size_padding)?;
    buf.write_u8(header.test_spec.type_p)?;
    buf.write_u8(header.test_spec.two_way as u8)?;

    buf.write_u32::<BigEndian>(header.test_spec.slots.len() as u32)?;
    for slot in &header.test_spec.slots {
        buf.write_u8(match slot.slot_type {
            SlotType::Exponential => 0,
            SlotType::Literal => 1,
        })?;
        slot.mean_delay.write(&mut buf)?;
        buf.write_u32::<BigEndian>(slot.nreps)?;
    }

    buf.write_u8(match header.finished_status {
        FinishedStatus::Unknown => 0,
        FinishedStatus::Normal => 1,
        FinishedStatus::Aborted => 2,
    })?;

    let record_size = if header.test_spec.two_way {
        TWO_WAY_RECORD_SIZE
    } else {
        ONE_WAY_RECORD_SIZE
    };
    buf.write_u32::<BigEndian>(record_size)?;

    let oset_datarecs_field_pos = buf.len();
    buf.write_u64::<BigEndian>(0)?;
    let oset_skiprecs_field_pos = buf.len();
    buf.write_u64::<BigEndian>(0)?;
    buf.write_u32::<BigEndian>(header.skip_ranges.len() as u32)?;

    let oset_skiprecs = buf.len() as u64;
    for range in &header.skip_ranges {
        buf.write_u32::<BigEndian>(range.begin)?;
        buf.write_u32::<BigEndian>(range.end)?;
    }

    // +4 for the header_crc field appended below, which the offset fields
    // must already account for: the crc has to be computed over the
    // fully-patched header, so the offsets are patched first.
    let oset_datarecs = buf.len() as u64 + 4;
    buf[oset_datarecs_field_pos..oset_datarecs_field_pos + 8]
        .copy_from_slice(&oset_datarecs.to_be_bytes());
    buf[oset_skiprecs_field_pos..oset_skiprecs_field_pos + 8]
        .copy_from_slice(&oset_skiprecs.to_be_bytes());

    let header_crc = crc32(&buf);
    buf.write_u32::<BigEndian>(header_crc)?;
    debug_assert_eq!(buf.len() as u64, oset_datarecs);

    w.write_all(&buf)?;
    Ok(())
}

fn write_one_way_record<W: Write>(w: &mut W, rec: &DataRecord) -> io::Result<()> {
    let mut flags = 0u8;
    let (seq_no, send, recv, ttl) = match rec {
        DataRecord::Lost { seq_no, recv, ttl } => {
            flags |= LOST_FLAG;
            if recv.sync {
                flags |= RECV_SYNC_FLAG;
            }
            (*seq_no, TimeStamp { owptime: Num64::ZERO, sync: false, error_estimate: 0.0 }, *recv, *ttl)
        }
        DataRecord::Received {
            seq_no,
            send,
            recv,
            ttl,
        } => {
            if send.sync {
                flags |= SEND_SYNC_FLAG;
            }
            if recv.sync {
                flags |= RECV_SYNC_FLAG;
            }
            (*seq_no, *send, *recv, *ttl)
        }
    };
    w.write_u32::<BigEndian>(seq_no)?;
    w.write_u8(flags)?;
    w.write_u8(ttl)?;
    write_timestamp(w, &recv)?;
    write_timestamp(w, &send)?;
    Ok(())
}

fn write_two_way_record<W: Write>(w: &mut W, rec: &TwoWayRecord) -> io::Result<()> {
    let mut flags = 0u8;
    if let Some(refl) = &rec.reflected {
        if refl.send.sync {
            flags |= REFL_SEND_SYNC_FLAG;
        }
        if refl.recv.sync {
            flags |= REFL_RECV_SYNC_FLAG;
        }
    }
    let (seq_no, send, recv, ttl) = match &rec.sent {
        DataRecord::Lost { seq_no, recv, ttl } => {
            flags |= LOST_FLAG;
            if recv.sync {
                flags |= RECV_SYNC_FLAG;
            }
            (*seq_no, TimeStamp { owptime: Num64::ZERO, sync: false, error_estimate: 0.0 }, *recv, *ttl)
        }
        DataRecord::Received {
            seq_no,
            send,
            recv,
            ttl,
        } => {
            if send.sync {
                flags |= SEND_SYNC_FLAG;
            }
            if recv.sync {
                flags |= RECV_SYNC_FLAG;
            }
            (*seq_no, *send, *recv, *ttl)
        }
    };
    w.write_u32::<BigEndian>(seq_no)?;
    w.write_u8(flags)?;
    w.write_u8(ttl)?;
    write_timestamp(w, &recv)?;
    write_timestamp(w, &send)?;
    if let Some(refl) = &rec.reflected {
        write_timestamp(w, &refl.send)?;
        write_timestamp(w, &refl.recv)?;
    }
    Ok(())
}

/// CRC-32 over an arbitrary byte range, used to checksum the session file
/// header (see [`write_header`]/[`read_header`]).
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{FinishedStatus, Slot, SlotType};
    use tempfile::tempdir;

    fn sample_header(two_way: bool) -> SessionHeader {
        SessionHeader {
            sid: Sid([7u8; 16]),
            from: "127.0.0.1:5000".parse().unwrap(),
            to: "127.0.0.1:5001".parse().unwrap(),
            test_spec: TestSpec {
                start_time: Num64::from_f64(1_000_000.0),
                slots: vec![Slot {
                    slot_type: SlotType::Literal,
                    mean_delay: Num64::from_f64(1.0),
                    nreps: 5,
                }],
                npackets: 5,
                loss_timeout: Num64::from_f64(10.0),
                packet_size_padding: 0,
                type_p: 0,
                two_way,
            },
            skip_ranges: vec![],
            finished_status: FinishedStatus::Normal,
            record_size: if two_way {
                TWO_WAY_RECORD_SIZE
            } else {
                ONE_WAY_RECORD_SIZE
            },
            version: FORMAT_VERSION,
        }
    }

    #[test]
    fn header_round_trips() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("session.owss");
        let header = sample_header(false);

        let writer = SessionFileWriter::create(&path, &header).expect("create");
        writer.finish().expect("finish");

        let (_, read_back) = SessionFile::open(&path).expect("open");
        assert_eq!(read_back.sid, header.sid);
        assert_eq!(read_back.test_spec.npackets, 5);
        assert_eq!(read_back.test_spec.two_way, false);
    }

    #[test]
    fn crc32_is_stable() {
        let a = crc32(b"hello");
        let b = crc32(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, crc32(b"hellp"));
    }
}
