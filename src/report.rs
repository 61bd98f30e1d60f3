// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Summary Reporters: human-readable and machine-readable renderings of a
//! frozen [`Summary`]. Neither reporter mutates or re-derives statistics;
//! they only read what `SessionDriver::parse` already computed.

use crate::driver::Summary;
use crate::error::Result;
use crate::header::FinishedStatus;
use chrono::{Local, TimeZone};
use std::io::Write;

/// One of the four recognized scale indications: nanoseconds,
/// microseconds, milliseconds, seconds.
///
/// The original C `switch` falls through from `'m'` into `'s'` without a
/// `break`; since the `'s'` arm multiplies by nothing further, the
/// observable factor for `'m'` is `1000.0` regardless. This returns that
/// same factor via a plain match arm rather than reproducing the
/// fall-through.
pub fn scale_factor(scale: char) -> Option<(f64, &'static str)> {
    match scale.to_ascii_lowercase() {
        'n' => Some((1_000_000_000.0, "ns")),
        'u' => Some((1_000_000.0, "us")),
        'm' => Some((1_000.0, "ms")),
        's' => Some((1.0, "s")),
        _ => None,
    }
}

fn format_metric(value: f64, inf_delay: f64, scale: f64) -> String {
    if value.abs() >= inf_delay {
        "nan".to_string()
    } else {
        format!("{:.3e}", value * scale)
    }
}

fn local_timestring(unix_secs: f64) -> String {
    match Local.timestamp_opt(unix_secs.floor() as i64, ((unix_secs.fract()) * 1e9) as u32) {
        chrono::LocalResult::Single(dt) => dt.format("%FT%T%.3f").to_string(),
        _ => "XXX".to_string(),
    }
}

/// Render the human-readable report described by the original
/// `OWPStatsPrintSummary`.
pub fn print_summary(
    summary: &Summary,
    output: &mut dyn Write,
    scale: char,
    extra_percentiles: &[f32],
) -> Result<()> {
    let (scale_v, abrv) = scale_factor(scale).unwrap_or((1.0, "s"));
    let inf = crate::accumulator::inf_delay(summary.header.test_spec.loss_timeout);

    writeln!(
        output,
        "{} session, SID {}",
        if summary.header.test_spec.two_way {
            "two-way"
        } else {
            "one-way"
        },
        summary.header.sid
    )?;
    writeln!(
        output,
        "from {} to {}",
        summary.from_label.as_deref().unwrap_or("-"),
        summary.to_label.as_deref().unwrap_or("-")
    )?;

    writeln!(
        output,
        "first:\t{}\nlast:\t{}",
        local_timestring(summary.start_time.to_unix_f64()),
        local_timestring(summary.accumulator.end_time.to_unix_f64())
    )?;

    let loss_pct = summary.accumulator.loss_percent();
    writeln!(
        output,
        "{} sent, {} lost ({:.3}%), {} duplicates",
        summary.accumulator.sent, summary.accumulator.lost, loss_pct, summary.accumulator.dups
    )?;

    let minval = format_metric(summary.accumulator.min_delay, inf, scale_v);
    let maxval = format_metric(summary.accumulator.max_delay, inf, scale_v);
    let medval = summary
        .percentile(0.5)
        .map(|v| format!("{:.3e}", v * scale_v))
        .unwrap_or_else(|| "nan".to_string());

    write!(
        output,
        "{} min/median/max = {}/{}/{} {}, ",
        if summary.header.test_spec.two_way {
            "round-trip time"
        } else {
            "one-way delay"
        },
        minval,
        medval,
        maxval,
        abrv
    )?;
    if summary.accumulator.sync {
        writeln!(output, "(err={:.3e} {})", summary.accumulator.maxerr * scale_v, abrv)?;
    } else {
        writeln!(output, "(unsync)")?;
    }

    if summary.header.test_spec.two_way {
        let minp = format_metric(summary.accumulator.min_proc_delay, inf, scale_v);
        let maxp = format_metric(summary.accumulator.max_proc_delay, inf, scale_v);
        writeln!(
            output,
            "reflector processing time min/max = {}/{} {}",
            minp, maxp, abrv
        )?;
    }

    let jitter = match (summary.percentile(0.95), summary.percentile(0.5)) {
        (Some(p95), Some(p50)) => format!("{:.3e}", (p95 - p50) * scale_v),
        _ => "nan".to_string(),
    };
    writeln!(
        output,
        "{} = {} {} (P95-P50)",
        if summary.header.test_spec.two_way {
            "two-way PDV"
        } else {
            "one-way jitter"
        },
        jitter,
        abrv
    )?;

    if !extra_percentiles.is_empty() {
        writeln!(output, "Percentiles:")?;
        for &p in extra_percentiles {
            let val = summary
                .percentile(p as f64 / 100.0)
                .map(|v| format!("{:.3e}", v * scale_v))
                .unwrap_or_else(|| "nan".to_string());
            writeln!(output, "\t{:.1}: {} {}", p, val, abrv)?;
        }
    }

    match (
        summary.accumulator.min_ttl(),
        summary.accumulator.max_ttl(),
    ) {
        (None, _) | (_, None) => writeln!(output, "TTL not reported")?,
        (Some(min), Some(max)) if min == max => {
            writeln!(output, "Hops = {} (consistently)", 255 - min)?
        }
        (Some(min), Some(max)) => {
            let nttl = summary
                .accumulator
                .ttl_count
                .iter()
                .filter(|&&c| c > 0)
                .count();
            writeln!(
                output,
                "Hops takes {} values; Min Hops = {}, Max Hops = {}",
                nttl,
                255 - max,
                255 - min
            )?
        }
    }

    let rn = &summary.reorder_counts;
    let mut i = 0usize;
    while i < rn.len() && rn[i] > 0 {
        writeln!(
            output,
            "{}-reordering = {:.6}%",
            i + 1,
            100.0 * rn[i] as f64 / summary.accumulator.sent.max(1) as f64
        )?;
        i += 1;
    }
    if i == 0 {
        writeln!(output, "no reordering")?;
    } else if i < rn.len() {
        writeln!(output, "no {}-reordering", i + 1)?;
    } else {
        writeln!(output, "{}-reordering not handled", rn.len() + 1)?;
    }

    writeln!(output)?;
    Ok(())
}

fn write_ttl_tag(output: &mut dyn Write, tag: &str, value: u8) -> Result<()> {
    writeln!(output, "{}\t{}", tag, value)?;
    Ok(())
}

/// Render the machine-readable report described by the original
/// `OWPStatsPrintMachine`. This reproduces the original's `MAXTTL` line
/// printing `minttl` (a source-level typo) for bug-for-bug compatibility
/// with historical consumers of this output. Use
/// [`print_machine_corrected`] for the fixed variant.
pub fn print_machine(summary: &Summary, output: &mut dyn Write) -> Result<()> {
    print_machine_impl(summary, output, false)
}

/// As [`print_machine`], but with the `MAXTTL` line fixed to actually
/// print the maximum observed TTL.
pub fn print_machine_corrected(summary: &Summary, output: &mut dyn Write) -> Result<()> {
    print_machine_impl(summary, output, true)
}

fn print_machine_impl(summary: &Summary, output: &mut dyn Write, fix_maxttl: bool) -> Result<()> {
    writeln!(output, "SUMMARY\t3.00")?;
    writeln!(output, "SID\t{}", summary.header.sid)?;
    writeln!(
        output,
        "FROM_HOST\t{}",
        summary.from_label.as_deref().unwrap_or("-")
    )?;
    writeln!(output, "FROM_ADDR\t{}", summary.header.from.ip())?;
    writeln!(output, "FROM_PORT\t{}", summary.header.from.port())?;
    writeln!(
        output,
        "TO_HOST\t{}",
        summary.to_label.as_deref().unwrap_or("-")
    )?;
    writeln!(output, "TO_ADDR\t{}", summary.header.to.ip())?;
    writeln!(output, "TO_PORT\t{}", summary.header.to.port())?;

    writeln!(
        output,
        "START_TIME\t{}.{}",
        summary.start_time.seconds, summary.start_time.fraction
    )?;
    writeln!(
        output,
        "END_TIME\t{}.{}",
        summary.accumulator.end_time.seconds, summary.accumulator.end_time.fraction
    )?;
    writeln!(
        output,
        "UNIX_START_TIME\t{:.6}",
        summary.start_time.to_unix_f64()
    )?;
    writeln!(
        output,
        "UNIX_END_TIME\t{:.6}",
        summary.accumulator.end_time.to_unix_f64()
    )?;

    let type_p = summary.header.test_spec.type_p;
    if type_p & 0x03 == 0 {
        writeln!(output, "DSCP\t0x{:02x}", summary.header.test_spec.dscp())?;
    }

    writeln!(
        output,
        "LOSS_TIMEOUT\t{:.6}",
        summary.header.test_spec.loss_timeout.to_f64()
    )?;
    writeln!(
        output,
        "PACKET_PADDING\t{}",
        summary.header.test_spec.packet_size_padding
    )?;
    writeln!(
        output,
        "SESSION_PACKET_COUNT\t{}",
        summary.header.test_spec.npackets
    )?;
    writeln!(
        output,
        "SAMPLE_PACKET_COUNT\t{}",
        summary.last_seq - summary.first_seq
    )?;
    writeln!(output, "BUCKET_WIDTH\t{}", summary.bucket_width)?;
    writeln!(
        output,
        "SESSION_FINISHED\t{}",
        matches!(summary.header.finished_status, FinishedStatus::Normal) as u8
    )?;

    writeln!(output, "SENT\t{}", summary.accumulator.sent)?;
    writeln!(output, "SYNC\t{}", summary.accumulator.sync as u8)?;
    writeln!(output, "MAXERR\t{:.6}", summary.accumulator.maxerr)?;
    writeln!(output, "DUPS\t{}", summary.accumulator.dups)?;
    writeln!(output, "LOST\t{}", summary.accumulator.lost)?;

    let inf = crate::accumulator::inf_delay(summary.header.test_spec.loss_timeout);
    if summary.accumulator.min_delay < inf {
        writeln!(output, "MIN\t{:.6}", summary.accumulator.min_delay)?;
    }
    if summary.accumulator.max_delay > -inf {
        writeln!(output, "MAX\t{:.6}", summary.accumulator.max_delay)?;
    }

    if summary.accumulator.sent > summary.accumulator.lost {
        writeln!(output, "<BUCKETS>")?;
        for (delay, count) in summary.bucket_counts() {
            writeln!(output, "\t{}\t{}", delay, count)?;
        }
        writeln!(output, "</BUCKETS>")?;
    }

    match (
        summary.accumulator.min_ttl(),
        summary.accumulator.max_ttl(),
    ) {
        (Some(min), Some(max)) => {
            write_ttl_tag(output, "MINTTL", min)?;
            write_ttl_tag(output, "MAXTTL", if fix_maxttl { max } else { min })?;
            writeln!(output, "<TTLBUCKETS>")?;
            for (ttl, count) in summary.accumulator.ttl_count.iter().enumerate() {
                if *count > 0 {
                    writeln!(output, "\t{}\t{}", ttl, count)?;
                }
            }
            writeln!(output, "</TTLBUCKETS>")?;
        }
        _ => {}
    }

    writeln!(output)?;

    writeln!(output, "<NREORDERING>")?;
    let rn = &summary.reorder_counts;
    let mut j = 0usize;
    while j < rn.len() && rn[j] > 0 {
        writeln!(output, "\t{}\t{}", j + 1, rn[j])?;
        j += 1;
    }
    if j == 0 || j >= rn.len() {
        writeln!(output, "\t{}\t{}", j + 1, 0)?;
    }
    writeln!(output, "</NREORDERING>")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_factor_ms_is_1000_despite_fallthrough_history() {
        let (factor, abrv) = scale_factor('m').unwrap();
        assert_eq!(factor, 1000.0);
        assert_eq!(abrv, "ms");
    }

    #[test]
    fn scale_factor_unknown_is_none() {
        assert!(scale_factor('x').is_none());
    }

    #[test]
    fn scale_round_trips_within_a_ulp() {
        for c in ['n', 'u', 'm', 's'] {
            let (factor, _) = scale_factor(c).unwrap();
            let original = 0.042_f64;
            let scaled = original * factor;
            let back = scaled / factor;
            assert!((back - original).abs() < 1e-12);
        }
    }
}
