use crate::models::TimeInterval;
use anyhow::{Context, Result};
use std::time::Duration as StdDuration;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime, UtcOffset};

pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub fn utc_from_timestamp(ts: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(ts).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

pub fn parse_range(input: &str) -> Result<Duration> {
    let std = humantime::parse_duration(input).context("invalid duration format")?;
    Ok(duration_from_std(std))
}

pub fn duration_from_std(std: StdDuration) -> Duration {
    Duration::new(std.as_secs() as i64, std.subsec_nanos() as i32)
}

/// Parses an RFC 3339 timestamp and normalises it to UTC.
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime> {
    let ts = OffsetDateTime::parse(raw.trim(), &Rfc3339)
        .with_context(|| format!("invalid RFC 3339 timestamp {raw:?}"))?;
    Ok(ts.to_offset(UtcOffset::UTC))
}

/// Interval covering the last `range` up to `until` (or now).
pub fn interval_ending(range: Duration, until: Option<OffsetDateTime>) -> TimeInterval {
    let end = until.unwrap_or_else(now_utc);
    TimeInterval::new(end.checked_sub(range), Some(end))
}
