use crate::models::{ChartType, TimeRange};
use itertools::Itertools;
use std::collections::HashSet;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

pub const CHART_TAG: &str = "oedExport";
pub const RAW_TAG: &str = "oedRawExport";
pub const RAW_SEGMENT: &str = "raw";

/// Everything needed to name one exported file.
#[derive(Debug, Clone, Copy)]
pub struct FileName<'a> {
    pub tag: &'a str,
    pub segment: &'a str,
    pub range: TimeRange,
    pub label: &'a str,
    pub unit: &'a str,
}

impl<'a> FileName<'a> {
    pub fn chart(chart: ChartType, range: TimeRange, label: &'a str, unit: &'a str) -> Self {
        Self {
            tag: CHART_TAG,
            segment: chart.as_str(),
            range,
            label,
            unit,
        }
    }

    pub fn raw(range: TimeRange, label: &'a str, unit: &'a str) -> Self {
        Self {
            tag: RAW_TAG,
            segment: RAW_SEGMENT,
            range,
            label,
            unit,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{}_{}_{}_to_{}_{}_{}.csv",
            sanitize(self.tag),
            sanitize(self.segment),
            name_timestamp(self.range.start),
            name_timestamp(self.range.end),
            sanitize(self.label),
            sanitize(self.unit),
        )
    }
}

pub fn chart_file_name(chart: ChartType, range: TimeRange, label: &str, unit: &str) -> String {
    FileName::chart(chart, range, label, unit).render()
}

pub fn raw_file_name(range: TimeRange, label: &str, unit: &str) -> String {
    FileName::raw(range, label, unit).render()
}

/// UTC timestamp in the fixed naming format, already sanitized.
pub fn name_timestamp(ts: OffsetDateTime) -> String {
    // Long English date and time, e.g. `January 1, 2023_12:00:00 AM`.
    let layout = format_description!(
        "[month repr:long] [day padding:none], [year]_[hour repr:12 padding:none]:[minute]:[second] [period]"
    );
    let utc = ts.to_offset(UtcOffset::UTC);
    // The description only holds components every OffsetDateTime has.
    let formatted = utc
        .format(layout)
        .unwrap_or_else(|_| utc.unix_timestamp().to_string());
    sanitize(&formatted)
}

/// Drops commas and collapses each run of whitespace, colons, hyphens and
/// path separators into a single underscore. Underscores already present in
/// the input are kept as they are.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != ',')
        .map(|c| (c, is_separator(c)))
        .coalesce(|a, b| if a.1 && b.1 { Ok(a) } else { Err((a, b)) })
        .map(|(c, replaced)| if replaced { '_' } else { c })
        .collect()
}

/// Names handed out during one export batch.
///
/// Distinct labels can sanitize to the same name (`Bldg-1` and `Bldg 1`).
/// A repeated name gets a numeric suffix before the extension so no file of
/// the batch overwrites another.
#[derive(Debug, Default)]
pub struct NameRegistry {
    used: HashSet<String>,
}

impl NameRegistry {
    pub fn claim(&mut self, name: String) -> String {
        if self.used.insert(name.clone()) {
            return name;
        }
        let stem = name.strip_suffix(".csv").unwrap_or(&name);
        let mut n = 2;
        loop {
            let candidate = format!("{stem}_{n}.csv");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ':' | '-' | '/' | '\\')
}
