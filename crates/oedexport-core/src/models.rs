use crate::error::{ExportError, ExportResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeterId(pub i64);

impl fmt::Display for MeterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub i64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Compare,
    Map,
    Radar,
    #[serde(rename = "threeD")]
    ThreeD,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Compare => "compare",
            ChartType::Map => "map",
            ChartType::Radar => "radar",
            ChartType::ThreeD => "threeD",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(with = "time::serde::rfc3339")]
    pub x: OffsetDateTime,
    pub y: f64,
}

impl Point {
    pub fn new(x: OffsetDateTime, y: f64) -> Self {
        Self { x, y }
    }
}

/// One meter's series for one chart, as handed over by the graphing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDataSet {
    pub label: String,
    pub unit: String,
    pub current_chart: ChartType,
    pub export_vals: Vec<Point>,
}

impl ExportDataSet {
    pub fn new<L: Into<String>, U: Into<String>>(label: L, unit: U, chart: ChartType) -> Self {
        Self {
            label: label.into(),
            unit: unit.into(),
            current_chart: chart,
            export_vals: Vec::new(),
        }
    }

    pub fn push(&mut self, point: Point) {
        self.export_vals.push(point);
    }
}

/// Either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeInterval {
    pub start: Option<OffsetDateTime>,
    pub end: Option<OffsetDateTime>,
}

impl TimeInterval {
    pub fn new(start: Option<OffsetDateTime>, end: Option<OffsetDateTime>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (Some(s), Some(e)) => write!(f, "[{s} .. {e}]"),
            (Some(s), None) => write!(f, "[{s} .. )"),
            (None, Some(e)) => write!(f, "( .. {e}]"),
            (None, None) => f.write_str("(all time)"),
        }
    }
}

/// Closed time span covered by one or more series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

/// Row-count thresholds gating a raw export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeThresholds {
    warning_size: u64,
    hard_limit: u64,
}

impl SizeThresholds {
    pub fn new(warning_size: u64, hard_limit: u64) -> ExportResult<Self> {
        if warning_size > hard_limit {
            return Err(ExportError::Validation(format!(
                "warning size {warning_size} exceeds hard limit {hard_limit}"
            )));
        }
        Ok(Self {
            warning_size,
            hard_limit,
        })
    }

    pub fn warning_size(&self) -> u64 {
        self.warning_size
    }

    pub fn hard_limit(&self) -> u64 {
        self.hard_limit
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meter {
    pub id: MeterId,
    pub name: String,
    pub unit_id: UnitId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub id: UnitId,
    pub identifier: String,
}

/// Read-only snapshot of meters and units for the duration of one export.
#[derive(Debug, Clone, Default)]
pub struct MeterCatalog {
    meters: HashMap<MeterId, Meter>,
    units: HashMap<UnitId, Unit>,
}

impl MeterCatalog {
    pub fn new(meters: Vec<Meter>, units: Vec<Unit>) -> Self {
        Self {
            meters: meters.into_iter().map(|m| (m.id, m)).collect(),
            units: units.into_iter().map(|u| (u.id, u)).collect(),
        }
    }

    pub fn meter(&self, id: MeterId) -> ExportResult<&Meter> {
        self.meters
            .get(&id)
            .ok_or_else(|| ExportError::meter_not_found(id))
    }

    pub fn unit(&self, id: UnitId) -> ExportResult<&Unit> {
        self.units
            .get(&id)
            .ok_or_else(|| ExportError::unit_not_found(id))
    }

    /// Meter record plus the display identifier of its unit.
    pub fn resolve(&self, id: MeterId) -> ExportResult<(&Meter, &str)> {
        let meter = self.meter(id)?;
        let unit = self.unit(meter.unit_id)?;
        Ok((meter, unit.identifier.as_str()))
    }

    pub fn meters(&self) -> impl Iterator<Item = &Meter> {
        self.meters.values()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawLineReading {
    pub meter_label: String,
    pub reading: f64,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}
