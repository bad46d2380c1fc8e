use crate::error::{ExportError, ExportResult};
use crate::models::{ExportDataSet, Point, TimeRange};
use time::UtcOffset;

/// Borrowed view over a slice known to hold at least one element.
#[derive(Debug, Clone, Copy)]
pub struct NonEmpty<'a, T> {
    first: &'a T,
    last: &'a T,
    items: &'a [T],
}

impl<'a, T> NonEmpty<'a, T> {
    pub fn new(items: &'a [T]) -> Option<Self> {
        Some(Self {
            first: items.first()?,
            last: items.last()?,
            items,
        })
    }

    pub fn first(&self) -> &'a T {
        self.first
    }

    pub fn last(&self) -> &'a T {
        self.last
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn as_slice(&self) -> &'a [T] {
        self.items
    }
}

/// Non-empty view of a dataset's points, or a validation error naming it.
pub fn points_of(dataset: &ExportDataSet) -> ExportResult<NonEmpty<'_, Point>> {
    NonEmpty::new(&dataset.export_vals).ok_or_else(|| {
        ExportError::Validation(format!("dataset '{}' has no points", dataset.label))
    })
}

/// Span covered by already-sorted datasets: earliest first point to latest
/// last point, compared in UTC.
pub fn resolve_time_range(datasets: &[ExportDataSet]) -> ExportResult<TimeRange> {
    let datasets = NonEmpty::new(datasets)
        .ok_or_else(|| ExportError::Validation("no datasets to export".into()))?;

    let head = points_of(datasets.first())?;
    let mut range = TimeRange {
        start: head.first().x.to_offset(UtcOffset::UTC),
        end: head.last().x.to_offset(UtcOffset::UTC),
    };

    for dataset in datasets.as_slice().iter().skip(1) {
        let points = points_of(dataset)?;
        let start = points.first().x.to_offset(UtcOffset::UTC);
        let end = points.last().x.to_offset(UtcOffset::UTC);
        if start < range.start {
            range.start = start;
        }
        if end > range.end {
            range.end = end;
        }
    }
    Ok(range)
}
