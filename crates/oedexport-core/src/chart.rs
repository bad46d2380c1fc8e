//! Chart export: one CSV per in-memory series.
//!
//! Every dataset is exported on its own. The series is sorted, its own time
//! span is resolved and named, and the writer receives exactly that one
//! dataset. Nothing carries over from one dataset to the next, so N input
//! series always produce N files in input order.

use crate::align::align_dataset;
use crate::error::ExportResult;
use crate::models::ExportDataSet;
use crate::naming::{chart_file_name, NameRegistry};
use crate::range::{points_of, resolve_time_range};
use tracing::{debug, info};

/// Destination for chart CSVs. One call produces one file.
pub trait ChartWriter {
    fn write(&mut self, datasets: &[ExportDataSet], file_name: &str) -> ExportResult<()>;
}

impl<W: ChartWriter + ?Sized> ChartWriter for &mut W {
    fn write(&mut self, datasets: &[ExportDataSet], file_name: &str) -> ExportResult<()> {
        (**self).write(datasets, file_name)
    }
}

pub struct ChartExporter<W> {
    writer: W,
}

impl<W: ChartWriter> ChartExporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Sorts each dataset in place and writes it out, returning the emitted
    /// file names in input order.
    ///
    /// All datasets are checked for points before anything is written, so an
    /// invalid batch produces no files at all.
    pub fn export(&mut self, datasets: &mut [ExportDataSet]) -> ExportResult<Vec<String>> {
        for dataset in datasets.iter() {
            points_of(dataset)?;
        }

        let mut names = NameRegistry::default();
        let mut emitted = Vec::with_capacity(datasets.len());
        for dataset in datasets.iter_mut() {
            align_dataset(dataset);
            let current = std::slice::from_ref(&*dataset);
            let range = resolve_time_range(current)?;
            let name = names.claim(chart_file_name(
                dataset.current_chart,
                range,
                &dataset.label,
                &dataset.unit,
            ));
            debug!(
                label = %dataset.label,
                points = dataset.export_vals.len(),
                "writing chart export"
            );
            self.writer.write(current, &name)?;
            info!("exported {name}");
            emitted.push(name);
        }
        Ok(emitted)
    }
}
