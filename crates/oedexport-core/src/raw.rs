//! Raw export: per-meter readings fetched on demand behind the size gate.
//!
//! Meters are processed strictly one after another. For each meter the unit
//! is resolved from the catalog, the row count is requested, the gate decides,
//! and only then are the readings fetched and handed to the writer. The next
//! meter's count request is not issued until the previous meter is finished.

use crate::error::{ExportError, ExportResult};
use crate::gate::{self, GateOutcome, GatePrompt};
use crate::models::{MeterCatalog, MeterId, RawLineReading, SizeThresholds, TimeInterval, TimeRange};
use crate::naming::{raw_file_name, NameRegistry};
use crate::range::NonEmpty;
use async_trait::async_trait;
use itertools::Itertools;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[async_trait]
pub trait CountOracle: Send + Sync {
    async fn count(&self, meter_ids: &[MeterId], interval: TimeInterval) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait RawReader: Send + Sync {
    async fn read(
        &self,
        meter_ids: &[MeterId],
        interval: TimeInterval,
    ) -> anyhow::Result<Vec<RawLineReading>>;
}

#[async_trait]
pub trait RawWriter: Send + Sync {
    async fn write(
        &self,
        rows: &[RawLineReading],
        language: &str,
        unit_label: &str,
        file_name: &str,
    ) -> ExportResult<()>;
}

#[derive(Debug, Clone)]
pub struct RawExportSettings {
    pub thresholds: SizeThresholds,
    pub language: String,
    pub fetch_timeout: Option<Duration>,
}

#[derive(Debug)]
pub enum MeterOutcome {
    Exported { file: String, rows: usize },
    /// The gate passed but the meter has no readings in the interval.
    Empty,
    Declined,
    Blocked { count: u64 },
    Failed(ExportError),
    Cancelled,
}

#[derive(Debug, Default)]
pub struct RawExportReport {
    pub entries: Vec<(MeterId, MeterOutcome)>,
}

impl RawExportReport {
    pub fn exported_files(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|(_, outcome)| match outcome {
                MeterOutcome::Exported { file, .. } => Some(file.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<(MeterId, &ExportError)> {
        self.entries
            .iter()
            .filter_map(|(id, outcome)| match outcome {
                MeterOutcome::Failed(err) => Some((*id, err)),
                _ => None,
            })
            .collect()
    }

    pub fn was_cancelled(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, outcome)| matches!(outcome, MeterOutcome::Cancelled))
    }
}

pub struct RawExporter<'a> {
    catalog: &'a MeterCatalog,
    oracle: &'a dyn CountOracle,
    reader: &'a dyn RawReader,
    writer: &'a dyn RawWriter,
    prompt: &'a dyn GatePrompt,
    settings: RawExportSettings,
    cancel: CancellationToken,
}

impl<'a> RawExporter<'a> {
    pub fn new(
        catalog: &'a MeterCatalog,
        oracle: &'a dyn CountOracle,
        reader: &'a dyn RawReader,
        writer: &'a dyn RawWriter,
        prompt: &'a dyn GatePrompt,
        settings: RawExportSettings,
    ) -> Self {
        Self {
            catalog,
            oracle,
            reader,
            writer,
            prompt,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Exports each selected meter in selection order.
    ///
    /// A failing meter is recorded and the batch moves on. Cancellation stops
    /// the batch: the interrupted meter is recorded as cancelled and no later
    /// meter is attempted.
    pub async fn export(&self, selection: &[MeterId], interval: TimeInterval) -> RawExportReport {
        let mut report = RawExportReport::default();
        if selection.is_empty() {
            return report;
        }
        let names = Mutex::new(NameRegistry::default());
        info!(
            meters = %selection.iter().join(","),
            %interval,
            "starting raw export"
        );

        for &meter_id in selection {
            let result = if self.cancel.is_cancelled() {
                Err(ExportError::Cancelled)
            } else {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(ExportError::Cancelled),
                    result = self.export_meter(meter_id, interval, &names) => result,
                }
            };

            match result {
                Ok(outcome) => report.entries.push((meter_id, outcome)),
                Err(ExportError::Cancelled) => {
                    warn!(%meter_id, "raw export cancelled");
                    report.entries.push((meter_id, MeterOutcome::Cancelled));
                    break;
                }
                Err(err) => {
                    warn!(%meter_id, "raw export failed: {err}");
                    report.entries.push((meter_id, MeterOutcome::Failed(err)));
                }
            }
        }
        report
    }

    async fn export_meter(
        &self,
        meter_id: MeterId,
        interval: TimeInterval,
        names: &Mutex<NameRegistry>,
    ) -> ExportResult<MeterOutcome> {
        let (meter, unit) = self.catalog.resolve(meter_id)?;
        let request = [meter_id];

        let count = self
            .fetch(meter_id, self.oracle.count(&request, interval))
            .await?;
        debug!(%meter_id, count, "raw row count");

        let meter_name = meter.name.as_str();
        let outcome = gate::decide(count, self.settings.thresholds, self.prompt, move || {
            self.fetch_and_write(meter_id, meter_name, unit, interval, names)
        })
        .await;

        match outcome {
            GateOutcome::Proceeded(result) => result,
            GateOutcome::Declined => Ok(MeterOutcome::Declined),
            GateOutcome::Blocked => Ok(MeterOutcome::Blocked { count }),
        }
    }

    async fn fetch_and_write(
        &self,
        meter_id: MeterId,
        meter_name: &str,
        unit: &str,
        interval: TimeInterval,
        names: &Mutex<NameRegistry>,
    ) -> ExportResult<MeterOutcome> {
        let request = [meter_id];
        let mut rows = self
            .fetch(meter_id, self.reader.read(&request, interval))
            .await?;
        rows.sort_by_key(|r| r.start);

        let Some(bounds) = NonEmpty::new(&rows) else {
            info!(%meter_id, "no raw readings in interval");
            return Ok(MeterOutcome::Empty);
        };
        let range = TimeRange {
            start: bounds.first().start,
            end: rows
                .iter()
                .map(|r| r.end)
                .max()
                .unwrap_or(bounds.last().end),
        };

        let file = names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .claim(raw_file_name(range, meter_name, unit));
        self.writer
            .write(&rows, &self.settings.language, unit, &file)
            .await?;
        info!("exported {file} ({} rows)", rows.len());
        Ok(MeterOutcome::Exported {
            file,
            rows: rows.len(),
        })
    }

    async fn fetch<T, Fut>(&self, meter_id: MeterId, request: Fut) -> ExportResult<T>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let result = match self.settings.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, request).await.map_err(|_| {
                ExportError::fetch(
                    meter_id,
                    format!("timed out after {}", humantime::format_duration(limit)),
                )
            })?,
            None => request.await,
        };
        result.map_err(|err| ExportError::fetch(meter_id, format!("{err:#}")))
    }
}
