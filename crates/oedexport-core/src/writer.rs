//! CSV writers that materialise each "download" as a file in a directory.
//!
//! Chart files use the header `label,unit,timestamp,value`. Raw files use a
//! header localised by the display language; their column order is fixed as
//! label, reading, start, end. Timestamps are RFC 3339 in UTC.

use crate::chart::ChartWriter;
use crate::error::{ExportError, ExportResult};
use crate::models::{ExportDataSet, RawLineReading};
use crate::raw::RawWriter;
use async_trait::async_trait;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};
use tracing::warn;

pub const CHART_HEADER: [&str; 4] = ["label", "unit", "timestamp", "value"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    Fr,
    Es,
}

impl Language {
    /// Parses a tag such as `fr` or `es-MX`; unknown tags fall back to English.
    pub fn from_tag(tag: &str) -> Self {
        let primary = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "en" => Language::En,
            "fr" => Language::Fr,
            "es" => Language::Es,
            _ => {
                warn!("unsupported display language {tag:?}, using en");
                Language::En
            }
        }
    }

    pub fn raw_header(&self, unit_label: &str) -> [String; 4] {
        let (label, reading, start, end) = match self {
            Language::En => ("label", "reading", "start timestamp", "end timestamp"),
            Language::Fr => ("libellé", "lecture", "horodatage de début", "horodatage de fin"),
            Language::Es => (
                "etiqueta",
                "lectura",
                "marca de tiempo de inicio",
                "marca de tiempo de fin",
            ),
        };
        [
            label.to_string(),
            format!("{reading} ({unit_label})"),
            start.to_string(),
            end.to_string(),
        ]
    }
}

pub fn write_chart_csv<W: Write>(writer: W, datasets: &[ExportDataSet]) -> ExportResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CHART_HEADER)?;
    for dataset in datasets {
        for point in &dataset.export_vals {
            let timestamp = utc_rfc3339(point.x)?;
            let value = point.y.to_string();
            csv_writer.write_record([
                dataset.label.as_str(),
                dataset.unit.as_str(),
                timestamp.as_str(),
                value.as_str(),
            ])?;
        }
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_raw_csv<W: Write>(
    writer: W,
    rows: &[RawLineReading],
    language: Language,
    unit_label: &str,
) -> ExportResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(language.raw_header(unit_label))?;
    for row in rows {
        let reading = row.reading.to_string();
        let start = utc_rfc3339(row.start)?;
        let end = utc_rfc3339(row.end)?;
        csv_writer.write_record([
            row.meter_label.as_str(),
            reading.as_str(),
            start.as_str(),
            end.as_str(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn utc_rfc3339(ts: OffsetDateTime) -> ExportResult<String> {
    ts.to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|e| ExportError::Write(format!("formatting timestamp: {e}")))
}

/// Writes every export into one output directory.
#[derive(Debug, Clone)]
pub struct DirectoryWriter {
    dir: PathBuf,
}

impl DirectoryWriter {
    pub fn new<P: Into<PathBuf>>(dir: P) -> ExportResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| ExportError::Write(format!("creating output directory {dir:?}: {e}")))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn create(&self, file_name: &str) -> ExportResult<fs::File> {
        let path = self.dir.join(file_name);
        fs::File::create(&path).map_err(|e| ExportError::Write(format!("creating {path:?}: {e}")))
    }
}

impl ChartWriter for DirectoryWriter {
    fn write(&mut self, datasets: &[ExportDataSet], file_name: &str) -> ExportResult<()> {
        let file = self.create(file_name)?;
        write_chart_csv(file, datasets)
    }
}

#[async_trait]
impl RawWriter for DirectoryWriter {
    async fn write(
        &self,
        rows: &[RawLineReading],
        language: &str,
        unit_label: &str,
        file_name: &str,
    ) -> ExportResult<()> {
        let file = self.create(file_name)?;
        write_raw_csv(file, rows, Language::from_tag(language), unit_label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChartType, Point};
    use tempfile::TempDir;
    use time::macros::datetime;

    #[test]
    fn chart_csv_has_header_and_rows() {
        let mut ds = ExportDataSet::new("Library", "kWh", ChartType::Line);
        ds.push(Point::new(datetime!(2023-01-01 00:00 UTC), 3.5));
        ds.push(Point::new(datetime!(2023-01-01 01:00 +1), 4.0));

        let mut buf = Vec::new();
        write_chart_csv(&mut buf, &[ds]).unwrap();
        let content = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "label,unit,timestamp,value");
        assert_eq!(lines[1], "Library,kWh,2023-01-01T00:00:00Z,3.5");
        assert_eq!(lines[2], "Library,kWh,2023-01-01T00:00:00Z,4");
    }

    #[test]
    fn raw_csv_quotes_labels_and_localises_header() {
        let rows = vec![RawLineReading {
            meter_label: "Gym, east".into(),
            reading: 12.25,
            start: datetime!(2023-02-01 00:00 UTC),
            end: datetime!(2023-02-01 00:15 UTC),
        }];
        let mut buf = Vec::new();
        write_raw_csv(&mut buf, &rows, Language::Fr, "kWh").unwrap();
        let content = String::from_utf8(buf).unwrap();
        assert!(content.starts_with("libellé,lecture (kWh),"));
        assert!(content.contains("\"Gym, east\",12.25,2023-02-01T00:00:00Z,2023-02-01T00:15:00Z"));
    }

    #[test]
    fn language_tags_fall_back_to_english() {
        assert_eq!(Language::from_tag("es-MX"), Language::Es);
        assert_eq!(Language::from_tag("FR"), Language::Fr);
        assert_eq!(Language::from_tag("de"), Language::En);
        assert_eq!(Language::from_tag(""), Language::En);
    }

    #[test]
    fn directory_writer_creates_named_file() {
        let tmp = TempDir::new().unwrap();
        let mut writer = DirectoryWriter::new(tmp.path().join("out")).unwrap();
        let mut ds = ExportDataSet::new("M1", "kWh", ChartType::Bar);
        ds.push(Point::new(datetime!(2023-01-01 00:00 UTC), 1.0));
        ChartWriter::write(&mut writer, &[ds], "a.csv").unwrap();
        let content = fs::read_to_string(writer.dir().join("a.csv")).unwrap();
        assert!(content.starts_with("label,unit,timestamp,value"));
    }
}
