pub mod align;
pub mod chart;
pub mod config;
pub mod error;
pub mod gate;
pub mod models;
pub mod naming;
pub mod range;
pub mod raw;
pub mod store;
pub mod timeutils;
pub mod writer;

pub use align::align_dataset;
pub use chart::{ChartExporter, ChartWriter};
pub use config::{Config, DatabaseConfig, ExportConfig, LoggingConfig};
pub use error::{ExportError, ExportResult, LookupKind};
pub use gate::{FixedPrompt, GateDecision, GateOutcome, GatePrompt};
pub use models::{
    ChartType, ExportDataSet, Meter, MeterCatalog, MeterId, Point, RawLineReading, SizeThresholds,
    TimeInterval, TimeRange, Unit, UnitId,
};
pub use naming::{chart_file_name, raw_file_name, NameRegistry};
pub use range::{resolve_time_range, NonEmpty};
pub use raw::{
    CountOracle, MeterOutcome, RawExportReport, RawExportSettings, RawExporter, RawReader,
    RawWriter,
};
pub use store::{NewReading, ReadingStore};
pub use timeutils::{now_utc, parse_range, parse_timestamp};
pub use writer::{DirectoryWriter, Language};
