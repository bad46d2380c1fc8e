use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use itertools::Itertools;
use once_cell::sync::OnceCell;
use oedexport_core::{
    parse_range, parse_timestamp, ChartExporter, Config, DirectoryWriter, ExportDataSet,
    FixedPrompt, GatePrompt, MeterId, MeterOutcome, NewReading, RawExportSettings, RawExporter,
    ReadingStore, SizeThresholds, TimeInterval,
};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(author, version, about = "oedexport: export meter readings to CSV")]
struct Args {
    /// Path to config TOML
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override reading database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Override output directory
    #[arg(long, global = true)]
    out: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export in-memory chart series (JSON array of datasets), one CSV each
    Chart {
        /// Dataset JSON file, or `-` for stdin
        #[arg(long)]
        input: PathBuf,
    },
    /// Export raw readings for the selected meters, one CSV each
    Raw(RawArgs),
    /// Load raw readings for one meter from a CSV of reading,start,end
    Import {
        #[arg(long)]
        meter: String,
        #[arg(long)]
        unit: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// List known meters and their units
    Meters,
}

#[derive(clap::Args, Debug)]
struct RawArgs {
    /// Comma separated meter ids, exported in this order
    #[arg(long, value_delimiter = ',', required = true)]
    meters: Vec<i64>,
    /// Interval start (RFC 3339)
    #[arg(long, conflicts_with = "range")]
    since: Option<String>,
    /// Interval end (RFC 3339), defaults to open
    #[arg(long)]
    until: Option<String>,
    /// Interval length ending at --until or now, e.g. 7d
    #[arg(long)]
    range: Option<String>,
    /// Display language tag for CSV headers
    #[arg(long)]
    language: Option<String>,
    /// Approve large exports without asking
    #[arg(long)]
    yes: bool,
    /// Decline large exports without asking
    #[arg(long, conflicts_with = "yes")]
    no_confirm: bool,
    /// Override per-fetch timeout
    #[arg(long)]
    fetch_timeout: Option<humantime::Duration>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    init_logging(&config)?;

    match &args.command {
        Command::Chart { input } => run_chart(&config, input),
        Command::Raw(raw) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("building runtime")?;
            let result = runtime.block_on(run_raw(&config, raw));
            // A cancelled confirmation leaves its stdin read blocked.
            runtime.shutdown_background();
            result
        }
        Command::Import { meter, unit, file } => run_import(&config, meter, unit, file),
        Command::Meters => run_meters(&config),
    }
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(db) = &args.db {
        config.database.path = db.clone();
    }
    if let Some(out) = &args.out {
        config.export.output_dir = out.clone();
    }
    if let Command::Raw(raw) = &args.command {
        if let Some(language) = &raw.language {
            config.export.language = language.clone();
        }
        if let Some(timeout) = raw.fetch_timeout {
            config.export.fetch_timeout = Some(*timeout);
        }
    }
}

fn run_chart(config: &Config, input: &Path) -> Result<()> {
    let content = if input == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("reading datasets from stdin")?;
        buf
    } else {
        fs::read_to_string(input).with_context(|| format!("reading datasets at {input:?}"))?
    };
    let mut datasets: Vec<ExportDataSet> =
        serde_json::from_str(&content).context("parsing datasets")?;

    let writer = DirectoryWriter::new(&config.export.output_dir)?;
    let names = ChartExporter::new(writer).export(&mut datasets)?;
    for name in &names {
        println!("{}", config.export.output_dir.join(name).display());
    }
    Ok(())
}

async fn run_raw(config: &Config, args: &RawArgs) -> Result<()> {
    let interval = build_interval(
        args.since.as_deref(),
        args.until.as_deref(),
        args.range.as_deref(),
    )?;
    let selection: Vec<MeterId> = args.meters.iter().copied().map(MeterId).collect();
    let settings = RawExportSettings {
        thresholds: config.export.thresholds()?,
        language: config.export.language.clone(),
        fetch_timeout: config.export.fetch_timeout,
    };

    let store = ReadingStore::connect(&config.database.path)?;
    let catalog = store.catalog()?;
    let writer = DirectoryWriter::new(&config.export.output_dir)?;
    let prompt: Box<dyn GatePrompt> = if args.yes {
        Box::new(FixedPrompt::approve())
    } else if args.no_confirm {
        Box::new(FixedPrompt::deny())
    } else {
        Box::new(TerminalPrompt)
    };

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            std::process::exit(130);
        }
        handler_token.cancel();
    })
    .context("installing ctrl-c handler")?;

    let exporter = RawExporter::new(
        &catalog,
        &store,
        &store,
        &writer,
        prompt.as_ref(),
        settings,
    )
    .with_cancellation(token);
    let report = exporter.export(&selection, interval).await;

    for (meter_id, outcome) in &report.entries {
        match outcome {
            MeterOutcome::Exported { file, rows } => {
                println!("{}\t{rows} rows", config.export.output_dir.join(file).display())
            }
            MeterOutcome::Empty => eprintln!("meter {meter_id}: no readings in interval"),
            MeterOutcome::Declined => eprintln!("meter {meter_id}: export declined"),
            MeterOutcome::Blocked { count } => eprintln!(
                "meter {meter_id}: {count} rows exceeds the limit of {} rows",
                config.export.hard_limit
            ),
            MeterOutcome::Failed(err) => eprintln!("meter {meter_id}: {err}"),
            MeterOutcome::Cancelled => eprintln!("meter {meter_id}: cancelled"),
        }
    }

    if report.was_cancelled() {
        anyhow::bail!("raw export cancelled");
    }
    let failures = report.failures();
    if !failures.is_empty() {
        anyhow::bail!(
            "raw export failed for meter(s) {}",
            failures.iter().map(|(id, _)| id).join(",")
        );
    }
    Ok(())
}

fn build_interval(
    since: Option<&str>,
    until: Option<&str>,
    range: Option<&str>,
) -> Result<TimeInterval> {
    let until = until.map(parse_timestamp).transpose()?;
    if let Some(range) = range {
        let duration = parse_range(range)?;
        return Ok(oedexport_core::timeutils::interval_ending(duration, until));
    }
    let since = since.map(parse_timestamp).transpose()?;
    if let (Some(s), Some(u)) = (since, until) {
        if s > u {
            anyhow::bail!("--since {s} is after --until {u}");
        }
    }
    Ok(TimeInterval::new(since, until))
}

fn run_import(config: &Config, meter: &str, unit: &str, file: &Path) -> Result<()> {
    let handle = fs::File::open(file).with_context(|| format!("opening {file:?}"))?;
    let readings = parse_readings(handle)?;

    let store = ReadingStore::connect(&config.database.path)?;
    let unit_id = store.upsert_unit(unit)?;
    let meter_id = store.upsert_meter(meter, unit_id)?;
    let inserted = store.insert_readings(meter_id, &readings)?;
    info!("imported {inserted} readings for meter {meter} ({meter_id})");
    println!("{meter_id}\t{meter}\t{inserted} readings");
    Ok(())
}

/// Reads `reading,start_timestamp,end_timestamp` rows with a header line.
fn parse_readings<R: Read>(input: R) -> Result<Vec<NewReading>> {
    let mut reader = csv::Reader::from_reader(input);
    let mut readings = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2;
        let record = record.with_context(|| format!("reading csv line {line}"))?;
        if record.len() < 3 {
            anyhow::bail!("line {line}: expected reading,start_timestamp,end_timestamp");
        }
        let reading = record[0]
            .trim()
            .parse::<f64>()
            .with_context(|| format!("line {line}: invalid reading"))?;
        let start = parse_timestamp(&record[1]).with_context(|| format!("line {line}"))?;
        let end = parse_timestamp(&record[2]).with_context(|| format!("line {line}"))?;
        if end < start {
            anyhow::bail!("line {line}: end timestamp before start");
        }
        readings.push(NewReading {
            reading,
            start,
            end,
        });
    }
    Ok(readings)
}

fn run_meters(config: &Config) -> Result<()> {
    let store = ReadingStore::connect(&config.database.path)?;
    let catalog = store.catalog()?;
    if catalog.is_empty() {
        eprintln!("no meters imported yet");
        return Ok(());
    }
    let mut meters: Vec<_> = catalog.meters().collect();
    meters.sort_by_key(|m| m.id);
    for meter in meters {
        let unit = catalog
            .unit(meter.unit_id)
            .map(|u| u.identifier.as_str())
            .unwrap_or("?");
        println!("{}\t{}\t{unit}", meter.id, meter.name);
    }
    Ok(())
}

/// Asks on the terminal before large exports.
struct TerminalPrompt;

#[async_trait]
impl GatePrompt for TerminalPrompt {
    async fn confirm(&self, count: u64, thresholds: SizeThresholds) -> bool {
        let question = format!(
            "export of {count} rows exceeds the warning size of {} rows, continue? [y/N] ",
            thresholds.warning_size()
        );
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = io::stderr();
            let _ = write!(stderr, "{question}");
            let _ = stderr.flush();
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;
        match answer {
            Ok(Ok(line)) => is_yes(&line),
            Ok(Err(err)) => {
                warn!("reading confirmation failed: {err}");
                false
            }
            Err(err) => {
                warn!("confirmation prompt aborted: {err}");
                false
            }
        }
    }

    async fn notify_blocked(&self, count: u64, thresholds: SizeThresholds) {
        eprintln!(
            "export of {count} rows exceeds the limit of {} rows and was skipped",
            thresholds.hard_limit()
        );
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn init_logging(config: &Config) -> Result<()> {
    let writer: BoxMakeWriter = if let Some(path) = &config.logging.file {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file at {:?}", path))?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        static LOG_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
        let _ = LOG_GUARD.set(guard);
        BoxMakeWriter::new(writer)
    } else {
        BoxMakeWriter::new(io::stderr)
    };

    tracing_subscriber::fmt()
        .with_env_filter(config.logging.level.clone())
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_writer(writer)
        .finish()
        .try_init()
        .ok();
    Ok(())
}
