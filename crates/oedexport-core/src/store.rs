use crate::models::{Meter, MeterCatalog, MeterId, RawLineReading, TimeInterval, Unit, UnitId};
use crate::raw::{CountOracle, RawReader};
use crate::timeutils::utc_from_timestamp;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1 = 1,
}

/// SQLite-backed source of meters, units and raw readings.
#[derive(Debug)]
pub struct ReadingStore {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewReading {
    pub reading: f64,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl ReadingStore {
    pub fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating directory {parent:?}"))?;
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.pragma_update(None, "journal_mode", &"WAL")
            .context("enabling WAL mode")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("reading store lock poisoned"))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version == 0 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS units (
                    id INTEGER PRIMARY KEY,
                    identifier TEXT NOT NULL UNIQUE
                );

                CREATE TABLE IF NOT EXISTS meters (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    unit_id INTEGER NOT NULL REFERENCES units(id)
                );

                CREATE TABLE IF NOT EXISTS readings (
                    meter_id INTEGER NOT NULL REFERENCES meters(id),
                    reading REAL NOT NULL,
                    start_timestamp INTEGER NOT NULL,
                    end_timestamp INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_readings_meter_ts
                    ON readings(meter_id, start_timestamp);
                "#,
            )?;
            conn.pragma_update(None, "user_version", &(SchemaVersion::V1 as i32))?;
        }
        Ok(())
    }

    pub fn upsert_unit(&self, identifier: &str) -> Result<UnitId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO units(identifier) VALUES (?1)",
            params![identifier],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM units WHERE identifier = ?1",
            params![identifier],
            |row| row.get(0),
        )?;
        Ok(UnitId(id))
    }

    /// Creates the meter, or points an existing meter of that name at `unit_id`.
    pub fn upsert_meter(&self, name: &str, unit_id: UnitId) -> Result<MeterId> {
        let conn = self.conn()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM meters WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        let id = match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE meters SET unit_id = ?1 WHERE id = ?2",
                    params![unit_id.0, id],
                )?;
                id
            }
            None => {
                conn.execute(
                    "INSERT INTO meters(name, unit_id) VALUES (?1, ?2)",
                    params![name, unit_id.0],
                )?;
                conn.last_insert_rowid()
            }
        };
        Ok(MeterId(id))
    }

    pub fn insert_readings(&self, meter_id: MeterId, readings: &[NewReading]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO readings(meter_id, reading, start_timestamp, end_timestamp) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for r in readings {
                stmt.execute(params![
                    meter_id.0,
                    r.reading,
                    r.start.unix_timestamp(),
                    r.end.unix_timestamp()
                ])?;
            }
        }
        tx.commit()?;
        Ok(readings.len())
    }

    /// Snapshot of every meter and unit.
    pub fn catalog(&self) -> Result<MeterCatalog> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, identifier FROM units")?;
        let units = stmt
            .query_map([], |row| {
                Ok(Unit {
                    id: UnitId(row.get(0)?),
                    identifier: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare("SELECT id, name, unit_id FROM meters")?;
        let meters = stmt
            .query_map([], |row| {
                Ok(Meter {
                    id: MeterId(row.get(0)?),
                    name: row.get(1)?,
                    unit_id: UnitId(row.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MeterCatalog::new(meters, units))
    }

    pub fn count_readings(&self, meter_ids: &[MeterId], interval: TimeInterval) -> Result<u64> {
        if meter_ids.is_empty() {
            return Ok(0);
        }
        let (filter, values) = interval_filter(meter_ids, interval);
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM readings r WHERE {filter}"),
            params_from_iter(values),
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    pub fn raw_readings(
        &self,
        meter_ids: &[MeterId],
        interval: TimeInterval,
    ) -> Result<Vec<RawLineReading>> {
        if meter_ids.is_empty() {
            return Ok(Vec::new());
        }
        let (filter, values) = interval_filter(meter_ids, interval);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT m.name, r.reading, r.start_timestamp, r.end_timestamp
             FROM readings r JOIN meters m ON m.id = r.meter_id
             WHERE {filter}
             ORDER BY r.start_timestamp, r.meter_id"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(RawLineReading {
                    meter_label: row.get(0)?,
                    reading: row.get(1)?,
                    start: utc_from_timestamp(row.get(2)?),
                    end: utc_from_timestamp(row.get(3)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// `WHERE` clause selecting the meters' readings inside the interval, with
/// its positional parameters. Open bounds are left unconstrained.
fn interval_filter(meter_ids: &[MeterId], interval: TimeInterval) -> (String, Vec<Value>) {
    let placeholders = (1..=meter_ids.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let start_idx = meter_ids.len() + 1;
    let end_idx = meter_ids.len() + 2;
    let filter = format!(
        "r.meter_id IN ({placeholders}) \
         AND (?{start_idx} IS NULL OR r.start_timestamp >= ?{start_idx}) \
         AND (?{end_idx} IS NULL OR r.end_timestamp <= ?{end_idx})"
    );

    let mut values: Vec<Value> = meter_ids.iter().map(|id| Value::Integer(id.0)).collect();
    values.push(bound(interval.start));
    values.push(bound(interval.end));
    (filter, values)
}

fn bound(ts: Option<OffsetDateTime>) -> Value {
    ts.map(|t| Value::Integer(t.unix_timestamp()))
        .unwrap_or(Value::Null)
}

#[async_trait]
impl CountOracle for ReadingStore {
    async fn count(&self, meter_ids: &[MeterId], interval: TimeInterval) -> Result<u64> {
        self.count_readings(meter_ids, interval)
    }
}

#[async_trait]
impl RawReader for ReadingStore {
    async fn read(
        &self,
        meter_ids: &[MeterId],
        interval: TimeInterval,
    ) -> Result<Vec<RawLineReading>> {
        self.raw_readings(meter_ids, interval)
    }
}
