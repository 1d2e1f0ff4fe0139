//! SQLite run cache with reference-gain storage and CSV export.
//!
//! Fetched run summaries are cached locally so backfills can resume
//! without refetching, and the reference service's reported elevation
//! gains are stored alongside them as the labeled dataset the calibration
//! harness consumes.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use log::{info, warn};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationCase;
use crate::error::{ElevationError, Result};
use crate::estimator::feet_to_meters;
use crate::tcx;

/// One cached run, keyed by date (one tracked run per day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRun {
    pub date: NaiveDate,
    pub activity_id: i64,
    /// Distance in miles, as the API reports it
    pub distance_mi: f64,
    /// Duration in milliseconds
    pub duration_ms: i64,
    pub steps: u32,
    pub min_hr: u32,
    pub max_hr: u32,
    pub avg_hr: u32,
    pub calories: u32,
    pub resting_hr: u32,
    /// Estimated elevation gain in meters, when computed
    pub elevation_gain_m: Option<f64>,
}

/// SQLite-backed cache of runs and reference gains.
pub struct RunCache {
    db: Connection,
}

impl RunCache {
    /// Open (or create) a cache database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Connection::open(path).map_err(db_error)?;
        let cache = Self { db };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Open an in-memory cache (used by tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().map_err(db_error)?;
        let cache = Self { db };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        self.db
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS runs (
                    date TEXT PRIMARY KEY,
                    activity_id INTEGER,
                    distance REAL,
                    duration INTEGER,
                    steps INTEGER,
                    minhr INTEGER,
                    maxhr INTEGER,
                    avghr INTEGER,
                    calories INTEGER,
                    resting_hr INTEGER,
                    elevation_gain_m REAL
                );
                CREATE TABLE IF NOT EXISTS reference_gains (
                    date TEXT PRIMARY KEY,
                    elevation_ft REAL NOT NULL,
                    activity_id INTEGER
                );",
            )
            .map_err(db_error)
    }

    // ========================================================================
    // Runs
    // ========================================================================

    /// Insert or replace one run row.
    pub fn upsert_run(&self, run: &CachedRun) -> Result<()> {
        self.db
            .execute(
                "INSERT OR REPLACE INTO runs (date, activity_id, distance, duration, steps,
                    minhr, maxhr, avghr, calories, resting_hr, elevation_gain_m)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    run.date.to_string(),
                    run.activity_id,
                    run.distance_mi,
                    run.duration_ms,
                    run.steps,
                    run.min_hr,
                    run.max_hr,
                    run.avg_hr,
                    run.calories,
                    run.resting_hr,
                    run.elevation_gain_m,
                ],
            )
            .map(|_| ())
            .map_err(db_error)
    }

    /// Whether a run row already exists for the date. Backfills walk
    /// backwards in time and stop at the first cached date.
    pub fn contains_date(&self, date: NaiveDate) -> Result<bool> {
        let count: i64 = self
            .db
            .query_row(
                "SELECT COUNT(*) FROM runs WHERE date = ?1",
                params![date.to_string()],
                |row| row.get(0),
            )
            .map_err(db_error)?;
        Ok(count > 0)
    }

    /// All cached runs, ordered by date ascending.
    pub fn runs(&self) -> Result<Vec<CachedRun>> {
        let mut statement = self
            .db
            .prepare(
                "SELECT date, activity_id, distance, duration, steps, minhr, maxhr,
                        avghr, calories, resting_hr, elevation_gain_m
                 FROM runs ORDER BY date(date) ASC",
            )
            .map_err(db_error)?;

        let rows = statement
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, u32>(5)?,
                    row.get::<_, u32>(6)?,
                    row.get::<_, u32>(7)?,
                    row.get::<_, u32>(8)?,
                    row.get::<_, u32>(9)?,
                    row.get::<_, Option<f64>>(10)?,
                ))
            })
            .map_err(db_error)?;

        let mut runs = Vec::new();
        for row in rows {
            let (date, activity_id, distance, duration, steps, minhr, maxhr, avghr, calories, resting, gain) =
                row.map_err(db_error)?;
            let date = date
                .parse::<NaiveDate>()
                .map_err(|e| ElevationError::PersistenceError {
                    message: format!("invalid date '{}' in cache: {}", date, e),
                })?;
            runs.push(CachedRun {
                date,
                activity_id,
                distance_mi: distance,
                duration_ms: duration,
                steps,
                min_hr: minhr,
                max_hr: maxhr,
                avg_hr: avghr,
                calories,
                resting_hr: resting,
                elevation_gain_m: gain,
            });
        }
        Ok(runs)
    }

    // ========================================================================
    // Reference gains
    // ========================================================================

    /// Store the reference service's reported gain (feet) for a date.
    pub fn set_reference_gain(
        &self,
        date: NaiveDate,
        elevation_ft: f64,
        activity_id: Option<i64>,
    ) -> Result<()> {
        self.db
            .execute(
                "INSERT OR REPLACE INTO reference_gains (date, elevation_ft, activity_id)
                 VALUES (?1, ?2, ?3)",
                params![date.to_string(), elevation_ft, activity_id],
            )
            .map(|_| ())
            .map_err(db_error)
    }

    /// All stored reference gains as `(date, feet)`, ordered by date.
    pub fn reference_gains(&self) -> Result<Vec<(String, f64)>> {
        let mut statement = self
            .db
            .prepare("SELECT date, elevation_ft FROM reference_gains ORDER BY date(date) ASC")
            .map_err(db_error)?;

        let rows = statement
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))
            .map_err(db_error)?;

        let mut gains = Vec::new();
        for row in rows {
            gains.push(row.map_err(db_error)?);
        }
        Ok(gains)
    }

    /// Import the reference service's JSON dump, one entry per date:
    /// `{"2025-11-16": {"elevation_ft": 224.0, "activity_id": 123}, ...}`.
    ///
    /// Returns the number of entries stored.
    pub fn import_reference_json(&self, json: &str) -> Result<usize> {
        #[derive(Deserialize)]
        struct ReferenceEntry {
            elevation_ft: f64,
            #[serde(default, alias = "id")]
            activity_id: Option<i64>,
        }

        let entries: HashMap<String, ReferenceEntry> =
            serde_json::from_str(json).map_err(|e| ElevationError::PersistenceError {
                message: format!("malformed reference JSON: {}", e),
            })?;

        let mut stored = 0usize;
        for (date_str, entry) in entries {
            match date_str.parse::<NaiveDate>() {
                Ok(date) => {
                    self.set_reference_gain(date, entry.elevation_ft, entry.activity_id)?;
                    stored += 1;
                }
                Err(e) => warn!(
                    "[RunCache] Skipping reference entry '{}': {}",
                    date_str, e
                ),
            }
        }
        info!("[RunCache] Imported {} reference gains", stored);
        Ok(stored)
    }

    // ========================================================================
    // Export and calibration
    // ========================================================================

    /// Export all cached runs to CSV, ordered by date ascending.
    ///
    /// Returns the number of rows written.
    pub fn export_runs_csv(&self, path: &Path) -> Result<usize> {
        let runs = self.runs()?;

        let mut writer = csv::Writer::from_path(path).map_err(|e| {
            ElevationError::PersistenceError {
                message: format!("cannot create '{}': {}", path.display(), e),
            }
        })?;

        writer
            .write_record([
                "date",
                "activity_id",
                "distance",
                "duration",
                "steps",
                "minhr",
                "maxhr",
                "avghr",
                "calories",
                "resting_hr",
                "elevation_gain_m",
            ])
            .map_err(csv_error)?;

        for run in &runs {
            writer
                .write_record([
                    run.date.to_string(),
                    run.activity_id.to_string(),
                    run.distance_mi.to_string(),
                    run.duration_ms.to_string(),
                    run.steps.to_string(),
                    run.min_hr.to_string(),
                    run.max_hr.to_string(),
                    run.avg_hr.to_string(),
                    run.calories.to_string(),
                    run.resting_hr.to_string(),
                    run.elevation_gain_m.map(|g| g.to_string()).unwrap_or_default(),
                ])
                .map_err(csv_error)?;
        }

        writer.flush().map_err(|e| ElevationError::PersistenceError {
            message: format!("cannot flush '{}': {}", path.display(), e),
        })?;

        info!(
            "[RunCache] Exported {} runs to {}",
            runs.len(),
            path.display()
        );
        Ok(runs.len())
    }

    /// Join stored reference gains with `tcx_<date>.xml` traces in
    /// `trace_dir` to produce the labeled calibration set.
    ///
    /// Dates whose trace file is missing or unreadable are skipped with a
    /// warning. Cases come back ordered by date.
    pub fn calibration_cases(&self, trace_dir: &Path) -> Result<Vec<CalibrationCase>> {
        let mut cases = Vec::new();

        for (date, elevation_ft) in self.reference_gains()? {
            let path = trace_dir.join(format!("tcx_{}.xml", date));
            match tcx::read_altitude_file(&path) {
                Ok(trace) => cases.push(CalibrationCase::new(
                    &date,
                    trace,
                    feet_to_meters(elevation_ft),
                )),
                Err(e) => warn!("[RunCache] Skipping calibration case {}: {}", date, e),
            }
        }

        info!(
            "[RunCache] Assembled {} calibration cases from {}",
            cases.len(),
            trace_dir.display()
        );
        Ok(cases)
    }
}

fn db_error(e: rusqlite::Error) -> ElevationError {
    ElevationError::PersistenceError {
        message: e.to_string(),
    }
}

fn csv_error(e: csv::Error) -> ElevationError {
    ElevationError::PersistenceError {
        message: e.to_string(),
    }
}
