//! Offline parameter calibration against labeled reference data.
//!
//! The estimator's smoothing window and threshold table are not designed
//! constants; they are fit. Given a set of activities whose elevation gain
//! the reference service has already reported, the harness sweeps an
//! explicit grid of candidate parameters, scores every combination by mean
//! absolute percentage error across the labeled cases, and returns the
//! best configuration together with the full per-case error table.
//!
//! The sweep is a pure function of its inputs: cases are never mutated, no
//! I/O happens during the search, and the enumeration order is fixed, so
//! reruns (sequential or parallel) select the same configuration.
//!
//! ## Example
//! ```rust
//! use elevation_estimator::calibration::{calibrate, CalibrationCase, ParameterSpace};
//!
//! let cases = vec![CalibrationCase::new(
//!     "2025-10-06",
//!     vec![100.0, 104.0, 109.0, 101.0, 100.0, 115.0, 122.0],
//!     22.0,
//! )];
//!
//! let space = ParameterSpace {
//!     smoothing_windows: vec![1],
//!     breakpoint_candidates: vec![],
//!     threshold_candidates: vec![vec![5.0, 10.0, 15.0]],
//!     descent_margins: vec![None],
//! };
//!
//! let result = calibrate(&cases, &space)?;
//! assert_eq!(result.config.band_thresholds, vec![10.0]);
//! # Ok::<(), elevation_estimator::ElevationError>(())
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{ElevationError, Result};
use crate::estimator::{estimate_gain, feet_to_meters};
use crate::tcx;
use crate::EstimatorConfig;

/// One labeled activity: an altitude trace plus the gain the reference
/// service reported for it, in meters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationCase {
    /// Stable identifier, typically the activity date
    pub id: String,
    /// Raw altitude trace in meters
    pub trace: Vec<f64>,
    /// Reference elevation gain in meters; `None` or a non-finite or
    /// non-positive value marks the reference as unusable
    pub reference_gain_m: Option<f64>,
}

impl CalibrationCase {
    /// Create a labeled case.
    pub fn new(id: &str, trace: Vec<f64>, reference_gain_m: f64) -> Self {
        Self {
            id: id.to_string(),
            trace,
            reference_gain_m: Some(reference_gain_m),
        }
    }

    /// The reference value, if it can anchor a percentage error.
    fn usable_reference(&self) -> Option<f64> {
        self.reference_gain_m
            .filter(|r| r.is_finite() && *r > 0.0)
    }
}

/// Per-case outcome for one configuration.
#[derive(Debug, Clone, Serialize)]
pub struct CaseError {
    pub case_id: String,
    /// Estimated gain in meters
    pub estimated_m: f64,
    /// Reference gain in meters, as supplied
    pub reference_m: Option<f64>,
    /// Signed percentage error `(estimated - reference) / reference * 100`;
    /// `None` when the case was excluded for an unusable reference
    pub signed_error_pct: Option<f64>,
}

/// Result of a calibration sweep.
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationResult {
    /// The winning configuration
    pub config: EstimatorConfig,
    /// Mean absolute percentage error of `config` over the usable cases
    pub mean_abs_error_pct: f64,
    /// Full error table for `config`, excluded cases included
    pub per_case: Vec<CaseError>,
    /// Number of configurations evaluated
    pub configs_evaluated: usize,
}

/// Enumerable candidate values for every tunable parameter.
///
/// The sweep evaluates the Cartesian product of all candidate lists:
/// `breakpoint_candidates[i]` holds the candidates for breakpoint position
/// `i`, and `threshold_candidates[b]` the candidates for band `b`, so the
/// threshold list must be one position longer than the breakpoint list.
/// Combinations whose breakpoints come out non-ascending are skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpace {
    pub smoothing_windows: Vec<usize>,
    pub breakpoint_candidates: Vec<Vec<f64>>,
    pub threshold_candidates: Vec<Vec<f64>>,
    pub descent_margins: Vec<Option<f64>>,
}

impl Default for ParameterSpace {
    /// The sweep that produced the crate's default config: windows around
    /// 30, a movable first breakpoint under a fixed 100 m second one, and
    /// threshold candidates bracketing 9/10/14 m.
    fn default() -> Self {
        Self {
            smoothing_windows: vec![25, 27, 29, 30, 31, 33, 35],
            breakpoint_candidates: vec![vec![75.0, 80.0, 85.0, 90.0, 95.0], vec![100.0]],
            threshold_candidates: vec![
                vec![8.0, 8.5, 9.0, 9.5, 10.0],
                vec![9.0, 9.5, 10.0, 10.5, 11.0],
                vec![12.0, 13.0, 14.0, 15.0, 16.0],
            ],
            descent_margins: vec![None],
        }
    }
}

impl ParameterSpace {
    /// Check that every candidate list is populated and the band count
    /// lines up with the breakpoint count.
    pub fn validate(&self) -> Result<()> {
        if self.smoothing_windows.is_empty() {
            return Err(ElevationError::InvalidConfig {
                message: "parameter space has no smoothing window candidates".to_string(),
            });
        }
        if self.threshold_candidates.len() != self.breakpoint_candidates.len() + 1 {
            return Err(ElevationError::InvalidConfig {
                message: format!(
                    "{} threshold bands for {} breakpoint positions",
                    self.threshold_candidates.len(),
                    self.breakpoint_candidates.len()
                ),
            });
        }
        if self.breakpoint_candidates.iter().any(Vec::is_empty)
            || self.threshold_candidates.iter().any(Vec::is_empty)
        {
            return Err(ElevationError::InvalidConfig {
                message: "every breakpoint and threshold position needs at least one candidate"
                    .to_string(),
            });
        }
        if self.descent_margins.is_empty() {
            return Err(ElevationError::InvalidConfig {
                message: "parameter space has no descent margin candidates (use [None])"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Size of the full Cartesian product, before skipping non-ascending
    /// breakpoint combinations.
    pub fn combination_count(&self) -> usize {
        let breakpoints: usize = self.breakpoint_candidates.iter().map(Vec::len).product();
        let thresholds: usize = self.threshold_candidates.iter().map(Vec::len).product();
        self.smoothing_windows.len() * breakpoints * thresholds * self.descent_margins.len()
    }

    /// Materialize every valid configuration in fixed enumeration order:
    /// windows, then breakpoints, then thresholds, then margins.
    fn enumerate_configs(&self) -> Vec<EstimatorConfig> {
        let breakpoint_rows = cartesian(&self.breakpoint_candidates);
        let threshold_rows = cartesian(&self.threshold_candidates);

        let mut configs = Vec::new();
        let mut skipped = 0usize;

        for &window in &self.smoothing_windows {
            for breakpoints in &breakpoint_rows {
                for thresholds in &threshold_rows {
                    for &margin in &self.descent_margins {
                        match EstimatorConfig::new(
                            window,
                            breakpoints.clone(),
                            thresholds.clone(),
                            margin,
                        ) {
                            Ok(config) => configs.push(config),
                            Err(_) => skipped += 1,
                        }
                    }
                }
            }
        }

        if skipped > 0 {
            debug!(
                "[Calibration] Skipped {} combinations with non-ascending breakpoints",
                skipped
            );
        }

        configs
    }
}

/// Cartesian product of per-position candidate lists, in list order.
fn cartesian(lists: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut rows: Vec<Vec<f64>> = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(rows.len() * list.len());
        for prefix in &rows {
            for &value in list {
                let mut row = prefix.clone();
                row.push(value);
                next.push(row);
            }
        }
        rows = next;
    }
    rows
}

/// Mean absolute percentage error of one config over the usable cases.
fn score_config(config: &EstimatorConfig, usable: &[&CalibrationCase]) -> Result<f64> {
    let mut sum = 0.0;
    for case in usable {
        let estimated = estimate_gain(&case.trace, config)?;
        let reference = case.usable_reference().unwrap_or(f64::NAN);
        sum += ((estimated - reference) / reference * 100.0).abs();
    }
    Ok(sum / usable.len() as f64)
}

/// Full per-case table for one config, excluded cases included.
fn per_case_table(config: &EstimatorConfig, cases: &[CalibrationCase]) -> Result<Vec<CaseError>> {
    let mut table = Vec::with_capacity(cases.len());
    for case in cases {
        let estimated = estimate_gain(&case.trace, config)?;
        let signed = case
            .usable_reference()
            .map(|reference| (estimated - reference) / reference * 100.0);
        table.push(CaseError {
            case_id: case.id.clone(),
            estimated_m: estimated,
            reference_m: case.reference_gain_m,
            signed_error_pct: signed,
        });
    }
    Ok(table)
}

/// True when `(candidate, candidate_idx)` beats `(best, best_idx)` under
/// the deterministic ordering: lower error wins, equal errors fall back to
/// the earlier enumeration index, and a NaN score never wins.
fn improves(candidate: f64, candidate_idx: usize, best: f64, best_idx: usize) -> bool {
    match candidate.partial_cmp(&best) {
        Some(Ordering::Less) => true,
        Some(Ordering::Equal) => candidate_idx < best_idx,
        Some(Ordering::Greater) => false,
        None => !candidate.is_nan(),
    }
}

fn usable_cases<'a>(cases: &'a [CalibrationCase]) -> Result<Vec<&'a CalibrationCase>> {
    let mut usable = Vec::with_capacity(cases.len());
    for case in cases {
        if case.usable_reference().is_some() {
            usable.push(case);
        } else {
            warn!(
                "[Calibration] Excluding case '{}': no usable reference value",
                case.id
            );
        }
    }
    if usable.is_empty() {
        return Err(ElevationError::ReferenceUnavailable {
            case_count: cases.len(),
        });
    }
    Ok(usable)
}

fn build_result(
    configs: Vec<EstimatorConfig>,
    best_idx: usize,
    best_error: f64,
    cases: &[CalibrationCase],
) -> Result<CalibrationResult> {
    let configs_evaluated = configs.len();
    let config = configs
        .into_iter()
        .nth(best_idx)
        .ok_or(ElevationError::InvalidConfig {
            message: "parameter space produced no valid configurations".to_string(),
        })?;

    info!(
        "[Calibration] Best of {} configurations: window {}, thresholds {:?}, mean error {:.1}%",
        configs_evaluated, config.smoothing_window, config.band_thresholds, best_error
    );

    let per_case = per_case_table(&config, cases)?;
    Ok(CalibrationResult {
        config,
        mean_abs_error_pct: best_error,
        per_case,
        configs_evaluated,
    })
}

/// Run the calibration sweep sequentially.
///
/// Every valid configuration in the space is scored against the usable
/// cases; the minimum mean absolute percentage error wins, ties broken by
/// enumeration order. Each improvement is logged as the diagnostic
/// "best so far" trace.
pub fn calibrate(cases: &[CalibrationCase], space: &ParameterSpace) -> Result<CalibrationResult> {
    space.validate()?;
    let usable = usable_cases(cases)?;
    let configs = space.enumerate_configs();

    info!(
        "[Calibration] Sweeping {} configurations against {} cases ({} usable)",
        configs.len(),
        cases.len(),
        usable.len()
    );

    let mut best_error = f64::INFINITY;
    let mut best_idx = usize::MAX;

    for (idx, config) in configs.iter().enumerate() {
        let error = score_config(config, &usable)?;
        if improves(error, idx, best_error, best_idx) {
            info!(
                "[Calibration] New best at #{}: window {}, breakpoints {:?}, thresholds {:?} -> {:.1}%",
                idx, config.smoothing_window, config.range_breakpoints, config.band_thresholds, error
            );
            best_error = error;
            best_idx = idx;
        }
    }

    build_result(configs, best_idx, best_error, cases)
}

/// Run the calibration sweep across worker threads.
///
/// Evaluations are independent; the reduction is a deterministic
/// `(error, enumeration index)` minimum, so the outcome is identical to
/// [`calibrate`] regardless of completion order.
#[cfg(feature = "parallel")]
pub fn calibrate_parallel(
    cases: &[CalibrationCase],
    space: &ParameterSpace,
) -> Result<CalibrationResult> {
    space.validate()?;
    let usable = usable_cases(cases)?;
    let configs = space.enumerate_configs();

    info!(
        "[Calibration] Sweeping {} configurations against {} cases ({} usable) on {} threads",
        configs.len(),
        cases.len(),
        usable.len(),
        rayon::current_num_threads()
    );

    let scores: Vec<f64> = configs
        .par_iter()
        .map(|config| score_config(config, &usable))
        .collect::<Result<Vec<f64>>>()?;

    let mut best_error = f64::INFINITY;
    let mut best_idx = usize::MAX;
    for (idx, &error) in scores.iter().enumerate() {
        if improves(error, idx, best_error, best_idx) {
            best_error = error;
            best_idx = idx;
        }
    }

    build_result(configs, best_idx, best_error, cases)
}

// ============================================================================
// Case Loading
// ============================================================================

#[derive(Debug, Deserialize)]
struct LabelRecord {
    id: String,
    reference_ft: f64,
}

/// Load a reference label table from CSV with `id,reference_ft` columns.
///
/// Labels arrive in feet from the reference service and are converted to
/// meters once here.
pub fn load_labels_csv(path: &Path) -> Result<HashMap<String, f64>> {
    let file = File::open(path).map_err(|e| ElevationError::PersistenceError {
        message: format!("cannot open label table '{}': {}", path.display(), e),
    })?;

    let mut labels = HashMap::new();
    let mut reader = csv::Reader::from_reader(file);
    for record in reader.deserialize::<LabelRecord>() {
        let record = record.map_err(|e| ElevationError::PersistenceError {
            message: format!("malformed label row in '{}': {}", path.display(), e),
        })?;
        labels.insert(record.id, feet_to_meters(record.reference_ft));
    }
    Ok(labels)
}

/// Build calibration cases from a directory of `tcx_<id>.xml` traces and a
/// label table keyed by `<id>` (values already in meters).
///
/// Traces without a label are kept as unlabeled cases so the sweep can
/// report their estimates; unreadable files are skipped with a warning.
/// Cases come back sorted by id for deterministic sweeps.
pub fn load_cases_from_dir(
    dir: &Path,
    labels: &HashMap<String, f64>,
) -> Result<Vec<CalibrationCase>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ElevationError::TraceUnavailable {
        source_id: dir.display().to_string(),
        message: e.to_string(),
    })?;

    let mut cases = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ElevationError::TraceUnavailable {
            source_id: dir.display().to_string(),
            message: e.to_string(),
        })?;
        let path = entry.path();

        let Some(id) = case_id_from_path(&path) else {
            continue;
        };

        match tcx::read_altitude_file(&path) {
            Ok(trace) => cases.push(CalibrationCase {
                id: id.to_string(),
                trace,
                reference_gain_m: labels.get(id).copied(),
            }),
            Err(e) => warn!("[Calibration] Skipping '{}': {}", path.display(), e),
        }
    }

    cases.sort_by(|a, b| a.id.cmp(&b.id));
    info!(
        "[Calibration] Loaded {} cases from {} ({} labeled)",
        cases.len(),
        dir.display(),
        cases.iter().filter(|c| c.reference_gain_m.is_some()).count()
    );
    Ok(cases)
}

/// `tcx_2025-11-16.xml` -> `2025-11-16`
fn case_id_from_path(path: &Path) -> Option<&str> {
    let stem = path.file_stem()?.to_str()?;
    if path.extension()?.to_str()? != "xml" {
        return None;
    }
    stem.strip_prefix("tcx_")
}
