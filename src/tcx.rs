//! Altitude-trace extraction from TCX documents.
//!
//! TCX exports wrap each trackpoint's altitude in an `<AltitudeMeters>`
//! element. The estimator only needs that ordered sequence, so the loader
//! scans for those elements directly instead of materializing the whole
//! document tree.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ElevationError, Result};

static ALTITUDE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"<AltitudeMeters>([-+]?[0-9]*\.?[0-9]+)</AltitudeMeters>").ok()
});

/// Extract the ordered altitude sample sequence (meters) from TCX text.
///
/// Values that do not parse as numbers are skipped. An empty result is not
/// an error at this layer; the estimator reports zero gain for it.
///
/// # Example
/// ```
/// use elevation_estimator::altitude_trace;
///
/// let tcx = "<Trackpoint><AltitudeMeters>101.5</AltitudeMeters></Trackpoint>\
///            <Trackpoint><AltitudeMeters>103.0</AltitudeMeters></Trackpoint>";
/// assert_eq!(altitude_trace(tcx), vec![101.5, 103.0]);
/// ```
pub fn altitude_trace(xml: &str) -> Vec<f64> {
    let Some(pattern) = ALTITUDE_PATTERN.as_ref() else {
        return Vec::new();
    };

    pattern
        .captures_iter(xml)
        .filter_map(|captures| captures.get(1))
        .filter_map(|value| value.as_str().parse::<f64>().ok())
        .collect()
}

/// Read a TCX file and extract its altitude trace.
///
/// Returns `TraceUnavailable` when the file cannot be read; an existing
/// file without altitude data yields an empty trace.
pub fn read_altitude_file(path: &Path) -> Result<Vec<f64>> {
    let xml = fs::read_to_string(path).map_err(|e| ElevationError::TraceUnavailable {
        source_id: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(altitude_trace(&xml))
}
