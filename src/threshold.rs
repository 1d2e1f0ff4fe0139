//! Adaptive threshold selection.
//!
//! Flat routes carry proportionally more residual noise in their smoothed
//! signal than genuine elevation change, so they need a lower absolute
//! cutoff to avoid under-counting. Mountainous routes tolerate a higher
//! cutoff without losing real climbs, and need one so that noise does not
//! compound across many small climbs. The overall altitude range of the
//! raw trace picks the band.

use crate::EstimatorConfig;

/// Overall altitude range of a raw trace: `max - min` in meters.
///
/// Computed on the unsmoothed samples; smoothing compresses the extremes
/// and would bias band selection toward flatter bands.
pub fn altitude_range(trace: &[f64]) -> f64 {
    if trace.is_empty() {
        return 0.0;
    }
    let max = trace.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let min = trace.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    max - min
}

/// Select the minimum counted climb gain for a trace with the given
/// overall altitude range.
///
/// Ordered linear scan: the first breakpoint the range is strictly less
/// than selects that band's threshold; a range beyond every breakpoint
/// selects the last threshold.
///
/// # Example
/// ```
/// use elevation_estimator::{select_threshold, EstimatorConfig};
///
/// let config = EstimatorConfig::default();
/// assert_eq!(select_threshold(&config, 40.0), 9.0);
/// assert_eq!(select_threshold(&config, 90.0), 10.0);
/// assert_eq!(select_threshold(&config, 250.0), 14.0);
/// ```
pub fn select_threshold(config: &EstimatorConfig, altitude_range: f64) -> f64 {
    for (band, &breakpoint) in config.range_breakpoints.iter().enumerate() {
        if altitude_range < breakpoint {
            return config.band_thresholds[band];
        }
    }
    config.band_thresholds[config.range_breakpoints.len()]
}
