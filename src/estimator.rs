//! Elevation gain estimation pipeline.
//!
//! Ties the stages together: smooth the raw trace, segment it into climbs,
//! select the threshold for the trace's overall altitude range, and sum
//! the climbs that clear it. Estimation is a pure function of the trace
//! and the config; identical inputs produce bit-identical output.

use log::debug;

use crate::climbs::segment_climbs;
use crate::error::{ElevationError, Result};
use crate::smoothing::moving_average;
use crate::threshold::{altitude_range, select_threshold};
use crate::EstimatorConfig;

/// Meters to feet conversion factor.
pub const METERS_TO_FEET: f64 = 3.28084;

/// Convert meters to feet. Applied once at the reporting boundary;
/// internal computation stays in meters.
pub fn meters_to_feet(meters: f64) -> f64 {
    meters * METERS_TO_FEET
}

/// Convert feet to meters. Reference services report gain in feet;
/// calibration labels are converted once at load time.
pub fn feet_to_meters(feet: f64) -> f64 {
    feet / METERS_TO_FEET
}

/// Estimate the total elevation gain of one activity in meters.
///
/// Traces with fewer than 2 samples yield `Ok(0.0)` rather than an error,
/// so a run with no usable GPS data simply contributes no gain. The only
/// error path is an invalid config. NaN altitudes flow through the
/// arithmetic untouched; a degenerate trace produces a degenerate result
/// rather than a masked one.
///
/// # Example
/// ```
/// use elevation_estimator::{estimate_gain, EstimatorConfig};
///
/// let trace = vec![100.0, 105.0, 110.0, 103.0, 101.0, 112.0, 120.0];
/// let config = EstimatorConfig::new(1, vec![], vec![15.0], None)?;
///
/// // The 10 m climb is below the 15 m cutoff; only the 19 m climb counts.
/// assert_eq!(estimate_gain(&trace, &config)?, 19.0);
/// # Ok::<(), elevation_estimator::ElevationError>(())
/// ```
pub fn estimate_gain(trace: &[f64], config: &EstimatorConfig) -> Result<f64> {
    config.validate()?;

    let smoothed = match moving_average(trace, config.smoothing_window) {
        Ok(smoothed) => smoothed,
        Err(ElevationError::InsufficientData { point_count, .. }) => {
            debug!("[Estimator] {} samples, reporting zero gain", point_count);
            return Ok(0.0);
        }
        Err(e) => return Err(e),
    };

    // Band selection uses the raw trace's range, not the smoothed one.
    let range = altitude_range(trace);
    let threshold = select_threshold(config, range);

    let climbs = segment_climbs(&smoothed, config.descent_margin);
    let counted = climbs.iter().filter(|c| c.gain() >= threshold);
    let total: f64 = counted.map(|c| c.gain()).sum();

    debug!(
        "[Estimator] {} samples, range {:.1} m, threshold {:.1} m, {} climbs, gain {:.1} m",
        trace.len(),
        range,
        threshold,
        climbs.len(),
        total
    );

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_band(threshold: f64) -> EstimatorConfig {
        EstimatorConfig::new(1, vec![], vec![threshold], None).unwrap()
    }

    #[test]
    fn test_short_traces_yield_zero_gain() {
        for config in [EstimatorConfig::default(), single_band(5.0)] {
            assert_eq!(estimate_gain(&[], &config).unwrap(), 0.0);
            assert_eq!(estimate_gain(&[123.4], &config).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_constant_trace_yields_zero_gain() {
        let trace = vec![250.0; 100];
        assert_eq!(estimate_gain(&trace, &EstimatorConfig::default()).unwrap(), 0.0);
        assert_eq!(estimate_gain(&trace, &single_band(0.0)).unwrap(), 0.0);
    }

    #[test]
    fn test_monotonic_trace_is_last_minus_first() {
        let trace: Vec<f64> = (0..40).map(|i| 100.0 + 2.0 * i as f64).collect();
        let gain = estimate_gain(&trace, &single_band(5.0)).unwrap();
        assert_eq!(gain, 78.0);
    }

    #[test]
    fn test_worked_example_low_threshold() {
        let trace = vec![100.0, 105.0, 110.0, 103.0, 101.0, 112.0, 120.0];
        assert_eq!(estimate_gain(&trace, &single_band(5.0)).unwrap(), 29.0);
    }

    #[test]
    fn test_worked_example_high_threshold() {
        let trace = vec![100.0, 105.0, 110.0, 103.0, 101.0, 112.0, 120.0];
        assert_eq!(estimate_gain(&trace, &single_band(15.0)).unwrap(), 19.0);
    }

    #[test]
    fn test_idempotent() {
        let trace: Vec<f64> = (0..500)
            .map(|i| 100.0 + (i as f64 * 0.21).sin() * 12.0 + (i as f64 * 0.017).cos() * 40.0)
            .collect();
        let config = EstimatorConfig::default();
        let first = estimate_gain(&trace, &config).unwrap();
        let second = estimate_gain(&trace, &config).unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn test_raising_threshold_never_increases_gain() {
        let trace: Vec<f64> = (0..300)
            .map(|i| 100.0 + (i as f64 * 0.15).sin() * 20.0 + i as f64 * 0.05)
            .collect();
        let mut previous = f64::INFINITY;
        for threshold in [0.0, 2.0, 5.0, 10.0, 20.0, 50.0] {
            let gain = estimate_gain(&trace, &single_band(threshold)).unwrap();
            assert!(gain <= previous);
            previous = gain;
        }
    }

    #[test]
    fn test_adaptive_band_switches_threshold() {
        // Default bands with smoothing disabled for exact arithmetic.
        let config =
            EstimatorConfig::new(1, vec![85.0, 100.0], vec![9.0, 10.0, 14.0], None).unwrap();

        // 12 m climb over a trace whose range stays under the first
        // breakpoint: counted with the 9 m threshold.
        let flat = vec![100.0, 106.0, 112.0, 100.0, 100.0];
        assert_eq!(estimate_gain(&flat, &config).unwrap(), 12.0);

        // Same climb plus a deep valley pushing the range past 100 m:
        // the 14 m threshold now discards it.
        let mountainous = vec![100.0, 106.0, 112.0, 100.0, 0.0];
        assert_eq!(estimate_gain(&mountainous, &config).unwrap(), 0.0);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let config = EstimatorConfig {
            smoothing_window: 1,
            range_breakpoints: vec![85.0],
            band_thresholds: vec![9.0],
            descent_margin: None,
        };
        assert!(matches!(
            estimate_gain(&[1.0, 2.0], &config),
            Err(ElevationError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_nan_propagates_rather_than_masked() {
        let trace = vec![100.0, f64::NAN, 105.0, 100.0];
        let gain = estimate_gain(&trace, &single_band(0.1)).unwrap();
        // Degenerate input may produce a degenerate (or zero) result, but
        // never a panic or an error.
        assert!(gain.is_nan() || gain >= 0.0);
    }

    #[test]
    fn test_unit_conversion() {
        assert!((meters_to_feet(100.0) - 328.084).abs() < 1e-9);
        assert!((feet_to_meters(328.084) - 100.0).abs() < 1e-9);
        assert!((feet_to_meters(meters_to_feet(123.45)) - 123.45).abs() < 1e-9);
    }
}
