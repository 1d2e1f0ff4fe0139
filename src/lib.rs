//! # Elevation Estimator
//!
//! Reference-calibrated elevation gain estimation for GPS activity traces.
//!
//! This library provides:
//! - Elevation gain estimation from noisy altitude traces (smoothing,
//!   climb segmentation, adaptive thresholding)
//! - An offline calibration harness that fits estimator parameters against
//!   a labeled reference dataset
//! - Activity fetching and local caching for building those datasets
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel calibration sweeps with rayon
//! - **`http`** - Enable HTTP client for activity fetching
//! - **`persistence`** - Enable SQLite run cache and CSV export
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use elevation_estimator::{estimate_gain, meters_to_feet, EstimatorConfig};
//!
//! // Raw altitude samples in meters, one per recorded point.
//! let trace = vec![100.0, 105.0, 110.0, 103.0, 101.0, 112.0, 120.0];
//!
//! // Window of 1 disables smoothing; a single band with a 5 m cutoff.
//! let config = EstimatorConfig::new(1, vec![], vec![5.0], None)?;
//!
//! let gain_m = estimate_gain(&trace, &config)?;
//! assert_eq!(gain_m, 29.0);
//! println!("Elevation gain: {:.0} ft", meters_to_feet(gain_m));
//! # Ok::<(), elevation_estimator::ElevationError>(())
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{ElevationError, Result};

// Centered moving-average smoothing
pub mod smoothing;
pub use smoothing::moving_average;

// Climb segmentation state machine
pub mod climbs;
pub use climbs::{segment_climbs, Climb};

// Adaptive threshold selection by overall altitude range
pub mod threshold;
pub use threshold::{altitude_range, select_threshold};

// Full estimation pipeline (smoothing -> segmentation -> thresholding -> sum)
pub mod estimator;
pub use estimator::{estimate_gain, feet_to_meters, meters_to_feet, METERS_TO_FEET};

// Offline parameter calibration against labeled reference data
pub mod calibration;
pub use calibration::{
    calibrate, CalibrationCase, CalibrationResult, CaseError, ParameterSpace,
};
#[cfg(feature = "parallel")]
pub use calibration::calibrate_parallel;

// TCX altitude-trace extraction
pub mod tcx;
pub use tcx::{altitude_trace, read_altitude_file};

// HTTP module for activity fetching
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{ActivityClient, ApiCredentials, RunSummary};

// SQLite run cache and CSV export
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::{CachedRun, RunCache};

// ============================================================================
// Core Types
// ============================================================================

/// Configuration for the elevation gain estimator.
///
/// A config couples a smoothing window with an adaptive threshold table:
/// the overall altitude range of the raw trace selects one band, and only
/// climbs whose net gain reaches that band's threshold are counted.
///
/// Configs are validated at construction and never silently coerced:
/// `band_thresholds` must hold exactly one more entry than
/// `range_breakpoints`, and the breakpoints must be strictly ascending.
///
/// # Example
/// ```
/// use elevation_estimator::EstimatorConfig;
///
/// // Ranges below 85 m use a 9 m cutoff, below 100 m a 10 m cutoff,
/// // anything larger a 14 m cutoff.
/// let config = EstimatorConfig::new(30, vec![85.0, 100.0], vec![9.0, 10.0, 14.0], None);
/// assert!(config.is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Width of the centered moving-average window. 1 disables smoothing.
    pub smoothing_window: usize,

    /// Altitude-range cutoffs (meters) separating threshold bands,
    /// strictly ascending.
    pub range_breakpoints: Vec<f64>,

    /// Minimum counted climb gain (meters) per band; one more entry than
    /// `range_breakpoints`.
    pub band_thresholds: Vec<f64>,

    /// Minimum descent from a climb's peak (meters) before the climb ends.
    /// `None` ends a climb on any descent.
    pub descent_margin: Option<f64>,
}

impl EstimatorConfig {
    /// Create a validated config.
    pub fn new(
        smoothing_window: usize,
        range_breakpoints: Vec<f64>,
        band_thresholds: Vec<f64>,
        descent_margin: Option<f64>,
    ) -> Result<Self> {
        let config = Self {
            smoothing_window,
            range_breakpoints,
            band_thresholds,
            descent_margin,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the structural invariants of this config.
    pub fn validate(&self) -> Result<()> {
        if self.smoothing_window < 1 {
            return Err(ElevationError::InvalidConfig {
                message: "smoothing window must be at least 1".to_string(),
            });
        }
        if self.band_thresholds.len() != self.range_breakpoints.len() + 1 {
            return Err(ElevationError::InvalidConfig {
                message: format!(
                    "{} thresholds for {} breakpoints (need exactly one more threshold than breakpoints)",
                    self.band_thresholds.len(),
                    self.range_breakpoints.len()
                ),
            });
        }
        if !self.range_breakpoints.windows(2).all(|w| w[0] < w[1]) {
            return Err(ElevationError::InvalidConfig {
                message: "range breakpoints must be strictly ascending".to_string(),
            });
        }
        if let Some(margin) = self.descent_margin {
            if !(margin > 0.0) {
                return Err(ElevationError::InvalidConfig {
                    message: "descent margin must be positive".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for EstimatorConfig {
    /// The configuration selected by the last calibration sweep against the
    /// labeled reference set. Re-run the calibration harness when new
    /// labeled activities are available rather than treating these numbers
    /// as ground truth.
    fn default() -> Self {
        Self {
            smoothing_window: 30,
            range_breakpoints: vec![85.0, 100.0],
            band_thresholds: vec![9.0, 10.0, 14.0],
            descent_margin: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EstimatorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_threshold_count_mismatch_rejected() {
        let result = EstimatorConfig::new(30, vec![85.0, 100.0], vec![9.0, 10.0], None);
        assert!(matches!(
            result,
            Err(ElevationError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_unordered_breakpoints_rejected() {
        let result = EstimatorConfig::new(30, vec![100.0, 85.0], vec![9.0, 10.0, 14.0], None);
        assert!(matches!(
            result,
            Err(ElevationError::InvalidConfig { .. })
        ));

        // Equal breakpoints are not strictly ascending either
        let result = EstimatorConfig::new(30, vec![85.0, 85.0], vec![9.0, 10.0, 14.0], None);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let result = EstimatorConfig::new(0, vec![], vec![10.0], None);
        assert!(matches!(
            result,
            Err(ElevationError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_non_positive_descent_margin_rejected() {
        assert!(EstimatorConfig::new(1, vec![], vec![5.0], Some(0.0)).is_err());
        assert!(EstimatorConfig::new(1, vec![], vec![5.0], Some(-1.0)).is_err());
        assert!(EstimatorConfig::new(1, vec![], vec![5.0], Some(2.0)).is_ok());
    }

    #[test]
    fn test_single_band_needs_no_breakpoints() {
        let config = EstimatorConfig::new(5, vec![], vec![8.0], None);
        assert!(config.is_ok());
    }
}
