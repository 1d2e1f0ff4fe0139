//! Centered moving-average smoothing for raw altitude traces.
//!
//! GPS altitude is far noisier than horizontal position; single-sample
//! excursions of a meter or more are routine. A wide centered mean
//! suppresses that jitter before climb segmentation so the segmenter sees
//! terrain, not noise.

use crate::error::{ElevationError, Result};

/// Smooth a raw altitude trace with a centered moving average.
///
/// Element `i` of the output is the arithmetic mean of the input samples at
/// indices `[i - window/2, i + window/2]`, truncated at the trace
/// boundaries rather than padded with synthetic values. A window of 1
/// returns the trace unchanged.
///
/// Returns `InsufficientData` when the trace has fewer than 2 samples;
/// callers treat that as zero gain, not a hard failure.
///
/// # Example
/// ```
/// use elevation_estimator::moving_average;
///
/// let smoothed = moving_average(&[0.0, 3.0, 6.0], 3).unwrap();
/// assert_eq!(smoothed, vec![1.5, 3.0, 4.5]);
/// ```
pub fn moving_average(trace: &[f64], window: usize) -> Result<Vec<f64>> {
    if trace.len() < 2 {
        return Err(ElevationError::InsufficientData {
            point_count: trace.len(),
            minimum_required: 2,
        });
    }

    if window <= 1 {
        return Ok(trace.to_vec());
    }

    let half = window / 2;
    let mut smoothed = Vec::with_capacity(trace.len());

    for i in 0..trace.len() {
        let start = i.saturating_sub(half);
        let end = (i + half + 1).min(trace.len());
        let slice = &trace[start..end];
        smoothed.push(slice.iter().sum::<f64>() / slice.len() as f64);
    }

    Ok(smoothed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_one_is_identity() {
        let trace = vec![10.0, 12.5, 11.0, 13.0];
        assert_eq!(moving_average(&trace, 1).unwrap(), trace);
    }

    #[test]
    fn test_short_trace_is_insufficient() {
        assert!(matches!(
            moving_average(&[], 5),
            Err(ElevationError::InsufficientData { point_count: 0, .. })
        ));
        assert!(matches!(
            moving_average(&[100.0], 5),
            Err(ElevationError::InsufficientData { point_count: 1, .. })
        ));
    }

    #[test]
    fn test_output_length_matches_input() {
        let trace: Vec<f64> = (0..50).map(|i| i as f64).collect();
        for window in [1, 2, 5, 30, 200] {
            assert_eq!(moving_average(&trace, window).unwrap().len(), trace.len());
        }
    }

    #[test]
    fn test_edges_use_truncated_windows() {
        // Window 3 covers one sample either side; the edges only average
        // the samples that exist.
        let smoothed = moving_average(&[0.0, 3.0, 6.0, 9.0], 3).unwrap();
        assert_eq!(smoothed, vec![1.5, 3.0, 6.0, 7.5]);
    }

    #[test]
    fn test_constant_trace_unchanged() {
        let trace = vec![42.0; 20];
        assert_eq!(moving_average(&trace, 7).unwrap(), trace);
    }

    #[test]
    fn test_window_wider_than_trace() {
        let smoothed = moving_average(&[1.0, 2.0, 3.0], 100).unwrap();
        for value in smoothed {
            assert!((value - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_suppresses_single_sample_spike() {
        let mut trace = vec![100.0; 21];
        trace[10] = 110.0;
        let smoothed = moving_average(&trace, 9).unwrap();
        let peak = smoothed.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        assert!(peak < 102.0);
    }
}
