//! End-to-end tests over the public API: TCX text in, feet out, and
//! calibration results that agree with recomputation from scratch.

use elevation_estimator::{
    altitude_trace, calibrate, estimate_gain, feet_to_meters, meters_to_feet, CalibrationCase,
    EstimatorConfig, ParameterSpace,
};

/// Wrap altitude samples in minimal TCX trackpoints.
fn synthetic_tcx(trace: &[f64]) -> String {
    let mut tcx = String::from("<?xml version=\"1.0\"?><TrainingCenterDatabase><Track>");
    for altitude in trace {
        tcx.push_str(&format!(
            "<Trackpoint><AltitudeMeters>{}</AltitudeMeters></Trackpoint>",
            altitude
        ));
    }
    tcx.push_str("</Track></TrainingCenterDatabase>");
    tcx
}

/// Deterministic rolling-hills trace: gentle noise over two broad climbs.
fn rolling_trace(samples: usize) -> Vec<f64> {
    (0..samples)
        .map(|i| {
            let t = i as f64;
            100.0 + (t * 0.01).sin() * 25.0 + (t * 0.6).sin() * 1.2
        })
        .collect()
}

#[test]
fn tcx_to_feet_end_to_end() {
    let tcx = synthetic_tcx(&[100.0, 105.0, 110.0, 103.0, 101.0, 112.0, 120.0]);
    let trace = altitude_trace(&tcx);
    assert_eq!(trace.len(), 7);

    let config = EstimatorConfig::new(1, vec![], vec![5.0], None).unwrap();
    let gain_m = estimate_gain(&trace, &config).unwrap();
    assert_eq!(gain_m, 29.0);
    assert!((meters_to_feet(gain_m) - 95.14436).abs() < 1e-5);
}

#[test]
fn default_config_survives_noisy_trace() {
    let trace = rolling_trace(1500);
    let config = EstimatorConfig::default();

    let first = estimate_gain(&trace, &config).unwrap();
    let second = estimate_gain(&trace, &config).unwrap();

    assert!(first.is_finite());
    assert!(first >= 0.0);
    assert_eq!(first.to_bits(), second.to_bits());
}

#[test]
fn smoothing_absorbs_jitter_that_raw_deltas_count() {
    let trace = rolling_trace(1500);

    // Sum of positive raw deltas, the naive estimate the smoothing and
    // net-gain model exist to beat.
    let raw_gain: f64 = trace
        .windows(2)
        .map(|w| (w[1] - w[0]).max(0.0))
        .sum();

    let config = EstimatorConfig::default();
    let estimated = estimate_gain(&trace, &config).unwrap();
    assert!(estimated < raw_gain);
}

#[test]
fn empty_and_single_sample_tcx_report_zero() {
    let config = EstimatorConfig::default();
    for tcx in [
        synthetic_tcx(&[]),
        synthetic_tcx(&[182.0]),
        String::from("<TrainingCenterDatabase/>"),
    ] {
        let trace = altitude_trace(&tcx);
        assert_eq!(estimate_gain(&trace, &config).unwrap(), 0.0);
    }
}

#[test]
fn harness_reported_errors_match_recomputation() {
    // A labeled case the way the reference service reports it: 224 ft.
    let cases = vec![
        CalibrationCase::new("2025-11-16", rolling_trace(1200), feet_to_meters(224.0)),
        CalibrationCase::new(
            "2025-10-06",
            rolling_trace(900).iter().map(|a| a * 1.4).collect(),
            feet_to_meters(437.0),
        ),
    ];

    let result = calibrate(&cases, &ParameterSpace::default()).unwrap();
    assert_eq!(result.configs_evaluated, 4375);

    // The reported per-case table must equal recomputation from scratch.
    let mut sum = 0.0;
    for (case, entry) in cases.iter().zip(&result.per_case) {
        assert_eq!(entry.case_id, case.id);
        let recomputed = estimate_gain(&case.trace, &result.config).unwrap();
        assert_eq!(entry.estimated_m.to_bits(), recomputed.to_bits());

        let reference = case.reference_gain_m.unwrap();
        let signed = (recomputed - reference) / reference * 100.0;
        assert!((entry.signed_error_pct.unwrap() - signed).abs() < 1e-12);
        sum += signed.abs();
    }
    assert!((result.mean_abs_error_pct - sum / cases.len() as f64).abs() < 1e-12);
}

#[test]
fn best_config_beats_every_other_candidate() {
    let cases = vec![
        CalibrationCase::new("a", rolling_trace(600), 40.0),
        CalibrationCase::new("b", rolling_trace(450), 25.0),
    ];

    let space = ParameterSpace {
        smoothing_windows: vec![1, 5, 15],
        breakpoint_candidates: vec![vec![60.0]],
        threshold_candidates: vec![vec![4.0, 8.0], vec![10.0, 14.0]],
        descent_margins: vec![None],
    };

    let result = calibrate(&cases, &space).unwrap();

    // Brute-force every candidate and confirm none scores lower.
    for &window in &space.smoothing_windows {
        for &t0 in &space.threshold_candidates[0] {
            for &t1 in &space.threshold_candidates[1] {
                let config =
                    EstimatorConfig::new(window, vec![60.0], vec![t0, t1], None).unwrap();
                let mut sum = 0.0;
                for case in &cases {
                    let estimated = estimate_gain(&case.trace, &config).unwrap();
                    let reference = case.reference_gain_m.unwrap();
                    sum += ((estimated - reference) / reference * 100.0).abs();
                }
                let mean = sum / cases.len() as f64;
                assert!(mean >= result.mean_abs_error_pct - 1e-12);
            }
        }
    }
}
