use approx::assert_relative_eq;
use assert_matches::assert_matches;
use rstest::*;

use crate::beagle::errors::BeagleError;
use crate::beagle::matrices::{fill_matrix, EigenBuffer, MatrixKind};

const JC69_EVEC: [f64; 16] = [
    1.0, 2.0, 0.0, 0.5, 1.0, -2.0, 0.5, 0.0, 1.0, 2.0, 0.0, -0.5, 1.0, -2.0, -0.5, 0.0,
];
const JC69_IVEC: [f64; 16] = [
    0.25, 0.25, 0.25, 0.25, 0.125, -0.125, 0.125, -0.125, 0.0, 1.0, 0.0, -1.0, 1.0, 0.0, -1.0,
    0.0,
];
const JC69_EVAL: [f64; 4] = [0.0, -4.0 / 3.0, -4.0 / 3.0, -4.0 / 3.0];

fn jc69() -> EigenBuffer {
    EigenBuffer::new(4, &JC69_EVEC, &JC69_IVEC, &JC69_EVAL).unwrap()
}

fn matrix(kind: MatrixKind, t: f64, rates: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; 16 * rates.len()];
    fill_matrix(&jc69(), kind, t, rates, &mut out);
    out
}

#[rstest]
#[case(0.01)]
#[case(0.1)]
#[case(0.5)]
#[case(2.0)]
fn jc69_matches_closed_form(#[case] t: f64) {
    let p = matrix(MatrixKind::Probability, t, &[1.0]);
    let e = (-4.0 / 3.0 * t).exp();
    for i in 0..4 {
        for j in 0..4 {
            let expected = if i == j {
                0.25 + 0.75 * e
            } else {
                0.25 - 0.25 * e
            };
            assert_relative_eq!(p[i * 4 + j], expected, epsilon = 1e-14);
        }
        assert_relative_eq!(p[i * 4..(i + 1) * 4].iter().sum::<f64>(), 1.0, epsilon = 1e-14);
    }
}

#[test]
fn zero_length_gives_identity() {
    let p = matrix(MatrixKind::Probability, 0.0, &[1.0, 3.0]);
    for c in 0..2 {
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(p[c * 16 + i * 4 + j], expected, epsilon = 1e-15);
            }
        }
    }
}

#[test]
fn long_branches_converge_to_frequencies() {
    let p = matrix(MatrixKind::Probability, 50.0, &[1.0]);
    for v in p {
        assert_relative_eq!(v, 0.25, epsilon = 1e-12);
    }
}

#[test]
fn derivatives_match_finite_differences() {
    let (t, h) = (0.3, 1e-5);
    let rates = [0.5, 2.0];
    let first = matrix(MatrixKind::FirstDerivative, t, &rates);
    let second = matrix(MatrixKind::SecondDerivative, t, &rates);
    let above = matrix(MatrixKind::Probability, t + h, &rates);
    let below = matrix(MatrixKind::Probability, t - h, &rates);
    let centre = matrix(MatrixKind::Probability, t, &rates);
    for i in 0..32 {
        assert_relative_eq!(first[i], (above[i] - below[i]) / (2.0 * h), epsilon = 1e-8);
        assert_relative_eq!(
            second[i],
            (above[i] - 2.0 * centre[i] + below[i]) / (h * h),
            epsilon = 1e-4
        );
    }
    // rows of dP/dt sum to zero, unlike clamped probabilities they may be negative
    assert!(first.iter().any(|&v| v < 0.0));
    for row in first.chunks(4) {
        assert_relative_eq!(row.iter().sum::<f64>(), 0.0, epsilon = 1e-14);
    }
}

#[test]
fn negative_probabilities_are_clamped() {
    let eigen = EigenBuffer::new(2, &[-1.0, 0.0, 0.0, 1.0], &[1.0, 0.0, 0.0, 1.0], &[0.0, 0.0])
        .unwrap();
    let mut p = vec![0.0; 4];
    fill_matrix(&eigen, MatrixKind::Probability, 0.5, &[1.0], &mut p);
    assert_eq!(p, vec![0.0, 0.0, 0.0, 1.0]);
    let mut d = vec![1.0; 4];
    fill_matrix(&eigen, MatrixKind::FirstDerivative, 0.5, &[1.0], &mut d);
    assert_eq!(d, vec![0.0; 4]);
}

#[test]
fn eigen_buffer_checks_lengths() {
    assert_matches!(
        EigenBuffer::new(4, &JC69_EVEC, &JC69_IVEC[..12], &JC69_EVAL),
        Err(BeagleError::LengthMismatch {
            expected: 16,
            actual: 12,
            ..
        })
    );
    assert_eq!(jc69().state_count(), 4);
}
