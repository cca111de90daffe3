use approx::assert_relative_eq;
use rstest::rstest;

use crate::substitution_models::{
    reversible_eigen, DNAModelType, DNASubstModel, EigenDecomposition, FreqVector, SubstMatrix,
    SubstitutionModel,
};

const GTR_PARAMS: [f64; 10] = [0.1, 0.2, 0.3, 0.4, 1.5, 4.0, 0.7, 1.2, 3.5, 1.0];
const HKY_PARAMS: [f64; 5] = [0.3, 0.2, 0.2, 0.3, 2.5];

fn to_matrix(flat: &[f64], n: usize) -> SubstMatrix {
    SubstMatrix::from_row_slice(n, n, flat)
}

fn reconstruct(eigen: &EigenDecomposition, time: f64) -> SubstMatrix {
    let n = eigen.state_count();
    let vectors = to_matrix(&eigen.vectors, n);
    let inverse = to_matrix(&eigen.inverse_vectors, n);
    let exp_values = SubstMatrix::from_diagonal(&FreqVector::from_iterator(
        n,
        eigen.values.iter().map(|l| (l * time).exp()),
    ));
    vectors * exp_values * inverse
}

fn model(model_type: DNAModelType, params: &[f64]) -> DNASubstModel {
    DNASubstModel::new(model_type, params).unwrap()
}

#[test]
fn jc69_rate_matrix() {
    let jc69 = model(DNAModelType::JC69, &[]);
    for i in 0..4 {
        for j in 0..4 {
            let expected = if i == j { -1.0 } else { 1.0 / 3.0 };
            assert_relative_eq!(jc69.rate(i, j), expected, epsilon = 1e-15);
        }
    }
    assert_eq!(jc69.freqs(), &frequencies!(&[0.25; 4]));
    assert_eq!(DNASubstModel::N, 4);
    assert_eq!(DNASubstModel::ALPHABET, b"ACGT");
}

#[rstest]
#[case(DNAModelType::JC69, &[])]
#[case(DNAModelType::K80, &[3.0])]
#[case(DNAModelType::K80, &[2.0, 0.5])]
#[case(DNAModelType::HKY, &HKY_PARAMS)]
#[case(DNAModelType::GTR, &GTR_PARAMS)]
fn rate_matrices_are_normalised_and_reversible(
    #[case] model_type: DNAModelType,
    #[case] params: &[f64],
) {
    let model = model(model_type, params);
    assert_relative_eq!(model.mean_rate(), 1.0, epsilon = 1e-12);
    let q = model.q();
    let pi = model.freqs();
    for i in 0..4 {
        assert_relative_eq!(q.row(i).sum(), 0.0, epsilon = 1e-12);
        for j in 0..4 {
            assert_relative_eq!(pi[i] * q[(i, j)], pi[j] * q[(j, i)], epsilon = 1e-12);
        }
    }
}

#[rstest]
#[case(DNAModelType::JC69, &[])]
#[case(DNAModelType::HKY, &HKY_PARAMS)]
#[case(DNAModelType::GTR, &GTR_PARAMS)]
fn eigen_decomposition_reconstructs_the_model(
    #[case] model_type: DNAModelType,
    #[case] params: &[f64],
) {
    let model = model(model_type, params);
    let eigen = model.eigen().unwrap();
    assert_eq!(eigen.state_count(), 4);
    let vectors = to_matrix(&eigen.vectors, 4);
    let inverse = to_matrix(&eigen.inverse_vectors, 4);
    assert!((vectors * inverse).relative_eq(&SubstMatrix::identity(4, 4), 1e-12, 1e-12));
    for time in [0.0, 0.1, 1.3] {
        assert!(reconstruct(&eigen, time).relative_eq(&model.p(time), 1e-10, 1e-10));
    }
}

#[test]
fn jc69_eigenvalues() {
    let eigen = model(DNAModelType::JC69, &[]).eigen().unwrap();
    let mut values = eigen.values.clone();
    values.sort_by(|a, b| a.total_cmp(b));
    let expected = [-4.0 / 3.0, -4.0 / 3.0, -4.0 / 3.0, 0.0];
    for (value, expected) in values.iter().zip(expected) {
        assert_relative_eq!(*value, expected, epsilon = 1e-12);
    }
}

#[rstest]
#[case(0.0)]
#[case(0.1)]
#[case(2.0)]
fn jc69_transition_probabilities(#[case] time: f64) {
    let p = model(DNAModelType::JC69, &[]).p(time);
    let same = 0.25 + 0.75 * (-4.0 * time / 3.0).exp();
    let different = 0.25 - 0.25 * (-4.0 * time / 3.0).exp();
    for i in 0..4 {
        assert_relative_eq!(p.row(i).sum(), 1.0, epsilon = 1e-12);
        for j in 0..4 {
            let expected = if i == j { same } else { different };
            assert_relative_eq!(p[(i, j)], expected, epsilon = 1e-12);
        }
    }
}

#[test]
fn kappa_scales_transitions() {
    let k80 = model(DNAModelType::K80, &[4.0]);
    // A->G and C->T are transitions
    assert_relative_eq!(k80.rate(0, 2) / k80.rate(0, 1), 4.0, epsilon = 1e-12);
    assert_relative_eq!(k80.rate(1, 3) / k80.rate(1, 2), 4.0, epsilon = 1e-12);

    let hky = model(DNAModelType::HKY, &HKY_PARAMS);
    assert_relative_eq!(
        hky.rate(0, 2) / hky.rate(0, 3),
        2.5 * 0.2 / 0.3,
        epsilon = 1e-12
    );
}

#[test]
fn gtr_rates_follow_acgt_order() {
    let gtr = model(DNAModelType::GTR, &GTR_PARAMS);
    let pi = [0.1, 0.2, 0.3, 0.4];
    // q_ij / pi_j recovers the exchangeabilities up to the normalising constant
    let scale = gtr.rate(0, 1) / pi[1] / 1.5;
    assert_relative_eq!(gtr.rate(0, 2) / pi[2], 4.0 * scale, epsilon = 1e-12);
    assert_relative_eq!(gtr.rate(0, 3) / pi[3], 0.7 * scale, epsilon = 1e-12);
    assert_relative_eq!(gtr.rate(1, 2) / pi[2], 1.2 * scale, epsilon = 1e-12);
    assert_relative_eq!(gtr.rate(1, 3) / pi[3], 3.5 * scale, epsilon = 1e-12);
    assert_relative_eq!(gtr.rate(2, 3) / pi[3], 1.0 * scale, epsilon = 1e-12);
    let flat: Vec<f64> = gtr.params().clone().into();
    assert_eq!(flat, GTR_PARAMS.to_vec());
}

#[rstest]
#[case(DNAModelType::HKY, &[0.25, 0.25, 0.25, 0.25])]
#[case(DNAModelType::HKY, &[0.5, 0.1, 0.1, 0.2, 2.0])]
#[case(DNAModelType::HKY, &[0.25, 0.25, 0.25, 0.25, -2.0])]
#[case(DNAModelType::GTR, &[0.25, 0.25, 0.25, 0.25, 1.0])]
#[case(DNAModelType::GTR, &[0.0, 0.5, 0.25, 0.25, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0])]
#[case(DNAModelType::K80, &[0.0])]
fn invalid_parameters_are_rejected(#[case] model_type: DNAModelType, #[case] params: &[f64]) {
    assert!(DNASubstModel::new(model_type, params).is_err());
}

#[rstest]
#[case("jc69", DNAModelType::JC69)]
#[case("K80", DNAModelType::K80)]
#[case("hky", DNAModelType::HKY)]
#[case("GTR", DNAModelType::GTR)]
#[case("WAG", DNAModelType::GTR)]
fn model_names(#[case] name: &str, #[case] expected: DNAModelType) {
    assert_eq!(DNAModelType::get_model_type(name), expected);
}

#[test]
fn frequencies_can_be_replaced() {
    let f81 = model(DNAModelType::JC69, &[])
        .with_frequencies(&[0.1, 0.2, 0.3, 0.4])
        .unwrap();
    assert_eq!(f81.freqs(), &frequencies!(&[0.1, 0.2, 0.3, 0.4]));
    assert_eq!(f81.model_type(), DNAModelType::JC69);
    assert_relative_eq!(f81.mean_rate(), 1.0, epsilon = 1e-12);
    assert!(model(DNAModelType::K80, &[2.0])
        .with_frequencies(&[0.5, 0.5, 0.5, 0.5])
        .is_err());
}

#[test]
fn eigen_needs_positive_frequencies() {
    let q = model(DNAModelType::JC69, &[]).q().clone();
    assert!(reversible_eigen(&q, &frequencies!(&[0.5, 0.5, 0.0, 0.0])).is_err());
    assert!(reversible_eigen(&q, &frequencies!(&[0.5, 0.5])).is_err());
}
