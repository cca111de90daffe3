use approx::assert_relative_eq;
use rstest::rstest;

use crate::coalescent::population::{
    check_consistency, interval_from_uniform, median_interval, ConstantPopulation,
    ExponentialGrowth, PopulationError, PopulationFunction,
};

/// Size that doubles every time unit into the past, with a broken inverse.
struct Inconsistent;

impl PopulationFunction for Inconsistent {
    fn pop_size(&self, t: f64) -> f64 {
        2f64.powf(t)
    }

    fn intensity(&self, t: f64) -> f64 {
        t
    }

    fn inverse_intensity(&self, x: f64) -> f64 {
        x * 1.001
    }
}

#[test]
fn constant_population_closed_forms() {
    let pop = ConstantPopulation::new(4.0).unwrap();
    assert_eq!(pop.pop_size(123.0), 4.0);
    assert_eq!(pop.intensity(2.0), 0.5);
    assert_eq!(pop.inverse_intensity(0.5), 2.0);
    assert_eq!(pop.integral(1.0, 3.0), 0.5);
    assert_eq!(pop.threshold(), 0.0);
}

#[rstest]
#[case(0.0)]
#[case(-1.0)]
#[case(f64::NAN)]
#[case(f64::INFINITY)]
fn population_size_must_be_positive(#[case] n0: f64) {
    let err = ConstantPopulation::new(n0).unwrap_err();
    assert!(err.downcast_ref::<PopulationError>().is_some());
    assert!(ExponentialGrowth::new(n0, 0.1).is_err());
}

#[test]
fn growth_rate_must_be_finite() {
    assert!(ExponentialGrowth::new(1.0, f64::NAN).is_err());
}

#[test]
fn exponential_growth_closed_forms() {
    let pop = ExponentialGrowth::new(10.0, 0.5).unwrap();
    assert_relative_eq!(pop.pop_size(2.0), 10.0 * (-1.0_f64).exp());
    assert_relative_eq!(pop.intensity(2.0), (1.0_f64.exp() - 1.0) / 5.0);
    assert_relative_eq!(pop.integral(1.0, 2.0), pop.intensity(2.0) - pop.intensity(1.0));
    assert_relative_eq!(pop.inverse_intensity(pop.intensity(3.0)), 3.0, epsilon = 1e-12);
}

#[test]
fn zero_growth_is_constant() {
    let growth = ExponentialGrowth::new(3.0, 0.0).unwrap();
    let constant = ConstantPopulation::new(3.0).unwrap();
    for t in [0.0, 0.7, 5.0] {
        assert_eq!(growth.pop_size(t), constant.pop_size(t));
        assert_eq!(growth.intensity(t), constant.intensity(t));
        assert_eq!(growth.inverse_intensity(t), constant.inverse_intensity(t));
        assert_eq!(growth.integral(0.0, t), constant.integral(0.0, t));
    }
}

#[rstest]
#[case(0.0, 1.0)]
#[case(0.5, 4.0)]
#[case(2.0, 2.5)]
fn numerical_integral_matches_closed_form(#[case] start: f64, #[case] finish: f64) {
    let pop = ExponentialGrowth::new(2.0, 0.8).unwrap();
    assert_relative_eq!(
        pop.numerical_integral(start, finish).unwrap(),
        pop.integral(start, finish),
        max_relative = 1e-5
    );
}

#[test]
fn numerical_integral_bounds() {
    let pop = ConstantPopulation::new(2.0).unwrap();
    assert_eq!(pop.numerical_integral(1.0, 1.0).unwrap(), 0.0);
    assert!(pop.numerical_integral(2.0, 1.0).is_err());
    assert_relative_eq!(pop.numerical_integral(0.0, 3.0).unwrap(), 1.5);
}

#[test]
fn median_interval_of_constant_population() {
    let pop = ConstantPopulation::new(2.0).unwrap();
    // P(T > t) = exp(-C(k,2) t / N)
    assert_relative_eq!(median_interval(&pop, 4, 0.0), 2.0 * 2f64.ln() / 6.0);
    assert_relative_eq!(median_interval(&pop, 4, 7.0), 2.0 * 2f64.ln() / 6.0, epsilon = 1e-12);
    assert_eq!(interval_from_uniform(1.0, &pop, 2, 0.0), 0.0);
}

#[test]
fn median_interval_shrinks_with_growth_into_the_past() {
    let constant = ConstantPopulation::new(1.0).unwrap();
    let shrinking = ExponentialGrowth::new(1.0, 1.0).unwrap();
    assert!(median_interval(&shrinking, 2, 0.0) < median_interval(&constant, 2, 0.0));
}

#[test]
fn declining_population_can_fail_to_coalesce() {
    let pop = ExponentialGrowth::new(1.0, -10.0).unwrap();
    assert!(interval_from_uniform(0.01, &pop, 2, 0.0).is_nan());
}

#[rstest]
#[case(1.0, 0.1, 10.0)]
#[case(100.0, 2.0, 5.0)]
#[case(5.0, 0.0, 50.0)]
fn intensity_and_inverse_are_consistent(#[case] n0: f64, #[case] r: f64, #[case] max: f64) {
    let pop = ExponentialGrowth::new(n0, r).unwrap();
    check_consistency(&pop, 100, max).unwrap();
}

#[test]
fn inconsistent_inverse_is_reported() {
    let err = check_consistency(&Inconsistent, 10, 1.0).unwrap_err();
    assert!(err.downcast_ref::<PopulationError>().is_some());
    assert_eq!(Inconsistent.integral(0.0, 2.0), 2.0);
}
