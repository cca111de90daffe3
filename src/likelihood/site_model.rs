use std::f64::consts::PI;
use std::fmt::Display;

use anyhow::bail;
use log::info;

use crate::Result;

pub(crate) struct SiteModelError {
    pub(crate) message: String,
}
impl std::fmt::Debug for SiteModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl Display for SiteModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl std::error::Error for SiteModelError {}

/// Rate heterogeneity across sites as a discrete mixture: site rates are multiplied by
/// `rates[c]` with probability `weights[c]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteModel {
    rates: Vec<f64>,
    weights: Vec<f64>,
}

impl Default for SiteModel {
    fn default() -> Self {
        SiteModel {
            rates: vec![1.0],
            weights: vec![1.0],
        }
    }
}

impl Display for SiteModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[rates = {:?}, weights = {:?}]", self.rates, self.weights)
    }
}

impl SiteModel {
    /// Explicit categories. Weights are rescaled to sum to one.
    ///
    /// # Example
    /// ```
    /// use phylo_beagle::likelihood::SiteModel;
    /// let site_model = SiteModel::new(&[0.5, 1.5], &[1.0, 1.0]).unwrap();
    /// assert_eq!(site_model.weights(), &[0.5, 0.5]);
    /// assert_eq!(site_model.mean_rate(), 1.0);
    /// ```
    pub fn new(rates: &[f64], weights: &[f64]) -> Result<Self> {
        if rates.is_empty() || rates.len() != weights.len() {
            bail!(SiteModelError {
                message: format!(
                    "Need the same non-zero number of category rates and weights, got {} and {}",
                    rates.len(),
                    weights.len()
                )
            });
        }
        if rates.iter().any(|&r| !(r >= 0.0 && r.is_finite())) {
            bail!(SiteModelError {
                message: format!("Category rates have to be non-negative, got {:?}", rates)
            });
        }
        if weights.iter().any(|&w| !(w >= 0.0 && w.is_finite())) {
            bail!(SiteModelError {
                message: format!("Category weights have to be non-negative, got {:?}", weights)
            });
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            bail!(SiteModelError {
                message: String::from("Category weights sum to zero")
            });
        }
        Ok(SiteModel {
            rates: rates.to_vec(),
            weights: weights.iter().map(|w| w / total).collect(),
        })
    }

    /// Discrete gamma rates taken at the median of `categories` equiprobable bins, plus
    /// an extra zero-rate category when `prop_invariant` is positive. Rates are normalised
    /// to a mean of one.
    pub fn gamma(shape: f64, categories: usize, prop_invariant: f64) -> Result<Self> {
        if !(shape > 0.0 && shape.is_finite()) {
            bail!(SiteModelError {
                message: format!("Gamma shape has to be positive, got {}", shape)
            });
        }
        if categories == 0 {
            bail!(SiteModelError {
                message: String::from("Need at least one gamma category")
            });
        }
        check_invariant(prop_invariant)?;

        let variable = 1.0 - prop_invariant;
        let mut rates = Vec::with_capacity(categories + 1);
        let mut weights = Vec::with_capacity(categories + 1);
        if prop_invariant > 0.0 {
            rates.push(0.0);
            weights.push(prop_invariant);
        }
        let quantiles: Vec<f64> = (0..categories)
            .map(|i| gamma_quantile((2 * i + 1) as f64 / (2 * categories) as f64, shape) / shape)
            .collect();
        let mean = variable * quantiles.iter().sum::<f64>() / categories as f64;
        rates.extend(quantiles.iter().map(|q| q / mean));
        weights.extend(std::iter::repeat_n(variable / categories as f64, categories));

        let site_model = SiteModel { rates, weights };
        info!("Using discrete gamma site model {}", site_model);
        Ok(site_model)
    }

    /// A share of invariable sites and a single rate for the rest.
    pub fn invariant(prop_invariant: f64) -> Result<Self> {
        check_invariant(prop_invariant)?;
        if prop_invariant == 0.0 {
            return Ok(SiteModel::default());
        }
        Ok(SiteModel {
            rates: vec![0.0, 1.0 / (1.0 - prop_invariant)],
            weights: vec![prop_invariant, 1.0 - prop_invariant],
        })
    }

    pub fn category_count(&self) -> usize {
        self.rates.len()
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn mean_rate(&self) -> f64 {
        self.rates
            .iter()
            .zip(self.weights.iter())
            .map(|(r, w)| r * w)
            .sum()
    }
}

fn check_invariant(prop_invariant: f64) -> Result<()> {
    if !(0.0..1.0).contains(&prop_invariant) {
        bail!(SiteModelError {
            message: format!(
                "Proportion of invariable sites has to be in [0, 1), got {}",
                prop_invariant
            )
        });
    }
    Ok(())
}

const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

pub(crate) fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let sum = LANCZOS
        .iter()
        .enumerate()
        .skip(1)
        .fold(LANCZOS[0], |acc, (i, c)| acc + c / (x + i as f64));
    let t = x + 7.5;
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

/// Regularised lower incomplete gamma function `P(a, x)`.
pub(crate) fn regularized_gamma_p(a: f64, x: f64) -> f64 {
    const EPS: f64 = 1e-15;
    const MAX_ITERATIONS: usize = 1000;
    const TINY: f64 = 1e-300;
    if x <= 0.0 {
        return 0.0;
    }
    let prefactor = (-x + a * x.ln() - ln_gamma(a)).exp();
    if x < a + 1.0 {
        let mut term = 1.0 / a;
        let mut sum = term;
        let mut ap = a;
        for _ in 0..MAX_ITERATIONS {
            ap += 1.0;
            term *= x / ap;
            sum += term;
            if term.abs() < sum.abs() * EPS {
                break;
            }
        }
        (sum * prefactor).min(1.0)
    } else {
        // continued fraction for Q(a, x), modified Lentz
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / TINY;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..MAX_ITERATIONS {
            let an = -(i as f64) * (i as f64 - a);
            b += 2.0;
            d = an * d + b;
            if d.abs() < TINY {
                d = TINY;
            }
            c = b + an / c;
            if c.abs() < TINY {
                c = TINY;
            }
            d = 1.0 / d;
            let delta = d * c;
            h *= delta;
            if (delta - 1.0).abs() < EPS {
                break;
            }
        }
        (1.0 - prefactor * h).max(0.0)
    }
}

/// Quantile of the unit-scale gamma distribution with shape `a`, by bisection.
pub(crate) fn gamma_quantile(p: f64, a: f64) -> f64 {
    let mut lo = 0.0;
    let mut hi = a.max(1.0);
    while regularized_gamma_p(a, hi) < p {
        lo = hi;
        hi *= 2.0;
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if regularized_gamma_p(a, mid) < p {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= 1e-15 * hi {
            break;
        }
    }
    0.5 * (lo + hi)
}
