use std::fmt;

use anyhow::bail;
use rand::Rng;

use crate::coalescent::choose2;
use crate::Result;

/// Relative accuracy at which the Romberg iteration stops.
const ROMBERG_RELATIVE_ACCURACY: f64 = 1e-6;
const ROMBERG_ABSOLUTE_ACCURACY: f64 = 1e-15;
const ROMBERG_MIN_ITERATIONS: usize = 3;
const ROMBERG_MAX_ITERATIONS: usize = 20;
/// Largest accepted difference between `t` and `inverse_intensity(intensity(t))`.
const CONSISTENCY_TOLERANCE: f64 = 1e-12;

pub(crate) struct PopulationError {
    pub(crate) message: String,
}

impl fmt::Debug for PopulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for PopulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PopulationError {}

/// Effective population size as a function of time before the present. Time zero is the
/// most recent sample and time grows towards the root.
pub trait PopulationFunction {
    /// Population size `N(t)`.
    fn pop_size(&self, t: f64) -> f64;

    /// Coalescent intensity `∫_0^t 1/N(x) dx`.
    fn intensity(&self, t: f64) -> f64;

    /// Time at which the intensity reaches `x`.
    fn inverse_intensity(&self, x: f64) -> f64;

    /// `∫_start^finish 1/N(x) dx`.
    fn integral(&self, start: f64, finish: f64) -> f64 {
        self.intensity(finish) - self.intensity(start)
    }

    /// Smallest ratio between the population size at a coalescence and the mean size over
    /// its interval that a model accepts.
    fn threshold(&self) -> f64 {
        0.0
    }

    /// Romberg integration of `1/N(x)` over `[start, finish]`, for models without a
    /// closed form intensity.
    fn numerical_integral(&self, start: f64, finish: f64) -> Result<f64> {
        if start > finish {
            bail!(PopulationError {
                message: format!(
                    "Integration start {} lies after its finish {}",
                    start, finish
                )
            });
        }
        if start == finish {
            return Ok(0.0);
        }
        romberg(|t| 1.0 / self.pop_size(t), start, finish)
    }
}

fn romberg<F: Fn(f64) -> f64>(f: F, a: f64, b: f64) -> Result<f64> {
    let mut previous = vec![0.5 * (b - a) * (f(a) + f(b))];
    let mut trapezoid = previous[0];
    let mut estimate = trapezoid;
    for i in 1..=ROMBERG_MAX_ITERATIONS {
        // refine the trapezoid rule with the midpoints of the previous stage
        let points = 1usize << (i - 1);
        let spacing = (b - a) / points as f64;
        let midpoints: f64 = (0..points)
            .map(|k| f(a + (k as f64 + 0.5) * spacing))
            .sum();
        trapezoid = 0.5 * (trapezoid + spacing * midpoints);

        let mut current = Vec::with_capacity(i + 1);
        current.push(trapezoid);
        for j in 1..=i {
            let factor = 4f64.powi(j as i32) - 1.0;
            current.push(current[j - 1] + (current[j - 1] - previous[j - 1]) / factor);
        }
        let refined = current[i];
        if i >= ROMBERG_MIN_ITERATIONS {
            let delta = (refined - estimate).abs();
            let limit = ROMBERG_RELATIVE_ACCURACY * (estimate.abs() + refined.abs()) * 0.5;
            if delta <= limit || delta <= ROMBERG_ABSOLUTE_ACCURACY {
                return Ok(refined);
            }
        }
        estimate = refined;
        previous = current;
    }
    bail!(PopulationError {
        message: format!(
            "Romberg integration over [{}, {}] did not converge in {} iterations",
            a, b, ROMBERG_MAX_ITERATIONS
        )
    })
}

/// Population of constant size `N0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantPopulation {
    n0: f64,
}

impl ConstantPopulation {
    pub fn new(n0: f64) -> Result<Self> {
        check_population_size(n0)?;
        Ok(Self { n0 })
    }

    pub fn n0(&self) -> f64 {
        self.n0
    }
}

impl PopulationFunction for ConstantPopulation {
    fn pop_size(&self, _t: f64) -> f64 {
        self.n0
    }

    fn intensity(&self, t: f64) -> f64 {
        t / self.n0
    }

    fn inverse_intensity(&self, x: f64) -> f64 {
        self.n0 * x
    }

    fn integral(&self, start: f64, finish: f64) -> f64 {
        (finish - start) / self.n0
    }
}

/// Population growing exponentially towards the present, `N(t) = N0 e^{-rt}`. A zero
/// growth rate is a constant population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialGrowth {
    n0: f64,
    growth_rate: f64,
}

impl ExponentialGrowth {
    pub fn new(n0: f64, growth_rate: f64) -> Result<Self> {
        check_population_size(n0)?;
        if !growth_rate.is_finite() {
            bail!(PopulationError {
                message: format!("Growth rate must be finite, got {}", growth_rate)
            });
        }
        Ok(Self { n0, growth_rate })
    }

    pub fn n0(&self) -> f64 {
        self.n0
    }

    pub fn growth_rate(&self) -> f64 {
        self.growth_rate
    }
}

impl PopulationFunction for ExponentialGrowth {
    fn pop_size(&self, t: f64) -> f64 {
        let r = self.growth_rate;
        if r == 0.0 {
            self.n0
        } else {
            self.n0 * (-t * r).exp()
        }
    }

    fn intensity(&self, t: f64) -> f64 {
        let r = self.growth_rate;
        if r == 0.0 {
            t / self.n0
        } else {
            ((t * r).exp() - 1.0) / self.n0 / r
        }
    }

    fn inverse_intensity(&self, x: f64) -> f64 {
        let r = self.growth_rate;
        if r == 0.0 {
            self.n0 * x
        } else {
            (1.0 + self.n0 * x * r).ln() / r
        }
    }

    fn integral(&self, start: f64, finish: f64) -> f64 {
        let r = self.growth_rate;
        if r == 0.0 {
            (finish - start) / self.n0
        } else {
            ((finish * r).exp() - (start * r).exp()) / self.n0 / r
        }
    }
}

fn check_population_size(n0: f64) -> Result<()> {
    if !(n0.is_finite() && n0 > 0.0) {
        bail!(PopulationError {
            message: format!("Population size must be positive and finite, got {}", n0)
        });
    }
    Ok(())
}

/// Waiting time until the next coalescence among `lineage_count` lineages starting at
/// `start_time`, for the quantile `u` of its distribution's upper tail.
pub fn interval_from_uniform<P: PopulationFunction + ?Sized>(
    u: f64,
    population: &P,
    lineage_count: usize,
    start_time: f64,
) -> f64 {
    let intensity = population.intensity(start_time);
    let target = -u.ln() / choose2(lineage_count) + intensity;
    population.inverse_intensity(target) - start_time
}

/// Random waiting time drawn from the coalescent prior of `population`.
pub fn simulated_interval<P: PopulationFunction + ?Sized, R: Rng>(
    population: &P,
    lineage_count: usize,
    start_time: f64,
    rng: &mut R,
) -> f64 {
    // (0, 1] keeps the logarithm finite
    let u = 1.0 - rng.gen::<f64>();
    interval_from_uniform(u, population, lineage_count, start_time)
}

pub fn median_interval<P: PopulationFunction + ?Sized>(
    population: &P,
    lineage_count: usize,
    start_time: f64,
) -> f64 {
    interval_from_uniform(0.5, population, lineage_count, start_time)
}

/// Checks that `inverse_intensity` undoes `intensity` at `steps + 1` evenly spaced times
/// in `[0, max_time]`.
pub fn check_consistency<P: PopulationFunction + ?Sized>(
    population: &P,
    steps: usize,
    max_time: f64,
) -> Result<()> {
    let delta = max_time / steps as f64;
    for i in 0..=steps {
        let time = i as f64 * delta;
        let recovered = population.inverse_intensity(population.intensity(time));
        let error = (time - recovered).abs();
        if error > CONSISTENCY_TOLERANCE || error.is_nan() {
            bail!(PopulationError {
                message: format!(
                    "Intensity and inverse intensity disagree at time {}, error size {}",
                    time, error
                )
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
