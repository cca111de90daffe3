use lazy_static::lazy_static;

pub const SCALING_FACTOR_COUNT: usize = 254;
pub const SCALING_FACTOR_OFFSET: i32 = 126;
pub const DEFAULT_EXPONENT_THRESHOLD: u32 = 2;

const MIN_EXPONENT: i32 = SCALING_FACTOR_OFFSET - SCALING_FACTOR_COUNT as i32 + 1;
const MAX_EXPONENT: i32 = SCALING_FACTOR_OFFSET;

/// Power-of-two scale factors `2^(i - 126)` and their natural logarithms.
pub struct ScaleTable {
    pub factors: [f64; SCALING_FACTOR_COUNT],
    pub log_factors: [f64; SCALING_FACTOR_COUNT],
}

lazy_static! {
    pub static ref SCALE_TABLE: ScaleTable = {
        let mut factors = [0.0; SCALING_FACTOR_COUNT];
        let mut log_factors = [0.0; SCALING_FACTOR_COUNT];
        for i in 0..SCALING_FACTOR_COUNT {
            let power = i as i32 - SCALING_FACTOR_OFFSET;
            factors[i] = 2.0_f64.powi(power);
            log_factors[i] = power as f64 * std::f64::consts::LN_2;
        }
        ScaleTable {
            factors,
            log_factors,
        }
    };
}

/// Unbiased binary exponent of `x`, read straight from the IEEE-754 bit pattern.
/// Zero and subnormals give -1023, infinities and NaN give 1024.
pub fn exponent(x: f64) -> i32 {
    ((x.to_bits() >> 52) & 0x7ff) as i32 - 1023
}

/// Contribution of one written value to a kernel's exponent flag.
#[inline(always)]
pub(crate) fn exponent_flag(x: f64) -> u32 {
    exponent(x).unsigned_abs()
}

/// Table index of the factor that brings a pattern whose largest value is `max` back to
/// an exponent of zero, or `None` when the pattern must be left alone.
pub fn factor_index(max: f64) -> Option<usize> {
    if !max.is_finite() || max <= 0.0 {
        return None;
    }
    let e = exponent(max).clamp(MIN_EXPONENT, MAX_EXPONENT);
    if e == 0 {
        return None;
    }
    Some((SCALING_FACTOR_OFFSET - e) as usize)
}

/// Table index matching a log factor previously produced by [`rescale`].
pub fn index_of_log_factor(log_factor: f64) -> usize {
    let power = (log_factor / std::f64::consts::LN_2).round() as i32;
    (power + SCALING_FACTOR_OFFSET).clamp(0, SCALING_FACTOR_COUNT as i32 - 1) as usize
}

/// Layout of a partials buffer as the scaling code sees it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScaleDims {
    pub(crate) categories: usize,
    pub(crate) patterns: usize,
    pub(crate) states: usize,
}

/// Per-buffer scaling records updated by a rescale.
pub(crate) struct ScaleLedger<'a> {
    pub(crate) counts: &'a mut [f64],
    pub(crate) site_log_factors: &'a mut [f64],
}

impl ScaleLedger<'_> {
    fn record(&mut self, pattern: usize, index: usize, weight: f64) {
        self.counts[index] += weight;
        self.site_log_factors[pattern] += SCALE_TABLE.log_factors[index];
    }
}

fn multiply_pattern(partials: &mut [f64], dims: ScaleDims, pattern: usize, factor: f64) {
    let category_size = dims.patterns * dims.states;
    for c in 0..dims.categories {
        let start = c * category_size + pattern * dims.states;
        partials[start..start + dims.states]
            .iter_mut()
            .for_each(|v| *v *= factor);
    }
}

/// Rescales every pattern of `partials` by the power of two that brings its largest
/// value (over all categories) to exponent zero. The log factor applied to each pattern
/// is written to `applied`, zero for patterns that were left untouched.
pub(crate) fn rescale(
    partials: &mut [f64],
    dims: ScaleDims,
    pattern_weights: &[f64],
    ledger: &mut ScaleLedger,
    applied: &mut [f64],
) {
    let category_size = dims.patterns * dims.states;
    for k in 0..dims.patterns {
        let mut max = f64::NEG_INFINITY;
        for c in 0..dims.categories {
            let start = c * category_size + k * dims.states;
            for &v in &partials[start..start + dims.states] {
                if v > max {
                    max = v;
                }
            }
        }
        applied[k] = 0.0;
        let Some(index) = factor_index(max) else {
            continue;
        };
        multiply_pattern(partials, dims, k, SCALE_TABLE.factors[index]);
        ledger.record(k, index, pattern_weights[k]);
        applied[k] = SCALE_TABLE.log_factors[index];
    }
}

/// Re-applies per-pattern log factors recorded by an earlier rescale.
pub(crate) fn apply_recorded(
    partials: &mut [f64],
    dims: ScaleDims,
    recorded: &[f64],
    pattern_weights: &[f64],
    ledger: &mut ScaleLedger,
    applied: &mut [f64],
) {
    for k in 0..dims.patterns {
        applied[k] = 0.0;
        if recorded[k] == 0.0 {
            continue;
        }
        let index = index_of_log_factor(recorded[k]);
        multiply_pattern(partials, dims, k, SCALE_TABLE.factors[index]);
        ledger.record(k, index, pattern_weights[k]);
        applied[k] = SCALE_TABLE.log_factors[index];
    }
}

/// Total log factor recorded in a histogram, to be subtracted from a summed log-likelihood.
pub fn histogram_log_correction(counts: &[f64]) -> f64 {
    counts
        .iter()
        .zip(SCALE_TABLE.log_factors.iter())
        .filter(|(&count, _)| count != 0.0)
        .map(|(&count, &log_factor)| count * log_factor)
        .sum()
}
