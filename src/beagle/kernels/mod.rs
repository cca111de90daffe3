//! Post-order combination kernels.
//!
//! Each kernel writes the conditional likelihoods of a parent buffer from two children and
//! their transition matrices. Buffers are laid out `[category][pattern][state]`, matrices
//! `[category][parent state][child state]`. Kernels return an exponent flag: the bitwise OR of
//! the absolute binary exponents of every value written, used to decide whether the parent
//! needs rescaling.
use crate::beagle::scaling::exponent_flag;

mod four_state;

/// Kernel family used by an instance, picked once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelVariant {
    General,
    FourState,
}

impl KernelVariant {
    pub fn for_state_count(state_count: usize) -> Self {
        if state_count == 4 {
            KernelVariant::FourState
        } else {
            KernelVariant::General
        }
    }

    pub(crate) fn states_states(
        &self,
        dims: KernelDims,
        states1: &[usize],
        matrix1: &[f64],
        states2: &[usize],
        matrix2: &[f64],
        dest: &mut [f64],
    ) -> u32 {
        match self {
            KernelVariant::General => states_states(dims, states1, matrix1, states2, matrix2, dest),
            KernelVariant::FourState => {
                four_state::states_states(dims, states1, matrix1, states2, matrix2, dest)
            }
        }
    }

    pub(crate) fn states_partials(
        &self,
        dims: KernelDims,
        states1: &[usize],
        matrix1: &[f64],
        partials2: &[f64],
        matrix2: &[f64],
        dest: &mut [f64],
    ) -> u32 {
        match self {
            KernelVariant::General => {
                states_partials(dims, states1, matrix1, partials2, matrix2, dest)
            }
            KernelVariant::FourState => {
                four_state::states_partials(dims, states1, matrix1, partials2, matrix2, dest)
            }
        }
    }

    pub(crate) fn partials_partials(
        &self,
        dims: KernelDims,
        partials1: &[f64],
        matrix1: &[f64],
        partials2: &[f64],
        matrix2: &[f64],
        dest: &mut [f64],
    ) -> u32 {
        match self {
            KernelVariant::General => {
                partials_partials(dims, partials1, matrix1, partials2, matrix2, dest)
            }
            KernelVariant::FourState => {
                four_state::partials_partials(dims, partials1, matrix1, partials2, matrix2, dest)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct KernelDims {
    pub(crate) categories: usize,
    pub(crate) patterns: usize,
    pub(crate) states: usize,
}

impl KernelDims {
    fn matrix_size(&self) -> usize {
        self.states * self.states
    }
}

fn states_states(
    dims: KernelDims,
    states1: &[usize],
    matrix1: &[f64],
    states2: &[usize],
    matrix2: &[f64],
    dest: &mut [f64],
) -> u32 {
    let n = dims.states;
    let mut v = 0;
    for c in 0..dims.categories {
        for k in 0..dims.patterns {
            let (s1, s2) = (states1[k], states2[k]);
            let mut w = c * dims.matrix_size();
            for _ in 0..n {
                let left = if s1 < n { matrix1[w + s1] } else { 1.0 };
                let right = if s2 < n { matrix2[w + s2] } else { 1.0 };
                dest[v] = left * right;
                v += 1;
                w += n;
            }
        }
    }
    0
}

fn states_partials(
    dims: KernelDims,
    states1: &[usize],
    matrix1: &[f64],
    partials2: &[f64],
    matrix2: &[f64],
    dest: &mut [f64],
) -> u32 {
    let n = dims.states;
    let mut flag = 0;
    let mut u = 0;
    for c in 0..dims.categories {
        for k in 0..dims.patterns {
            let s1 = states1[k];
            let child = &partials2[u..u + n];
            let mut w = c * dims.matrix_size();
            for i in 0..n {
                let tip = if s1 < n { matrix1[w + s1] } else { 1.0 };
                let mut sum = 0.0;
                for j in 0..n {
                    sum += matrix2[w + j] * child[j];
                }
                dest[u + i] = tip * sum;
                flag |= exponent_flag(dest[u + i]);
                w += n;
            }
            u += n;
        }
    }
    flag
}

fn partials_partials(
    dims: KernelDims,
    partials1: &[f64],
    matrix1: &[f64],
    partials2: &[f64],
    matrix2: &[f64],
    dest: &mut [f64],
) -> u32 {
    let n = dims.states;
    let mut flag = 0;
    let mut u = 0;
    for c in 0..dims.categories {
        for _ in 0..dims.patterns {
            let (left, right) = (&partials1[u..u + n], &partials2[u..u + n]);
            let mut w = c * dims.matrix_size();
            for i in 0..n {
                let mut sum1 = 0.0;
                let mut sum2 = 0.0;
                for j in 0..n {
                    sum1 += matrix1[w + j] * left[j];
                    sum2 += matrix2[w + j] * right[j];
                }
                dest[u + i] = sum1 * sum2;
                flag |= exponent_flag(dest[u + i]);
                w += n;
            }
            u += n;
        }
    }
    flag
}

#[cfg(test)]
mod tests;
