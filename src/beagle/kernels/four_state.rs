//! Nucleotide kernels with the inner state loops unrolled. Sums are accumulated in the
//! same order as the general kernels so both variants produce identical values.
use super::KernelDims;
use crate::beagle::scaling::exponent_flag;

const STATES: usize = 4;
const MATRIX_SIZE: usize = STATES * STATES;

#[inline(always)]
fn row_dot(matrix: &[f64], row: usize, p: &[f64]) -> f64 {
    matrix[row] * p[0] + matrix[row + 1] * p[1] + matrix[row + 2] * p[2] + matrix[row + 3] * p[3]
}

#[inline(always)]
fn tip_column(matrix: &[f64], w: usize, state: usize) -> [f64; STATES] {
    if state < STATES {
        [
            matrix[w + state],
            matrix[w + 4 + state],
            matrix[w + 8 + state],
            matrix[w + 12 + state],
        ]
    } else {
        [1.0; STATES]
    }
}

pub(super) fn states_states(
    dims: KernelDims,
    states1: &[usize],
    matrix1: &[f64],
    states2: &[usize],
    matrix2: &[f64],
    dest: &mut [f64],
) -> u32 {
    let mut u = 0;
    for c in 0..dims.categories {
        let w = c * MATRIX_SIZE;
        for k in 0..dims.patterns {
            let left = tip_column(matrix1, w, states1[k]);
            let right = tip_column(matrix2, w, states2[k]);
            dest[u] = left[0] * right[0];
            dest[u + 1] = left[1] * right[1];
            dest[u + 2] = left[2] * right[2];
            dest[u + 3] = left[3] * right[3];
            u += STATES;
        }
    }
    0
}

pub(super) fn states_partials(
    dims: KernelDims,
    states1: &[usize],
    matrix1: &[f64],
    partials2: &[f64],
    matrix2: &[f64],
    dest: &mut [f64],
) -> u32 {
    let mut flag = 0;
    let mut u = 0;
    for c in 0..dims.categories {
        let w = c * MATRIX_SIZE;
        for k in 0..dims.patterns {
            let tip = tip_column(matrix1, w, states1[k]);
            let child = &partials2[u..u + STATES];
            let out = &mut dest[u..u + STATES];
            out[0] = tip[0] * row_dot(matrix2, w, child);
            out[1] = tip[1] * row_dot(matrix2, w + 4, child);
            out[2] = tip[2] * row_dot(matrix2, w + 8, child);
            out[3] = tip[3] * row_dot(matrix2, w + 12, child);
            flag |= exponent_flag(out[0])
                | exponent_flag(out[1])
                | exponent_flag(out[2])
                | exponent_flag(out[3]);
            u += STATES;
        }
    }
    flag
}

pub(super) fn partials_partials(
    dims: KernelDims,
    partials1: &[f64],
    matrix1: &[f64],
    partials2: &[f64],
    matrix2: &[f64],
    dest: &mut [f64],
) -> u32 {
    let mut flag = 0;
    let mut u = 0;
    for c in 0..dims.categories {
        let w = c * MATRIX_SIZE;
        for _ in 0..dims.patterns {
            let left = &partials1[u..u + STATES];
            let right = &partials2[u..u + STATES];
            let out = &mut dest[u..u + STATES];
            out[0] = row_dot(matrix1, w, left) * row_dot(matrix2, w, right);
            out[1] = row_dot(matrix1, w + 4, left) * row_dot(matrix2, w + 4, right);
            out[2] = row_dot(matrix1, w + 8, left) * row_dot(matrix2, w + 8, right);
            out[3] = row_dot(matrix1, w + 12, left) * row_dot(matrix2, w + 12, right);
            flag |= exponent_flag(out[0])
                | exponent_flag(out[1])
                | exponent_flag(out[2])
                | exponent_flag(out[3]);
            u += STATES;
        }
    }
    flag
}
