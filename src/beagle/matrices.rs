use crate::beagle::errors::{check_len, BeagleError};

/// Eigen system of a rate matrix stored as the precomputed tensor
/// `C[i][j][k] = V[i][k] * V⁻¹[k][j]` together with the eigenvalues.
#[derive(Debug, Clone, PartialEq)]
pub struct EigenBuffer {
    pub(crate) c_matrix: Vec<f64>,
    pub(crate) values: Vec<f64>,
}

impl EigenBuffer {
    /// Builds the buffer from row-major eigenvectors, inverse eigenvectors and eigenvalues.
    pub fn new(
        state_count: usize,
        vectors: &[f64],
        inverse_vectors: &[f64],
        values: &[f64],
    ) -> Result<Self, BeagleError> {
        let matrix_size = state_count * state_count;
        check_len("eigenvectors", matrix_size, vectors.len())?;
        check_len("inverse eigenvectors", matrix_size, inverse_vectors.len())?;
        check_len("eigenvalues", state_count, values.len())?;

        let mut c_matrix = Vec::with_capacity(matrix_size * state_count);
        for i in 0..state_count {
            for j in 0..state_count {
                for k in 0..state_count {
                    c_matrix.push(vectors[i * state_count + k] * inverse_vectors[k * state_count + j]);
                }
            }
        }
        Ok(Self {
            c_matrix,
            values: values.to_vec(),
        })
    }

    pub fn state_count(&self) -> usize {
        self.values.len()
    }
}

/// Which time derivative of `P(t)` to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatrixKind {
    Probability,
    FirstDerivative,
    SecondDerivative,
}

/// Fills `out` (`categories × n²`) with `P(t·r_c)` or one of its derivatives with respect
/// to `t`. Negative probabilities produced by round-off are clamped to zero; derivative
/// entries are signed and kept as computed.
pub(crate) fn fill_matrix(
    eigen: &EigenBuffer,
    kind: MatrixKind,
    edge_length: f64,
    category_rates: &[f64],
    out: &mut [f64],
) {
    let n = eigen.state_count();
    let mut exp_terms = vec![0.0; n];
    let mut entry = 0;
    for &rate in category_rates {
        for (term, &lambda) in exp_terms.iter_mut().zip(eigen.values.iter()) {
            let scaled = lambda * rate;
            let e = (lambda * edge_length * rate).exp();
            *term = match kind {
                MatrixKind::Probability => e,
                MatrixKind::FirstDerivative => scaled * e,
                MatrixKind::SecondDerivative => scaled * scaled * e,
            };
        }

        let mut c = 0;
        for _ in 0..n * n {
            let mut sum = 0.0;
            for term in exp_terms.iter() {
                sum += eigen.c_matrix[c] * term;
                c += 1;
            }
            out[entry] = match kind {
                MatrixKind::Probability if sum <= 0.0 => 0.0,
                _ => sum,
            };
            entry += 1;
        }
    }
}

#[cfg(test)]
mod tests;
