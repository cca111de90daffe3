use anyhow::bail;
use log::debug;
use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::Result;

pub mod dna_models;

pub use dna_models::{DNAModelType, DNASubstModel, DNASubstParams};

pub type SubstMatrix = DMatrix<f64>;
pub type FreqVector = DVector<f64>;

#[macro_export]
macro_rules! frequencies {
    ($slice:expr) => {
        $crate::substitution_models::FreqVector::from_column_slice($slice)
    };
}

/// Eigensystem `Q = E diag(λ) E⁻¹` flattened row-major, in the layout
/// [`BeagleInstance::set_eigen_decomposition`](crate::beagle::BeagleInstance::set_eigen_decomposition)
/// takes.
#[derive(Debug, Clone, PartialEq)]
pub struct EigenDecomposition {
    pub vectors: Vec<f64>,
    pub inverse_vectors: Vec<f64>,
    pub values: Vec<f64>,
}

impl EigenDecomposition {
    pub fn state_count(&self) -> usize {
        self.values.len()
    }
}

pub trait SubstitutionModel {
    const N: usize;
    const ALPHABET: &'static [u8];

    fn q(&self) -> &SubstMatrix;
    fn freqs(&self) -> &FreqVector;

    fn p(&self, time: f64) -> SubstMatrix {
        (self.q().clone() * time).exp()
    }

    fn rate(&self, i: usize, j: usize) -> f64 {
        self.q()[(i, j)]
    }

    /// Expected number of substitutions per unit time, `-Σ π_i q_ii`.
    fn mean_rate(&self) -> f64 {
        -self
            .q()
            .diagonal()
            .iter()
            .zip(self.freqs().iter())
            .map(|(q, pi)| q * pi)
            .sum::<f64>()
    }

    fn eigen(&self) -> Result<EigenDecomposition> {
        reversible_eigen(self.q(), self.freqs())
    }
}

/// Eigendecomposition of a time-reversible rate matrix through its symmetric form
/// `S = Π^½ Q Π^-½`, so that `E = Π^-½ U` and `E⁻¹ = Uᵀ Π^½`.
pub fn reversible_eigen(q: &SubstMatrix, pi: &FreqVector) -> Result<EigenDecomposition> {
    let n = q.nrows();
    if q.ncols() != n || pi.len() != n {
        bail!(
            "Rate matrix of shape {}x{} does not match {} frequencies",
            n,
            q.ncols(),
            pi.len()
        );
    }
    if pi.iter().any(|&f| f <= 0.0 || !f.is_finite()) {
        bail!("Eigendecomposition needs strictly positive frequencies, got {:?}", pi.as_slice());
    }
    let sqrt_pi = pi.map(f64::sqrt);
    let mut s = SubstMatrix::from_fn(n, n, |i, j| sqrt_pi[i] * q[(i, j)] / sqrt_pi[j]);
    s = (&s + s.transpose()) * 0.5;
    let eigen = SymmetricEigen::new(s);

    let vectors = SubstMatrix::from_fn(n, n, |i, k| eigen.eigenvectors[(i, k)] / sqrt_pi[i]);
    let inverse = SubstMatrix::from_fn(n, n, |k, j| eigen.eigenvectors[(j, k)] * sqrt_pi[j]);
    debug!("Eigenvalues of the rate matrix: {:?}", eigen.eigenvalues.as_slice());
    Ok(EigenDecomposition {
        vectors: row_major(&vectors),
        inverse_vectors: row_major(&inverse),
        values: eigen.eigenvalues.iter().cloned().collect(),
    })
}

fn row_major(matrix: &SubstMatrix) -> Vec<f64> {
    matrix.transpose().as_slice().to_vec()
}

#[cfg(test)]
mod tests;
