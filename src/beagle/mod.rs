use anyhow::bail;
use log::{debug, warn};

use crate::Result;

mod beagle_builder;
pub use beagle_builder::*;
mod errors;
pub use errors::*;
mod integration;
use integration::{ChildData, IntegrationDims};
mod kernels;
pub use kernels::KernelVariant;
use kernels::KernelDims;
mod matrices;
pub use matrices::EigenBuffer;
use matrices::MatrixKind;
mod operations;
pub use operations::*;
mod pool;
use pool::FlatPool;
pub mod scaling;
use scaling::{ScaleDims, ScaleLedger, SCALING_FACTOR_COUNT};

/// Root buffer and model parameters to integrate in `calculate_root_log_likelihoods`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootSpec {
    pub buffer: usize,
    pub category_weights: usize,
    pub state_frequencies: usize,
    /// Named scale buffer holding the cumulative log factors of the whole tree. When absent
    /// the root buffer's own scaling histogram is used.
    pub cumulative_scale: Option<usize>,
}

impl RootSpec {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer,
            category_weights: 0,
            state_frequencies: 0,
            cumulative_scale: None,
        }
    }

    pub fn with_cumulative_scale(mut self, scale_index: usize) -> Self {
        self.cumulative_scale = Some(scale_index);
        self
    }
}

/// Edge to integrate in `calculate_edge_log_likelihoods`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSpec {
    pub parent: usize,
    pub child: usize,
    pub probability_matrix: usize,
    pub first_derivative_matrix: Option<usize>,
    pub second_derivative_matrix: Option<usize>,
    pub category_weights: usize,
    pub state_frequencies: usize,
    pub cumulative_scale: Option<usize>,
}

impl EdgeSpec {
    pub fn new(parent: usize, child: usize, probability_matrix: usize) -> Self {
        Self {
            parent,
            child,
            probability_matrix,
            first_derivative_matrix: None,
            second_derivative_matrix: None,
            category_weights: 0,
            state_frequencies: 0,
            cumulative_scale: None,
        }
    }

    pub fn with_derivatives(mut self, first: usize, second: Option<usize>) -> Self {
        self.first_derivative_matrix = Some(first);
        self.second_derivative_matrix = second;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeLogLikelihood {
    pub log_likelihood: f64,
    /// `Σ_k w_k L'_k / L_k`, present when a first derivative matrix was given.
    pub first_derivative: Option<f64>,
    /// `Σ_k w_k (L''_k / L_k - (L'_k / L_k)²)`, present when both derivative matrices were given.
    pub second_derivative: Option<f64>,
}

/// A single likelihood calculation instance.
///
/// All buffers are allocated at construction (see [`BeagleBuilder`]) and addressed by index
/// afterwards. The caller fills tips and model parameters, builds transition matrices,
/// applies post-order [`Operation`]s and finally integrates at the root.
#[derive(Debug, Clone)]
pub struct BeagleInstance {
    dims: InstanceDims,
    scaling: ScalingPolicy,
    kernel: KernelVariant,
    partials: FlatPool<f64>,
    partials_written: Vec<bool>,
    scale_counts: FlatPool<f64>,
    site_log_scales: FlatPool<f64>,
    tip_states: Vec<Option<Vec<usize>>>,
    eigen: Vec<Option<EigenBuffer>>,
    matrices: FlatPool<f64>,
    matrices_written: Vec<bool>,
    state_frequencies: Vec<Option<Vec<f64>>>,
    category_weights: Vec<Option<Vec<f64>>>,
    category_rates: Vec<f64>,
    pattern_weights: Vec<f64>,
    scale_buffers: FlatPool<f64>,
    applied_scale: Vec<f64>,
    site_log_likelihoods: Option<Vec<f64>>,
}

fn check_index(kind: BufferKind, index: usize, count: usize) -> Result<()> {
    if index >= count {
        bail!(BeagleError::BufferOutOfRange { kind, index, count });
    }
    Ok(())
}

fn compact_states(
    tip_states: &[Option<Vec<usize>>],
    tip_count: usize,
    buffer: usize,
) -> Option<&[usize]> {
    if buffer >= tip_count {
        return None;
    }
    tip_states.get(buffer).and_then(|s| s.as_deref())
}

/// Resets `dest` in `pool` to the element-wise sum of `sources`.
fn combine_ledger(pool: &mut FlatPool<f64>, dest: usize, sources: &[usize]) {
    let split = pool.split(dest);
    split.dest.fill(0.0);
    for &src in sources {
        let source = split.source(src);
        for (d, &v) in split.dest.iter_mut().zip(source) {
            *d += v;
        }
    }
}

impl BeagleInstance {
    pub(crate) fn allocate(dims: InstanceDims, scaling: ScalingPolicy, kernel: KernelVariant) -> Self {
        BeagleInstance {
            dims,
            scaling,
            kernel,
            partials: FlatPool::new(dims.partials_buffer_count, dims.partials_size()),
            partials_written: vec![false; dims.partials_buffer_count],
            scale_counts: FlatPool::new(dims.partials_buffer_count, SCALING_FACTOR_COUNT),
            site_log_scales: FlatPool::new(dims.partials_buffer_count, dims.pattern_count),
            tip_states: vec![None; dims.compact_buffer_count],
            eigen: vec![None; dims.eigen_buffer_count],
            matrices: FlatPool::new(
                dims.matrix_buffer_count,
                dims.category_count * dims.matrix_size(),
            ),
            matrices_written: vec![false; dims.matrix_buffer_count],
            state_frequencies: vec![None; dims.eigen_buffer_count],
            category_weights: vec![None; dims.eigen_buffer_count],
            category_rates: vec![1.0; dims.category_count],
            pattern_weights: vec![1.0; dims.pattern_count],
            scale_buffers: FlatPool::new(dims.scale_buffer_count, dims.pattern_count),
            applied_scale: vec![0.0; dims.pattern_count],
            site_log_likelihoods: None,
        }
    }

    pub fn dims(&self) -> &InstanceDims {
        &self.dims
    }

    pub fn kernel_variant(&self) -> KernelVariant {
        self.kernel
    }

    pub fn scaling_policy(&self) -> ScalingPolicy {
        self.scaling
    }

    pub fn set_pattern_weights(&mut self, weights: &[f64]) -> Result<()> {
        check_len("pattern weights", self.dims.pattern_count, weights.len())?;
        self.pattern_weights.copy_from_slice(weights);
        Ok(())
    }

    pub fn pattern_weights(&self) -> &[f64] {
        &self.pattern_weights
    }

    /// Stores compact states for a tip. Values at or above the state count are stored as
    /// the state count, which stands for a gap or an unknown character.
    pub fn set_tip_states(&mut self, tip: usize, states: &[usize]) -> Result<()> {
        check_index(BufferKind::TipStates, tip, self.dims.tip_count)?;
        check_index(BufferKind::TipStates, tip, self.dims.compact_buffer_count)?;
        check_len("tip states", self.dims.pattern_count, states.len())?;
        let n = self.dims.state_count;
        self.tip_states[tip] = Some(states.iter().map(|&s| s.min(n)).collect());
        self.partials_written[tip] = false;
        Ok(())
    }

    pub fn tip_states(&self, tip: usize) -> Result<&[usize]> {
        check_index(BufferKind::TipStates, tip, self.dims.tip_count)?;
        match compact_states(&self.tip_states, self.dims.tip_count, tip) {
            Some(states) => Ok(states),
            None => bail!(BeagleError::UninitialisedBuffer {
                kind: BufferKind::TipStates,
                index: tip
            }),
        }
    }

    /// Sets tip partials for a single category (`patterns × states` values); they are
    /// replicated across all rate categories. Any compact states of the tip are dropped.
    pub fn set_tip_partials(&mut self, tip: usize, partials: &[f64]) -> Result<()> {
        check_index(BufferKind::Partials, tip, self.dims.tip_count)?;
        let block = self.dims.pattern_count * self.dims.state_count;
        check_len("tip partials", block, partials.len())?;
        self.partials
            .get_mut(tip)
            .chunks_mut(block)
            .for_each(|category| category.copy_from_slice(partials));
        if let Some(states) = self.tip_states.get_mut(tip) {
            *states = None;
        }
        self.mark_written(tip);
        Ok(())
    }

    pub fn set_partials(&mut self, buffer: usize, partials: &[f64]) -> Result<()> {
        check_index(BufferKind::Partials, buffer, self.partials.count())?;
        check_len("partials", self.partials.buffer_size(), partials.len())?;
        self.partials.get_mut(buffer).copy_from_slice(partials);
        if let Some(states) = self.tip_states.get_mut(buffer) {
            *states = None;
        }
        self.mark_written(buffer);
        Ok(())
    }

    fn mark_written(&mut self, buffer: usize) {
        self.scale_counts.reset(buffer);
        self.site_log_scales.reset(buffer);
        self.partials_written[buffer] = true;
    }

    /// Copies a partials buffer out. With a scale index, the log factors stored in that
    /// scale buffer are divided back out of every pattern.
    pub fn partials(&self, buffer: usize, scale_index: Option<usize>) -> Result<Vec<f64>> {
        self.check_partials_written(buffer)?;
        let mut out = self.partials.get(buffer).to_vec();
        if let Some(s) = scale_index {
            check_index(BufferKind::ScaleFactors, s, self.scale_buffers.count())?;
            let n = self.dims.state_count;
            for (k, &log_factor) in self.scale_buffers.get(s).iter().enumerate() {
                let factor = (-log_factor).exp();
                for category in out.chunks_mut(self.dims.pattern_count * n) {
                    category[k * n..(k + 1) * n]
                        .iter_mut()
                        .for_each(|v| *v *= factor);
                }
            }
        }
        Ok(out)
    }

    fn check_partials_written(&self, buffer: usize) -> Result<()> {
        check_index(BufferKind::Partials, buffer, self.partials.count())?;
        if !self.partials_written[buffer] {
            bail!(BeagleError::UninitialisedBuffer {
                kind: BufferKind::Partials,
                index: buffer
            });
        }
        Ok(())
    }

    pub fn set_eigen_decomposition(
        &mut self,
        eigen_index: usize,
        vectors: &[f64],
        inverse_vectors: &[f64],
        values: &[f64],
    ) -> Result<()> {
        check_index(BufferKind::EigenDecomposition, eigen_index, self.eigen.len())?;
        let buffer = EigenBuffer::new(self.dims.state_count, vectors, inverse_vectors, values)?;
        self.eigen[eigen_index] = Some(buffer);
        Ok(())
    }

    pub fn set_state_frequencies(&mut self, index: usize, frequencies: &[f64]) -> Result<()> {
        check_index(BufferKind::StateFrequencies, index, self.state_frequencies.len())?;
        check_len("state frequencies", self.dims.state_count, frequencies.len())?;
        self.state_frequencies[index] = Some(frequencies.to_vec());
        Ok(())
    }

    pub fn set_category_weights(&mut self, index: usize, weights: &[f64]) -> Result<()> {
        check_index(BufferKind::CategoryWeights, index, self.category_weights.len())?;
        check_len("category weights", self.dims.category_count, weights.len())?;
        self.category_weights[index] = Some(weights.to_vec());
        Ok(())
    }

    pub fn set_category_rates(&mut self, rates: &[f64]) -> Result<()> {
        check_len("category rates", self.dims.category_count, rates.len())?;
        self.category_rates.copy_from_slice(rates);
        Ok(())
    }

    pub fn category_rates(&self) -> &[f64] {
        &self.category_rates
    }

    pub fn set_transition_matrix(&mut self, matrix_index: usize, matrix: &[f64]) -> Result<()> {
        check_index(BufferKind::TransitionMatrix, matrix_index, self.matrices.count())?;
        check_len("transition matrix", self.matrices.buffer_size(), matrix.len())?;
        self.matrices.get_mut(matrix_index).copy_from_slice(matrix);
        self.matrices_written[matrix_index] = true;
        Ok(())
    }

    pub fn transition_matrix(&self, matrix_index: usize) -> Result<&[f64]> {
        self.check_matrix_written(matrix_index)?;
        Ok(self.matrices.get(matrix_index))
    }

    fn check_matrix_written(&self, matrix_index: usize) -> Result<()> {
        check_index(BufferKind::TransitionMatrix, matrix_index, self.matrices.count())?;
        if !self.matrices_written[matrix_index] {
            bail!(BeagleError::UninitialisedBuffer {
                kind: BufferKind::TransitionMatrix,
                index: matrix_index
            });
        }
        Ok(())
    }

    /// Computes `P(t_e · r_c)` for every edge length into the matching probability matrix,
    /// and optionally its first and second derivatives with respect to `t`.
    pub fn update_transition_matrices(
        &mut self,
        eigen_index: usize,
        probability_indices: &[usize],
        first_derivative_indices: Option<&[usize]>,
        second_derivative_indices: Option<&[usize]>,
        edge_lengths: &[f64],
    ) -> Result<()> {
        check_index(BufferKind::EigenDecomposition, eigen_index, self.eigen.len())?;
        let Some(eigen) = self.eigen[eigen_index].as_ref() else {
            bail!(BeagleError::UninitialisedBuffer {
                kind: BufferKind::EigenDecomposition,
                index: eigen_index
            });
        };

        let count = edge_lengths.len();
        let mut targets = vec![(MatrixKind::Probability, probability_indices)];
        if let Some(indices) = first_derivative_indices {
            targets.push((MatrixKind::FirstDerivative, indices));
        }
        if let Some(indices) = second_derivative_indices {
            targets.push((MatrixKind::SecondDerivative, indices));
        }
        for &(_, indices) in &targets {
            check_len("matrix indices", count, indices.len())?;
            for &idx in indices {
                check_index(BufferKind::TransitionMatrix, idx, self.matrices.count())?;
            }
        }

        for (kind, indices) in targets {
            for (&idx, &length) in indices.iter().zip(edge_lengths) {
                matrices::fill_matrix(
                    eigen,
                    kind,
                    length,
                    &self.category_rates,
                    self.matrices.get_mut(idx),
                );
                self.matrices_written[idx] = true;
            }
        }
        Ok(())
    }

    fn is_compact(&self, buffer: usize) -> bool {
        compact_states(&self.tip_states, self.dims.tip_count, buffer).is_some()
    }

    fn check_operation(&self, op: &Operation, cumulative_scale: Option<usize>) -> Result<()> {
        let partials_count = self.partials.count();
        check_index(BufferKind::Partials, op.destination, partials_count)?;
        for child in [op.child1, op.child2] {
            check_index(BufferKind::Partials, child, partials_count)?;
            if child == op.destination {
                bail!(BeagleError::AliasedOperation {
                    destination: op.destination
                });
            }
            if !self.is_compact(child) {
                self.check_partials_written(child)?;
            }
        }
        self.check_matrix_written(op.child1_matrix)?;
        self.check_matrix_written(op.child2_matrix)?;
        for scale in [op.dest_scale_write, op.dest_scale_read, cumulative_scale]
            .into_iter()
            .flatten()
        {
            check_index(BufferKind::ScaleFactors, scale, self.scale_buffers.count())?;
        }
        Ok(())
    }

    /// Applies `operations` in order. Each destination is computed from its two children,
    /// inherits their scaling records and is rescaled when its values drift too far from
    /// an exponent of zero.
    ///
    /// Log factors applied at a node are stored in its `dest_scale_write` buffer and, if
    /// `cumulative_scale_index` is given, added to that buffer as well. An operation with a
    /// `dest_scale_read` buffer and no write buffer re-applies the recorded factors instead
    /// of choosing new ones.
    pub fn update_partials(
        &mut self,
        operations: &[Operation],
        cumulative_scale_index: Option<usize>,
    ) -> Result<()> {
        let kernel_dims = KernelDims {
            categories: self.dims.category_count,
            patterns: self.dims.pattern_count,
            states: self.dims.state_count,
        };
        let scale_dims = ScaleDims {
            categories: self.dims.category_count,
            patterns: self.dims.pattern_count,
            states: self.dims.state_count,
        };

        for op in operations {
            self.check_operation(op, cumulative_scale_index)?;

            let states1 = compact_states(&self.tip_states, self.dims.tip_count, op.child1);
            let states2 = compact_states(&self.tip_states, self.dims.tip_count, op.child2);
            let matrix1 = self.matrices.get(op.child1_matrix);
            let matrix2 = self.matrices.get(op.child2_matrix);
            let split = self.partials.split(op.destination);

            let (flag, ledger_sources) = match (states1, states2) {
                (Some(s1), Some(s2)) => (
                    self.kernel
                        .states_states(kernel_dims, s1, matrix1, s2, matrix2, split.dest),
                    vec![],
                ),
                (Some(s1), None) => (
                    self.kernel.states_partials(
                        kernel_dims,
                        s1,
                        matrix1,
                        split.source(op.child2),
                        matrix2,
                        split.dest,
                    ),
                    vec![op.child2],
                ),
                (None, Some(s2)) => (
                    self.kernel.states_partials(
                        kernel_dims,
                        s2,
                        matrix2,
                        split.source(op.child1),
                        matrix1,
                        split.dest,
                    ),
                    vec![op.child1],
                ),
                (None, None) => (
                    self.kernel.partials_partials(
                        kernel_dims,
                        split.source(op.child1),
                        matrix1,
                        split.source(op.child2),
                        matrix2,
                        split.dest,
                    ),
                    vec![op.child1, op.child2],
                ),
            };

            combine_ledger(&mut self.scale_counts, op.destination, &ledger_sources);
            combine_ledger(&mut self.site_log_scales, op.destination, &ledger_sources);

            let dest = self.partials.get_mut(op.destination);
            let mut ledger = ScaleLedger {
                counts: self.scale_counts.get_mut(op.destination),
                site_log_factors: self.site_log_scales.get_mut(op.destination),
            };
            let applied = &mut self.applied_scale;
            applied.fill(0.0);
            match (op.dest_scale_read, op.dest_scale_write) {
                (Some(read), None) => scaling::apply_recorded(
                    dest,
                    scale_dims,
                    self.scale_buffers.get(read),
                    &self.pattern_weights,
                    &mut ledger,
                    applied,
                ),
                _ if self.scaling.enabled && flag > self.scaling.exponent_threshold => {
                    debug!(
                        "Rescaling buffer {} with exponent flag {}",
                        op.destination, flag
                    );
                    scaling::rescale(
                        dest,
                        scale_dims,
                        &self.pattern_weights,
                        &mut ledger,
                        applied,
                    )
                }
                _ => {}
            }

            if let Some(write) = op.dest_scale_write {
                self.scale_buffers.get_mut(write).copy_from_slice(applied);
            }
            if let (Some(_), Some(cumulative)) = (op.dest_scale_write, cumulative_scale_index) {
                for (total, &v) in self.scale_buffers.get_mut(cumulative).iter_mut().zip(applied.iter()) {
                    *total += v;
                }
            }
            self.partials_written[op.destination] = true;
        }
        Ok(())
    }

    /// Exponent histogram of a partials buffer: `counts[i]` is the summed pattern weight
    /// rescaled by factor `2^(i - 126)` anywhere in the subtree below the buffer.
    pub fn scale_factor_counts(&self, buffer: usize) -> Result<&[f64]> {
        check_index(BufferKind::Partials, buffer, self.partials.count())?;
        Ok(self.scale_counts.get(buffer))
    }

    pub fn scale_factors(&self, scale_index: usize) -> Result<&[f64]> {
        check_index(BufferKind::ScaleFactors, scale_index, self.scale_buffers.count())?;
        Ok(self.scale_buffers.get(scale_index))
    }

    fn combine_scale_buffers(
        &mut self,
        scale_indices: &[usize],
        cumulative: usize,
        sign: f64,
    ) -> Result<()> {
        let count = self.scale_buffers.count();
        check_index(BufferKind::ScaleFactors, cumulative, count)?;
        for &idx in scale_indices {
            check_index(BufferKind::ScaleFactors, idx, count)?;
            if idx == cumulative {
                bail!(BeagleError::AliasedOperation {
                    destination: cumulative
                });
            }
        }
        let split = self.scale_buffers.split(cumulative);
        for &idx in scale_indices {
            let source = split.source(idx);
            for (total, &v) in split.dest.iter_mut().zip(source) {
                *total += sign * v;
            }
        }
        Ok(())
    }

    /// Adds the log factors of every buffer in `scale_indices` to `cumulative`.
    pub fn accumulate_scale_factors(&mut self, scale_indices: &[usize], cumulative: usize) -> Result<()> {
        self.combine_scale_buffers(scale_indices, cumulative, 1.0)
    }

    /// Subtracts the log factors of every buffer in `scale_indices` from `cumulative`.
    pub fn remove_scale_factors(&mut self, scale_indices: &[usize], cumulative: usize) -> Result<()> {
        self.combine_scale_buffers(scale_indices, cumulative, -1.0)
    }

    pub fn copy_scale_factors(&mut self, dest: usize, src: usize) -> Result<()> {
        let count = self.scale_buffers.count();
        check_index(BufferKind::ScaleFactors, dest, count)?;
        check_index(BufferKind::ScaleFactors, src, count)?;
        if dest != src {
            let split = self.scale_buffers.split(dest);
            split.dest.copy_from_slice(split.source(src));
        }
        Ok(())
    }

    pub fn reset_scale_factors(&mut self, cumulative: usize) -> Result<()> {
        check_index(BufferKind::ScaleFactors, cumulative, self.scale_buffers.count())?;
        self.scale_buffers.reset(cumulative);
        Ok(())
    }

    fn model_parameters(&self, weights_index: usize, frequencies_index: usize) -> Result<(&[f64], &[f64])> {
        check_index(BufferKind::CategoryWeights, weights_index, self.category_weights.len())?;
        check_index(BufferKind::StateFrequencies, frequencies_index, self.state_frequencies.len())?;
        let Some(weights) = self.category_weights[weights_index].as_deref() else {
            bail!(BeagleError::UninitialisedBuffer {
                kind: BufferKind::CategoryWeights,
                index: weights_index
            });
        };
        let Some(frequencies) = self.state_frequencies[frequencies_index].as_deref() else {
            bail!(BeagleError::UninitialisedBuffer {
                kind: BufferKind::StateFrequencies,
                index: frequencies_index
            });
        };
        Ok((weights, frequencies))
    }

    fn integration_dims(&self) -> IntegrationDims {
        IntegrationDims {
            categories: self.dims.category_count,
            patterns: self.dims.pattern_count,
            states: self.dims.state_count,
        }
    }

    /// Sum over patterns of the pattern-weighted log-likelihood at the root, with all
    /// scale factors applied below the root removed again. Per-pattern values are kept and
    /// can be read with [`BeagleInstance::site_log_likelihoods`].
    ///
    /// Integration across several subtrees is not supported, `roots` must hold exactly one
    /// entry.
    pub fn calculate_root_log_likelihoods(&mut self, roots: &[RootSpec]) -> Result<f64> {
        if roots.len() != 1 {
            bail!(BeagleError::NotImplemented(
                "integration across multiple subtrees"
            ));
        }
        let root = roots[0];
        self.check_partials_written(root.buffer)?;
        if let Some(s) = root.cumulative_scale {
            check_index(BufferKind::ScaleFactors, s, self.scale_buffers.count())?;
        }
        let (weights, frequencies) =
            self.model_parameters(root.category_weights, root.state_frequencies)?;

        let mut sites = vec![0.0; self.dims.pattern_count];
        integration::root_site_log_likelihoods(
            self.integration_dims(),
            self.partials.get(root.buffer),
            weights,
            frequencies,
            &mut sites,
        );

        let mut total: f64 = sites
            .iter()
            .zip(self.pattern_weights.iter())
            .map(|(&site, &w)| site * w)
            .sum();
        let site_scales = match root.cumulative_scale {
            Some(s) => {
                let scales = self.scale_buffers.get(s);
                total -= scales
                    .iter()
                    .zip(self.pattern_weights.iter())
                    .map(|(&lf, &w)| lf * w)
                    .sum::<f64>();
                scales
            }
            None => {
                total -= scaling::histogram_log_correction(self.scale_counts.get(root.buffer));
                self.site_log_scales.get(root.buffer)
            }
        };
        for (site, &lf) in sites.iter_mut().zip(site_scales) {
            *site -= lf;
        }
        self.site_log_likelihoods = Some(sites);

        if !total.is_finite() {
            warn!("Root log-likelihood of buffer {} is {}", root.buffer, total);
            bail!(BeagleError::FloatingPointRange(total));
        }
        Ok(total)
    }

    /// Log-likelihood of the tree seen from one edge, integrating the partials above the
    /// edge against the child below it, optionally with derivatives with respect to the
    /// edge length.
    pub fn calculate_edge_log_likelihoods(&mut self, edges: &[EdgeSpec]) -> Result<EdgeLogLikelihood> {
        if edges.len() != 1 {
            bail!(BeagleError::NotImplemented(
                "integration across multiple edges"
            ));
        }
        let edge = edges[0];
        if edge.second_derivative_matrix.is_some() && edge.first_derivative_matrix.is_none() {
            bail!(BeagleError::NotImplemented(
                "second derivative without a first derivative matrix"
            ));
        }
        self.check_partials_written(edge.parent)?;
        check_index(BufferKind::Partials, edge.child, self.partials.count())?;
        let child = match compact_states(&self.tip_states, self.dims.tip_count, edge.child) {
            Some(states) => ChildData::States(states),
            None => {
                self.check_partials_written(edge.child)?;
                ChildData::Partials(self.partials.get(edge.child))
            }
        };
        self.check_matrix_written(edge.probability_matrix)?;
        for idx in [edge.first_derivative_matrix, edge.second_derivative_matrix]
            .into_iter()
            .flatten()
        {
            self.check_matrix_written(idx)?;
        }
        if let Some(s) = edge.cumulative_scale {
            check_index(BufferKind::ScaleFactors, s, self.scale_buffers.count())?;
        }
        let (weights, frequencies) =
            self.model_parameters(edge.category_weights, edge.state_frequencies)?;

        let sites = integration::edge_sites(
            self.integration_dims(),
            self.partials.get(edge.parent),
            child,
            self.matrices.get(edge.probability_matrix),
            edge.first_derivative_matrix.map(|i| self.matrices.get(i)),
            edge.second_derivative_matrix.map(|i| self.matrices.get(i)),
            weights,
            frequencies,
        );

        let mut site_scales = self.site_log_scales.get(edge.parent).to_vec();
        match (edge.cumulative_scale, child) {
            (Some(s), _) => site_scales.copy_from_slice(self.scale_buffers.get(s)),
            (None, ChildData::Partials(_)) => {
                for (total, &lf) in site_scales.iter_mut().zip(self.site_log_scales.get(edge.child)) {
                    *total += lf;
                }
            }
            (None, ChildData::States(_)) => {}
        }

        let mut log_likelihood = 0.0;
        let mut first = 0.0;
        let mut second = 0.0;
        let mut site_values = Vec::with_capacity(sites.len());
        for ((site, &w), &lf) in sites.iter().zip(self.pattern_weights.iter()).zip(&site_scales) {
            let site_ll = site.likelihood.ln() - lf;
            let ratio = site.first / site.likelihood;
            log_likelihood += w * site_ll;
            first += w * ratio;
            second += w * (site.second / site.likelihood - ratio * ratio);
            site_values.push(site_ll);
        }
        self.site_log_likelihoods = Some(site_values);

        if !log_likelihood.is_finite() {
            warn!(
                "Edge log-likelihood between buffers {} and {} is {}",
                edge.parent, edge.child, log_likelihood
            );
            bail!(BeagleError::FloatingPointRange(log_likelihood));
        }
        Ok(EdgeLogLikelihood {
            log_likelihood,
            first_derivative: edge.first_derivative_matrix.map(|_| first),
            second_derivative: edge.second_derivative_matrix.map(|_| second),
        })
    }

    /// Per-pattern log-likelihoods of the last root or edge integration.
    pub fn site_log_likelihoods(&self) -> Result<&[f64]> {
        match self.site_log_likelihoods.as_deref() {
            Some(sites) => Ok(sites),
            None => bail!(BeagleError::UninitialisedBuffer {
                kind: BufferKind::SiteLogLikelihoods,
                index: 0
            }),
        }
    }
}
