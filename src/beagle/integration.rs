//! Integration of conditional likelihoods into per-pattern likelihoods, at the root or
//! across a single edge.

/// Layout shared by every buffer that is integrated.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IntegrationDims {
    pub(crate) categories: usize,
    pub(crate) patterns: usize,
    pub(crate) states: usize,
}

/// Child side of an edge: either compact tip states or a partials buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ChildData<'a> {
    States(&'a [usize]),
    Partials(&'a [f64]),
}

/// Writes `ln Σ_i π_i Σ_c w_c p[c][k][i]` for every pattern `k` into `site_out`. The
/// values are still on the scale of the (possibly rescaled) root buffer.
pub(crate) fn root_site_log_likelihoods(
    dims: IntegrationDims,
    partials: &[f64],
    category_weights: &[f64],
    frequencies: &[f64],
    site_out: &mut [f64],
) {
    let n = dims.states;
    let pattern_block = dims.patterns * n;
    let mut integrated = vec![0.0; pattern_block];

    for (u, value) in integrated.iter_mut().enumerate() {
        *value = partials[u] * category_weights[0];
    }
    for (c, &weight) in category_weights.iter().enumerate().take(dims.categories).skip(1) {
        let category = &partials[c * pattern_block..(c + 1) * pattern_block];
        for (value, &p) in integrated.iter_mut().zip(category.iter()) {
            *value += p * weight;
        }
    }

    for (k, site) in site_out.iter_mut().enumerate() {
        let mut sum = 0.0;
        for i in 0..n {
            sum += frequencies[i] * integrated[k * n + i];
        }
        *site = sum.ln();
    }
}

/// Per-pattern likelihood of an edge and its derivatives, before log transformation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct EdgeSite {
    pub(crate) likelihood: f64,
    pub(crate) first: f64,
    pub(crate) second: f64,
}

/// Contribution `Σ_j M[i][j] child[j]` of one child pattern for parent state `i`.
fn child_dot(matrix: &[f64], row: usize, n: usize, child: ChildData, offset: usize, k: usize) -> f64 {
    match child {
        ChildData::States(states) => {
            let s = states[k];
            if s < n {
                matrix[row + s]
            } else {
                matrix[row..row + n].iter().sum()
            }
        }
        ChildData::Partials(partials) => {
            let mut sum = 0.0;
            for j in 0..n {
                sum += matrix[row + j] * partials[offset + j];
            }
            sum
        }
    }
}

/// Integrates parent-side partials against a child across one edge. Derivative fields
/// are left at zero when the matching matrix is not given.
pub(crate) fn edge_sites(
    dims: IntegrationDims,
    parent: &[f64],
    child: ChildData,
    probability: &[f64],
    first: Option<&[f64]>,
    second: Option<&[f64]>,
    category_weights: &[f64],
    frequencies: &[f64],
) -> Vec<EdgeSite> {
    let n = dims.states;
    let matrix_size = n * n;
    let mut sites = vec![EdgeSite::default(); dims.patterns];

    for (c, &weight) in category_weights.iter().take(dims.categories).enumerate() {
        let w = c * matrix_size;
        for (k, site) in sites.iter_mut().enumerate() {
            let offset = (c * dims.patterns + k) * n;
            for i in 0..n {
                let row = w + i * n;
                let above = weight * frequencies[i] * parent[offset + i];
                site.likelihood += above * child_dot(probability, row, n, child, offset, k);
                if let Some(m) = first {
                    site.first += above * child_dot(m, row, n, child, offset, k);
                }
                if let Some(m) = second {
                    site.second += above * child_dot(m, row, n, child, offset, k);
                }
            }
        }
    }
    sites
}
