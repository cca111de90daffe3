use anyhow::bail;
use itertools::Itertools;
use log::{debug, info};

use crate::alignment::SitePatterns;
use crate::beagle::{BeagleBuilder, BeagleInstance, Operation, RootSpec};
use crate::substitution_models::SubstitutionModel;
use crate::tree::{NodeIdx, NodeIdx::Internal as Int, NodeIdx::Leaf, Tree};
use crate::Result;

mod site_model;

pub use site_model::SiteModel;

pub(crate) struct LikelihoodError {
    pub(crate) message: String,
}
impl std::fmt::Debug for LikelihoodError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl std::fmt::Display for LikelihoodError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl std::error::Error for LikelihoodError {}

pub struct TreeLikelihoodBuilder<SM: SubstitutionModel> {
    tree: Tree,
    patterns: SitePatterns,
    model: SM,
    site_model: SiteModel,
    general_kernels: bool,
    scaling_threshold: Option<u32>,
}

impl<SM: SubstitutionModel> TreeLikelihoodBuilder<SM> {
    pub fn new(tree: Tree, patterns: SitePatterns, model: SM) -> Self {
        TreeLikelihoodBuilder {
            tree,
            patterns,
            model,
            site_model: SiteModel::default(),
            general_kernels: false,
            scaling_threshold: None,
        }
    }

    pub fn site_model(mut self, site_model: SiteModel) -> Self {
        self.site_model = site_model;
        self
    }

    pub fn general_kernels(mut self) -> Self {
        self.general_kernels = true;
        self
    }

    pub fn scaling_threshold(mut self, exponent_threshold: u32) -> Self {
        self.scaling_threshold = Some(exponent_threshold);
        self
    }

    /// Sets up an engine instance with one tip buffer per leaf, one partials buffer per
    /// internal node and one transition matrix per node.
    pub fn build(self) -> Result<TreeLikelihood<SM>> {
        let tree = self.tree;
        let patterns = self.patterns;
        if !tree.is_complete() {
            bail!(LikelihoodError {
                message: String::from("Tree is not complete")
            });
        }
        if !tree.is_binary() {
            bail!(LikelihoodError {
                message: String::from("Only binary trees are supported")
            });
        }
        if tree.n() < 2 {
            bail!(LikelihoodError {
                message: String::from("Need at least two taxa")
            });
        }
        if tree.n() != patterns.taxon_count() {
            bail!(LikelihoodError {
                message: format!(
                    "Tree has {} leaves but the alignment has {} sequences",
                    tree.n(),
                    patterns.taxon_count()
                )
            });
        }
        if let Some(id) = tree.leaf_ids().iter().duplicates().next() {
            bail!(LikelihoodError {
                message: format!("Leaf {} appears more than once in the tree", id)
            });
        }
        if SM::N != 4 {
            bail!(LikelihoodError {
                message: format!("Only nucleotide data is supported, model has {} states", SM::N)
            });
        }

        let mut buffers = vec![0; tree.len()];
        let leaves = tree.leaves();
        for (tip, leaf) in leaves.iter().enumerate() {
            buffers[usize::from(leaf.idx)] = tip;
        }
        for (offset, node) in tree.internals().iter().enumerate() {
            buffers[usize::from(node.idx)] = leaves.len() + offset;
        }

        let mut builder = BeagleBuilder::new(
            tree.n(),
            tree.len(),
            tree.n(),
            SM::N,
            patterns.pattern_count(),
        )
        .matrix_buffers(tree.len())
        .categories(self.site_model.category_count());
        if self.general_kernels {
            builder = builder.general_kernels();
        }
        if let Some(threshold) = self.scaling_threshold {
            builder = builder.scaling_threshold(threshold);
        }
        let mut instance = builder.build()?;

        for (tip, leaf) in leaves.iter().enumerate() {
            let Some(taxon) = patterns.taxon_index(&leaf.id) else {
                bail!(LikelihoodError {
                    message: format!("No sequence found for leaf {}", leaf.id)
                });
            };
            if patterns.has_ambiguity(taxon) {
                instance.set_tip_partials(tip, &patterns.partials(taxon))?;
            } else {
                instance.set_tip_states(tip, &patterns.states(taxon))?;
            }
        }
        instance.set_pattern_weights(patterns.weights())?;
        info!(
            "Set up tree likelihood for {} taxa and {} patterns",
            tree.n(),
            patterns.pattern_count()
        );

        let mut likelihood = TreeLikelihood {
            tree,
            patterns,
            model: self.model,
            site_model: self.site_model,
            instance,
            buffers,
        };
        likelihood.load_site_model()?;
        likelihood.load_model()?;
        Ok(likelihood)
    }
}

/// Log-likelihood of an alignment on a fixed rooted binary tree under a substitution
/// model and a site model.
pub struct TreeLikelihood<SM: SubstitutionModel> {
    tree: Tree,
    patterns: SitePatterns,
    model: SM,
    site_model: SiteModel,
    instance: BeagleInstance,
    buffers: Vec<usize>,
}

impl<SM: SubstitutionModel> TreeLikelihood<SM> {
    fn load_model(&mut self) -> Result<()> {
        let eigen = self.model.eigen()?;
        self.instance.set_eigen_decomposition(
            0,
            &eigen.vectors,
            &eigen.inverse_vectors,
            &eigen.values,
        )?;
        self.instance
            .set_state_frequencies(0, self.model.freqs().as_slice())
    }

    fn load_site_model(&mut self) -> Result<()> {
        self.instance
            .set_category_rates(self.site_model.rates())?;
        self.instance
            .set_category_weights(0, self.site_model.weights())
    }

    fn buffer(&self, node_idx: &NodeIdx) -> usize {
        self.buffers[usize::from(node_idx)]
    }

    /// Partials updates for every internal node, children before parents.
    pub fn operations(&self) -> Vec<Operation> {
        self.tree
            .postorder()
            .iter()
            .filter(|node_idx| matches!(node_idx, Int(_)))
            .map(|node_idx| {
                let children = &self.tree.node(node_idx).children;
                let (c1, c2) = (self.buffer(&children[0]), self.buffer(&children[1]));
                Operation::new(self.buffer(node_idx), c1, c1, c2, c2)
            })
            .collect()
    }

    /// Recomputes all transition matrices and partials and integrates at the root.
    pub fn log_likelihood(&mut self) -> Result<f64> {
        let (indices, lengths): (Vec<usize>, Vec<f64>) = self
            .tree
            .postorder()
            .iter()
            .filter(|&&node_idx| node_idx != self.tree.root)
            .map(|node_idx| (self.buffer(node_idx), self.tree.blen(node_idx)))
            .unzip();
        self.instance
            .update_transition_matrices(0, &indices, None, None, &lengths)?;
        let operations = self.operations();
        self.instance.update_partials(&operations, None)?;
        let root = self.buffer(&self.tree.root);
        let logl = self
            .instance
            .calculate_root_log_likelihoods(&[RootSpec::new(root)])?;
        debug!("Tree log-likelihood {}", logl);
        Ok(logl)
    }

    /// Per-column log-likelihoods of the original alignment from the last evaluation.
    pub fn site_log_likelihoods(&self) -> Result<Vec<f64>> {
        Ok(self.patterns.expand(self.instance.site_log_likelihoods()?))
    }

    pub fn set_model(&mut self, model: SM) -> Result<()> {
        self.model = model;
        self.load_model()
    }

    pub fn set_site_model(&mut self, site_model: SiteModel) -> Result<()> {
        if site_model.category_count() != self.site_model.category_count() {
            bail!(LikelihoodError {
                message: format!(
                    "Instance was built for {} rate categories, got {}",
                    self.site_model.category_count(),
                    site_model.category_count()
                )
            });
        }
        self.site_model = site_model;
        self.load_site_model()
    }

    /// Changes the length of the branch above a node, the root excluded. Node heights are
    /// left as they are.
    pub fn set_branch_length(&mut self, node_idx: &NodeIdx, blen: f64) -> Result<()> {
        if *node_idx == self.tree.root || !(blen >= 0.0 && blen.is_finite()) {
            bail!(LikelihoodError {
                message: format!("Cannot set branch length {} above {}", blen, node_idx)
            });
        }
        self.tree.nodes[usize::from(node_idx)].blen = blen;
        Ok(())
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn model(&self) -> &SM {
        &self.model
    }

    pub fn site_model(&self) -> &SiteModel {
        &self.site_model
    }

    pub fn patterns(&self) -> &SitePatterns {
        &self.patterns
    }

    pub fn instance(&self) -> &BeagleInstance {
        &self.instance
    }

    /// Tip buffer that holds a leaf's sequence.
    pub fn tip_buffer(&self, leaf: &NodeIdx) -> Option<usize> {
        match leaf {
            Leaf(_) => Some(self.buffer(leaf)),
            Int(_) => None,
        }
    }
}
