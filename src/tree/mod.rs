use std::fmt::{self, Display};

use anyhow::bail;
use log::debug;

pub(crate) mod tree_node;
pub use tree_node::Node;
pub mod tree_parser;

use NodeIdx::{Internal as Int, Leaf};

#[derive(Debug, PartialEq, Clone, Copy, PartialOrd, Eq, Ord, Hash)]
pub enum NodeIdx {
    Internal(usize),
    Leaf(usize),
}

impl From<NodeIdx> for usize {
    fn from(node_idx: NodeIdx) -> usize {
        match node_idx {
            Int(idx) => idx,
            Leaf(idx) => idx,
        }
    }
}

impl From<&NodeIdx> for usize {
    fn from(node_idx: &NodeIdx) -> usize {
        usize::from(*node_idx)
    }
}

impl Display for NodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Int(idx) => write!(f, "Internal node {}", idx),
            Leaf(idx) => write!(f, "Leaf node {}", idx),
        }
    }
}

pub(crate) struct TreeError {
    pub(crate) message: String,
}

impl fmt::Debug for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TreeError {}

/// Rooted tree stored as an arena of nodes. Every node carries both its branch length and
/// its height above the most recent leaf, so the same tree can be read as a phylogeny
/// (branch lengths) or as a genealogy (node times).
#[derive(Debug, Clone)]
pub struct Tree {
    pub root: NodeIdx,
    pub nodes: Vec<Node>,
    postorder: Vec<NodeIdx>,
    preorder: Vec<NodeIdx>,
    complete: bool,
    n: usize,
    height: f64,
    leaf_ids: Vec<String>,
}

impl Tree {
    /// Starts a tree from its sampled leaves. Internal nodes are added with
    /// [`Tree::add_parent`] and the tree is closed with [`Tree::complete`].
    ///
    /// # Example
    /// ```
    /// use phylo_beagle::tree::{NodeIdx::Leaf, Tree};
    /// let mut tree = Tree::with_leaves(&["A", "B", "C"], &[0.0, 0.0, 0.5]).unwrap();
    /// let ab = tree.add_parent(&[Leaf(0), Leaf(1)], 1.0).unwrap();
    /// let c = Leaf(2);
    /// tree.add_parent(&[ab, c], 2.0).unwrap();
    /// tree.complete().unwrap();
    /// assert_eq!(tree.height(), 2.0);
    /// assert_eq!(tree.node(&c).blen, 1.5);
    /// ```
    pub fn with_leaves<S: AsRef<str>>(ids: &[S], heights: &[f64]) -> crate::Result<Self> {
        if ids.len() != heights.len() {
            bail!(TreeError {
                message: format!(
                    "Got {} leaf ids but {} leaf heights",
                    ids.len(),
                    heights.len()
                )
            });
        }
        if ids.is_empty() {
            bail!(TreeError {
                message: String::from("A tree needs at least one leaf")
            });
        }
        let mut tree = Tree::new_empty();
        for (idx, (id, &height)) in ids.iter().zip(heights).enumerate() {
            if !height.is_finite() || height < 0.0 {
                bail!(TreeError {
                    message: format!("Invalid height {} for leaf {}", height, id.as_ref())
                });
            }
            let mut node = Node::new_leaf(idx, None, 0.0, id.as_ref().to_string());
            node.height = height;
            tree.nodes.push(node);
            tree.leaf_ids.push(id.as_ref().to_string());
        }
        Ok(tree)
    }

    /// Joins `children` under a new internal node at `height` and returns its index. Branch
    /// lengths of the children are set from the height difference.
    pub fn add_parent(&mut self, children: &[NodeIdx], height: f64) -> crate::Result<NodeIdx> {
        if self.complete {
            bail!(TreeError {
                message: String::from("Cannot add nodes to a completed tree")
            });
        }
        if children.is_empty() {
            bail!(TreeError {
                message: String::from("An internal node needs at least one child")
            });
        }
        for child in children {
            let Some(node) = self.nodes.get(usize::from(child)) else {
                bail!(TreeError {
                    message: format!("{} does not exist", child)
                });
            };
            if node.idx != *child {
                bail!(TreeError {
                    message: format!("{} does not exist", child)
                });
            }
            if node.parent.is_some() {
                bail!(TreeError {
                    message: format!("{} already has a parent", child)
                });
            }
            if node.height > height {
                bail!(TreeError {
                    message: format!(
                        "{} at height {} is above its new parent at {}",
                        child, node.height, height
                    )
                });
            }
        }
        let parent_idx = Int(self.nodes.len());
        let mut parent = Node::new_internal(
            self.nodes.len(),
            None,
            children.to_vec(),
            0.0,
            String::new(),
        );
        parent.height = height;
        self.nodes.push(parent);
        for child in children {
            let node = &mut self.nodes[usize::from(child)];
            node.add_parent(&parent_idx);
            node.blen = height - node.height;
        }
        Ok(parent_idx)
    }

    /// Closes the tree: finds the single parentless node, computes traversal orders and
    /// the tree height. Heights given at construction are kept as they are.
    pub fn complete(&mut self) -> crate::Result<()> {
        let roots: Vec<NodeIdx> = self
            .nodes
            .iter()
            .filter(|node| node.parent.is_none())
            .map(|node| node.idx)
            .collect();
        if roots.len() != 1 {
            bail!(TreeError {
                message: format!("Expected a single root, found {}", roots.len())
            });
        }
        self.root = roots[0];
        self.finish();
        Ok(())
    }

    pub(crate) fn finish(&mut self) {
        self.n = self.leaf_ids.len();
        self.complete = true;
        self.compute_postorder();
        self.compute_preorder();
        self.height = self.nodes[usize::from(self.root)].height;
        debug!(
            "Completed tree with {} leaves and {} nodes, height {}.",
            self.n,
            self.nodes.len(),
            self.height
        );
    }

    /// Sets node heights from branch lengths, the deepest leaf at height zero.
    pub(crate) fn heights_from_branch_lengths(&mut self) {
        let mut depths = vec![0.0; self.nodes.len()];
        for node_idx in &self.preorder {
            let node = &self.nodes[usize::from(node_idx)];
            if let Some(parent) = node.parent {
                depths[usize::from(node_idx)] = depths[usize::from(parent)] + node.blen;
            }
        }
        let max_depth = depths.iter().cloned().fold(0.0, f64::max);
        for (node, depth) in self.nodes.iter_mut().zip(depths) {
            node.height = max_depth - depth;
        }
        self.height = self.nodes[usize::from(self.root)].height;
    }

    pub(crate) fn compute_postorder(&mut self) {
        let mut order = Vec::<NodeIdx>::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(node_idx) = stack.pop() {
            order.push(node_idx);
            if let Int(idx) = node_idx {
                stack.extend(self.nodes[idx].children.iter().cloned());
            }
        }
        order.reverse();
        self.postorder = order;
    }

    pub(crate) fn compute_preorder(&mut self) {
        let mut order = Vec::<NodeIdx>::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(node_idx) = stack.pop() {
            order.push(node_idx);
            if let Int(idx) = node_idx {
                stack.extend(self.nodes[idx].children.iter().rev().cloned());
            }
        }
        self.preorder = order;
    }

    pub(crate) fn add_parent_to_child_no_blen(&mut self, idx: &NodeIdx, parent_idx: &NodeIdx) {
        self.nodes[usize::from(idx)].add_parent(parent_idx);
    }

    pub fn postorder(&self) -> &[NodeIdx] {
        debug_assert!(self.complete);
        &self.postorder
    }

    pub fn preorder(&self) -> &[NodeIdx] {
        debug_assert!(self.complete);
        &self.preorder
    }

    pub fn node(&self, node_idx: &NodeIdx) -> &Node {
        &self.nodes[usize::from(node_idx)]
    }

    pub fn blen(&self, node_idx: &NodeIdx) -> f64 {
        self.node(node_idx).blen
    }

    pub fn children(&self, node_idx: &NodeIdx) -> &[NodeIdx] {
        &self.node(node_idx).children
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of leaves.
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn leaf_ids(&self) -> &[String] {
        &self.leaf_ids
    }

    pub fn leaves(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|node| matches!(node.idx, Leaf(_)))
            .collect()
    }

    pub fn internals(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|node| matches!(node.idx, Int(_)))
            .collect()
    }

    /// True when every internal node has exactly two children.
    pub fn is_binary(&self) -> bool {
        self.internals().iter().all(|node| node.children.len() == 2)
    }

    pub fn total_branch_length(&self) -> f64 {
        self.nodes
            .iter()
            .filter(|node| node.parent.is_some())
            .map(|node| node.blen)
            .sum()
    }

    pub fn to_newick(&self) -> String {
        format!("{};", self.subtree_to_newick(&self.root))
    }

    fn subtree_to_newick(&self, node_idx: &NodeIdx) -> String {
        let node = self.node(node_idx);
        let mut out = String::new();
        if let Int(_) = node_idx {
            let children: Vec<String> = node
                .children
                .iter()
                .map(|child| self.subtree_to_newick(child))
                .collect();
            out.push('(');
            out.push_str(&children.join(","));
            out.push(')');
        }
        out.push_str(&node.id);
        out.push(':');
        out.push_str(&node.blen.to_string());
        out
    }
}
