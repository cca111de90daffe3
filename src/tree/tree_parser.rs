use std::fmt;

use anyhow::bail;
use log::{info, warn};
use pest::{error::Error as PestError, iterators::Pair, Parser};
use pest_derive::Parser;

use crate::tree::{
    Node,
    NodeIdx::{self, Internal as Int, Leaf},
    Tree,
};
use crate::Result;

#[derive(Parser)]
#[grammar = "./tree/newick.pest"]
pub struct NewickParser;

#[derive(Debug)]
pub(crate) struct ParsingError(pub(crate) Box<PestError<Rule>>);

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Malformed newick string")?;
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParsingError {}

/// Parses every tree in a newick string. Node heights are derived from the branch lengths
/// with the deepest leaf at height zero.
///
/// # Example
/// ```
/// use phylo_beagle::tree::tree_parser::from_newick;
/// let trees = from_newick("((A:1.0,B:1.0):1.0,C:2.0);").unwrap();
/// assert_eq!(trees.len(), 1);
/// assert_eq!(trees[0].n(), 3);
/// assert_eq!(trees[0].height(), 2.0);
/// ```
pub fn from_newick(newick_string: &str) -> Result<Vec<Tree>> {
    info!("Parsing newick trees.");
    let newick_rule = match NewickParser::parse(Rule::newick, newick_string) {
        Ok(mut pairs) => pairs.next(),
        Err(e) => bail!(ParsingError(Box::new(e))),
    };
    let mut trees = Vec::new();
    for tree_rule in newick_rule.into_iter().flat_map(|rule| rule.into_inner()) {
        for rule in tree_rule.into_inner() {
            let mut tree = Tree::new_empty();
            match rule.as_rule() {
                Rule::rooted => tree.parse_rooted_rule(rule),
                Rule::unrooted => tree.parse_unrooted_rule(rule),
                _ => unreachable!(),
            }
            tree.finish();
            tree.heights_from_branch_lengths();
            trees.push(tree);
        }
    }
    info!("Finished parsing {} newick trees successfully.", trees.len());
    Ok(trees)
}

impl Tree {
    pub(crate) fn new_empty() -> Self {
        Self {
            root: Int(0),
            nodes: Vec::new(),
            postorder: Vec::new(),
            preorder: Vec::new(),
            complete: false,
            n: 0,
            height: 0.0,
            leaf_ids: Vec::new(),
        }
    }

    fn parse_rooted_rule(&mut self, rooted_rule: Pair<Rule>) {
        let mut node_idx = 0;
        for rule in rooted_rule.into_inner() {
            match rule.as_rule() {
                Rule::leaf => {
                    self.root = Leaf(node_idx);
                    self.parse_leaf_rule(&mut node_idx, rule);
                }
                Rule::internal => {
                    self.root = Int(node_idx);
                    self.parse_internal_rule(&mut node_idx, rule);
                }
                _ => unreachable!(),
            }
        }
    }

    fn parse_unrooted_rule(&mut self, tree_rule: Pair<Rule>) {
        warn!("Found unrooted tree, will root at the trifurcation.");
        let mut node_idx = 0;
        let mut children: Vec<NodeIdx> = Vec::new();
        for node_rule in tree_rule.into_inner() {
            match node_rule.as_rule() {
                Rule::leaf => {
                    children.push(Leaf(node_idx));
                    self.parse_leaf_rule(&mut node_idx, node_rule);
                }
                Rule::internal => {
                    children.push(Int(node_idx));
                    self.parse_internal_rule(&mut node_idx, node_rule);
                }
                // The label and length of the trifurcation are dropped along with it.
                _ => {}
            }
        }

        self.nodes.push(Node::new_empty_internal(node_idx));
        let new_children = children[0..2].to_vec();
        for child_idx in new_children.iter() {
            self.add_parent_to_child_no_blen(child_idx, &Int(node_idx));
        }
        self.nodes[node_idx].children = new_children;
        node_idx += 1;

        self.nodes.push(Node::new_empty_internal(node_idx));
        let new_children = vec![Int(node_idx - 1), children[2]];
        for child_idx in new_children.iter() {
            self.add_parent_to_child_no_blen(child_idx, &Int(node_idx));
        }
        self.nodes[node_idx].children = new_children;
        self.root = Int(node_idx);
    }

    fn parse_internal_rule(&mut self, node_idx: &mut usize, internal_rule: Pair<Rule>) {
        let cur_node_idx = *node_idx;
        let mut children: Vec<NodeIdx> = Vec::new();
        self.nodes.push(Node::new_empty_internal(cur_node_idx));
        *node_idx += 1;
        for rule in internal_rule.into_inner() {
            match rule.as_rule() {
                Rule::label => self.nodes[cur_node_idx].id = Tree::parse_label_rule(rule),
                Rule::branch_length => {
                    self.nodes[cur_node_idx].blen = Tree::parse_branch_length_rule(rule)
                }
                Rule::internal => {
                    children.push(Int(*node_idx));
                    self.parse_internal_rule(node_idx, rule);
                }
                Rule::leaf => {
                    children.push(Leaf(*node_idx));
                    self.parse_leaf_rule(node_idx, rule);
                }
                _ => unreachable!(),
            }
        }
        for child_idx in &children {
            self.add_parent_to_child_no_blen(child_idx, &Int(cur_node_idx));
        }
        self.nodes[cur_node_idx].children = children;
    }

    fn parse_leaf_rule(&mut self, node_idx: &mut usize, inner_rule: Pair<Rule>) {
        let mut id = String::from("");
        let mut blen = 0.0;
        for rule in inner_rule.into_inner() {
            match rule.as_rule() {
                Rule::label => id = Tree::parse_label_rule(rule),
                Rule::branch_length => blen = Tree::parse_branch_length_rule(rule),
                _ => unreachable!(),
            }
        }
        self.nodes
            .push(Node::new_leaf(*node_idx, None, blen, id.clone()));
        self.leaf_ids.push(id);
        *node_idx += 1;
    }

    fn parse_branch_length_rule(rule: Pair<Rule>) -> f64 {
        rule.into_inner()
            .next()
            .and_then(|number| number.as_str().trim().parse::<f64>().ok())
            .unwrap_or_default()
    }

    fn parse_label_rule(rule: Pair<Rule>) -> String {
        rule.as_str().trim_matches('\'').to_string()
    }
}
