//! Coalescent intervals of a genealogy and the coalescent likelihood over population size
//! functions.
use std::fmt::{self, Display};

use anyhow::bail;
use log::debug;

use crate::tree::{NodeIdx, Tree};
use crate::Result;

pub mod likelihood;
pub mod population;
pub mod skyline;

pub use likelihood::{coalescent_log_likelihood, simulate_coalescent_tree};
pub use population::{ConstantPopulation, ExponentialGrowth, PopulationFunction};
pub use skyline::BayesianSkyline;

/// Kind of event that closes an interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntervalType {
    /// New samples enter, the lineage count goes up.
    Sample,
    /// One or more lineages merge.
    Coalescent,
    /// Only produced by structured models.
    Migration,
    Nothing,
}

impl Display for IntervalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalType::Sample => write!(f, "sample"),
            IntervalType::Coalescent => write!(f, "coalescent"),
            IntervalType::Migration => write!(f, "migration"),
            IntervalType::Nothing => write!(f, "nothing"),
        }
    }
}

pub(crate) struct IntervalError {
    pub(crate) message: String,
}

impl fmt::Debug for IntervalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for IntervalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IntervalError {}

pub(crate) fn choose2(n: usize) -> f64 {
    (n * n.saturating_sub(1)) as f64 / 2.0
}

/// A sequence of consecutive time intervals, each spanned by a constant number of
/// lineages. Time runs from the most recent sample towards the root.
pub trait IntervalList {
    fn interval_count(&self) -> usize;

    fn sample_count(&self) -> usize;

    /// Duration of interval `i`. Panics when `i` is out of range.
    fn interval(&self, i: usize) -> f64;

    /// Lineages spanning interval `i`.
    fn lineage_count(&self, i: usize) -> usize;

    /// Lineages lost at the end of interval `i`, negative when samples are added.
    fn coalescent_events(&self, i: usize) -> i64 {
        let current = self.lineage_count(i) as i64;
        if i + 1 < self.interval_count() {
            current - self.lineage_count(i + 1) as i64
        } else {
            current - 1
        }
    }

    fn interval_type(&self, i: usize) -> IntervalType {
        match self.coalescent_events(i) {
            e if e > 0 => IntervalType::Coalescent,
            e if e < 0 => IntervalType::Sample,
            _ => IntervalType::Nothing,
        }
    }

    fn total_duration(&self) -> f64 {
        (0..self.interval_count()).map(|i| self.interval(i)).sum()
    }

    /// True when no interval ends in more than one coalescence.
    fn is_binary_coalescent(&self) -> bool {
        (0..self.interval_count()).all(|i| self.coalescent_events(i) <= 1)
    }

    /// True when every interval ends in at least one coalescence.
    fn is_coalescent_only(&self) -> bool {
        (0..self.interval_count()).all(|i| self.coalescent_events(i) >= 1)
    }

    /// Lineages present at time `t`, one beyond the last interval.
    fn lineage_count_at(&self, t: f64) -> usize {
        let mut t = t;
        let mut i = 0;
        while i < self.interval_count() && t > self.interval(i) {
            t -= self.interval(i);
            i += 1;
        }
        if i == self.interval_count() {
            1
        } else {
            self.lineage_count(i)
        }
    }

    /// Node spread statistic of Pybus et al. (2000) on the coalescent scale. Only
    /// defined for contemporaneous samples.
    fn delta(&self) -> Result<f64> {
        if !self.is_coalescent_only() {
            bail!(IntervalError {
                message: String::from(
                    "Delta statistic needs every interval to end in a coalescence"
                )
            });
        }
        let n = self.interval_count();
        let tips = (n + 1) as f64;
        let mut depth = 0.0;
        let mut cumulative = 0.0;
        let mut sum = 0.0;
        for i in 0..n {
            let transformed = self.interval(i) * choose2(self.lineage_count(i));
            // the last interval is left out of the sum
            sum += cumulative;
            cumulative += transformed;
            depth += transformed;
        }
        sum *= 1.0 / (tips - 2.0);
        let top = depth / 2.0 - sum;
        let bottom = depth * (1.0 / (12.0 * (tips - 2.0))).sqrt();
        Ok(top / bottom)
    }
}

/// Intervals between consecutive node heights of a tree.
#[derive(Debug, Clone)]
pub struct TreeIntervals {
    intervals: Vec<f64>,
    lineage_counts: Vec<usize>,
    lineages_added: Vec<Vec<NodeIdx>>,
    lineages_removed: Vec<Vec<NodeIdx>>,
    sample_count: usize,
    multifurcation_limit: f64,
}

impl TreeIntervals {
    /// Intervals with samples at equal heights merged and every coalescence in an
    /// interval of its own.
    ///
    /// # Example
    /// ```
    /// use phylo_beagle::coalescent::{IntervalList, IntervalType, TreeIntervals};
    /// use phylo_beagle::tree::tree_parser::from_newick;
    /// let tree = from_newick("((A:1.0,B:1.0):2.0,C:3.0);").unwrap().pop().unwrap();
    /// let intervals = TreeIntervals::new(&tree);
    /// assert_eq!(intervals.interval_count(), 2);
    /// assert_eq!(intervals.lineage_count(0), 3);
    /// assert_eq!(intervals.interval_type(1), IntervalType::Coalescent);
    /// assert_eq!(intervals.total_duration(), 3.0);
    /// ```
    pub fn new(tree: &Tree) -> Self {
        Self::with_multifurcation_limit(tree, 0.0)
    }

    /// Events closer than `limit` in time are merged into one. With a limit of zero only
    /// simultaneous samples are merged.
    pub fn with_multifurcation_limit(tree: &Tree, limit: f64) -> Self {
        let mut intervals = Self {
            intervals: Vec::with_capacity(tree.len()),
            lineage_counts: Vec::with_capacity(tree.len()),
            lineages_added: vec![Vec::new(); tree.len()],
            lineages_removed: vec![Vec::new(); tree.len()],
            sample_count: tree.n(),
            multifurcation_limit: limit,
        };
        intervals.calculate(tree);
        intervals
    }

    fn calculate(&mut self, tree: &Tree) {
        let limit = self.multifurcation_limit;
        let mut order: Vec<&crate::tree::Node> = tree.nodes.iter().collect();
        order.sort_by(|a, b| a.height.total_cmp(&b.height));
        if order.is_empty() {
            return;
        }

        let mut start = order[0].height;
        let mut lines = 0usize;
        let mut next_node = 0;
        while next_node < order.len() {
            let mut removed = 0;
            let mut added = 0;
            let finish = order[next_node].height;
            loop {
                let node = order[next_node];
                let current = self.intervals.len();
                next_node += 1;
                if node.children.is_empty() {
                    self.lineages_added[current].push(node.idx);
                    added += 1;
                } else {
                    removed += node.children.len() - 1;
                    self.lineages_removed[current].extend(node.children.iter().cloned());
                    self.lineages_added[current].push(node.idx);
                    if limit == 0.0 {
                        break;
                    }
                }
                match order.get(next_node) {
                    Some(next) if (next.height - finish).abs() <= limit => continue,
                    _ => break,
                }
            }

            if added > 0 {
                if !self.intervals.is_empty() || finish - start > limit {
                    self.push(finish - start, lines);
                }
                start = finish;
            }
            lines += added;
            if removed > 0 {
                self.push(finish - start, lines);
                start = finish;
            }
            lines -= removed;
        }
        debug!(
            "Extracted {} intervals from a tree with {} leaves.",
            self.intervals.len(),
            self.sample_count
        );
    }

    fn push(&mut self, duration: f64, lineages: usize) {
        self.intervals.push(duration);
        self.lineage_counts.push(lineages);
    }

    pub fn multifurcation_limit(&self) -> f64 {
        self.multifurcation_limit
    }

    pub fn intervals(&self) -> &[f64] {
        &self.intervals
    }

    /// Nodes whose lineages start while interval `i` is being closed.
    pub fn lineages_added(&self, i: usize) -> &[NodeIdx] {
        &self.lineages_added[i]
    }

    /// Nodes whose lineages end while interval `i` is being closed.
    pub fn lineages_removed(&self, i: usize) -> &[NodeIdx] {
        &self.lineages_removed[i]
    }

    /// Time since the most recent sample of every coalescence, one entry per merged
    /// lineage.
    pub fn coalescent_times(&self) -> Vec<f64> {
        let mut times = Vec::new();
        let mut time = 0.0;
        for (i, duration) in self.intervals.iter().enumerate() {
            time += duration;
            for _ in 0..self.coalescent_events(i).max(0) {
                times.push(time);
            }
        }
        times
    }
}

impl IntervalList for TreeIntervals {
    fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    fn sample_count(&self) -> usize {
        self.sample_count
    }

    fn interval(&self, i: usize) -> f64 {
        self.intervals[i]
    }

    fn lineage_count(&self, i: usize) -> usize {
        self.lineage_counts[i]
    }
}

#[cfg(test)]
mod tests;
