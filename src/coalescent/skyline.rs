use anyhow::bail;
use log::debug;

use crate::coalescent::population::PopulationError;
use crate::coalescent::{choose2, IntervalList, IntervalType, TreeIntervals};
use crate::Result;

/// Piecewise constant population over groups of consecutive coalescent events, the
/// generalised skyline of Drummond et al. (2005).
///
/// Group `g` covers `group_sizes[g]` coalescences, ordered from the present, and keeps the
/// population size `pop_sizes[g]` until its last coalescence.
#[derive(Debug, Clone, PartialEq)]
pub struct BayesianSkyline {
    pop_sizes: Vec<f64>,
    group_sizes: Vec<usize>,
    cumulative_group_sizes: Vec<usize>,
}

impl BayesianSkyline {
    /// Skyline over a genealogy with `events` coalescences.
    ///
    /// Group sizes that are all zero or all one are treated as unset and replaced by an
    /// even split of the events, earlier groups taking the remainder. Any other sizes must
    /// add up to `events`.
    ///
    /// # Example
    /// ```
    /// use phylo_beagle::coalescent::BayesianSkyline;
    /// let skyline = BayesianSkyline::new(&[1.0, 2.0, 3.0], &[1, 1, 1], 7).unwrap();
    /// assert_eq!(skyline.group_sizes(), &[3, 2, 2]);
    /// ```
    pub fn new(pop_sizes: &[f64], group_sizes: &[usize], events: usize) -> Result<Self> {
        if pop_sizes.is_empty() || pop_sizes.len() != group_sizes.len() {
            bail!(PopulationError {
                message: format!(
                    "Skyline needs one population size per group, got {} sizes for {} groups",
                    pop_sizes.len(),
                    group_sizes.len()
                )
            });
        }
        if let Some(size) = pop_sizes.iter().find(|&&n| !(n.is_finite() && n > 0.0)) {
            bail!(PopulationError {
                message: format!("Population size must be positive and finite, got {}", size)
            });
        }
        let groups = group_sizes.len();
        if groups > events {
            bail!(PopulationError {
                message: format!(
                    "There are {} groups but only {} coalescent events",
                    groups, events
                )
            });
        }

        let covered: usize = group_sizes.iter().sum();
        let group_sizes = if covered == events {
            group_sizes.to_vec()
        } else if covered == 0 || covered == groups {
            let (each, extra) = (events / groups, events % groups);
            let split: Vec<usize> = (0..groups)
                .map(|g| if g < extra { each + 1 } else { each })
                .collect();
            debug!("Split {} coalescent events into groups {:?}.", events, split);
            split
        } else {
            bail!(PopulationError {
                message: format!(
                    "Group sizes add up to {} but the genealogy has {} coalescent events",
                    covered, events
                )
            });
        };
        if group_sizes.contains(&0) {
            bail!(PopulationError {
                message: format!("Every group needs at least one event, got {:?}", group_sizes)
            });
        }

        let cumulative_group_sizes = group_sizes
            .iter()
            .scan(0, |total, &size| {
                *total += size;
                Some(*total)
            })
            .collect();
        Ok(Self {
            pop_sizes: pop_sizes.to_vec(),
            group_sizes,
            cumulative_group_sizes,
        })
    }

    /// Skyline sized for the coalescences of `intervals`.
    pub fn for_intervals(
        pop_sizes: &[f64],
        group_sizes: &[usize],
        intervals: &TreeIntervals,
    ) -> Result<Self> {
        Self::new(pop_sizes, group_sizes, intervals.coalescent_times().len())
    }

    pub fn pop_sizes(&self) -> &[f64] {
        &self.pop_sizes
    }

    pub fn group_sizes(&self) -> &[usize] {
        &self.group_sizes
    }

    pub fn event_count(&self) -> usize {
        self.cumulative_group_sizes.last().copied().unwrap_or(0)
    }

    /// Population size at time `t`, given the ascending coalescence times of the genealogy.
    /// A coalescence belongs to the group it closes.
    pub fn pop_size(&self, coalescent_times: &[f64], t: f64) -> f64 {
        let last = self.pop_sizes.len() - 1;
        match coalescent_times.last() {
            Some(&latest) if t <= latest => {
                let epoch = coalescent_times.partition_point(|&c| c < t);
                let group = self.cumulative_group_sizes.partition_point(|&c| c <= epoch);
                self.pop_sizes[group.min(last)]
            }
            _ => self.pop_sizes[last],
        }
    }

    /// Log density of the intervals, with the population size of every interval taken
    /// at its midpoint. Simultaneous coalescences add zero-width terms at the start of
    /// their interval.
    pub fn log_likelihood(&self, intervals: &TreeIntervals) -> Result<f64> {
        let times = intervals.coalescent_times();
        if times.len() != self.event_count() {
            bail!(PopulationError {
                message: format!(
                    "Skyline covers {} coalescent events but the intervals have {}",
                    self.event_count(),
                    times.len()
                )
            });
        }

        let mut log_likelihood = 0.0;
        let mut current = 0.0;
        for i in 0..intervals.interval_count() {
            let width = intervals.interval(i);
            let lineages = intervals.lineage_count(i);
            let size = self.pop_size(&times, current + width / 2.0);
            log_likelihood +=
                interval_log_likelihood(size, width, lineages, intervals.interval_type(i));

            let extra = intervals.coalescent_events(i) - 1;
            if extra > 0 {
                let size = self.pop_size(&times, current);
                for k in 0..extra as usize {
                    log_likelihood += interval_log_likelihood(
                        size,
                        0.0,
                        lineages - k - 1,
                        IntervalType::Coalescent,
                    );
                }
            }
            current += width;
        }
        debug!(
            "Skyline log-likelihood over {} groups: {}",
            self.pop_sizes.len(),
            log_likelihood
        );
        Ok(log_likelihood)
    }
}

/// Log density of one interval of `width` spanned by `lineages` under a constant `pop_size`.
pub fn interval_log_likelihood(
    pop_size: f64,
    width: f64,
    lineages: usize,
    interval_type: IntervalType,
) -> f64 {
    let mut log_likelihood = -choose2(lineages) * width / pop_size;
    if interval_type == IntervalType::Coalescent {
        log_likelihood -= pop_size.ln();
    }
    log_likelihood
}
