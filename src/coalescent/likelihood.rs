use anyhow::bail;
use log::{debug, info};
use rand::Rng;

use crate::coalescent::population::{simulated_interval, PopulationError};
use crate::coalescent::{choose2, IntervalList, IntervalType, PopulationFunction};
use crate::tree::{NodeIdx, Tree};
use crate::Result;

/// Log density of a set of coalescent intervals under `population`.
///
/// Every interval contributes `-C(k, 2) ∫ 1/N`, and every coalescent interval adds
/// `-ln N` at its end point. Returns negative infinity when an interval of positive
/// duration has zero coalescent area, or when the population at a coalescence falls
/// below `threshold` times the harmonic mean over the interval.
pub fn coalescent_log_likelihood<I, P>(intervals: &I, population: &P, threshold: f64) -> f64
where
    I: IntervalList + ?Sized,
    P: PopulationFunction + ?Sized,
{
    let mut log_likelihood = 0.0;
    let mut start = 0.0;
    for i in 0..intervals.interval_count() {
        let duration = intervals.interval(i);
        let finish = start + duration;
        let area = population.integral(start, finish);
        if area == 0.0 && duration != 0.0 {
            return f64::NEG_INFINITY;
        }
        log_likelihood -= choose2(intervals.lineage_count(i)) * area;

        if intervals.interval_type(i) == IntervalType::Coalescent {
            let size = population.pop_size(finish);
            if duration == 0.0 || size * (area / duration) >= threshold {
                log_likelihood -= size.ln();
            } else {
                debug!(
                    "Rejected coalescence at {} with population size {}.",
                    finish, size
                );
                return f64::NEG_INFINITY;
            }
        }
        start = finish;
    }
    log_likelihood
}

/// Simulates a genealogy of `n` contemporaneous samples under `population`, pairing
/// lineages uniformly at random.
pub fn simulate_coalescent_tree<P, R>(n: usize, population: &P, rng: &mut R) -> Result<Tree>
where
    P: PopulationFunction + ?Sized,
    R: Rng,
{
    info!("Simulating a coalescent genealogy of {} samples.", n);
    let ids: Vec<String> = (0..n).map(|i| format!("t{}", i + 1)).collect();
    let heights = vec![0.0; n];
    let mut tree = Tree::with_leaves(&ids, &heights)?;
    let mut active: Vec<NodeIdx> = (0..n).map(NodeIdx::Leaf).collect();
    let mut time = 0.0;
    while active.len() > 1 {
        let waiting = simulated_interval(population, active.len(), time, rng);
        if !waiting.is_finite() || waiting < 0.0 {
            bail!(PopulationError {
                message: format!(
                    "Population function gives no finite coalescence time for {} lineages after {}",
                    active.len(),
                    time
                )
            });
        }
        time += waiting;
        let first = active.swap_remove(rng.gen_range(0..active.len()));
        let second = active.swap_remove(rng.gen_range(0..active.len()));
        let parent = tree.add_parent(&[first, second], time)?;
        active.push(parent);
    }
    tree.complete()?;
    Ok(tree)
}
