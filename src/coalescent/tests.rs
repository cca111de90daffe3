use approx::assert_relative_eq;
use assert_matches::assert_matches;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rstest::rstest;

use crate::coalescent::{
    simulate_coalescent_tree, ConstantPopulation, IntervalError, IntervalList, IntervalType,
    TreeIntervals,
};
use crate::tree;
use crate::tree::{
    NodeIdx::{Internal as I, Leaf as L},
    Tree,
};

fn two_cherries_at(left: f64, right: f64) -> Tree {
    let mut tree = Tree::with_leaves(&["A", "B", "C", "D"], &[0.0; 4]).unwrap();
    let ab = tree.add_parent(&[L(0), L(1)], left).unwrap();
    let cd = tree.add_parent(&[L(2), L(3)], right).unwrap();
    tree.add_parent(&[ab, cd], 2.0).unwrap();
    tree.complete().unwrap();
    tree
}

fn serially_sampled() -> Tree {
    // B at 0, A at 0.5, AB at 2, C at 2.5, root at 3
    let mut tree = Tree::with_leaves(&["A", "B", "C"], &[0.5, 0.0, 2.5]).unwrap();
    let ab = tree.add_parent(&[L(0), L(1)], 2.0).unwrap();
    tree.add_parent(&[ab, L(2)], 3.0).unwrap();
    tree.complete().unwrap();
    tree
}

#[test]
fn ladder_tree_intervals() {
    let tree = tree!("(((A:1,B:1):1,C:2):1,D:3);");
    let intervals = TreeIntervals::new(&tree);
    assert_eq!(intervals.interval_count(), 3);
    assert_eq!(intervals.intervals(), &[1.0, 1.0, 1.0]);
    assert_eq!(
        (0..3).map(|i| intervals.lineage_count(i)).collect::<Vec<_>>(),
        vec![4, 3, 2]
    );
    assert_eq!(
        (0..3).map(|i| intervals.coalescent_events(i)).collect::<Vec<_>>(),
        vec![1, 1, 1]
    );
    assert!((0..3).all(|i| intervals.interval_type(i) == IntervalType::Coalescent));
    assert!(intervals.is_binary_coalescent());
    assert!(intervals.is_coalescent_only());
    assert_eq!(intervals.total_duration(), 3.0);
    assert_eq!(intervals.sample_count(), 4);
    assert_eq!(intervals.coalescent_times(), vec![1.0, 2.0, 3.0]);
}

#[rstest]
#[case(0.0, 4)]
#[case(0.5, 4)]
#[case(1.0, 4)]
#[case(1.5, 3)]
#[case(2.5, 2)]
#[case(10.0, 1)]
fn lineages_through_time(#[case] time: f64, #[case] expected: usize) {
    let intervals = TreeIntervals::new(&tree!("(((A:1,B:1):1,C:2):1,D:3);"));
    assert_eq!(intervals.lineage_count_at(time), expected);
}

#[test]
fn delta_of_a_ladder() {
    let intervals = TreeIntervals::new(&tree!("(((A:1,B:1):1,C:2):1,D:3);"));
    // transformed intervals 6, 3, 1
    assert_relative_eq!(
        intervals.delta().unwrap(),
        -(1.5_f64).sqrt(),
        epsilon = 1e-12
    );
}

#[test]
fn serial_samples_open_sample_intervals() {
    let intervals = TreeIntervals::new(&serially_sampled());
    assert_eq!(intervals.intervals(), &[0.5, 1.5, 0.5, 0.5]);
    assert_eq!(
        (0..4).map(|i| intervals.lineage_count(i)).collect::<Vec<_>>(),
        vec![1, 2, 1, 2]
    );
    assert_eq!(
        (0..4).map(|i| intervals.interval_type(i)).collect::<Vec<_>>(),
        vec![
            IntervalType::Sample,
            IntervalType::Coalescent,
            IntervalType::Sample,
            IntervalType::Coalescent
        ]
    );
    assert!(intervals.is_binary_coalescent());
    assert!(!intervals.is_coalescent_only());
    assert_eq!(intervals.total_duration(), 3.0);
    assert_eq!(intervals.coalescent_times(), vec![2.0, 3.0]);
    assert_eq!(intervals.lineages_added(0), &[L(1), L(0)]);
    assert_eq!(intervals.lineages_added(1), &[I(3)]);
    assert_eq!(intervals.lineages_removed(1), &[L(0), L(1)]);
    assert_eq!(intervals.lineage_count_at(0.25), 1);
    assert_eq!(intervals.lineage_count_at(1.0), 2);
}

#[test]
fn delta_needs_coalescent_only_intervals() {
    let intervals = TreeIntervals::new(&serially_sampled());
    let err = intervals.delta().unwrap_err();
    assert_matches!(err.downcast_ref::<IntervalError>(), Some(_));
}

#[test]
fn simultaneous_coalescences_stay_separate_at_zero_limit() {
    let intervals = TreeIntervals::new(&two_cherries_at(1.0, 1.0));
    assert_eq!(intervals.intervals(), &[1.0, 0.0, 1.0]);
    assert_eq!(
        (0..3).map(|i| intervals.lineage_count(i)).collect::<Vec<_>>(),
        vec![4, 3, 2]
    );
    assert!(intervals.is_binary_coalescent());
}

#[rstest]
#[case(1.0, 1.0)]
#[case(1.0, 1.2)]
fn close_coalescences_merge_within_limit(#[case] left: f64, #[case] right: f64) {
    let intervals = TreeIntervals::with_multifurcation_limit(&two_cherries_at(left, right), 0.5);
    assert_eq!(intervals.multifurcation_limit(), 0.5);
    assert_eq!(intervals.interval_count(), 2);
    assert_eq!(intervals.lineage_count(0), 4);
    assert_eq!(intervals.coalescent_events(0), 2);
    assert_eq!(intervals.coalescent_events(1), 1);
    assert!(!intervals.is_binary_coalescent());
    assert!(intervals.is_coalescent_only());
    assert_relative_eq!(intervals.total_duration(), 2.0);
}

#[test]
fn multifurcation_removes_several_lineages() {
    let tree = tree!("((A:1,B:1,C:1):1,D:2);");
    let intervals = TreeIntervals::new(&tree);
    assert_eq!(intervals.intervals(), &[1.0, 1.0]);
    assert_eq!(intervals.coalescent_events(0), 2);
    assert_eq!(intervals.lineages_removed(0).len(), 3);
    assert!(!intervals.is_binary_coalescent());
    assert_eq!(intervals.coalescent_times(), vec![1.0, 1.0, 2.0]);
}

#[test]
fn single_leaf_has_no_intervals() {
    let mut tree = Tree::with_leaves(&["A"], &[0.0]).unwrap();
    tree.complete().unwrap();
    let intervals = TreeIntervals::new(&tree);
    assert_eq!(intervals.interval_count(), 0);
    assert_eq!(intervals.total_duration(), 0.0);
    assert_eq!(intervals.lineage_count_at(0.0), 1);
}

#[rstest]
#[case(2, 1)]
#[case(3, 7)]
#[case(10, 11)]
#[case(40, 13)]
fn binary_intervals_span_the_tree(#[case] n: usize, #[case] seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let population = ConstantPopulation::new(1.0).unwrap();
    let tree = simulate_coalescent_tree(n, &population, &mut rng).unwrap();
    let intervals = TreeIntervals::new(&tree);

    assert_eq!(intervals.interval_count(), n - 1);
    assert_eq!(
        (0..n - 1).map(|i| intervals.lineage_count(i)).collect::<Vec<_>>(),
        (2..=n).rev().collect::<Vec<_>>()
    );
    assert!(intervals.is_binary_coalescent());
    assert!(intervals.is_coalescent_only());
    let area: f64 = (0..n - 1)
        .map(|i| intervals.interval(i) * intervals.lineage_count(i) as f64)
        .sum();
    assert_relative_eq!(area, tree.total_branch_length(), max_relative = 1e-12);
}
