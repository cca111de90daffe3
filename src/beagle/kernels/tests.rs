use rand::Rng;
use rstest::*;

use crate::beagle::kernels::{KernelDims, KernelVariant};

fn random_values(len: usize) -> Vec<f64> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(0.0..1.0)).collect()
}

fn random_states(len: usize, state_count: usize) -> Vec<usize> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(0..=state_count)).collect()
}

const DIMS: KernelDims = KernelDims {
    categories: 3,
    patterns: 17,
    states: 4,
};

#[test]
fn variant_is_chosen_by_state_count() {
    assert_eq!(KernelVariant::for_state_count(4), KernelVariant::FourState);
    assert_eq!(KernelVariant::for_state_count(20), KernelVariant::General);
    assert_eq!(KernelVariant::for_state_count(2), KernelVariant::General);
}

#[rstest]
#[case::states_states(0)]
#[case::states_partials(1)]
#[case::partials_partials(2)]
fn four_state_kernels_match_general(#[case] kernel: usize) {
    let size = DIMS.categories * DIMS.patterns * DIMS.states;
    let m1 = random_values(DIMS.categories * 16);
    let m2 = random_values(DIMS.categories * 16);
    let p1 = random_values(size);
    let p2 = random_values(size);
    let s1 = random_states(DIMS.patterns, 4);
    let s2 = random_states(DIMS.patterns, 4);

    let run = |variant: KernelVariant| {
        let mut dest = vec![0.0; size];
        let flag = match kernel {
            0 => variant.states_states(DIMS, &s1, &m1, &s2, &m2, &mut dest),
            1 => variant.states_partials(DIMS, &s1, &m1, &p2, &m2, &mut dest),
            _ => variant.partials_partials(DIMS, &p1, &m1, &p2, &m2, &mut dest),
        };
        (flag, dest)
    };
    assert_eq!(run(KernelVariant::General), run(KernelVariant::FourState));
}

#[test]
fn states_states_treats_ambiguity_as_one() {
    let dims = KernelDims {
        categories: 1,
        patterns: 3,
        states: 3,
    };
    let m1 = [0.8, 0.1, 0.1, 0.2, 0.7, 0.1, 0.3, 0.3, 0.4];
    let m2 = [0.6, 0.3, 0.1, 0.1, 0.6, 0.3, 0.2, 0.2, 0.6];
    let mut dest = vec![0.0; 9];
    let flag =
        KernelVariant::General.states_states(dims, &[0, 3, 3], &m1, &[2, 1, 3], &m2, &mut dest);
    assert_eq!(flag, 0);
    assert_eq!(&dest[0..3], &[0.8 * 0.1, 0.2 * 0.3, 0.3 * 0.6]);
    assert_eq!(&dest[3..6], &[0.3, 0.6, 0.2]);
    assert_eq!(&dest[6..9], &[1.0, 1.0, 1.0]);
}

#[test]
fn states_partials_uses_tip_column_times_child_row() {
    let dims = KernelDims {
        categories: 1,
        patterns: 1,
        states: 2,
    };
    let m1 = [0.9, 0.1, 0.2, 0.8];
    let m2 = [0.75, 0.25, 0.5, 0.5];
    let child = [0.5, 0.25];
    let mut dest = vec![0.0; 2];
    let flag = KernelVariant::General.states_partials(dims, &[1], &m1, &child, &m2, &mut dest);
    assert_eq!(dest, vec![0.1 * 0.4375, 0.8 * 0.375]);
    // 0.04375 has exponent -5, 0.3 has exponent -2
    assert_eq!(flag, 5 | 2);
}

#[test]
fn partials_partials_flags_underflowing_values() {
    let dims = KernelDims {
        categories: 1,
        patterns: 1,
        states: 2,
    };
    let identity = [1.0, 0.0, 0.0, 1.0];
    let mut dest = vec![0.0; 2];
    let flag = KernelVariant::General.partials_partials(
        dims,
        &[1e-100, 1.0],
        &identity,
        &[1e-100, 1.0],
        &identity,
        &mut dest,
    );
    assert_eq!(dest, vec![1e-100 * 1e-100, 1.0]);
    assert!(flag > 600);
}
