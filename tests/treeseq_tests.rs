//! Whole-sequence tree iteration properties, checked against
//! from-scratch reconstructions on randomized tree sequences.

mod common;

use common::{parents_at, random_tree_sequence, total_branch_length_at};
use proptest::prelude::*;
use streaming_iterator::StreamingIterator;
use treeseq::prelude::*;

fn treeseq_from(seed: u64) -> TreeSequence {
    let tables = random_tree_sequence(seed, 8, 6, 100.0);
    TreeSequence::new(tables, TreeSequenceFlags::empty()).unwrap()
}

#[test]
fn test_replay_matches_independent_reconstruction() {
    for seed in [1, 7, 42, 1234] {
        let ts = treeseq_from(seed);
        let mut tree = ts.tree_iterator(TreeFlags::default()).unwrap();
        let mut num_trees = 0;
        while tree.next_tree() {
            let (left, right) = tree.interval();
            let mid = (left.raw() + right.raw()) / 2.0;
            let expected = parents_at(ts.tables_ref(), mid);
            for u in 0..ts.num_nodes() {
                assert_eq!(
                    tree.parent(u).unwrap(),
                    expected[u],
                    "seed {seed}, node {u}, interval {left}..{right}"
                );
            }
            let tbl = total_branch_length_at(ts.tables_ref(), mid);
            assert!(
                (tree.total_branch_length(false).unwrap() - tbl).abs() < 1e-9,
                "seed {seed}"
            );
            num_trees += 1;
        }
        assert_eq!(num_trees, ts.num_trees());
    }
}

#[test]
fn test_reverse_iteration_matches_forward() {
    for seed in [3, 99] {
        let ts = treeseq_from(seed);
        let mut forward: Vec<Vec<NodeId>> = vec![];
        let mut tree = ts.tree_iterator(TreeFlags::default()).unwrap();
        while tree.next_tree() {
            forward.push((0..ts.num_nodes()).map(|u| tree.parent(u).unwrap()).collect());
        }
        let mut backward: Vec<Vec<NodeId>> = vec![];
        let mut tree = ts.tree_iterator(TreeFlags::default()).unwrap();
        while tree.prev_tree() {
            backward.push((0..ts.num_nodes()).map(|u| tree.parent(u).unwrap()).collect());
        }
        backward.reverse();
        assert_eq!(forward, backward);
    }
}

#[test]
fn test_seek_lands_on_the_right_tree() {
    let ts = treeseq_from(5);
    let length = ts.sequence_length().raw();
    let positions: Vec<f64> = (0..50).map(|i| i as f64 * length / 50.0).collect();
    for x in positions {
        let mut sought = ts.tree_iterator(TreeFlags::default()).unwrap();
        sought.seek(x).unwrap();
        let (l, r) = sought.interval();
        assert!(l.raw() <= x && x < r.raw());

        // a fresh linear replay must agree on every link
        let mut stepped = ts.tree_iterator(TreeFlags::default()).unwrap();
        while stepped.next_tree() {
            if stepped.index() == sought.index() {
                break;
            }
        }
        // parent links and counts are direction-independent;
        // sibling order is not, so it is not compared here
        for u in 0..=ts.num_nodes() {
            assert_eq!(sought.parent(u).unwrap(), stepped.parent(u).unwrap());
            assert_eq!(
                sought.num_samples_below(u).unwrap(),
                stepped.num_samples_below(u).unwrap()
            );
        }
        assert_eq!(sought.num_roots().unwrap(), stepped.num_roots().unwrap());
    }
}

#[test]
fn test_seek_from_any_starting_tree() {
    let ts = treeseq_from(11);
    let num_trees = ts.num_trees() as usize;
    for start in 0..num_trees {
        for target in 0..num_trees {
            let mut tree = ts.tree_iterator(TreeFlags::default()).unwrap();
            tree.seek_index(start).unwrap();
            tree.seek_index(target).unwrap();
            assert_eq!(tree.index(), Some(target));
            let mut fresh = ts.tree_iterator(TreeFlags::default()).unwrap();
            fresh.seek_index(target).unwrap();
            for u in 0..ts.num_nodes() {
                assert_eq!(tree.parent(u).unwrap(), fresh.parent(u).unwrap());
            }
        }
    }
}

#[test]
fn test_sample_counts_survive_round_trips() {
    let ts = treeseq_from(21);
    let mut tree = ts.tree_iterator(TreeFlags::default()).unwrap();
    tree.next_tree();
    let reference: Vec<usize> = (0..=ts.num_nodes())
        .map(|u| tree.num_samples_below(u).unwrap())
        .collect();
    // shuttle forth and back; the first tree must be intact
    for _ in 0..3 {
        tree.next_tree();
    }
    for _ in 0..3 {
        tree.prev_tree();
    }
    let after: Vec<usize> = (0..=ts.num_nodes())
        .map(|u| tree.num_samples_below(u).unwrap())
        .collect();
    assert_eq!(reference, after);
}

#[test]
fn test_counts_match_postorder_rederivation() {
    let ts = treeseq_from(34);
    let mut iter = ts.tree_iterator(TreeFlags::default()).unwrap();
    while let Some(tree) = iter.next() {
        let mut counts = vec![0usize; ts.num_nodes() + 1];
        for u in tree.postorder().unwrap() {
            let mut c = usize::from(ts.is_sample(u));
            for v in tree.children(u).unwrap() {
                c += counts[usize::from(v)];
            }
            counts[usize::from(u)] = c;
        }
        for u in 0..ts.num_nodes() {
            // nodes outside the tree hold count 0 in both views
            assert_eq!(tree.num_samples_below(u).unwrap(), counts[u]);
        }
    }
}

#[test]
fn test_streaming_iterator_covers_all_breakpoints() {
    let ts = treeseq_from(55);
    let mut iter = ts.tree_iterator(TreeFlags::default()).unwrap();
    let mut edges = vec![];
    while let Some(tree) = iter.next() {
        let (l, r) = tree.interval();
        edges.push((l, r));
    }
    assert_eq!(edges.len(), ts.num_trees() as usize);
    assert_eq!(edges[0].0.raw(), 0.0);
    assert_eq!(edges[edges.len() - 1].1, ts.sequence_length());
    for w in edges.windows(2) {
        assert_eq!(w[0].1, w[1].0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn proptest_replay_any_seed(seed in 0u64..10_000) {
        let ts = treeseq_from(seed);
        let mut tree = ts.tree_iterator(TreeFlags::default()).unwrap();
        while tree.next_tree() {
            let (left, right) = tree.interval();
            let mid = (left.raw() + right.raw()) / 2.0;
            let expected = parents_at(ts.tables_ref(), mid);
            for u in 0..ts.num_nodes() {
                prop_assert_eq!(tree.parent(u).unwrap(), expected[u]);
            }
        }
    }

    #[test]
    fn proptest_seek_equals_replay(seed in 0u64..10_000, frac in 0.0f64..1.0) {
        let ts = treeseq_from(seed);
        let x = frac * ts.sequence_length().raw();
        let x = x.min(ts.sequence_length().raw() - 1e-9);
        let mut sought = ts.tree_iterator(TreeFlags::default()).unwrap();
        sought.seek(x).unwrap();
        let expected = parents_at(ts.tables_ref(), x);
        for u in 0..ts.num_nodes() {
            prop_assert_eq!(sought.parent(u).unwrap(), expected[u]);
        }
    }
}
