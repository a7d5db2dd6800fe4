//! All-pairs divergence matrices.

use super::{
    check_time_calibration, check_windows, sample_set_weights, StatMode, StatsError, StatsOptions,
    StatsResult,
};
use crate::lca::SvTables;
use crate::newtypes::NodeId;
use crate::stats::StatePropagator;
use crate::trees::TreeFlags;
use crate::treeseq::TreeSequence;

/// Compute the matrix of mean pairwise divergences between
/// sample sets.
///
/// Branch mode rebuilds a Schieber-Vishkin LCA index once per
/// tree and evaluates every sample pair against it; site mode
/// groups samples by genotype at each site.  Pairs with no
/// common ancestor in a tree contribute the lengths of their
/// paths to their respective roots.
///
/// # Returns
///
/// A flat vector in `[window][set][set]` layout.  Entry
/// `(i, j)` is the mean divergence between a sample from set
/// `i` and a sample from set `j`; diagonal entries average over
/// distinct pairs within the set.
///
/// # Errors
///
/// [`StatsError::UnsupportedStatMode`] for node mode.
pub fn divergence_matrix(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    windows: Option<&[f64]>,
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    if options.mode == StatMode::Node {
        return Err(StatsError::UnsupportedStatMode);
    }
    let w = match windows {
        Some(w) => w.to_vec(),
        None => vec![0.0, ts.sequence_length().raw()],
    };
    check_windows(ts, &w, true)?;
    check_time_calibration(ts, options)?;
    let sets = sample_set_weights(ts, sample_sets)?;
    let k = sets.num_sets;
    let num_windows = w.len() - 1;

    let mut result = match options.mode {
        StatMode::Branch => branch_divergence_matrix(ts, sample_sets, k, &w)?,
        StatMode::Site => site_divergence_matrix(ts, &sets.weights, &sets.sizes, &w)?,
        StatMode::Node => unreachable!(),
    };

    // mean over ordered pairs, excluding self pairs on the
    // diagonal
    for wi in 0..num_windows {
        for i in 0..k {
            for j in 0..k {
                let (ni, nj) = (sets.sizes[i], sets.sizes[j]);
                let pairs = if i == j { ni * (ni - 1.0) } else { ni * nj };
                let cell = &mut result[(wi * k + i) * k + j];
                if pairs > 0.0 {
                    *cell /= pairs;
                } else {
                    *cell = 0.0;
                }
            }
        }
    }

    if options.span_normalise {
        for wi in 0..num_windows {
            let span = w[wi + 1] - w[wi];
            for x in result[wi * k * k..(wi + 1) * k * k].iter_mut() {
                *x /= span;
            }
        }
    }
    Ok(result)
}

fn branch_divergence_matrix(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    k: usize,
    windows: &[f64],
) -> StatsResult<Vec<f64>> {
    let num_windows = windows.len() - 1;
    let mut result = vec![0.0; num_windows * k * k];
    let mut tree = ts.tree_iterator(TreeFlags::default())?;
    let time = |u: NodeId| ts.tables_ref().node(u).time.raw();

    let mut pair_sums = vec![0.0; k * k];
    while tree.next_tree() {
        let sv = SvTables::new(&tree)?;
        let vroot = tree.virtual_root();

        // time from each relevant sample up to the root of its
        // subtree, for pairs that only meet at the virtual root
        let mut root_path: Vec<Vec<f64>> = Vec::with_capacity(k);
        for set in sample_sets.iter() {
            let mut v = Vec::with_capacity(set.len());
            for u in set.iter() {
                let mut w = *u;
                let mut p = tree.parent(w)?;
                while p != NodeId::NULL {
                    w = p;
                    p = tree.parent(w)?;
                }
                v.push(time(w) - time(*u));
            }
            root_path.push(v);
        }

        for x in pair_sums.iter_mut() {
            *x = 0.0;
        }
        for i in 0..k {
            for j in i..k {
                let mut total = 0.0;
                for (a, u) in sample_sets[i].iter().enumerate() {
                    for (b, v) in sample_sets[j].iter().enumerate() {
                        if u == v {
                            continue;
                        }
                        let m = sv.mrca(*u, *v);
                        let d = if m == vroot {
                            root_path[i][a] + root_path[j][b]
                        } else {
                            2.0 * time(m) - time(*u) - time(*v)
                        };
                        total += d;
                    }
                }
                // ordered-pair totals
                if i == j {
                    pair_sums[i * k + i] = total;
                } else {
                    pair_sums[i * k + j] = total;
                    pair_sums[j * k + i] = total;
                }
            }
        }

        // split over windows
        let (left, right) = tree.interval();
        let (left, right) = (left.raw(), right.raw());
        for wi in 0..num_windows {
            let a = windows[wi].max(left);
            let b = windows[wi + 1].min(right);
            if b > a {
                for c in 0..k * k {
                    result[wi * k * k + c] += pair_sums[c] * (b - a);
                }
            }
        }
    }
    Ok(result)
}

fn site_divergence_matrix(
    ts: &TreeSequence,
    weights: &[f64],
    sizes: &[f64],
    windows: &[f64],
) -> StatsResult<Vec<f64>> {
    let k = sizes.len();
    let num_windows = windows.len() - 1;
    let mut result = vec![0.0; num_windows * k * k];
    let mut prop = StatePropagator::new(ts, weights, k);
    let mut pos = crate::tree_position::TreePosition::new(ts);
    let mut window_index = 0;
    let mut allele_counts: Vec<(Option<Vec<u8>>, Vec<f64>)> = vec![];

    while pos.next() {
        for e in pos.edges_out() {
            let edge = ts.tables_ref().edge(e);
            prop.parent[edge.child.0 as usize] = NodeId::NULL;
            prop.propagate(edge.child, edge.parent, -1.0);
        }
        for e in pos.edges_in() {
            let edge = ts.tables_ref().edge(e);
            prop.parent[edge.child.0 as usize] = edge.parent;
            prop.propagate(edge.child, edge.parent, 1.0);
        }
        let tree_index = pos.index().unwrap();
        for s in ts.tree_site_range(tree_index) {
            let site = &ts.tables_ref().sites()[s];
            allele_counts.clear();
            allele_counts.push((site.ancestral_state.clone(), sizes.to_vec()));
            for m in ts.site_mutation_range(s) {
                let mutation = &ts.tables_ref().mutations()[m];
                let node_state = prop.node_state(mutation.node).to_vec();
                let derived = mutation.derived_state.clone();
                match allele_counts.iter_mut().find(|(a, _)| *a == derived) {
                    Some((_, st)) => {
                        for c in 0..k {
                            st[c] += node_state[c];
                        }
                    }
                    None => allele_counts.push((derived, node_state.clone())),
                }
                let inherited = ts.mutation_inherited_state(m).map(|x| x.to_vec());
                if let Some((_, st)) = allele_counts.iter_mut().find(|(a, _)| *a == inherited) {
                    for c in 0..k {
                        st[c] -= node_state[c];
                    }
                }
            }
            while window_index < num_windows - 1
                && windows[window_index + 1] <= site.position.raw()
            {
                window_index += 1;
            }
            // ordered pairs with different alleles: n_i n_j
            // minus the same-allele pairs
            for i in 0..k {
                for j in 0..k {
                    let mut same = 0.0;
                    for (_, counts) in allele_counts.iter() {
                        same += counts[i] * counts[j];
                    }
                    result[(window_index * k + i) * k + j] += sizes[i] * sizes[j] - same;
                }
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod test_divergence_matrix {
    use super::*;
    use crate::prelude::*;
    use crate::stats::{divergence, StatsOptions};

    fn pair_treeseq_with_site() -> TreeSequence {
        let mut tables = TableCollection::new(10.0).unwrap();
        let root = tables.add_node(1.0, 0).unwrap();
        let a = tables.add_sample_node(0.0).unwrap();
        let _b = tables.add_sample_node(0.0).unwrap();
        tables.add_edge(0.0, 10.0, root, 1).unwrap();
        tables.add_edge(0.0, 10.0, root, 2).unwrap();
        let s = tables.add_site(5.0, Some(b"A".to_vec())).unwrap();
        tables
            .add_mutation(s, a, MutationId::NULL, Time::UNKNOWN, Some(b"T".to_vec()))
            .unwrap();
        tables.sort_tables(TableSortingFlags::default());
        tables.build_index(IndexTablesFlags::empty()).unwrap();
        TreeSequence::new(tables, TreeSequenceFlags::empty()).unwrap()
    }

    #[test]
    fn test_branch_matrix_two_singletons() {
        let ts = pair_treeseq_with_site();
        let a = [NodeId::from(1)];
        let b = [NodeId::from(2)];
        let opts = StatsOptions {
            mode: crate::stats::StatMode::Branch,
            ..StatsOptions::default()
        };
        let m = divergence_matrix(&ts, &[&a, &b], None, &opts).unwrap();
        assert_eq!(m.len(), 4);
        // diagonal: no distinct pairs
        assert_eq!(m[0], 0.0);
        assert_eq!(m[3], 0.0);
        // off-diagonal: both paths to the MRCA
        assert!((m[1] - 2.0).abs() < 1e-12);
        assert!((m[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_branch_matrix_matches_divergence_stat() {
        let ts = pair_treeseq_with_site();
        let a = [NodeId::from(1)];
        let b = [NodeId::from(2)];
        let opts = StatsOptions {
            mode: crate::stats::StatMode::Branch,
            ..StatsOptions::default()
        };
        let m = divergence_matrix(&ts, &[&a, &b], None, &opts).unwrap();
        let d = divergence(&ts, &[&a, &b], &[[0, 1]], None, &opts).unwrap();
        assert!((m[1] - d[0]).abs() < 1e-12);
    }

    #[test]
    fn test_site_matrix_counts_differences() {
        let ts = pair_treeseq_with_site();
        let a = [NodeId::from(1)];
        let b = [NodeId::from(2)];
        let opts = StatsOptions {
            mode: crate::stats::StatMode::Site,
            span_normalise: false,
            ..StatsOptions::default()
        };
        let m = divergence_matrix(&ts, &[&a, &b], None, &opts).unwrap();
        // one site at which the pair differs
        assert!((m[1] - 1.0).abs() < 1e-12);
        assert_eq!(m[0], 0.0);
    }

    #[test]
    fn test_disjoint_roots_use_root_paths() {
        // two disconnected cherries: 4 -> (0,1), 5 -> (2,3)
        let mut tables = TableCollection::new(10.0).unwrap();
        for _ in 0..4 {
            tables.add_sample_node(0.0).unwrap();
        }
        tables.add_node(1.0, 0).unwrap();
        tables.add_node(2.0, 0).unwrap();
        tables.add_edge(0.0, 10.0, 4, 0).unwrap();
        tables.add_edge(0.0, 10.0, 4, 1).unwrap();
        tables.add_edge(0.0, 10.0, 5, 2).unwrap();
        tables.add_edge(0.0, 10.0, 5, 3).unwrap();
        tables.sort_tables(TableSortingFlags::default());
        tables.build_index(IndexTablesFlags::empty()).unwrap();
        let ts = TreeSequence::new(tables, TreeSequenceFlags::empty()).unwrap();
        let a = [NodeId::from(0)];
        let c = [NodeId::from(2)];
        let opts = StatsOptions {
            mode: crate::stats::StatMode::Branch,
            ..StatsOptions::default()
        };
        let m = divergence_matrix(&ts, &[&a, &c], None, &opts).unwrap();
        // node 0's path to its root is 1.0, node 2's is 2.0
        assert!((m[1] - 3.0).abs() < 1e-12);
    }
}
