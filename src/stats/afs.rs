//! Joint allele frequency spectra.

use super::{
    check_time_calibration, check_windows, sample_set_weights, StatMode, StatsError, StatsOptions,
    StatsResult,
};
use crate::newtypes::NodeId;
use crate::stats::StatePropagator;
use crate::treeseq::TreeSequence;

// Folds a count coordinate onto its minor image: the
// coordinate is replaced by its complement when it lies in the
// "major" half of the spectrum, with ties broken
// coordinate-by-coordinate from the last dimension.
fn fold(coordinate: &mut [usize], dims: &[usize]) {
    let num_dims = dims.len();
    let mut n = 0.0;
    let mut s = 0.0;
    for k in 0..num_dims {
        n += (dims[k] - 1) as f64;
        s += coordinate[k] as f64;
    }
    n /= 2.0;
    let mut k = num_dims;
    while s == n && k > 0 {
        k -= 1;
        n -= (dims[k] - 1) as f64 / 2.0;
        s -= coordinate[k] as f64;
    }
    if s > n {
        for (c, d) in coordinate.iter_mut().zip(dims.iter()) {
            *c = d - 1 - *c;
        }
    }
}

fn coordinate_offset(coordinate: &[usize], dims: &[usize]) -> usize {
    let mut offset = 0;
    for (c, d) in coordinate.iter().zip(dims.iter()) {
        offset = offset * d + c;
    }
    offset
}

/// Compute the windowed allele frequency spectrum for one or
/// more sample sets.
///
/// # Returns
///
/// A flat vector in `[window][n_0 + 1][n_1 + 1]...` layout: one
/// `(n_k + 1)`-sized dimension per sample set, giving weight at
/// each joint count coordinate.  Polarised spectra place each
/// derived allele (or branch subtree) at its count coordinate;
/// unpolarised spectra fold the coordinate onto its minor image
/// and halve the increment.
///
/// # Errors
///
/// [`StatsError::UnsupportedStatMode`] for node mode.
pub fn allele_frequency_spectrum(
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
    let dims: Vec<usize> = sets.sizes.iter().map(|n| *n as usize + 1).collect();
    let bins: usize = dims.iter().product();
    let num_windows = w.len() - 1;

    let mut result = match options.mode {
        StatMode::Site => site_afs(ts, &sets.weights, &sets.sizes, &dims, &w, options)?,
        StatMode::Branch => branch_afs(ts, &sets.weights, &dims, &w, options)?,
        StatMode::Node => unreachable!(),
    };

    if options.span_normalise {
        for wi in 0..num_windows {
            let span = w[wi + 1] - w[wi];
            for x in result[wi * bins..(wi + 1) * bins].iter_mut() {
                *x /= span;
            }
        }
    }
    Ok(result)
}

fn site_afs(
    ts: &TreeSequence,
    weights: &[f64],
    sizes: &[f64],
    dims: &[usize],
    windows: &[f64],
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    let state_dim = dims.len();
    let bins: usize = dims.iter().product();
    let num_windows = windows.len() - 1;
    let mut result = vec![0.0; num_windows * bins];
    let mut prop = StatePropagator::new(ts, weights, state_dim);
    let mut pos = crate::tree_position::TreePosition::new(ts);
    let mut window_index = 0;
    let increment = if options.polarised { 1.0 } else { 0.5 };
    let mut allele_counts: Vec<(Option<Vec<u8>>, Vec<f64>)> = vec![];
    let mut coordinate = vec![0usize; state_dim];

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
                        for k in 0..state_dim {
                            st[k] += node_state[k];
                        }
                    }
                    None => allele_counts.push((derived, node_state.clone())),
                }
                let inherited = ts.mutation_inherited_state(m).map(|x| x.to_vec());
                if let Some((_, st)) = allele_counts.iter_mut().find(|(a, _)| *a == inherited) {
                    for k in 0..state_dim {
                        st[k] -= node_state[k];
                    }
                }
            }
            while window_index < num_windows - 1
                && windows[window_index + 1] <= site.position.raw()
            {
                window_index += 1;
            }
            let start = if options.polarised { 1 } else { 0 };
            for (_, counts) in allele_counts.iter().skip(start) {
                for (k, c) in counts.iter().enumerate() {
                    coordinate[k] = c.round() as usize;
                }
                if !options.polarised {
                    fold(&mut coordinate, dims);
                }
                result[window_index * bins + coordinate_offset(&coordinate, dims)] += increment;
            }
        }
    }
    Ok(result)
}

fn branch_afs(
    ts: &TreeSequence,
    weights: &[f64],
    dims: &[usize],
    windows: &[f64],
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    let state_dim = dims.len();
    let bins: usize = dims.iter().product();
    let num_windows = windows.len() - 1;
    let num_nodes = ts.num_nodes();
    let mut result = vec![0.0; num_windows * bins];
    let mut prop = StatePropagator::new(ts, weights, state_dim);
    let mut last_update = vec![0.0; num_nodes];
    let mut window_index = 0usize;
    let increment = if options.polarised { 1.0 } else { 0.5 };
    let mut coordinate = vec![0usize; state_dim];

    // flush u's branch weight accumulated since its last update
    // into the current window
    let flush = |prop: &StatePropagator,
                     result: &mut Vec<f64>,
                     last_update: &mut Vec<f64>,
                     coordinate: &mut Vec<usize>,
                     wi: usize,
                     u: NodeId,
                     x: f64| {
        let b = prop.branch_length(u);
        let span = x - last_update[u.0 as usize];
        if b > 0.0 && span > 0.0 {
            let st = prop.node_state(u);
            for (k, c) in st.iter().enumerate() {
                coordinate[k] = c.round() as usize;
            }
            if !options.polarised {
                fold(coordinate, dims);
            }
            result[wi * bins + coordinate_offset(coordinate, dims)] += increment * b * span;
        }
        last_update[u.0 as usize] = x;
    };

    let mut pos = crate::tree_position::TreePosition::new(ts);
    let mut more = pos.next();
    while more {
        let (left, _right) = pos.interval();
        let x = left.raw();

        while window_index < num_windows && windows[window_index + 1] <= x {
            let wb = windows[window_index + 1];
            for u in 0..num_nodes {
                flush(
                    &prop,
                    &mut result,
                    &mut last_update,
                    &mut coordinate,
                    window_index,
                    NodeId::from(u),
                    wb,
                );
            }
            window_index += 1;
        }

        for e in pos.edges_out() {
            let edge = ts.tables_ref().edge(e);
            let (u, v) = (edge.child, edge.parent);
            // the child's branch disappears
            flush(
                &prop,
                &mut result,
                &mut last_update,
                &mut coordinate,
                window_index,
                u,
                x,
            );
            prop.parent[u.0 as usize] = NodeId::NULL;
            let mut w = v;
            while w != NodeId::NULL {
                flush(
                    &prop,
                    &mut result,
                    &mut last_update,
                    &mut coordinate,
                    window_index,
                    w,
                    x,
                );
                let u0 = u.0 as usize * state_dim;
                let w0 = w.0 as usize * state_dim;
                for k in 0..state_dim {
                    prop.state[w0 + k] -= prop.state[u0 + k];
                }
                w = prop.parent[w.0 as usize];
            }
        }
        for e in pos.edges_in() {
            let edge = ts.tables_ref().edge(e);
            let (u, v) = (edge.child, edge.parent);
            prop.parent[u.0 as usize] = v;
            last_update[u.0 as usize] = x;
            let mut w = v;
            while w != NodeId::NULL {
                flush(
                    &prop,
                    &mut result,
                    &mut last_update,
                    &mut coordinate,
                    window_index,
                    w,
                    x,
                );
                let u0 = u.0 as usize * state_dim;
                let w0 = w.0 as usize * state_dim;
                for k in 0..state_dim {
                    prop.state[w0 + k] += prop.state[u0 + k];
                }
                w = prop.parent[w.0 as usize];
            }
        }
        more = pos.next();
        if !more {
            while window_index < num_windows {
                let wb = windows[window_index + 1];
                for u in 0..num_nodes {
                    flush(
                        &prop,
                        &mut result,
                        &mut last_update,
                        &mut coordinate,
                        window_index,
                        NodeId::from(u),
                        wb,
                    );
                }
                window_index += 1;
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod test_afs {
    use super::*;
    use crate::prelude::*;
    use crate::stats::StatsOptions;

    // Three samples under a root; one mutation above sample 1.
    fn three_sample_treeseq() -> TreeSequence {
        let mut tables = TableCollection::new(10.0).unwrap();
        let root = tables.add_node(1.0, 0).unwrap();
        for _ in 0..3 {
            tables.add_sample_node(0.0).unwrap();
        }
        for c in 1..=3 {
            tables.add_edge(0.0, 10.0, root, c).unwrap();
        }
        let s = tables.add_site(5.0, Some(b"A".to_vec())).unwrap();
        tables
            .add_mutation(s, 1, MutationId::NULL, Time::UNKNOWN, Some(b"T".to_vec()))
            .unwrap();
        tables.sort_tables(TableSortingFlags::default());
        tables.build_index(IndexTablesFlags::empty()).unwrap();
        TreeSequence::new(tables, TreeSequenceFlags::empty()).unwrap()
    }

    #[test]
    fn test_polarised_site_afs_singleton() {
        let ts = three_sample_treeseq();
        let set = [NodeId::from(1), NodeId::from(2), NodeId::from(3)];
        let opts = StatsOptions {
            polarised: true,
            span_normalise: false,
            ..StatsOptions::default()
        };
        let afs = allele_frequency_spectrum(&ts, &[&set], None, &opts).unwrap();
        // length-4 unfolded spectrum: weight 1 in bin 1 only
        assert_eq!(afs.len(), 4);
        assert_eq!(afs, vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_folded_site_afs_singleton() {
        let ts = three_sample_treeseq();
        let set = [NodeId::from(1), NodeId::from(2), NodeId::from(3)];
        let opts = StatsOptions {
            polarised: false,
            span_normalise: false,
            ..StatsOptions::default()
        };
        let afs = allele_frequency_spectrum(&ts, &[&set], None, &opts).unwrap();
        // the derived singleton folds onto bin 1, the ancestral
        // doubleton folds onto bin 1 as well; each adds 0.5
        assert_eq!(afs.len(), 4);
        assert_eq!(afs, vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_branch_afs_star() {
        let ts = three_sample_treeseq();
        let set = [NodeId::from(1), NodeId::from(2), NodeId::from(3)];
        let opts = StatsOptions {
            mode: crate::stats::StatMode::Branch,
            polarised: true,
            span_normalise: true,
            ..StatsOptions::default()
        };
        let afs = allele_frequency_spectrum(&ts, &[&set], None, &opts).unwrap();
        // three unit branches each subtending one sample
        assert_eq!(afs.len(), 4);
        assert!((afs[1] - 3.0).abs() < 1e-12);
        assert_eq!(afs[0], 0.0);
        assert_eq!(afs[2], 0.0);
        assert_eq!(afs[3], 0.0);
    }

    #[test]
    fn test_node_mode_rejected() {
        let ts = three_sample_treeseq();
        let set = [NodeId::from(1)];
        let r = allele_frequency_spectrum(
            &ts,
            &[&set],
            None,
            &StatsOptions {
                mode: crate::stats::StatMode::Node,
                ..StatsOptions::default()
            },
        );
        assert_eq!(r, Err(StatsError::UnsupportedStatMode));
    }

    #[test]
    fn test_fold_coordinates() {
        // n = 4 samples, dims = [5]
        let dims = [5usize];
        let mut c = [3usize];
        fold(&mut c, &dims);
        assert_eq!(c, [1]);
        let mut c = [2usize];
        fold(&mut c, &dims);
        assert_eq!(c, [2]);
        let mut c = [1usize];
        fold(&mut c, &dims);
        assert_eq!(c, [1]);
        // joint fold: dims (3, 3), coordinate (1, 2) sums past
        // the centre and is reflected to (1, 0)
        let dims = [3usize, 3];
        let mut c = [1usize, 2];
        fold(&mut c, &dims);
        assert_eq!(c, [1, 0]);
    }
}
