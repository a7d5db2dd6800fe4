//! Pair-coalescence statistics.
//!
//! These statistics track, per time bin, the span-weighted
//! number of sample pairs whose most recent common ancestor
//! falls in that bin.  The per-node pair counts are maintained
//! incrementally: inserting an edge creates pairs between the
//! grafted subtree and the "other" samples at each ancestor,
//! and removing it destroys them again.

use super::{check_set_indexes, check_windows, sample_set_weights, StatsError, StatsResult};
use crate::newtypes::NodeId;
use crate::treeseq::TreeSequence;

struct PairWeights {
    // [window][pair][bin] span-weighted coalescing-pair counts
    weights: Vec<f64>,
    // same layout, weighted by the coalescence time
    wtimes: Vec<f64>,
    num_pairs: usize,
    num_bins: usize,
}

fn pair_product(s: &[f64], o: &[f64], pairs: &[[usize; 2]], out: &mut [f64]) {
    for (t, [a, b]) in pairs.iter().enumerate() {
        out[t] = if a == b {
            s[*a] * o[*a]
        } else {
            s[*a] * o[*b] + s[*b] * o[*a]
        };
    }
}

fn check_node_bin_map(ts: &TreeSequence, node_bin_map: &[i64]) -> StatsResult<usize> {
    if node_bin_map.len() != ts.num_nodes() {
        return Err(StatsError::BadNodeBinMap);
    }
    let mut num_bins = 0i64;
    for b in node_bin_map {
        if *b < -1 {
            return Err(StatsError::BadNodeBinMap);
        }
        num_bins = num_bins.max(b + 1);
    }
    if num_bins == 0 {
        return Err(StatsError::BadNodeBinMap);
    }
    Ok(num_bins as usize)
}

#[allow(clippy::too_many_arguments)]
fn pair_coalescence_weights(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    indexes: &[[usize; 2]],
    windows: &[f64],
    node_bin_map: &[i64],
) -> StatsResult<PairWeights> {
    let sets = sample_set_weights(ts, sample_sets)?;
    check_set_indexes(indexes, sets.num_sets)?;
    check_windows(ts, windows, true)?;
    let num_bins = check_node_bin_map(ts, node_bin_map)?;

    let num_nodes = ts.num_nodes();
    let num_windows = windows.len() - 1;
    let num_pairs = indexes.len();
    let state_dim = sets.num_sets;
    let tables = ts.tables_ref();

    // per-node per-set subtree sample counts
    let mut state = vec![0.0; num_nodes * state_dim];
    for (j, u) in ts.sample_nodes().iter().enumerate() {
        for k in 0..state_dim {
            state[u.0 as usize * state_dim + k] = sets.weights[j * state_dim + k];
        }
    }
    let mut parent = vec![NodeId::NULL; num_nodes];
    // per-node per-pair counts of pairs coalescing exactly here
    let mut coalescing = vec![0.0; num_nodes * num_pairs];
    let mut last_update = vec![0.0; num_nodes];

    let mut weights = vec![0.0; num_windows * num_pairs * num_bins];
    let mut wtimes = vec![0.0; num_windows * num_pairs * num_bins];

    let mut s_buf = vec![0.0; state_dim];
    let mut o_buf = vec![0.0; state_dim];
    let mut prev_buf = vec![0.0; state_dim];
    let mut cur_buf = vec![0.0; state_dim];
    let mut pair_buf = vec![0.0; num_pairs];
    let mut window_index = 0usize;

    macro_rules! flush {
        ($u:expr, $x:expr) => {{
            let u = $u.0 as usize;
            let span = $x - last_update[u];
            let bin = node_bin_map[u];
            if span > 0.0 && bin >= 0 {
                let t = tables.node($u).time.raw();
                for p in 0..num_pairs {
                    let w = span * coalescing[u * num_pairs + p];
                    if w != 0.0 {
                        let at = (window_index * num_pairs + p) * num_bins + bin as usize;
                        weights[at] += w;
                        wtimes[at] += w * t;
                    }
                }
            }
            last_update[u] = $x;
        }};
    }

    let mut pos = crate::tree_position::TreePosition::new(ts);
    let mut more = pos.next();
    while more {
        let x = pos.interval().0.raw();

        while window_index < num_windows && windows[window_index + 1] <= x {
            let wb = windows[window_index + 1];
            for u in 0..num_nodes {
                flush!(NodeId::from(u), wb);
            }
            window_index += 1;
        }

        for e in pos.edges_out() {
            let edge = tables.edge(e);
            let (c, p) = (edge.child, edge.parent);
            let c0 = c.0 as usize * state_dim;
            s_buf.copy_from_slice(&state[c0..c0 + state_dim]);
            prev_buf.copy_from_slice(&s_buf);
            let mut v = p;
            while v != NodeId::NULL {
                flush!(v, x);
                let v0 = v.0 as usize * state_dim;
                cur_buf.copy_from_slice(&state[v0..v0 + state_dim]);
                for k in 0..state_dim {
                    o_buf[k] = cur_buf[k] - prev_buf[k];
                    state[v0 + k] -= s_buf[k];
                }
                pair_product(&s_buf, &o_buf, indexes, &mut pair_buf);
                for (t, w) in pair_buf.iter().enumerate() {
                    coalescing[v.0 as usize * num_pairs + t] -= w;
                }
                prev_buf.copy_from_slice(&cur_buf);
                v = parent[v.0 as usize];
            }
            parent[c.0 as usize] = NodeId::NULL;
        }
        for e in pos.edges_in() {
            let edge = tables.edge(e);
            let (c, p) = (edge.child, edge.parent);
            let c0 = c.0 as usize * state_dim;
            s_buf.copy_from_slice(&state[c0..c0 + state_dim]);
            prev_buf.copy_from_slice(&s_buf);
            parent[c.0 as usize] = p;
            let mut v = p;
            while v != NodeId::NULL {
                flush!(v, x);
                let v0 = v.0 as usize * state_dim;
                for k in 0..state_dim {
                    state[v0 + k] += s_buf[k];
                    o_buf[k] = state[v0 + k] - prev_buf[k];
                }
                pair_product(&s_buf, &o_buf, indexes, &mut pair_buf);
                for (t, w) in pair_buf.iter().enumerate() {
                    coalescing[v.0 as usize * num_pairs + t] += w;
                }
                prev_buf.copy_from_slice(&state[v0..v0 + state_dim]);
                v = parent[v.0 as usize];
            }
        }

        more = pos.next();
        if !more {
            while window_index < num_windows {
                let wb = windows[window_index + 1];
                for u in 0..num_nodes {
                    flush!(NodeId::from(u), wb);
                }
                window_index += 1;
            }
        }
    }

    Ok(PairWeights {
        weights,
        wtimes,
        num_pairs,
        num_bins,
    })
}

fn pair_totals(sets_sizes: &[f64], indexes: &[[usize; 2]]) -> Vec<f64> {
    indexes
        .iter()
        .map(|[a, b]| {
            if a == b {
                sets_sizes[*a] * (sets_sizes[*a] - 1.0) / 2.0
            } else {
                sets_sizes[*a] * sets_sizes[*b]
            }
        })
        .collect()
}

/// Span-weighted counts of coalescing sample pairs per time
/// bin.
///
/// `node_bin_map` assigns every node a bin index (or -1 to
/// leave its coalescences uncounted).
///
/// # Returns
///
/// A flat vector in `[window][set-pair][bin]` layout.
pub fn pair_coalescence_counts(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    indexes: &[[usize; 2]],
    windows: Option<&[f64]>,
    node_bin_map: &[i64],
    span_normalise: bool,
    pair_normalise: bool,
) -> StatsResult<Vec<f64>> {
    let w = match windows {
        Some(w) => w.to_vec(),
        None => vec![0.0, ts.sequence_length().raw()],
    };
    let pw = pair_coalescence_weights(ts, sample_sets, indexes, &w, node_bin_map)?;
    let sets = sample_set_weights(ts, sample_sets)?;
    let totals = pair_totals(&sets.sizes, indexes);
    let mut out = pw.weights;
    let num_windows = w.len() - 1;
    for wi in 0..num_windows {
        for (p, total) in totals.iter().enumerate() {
            for b in 0..pw.num_bins {
                let v = &mut out[(wi * pw.num_pairs + p) * pw.num_bins + b];
                if span_normalise {
                    *v /= w[wi + 1] - w[wi];
                }
                if pair_normalise && *total > 0.0 {
                    *v /= total;
                }
            }
        }
    }
    Ok(out)
}

/// Quantiles of the pair-coalescence time distribution.
///
/// Every distinct node time becomes a bin; quantiles must be
/// strictly increasing values in `(0, 1]`.
///
/// # Returns
///
/// A flat vector in `[window][set-pair][quantile]` layout.
pub fn pair_coalescence_quantiles(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    indexes: &[[usize; 2]],
    windows: Option<&[f64]>,
    quantiles: &[f64],
) -> StatsResult<Vec<f64>> {
    if quantiles.is_empty() {
        return Err(StatsError::BadQuantiles);
    }
    for (i, q) in quantiles.iter().enumerate() {
        if *q <= 0.0 || *q > 1.0 || (i > 0 && quantiles[i - 1] >= *q) {
            return Err(StatsError::BadQuantiles);
        }
    }
    let w = match windows {
        Some(w) => w.to_vec(),
        None => vec![0.0, ts.sequence_length().raw()],
    };

    // one bin per distinct node time
    let mut times: Vec<f64> = ts
        .tables_ref()
        .nodes()
        .iter()
        .map(|n| n.time.raw())
        .collect();
    times.sort_by(|a, b| a.partial_cmp(b).unwrap());
    times.dedup();
    let node_bin_map: Vec<i64> = ts
        .tables_ref()
        .nodes()
        .iter()
        .map(|n| times.binary_search_by(|t| t.partial_cmp(&n.time.raw()).unwrap()).unwrap() as i64)
        .collect();

    let pw = pair_coalescence_weights(ts, sample_sets, indexes, &w, &node_bin_map)?;
    let num_windows = w.len() - 1;
    let mut out = vec![f64::NAN; num_windows * pw.num_pairs * quantiles.len()];
    for wi in 0..num_windows {
        for p in 0..pw.num_pairs {
            let row = &pw.weights
                [(wi * pw.num_pairs + p) * pw.num_bins..(wi * pw.num_pairs + p + 1) * pw.num_bins];
            let total: f64 = row.iter().sum();
            if total <= 0.0 {
                continue;
            }
            let mut cumulative = 0.0;
            let mut qi = 0;
            for (b, v) in row.iter().enumerate() {
                cumulative += v / total;
                while qi < quantiles.len() && cumulative >= quantiles[qi] - 1e-12 {
                    out[(wi * pw.num_pairs + p) * quantiles.len() + qi] = times[b];
                    qi += 1;
                }
            }
        }
    }
    Ok(out)
}

/// Pair-coalescence rates within time windows.
///
/// Assumes a piecewise-constant coalescence rate: in every time
/// window but the last, the rate is `-log(1 - e/S) / dt` where
/// `e` is the fraction of pairs coalescing in the window and
/// `S` the fraction uncoalesced at its start; in the last
/// window the rate is the inverse mean residual coalescence
/// time.
///
/// # Returns
///
/// A flat vector in `[window][set-pair][time-window]` layout.
pub fn pair_coalescence_rates(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    indexes: &[[usize; 2]],
    windows: Option<&[f64]>,
    time_windows: &[f64],
) -> StatsResult<Vec<f64>> {
    if time_windows.len() < 2 || time_windows[0] < 0.0 {
        return Err(StatsError::BadTimeWindows);
    }
    for t in time_windows.windows(2) {
        if t[0] >= t[1] {
            return Err(StatsError::BadTimeWindows);
        }
    }
    let w = match windows {
        Some(w) => w.to_vec(),
        None => vec![0.0, ts.sequence_length().raw()],
    };
    let num_bins = time_windows.len() - 1;
    let node_bin_map: Vec<i64> = ts
        .tables_ref()
        .nodes()
        .iter()
        .map(|n| {
            let t = n.time.raw();
            if t < time_windows[0] || t >= time_windows[num_bins] {
                -1
            } else {
                (time_windows.partition_point(|x| *x <= t) - 1) as i64
            }
        })
        .collect();
    // all nodes unbinned happens when every node lies outside
    // the time windows
    if node_bin_map.iter().all(|b| *b == -1) {
        return Err(StatsError::BadTimeWindows);
    }

    let pw = pair_coalescence_weights(ts, sample_sets, indexes, &w, &node_bin_map)?;
    let num_windows = w.len() - 1;
    let mut out = vec![0.0; num_windows * pw.num_pairs * num_bins];
    for wi in 0..num_windows {
        for p in 0..pw.num_pairs {
            let base = (wi * pw.num_pairs + p) * pw.num_bins;
            let row = &pw.weights[base..base + pw.num_bins];
            let wt = &pw.wtimes[base..base + pw.num_bins];
            let total: f64 = row.iter().sum();
            if total <= 0.0 {
                continue;
            }
            let mut survived = 1.0;
            for b in 0..num_bins {
                let e = row[b] / total;
                let at = (wi * pw.num_pairs + p) * num_bins + b;
                if survived <= 0.0 || e <= 0.0 {
                    out[at] = 0.0;
                } else if b == num_bins - 1 {
                    let mean = wt[b] / row[b];
                    out[at] = if mean > time_windows[b] {
                        1.0 / (mean - time_windows[b])
                    } else {
                        f64::INFINITY
                    };
                } else {
                    let dt = time_windows[b + 1] - time_windows[b];
                    out[at] = -(-e / survived).ln_1p() / dt;
                }
                survived -= e;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod test_pair_coalescence {
    use super::*;
    use crate::prelude::*;

    // 6 -> (4, 5); 4 -> (0, 1) at t=1; 5 -> (2, 3) at t=2;
    // root at t=3.
    fn nested_treeseq() -> TreeSequence {
        let mut tables = TableCollection::new(100.0).unwrap();
        for _ in 0..4 {
            tables.add_sample_node(0.0).unwrap();
        }
        tables.add_node(1.0, 0).unwrap();
        tables.add_node(2.0, 0).unwrap();
        tables.add_node(3.0, 0).unwrap();
        tables.add_edge(0.0, 100.0, 4, 0).unwrap();
        tables.add_edge(0.0, 100.0, 4, 1).unwrap();
        tables.add_edge(0.0, 100.0, 5, 2).unwrap();
        tables.add_edge(0.0, 100.0, 5, 3).unwrap();
        tables.add_edge(0.0, 100.0, 6, 4).unwrap();
        tables.add_edge(0.0, 100.0, 6, 5).unwrap();
        tables.sort_tables(TableSortingFlags::default());
        tables.build_index(IndexTablesFlags::empty()).unwrap();
        TreeSequence::new(tables, TreeSequenceFlags::empty()).unwrap()
    }

    #[test]
    fn test_counts_one_bin_per_node() {
        let ts = nested_treeseq();
        let samples = ts.sample_nodes().to_vec();
        // bin nodes by id
        let node_bin_map: Vec<i64> = (0..7).collect();
        let counts = pair_coalescence_counts(
            &ts,
            &[&samples],
            &[[0, 0]],
            None,
            &node_bin_map,
            true,
            false,
        )
        .unwrap();
        assert_eq!(counts.len(), 7);
        // node 4: pair (0,1); node 5: pair (2,3); root: 4 pairs
        assert_eq!(counts[4], 1.0);
        assert_eq!(counts[5], 1.0);
        assert_eq!(counts[6], 4.0);
        assert_eq!(counts[0], 0.0);
        // all six pairs accounted for
        let total: f64 = counts.iter().sum();
        assert_eq!(total, 6.0);
    }

    #[test]
    fn test_counts_between_sets() {
        let ts = nested_treeseq();
        let a = [NodeId::from(0), NodeId::from(1)];
        let b = [NodeId::from(2), NodeId::from(3)];
        let node_bin_map: Vec<i64> = (0..7).collect();
        let counts = pair_coalescence_counts(
            &ts,
            &[&a, &b],
            &[[0, 1]],
            None,
            &node_bin_map,
            true,
            false,
        )
        .unwrap();
        // every cross pair coalesces at the root
        assert_eq!(counts[6], 4.0);
        assert_eq!(counts[4], 0.0);
        assert_eq!(counts[5], 0.0);
    }

    #[test]
    fn test_pair_normalise() {
        let ts = nested_treeseq();
        let samples = ts.sample_nodes().to_vec();
        let node_bin_map: Vec<i64> = (0..7).collect();
        let counts = pair_coalescence_counts(
            &ts,
            &[&samples],
            &[[0, 0]],
            None,
            &node_bin_map,
            true,
            true,
        )
        .unwrap();
        let total: f64 = counts.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_quantiles_median() {
        let ts = nested_treeseq();
        let samples = ts.sample_nodes().to_vec();
        let q = pair_coalescence_quantiles(&ts, &[&samples], &[[0, 0]], None, &[0.5, 1.0])
            .unwrap();
        // 4 of 6 pairs coalesce at t=3
        assert_eq!(q, vec![3.0, 3.0]);
    }

    #[test]
    fn test_rates_shape_and_positivity() {
        let ts = nested_treeseq();
        let samples = ts.sample_nodes().to_vec();
        let rates = pair_coalescence_rates(
            &ts,
            &[&samples],
            &[[0, 0]],
            None,
            &[0.0, 1.5, 2.5, f64::INFINITY],
        )
        .unwrap();
        assert_eq!(rates.len(), 3);
        for r in rates.iter() {
            assert!(*r >= 0.0);
        }
        // the first window sees 1 of 6 pairs coalesce
        let expected = -(1.0f64 - 1.0 / 6.0).ln() / 1.5;
        assert!((rates[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_bad_quantiles() {
        let ts = nested_treeseq();
        let samples = ts.sample_nodes().to_vec();
        for qs in [vec![], vec![0.0], vec![0.5, 0.5], vec![1.2]] {
            assert_eq!(
                pair_coalescence_quantiles(&ts, &[&samples], &[[0, 0]], None, &qs),
                Err(StatsError::BadQuantiles)
            );
        }
    }

    #[test]
    fn test_bad_node_bin_map() {
        let ts = nested_treeseq();
        let samples = ts.sample_nodes().to_vec();
        let short = vec![0i64; 3];
        assert_eq!(
            pair_coalescence_counts(&ts, &[&samples], &[[0, 0]], None, &short, true, false),
            Err(StatsError::BadNodeBinMap)
        );
        let bad = vec![-2i64; 7];
        assert_eq!(
            pair_coalescence_counts(&ts, &[&samples], &[[0, 0]], None, &bad, true, false),
            Err(StatsError::BadNodeBinMap)
        );
    }
}
