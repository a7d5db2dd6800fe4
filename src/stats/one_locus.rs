//! One-locus statistics: thin parameterizations of
//! [`general_stat`](super::general_stat) by summary function.
//!
//! Every function takes sample sets (or per-sample weights for
//! the trait statistics), optional windows (`None` means one
//! window spanning the whole sequence), and [`StatsOptions`].
//! Results are row-major `[window][tuple-or-set]` vectors.

use super::{
    check_set_indexes, general_stat, sample_set_weights, StatsOptions, StatsResult,
};
use crate::newtypes::NodeId;
use crate::stats::StatsError;
use crate::treeseq::TreeSequence;

fn default_windows(ts: &TreeSequence, windows: Option<&[f64]>) -> Vec<f64> {
    match windows {
        Some(w) => w.to_vec(),
        None => vec![0.0, ts.sequence_length().raw()],
    }
}

/// Mean pairwise diversity within each sample set.
///
/// The summary function is `x(n - x) / (n(n - 1))` for a set of
/// size `n` with `x` of its samples below a branch or carrying
/// an allele.
pub fn diversity(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    windows: Option<&[f64]>,
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    let w = default_windows(ts, windows);
    let sets = sample_set_weights(ts, sample_sets)?;
    let sizes = sets.sizes.clone();
    general_stat(
        ts,
        &sets.weights,
        sets.num_sets,
        sets.num_sets,
        move |x, out| {
            for (j, n) in sizes.iter().enumerate() {
                out[j] = x[j] * (n - x[j]) / (n * (n - 1.0));
            }
        },
        &w,
        options,
    )
}

/// Mean pairwise divergence between pairs of sample sets.
pub fn divergence(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    indexes: &[[usize; 2]],
    windows: Option<&[f64]>,
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    let w = default_windows(ts, windows);
    let sets = sample_set_weights(ts, sample_sets)?;
    check_set_indexes(indexes, sets.num_sets)?;
    let sizes = sets.sizes.clone();
    let tuples = indexes.to_vec();
    general_stat(
        ts,
        &sets.weights,
        sets.num_sets,
        tuples.len(),
        move |x, out| {
            for (t, [i, j]) in tuples.iter().enumerate() {
                let (ni, nj) = (sizes[*i], sizes[*j]);
                let same = if i == j { 1.0 } else { 0.0 };
                out[t] = x[*i] * (nj - x[*j]) / (ni * (nj - same));
            }
        },
        &w,
        options,
    )
}

/// Density of segregating sites (or, in branch mode, the
/// length of branches subtending a proper subset of each set).
pub fn segregating_sites(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    windows: Option<&[f64]>,
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    let w = default_windows(ts, windows);
    let sets = sample_set_weights(ts, sample_sets)?;
    let sizes = sets.sizes.clone();
    general_stat(
        ts,
        &sets.weights,
        sets.num_sets,
        sets.num_sets,
        move |x, out| {
            for (j, n) in sizes.iter().enumerate() {
                out[j] = if x[j] > 0.0 { 1.0 - x[j] / n } else { 0.0 };
            }
        },
        &w,
        options,
    )
}

/// Y1: probability one sample carries an allele both others in
/// the same set lack.
pub fn y1(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    windows: Option<&[f64]>,
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    let w = default_windows(ts, windows);
    let sets = sample_set_weights(ts, sample_sets)?;
    let sizes = sets.sizes.clone();
    general_stat(
        ts,
        &sets.weights,
        sets.num_sets,
        sets.num_sets,
        move |x, out| {
            for (j, n) in sizes.iter().enumerate() {
                out[j] =
                    x[j] * (n - x[j]) * (n - x[j] - 1.0) / (n * (n - 1.0) * (n - 2.0));
            }
        },
        &w,
        options,
    )
}

/// Y2: one sample from the first set against pairs from the
/// second.
pub fn y2(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    indexes: &[[usize; 2]],
    windows: Option<&[f64]>,
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    let w = default_windows(ts, windows);
    let sets = sample_set_weights(ts, sample_sets)?;
    check_set_indexes(indexes, sets.num_sets)?;
    let sizes = sets.sizes.clone();
    let tuples = indexes.to_vec();
    general_stat(
        ts,
        &sets.weights,
        sets.num_sets,
        tuples.len(),
        move |x, out| {
            for (t, [i, j]) in tuples.iter().enumerate() {
                let (ni, nj) = (sizes[*i], sizes[*j]);
                out[t] = x[*i] * (nj - x[*j]) * (nj - x[*j] - 1.0) / (ni * nj * (nj - 1.0));
            }
        },
        &w,
        options,
    )
}

/// Y3: one sample each from three sets.
pub fn y3(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    indexes: &[[usize; 3]],
    windows: Option<&[f64]>,
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    let w = default_windows(ts, windows);
    let sets = sample_set_weights(ts, sample_sets)?;
    check_set_indexes(indexes, sets.num_sets)?;
    let sizes = sets.sizes.clone();
    let tuples = indexes.to_vec();
    general_stat(
        ts,
        &sets.weights,
        sets.num_sets,
        tuples.len(),
        move |x, out| {
            for (t, [i, j, k]) in tuples.iter().enumerate() {
                let (ni, nj, nk) = (sizes[*i], sizes[*j], sizes[*k]);
                out[t] = x[*i] * (nj - x[*j]) * (nk - x[*k]) / (ni * nj * nk);
            }
        },
        &w,
        options,
    )
}

/// Patterson's f2.
pub fn f2(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    indexes: &[[usize; 2]],
    windows: Option<&[f64]>,
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    let w = default_windows(ts, windows);
    let sets = sample_set_weights(ts, sample_sets)?;
    check_set_indexes(indexes, sets.num_sets)?;
    let sizes = sets.sizes.clone();
    let tuples = indexes.to_vec();
    general_stat(
        ts,
        &sets.weights,
        sets.num_sets,
        tuples.len(),
        move |x, out| {
            for (t, [i, j]) in tuples.iter().enumerate() {
                let (ni, nj) = (sizes[*i], sizes[*j]);
                let (xi, xj) = (x[*i], x[*j]);
                out[t] = (xi * (xi - 1.0) * (nj - xj) * (nj - xj - 1.0)
                    - xi * (ni - xi) * xj * (nj - xj))
                    / (ni * (ni - 1.0) * nj * (nj - 1.0));
            }
        },
        &w,
        options,
    )
}

/// Patterson's f3.
pub fn f3(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    indexes: &[[usize; 3]],
    windows: Option<&[f64]>,
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    let w = default_windows(ts, windows);
    let sets = sample_set_weights(ts, sample_sets)?;
    check_set_indexes(indexes, sets.num_sets)?;
    let sizes = sets.sizes.clone();
    let tuples = indexes.to_vec();
    general_stat(
        ts,
        &sets.weights,
        sets.num_sets,
        tuples.len(),
        move |x, out| {
            for (t, [i, j, k]) in tuples.iter().enumerate() {
                let (ni, nj, nk) = (sizes[*i], sizes[*j], sizes[*k]);
                let (xi, xj, xk) = (x[*i], x[*j], x[*k]);
                out[t] = (xi * (xi - 1.0) * (nj - xj) * (nk - xk)
                    - xi * (ni - xi) * xj * (nk - xk))
                    / (ni * (ni - 1.0) * nj * nk);
            }
        },
        &w,
        options,
    )
}

/// Patterson's f4.
pub fn f4(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    indexes: &[[usize; 4]],
    windows: Option<&[f64]>,
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    let w = default_windows(ts, windows);
    let sets = sample_set_weights(ts, sample_sets)?;
    check_set_indexes(indexes, sets.num_sets)?;
    let sizes = sets.sizes.clone();
    let tuples = indexes.to_vec();
    general_stat(
        ts,
        &sets.weights,
        sets.num_sets,
        tuples.len(),
        move |x, out| {
            for (t, [i, j, k, l]) in tuples.iter().enumerate() {
                let (ni, nj, nk, nl) = (sizes[*i], sizes[*j], sizes[*k], sizes[*l]);
                let (xi, xj, xk, xl) = (x[*i], x[*j], x[*k], x[*l]);
                out[t] = (xi * xk * (nj - xj) * (nl - xl)
                    - xi * xl * (nj - xj) * (nk - xk))
                    / (ni * nj * nk * nl);
            }
        },
        &w,
        options,
    )
}

/// Centred genetic relatedness between pairs of sample sets.
///
/// The summary is `(p_i - p̄)(p_j - p̄) / 2` where `p̄` is the
/// mean allele frequency over all supplied sample sets; the
/// unpolarised default restores unit scale.
pub fn genetic_relatedness(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
    indexes: &[[usize; 2]],
    windows: Option<&[f64]>,
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    let w = default_windows(ts, windows);
    let sets = sample_set_weights(ts, sample_sets)?;
    check_set_indexes(indexes, sets.num_sets)?;
    let sizes = sets.sizes.clone();
    let tuples = indexes.to_vec();
    let num_sets = sets.num_sets;
    general_stat(
        ts,
        &sets.weights,
        num_sets,
        tuples.len(),
        move |x, out| {
            let mut pbar = 0.0;
            for j in 0..num_sets {
                pbar += x[j] / sizes[j];
            }
            pbar /= num_sets as f64;
            for (t, [i, j]) in tuples.iter().enumerate() {
                out[t] = (x[*i] / sizes[*i] - pbar) * (x[*j] / sizes[*j] - pbar) / 2.0;
            }
        },
        &w,
        options,
    )
}

fn centre_weights(weights: &[f64], num_samples: usize, num_weights: usize) -> Vec<f64> {
    let mut centred = weights.to_vec();
    for k in 0..num_weights {
        let mut mean = 0.0;
        for j in 0..num_samples {
            mean += weights[j * num_weights + k];
        }
        mean /= num_samples as f64;
        for j in 0..num_samples {
            centred[j * num_weights + k] -= mean;
        }
    }
    centred
}

/// Sum of squared covariances between each trait column of
/// `weights` (one row per sample, `num_weights` columns) and
/// allele or branch presence.
pub fn trait_covariance(
    ts: &TreeSequence,
    weights: &[f64],
    num_weights: usize,
    windows: Option<&[f64]>,
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    let n = ts.num_samples();
    if num_weights == 0 || weights.len() != n * num_weights {
        return Err(StatsError::BadWeights);
    }
    let w = default_windows(ts, windows);
    let centred = centre_weights(weights, n, num_weights);
    let denom = (n as f64 - 1.0) * (n as f64 - 1.0);
    general_stat(
        ts,
        &centred,
        num_weights,
        num_weights,
        move |x, out| {
            for k in 0..out.len() {
                out[k] = x[k] * x[k] / denom / 2.0;
            }
        },
        &w,
        options,
    )
}

/// Sum of squared correlations between each trait column and
/// allele or branch presence.
///
/// Traits are standardized internally; an extra state dimension
/// carries the number of samples below each node so that the
/// allele frequency is available to the summary.
pub fn trait_correlation(
    ts: &TreeSequence,
    weights: &[f64],
    num_weights: usize,
    windows: Option<&[f64]>,
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    let n = ts.num_samples();
    if num_weights == 0 || weights.len() != n * num_weights {
        return Err(StatsError::BadWeights);
    }
    let w = default_windows(ts, windows);
    let mut centred = centre_weights(weights, n, num_weights);
    // standardize each column to unit sample variance
    for k in 0..num_weights {
        let mut ss = 0.0;
        for j in 0..n {
            ss += centred[j * num_weights + k] * centred[j * num_weights + k];
        }
        let sd = (ss / (n as f64 - 1.0)).sqrt();
        if sd > 0.0 {
            for j in 0..n {
                centred[j * num_weights + k] /= sd;
            }
        }
    }
    // augment with a column of ones tracking allele counts
    let state_dim = num_weights + 1;
    let mut augmented = vec![0.0; n * state_dim];
    for j in 0..n {
        augmented[j * state_dim..j * state_dim + num_weights]
            .copy_from_slice(&centred[j * num_weights..(j + 1) * num_weights]);
        augmented[j * state_dim + num_weights] = 1.0;
    }
    let nf = n as f64;
    general_stat(
        ts,
        &augmented,
        state_dim,
        num_weights,
        move |x, out| {
            let p = x[num_weights] / nf;
            for k in 0..out.len() {
                if p > 0.0 && p < 1.0 {
                    out[k] = x[k] * x[k] / (2.0 * nf * (nf - 1.0) * p * (1.0 - p));
                } else {
                    out[k] = 0.0;
                }
            }
        },
        &w,
        options,
    )
}

// Modified Gram-Schmidt orthonormalization of the columns of
// `m` (row-major, num_rows x num_cols), in place.
fn orthonormalize(m: &mut [f64], num_rows: usize, num_cols: usize) {
    for k in 0..num_cols {
        for prev in 0..k {
            let mut dot = 0.0;
            for r in 0..num_rows {
                dot += m[r * num_cols + k] * m[r * num_cols + prev];
            }
            for r in 0..num_rows {
                m[r * num_cols + k] -= dot * m[r * num_cols + prev];
            }
        }
        let mut norm = 0.0;
        for r in 0..num_rows {
            norm += m[r * num_cols + k] * m[r * num_cols + k];
        }
        let norm = norm.sqrt();
        if norm > 0.0 {
            for r in 0..num_rows {
                m[r * num_cols + k] /= norm;
            }
        }
    }
}

/// Squared coefficients of allele presence in a linear model of
/// each trait on the given covariates (an intercept is added
/// internally).
pub fn trait_linear_model(
    ts: &TreeSequence,
    weights: &[f64],
    num_weights: usize,
    covariates: &[f64],
    num_covariates: usize,
    windows: Option<&[f64]>,
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    let n = ts.num_samples();
    if num_weights == 0 || weights.len() != n * num_weights {
        return Err(StatsError::BadWeights);
    }
    if covariates.len() != n * num_covariates {
        return Err(StatsError::BadWeights);
    }
    let w = default_windows(ts, windows);

    // orthonormal basis of the covariate space, intercept first
    let num_basis = num_covariates + 1;
    let mut basis = vec![0.0; n * num_basis];
    for j in 0..n {
        basis[j * num_basis] = 1.0;
        for c in 0..num_covariates {
            basis[j * num_basis + 1 + c] = covariates[j * num_covariates + c];
        }
    }
    orthonormalize(&mut basis, n, num_basis);

    // residualize traits against the basis
    let mut resid = weights.to_vec();
    for k in 0..num_weights {
        for b in 0..num_basis {
            let mut dot = 0.0;
            for j in 0..n {
                dot += resid[j * num_weights + k] * basis[j * num_basis + b];
            }
            for j in 0..n {
                resid[j * num_weights + k] -= dot * basis[j * num_basis + b];
            }
        }
    }

    // states: residual traits, basis columns, and a count column
    let state_dim = num_weights + num_basis + 1;
    let mut augmented = vec![0.0; n * state_dim];
    for j in 0..n {
        for k in 0..num_weights {
            augmented[j * state_dim + k] = resid[j * num_weights + k];
        }
        for b in 0..num_basis {
            augmented[j * state_dim + num_weights + b] = basis[j * num_basis + b];
        }
        augmented[j * state_dim + num_weights + num_basis] = 1.0;
    }

    general_stat(
        ts,
        &augmented,
        state_dim,
        num_weights,
        move |x, out| {
            // residual genotype sum of squares after projecting
            // onto the covariate space
            let count = x[num_weights + num_basis];
            let mut denom = count;
            for b in 0..num_basis {
                let c = x[num_weights + b];
                denom -= c * c;
            }
            for k in 0..out.len() {
                if denom > 1e-12 {
                    out[k] = x[k] * x[k] / (2.0 * denom);
                } else {
                    out[k] = 0.0;
                }
            }
        },
        &w,
        options,
    )
}

#[cfg(test)]
mod test_one_locus {
    use super::*;
    use crate::prelude::*;
    use crate::stats::{StatMode, StatsOptions};

    // Two samples joined by a root at time 1, spanning [0, 10).
    fn pair_treeseq() -> TreeSequence {
        let mut tables = TableCollection::new(10.0).unwrap();
        let root = tables.add_node(1.0, 0).unwrap();
        let a = tables.add_sample_node(0.0).unwrap();
        let b = tables.add_sample_node(0.0).unwrap();
        tables.add_edge(0.0, 10.0, root, a).unwrap();
        tables.add_edge(0.0, 10.0, root, b).unwrap();
        tables.sort_tables(TableSortingFlags::default());
        tables.build_index(IndexTablesFlags::empty()).unwrap();
        TreeSequence::new(tables, TreeSequenceFlags::empty()).unwrap()
    }

    #[test]
    fn test_branch_divergence_two_samples() {
        let ts = pair_treeseq();
        let a = [NodeId::from(1)];
        let b = [NodeId::from(2)];
        let opts = StatsOptions {
            mode: StatMode::Branch,
            span_normalise: true,
            ..StatsOptions::default()
        };
        let d = divergence(&ts, &[&a, &b], &[[0, 1]], None, &opts).unwrap();
        assert_eq!(d.len(), 1);
        // the pair's paths to the MRCA total 2.0
        assert!((d[0] - 2.0).abs() < 1e-12, "{}", d[0]);

        // without span normalisation the window integral is 20
        let opts = StatsOptions {
            mode: StatMode::Branch,
            span_normalise: false,
            ..StatsOptions::default()
        };
        let d = divergence(&ts, &[&a, &b], &[[0, 1]], None, &opts).unwrap();
        assert!((d[0] - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_branch_diversity_equals_divergence_for_pair() {
        let ts = pair_treeseq();
        let both = [NodeId::from(1), NodeId::from(2)];
        let a = [NodeId::from(1)];
        let b = [NodeId::from(2)];
        let opts = StatsOptions {
            mode: StatMode::Branch,
            ..StatsOptions::default()
        };
        let pi = diversity(&ts, &[&both], None, &opts).unwrap();
        let d = divergence(&ts, &[&a, &b], &[[0, 1]], None, &opts).unwrap();
        assert!((pi[0] - d[0]).abs() < 1e-12);
        assert!((pi[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_site_diversity_single_mutation() {
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
        let ts = TreeSequence::new(tables, TreeSequenceFlags::empty()).unwrap();

        let both = [NodeId::from(1), NodeId::from(2)];
        let opts = StatsOptions {
            span_normalise: false,
            ..StatsOptions::default()
        };
        let pi = diversity(&ts, &[&both], None, &opts).unwrap();
        // one pairwise difference between the two samples
        assert!((pi[0] - 1.0).abs() < 1e-12);

        let ss = segregating_sites(&ts, &[&both], None, &opts).unwrap();
        assert!((ss[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_windows_split_results() {
        let ts = pair_treeseq();
        let both = [NodeId::from(1), NodeId::from(2)];
        let opts = StatsOptions {
            mode: StatMode::Branch,
            span_normalise: false,
            ..StatsOptions::default()
        };
        let pi = diversity(&ts, &[&both], Some(&[0.0, 2.5, 10.0]), &opts).unwrap();
        assert_eq!(pi.len(), 2);
        assert!((pi[0] - 2.0 * 2.5).abs() < 1e-12);
        assert!((pi[1] - 2.0 * 7.5).abs() < 1e-12);
    }

    #[test]
    fn test_f4_sign_conventions() {
        // star tree with four samples, one mutation on each leaf
        // branch in turn
        let mut tables = TableCollection::new(4.0).unwrap();
        let root = tables.add_node(1.0, 0).unwrap();
        for _ in 0..4 {
            tables.add_sample_node(0.0).unwrap();
        }
        for child in 1..=4 {
            tables.add_edge(0.0, 4.0, root, child).unwrap();
        }
        for (i, node) in [1, 2, 3, 4].iter().enumerate() {
            let s = tables.add_site(i as f64, Some(b"A".to_vec())).unwrap();
            tables
                .add_mutation(s, *node, MutationId::NULL, Time::UNKNOWN, Some(b"T".to_vec()))
                .unwrap();
        }
        tables.sort_tables(TableSortingFlags::default());
        tables.build_index(IndexTablesFlags::empty()).unwrap();
        let ts = TreeSequence::new(tables, TreeSequenceFlags::empty()).unwrap();
        let sets: Vec<Vec<NodeId>> = (1..=4).map(|u| vec![NodeId::from(u)]).collect();
        let refs: Vec<&[NodeId]> = sets.iter().map(|s| s.as_slice()).collect();
        let opts = StatsOptions {
            span_normalise: false,
            ..StatsOptions::default()
        };
        // each singleton site contributes nothing: for any site,
        // one of (pA - pB), (pC - pD) is zero
        let v = f4(&ts, &refs, &[[0, 1, 2, 3]], None, &opts).unwrap();
        assert!(v[0].abs() < 1e-12);
    }

    #[test]
    fn test_trait_covariance_zero_for_constant_trait() {
        let ts = pair_treeseq();
        // constant trait: centring removes everything
        let v = trait_covariance(&ts, &[1.0, 1.0], 1, None, &StatsOptions::branch()).unwrap();
        assert!(v[0].abs() < 1e-12);
    }

    #[test]
    fn test_trait_correlation_bounds() {
        // four samples on a star; trait matches a clade of two
        let mut tables = TableCollection::new(10.0).unwrap();
        let root = tables.add_node(2.0, 0).unwrap();
        let inner = tables.add_node(1.0, 0).unwrap();
        for _ in 0..4 {
            tables.add_sample_node(0.0).unwrap();
        }
        tables.add_edge(0.0, 10.0, inner, 2).unwrap();
        tables.add_edge(0.0, 10.0, inner, 3).unwrap();
        tables.add_edge(0.0, 10.0, root, inner).unwrap();
        tables.add_edge(0.0, 10.0, root, 4).unwrap();
        tables.add_edge(0.0, 10.0, root, 5).unwrap();
        let s = tables.add_site(5.0, Some(b"A".to_vec())).unwrap();
        tables
            .add_mutation(s, inner, MutationId::NULL, Time::UNKNOWN, Some(b"T".to_vec()))
            .unwrap();
        tables.sort_tables(TableSortingFlags::default());
        tables.build_index(IndexTablesFlags::empty()).unwrap();
        let ts = TreeSequence::new(tables, TreeSequenceFlags::empty()).unwrap();

        // trait perfectly aligned with the mutation carriers
        let weights = [1.0, 1.0, 0.0, 0.0];
        let opts = StatsOptions {
            span_normalise: false,
            ..StatsOptions::default()
        };
        let v = trait_correlation(&ts, &weights, 1, None, &opts).unwrap();
        // squared correlation of a perfectly aligned trait is 1
        assert!((v[0] - 1.0).abs() < 1e-9, "{}", v[0]);
    }

    #[test]
    fn test_bad_set_index_rejected() {
        let ts = pair_treeseq();
        let a = [NodeId::from(1)];
        let r = divergence(
            &ts,
            &[&a],
            &[[0, 5]],
            None,
            &StatsOptions::branch(),
        );
        assert_eq!(r, Err(crate::stats::StatsError::BadSampleSetIndex));
    }
}
