//! Generic windowed statistics over tree sequences.
//!
//! Every statistic here is a parameterization of one shared
//! contract: a **summary function** maps a per-dimension state
//! vector (how much "weight" descends from a node) to a
//! per-dimension result vector, and the framework supplies the
//! state by propagating sample weights up ancestor chains as
//! edges enter and leave the tree.  Three evaluation modes share
//! that contract:
//!
//! * [`StatMode::Site`]: states are partitioned by allele at
//!   each site and the summary is applied per allele.
//! * [`StatMode::Branch`]: each branch contributes its length
//!   times the summary of its subtree state.
//! * [`StatMode::Node`]: summaries are retained per node rather
//!   than summed over branches.
//!
//! Concrete statistics ([`diversity`], [`divergence`],
//! [`allele_frequency_spectrum`], the LD statistics, ...) never
//! re-implement tree traversal; they supply a summary function
//! and, where needed, a normalization strategy.

use crate::newtypes::NodeId;
use crate::tables::TIME_UNITS_UNCALIBRATED;
use crate::trees::TreesError;
use crate::treeseq::TreeSequence;
use thiserror::Error;

mod afs;
mod divergence_matrix;
mod one_locus;
mod pair_coalescence;
mod two_locus;

pub use afs::allele_frequency_spectrum;
pub use divergence_matrix::divergence_matrix;
pub use one_locus::{
    diversity, divergence, f2, f3, f4, genetic_relatedness, segregating_sites, trait_correlation,
    trait_covariance, trait_linear_model, y1, y2, y3,
};
pub use pair_coalescence::{
    pair_coalescence_counts, pair_coalescence_quantiles, pair_coalescence_rates,
};
pub use two_locus::{ld_matrix, TwoLocusStat};

/// The most sample sets any statistic accepts.  The limit is
/// explicit so that exceeding it is a checked configuration
/// error instead of silent misbehavior.
pub const MAX_SAMPLE_SETS: usize = 8192;

/// Error type for the statistics framework.
#[derive(Error, Debug, PartialEq)]
pub enum StatsError {
    /// Propagated tree/tree-sequence error.
    #[error(transparent)]
    Trees(#[from] TreesError),
    /// Windows must be strictly increasing and span the genome.
    #[error("Bad windows")]
    BadWindows,
    /// A sample set was empty.
    #[error("Empty sample set")]
    EmptySampleSet,
    /// Too many sample sets (see [`MAX_SAMPLE_SETS`]).
    #[error("Too many sample sets")]
    TooManySampleSets,
    /// A sample set refers to a node that is not a sample.
    #[error("Node is not a sample")]
    NotASample,
    /// A sample appears twice in one sample set.
    #[error("Duplicate sample")]
    DuplicateSample,
    /// A set-index tuple refers to a nonexistent sample set.
    #[error("Bad sample set index")]
    BadSampleSetIndex,
    /// A site id refers to a nonexistent site.
    #[error("Site ID out of bounds")]
    SiteOutOfBounds,
    /// The weights array has the wrong shape.
    #[error("Bad weights")]
    BadWeights,
    /// The statistic does not support the requested mode.
    #[error("Unsupported stat mode")]
    UnsupportedStatMode,
    /// Branch-length statistics are meaningless when the time
    /// units are uncalibrated, unless explicitly allowed.
    #[error("Time units are uncalibrated")]
    TimeUncalibrated,
    /// Quantiles must be strictly increasing, in (0, 1].
    #[error("Bad quantiles")]
    BadQuantiles,
    /// Time windows must be strictly increasing and start at 0.
    #[error("Bad time windows")]
    BadTimeWindows,
    /// A node-to-bin map entry is negative or out of range.
    #[error("Bad node bin map")]
    BadNodeBinMap,
    /// Too many alleles at a site for the requested statistic.
    #[error("Too many alleles")]
    TooManyAlleles,
}

/// Result type for statistics.
pub type StatsResult<T> = Result<T, StatsError>;

/// The three evaluation modes of the statistics framework.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StatMode {
    /// Weight states by site alleles.
    Site,
    /// Weight summaries by branch length.
    Branch,
    /// Retain summaries per node.
    Node,
}

/// Options shared by every windowed statistic.
#[derive(Copy, Clone, Debug)]
pub struct StatsOptions {
    /// Evaluation mode.
    pub mode: StatMode,
    /// Treat the ancestral allele asymmetrically.  When `false`
    /// (the default) the summary is evaluated for every allele
    /// (site mode), or as `f(state) + f(total - state)`
    /// (branch and node modes).
    pub polarised: bool,
    /// Divide each window's result by the window's span.
    pub span_normalise: bool,
    /// Permit branch-length statistics on tables whose
    /// `time_units` are uncalibrated.
    pub allow_time_uncalibrated: bool,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            mode: StatMode::Site,
            polarised: false,
            span_normalise: true,
            allow_time_uncalibrated: false,
        }
    }
}

impl StatsOptions {
    /// Site-mode options with the remaining defaults.
    pub fn site() -> Self {
        Self::default()
    }

    /// Branch-mode options with the remaining defaults.
    pub fn branch() -> Self {
        Self {
            mode: StatMode::Branch,
            ..Self::default()
        }
    }

    /// Node-mode options with the remaining defaults.
    pub fn node() -> Self {
        Self {
            mode: StatMode::Node,
            ..Self::default()
        }
    }
}

pub(crate) fn check_windows(
    ts: &TreeSequence,
    windows: &[f64],
    require_full_span: bool,
) -> StatsResult<()> {
    if windows.len() < 2 {
        return Err(StatsError::BadWindows);
    }
    if require_full_span {
        if windows[0] != 0.0 || windows[windows.len() - 1] != ts.sequence_length().raw() {
            return Err(StatsError::BadWindows);
        }
    } else if windows[0] < 0.0 || windows[windows.len() - 1] > ts.sequence_length().raw() {
        return Err(StatsError::BadWindows);
    }
    for w in windows.windows(2) {
        if w[0] >= w[1] {
            return Err(StatsError::BadWindows);
        }
    }
    Ok(())
}

pub(crate) fn check_time_calibration(ts: &TreeSequence, options: &StatsOptions) -> StatsResult<()> {
    if options.mode != StatMode::Site
        && ts.tables_ref().time_units == TIME_UNITS_UNCALIBRATED
        && !options.allow_time_uncalibrated
    {
        return Err(StatsError::TimeUncalibrated);
    }
    Ok(())
}

/// Validated sample sets: per-set sizes plus an indicator
/// weight matrix (`num_samples` rows by `num_sets` columns).
pub(crate) struct SampleSetWeights {
    pub sizes: Vec<f64>,
    pub weights: Vec<f64>,
    pub num_sets: usize,
}

pub(crate) fn sample_set_weights(
    ts: &TreeSequence,
    sample_sets: &[&[NodeId]],
) -> StatsResult<SampleSetWeights> {
    if sample_sets.len() > MAX_SAMPLE_SETS {
        return Err(StatsError::TooManySampleSets);
    }
    let num_sets = sample_sets.len();
    let num_samples = ts.num_samples();
    let mut weights = vec![0.0; num_samples * num_sets];
    let mut sizes = vec![0.0; num_sets];
    for (k, set) in sample_sets.iter().enumerate() {
        if set.is_empty() {
            return Err(StatsError::EmptySampleSet);
        }
        for u in set.iter() {
            let j = ts.sample_index(*u).ok_or(StatsError::NotASample)?;
            if weights[j * num_sets + k] != 0.0 {
                return Err(StatsError::DuplicateSample);
            }
            weights[j * num_sets + k] = 1.0;
        }
        sizes[k] = set.len() as f64;
    }
    Ok(SampleSetWeights {
        sizes,
        weights,
        num_sets,
    })
}

pub(crate) fn check_set_indexes<const N: usize>(
    indexes: &[[usize; N]],
    num_sets: usize,
) -> StatsResult<()> {
    for tuple in indexes {
        for i in tuple {
            if *i >= num_sets {
                return Err(StatsError::BadSampleSetIndex);
            }
        }
    }
    Ok(())
}

// Per-node state bookkeeping shared by the three modes: a
// parent array plus a flattened per-node state matrix, updated
// from edge differences.
struct StatePropagator<'a> {
    ts: &'a TreeSequence,
    parent: Vec<NodeId>,
    state: Vec<f64>,
    state_dim: usize,
}

impl<'a> StatePropagator<'a> {
    fn new(ts: &'a TreeSequence, weights: &[f64], state_dim: usize) -> Self {
        let num_nodes = ts.num_nodes();
        let mut state = vec![0.0; num_nodes * state_dim];
        for (j, u) in ts.sample_nodes().iter().enumerate() {
            let src = &weights[j * state_dim..(j + 1) * state_dim];
            state[u.0 as usize * state_dim..(u.0 as usize + 1) * state_dim]
                .copy_from_slice(src);
        }
        Self {
            ts,
            parent: vec![NodeId::NULL; num_nodes],
            state,
            state_dim,
        }
    }

    fn node_state(&self, u: NodeId) -> &[f64] {
        &self.state[u.0 as usize * self.state_dim..(u.0 as usize + 1) * self.state_dim]
    }

    fn time(&self, u: NodeId) -> f64 {
        self.ts.tables_ref().node(u).time.raw()
    }

    fn branch_length(&self, u: NodeId) -> f64 {
        match self.parent[u.0 as usize] {
            NodeId::NULL => 0.0,
            p => self.time(p) - self.time(u),
        }
    }

    // Add sign * state[child] to every node from `from` up to
    // the root of its chain.
    fn propagate(&mut self, child: NodeId, from: NodeId, sign: f64) {
        let dim = self.state_dim;
        let mut v = from;
        while v != NodeId::NULL {
            let c0 = child.0 as usize * dim;
            let v0 = v.0 as usize * dim;
            for k in 0..dim {
                let delta = sign * self.state[c0 + k];
                self.state[v0 + k] += delta;
            }
            v = self.parent[v.0 as usize];
        }
    }
}

/// Compute a generic windowed statistic.
///
/// # Parameters
///
/// * `ts`: the tree sequence.
/// * `weights`: row-major matrix of `num_samples` rows by
///   `state_dim` columns assigning a weight vector to each
///   sample (in sample-index order).
/// * `state_dim`: columns of `weights`.
/// * `result_dim`: length of the summary function's output.
/// * `f`: the summary function, mapping a state vector of
///   length `state_dim` to a result vector of length
///   `result_dim`.  It must map both the zero state and the
///   total weight to zero for the statistic to be well defined.
/// * `windows`: strictly increasing coordinates spanning
///   `[0, sequence_length]`.
/// * `options`: see [`StatsOptions`].
///
/// # Returns
///
/// A flat vector in `[window][result_dim]` layout for site and
/// branch modes, or `[window][node][result_dim]` for node mode.
pub fn general_stat<F>(
    ts: &TreeSequence,
    weights: &[f64],
    state_dim: usize,
    result_dim: usize,
    f: F,
    windows: &[f64],
    options: &StatsOptions,
) -> StatsResult<Vec<f64>>
where
    F: FnMut(&[f64], &mut [f64]),
{
    if state_dim == 0 || weights.len() != ts.num_samples() * state_dim {
        return Err(StatsError::BadWeights);
    }
    check_windows(ts, windows, true)?;
    check_time_calibration(ts, options)?;

    let mut total_weight = vec![0.0; state_dim];
    for j in 0..ts.num_samples() {
        for k in 0..state_dim {
            total_weight[k] += weights[j * state_dim + k];
        }
    }

    let mut result = match options.mode {
        StatMode::Site => site_general_stat(
            ts,
            weights,
            state_dim,
            result_dim,
            f,
            windows,
            options,
            &total_weight,
        )?,
        StatMode::Branch => branch_general_stat(
            ts,
            weights,
            state_dim,
            result_dim,
            f,
            windows,
            options,
            &total_weight,
        )?,
        StatMode::Node => node_general_stat(
            ts,
            weights,
            state_dim,
            result_dim,
            f,
            windows,
            options,
            &total_weight,
        )?,
    };

    if options.span_normalise {
        let num_windows = windows.len() - 1;
        let row = result.len() / num_windows;
        for w in 0..num_windows {
            let span = windows[w + 1] - windows[w];
            for x in result[w * row..(w + 1) * row].iter_mut() {
                *x /= span;
            }
        }
    }
    Ok(result)
}

// Wraps the raw summary function with the unpolarised
// complement term for branch and node modes.
fn wrap_summary<'a, F>(
    mut f: F,
    polarised: bool,
    total_weight: &'a [f64],
    state_dim: usize,
    result_dim: usize,
) -> impl FnMut(&[f64], &mut [f64]) + 'a
where
    F: FnMut(&[f64], &mut [f64]) + 'a,
{
    let mut complement = vec![0.0; state_dim];
    let mut scratch = vec![0.0; result_dim];
    move |state: &[f64], out: &mut [f64]| {
        f(state, out);
        if !polarised {
            for k in 0..state_dim {
                complement[k] = total_weight[k] - state[k];
            }
            f(&complement, &mut scratch);
            for m in 0..result_dim {
                out[m] += scratch[m];
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn branch_general_stat<F>(
    ts: &TreeSequence,
    weights: &[f64],
    state_dim: usize,
    result_dim: usize,
    f: F,
    windows: &[f64],
    options: &StatsOptions,
    total_weight: &[f64],
) -> StatsResult<Vec<f64>>
where
    F: FnMut(&[f64], &mut [f64]),
{
    let num_windows = windows.len() - 1;
    let num_nodes = ts.num_nodes();
    let mut summary_f = wrap_summary(f, options.polarised, total_weight, state_dim, result_dim);

    let mut prop = StatePropagator::new(ts, weights, state_dim);
    let mut summary = vec![0.0; num_nodes * result_dim];
    for u in 0..num_nodes {
        let state = prop.node_state(NodeId::from(u)).to_vec();
        summary_f(&state, &mut summary[u * result_dim..(u + 1) * result_dim]);
    }

    let mut running_sum = vec![0.0; result_dim];
    let mut result = vec![0.0; num_windows * result_dim];
    let mut window_index = 0;
    let mut pos = crate::tree_position::TreePosition::new(ts);
    let mut state_buf = vec![0.0; state_dim];

    while pos.next() {
        for e in pos.edges_out() {
            let edge = ts.tables_ref().edge(e);
            let (u, v) = (edge.child, edge.parent);
            let b = prop.branch_length(u);
            for m in 0..result_dim {
                running_sum[m] -= b * summary[u.0 as usize * result_dim + m];
            }
            prop.parent[u.0 as usize] = NodeId::NULL;
            let mut w = v;
            while w != NodeId::NULL {
                let bw = prop.branch_length(w);
                for m in 0..result_dim {
                    running_sum[m] -= bw * summary[w.0 as usize * result_dim + m];
                }
                let u0 = u.0 as usize * state_dim;
                let w0 = w.0 as usize * state_dim;
                for k in 0..state_dim {
                    prop.state[w0 + k] -= prop.state[u0 + k];
                }
                state_buf.copy_from_slice(&prop.state[w0..w0 + state_dim]);
                summary_f(
                    &state_buf,
                    &mut summary[w.0 as usize * result_dim..(w.0 as usize + 1) * result_dim],
                );
                for m in 0..result_dim {
                    running_sum[m] += bw * summary[w.0 as usize * result_dim + m];
                }
                w = prop.parent[w.0 as usize];
            }
        }
        for e in pos.edges_in() {
            let edge = ts.tables_ref().edge(e);
            let (u, v) = (edge.child, edge.parent);
            prop.parent[u.0 as usize] = v;
            let b = prop.branch_length(u);
            for m in 0..result_dim {
                running_sum[m] += b * summary[u.0 as usize * result_dim + m];
            }
            let mut w = v;
            while w != NodeId::NULL {
                let bw = prop.branch_length(w);
                for m in 0..result_dim {
                    running_sum[m] -= bw * summary[w.0 as usize * result_dim + m];
                }
                let u0 = u.0 as usize * state_dim;
                let w0 = w.0 as usize * state_dim;
                for k in 0..state_dim {
                    prop.state[w0 + k] += prop.state[u0 + k];
                }
                state_buf.copy_from_slice(&prop.state[w0..w0 + state_dim]);
                summary_f(
                    &state_buf,
                    &mut summary[w.0 as usize * result_dim..(w.0 as usize + 1) * result_dim],
                );
                for m in 0..result_dim {
                    running_sum[m] += bw * summary[w.0 as usize * result_dim + m];
                }
                w = prop.parent[w.0 as usize];
            }
        }

        // accumulate the running sum over this tree's interval,
        // split across windows
        let (left, right) = pos.interval();
        let mut a = left.raw();
        let right = right.raw();
        while a < right && window_index < num_windows {
            let wb = windows[window_index + 1];
            let b = wb.min(right);
            let span = b - a;
            for m in 0..result_dim {
                result[window_index * result_dim + m] += running_sum[m] * span;
            }
            if wb <= right {
                window_index += 1;
            }
            a = b;
        }
    }
    Ok(result)
}

#[allow(clippy::too_many_arguments)]
fn site_general_stat<F>(
    ts: &TreeSequence,
    weights: &[f64],
    state_dim: usize,
    result_dim: usize,
    mut f: F,
    windows: &[f64],
    options: &StatsOptions,
    total_weight: &[f64],
) -> StatsResult<Vec<f64>>
where
    F: FnMut(&[f64], &mut [f64]),
{
    let num_windows = windows.len() - 1;
    let mut prop = StatePropagator::new(ts, weights, state_dim);
    let mut result = vec![0.0; num_windows * result_dim];
    let mut window_index = 0;
    let mut pos = crate::tree_position::TreePosition::new(ts);
    let mut scratch = vec![0.0; result_dim];

    // allele bookkeeping reused across sites
    let mut allele_states: Vec<(Option<Vec<u8>>, Vec<f64>)> = vec![];

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
        let site_range = ts.tree_site_range(tree_index);
        for s in site_range {
            let site = &ts.tables_ref().sites()[s];
            allele_states.clear();
            allele_states.push((
                site.ancestral_state.clone(),
                total_weight.to_vec(),
            ));
            for m in ts.site_mutation_range(s) {
                let mutation = &ts.tables_ref().mutations()[m];
                let node_state = prop.node_state(mutation.node).to_vec();
                let derived = mutation.derived_state.clone();
                match allele_states.iter_mut().find(|(a, _)| *a == derived) {
                    Some((_, st)) => {
                        for k in 0..state_dim {
                            st[k] += node_state[k];
                        }
                    }
                    None => {
                        allele_states.push((derived, node_state.clone()));
                    }
                }
                let inherited = ts.mutation_inherited_state(m).map(|x| x.to_vec());
                if let Some((_, st)) =
                    allele_states.iter_mut().find(|(a, _)| *a == inherited)
                {
                    for k in 0..state_dim {
                        st[k] -= node_state[k];
                    }
                }
            }

            // move the window cursor to the site's position
            while window_index < num_windows - 1 && windows[window_index + 1] <= site.position.raw()
            {
                window_index += 1;
            }
            let start = if options.polarised { 1 } else { 0 };
            for (_, st) in allele_states.iter().skip(start) {
                f(st, &mut scratch);
                for m in 0..result_dim {
                    result[window_index * result_dim + m] += scratch[m];
                }
            }
        }
    }
    Ok(result)
}

#[allow(clippy::too_many_arguments)]
fn node_general_stat<F>(
    ts: &TreeSequence,
    weights: &[f64],
    state_dim: usize,
    result_dim: usize,
    f: F,
    windows: &[f64],
    options: &StatsOptions,
    total_weight: &[f64],
) -> StatsResult<Vec<f64>>
where
    F: FnMut(&[f64], &mut [f64]),
{
    let num_windows = windows.len() - 1;
    let num_nodes = ts.num_nodes();
    let mut summary_f = wrap_summary(f, options.polarised, total_weight, state_dim, result_dim);

    let mut prop = StatePropagator::new(ts, weights, state_dim);
    let mut summary = vec![0.0; num_nodes * result_dim];
    let mut state_buf = vec![0.0; state_dim];
    for u in 0..num_nodes {
        state_buf.copy_from_slice(prop.node_state(NodeId::from(u)));
        summary_f(&state_buf, &mut summary[u * result_dim..(u + 1) * result_dim]);
    }

    let mut result = vec![0.0; num_windows * num_nodes * result_dim];
    let mut last_update = vec![0.0; num_nodes];
    let mut window_index = 0usize;

    // flush node u's summary over [last_update[u], x) into the
    // current window
    macro_rules! flush {
        ($result:ident, $summary:ident, $last_update:ident, $wi:expr, $u:expr, $x:expr) => {{
            let u = $u.0 as usize;
            let span = $x - $last_update[u];
            if span > 0.0 {
                let base = ($wi * num_nodes + u) * result_dim;
                for m in 0..result_dim {
                    $result[base + m] += span * $summary[u * result_dim + m];
                }
            }
            $last_update[u] = $x;
        }};
    }

    let mut pos = crate::tree_position::TreePosition::new(ts);
    let mut more = pos.next();
    while more {
        let (left, _right) = pos.interval();
        let x = left.raw();

        // close any windows that end at or before x
        while window_index < num_windows && windows[window_index + 1] <= x {
            let wb = windows[window_index + 1];
            for u in 0..num_nodes {
                flush!(result, summary, last_update, window_index, NodeId::from(u), wb);
            }
            window_index += 1;
        }

        // the first transition inserts edges at x = 0; summaries
        // of affected nodes are flushed at x before they change
        for e in pos.edges_out() {
            let edge = ts.tables_ref().edge(e);
            let (u, v) = (edge.child, edge.parent);
            prop.parent[u.0 as usize] = NodeId::NULL;
            let mut w = v;
            while w != NodeId::NULL {
                flush!(result, summary, last_update, window_index, w, x);
                let u0 = u.0 as usize * state_dim;
                let w0 = w.0 as usize * state_dim;
                for k in 0..state_dim {
                    prop.state[w0 + k] -= prop.state[u0 + k];
                }
                state_buf.copy_from_slice(&prop.state[w0..w0 + state_dim]);
                summary_f(
                    &state_buf,
                    &mut summary[w.0 as usize * result_dim..(w.0 as usize + 1) * result_dim],
                );
                w = prop.parent[w.0 as usize];
            }
        }
        for e in pos.edges_in() {
            let edge = ts.tables_ref().edge(e);
            let (u, v) = (edge.child, edge.parent);
            prop.parent[u.0 as usize] = v;
            let mut w = v;
            while w != NodeId::NULL {
                flush!(result, summary, last_update, window_index, w, x);
                let u0 = u.0 as usize * state_dim;
                let w0 = w.0 as usize * state_dim;
                for k in 0..state_dim {
                    prop.state[w0 + k] += prop.state[u0 + k];
                }
                state_buf.copy_from_slice(&prop.state[w0..w0 + state_dim]);
                summary_f(
                    &state_buf,
                    &mut summary[w.0 as usize * result_dim..(w.0 as usize + 1) * result_dim],
                );
                w = prop.parent[w.0 as usize];
            }
        }
        more = pos.next();
        if !more {
            // close the remaining windows at the sequence end
            while window_index < num_windows {
                let wb = windows[window_index + 1];
                for u in 0..num_nodes {
                    flush!(result, summary, last_update, window_index, NodeId::from(u), wb);
                }
                window_index += 1;
            }
        }
    }
    Ok(result)
}
