//! Kendall-Colijn (KC) tree distance.
//!
//! Each tree over `n` samples is summarized by a vector of
//! `n(n-1)/2 + n` entries: for every sample pair, the distance
//! from the root to their most recent common ancestor (in edge
//! count for the topological part, in time for the temporal
//! part), and for every sample a fixed entry (1, or the pendant
//! branch length).  The distance between two trees is the
//! Euclidean distance between their `lambda`-blended vectors.

use crate::newtypes::NodeId;
use crate::trees::{Tree, TreeFlags, TreesError, TreesResult};
use crate::treeseq::TreeSequence;

struct KcVectors {
    topo: Vec<f64>,
    time: Vec<f64>,
}

fn pair_index(i: usize, j: usize, n: usize) -> usize {
    debug_assert!(i < j);
    i * n - i * (i + 1) / 2 + (j - i - 1)
}

fn kc_vectors(tree: &Tree) -> TreesResult<KcVectors> {
    if tree.num_roots()? != 1 {
        return Err(TreesError::MultipleRoots);
    }
    let samples = tree.sample_nodes();
    let n = samples.len();
    for s in samples {
        if tree.num_children(*s)? != 0 {
            return Err(TreesError::InvalidSamples);
        }
    }
    let num_pairs = n * (n - 1) / 2;
    let mut topo = vec![0.0; num_pairs + n];
    let mut time = vec![0.0; num_pairs + n];

    let mut depth = vec![0u64; tree.num_nodes() + 1];
    let mut root = NodeId::NULL;
    for u in tree.preorder()? {
        let p = tree.parent(u)?;
        if p == NodeId::NULL {
            root = u;
            depth[u.0 as usize] = 0;
        } else {
            depth[u.0 as usize] = depth[p.0 as usize] + 1;
        }
    }
    let root_time = tree.node_time(root)?.raw();

    for i in 0..n {
        for j in (i + 1)..n {
            let m = tree.mrca(samples[i], samples[j])?;
            let k = pair_index(i, j, n);
            topo[k] = depth[m.0 as usize] as f64;
            time[k] = root_time - tree.node_time(m)?.raw();
        }
    }
    for (i, s) in samples.iter().enumerate() {
        topo[num_pairs + i] = 1.0;
        time[num_pairs + i] = tree.branch_length(*s)?;
    }
    Ok(KcVectors { topo, time })
}

fn blended_distance(a: &KcVectors, b: &KcVectors, lambda: f64) -> f64 {
    let mut total = 0.0;
    for k in 0..a.topo.len() {
        let va = (1.0 - lambda) * a.topo[k] + lambda * a.time[k];
        let vb = (1.0 - lambda) * b.topo[k] + lambda * b.time[k];
        total += (va - vb) * (va - vb);
    }
    total.sqrt()
}

fn check_same_samples(a: &[NodeId], b: &[NodeId]) -> TreesResult<()> {
    if a != b {
        return Err(TreesError::InvalidSamples);
    }
    Ok(())
}

/// The KC distance between two trees over the same samples.
///
/// # Errors
///
/// [`TreesError::MultipleRoots`] unless both trees have a
/// single root; [`TreesError::InvalidSamples`] if the trees'
/// sample lists differ or a sample is an internal node.
pub fn kc_distance(tree1: &Tree, tree2: &Tree, lambda: f64) -> TreesResult<f64> {
    check_same_samples(tree1.sample_nodes(), tree2.sample_nodes())?;
    let a = kc_vectors(tree1)?;
    let b = kc_vectors(tree2)?;
    Ok(blended_distance(&a, &b, lambda))
}

/// The KC distance between two tree sequences, integrated over
/// their common genome.
///
/// For every maximal interval on which both local trees are
/// constant, the squared tree distance is weighted by the
/// interval's span; the result is the square root of the
/// span-normalized total.
///
/// # Errors
///
/// As [`kc_distance`], plus [`TreesError::InvalidSamples`] for
/// mismatched sample lists and
/// [`TreesError::PositionOutOfBounds`] for unequal sequence
/// lengths.
pub fn kc_distance_treeseq(
    ts1: &TreeSequence,
    ts2: &TreeSequence,
    lambda: f64,
) -> TreesResult<f64> {
    check_same_samples(ts1.sample_nodes(), ts2.sample_nodes())?;
    if ts1.sequence_length() != ts2.sequence_length() {
        return Err(TreesError::PositionOutOfBounds);
    }
    let length = ts1.sequence_length().raw();

    let mut tree1 = ts1.tree_iterator(TreeFlags::default())?;
    let mut tree2 = ts2.tree_iterator(TreeFlags::default())?;
    tree1.next_tree();
    tree2.next_tree();
    let mut v1 = kc_vectors(&tree1)?;
    let mut v2 = kc_vectors(&tree2)?;

    let mut total = 0.0;
    let mut left = 0.0;
    loop {
        let r1 = tree1.interval().1.raw();
        let r2 = tree2.interval().1.raw();
        let right = r1.min(r2);
        let d = blended_distance(&v1, &v2, lambda);
        total += d * d * (right - left);
        if right >= length {
            break;
        }
        if r1 == right {
            tree1.next_tree();
            v1 = kc_vectors(&tree1)?;
        }
        if r2 == right {
            tree2.next_tree();
            v2 = kc_vectors(&tree2)?;
        }
        left = right;
    }
    Ok((total / length).sqrt())
}
