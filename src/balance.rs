//! Tree balance (imbalance) indices.

use crate::newtypes::NodeId;
use crate::trees::{Tree, TreesError, TreesResult};

/// Sackin's index: the sum over leaves of their depth.
pub fn sackin_index(tree: &Tree) -> TreesResult<u64> {
    let mut total = 0u64;
    let mut depth = vec![0u64; tree.num_nodes() + 1];
    for u in tree.preorder()? {
        let p = tree.parent(u)?;
        let d = if p == NodeId::NULL {
            0
        } else {
            depth[p.0 as usize] + 1
        };
        depth[u.0 as usize] = d;
        if tree.num_children(u)? == 0 {
            total += d;
        }
    }
    Ok(total)
}

/// Colless' index: the sum over internal nodes of the absolute
/// difference in leaf counts between their two subtrees.
///
/// # Errors
///
/// [`TreesError::MultipleRoots`] unless the tree has one root;
/// [`TreesError::NonBinaryTree`] unless every internal node has
/// exactly two children.
pub fn colless_index(tree: &Tree) -> TreesResult<u64> {
    if tree.num_roots()? != 1 {
        return Err(TreesError::MultipleRoots);
    }
    let mut leaves = vec![0u64; tree.num_nodes() + 1];
    let mut total = 0u64;
    for u in tree.postorder()? {
        let n = tree.num_children(u)?;
        if n == 0 {
            leaves[u.0 as usize] = 1;
            continue;
        }
        if n != 2 {
            return Err(TreesError::NonBinaryTree);
        }
        let left = tree.left_child(u)?;
        let right = tree.right_child(u)?;
        let (a, b) = (leaves[left.0 as usize], leaves[right.0 as usize]);
        leaves[u.0 as usize] = a + b;
        total += a.abs_diff(b);
    }
    Ok(total)
}

/// B1: the sum over interior nodes (excluding roots) of the
/// inverse of the maximum path length to a leaf below.
pub fn b1_index(tree: &Tree) -> TreesResult<f64> {
    let mut max_path = vec![0u64; tree.num_nodes() + 1];
    let mut total = 0.0;
    for u in tree.postorder()? {
        let mut m = 0u64;
        let mut is_internal = false;
        for c in tree.children(u)? {
            is_internal = true;
            m = m.max(max_path[c.0 as usize] + 1);
        }
        max_path[u.0 as usize] = m;
        if is_internal && tree.parent(u)? != NodeId::NULL {
            total += 1.0 / m as f64;
        }
    }
    Ok(total)
}

/// B2: the Shannon entropy, in the given log base, of the
/// probability of arriving at each leaf under an equiprobable
/// random walk from the root.
///
/// # Errors
///
/// [`TreesError::MultipleRoots`] unless the tree has one root.
pub fn b2_index(tree: &Tree, base: f64) -> TreesResult<f64> {
    if tree.num_roots()? != 1 {
        return Err(TreesError::MultipleRoots);
    }
    let mut prob = vec![0.0f64; tree.num_nodes() + 1];
    let mut total = 0.0;
    for u in tree.preorder()? {
        let p = tree.parent(u)?;
        let incoming = if p == NodeId::NULL {
            1.0
        } else {
            prob[p.0 as usize] / tree.num_children(p)? as f64
        };
        prob[u.0 as usize] = incoming;
        if tree.num_children(u)? == 0 && incoming > 0.0 {
            total -= incoming * incoming.log(base);
        }
    }
    Ok(total)
}
