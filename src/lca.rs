//! Offline lowest-common-ancestor queries.
//!
//! [`SvTables`] implements the Schieber-Vishkin scheme: a
//! linear-time build over one tree, answering LCA queries in
//! constant time.  The structure is rebuilt once per tree by
//! consumers that query many pairs per tree (for example the
//! branch-mode divergence matrix).

use crate::newtypes::NodeId;
use crate::trees::{Tree, TreesError, TreesResult};

/// Schieber-Vishkin LCA tables over a single tree.
///
/// The tree's virtual root participates, so two nodes in
/// disjoint subtrees report the virtual root as their common
/// ancestor.
pub struct SvTables {
    virtual_root: NodeId,
    parent: Vec<NodeId>,
    // 1-based preorder number, 0 for nodes not in the tree
    pre: Vec<u32>,
    inlabel: Vec<u32>,
    ascendant: Vec<u32>,
    // node whose inlabel-run starts at the given inlabel value
    head: Vec<NodeId>,
}

fn msb_index(x: u32) -> u32 {
    debug_assert!(x > 0);
    31 - x.leading_zeros()
}

// The inlabel of the preorder interval [l, r]: the single
// number in the interval with the most trailing zeros.
fn interval_inlabel(l: u32, r: u32) -> u32 {
    let i = msb_index((l - 1) ^ r);
    (r >> i) << i
}

impl SvTables {
    /// Build the tables for the tree's current state.
    ///
    /// # Errors
    ///
    /// [`TreesError::NullTree`] if the tree has not been
    /// positioned.
    pub fn new(tree: &Tree) -> TreesResult<Self> {
        if tree.index().is_none() {
            return Err(TreesError::NullTree);
        }
        let num_slots = tree.num_nodes() + 1;
        let virtual_root = tree.virtual_root();
        let mut parent = vec![NodeId::NULL; num_slots];
        let mut pre = vec![0u32; num_slots];
        let mut last = vec![0u32; num_slots];
        let mut inlabel = vec![0u32; num_slots];
        let mut ascendant = vec![0u32; num_slots];
        let mut head = vec![NodeId::NULL; num_slots + 2];

        // preorder numbering, virtual root first
        let mut order: Vec<NodeId> = Vec::with_capacity(num_slots);
        let mut stack = vec![virtual_root];
        while let Some(u) = stack.pop() {
            order.push(u);
            pre[u.0 as usize] = order.len() as u32;
            let mut c = tree.right_child(u)?;
            while c != NodeId::NULL {
                parent[c.0 as usize] = u;
                stack.push(c);
                c = tree.left_sib(c)?;
            }
        }

        // subtree intervals, children before parents
        for u in order.iter().rev() {
            let ui = u.0 as usize;
            last[ui] = pre[ui];
            let mut c = tree.left_child(*u)?;
            while c != NodeId::NULL {
                last[ui] = last[ui].max(last[c.0 as usize]);
                c = tree.right_sib(c)?;
            }
            inlabel[ui] = interval_inlabel(pre[ui], last[ui]);
        }

        // ascendant bit sets and run heads, parents before
        // children
        for u in order.iter() {
            let ui = u.0 as usize;
            let level_bit = inlabel[ui] & inlabel[ui].wrapping_neg();
            let p = parent[ui];
            if p == NodeId::NULL {
                ascendant[ui] = level_bit;
                head[inlabel[ui] as usize] = *u;
            } else {
                let pi = p.0 as usize;
                ascendant[ui] = ascendant[pi] | level_bit;
                if inlabel[ui] != inlabel[pi] {
                    head[inlabel[ui] as usize] = *u;
                }
            }
        }

        Ok(Self {
            virtual_root,
            parent,
            pre,
            inlabel,
            ascendant,
            head,
        })
    }

    /// The lowest common ancestor of `x` and `y`.
    ///
    /// Returns the virtual root when the two nodes have no real
    /// common ancestor.
    pub fn mrca(&self, x: NodeId, y: NodeId) -> NodeId {
        let (xi, yi) = (x.0 as usize, y.0 as usize);
        debug_assert!(self.pre[xi] > 0 && self.pre[yi] > 0);
        let (ix, iy) = (self.inlabel[xi], self.inlabel[yi]);
        if ix == iy {
            // same run: the ancestor is the earlier preorder
            return if self.pre[xi] <= self.pre[yi] { x } else { y };
        }
        let i = msb_index(ix ^ iy);
        let mask = !((1u32 << i) - 1);
        let common = self.ascendant[xi] & self.ascendant[yi] & mask;
        let j = common.trailing_zeros();
        let inlabel_z = if j >= 31 {
            1u32 << j
        } else {
            ((ix >> (j + 1)) << (j + 1)) | (1u32 << j)
        };
        let xbar = self.climb_to_run(x, inlabel_z, j);
        let ybar = self.climb_to_run(y, inlabel_z, j);
        if self.pre[xbar.0 as usize] <= self.pre[ybar.0 as usize] {
            xbar
        } else {
            ybar
        }
    }

    // The lowest ancestor of u whose inlabel equals inlabel_z
    // (whose level is j).
    fn climb_to_run(&self, u: NodeId, inlabel_z: u32, j: u32) -> NodeId {
        let ui = u.0 as usize;
        if self.inlabel[ui] == inlabel_z {
            return u;
        }
        // the highest level below j on u's own path
        let below = self.ascendant[ui] & ((1u32 << j) - 1);
        debug_assert!(below > 0);
        let k = msb_index(below);
        let iu = self.inlabel[ui];
        let inlabel_w = if k >= 31 {
            1u32 << k
        } else {
            ((iu >> (k + 1)) << (k + 1)) | (1u32 << k)
        };
        let w = self.head[inlabel_w as usize];
        self.parent[w.0 as usize]
    }

    /// The virtual root of the tree the tables were built from.
    pub fn virtual_root(&self) -> NodeId {
        self.virtual_root
    }
}
