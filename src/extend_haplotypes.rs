//! Haplotype extension: an iterative edge-table rewrite that
//! lengthens edges across tree boundaries.
//!
//! When an edge `(c -> p1 -> ... -> g)` chain ends at a tree
//! boundary and the next tree attaches `c` directly to `g`, the
//! intermediate nodes are plausibly part of the ancestral
//! haplotype on both sides.  Provided every intermediate node
//! is absent from the next tree, is not a sample, and carries
//! no branching, the chain's edges are extended rightward over
//! the next tree and the direct edge `(c, g)` is shortened or
//! removed.  No new edges are ever introduced.  The pass is run
//! alternately forwards and backwards until a fixed point or an
//! iteration cap.

use crate::newtypes::Position;
use crate::tables::{
    Edge, IndexTablesFlags, TableCollection, TableSortingFlags, TablesError, TablesResult,
};

const NO_EDGE: usize = usize::MAX;

// One left-to-right extension sweep over the edge list.
// Returns the number of edges modified or removed.  The edge
// list may contain edges in any order; removed edges are
// dropped before returning.
fn forward_pass(
    edges: &mut Vec<Edge>,
    num_nodes: usize,
    is_sample: &[bool],
) -> TablesResult<usize> {
    for e in edges.iter() {
        if e.parent < 0
            || e.child < 0
            || e.parent.0 as usize >= num_nodes
            || e.child.0 as usize >= num_nodes
        {
            return Err(TablesError::NodeOutOfBounds);
        }
    }

    // boundaries at all distinct endpoints
    let mut boundaries: Vec<f64> = edges
        .iter()
        .flat_map(|e| [e.left.raw(), e.right.raw()])
        .collect();
    boundaries.sort_by(|a, b| a.partial_cmp(b).unwrap());
    boundaries.dedup();

    let mut ins_order: Vec<usize> = (0..edges.len()).collect();
    ins_order.sort_by(|a, b| edges[*a].left.partial_cmp(&edges[*b].left).unwrap());
    let mut rem_order: Vec<usize> = (0..edges.len()).collect();
    rem_order.sort_by(|a, b| edges[*a].right.partial_cmp(&edges[*b].right).unwrap());

    let mut parent_edge = vec![NO_EDGE; num_nodes];
    let mut num_children = vec![0u32; num_nodes];
    let mut deleted = vec![false; edges.len()];
    let mut ins_cursor = 0;
    let mut rem_cursor = 0;
    // edges whose endpoints were rewritten to the next boundary
    let mut pending_out: Vec<usize> = vec![];
    let mut pending_in: Vec<usize> = vec![];
    let mut num_changed = 0;

    for (bi, x) in boundaries.iter().copied().enumerate() {
        let mut outs: Vec<usize> = std::mem::take(&mut pending_out);
        while rem_cursor < rem_order.len() && edges[rem_order[rem_cursor]].right.raw() <= x {
            let e = rem_order[rem_cursor];
            rem_cursor += 1;
            if !deleted[e] && edges[e].right.raw() == x {
                outs.push(e);
            }
        }
        let mut ins: Vec<usize> = std::mem::take(&mut pending_in);
        while ins_cursor < ins_order.len() && edges[ins_order[ins_cursor]].left.raw() <= x {
            let e = ins_order[ins_cursor];
            ins_cursor += 1;
            if !deleted[e] && edges[e].left.raw() == x {
                ins.push(e);
            }
        }

        let next_boundary = boundaries.get(bi + 1).copied();

        // out edges keyed by child, for chain walking
        let mut out_of_child = vec![NO_EDGE; num_nodes];
        for e in outs.iter() {
            out_of_child[edges[*e].child.0 as usize] = *e;
        }
        // nodes touched by an incoming edge are blocked as
        // mediators
        let mut touched = vec![false; num_nodes];
        for e in ins.iter() {
            touched[edges[*e].parent.0 as usize] = true;
            touched[edges[*e].child.0 as usize] = true;
        }

        let mut extended = vec![false; outs.len()];
        let mut extended_ids: Vec<usize> = vec![];
        if let Some(xp) = next_boundary {
            for i in 0..ins.len() {
                let e2 = ins[i];
                let (c, g) = (edges[e2].child, edges[e2].parent);
                let e0 = out_of_child[c.0 as usize];
                if e0 == NO_EDGE {
                    continue;
                }
                // walk the chain of ending edges up from c
                let mut chain = vec![e0];
                let mut ok = true;
                let mut cur = edges[e0].parent;
                while cur != g {
                    let m = cur.0 as usize;
                    let up = out_of_child[m];
                    if up == NO_EDGE
                        || is_sample[m]
                        || num_children[m] != 1
                        || touched[m]
                    {
                        ok = false;
                        break;
                    }
                    chain.push(up);
                    cur = edges[up].parent;
                }
                if !ok {
                    continue;
                }
                let xp = xp.min(edges[e2].right.raw());
                // extend the chain over [x, xp); trim or drop
                // the direct edge
                for e in chain.iter() {
                    edges[*e].right = Position::from(xp);
                    extended_ids.push(*e);
                }
                for (j, o) in outs.iter().enumerate() {
                    if chain.contains(o) {
                        extended[j] = true;
                    }
                }
                num_changed += chain.len();
                if edges[e2].right.raw() == xp {
                    deleted[e2] = true;
                } else {
                    edges[e2].left = Position::from(xp);
                    pending_in.push(e2);
                }
                num_changed += 1;
                // the chain bottom re-parents c in the next
                // tree; nothing to insert for c at this boundary
                ins[i] = NO_EDGE;
                // chain mediators are now occupied
                let mut cur = edges[e0].parent;
                while cur != g {
                    touched[cur.0 as usize] = true;
                    cur = edges[out_of_child[cur.0 as usize]].parent;
                }
            }
        }

        // apply state updates: unextended outs leave the tree
        for (j, e) in outs.iter().enumerate() {
            if extended[j] {
                pending_out.push(*e);
            } else {
                parent_edge[edges[*e].child.0 as usize] = NO_EDGE;
                num_children[edges[*e].parent.0 as usize] -= 1;
            }
        }
        for e in ins.iter() {
            if *e == NO_EDGE || deleted[*e] {
                continue;
            }
            if edges[*e].left.raw() == x {
                parent_edge[edges[*e].child.0 as usize] = *e;
                num_children[edges[*e].parent.0 as usize] += 1;
            }
        }
    }

    let mut kept = Vec::with_capacity(edges.len());
    for (i, e) in edges.iter().enumerate() {
        if !deleted[i] {
            kept.push(e.clone());
        }
    }
    *edges = kept;
    Ok(num_changed)
}

fn reflect(edges: &mut [Edge], length: f64) {
    for e in edges.iter_mut() {
        let (l, r) = (e.left.raw(), e.right.raw());
        e.left = Position::from(length - r);
        e.right = Position::from(length - l);
    }
}

/// Iteratively extend ambiguous edges across tree boundaries.
///
/// Runs forward and backward passes until neither changes the
/// edge table or `max_iterations` full rounds have run.  The
/// edge table is left sorted and indexed.
///
/// # Returns
///
/// The number of full rounds performed.
///
/// # Errors
///
/// [`TablesError`] if edges reference nonexistent nodes or the
/// rewritten table fails to re-index.
pub fn extend_haplotypes(
    tables: &mut TableCollection,
    max_iterations: u32,
) -> TablesResult<u32> {
    let num_nodes = tables.num_nodes();
    let length = tables.sequence_length().raw();
    let is_sample: Vec<bool> = tables.nodes().iter().map(|n| n.is_sample()).collect();

    let mut edges: Vec<Edge> = tables.edges().to_vec();
    let mut iterations = 0;
    while iterations < max_iterations {
        let forward = forward_pass(&mut edges, num_nodes, &is_sample)?;
        reflect(&mut edges, length);
        let backward = forward_pass(&mut edges, num_nodes, &is_sample)?;
        reflect(&mut edges, length);
        iterations += 1;
        if forward + backward == 0 {
            break;
        }
    }

    tables.edges_ = edges;
    tables.is_indexed = false;
    tables.sort_tables(TableSortingFlags::default());
    tables.build_index(IndexTablesFlags::empty())?;
    Ok(iterations)
}

#[cfg(test)]
mod test_extend_haplotypes {
    use super::*;
    use crate::prelude::*;

    // Two trees; in the left tree sample 0 attaches to the root
    // 3 through the unary-over-0 node 2, in the right tree it
    // attaches directly.  Node 2 is extendable.
    fn extendable_tables() -> TableCollection {
        let mut tables = TableCollection::new(10.0).unwrap();
        tables.add_sample_node(0.0).unwrap();
        tables.add_sample_node(0.0).unwrap();
        tables.add_node(1.0, 0).unwrap();
        tables.add_node(2.0, 0).unwrap();
        tables.add_edge(0.0, 5.0, 2, 0).unwrap();
        tables.add_edge(0.0, 5.0, 3, 2).unwrap();
        tables.add_edge(5.0, 10.0, 3, 0).unwrap();
        tables.add_edge(0.0, 10.0, 3, 1).unwrap();
        tables.sort_tables(TableSortingFlags::default());
        tables.build_index(IndexTablesFlags::empty()).unwrap();
        tables
    }

    #[test]
    fn test_unary_chain_is_extended() {
        let mut tables = extendable_tables();
        let iterations = extend_haplotypes(&mut tables, 10).unwrap();
        assert!(iterations >= 1);
        // the direct edge (3, 0) is gone; the chain through
        // node 2 covers the whole sequence
        assert_eq!(tables.num_edges(), 3);
        for e in tables.edges() {
            assert_eq!(e.left, 0.0);
            assert_eq!(e.right, 10.0);
        }
        let chain: Vec<(i32, i32)> = tables
            .edges()
            .iter()
            .map(|e| (e.parent.into(), e.child.into()))
            .collect();
        assert!(chain.contains(&(2, 0)));
        assert!(chain.contains(&(3, 2)));
        assert!(chain.contains(&(3, 1)));
    }

    #[test]
    fn test_extension_preserves_tree_count() {
        let mut tables = extendable_tables();
        extend_haplotypes(&mut tables, 10).unwrap();
        // with every edge spanning the whole sequence there is
        // one tree
        assert_eq!(tables.count_trees().unwrap(), 1);
    }

    #[test]
    fn test_sample_mediator_blocks_extension() {
        // same shape, but the mediator is itself a sample
        let mut tables = TableCollection::new(10.0).unwrap();
        tables.add_sample_node(0.0).unwrap();
        tables.add_sample_node(0.0).unwrap();
        tables.add_sample_node(1.0).unwrap();
        tables.add_node(2.0, 0).unwrap();
        tables.add_edge(0.0, 5.0, 2, 0).unwrap();
        tables.add_edge(0.0, 10.0, 3, 2).unwrap();
        tables.add_edge(5.0, 10.0, 3, 0).unwrap();
        tables.add_edge(0.0, 10.0, 3, 1).unwrap();
        tables.sort_tables(TableSortingFlags::default());
        tables.build_index(IndexTablesFlags::empty()).unwrap();
        let before = tables.num_edges();
        extend_haplotypes(&mut tables, 10).unwrap();
        assert_eq!(tables.num_edges(), before);
    }

    #[test]
    fn test_branching_mediator_blocks_extension() {
        // mediator node 3 has two children in the left tree
        let mut tables = TableCollection::new(10.0).unwrap();
        tables.add_sample_node(0.0).unwrap();
        tables.add_sample_node(0.0).unwrap();
        tables.add_sample_node(0.0).unwrap();
        tables.add_node(1.0, 0).unwrap();
        tables.add_node(2.0, 0).unwrap();
        tables.add_edge(0.0, 5.0, 3, 0).unwrap();
        tables.add_edge(0.0, 5.0, 3, 1).unwrap();
        tables.add_edge(0.0, 5.0, 4, 3).unwrap();
        tables.add_edge(5.0, 10.0, 4, 0).unwrap();
        tables.add_edge(5.0, 10.0, 4, 1).unwrap();
        tables.add_edge(0.0, 10.0, 4, 2).unwrap();
        tables.sort_tables(TableSortingFlags::default());
        tables.build_index(IndexTablesFlags::empty()).unwrap();
        let before: Vec<_> = tables.edges().to_vec();
        extend_haplotypes(&mut tables, 10).unwrap();
        // node 3 subtends two children, so nothing changes
        assert_eq!(tables.edges(), before.as_slice());
    }

    #[test]
    fn test_fixed_point_terminates_early() {
        let mut tables = extendable_tables();
        let iterations = extend_haplotypes(&mut tables, 100).unwrap();
        assert!(iterations < 100);
    }
}
