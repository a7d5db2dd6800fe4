//! Shared tooling for integration tests: a random-walk tree
//! sequence generator.
//!
//! Starting from a balanced binary tree over the samples, each
//! breakpoint applies a few random subtree-prune-regraft moves:
//! a node is detached from its parent and re-attached below any
//! strictly older node outside its own subtree.  Every
//! intermediate state is a valid forest, so the resulting
//! tables always sort, validate, and index cleanly.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use treeseq::prelude::*;

pub fn random_tree_sequence(
    seed: u64,
    num_samples: usize,
    num_breakpoints: usize,
    sequence_length: f64,
) -> TableCollection {
    assert!(num_samples >= 2);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tables = TableCollection::new(sequence_length).unwrap();
    for _ in 0..num_samples {
        tables.add_sample_node(0.0).unwrap();
    }
    // internal nodes, oldest last
    let num_internal = num_samples - 1;
    for i in 0..num_internal {
        tables.add_node(1.0 + i as f64, 0).unwrap();
    }
    let num_nodes = num_samples + num_internal;

    // balanced-ish initial tree: repeatedly join the two oldest
    // unparented subtrees under the next internal node
    let mut parent = vec![NodeId::NULL; num_nodes];
    let mut open_left = vec![0.0f64; num_nodes];
    let mut unparented: Vec<i32> = (0..num_samples as i32).collect();
    for i in 0..num_internal {
        let p = (num_samples + i) as i32;
        let a = unparented.remove(0);
        let b = unparented.remove(0);
        parent[a as usize] = NodeId::from(p);
        parent[b as usize] = NodeId::from(p);
        unparented.push(p);
    }

    let time = |tables: &TableCollection, u: i32| tables.node(u).time.raw();
    let in_subtree = |parent: &[NodeId], mut w: i32, u: i32| -> bool {
        loop {
            if w == u {
                return true;
            }
            match parent[w as usize] {
                NodeId::NULL => return false,
                p => w = p.into(),
            }
        }
    };

    for b in 1..=num_breakpoints {
        let x = sequence_length * b as f64 / (num_breakpoints + 1) as f64;
        for _ in 0..rng.gen_range(1..3) {
            // pick a node to move
            let candidates: Vec<i32> = (0..num_nodes as i32)
                .filter(|u| parent[*u as usize] != NodeId::NULL)
                .collect();
            if candidates.is_empty() {
                break;
            }
            let u = candidates[rng.gen_range(0..candidates.len())];
            let targets: Vec<i32> = (0..num_nodes as i32)
                .filter(|w| {
                    *w != i32::from(parent[u as usize])
                        && time(&tables, *w) > time(&tables, u)
                        && !in_subtree(&parent, *w, u)
                })
                .collect();
            if targets.is_empty() {
                continue;
            }
            let w = targets[rng.gen_range(0..targets.len())];
            // close the old edge, open the new one
            let p = parent[u as usize];
            if open_left[u as usize] < x {
                tables
                    .add_edge(open_left[u as usize], x, p, u)
                    .unwrap();
            }
            parent[u as usize] = NodeId::from(w);
            open_left[u as usize] = x;
        }
    }
    for u in 0..num_nodes {
        if parent[u] != NodeId::NULL && open_left[u] < sequence_length {
            tables
                .add_edge(open_left[u], sequence_length, parent[u], u)
                .unwrap();
        }
    }

    tables.sort_tables(TableSortingFlags::default());
    tables.validate(TableValidationFlags::VALIDATE_ALL).unwrap();
    tables.build_index(IndexTablesFlags::empty()).unwrap();
    tables
}

/// The parent of every node at position `x`, reconstructed
/// directly from the edge table.
pub fn parents_at(tables: &TableCollection, x: f64) -> Vec<NodeId> {
    let mut parent = vec![NodeId::NULL; tables.num_nodes()];
    for e in tables.edges() {
        if e.left.raw() <= x && x < e.right.raw() {
            parent[usize::from(e.child)] = e.parent;
        }
    }
    parent
}

/// Total branch length at position `x`, reconstructed directly
/// from the edge table.
pub fn total_branch_length_at(tables: &TableCollection, x: f64) -> f64 {
    parents_at(tables, x)
        .iter()
        .enumerate()
        .map(|(u, p)| match *p {
            NodeId::NULL => 0.0,
            p => tables.node(p).time.raw() - tables.node(u).time.raw(),
        })
        .sum()
}
