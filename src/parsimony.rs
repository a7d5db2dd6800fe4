//! Hartigan parsimony: given observed states for the samples of
//! one tree, reconstruct an ancestral state and the smallest
//! set of state transitions explaining the observations.
//!
//! Allele sets are 64-bit masks, so at most [`MAX_ALLELES`]
//! distinct alleles are supported; exceeding the limit is a
//! checked error.

use crate::newtypes::NodeId;
use crate::trees::{Tree, TreesError, TreesResult};

/// The largest number of distinct alleles the bit-mask
/// representation supports.
pub const MAX_ALLELES: usize = 64;

/// Sentinel genotype for missing data: such samples are
/// compatible with every allele.
pub const MISSING_DATA: i32 = -1;

/// One state change on the tree, emitted by [`map_mutations`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateTransition {
    /// The node above which the state changes.
    pub node: NodeId,
    /// Index into the transition list of the closest transition
    /// on the path to the root, or -1.
    pub parent: i32,
    /// The new state (an allele index).
    pub state: u32,
}

/// Infer a most-parsimonious assignment of ancestral states.
///
/// # Parameters
///
/// * `tree`: the current tree.
/// * `genotypes`: one observed allele index per sample, in
///   sample-index order; [`MISSING_DATA`] marks missing
///   observations.
/// * `fixed_ancestral_state`: force the inferred root state
///   instead of choosing an optimal one.
///
/// # Returns
///
/// The ancestral allele and the list of state transitions, each
/// linked to its closest parent transition.
///
/// # Errors
///
/// [`TreesError::BadGenotypes`] on a wrong-length genotype
/// vector or out-of-range values;
/// [`TreesError::TooManyAlleles`] when more than
/// [`MAX_ALLELES`] alleles are named.
pub fn map_mutations(
    tree: &Tree,
    genotypes: &[i32],
    fixed_ancestral_state: Option<u32>,
) -> TreesResult<(u32, Vec<StateTransition>)> {
    if tree.index().is_none() {
        return Err(TreesError::NullTree);
    }
    let samples = tree.sample_nodes();
    if genotypes.len() != samples.len() {
        return Err(TreesError::BadGenotypes);
    }
    let mut num_alleles = 0usize;
    for g in genotypes {
        if *g == MISSING_DATA {
            continue;
        }
        if *g < 0 {
            return Err(TreesError::BadGenotypes);
        }
        num_alleles = num_alleles.max(*g as usize + 1);
    }
    if let Some(a) = fixed_ancestral_state {
        num_alleles = num_alleles.max(a as usize + 1);
    }
    if num_alleles > MAX_ALLELES {
        return Err(TreesError::TooManyAlleles);
    }
    if num_alleles == 0 {
        // all data missing: the ancestral state is arbitrary
        num_alleles = 1;
    }

    let num_slots = tree.num_nodes() + 1;
    let virtual_root = tree.virtual_root();
    let mut optimal_set = vec![0u64; num_slots];
    for (j, u) in samples.iter().enumerate() {
        optimal_set[u.0 as usize] = match genotypes[j] {
            MISSING_DATA => u64::MAX >> (64 - num_alleles as u32),
            g => 1u64 << g,
        };
    }

    // bottom-up: each node's optimal set is the alleles reaching
    // the maximum count over its children (plus its own
    // observation, for internal samples)
    let mut allele_count = vec![0u32; num_alleles];
    let postorder: Vec<NodeId> = tree.postorder()?.collect();
    for u in postorder.iter().chain(std::iter::once(&virtual_root)) {
        let mut has_child_sets = false;
        for c in allele_count.iter_mut() {
            *c = 0;
        }
        for v in tree.children(*u)? {
            let set = optimal_set[v.0 as usize];
            if set != 0 {
                has_child_sets = true;
                for (a, c) in allele_count.iter_mut().enumerate() {
                    *c += ((set >> a) & 1) as u32;
                }
            }
        }
        if !has_child_sets {
            continue;
        }
        let own = optimal_set[u.0 as usize];
        if own != 0 {
            // an internal sample counts as one more child
            for (a, c) in allele_count.iter_mut().enumerate() {
                *c += ((own >> a) & 1) as u32;
            }
        }
        let max_count = *allele_count.iter().max().unwrap();
        let mut set = 0u64;
        for (a, c) in allele_count.iter().enumerate() {
            if *c == max_count {
                set |= 1u64 << a;
            }
        }
        // a directly-observed node keeps its observation; only
        // unobserved and missing-data nodes are free
        if own.count_ones() == 1 {
            set = own;
        } else if own != 0 {
            set &= own;
        }
        optimal_set[u.0 as usize] = set;
    }

    let root_set = optimal_set[virtual_root.0 as usize];
    let ancestral_state = match fixed_ancestral_state {
        Some(a) => a,
        None => {
            if root_set == 0 {
                0
            } else {
                root_set.trailing_zeros()
            }
        }
    };

    // top-down: resolve each node to its parent's state when
    // possible, emitting a transition otherwise
    let mut transitions: Vec<StateTransition> = vec![];
    let mut state = vec![ancestral_state; num_slots];
    let mut transition_of = vec![-1i32; num_slots];
    for u in tree.preorder()? {
        let ui = u.0 as usize;
        let p = tree.parent(u)?;
        let (parent_state, parent_transition) = if p == NodeId::NULL {
            (ancestral_state, -1)
        } else {
            (state[p.0 as usize], transition_of[p.0 as usize])
        };
        state[ui] = parent_state;
        transition_of[ui] = parent_transition;
        let set = optimal_set[ui];
        if set != 0 && (set >> parent_state) & 1 == 0 {
            let new_state = set.trailing_zeros();
            state[ui] = new_state;
            transitions.push(StateTransition {
                node: u,
                parent: parent_transition,
                state: new_state,
            });
            transition_of[ui] = transitions.len() as i32 - 1;
        }
    }

    Ok((ancestral_state, transitions))
}

#[cfg(test)]
mod test_parsimony {
    use super::*;
    use crate::prelude::*;

    // 6 -> (4, 5); 4 -> (0, 1); 5 -> (2, 3)
    fn nested_treeseq() -> TreeSequence {
        let mut tables = TableCollection::new(10.0).unwrap();
        for _ in 0..4 {
            tables.add_sample_node(0.0).unwrap();
        }
        tables.add_node(1.0, 0).unwrap();
        tables.add_node(1.0, 0).unwrap();
        tables.add_node(2.0, 0).unwrap();
        tables.add_edge(0.0, 10.0, 4, 0).unwrap();
        tables.add_edge(0.0, 10.0, 4, 1).unwrap();
        tables.add_edge(0.0, 10.0, 5, 2).unwrap();
        tables.add_edge(0.0, 10.0, 5, 3).unwrap();
        tables.add_edge(0.0, 10.0, 6, 4).unwrap();
        tables.add_edge(0.0, 10.0, 6, 5).unwrap();
        tables.sort_tables(TableSortingFlags::default());
        tables.build_index(IndexTablesFlags::empty()).unwrap();
        TreeSequence::new(tables, TreeSequenceFlags::empty()).unwrap()
    }

    #[test]
    fn test_all_same_state() {
        let ts = nested_treeseq();
        let mut tree = ts.tree_iterator(TreeFlags::default()).unwrap();
        tree.next_tree();
        let (anc, transitions) = map_mutations(&tree, &[0, 0, 0, 0], None).unwrap();
        assert_eq!(anc, 0);
        assert!(transitions.is_empty());
    }

    #[test]
    fn test_single_clade_mutation() {
        let ts = nested_treeseq();
        let mut tree = ts.tree_iterator(TreeFlags::default()).unwrap();
        tree.next_tree();
        // samples 2 and 3 carry allele 1: one transition above
        // node 5
        let (anc, transitions) = map_mutations(&tree, &[0, 0, 1, 1], None).unwrap();
        assert_eq!(anc, 0);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].node, NodeId::from(5));
        assert_eq!(transitions[0].state, 1);
        assert_eq!(transitions[0].parent, -1);
    }

    #[test]
    fn test_singleton_mutation() {
        let ts = nested_treeseq();
        let mut tree = ts.tree_iterator(TreeFlags::default()).unwrap();
        tree.next_tree();
        let (anc, transitions) = map_mutations(&tree, &[1, 0, 0, 0], None).unwrap();
        assert_eq!(anc, 0);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].node, NodeId::from(0));
    }

    #[test]
    fn test_fixed_ancestral_state() {
        let ts = nested_treeseq();
        let mut tree = ts.tree_iterator(TreeFlags::default()).unwrap();
        tree.next_tree();
        // forcing the minority allele as ancestral flips the
        // transitions
        let (anc, transitions) = map_mutations(&tree, &[0, 0, 1, 1], Some(1)).unwrap();
        assert_eq!(anc, 1);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].node, NodeId::from(4));
        assert_eq!(transitions[0].state, 0);
    }

    #[test]
    fn test_missing_data_is_free() {
        let ts = nested_treeseq();
        let mut tree = ts.tree_iterator(TreeFlags::default()).unwrap();
        tree.next_tree();
        let (anc, transitions) =
            map_mutations(&tree, &[0, MISSING_DATA, 0, 0], None).unwrap();
        assert_eq!(anc, 0);
        assert!(transitions.is_empty());
    }

    #[test]
    fn test_nested_transitions_are_linked() {
        let ts = nested_treeseq();
        let mut tree = ts.tree_iterator(TreeFlags::default()).unwrap();
        tree.next_tree();
        // allele 1 above node 4; back to 0 above sample 1
        let (anc, transitions) = map_mutations(&tree, &[1, 0, 0, 0], Some(0)).unwrap();
        assert_eq!(anc, 0);
        // parsimony may pick either a singleton on node 0 or a
        // clade change plus reversion; with these genotypes the
        // singleton is cheaper
        assert_eq!(transitions.len(), 1);
    }

    #[test]
    fn test_too_many_alleles() {
        let ts = nested_treeseq();
        let mut tree = ts.tree_iterator(TreeFlags::default()).unwrap();
        tree.next_tree();
        let r = map_mutations(&tree, &[64, 0, 0, 0], None);
        assert_eq!(r, Err(TreesError::TooManyAlleles));
    }

    #[test]
    fn test_bad_genotype_length() {
        let ts = nested_treeseq();
        let mut tree = ts.tree_iterator(TreeFlags::default()).unwrap();
        tree.next_tree();
        assert_eq!(
            map_mutations(&tree, &[0, 0], None),
            Err(TreesError::BadGenotypes)
        );
        assert_eq!(
            map_mutations(&tree, &[0, 0, 0, -2], None),
            Err(TreesError::BadGenotypes)
        );
    }
}
