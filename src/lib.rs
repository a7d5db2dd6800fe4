//! Succinct tree sequences and windowed statistics
//! implemented from the ground up in rust.
//!
//! A tree sequence stores a sequence of correlated genealogical
//! trees, each covering an interval of a linear genome, as a
//! single table of edges.  This crate provides:
//!
//! 1. [`TableCollection`]: columnar-style storage of nodes,
//!    edges, sites, mutations, and friends, plus the sorting,
//!    validation, and indexing steps that gate tree building.
//! 2. [`TreeSequence`]: a read-only index over validated tables
//!    (breakpoints, samples, per-tree sites).
//! 3. [`Tree`]: one incrementally-updated forest, advanced
//!    tree-by-tree by edge insertion and removal, maintaining
//!    subtree sample counts and sample lists.
//! 4. A windowed statistics framework ([`stats`]) in which
//!    diversity, divergence, the allele frequency spectrum,
//!    linkage disequilibrium, pair-coalescence rates, and
//!    relatives are thin parameterizations of three generic
//!    evaluators (site, branch, node).
//! 5. Assorted tree algorithms: parsimony
//!    ([`parsimony`]), balance indices ([`balance`]),
//!    Kendall-Colijn distance ([`distance`]),
//!    constant-time lowest-common-ancestor queries ([`lca`]),
//!    and haplotype extension ([`extend_haplotypes`]).
//!
//! Time moves *backwards*: parents have larger time values than
//! their children, and the root of a tree is its oldest node.
//!
//! # Example
//!
//! ```
//! use streaming_iterator::StreamingIterator;
//! use treeseq::prelude::*;
//!
//! let mut tables = TableCollection::new(10.0).unwrap();
//! let root = tables.add_node(1.0, 0).unwrap();
//! let a = tables.add_sample_node(0.0).unwrap();
//! let b = tables.add_sample_node(0.0).unwrap();
//! tables.add_edge(0.0, 10.0, root, a).unwrap();
//! tables.add_edge(0.0, 10.0, root, b).unwrap();
//! tables.sort_tables(TableSortingFlags::default());
//! tables.build_index(IndexTablesFlags::empty()).unwrap();
//!
//! let ts = TreeSequence::new(tables, TreeSequenceFlags::empty()).unwrap();
//! assert_eq!(ts.num_trees(), 1);
//! let mut iter = ts.tree_iterator(TreeFlags::default()).unwrap();
//! while let Some(tree) = iter.next() {
//!     assert_eq!(tree.num_roots().unwrap(), 1);
//! }
//! ```

mod macros;

pub mod balance;
pub mod distance;
pub mod extend_haplotypes;
pub mod lca;
mod newtypes;
pub mod parsimony;
pub mod stats;
mod tables;
pub mod traits;
mod tree_position;
mod trees;
mod treeseq;

pub use newtypes::*;
pub use tables::*;
pub use tree_position::{EdgeOrder, EdgeRange, TreePosition};
pub use trees::*;
pub use treeseq::{TreeSequence, TreeSequenceFlags};
pub mod prelude;

/// Get the crate version number.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
