use crate::newtypes::{EdgeId, NodeId, Position, Time};
use crate::tables::TablesError;
use crate::tree_position::TreePosition;
use crate::treeseq::TreeSequence;
use bitflags::bitflags;

bitflags! {
    /// Modify the behavior of [`TreeSequence::tree_iterator`].
    #[derive(Default)]
    pub struct TreeFlags: u32 {
        /// Do not maintain subtree sample counts.
        ///
        /// Sample counts are what root bookkeeping is built on,
        /// so root and traversal queries are unavailable when
        /// this flag is set.
        const NO_SAMPLE_COUNTS = 1 << 0;
        /// Maintain intrusive per-node sample lists, giving O(1)
        /// access to the samples descending from any node.
        /// This tracking is relatively expensive.
        const SAMPLE_LISTS = 1 << 1;
    }
}

/// Error type related to [``TreeSequence``] and [``Tree``].
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TreesError {
    /// Propagated table error.
    #[error(transparent)]
    Tables(#[from] TablesError),
    /// Returned by [``TreeSequence::new``](crate::TreeSequence::new)
    /// when tables have not been indexed.
    #[error("Tables not indexed")]
    TablesNotIndexed,
    /// Returned when a [`NodeId`] is not present in a
    /// [`Tree`] or [`TreeSequence`](crate::TreeSequence).
    #[error("Node ID out of range")]
    NodeIdOutOfRange,
    /// Returned if a tree sequence is initialized with no samples.
    #[error("No samples found")]
    NoSamples,
    /// Returned when a samples list is invalid.
    #[error("Invalid samples")]
    InvalidSamples,
    /// Returned if sample lists contain duplicate [`NodeId`].
    #[error("Duplicate samples")]
    DuplicateSamples,
    /// Returned when sample list information is requested, yet
    /// [`TreeFlags::SAMPLE_LISTS`] is not set.
    #[error("Not tracking samples")]
    NotTrackingSamples,
    /// Returned when sample counts are requested, yet
    /// [`TreeFlags::NO_SAMPLE_COUNTS`] is set.
    #[error("Sample counts not enabled")]
    SampleCountsDisabled,
    /// Returned by queries that require a non-null tree.
    #[error("Operation requires a non-null tree")]
    NullTree,
    /// Returned by operations that must run on a null tree.
    #[error("Operation requires a null tree")]
    TreeIsNotNull,
    /// Returned when a root threshold of zero is requested.
    #[error("Invalid root threshold")]
    InvalidRootThreshold,
    /// Returned when seeking to a position outside
    /// `[0, sequence_length)`.
    #[error("Position out of bounds")]
    PositionOutOfBounds,
    /// Returned when seeking to a tree index out of bounds.
    #[error("Tree index out of bounds")]
    TreeIndexOutOfBounds,
    /// Returned when more than 64 distinct alleles are in play.
    /// The ceiling comes from the bit-mask representation of
    /// allele sets and is an explicit, checked limit.
    #[error("Too many alleles")]
    TooManyAlleles,
    /// Returned when a genotype vector has the wrong length or
    /// contains invalid values.
    #[error("Bad genotypes")]
    BadGenotypes,
    /// Returned by operations that require a single-root tree.
    #[error("Multiple roots")]
    MultipleRoots,
    /// Returned by operations that require a strictly binary
    /// tree.
    #[error("Tree is not binary")]
    NonBinaryTree,
}

/// Result type for operations on trees and tree sequences.
pub type TreesResult<T> = Result<T, TreesError>;

/// Data describing the topological relationships between
/// [`NodeId`] in a [`Tree`].
///
/// For a tree sequence whose tables have `n` nodes, there are
/// `n + 1` instances of this struct: one per node, plus one for
/// the virtual root.
///
/// Some fields may be equal to [`NodeId::NULL`], indicating
/// that the current instance is a root or leaf node, for
/// example.
#[derive(Copy, Clone)]
struct TopologyData {
    parent: NodeId,
    left_child: NodeId,
    right_child: NodeId,
    left_sib: NodeId,
    right_sib: NodeId,
    num_children: i32,
    // the edge that created the parent link, or NULL
    edge: EdgeId,
    num_samples: i32,
    num_tracked_samples: i32,
    // sample list entries are compact sample indexes
    left_sample: NodeId,
    right_sample: NodeId,
    next_sample: NodeId,
}

impl Default for TopologyData {
    fn default() -> Self {
        Self {
            parent: NodeId::NULL,
            left_child: NodeId::NULL,
            right_child: NodeId::NULL,
            left_sib: NodeId::NULL,
            right_sib: NodeId::NULL,
            num_children: 0,
            edge: EdgeId::NULL,
            num_samples: 0,
            num_tracked_samples: 0,
            left_sample: NodeId::NULL,
            right_sample: NodeId::NULL,
            next_sample: NodeId::NULL,
        }
    }
}

trait NodeIterator {
    fn next_node(&mut self);
    fn current_node(&mut self) -> Option<NodeId>;
}

struct ChildIterator<'a> {
    current_child: Option<NodeId>,
    next_child: NodeId,
    tree: &'a Tree<'a>,
}

impl<'a> ChildIterator<'a> {
    fn new(tree: &'a Tree, u: NodeId) -> Self {
        ChildIterator {
            current_child: None,
            next_child: tree.topology[u.0 as usize].left_child,
            tree,
        }
    }
}

impl NodeIterator for ChildIterator<'_> {
    fn next_node(&mut self) {
        self.current_child = match self.next_child {
            NodeId::NULL => None,
            r => {
                let cr = Some(r);
                self.next_child = self.tree.topology[r.0 as usize].right_sib;
                cr
            }
        };
    }

    fn current_node(&mut self) -> Option<NodeId> {
        self.current_child
    }
}

iterator_for_nodeiterator!(ChildIterator<'_>);

struct ParentsIterator<'a> {
    current_node: Option<NodeId>,
    next_node: NodeId,
    tree: &'a Tree<'a>,
}

impl<'a> ParentsIterator<'a> {
    fn new(tree: &'a Tree, u: NodeId) -> Self {
        ParentsIterator {
            current_node: None,
            next_node: u,
            tree,
        }
    }
}

impl NodeIterator for ParentsIterator<'_> {
    fn next_node(&mut self) {
        self.current_node = match self.next_node {
            NodeId::NULL => None,
            r => {
                let cr = Some(r);
                self.next_node = self.tree.topology[r.0 as usize].parent;
                cr
            }
        };
    }

    fn current_node(&mut self) -> Option<NodeId> {
        self.current_node
    }
}

iterator_for_nodeiterator!(ParentsIterator<'_>);

struct SamplesIterator<'a> {
    current_node: Option<NodeId>,
    next_sample_index: NodeId,
    last_sample_index: NodeId,
    tree: &'a Tree<'a>,
}

impl<'a> SamplesIterator<'a> {
    fn new(tree: &'a Tree, u: NodeId) -> Self {
        SamplesIterator {
            current_node: None,
            next_sample_index: tree.topology[u.0 as usize].left_sample,
            last_sample_index: tree.topology[u.0 as usize].right_sample,
            tree,
        }
    }
}

impl NodeIterator for SamplesIterator<'_> {
    fn next_node(&mut self) {
        self.current_node = match self.next_sample_index {
            NodeId::NULL => None,
            r => {
                if r == self.last_sample_index {
                    let cr = Some(self.tree.samples[r.0 as usize]);
                    self.next_sample_index = NodeId::NULL;
                    cr
                } else {
                    let cr = Some(self.tree.samples[r.0 as usize]);
                    self.next_sample_index = self.tree.topology[r.0 as usize].next_sample;
                    cr
                }
            }
        };
    }

    fn current_node(&mut self) -> Option<NodeId> {
        self.current_node
    }
}

iterator_for_nodeiterator!(SamplesIterator<'_>);

/// Preorder traversal over the whole forest, starting from the
/// leftmost root.
struct PreorderNodeIterator<'a> {
    node_stack: Vec<NodeId>,
    tree: &'a Tree<'a>,
    current_node_: Option<NodeId>,
}

impl<'a> PreorderNodeIterator<'a> {
    fn new(tree: &'a Tree) -> Self {
        let mut stack = Vec::with_capacity(tree.traversal_capacity());
        let mut root = tree.topology[tree.virtual_root.0 as usize].right_child;
        while root != NodeId::NULL {
            stack.push(root);
            root = tree.topology[root.0 as usize].left_sib;
        }
        PreorderNodeIterator {
            node_stack: stack,
            tree,
            current_node_: None,
        }
    }
}

impl NodeIterator for PreorderNodeIterator<'_> {
    fn next_node(&mut self) {
        self.current_node_ = self.node_stack.pop();
        if let Some(u) = self.current_node_ {
            let mut c = self.tree.topology[u.0 as usize].right_child;
            while c != NodeId::NULL {
                self.node_stack.push(c);
                c = self.tree.topology[c.0 as usize].left_sib;
            }
        };
    }

    fn current_node(&mut self) -> Option<NodeId> {
        self.current_node_
    }
}

iterator_for_nodeiterator!(PreorderNodeIterator<'_>);

/// Lazy postorder traversal over the whole forest.
struct PostorderNodeIterator<'a> {
    // (node, next child to descend into)
    stack: Vec<(NodeId, NodeId)>,
    tree: &'a Tree<'a>,
}

impl<'a> PostorderNodeIterator<'a> {
    fn new(tree: &'a Tree) -> Self {
        let mut stack = Vec::with_capacity(tree.traversal_capacity());
        let mut root = tree.topology[tree.virtual_root.0 as usize].right_child;
        while root != NodeId::NULL {
            stack.push((root, tree.topology[root.0 as usize].left_child));
            root = tree.topology[root.0 as usize].left_sib;
        }
        Self { stack, tree }
    }
}

impl Iterator for PostorderNodeIterator<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (u, c) = *self.stack.last()?;
            if c == NodeId::NULL {
                self.stack.pop();
                return Some(u);
            }
            let top = self.stack.last_mut().unwrap();
            top.1 = self.tree.topology[c.0 as usize].right_sib;
            self.stack.push((c, self.tree.topology[c.0 as usize].left_child));
        }
    }
}

/// Preorder traversal visiting only sample nodes, skipping
/// subtrees that contain no samples.
struct PreorderSamplesIterator<'a> {
    node_stack: Vec<NodeId>,
    tree: &'a Tree<'a>,
}

impl<'a> PreorderSamplesIterator<'a> {
    fn new(tree: &'a Tree) -> Self {
        let mut stack = Vec::with_capacity(tree.traversal_capacity());
        let mut root = tree.topology[tree.virtual_root.0 as usize].right_child;
        while root != NodeId::NULL {
            stack.push(root);
            root = tree.topology[root.0 as usize].left_sib;
        }
        Self {
            node_stack: stack,
            tree,
        }
    }
}

impl Iterator for PreorderSamplesIterator<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(u) = self.node_stack.pop() {
            if self.tree.topology[u.0 as usize].num_samples == 0 {
                continue;
            }
            let mut c = self.tree.topology[u.0 as usize].right_child;
            while c != NodeId::NULL {
                self.node_stack.push(c);
                c = self.tree.topology[c.0 as usize].left_sib;
            }
            if self.tree.treeseq.is_sample(u) {
                return Some(u);
            }
        }
        None
    }
}

/// A tree is the genealogy of a non-recombining segment of a
/// genome.
///
/// One logical instance is reused across a whole tree sequence:
/// the tree is constructed in the null state, then advanced
/// tree-by-tree by removing and inserting the edges emitted by
/// a [`TreePosition`], incrementally maintaining subtree sample
/// counts and (optionally) intrusive sample lists.
///
/// The forest is rooted at a synthetic **virtual root** whose
/// children are exactly the current roots: the nodes with no
/// parent whose sample count meets the root threshold
/// (default 1).
pub struct Tree<'treeseq> {
    topology: Vec<TopologyData>,
    virtual_root: NodeId,
    position: TreePosition<'treeseq>,
    samples: &'treeseq [NodeId],
    // re-applied on clear()
    tracked: Vec<u8>,
    num_tracked: i32,
    flags: TreeFlags,
    root_threshold: i32,
    num_edges: usize,
    treeseq: &'treeseq TreeSequence,
    advanced: bool,
}

impl<'treeseq> Tree<'treeseq> {
    pub(crate) fn new(treeseq: &'treeseq TreeSequence, flags: TreeFlags) -> TreesResult<Self> {
        let num_nodes = treeseq.num_nodes();
        let mut rv = Self {
            topology: vec![TopologyData::default(); num_nodes + 1],
            virtual_root: NodeId::from(num_nodes),
            position: TreePosition::new(treeseq),
            samples: treeseq.sample_nodes(),
            tracked: vec![0; num_nodes],
            num_tracked: 0,
            flags,
            root_threshold: 1,
            num_edges: 0,
            treeseq,
            advanced: false,
        };
        rv.clear();
        Ok(rv)
    }

    fn counting(&self) -> bool {
        !self.flags.contains(TreeFlags::NO_SAMPLE_COUNTS)
    }

    fn lists(&self) -> bool {
        self.flags.contains(TreeFlags::SAMPLE_LISTS)
    }

    fn id_in_range<N: Into<NodeId>>(&self, u: N) -> TreesResult<NodeId> {
        let n = u.into();
        if n < 0 || (n.0 as usize) >= self.topology.len() {
            Err(TreesError::NodeIdOutOfRange)
        } else {
            Ok(n)
        }
    }

    /// The number of nodes in the tree sequence, not counting
    /// the virtual root.
    pub fn num_nodes(&self) -> usize {
        self.topology.len() - 1
    }

    /// The synthetic root above all roots of the forest.
    pub fn virtual_root(&self) -> NodeId {
        self.virtual_root
    }

    /// The current tree index, or `None` for a null tree.
    pub fn index(&self) -> Option<usize> {
        self.position.index()
    }

    /// The `[left, right)` interval this tree covers.
    pub fn interval(&self) -> (Position, Position) {
        self.position.interval()
    }

    /// The length of this tree's interval.
    pub fn span(&self) -> f64 {
        let (l, r) = self.interval();
        r.0 - l.0
    }

    /// The number of edges currently in the tree.
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// The root threshold: the minimum number of sample
    /// descendants a parentless node needs to count as a root.
    pub fn root_threshold(&self) -> usize {
        self.root_threshold as usize
    }

    /// Set the root threshold.
    ///
    /// # Errors
    ///
    /// [`TreesError::InvalidRootThreshold`] if `threshold == 0`;
    /// [`TreesError::TreeIsNotNull`] unless the tree is in the
    /// null state.
    pub fn set_root_threshold(&mut self, threshold: usize) -> TreesResult<()> {
        if threshold == 0 {
            return Err(TreesError::InvalidRootThreshold);
        }
        if self.index().is_some() {
            return Err(TreesError::TreeIsNotNull);
        }
        self.root_threshold = threshold as i32;
        self.clear();
        Ok(())
    }

    /// Nominate a subset of samples for tracked-sample counts.
    ///
    /// # Errors
    ///
    /// [`TreesError::TreeIsNotNull`] unless the tree is in the
    /// null state; [`TreesError::InvalidSamples`] if any node is
    /// not a sample; [`TreesError::DuplicateSamples`] on
    /// duplicates.
    pub fn set_tracked_samples<I: IntoIterator<Item = NodeId>>(
        &mut self,
        samples: I,
    ) -> TreesResult<()> {
        if self.index().is_some() {
            return Err(TreesError::TreeIsNotNull);
        }
        let mut tracked = vec![0u8; self.num_nodes()];
        let mut n = 0;
        for s in samples {
            if !self.treeseq.is_sample(s) {
                return Err(TreesError::InvalidSamples);
            }
            if tracked[s.0 as usize] == 1 {
                return Err(TreesError::DuplicateSamples);
            }
            tracked[s.0 as usize] = 1;
            n += 1;
        }
        self.tracked = tracked;
        self.num_tracked = n;
        self.clear();
        Ok(())
    }

    /// Reset to the null state: an empty interval and, when
    /// sample counts are enabled, a forest whose roots are the
    /// samples meeting the root threshold.
    pub fn clear(&mut self) {
        for td in self.topology.iter_mut() {
            *td = TopologyData::default();
        }
        self.num_edges = 0;
        self.position = TreePosition::new(self.treeseq);
        if self.counting() {
            let vroot = self.virtual_root.0 as usize;
            self.topology[vroot].num_samples = self.samples.len() as i32;
            self.topology[vroot].num_tracked_samples = self.num_tracked;
            let lists = self.lists();
            for (i, s) in self.samples.iter().enumerate() {
                let row = &mut self.topology[s.0 as usize];
                row.num_samples = 1;
                row.num_tracked_samples = self.tracked[s.0 as usize] as i32;
                if lists {
                    row.left_sample = NodeId::from(i);
                    row.right_sample = NodeId::from(i);
                }
            }
            let samples = self.samples;
            for s in samples {
                if self.topology[s.0 as usize].num_samples >= self.root_threshold {
                    self.link_child(self.virtual_root, *s);
                }
            }
        }
        self.advanced = false;
    }

    // Attach c as the rightmost child of p.  Does not touch
    // parent[c]; root insertion relies on that.
    fn link_child(&mut self, p: NodeId, c: NodeId) {
        let rchild = self.topology[p.0 as usize].right_child;
        if rchild == NodeId::NULL {
            self.topology[p.0 as usize].left_child = c;
            self.topology[c.0 as usize].left_sib = NodeId::NULL;
        } else {
            self.topology[rchild.0 as usize].right_sib = c;
            self.topology[c.0 as usize].left_sib = rchild;
        }
        self.topology[c.0 as usize].right_sib = NodeId::NULL;
        self.topology[p.0 as usize].right_child = c;
        self.topology[p.0 as usize].num_children += 1;
    }

    fn unlink_child(&mut self, p: NodeId, c: NodeId) {
        let lsib = self.topology[c.0 as usize].left_sib;
        let rsib = self.topology[c.0 as usize].right_sib;
        if lsib == NodeId::NULL {
            self.topology[p.0 as usize].left_child = rsib;
        } else {
            self.topology[lsib.0 as usize].right_sib = rsib;
        }
        if rsib == NodeId::NULL {
            self.topology[p.0 as usize].right_child = lsib;
        } else {
            self.topology[rsib.0 as usize].left_sib = lsib;
        }
        self.topology[c.0 as usize].left_sib = NodeId::NULL;
        self.topology[c.0 as usize].right_sib = NodeId::NULL;
        self.topology[p.0 as usize].num_children -= 1;
    }

    fn is_listed_root(&self, u: NodeId) -> bool {
        self.topology[u.0 as usize].left_sib != NodeId::NULL
            || self.topology[u.0 as usize].right_sib != NodeId::NULL
            || self.topology[self.virtual_root.0 as usize].left_child == u
    }

    // Add dn/dt to the counts of every ancestor of (and
    // including) `from`; returns the top of the chain.
    fn propagate_counts(&mut self, from: NodeId, dn: i32, dt: i32) -> NodeId {
        let mut v = from;
        let mut top = from;
        while v != NodeId::NULL {
            self.topology[v.0 as usize].num_samples += dn;
            self.topology[v.0 as usize].num_tracked_samples += dt;
            top = v;
            v = self.topology[v.0 as usize].parent;
        }
        top
    }

    // Rebuild the sample lists of `node` and every ancestor
    // bottom-up from their children's lists.
    fn update_sample_lists(&mut self, node: NodeId) {
        let sample_map = self.treeseq.sample_index_map.as_slice();
        let topo = self.topology.as_mut_slice();
        let mut n = node;

        while n != NodeId::NULL {
            let sample_index = sample_map[n.0 as usize];
            if sample_index != -1 {
                topo[n.0 as usize].right_sample = topo[n.0 as usize].left_sample;
            } else {
                topo[n.0 as usize].left_sample = NodeId::NULL;
                topo[n.0 as usize].right_sample = NodeId::NULL;
            }

            let mut v = topo[n.0 as usize].left_child;
            while v != NodeId::NULL {
                if topo[v.0 as usize].left_sample != NodeId::NULL {
                    debug_assert!(topo[v.0 as usize].right_sample != NodeId::NULL);
                    if topo[n.0 as usize].left_sample == NodeId::NULL {
                        topo[n.0 as usize].left_sample = topo[v.0 as usize].left_sample;
                    } else {
                        let nright = topo[n.0 as usize].right_sample.0 as usize;
                        let vleft = topo[v.0 as usize].left_sample;
                        topo[nright].next_sample = vleft;
                    }
                    topo[n.0 as usize].right_sample = topo[v.0 as usize].right_sample;
                }
                v = topo[v.0 as usize].right_sib;
            }
            n = topo[n.0 as usize].parent;
        }
    }

    fn remove_edge(&mut self, e: EdgeId) {
        let edge = self.treeseq.tables.edge(e);
        let (p, c) = (edge.parent, edge.child);
        self.unlink_child(p, c);
        self.topology[c.0 as usize].parent = NodeId::NULL;
        self.topology[c.0 as usize].edge = EdgeId::NULL;
        self.num_edges -= 1;

        if self.counting() {
            let dn = self.topology[c.0 as usize].num_samples;
            let dt = self.topology[c.0 as usize].num_tracked_samples;
            let top = self.propagate_counts(p, -dn, -dt);
            if self.lists() {
                self.update_sample_lists(p);
            }
            if dn > 0 || dt > 0 {
                if self.is_listed_root(top)
                    && self.topology[top.0 as usize].num_samples < self.root_threshold
                {
                    self.unlink_child(self.virtual_root, top);
                }
            }
            if self.topology[c.0 as usize].num_samples >= self.root_threshold {
                self.link_child(self.virtual_root, c);
            }
        }
    }

    fn insert_edge(&mut self, e: EdgeId) {
        let edge = self.treeseq.tables.edge(e);
        let (p, c) = (edge.parent, edge.child);
        if self.counting() && self.is_listed_root(c) {
            self.unlink_child(self.virtual_root, c);
        }
        self.link_child(p, c);
        self.topology[c.0 as usize].parent = p;
        self.topology[c.0 as usize].edge = e;
        self.num_edges += 1;

        if self.counting() {
            let dn = self.topology[c.0 as usize].num_samples;
            let dt = self.topology[c.0 as usize].num_tracked_samples;
            let top = self.propagate_counts(p, dn, dt);
            if self.lists() {
                self.update_sample_lists(p);
            }
            if self.topology[top.0 as usize].num_samples >= self.root_threshold
                && !self.is_listed_root(top)
            {
                self.link_child(self.virtual_root, top);
            }
        }
    }

    // Apply the transition currently exposed by the position
    // cursor.  Removals are applied before insertions; both
    // ranges are filtered, which makes stepping and seeking
    // share this code path.
    fn apply_transition(&mut self) {
        let out: Vec<EdgeId> = self.position.edges_out().collect();
        for e in out {
            let child = self.treeseq.tables.edge(e).child;
            if self.topology[child.0 as usize].edge == e {
                self.remove_edge(e);
            }
        }
        let (left, _) = self.position.interval();
        let in_: Vec<EdgeId> = self.position.edges_in().collect();
        for e in in_ {
            let edge = self.treeseq.tables.edge(e);
            if edge.left <= left && left < edge.right {
                self.insert_edge(e);
            }
        }
    }

    /// Advance to the next tree.
    ///
    /// From the null state this builds the first tree.  Returns
    /// `false`, leaving the tree in the null state, after the
    /// last tree.
    pub fn next_tree(&mut self) -> bool {
        let more = self.position.next();
        self.apply_transition();
        more
    }

    /// Step to the previous tree.
    ///
    /// From the null state this builds the last tree.  Returns
    /// `false`, leaving the tree in the null state, after the
    /// first tree.
    pub fn prev_tree(&mut self) -> bool {
        let more = self.position.prev();
        self.apply_transition();
        more
    }

    /// Reset and position at the first tree.
    pub fn first(&mut self) -> TreesResult<()> {
        self.clear();
        self.next_tree();
        Ok(())
    }

    /// Reset and position at the last tree.
    pub fn last(&mut self) -> TreesResult<()> {
        self.clear();
        self.prev_tree();
        Ok(())
    }

    /// Position at the tree with the given index, choosing
    /// the cheaper of linear stepping and an index-based jump.
    pub fn seek_index(&mut self, index: usize) -> TreesResult<()> {
        let num_trees = self.treeseq.num_trees() as usize;
        if index >= num_trees {
            return Err(TreesError::TreeIndexOutOfBounds);
        }
        const LINEAR_STEPS: usize = 32;
        match self.index() {
            Some(cur) if cur == index => (),
            Some(cur) if index > cur => {
                if index - cur <= LINEAR_STEPS {
                    while self.index() != Some(index) {
                        self.next_tree();
                    }
                } else {
                    self.position.seek_forward(index);
                    self.apply_transition();
                }
            }
            Some(cur) => {
                if cur - index <= LINEAR_STEPS {
                    while self.index() != Some(index) {
                        self.prev_tree();
                    }
                } else {
                    self.position.seek_backward(index);
                    self.apply_transition();
                }
            }
            None => {
                // Null tree: jump from whichever end is nearer.
                if index <= num_trees / 2 {
                    self.clear();
                    self.position.seek_forward(index);
                } else {
                    self.clear();
                    self.position.seek_backward(index);
                }
                self.apply_transition();
            }
        }
        Ok(())
    }

    /// Position at the tree whose interval contains `pos`.
    ///
    /// # Errors
    ///
    /// [`TreesError::PositionOutOfBounds`] unless
    /// `0 <= pos < sequence_length`.
    pub fn seek<P: Into<Position>>(&mut self, pos: P) -> TreesResult<()> {
        let x = pos.into();
        if x < 0.0 || x >= self.treeseq.sequence_length() {
            return Err(TreesError::PositionOutOfBounds);
        }
        self.seek_index(self.treeseq.tree_index_at(x))
    }

    /// Return a deep, independent snapshot of this tree.
    pub fn copy(&self) -> Tree<'treeseq> {
        Tree {
            topology: self.topology.clone(),
            virtual_root: self.virtual_root,
            position: self.position.clone(),
            samples: self.samples,
            tracked: self.tracked.clone(),
            num_tracked: self.num_tracked,
            flags: self.flags,
            root_threshold: self.root_threshold,
            num_edges: self.num_edges,
            treeseq: self.treeseq,
            advanced: self.advanced,
        }
    }

    /// Return the parent of node `u`.
    ///
    /// # Errors
    ///
    /// [`TreesError::NodeIdOutOfRange`] if `u` is out of range.
    pub fn parent<N: Into<NodeId>>(&self, u: N) -> TreesResult<NodeId> {
        let u = self.id_in_range(u)?;
        Ok(self.topology[u.0 as usize].parent)
    }

    /// Return the left (first) child of node `u`.
    pub fn left_child<N: Into<NodeId>>(&self, u: N) -> TreesResult<NodeId> {
        let u = self.id_in_range(u)?;
        Ok(self.topology[u.0 as usize].left_child)
    }

    /// Return the right (last) child of node `u`.
    pub fn right_child<N: Into<NodeId>>(&self, u: N) -> TreesResult<NodeId> {
        let u = self.id_in_range(u)?;
        Ok(self.topology[u.0 as usize].right_child)
    }

    /// Return the left sibling of node `u`.
    pub fn left_sib<N: Into<NodeId>>(&self, u: N) -> TreesResult<NodeId> {
        let u = self.id_in_range(u)?;
        Ok(self.topology[u.0 as usize].left_sib)
    }

    /// Return the right sibling of node `u`.
    pub fn right_sib<N: Into<NodeId>>(&self, u: N) -> TreesResult<NodeId> {
        let u = self.id_in_range(u)?;
        Ok(self.topology[u.0 as usize].right_sib)
    }

    /// Return the number of children of node `u`.
    pub fn num_children<N: Into<NodeId>>(&self, u: N) -> TreesResult<usize> {
        let u = self.id_in_range(u)?;
        Ok(self.topology[u.0 as usize].num_children as usize)
    }

    /// Return the edge that created the parent link of `u`,
    /// or NULL.
    pub fn edge<N: Into<NodeId>>(&self, u: N) -> TreesResult<EdgeId> {
        let u = self.id_in_range(u)?;
        Ok(self.topology[u.0 as usize].edge)
    }

    /// Return the time of node `u`, where the virtual root is
    /// infinitely old.
    pub fn node_time<N: Into<NodeId>>(&self, u: N) -> TreesResult<Time> {
        let u = self.id_in_range(u)?;
        if u == self.virtual_root {
            Ok(Time(f64::INFINITY))
        } else {
            Ok(self.treeseq.tables.node(u).time)
        }
    }

    /// Return the length of the branch above `u`, or 0 for a
    /// node with no parent.
    pub fn branch_length<N: Into<NodeId>>(&self, u: N) -> TreesResult<f64> {
        let u = self.id_in_range(u)?;
        let p = self.topology[u.0 as usize].parent;
        if p == NodeId::NULL {
            Ok(0.0)
        } else {
            Ok(self.treeseq.tables.node(p).time.0 - self.treeseq.tables.node(u).time.0)
        }
    }

    /// Return the number of branches between `u` and the root
    /// of its subtree.
    pub fn depth<N: Into<NodeId>>(&self, u: N) -> TreesResult<usize> {
        let u = self.id_in_range(u)?;
        let mut n = 0;
        let mut v = self.topology[u.0 as usize].parent;
        while v != NodeId::NULL {
            n += 1;
            v = self.topology[v.0 as usize].parent;
        }
        Ok(n)
    }

    /// `true` if `u` is an ancestor of `v` or `u == v`.
    pub fn is_descendant<N: Into<NodeId>, M: Into<NodeId>>(
        &self,
        u: N,
        v: M,
    ) -> TreesResult<bool> {
        let u = self.id_in_range(u)?;
        let v = self.id_in_range(v)?;
        let mut w = u;
        while w != NodeId::NULL {
            if w == v {
                return Ok(true);
            }
            if w == self.virtual_root {
                break;
            }
            w = self.topology[w.0 as usize].parent;
        }
        Ok(v == self.virtual_root)
    }

    /// Return the most recent common ancestor of `u` and `v`,
    /// or NULL if they are in disjoint subtrees.
    ///
    /// The two ancestor chains are raced upwards by node time.
    pub fn mrca<N: Into<NodeId>, M: Into<NodeId>>(&self, u: N, v: M) -> TreesResult<NodeId> {
        let mut u = self.id_in_range(u)?;
        let mut v = self.id_in_range(v)?;
        let time = |w: NodeId| -> f64 {
            if w == self.virtual_root {
                f64::INFINITY
            } else {
                self.treeseq.tables.node(w).time.0
            }
        };
        while u != v {
            if u == NodeId::NULL || v == NodeId::NULL {
                return Ok(NodeId::NULL);
            }
            let (tu, tv) = (time(u), time(v));
            if tu < tv {
                u = self.topology[u.0 as usize].parent;
            } else if tv < tu {
                v = self.topology[v.0 as usize].parent;
            } else {
                u = self.topology[u.0 as usize].parent;
                v = self.topology[v.0 as usize].parent;
            }
        }
        Ok(u)
    }

    /// The number of roots.
    ///
    /// # Errors
    ///
    /// [`TreesError::SampleCountsDisabled`] if sample counts
    /// were disabled at construction.
    pub fn num_roots(&self) -> TreesResult<usize> {
        if !self.counting() {
            return Err(TreesError::SampleCountsDisabled);
        }
        Ok(self.topology[self.virtual_root.0 as usize].num_children as usize)
    }

    /// The leftmost root, or NULL for an empty forest.
    pub fn left_root(&self) -> TreesResult<NodeId> {
        if !self.counting() {
            return Err(TreesError::SampleCountsDisabled);
        }
        Ok(self.topology[self.virtual_root.0 as usize].left_child)
    }

    /// Iterate over the roots of the forest, leftmost first.
    pub fn roots(&self) -> TreesResult<impl Iterator<Item = NodeId> + '_> {
        if !self.counting() {
            return Err(TreesError::SampleCountsDisabled);
        }
        Ok(ChildIterator::new(self, self.virtual_root))
    }

    /// Return all roots as a vector.
    pub fn roots_to_vec(&self) -> TreesResult<Vec<NodeId>> {
        Ok(self.roots()?.collect())
    }

    /// Return an [`Iterator`] over the children of node `u`.
    pub fn children<N: Into<NodeId>>(
        &self,
        u: N,
    ) -> TreesResult<impl Iterator<Item = NodeId> + '_> {
        let u = self.id_in_range(u)?;
        Ok(ChildIterator::new(self, u))
    }

    /// Return an [`Iterator`] from `u` to the root of its
    /// subtree, traversing all parent nodes.
    pub fn parents<N: Into<NodeId>>(
        &self,
        u: N,
    ) -> TreesResult<impl Iterator<Item = NodeId> + '_> {
        let u = self.id_in_range(u)?;
        Ok(ParentsIterator::new(self, u))
    }

    /// Return the number of samples descending from `u`
    /// (including `u` itself if it is a sample).
    ///
    /// # Errors
    ///
    /// [`TreesError::SampleCountsDisabled`] if sample counts
    /// were disabled at construction.
    pub fn num_samples_below<N: Into<NodeId>>(&self, u: N) -> TreesResult<usize> {
        if !self.counting() {
            return Err(TreesError::SampleCountsDisabled);
        }
        let u = self.id_in_range(u)?;
        Ok(self.topology[u.0 as usize].num_samples as usize)
    }

    /// Return the number of tracked samples descending from `u`.
    pub fn num_tracked_samples_below<N: Into<NodeId>>(&self, u: N) -> TreesResult<usize> {
        if !self.counting() {
            return Err(TreesError::SampleCountsDisabled);
        }
        let u = self.id_in_range(u)?;
        Ok(self.topology[u.0 as usize].num_tracked_samples as usize)
    }

    /// Return an [`Iterator`] over the sample nodes descending
    /// from node `u`.
    ///
    /// # Errors
    ///
    /// [`TreesError::NotTrackingSamples`] if
    /// [`TreeFlags::SAMPLE_LISTS`] was not used to initialize
    /// `self`.
    pub fn samples<N: Into<NodeId>>(
        &self,
        u: N,
    ) -> TreesResult<Box<dyn Iterator<Item = NodeId> + '_>> {
        let u = self.id_in_range(u)?;
        if u == self.virtual_root {
            return Ok(Box::new(self.samples.iter().copied()));
        }
        if !self.lists() {
            return Err(TreesError::NotTrackingSamples);
        }
        Ok(Box::new(SamplesIterator::new(self, u)))
    }

    /// A slice of all sample nodes in the tree sequence.
    pub fn sample_nodes(&self) -> &[NodeId] {
        self.samples
    }

    // Upper bound on traversal stack/output sizes:
    // roots + samples + edges + 1.
    fn traversal_capacity(&self) -> usize {
        let roots = if self.counting() {
            self.topology[self.virtual_root.0 as usize].num_children as usize
        } else {
            0
        };
        roots + self.samples.len() + self.num_edges + 1
    }

    /// Preorder traversal of the whole forest.
    ///
    /// # Errors
    ///
    /// [`TreesError::NullTree`] on a null tree;
    /// [`TreesError::SampleCountsDisabled`] when roots are not
    /// being tracked.
    pub fn preorder(&self) -> TreesResult<impl Iterator<Item = NodeId> + '_> {
        if self.index().is_none() {
            return Err(TreesError::NullTree);
        }
        if !self.counting() {
            return Err(TreesError::SampleCountsDisabled);
        }
        Ok(PreorderNodeIterator::new(self))
    }

    /// Postorder traversal of the whole forest.
    pub fn postorder(&self) -> TreesResult<impl Iterator<Item = NodeId> + '_> {
        if self.index().is_none() {
            return Err(TreesError::NullTree);
        }
        if !self.counting() {
            return Err(TreesError::SampleCountsDisabled);
        }
        Ok(PostorderNodeIterator::new(self))
    }

    /// Preorder traversal restricted to sample nodes.
    pub fn preorder_samples(&self) -> TreesResult<impl Iterator<Item = NodeId> + '_> {
        if self.index().is_none() {
            return Err(TreesError::NullTree);
        }
        if !self.counting() {
            return Err(TreesError::SampleCountsDisabled);
        }
        Ok(PreorderSamplesIterator::new(self))
    }

    /// The sites falling on this tree's interval.
    ///
    /// # Errors
    ///
    /// [`TreesError::NullTree`] on a null tree.
    pub fn sites(&self) -> TreesResult<&'treeseq [crate::tables::Site]> {
        match self.index() {
            None => Err(TreesError::NullTree),
            Some(i) => Ok(&self.treeseq.tables.sites()
                [self.treeseq.tree_site_range(i)]),
        }
    }

    /// Calculate the total branch length of the tree.
    ///
    /// # Parameters
    ///
    /// * `by_span`: if `true`, multiply the return value by
    ///   [`Tree::span`].
    pub fn total_branch_length(&self, by_span: bool) -> TreesResult<f64> {
        let mut b = 0.0;
        for n in self.preorder()? {
            b += self.branch_length(n)?;
        }
        match by_span {
            true => Ok(b * self.span()),
            false => Ok(b),
        }
    }
}

/// Left-to-right iteration of trees.
impl<'treeseq> streaming_iterator::StreamingIterator for Tree<'treeseq> {
    type Item = Tree<'treeseq>;

    fn advance(&mut self) {
        self.advanced = self.next_tree();
    }

    fn get(&self) -> Option<&Self::Item> {
        match self.advanced {
            true => Some(self),
            false => None,
        }
    }
}
