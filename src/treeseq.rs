use crate::newtypes::{EdgeId, MutationId, NodeId, Position, RawId, SiteId, Time};
use crate::tables::{Mutation, Site, TableCollection, TableValidationFlags};
use crate::trees::{Tree, TreeFlags, TreesError, TreesResult};
use bitflags::bitflags;

bitflags! {
    /// Bit flags modifying the behavior of [`TreeSequence`]
    /// initialization.
    pub struct TreeSequenceFlags: u32 {
        /// Do not validate tables when creating a [`TreeSequence`]
        const NO_TABLE_VALIDATION = 1 << 0;
    }
}

/// A tree sequence.
///
/// A tree sequence is an indexed, read-only view of a
/// [`TableCollection`] from which the local tree at any
/// position on the genome can be built cheaply.
/// The index records the breakpoints between trees, the
/// sample set, and which sites and mutations fall on
/// each tree.
///
/// All mutable tree state lives in [`Tree`]; a
/// `TreeSequence` never changes after construction.
pub struct TreeSequence {
    pub(crate) tables: TableCollection,
    pub(crate) samples: Vec<NodeId>,
    // node id -> compact sample index, or NULL
    pub(crate) sample_index_map: Vec<RawId>,
    pub(crate) breakpoints: Vec<Position>,
    // per tree, the range of rows of the site table
    // falling in that tree's interval
    pub(crate) tree_sites: Vec<std::ops::Range<usize>>,
    // per site, the range of rows of the mutation table
    pub(crate) site_mutations: Vec<std::ops::Range<usize>>,
    // per mutation, the edge currently above the mutation's node
    pub(crate) mutation_edge: Vec<EdgeId>,
    min_time: Time,
    max_time: Time,
    discrete_genome: bool,
    discrete_time: bool,
}

impl TreeSequence {
    fn new_from_tables(tables: TableCollection, samples: Vec<NodeId>) -> TreesResult<Self> {
        if samples.is_empty() {
            return Err(TreesError::NoSamples);
        }
        let mut sample_index_map = vec![-1; tables.num_nodes()];
        for (i, s) in samples.iter().enumerate() {
            if *s == NodeId::NULL || (s.0 as usize) >= tables.num_nodes() {
                return Err(TreesError::InvalidSamples);
            }
            if sample_index_map[s.0 as usize] != -1 {
                return Err(TreesError::DuplicateSamples);
            }
            sample_index_map[s.0 as usize] = i as RawId;
        }
        let breakpoints = tables.breakpoints()?;
        let num_trees = breakpoints.len() - 1;

        // Assign each site to its tree.
        let mut tree_sites = Vec::with_capacity(num_trees);
        let sites = tables.sites();
        let mut j = 0;
        for t in 0..num_trees {
            let start = j;
            while j < sites.len() && sites[j].position < breakpoints[t + 1] {
                j += 1;
            }
            tree_sites.push(start..j);
        }

        // Group mutations by site.  Mutations are validated to be
        // sorted by site id.
        let mutations = tables.mutations();
        let mut site_mutations = Vec::with_capacity(sites.len());
        let mut k = 0;
        for s in 0..sites.len() {
            let start = k;
            while k < mutations.len() && mutations[k].site.0 as usize == s {
                k += 1;
            }
            site_mutations.push(start..k);
        }

        let mut min_time = Time::MAX;
        let mut max_time = Time::MIN;
        for n in tables.nodes() {
            if n.time < min_time {
                min_time = n.time;
            }
            if n.time > max_time {
                max_time = n.time;
            }
        }

        let mut discrete_genome = tables.sequence_length().is_discrete();
        for e in tables.edges() {
            discrete_genome = discrete_genome && e.left.is_discrete() && e.right.is_discrete();
        }
        for s in tables.sites() {
            discrete_genome = discrete_genome && s.position.is_discrete();
        }
        let mut discrete_time = true;
        for n in tables.nodes() {
            discrete_time = discrete_time && n.time.is_discrete();
        }
        for m in tables.mutations() {
            discrete_time = discrete_time && (m.time.is_unknown() || m.time.is_discrete());
        }

        let mut ts = Self {
            tables,
            samples,
            sample_index_map,
            breakpoints,
            tree_sites,
            site_mutations,
            mutation_edge: vec![],
            min_time,
            max_time,
            discrete_genome,
            discrete_time,
        };
        ts.resolve_mutation_edges();
        Ok(ts)
    }

    // One sweep over the edge index resolving, for every mutation,
    // the edge above the mutation's node in the tree containing
    // the mutation's site.
    fn resolve_mutation_edges(&mut self) {
        let tables = &self.tables;
        let edges = tables.edges();
        let insertion = tables.edge_insertion_order.as_slice();
        let removal = tables.edge_removal_order.as_slice();
        let mut edge_of = vec![EdgeId::NULL; tables.num_nodes()];
        let mut mutation_edge = vec![EdgeId::NULL; tables.mutations().len()];

        let mut input_index = 0;
        let mut output_index = 0;
        for (t, sites) in self.tree_sites.iter().enumerate() {
            let tree_left = self.breakpoints[t];
            for idx in removal[output_index..].iter() {
                let e = &edges[idx.0 as usize];
                if e.right != tree_left {
                    break;
                }
                edge_of[e.child.0 as usize] = EdgeId::NULL;
                output_index += 1;
            }
            for idx in insertion[input_index..].iter() {
                let e = &edges[idx.0 as usize];
                if e.left != tree_left {
                    break;
                }
                edge_of[e.child.0 as usize] = *idx;
                input_index += 1;
            }
            for s in sites.clone() {
                for m in self.site_mutations[s].clone() {
                    let node = tables.mutations()[m].node;
                    mutation_edge[m] = edge_of[node.0 as usize];
                }
            }
        }
        self.mutation_edge = mutation_edge;
    }

    /// Create a new tree sequence from a [`TableCollection`].
    ///
    /// The input tables are consumed, owned by the tree sequence.
    ///
    /// By default, the tables will be validated.  To disable
    /// validation, `flags` should contain
    /// [`TreeSequenceFlags::NO_TABLE_VALIDATION`].
    ///
    /// The list of samples is populated from the node flags:
    /// any node whose flags contain
    /// [`IS_SAMPLE`](crate::NodeFlags::IS_SAMPLE) is a sample.
    ///
    /// # Errors
    ///
    /// [`TreesError::TablesNotIndexed`] if
    /// [`build_index`](TableCollection::build_index) has not been called.
    ///
    /// [`TreesError`] if table validation fails or there are no samples.
    pub fn new(tables: TableCollection, flags: TreeSequenceFlags) -> TreesResult<Self> {
        if !tables.is_indexed() {
            return Err(TreesError::TablesNotIndexed);
        }
        if !flags.contains(TreeSequenceFlags::NO_TABLE_VALIDATION) {
            tables.validate(TableValidationFlags::default())?;
        }
        let mut samples = vec![];
        for (i, n) in tables.nodes().iter().enumerate() {
            if n.is_sample() {
                samples.push(NodeId::from(i));
            }
        }
        Self::new_from_tables(tables, samples)
    }

    /// Create a new tree sequence from a table collection
    /// and an explicit list of samples, ignoring node flags.
    ///
    /// # Errors
    ///
    /// [`TreesError`] if the samples list is empty, contains
    /// duplicates, or refers to nodes that do not exist.
    pub fn new_with_samples(
        tables: TableCollection,
        samples: &[NodeId],
        flags: TreeSequenceFlags,
    ) -> TreesResult<Self> {
        if !tables.is_indexed() {
            return Err(TreesError::TablesNotIndexed);
        }
        if !flags.contains(TreeSequenceFlags::NO_TABLE_VALIDATION) {
            tables.validate(TableValidationFlags::default())?;
        }
        Self::new_from_tables(tables, samples.to_vec())
    }

    /// Move the underlying [`TableCollection`], consuming `self`.
    pub fn tables(self) -> TableCollection {
        self.tables
    }

    /// Get a reference to the underlying [`TableCollection`].
    pub fn tables_ref(&self) -> &TableCollection {
        &self.tables
    }

    /// Get a clone of the underlying [`TableCollection`].
    pub fn tables_copy(&self) -> TableCollection {
        self.tables.clone()
    }

    /// The sequence length.
    pub fn sequence_length(&self) -> Position {
        self.tables.sequence_length()
    }

    /// The number of trees in the tree sequence.
    pub fn num_trees(&self) -> u32 {
        (self.breakpoints.len() - 1) as u32
    }

    /// The positions at which the local tree changes.
    ///
    /// The slice has length `num_trees + 1`; the first element
    /// is 0 and the last is the sequence length.
    pub fn breakpoints(&self) -> &[Position] {
        &self.breakpoints
    }

    /// The sample nodes.
    pub fn sample_nodes(&self) -> &[NodeId] {
        &self.samples
    }

    /// The number of sample nodes.
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// The number of nodes in the node table.
    pub fn num_nodes(&self) -> usize {
        self.tables.num_nodes()
    }

    /// `true` if `u` is a sample node.
    pub fn is_sample<N: Into<NodeId>>(&self, u: N) -> bool {
        let u = u.into();
        u >= 0
            && (u.0 as usize) < self.sample_index_map.len()
            && self.sample_index_map[u.0 as usize] != -1
    }

    /// The compact sample index of node `u`, or `None`
    /// if `u` is not a sample.
    pub fn sample_index<N: Into<NodeId>>(&self, u: N) -> Option<usize> {
        let u = u.into();
        if u < 0 || (u.0 as usize) >= self.sample_index_map.len() {
            return None;
        }
        match self.sample_index_map[u.0 as usize] {
            -1 => None,
            x => Some(x as usize),
        }
    }

    /// The minimum time of any node.
    pub fn min_time(&self) -> Time {
        self.min_time
    }

    /// The maximum time of any node.
    pub fn max_time(&self) -> Time {
        self.max_time
    }

    /// `true` if every coordinate in the tables is an integer.
    pub fn discrete_genome(&self) -> bool {
        self.discrete_genome
    }

    /// `true` if every known time in the tables is an integer.
    pub fn discrete_time(&self) -> bool {
        self.discrete_time
    }

    /// The sites falling on tree `tree_index`.
    pub fn tree_sites(&self, tree_index: usize) -> &[Site] {
        &self.tables.sites()[self.tree_sites[tree_index].clone()]
    }

    /// The row range of the site table falling on tree `tree_index`.
    pub fn tree_site_range(&self, tree_index: usize) -> std::ops::Range<usize> {
        self.tree_sites[tree_index].clone()
    }

    /// The mutations at site `site`.
    pub fn site_mutations<S: Into<SiteId>>(&self, site: S) -> &[Mutation] {
        &self.tables.mutations()[self.site_mutations[site.into().0 as usize].clone()]
    }

    /// The row range of the mutation table at site `site`.
    pub fn site_mutation_range<S: Into<SiteId>>(&self, site: S) -> std::ops::Range<usize> {
        self.site_mutations[site.into().0 as usize].clone()
    }

    /// The edge above `mutation`'s node in the tree containing
    /// the mutation's site, or NULL if the node has no parent
    /// there.
    pub fn mutation_edge<M: Into<MutationId>>(&self, mutation: M) -> EdgeId {
        self.mutation_edge[mutation.into().0 as usize]
    }

    /// The state a mutation's node would carry if the mutation
    /// itself had not happened: the parent mutation's derived
    /// state, or the site's ancestral state for a parentless
    /// mutation.
    pub fn mutation_inherited_state<M: Into<MutationId>>(&self, mutation: M) -> Option<&[u8]> {
        let m = &self.tables.mutations()[mutation.into().0 as usize];
        if m.parent == MutationId::NULL {
            self.tables.sites()[m.site.0 as usize]
                .ancestral_state
                .as_deref()
        } else {
            self.tables.mutations()[m.parent.0 as usize]
                .derived_state
                .as_deref()
        }
    }

    /// The index of the tree whose interval contains `pos`.
    pub fn tree_index_at<P: Into<Position>>(&self, pos: P) -> usize {
        let pos = pos.into();
        // partition_point returns the first breakpoint > pos;
        // the tree index is one less.
        let i = self.breakpoints.partition_point(|b| *b <= pos);
        i.saturating_sub(1).min(self.breakpoints.len() - 2)
    }

    /// Return a streaming iterator over all [`Tree`]
    /// objects in the tree sequence.
    pub fn tree_iterator(&self, flags: TreeFlags) -> TreesResult<Tree<'_>> {
        Tree::new(self, flags)
    }

    /// Return a [`Tree`] positioned at tree `index`.
    pub fn at_index(&self, index: usize, flags: TreeFlags) -> TreesResult<Tree<'_>> {
        let mut tree = Tree::new(self, flags)?;
        tree.seek_index(index)?;
        Ok(tree)
    }

    /// Return a [`Tree`] positioned at the tree whose interval
    /// contains `pos`.
    pub fn at_position<P: Into<Position>>(&self, pos: P, flags: TreeFlags) -> TreesResult<Tree<'_>> {
        self.at_index(self.tree_index_at(pos), flags)
    }
}
