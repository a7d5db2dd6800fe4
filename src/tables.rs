use crate::newtypes::{
    EdgeId, IndividualId, MigrationId, MutationId, NodeId, PopulationId, Position, SiteId, Time,
};
use bitflags::bitflags;
use std::cmp::Ordering;
use thiserror::Error;

/// Error type related to [``TableCollection``]
#[derive(Error, Debug, PartialEq)]
pub enum TablesError {
    /// Returned by [``TableCollection::new``].
    #[error("Invalid sequence length")]
    InvalidSequenceLength,
    /// Returned when invalid node `ID`s are encountered.
    #[error("Invalid node: {found:?}")]
    InvalidNodeValue {
        /// The invalid `ID`
        found: NodeId,
    },
    /// Returned when invalid positions are encountered.
    #[error("Invalid value for position: {found:?}")]
    InvalidPosition {
        /// The invalid position
        found: Position,
    },
    /// Returned when table validation detects duplicate positions
    /// in a site table.
    #[error("Duplicated site positions found")]
    DuplicatedSitePosition,
    /// Returned when site tables are not sorted by position.
    #[error("Site positions are unsorted")]
    UnsortedSitePosition,
    /// Returned when a [``Mutation``]'s [`SiteId`] is out of bounds.
    #[error("Site ID out of bounds")]
    SiteOutOfBounds,
    /// Returned when mutations are not sorted by site.
    #[error("Mutations not sorted by site")]
    UnsortedMutations,
    /// Returned when a mutation's parent mutation does not precede it.
    #[error("Mutation parent after child")]
    MutationParentAfterChild,
    /// Returned when a mutation's parent refers to a different site.
    #[error("Mutation parent on a different site")]
    MutationParentDifferentSite,
    /// Returned when a mutation is its own parent.
    #[error("Mutation is its own parent")]
    MutationParentEqual,
    /// Returned when a mutation's known time is younger than its node
    /// or older than its node's parent in some tree.
    #[error("Invalid mutation time")]
    InvalidMutationTime,
    /// Returned when a [``Node``]'s time field is not finite.
    #[error("Invalid node time")]
    InvalidNodeTime,
    /// Returned when an [``Edge``]'s left/right values are invalid.
    #[error("Invalid position range: {found:?}")]
    InvalidLeftRight {
        /// The invalid `(left, right)`.
        found: (Position, Position),
    },
    /// Returned when a parent is [`NodeId::NULL`].
    #[error("Parent is NULL")]
    NullParent,
    /// Returned when a child is [`NodeId::NULL`].
    #[error("Child is NULL")]
    NullChild,
    /// Returned when a node id does not refer to a row
    /// of the node table.
    #[error("Node is out of bounds")]
    NodeOutOfBounds,
    /// Returned when a mutation id is out of bounds.
    #[error("Mutation is out of bounds")]
    MutationOutOfBounds,
    /// Returned when an individual id is out of bounds.
    #[error("Individual is out of bounds")]
    IndividualOutOfBounds,
    /// Returned when a population id is out of bounds.
    #[error("Population is out of bounds")]
    PopulationOutOfBounds,
    /// Returned when an edge's child is not younger than its parent.
    #[error("Node time order violation")]
    NodeTimesUnordered,
    /// Returned when edges are not sorted by parent time.
    #[error("Edges not sorted by parent time")]
    EdgeTimesUnsorted,
    /// Returned when all edges for a given parent are not contiguous.
    #[error("Parents not contiguous")]
    ParentsNotContiguous,
    /// Returned when edges for a parent are not sorted by child.
    #[error("Edges not sorted by child")]
    EdgesNotSortedByChild,
    /// Returned when edges for a parent/child are not sorted by left.
    #[error("Edges not sorted by left")]
    EdgesNotSortedByLeft,
    /// Returned when the same edge appears twice.
    #[error("Duplicate edges")]
    DuplicateEdges,
    /// Returned when operations requiring indexes are attempted
    /// on unindexed tables.
    #[error("Tables not indexed")]
    TablesNotIndexed,
}

/// Result type for operations on tables
pub type TablesResult<T> = std::result::Result<T, TablesError>;

/// Time units for branch-length statistics are considered
/// uncalibrated when the table collection's `time_units`
/// equals this string.
pub const TIME_UNITS_UNCALIBRATED: &str = "uncalibrated";

bitflags! {
    /// Set properties of a [`Node`].
    #[derive(Default)]
    pub struct NodeFlags: u32 {
        /// Default
        const NONE = 0;
        /// The node is a sample node.
        const IS_SAMPLE = 1 << 0;
    }
}

bitflags! {
    /// Modifies behavior of [``TableCollection::validate``]
    ///
    /// ```
    /// let f = treeseq::TableValidationFlags::default();
    /// assert_eq!(f.contains(treeseq::TableValidationFlags::VALIDATE_ALL), true);
    /// ```
    pub struct TableValidationFlags: u32 {
        /// Validate the edge table
        const VALIDATE_EDGES = 1<<0;
        /// Validate the site table
        const VALIDATE_SITES = 1<<1;
        /// Validate the mutation table
        const VALIDATE_MUTATIONS = 1<<2;
        /// Validate the node table
        const VALIDATE_NODES = 1<<3;
        /// Validate all tables.
        /// This is also the "default" value.
        const VALIDATE_ALL = Self::VALIDATE_EDGES.bits|Self::VALIDATE_MUTATIONS.bits|Self::VALIDATE_SITES.bits|Self::VALIDATE_NODES.bits;
    }
}

impl Default for TableValidationFlags {
    fn default() -> Self {
        TableValidationFlags::VALIDATE_ALL
    }
}

bitflags! {
    /// Modifies behavior of [``TableCollection::sort_tables``]
    #[derive(Default)]
    pub struct TableSortingFlags: u32 {
        /// Sort all tables.
        /// This is also the "default"/empty.
        const SORT_ALL = 0;
        /// Do not sort the edge table.
        const SKIP_EDGE_TABLE = 1 << 0;
    }
}

bitflags! {
    /// Modifies behavior of [``TableCollection::build_index``]
    #[derive(Default)]
    pub struct IndexTablesFlags: u32 {
        /// Default behavior
        const NONE = 0;
        /// Do not validate the edge table
        const NO_VALIDATION = 1<<0;
    }
}

/// A node of a tree sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    /// Birth time, measured backwards from the present.
    pub time: Time,
    /// Bit flags.  See [`NodeFlags`].
    pub flags: u32,
    /// Population of the node, or NULL.
    pub population: PopulationId,
    /// Individual the node belongs to, or NULL.
    pub individual: IndividualId,
}

impl Node {
    /// `true` if [`NodeFlags::IS_SAMPLE`] is set.
    pub fn is_sample(&self) -> bool {
        self.flags & NodeFlags::IS_SAMPLE.bits() > 0
    }
}

/// An edge is a record of transmission of a half-open
/// interval of genome `[left, right)` from `parent` to `child`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Edge {
    /// Left end
    pub left: Position,
    /// Right end
    pub right: Position,
    /// Index of the parent in the node table
    pub parent: NodeId,
    /// Index of the child in the node table
    pub child: NodeId,
}

/// A site is a position on the genome together with
/// an ancestral state.
#[derive(Clone, Debug, PartialEq)]
pub struct Site {
    /// Position of the site
    pub position: Position,
    /// The ancestral state.
    /// [``None``] implies client code will apply a default.
    pub ancestral_state: Option<Vec<u8>>,
}

/// A mutation: a state change at a [``Site``] along the
/// branch above `node`.
#[derive(Clone, Debug, PartialEq)]
pub struct Mutation {
    /// The index of the corresponding [``Site``].
    pub site: SiteId,
    /// The node where the mutation maps.
    pub node: NodeId,
    /// The mutation's parent mutation, or NULL.
    ///
    /// A parent mutation is an older mutation at the same
    /// site on the path from `node` to the root.
    pub parent: MutationId,
    /// The origin time of the mutation,
    /// or [`Time::UNKNOWN`].
    pub time: Time,
    /// The derived state.
    pub derived_state: Option<Vec<u8>>,
}

/// A migration of a lineage between populations.
#[derive(Clone, Debug, PartialEq)]
pub struct Migration {
    /// Left end of the migrating segment
    pub left: Position,
    /// Right end of the migrating segment
    pub right: Position,
    /// The node involved
    pub node: NodeId,
    /// Source population
    pub source: PopulationId,
    /// Destination population
    pub dest: PopulationId,
    /// Time of migration
    pub time: Time,
}

/// A population.
///
/// Populations carry no payload here; the row exists so
/// that [`Node::population`] has something to refer to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Population {}

/// An individual, possibly associated with several nodes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Individual {
    /// Bit flags, free for client use.
    pub flags: u32,
    /// Spatial location.
    pub location: Vec<f64>,
    /// Parent individuals, possibly NULL.
    pub parents: Vec<IndividualId>,
}

/// A node table
pub type NodeTable = Vec<Node>;
/// An edge table
pub type EdgeTable = Vec<Edge>;
/// A site table
pub type SiteTable = Vec<Site>;
/// A mutation table
pub type MutationTable = Vec<Mutation>;
/// A migration table
pub type MigrationTable = Vec<Migration>;
/// A population table
pub type PopulationTable = Vec<Population>;
/// An individual table
pub type IndividualTable = Vec<Individual>;

fn position_non_negative(x: Position) -> TablesResult<()> {
    if x.0 < 0.0 || !x.0.is_finite() {
        Err(TablesError::InvalidPosition { found: x })
    } else {
        Ok(())
    }
}

fn node_non_negative(x: NodeId) -> TablesResult<()> {
    if x < 0 {
        Err(TablesError::InvalidNodeValue { found: x })
    } else {
        Ok(())
    }
}

// Edge sorting for the canonical table order:
// older parents last, ties broken by parent id, child id, left.
fn sort_edges(nodes: &[Node], edges: &mut [Edge]) {
    edges.sort_by(|a, b| {
        let ta = nodes[a.parent.0 as usize].time;
        let tb = nodes[b.parent.0 as usize].time;
        match ta.partial_cmp(&tb) {
            Some(Ordering::Equal) => {
                if a.parent == b.parent {
                    if a.child == b.child {
                        return a.left.partial_cmp(&b.left).unwrap();
                    }
                    a.child.cmp(&b.child)
                } else {
                    a.parent.cmp(&b.parent)
                }
            }
            Some(x) => x,
            None => panic!("invalid parent times"),
        }
    });
}

// Mutations sort by site, then by time oldest-first where
// times are known.  The sort is stable, so mutations with
// unknown times keep their relative order.  Parent ids are
// remapped afterwards.
fn sort_mutations(mutations: &mut MutationTable) {
    let mut order: Vec<usize> = (0..mutations.len()).collect();
    order.sort_by(|a, b| {
        let ma = &mutations[*a];
        let mb = &mutations[*b];
        match ma.site.cmp(&mb.site) {
            Ordering::Equal => {
                if ma.time.is_unknown() || mb.time.is_unknown() {
                    Ordering::Equal
                } else {
                    mb.time.partial_cmp(&ma.time).unwrap()
                }
            }
            x => x,
        }
    });
    let mut id_map = vec![MutationId::NULL; mutations.len()];
    for (new_index, old_index) in order.iter().enumerate() {
        id_map[*old_index] = MutationId::from(new_index);
    }
    let mut sorted = MutationTable::with_capacity(mutations.len());
    for old_index in order.iter() {
        let mut m = mutations[*old_index].clone();
        if m.parent != MutationId::NULL {
            m.parent = id_map[m.parent.0 as usize];
        }
        sorted.push(m);
    }
    *mutations = sorted;
}

/// Perform a data integrity check on an [``EdgeTable``].
///
/// This checks, amongst other things, the sorting order
/// of the edges.
///
/// # Parameters
///
/// * `len`, the sequence length of the tables.
/// * `edges`, the [``EdgeTable``]
/// * `nodes`, the [``NodeTable``]
///
/// # Errors
///
/// Will return [``TablesError``] if the tables are not valid.
pub fn validate_edge_table(len: Position, edges: &[Edge], nodes: &[Node]) -> TablesResult<bool> {
    if edges.is_empty() {
        return Ok(true);
    }
    let mut parent_seen = vec![0; nodes.len()];
    let mut last_parent: usize = edges[0].parent.0 as usize;
    let mut last_child: usize = edges[0].child.0 as usize;
    let mut last_left = edges[0].left;

    for (i, edge) in edges.iter().enumerate() {
        if edge.parent == NodeId::NULL {
            return Err(TablesError::NullParent);
        }
        if edge.child == NodeId::NULL {
            return Err(TablesError::NullChild);
        }
        if edge.parent < 0 || edge.parent.0 as usize >= nodes.len() {
            return Err(TablesError::NodeOutOfBounds);
        }
        if edge.child < 0 || edge.child.0 as usize >= nodes.len() {
            return Err(TablesError::NodeOutOfBounds);
        }
        if edge.left < 0.0 || edge.left > len {
            return Err(TablesError::InvalidPosition { found: edge.left });
        }
        if edge.right < 0.0 || edge.right > len {
            return Err(TablesError::InvalidPosition { found: edge.right });
        }
        if edge.left >= edge.right {
            return Err(TablesError::InvalidLeftRight {
                found: (edge.left, edge.right),
            });
        }

        // Time runs backwards: the child must be strictly
        // younger than the parent.
        if nodes[edge.child.0 as usize].time >= nodes[edge.parent.0 as usize].time {
            return Err(TablesError::NodeTimesUnordered);
        }

        if parent_seen[edge.parent.0 as usize] == 1 {
            return Err(TablesError::ParentsNotContiguous);
        }

        if i > 0 {
            match nodes[edge.parent.0 as usize]
                .time
                .partial_cmp(&nodes[last_parent].time)
            {
                Some(Ordering::Less) => {
                    return Err(TablesError::EdgeTimesUnsorted);
                }
                Some(Ordering::Equal) => {
                    if edge.parent.0 as usize == last_parent {
                        if (edge.child.0 as usize) < last_child {
                            return Err(TablesError::EdgesNotSortedByChild);
                        }
                        if edge.child.0 as usize == last_child {
                            match edge.left.partial_cmp(&last_left).unwrap() {
                                Ordering::Greater => (),
                                Ordering::Equal => return Err(TablesError::DuplicateEdges),
                                Ordering::Less => return Err(TablesError::EdgesNotSortedByLeft),
                            }
                        }
                    } else {
                        parent_seen[last_parent] = 1;
                    }
                }
                Some(_) => {
                    parent_seen[last_parent] = 1;
                }
                None => panic!("invalid node times"),
            }
        }
        last_parent = edge.parent.0 as usize;
        last_child = edge.child.0 as usize;
        last_left = edge.left;
    }

    Ok(true)
}

/// Check that all node times are finite.
pub fn validate_node_table(nodes: &[Node]) -> TablesResult<()> {
    for n in nodes {
        if !n.time.0.is_finite() {
            return Err(TablesError::InvalidNodeTime);
        }
    }
    Ok(())
}

/// Check that sites are sorted by strictly increasing position.
pub fn validate_site_table(len: Position, sites: &[Site]) -> TablesResult<()> {
    for (i, site) in sites.iter().enumerate() {
        if site.position < 0.0 || site.position >= len {
            return Err(TablesError::InvalidPosition {
                found: site.position,
            });
        }
        if i > 0 {
            if sites[i - 1].position == site.position {
                return Err(TablesError::DuplicatedSitePosition);
            }
            if sites[i - 1].position > site.position {
                return Err(TablesError::UnsortedSitePosition);
            }
        }
    }
    Ok(())
}

/// Check mutation ordering and referential integrity.
///
/// Mutations must be grouped by site in increasing site order,
/// and every mutation's parent must precede it in the table
/// and refer to the same site.
pub fn validate_mutation_table(
    mutations: &[Mutation],
    sites: &[Site],
    nodes: &[Node],
) -> TablesResult<()> {
    for (i, mutation) in mutations.iter().enumerate() {
        if mutation.site < 0 || (mutation.site.0 as usize) >= sites.len() {
            return Err(TablesError::SiteOutOfBounds);
        }
        if mutation.node < 0 || (mutation.node.0 as usize) >= nodes.len() {
            return Err(TablesError::NodeOutOfBounds);
        }
        if !mutation.time.is_unknown() {
            if !mutation.time.0.is_finite() {
                return Err(TablesError::InvalidMutationTime);
            }
            if mutation.time < nodes[mutation.node.0 as usize].time {
                return Err(TablesError::InvalidMutationTime);
            }
        }
        if i > 0 && mutations[i - 1].site > mutation.site {
            return Err(TablesError::UnsortedMutations);
        }
        if mutation.parent != MutationId::NULL {
            if mutation.parent.0 as usize >= mutations.len() || mutation.parent < 0 {
                return Err(TablesError::MutationOutOfBounds);
            }
            if mutation.parent.0 as usize == i {
                return Err(TablesError::MutationParentEqual);
            }
            if mutation.parent.0 as usize > i {
                return Err(TablesError::MutationParentAfterChild);
            }
            if mutations[mutation.parent.0 as usize].site != mutation.site {
                return Err(TablesError::MutationParentDifferentSite);
            }
        }
    }
    Ok(())
}

/// A collection of node, edge, site, mutation, migration,
/// population, and individual tables.
///
/// A table collection is the persistent encoding of a
/// tree sequence.  [`TreeSequence`](crate::TreeSequence)
/// consumes an indexed table collection and builds the
/// per-tree structures on top of it.
#[derive(Clone)]
pub struct TableCollection {
    length_: Position,

    pub(crate) nodes_: NodeTable,
    pub(crate) edges_: EdgeTable,
    pub(crate) sites_: SiteTable,
    pub(crate) mutations_: MutationTable,
    pub(crate) migrations_: MigrationTable,
    pub(crate) populations_: PopulationTable,
    pub(crate) individuals_: IndividualTable,
    /// See [`TIME_UNITS_UNCALIBRATED`].
    pub time_units: String,
    pub(crate) edge_insertion_order: Vec<EdgeId>,
    pub(crate) edge_removal_order: Vec<EdgeId>,
    pub(crate) is_indexed: bool,
}

impl TableCollection {
    /// Create a new instance.
    ///
    /// # Parameters
    ///
    /// * `sequence_length`: the total genome length for the tables.
    ///
    /// # Errors
    ///
    /// Will return [``TablesError``] if `sequence_length <= 0`.
    pub fn new<P: Into<Position>>(sequence_length: P) -> TablesResult<TableCollection> {
        let p = sequence_length.into();
        if !(p.0.is_finite()) || p.0 <= 0.0 {
            return Err(TablesError::InvalidSequenceLength);
        }

        Ok(TableCollection {
            length_: p,
            nodes_: NodeTable::new(),
            edges_: EdgeTable::new(),
            sites_: SiteTable::new(),
            mutations_: MutationTable::new(),
            migrations_: MigrationTable::new(),
            populations_: PopulationTable::new(),
            individuals_: IndividualTable::new(),
            time_units: String::from("unknown"),
            edge_insertion_order: vec![],
            edge_removal_order: vec![],
            is_indexed: false,
        })
    }

    /// Add a [``Node``] to the node table.
    ///
    /// # Example
    ///
    /// ```
    /// let mut tables = treeseq::TableCollection::new(100.0).unwrap();
    /// let id = tables.add_node(1.0, treeseq::NodeFlags::NONE.bits()).unwrap();
    /// assert_eq!(id, 0);
    /// ```
    pub fn add_node<T: Into<Time>>(&mut self, time: T, flags: u32) -> TablesResult<NodeId> {
        self.add_node_full(time, flags, PopulationId::NULL, IndividualId::NULL)
    }

    /// Add a sample [``Node``] to the node table.
    pub fn add_sample_node<T: Into<Time>>(&mut self, time: T) -> TablesResult<NodeId> {
        self.add_node(time, NodeFlags::IS_SAMPLE.bits())
    }

    /// Add a [``Node``] with population and individual references.
    pub fn add_node_full<T: Into<Time>, P: Into<PopulationId>, I: Into<IndividualId>>(
        &mut self,
        time: T,
        flags: u32,
        population: P,
        individual: I,
    ) -> TablesResult<NodeId> {
        self.is_indexed = false;
        self.nodes_.push(Node {
            time: time.into(),
            flags,
            population: population.into(),
            individual: individual.into(),
        });
        Ok(NodeId::from(self.nodes_.len() - 1))
    }

    /// Add an [``Edge``] to the edge table.
    ///
    /// # Errors
    ///
    /// Will return [``TablesError``] if any of the input
    /// are invalid.
    ///
    /// # Example
    ///
    /// ```
    /// let mut tables = treeseq::TableCollection::new(100.0).unwrap();
    /// let id = tables.add_edge(0.0, 3.0, 5, 9).unwrap();
    /// assert_eq!(id, 0);
    /// ```
    pub fn add_edge<L: Into<Position>, R: Into<Position>, P: Into<NodeId>, C: Into<NodeId>>(
        &mut self,
        left: L,
        right: R,
        parent: P,
        child: C,
    ) -> TablesResult<EdgeId> {
        let left = left.into();
        let right = right.into();
        let parent = parent.into();
        let child = child.into();
        if right <= left {
            return Err(TablesError::InvalidLeftRight {
                found: (left, right),
            });
        }
        position_non_negative(left)?;
        position_non_negative(right)?;
        node_non_negative(parent)?;
        node_non_negative(child)?;
        self.is_indexed = false;
        self.edges_.push(Edge {
            left,
            right,
            parent,
            child,
        });
        Ok(EdgeId::from(self.edges_.len() - 1))
    }

    /// Add a [``Site``] to the site table.
    ///
    /// # Example
    ///
    /// ```
    /// let mut tables = treeseq::TableCollection::new(100.0).unwrap();
    /// let id = tables.add_site(3.0, Some(b"A".to_vec())).unwrap();
    /// assert_eq!(id, 0);
    /// ```
    pub fn add_site<P: Into<Position>, A: Into<Option<Vec<u8>>>>(
        &mut self,
        position: P,
        ancestral_state: A,
    ) -> TablesResult<SiteId> {
        let p = position.into();
        if p >= self.length_ || p.0 < 0.0 {
            return Err(TablesError::InvalidPosition { found: p });
        }
        self.sites_.push(Site {
            position: p,
            ancestral_state: ancestral_state.into(),
        });
        Ok(SiteId::from(self.sites_.len() - 1))
    }

    /// Add a [``Mutation``] to the mutation table.
    ///
    /// # Example
    ///
    /// ```
    /// let mut tables = treeseq::TableCollection::new(100.0).unwrap();
    /// let site = tables.add_site(3.0, None).unwrap();
    /// let id = tables
    ///     .add_mutation(site, 0, treeseq::MutationId::NULL,
    ///                   treeseq::Time::UNKNOWN, Some(b"G".to_vec()))
    ///     .unwrap();
    /// assert_eq!(id, 0);
    /// ```
    pub fn add_mutation<S: Into<SiteId>, N: Into<NodeId>, M: Into<MutationId>, T: Into<Time>>(
        &mut self,
        site: S,
        node: N,
        parent: M,
        time: T,
        derived_state: Option<Vec<u8>>,
    ) -> TablesResult<MutationId> {
        let node = node.into();
        node_non_negative(node)?;
        self.mutations_.push(Mutation {
            site: site.into(),
            node,
            parent: parent.into(),
            time: time.into(),
            derived_state,
        });
        Ok(MutationId::from(self.mutations_.len() - 1))
    }

    /// Add a [``Migration``] to the migration table.
    pub fn add_migration<L: Into<Position>, R: Into<Position>, N: Into<NodeId>, T: Into<Time>>(
        &mut self,
        left: L,
        right: R,
        node: N,
        source: PopulationId,
        dest: PopulationId,
        time: T,
    ) -> TablesResult<MigrationId> {
        let left = left.into();
        let right = right.into();
        let node = node.into();
        if right <= left {
            return Err(TablesError::InvalidLeftRight {
                found: (left, right),
            });
        }
        node_non_negative(node)?;
        self.migrations_.push(Migration {
            left,
            right,
            node,
            source,
            dest,
            time: time.into(),
        });
        Ok(MigrationId::from(self.migrations_.len() - 1))
    }

    /// Add a [``Population``] to the population table.
    pub fn add_population(&mut self) -> TablesResult<PopulationId> {
        self.populations_.push(Population::default());
        Ok(PopulationId::from(self.populations_.len() - 1))
    }

    /// Add an [``Individual``] to the individual table.
    pub fn add_individual(
        &mut self,
        flags: u32,
        location: Vec<f64>,
        parents: Vec<IndividualId>,
    ) -> TablesResult<IndividualId> {
        self.individuals_.push(Individual {
            flags,
            location,
            parents,
        });
        Ok(IndividualId::from(self.individuals_.len() - 1))
    }

    /// Get the sequence length.
    pub fn sequence_length(&self) -> Position {
        self.length_
    }

    /// Return an immutable reference to the mutation table.
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations_
    }

    /// Return an immutable reference to the edge table.
    pub fn edges(&self) -> &[Edge] {
        &self.edges_
    }

    /// Return the number of edges.
    pub fn num_edges(&self) -> usize {
        self.edges_.len()
    }

    /// Return the number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes_.len()
    }

    /// Return an immutable reference to the node table.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes_
    }

    /// Return an immutable reference to the site table.
    pub fn sites(&self) -> &[Site] {
        &self.sites_
    }

    /// Return an immutable reference to the migration table.
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations_
    }

    /// Return an immutable reference to the population table.
    pub fn populations(&self) -> &[Population] {
        &self.populations_
    }

    /// Return an immutable reference to the individual table.
    pub fn individuals(&self) -> &[Individual] {
        &self.individuals_
    }

    /// Return the i-th [``Node``].
    pub fn node<N: Into<NodeId>>(&self, i: N) -> &Node {
        &self.nodes_[i.into().0 as usize]
    }

    /// Return the i-th [``Edge``].
    pub fn edge<E: Into<EdgeId>>(&self, i: E) -> &Edge {
        &self.edges_[i.into().0 as usize]
    }

    /// Return the i-th [``Site``].
    pub fn site<S: Into<SiteId>>(&self, i: S) -> &Site {
        &self.sites_[i.into().0 as usize]
    }

    /// Return the i-th [``Mutation``].
    pub fn mutation<M: Into<MutationId>>(&self, i: M) -> &Mutation {
        &self.mutations_[i.into().0 as usize]
    }

    /// Sort all tables into the canonical order required
    /// for indexing.
    pub fn sort_tables(&mut self, flags: TableSortingFlags) {
        if !flags.contains(TableSortingFlags::SKIP_EDGE_TABLE) {
            sort_edges(&self.nodes_, &mut self.edges_);
            self.is_indexed = false;
        }
        self.sites_sort_and_remap();
        sort_mutations(&mut self.mutations_);
    }

    // Sort sites by position, deduplicate nothing (duplicates are a
    // validation error), and remap mutation site references.
    fn sites_sort_and_remap(&mut self) {
        let mut order: Vec<usize> = (0..self.sites_.len()).collect();
        order.sort_by(|a, b| {
            self.sites_[*a]
                .position
                .partial_cmp(&self.sites_[*b].position)
                .unwrap()
        });
        let mut id_map = vec![SiteId::NULL; self.sites_.len()];
        for (new_index, old_index) in order.iter().enumerate() {
            id_map[*old_index] = SiteId::from(new_index);
        }
        let mut sorted = SiteTable::with_capacity(self.sites_.len());
        for old_index in order.iter() {
            sorted.push(self.sites_[*old_index].clone());
        }
        self.sites_ = sorted;
        for m in self.mutations_.iter_mut() {
            if m.site != SiteId::NULL {
                m.site = id_map[m.site.0 as usize];
            }
        }
    }

    /// Run a validation check on the tables.
    pub fn validate(&self, flags: TableValidationFlags) -> TablesResult<bool> {
        if flags.contains(TableValidationFlags::VALIDATE_EDGES) {
            validate_edge_table(self.sequence_length(), &self.edges_, &self.nodes_)?;
        }
        if flags.contains(TableValidationFlags::VALIDATE_NODES) {
            validate_node_table(self.nodes())?;
        }
        if flags.contains(TableValidationFlags::VALIDATE_SITES) {
            validate_site_table(self.sequence_length(), self.sites())?;
        }
        if flags.contains(TableValidationFlags::VALIDATE_MUTATIONS) {
            validate_mutation_table(self.mutations(), self.sites(), self.nodes())?;
        }
        Ok(true)
    }

    /// Build the edge insertion and removal indexes.
    ///
    /// The insertion order sorts edges by left coordinate,
    /// breaking ties by increasing parent time so that edges
    /// are inserted bottom-up.  The removal order sorts by
    /// right coordinate, breaking ties by decreasing parent
    /// time so that edges are removed top-down.
    ///
    /// # Errors
    ///
    /// [`TablesError`] if the input data are invalid.
    pub fn build_index(&mut self, flags: IndexTablesFlags) -> TablesResult<()> {
        if !flags.contains(IndexTablesFlags::NO_VALIDATION) {
            validate_edge_table(self.sequence_length(), &self.edges_, &self.nodes_)?;
        }
        self.edge_insertion_order.clear();
        self.edge_removal_order.clear();
        for (i, e) in self.edges_.iter().enumerate() {
            if e.parent == NodeId::NULL {
                return Err(TablesError::NullParent);
            }
            if e.child == NodeId::NULL {
                return Err(TablesError::NullChild);
            }
            if e.parent.0 as usize >= self.nodes_.len() || e.child.0 as usize >= self.nodes_.len()
            {
                return Err(TablesError::NodeOutOfBounds);
            }
            self.edge_insertion_order.push(EdgeId::from(i));
            self.edge_removal_order.push(EdgeId::from(i));
        }
        let edges = &self.edges_;
        let nodes = &self.nodes_;
        self.edge_insertion_order.sort_by(|a, b| {
            let ea = &edges[a.0 as usize];
            let eb = &edges[b.0 as usize];
            match ea.left.partial_cmp(&eb.left).unwrap() {
                Ordering::Equal => {
                    let ta = nodes[ea.parent.0 as usize].time;
                    let tb = nodes[eb.parent.0 as usize].time;
                    match ta.partial_cmp(&tb) {
                        Some(Ordering::Equal) => match ea.parent.cmp(&eb.parent) {
                            Ordering::Equal => ea.child.cmp(&eb.child),
                            x => x,
                        },
                        Some(x) => x,
                        None => panic!("invalid parent times"),
                    }
                }
                x => x,
            }
        });
        self.edge_removal_order.sort_by(|a, b| {
            let ea = &edges[a.0 as usize];
            let eb = &edges[b.0 as usize];
            match ea.right.partial_cmp(&eb.right).unwrap() {
                Ordering::Equal => {
                    let ta = nodes[ea.parent.0 as usize].time;
                    let tb = nodes[eb.parent.0 as usize].time;
                    match ta.partial_cmp(&tb) {
                        Some(Ordering::Equal) => match ea.parent.cmp(&eb.parent).reverse() {
                            Ordering::Equal => ea.child.cmp(&eb.child).reverse(),
                            x => x,
                        },
                        Some(x) => x.reverse(),
                        None => panic!("invalid parent times"),
                    }
                }
                x => x,
            }
        });
        self.is_indexed = true;
        Ok(())
    }

    /// Get the edge insertion order.
    ///
    /// Returns `None` if `self.is_indexed() == false`.
    pub fn edge_insertion_order(&self) -> Option<&[EdgeId]> {
        if self.is_indexed {
            Some(&self.edge_insertion_order)
        } else {
            None
        }
    }

    /// Get the edge removal order.
    ///
    /// Returns `None` if `self.is_indexed() == false`.
    pub fn edge_removal_order(&self) -> Option<&[EdgeId]> {
        if self.is_indexed {
            Some(&self.edge_removal_order)
        } else {
            None
        }
    }

    /// Return `true` if tables are indexed, `false` otherwise.
    pub fn is_indexed(&self) -> bool {
        self.is_indexed
    }

    /// Assign the `parent` field of every mutation.
    ///
    /// A mutation's parent is the closest mutation at the same
    /// site on the path from the mutation's node towards the
    /// root, restricted to mutations earlier in the table.
    ///
    /// # Errors
    ///
    /// [`TablesError::TablesNotIndexed`] if [`TableCollection::build_index`]
    /// has not been called.
    pub fn compute_mutation_parents(&mut self) -> TablesResult<()> {
        if !self.is_indexed {
            return Err(TablesError::TablesNotIndexed);
        }
        validate_site_table(self.sequence_length(), &self.sites_)?;

        let num_nodes = self.nodes_.len();
        let mut parent = vec![NodeId::NULL; num_nodes];
        let mut bottom_mutation = vec![MutationId::NULL; num_nodes];
        for m in self.mutations_.iter_mut() {
            m.parent = MutationId::NULL;
        }

        // Group mutations by site up front.  The grouping (and
        // the sweep below) requires mutations sorted by site.
        let num_sites = self.sites_.len();
        let mut site_offsets = vec![0usize; num_sites + 1];
        for (i, m) in self.mutations_.iter().enumerate() {
            if m.site < 0 || (m.site.0 as usize) >= num_sites {
                return Err(TablesError::SiteOutOfBounds);
            }
            if i > 0 && self.mutations_[i - 1].site > m.site {
                return Err(TablesError::UnsortedMutations);
            }
            site_offsets[m.site.0 as usize + 1] += 1;
        }
        for i in 0..num_sites {
            site_offsets[i + 1] += site_offsets[i];
        }

        let edges = &self.edges_;
        let insertion = &self.edge_insertion_order;
        let removal = &self.edge_removal_order;
        let mut input_index = 0;
        let mut output_index = 0;
        let mut site_index = 0;
        let mut tree_left = Position(0.0);

        while input_index < insertion.len() || tree_left < self.length_ {
            for idx in removal[output_index..].iter() {
                let e = &edges[idx.0 as usize];
                if e.right != tree_left {
                    break;
                }
                parent[e.child.0 as usize] = NodeId::NULL;
                output_index += 1;
            }
            for idx in insertion[input_index..].iter() {
                let e = &edges[idx.0 as usize];
                if e.left != tree_left {
                    break;
                }
                parent[e.child.0 as usize] = e.parent;
                input_index += 1;
            }
            let mut tree_right = self.length_;
            if input_index < insertion.len() {
                let l = edges[insertion[input_index].0 as usize].left;
                if l < tree_right {
                    tree_right = l;
                }
            }
            if output_index < removal.len() {
                let r = edges[removal[output_index].0 as usize].right;
                if r < tree_right {
                    tree_right = r;
                }
            }

            while site_index < num_sites
                && self.sites_[site_index].position >= tree_left
                && self.sites_[site_index].position < tree_right
            {
                let start = site_offsets[site_index];
                let stop = site_offsets[site_index + 1];
                for m in start..stop {
                    let node = self.mutations_[m].node;
                    let mut u = node;
                    while u != NodeId::NULL && bottom_mutation[u.0 as usize] == MutationId::NULL {
                        u = parent[u.0 as usize];
                    }
                    if u != NodeId::NULL {
                        self.mutations_[m].parent = bottom_mutation[u.0 as usize];
                    }
                    bottom_mutation[node.0 as usize] = MutationId::from(m);
                }
                for m in start..stop {
                    bottom_mutation[self.mutations_[m].node.0 as usize] = MutationId::NULL;
                }
                site_index += 1;
            }
            tree_left = tree_right;
        }
        Ok(())
    }

    /// Count the number of trees in O(E) time, where E
    /// is the length of the edge table.
    ///
    /// # Errors
    ///
    /// [`TablesError::TablesNotIndexed`] if tables are not indexed.
    pub fn count_trees(&self) -> TablesResult<u32> {
        Ok(self.breakpoints()?.len() as u32 - 1)
    }

    /// Compute the positions at which the local tree changes.
    ///
    /// The returned vector has length `num_trees + 1`; its first
    /// element is 0 and its last is the sequence length.
    ///
    /// # Errors
    ///
    /// [`TablesError::TablesNotIndexed`] if tables are not indexed.
    pub fn breakpoints(&self) -> TablesResult<Vec<Position>> {
        if !self.is_indexed() {
            return Err(TablesError::TablesNotIndexed);
        }
        let mut breakpoints = vec![Position(0.0)];
        let mut input_index: usize = 0;
        let mut output_index: usize = 0;
        let input = self.edge_insertion_order.as_slice();
        let output = self.edge_removal_order.as_slice();
        let edges = self.edges_.as_slice();

        let mut tree_left = Position(0.0);
        while input_index < input.len() || tree_left < self.sequence_length() {
            for idx in output[output_index..].iter() {
                if edges[idx.0 as usize].right != tree_left {
                    break;
                }
                output_index += 1;
            }
            for idx in input[input_index..].iter() {
                if edges[idx.0 as usize].left != tree_left {
                    break;
                }
                input_index += 1;
            }
            let mut tree_right = self.sequence_length();
            if input_index < input.len() {
                let l = edges[input[input_index].0 as usize].left;
                if l < tree_right {
                    tree_right = l;
                }
            }
            if output_index < output.len() {
                let r = edges[output[output_index].0 as usize].right;
                if r < tree_right {
                    tree_right = r;
                }
            }
            breakpoints.push(tree_right);
            tree_left = tree_right;
        }
        Ok(breakpoints)
    }
}



#[cfg(test)]
mod test_mutation_parents {
    use super::*;

    #[test]
    fn test_stacked_mutations() {
        let mut t = TableCollection::new(10.0).unwrap();
        let anc = t.add_node(1.0, 0).unwrap();
        let c0 = t.add_sample_node(0.0).unwrap();
        let c1 = t.add_sample_node(0.0).unwrap();
        t.add_edge(0.0, 10.0, anc, c0).unwrap();
        t.add_edge(0.0, 10.0, anc, c1).unwrap();
        let s = t.add_site(5.0, Some(b"A".to_vec())).unwrap();
        // mutation above anc, then a back mutation above c0
        t.add_mutation(s, anc, MutationId::NULL, Time::UNKNOWN, Some(b"T".to_vec()))
            .unwrap();
        t.add_mutation(s, c0, MutationId::NULL, Time::UNKNOWN, Some(b"A".to_vec()))
            .unwrap();
        t.sort_tables(TableSortingFlags::default());
        t.build_index(IndexTablesFlags::empty()).unwrap();
        t.compute_mutation_parents().unwrap();
        assert_eq!(t.mutation(0).parent, MutationId::NULL);
        assert_eq!(t.mutation(1).parent, 0);
    }
}
