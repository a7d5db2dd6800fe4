use crate::newtypes::{EdgeId, Position};
use crate::treeseq::TreeSequence;

/// Which of the two precomputed edge orders a range refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EdgeOrder {
    /// The insertion-order index (left ascending, youngest parents first).
    Insertion,
    /// The removal-order index (right ascending, oldest parents first).
    Removal,
}

/// A half-open range of indexes into one of the edge orders.
///
/// When `descending` is true, the range is traversed from
/// `stop - 1` down to `start`.
#[derive(Copy, Clone, Debug)]
pub struct EdgeRange {
    pub start: usize,
    pub stop: usize,
    pub descending: bool,
    pub order: EdgeOrder,
}

impl EdgeRange {
    fn empty(order: EdgeOrder) -> Self {
        Self {
            start: 0,
            stop: 0,
            descending: false,
            order,
        }
    }

    /// The number of entries in the range.
    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    /// `true` if the range is empty.
    pub fn is_empty(&self) -> bool {
        self.stop == self.start
    }
}

/// A cursor over the trees of a [`TreeSequence`].
///
/// `TreePosition` performs the index bookkeeping behind tree
/// traversal: for each transition between adjacent trees (or
/// each seek) it exposes the ranges of the edge insertion and
/// removal orders that leave and enter the current interval.
/// It never touches tree state itself; [`Tree`](crate::Tree)
/// consumes the emitted ranges.
///
/// Cursor invariant: when positioned at the tree starting at
/// coordinate `x`, the first `insertion_cursor` entries of the
/// insertion order are exactly the edges with `left <= x`, and
/// the first `removal_cursor` entries of the removal order are
/// exactly the edges with `right <= x`.  The invariant is
/// direction-independent, which is what lets `next`, `prev`,
/// and the seeks share cursors.
#[derive(Clone)]
pub struct TreePosition<'ts> {
    ts: &'ts TreeSequence,
    index: i64,
    left: Position,
    right: Position,
    insertion_cursor: usize,
    removal_cursor: usize,
    out: EdgeRange,
    in_: EdgeRange,
}

impl<'ts> TreePosition<'ts> {
    /// Create a cursor in the null state, before the first tree.
    pub fn new(ts: &'ts TreeSequence) -> Self {
        Self {
            ts,
            index: -1,
            left: Position(0.0),
            right: Position(0.0),
            insertion_cursor: 0,
            removal_cursor: 0,
            out: EdgeRange::empty(EdgeOrder::Removal),
            in_: EdgeRange::empty(EdgeOrder::Insertion),
        }
    }

    /// The current tree index, or `None` in the null state.
    pub fn index(&self) -> Option<usize> {
        if self.index < 0 {
            None
        } else {
            Some(self.index as usize)
        }
    }

    /// The current tree interval `[left, right)`.
    pub fn interval(&self) -> (Position, Position) {
        (self.left, self.right)
    }

    /// The range of edges that left the interval in the last
    /// transition.
    pub fn out_range(&self) -> EdgeRange {
        self.out
    }

    /// The range of edges that entered the interval in the last
    /// transition.
    pub fn in_range(&self) -> EdgeRange {
        self.in_
    }

    fn order_slice(&self, order: EdgeOrder) -> &'ts [EdgeId] {
        match order {
            EdgeOrder::Insertion => &self.ts.tables.edge_insertion_order,
            EdgeOrder::Removal => &self.ts.tables.edge_removal_order,
        }
    }

    /// Iterate over the edges of `range` in its traversal order.
    pub fn edges(&self, range: EdgeRange) -> impl Iterator<Item = EdgeId> + 'ts {
        let order = self.order_slice(range.order);
        let (a, b) = (range.start, range.stop);
        let descending = range.descending;
        (a..b).map(move |i| {
            if descending {
                order[b - 1 - (i - a)]
            } else {
                order[i]
            }
        })
    }

    /// Iterate over the edges that left the interval.
    pub fn edges_out(&self) -> impl Iterator<Item = EdgeId> + 'ts {
        self.edges(self.out)
    }

    /// Iterate over the edges that entered the interval.
    pub fn edges_in(&self) -> impl Iterator<Item = EdgeId> + 'ts {
        self.edges(self.in_)
    }

    fn num_trees(&self) -> usize {
        self.ts.breakpoints.len() - 1
    }

    /// Advance to the next tree.
    ///
    /// From the null state this positions at the first tree.
    /// Returns `false`, and transitions to the null state, when
    /// the last tree has already been reached; the emitted out
    /// range then contains the edges of the final tree.
    pub fn next(&mut self) -> bool {
        let edges = self.ts.tables.edges();
        let insertion = self.order_slice(EdgeOrder::Insertion);
        let removal = self.order_slice(EdgeOrder::Removal);
        let num_trees = self.num_trees();

        let target = if self.index == -1 {
            self.insertion_cursor = 0;
            self.removal_cursor = 0;
            0
        } else {
            self.index as usize + 1
        };

        if target == num_trees {
            let l = self.ts.sequence_length();
            self.out = EdgeRange {
                start: self.removal_cursor,
                stop: removal.len(),
                descending: false,
                order: EdgeOrder::Removal,
            };
            self.in_ = EdgeRange::empty(EdgeOrder::Insertion);
            self.removal_cursor = removal.len();
            self.insertion_cursor = insertion.len();
            self.index = -1;
            self.left = l;
            self.right = l;
            return false;
        }

        let x = self.ts.breakpoints[target];
        let mut j = self.removal_cursor;
        while j < removal.len() && edges[removal[j].0 as usize].right == x {
            j += 1;
        }
        self.out = EdgeRange {
            start: self.removal_cursor,
            stop: j,
            descending: false,
            order: EdgeOrder::Removal,
        };
        self.removal_cursor = j;

        let mut k = self.insertion_cursor;
        while k < insertion.len() && edges[insertion[k].0 as usize].left == x {
            k += 1;
        }
        self.in_ = EdgeRange {
            start: self.insertion_cursor,
            stop: k,
            descending: false,
            order: EdgeOrder::Insertion,
        };
        self.insertion_cursor = k;

        self.index = target as i64;
        self.left = x;
        self.right = self.ts.breakpoints[target + 1];
        true
    }

    /// Step to the previous tree.
    ///
    /// From the null state this positions at the last tree.
    /// Returns `false`, and transitions to the null state, when
    /// the first tree has already been reached.
    pub fn prev(&mut self) -> bool {
        let edges = self.ts.tables.edges();
        let insertion = self.order_slice(EdgeOrder::Insertion);
        let removal = self.order_slice(EdgeOrder::Removal);
        let num_trees = self.num_trees();

        let target = if self.index == -1 {
            self.insertion_cursor = insertion.len();
            self.removal_cursor = removal.len();
            num_trees as i64 - 1
        } else {
            self.index - 1
        };

        if target < 0 {
            self.out = EdgeRange {
                start: 0,
                stop: self.insertion_cursor,
                descending: true,
                order: EdgeOrder::Insertion,
            };
            self.in_ = EdgeRange::empty(EdgeOrder::Removal);
            self.insertion_cursor = 0;
            self.removal_cursor = 0;
            self.index = -1;
            self.left = Position(0.0);
            self.right = Position(0.0);
            return false;
        }

        let target = target as usize;
        let x = self.ts.breakpoints[target + 1];
        let mut j = self.insertion_cursor;
        while j > 0 && edges[insertion[j - 1].0 as usize].left == x {
            j -= 1;
        }
        self.out = EdgeRange {
            start: j,
            stop: self.insertion_cursor,
            descending: true,
            order: EdgeOrder::Insertion,
        };
        self.insertion_cursor = j;

        let mut k = self.removal_cursor;
        while k > 0 && edges[removal[k - 1].0 as usize].right == x {
            k -= 1;
        }
        self.in_ = EdgeRange {
            start: k,
            stop: self.removal_cursor,
            descending: true,
            order: EdgeOrder::Removal,
        };
        self.removal_cursor = k;

        self.index = target as i64;
        self.left = self.ts.breakpoints[target];
        self.right = x;
        true
    }

    /// Jump forwards to tree `index`.
    ///
    /// The target must not precede the current tree.  The out
    /// range may contain edges that are not part of the current
    /// tree, and the in range may contain edges that do not
    /// reach the target interval; consumers must filter both
    /// (an edge belongs in the target tree when
    /// `left <= x < right` for the target's left bound `x`).
    pub fn seek_forward(&mut self, index: usize) {
        debug_assert!(index < self.num_trees());
        debug_assert!(self.index <= index as i64);
        let edges = self.ts.tables.edges();
        let insertion = self.order_slice(EdgeOrder::Insertion);
        let removal = self.order_slice(EdgeOrder::Removal);

        if self.index == -1 {
            self.insertion_cursor = 0;
            self.removal_cursor = 0;
        }

        let x = self.ts.breakpoints[index];
        let o2 = self.removal_cursor
            + removal[self.removal_cursor..]
                .partition_point(|e| edges[e.0 as usize].right <= x);
        self.out = EdgeRange {
            start: self.removal_cursor,
            stop: o2,
            descending: false,
            order: EdgeOrder::Removal,
        };
        self.removal_cursor = o2;

        let i2 = self.insertion_cursor
            + insertion[self.insertion_cursor..]
                .partition_point(|e| edges[e.0 as usize].left <= x);
        self.in_ = EdgeRange {
            start: self.insertion_cursor,
            stop: i2,
            descending: false,
            order: EdgeOrder::Insertion,
        };
        self.insertion_cursor = i2;

        self.index = index as i64;
        self.left = x;
        self.right = self.ts.breakpoints[index + 1];
    }

    /// Jump backwards to tree `index`.
    ///
    /// The target must not follow the current tree.  The same
    /// filtering contract as [`TreePosition::seek_forward`]
    /// applies.
    pub fn seek_backward(&mut self, index: usize) {
        debug_assert!(index < self.num_trees());
        debug_assert!(self.index < 0 || self.index >= index as i64);
        let edges = self.ts.tables.edges();
        let insertion = self.order_slice(EdgeOrder::Insertion);
        let removal = self.order_slice(EdgeOrder::Removal);

        if self.index == -1 {
            self.insertion_cursor = insertion.len();
            self.removal_cursor = removal.len();
        }

        let x = self.ts.breakpoints[index];
        let j = insertion[..self.insertion_cursor]
            .partition_point(|e| edges[e.0 as usize].left <= x);
        self.out = EdgeRange {
            start: j,
            stop: self.insertion_cursor,
            descending: true,
            order: EdgeOrder::Insertion,
        };
        self.insertion_cursor = j;

        let k = removal[..self.removal_cursor]
            .partition_point(|e| edges[e.0 as usize].right <= x);
        self.in_ = EdgeRange {
            start: k,
            stop: self.removal_cursor,
            descending: true,
            order: EdgeOrder::Removal,
        };
        self.removal_cursor = k;

        self.index = index as i64;
        self.left = x;
        self.right = self.ts.breakpoints[index + 1];
    }
}

#[cfg(test)]
mod test_tree_position {
    use super::*;
    use crate::prelude::*;

    fn two_tree_treeseq() -> TreeSequence {
        let mut tables = TableCollection::new(1000.0).unwrap();
        tables.add_node(2.0, 0).unwrap();
        tables.add_node(1.0, 0).unwrap();
        for _ in 0..4 {
            tables.add_sample_node(0.0).unwrap();
        }
        tables.add_edge(500.0, 1000.0, 0, 1).unwrap();
        tables.add_edge(0.0, 500.0, 0, 2).unwrap();
        tables.add_edge(0.0, 1000.0, 0, 3).unwrap();
        tables.add_edge(500.0, 1000.0, 1, 2).unwrap();
        tables.add_edge(0.0, 1000.0, 1, 4).unwrap();
        tables.add_edge(0.0, 1000.0, 1, 5).unwrap();
        tables.sort_tables(TableSortingFlags::default());
        tables.build_index(IndexTablesFlags::empty()).unwrap();
        TreeSequence::new(tables, TreeSequenceFlags::empty()).unwrap()
    }

    fn edge_set(ts: &TreeSequence, pos: &TreePosition, range: EdgeRange) -> Vec<(i32, i32)> {
        let mut v: Vec<(i32, i32)> = pos
            .edges(range)
            .map(|e| {
                let edge = ts.tables_ref().edge(e);
                (edge.parent.into(), edge.child.into())
            })
            .collect();
        v.sort();
        v
    }

    #[test]
    fn test_forward_transitions() {
        let ts = two_tree_treeseq();
        let mut pos = TreePosition::new(&ts);

        assert!(pos.next());
        assert_eq!(pos.index(), Some(0));
        assert_eq!(pos.interval(), (Position(0.0), Position(500.0)));
        assert!(pos.out_range().is_empty());
        assert_eq!(
            edge_set(&ts, &pos, pos.in_range()),
            vec![(0, 2), (0, 3), (1, 4), (1, 5)]
        );

        assert!(pos.next());
        assert_eq!(pos.index(), Some(1));
        assert_eq!(pos.interval(), (Position(500.0), Position(1000.0)));
        assert_eq!(edge_set(&ts, &pos, pos.out_range()), vec![(0, 2)]);
        assert_eq!(edge_set(&ts, &pos, pos.in_range()), vec![(0, 1), (1, 2)]);

        assert!(!pos.next());
        assert_eq!(pos.index(), None);
        assert_eq!(edge_set(&ts, &pos, pos.out_range()).len(), 5);
    }

    #[test]
    fn test_backward_transitions() {
        let ts = two_tree_treeseq();
        let mut pos = TreePosition::new(&ts);

        assert!(pos.prev());
        assert_eq!(pos.index(), Some(1));
        assert_eq!(pos.interval(), (Position(500.0), Position(1000.0)));
        assert!(pos.out_range().is_empty());
        assert_eq!(pos.in_range().len(), 5);

        assert!(pos.prev());
        assert_eq!(pos.index(), Some(0));
        assert_eq!(edge_set(&ts, &pos, pos.out_range()), vec![(0, 1), (1, 2)]);
        assert_eq!(edge_set(&ts, &pos, pos.in_range()), vec![(0, 2)]);

        assert!(!pos.prev());
        assert_eq!(pos.index(), None);
    }

    #[test]
    fn test_forward_backward_round_trip() {
        let ts = two_tree_treeseq();
        let mut pos = TreePosition::new(&ts);
        assert!(pos.next());
        assert!(pos.next());
        assert!(pos.prev());
        assert_eq!(pos.index(), Some(0));
        assert_eq!(pos.interval(), (Position(0.0), Position(500.0)));
        // stepping forward again emits the same transition as before
        assert!(pos.next());
        assert_eq!(edge_set(&ts, &pos, pos.out_range()), vec![(0, 2)]);
        assert_eq!(edge_set(&ts, &pos, pos.in_range()), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_seek_forward_from_null() {
        let ts = two_tree_treeseq();
        let mut pos = TreePosition::new(&ts);
        pos.seek_forward(1);
        assert_eq!(pos.index(), Some(1));
        assert_eq!(pos.interval(), (Position(500.0), Position(1000.0)));
        // all edges covering position 500 are in the in range
        let in_edges = edge_set(&ts, &pos, pos.in_range());
        for e in [(0, 1), (0, 3), (1, 2), (1, 4), (1, 5)] {
            assert!(in_edges.contains(&e));
        }
    }

    #[test]
    fn test_seek_backward_from_null() {
        let ts = two_tree_treeseq();
        let mut pos = TreePosition::new(&ts);
        pos.seek_backward(0);
        assert_eq!(pos.index(), Some(0));
        let in_edges = edge_set(&ts, &pos, pos.in_range());
        for e in [(0, 2), (0, 3), (1, 4), (1, 5)] {
            assert!(in_edges.contains(&e));
        }
    }
}
