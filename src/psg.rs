//! Pointer-state graphs.
//!
//! A [`Psg`] models one connected region of the points-to universe. Node `0`
//! is the `null` sentinel; every other node is either a *pointer variable*
//! (a source-level name) or an allocated *cell* with up to two outgoing
//! fields. Edges are stored as rows of a [`BitSet`]:
//!
//! - `next[i]` / `prev[i]`: the (at most one) target of node `i` on that field;
//! - `incoming[i]`: every node with an edge into `i`, the transpose of the two
//!   outgoing relations;
//! - `fictitious`: the sentinel's synthetic edges to pointer variables of
//!   saturated components (see [`fix_well_formedness`][Psg::fix_well_formedness]).
//!
//! Node indices are dense: deleting node `k` renumbers every node above it
//! down by one and rewrites every row accordingly.

use std::fmt;

use log::debug;

use crate::bitset::BitSet;
use crate::error::{Error, Result};
use crate::layout::Field;

/// Index of the `null` sentinel.
pub const NULL: usize = 0;

/// Name carried by the sentinel node.
pub const NULL_NAME: &str = "NULL";

#[derive(Debug, Clone)]
pub struct Psg {
    names: Vec<String>,
    next: Vec<BitSet>,
    prev: Vec<BitSet>,
    incoming: Vec<BitSet>,
    pointers: BitSet,
    pub(crate) fictitious: BitSet,
    arity: usize,
}

/// Outcome of [`Psg::free_cell`].
#[derive(Debug, Clone)]
pub struct Freed {
    /// Name of the released cell.
    pub cell: String,
    /// The freeing pointer variable, removed together with the cell.
    pub released: Option<String>,
    /// Pointer variables left pointing at the released cell, each relocated
    /// into its own singleton graph with no outgoing edge.
    pub dangling: Vec<Psg>,
}

impl Psg {
    /// Creates an empty graph (only the sentinel) for a structure with
    /// `arity` pointer fields.
    ///
    /// # Panics
    ///
    /// Panics if `arity` is not 1 or 2.
    pub fn new(arity: usize) -> Self {
        assert!((1..=2).contains(&arity), "Arity must be 1 or 2, got {}", arity);
        Self {
            names: vec![NULL_NAME.to_string()],
            next: vec![BitSet::empty()],
            prev: vec![BitSet::empty()],
            incoming: vec![BitSet::empty()],
            pointers: BitSet::empty(),
            fictitious: BitSet::empty(),
            arity,
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Fields modeled by this graph.
    pub fn fields(&self) -> &'static [Field] {
        &Field::ALL[..self.arity]
    }

    /// Number of nodes, not counting the sentinel.
    pub fn node_count(&self) -> usize {
        self.names.len() - 1
    }

    /// Returns true if the graph has no nodes beyond the sentinel.
    pub fn is_empty(&self) -> bool {
        self.node_count() == 0
    }

    pub fn name(&self, node: usize) -> &str {
        &self.names[node]
    }

    /// Node names in index order, starting with the sentinel.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Looks up a non-sentinel node by name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().skip(1).position(|n| n == name).map(|i| i + 1)
    }

    pub fn is_pointer(&self, node: usize) -> bool {
        self.pointers.contains(node)
    }

    /// Returns true for heap cells (neither the sentinel nor a pointer variable).
    pub fn is_cell(&self, node: usize) -> bool {
        node != NULL && node < self.names.len() && !self.is_pointer(node)
    }

    /// Indices of all pointer-variable nodes.
    pub fn pointers(&self) -> impl Iterator<Item = usize> + '_ {
        self.pointers.iter()
    }

    pub fn has_fictitious_edge(&self, node: usize) -> bool {
        self.fictitious.contains(node)
    }

    /// Outgoing row of `node` on `field`.
    pub fn outgoing(&self, node: usize, field: Field) -> &BitSet {
        match field {
            Field::Next => &self.next[node],
            Field::Prev => &self.prev[node],
        }
    }

    fn outgoing_mut(&mut self, node: usize, field: Field) -> &mut BitSet {
        match field {
            Field::Next => &mut self.next[node],
            Field::Prev => &mut self.prev[node],
        }
    }

    /// Incoming row of `node`: every node with an edge into it.
    pub fn incoming(&self, node: usize) -> &BitSet {
        &self.incoming[node]
    }

    /// Target of the outgoing edge of `node` on `field`, if any.
    pub fn target(&self, node: usize, field: Field) -> Option<usize> {
        self.outgoing(node, field).first()
    }

    /// Appends a node and returns its index.
    pub(crate) fn add_node(&mut self, name: &str, pointer: bool) -> usize {
        let index = self.names.len();
        self.names.push(name.to_string());
        self.next.push(BitSet::empty());
        self.prev.push(BitSet::empty());
        self.incoming.push(BitSet::empty());
        if pointer {
            self.pointers.insert(index);
        }
        index
    }

    /// Removes the edge of `from` on `field`, keeping `incoming` in sync.
    /// Returns the old target.
    fn clear_edge(&mut self, from: usize, field: Field) -> Option<usize> {
        let old = self.target(from, field);
        self.outgoing_mut(from, field).clear();
        if let Some(old) = old {
            let other_field_hits = Field::ALL
                .iter()
                .filter(|&&f| f != field)
                .any(|&f| self.outgoing(from, f).contains(old));
            if !other_field_hits {
                self.incoming[old].remove(from);
            }
        }
        old
    }

    /// Installs the edge `from --field--> to`, replacing any previous one.
    pub(crate) fn set_edge(&mut self, from: usize, field: Field, to: usize) {
        self.clear_edge(from, field);
        self.outgoing_mut(from, field).insert(to);
        self.incoming[to].insert(from);
    }

    /// Inserts a new pointer variable with no outgoing edges.
    pub fn declare_variable(&mut self, name: &str) -> usize {
        debug!("declare_variable({})", name);
        self.add_node(name, true)
    }

    /// Inserts a new cell and makes it the target of `from` on `field`.
    pub fn allocate_and_link(&mut self, name: &str, from: usize, field: Field) -> usize {
        debug!("allocate_and_link({}, from = {}, {})", name, from, field);
        let cell = self.add_node(name, false);
        self.set_edge(from, field, cell);
        cell
    }

    /// Points `node` on `field` at the sentinel.
    pub fn link_to_null(&mut self, node: usize, field: Field) {
        debug!("link_to_null({}, {})", node, field);
        self.set_edge(node, field, NULL);
    }

    /// Copies the value of `src` (its `next` edge) onto `dst`'s `field`.
    pub fn redirect(&mut self, src: usize, dst: usize, field: Field) {
        self.copy_edge(src, Field::Next, dst, field);
    }

    /// Makes `dst --dst_field-->` point wherever `src --src_field-->` points.
    ///
    /// The previous edge of `dst` is severed first. If `src` has no edge on
    /// `src_field`, `dst` is left without one.
    pub fn copy_edge(&mut self, src: usize, src_field: Field, dst: usize, dst_field: Field) {
        debug!("copy_edge({}.{} -> {}.{})", src, src_field, dst, dst_field);
        let target = self.target(src, src_field);
        self.clear_edge(dst, dst_field);
        if let Some(target) = target {
            self.set_edge(dst, dst_field, target);
        }
    }

    /// Inserts a new pointer variable whose value is `existing`'s edge on `field`.
    pub fn add_alias(&mut self, existing: usize, name: &str, field: Field) -> usize {
        debug!("add_alias({}, {}, {})", existing, name, field);
        let target = self.target(existing, field);
        let alias = self.add_node(name, true);
        if let Some(target) = target {
            self.set_edge(alias, Field::Next, target);
        }
        alias
    }

    /// Deletes the node with the given name. Returns false if there is none.
    pub fn delete_node(&mut self, name: &str) -> bool {
        match self.find(name) {
            Some(node) => {
                self.remove_node(node);
                true
            }
            None => false,
        }
    }

    /// Deletes node `node` and renumbers every node above it down by one.
    ///
    /// Edges into the deleted node vanish, leaving their sources without an
    /// edge on that field.
    pub fn remove_node(&mut self, node: usize) {
        assert_ne!(node, NULL, "The sentinel cannot be removed");
        debug!("remove_node({} = {})", node, self.names[node]);

        self.names.remove(node);
        self.next.remove(node);
        self.prev.remove(node);
        self.incoming.remove(node);
        for row in self.next.iter_mut().chain(&mut self.prev).chain(&mut self.incoming) {
            row.remove_index(node);
        }
        self.pointers.remove_index(node);
        self.fictitious.remove_index(node);
    }

    /// Deletes every node in `set`, highest index first.
    pub(crate) fn remove_nodes(&mut self, set: &BitSet) {
        let doomed: Vec<usize> = set.iter().filter(|&i| i != NULL).collect();
        for &node in doomed.iter().rev() {
            self.remove_node(node);
        }
    }

    /// Releases the cell that `at` points to on `field`.
    ///
    /// Every *other* pointer variable whose value is that cell becomes dangling:
    /// it is moved into a fresh singleton graph with no outgoing edge. The cell,
    /// the dangling variables, and `at` itself (when it is a pointer variable)
    /// are then deleted from this graph.
    ///
    /// Returns `None` if `at` has no cell behind `field` (null or dangling).
    pub fn free_cell(&mut self, at: usize, field: Field) -> Option<Freed> {
        let cell = match self.target(at, field) {
            Some(NULL) | None => return None,
            Some(cell) => cell,
        };
        debug!("free_cell({}, {}) -> cell {} = {}", at, field, cell, self.names[cell]);

        let dangling: Vec<usize> = self.incoming[cell]
            .iter()
            .filter(|&j| j != at && self.is_pointer(j) && self.target(j, Field::Next) == Some(cell))
            .collect();

        let mut doomed = BitSet::new(self.names.len());
        doomed.insert(cell);
        doomed.extend(dangling.iter().copied());
        let released = if self.is_pointer(at) {
            doomed.insert(at);
            Some(self.names[at].clone())
        } else {
            None
        };

        let dangling_graphs = dangling
            .iter()
            .map(|&j| {
                debug!("free_cell: {} is now dangling", self.names[j]);
                let mut single = Psg::new(self.arity);
                single.declare_variable(&self.names[j]);
                single
            })
            .collect();

        let freed = Freed {
            cell: self.names[cell].clone(),
            released,
            dangling: dangling_graphs,
        };
        self.remove_nodes(&doomed);
        Some(freed)
    }

    /// True iff `node` has no outgoing edge at all on `field`.
    pub fn is_dangling(&self, node: usize, field: Field) -> bool {
        self.outgoing(node, field).is_empty()
    }

    /// True iff the only outgoing edge of `node` on `field` is the sentinel.
    pub fn points_at_null(&self, node: usize, field: Field) -> bool {
        let row = self.outgoing(node, field);
        row.contains(NULL) && row.weight() == 1
    }

    /// Clears the edge of `node` on `field` without linking it anywhere.
    pub fn mark_dangling(&mut self, node: usize, field: Field) {
        debug!("mark_dangling({}, {})", node, field);
        self.clear_edge(node, field);
    }

    fn violation(&self, reason: String) -> Error {
        Error::InvariantViolation {
            reason,
            dump: self.to_string(),
        }
    }

    /// Verifies the structural invariants of the graph.
    ///
    /// Checked: row counts match the node count, the sentinel has no real
    /// outgoing edge, every other node has at most one edge per field (and
    /// none on `prev` in a singly-linked graph), `incoming` is exactly the
    /// transpose of `next ∪ prev`, and fictitious edges only reach pointer
    /// variables.
    pub fn check_invariants(&self) -> Result<()> {
        let n = self.names.len();
        if self.next.len() != n || self.prev.len() != n || self.incoming.len() != n {
            return Err(self.violation(format!("row count mismatch for {} nodes", n)));
        }
        if self.pointers.contains(NULL) || self.fictitious.contains(NULL) {
            return Err(self.violation("sentinel marked as pointer variable".to_string()));
        }

        let mut expected = vec![BitSet::empty(); n];
        for j in 0..n {
            for field in Field::ALL {
                let row = self.outgoing(j, field);
                if j == NULL && row.any() {
                    return Err(self.violation(format!("sentinel has a {} edge", field)));
                }
                if field == Field::Prev && self.arity == 1 && row.any() {
                    return Err(self.violation(format!("node {} has a prev edge in a singly-linked graph", j)));
                }
                if row.weight() > 1 {
                    return Err(self.violation(format!("node {} has {} edges on {}", j, row.weight(), field)));
                }
                if let Some(i) = row.first() {
                    if i >= n {
                        return Err(self.violation(format!("node {} points past the end ({})", j, i)));
                    }
                    expected[i].insert(j);
                }
            }
        }
        for (i, row) in expected.iter().enumerate() {
            if !row.iter().eq(self.incoming[i].iter()) {
                return Err(self.violation(format!("incoming row of node {} is not the transpose", i)));
            }
        }

        for p in self.fictitious.iter() {
            if !self.is_pointer(p) {
                return Err(self.violation(format!("fictitious edge into non-pointer node {}", p)));
            }
        }
        for (i, name) in self.names.iter().enumerate().skip(1) {
            if self.find(name) != Some(i) {
                return Err(self.violation(format!("duplicate node name '{}'", name)));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Psg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |row: &BitSet| match row.first() {
            Some(t) => t.to_string(),
            None => "-".to_string(),
        };
        writeln!(f, "PSG (arity {}, {} nodes):", self.arity, self.node_count())?;
        for (i, name) in self.names.iter().enumerate() {
            let kind = if i == NULL {
                " "
            } else if self.is_pointer(i) {
                "*"
            } else {
                "@"
            };
            write!(f, "  {:>3} {}{}", i, kind, name)?;
            if i == NULL {
                let fict: Vec<_> = self.fictitious.iter().collect();
                write!(f, " fictitious={:?}", fict)?;
            } else {
                write!(f, " next={}", show(&self.next[i]))?;
                if self.arity == 2 {
                    write!(f, " prev={}", show(&self.prev[i]))?;
                }
            }
            let inc: Vec<_> = self.incoming[i].iter().collect();
            writeln!(f, " in={:?}", inc)?;
        }
        Ok(())
    }
}
