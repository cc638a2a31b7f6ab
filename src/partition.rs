//! Reachability partitioning of pointer-state graphs.
//!
//! After every structural edit the graph is re-partitioned into *independent
//! components*: maximal sets of nodes reachable from pointer variables whose
//! walks overlap. A graph holding more than one component is split by
//! [`divide`][Psg::divide]; an edit that crosses two graphs joins them with
//! [`merge`][Psg::merge].
//!
//! The sentinel is shared by every region, so walks stop at it and it never
//! belongs to a component.

use log::{debug, trace};

use crate::bitset::BitSet;
use crate::layout::Field;
use crate::psg::{Psg, NULL};

impl Psg {
    /// Depth-first walk along both outgoing fields starting at `start`.
    ///
    /// A step never goes straight back along the edge it just arrived by, and
    /// the `prev` field is only followed when it leads somewhere other than
    /// `next`.
    pub fn reachable_from(&self, start: usize) -> BitSet {
        let mut visited = BitSet::new(self.names().len());
        let mut stack = vec![(start, None)];

        while let Some((node, from)) = stack.pop() {
            if node == NULL || !visited.insert(node) {
                continue;
            }
            trace!("reachable_from({}): visit {}", start, node);

            let next = self.target(node, Field::Next);
            if let Some(n) = next {
                if Some(n) != from {
                    stack.push((n, Some(node)));
                }
            }
            if self.arity() == 2 {
                let prev = self.target(node, Field::Prev);
                if let Some(p) = prev {
                    if prev != next && Some(p) != from {
                        stack.push((p, Some(node)));
                    }
                }
            }
        }

        visited
    }

    /// Maximal independent components: walks from every pointer variable,
    /// unioned pairwise while any two share a node.
    pub fn components(&self) -> Vec<BitSet> {
        let mut components: Vec<BitSet> = self.pointers().map(|p| self.reachable_from(p)).collect();

        'fixpoint: loop {
            for i in 0..components.len() {
                for j in i + 1..components.len() {
                    if components[i].intersects(&components[j]) {
                        let other = components.remove(j);
                        components[i] |= &other;
                        continue 'fixpoint;
                    }
                }
            }
            break;
        }

        components
    }

    /// A component is saturated when every cell in it has an edge on every field.
    pub fn is_saturated(&self, component: &BitSet) -> bool {
        component
            .iter()
            .filter(|&i| self.is_cell(i))
            .all(|i| self.fields().iter().all(|&f| self.target(i, f).is_some()))
    }

    /// Installs (saturated) or removes (open) the fictitious edges from the
    /// sentinel to the pointer variables of `component`.
    pub fn fix_well_formedness(&mut self, component: &BitSet) {
        let saturated = self.is_saturated(component);
        let pointers: Vec<usize> = component.iter().filter(|&i| self.is_pointer(i)).collect();
        debug!("fix_well_formedness({:?}): saturated = {}", pointers, saturated);
        for p in pointers {
            if saturated {
                self.fictitious.insert(p);
            } else {
                self.fictitious.remove(p);
            }
        }
    }

    /// Re-derives the fictitious edges of every component.
    pub fn refresh_well_formedness(&mut self) {
        for component in self.components() {
            self.fix_well_formedness(&component);
        }
    }

    /// Appends copies of the nodes of `src` selected by `set`, rewiring the
    /// edges among them. Edges to the sentinel are kept; edges leaving `set`
    /// are dropped. Returns the old-to-new index map.
    fn import_nodes(&mut self, src: &Psg, set: &BitSet) -> Vec<Option<usize>> {
        let mut map = vec![None; src.names().len()];
        map[NULL] = Some(NULL);
        for old in set.iter().filter(|&i| i != NULL) {
            map[old] = Some(self.add_node(src.name(old), src.is_pointer(old)));
        }
        for old in set.iter().filter(|&i| i != NULL) {
            let new = map[old].unwrap_or(NULL);
            for &field in src.fields() {
                if let Some(Some(t)) = src.target(old, field).map(|t| map[t]) {
                    self.set_edge(new, field, t);
                }
            }
        }
        map
    }

    /// Splits off the smallest independent component into a new graph.
    ///
    /// Only one component is peeled per call; the remaining ones stay together
    /// until a later edit divides them. Returns `None` (after refreshing the
    /// fictitious edges) when the graph holds at most one component.
    pub fn divide(&mut self) -> Option<Psg> {
        let components = self.components();
        if components.len() < 2 {
            self.refresh_well_formedness();
            return None;
        }

        let smallest = components.iter().min_by_key(|c| c.weight())?.clone();
        debug!(
            "divide: {} components, moving {:?}",
            components.len(),
            smallest.iter().map(|i| self.name(i)).collect::<Vec<_>>()
        );

        let mut part = Psg::new(self.arity());
        part.import_nodes(self, &smallest);
        self.remove_nodes(&smallest);

        part.refresh_well_formedness();
        self.refresh_well_formedness();
        Some(part)
    }

    /// Joins `other` into `self` and installs `at --field--> into`.
    ///
    /// Every node of `other` reachable from its pointer variables (and from
    /// `into`) is copied into `self` under fresh indices and deleted from
    /// `other`. `into` is given in `other`'s indexing. Returns the new index
    /// of `into`.
    pub fn merge(&mut self, other: &mut Psg, at: usize, into: usize, field: Field) -> usize {
        debug!("merge(at = {}, into = {} = {}, {})", at, into, other.name(into), field);

        let mut set = other.reachable_from(into);
        for p in other.pointers().collect::<Vec<_>>() {
            set |= &other.reachable_from(p);
        }

        let map = self.import_nodes(other, &set);
        other.remove_nodes(&set);

        let into = map[into].unwrap_or(NULL);
        self.set_edge(at, field, into);

        other.refresh_well_formedness();
        self.refresh_well_formedness();
        into
    }
}
