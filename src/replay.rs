//! Trace replay over a collection of pointer-state graphs.
//!
//! The [`Replayer`] owns every live [`Psg`] and applies decoded [`Event`]s
//! strictly in order. After each structural edit the touched graphs are
//! divided (one component peeled per graph), fictitious edges are re-derived,
//! empty graphs are dropped, and (by default) every graph is checked for
//! consistency. [`Replayer::analyze`] then encodes, solves and diagnoses each
//! graph independently.

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::{debug, warn};
use num_bigint::BigUint;

use crate::cnf::Cnf;
use crate::diagnostics::{diagnose, Finding};
use crate::error::{Error, Result};
use crate::layout::{Field, Layout};
use crate::psg::{Psg, NULL};
use crate::sat::Dpll;
use crate::trace::{Event, Op, TraceId, Value};

/// Replay and analysis settings.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Check every graph's invariants after each step (default: true).
    pub check_invariants: bool,
    /// Case-split recursion cap for the solver (default: 10 000).
    pub max_solver_depth: usize,
    /// Discard graphs left with no nodes beyond the sentinel (default: true).
    pub drop_empty: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            check_invariants: true,
            max_solver_depth: 10_000,
            drop_empty: true,
        }
    }
}

/// What a pointer location held when a check event inspected it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PointerState {
    Null,
    Dangling,
    Target(String),
}

impl fmt::Display for PointerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointerState::Null => write!(f, "null"),
            PointerState::Dangling => write!(f, "dangling"),
            PointerState::Target(name) => write!(f, "target {}", name),
        }
    }
}

/// Result of a null-check or dangling-check event.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Observation {
    pub id: TraceId,
    pub op: Op,
    pub location: String,
    pub state: PointerState,
}

/// Analysis result for one graph.
#[derive(Debug, Clone)]
pub struct GraphReport {
    /// Node names, sentinel excluded.
    pub nodes: Vec<String>,
    pub satisfiable: bool,
    /// Every pointer variable of the graph carries a fictitious edge.
    pub saturated: bool,
    /// Number of satisfying assignments of the encoded formula.
    pub models: BigUint,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub graphs: Vec<GraphReport>,
    /// Check events that found a dangling pointer.
    pub dangling_uses: Vec<Observation>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, graph) in self.graphs.iter().enumerate() {
            writeln!(
                f,
                "graph {} {:?}: {}{}, {} models",
                i,
                graph.nodes,
                if graph.satisfiable { "SAT" } else { "UNSAT" },
                if graph.saturated { ", saturated" } else { "" },
                graph.models
            )?;
            for finding in &graph.findings {
                writeln!(f, "  {}", finding)?;
            }
        }
        for obs in &self.dangling_uses {
            writeln!(f, "event {}: {} is dangling", obs.id, obs.location)?;
        }
        Ok(())
    }
}

/// Where an assigned value comes from.
#[derive(Debug, Clone, Copy)]
enum Source {
    Null,
    Alloc,
    /// The edge of `holder` on `field` in graph `graph`.
    Edge { graph: usize, holder: usize, field: Field },
}

/// Two distinct elements of a slice, mutably.
fn pair_mut(graphs: &mut [Psg], a: usize, b: usize) -> (&mut Psg, &mut Psg) {
    assert_ne!(a, b);
    if a < b {
        let (lo, hi) = graphs.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = graphs.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

#[derive(Debug, Clone)]
pub struct Replayer {
    layout: Layout,
    graphs: Vec<Psg>,
    ids: HashMap<String, TraceId>,
    observations: Vec<Observation>,
    config: ReplayConfig,
}

impl Replayer {
    pub fn new(layout: Layout) -> Self {
        Self::with_config(layout, ReplayConfig::default())
    }

    pub fn with_config(layout: Layout, config: ReplayConfig) -> Self {
        Self {
            layout,
            graphs: Vec::new(),
            ids: HashMap::new(),
            observations: Vec::new(),
            config,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn graphs(&self) -> &[Psg] {
        &self.graphs
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Most recent event that established or observed `name`.
    pub fn trace_id(&self, name: &str) -> Option<TraceId> {
        self.ids.get(name).copied()
    }

    /// Graph index and node index of the node called `name`.
    pub fn locate(&self, name: &str) -> Option<(usize, usize)> {
        self.graphs
            .iter()
            .enumerate()
            .find_map(|(g, psg)| psg.find(name).map(|n| (g, n)))
    }

    /// The graph holding `name`, if any.
    pub fn graph_of(&self, name: &str) -> Option<&Psg> {
        self.locate(name).map(|(g, _)| &self.graphs[g])
    }

    /// Replays a whole sequence of events.
    pub fn replay<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) -> Result<()> {
        for event in events {
            self.step(event)?;
        }
        Ok(())
    }

    /// Applies one event.
    ///
    /// A failing step may leave the graphs half-edited; the replay must then
    /// be abandoned.
    pub fn step(&mut self, event: &Event) -> Result<()> {
        debug!("step: {}", event);
        let touched = match (event.op, &event.value) {
            (Some(Op::Free), _) => self.replay_free(event)?,
            (Some(op), _) => {
                self.replay_check(event, op)?;
                Vec::new()
            }
            (None, None) => self.replay_declare(event)?,
            (None, Some(value)) => self.replay_assign(event, value)?,
        };
        self.touch(&event.name, event.id);
        self.settle(touched)
    }

    fn touch(&mut self, name: &str, id: TraceId) {
        self.ids.insert(name.to_string(), id);
    }

    fn unresolved(event: &Event, name: &str, field: Option<&str>) -> Error {
        Error::UnresolvedReference {
            id: event.id,
            name: name.to_string(),
            field: field.map(str::to_string),
        }
    }

    fn resolve_var(&self, event: &Event, name: &str) -> Result<(usize, usize)> {
        self.locate(name).ok_or_else(|| Self::unresolved(event, name, None))
    }

    /// Resolves `name->field` to the cell `name` points at and the selected field.
    fn deref(&self, event: &Event, name: &str, field: &str) -> Result<(usize, usize, Field)> {
        let unresolved = || Self::unresolved(event, name, Some(field));
        let field = self.layout.resolve(field).ok_or_else(unresolved)?;
        let (g, p) = self.resolve_var(event, name)?;
        match self.graphs[g].target(p, Field::Next) {
            Some(cell) if cell != NULL => Ok((g, cell, field)),
            _ => Err(unresolved()),
        }
    }

    /// Resolves the location an event reads or writes, without creating it.
    fn resolve_location(&self, event: &Event) -> Result<(usize, usize, Field)> {
        match &event.field {
            None => {
                let (g, p) = self.resolve_var(event, &event.name)?;
                Ok((g, p, Field::Next))
            }
            Some(field) => self.deref(event, &event.name, field),
        }
    }

    fn resolve_source(&mut self, event: &Event, value: &Value) -> Result<Source> {
        let source = match value {
            Value::Null => Source::Null,
            Value::Alloc => Source::Alloc,
            Value::Var(name) => {
                let (graph, holder) = self.resolve_var(event, name)?;
                self.touch(name, event.id);
                Source::Edge {
                    graph,
                    holder,
                    field: Field::Next,
                }
            }
            Value::Field { name, field } => {
                let (graph, holder, field) = self.deref(event, name, field)?;
                let cell = self.graphs[graph].name(holder).to_string();
                self.touch(name, event.id);
                self.touch(&cell, event.id);
                Source::Edge { graph, holder, field }
            }
        };
        Ok(source)
    }

    fn new_variable(&mut self, name: &str) -> (usize, usize) {
        let mut psg = Psg::new(self.layout.arity());
        let node = psg.declare_variable(name);
        self.graphs.push(psg);
        (self.graphs.len() - 1, node)
    }

    fn replay_declare(&mut self, event: &Event) -> Result<Vec<usize>> {
        if let Some(field) = &event.field {
            return Err(Self::unresolved(event, &event.name, Some(field)));
        }
        if self.locate(&event.name).is_some() {
            // Re-declaration only refreshes the trace id.
            return Ok(Vec::new());
        }
        let (g, _) = self.new_variable(&event.name);
        Ok(vec![g])
    }

    fn replay_assign(&mut self, event: &Event, value: &Value) -> Result<Vec<usize>> {
        // The source is read before the destination is touched, so `p = p->next` sees the old `p`.
        let source = self.resolve_source(event, value)?;

        let (g, node, field) = match &event.field {
            None => match self.locate(&event.name) {
                Some((g, p)) => (g, p, Field::Next),
                None => {
                    if let Source::Edge { graph, holder, field } = source {
                        self.graphs[graph].add_alias(holder, &event.name, field);
                        return Ok(vec![graph]);
                    }
                    let (g, p) = self.new_variable(&event.name);
                    (g, p, Field::Next)
                }
            },
            Some(field) => {
                let (g, cell, field) = self.deref(event, &event.name, field)?;
                let cell_name = self.graphs[g].name(cell).to_string();
                self.touch(&cell_name, event.id);
                (g, cell, field)
            }
        };

        match source {
            Source::Null => {
                self.graphs[g].link_to_null(node, field);
                Ok(vec![g])
            }
            Source::Alloc => {
                let cell_name = format!("{}@{}", event.location(), event.id);
                self.graphs[g].allocate_and_link(&cell_name, node, field);
                self.touch(&cell_name, event.id);
                Ok(vec![g])
            }
            Source::Edge {
                graph,
                holder,
                field: src_field,
            } => {
                if graph == g {
                    self.graphs[g].copy_edge(holder, src_field, node, field);
                    return Ok(vec![g]);
                }
                match self.graphs[graph].target(holder, src_field) {
                    None => {
                        self.graphs[g].mark_dangling(node, field);
                        Ok(vec![g])
                    }
                    Some(NULL) => {
                        self.graphs[g].link_to_null(node, field);
                        Ok(vec![g])
                    }
                    Some(into) => {
                        let (dst, src) = pair_mut(&mut self.graphs, g, graph);
                        dst.merge(src, node, into, field);
                        Ok(vec![g, graph])
                    }
                }
            }
        }
    }

    fn replay_free(&mut self, event: &Event) -> Result<Vec<usize>> {
        let (g, at, field) = self.resolve_location(event)?;
        let freed = match self.graphs[g].free_cell(at, field) {
            Some(freed) => freed,
            None => {
                warn!("event {}: free({}) does not release any cell", event.id, event.location());
                return Ok(Vec::new());
            }
        };

        self.touch(&freed.cell, event.id);
        if let Some(released) = &freed.released {
            self.touch(released, event.id);
        }
        let mut touched = vec![g];
        for single in freed.dangling {
            for name in single.names().iter().skip(1) {
                debug!("event {}: {} left dangling", event.id, name);
                self.ids.insert(name.clone(), event.id);
            }
            self.graphs.push(single);
            touched.push(self.graphs.len() - 1);
        }
        Ok(touched)
    }

    fn replay_check(&mut self, event: &Event, op: Op) -> Result<()> {
        let (g, node, field) = self.resolve_location(event)?;
        let psg = &self.graphs[g];
        let state = if psg.is_dangling(node, field) {
            PointerState::Dangling
        } else if psg.points_at_null(node, field) {
            PointerState::Null
        } else {
            match psg.target(node, field) {
                Some(t) => PointerState::Target(psg.name(t).to_string()),
                None => PointerState::Dangling,
            }
        };
        if state == PointerState::Dangling {
            warn!("event {}: {} is dangling", event.id, event.location());
        }
        self.observations.push(Observation {
            id: event.id,
            op,
            location: event.location(),
            state,
        });
        Ok(())
    }

    /// Re-partitions the touched graphs and drops empty ones.
    fn settle(&mut self, touched: Vec<usize>) -> Result<()> {
        let mut seen = HashSet::new();
        for g in touched {
            if !seen.insert(g) {
                continue;
            }
            if let Some(part) = self.graphs[g].divide() {
                self.graphs.push(part);
            }
        }
        if self.config.drop_empty {
            self.graphs.retain(|psg| !psg.is_empty());
        }
        if self.config.check_invariants {
            self.check_invariants()?;
        }
        Ok(())
    }

    /// Checks every graph, and that no name lives in two graphs.
    pub fn check_invariants(&self) -> Result<()> {
        let mut owner: HashMap<&str, usize> = HashMap::new();
        for (g, psg) in self.graphs.iter().enumerate() {
            psg.check_invariants()?;
            for name in psg.names().iter().skip(1) {
                if let Some(other) = owner.insert(name, g) {
                    return Err(Error::InvariantViolation {
                        reason: format!("'{}' lives in graphs {} and {}", name, other, g),
                        dump: format!("{}{}", self.graphs[other], psg),
                    });
                }
            }
        }
        Ok(())
    }

    /// Encodes, solves and diagnoses every live graph.
    pub fn analyze(&self) -> Result<Report> {
        let dpll = Dpll::new(self.config.max_solver_depth);
        let mut graphs = Vec::with_capacity(self.graphs.len());
        for psg in &self.graphs {
            let cnf = Cnf::encode(psg);
            let result = dpll.solve(&cnf)?;
            let findings = diagnose(psg, &cnf, &result, &self.ids)?;
            let models = dpll.count_models(&cnf)?;
            let saturated = psg.pointers().all(|p| psg.has_fictitious_edge(p));
            graphs.push(GraphReport {
                nodes: psg.names().iter().skip(1).cloned().collect(),
                satisfiable: result.is_sat(),
                saturated,
                models,
                findings,
            });
        }
        let dangling_uses = self
            .observations
            .iter()
            .filter(|o| o.state == PointerState::Dangling)
            .cloned()
            .collect();
        Ok(Report { graphs, dangling_uses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::diagnostics::Tag;

    fn singly() -> Replayer {
        Replayer::new(Layout::singly("next"))
    }

    #[test]
    fn test_declare_creates_singleton() {
        let mut r = singly();
        r.step(&Event::declare(1, "p")).unwrap();
        assert_eq!(r.graphs().len(), 1);
        let (g, p) = r.locate("p").unwrap();
        assert_eq!((g, p), (0, 1));
        assert!(r.graphs()[0].is_pointer(1));
        assert_eq!(r.trace_id("p"), Some(1));
    }

    #[test]
    fn test_null_assignment() {
        let mut r = singly();
        r.step(&Event::declare(1, "p")).unwrap();
        r.step(&Event::assign(2, "p", Value::Null)).unwrap();
        let psg = r.graph_of("p").unwrap();
        assert!(!psg.is_dangling(1, Field::Next));
        assert!(psg.points_at_null(1, Field::Next));
        assert!(psg.has_fictitious_edge(1));

        let report = r.analyze().unwrap();
        assert_eq!(report.graphs.len(), 1);
        assert!(report.graphs[0].satisfiable);
        assert_eq!(report.graphs[0].findings[0].tag, Tag::AlwaysPresent);
        assert_eq!(report.graphs[0].findings[0].trace_id, Some(2));
    }

    #[test]
    fn test_unresolved_reference() {
        let mut r = singly();
        let err = r.step(&Event::assign(4, "p", Value::var("q"))).unwrap_err();
        assert_eq!(
            err,
            Error::UnresolvedReference {
                id: 4,
                name: "q".to_string(),
                field: None
            }
        );
    }

    #[test]
    fn test_unknown_field_is_unresolved() {
        let mut r = singly();
        r.step(&Event::assign(1, "p", Value::Alloc)).unwrap();
        let err = r.step(&Event::store(2, "p", "prev", Value::Null)).unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { field: Some(_), .. }));
    }

    #[test]
    fn test_deref_null_is_unresolved() {
        let mut r = singly();
        r.step(&Event::assign(1, "p", Value::Null)).unwrap();
        let err = r.step(&Event::store(2, "p", "next", Value::Alloc)).unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { id: 2, .. }));
    }

    #[test]
    fn test_build_list() {
        let mut r = singly();
        r.replay(&[
            Event::assign(1, "head", Value::Alloc),
            Event::store(2, "head", "next", Value::Alloc),
            Event::assign(3, "tail", Value::field("head", "next")),
            Event::store(4, "tail", "next", Value::Null),
        ])
        .unwrap();

        assert_eq!(r.graphs().len(), 1);
        let psg = &r.graphs()[0];
        let tail = psg.find("tail").unwrap();
        let second = psg.target(tail, Field::Next).unwrap();
        assert_eq!(psg.name(second), "head->next@2");
        assert!(psg.points_at_null(second, Field::Next));
        assert!(psg.has_fictitious_edge(tail));
    }

    #[test]
    fn test_reassignment_splits_graph() {
        let mut r = singly();
        r.replay(&[
            Event::assign(1, "p", Value::Alloc),
            Event::assign(2, "q", Value::var("p")),
        ])
        .unwrap();
        assert_eq!(r.graphs().len(), 1);

        r.step(&Event::assign(3, "q", Value::Null)).unwrap();
        assert_eq!(r.graphs().len(), 2);
        let (gp, _) = r.locate("p").unwrap();
        let (gq, _) = r.locate("q").unwrap();
        assert_ne!(gp, gq);
    }

    #[test]
    fn test_cross_graph_assignment_merges() {
        let mut r = singly();
        r.replay(&[
            Event::assign(1, "p", Value::Alloc),
            Event::assign(2, "q", Value::Alloc),
            Event::store(3, "q", "next", Value::Null),
        ])
        .unwrap();
        assert_eq!(r.graphs().len(), 2);

        r.step(&Event::store(4, "p", "next", Value::var("q"))).unwrap();
        assert_eq!(r.graphs().len(), 1);
        let psg = &r.graphs()[0];
        let p = psg.find("p").unwrap();
        let q = psg.find("q").unwrap();
        let p_cell = psg.target(p, Field::Next).unwrap();
        assert_eq!(psg.target(p_cell, Field::Next), psg.target(q, Field::Next));
        assert!(psg.has_fictitious_edge(p));
    }

    #[test]
    fn test_double_free_is_tolerated() {
        let mut r = singly();
        r.replay(&[
            Event::assign(1, "p", Value::Alloc),
            Event::assign(2, "q", Value::var("p")),
            Event::free(3, "p"),
            Event::free(4, "q"),
        ])
        .unwrap();
        let psg = r.graph_of("q").unwrap();
        assert!(psg.is_dangling(1, Field::Next));
        assert_eq!(r.trace_id("q"), Some(4));
    }

    #[test]
    fn test_checks_record_observations() {
        let mut r = singly();
        r.replay(&[
            Event::assign(1, "p", Value::Alloc),
            Event::assign(2, "q", Value::var("p")),
            Event::op(3, "q", None, Op::NullCheck),
            Event::free(4, "p"),
            Event::op(5, "q", None, Op::DanglingCheck),
        ])
        .unwrap();

        let obs = r.observations();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].state, PointerState::Target("p@1".to_string()));
        assert_eq!(obs[1].state, PointerState::Dangling);

        let report = r.analyze().unwrap();
        assert_eq!(report.dangling_uses.len(), 1);
        assert_eq!(report.dangling_uses[0].id, 5);
    }

    #[test]
    fn test_use_after_release_is_unresolved() {
        let mut r = singly();
        r.replay(&[Event::assign(1, "p", Value::Alloc), Event::free(2, "p")]).unwrap();
        assert!(r.graphs().is_empty());
        assert!(r.step(&Event::op(3, "p", None, Op::NullCheck)).is_err());
        // Writing the name again re-declares it.
        r.step(&Event::assign(4, "p", Value::Null)).unwrap();
        assert_eq!(r.graphs().len(), 1);
    }

    #[test]
    fn test_lone_pointer_saturated_however_created() {
        let mut declared = singly();
        declared.step(&Event::declare(1, "q")).unwrap();

        let mut peeled = singly();
        peeled
            .replay(&[Event::declare(1, "r"), Event::assign(2, "q", Value::var("r"))])
            .unwrap();

        let mut freed = singly();
        freed
            .replay(&[
                Event::assign(1, "p", Value::Alloc),
                Event::assign(2, "q", Value::var("p")),
                Event::free(3, "p"),
            ])
            .unwrap();

        for r in [&declared, &peeled, &freed] {
            let psg = r.graph_of("q").unwrap();
            let q = psg.find("q").unwrap();
            assert!(psg.is_dangling(q, Field::Next));
            assert!(psg.has_fictitious_edge(q));
            assert!(r.analyze().unwrap().graphs.iter().all(|g| g.saturated));
        }
    }

    #[test]
    fn test_field_declaration_is_unresolved() {
        let mut r = singly();
        r.step(&Event::assign(1, "p", Value::Alloc)).unwrap();
        let declare_field = |id: TraceId, name: &str| Event {
            field: Some("next".to_string()),
            ..Event::declare(id, name)
        };
        let err = r.step(&declare_field(2, "p")).unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { id: 2, field: Some(_), .. }));

        let err = r.step(&declare_field(3, "s")).unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { id: 3, field: Some(_), .. }));
    }

    #[test]
    fn test_keep_empty_graphs() {
        let config = ReplayConfig {
            drop_empty: false,
            ..ReplayConfig::default()
        };
        let mut r = Replayer::with_config(Layout::singly("next"), config);
        r.replay(&[Event::assign(1, "p", Value::Alloc), Event::free(2, "p")]).unwrap();
        assert_eq!(r.graphs().len(), 1);
        assert!(r.graphs()[0].is_empty());

        let report = r.analyze().unwrap();
        assert!(report.graphs[0].satisfiable);
        assert!(report.graphs[0].nodes.is_empty());
    }

    #[test]
    fn test_solver_depth_limit() {
        let config = ReplayConfig {
            max_solver_depth: 0,
            ..ReplayConfig::default()
        };
        let mut r = Replayer::with_config(Layout::singly("next"), config);
        r.step(&Event::declare(1, "p")).unwrap();
        // The saturating pair alone already needs a case split.
        assert_eq!(r.analyze().unwrap_err(), Error::SolverLimit { depth: 0 });
    }

    #[test]
    fn test_skip_invariant_checks() {
        // Reusing an event id allocates a second cell named `p@1`.
        let events = [Event::assign(1, "p", Value::Alloc), Event::assign(1, "p", Value::Alloc)];

        let mut checked = singly();
        checked.step(&events[0]).unwrap();
        let err = checked.step(&events[1]).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation { .. }));

        let config = ReplayConfig {
            check_invariants: false,
            ..ReplayConfig::default()
        };
        let mut unchecked = Replayer::with_config(Layout::singly("next"), config);
        unchecked.replay(&events).unwrap();
        assert!(unchecked.check_invariants().is_err());
    }

    #[test]
    fn test_doubly_linked_pair() {
        let mut r = Replayer::new(Layout::doubly("next", "prev"));
        r.replay(&[
            Event::assign(1, "a", Value::Alloc),
            Event::assign(2, "b", Value::Alloc),
            Event::store(3, "a", "next", Value::var("b")),
            Event::store(4, "b", "prev", Value::var("a")),
            Event::store(5, "a", "prev", Value::Null),
            Event::store(6, "b", "next", Value::Null),
        ])
        .unwrap();

        assert_eq!(r.graphs().len(), 1);
        let psg = &r.graphs()[0];
        let a = psg.find("a").unwrap();
        assert!(psg.has_fictitious_edge(a));
        let report = r.analyze().unwrap();
        assert!(report.graphs[0].saturated);
        assert!(report.graphs[0].satisfiable);
    }
}
