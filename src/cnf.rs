//! Compilation of a pointer-state graph into a CNF formula.
//!
//! Node `i` becomes variable `i + 1`. Every incoming edge `j -> i` yields the
//! implication clause `(¬x_{i+1} ∨ x_{j+1})`: a node can only be "on" if each
//! of its predecessors is. Two *saturating* clauses close the formula, one
//! asking for at least one node on and one asking for at least one node off,
//! so that the solver has to commit to both polarities.

use std::fmt;

use log::debug;

use crate::psg::Psg;
use crate::types::{Lit, Var};

pub type Clause = Vec<Lit>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cnf {
    clauses: Vec<Clause>,
    num_vars: usize,
    /// Number of trailing saturating clauses (0 or 2).
    saturating: usize,
}

impl Cnf {
    /// Encodes the incidence relation of `psg`.
    ///
    /// The graph with only the sentinel yields the empty formula.
    pub fn encode(psg: &Psg) -> Self {
        let n = psg.node_count();
        let mut clauses = Vec::new();

        for i in 0..=n {
            for j in psg.incoming(i).iter() {
                clauses.push(vec![Var::of_node(i).neg(), Var::of_node(j).pos()]);
            }
        }

        let saturating = if n > 0 {
            clauses.push((0..=n).map(|i| Var::of_node(i).pos()).collect());
            clauses.push((0..=n).map(|i| Var::of_node(i).neg()).collect());
            2
        } else {
            0
        };

        debug!("encode: {} vars, {} clauses", n + 1, clauses.len());
        Self {
            clauses,
            num_vars: if n > 0 { n + 1 } else { 0 },
            saturating,
        }
    }

    /// Builds a formula from raw DIMACS clauses, none of them saturating.
    pub fn from_dimacs<I, C>(clauses: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: IntoIterator<Item = i32>,
    {
        let clauses: Vec<Clause> = clauses
            .into_iter()
            .map(|c| c.into_iter().map(Lit::from_dimacs).collect())
            .collect();
        let num_vars = clauses
            .iter()
            .flatten()
            .map(|l| l.var().id() as usize)
            .max()
            .unwrap_or(0);
        Self {
            clauses,
            num_vars,
            saturating: 0,
        }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Clauses produced by edges, without the saturating pair.
    pub fn edge_clauses(&self) -> &[Clause] {
        &self.clauses[..self.clauses.len() - self.saturating]
    }

    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for Cnf {
    /// DIMACS rendering.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "p cnf {} {}", self.num_vars, self.clauses.len())?;
        for clause in &self.clauses {
            for lit in clause {
                write!(f, "{} ", lit.to_dimacs())?;
            }
            writeln!(f, "0")?;
        }
        Ok(())
    }
}
