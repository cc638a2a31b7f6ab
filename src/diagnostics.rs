//! Interpretation of solver results as memory-safety findings.
//!
//! With the two saturating clauses set aside, every node variable is classified
//! by the polarities it occurs with in the edge clauses:
//!
//! | occurs as          | tag              |
//! |--------------------|------------------|
//! | never              | `unreachable`    |
//! | only positively    | `always-present` |
//! | only negatively    | `always-absent`  |
//!
//! Variables occurring with both polarities are not reported, and neither is
//! the sentinel.

use std::collections::HashMap;
use std::fmt;

use crate::cnf::Cnf;
use crate::error::{Error, Result};
use crate::psg::{Psg, NULL};
use crate::sat::SatResult;
use crate::trace::TraceId;
use crate::types::Var;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Tag {
    Unreachable,
    AlwaysPresent,
    AlwaysAbsent,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Unreachable => write!(f, "unreachable"),
            Tag::AlwaysPresent => write!(f, "always-present"),
            Tag::AlwaysAbsent => write!(f, "always-absent"),
        }
    }
}

/// A flagged node, with the trace event that last touched it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Finding {
    pub node: String,
    pub trace_id: Option<TraceId>,
    pub tag: Tag,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}", self.node)?;
        if let Some(id) = self.trace_id {
            write!(f, ", last touched at trace event {}", id)?;
        }
        write!(f, ", looks {}", self.tag)
    }
}

/// Occurrence polarities of one variable.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Polarity {
    pub positive: bool,
    pub negative: bool,
}

impl Polarity {
    pub fn tag(self) -> Option<Tag> {
        match (self.positive, self.negative) {
            (false, false) => Some(Tag::Unreachable),
            (true, false) => Some(Tag::AlwaysPresent),
            (false, true) => Some(Tag::AlwaysAbsent),
            (true, true) => None,
        }
    }
}

/// Polarities of variables `1..=num_vars` over the edge clauses, indexed by variable id.
pub fn polarities(cnf: &Cnf) -> Vec<Polarity> {
    let mut result = vec![Polarity::default(); cnf.num_vars() + 1];
    for lit in cnf.edge_clauses().iter().flatten() {
        let p = &mut result[lit.var().id() as usize];
        if lit.is_positive() {
            p.positive = true;
        } else {
            p.negative = true;
        }
    }
    result
}

/// Flags the nodes of `psg` whose variables are polarity-skewed in `cnf`.
///
/// An unsatisfiable formula is a contradiction in the model and is returned
/// as an error carrying the graph and formula.
pub fn diagnose(psg: &Psg, cnf: &Cnf, result: &SatResult, ids: &HashMap<String, TraceId>) -> Result<Vec<Finding>> {
    if !result.is_sat() {
        return Err(Error::Contradiction {
            dump: format!("{}{}", psg, cnf),
        });
    }

    let polarities = polarities(cnf);
    let findings = (0..=psg.node_count())
        .filter(|&node| node != NULL)
        .filter_map(|node| {
            let polarity = polarities
                .get(Var::of_node(node).id() as usize)
                .copied()
                .unwrap_or_default();
            polarity.tag().map(|tag| {
                let name = psg.name(node);
                Finding {
                    node: name.to_string(),
                    trace_id: ids.get(name).copied(),
                    tag,
                }
            })
        })
        .collect();
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::layout::Field;
    use crate::sat::Dpll;

    fn run(psg: &Psg) -> Result<Vec<Finding>> {
        let cnf = Cnf::encode(psg);
        let result = Dpll::default().solve(&cnf)?;
        diagnose(psg, &cnf, &result, &HashMap::new())
    }

    #[test]
    fn test_null_pointer_is_always_present() {
        let mut g = Psg::new(1);
        let p = g.declare_variable("p");
        g.link_to_null(p, Field::Next);
        let findings = run(&g).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].node, "p");
        assert_eq!(findings[0].tag, Tag::AlwaysPresent);
    }

    #[test]
    fn test_isolated_pointer_is_unreachable() {
        let mut g = Psg::new(1);
        g.declare_variable("q");
        let findings = run(&g).unwrap();
        assert_eq!(findings[0].tag, Tag::Unreachable);
    }

    #[test]
    fn test_open_cell_is_always_absent() {
        let mut g = Psg::new(1);
        let p = g.declare_variable("p");
        g.allocate_and_link("c", p, Field::Next);
        let findings = run(&g).unwrap();
        let tags: Vec<_> = findings.iter().map(|f| (f.node.as_str(), f.tag)).collect();
        assert_eq!(tags, vec![("p", Tag::AlwaysPresent), ("c", Tag::AlwaysAbsent)]);
    }

    #[test]
    fn test_inner_cell_not_reported() {
        let mut g = Psg::new(1);
        let p = g.declare_variable("p");
        let c = g.allocate_and_link("c", p, Field::Next);
        g.link_to_null(c, Field::Next);
        let findings = run(&g).unwrap();
        assert!(findings.iter().all(|f| f.node != "c"));
    }

    #[test]
    fn test_unsat_is_contradiction() {
        let g = Psg::new(1);
        let cnf = Cnf::from_dimacs([vec![1], vec![-1]]);
        let result = Dpll::default().solve(&cnf).unwrap();
        assert!(matches!(
            diagnose(&g, &cnf, &result, &HashMap::new()),
            Err(Error::Contradiction { .. })
        ));
    }

    #[test]
    fn test_finding_display() {
        let finding = Finding {
            node: "p".to_string(),
            trace_id: Some(7),
            tag: Tag::AlwaysAbsent,
        };
        assert_eq!(finding.to_string(), "node p, last touched at trace event 7, looks always-absent");
    }
}
