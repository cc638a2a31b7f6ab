//! DPLL satisfiability over encoded pointer-state formulas.
//!
//! The solver is a plain recursive Davis–Putnam–Logemann–Loveland procedure:
//! unit propagation to a fixed point, simplification under the partial
//! assignment, then a case split on the first literal of the first clause,
//! trying `true` before `false`. Each branch works on its own copy of the
//! clause set and assignment.

use log::{debug, trace};
use num_bigint::BigUint;

use crate::cnf::{Clause, Cnf};
use crate::error::{Error, Result};
use crate::types::{Lit, Var};

/// Partial assignment of truth values to variables `1..=num_vars`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    values: Vec<Option<bool>>,
}

impl Assignment {
    pub fn new(num_vars: usize) -> Self {
        Self {
            values: vec![None; num_vars + 1],
        }
    }

    pub fn num_vars(&self) -> usize {
        self.values.len() - 1
    }

    pub fn value(&self, var: Var) -> Option<bool> {
        self.values.get(var.id() as usize).copied().flatten()
    }

    /// Truth value of a literal under this assignment, if its variable is assigned.
    pub fn lit_value(&self, lit: Lit) -> Option<bool> {
        self.value(lit.var()).map(|v| v == lit.is_positive())
    }

    pub fn set(&mut self, var: Var, value: bool) {
        let index = var.id() as usize;
        if index >= self.values.len() {
            self.values.resize(index + 1, None);
        }
        self.values[index] = Some(value);
    }

    /// Makes `lit` true.
    pub fn assign(&mut self, lit: Lit) {
        self.set(lit.var(), lit.is_positive());
    }

    pub fn unassigned(&self) -> usize {
        self.values.iter().skip(1).filter(|v| v.is_none()).count()
    }

    /// Assigned variables as signed DIMACS literals.
    pub fn to_dimacs(&self) -> Vec<i32> {
        self.values
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, v)| v.map(|b| if b { i as i32 } else { -(i as i32) }))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatResult {
    Sat(Assignment),
    Unsat,
}

impl SatResult {
    pub fn is_sat(&self) -> bool {
        matches!(self, SatResult::Sat(_))
    }

    pub fn model(&self) -> Option<&Assignment> {
        match self {
            SatResult::Sat(model) => Some(model),
            SatResult::Unsat => None,
        }
    }
}

/// Removes satisfied clauses and falsified literals.
///
/// Returns `None` if some clause becomes empty.
fn simplify(clauses: &[Clause], assignment: &Assignment) -> Option<Vec<Clause>> {
    let mut result = Vec::with_capacity(clauses.len());
    for clause in clauses {
        if clause.iter().any(|&l| assignment.lit_value(l) == Some(true)) {
            continue;
        }
        let rest: Clause = clause
            .iter()
            .copied()
            .filter(|&l| assignment.lit_value(l).is_none())
            .collect();
        if rest.is_empty() {
            return None;
        }
        result.push(rest);
    }
    Some(result)
}

/// Simplifies and propagates unit clauses until none remain.
fn propagate(clauses: Vec<Clause>, assignment: &mut Assignment) -> Option<Vec<Clause>> {
    let mut clauses = clauses;
    loop {
        clauses = simplify(&clauses, assignment)?;
        let unit = match clauses.iter().find(|c| c.len() == 1) {
            Some(c) => c[0],
            None => return Some(clauses),
        };
        if assignment.lit_value(unit) == Some(false) {
            return None;
        }
        trace!("propagate: {}", unit);
        assignment.assign(unit);
    }
}

#[derive(Debug, Clone)]
pub struct Dpll {
    max_depth: usize,
}

impl Default for Dpll {
    fn default() -> Self {
        Dpll::new(10_000)
    }
}

impl Dpll {
    /// Creates a solver whose case-split recursion is capped at `max_depth`.
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn solve(&self, cnf: &Cnf) -> Result<SatResult> {
        debug!("solve: {} vars, {} clauses", cnf.num_vars(), cnf.clauses().len());
        let assignment = Assignment::new(cnf.num_vars());
        let result = match self.search(cnf.clauses().to_vec(), assignment, 0)? {
            Some(model) => SatResult::Sat(model),
            None => SatResult::Unsat,
        };
        debug!("solve -> {}", if result.is_sat() { "SAT" } else { "UNSAT" });
        Ok(result)
    }

    fn search(&self, clauses: Vec<Clause>, mut assignment: Assignment, depth: usize) -> Result<Option<Assignment>> {
        let clauses = match propagate(clauses, &mut assignment) {
            Some(clauses) => clauses,
            None => return Ok(None),
        };
        if clauses.is_empty() {
            return Ok(Some(assignment));
        }
        if depth >= self.max_depth {
            return Err(Error::SolverLimit { depth });
        }

        // After propagation every remaining clause has at least two literals.
        let var = clauses[0][0].var();
        for value in [true, false] {
            trace!("search: depth {}, {} = {}", depth, var, value);
            let mut branch = assignment.clone();
            branch.set(var, value);
            if let Some(model) = self.search(clauses.clone(), branch, depth + 1)? {
                return Ok(Some(model));
            }
        }
        Ok(None)
    }

    /// Number of total assignments over `1..=num_vars` satisfying `cnf`.
    pub fn count_models(&self, cnf: &Cnf) -> Result<BigUint> {
        let assignment = Assignment::new(cnf.num_vars());
        self.count(cnf.clauses().to_vec(), assignment, 0)
    }

    fn count(&self, clauses: Vec<Clause>, mut assignment: Assignment, depth: usize) -> Result<BigUint> {
        let clauses = match propagate(clauses, &mut assignment) {
            Some(clauses) => clauses,
            None => return Ok(BigUint::ZERO),
        };
        if clauses.is_empty() {
            return Ok(BigUint::from(1u32) << assignment.unassigned());
        }
        if depth >= self.max_depth {
            return Err(Error::SolverLimit { depth });
        }

        let var = clauses[0][0].var();
        let mut total = BigUint::ZERO;
        for value in [true, false] {
            let mut branch = assignment.clone();
            branch.set(var, value);
            total += self.count(clauses.clone(), branch, depth + 1)?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn solve(clauses: Vec<Vec<i32>>) -> SatResult {
        Dpll::default().solve(&Cnf::from_dimacs(clauses)).unwrap()
    }

    fn satisfies(model: &Assignment, clauses: &[Vec<i32>]) -> bool {
        clauses
            .iter()
            .all(|c| c.iter().any(|&l| model.lit_value(Lit::from_dimacs(l)) == Some(true)))
    }

    #[test]
    fn test_empty_formula() {
        let result = solve(vec![]);
        assert!(result.is_sat());
        assert_eq!(result.model().unwrap().to_dimacs(), Vec::<i32>::new());
    }

    #[test]
    fn test_unit_propagation() {
        let clauses = vec![vec![1], vec![-1, 2], vec![-2, 3]];
        let result = solve(clauses.clone());
        let model = result.model().unwrap();
        assert_eq!(model.to_dimacs(), vec![1, 2, 3]);
        assert!(satisfies(model, &clauses));
    }

    #[test]
    fn test_conflicting_units() {
        assert_eq!(solve(vec![vec![1], vec![-1]]), SatResult::Unsat);
    }

    #[test]
    fn test_backtracking() {
        // x1 = true fails, so the solver must fall back to x1 = false.
        let clauses = vec![vec![-1, 2], vec![-1, -2], vec![1, 3], vec![1, -3, 2]];
        let result = solve(clauses.clone());
        let model = result.model().unwrap();
        assert_eq!(model.value(Var::new(1)), Some(false));
        assert!(satisfies(model, &clauses));
    }

    #[test]
    fn test_pigeonhole_unsat() {
        // Three pigeons, two holes: p(i, h) = 2 * i + h + 1.
        let p = |i: i32, h: i32| 2 * i + h + 1;
        let mut clauses = Vec::new();
        for i in 0..3 {
            clauses.push(vec![p(i, 0), p(i, 1)]);
        }
        for h in 0..2 {
            for i in 0..3 {
                for j in i + 1..3 {
                    clauses.push(vec![-p(i, h), -p(j, h)]);
                }
            }
        }
        assert_eq!(solve(clauses), SatResult::Unsat);
    }

    #[test]
    fn test_depth_limit() {
        let clauses: Vec<Vec<i32>> = (1..=10).map(|i| vec![i, i + 10]).collect();
        let result = Dpll::new(2).solve(&Cnf::from_dimacs(clauses));
        assert_eq!(result, Err(Error::SolverLimit { depth: 2 }));
    }

    #[test]
    fn test_count_models() {
        let dpll = Dpll::default();
        assert_eq!(dpll.count_models(&Cnf::from_dimacs(Vec::<Vec<i32>>::new())).unwrap(), BigUint::from(1u32));
        assert_eq!(dpll.count_models(&Cnf::from_dimacs([vec![1, 2]])).unwrap(), BigUint::from(3u32));
        assert_eq!(
            dpll.count_models(&Cnf::from_dimacs([vec![1, 2, 3], vec![-1]])).unwrap(),
            BigUint::from(3u32)
        );
        assert_eq!(dpll.count_models(&Cnf::from_dimacs([vec![1], vec![-1]])).unwrap(), BigUint::ZERO);
    }
}
