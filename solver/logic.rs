// Module: solver/logic.rs
// Pattern matching of theorem premises against the condition store: a
// running relation is narrowed atom by atom through semi-joins, anti-joins,
// constrained cartesian products and algebraic constraints. Negation is
// closed-world over the current store, which makes matching order-sensitive
// in its presence.

use std::collections::HashMap;

use crate::formalism::gdl::{GdlError, PatternAtom};
use crate::formalism::problem::{Problem, rough_equal};

use super::equations::solve_target;
use crate::formalism::condition::Item;

/// The running match relation: one row per candidate binding, with the
/// premise fact ids supporting it.
#[derive(Debug, Clone, Default)]
pub struct Relation {
    pub ids: Vec<Vec<usize>>,
    pub items: Vec<Vec<String>>,
    pub vars: Vec<String>,
}

impl Relation {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The role binding of one row.
    pub fn letters(&self, row: usize) -> HashMap<String, String> {
        self.vars
            .iter()
            .cloned()
            .zip(self.items[row].iter().cloned())
            .collect()
    }
}

fn union_ids(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out: Vec<usize> = a.iter().chain(b.iter()).copied().collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Evaluate a premise pattern and return every satisfying binding. The first
/// atom must be a positive logic atom; it seeds the relation, and each later
/// atom narrows it. An empty relation short-circuits the walk.
pub fn run(pattern: &[PatternAtom], problem: &mut Problem) -> Result<Relation, GdlError> {
    let mut atoms = pattern.iter();
    let first = atoms.next().ok_or_else(|| {
        GdlError::Malformed("premise pattern must not be empty".into())
    })?;

    let mut relation = match first {
        PatternAtom::Logic {
            negated: false,
            predicate,
            roles,
        } => {
            let cond = problem
                .conditions
                .get(predicate)
                .ok_or_else(|| GdlError::UnknownPredicate(predicate.clone()))?;
            let (ids, items, vars) = cond.get_items(roles);
            Relation { ids, items, vars }
        }
        _ => {
            return Err(GdlError::Malformed(
                "premise pattern must open with a positive logic atom".into(),
            ));
        }
    };

    for atom in atoms {
        if relation.is_empty() {
            break;
        }
        match atom {
            PatternAtom::Logic {
                negated,
                predicate,
                roles,
            } => {
                let all_bound = roles.iter().all(|r| relation.vars.contains(r));
                if all_bound {
                    relation = constraint_logic(relation, predicate, roles, *negated, problem)?;
                } else if *negated {
                    return Err(GdlError::Malformed(format!(
                        "negated atom {} must not introduce new roles",
                        predicate
                    )));
                } else {
                    let cond = problem
                        .conditions
                        .get(predicate)
                        .ok_or_else(|| GdlError::UnknownPredicate(predicate.clone()))?;
                    let extension = cond.get_items(roles);
                    relation = product(relation, extension);
                }
            }
            PatternAtom::Algebra { negated, tree } => {
                relation = constraint_algebra(relation, tree, *negated, problem)?;
            }
        }
    }

    Ok(relation)
}

/// Semi-join (positive) or anti-join (negated, closed world) of the relation
/// against one sort, on already-bound roles. A surviving positive row gains
/// the matched fact's id.
fn constraint_logic(
    relation: Relation,
    predicate: &str,
    roles: &[String],
    negated: bool,
    problem: &Problem,
) -> Result<Relation, GdlError> {
    let cond = problem
        .conditions
        .get(predicate)
        .ok_or_else(|| GdlError::UnknownPredicate(predicate.to_string()))?;
    let index: Vec<usize> = roles
        .iter()
        .map(|r| {
            relation.vars.iter().position(|v| v == r).ok_or_else(|| {
                GdlError::Malformed(format!("role {} is not bound", r))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Relation {
        ids: vec![],
        items: vec![],
        vars: relation.vars.clone(),
    };
    for row in 0..relation.len() {
        let projected: Vec<String> = index.iter().map(|&j| relation.items[row][j].clone()).collect();
        let found = cond.id_of(&Item::Points(projected));
        match (negated, found) {
            (false, Some(id)) => {
                out.ids.push(union_ids(&relation.ids[row], &[id]));
                out.items.push(relation.items[row].clone());
            }
            (true, None) => {
                out.ids.push(relation.ids[row].clone());
                out.items.push(relation.items[row].clone());
            }
            _ => {}
        }
    }
    Ok(out)
}

/// Constrained cartesian product: rows agree on shared roles; new roles
/// append as fresh columns and premise ids union.
pub fn product(
    r1: Relation,
    r2: (Vec<Vec<usize>>, Vec<Vec<String>>, Vec<String>),
) -> Relation {
    let (r2_ids, r2_items, r2_vars) = r2;

    let shared: Vec<(usize, usize)> = r1
        .vars
        .iter()
        .enumerate()
        .filter_map(|(i, v)| r2_vars.iter().position(|w| w == v).map(|j| (i, j)))
        .collect();
    let fresh: Vec<usize> = (0..r2_vars.len())
        .filter(|&j| !r1.vars.contains(&r2_vars[j]))
        .collect();

    let mut vars = r1.vars.clone();
    for &j in &fresh {
        vars.push(r2_vars[j].clone());
    }

    let mut out = Relation {
        ids: vec![],
        items: vec![],
        vars,
    };
    for i in 0..r1.len() {
        for j in 0..r2_items.len() {
            let agrees = shared
                .iter()
                .all(|&(a, b)| r1.items[i][a] == r2_items[j][b]);
            if !agrees {
                continue;
            }
            let mut item = r1.items[i].clone();
            for &f in &fresh {
                item.push(r2_items[j][f].clone());
            }
            out.items.push(item);
            out.ids.push(union_ids(&r1.ids[i], &r2_ids[j]));
        }
    }
    out
}

/// Algebraic constraint: instantiate the equality under each row's binding
/// and resolve it. A positive atom keeps rows whose equation vanishes and
/// charges the resolution's premises; a negated atom keeps rows that are
/// non-zero or (policy flag) unknown.
fn constraint_algebra(
    relation: Relation,
    tree: &crate::formalism::gdl::EqualTree,
    negated: bool,
    problem: &mut Problem,
) -> Result<Relation, GdlError> {
    let tolerance = problem.config.tolerance;
    let unknown_is_sat = problem.config.negated_algebra_unknown_is_sat;

    let mut out = Relation {
        ids: vec![],
        items: vec![],
        vars: relation.vars.clone(),
    };
    for row in 0..relation.len() {
        let letters = relation.letters(row);
        let expr = tree.instantiate(problem, Some(&letters))?;
        let resolved = solve_target(problem, &expr)?;
        match (negated, resolved) {
            (false, Some((value, premise))) => {
                if rough_equal(value.as_f64(), 0.0, tolerance) {
                    out.ids.push(union_ids(&relation.ids[row], &premise));
                    out.items.push(relation.items[row].clone());
                }
            }
            (false, None) => {}
            (true, Some((value, premise))) => {
                if !rough_equal(value.as_f64(), 0.0, tolerance) {
                    out.ids.push(union_ids(&relation.ids[row], &premise));
                    out.items.push(relation.items[row].clone());
                }
            }
            (true, None) => {
                if unknown_is_sat {
                    out.ids.push(relation.ids[row].clone());
                    out.items.push(relation.items[row].clone());
                }
            }
        }
    }
    Ok(out)
}
