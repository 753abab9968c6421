// Module: solver/equations.rs
// The incremental equation engine: value propagation over the working pool,
// minimal-subsystem extraction and target resolution. Solving the whole pool
// at once is infeasible on real problems, so every solve call works on the
// connected component that could actually determine its target.

use log::warn;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::formalism::algebra;
use crate::formalism::condition::Item;
use crate::formalism::expressions::{Expr, Number, Symbol};
use crate::formalism::gdl::GdlError;
use crate::formalism::problem::Problem;

/// Name of the fresh symbol standing for a target expression.
const TARGET_SYM: &str = "t_s";

fn pool_snapshot(problem: &Problem) -> Vec<(Expr, Expr)> {
    problem
        .conditions
        .get("Equation")
        .and_then(|c| c.tables())
        .map(|t| {
            t.equations
                .iter()
                .map(|(raw, cur)| (raw.clone(), cur.clone()))
                .collect()
        })
        .unwrap_or_default()
}

fn store_propagated(problem: &mut Problem, raw: &Expr, current: Expr) {
    if let Some(tables) = problem
        .conditions
        .get_mut("Equation")
        .and_then(|c| c.eq.as_mut())
    {
        if let Some(slot) = tables.equations.get_mut(raw) {
            *slot = current;
        }
    }
}

fn remove_from_pool(problem: &mut Problem, raw: &Expr) {
    if let Some(tables) = problem
        .conditions
        .get_mut("Equation")
        .and_then(|c| c.eq.as_mut())
    {
        tables.equations.shift_remove(raw);
    }
}

fn mark_pool_solved(problem: &mut Problem) {
    if let Some(tables) = problem
        .conditions
        .get_mut("Equation")
        .and_then(|c| c.eq.as_mut())
    {
        tables.solved = true;
    }
}

fn pool_is_solved(problem: &Problem) -> bool {
    problem
        .conditions
        .get("Equation")
        .and_then(|c| c.tables())
        .map(|t| t.solved)
        .unwrap_or(false)
}

fn equation_fact_id(problem: &Problem, expr: &Expr) -> Option<usize> {
    problem.id_of("Equation", &Item::Equation(expr.clone()))
}

/// Premise of one pool entry: the raw equation's own fact plus the value
/// facts of every symbol already substituted into it.
fn pool_premise(problem: &Problem, raw: &Expr) -> Vec<usize> {
    let mut premise = Vec::new();
    if let Some(id) = equation_fact_id(problem, raw) {
        premise.push(id);
    }
    for sym in raw.free_symbols() {
        if problem.value_of_sym(&sym).is_some() {
            if let Some(id) = problem.value_fact_id(&sym) {
                premise.push(id);
            }
        }
    }
    premise
}

/// Substitute committed values into every working equation, to fixpoint.
/// An equation reduced to no free symbols leaves the pool; one reduced to a
/// single free symbol is solved outright and commits that symbol's value.
pub fn simplification_value_replace(problem: &mut Problem) -> Result<(), GdlError> {
    loop {
        let mut update = false;
        for (raw, current) in pool_snapshot(problem) {
            let mut current = current;
            let mut changed = false;
            for sym in current.free_symbols() {
                if let Some(v) = problem.value_of_sym(&sym) {
                    current = current.subs(&sym, &Expr::Num(v));
                    changed = true;
                }
            }
            if changed {
                store_propagated(problem, &raw, current.clone());
                update = true;
            }

            let free: Vec<Symbol> = current.free_symbols().into_iter().collect();
            if free.is_empty() {
                remove_from_pool(problem, &raw);
                update = true;
                continue;
            }
            if free.len() == 1 {
                let budget = problem.config.solve_budget;
                match algebra::solve(std::slice::from_ref(&current), budget) {
                    Err(failure) => {
                        warn!("{} while solving {}", failure, current);
                    }
                    Ok(result) => {
                        if let Some(sym) = free.first() {
                            if let Some(v) = result.get(sym) {
                                let premise = pool_premise(problem, &raw);
                                problem.set_value_of_sym(sym, *v, premise)?;
                                remove_from_pool(problem, &raw);
                                update = true;
                            }
                        }
                    }
                }
            }
        }
        if !update {
            break;
        }
    }
    Ok(())
}

/// Inverted index: which equations (by position) mention each symbol.
pub fn get_sym_to_eqs(eqs: &[Expr]) -> HashMap<Symbol, Vec<usize>> {
    let mut index: HashMap<Symbol, Vec<usize>> = HashMap::new();
    for (i, eq) in eqs.iter().enumerate() {
        for sym in eq.free_symbols() {
            index.entry(sym).or_default().push(i);
        }
    }
    index
}

/// BFS over the bipartite symbol/equation graph from the target equation:
/// the connected component that could determine the target's symbols.
/// Returns equation positions (target included) and the component's symbols.
pub fn get_minimum_equations(
    target: usize,
    eqs: &[Expr],
    sym_to_eqs: &HashMap<Symbol, Vec<usize>>,
) -> (Vec<usize>, BTreeSet<Symbol>) {
    let mut mini: BTreeSet<usize> = BTreeSet::from([target]);
    let mut mini_syms: BTreeSet<Symbol> = eqs[target].free_symbols();

    let mut frontier = mini_syms.clone();
    while !frontier.is_empty() {
        let mut new_syms: BTreeSet<Symbol> = BTreeSet::new();
        for sym in &frontier {
            let Some(linked) = sym_to_eqs.get(sym) else {
                continue;
            };
            for &i in linked {
                if mini.insert(i) {
                    for s in eqs[i].free_symbols() {
                        if !mini_syms.contains(&s) {
                            new_syms.insert(s);
                        }
                    }
                }
            }
        }
        mini_syms.extend(new_syms.iter().cloned());
        frontier = new_syms;
    }

    (mini.into_iter().collect(), mini_syms)
}

/// The propagated working pool with per-equation premises.
fn eqs_and_premises(problem: &Problem) -> (Vec<Expr>, Vec<Vec<usize>>) {
    let mut eqs = Vec::new();
    let mut premises = Vec::new();
    for (raw, current) in pool_snapshot(problem) {
        premises.push(pool_premise(problem, &raw));
        eqs.push(current);
    }
    (eqs, premises)
}

/// Solve every still-open working equation through its minimal subsystem and
/// commit the values found. Equations already swept into an earlier
/// subsystem are skipped; a timeout yields a warning and no information.
pub fn solve_equations(problem: &mut Problem) -> Result<(), GdlError> {
    if pool_is_solved(problem) {
        return Ok(());
    }

    simplification_value_replace(problem)?;

    let (eqs, premises) = eqs_and_premises(problem);
    let sym_to_eqs = get_sym_to_eqs(&eqs);
    let mut visited: HashSet<usize> = HashSet::new();

    for target in 0..eqs.len() {
        if visited.contains(&target) {
            continue;
        }
        let (mini, _) = get_minimum_equations(target, &eqs, &sym_to_eqs);
        visited.extend(mini.iter().copied());

        let mut premise: Vec<usize> = Vec::new();
        let mut system: Vec<Expr> = Vec::new();
        for &i in &mini {
            let mut eq = eqs[i].clone();
            for sym in eq.free_symbols() {
                if let Some(v) = problem.value_of_sym(&sym) {
                    eq = eq.subs(&sym, &Expr::Num(v));
                    if let Some(id) = problem.value_fact_id(&sym) {
                        premise.push(id);
                    }
                }
            }
            if !eq.free_symbols().is_empty() {
                premise.extend(premises[i].iter().copied());
                system.push(eq);
            }
        }
        if system.is_empty() {
            continue;
        }

        match algebra::solve(&system, problem.config.solve_budget) {
            Err(failure) => {
                warn!("{} while solving subsystem of {} equations", failure, system.len());
            }
            Ok(results) => {
                premise.sort_unstable();
                premise.dedup();
                for (sym, v) in results {
                    if problem.value_of_sym(&sym).is_none() {
                        problem.set_value_of_sym(&sym, v, premise.clone())?;
                    }
                }
            }
        }
    }

    simplification_value_replace(problem)?;
    mark_pool_solved(problem);
    Ok(())
}

/// Resolve a target expression against the accumulated equations.
///
/// Fast paths first: the target (or its negation, by canonical sign) already
/// committed as a fact, then full reduction by value substitution. Otherwise
/// a fresh symbol is equated with the target and its minimal subsystem is
/// solved. `None` means no information.
pub fn solve_target(
    problem: &mut Problem,
    target: &Expr,
) -> Result<Option<(Number, Vec<usize>)>, GdlError> {
    if let Some(id) = equation_fact_id(problem, target) {
        return Ok(Some((Number::int(0), vec![id])));
    }

    simplification_value_replace(problem)?;

    let mut expr = target.clone();
    let mut premise: Vec<usize> = Vec::new();
    for sym in expr.free_symbols() {
        if let Some(v) = problem.value_of_sym(&sym) {
            expr = expr.subs(&sym, &Expr::Num(v));
            if let Some(id) = problem.value_fact_id(&sym) {
                premise.push(id);
            }
        }
    }
    if let Some(n) = expr.as_number() {
        return Ok(Some((n, premise)));
    }

    let (mut eqs, mut premises) = eqs_and_premises(problem);
    let target_sym = Symbol::new(TARGET_SYM);
    eqs.push(Expr::sub(Expr::Sym(target_sym.clone()), expr));
    premises.push(premise);

    let sym_to_eqs = get_sym_to_eqs(&eqs);
    let (mini, _) = get_minimum_equations(eqs.len() - 1, &eqs, &sym_to_eqs);
    let system: Vec<Expr> = mini.iter().map(|&i| eqs[i].clone()).collect();

    match algebra::solve(&system, problem.config.solve_budget) {
        Err(failure) => {
            warn!("{} while solving target {}", failure, target);
            Ok(None)
        }
        Ok(results) => match results.get(&target_sym) {
            Some(v) => {
                let mut premise: Vec<usize> = Vec::new();
                for &i in &mini {
                    premise.extend(premises[i].iter().copied());
                }
                premise.sort_unstable();
                premise.dedup();
                Ok(Some((*v, premise)))
            }
            None => Ok(None),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formalism::condition::INIT_THEOREM;
    use crate::formalism::gdl::PredicateGdl;
    use crate::formalism::problem::ReasonerConfig;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn fixture() -> Problem {
        let gdl = Arc::new(
            PredicateGdl::parse(&json!({
                "Point": {"arity": 1, "category": "BasicEntity"},
                "LengthOfLine": {"arity": 2, "category": "Attribution", "sym": "ll"},
            }))
            .unwrap(),
        );
        Problem::new(gdl, ReasonerConfig::default())
    }

    fn free(problem: &mut Problem, name: &str) -> Symbol {
        problem.get_sym("Free", &[name.to_string()]).unwrap()
    }

    fn add_eq(problem: &mut Problem, expr: Expr) -> usize {
        problem
            .add("Equation", Item::Equation(expr.clone()), vec![], INIT_THEOREM)
            .unwrap();
        equation_fact_id(problem, &expr).unwrap()
    }

    #[test]
    fn propagation_solves_chained_values() {
        let mut p = fixture();
        let a = free(&mut p, "a");
        let b = free(&mut p, "b");
        let id_a = add_eq(&mut p, Expr::sub(Expr::Sym(a.clone()), Expr::int(3)));
        let id_b = add_eq(
            &mut p,
            Expr::sub(Expr::sub(Expr::Sym(b.clone()), Expr::Sym(a.clone())), Expr::int(4)),
        );

        solve_equations(&mut p).unwrap();
        assert_eq!(p.value_of_sym(&a), Some(Number::int(3)));
        assert_eq!(p.value_of_sym(&b), Some(Number::int(7)));

        // the value of b rests on both initial equations
        let b_fact = p.value_fact_id(&b).unwrap();
        let (_, fact) = p.fact(b_fact).unwrap();
        assert_eq!(fact.premise, vec![id_a, id_b]);
        assert_eq!(fact.theorem, "solve_eq");

        // pool hygiene: nothing with zero or one free symbol remains
        let pool = p.conditions.get("Equation").and_then(|c| c.tables()).unwrap();
        assert!(pool.equations.values().all(|e| e.free_symbols().len() >= 2));
    }

    #[test]
    fn minimum_equations_pick_the_connected_component() {
        let mut p = fixture();
        let a = Expr::Sym(free(&mut p, "a"));
        let b = Expr::Sym(free(&mut p, "b"));
        let c = Expr::Sym(free(&mut p, "c"));
        let d = Expr::Sym(free(&mut p, "d"));

        let eqs = vec![
            Expr::sub(a.clone(), b.clone()),
            Expr::sub(b.clone(), Expr::int(2)),
            Expr::sub(c.clone(), d.clone()),
        ];
        let index = get_sym_to_eqs(&eqs);
        let (mini, syms) = get_minimum_equations(0, &eqs, &index);
        assert_eq!(mini, vec![0, 1]);
        assert_eq!(syms.len(), 2);
        assert!(!syms.iter().any(|s| s.name() == "c"));
    }

    #[test]
    fn solve_target_prefers_committed_facts() {
        let mut p = fixture();
        let a = free(&mut p, "a");
        let expr = Expr::sub(Expr::Sym(a.clone()), Expr::int(3));
        let id = add_eq(&mut p, expr.clone());

        // the fact itself, and its negation, both resolve to zero
        let hit = solve_target(&mut p, &expr).unwrap().unwrap();
        assert_eq!(hit, (Number::int(0), vec![id]));
        let neg = solve_target(&mut p, &Expr::neg(expr)).unwrap().unwrap();
        assert_eq!(neg, (Number::int(0), vec![id]));
    }

    #[test]
    fn solve_target_through_subsystem() {
        let mut p = fixture();
        let a = free(&mut p, "a");
        let b = free(&mut p, "b");
        add_eq(&mut p, Expr::sub(Expr::Sym(a.clone()), Expr::int(3)));
        add_eq(
            &mut p,
            Expr::sub(Expr::sub(Expr::Sym(b.clone()), Expr::Sym(a.clone())), Expr::int(4)),
        );

        let (value, premise) = solve_target(&mut p, &Expr::Sym(b.clone()))
            .unwrap()
            .unwrap();
        assert_eq!(value, Number::int(7));
        assert!(!premise.is_empty());
    }

    #[test]
    fn unreachable_target_yields_no_information() {
        let mut p = fixture();
        let a = free(&mut p, "a");
        let b = free(&mut p, "b");
        add_eq(
            &mut p,
            Expr::sub(Expr::add(vec![Expr::Sym(a.clone()), Expr::Sym(b)]), Expr::int(5)),
        );

        let result = solve_target(&mut p, &Expr::Sym(a)).unwrap();
        assert!(result.is_none());
        // and nothing was committed along the way
        assert_eq!(p.next_id(), 1);
    }

    #[test]
    fn timeout_is_recoverable() {
        let mut p = fixture();
        let a = free(&mut p, "a");
        add_eq(&mut p, Expr::sub(Expr::Sym(a.clone()), Expr::int(3)));

        p.config.solve_budget = Duration::ZERO;
        solve_equations(&mut p).unwrap();
        assert_eq!(p.value_of_sym(&a), None);

        // a later call under a sane budget recovers
        p.config.solve_budget = Duration::from_millis(2000);
        if let Some(tables) = p.conditions.get_mut("Equation").and_then(|c| c.eq.as_mut()) {
            tables.solved = false;
        }
        solve_equations(&mut p).unwrap();
        assert_eq!(p.value_of_sym(&a), Some(Number::int(3)));
    }
}
