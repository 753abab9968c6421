// Module: solver/subgoal.rs
// Backward reasoning support: given a goal fact, propose the theorem
// applications whose conclusions could derive it, together with the premise
// facts those applications would still need. The outer backward search
// consumes the map; this module only generates and validates candidates.

use indexmap::IndexMap;
use std::collections::HashMap;

use crate::formalism::condition::Item;
use crate::formalism::expressions::Symbol;
use crate::formalism::gdl::{
    ConclusionAtom, GdlError, PatternAtom, PredicateCategory, TheoremGdl,
};
use crate::formalism::problem::Problem;

/// One still-needed premise fact.
pub type SubGoal = (String, Item);

/// Candidate applications keyed by (theorem name, parameter tuple); each
/// entry lists alternative premise sets, any one of which suffices.
pub type SubGoalMap = IndexMap<(String, Vec<String>), Vec<Vec<SubGoal>>>;

fn is_free_var(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_lowercase())
}

/// Replace every still-free variable of each parameter tuple with every
/// known point, recursively.
pub fn theorem_para_completion(paras: Vec<Vec<String>>, points: &[String]) -> Vec<Vec<String>> {
    let mut results: Vec<Vec<String>> = Vec::new();
    for para in paras {
        completion_one(para, points, &mut results);
    }
    results
}

fn completion_one(para: Vec<String>, points: &[String], results: &mut Vec<Vec<String>>) {
    for i in 0..para.len() {
        if is_free_var(&para[i]) {
            for point in points {
                let mut next = para.clone();
                next[i] = point.clone();
                completion_one(next, points, results);
            }
            return;
        }
    }
    if !results.contains(&para) {
        results.push(para);
    }
}

/// Validate candidate parameter tuples against a premise pattern and emit
/// the premise facts as sub-goals. Basic entities and constructions cannot
/// be derived, so a candidate needing an absent one is dropped outright.
fn gen_sub_goals(
    name: &str,
    theorem_paras: Vec<Vec<String>>,
    vars: &[String],
    premises: &[PatternAtom],
    problem: &mut Problem,
) -> Result<SubGoalMap, GdlError> {
    let mut sub_goals = SubGoalMap::new();

    for para in theorem_paras {
        if para.len() != vars.len() {
            continue;
        }
        let letters: HashMap<String, String> = vars
            .iter()
            .cloned()
            .zip(para.iter().cloned())
            .collect();

        let mut passed = true;
        let mut goals: Vec<SubGoal> = Vec::new();
        for atom in premises {
            match atom {
                // absence cannot be made a sub-goal
                PatternAtom::Logic { negated: true, .. }
                | PatternAtom::Algebra { negated: true, .. } => {}
                PatternAtom::Logic {
                    negated: false,
                    predicate,
                    roles,
                } => {
                    let points: Option<Vec<String>> =
                        roles.iter().map(|r| letters.get(r).cloned()).collect();
                    let item = match points {
                        Some(p) => Item::Points(p),
                        None => {
                            passed = false;
                            break;
                        }
                    };
                    if !problem.item_is_valid(predicate, &item) {
                        passed = false;
                        break;
                    }
                    let underivable = matches!(
                        problem.predicate_gdl().get(predicate).map(|d| d.category),
                        Some(PredicateCategory::BasicEntity)
                            | Some(PredicateCategory::Construction)
                    );
                    if underivable && !problem.has(predicate, &item) {
                        passed = false;
                        break;
                    }
                    goals.push((predicate.clone(), item));
                }
                PatternAtom::Algebra {
                    negated: false,
                    tree,
                } => match tree.instantiate(problem, Some(&letters)) {
                    Ok(expr) => match expr.as_number() {
                        Some(n) if n.is_zero() => {}
                        Some(_) => {
                            passed = false;
                            break;
                        }
                        None => goals.push((
                            "Equation".to_string(),
                            Item::Equation(expr.canonical_signed()),
                        )),
                    },
                    Err(_) => {
                        passed = false;
                        break;
                    }
                },
            }
        }

        if passed && !goals.is_empty() {
            let entry = sub_goals.entry((name.to_string(), para)).or_default();
            if !entry.contains(&goals) {
                entry.push(goals);
            }
        }
    }

    Ok(sub_goals)
}

fn merge(into: &mut SubGoalMap, from: SubGoalMap) {
    for (key, alternatives) in from {
        let entry = into.entry(key).or_default();
        for alt in alternatives {
            if !entry.contains(&alt) {
                entry.push(alt);
            }
        }
    }
}

/// Sub-goals for an algebraic goal: theorems whose conclusions mention the
/// attribute of an unsolved symbol, parameterized by the items the symbol
/// denotes and completed over the problem's points.
pub fn find_algebra_sub_goals(
    unsolved: &[Symbol],
    problem: &mut Problem,
    theorems: &TheoremGdl,
) -> Result<SubGoalMap, GdlError> {
    let points = problem.points();
    let mut out = SubGoalMap::new();

    for sym in unsolved {
        let denoted = problem
            .conditions
            .get("Equation")
            .and_then(|c| c.attr_of_sym(sym))
            .cloned();
        let Some((attr, items)) = denoted else {
            continue;
        };

        for (name, def) in theorems.iter() {
            for clause in &def.body {
                for conclusion in &clause.conclusions {
                    let ConclusionAtom::Algebra { tree } = conclusion else {
                        continue;
                    };
                    let mut attr_vars: Vec<Vec<String>> = Vec::new();
                    tree.collect_attr_paras(&attr, &mut attr_vars);
                    if attr_vars.is_empty() {
                        continue;
                    }

                    let mut theorem_paras: Vec<Vec<String>> = Vec::new();
                    for item in &items {
                        for attr_var in &attr_vars {
                            let para: Vec<String> = def
                                .vars
                                .iter()
                                .map(|t| match attr_var.iter().position(|v| v == t) {
                                    Some(pos) if pos < item.len() => item[pos].clone(),
                                    _ => t.clone(),
                                })
                                .collect();
                            theorem_paras.push(para);
                        }
                    }
                    let completed = theorem_para_completion(theorem_paras, &points);
                    let found =
                        gen_sub_goals(name, completed, &def.vars, &clause.premises, problem)?;
                    merge(&mut out, found);
                }
            }
        }
    }

    Ok(out)
}

/// Sub-goals for a logic goal: theorems whose conclusions carry the goal
/// predicate, parameterized by the goal item.
pub fn find_logic_sub_goals(
    predicate: &str,
    item: &[String],
    problem: &mut Problem,
    theorems: &TheoremGdl,
) -> Result<SubGoalMap, GdlError> {
    let points = problem.points();
    let mut out = SubGoalMap::new();

    for (name, def) in theorems.iter() {
        for clause in &def.body {
            for conclusion in &clause.conclusions {
                let ConclusionAtom::Logic {
                    predicate: concluded,
                    roles,
                } = conclusion
                else {
                    continue;
                };
                if concluded != predicate {
                    continue;
                }

                let para: Vec<String> = def
                    .vars
                    .iter()
                    .map(|t| match roles.iter().position(|v| v == t) {
                        Some(pos) if pos < item.len() => item[pos].clone(),
                        _ => t.clone(),
                    })
                    .collect();
                let completed = theorem_para_completion(vec![para], &points);
                let found = gen_sub_goals(name, completed, &def.vars, &clause.premises, problem)?;
                merge(&mut out, found);
            }
        }
    }

    Ok(out)
}
