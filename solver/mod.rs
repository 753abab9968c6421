// Module: solver/mod.rs
// The theorem applier and goal checker. A Solver owns the parsed GDL plus
// one Problem and drives the equation engine and the pattern matcher to
// apply named theorems, validate goals and export the solution report.

pub mod equations;
pub mod logic;
pub mod subgoal;
pub mod test;

use indexmap::IndexMap;
use log::warn;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::formalism::condition::{INIT_THEOREM, Item, SOLVE_EQ_THEOREM};
use crate::formalism::expressions::{Expr, Number};
use crate::formalism::gdl::{
    self, ConclusionAtom, GdlError, PatternAtom, PredicateGdl, TheoremDefinition, TheoremGdl,
    applied_name,
};
use crate::formalism::problem::{
    Goal, GoalKind, Problem, ReasonerConfig, StepRecord, TraceStep, rough_equal,
};

use self::equations::{get_minimum_equations, get_sym_to_eqs, solve_equations, solve_target};

/// Conclusions validated but not yet committed, keyed by
/// (theorem name, parameter tuple). Produced by [`Solver::try_theorem`] and
/// consumed by [`Solver::apply_selection`].
pub type Selection = IndexMap<(String, Vec<String>), Vec<SelectedConclusion>>;

#[derive(Debug, Clone)]
pub struct SelectedConclusion {
    pub predicate: String,
    pub item: Item,
    pub premise: Vec<usize>,
}

/// Serializable outcome of a run: goal status, step log and proof trace.
#[derive(Debug, Clone, Serialize)]
pub struct SolutionReport {
    pub solved: bool,
    pub solved_answer: Option<Number>,
    pub theorem: Option<String>,
    pub premise: Vec<usize>,
    pub steps: Vec<StepRecord>,
    pub trace: Vec<TraceStep>,
    pub generated_at: String,
}

pub struct Solver {
    predicate_gdl: Arc<PredicateGdl>,
    theorem_gdl: TheoremGdl,
    pub problem: Problem,
}

impl Solver {
    pub fn new(predicate_gdl: &Value, theorem_gdl: &Value) -> Result<Solver, GdlError> {
        Solver::with_config(predicate_gdl, theorem_gdl, ReasonerConfig::default())
    }

    pub fn with_config(
        predicate_gdl: &Value,
        theorem_gdl: &Value,
        config: ReasonerConfig,
    ) -> Result<Solver, GdlError> {
        let predicate_gdl = Arc::new(PredicateGdl::parse(predicate_gdl)?);
        let theorem_gdl = TheoremGdl::parse(theorem_gdl, &predicate_gdl)?;
        let problem = Problem::new(predicate_gdl.clone(), config);
        Ok(Solver {
            predicate_gdl,
            theorem_gdl,
            problem,
        })
    }

    pub fn predicate_gdl(&self) -> &PredicateGdl {
        &self.predicate_gdl
    }

    pub fn theorem_gdl(&self) -> &TheoremGdl {
        &self.theorem_gdl
    }

    /// Seed the problem from a CDL object, then run the equation engine once
    /// over the initial pool.
    pub fn load_problem(&mut self, cdl: &Value) -> Result<(), GdlError> {
        let started = Instant::now();
        let parsed = gdl::parse_problem(cdl, &self.predicate_gdl)?;
        self.problem.load_problem(&parsed)?;
        solve_equations(&mut self.problem)?;
        self.problem
            .applied(INIT_THEOREM, started.elapsed().as_secs_f64());
        Ok(())
    }

    /// Apply one named theorem and report whether any fact was added.
    ///
    /// With a parameter tuple the premises are validated directly under that
    /// binding (accurate mode); without one the pattern matcher enumerates
    /// every satisfying binding (rough mode). Unknown names, wrong parameter
    /// arity and `*_definition` theorems fail loudly with nothing committed.
    pub fn apply_theorem(&mut self, name: &str, para: Option<&[String]>) -> Result<bool, GdlError> {
        let def = self.theorem_gdl.require(name)?.clone();
        if def.is_definition() {
            return Err(GdlError::DefinitionOnly(name.to_string()));
        }
        if let Some(para) = para {
            if para.len() != def.vars.len() {
                return Err(GdlError::TheoremParaLength {
                    name: name.to_string(),
                    expected: def.vars.len(),
                    got: para.len(),
                });
            }
        }

        let started = Instant::now();
        let (update, logged, bindings) = match para {
            Some(para) => {
                let theorem = applied_name(name, para, &def.para_len);
                let update = self.apply_accurate(&def, para, &theorem)?;
                (update, theorem, vec![])
            }
            None => {
                let (update, bindings) = self.apply_rough(&def)?;
                (update, name.to_string(), bindings)
            }
        };

        solve_equations(&mut self.problem)?;
        self.problem
            .applied(&logged, started.elapsed().as_secs_f64());
        for binding in bindings {
            self.problem.applied(&binding, 0.0);
        }
        if !update {
            warn!(
                "theorem <{}, {:?}> added nothing; check the parameters or the prerequisites",
                name, para
            );
        }
        Ok(update)
    }

    /// Accurate mode: validate each clause's premises under the binding.
    fn apply_accurate(
        &mut self,
        def: &TheoremDefinition,
        para: &[String],
        theorem: &str,
    ) -> Result<bool, GdlError> {
        let letters: HashMap<String, String> = def
            .vars
            .iter()
            .cloned()
            .zip(para.iter().cloned())
            .collect();

        let mut update = false;
        for clause in &def.body {
            let mut premises: Vec<usize> = Vec::new();
            let mut passed = true;

            for atom in &clause.premises {
                match atom {
                    PatternAtom::Logic {
                        negated,
                        predicate,
                        roles,
                    } => {
                        let item = Item::Points(bind_roles(roles, &letters)?);
                        match (*negated, self.problem.id_of(predicate, &item)) {
                            (false, Some(id)) => premises.push(id),
                            (false, None) => passed = false,
                            (true, Some(_)) => passed = false,
                            (true, None) => {}
                        }
                    }
                    PatternAtom::Algebra { negated, tree } => {
                        let expr = tree.instantiate(&mut self.problem, Some(&letters))?;
                        let resolved = solve_target(&mut self.problem, &expr)?;
                        let tolerance = self.problem.config.tolerance;
                        match (*negated, resolved) {
                            (false, Some((value, premise))) => {
                                if rough_equal(value.as_f64(), 0.0, tolerance) {
                                    premises.extend(premise);
                                } else {
                                    passed = false;
                                }
                            }
                            (false, None) => passed = false,
                            (true, Some((value, premise))) => {
                                if rough_equal(value.as_f64(), 0.0, tolerance) {
                                    passed = false;
                                } else {
                                    premises.extend(premise);
                                }
                            }
                            (true, None) => {
                                // unknown negated algebra: satisfied under the
                                // configured closed-world policy
                                if !self.problem.config.negated_algebra_unknown_is_sat {
                                    passed = false;
                                }
                            }
                        }
                    }
                }
                if !passed {
                    break;
                }
            }

            // premise not met is not an error: the clause just yields nothing
            if !passed {
                continue;
            }
            premises.sort_unstable();
            premises.dedup();
            update |= self.commit_conclusions(&clause.conclusions, &letters, &premises, theorem)?;
        }
        Ok(update)
    }

    /// Rough mode: the matcher enumerates the bindings, each stamped with its
    /// own applied name.
    fn apply_rough(&mut self, def: &TheoremDefinition) -> Result<(bool, Vec<String>), GdlError> {
        let mut update = false;
        let mut bindings: Vec<String> = Vec::new();
        for clause in &def.body {
            let relation = logic::run(&clause.premises, &mut self.problem)?;
            for row in 0..relation.len() {
                let letters = relation.letters(row);
                let para = bind_roles(&def.vars, &letters)?;
                let theorem = applied_name(&def.name, &para, &def.para_len);
                update |= self.commit_conclusions(
                    &clause.conclusions,
                    &letters,
                    &relation.ids[row],
                    &theorem,
                )?;
                bindings.push(theorem);
            }
        }
        Ok((update, bindings))
    }

    fn commit_conclusions(
        &mut self,
        conclusions: &[ConclusionAtom],
        letters: &HashMap<String, String>,
        premise: &[usize],
        theorem: &str,
    ) -> Result<bool, GdlError> {
        let mut update = false;
        for conclusion in conclusions {
            match conclusion {
                ConclusionAtom::Logic { predicate, roles } => {
                    let item = Item::Points(bind_roles(roles, letters)?);
                    update |= self
                        .problem
                        .add(predicate, item, premise.to_vec(), theorem)?;
                }
                ConclusionAtom::Algebra { tree } => {
                    let expr = tree.instantiate(&mut self.problem, Some(letters))?;
                    update |= self.problem.add(
                        "Equation",
                        Item::Equation(expr),
                        premise.to_vec(),
                        theorem,
                    )?;
                }
            }
        }
        Ok(update)
    }

    /// Rough-match a theorem without committing anything: the returned
    /// selection lists every conclusion that would be new, for the outer
    /// search to rank and feed back through [`Solver::apply_selection`].
    pub fn try_theorem(&mut self, name: &str) -> Result<Selection, GdlError> {
        let def = self.theorem_gdl.require(name)?.clone();
        if def.is_definition() {
            return Err(GdlError::DefinitionOnly(name.to_string()));
        }

        let mut selection: Selection = IndexMap::new();
        for clause in &def.body {
            let relation = logic::run(&clause.premises, &mut self.problem)?;
            for row in 0..relation.len() {
                let letters = relation.letters(row);
                let para = bind_roles(&def.vars, &letters)?;

                let mut added: Vec<SelectedConclusion> = Vec::new();
                for conclusion in &clause.conclusions {
                    let (predicate, item) = match conclusion {
                        ConclusionAtom::Logic { predicate, roles } => {
                            (predicate.clone(), Item::Points(bind_roles(roles, &letters)?))
                        }
                        ConclusionAtom::Algebra { tree } => {
                            let expr = tree.instantiate(&mut self.problem, Some(&letters))?;
                            ("Equation".to_string(), Item::Equation(expr))
                        }
                    };
                    if self.problem.can_add(&predicate, &item) {
                        added.push(SelectedConclusion {
                            predicate,
                            item,
                            premise: relation.ids[row].clone(),
                        });
                    }
                }
                if !added.is_empty() {
                    selection
                        .entry((name.to_string(), para))
                        .or_default()
                        .extend(added);
                }
            }
        }
        Ok(selection)
    }

    /// Commit a selection produced by [`Solver::try_theorem`].
    pub fn apply_selection(&mut self, selection: &Selection) -> Result<bool, GdlError> {
        let started = Instant::now();
        let mut update = false;
        let mut logged: Vec<String> = Vec::new();
        for ((name, para), conclusions) in selection {
            let def = self.theorem_gdl.require(name)?;
            let theorem = applied_name(name, para, &def.para_len);
            for conclusion in conclusions {
                update |= self.problem.add(
                    &conclusion.predicate,
                    conclusion.item.clone(),
                    conclusion.premise.clone(),
                    &theorem,
                )?;
            }
            logged.push(theorem);
        }
        solve_equations(&mut self.problem)?;

        let last = logged.pop();
        for theorem in logged {
            self.problem.applied(&theorem, 0.0);
        }
        if let Some(theorem) = last {
            self.problem
                .applied(&theorem, started.elapsed().as_secs_f64());
        }
        Ok(update)
    }

    /// Test the problem goal against current knowledge, recording the solved
    /// answer, premise set and producing theorem on the goal itself.
    pub fn check_goal(&mut self) -> Result<bool, GdlError> {
        let started = Instant::now();
        let mut goal = self
            .problem
            .goal
            .clone()
            .ok_or_else(|| GdlError::Malformed("no goal loaded".into()))?;

        match goal.kind.clone() {
            GoalKind::Value { target, answer } => {
                self.check_algebra_goal(&mut goal, &target, answer.as_f64())?;
            }
            GoalKind::Equal { target } => {
                self.check_algebra_goal(&mut goal, &target, 0.0)?;
            }
            GoalKind::Logic { predicate, points } => {
                let item = Item::Points(points);
                if let Some(id) = self.problem.id_of(&predicate, &item) {
                    if let Some((_, fact)) = self.problem.fact(id) {
                        goal.solved = true;
                        goal.premise = fact.premise.clone();
                        goal.theorem = Some(fact.theorem.clone());
                    }
                }
            }
        }

        let solved = goal.solved;
        self.problem.goal = Some(goal);
        self.problem
            .applied("check_goal", started.elapsed().as_secs_f64());
        Ok(solved)
    }

    fn check_algebra_goal(
        &mut self,
        goal: &mut Goal,
        target: &Expr,
        answer: f64,
    ) -> Result<(), GdlError> {
        let tolerance = self.problem.config.tolerance;
        if let Some((value, premise)) = solve_target(&mut self.problem, target)? {
            goal.solved_answer = Some(value);
            if rough_equal(value.as_f64(), answer, tolerance) {
                goal.solved = true;
            }
            // prefer the committed fact's provenance when the resolution is
            // itself a stored equation
            let eq = Expr::sub(target.clone(), Expr::Num(value));
            if let Some(id) = self.problem.id_of("Equation", &Item::Equation(eq)) {
                if let Some((_, fact)) = self.problem.fact(id) {
                    goal.premise = fact.premise.clone();
                    goal.theorem = Some(fact.theorem.clone());
                    return Ok(());
                }
            }
            goal.premise = premise;
            goal.theorem = Some(SOLVE_EQ_THEOREM.to_string());
        }
        Ok(())
    }

    /// Backward reasoning support: sub-goals whose establishment would let
    /// some theorem derive the given goal.
    pub fn find_sub_goals(
        &mut self,
        predicate: &str,
        item: &Item,
    ) -> Result<subgoal::SubGoalMap, GdlError> {
        if !self.problem.is_loaded() {
            return Err(GdlError::Malformed(
                "problem not loaded; run load_problem first".into(),
            ));
        }

        if predicate == "Equation" {
            let target = match item.as_equation() {
                Some(e) => e.clone(),
                None => {
                    return Err(GdlError::Malformed(
                        "Equation sub-goals need an equation item".into(),
                    ));
                }
            };
            let mut expr = target;
            for sym in expr.free_symbols() {
                if let Some(v) = self.problem.value_of_sym(&sym) {
                    expr = expr.subs(&sym, &Expr::Num(v));
                }
            }

            let mut eqs: Vec<Expr> = self
                .problem
                .conditions
                .get("Equation")
                .and_then(|c| c.tables())
                .map(|t| t.equations.values().cloned().collect())
                .unwrap_or_default();
            eqs.push(expr);
            let sym_to_eqs = get_sym_to_eqs(&eqs);
            let (_, mini_syms) = get_minimum_equations(eqs.len() - 1, &eqs, &sym_to_eqs);

            let unsolved: Vec<_> = mini_syms
                .into_iter()
                .filter(|sym| {
                    self.problem.value_of_sym(sym).is_none()
                        && self
                            .problem
                            .conditions
                            .get("Equation")
                            .and_then(|c| c.attr_of_sym(sym))
                            .map(|(attr, _)| attr != gdl::FREE_ATTR)
                            .unwrap_or(false)
                })
                .collect();
            subgoal::find_algebra_sub_goals(&unsolved, &mut self.problem, &self.theorem_gdl)
        } else {
            self.predicate_gdl.require(predicate)?;
            let points = match item.as_points() {
                Some(p) => p.to_vec(),
                None => {
                    return Err(GdlError::Malformed(
                        "logic sub-goals need a point item".into(),
                    ));
                }
            };
            subgoal::find_logic_sub_goals(predicate, &points, &mut self.problem, &self.theorem_gdl)
        }
    }

    /// Export the run outcome: goal status plus the step log and the proof
    /// trace of the goal's premises.
    pub fn solution_report(&self) -> SolutionReport {
        let goal = self.problem.goal.as_ref();
        let premise: Vec<usize> = goal.map(|g| g.premise.clone()).unwrap_or_default();
        SolutionReport {
            solved: goal.map(|g| g.solved).unwrap_or(false),
            solved_answer: goal.and_then(|g| g.solved_answer),
            theorem: goal.and_then(|g| g.theorem.clone()),
            trace: self.problem.proof_trace(&premise),
            premise,
            steps: self.problem.steps.clone(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Map pattern roles to concrete points through a binding; an unbound role
/// is a malformed theorem.
fn bind_roles(
    roles: &[String],
    letters: &HashMap<String, String>,
) -> Result<Vec<String>, GdlError> {
    roles
        .iter()
        .map(|r| {
            letters
                .get(r)
                .cloned()
                .ok_or_else(|| GdlError::Malformed(format!("role {} is not bound", r)))
        })
        .collect()
}
