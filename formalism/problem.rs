// Module: formalism/problem.rs
// One problem instance: the condition store, the monotonic fact-id counter,
// the goal and the step log. All reasoner state lives here and is deep-copied
// by Clone (the forward-search driver snapshots and rolls back whole
// problems, id counter included).

use indexmap::IndexMap;
use log::debug;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::condition::{Condition, Fact, INIT_THEOREM, Item, SOLVE_EQ_THEOREM};
use super::expressions::{Expr, Number, Symbol};
use super::gdl::{
    CdlFact, FREE_ATTR, GdlError, GoalCdl, PredicateCategory, PredicateGdl, ProblemCdl,
};

/// Tunable policy of the reasoner, carried by every [`Problem`].
#[derive(Debug, Clone)]
pub struct ReasonerConfig {
    /// Wall-clock budget of one algebraic solve call.
    pub solve_budget: Duration,
    /// Absolute tolerance of numeric equality.
    pub tolerance: f64,
    /// Closed-world stance on negated algebraic premises: when the solver
    /// returns no information, treat the negation as satisfied. Sound only
    /// as long as algebra stays incomplete; exposed as a flag for that
    /// reason.
    pub negated_algebra_unknown_is_sat: bool,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        ReasonerConfig {
            solve_budget: Duration::from_millis(2000),
            tolerance: 0.01,
            negated_algebra_unknown_is_sat: true,
        }
    }
}

/// Numeric equality under the configured tolerance.
pub fn rough_equal(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() < tolerance
}

/// What the problem asks to establish.
#[derive(Debug, Clone, Serialize)]
pub enum GoalKind {
    /// Determine a numeric value for the target expression.
    Value { target: Expr, answer: Number },
    /// Establish that the target expression vanishes.
    Equal { target: Expr },
    /// Establish a logic fact.
    Logic {
        predicate: String,
        points: Vec<String>,
    },
}

/// The goal plus its solution record, filled by the goal checker.
#[derive(Debug, Clone, Serialize)]
pub struct Goal {
    pub kind: GoalKind,
    pub solved: bool,
    pub solved_answer: Option<Number>,
    pub premise: Vec<usize>,
    pub theorem: Option<String>,
}

impl Goal {
    fn new(kind: GoalKind) -> Goal {
        Goal {
            kind,
            solved: false,
            solved_answer: None,
            premise: vec![],
            theorem: None,
        }
    }
}

/// One entry of the step log: applied theorem name and wall time. The log is
/// reporting-only; the reasoner never consults it.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub theorem: String,
    pub seconds: f64,
}

/// One node of the serialized proof trace.
#[derive(Debug, Clone, Serialize)]
pub struct TraceStep {
    pub id: usize,
    pub predicate: String,
    pub item: String,
    pub theorem: String,
    pub premise: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Problem {
    pub config: ReasonerConfig,
    predicate_gdl: Arc<PredicateGdl>,
    pub conditions: IndexMap<String, Condition>,
    next_id: usize,
    fact_predicate: HashMap<usize, String>,
    pub steps: Vec<StepRecord>,
    pub goal: Option<Goal>,
    loaded: bool,
}

impl Problem {
    /// Fresh, empty state: one sort per non-attribution predicate of the
    /// GDL (attribution predicates denote symbols, not facts).
    pub fn new(predicate_gdl: Arc<PredicateGdl>, config: ReasonerConfig) -> Problem {
        let mut conditions = IndexMap::new();
        for (name, decl) in predicate_gdl.iter() {
            if decl.category == PredicateCategory::Attribution {
                continue;
            }
            conditions.insert(name.clone(), Condition::new(name, decl.category));
        }
        Problem {
            config,
            predicate_gdl,
            conditions,
            next_id: 0,
            fact_predicate: HashMap::new(),
            steps: Vec::new(),
            goal: None,
            loaded: false,
        }
    }

    pub fn predicate_gdl(&self) -> &PredicateGdl {
        &self.predicate_gdl
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn next_id(&self) -> usize {
        self.next_id
    }

    fn equation(&self) -> &Condition {
        self.conditions
            .get("Equation")
            .expect("the Equation sort is created with the problem")
    }

    fn equation_mut(&mut self) -> &mut Condition {
        self.conditions
            .get_mut("Equation")
            .expect("the Equation sort is created with the problem")
    }

    /// Seed the store from a parsed problem statement. Entity and relation
    /// facts are committed after the basic entities and constructions they
    /// build on; malformed items fail loudly and leave nothing committed
    /// half-way within the offending fact.
    pub fn load_problem(&mut self, cdl: &ProblemCdl) -> Result<(), GdlError> {
        if self.loaded {
            return Err(GdlError::Malformed("problem already loaded".into()));
        }

        let first_pass = |fact: &CdlFact| {
            matches!(fact, CdlFact::Logic { predicate, .. }
                if matches!(
                    self.predicate_gdl.get(predicate).map(|d| d.category),
                    Some(PredicateCategory::BasicEntity) | Some(PredicateCategory::Construction)
                ))
        };
        let (basics, rest): (Vec<&CdlFact>, Vec<&CdlFact>) =
            cdl.facts.iter().partition(|fact| first_pass(fact));

        for fact in basics.into_iter().chain(rest) {
            match fact {
                CdlFact::Logic { predicate, points } => {
                    let item = Item::Points(points.clone());
                    self.check_item(predicate, &item)?;
                    self.add_fact(predicate, item, vec![], INIT_THEOREM)?;
                }
                CdlFact::Equation(tree) => {
                    let expr = tree.instantiate(self, None)?;
                    self.add_fact("Equation", Item::Equation(expr), vec![], INIT_THEOREM)?;
                }
            }
        }

        let goal = match &cdl.goal {
            GoalCdl::Value { tree, answer } => GoalKind::Value {
                target: tree.instantiate(self, None)?,
                answer: *answer,
            },
            GoalCdl::Equal { tree } => GoalKind::Equal {
                target: tree.instantiate(self, None)?,
            },
            GoalCdl::Logic { predicate, points } => GoalKind::Logic {
                predicate: predicate.clone(),
                points: points.clone(),
            },
        };
        self.goal = Some(Goal::new(goal));
        self.loaded = true;
        Ok(())
    }

    /// Validity of an item against the GDL: arity, and for entities and
    /// relations the existence of every referenced point.
    pub(crate) fn item_is_valid(&self, predicate: &str, item: &Item) -> bool {
        let decl = match self.predicate_gdl.get(predicate) {
            Some(d) => d,
            None => return false,
        };
        match item {
            Item::Equation(_) => decl.category == PredicateCategory::Equation,
            Item::Points(points) => {
                if decl.category == PredicateCategory::Equation {
                    return false;
                }
                if decl.arity != 0 && points.len() != decl.arity {
                    return false;
                }
                if matches!(
                    decl.category,
                    PredicateCategory::Entity | PredicateCategory::Relation
                ) {
                    if let Some(point_sort) = self.conditions.get("Point") {
                        if !point_sort.is_empty() {
                            return points
                                .iter()
                                .all(|p| point_sort.has(&Item::Points(vec![p.clone()])));
                        }
                    }
                }
                true
            }
        }
    }

    fn check_item(&self, predicate: &str, item: &Item) -> Result<(), GdlError> {
        let decl = self.predicate_gdl.require(predicate)?;
        if let Item::Points(points) = item {
            if decl.arity != 0 && points.len() != decl.arity {
                return Err(GdlError::ItemLength {
                    predicate: predicate.to_string(),
                    expected: decl.arity,
                    got: points.len(),
                });
            }
        }
        if !self.item_is_valid(predicate, item) {
            return Err(GdlError::Malformed(format!(
                "item {} of {} references unknown points",
                item, predicate
            )));
        }
        Ok(())
    }

    /// Commit a fact. Returns whether anything new entered the store; an
    /// invalid item or a tautological equation is silently skipped during
    /// derivation.
    pub fn add(
        &mut self,
        predicate: &str,
        item: Item,
        premise: Vec<usize>,
        theorem: &str,
    ) -> Result<bool, GdlError> {
        if !self.conditions.contains_key(predicate) {
            return Err(GdlError::UnknownPredicate(predicate.to_string()));
        }
        if !self.item_is_valid(predicate, &item) {
            debug!("skipping invalid {} item {}", predicate, item);
            return Ok(false);
        }
        self.add_fact(predicate, item, premise, theorem)
            .map(|(_, added)| added)
    }

    /// Whether `add` would commit something new.
    pub fn can_add(&self, predicate: &str, item: &Item) -> bool {
        match self.conditions.get(predicate) {
            Some(cond) => {
                if !self.item_is_valid(predicate, item) {
                    return false;
                }
                if let Item::Equation(e) = item {
                    if e.as_number().is_some() {
                        return false;
                    }
                }
                !cond.has(item)
            }
            None => false,
        }
    }

    fn add_fact(
        &mut self,
        predicate: &str,
        item: Item,
        premise: Vec<usize>,
        theorem: &str,
    ) -> Result<(usize, bool), GdlError> {
        if let Item::Equation(expr) = &item {
            if let Some(n) = expr.as_number() {
                // fully numeric: a tautology carries no information and a
                // contradiction must not enter the store
                if !n.is_zero() {
                    log::warn!("dropping contradictory equation 0 = {}", n);
                }
                let id = self.next_id.saturating_sub(1);
                return Ok((id, false));
            }
        }
        let cond = self
            .conditions
            .get_mut(predicate)
            .ok_or_else(|| GdlError::UnknownPredicate(predicate.to_string()))?;
        let premise: Vec<usize> = premise.into_iter().filter(|&p| p < self.next_id).collect();
        let (id, added) = cond.add(item, premise, theorem, self.next_id);
        if added {
            self.fact_predicate.insert(id, predicate.to_string());
            self.next_id += 1;
        }
        Ok((id, added))
    }

    pub fn has(&self, predicate: &str, item: &Item) -> bool {
        self.conditions
            .get(predicate)
            .map(|c| c.has(item))
            .unwrap_or(false)
    }

    pub fn id_of(&self, predicate: &str, item: &Item) -> Option<usize> {
        self.conditions.get(predicate)?.id_of(item)
    }

    /// Look a fact up by id, with its predicate name.
    pub fn fact(&self, id: usize) -> Option<(&str, &Fact)> {
        let predicate = self.fact_predicate.get(&id)?;
        let fact = self.conditions.get(predicate)?.fact(id)?;
        Some((predicate.as_str(), fact))
    }

    /// Intern the symbol denoting `attr` applied to `points`. `Free` names a
    /// plain algebraic unknown; anything else must be an attribution
    /// predicate of the GDL.
    pub fn get_sym(&mut self, attr: &str, points: &[String]) -> Result<Symbol, GdlError> {
        let name = if attr == FREE_ATTR {
            points.join("_")
        } else {
            let decl = self.predicate_gdl.require(attr)?;
            if decl.category != PredicateCategory::Attribution {
                return Err(GdlError::Malformed(format!(
                    "{} is not an attribution predicate",
                    attr
                )));
            }
            if decl.arity != 0 && points.len() != decl.arity {
                return Err(GdlError::ItemLength {
                    predicate: attr.to_string(),
                    expected: decl.arity,
                    got: points.len(),
                });
            }
            format!("{}_{}", decl.sym_prefix(), points.join("").to_lowercase())
        };

        let tables = self
            .equation_mut()
            .eq
            .as_mut()
            .ok_or_else(|| GdlError::Malformed("Equation sort has no symbol tables".into()))?;
        let key = (attr.to_string(), points.to_vec());
        if let Some(sym) = tables.sym_index.get(&key) {
            return Ok(sym.clone());
        }
        let sym = Symbol::new(name);
        tables.sym_index.insert(key, sym.clone());
        tables
            .attr_of_sym
            .insert(sym.clone(), (attr.to_string(), vec![points.to_vec()]));
        Ok(sym)
    }

    pub fn value_of_sym(&self, sym: &Symbol) -> Option<Number> {
        self.equation().value_of_sym(sym)
    }

    /// Fact id of the committed `sym - v` equation, when `sym` is valued.
    pub fn value_fact_id(&self, sym: &Symbol) -> Option<usize> {
        self.equation().eq.as_ref()?.value_fact.get(sym).copied()
    }

    /// Commit a solved symbol value: records the `sym - v` equation fact
    /// (theorem `solve_eq`), marks the symbol known and retires the
    /// corresponding working-pool entry. A second value for the same symbol
    /// is refused.
    pub fn set_value_of_sym(
        &mut self,
        sym: &Symbol,
        value: Number,
        premise: Vec<usize>,
    ) -> Result<bool, GdlError> {
        if self.value_of_sym(sym).is_some() {
            return Ok(false);
        }
        let expr = Expr::sub(Expr::Sym(sym.clone()), Expr::Num(value));
        let canonical = expr.canonical_signed();
        let (id, _) = self.add_fact("Equation", Item::Equation(expr), premise, SOLVE_EQ_THEOREM)?;

        let tables = self
            .equation_mut()
            .eq
            .as_mut()
            .ok_or_else(|| GdlError::Malformed("Equation sort has no symbol tables".into()))?;
        tables.value_of_sym.insert(sym.clone(), value);
        tables.value_fact.insert(sym.clone(), id);
        tables.equations.shift_remove(&canonical);
        Ok(true)
    }

    /// Append to the step log.
    pub fn applied(&mut self, theorem: &str, seconds: f64) {
        self.steps.push(StepRecord {
            theorem: theorem.to_string(),
            seconds,
        });
    }

    /// The point names known to the problem, for parameter completion.
    pub fn points(&self) -> Vec<String> {
        match self.conditions.get("Point") {
            Some(cond) => cond
                .facts()
                .filter_map(|f| f.item.as_points())
                .filter_map(|p| p.first().cloned())
                .collect(),
            None => vec![],
        }
    }

    /// Transitive premise closure of `seed`, in id order. By the id
    /// monotonicity invariant the walk always terminates, and it bottoms out
    /// at `init_problem` facts.
    pub fn proof_trace(&self, seed: &[usize]) -> Vec<TraceStep> {
        let mut visited: HashSet<usize> = HashSet::new();
        let mut stack: Vec<usize> = seed.to_vec();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            if let Some((_, fact)) = self.fact(id) {
                stack.extend(fact.premise.iter().copied());
            }
        }
        let mut ids: Vec<usize> = visited.into_iter().collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| {
                self.fact(id).map(|(predicate, fact)| TraceStep {
                    id,
                    predicate: predicate.to_string(),
                    item: fact.item.to_string(),
                    theorem: fact.theorem.clone(),
                    premise: fact.premise.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gdl() -> Arc<PredicateGdl> {
        Arc::new(
            PredicateGdl::parse(&json!({
                "Point": {"arity": 1, "category": "BasicEntity"},
                "Line": {"arity": 2, "category": "BasicEntity"},
                "Triangle": {"arity": 3, "category": "Entity"},
                "LengthOfLine": {"arity": 2, "category": "Attribution", "sym": "ll"},
            }))
            .unwrap(),
        )
    }

    fn problem() -> Problem {
        Problem::new(gdl(), ReasonerConfig::default())
    }

    #[test]
    fn ids_are_dense_and_monotonic() {
        let mut p = problem();
        for (i, pt) in ["A", "B", "C"].iter().enumerate() {
            assert!(p.add("Point", Item::points(&[pt]), vec![], INIT_THEOREM).unwrap());
            assert_eq!(p.next_id(), i + 1);
        }
        // duplicate add does not consume an id
        assert!(!p.add("Point", Item::points(&["A"]), vec![], INIT_THEOREM).unwrap());
        assert_eq!(p.next_id(), 3);
    }

    #[test]
    fn entity_items_need_known_points() {
        let mut p = problem();
        p.add("Point", Item::points(&["A"]), vec![], INIT_THEOREM).unwrap();
        p.add("Point", Item::points(&["B"]), vec![], INIT_THEOREM).unwrap();
        p.add("Point", Item::points(&["C"]), vec![], INIT_THEOREM).unwrap();
        assert!(p.add("Triangle", Item::points(&["A", "B", "C"]), vec![], "t").unwrap());
        // D is unknown: the add is silently skipped
        assert!(!p.add("Triangle", Item::points(&["A", "B", "D"]), vec![], "t").unwrap());
    }

    #[test]
    fn symbols_intern_per_attribute_item() {
        let mut p = problem();
        let ab = vec!["A".to_string(), "B".to_string()];
        let s1 = p.get_sym("LengthOfLine", &ab).unwrap();
        let s2 = p.get_sym("LengthOfLine", &ab).unwrap();
        assert_eq!(s1, s2);
        assert_eq!(s1.name(), "ll_ab");
        let (attr, items) = p
            .conditions
            .get("Equation")
            .and_then(|c| c.attr_of_sym(&s1))
            .cloned()
            .unwrap();
        assert_eq!(attr, "LengthOfLine");
        assert_eq!(items, vec![ab]);
    }

    #[test]
    fn set_value_commits_a_solve_eq_fact() {
        let mut p = problem();
        let sym = p.get_sym("LengthOfLine", &["A".into(), "B".into()]).unwrap();
        let eq = Expr::sub(Expr::Sym(sym.clone()), Expr::int(5));
        p.add("Equation", Item::Equation(eq), vec![], INIT_THEOREM).unwrap();

        assert!(p.set_value_of_sym(&sym, Number::int(5), vec![0]).unwrap());
        assert_eq!(p.value_of_sym(&sym), Some(Number::int(5)));
        // the value fact is the original equation, deduplicated
        assert_eq!(p.value_fact_id(&sym), Some(0));
        // refused second value
        assert!(!p.set_value_of_sym(&sym, Number::int(6), vec![]).unwrap());
        // pool entry retired
        let pool = p.conditions.get("Equation").and_then(|c| c.tables()).unwrap();
        assert!(pool.equations.is_empty());
    }

    #[test]
    fn contradictory_equation_is_refused() {
        let mut p = problem();
        let expr = Expr::int(3);
        assert!(!p.add("Equation", Item::Equation(expr), vec![], "t").unwrap());
        assert_eq!(p.next_id(), 0);
    }

    #[test]
    fn proof_trace_reaches_init_facts() {
        let mut p = problem();
        p.add("Point", Item::points(&["A"]), vec![], INIT_THEOREM).unwrap();
        p.add("Point", Item::points(&["B"]), vec![], INIT_THEOREM).unwrap();
        p.add("Line", Item::points(&["A", "B"]), vec![], INIT_THEOREM).unwrap();
        p.add("Line", Item::points(&["B", "A"]), vec![2], "line_symmetry(AB)").unwrap();

        let trace = p.proof_trace(&[3]);
        let ids: Vec<usize> = trace.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(trace.iter().all(|t| t.id >= t.premise.iter().copied().max().unwrap_or(0)));
        assert_eq!(trace[0].theorem, INIT_THEOREM);
    }
}
