// Module: formalism/condition.rs
// The condition store: one deduplicating, provenance-carrying fact set per
// predicate. Fact ids are issued by the owning Problem in strict monotonic
// order; once committed, an item and its provenance never change.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::expressions::{Expr, Number, Symbol};
use super::gdl::PredicateCategory;

/// Sentinel theorem carried by facts loaded from the problem statement.
pub const INIT_THEOREM: &str = "init_problem";
/// Sentinel theorem carried by values derived purely by equation solving.
pub const SOLVE_EQ_THEOREM: &str = "solve_eq";

/// A predicate instance: a point tuple for geometric predicates, an equation
/// (`expr = 0`, canonical sign) for the Equation sort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Item {
    Points(Vec<String>),
    Equation(Expr),
}

impl Item {
    pub fn points(points: &[&str]) -> Item {
        Item::Points(points.iter().map(|p| p.to_string()).collect())
    }

    pub fn as_points(&self) -> Option<&[String]> {
        match self {
            Item::Points(p) => Some(p),
            Item::Equation(_) => None,
        }
    }

    pub fn as_equation(&self) -> Option<&Expr> {
        match self {
            Item::Equation(e) => Some(e),
            Item::Points(_) => None,
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Points(p) => write!(f, "({})", p.join(",")),
            Item::Equation(e) => write!(f, "{}", e),
        }
    }
}

/// A committed fact: item plus frozen provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: usize,
    pub item: Item,
    /// Premise fact ids, sorted and deduplicated; every one is strictly
    /// smaller than `id`.
    pub premise: Vec<usize>,
    /// Applied name of the producing theorem.
    pub theorem: String,
}

/// Symbol tables owned by the Equation sort.
#[derive(Debug, Clone, Default)]
pub struct EquationTables {
    /// Committed value per symbol; at most one per run.
    pub(crate) value_of_sym: IndexMap<Symbol, Number>,
    /// Fact id of the committed `sym - v` equation, per valued symbol.
    pub(crate) value_fact: IndexMap<Symbol, usize>,
    /// Attribute kind and the geometric items a symbol denotes.
    pub(crate) attr_of_sym: IndexMap<Symbol, (String, Vec<Vec<String>>)>,
    /// Symbol interning keyed by (attribute, point tuple).
    pub(crate) sym_index: IndexMap<(String, Vec<String>), Symbol>,
    /// Working pool: raw equation (canonical sign) to its current propagated
    /// form. Entries leave the pool once fully reduced; the facts stay.
    pub(crate) equations: IndexMap<Expr, Expr>,
    /// Cleared whenever a new equation enters the pool; lets the equation
    /// engine skip re-solving an unchanged pool.
    pub(crate) solved: bool,
}

/// All facts of one predicate.
#[derive(Debug, Clone)]
pub struct Condition {
    pub name: String,
    pub category: PredicateCategory,
    by_item: IndexMap<Item, usize>,
    facts: IndexMap<usize, Fact>,
    pub(crate) eq: Option<EquationTables>,
}

impl Condition {
    pub fn new(name: &str, category: PredicateCategory) -> Condition {
        let eq = if category == PredicateCategory::Equation {
            Some(EquationTables::default())
        } else {
            None
        };
        Condition {
            name: name.to_string(),
            category,
            by_item: IndexMap::new(),
            facts: IndexMap::new(),
            eq,
        }
    }

    fn canonical_item(&self, item: Item) -> Item {
        match item {
            Item::Equation(e) => Item::Equation(e.canonical_signed()),
            other => other,
        }
    }

    /// Commit a fact under a caller-issued id. Returns the surviving id and
    /// whether the fact is new; a duplicate returns the existing id without
    /// widening its premise set. Equation items enter the working pool.
    pub fn add(
        &mut self,
        item: Item,
        premise: Vec<usize>,
        theorem: &str,
        id: usize,
    ) -> (usize, bool) {
        let item = self.canonical_item(item);
        if let Some(&existing) = self.by_item.get(&item) {
            return (existing, false);
        }

        let mut premise = premise;
        premise.sort_unstable();
        premise.dedup();

        if let (Some(tables), Item::Equation(expr)) = (self.eq.as_mut(), &item) {
            tables.equations.insert(expr.clone(), expr.clone());
            tables.solved = false;
        }

        self.by_item.insert(item.clone(), id);
        self.facts.insert(
            id,
            Fact {
                id,
                item,
                premise,
                theorem: theorem.to_string(),
            },
        );
        (id, true)
    }

    pub fn has(&self, item: &Item) -> bool {
        self.id_of(item).is_some()
    }

    pub fn id_of(&self, item: &Item) -> Option<usize> {
        match item {
            Item::Equation(e) => self
                .by_item
                .get(&Item::Equation(e.canonical_signed()))
                .copied(),
            other => self.by_item.get(other).copied(),
        }
    }

    pub fn fact(&self, id: usize) -> Option<&Fact> {
        self.facts.get(&id)
    }

    pub fn facts(&self) -> impl Iterator<Item = &Fact> {
        self.facts.values()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Enumerate all point facts projected onto `roles`. A role name that
    /// repeats collapses to a single column and only items whose points agree
    /// at the repeated positions survive. Ids come back as singleton premise
    /// sets, one per row.
    pub fn get_items(&self, roles: &[String]) -> (Vec<Vec<usize>>, Vec<Vec<String>>, Vec<String>) {
        let mut vars: Vec<String> = Vec::new();
        let mut keep: Vec<usize> = Vec::new();
        for (i, role) in roles.iter().enumerate() {
            if !vars.contains(role) {
                vars.push(role.clone());
                keep.push(i);
            }
        }

        let mut ids = Vec::new();
        let mut items = Vec::new();
        for fact in self.facts.values() {
            let points = match fact.item.as_points() {
                Some(p) if p.len() == roles.len() => p,
                _ => continue,
            };
            // repeated roles demand equal points
            let consistent = roles.iter().enumerate().all(|(i, role)| {
                let first = roles.iter().position(|r| r == role).unwrap_or(i);
                points[first] == points[i]
            });
            if !consistent {
                continue;
            }
            ids.push(vec![fact.id]);
            items.push(keep.iter().map(|&i| points[i].clone()).collect());
        }
        (ids, items, vars)
    }

    /// Symbol tables of the Equation sort; `None` on every other sort.
    pub fn tables(&self) -> Option<&EquationTables> {
        self.eq.as_ref()
    }

    pub fn value_of_sym(&self, sym: &Symbol) -> Option<Number> {
        self.eq.as_ref()?.value_of_sym.get(sym).copied()
    }

    pub fn attr_of_sym(&self, sym: &Symbol) -> Option<&(String, Vec<Vec<String>>)> {
        self.eq.as_ref()?.attr_of_sym.get(sym)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points_condition() -> Condition {
        Condition::new("Line", PredicateCategory::BasicEntity)
    }

    #[test]
    fn add_deduplicates_and_keeps_first_premises() {
        let mut cond = points_condition();
        let (id, added) = cond.add(Item::points(&["A", "B"]), vec![], INIT_THEOREM, 0);
        assert!(added);
        let (again, added) = cond.add(Item::points(&["A", "B"]), vec![5], "other", 1);
        assert!(!added);
        assert_eq!(again, id);
        // premise set untouched by the duplicate add
        assert!(cond.fact(id).map(|f| f.premise.is_empty()).unwrap_or(false));
    }

    #[test]
    fn equation_sign_is_canonical() {
        let mut cond = Condition::new("Equation", PredicateCategory::Equation);
        let e = Expr::sub(Expr::sym("a"), Expr::int(3));
        let (id, added) = cond.add(Item::Equation(e.clone()), vec![], INIT_THEOREM, 0);
        assert!(added);

        let negated = Expr::neg(e.clone());
        let (same, added) = cond.add(Item::Equation(negated.clone()), vec![], INIT_THEOREM, 1);
        assert!(!added);
        assert_eq!(same, id);
        assert_eq!(cond.id_of(&Item::Equation(negated)), Some(id));
        // the pool gained exactly one entry
        assert_eq!(cond.tables().map(|t| t.equations.len()), Some(1));
    }

    #[test]
    fn get_items_collapses_duplicate_roles() {
        let mut cond = points_condition();
        cond.add(Item::points(&["A", "B"]), vec![], INIT_THEOREM, 0);
        cond.add(Item::points(&["C", "C"]), vec![], INIT_THEOREM, 1);

        let roles = vec!["x".to_string(), "x".to_string()];
        let (ids, items, vars) = cond.get_items(&roles);
        assert_eq!(vars, vec!["x".to_string()]);
        assert_eq!(items, vec![vec!["C".to_string()]]);
        assert_eq!(ids, vec![vec![1]]);

        let distinct = vec!["x".to_string(), "y".to_string()];
        let (ids, items, _) = cond.get_items(&distinct);
        assert_eq!(ids.len(), 2);
        assert_eq!(items[0], vec!["A".to_string(), "B".to_string()]);
    }
}
