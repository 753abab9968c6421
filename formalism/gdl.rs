// Module: formalism/gdl.rs
// Typed form of the geometry definition language: predicate declarations,
// theorem declarations and the expression trees appearing inside them. Input
// arrives from the parser layer as nested JSON lists/objects; this module
// turns it into the structures the reasoner consumes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use super::expressions::{Expr, Number, TrigFn};
use super::problem::Problem;

/// Attribute kind of the free symbols introduced by bare variables in
/// equation trees.
pub const FREE_ATTR: &str = "Free";

/// Errors raised while interpreting GDL/CDL input or dispatching a theorem.
/// These are fatal to the offending call and leave the problem state
/// unchanged.
#[derive(Debug, Clone, Error)]
pub enum GdlError {
    #[error("predicate {0} is not defined in the current GDL")]
    UnknownPredicate(String),
    #[error("theorem {0} is not defined in the current GDL")]
    UnknownTheorem(String),
    #[error("theorem {0} is a definition and only usable for backward reasoning")]
    DefinitionOnly(String),
    #[error("theorem {name} expects {expected} parameters but got {got}")]
    TheoremParaLength {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("{predicate} expects {expected} points but got {got}")]
    ItemLength {
        predicate: String,
        expected: usize,
        got: usize,
    },
    #[error("no operation {0}, check the expression tree")]
    UnknownOperator(String),
    #[error("malformed GDL: {0}")]
    Malformed(String),
}

/// The six predicate families of the definition language. The `Equation`
/// family owns the symbol tables inside the condition store; all others are
/// plain item sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredicateCategory {
    BasicEntity,
    Entity,
    Relation,
    Attribution,
    Construction,
    Equation,
}

impl PredicateCategory {
    fn parse(text: &str) -> Option<PredicateCategory> {
        match text {
            "BasicEntity" => Some(PredicateCategory::BasicEntity),
            "Entity" => Some(PredicateCategory::Entity),
            "Relation" => Some(PredicateCategory::Relation),
            "Attribution" => Some(PredicateCategory::Attribution),
            "Construction" => Some(PredicateCategory::Construction),
            "Equation" => Some(PredicateCategory::Equation),
            _ => None,
        }
    }
}

/// Declaration of one predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredicateDefinition {
    pub name: String,
    pub arity: usize,
    pub roles: Vec<String>,
    pub category: PredicateCategory,
    /// Short symbol prefix for Attribution predicates (e.g. `ll` for
    /// LengthOfLine); defaults to the lowercased predicate name.
    pub sym: Option<String>,
}

impl PredicateDefinition {
    pub fn sym_prefix(&self) -> String {
        match &self.sym {
            Some(s) => s.clone(),
            None => self.name.to_lowercase(),
        }
    }
}

/// The parsed predicate GDL: declaration per predicate name.
#[derive(Debug, Clone, Default)]
pub struct PredicateGdl {
    predicates: IndexMap<String, PredicateDefinition>,
}

impl PredicateGdl {
    /// Parse `{"Line": {"arity": 2, "category": "Entity"}, ...}`. An
    /// `Equation` sort is always present even when the input omits it.
    pub fn parse(value: &Value) -> Result<PredicateGdl, GdlError> {
        let object = value
            .as_object()
            .ok_or_else(|| GdlError::Malformed("predicate GDL must be an object".into()))?;

        let mut predicates = IndexMap::new();
        for (name, decl) in object {
            let decl = decl.as_object().ok_or_else(|| {
                GdlError::Malformed(format!("declaration of {} must be an object", name))
            })?;
            let category = decl
                .get("category")
                .and_then(Value::as_str)
                .and_then(PredicateCategory::parse)
                .ok_or_else(|| {
                    GdlError::Malformed(format!("predicate {} has no valid category", name))
                })?;
            let roles: Vec<String> = decl
                .get("roles")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let arity = decl
                .get("arity")
                .and_then(Value::as_u64)
                .map(|n| n as usize)
                .unwrap_or(roles.len());
            let sym = decl
                .get("sym")
                .and_then(Value::as_str)
                .map(str::to_string);
            predicates.insert(
                name.clone(),
                PredicateDefinition {
                    name: name.clone(),
                    arity,
                    roles,
                    category,
                    sym,
                },
            );
        }

        if !predicates.contains_key("Equation") {
            predicates.insert(
                "Equation".to_string(),
                PredicateDefinition {
                    name: "Equation".to_string(),
                    arity: 1,
                    roles: vec![],
                    category: PredicateCategory::Equation,
                    sym: None,
                },
            );
        }

        Ok(PredicateGdl { predicates })
    }

    pub fn get(&self, name: &str) -> Option<&PredicateDefinition> {
        self.predicates.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&PredicateDefinition, GdlError> {
        self.get(name)
            .ok_or_else(|| GdlError::UnknownPredicate(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    pub fn is_attribution(&self, name: &str) -> bool {
        matches!(
            self.get(name).map(|d| d.category),
            Some(PredicateCategory::Attribution)
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PredicateDefinition)> {
        self.predicates.iter()
    }
}

/// Arithmetic operators admitted in expression trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Sin,
    Cos,
    Tan,
}

impl TreeOp {
    fn parse(name: &str) -> Option<TreeOp> {
        match name {
            "Add" => Some(TreeOp::Add),
            "Sub" => Some(TreeOp::Sub),
            "Mul" => Some(TreeOp::Mul),
            "Div" => Some(TreeOp::Div),
            "Pow" => Some(TreeOp::Pow),
            "Sin" => Some(TreeOp::Sin),
            "Cos" => Some(TreeOp::Cos),
            "Tan" => Some(TreeOp::Tan),
            _ => None,
        }
    }
}

/// A symbolic expression template. Leaves are attribute references over role
/// letters (or concrete points), numeric constants, or free variables.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprTree {
    Attr { predicate: String, paras: Vec<String> },
    Const(Number),
    Var(String),
    Op { op: TreeOp, args: Vec<ExprTree> },
}

impl ExprTree {
    /// Parse a nested-list tree such as
    /// `["Add", [["LengthOfLine", ["a", "b"]], "5"]]`.
    pub fn parse(value: &Value, gdl: &PredicateGdl) -> Result<ExprTree, GdlError> {
        match value {
            Value::Number(n) => {
                let number = n
                    .as_i64()
                    .map(Number::int)
                    .or_else(|| n.as_f64().map(Number::real))
                    .ok_or_else(|| GdlError::Malformed(format!("bad numeric literal {}", n)))?;
                Ok(ExprTree::Const(number))
            }
            Value::String(s) => match Number::parse(s) {
                Some(n) => Ok(ExprTree::Const(n)),
                None => Ok(ExprTree::Var(s.clone())),
            },
            Value::Array(parts) => {
                if parts.len() != 2 {
                    return Err(GdlError::Malformed(format!(
                        "tree node must be a [name, args] pair, got {}",
                        value
                    )));
                }
                let name = parts[0]
                    .as_str()
                    .ok_or_else(|| GdlError::Malformed("tree node name must be a string".into()))?;
                let args = parts[1]
                    .as_array()
                    .ok_or_else(|| GdlError::Malformed("tree node args must be a list".into()))?;

                if let Some(op) = TreeOp::parse(name) {
                    let expected = match op {
                        TreeOp::Sin | TreeOp::Cos | TreeOp::Tan => Some(1),
                        TreeOp::Sub | TreeOp::Div | TreeOp::Pow => Some(2),
                        TreeOp::Add | TreeOp::Mul => None,
                    };
                    if let Some(expected) = expected {
                        if args.len() != expected {
                            return Err(GdlError::Malformed(format!(
                                "{:?} expects {} operands but got {}",
                                op,
                                expected,
                                args.len()
                            )));
                        }
                    } else if args.is_empty() {
                        return Err(GdlError::Malformed(format!("{:?} needs operands", op)));
                    }
                    let args = args
                        .iter()
                        .map(|a| ExprTree::parse(a, gdl))
                        .collect::<Result<Vec<_>, _>>()?;
                    return Ok(ExprTree::Op { op, args });
                }

                if gdl.is_attribution(name) {
                    let decl = gdl.require(name)?;
                    let paras: Vec<String> = args
                        .iter()
                        .map(|a| {
                            a.as_str().map(str::to_string).ok_or_else(|| {
                                GdlError::Malformed(format!("{} points must be strings", name))
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    if decl.arity != 0 && paras.len() != decl.arity {
                        return Err(GdlError::ItemLength {
                            predicate: name.to_string(),
                            expected: decl.arity,
                            got: paras.len(),
                        });
                    }
                    return Ok(ExprTree::Attr {
                        predicate: name.to_string(),
                        paras,
                    });
                }

                Err(GdlError::UnknownOperator(name.to_string()))
            }
            other => Err(GdlError::Malformed(format!("bad tree node {}", other))),
        }
    }

    /// Instantiate the template into a concrete expression. Role letters are
    /// mapped through `letters` when given (theorem application); with no
    /// mapping the leaf points are taken as already concrete (problem
    /// loading). Attribute leaves intern their symbols in the problem's
    /// Equation sort.
    pub fn instantiate(
        &self,
        problem: &mut Problem,
        letters: Option<&HashMap<String, String>>,
    ) -> Result<Expr, GdlError> {
        match self {
            ExprTree::Const(n) => Ok(Expr::Num(*n)),
            ExprTree::Var(name) => {
                let sym = problem.get_sym(FREE_ATTR, std::slice::from_ref(name))?;
                Ok(Expr::Sym(sym))
            }
            ExprTree::Attr { predicate, paras } => {
                let points: Vec<String> = paras
                    .iter()
                    .map(|p| match letters {
                        Some(map) => map.get(p).cloned().unwrap_or_else(|| p.clone()),
                        None => p.clone(),
                    })
                    .collect();
                let sym = problem.get_sym(predicate, &points)?;
                Ok(Expr::Sym(sym))
            }
            ExprTree::Op { op, args } => {
                let mut parts = Vec::with_capacity(args.len());
                for a in args {
                    parts.push(a.instantiate(problem, letters)?);
                }
                Ok(match op {
                    TreeOp::Add => Expr::add(parts),
                    TreeOp::Mul => Expr::mul(parts),
                    TreeOp::Sub => {
                        let b = parts.pop().unwrap_or_else(|| Expr::int(0));
                        let a = parts.pop().unwrap_or_else(|| Expr::int(0));
                        Expr::sub(a, b)
                    }
                    TreeOp::Div => {
                        let b = parts.pop().unwrap_or_else(|| Expr::int(1));
                        let a = parts.pop().unwrap_or_else(|| Expr::int(0));
                        if b.is_zero() {
                            return Err(GdlError::Malformed(
                                "division by constant zero".to_string(),
                            ));
                        }
                        Expr::divide(a, b)
                    }
                    TreeOp::Pow => {
                        let b = parts.pop().unwrap_or_else(|| Expr::int(1));
                        let a = parts.pop().unwrap_or_else(|| Expr::int(0));
                        Expr::pow(a, b)
                    }
                    TreeOp::Sin => {
                        Expr::func(TrigFn::Sin, parts.pop().unwrap_or_else(|| Expr::int(0)))
                    }
                    TreeOp::Cos => {
                        Expr::func(TrigFn::Cos, parts.pop().unwrap_or_else(|| Expr::int(0)))
                    }
                    TreeOp::Tan => {
                        Expr::func(TrigFn::Tan, parts.pop().unwrap_or_else(|| Expr::int(0)))
                    }
                })
            }
        }
    }

    /// Collect the parameter tuples of every `attr` leaf, used by the
    /// backward sub-goal finder.
    pub fn collect_attr_paras(&self, attr: &str, out: &mut Vec<Vec<String>>) {
        match self {
            ExprTree::Attr { predicate, paras } => {
                if predicate == attr {
                    out.push(paras.clone());
                }
            }
            ExprTree::Op { args, .. } => {
                for a in args {
                    a.collect_attr_paras(attr, out);
                }
            }
            ExprTree::Const(_) | ExprTree::Var(_) => {}
        }
    }
}

/// An algebraic equality template `left = right`.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualTree {
    pub left: ExprTree,
    pub right: ExprTree,
}

impl EqualTree {
    pub fn parse(args: &[Value], gdl: &PredicateGdl) -> Result<EqualTree, GdlError> {
        if args.len() != 2 {
            return Err(GdlError::Malformed(format!(
                "Equal expects two operands but got {}",
                args.len()
            )));
        }
        Ok(EqualTree {
            left: ExprTree::parse(&args[0], gdl)?,
            right: ExprTree::parse(&args[1], gdl)?,
        })
    }

    /// Instantiate as the equation `left - right = 0`.
    pub fn instantiate(
        &self,
        problem: &mut Problem,
        letters: Option<&HashMap<String, String>>,
    ) -> Result<Expr, GdlError> {
        let left = self.left.instantiate(problem, letters)?;
        let right = self.right.instantiate(problem, letters)?;
        Ok(Expr::sub(left, right))
    }

    pub fn collect_attr_paras(&self, attr: &str, out: &mut Vec<Vec<String>>) {
        self.left.collect_attr_paras(attr, out);
        self.right.collect_attr_paras(attr, out);
    }
}

/// One atom of a theorem premise pattern.
#[derive(Debug, Clone)]
pub enum PatternAtom {
    Logic {
        negated: bool,
        predicate: String,
        roles: Vec<String>,
    },
    Algebra {
        negated: bool,
        tree: EqualTree,
    },
}

/// One atom of a theorem conclusion template (always positive).
#[derive(Debug, Clone)]
pub enum ConclusionAtom {
    Logic {
        predicate: String,
        roles: Vec<String>,
    },
    Algebra { tree: EqualTree },
}

/// One premise/conclusion clause of a theorem body.
#[derive(Debug, Clone)]
pub struct TheoremClause {
    pub premises: Vec<PatternAtom>,
    pub conclusions: Vec<ConclusionAtom>,
}

/// Declaration of one theorem.
#[derive(Debug, Clone)]
pub struct TheoremDefinition {
    pub name: String,
    pub vars: Vec<String>,
    /// Parameter grouping used only when stamping the applied name.
    pub para_len: Vec<usize>,
    pub body: Vec<TheoremClause>,
}

impl TheoremDefinition {
    /// Whether this theorem is reserved for backward reasoning.
    pub fn is_definition(&self) -> bool {
        self.name.ends_with("definition")
    }
}

/// The parsed theorem GDL.
#[derive(Debug, Clone, Default)]
pub struct TheoremGdl {
    theorems: IndexMap<String, TheoremDefinition>,
}

impl TheoremGdl {
    /// Parse `{"name": {"vars": [...], "para_len": [...], "body": [[[premise
    /// atoms], [conclusion atoms]], ...]}, ...}` against the predicate GDL.
    pub fn parse(value: &Value, gdl: &PredicateGdl) -> Result<TheoremGdl, GdlError> {
        let object = value
            .as_object()
            .ok_or_else(|| GdlError::Malformed("theorem GDL must be an object".into()))?;

        let mut theorems = IndexMap::new();
        for (name, decl) in object {
            let decl = decl.as_object().ok_or_else(|| {
                GdlError::Malformed(format!("declaration of {} must be an object", name))
            })?;
            let vars: Vec<String> = decl
                .get("vars")
                .and_then(Value::as_array)
                .ok_or_else(|| GdlError::Malformed(format!("theorem {} has no vars", name)))?
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            let para_len: Vec<usize> = decl
                .get("para_len")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_u64)
                        .map(|n| n as usize)
                        .collect()
                })
                .unwrap_or_else(|| vec![vars.len()]);

            let body_value = decl
                .get("body")
                .and_then(Value::as_array)
                .ok_or_else(|| GdlError::Malformed(format!("theorem {} has no body", name)))?;
            let mut body = Vec::with_capacity(body_value.len());
            for clause in body_value {
                let pair = clause.as_array().filter(|p| p.len() == 2).ok_or_else(|| {
                    GdlError::Malformed(format!(
                        "theorem {} clause must be a [premises, conclusions] pair",
                        name
                    ))
                })?;
                let premises = pair[0]
                    .as_array()
                    .ok_or_else(|| GdlError::Malformed("premises must be a list".into()))?
                    .iter()
                    .map(|a| parse_pattern_atom(a, gdl))
                    .collect::<Result<Vec<_>, _>>()?;
                let conclusions = pair[1]
                    .as_array()
                    .ok_or_else(|| GdlError::Malformed("conclusions must be a list".into()))?
                    .iter()
                    .map(|a| parse_conclusion_atom(a, gdl))
                    .collect::<Result<Vec<_>, _>>()?;
                if premises.is_empty() {
                    return Err(GdlError::Malformed(format!(
                        "theorem {} has an empty premise pattern",
                        name
                    )));
                }
                body.push(TheoremClause {
                    premises,
                    conclusions,
                });
            }

            theorems.insert(
                name.clone(),
                TheoremDefinition {
                    name: name.clone(),
                    vars,
                    para_len,
                    body,
                },
            );
        }
        Ok(TheoremGdl { theorems })
    }

    pub fn get(&self, name: &str) -> Option<&TheoremDefinition> {
        self.theorems.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&TheoremDefinition, GdlError> {
        self.get(name)
            .ok_or_else(|| GdlError::UnknownTheorem(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TheoremDefinition)> {
        self.theorems.iter()
    }
}

fn atom_parts<'a>(value: &'a Value) -> Result<(&'a str, &'a Vec<Value>), GdlError> {
    let parts = value
        .as_array()
        .filter(|p| p.len() == 2)
        .ok_or_else(|| GdlError::Malformed(format!("atom must be a [name, args] pair: {}", value)))?;
    let name = parts[0]
        .as_str()
        .ok_or_else(|| GdlError::Malformed("atom name must be a string".into()))?;
    let args = parts[1]
        .as_array()
        .ok_or_else(|| GdlError::Malformed("atom args must be a list".into()))?;
    Ok((name, args))
}

fn parse_pattern_atom(value: &Value, gdl: &PredicateGdl) -> Result<PatternAtom, GdlError> {
    let (raw_name, args) = atom_parts(value)?;
    let negated = raw_name.starts_with('~');
    let name = raw_name.trim_start_matches('~');

    if name == "Equal" {
        return Ok(PatternAtom::Algebra {
            negated,
            tree: EqualTree::parse(args, gdl)?,
        });
    }

    let decl = gdl.require(name)?;
    let roles: Vec<String> = args
        .iter()
        .map(|a| {
            a.as_str().map(str::to_string).ok_or_else(|| {
                GdlError::Malformed(format!("roles of {} must be strings", name))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if decl.arity != 0 && roles.len() != decl.arity {
        return Err(GdlError::ItemLength {
            predicate: name.to_string(),
            expected: decl.arity,
            got: roles.len(),
        });
    }
    Ok(PatternAtom::Logic {
        negated,
        predicate: name.to_string(),
        roles,
    })
}

fn parse_conclusion_atom(value: &Value, gdl: &PredicateGdl) -> Result<ConclusionAtom, GdlError> {
    match parse_pattern_atom(value, gdl)? {
        PatternAtom::Logic {
            negated: false,
            predicate,
            roles,
        } => Ok(ConclusionAtom::Logic { predicate, roles }),
        PatternAtom::Algebra {
            negated: false,
            tree,
        } => Ok(ConclusionAtom::Algebra { tree }),
        _ => Err(GdlError::Malformed(
            "conclusions must be positive atoms".into(),
        )),
    }
}

/// Stamp a theorem name with its concrete parameters, grouped by `para_len`:
/// `congruent_triangle_property` over `(A,B,C,D,E,F)` with groups `[3, 3]`
/// becomes `congruent_triangle_property(ABC,DEF)`.
pub fn applied_name(name: &str, para: &[String], para_len: &[usize]) -> String {
    let mut groups: Vec<String> = Vec::with_capacity(para_len.len());
    let mut cursor = 0usize;
    for &len in para_len {
        let end = (cursor + len).min(para.len());
        groups.push(para[cursor..end].concat());
        cursor = end;
    }
    if cursor < para.len() {
        groups.push(para[cursor..].concat());
    }
    format!("{}({})", name, groups.join(","))
}

/// A problem statement in condition-description form.
#[derive(Debug, Clone)]
pub struct ProblemCdl {
    pub facts: Vec<CdlFact>,
    pub goal: GoalCdl,
}

#[derive(Debug, Clone)]
pub enum CdlFact {
    Logic {
        predicate: String,
        points: Vec<String>,
    },
    Equation(ExprTree),
}

#[derive(Debug, Clone)]
pub enum GoalCdl {
    Value { tree: ExprTree, answer: Number },
    Equal { tree: EqualTree },
    Logic {
        predicate: String,
        points: Vec<String>,
    },
}

/// Parse a problem CDL object:
/// `{"predicates": [["Line", ["A","B"]], ["Equation", <tree>]],
///   "goal": {"type": "value", "item": <tree>, "answer": "7"}}`.
pub fn parse_problem(value: &Value, gdl: &PredicateGdl) -> Result<ProblemCdl, GdlError> {
    let object = value
        .as_object()
        .ok_or_else(|| GdlError::Malformed("problem CDL must be an object".into()))?;

    let mut facts = Vec::new();
    let listed = object
        .get("predicates")
        .and_then(Value::as_array)
        .ok_or_else(|| GdlError::Malformed("problem CDL has no predicates list".into()))?;
    for entry in listed {
        let pair = entry.as_array().filter(|p| p.len() == 2).ok_or_else(|| {
            GdlError::Malformed(format!("fact must be a [predicate, item] pair: {}", entry))
        })?;
        let name = pair[0]
            .as_str()
            .ok_or_else(|| GdlError::Malformed("fact predicate must be a string".into()))?;
        if name == "Equation" {
            facts.push(CdlFact::Equation(ExprTree::parse(&pair[1], gdl)?));
            continue;
        }
        let decl = gdl.require(name)?;
        let points: Vec<String> = pair[1]
            .as_array()
            .ok_or_else(|| GdlError::Malformed(format!("item of {} must be a list", name)))?
            .iter()
            .map(|p| {
                p.as_str().map(str::to_string).ok_or_else(|| {
                    GdlError::Malformed(format!("points of {} must be strings", name))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if decl.arity != 0 && points.len() != decl.arity {
            return Err(GdlError::ItemLength {
                predicate: name.to_string(),
                expected: decl.arity,
                got: points.len(),
            });
        }
        facts.push(CdlFact::Logic {
            predicate: name.to_string(),
            points,
        });
    }

    let goal_value = object
        .get("goal")
        .ok_or_else(|| GdlError::Malformed("problem CDL has no goal".into()))?;
    let goal_object = goal_value
        .as_object()
        .ok_or_else(|| GdlError::Malformed("goal must be an object".into()))?;
    let goal_type = goal_object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| GdlError::Malformed("goal has no type".into()))?;

    let goal = match goal_type {
        "value" => {
            let tree = ExprTree::parse(
                goal_object
                    .get("item")
                    .ok_or_else(|| GdlError::Malformed("value goal has no item".into()))?,
                gdl,
            )?;
            let answer = goal_object
                .get("answer")
                .and_then(parse_number_value)
                .ok_or_else(|| GdlError::Malformed("value goal has no numeric answer".into()))?;
            GoalCdl::Value { tree, answer }
        }
        "equal" => {
            let item = goal_object
                .get("item")
                .and_then(Value::as_array)
                .ok_or_else(|| GdlError::Malformed("equal goal item must be a pair".into()))?;
            GoalCdl::Equal {
                tree: EqualTree::parse(item, gdl)?,
            }
        }
        "logic" => {
            let predicate = goal_object
                .get("item")
                .and_then(Value::as_str)
                .ok_or_else(|| GdlError::Malformed("logic goal item must be a predicate".into()))?;
            let points: Vec<String> = goal_object
                .get("answer")
                .and_then(Value::as_array)
                .ok_or_else(|| GdlError::Malformed("logic goal answer must be a list".into()))?
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            gdl.require(predicate)?;
            GoalCdl::Logic {
                predicate: predicate.to_string(),
                points,
            }
        }
        other => {
            return Err(GdlError::Malformed(format!("unknown goal type {}", other)));
        }
    };

    Ok(ProblemCdl { facts, goal })
}

fn parse_number_value(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Number::int)
            .or_else(|| n.as_f64().map(Number::real)),
        Value::String(s) => Number::parse(s),
        _ => None,
    }
}
