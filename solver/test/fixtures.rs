// Module: solver/test/fixtures.rs
// Shared GDL fixtures: a small plane-geometry predicate set and a handful of
// theorems exercising every atom kind.

use serde_json::{Value, json};

use crate::formalism::problem::ReasonerConfig;
use crate::solver::Solver;

pub fn predicate_gdl() -> Value {
    json!({
        "Point": {"arity": 1, "category": "BasicEntity"},
        "Line": {"arity": 2, "category": "BasicEntity"},
        "Triangle": {"arity": 3, "category": "Entity"},
        "Collinear": {"arity": 3, "category": "Construction"},
        "Parallel": {"arity": 4, "category": "Relation"},
        "LengthOfLine": {"arity": 2, "category": "Attribution", "sym": "ll"},
        "MeasureOfAngle": {"arity": 3, "category": "Attribution", "sym": "ma"},
    })
}

pub fn theorem_gdl() -> Value {
    json!({
        "triangle_property": {
            "vars": ["x", "y", "z"],
            "para_len": [3],
            "body": [[
                [["Triangle", ["x", "y", "z"]],
                 ["Line", ["x", "y"]],
                 ["Line", ["y", "z"]],
                 ["Line", ["x", "z"]]],
                []
            ]]
        },
        "scalene_filter": {
            "vars": ["x", "y", "z"],
            "para_len": [3],
            "body": [[
                [["Triangle", ["x", "y", "z"]],
                 ["~Collinear", ["x", "y", "z"]]],
                []
            ]]
        },
        "parallel_swap": {
            "vars": ["a", "b", "c", "d"],
            "para_len": [2, 2],
            "body": [[
                [["Parallel", ["a", "b", "c", "d"]]],
                [["Parallel", ["c", "d", "a", "b"]]]
            ]]
        },
        "line_addition": {
            "vars": ["a", "b", "c"],
            "para_len": [3],
            "body": [[
                [["Collinear", ["a", "b", "c"]]],
                [["Equal", [
                    ["LengthOfLine", ["a", "c"]],
                    ["Add", [["LengthOfLine", ["a", "b"]], ["LengthOfLine", ["b", "c"]]]]
                ]]]
            ]]
        },
        "isosceles_definition": {
            "vars": ["x", "y", "z"],
            "para_len": [3],
            "body": [[
                [["Triangle", ["x", "y", "z"]]],
                []
            ]]
        }
    })
}

pub fn solver() -> Solver {
    Solver::new(&predicate_gdl(), &theorem_gdl()).expect("fixture GDL parses")
}

pub fn solver_with_config(config: ReasonerConfig) -> Solver {
    Solver::with_config(&predicate_gdl(), &theorem_gdl(), config).expect("fixture GDL parses")
}

/// Points A..=last plus a fact list, as a CDL value.
pub fn cdl(facts: Value, goal: Value) -> Value {
    json!({ "predicates": facts, "goal": goal })
}
