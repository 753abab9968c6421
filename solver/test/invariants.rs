// Module: solver/test/invariants.rs
// Property tests of the store and engine invariants: id monotonicity,
// deduplication, pool hygiene, sign symmetry, atom commutativity and
// application idempotence.

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::fixtures::{cdl, solver};
    use crate::formalism::condition::Item;
    use crate::formalism::expressions::Expr;
    use crate::formalism::gdl::{PatternAtom, TheoremGdl};
    use crate::solver::Solver;
    use crate::solver::equations::solve_target;
    use crate::solver::logic;

    fn loaded_solver() -> Solver {
        let mut s = solver();
        s.load_problem(&cdl(
            json!([
                ["Point", ["A"]], ["Point", ["B"]], ["Point", ["C"]], ["Point", ["D"]],
                ["Line", ["A", "B"]], ["Line", ["B", "C"]], ["Line", ["A", "C"]],
                ["Triangle", ["A", "B", "C"]],
                ["Parallel", ["A", "B", "C", "D"]],
                ["Collinear", ["A", "B", "C"]],
                ["Equation", ["Sub", [["LengthOfLine", ["A", "B"]], "2"]]],
                ["Equation", ["Sub", [["LengthOfLine", ["B", "C"]], "3"]]],
            ]),
            json!({"type": "value", "item": ["LengthOfLine", ["A", "C"]], "answer": "5"}),
        ))
        .unwrap();
        s
    }

    #[test]
    fn premise_ids_precede_fact_ids() {
        let mut s = loaded_solver();
        s.apply_theorem("line_addition", None).unwrap();
        s.apply_theorem("parallel_swap", None).unwrap();

        for cond in s.problem.conditions.values() {
            for fact in cond.facts() {
                assert!(
                    fact.premise.iter().all(|&p| p < fact.id),
                    "fact {} has a premise at or after it",
                    fact.id
                );
            }
        }
    }

    #[test]
    fn repeated_adds_return_the_first_id() {
        let mut s = loaded_solver();
        let item = Item::points(&["D", "C", "B", "A"]);
        assert!(s.problem.add("Parallel", item.clone(), vec![0], "t1").unwrap());
        let id = s.problem.id_of("Parallel", &item).unwrap();
        for _ in 0..3 {
            assert!(!s.problem.add("Parallel", item.clone(), vec![1, 2], "t2").unwrap());
            assert_eq!(s.problem.id_of("Parallel", &item), Some(id));
        }
    }

    #[test]
    fn pool_is_clean_after_solving() {
        let mut s = loaded_solver();
        s.apply_theorem("line_addition", None).unwrap();

        let pool = s
            .problem
            .conditions
            .get("Equation")
            .and_then(|c| c.tables())
            .unwrap();
        assert!(
            pool.equations
                .values()
                .all(|e| e.free_symbols().len() >= 2),
            "working pool still holds a trivial equation"
        );
    }

    #[test]
    fn target_resolution_is_sign_symmetric() {
        let mut s = loaded_solver();
        let ab = s
            .problem
            .get_sym("LengthOfLine", &["A".into(), "B".into()])
            .unwrap();
        let target = Expr::sub(Expr::Sym(ab), Expr::int(1));

        let pos = solve_target(&mut s.problem, &target).unwrap();
        let neg = solve_target(&mut s.problem, &Expr::neg(target)).unwrap();
        match (pos, neg) {
            (Some((a, _)), Some((b, _))) => {
                assert!((a.as_f64() + b.as_f64()).abs() < 1e-9);
            }
            (None, None) => {}
            other => panic!("sign-asymmetric resolution: {:?}", other),
        }
    }

    #[test]
    fn positive_logic_atoms_commute() {
        let mut s = loaded_solver();
        let gdl = s.predicate_gdl().clone();
        let parse = |atoms: serde_json::Value| -> Vec<PatternAtom> {
            let wrapped = json!({
                "probe": {"vars": ["x", "y", "z"], "body": [[atoms, []]]}
            });
            TheoremGdl::parse(&wrapped, &gdl)
                .unwrap()
                .require("probe")
                .unwrap()
                .body[0]
                .premises
                .clone()
        };

        let forward = parse(json!([
            ["Triangle", ["x", "y", "z"]],
            ["Line", ["x", "y"]],
            ["Line", ["y", "z"]]
        ]));
        let swapped = parse(json!([
            ["Triangle", ["x", "y", "z"]],
            ["Line", ["y", "z"]],
            ["Line", ["x", "y"]]
        ]));

        let a = logic::run(&forward, &mut s.problem).unwrap();
        let b = logic::run(&swapped, &mut s.problem).unwrap();
        assert_eq!(a.vars, b.vars);
        assert_eq!(a.items, b.items);
        assert_eq!(a.ids, b.ids);
    }

    #[test]
    fn accurate_application_is_idempotent() {
        let mut s = loaded_solver();
        let para: Vec<String> = ["A", "B", "C", "D"].iter().map(|p| p.to_string()).collect();
        assert!(s.apply_theorem("parallel_swap", Some(&para)).unwrap());
        let count = s.problem.next_id();
        assert!(!s.apply_theorem("parallel_swap", Some(&para)).unwrap());
        assert_eq!(s.problem.next_id(), count);
    }

    #[test]
    fn provenance_closes_at_initial_facts() {
        let mut s = loaded_solver();
        s.apply_theorem("line_addition", None).unwrap();
        s.apply_theorem("parallel_swap", None).unwrap();

        let all_ids: Vec<usize> = (0..s.problem.next_id()).collect();
        let trace = s.problem.proof_trace(&all_ids);
        assert_eq!(trace.len(), all_ids.len());
        for step in &trace {
            if step.premise.is_empty() {
                assert_eq!(step.theorem, "init_problem");
            }
        }
    }
}
