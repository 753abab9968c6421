// Module: solver/test/scenarios.rs
// End-to-end scenarios: algebra propagation, matching, provenance and
// timeout recovery, each through the public Solver surface.

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::time::Duration;

    use super::super::fixtures::{cdl, solver, solver_with_config};
    use crate::formalism::condition::Item;
    use crate::formalism::expressions::{Expr, Number};
    use crate::formalism::gdl::GdlError;
    use crate::formalism::problem::ReasonerConfig;
    use crate::solver::equations::solve_target;
    use crate::solver::logic;

    #[test]
    fn trivial_algebra_chain_solves_the_goal() {
        let mut s = solver();
        s.load_problem(&cdl(
            json!([
                ["Equation", ["Sub", ["a", "3"]]],
                ["Equation", ["Sub", [["Sub", ["b", "a"]], "4"]]],
            ]),
            json!({"type": "value", "item": "b", "answer": "7"}),
        ))
        .unwrap();

        let a = s.problem.get_sym("Free", &["a".into()]).unwrap();
        let b = s.problem.get_sym("Free", &["b".into()]).unwrap();
        assert_eq!(s.problem.value_of_sym(&a), Some(Number::int(3)));
        assert_eq!(s.problem.value_of_sym(&b), Some(Number::int(7)));

        assert!(s.check_goal().unwrap());
        let goal = s.problem.goal.clone().unwrap();
        assert_eq!(goal.solved_answer, Some(Number::int(7)));
        // the goal rests on exactly the two initial equations
        assert_eq!(goal.premise, vec![0, 1]);
        assert_eq!(goal.theorem.as_deref(), Some("solve_eq"));
    }

    #[test]
    fn under_determined_goal_stays_open() {
        let mut s = solver();
        s.load_problem(&cdl(
            json!([["Equation", ["Sub", [["Add", ["a", "b"]], "5"]]]]),
            json!({"type": "value", "item": "a", "answer": "2"}),
        ))
        .unwrap();

        assert!(!s.check_goal().unwrap());
        let goal = s.problem.goal.clone().unwrap();
        assert!(!goal.solved);
        assert_eq!(goal.solved_answer, None);
        // no facts beyond the initial equation were committed
        assert_eq!(s.problem.next_id(), 1);
    }

    #[test]
    fn positive_logic_pattern_finds_one_binding() {
        let mut s = solver();
        s.load_problem(&cdl(
            json!([
                ["Point", ["A"]], ["Point", ["B"]], ["Point", ["C"]],
                ["Line", ["A", "B"]], ["Line", ["B", "C"]], ["Line", ["A", "C"]],
                ["Triangle", ["A", "B", "C"]],
            ]),
            json!({"type": "logic", "item": "Triangle", "answer": ["A", "B", "C"]}),
        ))
        .unwrap();

        let def = s.theorem_gdl().require("triangle_property").unwrap().clone();
        let relation = logic::run(&def.body[0].premises, &mut s.problem).unwrap();
        assert_eq!(relation.len(), 1);
        assert_eq!(relation.vars, vec!["x", "y", "z"]);
        assert_eq!(
            relation.items[0],
            vec!["A".to_string(), "B".to_string(), "C".to_string()]
        );
        // each joined atom contributed its fact id
        assert_eq!(relation.ids[0].len(), 4);
    }

    #[test]
    fn negated_logic_atom_filters_on_the_current_store() {
        let mut s = solver();
        s.load_problem(&cdl(
            json!([
                ["Point", ["A"]], ["Point", ["B"]], ["Point", ["C"]],
                ["Triangle", ["A", "B", "C"]],
            ]),
            json!({"type": "logic", "item": "Triangle", "answer": ["A", "B", "C"]}),
        ))
        .unwrap();

        let def = s.theorem_gdl().require("scalene_filter").unwrap().clone();
        let relation = logic::run(&def.body[0].premises, &mut s.problem).unwrap();
        assert_eq!(relation.len(), 1);

        s.problem
            .add("Collinear", Item::points(&["A", "B", "C"]), vec![], "t")
            .unwrap();
        let relation = logic::run(&def.body[0].premises, &mut s.problem).unwrap();
        assert!(relation.is_empty());
    }

    #[test]
    fn provenance_of_an_applied_theorem() {
        let mut s = solver();
        s.load_problem(&cdl(
            json!([
                ["Point", ["A"]], ["Point", ["B"]], ["Point", ["C"]], ["Point", ["D"]],
                ["Parallel", ["A", "B", "C", "D"]],
            ]),
            json!({"type": "logic", "item": "Parallel", "answer": ["C", "D", "A", "B"]}),
        ))
        .unwrap();

        assert!(s.apply_theorem("parallel_swap", None).unwrap());
        let swapped = Item::points(&["C", "D", "A", "B"]);
        let id = s.problem.id_of("Parallel", &swapped).unwrap();
        let (_, fact) = s.problem.fact(id).unwrap();
        assert_eq!(fact.theorem, "parallel_swap(AB,CD)");
        assert_eq!(
            fact.premise,
            vec![s.problem.id_of("Parallel", &Item::points(&["A", "B", "C", "D"])).unwrap()]
        );

        // re-application adds nothing
        assert!(!s.apply_theorem("parallel_swap", None).unwrap());

        assert!(s.check_goal().unwrap());
        let goal = s.problem.goal.clone().unwrap();
        assert_eq!(goal.theorem.as_deref(), Some("parallel_swap(AB,CD)"));
    }

    #[test]
    fn accurate_mode_respects_the_binding() {
        let mut s = solver();
        s.load_problem(&cdl(
            json!([
                ["Point", ["A"]], ["Point", ["B"]], ["Point", ["C"]], ["Point", ["D"]],
                ["Parallel", ["A", "B", "C", "D"]],
            ]),
            json!({"type": "logic", "item": "Parallel", "answer": ["C", "D", "A", "B"]}),
        ))
        .unwrap();

        let para: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        assert!(s.apply_theorem("parallel_swap", Some(&para)).unwrap());
        // an unmet binding silently yields nothing
        let unmet: Vec<String> = ["B", "A", "D", "C"].iter().map(|s| s.to_string()).collect();
        assert!(!s.apply_theorem("parallel_swap", Some(&unmet)).unwrap());
    }

    #[test]
    fn algebraic_conclusion_feeds_the_equation_engine() {
        let mut s = solver();
        s.load_problem(&cdl(
            json!([
                ["Point", ["A"]], ["Point", ["B"]], ["Point", ["C"]],
                ["Collinear", ["A", "B", "C"]],
                ["Equation", ["Sub", [["LengthOfLine", ["A", "B"]], "2"]]],
                ["Equation", ["Sub", [["LengthOfLine", ["B", "C"]], "3"]]],
            ]),
            json!({"type": "value", "item": ["LengthOfLine", ["A", "C"]], "answer": "5"}),
        ))
        .unwrap();

        assert!(s.apply_theorem("line_addition", None).unwrap());
        assert!(s.check_goal().unwrap());
        let goal = s.problem.goal.clone().unwrap();
        assert_eq!(goal.solved_answer, Some(Number::int(5)));

        // the report's proof trace bottoms out at initial facts
        let report = s.solution_report();
        assert!(report.solved);
        assert!(!report.trace.is_empty());
        assert!(
            report
                .trace
                .iter()
                .filter(|t| t.premise.is_empty())
                .all(|t| t.theorem == "init_problem")
        );
    }

    #[test]
    fn definition_theorems_refuse_forward_application() {
        let mut s = solver();
        s.load_problem(&cdl(
            json!([["Point", ["A"]]]),
            json!({"type": "logic", "item": "Triangle", "answer": ["A", "B", "C"]}),
        ))
        .unwrap();

        let err = s.apply_theorem("isosceles_definition", None);
        assert!(matches!(err, Err(GdlError::DefinitionOnly(_))));
        let err = s.apply_theorem("no_such_theorem", None);
        assert!(matches!(err, Err(GdlError::UnknownTheorem(_))));
        let short: Vec<String> = vec!["A".to_string()];
        let err = s.apply_theorem("parallel_swap", Some(&short));
        assert!(matches!(err, Err(GdlError::TheoremParaLength { .. })));
    }

    #[test]
    fn selection_mode_round_trip() {
        let mut s = solver();
        s.load_problem(&cdl(
            json!([
                ["Point", ["A"]], ["Point", ["B"]], ["Point", ["C"]], ["Point", ["D"]],
                ["Parallel", ["A", "B", "C", "D"]],
            ]),
            json!({"type": "logic", "item": "Parallel", "answer": ["C", "D", "A", "B"]}),
        ))
        .unwrap();

        let selection = s.try_theorem("parallel_swap").unwrap();
        assert_eq!(selection.len(), 1);
        // nothing committed yet
        assert!(s.problem.id_of("Parallel", &Item::points(&["C", "D", "A", "B"])).is_none());

        assert!(s.apply_selection(&selection).unwrap());
        assert!(s.problem.id_of("Parallel", &Item::points(&["C", "D", "A", "B"])).is_some());
    }

    #[test]
    fn timeout_warns_and_later_targets_still_solve() {
        let mut s = solver_with_config(ReasonerConfig {
            solve_budget: Duration::ZERO,
            ..ReasonerConfig::default()
        });
        s.load_problem(&cdl(
            json!([["Equation", ["Sub", ["a", "3"]]]]),
            json!({"type": "value", "item": "a", "answer": "3"}),
        ))
        .unwrap();

        let a = s.problem.get_sym("Free", &["a".into()]).unwrap();
        // the zero budget blocked the solve; no value was committed
        assert_eq!(s.problem.value_of_sym(&a), None);

        // an easier later target under a sane budget succeeds
        s.problem.config.solve_budget = Duration::from_millis(2000);
        let resolved = solve_target(&mut s.problem, &Expr::Sym(a.clone())).unwrap();
        assert_eq!(resolved.map(|(v, _)| v), Some(Number::int(3)));
        assert_eq!(s.problem.value_of_sym(&a), Some(Number::int(3)));
    }

    #[test]
    fn backward_sub_goals_for_an_algebra_goal() {
        let mut s = solver();
        s.load_problem(&cdl(
            json!([
                ["Point", ["A"]], ["Point", ["B"]], ["Point", ["C"]],
                ["Collinear", ["A", "B", "C"]],
                ["Equation", ["Sub", [["LengthOfLine", ["A", "B"]], "2"]]],
                ["Equation", ["Sub", [["LengthOfLine", ["B", "C"]], "3"]]],
            ]),
            json!({"type": "value", "item": ["LengthOfLine", ["A", "C"]], "answer": "5"}),
        ))
        .unwrap();

        let target = s
            .problem
            .get_sym("LengthOfLine", &["A".into(), "C".into()])
            .unwrap();
        let item = Item::Equation(Expr::Sym(target));
        let sub_goals = s.find_sub_goals("Equation", &item).unwrap();

        let key = (
            "line_addition".to_string(),
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
        );
        assert!(sub_goals.contains_key(&key));
        let alternatives = sub_goals.get(&key).unwrap();
        assert!(alternatives.iter().any(|alt| {
            alt.iter()
                .any(|(p, i)| p == "Collinear" && i == &Item::points(&["A", "B", "C"]))
        }));
    }
}
