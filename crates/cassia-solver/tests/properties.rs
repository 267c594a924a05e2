use cassia_solver::{Constraint, SimplexSolver, Strength};
use proptest::prelude::*;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * (1.0 + a.abs().max(b.abs()))
}

fn strength_from(level: u8) -> Strength {
    match level % 3 {
        0 => Strength::WEAK,
        1 => Strength::MEDIUM,
        _ => Strength::STRONG,
    }
}

proptest! {
    #[test]
    fn required_equality_holds(
        x0 in -1000.0f64..1000.0,
        y0 in -1000.0f64..1000.0,
        offset in -100.0f64..100.0,
    ) {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", x0);
        let y = solver.create_variable("y", y0);
        solver.add_stay(x, Strength::WEAK, 1.0).unwrap();
        solver.add_stay(y, Strength::WEAK, 1.0).unwrap();
        solver.add_constraint(Constraint::equation(y, x + offset)).unwrap();

        prop_assert!(close(solver.value(y), solver.value(x) + offset));
    }

    #[test]
    fn stronger_constraint_wins(
        strong in -500.0f64..500.0,
        weak in -500.0f64..500.0,
        weak_weight in 1.0f64..100.0,
    ) {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        solver
            .add_constraint(
                Constraint::equation(x, weak)
                    .with_strength(Strength::WEAK)
                    .with_weight(weak_weight),
            )
            .unwrap();
        solver
            .add_constraint(Constraint::equation(x, strong).with_strength(Strength::STRONG))
            .unwrap();

        prop_assert!(close(solver.value(x), strong));
    }

    #[test]
    fn second_solve_reports_nothing(
        targets in prop::collection::vec((-100.0f64..100.0, 0u8..3), 1..8),
    ) {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        let y = solver.create_variable("y", 0.0);
        solver.add_stay(y, Strength::WEAK, 1.0).unwrap();
        for (target, level) in targets {
            solver
                .add_constraint(Constraint::equation(x, target).with_strength(strength_from(level)))
                .unwrap();
        }

        solver.solve().unwrap();
        prop_assert!(solver.solve().unwrap().is_empty());
    }

    #[test]
    fn removed_constraint_frees_variable(
        pinned in -100.0f64..100.0,
        suggested in -100.0f64..100.0,
    ) {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        solver.add_stay(x, Strength::WEAK, 1.0).unwrap();
        let pin = solver.add_constraint(Constraint::equation(x, pinned)).unwrap();
        prop_assert!(close(solver.value(x), pinned));

        solver.remove_constraint(pin).unwrap();
        solver.set_edited_value(x, suggested).unwrap();
        prop_assert!(close(solver.value(x), suggested));
    }

    #[test]
    fn edit_suggestion_is_exact(
        factor in 0.5f64..4.0,
        offset in -50.0f64..50.0,
        suggested in -200.0f64..200.0,
    ) {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        let y = solver.create_variable("y", 0.0);
        solver.add_stay(x, Strength::WEAK, 1.0).unwrap();
        solver.add_stay(y, Strength::WEAK, 1.0).unwrap();
        solver
            .add_constraint(Constraint::equation(y, x * factor + offset))
            .unwrap();

        solver.add_edit_var(x, Strength::STRONG, 1.0).unwrap();
        solver.begin_edit().unwrap();
        solver.suggest_value(x, suggested).unwrap();
        solver.resolve().unwrap();

        prop_assert!(close(solver.value(x), suggested));
        prop_assert!(close(solver.value(y), suggested * factor + offset));
        solver.end_edit().unwrap();
    }
}
