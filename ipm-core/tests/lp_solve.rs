//! End-to-end LP solves through the public interface.

use ipm_core::{solve, ConstraintKind, Ipm, LpProblem, NlaMode, Options, Status};

fn assert_near(got: f64, want: f64, tol: f64, what: &str) {
    assert!(
        (got - want).abs() < tol,
        "{}: got {}, want {}",
        what,
        got,
        want
    );
}

/// min x0 + 2 x1  s.t.  x0 + x1 = 1, 0 <= x <= 10. Optimum at (1, 0).
fn equality_lp() -> LpProblem {
    LpProblem {
        num_var: 2,
        num_con: 1,
        obj: vec![1.0, 2.0],
        rhs: vec![1.0],
        lower: vec![0.0, 0.0],
        upper: vec![10.0, 10.0],
        a_ptr: vec![0, 1, 2],
        a_rows: vec![0, 0],
        a_vals: vec![1.0, 1.0],
        constraints: vec![ConstraintKind::Eq],
        name: "equality-lp".to_string(),
    }
}

#[test]
fn equality_only_lp_reaches_optimal() {
    let result = solve(&equality_lp(), &Options::default()).unwrap();

    assert_eq!(result.status, Status::Optimal);
    assert!(result.iterations <= 50, "took {} iterations", result.iterations);
    assert_near(result.solution.x[0], 1.0, 1e-6, "x0");
    assert_near(result.solution.x[1], 0.0, 1e-6, "x1");
}

#[test]
fn equality_lp_solves_through_augmented_system() {
    let options = Options {
        nla: NlaMode::Augmented,
        ..Options::default()
    };
    let result = solve(&equality_lp(), &options).unwrap();

    assert_eq!(result.status, Status::Optimal);
    assert_near(result.solution.x[0], 1.0, 1e-6, "x0");
    assert_near(result.solution.x[1], 0.0, 1e-6, "x1");
}

#[test]
fn inequalities_and_free_variable_converge() {
    // min x0  s.t.  x0 + x1 <= 4, x0 - x1 = 1, x0 in [0, 3], x1 free.
    // Optimum x0 = 0, x1 = -1.
    let problem = LpProblem {
        num_var: 2,
        num_con: 2,
        obj: vec![1.0, 0.0],
        rhs: vec![4.0, 1.0],
        lower: vec![0.0, f64::NEG_INFINITY],
        upper: vec![3.0, f64::INFINITY],
        a_ptr: vec![0, 2, 4],
        a_rows: vec![0, 1, 0, 1],
        a_vals: vec![1.0, 1.0, 1.0, -1.0],
        constraints: vec![ConstraintKind::Le, ConstraintKind::Eq],
        name: "free-var".to_string(),
    };
    let result = solve(&problem, &Options::default()).unwrap();

    assert_eq!(result.status, Status::Optimal);
    assert_near(result.solution.x[0], 0.0, 1e-6, "x0");
    assert_near(result.solution.x[1], -1.0, 1e-6, "x1");
    // the slack of the <= row absorbs the leftover capacity
    assert_near(result.solution.slack[0], 5.0, 1e-5, "slack0");
    assert_near(result.solution.slack[1], 0.0, 1e-6, "slack1");

    // free variable reports the conventional bound components
    assert_eq!(result.solution.xl[1], f64::INFINITY);
    assert_eq!(result.solution.xu[1], f64::INFINITY);
    assert_eq!(result.solution.zl[1], 0.0);
    assert_eq!(result.solution.zu[1], 0.0);
}

#[test]
fn zero_row_solves_without_scaling() {
    // row 1 is all zeros with rhs 0; Curtis-Reid rejects the matrix and
    // the solve falls back to unscaled data
    let problem = LpProblem {
        num_var: 2,
        num_con: 2,
        obj: vec![1.0, 1.0],
        rhs: vec![2.0, 0.0],
        lower: vec![0.0, 0.0],
        upper: vec![f64::INFINITY, f64::INFINITY],
        a_ptr: vec![0, 1, 2],
        a_rows: vec![0, 0],
        a_vals: vec![1.0, 2.0],
        constraints: vec![ConstraintKind::Eq, ConstraintKind::Eq],
        name: "zero-row".to_string(),
    };
    let result = solve(&problem, &Options::default()).unwrap();

    assert_eq!(result.status, Status::Optimal);
    assert_near(
        result.solution.x[0] + result.solution.x[1] * 2.0,
        2.0,
        1e-6,
        "feasibility",
    );
    // min x0 + x1 favours the column with the larger coefficient
    assert_near(result.solution.x[1], 1.0, 1e-5, "x1");
}

#[test]
fn scaled_problem_recovers_unscaled_solution() {
    // max x0 + x1, i.e. min -x0 - x1, with non-unit coefficients so the
    // Curtis-Reid pass actually runs
    let problem = LpProblem {
        num_var: 2,
        num_con: 2,
        obj: vec![-1.0, -1.0],
        rhs: vec![4.0, 6.0],
        lower: vec![0.0, 0.0],
        upper: vec![10.0, 10.0],
        a_ptr: vec![0, 2, 4],
        a_rows: vec![0, 1, 0, 1],
        a_vals: vec![2.0, 1.0, 1.0, 3.0],
        constraints: vec![ConstraintKind::Le, ConstraintKind::Le],
        name: "scaled".to_string(),
    };
    let result = solve(&problem, &Options::default()).unwrap();

    assert_eq!(result.status, Status::Optimal);
    assert_near(result.solution.x[0], 1.2, 1e-6, "x0");
    assert_near(result.solution.x[1], 1.6, 1e-6, "x1");

    // duals price both binding rows
    let y = &result.solution.y;
    assert_near(2.0 * y[0] + y[1], -1.0, 1e-5, "dual row for x0");
    assert_near(y[0] + 3.0 * y[1], -1.0, 1e-5, "dual row for x1");
}

#[test]
fn ge_constraint_slack_is_reported() {
    // min x0  s.t.  x0 >= 2 expressed as a >= row
    let problem = LpProblem {
        num_var: 1,
        num_con: 1,
        obj: vec![1.0],
        rhs: vec![2.0],
        lower: vec![0.0],
        upper: vec![f64::INFINITY],
        a_ptr: vec![0, 1],
        a_rows: vec![0],
        a_vals: vec![1.0],
        constraints: vec![ConstraintKind::Ge],
        name: "ge-row".to_string(),
    };
    let result = solve(&problem, &Options::default()).unwrap();

    assert_eq!(result.status, Status::Optimal);
    assert_near(result.solution.x[0], 2.0, 1e-6, "x0");
    assert_near(result.solution.slack[0], 0.0, 1e-6, "slack0");
}

#[test]
fn iterates_stay_interior_and_mu_decreases() {
    let mut solver = Ipm::new(&equality_lp(), Options::default()).unwrap();
    let status = solver.solve();
    assert_eq!(status, Status::Optimal);

    let records = solver.diagnostics();
    assert!(!records.is_empty());

    // complementarity products stay strictly positive at every iteration
    for rec in records {
        assert!(
            rec.min_prod > 0.0,
            "iteration {} lost positivity: min product {}",
            rec.iter,
            rec.min_prod
        );
    }

    // within any 5 consecutive iterations mu decreases at least once
    for window in records.windows(5) {
        let decreased = window.windows(2).any(|w| w[1].mu < w[0].mu);
        assert!(decreased, "mu stalled around iteration {}", window[0].iter);
    }

    // backward errors of the Newton solves stay small
    for rec in records {
        assert!(
            rec.nw_back_err < 1e-6,
            "iteration {} has backward error {}",
            rec.iter,
            rec.nw_back_err
        );
    }
}

#[test]
fn infeasible_equalities_do_not_report_optimal() {
    // x0 = 1 and x0 = 2 cannot both hold
    let problem = LpProblem {
        num_var: 1,
        num_con: 2,
        obj: vec![1.0],
        rhs: vec![1.0, 2.0],
        lower: vec![f64::NEG_INFINITY],
        upper: vec![f64::INFINITY],
        a_ptr: vec![0, 2],
        a_rows: vec![0, 1],
        a_vals: vec![1.0, 1.0],
        constraints: vec![ConstraintKind::Eq, ConstraintKind::Eq],
        name: "infeasible".to_string(),
    };
    let result = solve(&problem, &Options::default()).unwrap();

    assert_ne!(result.status, Status::Optimal);
    assert!(result.iterations <= 100);
}

#[test]
fn invalid_input_is_rejected_up_front() {
    let mut problem = equality_lp();
    problem.a_rows[0] = 5;
    assert!(solve(&problem, &Options::default()).is_err());
}
