//! Primal-dual interior point method for linear programming.
//!
//! Solves LPs in standard form with two-sided bounds,
//!
//! ```text
//! min   c^T x
//! s.t.  A x {<=, =, >=} b
//!       lower <= x <= upper
//! ```
//!
//! by a long-step path-following method with Mehrotra predictor steps and
//! Gondzio multiple centrality correctors. Inequalities become equalities
//! through slack columns, the data is equilibrated by Curtis-Reid
//! power-of-two scaling, and the Newton systems are solved through either
//! the quasi-definite augmented form or the normal equations, behind a
//! replaceable factorization back end.
//!
//! # Example
//!
//! ```no_run
//! use ipm_core::{solve, ConstraintKind, LpProblem, Options, Status};
//!
//! // min x0 + x1  s.t.  x0 + x1 = 1, x >= 0
//! let problem = LpProblem {
//!     num_var: 2,
//!     num_con: 1,
//!     obj: vec![1.0, 1.0],
//!     rhs: vec![1.0],
//!     lower: vec![0.0, 0.0],
//!     upper: vec![f64::INFINITY, f64::INFINITY],
//!     a_ptr: vec![0, 1, 2],
//!     a_rows: vec![0, 0],
//!     a_vals: vec![1.0, 1.0],
//!     constraints: vec![ConstraintKind::Eq],
//!     name: "example".to_string(),
//! };
//!
//! let result = solve(&problem, &Options::default())?;
//! assert_eq!(result.status, Status::Optimal);
//! println!("x = {:?}", result.solution.x);
//! # Ok::<(), ipm_core::IpmError>(())
//! ```

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]

pub mod ipm;
pub mod linalg;
pub mod model;
pub mod problem;
pub mod scaling;

pub use ipm::{Ipm, IpmError};
pub use problem::{
    ConstraintKind, FactKind, LpProblem, ModelError, NlaMode, Options, Solution, SolveResult,
    Status,
};

/// Solve an LP to the default tolerances.
///
/// Returns an error only when the input is rejected; numerical failures
/// during the iterations surface as `Status::Error` in the result.
pub fn solve(problem: &LpProblem, options: &Options) -> Result<SolveResult, IpmError> {
    let mut solver = Ipm::new(problem, options.clone())?;
    let status = solver.solve();
    Ok(SolveResult {
        status,
        solution: solver.solution(),
        iterations: solver.iterations(),
    })
}
