//! Linear solver interface.
//!
//! The Newton systems of the IPM are solved either through the augmented
//! (quasi-definite) form
//!
//! ```text
//! [ -Theta^{-1}  A^T ] [ dx ]   [ rhs_x ]
//! [  A           0   ] [ dy ] = [ rhs_y ]
//! ```
//!
//! or through the normal equations A * Theta * A^T * dy = rhs. Forming the
//! triangle a back end needs is delegated to the back end itself; callers
//! hand over A and Theta^{-1} only.
//!
//! A factorization is usable only while `valid()` is true. Every factor
//! call first resets validity and sets it again on success; `clear()`
//! invalidates explicitly at the start of each IPM iteration.

use thiserror::Error;

use super::sparse::SparseCsc;
use crate::problem::Options;

/// Back-end failure, one variant per failure mode so callers can tell the
/// stages apart.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The factorization would exceed its memory budget.
    #[error("linear solver out of memory: {0}")]
    OutOfMemory(String),

    /// Symbolic analysis failed.
    #[error("symbolic analysis failed: {0}")]
    Analyse(String),

    /// Numeric factorization failed, e.g. a zero pivot.
    #[error("numeric factorization failed: {0}")]
    Factorise(String),

    /// Triangular solve failed or was attempted without a factorization.
    #[error("linear solve failed: {0}")]
    Solve(String),
}

/// Interface for solving the augmented system or the normal equations.
pub trait LinearSolver {
    /// One-time preparation for a constraint matrix: symbolic analysis and
    /// workspace sizing. Called once per solve, before the first factor.
    fn setup(&mut self, a: &SparseCsc, options: &Options) -> Result<(), SolverError>;

    /// Factor the augmented system for the given scaling.
    fn factor_as(&mut self, a: &SparseCsc, theta_inv: &[f64]) -> Result<(), SolverError>;

    /// Solve the augmented system. Requires a valid factorization from
    /// `factor_as`.
    fn solve_as(
        &mut self,
        rhs_x: &[f64],
        rhs_y: &[f64],
        lhs_x: &mut [f64],
        lhs_y: &mut [f64],
    ) -> Result<(), SolverError>;

    /// Factor the normal equations A * Theta * A^T for the given scaling.
    fn factor_ne(&mut self, a: &SparseCsc, theta_inv: &[f64]) -> Result<(), SolverError>;

    /// Solve the normal equations. Requires a valid factorization from
    /// `factor_ne`.
    fn solve_ne(&mut self, rhs: &[f64], lhs: &mut [f64]) -> Result<(), SolverError>;

    /// Whether a factorization is currently available.
    fn valid(&self) -> bool;

    /// Invalidate the current numeric factorization.
    fn clear(&mut self);

    /// Release factorization resources at the end of a solve.
    fn finalise(&mut self);

    /// Estimated factorization flop count, available after `setup`.
    fn flops(&self) -> f64;

    /// Nonzeros in the triangular factor, available after `setup`.
    fn nz(&self) -> f64;
}
