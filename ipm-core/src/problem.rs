//! Problem data, options and result types.
//!
//! The solver consumes an LP in the form
//!
//! ```text
//! min   c^T x
//! s.t.  A x {<=, =, >=} b
//!       lower <= x <= upper
//! ```
//!
//! with A in column-compressed form. Input arrays are wrapped into owned
//! containers once, at construction; nothing borrows caller memory across
//! iterations.

use std::fmt;

use thiserror::Error;

/// Constraint sense of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Row i requires (Ax)_i <= b_i.
    Le,
    /// Row i requires (Ax)_i = b_i.
    Eq,
    /// Row i requires (Ax)_i >= b_i.
    Ge,
}

/// Linear system used for the Newton steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NlaMode {
    /// Factor the quasi-definite augmented system of size n + m.
    Augmented,
    /// Factor the normal equations A * Theta * A^T of size m.
    NormEq,
}

/// Factorization kind hint for the back end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactKind {
    /// Positive definite Cholesky.
    Cholesky,
    /// Symmetric indefinite LDL^T.
    Ldlt,
}

/// Run-time options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Newton system formulation.
    pub nla: NlaMode,
    /// Factorization hint for the back end.
    pub fact: FactKind,
    /// Whether the caller intends to run a crossover afterwards. The
    /// interior solve itself is unaffected.
    pub crossover: bool,
    /// Print the per-iteration table.
    pub verbose: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            nla: NlaMode::NormEq,
            fact: FactKind::Ldlt,
            crossover: false,
            verbose: false,
        }
    }
}

/// Final state of the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A back-end or numerical failure aborted the solve.
    Error,
    /// The iteration cap was reached.
    MaxIter,
    /// Too many consecutive iterations with tiny step sizes.
    NoProgress,
    /// All termination measures below tolerance.
    Optimal,
    /// Interior point accepted by an external refinement stage.
    PrimalDualFeasible,
    /// Basic solution produced by an external crossover.
    Basic,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Error => "Error",
            Status::MaxIter => "Max iterations",
            Status::NoProgress => "No progress",
            Status::Optimal => "Optimal",
            Status::PrimalDualFeasible => "Primal-dual feasible",
            Status::Basic => "Basic",
        };
        write!(f, "{}", s)
    }
}

/// Ways the input can be rejected.
#[derive(Debug, Error)]
pub enum ModelError {
    /// An array has the wrong length for the stated dimensions.
    #[error("{name} has length {got}, expected {expected}")]
    BadLength {
        /// Array name.
        name: &'static str,
        /// Length found.
        got: usize,
        /// Length required.
        expected: usize,
    },

    /// Column pointers are not a valid compressed layout.
    #[error("column pointers are not non-decreasing from zero")]
    BadColumnPointers,

    /// A row index is outside [0, num_con).
    #[error("row index {index} out of range for {num_con} constraints")]
    RowIndexOutOfRange {
        /// Offending index.
        index: usize,
        /// Number of constraints.
        num_con: usize,
    },

    /// A matrix value or cost coefficient is NaN or infinite.
    #[error("matrix entry {0} is not finite")]
    NonFiniteValue(usize),

    /// A variable has an empty bound interval.
    #[error("variable {0} has lower bound above upper bound")]
    EmptyBounds(usize),
}

/// An LP instance in raw column-compressed form.
#[derive(Debug, Clone)]
pub struct LpProblem {
    /// Number of structural variables.
    pub num_var: usize,
    /// Number of constraints.
    pub num_con: usize,
    /// Objective coefficients, length `num_var`.
    pub obj: Vec<f64>,
    /// Right-hand sides, length `num_con`.
    pub rhs: Vec<f64>,
    /// Lower bounds, length `num_var`, -inf allowed.
    pub lower: Vec<f64>,
    /// Upper bounds, length `num_var`, +inf allowed.
    pub upper: Vec<f64>,
    /// Column pointers, length `num_var + 1`.
    pub a_ptr: Vec<usize>,
    /// Row indices, length `a_ptr[num_var]`.
    pub a_rows: Vec<usize>,
    /// Matrix values, length `a_ptr[num_var]`.
    pub a_vals: Vec<f64>,
    /// Constraint senses, length `num_con`.
    pub constraints: Vec<ConstraintKind>,
    /// Problem name for logging.
    pub name: String,
}

impl LpProblem {
    /// Check dimensions and array consistency.
    pub fn validate(&self) -> Result<(), ModelError> {
        let n = self.num_var;
        let m = self.num_con;

        let check = |name: &'static str, got: usize, expected: usize| {
            if got != expected {
                Err(ModelError::BadLength { name, got, expected })
            } else {
                Ok(())
            }
        };
        check("obj", self.obj.len(), n)?;
        check("rhs", self.rhs.len(), m)?;
        check("lower", self.lower.len(), n)?;
        check("upper", self.upper.len(), n)?;
        check("a_ptr", self.a_ptr.len(), n + 1)?;
        check("constraints", self.constraints.len(), m)?;

        if self.a_ptr[0] != 0 || self.a_ptr.windows(2).any(|w| w[1] < w[0]) {
            return Err(ModelError::BadColumnPointers);
        }
        let nnz = self.a_ptr[n];
        check("a_rows", self.a_rows.len(), nnz)?;
        check("a_vals", self.a_vals.len(), nnz)?;

        for (el, &row) in self.a_rows.iter().enumerate() {
            if row >= m {
                return Err(ModelError::RowIndexOutOfRange { index: row, num_con: m });
            }
            if !self.a_vals[el].is_finite() {
                return Err(ModelError::NonFiniteValue(el));
            }
        }

        for i in 0..n {
            if self.lower[i] > self.upper[i] {
                return Err(ModelError::EmptyBounds(i));
            }
        }

        Ok(())
    }
}

/// Primal-dual solution in the caller's original space.
///
/// Variables with no finite lower bound report `xl = +inf`, `zl = 0`;
/// symmetrically for upper bounds.
#[derive(Debug, Clone, Default)]
pub struct Solution {
    /// Primal variables, length `num_var`.
    pub x: Vec<f64>,
    /// Distance to the lower bounds.
    pub xl: Vec<f64>,
    /// Distance to the upper bounds.
    pub xu: Vec<f64>,
    /// Row slacks, zero on equality rows.
    pub slack: Vec<f64>,
    /// Constraint duals, length `num_con`.
    pub y: Vec<f64>,
    /// Duals of the lower bounds.
    pub zl: Vec<f64>,
    /// Duals of the upper bounds.
    pub zu: Vec<f64>,
}

/// Outcome of a solve.
#[derive(Debug, Clone)]
pub struct SolveResult {
    /// Final solver state.
    pub status: Status,
    /// Primal-dual point, unscaled.
    pub solution: Solution,
    /// Number of IPM iterations performed.
    pub iterations: usize,
}
