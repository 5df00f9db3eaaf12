//! Linear algebra layer: dense vector kernels, sparse matrices, the
//! conjugate gradient solver, normal-equations assembly and the interface
//! to the direct factorization back end.

pub mod cg;
pub mod ldl_backend;
pub mod normal_eqns;
pub mod solver;
pub mod sparse;
pub mod vecops;

/// Static regularization added to Theta^{-1} wherever it is inverted.
pub const PRIMAL_STATIC_REGULARIZATION: f64 = 1e-12;

/// Static regularization on the otherwise zero dual block of the augmented
/// system, and on the diagonal of the normal equations.
pub const DUAL_STATIC_REGULARIZATION: f64 = 1e-10;
