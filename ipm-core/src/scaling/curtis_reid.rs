//! Curtis-Reid scaling.
//!
//! Computes integer row and column exponents r, c such that the scaled
//! entries A[i,j] * 2^(r[i] + c[j]) have log2 magnitudes close to zero in
//! the least-squares sense. The normal equations of that least-squares
//! problem form a symmetric positive definite system over the nonzero
//! pattern of A,
//!
//! ```text
//! [ diag(M)   E     ] [rho]     [sum_j log2|A[i,:]|]
//! [   E^T   diag(N) ] [gamma] = [sum_i log2|A[:,j]|]
//! ```
//!
//! where E is the 0/1 incidence matrix of A and M, N count nonzeros per row
//! and column. The system is solved by CG with a diagonal preconditioner
//! and the solution is rounded to the nearest integers.

use thiserror::Error;

use crate::linalg::cg::{self, Operator};
use crate::linalg::sparse::SparseCsc;
use crate::scaling::MAX_SCALING_EXPONENT;

const CG_TOLERANCE: f64 = 1e-6;
const CG_MAX_ITER: usize = 1000;

/// Reasons the scaling pass can refuse a matrix.
#[derive(Debug, Error)]
pub enum ScalingError {
    /// A row has no nonzero entry, so its count M[i] is zero and the
    /// preconditioner is singular.
    #[error("row {0} of the constraint matrix has no nonzero entries")]
    EmptyRow(usize),

    /// A column has no nonzero entry.
    #[error("column {0} of the constraint matrix has no nonzero entries")]
    EmptyColumn(usize),

    /// The CG solve on the scaling system failed.
    #[error("scaling system CG failed: {0}")]
    Cg(#[from] cg::CgError),
}

/// Incidence-pattern operator for the scaling system.
struct CrMatrix<'a> {
    row_counts: &'a [f64],
    col_counts: &'a [f64],
    ptr: &'a [usize],
    rows: &'a [usize],
}

impl Operator for CrMatrix<'_> {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        let m = self.row_counts.len();
        let n = self.col_counts.len();
        let (rho, gamma) = x.split_at(m);

        for i in 0..m {
            y[i] = self.row_counts[i] * rho[i];
        }
        for j in 0..n {
            y[m + j] = self.col_counts[j] * gamma[j];
        }
        // E * gamma into the row block, E^T * rho into the column block
        for col in 0..n {
            for el in self.ptr[col]..self.ptr[col + 1] {
                let row = self.rows[el];
                y[row] += gamma[col];
                y[m + col] += rho[row];
            }
        }
    }
}

/// Diagonal preconditioner built from the nonzero counts.
struct CrPreconditioner<'a> {
    row_counts: &'a [f64],
    col_counts: &'a [f64],
}

impl Operator for CrPreconditioner<'_> {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        let m = self.row_counts.len();
        for i in 0..m {
            y[i] = x[i] / self.row_counts[i];
        }
        for (j, &c) in self.col_counts.iter().enumerate() {
            y[m + j] = x[m + j] / c;
        }
    }
}

/// Compute Curtis-Reid scaling exponents for a CSC matrix.
///
/// Entries stored as exact zeros do not contribute to the counts or the
/// right-hand side. Fails if any row or column ends up with no contributing
/// entry.
pub fn curtis_reid_exponents(a: &SparseCsc) -> Result<(Vec<i32>, Vec<i32>), ScalingError> {
    let m = a.rows();
    let n = a.cols();

    let indptr = a.indptr();
    let ptr = indptr.raw_storage();
    let rows = a.indices();
    let vals = a.data();

    let mut row_counts = vec![0.0; m];
    let mut col_counts = vec![0.0; n];
    let mut rhs = vec![0.0; m + n];

    for col in 0..n {
        for el in ptr[col]..ptr[col + 1] {
            let val = vals[el];
            if val != 0.0 {
                let row = rows[el];
                let l = val.abs().log2();
                rhs[row] += l;
                rhs[m + col] += l;
                row_counts[row] += 1.0;
                col_counts[col] += 1.0;
            }
        }
    }

    if let Some(i) = row_counts.iter().position(|&c| c == 0.0) {
        return Err(ScalingError::EmptyRow(i));
    }
    if let Some(j) = col_counts.iter().position(|&c| c == 0.0) {
        return Err(ScalingError::EmptyColumn(j));
    }

    let matrix = CrMatrix {
        row_counts: &row_counts,
        col_counts: &col_counts,
        ptr,
        rows,
    };
    let prec = CrPreconditioner {
        row_counts: &row_counts,
        col_counts: &col_counts,
    };

    let mut exponents = vec![0.0; m + n];
    let iters = cg::solve(
        &matrix,
        Some(&prec as &dyn Operator),
        &rhs,
        &mut exponents,
        CG_TOLERANCE,
        CG_MAX_ITER,
    )?;
    log::debug!("Curtis-Reid scaling required {} CG iterations", iters);

    let round = |e: f64| -> i32 {
        (-e.round() as i32).clamp(-MAX_SCALING_EXPONENT, MAX_SCALING_EXPONENT)
    };
    let rowexp: Vec<i32> = exponents[..m].iter().map(|&e| round(e)).collect();
    let colexp: Vec<i32> = exponents[m..].iter().map(|&e| round(e)).collect();

    Ok((rowexp, colexp))
}
