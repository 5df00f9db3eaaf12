//! Normal equations assembly.
//!
//! Builds one triangle of S = A * Theta * A^T in CSC format, where Theta is
//! the diagonal 1 / (Theta^{-1}[j] + eps_p). Column i of S is accumulated
//! with a dense scatter over the rows reachable from row i of A through one
//! step of A^T followed by A, so the cost is O(sum_k nnz(A_k)^2) over rows k
//! and the fill-in is bounded by the pattern of A A^T.

use thiserror::Error;

use super::sparse::{self, SparseCsc};
use super::PRIMAL_STATIC_REGULARIZATION;

/// Which triangle of the symmetric product to store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Triangle {
    /// Keep entries with row >= column.
    Lower,
    /// Keep entries with row <= column.
    Upper,
}

/// Assembly failure.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// The product exceeded the caller's nonzero budget.
    #[error("normal equations exceed the nonzero cap of {cap}")]
    NnzCapExceeded {
        /// Cap that was exceeded.
        cap: usize,
    },
}

/// Effective diagonal entry of Theta for column `j`.
///
/// An empty `theta_inv` means unit scaling, which the starting point uses.
#[inline]
pub fn theta_value(theta_inv: &[f64], j: usize) -> f64 {
    if theta_inv.is_empty() {
        1.0
    } else {
        1.0 / (theta_inv[j] + PRIMAL_STATIC_REGULARIZATION)
    }
}

/// Assemble one triangle of S = A * Theta * A^T.
///
/// `theta_inv` holds Theta^{-1} per column of A (empty for unit scaling).
/// Exact zero accumulations are dropped. Fails if more than `max_nnz`
/// entries would be stored.
pub fn compute_a_theta_at(
    a: &SparseCsc,
    theta_inv: &[f64],
    triangle: Triangle,
    max_nnz: usize,
) -> Result<SparseCsc, AssemblyError> {
    let m = a.rows();
    let at = sparse::row_mirror(a);

    // scatter workspace over rows of A
    let mut col_value = vec![0.0; m];
    let mut col_index = vec![0usize; m];
    let mut in_index = vec![false; m];

    let mut entries: Vec<(usize, usize, f64)> = Vec::new();
    let mut start = vec![0usize; m + 1];
    let mut num_nz = 0usize;

    // First pass: count entries per column of S while recording them.
    for i in 0..m {
        let mut num_col_el = 0usize;
        if let Some(row_i) = at.outer_view(i) {
            for (j, &aval) in row_i.iter() {
                let row_value = theta_value(theta_inv, j) * aval;
                if row_value == 0.0 {
                    continue;
                }
                if let Some(col_j) = a.outer_view(j) {
                    for (i1, &aval1) in col_j.iter() {
                        let keep = match triangle {
                            Triangle::Lower => i1 >= i,
                            Triangle::Upper => i1 <= i,
                        };
                        if !keep {
                            continue;
                        }
                        let term = row_value * aval1;
                        if in_index[i1] {
                            col_value[i1] += term;
                        } else {
                            in_index[i1] = true;
                            col_index[num_col_el] = i1;
                            num_col_el += 1;
                            col_value[i1] = term;
                        }
                    }
                }
            }
        }

        for &i1 in &col_index[..num_col_el] {
            in_index[i1] = false;
            let value = col_value[i1];
            if value == 0.0 {
                continue;
            }
            if num_nz + 1 > max_nnz {
                return Err(AssemblyError::NnzCapExceeded { cap: max_nnz });
            }
            entries.push((i, i1, value));
            start[i + 1] += 1;
            num_nz += 1;
        }
    }

    // Prefix sum to obtain the column pointers.
    for i in 0..m {
        start[i + 1] += start[i];
    }

    // Second pass: place indices and values.
    let mut index = vec![0usize; num_nz];
    let mut value = vec![0.0; num_nz];
    let mut position = start.clone();
    for &(col, row, val) in &entries {
        index[position[col]] = row;
        value[position[col]] = val;
        position[col] += 1;
    }

    // The scatter emits rows in discovery order; the factorization kernel
    // wants them sorted within each column.
    let mut pairs: Vec<(usize, f64)> = Vec::new();
    for col in 0..m {
        let lo = start[col];
        let hi = start[col + 1];
        pairs.clear();
        pairs.extend(index[lo..hi].iter().copied().zip(value[lo..hi].iter().copied()));
        pairs.sort_unstable_by_key(|&(row, _)| row);
        for (k, &(row, val)) in pairs.iter().enumerate() {
            index[lo + k] = row;
            value[lo + k] = val;
        }
    }

    Ok(SparseCsc::new_csc((m, m), start, index, value))
}

/// y = A * Theta * A^T * x without forming the product.
///
/// `work` must have length `a.cols()`. Used by the iterative refinement of
/// normal-equation solves.
pub fn product_a_theta_at(
    a: &SparseCsc,
    theta_inv: &[f64],
    x: &[f64],
    y: &mut [f64],
    work: &mut [f64],
) {
    debug_assert_eq!(work.len(), a.cols());
    sparse::spmv_transpose(a, x, work, 1.0, 0.0);
    for (j, wj) in work.iter_mut().enumerate() {
        *wj *= theta_value(theta_inv, j);
    }
    sparse::spmv(a, work, y, 1.0, 0.0);
}
