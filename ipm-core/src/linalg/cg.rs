//! Preconditioned conjugate gradient.
//!
//! The operator is abstract: anything that can apply a symmetric positive
//! definite map to a vector. The IPM uses this for the Curtis-Reid scaling
//! system; the starting point reuses the factorized solver instead.

use thiserror::Error;

/// A linear operator y = A * x.
pub trait Operator {
    /// Apply the operator to `x`, writing the result into `y`.
    fn apply(&self, x: &[f64], y: &mut [f64]);
}

/// CG failure modes.
#[derive(Debug, Error)]
pub enum CgError {
    /// Residual did not reach the tolerance within the iteration cap.
    #[error("CG did not converge within {max_iter} iterations")]
    MaxIterations {
        /// Iteration cap that was exhausted.
        max_iter: usize,
    },

    /// The operator or preconditioner is not positive definite.
    #[error("CG breakdown at iteration {iteration}")]
    Breakdown {
        /// Iteration at which the recurrence broke down.
        iteration: usize,
    },
}

/// Solve A x = b with the Hestenes-Stiefel recurrence.
///
/// `x` holds the initial guess on entry and the solution on success.
/// `prec` applies an approximation of A^{-1}; pass `None` for plain CG.
/// Convergence is declared when ||r||_2 <= tol * ||b||_2.
///
/// Returns the number of iterations performed. The routine keeps no state
/// between calls and can be restarted with the previous solution as guess.
pub fn solve(
    op: &dyn Operator,
    prec: Option<&dyn Operator>,
    b: &[f64],
    x: &mut [f64],
    tol: f64,
    max_iter: usize,
) -> Result<usize, CgError> {
    let n = b.len();
    assert_eq!(x.len(), n);

    let norm_b = crate::linalg::vecops::two_norm(b);
    if norm_b == 0.0 {
        x.fill(0.0);
        return Ok(0);
    }
    let threshold = tol * norm_b;

    // r = b - A * x
    let mut r = vec![0.0; n];
    op.apply(x, &mut r);
    for i in 0..n {
        r[i] = b[i] - r[i];
    }

    // z = M^{-1} * r
    let mut z = vec![0.0; n];
    apply_prec(prec, &r, &mut z);

    let mut p = z.clone();
    let mut ap = vec![0.0; n];
    let mut rz = crate::linalg::vecops::dot(&r, &z);

    for iter in 0..max_iter {
        if crate::linalg::vecops::two_norm(&r) <= threshold {
            return Ok(iter);
        }

        op.apply(&p, &mut ap);
        let pap = crate::linalg::vecops::dot(&p, &ap);
        if pap <= 0.0 || !pap.is_finite() {
            return Err(CgError::Breakdown { iteration: iter });
        }

        let alpha = rz / pap;
        for i in 0..n {
            x[i] += alpha * p[i];
            r[i] -= alpha * ap[i];
        }

        apply_prec(prec, &r, &mut z);
        let rz_next = crate::linalg::vecops::dot(&r, &z);
        if !rz_next.is_finite() {
            return Err(CgError::Breakdown { iteration: iter });
        }

        let beta = rz_next / rz;
        rz = rz_next;
        for i in 0..n {
            p[i] = z[i] + beta * p[i];
        }
    }

    if crate::linalg::vecops::two_norm(&r) <= threshold {
        return Ok(max_iter);
    }
    Err(CgError::MaxIterations { max_iter })
}

fn apply_prec(prec: Option<&dyn Operator>, r: &[f64], z: &mut [f64]) {
    match prec {
        Some(m) => m.apply(r, z),
        None => z.copy_from_slice(r),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dense {
        n: usize,
        vals: Vec<f64>,
    }

    impl Operator for Dense {
        fn apply(&self, x: &[f64], y: &mut [f64]) {
            for i in 0..self.n {
                y[i] = (0..self.n).map(|j| self.vals[i * self.n + j] * x[j]).sum();
            }
        }
    }

    struct Diag(Vec<f64>);

    impl Operator for Diag {
        fn apply(&self, x: &[f64], y: &mut [f64]) {
            for (i, yi) in y.iter_mut().enumerate() {
                *yi = x[i] / self.0[i];
            }
        }
    }

    #[test]
    fn test_cg_spd() {
        // [[4, 1], [1, 3]] x = [1, 2]
        let a = Dense {
            n: 2,
            vals: vec![4.0, 1.0, 1.0, 3.0],
        };
        let b = vec![1.0, 2.0];
        let mut x = vec![0.0; 2];
        let iters = solve(&a, None, &b, &mut x, 1e-12, 100).unwrap();
        assert!(iters <= 2 + 1);
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-9);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_cg_preconditioned() {
        // Badly scaled diagonal system; Jacobi preconditioner makes it trivial.
        let n = 20;
        let mut vals = vec![0.0; n * n];
        let mut diag = vec![0.0; n];
        for i in 0..n {
            let d = 10f64.powi(i as i32 % 6);
            vals[i * n + i] = d;
            diag[i] = d;
        }
        let a = Dense { n, vals };
        let m = Diag(diag.clone());
        let b: Vec<f64> = (0..n).map(|i| (i + 1) as f64).collect();

        let mut x = vec![0.0; n];
        let iters = solve(&a, Some(&m as &dyn Operator), &b, &mut x, 1e-10, 100).unwrap();
        assert!(iters <= 3, "preconditioned CG took {} iterations", iters);
        for i in 0..n {
            assert!((x[i] - b[i] / diag[i]).abs() < 1e-8);
        }
    }

    #[test]
    fn test_cg_zero_rhs() {
        let a = Dense {
            n: 2,
            vals: vec![1.0, 0.0, 0.0, 1.0],
        };
        let mut x = vec![5.0, -3.0];
        let iters = solve(&a, None, &[0.0, 0.0], &mut x, 1e-8, 10).unwrap();
        assert_eq!(iters, 0);
        assert_eq!(x, vec![0.0, 0.0]);
    }

    #[test]
    fn test_cg_max_iterations() {
        // Indefinite-free but hard: a single iteration cap forces failure.
        let a = Dense {
            n: 3,
            vals: vec![4.0, 1.0, 0.0, 1.0, 3.0, 1.0, 0.0, 1.0, 2.0],
        };
        let b = vec![1.0, 2.0, 3.0];
        let mut x = vec![0.0; 3];
        match solve(&a, None, &b, &mut x, 1e-14, 1) {
            Err(CgError::MaxIterations { max_iter }) => assert_eq!(max_iter, 1),
            other => panic!("expected MaxIterations, got {:?}", other.map(|_| ())),
        }
    }
}
