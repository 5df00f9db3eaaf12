//! LDL^T factorization back end.
//!
//! Implements the `LinearSolver` interface on top of the `ldl` crate, an
//! elimination-tree LDL^T for quasi-definite matrices in upper-triangular
//! CSC form. The back end owns the matrix assembly:
//!
//! - augmented form: K = [ -(Theta^{-1} + eps_p) , A^T ; A , eps_d I ],
//!   quasi-definite, factorized without pivoting;
//! - normal equations: S = A * Theta * A^T + eps_d I, positive definite.
//!
//! The symbolic analysis is cached and reused while the sparsity pattern is
//! unchanged; factorization and solve workspaces are allocated once.

use super::normal_eqns::{self, Triangle};
use super::solver::{LinearSolver, SolverError};
use super::sparse::{self, SparseCsc};
use super::vecops;
use super::{DUAL_STATIC_REGULARIZATION, PRIMAL_STATIC_REGULARIZATION};
use crate::problem::{FactKind, NlaMode, Options};

/// Pivots smaller than this in magnitude are bumped after factorization.
const DYNAMIC_REG_MIN_PIVOT: f64 = 1e-13;

/// Iterative refinement sweeps per solve.
pub const MAX_REFINEMENT_ITER: usize = 5;

/// Refinement stops once the residual is below this, relative to the rhs.
const REFINEMENT_TOLERANCE: f64 = 1e-10;

/// Nonzero budget for the normal equations, as a multiple of nnz(A).
const NE_NNZ_CAP_FACTOR: usize = 400;

/// Which system the current factorization belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FactoredSystem {
    Augmented,
    NormalEq,
}

/// Elimination-tree LDL^T kernel with cached symbolic analysis.
struct LdlKernel {
    n: usize,

    // pattern the analysis was computed for
    pattern_ptr: Vec<usize>,
    pattern_rows: Vec<usize>,

    etree: Vec<Option<usize>>,
    l_nz: Vec<usize>,
    analysed: bool,

    // factor storage
    l_p: Vec<usize>,
    l_i: Vec<usize>,
    l_x: Vec<f64>,
    d: Vec<f64>,
    d_inv: Vec<f64>,

    // reusable factorization workspaces
    bwork: Vec<ldl::Marker>,
    iwork: Vec<usize>,
    fwork: Vec<f64>,

    dynamic_bumps: u64,
}

impl LdlKernel {
    fn new() -> Self {
        Self {
            n: 0,
            pattern_ptr: Vec::new(),
            pattern_rows: Vec::new(),
            etree: Vec::new(),
            l_nz: Vec::new(),
            analysed: false,
            l_p: Vec::new(),
            l_i: Vec::new(),
            l_x: Vec::new(),
            d: Vec::new(),
            d_inv: Vec::new(),
            bwork: Vec::new(),
            iwork: Vec::new(),
            fwork: Vec::new(),
            dynamic_bumps: 0,
        }
    }

    /// Symbolic analysis of an upper-triangular CSC pattern.
    fn analyse(&mut self, n: usize, a_p: &[usize], a_i: &[usize]) -> Result<(), SolverError> {
        self.n = n;
        self.etree = vec![None; n];
        self.l_nz = vec![0; n];
        let mut work = vec![0usize; n];

        ldl::etree(n, a_p, a_i, &mut work, &mut self.l_nz, &mut self.etree)
            .map_err(|_| SolverError::Analyse("elimination tree failed".to_string()))?;

        self.pattern_ptr = a_p.to_vec();
        self.pattern_rows = a_i.to_vec();
        self.analysed = true;

        let nnz_l: usize = self.l_nz.iter().sum();
        self.l_p = vec![0; n + 1];
        self.l_i = vec![0; nnz_l];
        self.l_x = vec![0.0; nnz_l];
        self.d = vec![0.0; n];
        self.d_inv = vec![0.0; n];
        self.bwork = vec![ldl::Marker::Unused; n];
        self.iwork = vec![0; 3 * n];
        self.fwork = vec![0.0; n];

        Ok(())
    }

    fn pattern_matches(&self, n: usize, a_p: &[usize], a_i: &[usize]) -> bool {
        self.analysed && self.n == n && self.pattern_ptr == a_p && self.pattern_rows == a_i
    }

    /// Numeric factorization; re-analyses if the pattern changed.
    fn factor(
        &mut self,
        n: usize,
        a_p: &[usize],
        a_i: &[usize],
        a_x: &[f64],
    ) -> Result<(), SolverError> {
        if !self.pattern_matches(n, a_p, a_i) {
            self.analyse(n, a_p, a_i)?;
        }

        self.bwork.fill(ldl::Marker::Unused);
        self.iwork.fill(0);
        self.fwork.fill(0.0);

        ldl::factor(
            n,
            a_p,
            a_i,
            a_x,
            &mut self.l_p,
            &mut self.l_i,
            &mut self.l_x,
            &mut self.d,
            &mut self.d_inv,
            &self.l_nz,
            &self.etree,
            &mut self.bwork,
            &mut self.iwork,
            &mut self.fwork,
        )
        .map_err(|_| SolverError::Factorise("zero pivot in LDL^T".to_string()))?;

        // Bump vanishing pivots, keeping their sign.
        let replacement = (DYNAMIC_REG_MIN_PIVOT * 2e6).min(1e-6);
        self.dynamic_bumps = 0;
        for i in 0..n {
            if self.d[i].abs() < DYNAMIC_REG_MIN_PIVOT {
                self.d[i] = if self.d[i] >= 0.0 { replacement } else { -replacement };
                self.d_inv[i] = 1.0 / self.d[i];
                self.dynamic_bumps += 1;
            }
        }

        Ok(())
    }

    /// Solve L D L^T x = b in place.
    fn solve_in_place(&self, x: &mut [f64]) {
        debug_assert_eq!(x.len(), self.n);
        ldl::solve(self.n, &self.l_p, &self.l_i, &self.l_x, &self.d_inv, x);
    }

    fn factor_nnz(&self) -> f64 {
        self.l_nz.iter().sum::<usize>() as f64
    }

    fn factor_flops(&self) -> f64 {
        self.l_nz.iter().map(|&c| (c * c) as f64).sum::<f64>()
    }

    fn release(&mut self) {
        *self = LdlKernel::new();
    }
}

/// `LinearSolver` implementation backed by `LdlKernel`.
pub struct LdlSolver {
    kernel: LdlKernel,
    valid: bool,
    factored: Option<FactoredSystem>,

    // constraint matrix and its row-wise mirror, stored at setup
    a: Option<SparseCsc>,
    at: Option<SparseCsc>,
    n_var: usize,
    m_con: usize,

    // scaling in effect for the current factorization, kept for refinement
    theta_inv: Vec<f64>,

    fact_kind: FactKind,
    flops: f64,
    nz: f64,

    // solve scratch, sized at setup
    rhs_full: Vec<f64>,
    res_x: Vec<f64>,
    res_y: Vec<f64>,
    work_n: Vec<f64>,
}

impl LdlSolver {
    pub fn new() -> Self {
        Self {
            kernel: LdlKernel::new(),
            valid: false,
            factored: None,
            a: None,
            at: None,
            n_var: 0,
            m_con: 0,
            theta_inv: Vec::new(),
            fact_kind: FactKind::Ldlt,
            flops: 0.0,
            nz: 0.0,
            rhs_full: Vec::new(),
            res_x: Vec::new(),
            res_y: Vec::new(),
            work_n: Vec::new(),
        }
    }

    /// Upper triangle of the augmented matrix in raw CSC arrays.
    ///
    /// Column layout: x block first, then the y block whose column n + k
    /// holds row k of A above the regularized diagonal.
    fn assemble_augmented(&self, theta_inv: &[f64]) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
        let n = self.n_var;
        let m = self.m_con;
        let at = self.at.as_ref().expect("setup not called");

        let nnz = n + m + at.nnz();
        let mut ptr = Vec::with_capacity(n + m + 1);
        let mut idx = Vec::with_capacity(nnz);
        let mut val = Vec::with_capacity(nnz);

        ptr.push(0);
        for j in 0..n {
            let tj = if theta_inv.is_empty() { 1.0 } else { theta_inv[j] };
            idx.push(j);
            val.push(-(tj + PRIMAL_STATIC_REGULARIZATION));
            ptr.push(idx.len());
        }
        for k in 0..m {
            if let Some(row_k) = at.outer_view(k) {
                for (col, &aval) in row_k.iter() {
                    idx.push(col);
                    val.push(aval);
                }
            }
            idx.push(n + k);
            val.push(DUAL_STATIC_REGULARIZATION);
            ptr.push(idx.len());
        }

        (ptr, idx, val)
    }

    /// Regularized normal equations S = A * Theta * A^T + eps_d I, upper
    /// triangle.
    fn assemble_normal_eq(&self, theta_inv: &[f64]) -> Result<SparseCsc, SolverError> {
        let a = self.a.as_ref().expect("setup not called");
        let cap = NE_NNZ_CAP_FACTOR * a.nnz().max(self.m_con);
        let s = normal_eqns::compute_a_theta_at(a, theta_inv, Triangle::Upper, cap)
            .map_err(|e| SolverError::OutOfMemory(e.to_string()))?;
        let reg = sparse::diagonal(&vec![DUAL_STATIC_REGULARIZATION; self.m_con]);
        Ok(&s + &reg)
    }

    fn require_valid(&self, system: FactoredSystem) -> Result<(), SolverError> {
        if self.valid && self.factored == Some(system) {
            Ok(())
        } else {
            Err(SolverError::Solve("no valid factorization".to_string()))
        }
    }

    /// One residual-correction sweep for the augmented system, measuring
    /// against the unregularized operator.
    fn refine_as(&mut self, rhs_x: &[f64], rhs_y: &[f64], lhs_x: &mut [f64], lhs_y: &mut [f64]) {
        let n = self.n_var;
        let m = self.m_con;
        let norm_rhs = vecops::inf_norm(rhs_x).max(vecops::inf_norm(rhs_y));

        for _ in 0..MAX_REFINEMENT_ITER {
            // res_x = rhs_x + Theta^{-1} lhs_x - A^T lhs_y
            // res_y = rhs_y - A lhs_x
            {
                let a = self.a.as_ref().unwrap();
                for j in 0..n {
                    let tj = if self.theta_inv.is_empty() { 1.0 } else { self.theta_inv[j] };
                    self.res_x[j] = rhs_x[j] + tj * lhs_x[j];
                }
                sparse::spmv_transpose(a, lhs_y, &mut self.res_x, -1.0, 1.0);
                self.res_y.copy_from_slice(rhs_y);
                sparse::spmv(a, lhs_x, &mut self.res_y, -1.0, 1.0);
            }

            let res_norm = vecops::inf_norm(&self.res_x).max(vecops::inf_norm(&self.res_y));
            if res_norm <= REFINEMENT_TOLERANCE * (1.0 + norm_rhs) {
                break;
            }

            self.rhs_full[..n].copy_from_slice(&self.res_x);
            self.rhs_full[n..n + m].copy_from_slice(&self.res_y);
            self.kernel.solve_in_place(&mut self.rhs_full);
            for j in 0..n {
                lhs_x[j] += self.rhs_full[j];
            }
            for i in 0..m {
                lhs_y[i] += self.rhs_full[n + i];
            }
        }
    }

    /// Residual-correction sweeps for the normal equations.
    fn refine_ne(&mut self, rhs: &[f64], lhs: &mut [f64]) {
        let norm_rhs = vecops::inf_norm(rhs);

        for _ in 0..MAX_REFINEMENT_ITER {
            {
                let a = self.a.as_ref().unwrap();
                normal_eqns::product_a_theta_at(a, &self.theta_inv, lhs, &mut self.res_y, &mut self.work_n);
            }
            for i in 0..self.m_con {
                self.res_y[i] = rhs[i] - self.res_y[i];
            }

            if vecops::inf_norm(&self.res_y) <= REFINEMENT_TOLERANCE * (1.0 + norm_rhs) {
                break;
            }

            self.rhs_full[..self.m_con].copy_from_slice(&self.res_y);
            let correction = &mut self.rhs_full[..self.m_con];
            self.kernel.solve_in_place(correction);
            for i in 0..self.m_con {
                lhs[i] += correction[i];
            }
        }
    }
}

impl Default for LdlSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearSolver for LdlSolver {
    fn setup(&mut self, a: &SparseCsc, options: &Options) -> Result<(), SolverError> {
        self.n_var = a.cols();
        self.m_con = a.rows();
        self.at = Some(sparse::row_mirror(a));
        self.a = Some(a.clone());
        self.fact_kind = options.fact;

        // sized for the larger of the two systems so a mode mismatch can
        // never index out of bounds
        self.rhs_full = vec![0.0; self.n_var + self.m_con];
        self.res_x = vec![0.0; self.n_var];
        self.res_y = vec![0.0; self.m_con];
        self.work_n = vec![0.0; self.n_var];

        // Analyse the pattern once with unit scaling; numeric factors reuse
        // the analysis while the pattern holds.
        match options.nla {
            NlaMode::Augmented => {
                let (ptr, idx, _val) = self.assemble_augmented(&[]);
                self.kernel.analyse(self.n_var + self.m_con, &ptr, &idx)?;
            }
            NlaMode::NormEq => {
                let s = self.assemble_normal_eq(&[])?;
                let indptr = s.indptr();
                self.kernel.analyse(self.m_con, indptr.raw_storage(), s.indices())?;
            }
        }

        self.flops = self.kernel.factor_flops();
        self.nz = self.kernel.factor_nnz();
        self.valid = false;
        log::debug!(
            "LDL back end ready: {:?}/{:?}, factor nnz {:.0}, flop estimate {:.0}",
            options.nla,
            self.fact_kind,
            self.nz,
            self.flops
        );
        Ok(())
    }

    fn factor_as(&mut self, a: &SparseCsc, theta_inv: &[f64]) -> Result<(), SolverError> {
        self.valid = false;
        debug_assert_eq!(a.cols(), self.n_var);
        let (ptr, idx, val) = self.assemble_augmented(theta_inv);
        self.kernel.factor(self.n_var + self.m_con, &ptr, &idx, &val)?;
        self.theta_inv = theta_inv.to_vec();
        self.factored = Some(FactoredSystem::Augmented);
        self.valid = true;
        Ok(())
    }

    fn solve_as(
        &mut self,
        rhs_x: &[f64],
        rhs_y: &[f64],
        lhs_x: &mut [f64],
        lhs_y: &mut [f64],
    ) -> Result<(), SolverError> {
        self.require_valid(FactoredSystem::Augmented)?;
        let n = self.n_var;
        let m = self.m_con;

        self.rhs_full[..n].copy_from_slice(rhs_x);
        self.rhs_full[n..n + m].copy_from_slice(rhs_y);
        self.kernel.solve_in_place(&mut self.rhs_full);
        lhs_x.copy_from_slice(&self.rhs_full[..n]);
        lhs_y.copy_from_slice(&self.rhs_full[n..n + m]);

        self.refine_as(rhs_x, rhs_y, lhs_x, lhs_y);

        if vecops::has_nan(lhs_x) || vecops::has_nan(lhs_y) {
            return Err(SolverError::Solve("augmented solve produced NaN".to_string()));
        }
        Ok(())
    }

    fn factor_ne(&mut self, a: &SparseCsc, theta_inv: &[f64]) -> Result<(), SolverError> {
        self.valid = false;
        debug_assert_eq!(a.cols(), self.n_var);
        let s = self.assemble_normal_eq(theta_inv)?;
        let indptr = s.indptr();
        self.kernel.factor(self.m_con, indptr.raw_storage(), s.indices(), s.data())?;
        self.theta_inv = theta_inv.to_vec();
        self.factored = Some(FactoredSystem::NormalEq);
        self.valid = true;
        Ok(())
    }

    fn solve_ne(&mut self, rhs: &[f64], lhs: &mut [f64]) -> Result<(), SolverError> {
        self.require_valid(FactoredSystem::NormalEq)?;
        lhs.copy_from_slice(rhs);
        self.kernel.solve_in_place(lhs);

        self.refine_ne(rhs, lhs);

        if vecops::has_nan(lhs) {
            return Err(SolverError::Solve("normal equations solve produced NaN".to_string()));
        }
        Ok(())
    }

    fn valid(&self) -> bool {
        self.valid
    }

    fn clear(&mut self) {
        self.valid = false;
        self.factored = None;
    }

    fn finalise(&mut self) {
        self.kernel.release();
        self.valid = false;
        self.factored = None;
    }

    fn flops(&self) -> f64 {
        self.flops
    }

    fn nz(&self) -> f64 {
        self.nz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::sparse::from_triplets;

    fn test_matrix() -> SparseCsc {
        // [[1, 1, 1, 0], [1, -1, 0, 1]]
        from_triplets(
            2,
            4,
            vec![(0, 0, 1.0), (0, 1, 1.0), (0, 2, 1.0), (1, 0, 1.0), (1, 1, -1.0), (1, 3, 1.0)],
        )
    }

    fn options(nla: NlaMode) -> Options {
        Options {
            nla,
            ..Options::default()
        }
    }

    #[test]
    fn test_augmented_unit_solution() {
        // rhs built from x* = y* = 1 must be reproduced by the solve
        let a = test_matrix();
        let theta_inv = vec![1.0; 4];

        let x_star = vec![1.0; 4];
        let y_star = vec![1.0; 2];

        // rhs_x = -Theta^{-1} x* + A^T y*, rhs_y = A x*
        let mut rhs_x = vec![0.0; 4];
        sparse::spmv_transpose(&a, &y_star, &mut rhs_x, 1.0, 0.0);
        for i in 0..4 {
            rhs_x[i] -= theta_inv[i] * x_star[i];
        }
        let mut rhs_y = vec![0.0; 2];
        sparse::spmv(&a, &x_star, &mut rhs_y, 1.0, 0.0);

        let mut solver = LdlSolver::new();
        solver.setup(&a, &options(NlaMode::Augmented)).unwrap();
        solver.factor_as(&a, &theta_inv).unwrap();
        assert!(solver.valid());

        let mut lhs_x = vec![0.0; 4];
        let mut lhs_y = vec![0.0; 2];
        solver.solve_as(&rhs_x, &rhs_y, &mut lhs_x, &mut lhs_y).unwrap();

        for i in 0..4 {
            assert!((lhs_x[i] - 1.0).abs() < 1e-6, "x[{}] = {}", i, lhs_x[i]);
        }
        for i in 0..2 {
            assert!((lhs_y[i] - 1.0).abs() < 1e-6, "y[{}] = {}", i, lhs_y[i]);
        }
    }

    #[test]
    fn test_normal_equations_unit_solution() {
        // rhs = A x* + A Theta (-Theta^{-1} x* + A^T y*) gives lhs = y*
        let a = test_matrix();
        let theta_inv = vec![1.0; 4];
        let x_star = vec![1.0; 4];
        let y_star = vec![1.0; 2];

        let mut rhs_x = vec![0.0; 4];
        sparse::spmv_transpose(&a, &y_star, &mut rhs_x, 1.0, 0.0);
        for i in 0..4 {
            rhs_x[i] -= theta_inv[i] * x_star[i];
            rhs_x[i] /= theta_inv[i] + PRIMAL_STATIC_REGULARIZATION;
        }
        let mut rhs = vec![0.0; 2];
        sparse::spmv(&a, &x_star, &mut rhs, 1.0, 0.0);
        sparse::spmv(&a, &rhs_x, &mut rhs, 1.0, 1.0);

        let mut solver = LdlSolver::new();
        solver.setup(&a, &options(NlaMode::NormEq)).unwrap();
        solver.factor_ne(&a, &theta_inv).unwrap();

        let mut lhs = vec![0.0; 2];
        solver.solve_ne(&rhs, &mut lhs).unwrap();

        for i in 0..2 {
            assert!((lhs[i] - 1.0).abs() < 1e-6, "y[{}] = {}", i, lhs[i]);
        }
    }

    #[test]
    fn test_solve_requires_valid_factorization() {
        let a = test_matrix();
        let mut solver = LdlSolver::new();
        solver.setup(&a, &options(NlaMode::NormEq)).unwrap();

        let mut lhs = vec![0.0; 2];
        assert!(matches!(
            solver.solve_ne(&[1.0, 1.0], &mut lhs),
            Err(SolverError::Solve(_))
        ));

        solver.factor_ne(&a, &[1.0; 4]).unwrap();
        solver.solve_ne(&[1.0, 1.0], &mut lhs).unwrap();

        // clear() invalidates again
        solver.clear();
        assert!(!solver.valid());
        assert!(solver.solve_ne(&[1.0, 1.0], &mut lhs).is_err());
    }

    #[test]
    fn test_normal_equations_zero_row_survives() {
        // row 1 of A is empty; the regularized diagonal keeps the
        // factorization alive and the zero rhs component maps to zero
        let a = from_triplets(2, 2, vec![(0, 0, 1.0), (0, 1, 2.0)]);
        let mut solver = LdlSolver::new();
        solver.setup(&a, &options(NlaMode::NormEq)).unwrap();
        solver.factor_ne(&a, &[1.0, 1.0]).unwrap();

        let mut lhs = vec![0.0; 2];
        solver.solve_ne(&[5.0, 0.0], &mut lhs).unwrap();
        assert!(lhs[0].is_finite());
        assert!((lhs[1]).abs() < 1e-6);
    }

    #[test]
    fn test_setup_reports_factor_estimates() {
        let a = test_matrix();
        let mut solver = LdlSolver::new();
        solver.setup(&a, &options(NlaMode::NormEq)).unwrap();
        assert!(solver.nz() >= 0.0);
        assert!(solver.flops() >= solver.nz());
    }
}
