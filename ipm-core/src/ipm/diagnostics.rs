//! Per-iteration diagnostics.
//!
//! The driver owns a `Collector` and fills one record per iteration. The
//! collector is a plain value handed around by reference; nothing here is
//! process-global.

use crate::ipm::iterate::{Iterate, NewtonDir};
use crate::linalg::vecops;
use crate::model::Model;

/// Snapshot of one IPM iteration.
#[derive(Debug, Clone, Default)]
pub struct IterRecord {
    pub iter: usize,
    pub p_obj: f64,
    pub d_obj: f64,
    pub p_inf: f64,
    pub d_inf: f64,
    pub mu: f64,
    pub pd_gap: f64,
    pub alpha_primal: f64,
    pub alpha_dual: f64,
    pub sigma_affine: f64,
    pub sigma: f64,
    /// Correctors computed this iteration.
    pub correctors: usize,
    /// Normwise backward error of the 6x6 Newton system, worst over the
    /// directions computed this iteration.
    pub nw_back_err: f64,
    /// Componentwise backward error, likewise the iteration maximum.
    pub cw_back_err: f64,
    pub min_prod: f64,
    pub max_prod: f64,
}

/// Ordered list of iteration records for one solve.
#[derive(Debug, Default)]
pub struct Collector {
    records: Vec<IterRecord>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the record for a new iteration.
    pub fn start_iter(&mut self, iter: usize) {
        self.records.push(IterRecord {
            iter,
            ..IterRecord::default()
        });
    }

    /// The record currently being filled.
    pub fn back_mut(&mut self) -> &mut IterRecord {
        if self.records.is_empty() {
            self.start_iter(0);
        }
        self.records.last_mut().expect("collector is non-empty")
    }

    pub fn records(&self) -> &[IterRecord] {
        &self.records
    }
}

/// Normwise and componentwise backward error of the full Newton system.
///
/// The residual of each of the six block equations is measured against the
/// magnitudes of the matrix, the direction and the right-hand side:
/// normwise as ||r|| / (||K|| ||d|| + ||rhs||), componentwise as
/// max_i |r_i| / (|K| |d| + |rhs|)_i.
pub fn backward_error(model: &Model, it: &Iterate, delta: &NewtonDir) -> (f64, f64) {
    let n = model.n();
    let m = model.m();
    let a = model.a();
    let res = &it.res;

    // Residuals of the six block equations.
    let mut r1 = res.r1.clone();
    crate::linalg::sparse::spmv(a, &delta.x, &mut r1, -1.0, 1.0);

    let mut r2 = vec![0.0; n];
    let mut r3 = vec![0.0; n];
    let mut r4 = vec![0.0; n];
    let mut r5 = vec![0.0; n];
    let mut r6 = vec![0.0; n];
    for i in 0..n {
        r2[i] = res.r2[i] - delta.x[i] + delta.xl[i];
        r3[i] = res.r3[i] - delta.x[i] - delta.xu[i];
        r4[i] = res.r4[i] - delta.zl[i] + delta.zu[i];
        if model.has_lb(i) {
            r5[i] = res.r5[i] - it.zl[i] * delta.xl[i] - it.xl[i] * delta.zl[i];
        }
        if model.has_ub(i) {
            r6[i] = res.r6[i] - it.zu[i] * delta.xu[i] - it.xu[i] * delta.zu[i];
        }
    }
    crate::linalg::sparse::spmv_transpose(a, &delta.y, &mut r4, -1.0, 1.0);

    let inf_norm_r = vecops::inf_norm(&r1)
        .max(vecops::inf_norm(&r2))
        .max(vecops::inf_norm(&r3))
        .max(vecops::inf_norm(&r4))
        .max(vecops::inf_norm(&r5))
        .max(vecops::inf_norm(&r6));

    let inf_norm_delta = vecops::inf_norm(&delta.x)
        .max(vecops::inf_norm(&delta.xl))
        .max(vecops::inf_norm(&delta.xu))
        .max(vecops::inf_norm(&delta.y))
        .max(vecops::inf_norm(&delta.zl))
        .max(vecops::inf_norm(&delta.zu));

    let inf_norm_res = vecops::inf_norm(&res.r1)
        .max(vecops::inf_norm(&res.r2))
        .max(vecops::inf_norm(&res.r3))
        .max(vecops::inf_norm(&res.r4))
        .max(vecops::inf_norm(&res.r5))
        .max(vecops::inf_norm(&res.r6));

    // Norm of the block matrix:
    // max(||A||_inf, 2, 2 + ||A||_1, max_i(zl_i + xl_i), max_i(zu_i + xu_i))
    let mut norm_cols = vec![0.0; n];
    let mut norm_rows = vec![0.0; m];
    // |A| d x and |A^T| |dy| accumulate in the same sweep for the
    // componentwise bound below.
    let mut abs_prod_a = vec![0.0; m];
    let mut abs_prod_at = vec![0.0; n];
    for (val, (row, col)) in a.iter() {
        let v = val.abs();
        norm_cols[col] += v;
        norm_rows[row] += v;
        abs_prod_a[row] += v * delta.x[col].abs();
        abs_prod_at[col] += v * delta.y[row].abs();
    }
    let one_norm_a = vecops::inf_norm(&norm_cols);
    let inf_norm_a = vecops::inf_norm(&norm_rows);

    let mut inf_norm_matrix = inf_norm_a.max(one_norm_a + 2.0);
    for i in 0..n {
        if model.has_lb(i) {
            inf_norm_matrix = inf_norm_matrix.max(it.zl[i] + it.xl[i]);
        }
        if model.has_ub(i) {
            inf_norm_matrix = inf_norm_matrix.max(it.zu[i] + it.xu[i]);
        }
    }

    let nw_back_err = inf_norm_r / (inf_norm_matrix * inf_norm_delta + inf_norm_res);

    // Componentwise bound, block by block.
    let mut cw_back_err = 0.0f64;
    let mut update = |num: f64, denom: f64| {
        if denom == 0.0 {
            if num != 0.0 {
                cw_back_err = f64::MAX;
            }
        } else {
            cw_back_err = cw_back_err.max(num / denom);
        }
    };

    for i in 0..m {
        update(r1[i].abs(), abs_prod_a[i] + res.r1[i].abs());
    }
    for i in 0..n {
        if model.has_lb(i) {
            update(
                r2[i].abs(),
                delta.x[i].abs() + delta.xl[i].abs() + res.r2[i].abs(),
            );
        }
        if model.has_ub(i) {
            update(
                r3[i].abs(),
                delta.x[i].abs() + delta.xu[i].abs() + res.r3[i].abs(),
            );
        }
    }
    for i in 0..n {
        let mut denom = abs_prod_at[i] + res.r4[i].abs();
        if model.has_lb(i) {
            denom += delta.zl[i].abs();
        }
        if model.has_ub(i) {
            denom += delta.zu[i].abs();
        }
        update(r4[i].abs(), denom);
    }
    for i in 0..n {
        if model.has_lb(i) {
            update(
                r5[i].abs(),
                it.zl[i] * delta.xl[i].abs() + it.xl[i] * delta.zl[i].abs() + res.r5[i].abs(),
            );
        }
        if model.has_ub(i) {
            update(
                r6[i].abs(),
                it.zu[i] * delta.xu[i].abs() + it.xu[i] * delta.zu[i].abs() + res.r6[i].abs(),
            );
        }
    }

    (nw_back_err, cw_back_err)
}
