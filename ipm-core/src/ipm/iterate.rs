//! Primal-dual iterate and its derived quantities.
//!
//! The iterate stores the point (x, xl, xu, y, zl, zu), the six residual
//! blocks, the Newton direction and the diagonal scaling Theta^{-1}.
//! Components tied to an absent bound hold exact zeros and are skipped by
//! every reduction, so no division can hit them.
//!
//! Residual blocks:
//!
//! ```text
//! r1 = b - A x
//! r2 = lower - x + xl          (rows with a finite lower bound)
//! r3 = upper - x - xu          (rows with a finite upper bound)
//! r4 = c - A^T y - zl + zu
//! r5 = sigma mu e - Xl Zl e
//! r6 = sigma mu e - Xu Zu e
//! ```

use crate::linalg::normal_eqns::theta_value;
use crate::linalg::sparse;
use crate::linalg::vecops;
use crate::model::Model;
use crate::problem::Solution;

/// Theta^{-1} entries below this are pulled up toward the guard value.
const THETA_INV_UNDERFLOW: f64 = 1e-12;

/// Newton direction, same shapes as the iterate.
#[derive(Debug, Clone, Default)]
pub struct NewtonDir {
    pub x: Vec<f64>,
    pub xl: Vec<f64>,
    pub xu: Vec<f64>,
    pub y: Vec<f64>,
    pub zl: Vec<f64>,
    pub zu: Vec<f64>,
}

impl NewtonDir {
    pub fn new(m: usize, n: usize) -> Self {
        Self {
            x: vec![0.0; n],
            xl: vec![0.0; n],
            xu: vec![0.0; n],
            y: vec![0.0; m],
            zl: vec![0.0; n],
            zu: vec![0.0; n],
        }
    }

    /// Reset all blocks to zero.
    pub fn clear(&mut self) {
        self.x.fill(0.0);
        self.xl.fill(0.0);
        self.xu.fill(0.0);
        self.y.fill(0.0);
        self.zl.fill(0.0);
        self.zu.fill(0.0);
    }

    pub fn has_nan(&self) -> bool {
        vecops::has_nan(&self.x)
            || vecops::has_nan(&self.xl)
            || vecops::has_nan(&self.xu)
            || vecops::has_nan(&self.y)
            || vecops::has_nan(&self.zl)
            || vecops::has_nan(&self.zu)
    }

    pub fn has_inf(&self) -> bool {
        vecops::has_inf(&self.x)
            || vecops::has_inf(&self.xl)
            || vecops::has_inf(&self.xu)
            || vecops::has_inf(&self.y)
            || vecops::has_inf(&self.zl)
            || vecops::has_inf(&self.zu)
    }
}

/// Residual blocks, reset and recomputed every iteration.
#[derive(Debug, Clone, Default)]
pub struct Residuals {
    pub r1: Vec<f64>,
    pub r2: Vec<f64>,
    pub r3: Vec<f64>,
    pub r4: Vec<f64>,
    pub r5: Vec<f64>,
    pub r6: Vec<f64>,
}

impl Residuals {
    pub fn new(m: usize, n: usize) -> Self {
        Self {
            r1: vec![0.0; m],
            r2: vec![0.0; n],
            r3: vec![0.0; n],
            r4: vec![0.0; n],
            r5: vec![0.0; n],
            r6: vec![0.0; n],
        }
    }

    pub fn clear(&mut self) {
        self.r1.fill(0.0);
        self.r2.fill(0.0);
        self.r3.fill(0.0);
        self.r4.fill(0.0);
        self.r5.fill(0.0);
        self.r6.fill(0.0);
    }
}

/// The primal-dual point with residuals, direction and indicators.
pub struct Iterate {
    pub x: Vec<f64>,
    pub xl: Vec<f64>,
    pub xu: Vec<f64>,
    pub y: Vec<f64>,
    pub zl: Vec<f64>,
    pub zu: Vec<f64>,

    pub res: Residuals,
    pub delta: NewtonDir,

    /// Theta^{-1}, recomputed at the start of every iteration.
    pub scaling: Vec<f64>,

    pub mu: f64,
    pub pobj: f64,
    pub dobj: f64,
    pub pinf: f64,
    pub dinf: f64,
    pub pdgap: f64,
}

impl Iterate {
    pub fn new(model: &Model) -> Self {
        let n = model.n();
        let m = model.m();
        Self {
            x: vec![0.0; n],
            xl: vec![0.0; n],
            xu: vec![0.0; n],
            y: vec![0.0; m],
            zl: vec![0.0; n],
            zu: vec![0.0; n],
            res: Residuals::new(m, n),
            delta: NewtonDir::new(m, n),
            scaling: vec![0.0; n],
            mu: 0.0,
            pobj: 0.0,
            dobj: 0.0,
            pinf: 0.0,
            dinf: 0.0,
            pdgap: 0.0,
        }
    }

    /// Recompute the four linear residual blocks.
    pub fn residual_1234(&mut self, model: &Model) {
        let n = model.n();

        self.res.r1.copy_from_slice(model.b());
        sparse::spmv(model.a(), &self.x, &mut self.res.r1, -1.0, 1.0);

        for i in 0..n {
            self.res.r2[i] = if model.has_lb(i) {
                model.lb(i) - self.x[i] + self.xl[i]
            } else {
                0.0
            };
            self.res.r3[i] = if model.has_ub(i) {
                model.ub(i) - self.x[i] - self.xu[i]
            } else {
                0.0
            };
            self.res.r4[i] = model.c()[i] - self.zl[i] + self.zu[i];
        }
        sparse::spmv_transpose(model.a(), &self.y, &mut self.res.r4, -1.0, 1.0);
    }

    /// Recompute the complementarity residuals for a given centering
    /// parameter.
    pub fn residual_56(&mut self, model: &Model, sigma: f64) {
        let target = sigma * self.mu;
        for i in 0..model.n() {
            self.res.r5[i] = if model.has_lb(i) {
                target - self.xl[i] * self.zl[i]
            } else {
                0.0
            };
            self.res.r6[i] = if model.has_ub(i) {
                target - self.xu[i] * self.zu[i]
            } else {
                0.0
            };
        }
    }

    /// r7 = r4 - Xl^{-1} (r5 + Zl r2) + Xu^{-1} (r6 - Zu r3), bound terms
    /// only where present.
    pub fn residual_7(&self, model: &Model, r7: &mut [f64]) {
        for i in 0..model.n() {
            r7[i] = self.res.r4[i];
            if model.has_lb(i) {
                r7[i] -= (self.res.r5[i] + self.zl[i] * self.res.r2[i]) / self.xl[i];
            }
            if model.has_ub(i) {
                r7[i] += (self.res.r6[i] - self.zu[i] * self.res.r3[i]) / self.xu[i];
            }
        }
    }

    /// r8 = r1 + A Theta r7. `work` has length n and holds Theta r7.
    pub fn residual_8(&self, model: &Model, r7: &[f64], r8: &mut [f64], work: &mut [f64]) {
        for (j, wj) in work.iter_mut().enumerate() {
            *wj = theta_value(&self.scaling, j) * r7[j];
        }
        r8.copy_from_slice(&self.res.r1);
        sparse::spmv(model.a(), work, r8, 1.0, 1.0);
    }

    /// Average complementarity over the finite bounds.
    pub fn compute_mu(&mut self, model: &Model) {
        let mut sum = 0.0;
        let mut count = 0usize;
        for i in 0..model.n() {
            if model.has_lb(i) {
                sum += self.xl[i] * self.zl[i];
                count += 1;
            }
            if model.has_ub(i) {
                sum += self.xu[i] * self.zu[i];
                count += 1;
            }
        }
        self.mu = if count == 0 { 0.0 } else { sum / count as f64 };
    }

    /// Theta^{-1}[i] = zl/xl + zu/xu over present bounds, guarded against
    /// underflow with the geometric mean of the value and the guard.
    pub fn compute_scaling(&mut self, model: &Model) {
        for i in 0..model.n() {
            let mut v = 0.0;
            if model.has_lb(i) {
                v += self.zl[i] / self.xl[i];
            }
            if model.has_ub(i) {
                v += self.zu[i] / self.xu[i];
            }
            if v < THETA_INV_UNDERFLOW {
                v = (THETA_INV_UNDERFLOW * v).sqrt();
            }
            self.scaling[i] = v;
        }
    }

    /// Objectives, infeasibilities and the relative gap.
    pub fn indicators(&mut self, model: &Model) {
        self.pobj = vecops::dot(model.c(), &self.x);

        let mut dobj = vecops::dot(model.b(), &self.y);
        for i in 0..model.n() {
            if model.has_lb(i) {
                dobj += model.lb(i) * self.zl[i];
            }
            if model.has_ub(i) {
                dobj -= model.ub(i) * self.zu[i];
            }
        }
        self.dobj = dobj;

        let norm_primal = vecops::inf_norm(&self.res.r1)
            .max(vecops::inf_norm(&self.res.r2))
            .max(vecops::inf_norm(&self.res.r3));
        self.pinf = norm_primal / (1.0 + model.norm_scaled_rhs());
        self.dinf = vecops::inf_norm(&self.res.r4) / (1.0 + model.norm_scaled_obj());
        self.pdgap = (self.pobj - self.dobj).abs() / (1.0 + 0.5 * (self.pobj + self.dobj).abs());
    }

    pub fn is_nan(&self) -> bool {
        vecops::has_nan(&self.x)
            || vecops::has_nan(&self.xl)
            || vecops::has_nan(&self.xu)
            || vecops::has_nan(&self.y)
            || vecops::has_nan(&self.zl)
            || vecops::has_nan(&self.zu)
    }

    pub fn is_inf(&self) -> bool {
        vecops::has_inf(&self.x)
            || vecops::has_inf(&self.xl)
            || vecops::has_inf(&self.xu)
            || vecops::has_inf(&self.y)
            || vecops::has_inf(&self.zl)
            || vecops::has_inf(&self.zu)
    }

    /// True if a component tied to a finite bound went negative.
    pub fn has_negative_component(&self, model: &Model) -> bool {
        for i in 0..model.n() {
            if model.has_lb(i) && (self.xl[i] < 0.0 || self.zl[i] < 0.0) {
                return true;
            }
            if model.has_ub(i) && (self.xu[i] < 0.0 || self.zu[i] < 0.0) {
                return true;
            }
        }
        false
    }

    /// Smallest and largest complementarity product over finite bounds.
    pub fn product_range(&self, model: &Model) -> (f64, f64) {
        let mut min_prod = f64::INFINITY;
        let mut max_prod = 0.0f64;
        for i in 0..model.n() {
            if model.has_lb(i) {
                let p = self.xl[i] * self.zl[i];
                min_prod = min_prod.min(p);
                max_prod = max_prod.max(p);
            }
            if model.has_ub(i) {
                let p = self.xu[i] * self.zu[i];
                min_prod = min_prod.min(p);
                max_prod = max_prod.max(p);
            }
        }
        if min_prod == f64::INFINITY {
            min_prod = 0.0;
        }
        (min_prod, max_prod)
    }

    /// Copy the point into the user-facing layout, still in scaled space.
    ///
    /// Structural variables come first in the internal ordering, so the
    /// solution takes their prefix; slacks are read back from their columns.
    pub fn extract(&self, model: &Model) -> Solution {
        let nv = model.num_orig_var();
        let m = model.m();

        let mut slack = vec![0.0; m];
        for (row, s) in slack.iter_mut().enumerate() {
            if let Some(col) = model.slack_col(row) {
                *s = self.x[col];
            }
        }

        Solution {
            x: self.x[..nv].to_vec(),
            xl: self.xl[..nv].to_vec(),
            xu: self.xu[..nv].to_vec(),
            slack,
            y: self.y.clone(),
            zl: self.zl[..nv].to_vec(),
            zu: self.zu[..nv].to_vec(),
        }
    }
}
