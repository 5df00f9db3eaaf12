//! Multiple centrality correctors.
//!
//! After the predictor, extra directions push small complementarity
//! products up and large ones down toward sigma mu, which enlarges the
//! admissible steps. Following Gondzio, and Colombo and Gondzio, each
//! corrector is accepted only on the side (primal, dual) whose step it
//! improves, with a weight chosen by a scan of the interval between the
//! current combined step and one.

use crate::ipm::iterate::NewtonDir;
use crate::ipm::{Ipm, IpmError};
use crate::linalg::vecops::vector_add;

/// Complementarity products are corrected toward the band
/// [gamma sigma mu, sigma mu / gamma].
const GAMMA_CORRECTOR: f64 = 0.1;

/// Step increase attempted by each corrector.
const MCC_INCREASE_ALPHA: f64 = 0.1;

/// Fraction of the attempted increase a corrector must deliver.
const MCC_INCREASE_MIN: f64 = 0.1;

impl Ipm {
    /// Centering parameter for the correctors, from the previous step
    /// sizes: large steps ask for little centring, small steps for a lot.
    pub(crate) fn sigma_correctors(&mut self) {
        self.sigma = if (self.alpha_primal > 0.5 && self.alpha_dual > 0.5) || self.iter == 1 {
            0.01
        } else if self.alpha_primal > 0.2 && self.alpha_dual > 0.2 {
            0.1
        } else if self.alpha_primal > 0.1 && self.alpha_dual > 0.1 {
            0.25
        } else if self.alpha_primal > 0.05 && self.alpha_dual > 0.05 {
            0.5
        } else {
            0.9
        };
        self.collector.back_mut().sigma = self.sigma;
    }

    /// Right-hand side for one corrector.
    ///
    /// Evaluates the complementarity products at the trial point reached by
    /// the current direction with its steps pushed out by 0.1 (capped at
    /// one), and targets the products that leave the corrector band. The
    /// other residual blocks are zero: correctors are pure centrality
    /// directions.
    pub(crate) fn residuals_mcc(&mut self) {
        let (alpha_p, alpha_d) = self.steps_to_boundary(&self.it.delta, None, 0.0);
        let alpha_p = (alpha_p + MCC_INCREASE_ALPHA).min(1.0);
        let alpha_d = (alpha_d + MCC_INCREASE_ALPHA).min(1.0);

        self.work.xlt.copy_from_slice(&self.it.xl);
        self.work.xut.copy_from_slice(&self.it.xu);
        self.work.zlt.copy_from_slice(&self.it.zl);
        self.work.zut.copy_from_slice(&self.it.zu);
        vector_add(&mut self.work.xlt, &self.it.delta.xl, alpha_p);
        vector_add(&mut self.work.xut, &self.it.delta.xu, alpha_p);
        vector_add(&mut self.work.zlt, &self.it.delta.zl, alpha_d);
        vector_add(&mut self.work.zut, &self.it.delta.zu, alpha_d);

        let sigma_mu = self.sigma * self.it.mu;
        let small = sigma_mu * GAMMA_CORRECTOR;
        let large = sigma_mu / GAMMA_CORRECTOR;

        self.it.res.clear();
        for i in 0..self.n {
            if self.model.has_lb(i) {
                let prod = self.work.xlt[i] * self.work.zlt[i];
                if prod < small {
                    self.it.res.r5[i] = small - prod;
                } else if prod > large {
                    // limit how much a very large product may be pulled down
                    self.it.res.r5[i] = (large - prod).max(-large);
                }
            }
            if self.model.has_ub(i) {
                let prod = self.work.xut[i] * self.work.zut[i];
                if prod < small {
                    self.it.res.r6[i] = small - prod;
                } else if prod > large {
                    self.it.res.r6[i] = (large - prod).max(-large);
                }
            }
        }
    }

    /// Compute correctors while they keep improving the step sizes.
    pub(crate) fn centrality_correctors(&mut self) -> Result<(), IpmError> {
        let (mut alpha_p_old, mut alpha_d_old) = self.steps_to_boundary(&self.it.delta, None, 0.0);
        let min_gain = MCC_INCREASE_ALPHA * MCC_INCREASE_MIN;

        let mut computed = 0usize;
        for _ in 0..self.max_correctors {
            self.residuals_mcc();

            let mut corr = std::mem::take(&mut self.corr);
            corr.clear();
            let result = self
                .solve_newton_system(&mut corr)
                .and_then(|_| self.recover_direction(&mut corr));
            if let Err(e) = result {
                self.corr = corr;
                return Err(e);
            }

            let w0 = alpha_p_old * alpha_d_old;
            let (wp, wd, alpha_p, alpha_d) = self.best_weight(&corr, w0);

            let improved_p = alpha_p >= alpha_p_old + min_gain;
            let improved_d = alpha_d >= alpha_d_old + min_gain;
            if !improved_p && !improved_d {
                self.corr = corr;
                break;
            }

            if improved_p {
                vector_add(&mut self.it.delta.x, &corr.x, wp);
                vector_add(&mut self.it.delta.xl, &corr.xl, wp);
                vector_add(&mut self.it.delta.xu, &corr.xu, wp);
                alpha_p_old = alpha_p;
            }
            if improved_d {
                vector_add(&mut self.it.delta.y, &corr.y, wd);
                vector_add(&mut self.it.delta.zl, &corr.zl, wd);
                vector_add(&mut self.it.delta.zu, &corr.zu, wd);
                alpha_d_old = alpha_d;
            }
            self.corr = corr;
            computed += 1;

            if alpha_p_old > 0.95 && alpha_d_old > 0.95 {
                break;
            }
        }

        self.collector.back_mut().correctors = computed;
        Ok(())
    }

    /// Scan nine weights in [w0, 1] and keep, per side, the one that
    /// maximizes that side's step to the boundary.
    pub(crate) fn best_weight(&self, corrector: &NewtonDir, w0: f64) -> (f64, f64, f64, f64) {
        let mut wp = w0;
        let mut wd = w0;
        let mut alpha_p = 0.0;
        let mut alpha_d = 0.0;

        let step = (1.0 - w0) / 8.0;
        for k in 0..9 {
            let w = w0 + step * k as f64;
            let (ap, ad) = self.steps_to_boundary(&self.it.delta, Some(corrector), w);
            if ap > alpha_p {
                alpha_p = ap;
                wp = w;
            }
            if ad > alpha_d {
                alpha_d = ad;
                wd = w;
            }
            if step == 0.0 {
                break;
            }
        }

        (wp, wd, alpha_p, alpha_d)
    }
}
