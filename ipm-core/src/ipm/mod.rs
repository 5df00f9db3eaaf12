//! Interior point driver.
//!
//! Runs a Mehrotra-style predictor step followed by Gondzio multiple
//! centrality correctors on the long-step path-following method. Each
//! iteration:
//!
//! 1. validity, progress and termination checks;
//! 2. Theta^{-1} update and one factorization of the chosen Newton form;
//! 3. affine predictor with sigma = 0.01, bound-component recovery;
//! 4. centrality correctors while they enlarge the step sizes;
//! 5. Mehrotra step sizes and the update of the iterate.
//!
//! The driver exclusively owns the model, the iterate and the linear
//! solver for the duration of a solve. All scratch vectors are allocated
//! up front and reused, so the steady-state loop performs no heap
//! allocation.

pub mod correctors;
pub mod diagnostics;
pub mod iterate;

use std::mem;

use thiserror::Error;

use crate::linalg::ldl_backend::{LdlSolver, MAX_REFINEMENT_ITER};
use crate::linalg::solver::{LinearSolver, SolverError};
use crate::linalg::sparse;
use crate::linalg::vecops::vector_add;
use crate::linalg::PRIMAL_STATIC_REGULARIZATION;
use crate::model::Model;
use crate::problem::{LpProblem, ModelError, NlaMode, Options, Solution, Status};
use diagnostics::Collector;
use iterate::{Iterate, NewtonDir};

/// Iteration cap.
pub const MAX_ITERATIONS: usize = 100;

/// Tolerance shared by the three termination measures.
pub const IPM_TOLERANCE: f64 = 1e-8;

/// Consecutive small-step iterations before giving up.
const MAX_BAD_ITER: usize = 5;

/// Centering parameter of the affine predictor.
const SIGMA_AFFINE: f64 = 0.01;

/// Hard cap on the number of centrality correctors.
const MAX_CORRECTORS: usize = 5;

/// Empirical BLAS-3 versus BLAS-2 cost ratio of factor against solve.
const BLAS3_COST_RATIO: f64 = 1.0 / 112.0;

/// Driver-level failures. Any of these aborts the solve with
/// `Status::Error`; per-iteration state is simply abandoned.
#[derive(Debug, Error)]
pub enum IpmError {
    /// Input rejected before the solve started.
    #[error("invalid model: {0}")]
    Model(#[from] ModelError),

    /// Symbolic setup of the linear solver failed.
    #[error("linear solver setup failed: {0}")]
    Setup(SolverError),

    /// One of the two auxiliary systems of the starting point failed.
    #[error("starting point failed: {0}")]
    StartingPoint(SolverError),

    /// A factorization failed during the iterations.
    #[error("factorization failed: {0}")]
    Factor(SolverError),

    /// A triangular solve failed during the iterations.
    #[error("linear solve failed: {0}")]
    SolveSystem(SolverError),

    /// The recovered direction contains NaN or Inf.
    #[error("Newton direction is not finite")]
    DirectionInvalid,

    /// The iterate went non-finite or lost positivity on a bounded
    /// component.
    #[error("iterate is not a valid interior point")]
    IterateInvalid,
}

/// Scratch vectors reused across iterations.
struct Workspace {
    res7: Vec<f64>,
    res8: Vec<f64>,
    work_n: Vec<f64>,
    atdy: Vec<f64>,
    temp_m: Vec<f64>,
    ones: Vec<f64>,
    xlt: Vec<f64>,
    xut: Vec<f64>,
    zlt: Vec<f64>,
    zut: Vec<f64>,
}

impl Workspace {
    fn new(m: usize, n: usize) -> Self {
        Self {
            res7: vec![0.0; n],
            res8: vec![0.0; m],
            work_n: vec![0.0; n],
            atdy: vec![0.0; n],
            temp_m: vec![0.0; m],
            ones: vec![1.0; n],
            xlt: vec![0.0; n],
            xut: vec![0.0; n],
            zlt: vec![0.0; n],
            zut: vec![0.0; n],
        }
    }
}

/// The interior point solver.
pub struct Ipm {
    model: Model,
    it: Iterate,
    ls: Box<dyn LinearSolver>,
    options: Options,
    collector: Collector,

    n: usize,
    m: usize,
    iter: usize,
    bad_iter: usize,
    alpha_primal: f64,
    alpha_dual: f64,
    sigma: f64,
    max_correctors: usize,
    status: Status,

    work: Workspace,
    corr: NewtonDir,
}

impl Ipm {
    /// Load an LP: validate, scale, reformulate and allocate the iterate.
    pub fn new(problem: &LpProblem, options: Options) -> Result<Self, IpmError> {
        let model = Model::from_problem(problem)?;
        let n = model.n();
        let m = model.m();
        let it = Iterate::new(&model);

        Ok(Self {
            model,
            it,
            ls: Box::new(LdlSolver::new()),
            options,
            collector: Collector::new(),
            n,
            m,
            iter: 0,
            bad_iter: 0,
            alpha_primal: 0.0,
            alpha_dual: 0.0,
            sigma: SIGMA_AFFINE,
            max_correctors: 1,
            status: Status::MaxIter,
            work: Workspace::new(m, n),
            corr: NewtonDir::new(m, n),
        })
    }

    /// Run the IPM to termination.
    pub fn solve(&mut self) -> Status {
        if let Err(e) = self.run() {
            log::error!("{}: solve aborted: {}", self.model.name(), e);
            self.status = Status::Error;
        }
        self.ls.finalise();
        self.status
    }

    /// Final status of the last solve.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Iterations performed so far.
    pub fn iterations(&self) -> usize {
        self.iter
    }

    /// The current point, mapped back to the caller's space.
    pub fn solution(&self) -> Solution {
        let mut sol = self.it.extract(&self.model);
        self.model.unscale(&mut sol);
        sol
    }

    /// Per-iteration diagnostic records.
    pub fn diagnostics(&self) -> &[diagnostics::IterRecord] {
        self.collector.records()
    }

    fn run(&mut self) -> Result<(), IpmError> {
        self.initialize()?;

        while self.iter < MAX_ITERATIONS {
            if self.prepare_iter()? {
                break;
            }
            self.predictor()?;
            self.correctors()?;
            self.make_step();
        }
        Ok(())
    }

    fn initialize(&mut self) -> Result<(), IpmError> {
        self.print_info();
        self.model.log_coefficient_ranges();

        self.ls
            .setup(self.model.a(), &self.options)
            .map_err(IpmError::Setup)?;
        self.ls.clear();

        self.max_correctors = corrector_budget(self.ls.flops(), self.ls.nz());
        log::debug!(
            "{}: using up to {} centrality correctors",
            self.model.name(),
            self.max_correctors
        );

        self.starting_point()?;

        self.it.residual_1234(&self.model);
        self.it.compute_mu(&self.model);
        self.it.indicators(&self.model);
        self.print_output();
        Ok(())
    }

    /// Checks at the top of an iteration. Returns true when the main loop
    /// should stop with the status already set.
    fn prepare_iter(&mut self) -> Result<bool, IpmError> {
        if self.it.is_nan() || self.it.is_inf() || self.it.has_negative_component(&self.model) {
            return Err(IpmError::IterateInvalid);
        }

        if self.bad_iter >= MAX_BAD_ITER {
            log::info!("{}: no progress over {} iterations", self.model.name(), MAX_BAD_ITER);
            self.status = Status::NoProgress;
            return Ok(true);
        }

        if self.check_termination() {
            return Ok(true);
        }

        self.iter += 1;
        self.collector.start_iter(self.iter);

        self.it.delta.clear();
        self.ls.clear();
        self.it.compute_scaling(&self.model);

        Ok(false)
    }

    fn check_termination(&mut self) -> bool {
        let feasible = self.it.pinf < IPM_TOLERANCE && self.it.dinf < IPM_TOLERANCE;
        let optimal = self.it.pdgap < IPM_TOLERANCE;

        if feasible && optimal {
            log::info!("{}: optimal point found", self.model.name());
            self.status = Status::Optimal;
            true
        } else {
            false
        }
    }

    /// Affine scaling direction.
    fn predictor(&mut self) -> Result<(), IpmError> {
        self.sigma = SIGMA_AFFINE;
        self.collector.back_mut().sigma_affine = self.sigma;
        self.it.residual_56(&self.model, self.sigma);

        let mut delta = mem::take(&mut self.it.delta);
        let result = self
            .solve_newton_system(&mut delta)
            .and_then(|_| self.recover_direction(&mut delta));
        self.it.delta = delta;
        result
    }

    /// Multiple centrality correctors on top of the predictor.
    fn correctors(&mut self) -> Result<(), IpmError> {
        self.sigma_correctors();
        self.centrality_correctors()
    }

    /// Solve for (dx, dy) through the configured formulation.
    ///
    /// Normal equations: A Theta A^T dy = r8, then
    /// dx = Theta (A^T dy - r7). Augmented: one quasi-definite solve with
    /// right-hand side (r7, r1).
    fn solve_newton_system(&mut self, delta: &mut NewtonDir) -> Result<(), IpmError> {
        self.it.residual_7(&self.model, &mut self.work.res7);

        match self.options.nla {
            NlaMode::NormEq => {
                self.it.residual_8(
                    &self.model,
                    &self.work.res7,
                    &mut self.work.res8,
                    &mut self.work.work_n,
                );

                if !self.ls.valid() {
                    self.ls
                        .factor_ne(self.model.a(), &self.it.scaling)
                        .map_err(IpmError::Factor)?;
                }
                self.ls
                    .solve_ne(&self.work.res8, &mut delta.y)
                    .map_err(IpmError::SolveSystem)?;

                // dx = Theta (A^T dy - r7)
                delta.x.copy_from_slice(&self.work.res7);
                sparse::spmv_transpose(self.model.a(), &delta.y, &mut delta.x, 1.0, -1.0);
                for i in 0..self.n {
                    delta.x[i] /= self.it.scaling[i] + PRIMAL_STATIC_REGULARIZATION;
                }
            }
            NlaMode::Augmented => {
                if !self.ls.valid() {
                    self.ls
                        .factor_as(self.model.a(), &self.it.scaling)
                        .map_err(IpmError::Factor)?;
                }
                self.ls
                    .solve_as(&self.work.res7, &self.it.res.r1, &mut delta.x, &mut delta.y)
                    .map_err(IpmError::SolveSystem)?;
            }
        }

        Ok(())
    }

    /// Recover the bound components of the direction:
    ///
    /// ```text
    /// dxl = dx - r2            dzl = Xl^{-1} (r5 - Zl dxl)
    /// dxu = r3 - dx            dzu = Xu^{-1} (r6 - Zu dxu)
    /// ```
    ///
    /// then restore the dual feasibility row exactly on one side of each
    /// bounded variable, choosing the side with the larger complementarity
    /// weight.
    fn recover_direction(&mut self, delta: &mut NewtonDir) -> Result<(), IpmError> {
        let res = &self.it.res;
        for i in 0..self.n {
            if self.model.has_lb(i) {
                delta.xl[i] = delta.x[i] - res.r2[i];
                delta.zl[i] = (res.r5[i] - self.it.zl[i] * delta.xl[i]) / self.it.xl[i];
            } else {
                delta.xl[i] = 0.0;
                delta.zl[i] = 0.0;
            }
            if self.model.has_ub(i) {
                delta.xu[i] = res.r3[i] - delta.x[i];
                delta.zu[i] = (res.r6[i] - self.it.zu[i] * delta.xu[i]) / self.it.xu[i];
            } else {
                delta.xu[i] = 0.0;
                delta.zu[i] = 0.0;
            }
        }

        self.work.atdy.fill(0.0);
        sparse::spmv_transpose(self.model.a(), &delta.y, &mut self.work.atdy, 1.0, 0.0);
        for i in 0..self.n {
            let t = self.work.atdy[i];
            let has_lb = self.model.has_lb(i);
            let has_ub = self.model.has_ub(i);
            if has_lb && has_ub {
                if self.it.zl[i] * self.it.xu[i] >= self.it.zu[i] * self.it.xl[i] {
                    delta.zl[i] = self.it.res.r4[i] + delta.zu[i] - t;
                } else {
                    delta.zu[i] = -self.it.res.r4[i] + delta.zl[i] + t;
                }
            } else if has_lb {
                delta.zl[i] = self.it.res.r4[i] + delta.zu[i] - t;
            } else if has_ub {
                delta.zu[i] = -self.it.res.r4[i] + delta.zl[i] + t;
            }
        }

        let (nw, cw) = diagnostics::backward_error(&self.model, &self.it, delta);
        let rec = self.collector.back_mut();
        rec.nw_back_err = rec.nw_back_err.max(nw);
        rec.cw_back_err = rec.cw_back_err.max(cw);

        if delta.has_nan() || delta.has_inf() {
            return Err(IpmError::DirectionInvalid);
        }
        Ok(())
    }

    /// Largest alpha with x + alpha (dx + weight cor) >= 0 over the
    /// components with a bound on the given side. Also reports the blocking
    /// index.
    fn step_to_boundary(
        &self,
        x: &[f64],
        dx: &[f64],
        cor: Option<&[f64]>,
        weight: f64,
        lo: bool,
    ) -> (f64, Option<usize>) {
        let damp = 1.0 - f64::EPSILON;
        let mut alpha = 1.0f64;
        let mut block = None;

        for i in 0..x.len() {
            let bounded = if lo { self.model.has_lb(i) } else { self.model.has_ub(i) };
            if !bounded {
                continue;
            }
            let c = cor.map_or(0.0, |v| v[i] * weight);
            let step = dx[i] + c;
            if x[i] + alpha * step < 0.0 {
                alpha = -(x[i] * damp) / step;
                block = Some(i);
            }
        }
        (alpha, block)
    }

    /// Primal and dual steps to the boundary for a direction, optionally
    /// perturbed by a weighted corrector.
    fn steps_to_boundary(
        &self,
        delta: &NewtonDir,
        cor: Option<&NewtonDir>,
        weight: f64,
    ) -> (f64, f64) {
        let (axl, _) = self.step_to_boundary(&self.it.xl, &delta.xl, cor.map(|c| c.xl.as_slice()), weight, true);
        let (axu, _) = self.step_to_boundary(&self.it.xu, &delta.xu, cor.map(|c| c.xu.as_slice()), weight, false);
        let (azl, _) = self.step_to_boundary(&self.it.zl, &delta.zl, cor.map(|c| c.zl.as_slice()), weight, true);
        let (azu, _) = self.step_to_boundary(&self.it.zu, &delta.zu, cor.map(|c| c.zu.as_slice()), weight, false);

        (axl.min(axu).min(1.0), azl.min(azu).min(1.0))
    }

    /// Mehrotra step sizes: take the blocking component of each side to a
    /// complementarity product near the mu the maximal steps would give.
    fn step_sizes(&mut self) {
        let gamma_f = 0.9;
        let gamma_a = 1.0 / (1.0 - gamma_f);

        let it = &self.it;
        let delta = &it.delta;
        let (alpha_xl, block_xl) = self.step_to_boundary(&it.xl, &delta.xl, None, 0.0, true);
        let (alpha_xu, block_xu) = self.step_to_boundary(&it.xu, &delta.xu, None, 0.0, false);
        let (alpha_zl, block_zl) = self.step_to_boundary(&it.zl, &delta.zl, None, 0.0, true);
        let (alpha_zu, block_zu) = self.step_to_boundary(&it.zu, &delta.zu, None, 0.0, false);

        let max_p = alpha_xl.min(alpha_xu);
        let max_d = alpha_zl.min(alpha_zu);

        // mu at the maximal steps, damped by the Mehrotra heuristic factor
        let mut mu_full = 0.0;
        let mut num_finite = 0usize;
        for i in 0..self.n {
            if self.model.has_lb(i) {
                mu_full += (it.xl[i] + max_p * delta.xl[i]) * (it.zl[i] + max_d * delta.zl[i]);
                num_finite += 1;
            }
            if self.model.has_ub(i) {
                mu_full += (it.xu[i] + max_p * delta.xu[i]) * (it.zu[i] + max_d * delta.zu[i]);
                num_finite += 1;
            }
        }
        if num_finite > 0 {
            mu_full /= num_finite as f64;
        }
        mu_full /= gamma_a;

        let mut alpha_p = 1.0;
        if max_p < 1.0 {
            let (block, on_lower) = if alpha_xl <= alpha_xu {
                (block_xl.expect("blocked primal step has an index"), true)
            } else {
                (block_xu.expect("blocked primal step has an index"), false)
            };
            let (x, dx, z, dz) = if on_lower {
                (&it.xl, &delta.xl, &it.zl, &delta.zl)
            } else {
                (&it.xu, &delta.xu, &it.zu, &delta.zu)
            };
            let temp = mu_full / (z[block] + max_d * dz[block]);
            alpha_p = ((temp - x[block]) / dx[block]).max(gamma_f * max_p).min(1.0);
        }

        let mut alpha_d = 1.0;
        if max_d < 1.0 {
            let (block, on_lower) = if alpha_zl <= alpha_zu {
                (block_zl.expect("blocked dual step has an index"), true)
            } else {
                (block_zu.expect("blocked dual step has an index"), false)
            };
            let (x, dx, z, dz) = if on_lower {
                (&it.xl, &delta.xl, &it.zl, &delta.zl)
            } else {
                (&it.xu, &delta.xu, &it.zu, &delta.zu)
            };
            let temp = mu_full / (x[block] + max_p * dx[block]);
            alpha_d = ((temp - z[block]) / dz[block]).max(gamma_f * max_d).min(1.0);
        }

        self.alpha_primal = alpha_p.min(1.0 - 1e-4);
        self.alpha_dual = alpha_d.min(1.0 - 1e-4);
    }

    /// Advance the iterate and refresh residuals and indicators.
    fn make_step(&mut self) {
        self.step_sizes();

        if self.alpha_primal.min(self.alpha_dual) < 0.05 {
            self.bad_iter += 1;
        } else {
            self.bad_iter = 0;
        }

        vector_add(&mut self.it.x, &self.it.delta.x, self.alpha_primal);
        vector_add(&mut self.it.xl, &self.it.delta.xl, self.alpha_primal);
        vector_add(&mut self.it.xu, &self.it.delta.xu, self.alpha_primal);
        vector_add(&mut self.it.y, &self.it.delta.y, self.alpha_dual);
        vector_add(&mut self.it.zl, &self.it.delta.zl, self.alpha_dual);
        vector_add(&mut self.it.zu, &self.it.delta.zu, self.alpha_dual);

        self.it.residual_1234(&self.model);
        self.it.compute_mu(&self.model);
        self.it.indicators(&self.model);

        self.collect_data();
        self.print_output();
    }

    /// Mehrotra starting point. Two systems with the matrix A A^T put x
    /// near the affine hull of the constraints and y near dual
    /// feasibility; shifts then move the bound components strictly inside.
    fn starting_point(&mut self) -> Result<(), IpmError> {
        // x = clip(0, lower, upper), then projected toward A x = b
        for i in 0..self.n {
            self.it.x[i] = 0.0f64.max(self.model.lb(i)).min(self.model.ub(i));
        }

        match self.options.nla {
            NlaMode::NormEq => {
                // temp_m = (A A^T)^{-1} (b - A x)
                self.it.y.copy_from_slice(self.model.b());
                sparse::spmv(self.model.a(), &self.it.x, &mut self.it.y, -1.0, 1.0);

                self.ls
                    .factor_ne(self.model.a(), &self.work.ones)
                    .map_err(IpmError::StartingPoint)?;
                self.ls
                    .solve_ne(&self.it.y, &mut self.work.temp_m)
                    .map_err(IpmError::StartingPoint)?;
            }
            NlaMode::Augmented => {
                // the same correction through the augmented form with unit
                // scaling: [-I, A^T; A, 0] (.., dy) = (-x, b)
                self.ls
                    .factor_as(self.model.a(), &self.work.ones)
                    .map_err(IpmError::StartingPoint)?;

                for i in 0..self.n {
                    self.work.work_n[i] = -self.it.x[i];
                }
                self.ls
                    .solve_as(
                        &self.work.work_n,
                        self.model.b(),
                        &mut self.work.res7,
                        &mut self.work.temp_m,
                    )
                    .map_err(IpmError::StartingPoint)?;
            }
        }

        // x += A^T temp_m, reusing xl as scratch for the correction
        self.it.xl.fill(0.0);
        sparse::spmv_transpose(self.model.a(), &self.work.temp_m, &mut self.it.xl, 1.0, 0.0);
        vector_add(&mut self.it.x, &self.it.xl, 1.0);

        // xl, xu from the bounds, shifted strictly inside
        let mut violation = 0.0f64;
        for i in 0..self.n {
            self.it.xl[i] = if self.model.has_lb(i) {
                let v = self.it.x[i] - self.model.lb(i);
                violation = violation.min(v);
                v
            } else {
                0.0
            };
            self.it.xu[i] = if self.model.has_ub(i) {
                let v = self.model.ub(i) - self.it.x[i];
                violation = violation.min(v);
                v
            } else {
                0.0
            };
        }
        let shift = 1.0 + 0.0f64.max(-1.5 * violation);
        for i in 0..self.n {
            if self.model.has_lb(i) {
                self.it.xl[i] += shift;
            }
            if self.model.has_ub(i) {
                self.it.xu[i] += shift;
            }
        }

        // y from A A^T y = A c, reusing the factorization
        match self.options.nla {
            NlaMode::NormEq => {
                self.work.temp_m.fill(0.0);
                sparse::spmv(self.model.a(), self.model.c(), &mut self.work.temp_m, 1.0, 0.0);
                self.ls
                    .solve_ne(&self.work.temp_m, &mut self.it.y)
                    .map_err(IpmError::StartingPoint)?;
            }
            NlaMode::Augmented => {
                self.work.res8.fill(0.0);
                self.ls
                    .solve_as(
                        self.model.c(),
                        &self.work.res8,
                        &mut self.work.res7,
                        &mut self.it.y,
                    )
                    .map_err(IpmError::StartingPoint)?;
            }
        }

        // split c - A^T y between zl and zu
        self.it.zl.copy_from_slice(self.model.c());
        sparse::spmv_transpose(self.model.a(), &self.it.y, &mut self.it.zl, -1.0, 1.0);

        let mut violation = 0.0f64;
        for i in 0..self.n {
            let val = self.it.zl[i];
            self.it.zl[i] = 0.0;
            self.it.zu[i] = 0.0;

            let has_lb = self.model.has_lb(i);
            let has_ub = self.model.has_ub(i);
            if has_lb && has_ub {
                self.it.zl[i] = 0.5 * val;
                self.it.zu[i] = -0.5 * val;
            } else if has_lb {
                self.it.zl[i] = val;
            } else if has_ub {
                self.it.zu[i] = -val;
            }

            violation = violation.min(self.it.zl[i]).min(self.it.zu[i]);
        }
        let shift = 1.0 + 0.0f64.max(-1.5 * violation);
        for i in 0..self.n {
            if self.model.has_lb(i) {
                self.it.zl[i] += shift;
            }
            if self.model.has_ub(i) {
                self.it.zu[i] += shift;
            }
        }

        // centrality adjustment
        let mut xsum = 1.0;
        let mut zsum = 1.0;
        let mut mu = 1.0;
        for i in 0..self.n {
            if self.model.has_lb(i) {
                xsum += self.it.xl[i];
                zsum += self.it.zl[i];
                mu += self.it.xl[i] * self.it.zl[i];
            }
            if self.model.has_ub(i) {
                xsum += self.it.xu[i];
                zsum += self.it.zu[i];
                mu += self.it.xu[i] * self.it.zu[i];
            }
        }
        let dx = 0.5 * mu / zsum;
        let dz = 0.5 * mu / xsum;
        for i in 0..self.n {
            if self.model.has_lb(i) {
                self.it.xl[i] += dx;
                self.it.zl[i] += dz;
            }
            if self.model.has_ub(i) {
                self.it.xu[i] += dx;
                self.it.zu[i] += dz;
            }
        }

        Ok(())
    }

    fn collect_data(&mut self) {
        let (min_prod, max_prod) = self.it.product_range(&self.model);
        let (pobj, dobj) = (self.it.pobj, self.it.dobj);
        let (pinf, dinf) = (self.it.pinf, self.it.dinf);
        let (mu, pdgap) = (self.it.mu, self.it.pdgap);
        let (ap, ad) = (self.alpha_primal, self.alpha_dual);

        let rec = self.collector.back_mut();
        rec.p_obj = pobj;
        rec.d_obj = dobj;
        rec.p_inf = pinf;
        rec.d_inf = dinf;
        rec.mu = mu;
        rec.pd_gap = pdgap;
        rec.alpha_primal = ap;
        rec.alpha_dual = ad;
        rec.min_prod = min_prod;
        rec.max_prod = max_prod;
    }

    fn print_info(&self) {
        if !self.options.verbose {
            return;
        }
        println!("Problem {}", self.model.name());
        println!(
            "{} rows, {} cols, {} nnz",
            self.m,
            self.n,
            self.model.a().nnz()
        );
        println!(
            "Using {}",
            match self.options.nla {
                NlaMode::Augmented => "augmented systems",
                NlaMode::NormEq => "normal equations",
            }
        );
    }

    fn print_output(&self) {
        if !self.options.verbose {
            return;
        }
        if self.iter % 20 == 0 {
            println!(
                " iter      primal obj        dual obj        pinf      dinf        mu   alpha p/d    p/d gap"
            );
        }
        println!(
            "{:5} {:16.8e} {:16.8e} {:10.2e} {:10.2e} {:10.2e} {:5.2} {:5.2} {:10.2e}",
            self.iter,
            self.it.pobj,
            self.it.dobj,
            self.it.pinf,
            self.it.dinf,
            self.it.mu,
            self.alpha_primal,
            self.alpha_dual,
            self.it.pdgap
        );
    }
}

/// Correctors per iteration, from the factor/solve effort balance.
///
/// Each corrector costs additional solves; the factorization uses BLAS-3
/// and is discounted accordingly. With f refinement sweeps, up to
/// (1 + k)(1 + f/2) solves happen per iteration, so k is chosen with
/// (1 + k)(1 + f/2) below the discounted factor/solve ratio, and clamped
/// to [1, 5].
pub(crate) fn corrector_budget(factor_flops: f64, factor_nz: f64) -> usize {
    let solve_effort = 2.0 * factor_nz;
    if solve_effort <= 0.0 {
        return MAX_CORRECTORS;
    }
    let ratio = BLAS3_COST_RATIO * factor_flops / solve_effort;
    let thresh = ratio / (1.0 + MAX_REFINEMENT_ITER as f64 / 2.0) - 1.0;
    (thresh.floor() as i64).clamp(1, MAX_CORRECTORS as i64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::vecops;
    use crate::problem::ConstraintKind;

    fn two_sided_problem() -> LpProblem {
        // min x0 + 2 x1  s.t.  x0 + x1 = 1.5, 0 <= x <= 1
        LpProblem {
            num_var: 2,
            num_con: 1,
            obj: vec![1.0, 2.0],
            rhs: vec![1.5],
            lower: vec![0.0, 0.0],
            upper: vec![1.0, 1.0],
            a_ptr: vec![0, 1, 2],
            a_rows: vec![0, 0],
            a_vals: vec![1.0, 1.0],
            constraints: vec![ConstraintKind::Eq],
            name: "two-sided".to_string(),
        }
    }

    #[test]
    fn test_corrector_budget_bounds() {
        // discounted ratio of 10 allows one corrector
        let nz = 1000.0;
        let flops = 10.0 * 2.0 * nz / BLAS3_COST_RATIO;
        let k = corrector_budget(flops, nz);
        assert!((1..=MAX_CORRECTORS).contains(&k));
        assert_eq!(k, 1);

        // enormous factor cost saturates at the cap
        assert_eq!(corrector_budget(1e18, 10.0), MAX_CORRECTORS);
        // cheap factorizations still get one corrector
        assert_eq!(corrector_budget(0.0, 10.0), 1);
    }

    #[test]
    fn test_starting_point_is_interior() {
        let mut ipm = Ipm::new(&two_sided_problem(), Options::default()).unwrap();
        ipm.ls.setup(ipm.model.a(), &ipm.options).unwrap();
        ipm.starting_point().unwrap();

        for i in 0..ipm.n {
            if ipm.model.has_lb(i) {
                assert!(ipm.it.xl[i] > 0.0);
                assert!(ipm.it.zl[i] > 0.0);
            } else {
                assert_eq!(ipm.it.xl[i], 0.0);
                assert_eq!(ipm.it.zl[i], 0.0);
            }
            if ipm.model.has_ub(i) {
                assert!(ipm.it.xu[i] > 0.0);
                assert!(ipm.it.zu[i] > 0.0);
            } else {
                assert_eq!(ipm.it.xu[i], 0.0);
                assert_eq!(ipm.it.zu[i], 0.0);
            }
        }
    }

    #[test]
    fn test_newton_recovery_identities() {
        // after one predictor solve the direction satisfies the linear
        // rows of the Newton system to solver accuracy
        let mut ipm = Ipm::new(&two_sided_problem(), Options::default()).unwrap();
        ipm.ls.setup(ipm.model.a(), &ipm.options).unwrap();
        ipm.ls.clear();
        ipm.starting_point().unwrap();
        ipm.it.residual_1234(&ipm.model);
        ipm.it.compute_mu(&ipm.model);
        ipm.it.indicators(&ipm.model);

        ipm.iter = 1;
        ipm.it.compute_scaling(&ipm.model);
        ipm.predictor().unwrap();

        let delta = &ipm.it.delta;
        let res = &ipm.it.res;
        let n = ipm.n;

        let norm_rhs = vecops::inf_norm(&res.r1)
            .max(vecops::inf_norm(&res.r2))
            .max(vecops::inf_norm(&res.r3));
        let tol = 1e-8 * (1.0 + norm_rhs);

        // A dx = r1
        let mut adx = res.r1.clone();
        sparse::spmv(ipm.model.a(), &delta.x, &mut adx, -1.0, 1.0);
        assert!(vecops::inf_norm(&adx) <= tol, "A dx residual {}", vecops::inf_norm(&adx));

        for i in 0..n {
            if ipm.model.has_lb(i) {
                let r = delta.x[i] - delta.xl[i] - res.r2[i];
                assert!(r.abs() <= tol, "dxl identity at {}: {}", i, r);
            }
            if ipm.model.has_ub(i) {
                let r = delta.x[i] + delta.xu[i] - res.r3[i];
                assert!(r.abs() <= tol, "dxu identity at {}: {}", i, r);
            }
        }
    }

    #[test]
    fn test_step_to_boundary_blocking() {
        let ipm = Ipm::new(&two_sided_problem(), Options::default()).unwrap();

        // component 1 blocks at 0.5
        let x = vec![1.0, 1.0];
        let dx = vec![1.0, -2.0];
        let (alpha, block) = ipm.step_to_boundary(&x, &dx, None, 0.0, true);
        assert!((alpha - 0.5).abs() < 1e-12);
        assert_eq!(block, Some(1));

        // no blocking: full step
        let dx = vec![1.0, 1.0];
        let (alpha, block) = ipm.step_to_boundary(&x, &dx, None, 0.0, true);
        assert_eq!(alpha, 1.0);
        assert_eq!(block, None);
    }
}
