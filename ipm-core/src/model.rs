//! Internal LP model.
//!
//! Holds the problem in the form the IPM iterates on: every constraint an
//! equality after slack columns are appended, the data scaled by
//! Curtis-Reid powers of two. Keeps the scaling exponents so solutions can
//! be mapped back to the caller's space exactly.

use crate::linalg::sparse::{self, SparseCsc};
use crate::linalg::vecops;
use crate::problem::{ConstraintKind, LpProblem, ModelError, Solution};
use crate::scaling::{curtis_reid_exponents, ldexp};

/// LP data after scaling and reformulation.
///
/// Dimensions are fixed once construction finishes: `n` variables
/// (structural plus slack) and `m` equality constraints.
pub struct Model {
    n: usize,
    m: usize,
    num_orig_var: usize,

    c: Vec<f64>,
    b: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    a: SparseCsc,
    constraints: Vec<ConstraintKind>,

    // power-of-two scaling exponents; empty when unscaled
    colexp: Vec<i32>,
    rowexp: Vec<i32>,
    // uniform exponents for b and c, zero unless configured otherwise
    bexp: i32,
    cexp: i32,

    // slack column attached to each inequality row
    slack_of_row: Vec<Option<usize>>,

    name: String,
}

impl Model {
    /// Build the internal model: validate, copy, scale, reformulate.
    pub fn from_problem(problem: &LpProblem) -> Result<Self, ModelError> {
        problem.validate()?;

        let mut model = Self {
            n: problem.num_var,
            m: problem.num_con,
            num_orig_var: problem.num_var,
            c: problem.obj.clone(),
            b: problem.rhs.clone(),
            lower: problem.lower.clone(),
            upper: problem.upper.clone(),
            a: sparse::from_csc_arrays(
                problem.num_con,
                problem.num_var,
                &problem.a_ptr,
                &problem.a_rows,
                &problem.a_vals,
            ),
            constraints: problem.constraints.clone(),
            colexp: Vec::new(),
            rowexp: Vec::new(),
            bexp: 0,
            cexp: 0,
            slack_of_row: vec![None; problem.num_con],
            name: problem.name.clone(),
        };

        model.scale();
        model.reformulate();
        Ok(model)
    }

    /// Number of variables, slacks included.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Number of constraints.
    pub fn m(&self) -> usize {
        self.m
    }

    /// Number of structural variables in the caller's problem.
    pub fn num_orig_var(&self) -> usize {
        self.num_orig_var
    }

    /// Constraint matrix after scaling and slack columns.
    pub fn a(&self) -> &SparseCsc {
        &self.a
    }

    /// Scaled cost vector.
    pub fn c(&self) -> &[f64] {
        &self.c
    }

    /// Scaled right-hand side.
    pub fn b(&self) -> &[f64] {
        &self.b
    }

    /// Scaled lower bound of variable `i`.
    pub fn lb(&self, i: usize) -> f64 {
        self.lower[i]
    }

    /// Scaled upper bound of variable `i`.
    pub fn ub(&self, i: usize) -> f64 {
        self.upper[i]
    }

    /// Whether variable `i` has a finite lower bound.
    pub fn has_lb(&self, i: usize) -> bool {
        self.lower[i].is_finite()
    }

    /// Whether variable `i` has a finite upper bound.
    pub fn has_ub(&self, i: usize) -> bool {
        self.upper[i].is_finite()
    }

    /// Whether Curtis-Reid scaling was applied.
    pub fn is_scaled(&self) -> bool {
        !self.colexp.is_empty()
    }

    /// Problem name for logging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slack column attached to inequality row `i`.
    pub fn slack_col(&self, row: usize) -> Option<usize> {
        self.slack_of_row[row]
    }

    /// Infinity norm of the scaled right-hand side data, bounds included.
    pub fn norm_scaled_rhs(&self) -> f64 {
        let mut norm = vecops::inf_norm(&self.b);
        for &d in self.lower.iter().chain(self.upper.iter()) {
            if d.is_finite() {
                norm = norm.max(d.abs());
            }
        }
        norm
    }

    /// Infinity norm of the scaled cost vector.
    pub fn norm_scaled_obj(&self) -> f64 {
        vecops::inf_norm(&self.c)
    }

    /// Compute Curtis-Reid exponents and apply them with exponent-only
    /// arithmetic. A matrix whose entries are all +-1 is left alone, and a
    /// matrix the scaling rejects (empty row or column) is kept unscaled.
    fn scale(&mut self) {
        let need_scaling = self.a.data().iter().any(|v| v.abs() != 1.0 && *v != 0.0);
        if !need_scaling {
            log::debug!("{}: no scaling required", self.name);
            return;
        }

        let (rowexp, colexp) = match curtis_reid_exponents(&self.a) {
            Ok(exps) => exps,
            Err(e) => {
                log::warn!("{}: scaling rejected ({}), solving unscaled", self.name, e);
                return;
            }
        };

        // Column scaled up by 2^colexp: cost up, bounds down. Row scaled up
        // by 2^rowexp: rhs up. Uniform exponents bexp/cexp on top.
        for col in 0..self.n {
            self.c[col] = ldexp(self.c[col], colexp[col] + self.cexp);
            self.lower[col] = ldexp(self.lower[col], -colexp[col] + self.bexp);
            self.upper[col] = ldexp(self.upper[col], -colexp[col] + self.bexp);
        }
        for row in 0..self.m {
            self.b[row] = ldexp(self.b[row], rowexp[row] + self.bexp);
        }

        let indptr: Vec<usize> = self.a.indptr().raw_storage().to_vec();
        let rows: Vec<usize> = self.a.indices().to_vec();
        let data = self.a.data_mut();
        for col in 0..indptr.len() - 1 {
            for el in indptr[col]..indptr[col + 1] {
                data[el] = ldexp(data[el], rowexp[rows[el]] + colexp[col]);
            }
        }

        self.rowexp = rowexp;
        self.colexp = colexp;
    }

    /// Turn inequality rows into equalities by appending slack columns.
    ///
    /// A `<=` row gets a slack in [0, +inf), a `>=` row one in (-inf, 0].
    /// Slack columns are unit columns with cost zero and scaling exponent
    /// zero.
    fn reformulate(&mut self) {
        let mut slack_rows = Vec::new();
        for i in 0..self.m {
            match self.constraints[i] {
                ConstraintKind::Eq => {}
                ConstraintKind::Le => {
                    self.slack_of_row[i] = Some(self.n);
                    self.lower.push(0.0);
                    self.upper.push(f64::INFINITY);
                    self.push_slack(i, &mut slack_rows);
                }
                ConstraintKind::Ge => {
                    self.slack_of_row[i] = Some(self.n);
                    self.lower.push(f64::NEG_INFINITY);
                    self.upper.push(0.0);
                    self.push_slack(i, &mut slack_rows);
                }
            }
        }
        if !slack_rows.is_empty() {
            self.a = sparse::append_unit_columns(&self.a, &slack_rows);
        }
    }

    fn push_slack(&mut self, row: usize, slack_rows: &mut Vec<usize>) {
        self.c.push(0.0);
        if !self.colexp.is_empty() {
            self.colexp.push(0);
        }
        slack_rows.push(row);
        self.n += 1;
    }

    /// Map a scaled solution back to the caller's space.
    ///
    /// Exponent-only multiplications, so the round trip is exact. Components
    /// for absent bounds are overwritten with the conventional values.
    pub fn unscale(&self, sol: &mut Solution) {
        if !self.colexp.is_empty() {
            for i in 0..self.num_orig_var {
                let xe = self.colexp[i] - self.bexp;
                sol.x[i] = ldexp(sol.x[i], xe);
                sol.xl[i] = ldexp(sol.xl[i], xe);
                sol.xu[i] = ldexp(sol.xu[i], xe);

                let ze = -self.colexp[i] - self.cexp;
                sol.zl[i] = ldexp(sol.zl[i], ze);
                sol.zu[i] = ldexp(sol.zu[i], ze);
            }
            for i in 0..self.m {
                sol.y[i] = ldexp(sol.y[i], self.rowexp[i] - self.cexp);
                sol.slack[i] = ldexp(sol.slack[i], -self.rowexp[i]);
            }
        }

        for i in 0..self.num_orig_var {
            if !self.has_lb(i) {
                sol.xl[i] = f64::INFINITY;
                sol.zl[i] = 0.0;
            }
            if !self.has_ub(i) {
                sol.xu[i] = f64::INFINITY;
                sol.zu[i] = 0.0;
            }
        }
    }

    /// Log the magnitude ranges of the scaled data.
    pub fn log_coefficient_ranges(&self) {
        let range = |it: &mut dyn Iterator<Item = f64>| -> (f64, f64) {
            let mut lo = f64::INFINITY;
            let mut hi = 0.0f64;
            for v in it {
                if v != 0.0 && v.is_finite() {
                    lo = lo.min(v.abs());
                    hi = hi.max(v.abs());
                }
            }
            if lo == f64::INFINITY {
                lo = 0.0;
            }
            (lo, hi)
        };

        let (amin, amax) = range(&mut self.a.data().iter().copied());
        let (bmin, bmax) = range(&mut self.b.iter().copied());
        let (cmin, cmax) = range(&mut self.c.iter().copied());
        let (lmin, lmax) = range(&mut self.lower.iter().chain(self.upper.iter()).copied());

        log::debug!(
            "{}: |A| in [{:.1e}, {:.1e}], |b| in [{:.1e}, {:.1e}], |c| in [{:.1e}, {:.1e}], bounds in [{:.1e}, {:.1e}]",
            self.name, amin, amax, bmin, bmax, cmin, cmax, lmin, lmax
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem_with(constraints: Vec<ConstraintKind>, vals: Vec<f64>) -> LpProblem {
        let m = constraints.len();
        LpProblem {
            num_var: 2,
            num_con: m,
            obj: vec![1.0, 2.0],
            rhs: vec![4.0; m],
            lower: vec![0.0, f64::NEG_INFINITY],
            upper: vec![8.0, f64::INFINITY],
            a_ptr: vec![0, m, 2 * m],
            a_rows: (0..m).chain(0..m).collect(),
            a_vals: vals,
            constraints,
            name: "model-test".to_string(),
        }
    }

    #[test]
    fn test_reformulation_adds_slacks() {
        let p = problem_with(
            vec![ConstraintKind::Le, ConstraintKind::Eq, ConstraintKind::Ge],
            vec![1.0; 6],
        );
        let model = Model::from_problem(&p).unwrap();

        assert_eq!(model.n(), 4);
        assert_eq!(model.m(), 3);
        assert_eq!(model.num_orig_var(), 2);
        assert_eq!(model.a().cols(), 4);

        // <= slack in [0, inf)
        let le_slack = model.slack_col(0).unwrap();
        assert_eq!(model.lb(le_slack), 0.0);
        assert!(!model.has_ub(le_slack));
        // = row has no slack
        assert!(model.slack_col(1).is_none());
        // >= slack in (-inf, 0]
        let ge_slack = model.slack_col(2).unwrap();
        assert!(!model.has_lb(ge_slack));
        assert_eq!(model.ub(ge_slack), 0.0);

        // slack costs are zero
        assert_eq!(model.c()[le_slack], 0.0);
        assert_eq!(model.c()[ge_slack], 0.0);
    }

    #[test]
    fn test_unit_matrix_not_scaled() {
        let p = problem_with(vec![ConstraintKind::Eq], vec![1.0, -1.0]);
        let model = Model::from_problem(&p).unwrap();
        assert!(!model.is_scaled());
    }

    #[test]
    fn test_scaling_round_trip_exact() {
        let p = problem_with(vec![ConstraintKind::Eq, ConstraintKind::Eq], vec![4.0, 16.0, 0.25, 64.0]);
        let model = Model::from_problem(&p).unwrap();
        assert!(model.is_scaled());

        // every scaled entry maps back to the original bits
        for (val, (row, col)) in model.a().iter() {
            let orig = ldexp(*val, -(model.rowexp[row] + model.colexp[col]));
            let expected = p.a_vals[p.a_rows.iter().enumerate().position(|(el, &r)| {
                r == row && el >= p.a_ptr[col] && el < p.a_ptr[col + 1]
            }).unwrap()];
            assert_eq!(orig.to_bits(), expected.to_bits());
        }
        for i in 0..2 {
            let orig_b = ldexp(model.b()[i], -(model.rowexp[i] + model.bexp));
            assert_eq!(orig_b.to_bits(), p.rhs[i].to_bits());
        }
        for j in 0..2 {
            let orig_c = ldexp(model.c()[j], -(model.colexp[j] + model.cexp));
            assert_eq!(orig_c.to_bits(), p.obj[j].to_bits());
        }
    }

    #[test]
    fn test_zero_row_falls_back_to_unscaled() {
        // row 1 is kept empty; Curtis-Reid refuses, the model solves unscaled
        let p = LpProblem {
            num_var: 2,
            num_con: 2,
            obj: vec![1.0, 1.0],
            rhs: vec![4.0, 0.0],
            lower: vec![0.0, 0.0],
            upper: vec![f64::INFINITY, f64::INFINITY],
            a_ptr: vec![0, 1, 2],
            a_rows: vec![0, 0],
            a_vals: vec![2.0, 3.0],
            constraints: vec![ConstraintKind::Eq, ConstraintKind::Eq],
            name: "zero-row".to_string(),
        };
        let model = Model::from_problem(&p).unwrap();
        assert!(!model.is_scaled());
        assert_eq!(model.a().data(), &[2.0, 3.0]);
    }

    #[test]
    fn test_unscale_marks_absent_bounds() {
        let p = problem_with(vec![ConstraintKind::Eq], vec![1.0, 1.0]);
        let model = Model::from_problem(&p).unwrap();

        let mut sol = Solution {
            x: vec![1.0, 2.0],
            xl: vec![0.5, 0.5],
            xu: vec![0.5, 0.5],
            slack: vec![0.0],
            y: vec![1.0],
            zl: vec![1.0, 1.0],
            zu: vec![1.0, 1.0],
        };
        model.unscale(&mut sol);

        // variable 1 is free
        assert_eq!(sol.xl[1], f64::INFINITY);
        assert_eq!(sol.zl[1], 0.0);
        assert_eq!(sol.xu[1], f64::INFINITY);
        assert_eq!(sol.zu[1], 0.0);
        // variable 0 has both bounds and keeps its values
        assert_eq!(sol.xl[0], 0.5);
    }

    #[test]
    fn test_norm_helpers() {
        let p = problem_with(vec![ConstraintKind::Eq], vec![1.0, 1.0]);
        let model = Model::from_problem(&p).unwrap();
        // bounds contribute to the rhs norm
        assert_eq!(model.norm_scaled_rhs(), 8.0);
        assert_eq!(model.norm_scaled_obj(), 2.0);
    }
}
