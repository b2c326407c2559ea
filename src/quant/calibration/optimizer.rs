//! # Optimizer
//!
//! $$
//! \theta_j=\ell_j+\frac{u_j-\ell_j}{1+e^{-z_j}},\qquad
//! \frac{\partial r}{\partial z_j}=\frac{\partial r}{\partial \theta_j}\,
//! \frac{(\theta_j-\ell_j)(u_j-\theta_j)}{u_j-\ell_j}
//! $$
//!
//! Box-constrained least squares on top of the `levenberg-marquardt` crate.
//! The solver iterates on the unconstrained `z`, so every trial lies inside
//! the box.
//!
use std::cell::Cell;
use std::cell::RefCell;

use levenberg_marquardt::LeastSquaresProblem;
use levenberg_marquardt::LevenbergMarquardt;
use nalgebra::DMatrix;
use nalgebra::DVector;
use nalgebra::Dyn;
use nalgebra::Owned;
use serde::Deserialize;
use tracing::debug;

use crate::quant::calibration::Bound;

/// Keeps the logistic inverse finite for points on the boundary.
const EDGE: f64 = 1e-9;

/// Residual vector of a trial point, `None` when the point cannot be evaluated.
pub type ResidualFn<'a> = dyn Fn(&[f64]) -> Option<DVector<f64>> + 'a;

#[derive(Clone, Debug)]
pub struct OptimizerOutcome {
  /// Best feasible point found, inside the bounds.
  pub solution: Vec<f64>,
  pub converged: bool,
  pub termination: String,
  pub evaluations: usize,
  /// Trials rejected because they could not be evaluated.
  pub rejected_trials: usize,
  /// Half the sum of squared residuals at `solution`.
  pub objective: f64,
}

/// Minimises a sum of squared residuals over a box.
pub trait LeastSquaresOptimizer {
  fn minimize(
    &self,
    residuals: &ResidualFn<'_>,
    initial_guess: &[f64],
    bounds: &[Bound],
    step_sizes: &[f64],
  ) -> OptimizerOutcome;
}

#[derive(Deserialize, Clone, Copy, Debug)]
#[serde(default)]
pub struct LevenbergMarquardtOptimizer {
  /// Budget in units of `n + 1` residual evaluations.
  pub max_iterations: usize,
  pub ftol: f64,
  pub xtol: f64,
  pub gtol: f64,
  /// Floor of the residual assigned to every quote of an infeasible trial.
  /// The actual value also exceeds ten times the largest feasible RMS residual
  /// seen, so a rejected trial never looks like an improvement.
  pub penalty: f64,
}

impl Default for LevenbergMarquardtOptimizer {
  fn default() -> Self {
    Self {
      max_iterations: 300,
      ftol: 1e-10,
      xtol: 1e-10,
      gtol: 1e-12,
      penalty: 1e3,
    }
  }
}

impl LeastSquaresOptimizer for LevenbergMarquardtOptimizer {
  fn minimize(
    &self,
    residuals: &ResidualFn<'_>,
    initial_guess: &[f64],
    bounds: &[Bound],
    step_sizes: &[f64],
  ) -> OptimizerOutcome {
    let problem = BoxedProblem::new(residuals, initial_guess, bounds, step_sizes, self.penalty);

    let (problem, report) = LevenbergMarquardt::new()
      .with_ftol(self.ftol)
      .with_xtol(self.xtol)
      .with_gtol(self.gtol)
      .with_patience(self.max_iterations)
      .minimize(problem);

    let (solution, best_sq) = problem.best.into_inner();

    OptimizerOutcome {
      solution,
      converged: report.termination.was_successful(),
      termination: format!("{:?}", report.termination),
      evaluations: problem.evaluations.get(),
      rejected_trials: problem.rejected.get(),
      objective: 0.5 * best_sq,
    }
  }
}

struct BoxedProblem<'a> {
  residual_fn: &'a ResidualFn<'a>,
  bounds: &'a [Bound],
  step_sizes: &'a [f64],
  penalty: f64,
  /// Rows of the residual vector; padded up to the parameter count.
  rows: usize,
  z: DVector<f64>,
  best: RefCell<(Vec<f64>, f64)>,
  /// Largest feasible squared norm seen; bounds every accepted iterate.
  worst_sq: Cell<f64>,
  evaluations: Cell<usize>,
  rejected: Cell<usize>,
}

impl<'a> BoxedProblem<'a> {
  fn new(
    residual_fn: &'a ResidualFn<'a>,
    initial_guess: &[f64],
    bounds: &'a [Bound],
    step_sizes: &'a [f64],
    penalty: f64,
  ) -> Self {
    let z = DVector::from_iterator(
      initial_guess.len(),
      initial_guess
        .iter()
        .zip(bounds)
        .zip(step_sizes)
        .map(|((x, b), h)| to_unbounded(pull_inside(*x, b, *h), b)),
    );
    let rows = residual_fn(initial_guess)
      .map(|r| r.len())
      .unwrap_or(0)
      .max(initial_guess.len());

    Self {
      residual_fn,
      bounds,
      step_sizes,
      penalty,
      rows,
      z,
      best: RefCell::new((initial_guess.to_vec(), f64::INFINITY)),
      worst_sq: Cell::new(0.0),
      evaluations: Cell::new(0),
      rejected: Cell::new(0),
    }
  }

  fn point(&self) -> Vec<f64> {
    self
      .z
      .iter()
      .zip(self.bounds)
      .map(|(z, b)| to_bounded(*z, b))
      .collect()
  }

  /// Finite residuals padded to `rows`, or `None`.
  fn evaluate(&self, x: &[f64]) -> Option<DVector<f64>> {
    self.evaluations.set(self.evaluations.get() + 1);
    let r = (self.residual_fn)(x)?;
    if r.iter().any(|v| !v.is_finite()) {
      return None;
    }
    let mut padded = DVector::zeros(self.rows);
    padded.rows_mut(0, r.len()).copy_from(&r);
    Some(padded)
  }

  fn penalty_level(&self) -> f64 {
    let rms = (self.worst_sq.get() / self.rows as f64).sqrt();
    self.penalty.max(10.0 * rms)
  }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for BoxedProblem<'_> {
  type JacobianStorage = Owned<f64, Dyn, Dyn>;
  type ParameterStorage = Owned<f64, Dyn>;
  type ResidualStorage = Owned<f64, Dyn>;

  fn set_params(&mut self, z: &DVector<f64>) {
    self.z.copy_from(z);
  }

  fn params(&self) -> DVector<f64> {
    self.z.clone()
  }

  fn residuals(&self) -> Option<DVector<f64>> {
    let x = self.point();
    match self.evaluate(&x) {
      Some(r) => {
        let sq = r.norm_squared();
        let mut best = self.best.borrow_mut();
        if sq < best.1 {
          *best = (x, sq);
        }
        self.worst_sq.set(self.worst_sq.get().max(sq));
        Some(r)
      }
      None => {
        self.rejected.set(self.rejected.get() + 1);
        debug!(trial = ?x, "infeasible trial rejected");
        Some(DVector::from_element(self.rows, self.penalty_level()))
      }
    }
  }

  fn jacobian(&self) -> Option<DMatrix<f64>> {
    let x = self.point();
    let r0 = self.evaluate(&x)?;
    let mut jacobian = DMatrix::zeros(self.rows, x.len());

    for j in 0..x.len() {
      let b = &self.bounds[j];
      let h = self.step_sizes[j];
      let forward = x[j] + h <= b.upper;
      let sides = if forward { [h, -h] } else { [-h, h] };

      for step in sides {
        if !b.contains(x[j] + step) {
          continue;
        }
        let mut shifted = x.clone();
        shifted[j] += step;
        if let Some(r) = self.evaluate(&shifted) {
          let chain = (x[j] - b.lower) * (b.upper - x[j]) / b.width();
          jacobian.set_column(j, &((r - &r0) * (chain / step)));
          break;
        }
      }
    }

    Some(jacobian)
  }
}

fn to_bounded(z: f64, b: &Bound) -> f64 {
  b.clamp(b.lower + b.width() / (1.0 + (-z).exp()))
}

/// Moves a start on (or within a step of) a bound into the interior, where the
/// logistic chain factor does not vanish.
fn pull_inside(x: f64, b: &Bound, step: f64) -> f64 {
  let margin = step.max(1e-3 * b.width());
  if b.width() <= 2.0 * margin {
    return x;
  }
  x.clamp(b.lower + margin, b.upper - margin)
}

fn to_unbounded(x: f64, b: &Bound) -> f64 {
  let s = ((x - b.lower) / b.width()).clamp(EDGE, 1.0 - EDGE);
  (s / (1.0 - s)).ln()
}
