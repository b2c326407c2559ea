//! # Calibration
//!
//! $$
//! \hat\Theta=\arg\min_{\Theta\in[\ell,u]}\sum_i\left(C^{\text{model}}_i(\Theta)-C^{\text{mkt}}_i\right)^2
//! $$
//!
use impl_new_derive::ImplNew;
use nalgebra::DVector;
use serde::Deserialize;

use crate::quant::market::OptionSurface;
use crate::quant::CalibrationLossScore;

pub mod heston;
pub mod optimizer;

/// Number of Heston parameters.
pub const N_PARAMS: usize = 5;

/// Parameter names in vector order.
pub const PARAM_NAMES: [&str; N_PARAMS] = ["v0", "theta", "kappa", "sigma", "rho"];

/// Heston model parameters.
#[derive(ImplNew, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct HestonParams {
  /// Initial variance
  pub v0: f64,
  /// Long-run variance
  pub theta: f64,
  /// Mean reversion speed
  pub kappa: f64,
  /// Volatility of variance
  pub sigma: f64,
  /// Correlation between the asset and its variance
  pub rho: f64,
}

impl HestonParams {
  /// Parameters quoted with an initial volatility instead of variance.
  pub fn from_volatility(volatility: f64, theta: f64, kappa: f64, sigma: f64, rho: f64) -> Self {
    Self::new(volatility * volatility, theta, kappa, sigma, rho)
  }

  /// Initial volatility `sqrt(v0)`.
  pub fn volatility(&self) -> f64 {
    self.v0.sqrt()
  }

  /// `2 kappa theta > sigma^2`: the variance process stays strictly positive.
  pub fn satisfies_feller(&self) -> bool {
    2.0 * self.kappa * self.theta > self.sigma * self.sigma
  }

  /// Domain on which the characteristic function is defined.
  pub fn is_priceable(&self) -> bool {
    self.to_array().iter().all(|x| x.is_finite())
      && self.v0 >= 0.0
      && self.theta >= 0.0
      && self.kappa > 0.0
      && self.sigma > 0.0
      && self.rho > -1.0
      && self.rho < 1.0
  }

  pub fn to_array(&self) -> [f64; N_PARAMS] {
    [self.v0, self.theta, self.kappa, self.sigma, self.rho]
  }

  pub fn from_array(x: [f64; N_PARAMS]) -> Self {
    Self::new(x[0], x[1], x[2], x[3], x[4])
  }
}

impl From<HestonParams> for DVector<f64> {
  fn from(params: HestonParams) -> Self {
    DVector::from_row_slice(&params.to_array())
  }
}

impl From<DVector<f64>> for HestonParams {
  fn from(params: DVector<f64>) -> Self {
    HestonParams::new(params[0], params[1], params[2], params[3], params[4])
  }
}

/// Closed interval for one parameter.
#[derive(ImplNew, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Bound {
  pub lower: f64,
  pub upper: f64,
}

impl Bound {
  pub fn contains(&self, x: f64) -> bool {
    x >= self.lower && x <= self.upper
  }

  pub fn clamp(&self, x: f64) -> f64 {
    x.clamp(self.lower, self.upper)
  }

  pub fn width(&self) -> f64 {
    self.upper - self.lower
  }
}

/// Bound and calibration flag of one parameter.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ParameterInfo {
  pub bound: Bound,
  /// When false the parameter keeps its initial value.
  #[serde(default = "default_calibrate")]
  pub calibrate: bool,
}

fn default_calibrate() -> bool {
  true
}

impl ParameterInfo {
  pub fn free(lower: f64, upper: f64) -> Self {
    Self {
      bound: Bound::new(lower, upper),
      calibrate: true,
    }
  }

  pub fn fixed(lower: f64, upper: f64) -> Self {
    Self {
      bound: Bound::new(lower, upper),
      calibrate: false,
    }
  }
}

/// Per-parameter constraints in [`PARAM_NAMES`] order.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct ParameterBounds {
  pub v0: ParameterInfo,
  pub theta: ParameterInfo,
  pub kappa: ParameterInfo,
  pub sigma: ParameterInfo,
  pub rho: ParameterInfo,
}

impl Default for ParameterBounds {
  /// Volatility in [0.01, 1] (so v0 in [1e-4, 1]), theta in [0.01, 1], kappa
  /// in [0.01, 20], sigma in [0.01, 5], rho in [-0.99, 0.99].
  fn default() -> Self {
    Self {
      v0: ParameterInfo::free(1e-4, 1.0),
      theta: ParameterInfo::free(0.01, 1.0),
      kappa: ParameterInfo::free(0.01, 20.0),
      sigma: ParameterInfo::free(0.01, 5.0),
      rho: ParameterInfo::free(-0.99, 0.99),
    }
  }
}

impl ParameterBounds {
  pub fn to_array(&self) -> [ParameterInfo; N_PARAMS] {
    [self.v0, self.theta, self.kappa, self.sigma, self.rho]
  }

  /// Every parameter of `params` lies inside its interval.
  pub fn contains(&self, params: &HestonParams) -> bool {
    self
      .to_array()
      .iter()
      .zip(params.to_array())
      .all(|(info, x)| info.bound.contains(x))
  }
}

/// Everything the calibrator needs for one reference date.
pub struct CalibrationProblem<'a> {
  pub surface: &'a OptionSurface,
  pub initial_guess: HestonParams,
  pub bounds: ParameterBounds,
  /// Finite-difference steps in [`PARAM_NAMES`] order.
  pub step_sizes: [f64; N_PARAMS],
}

impl<'a> CalibrationProblem<'a> {
  pub fn new(
    surface: &'a OptionSurface,
    initial_guess: HestonParams,
    bounds: ParameterBounds,
    step_sizes: [f64; N_PARAMS],
  ) -> Self {
    Self {
      surface,
      initial_guess,
      bounds,
      step_sizes,
    }
  }
}

/// Outcome of a converged calibration.
#[derive(Clone, Debug)]
pub struct CalibrationResult {
  pub params: HestonParams,
  pub converged: bool,
  /// Solver's description of why it stopped.
  pub termination: String,
  pub evaluations: usize,
  /// Half the sum of squared residuals.
  pub objective: f64,
  pub market_prices: Vec<f64>,
  pub model_prices: Vec<f64>,
  /// `model - market` per quote.
  pub residuals: Vec<f64>,
  /// Black implied vols of the model prices (`NaN` when out of range).
  pub model_implied_vols: Vec<f64>,
  pub loss_scores: CalibrationLossScore,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dvector_roundtrip_keeps_order() {
    let p = HestonParams::new(0.0225, 0.04, 1.0, 0.5, -0.5);
    let v: DVector<f64> = p.into();
    assert_eq!(v.as_slice(), &[0.0225, 0.04, 1.0, 0.5, -0.5]);
    assert_eq!(HestonParams::from(v), p);
  }

  #[test]
  fn volatility_quote_is_squared() {
    let p = HestonParams::from_volatility(0.15, 0.04, 1.0, 0.5, -0.5);
    assert!((p.v0 - 0.0225).abs() < 1e-15);
    assert!((p.volatility() - 0.15).abs() < 1e-15);
  }

  #[test]
  fn feller_condition() {
    assert!(HestonParams::new(0.04, 0.04, 2.0, 0.3, -0.5).satisfies_feller());
    assert!(!HestonParams::new(0.04, 0.04, 1.0, 0.5, -0.5).satisfies_feller());
  }

  #[test]
  fn default_bounds_contain_default_guess() {
    let bounds = ParameterBounds::default();
    assert!(bounds.contains(&HestonParams::from_volatility(0.15, 0.04, 1.0, 0.5, -0.5)));
    assert!(!bounds.contains(&HestonParams::new(0.04, 0.04, 1.0, 0.5, -0.995)));
  }
}
