//! # Errors
//!
//! Typed failures of the calibration and hedging pipelines.
//!
use chrono::NaiveDate;
use thiserror::Error;

use crate::quant::calibration::HestonParams;

/// Failures raised by [`crate::quant::calibration::heston::HestonCalibrator`].
#[derive(Debug, Error)]
pub enum CalibrationError {
  /// The problem definition itself is malformed (empty surface, bad bounds, ...).
  #[error("invalid calibration input: {0}")]
  InvalidInput(String),

  /// The starting point cannot be priced (non-finite model price or Feller breach).
  #[error("initial guess {params:?} is infeasible: {reason}")]
  InfeasibleParameters { params: HestonParams, reason: String },

  /// The solver stopped without meeting its convergence criteria or the
  /// residual tolerance. The best iterate is attached for inspection.
  #[error("calibration did not converge ({reason}) after {evaluations} evaluations, rmse {rmse:.3e}")]
  OptimizationFailure {
    reason: String,
    evaluations: usize,
    rmse: f64,
    best: HestonParams,
  },
}

/// Failures raised by the hedging simulator. All of them abort the run.
#[derive(Debug, Error, PartialEq)]
pub enum HedgeError {
  /// A business day required by the strategy has no price observation.
  #[error("no underlying observation for required business day {date}")]
  DataGap { date: NaiveDate },

  /// The observed underlying price is zero or negative.
  #[error("non-positive underlying price {price} on {date}")]
  NonPositiveUnderlying { date: NaiveDate, price: f64 },

  /// Observation dates are not strictly increasing.
  #[error("observation dates must be strictly increasing, found {previous} followed by {current}")]
  NonIncreasingDates {
    previous: NaiveDate,
    current: NaiveDate,
  },

  #[error("invalid hedge input: {0}")]
  InvalidInput(String),
}

/// Configuration loading/validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error(transparent)]
  Source(#[from] config::ConfigError),

  #[error("invalid configuration: {0}")]
  Invalid(String),
}
