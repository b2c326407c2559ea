use std::fmt::Display;

use serde::Deserialize;

pub mod calibration;
pub mod hedging;
pub mod loss;
pub mod market;
pub mod pricing;
pub mod traits;

/// Option type.
#[derive(Deserialize, Default, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
  #[default]
  Call,
  Put,
}

impl OptionType {
  /// Payoff at expiry for an underlying value `s`.
  pub fn payoff(&self, s: f64, strike: f64) -> f64 {
    match self {
      OptionType::Call => (s - strike).max(0.0),
      OptionType::Put => (strike - s).max(0.0),
    }
  }
}

/// Side of the hedged position.
#[derive(Deserialize, Default, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum OptionDirection {
  /// Short the option, long the hedge.
  #[default]
  Sold,
  Bought,
}

impl OptionDirection {
  /// +1 for a sold option, -1 for a bought one.
  pub fn sign(&self) -> f64 {
    match self {
      OptionDirection::Sold => 1.0,
      OptionDirection::Bought => -1.0,
    }
  }
}

impl Display for OptionDirection {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      OptionDirection::Sold => write!(f, "sold"),
      OptionDirection::Bought => write!(f, "bought"),
    }
  }
}

/// Holds various calibration loss metrics in one place.
#[derive(Default, Debug, Clone, Copy)]
pub struct CalibrationLossScore {
  /// Mean Absolute Error
  pub mae: f64,
  /// Mean Squared Error
  pub mse: f64,
  /// Root Mean Squared Error
  pub rmse: f64,
  /// Mean Percentage Error (in %)
  pub mpe: f64,
  /// Mean Absolute Percentage Error (in %)
  pub mape: f64,
  /// Mean Squared Percentage Error (in %)
  pub mspe: f64,
  /// Root Mean Squared Percentage Error (in %)
  pub rmspe: f64,
  /// Mean Relative Error (no %)
  pub mre: f64,
  /// Mean Relative Percentage Error (in %)
  pub mrpe: f64,
}

impl CalibrationLossScore {
  pub fn from_prices(market: &[f64], model: &[f64]) -> Self {
    Self {
      mae: loss::mae(market, model),
      mse: loss::mse(market, model),
      rmse: loss::rmse(market, model),
      mpe: loss::mpe(market, model),
      mape: loss::mape(market, model),
      mspe: loss::mspe(market, model),
      rmspe: loss::rmspe(market, model),
      mre: loss::mre(market, model),
      mrpe: loss::mrpe(market, model),
    }
  }
}
