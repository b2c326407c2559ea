//! # Loss
//!
//! $$
//! L=\frac1n\sum_{i=1}^n \ell(c^{\text{mkt}}_i,c^{\text{model}}_i)
//! $$
//!
//! Fit diagnostics of a calibrated surface. Percentage scores skip quotes whose
//! market price is numerically zero; every score of an empty surface is `NaN`.
//!

/// Mean of `f(market_i, model_i)` over the quotes.
fn mean_by<F: Fn(f64, f64) -> f64>(market: &[f64], model: &[f64], f: F) -> f64 {
  if market.is_empty() {
    return f64::NAN;
  }
  market
    .iter()
    .zip(model)
    .map(|(&m, &d)| f(m, d))
    .sum::<f64>()
    / market.len() as f64
}

/// `(market - model) / market`, zero for a vanishing market price.
fn relative_gap(market: f64, model: f64) -> f64 {
  if market.abs() < f64::EPSILON {
    0.0
  } else {
    (market - model) / market
  }
}

/// MAE = (1/N) Σ|market_i - model_i|
pub fn mae(market: &[f64], model: &[f64]) -> f64 {
  mean_by(market, model, |m, d| (m - d).abs())
}

/// MSE = (1/N) Σ(market_i - model_i)²
pub fn mse(market: &[f64], model: &[f64]) -> f64 {
  mean_by(market, model, |m, d| (m - d) * (m - d))
}

pub fn rmse(market: &[f64], model: &[f64]) -> f64 {
  mse(market, model).sqrt()
}

/// MPE = (100/N) Σ(market_i - model_i) / market_i
pub fn mpe(market: &[f64], model: &[f64]) -> f64 {
  100.0 * mean_by(market, model, relative_gap)
}

/// MAPE = (100/N) Σ|market_i - model_i| / |market_i|
pub fn mape(market: &[f64], model: &[f64]) -> f64 {
  100.0 * mean_by(market, model, |m, d| relative_gap(m, d).abs())
}

/// MSPE = (100/N) Σ((market_i - model_i) / market_i)²
pub fn mspe(market: &[f64], model: &[f64]) -> f64 {
  100.0 * mean_by(market, model, |m, d| relative_gap(m, d).powi(2))
}

pub fn rmspe(market: &[f64], model: &[f64]) -> f64 {
  mspe(market, model).sqrt()
}

/// MRE = (1/N) Σ(model_i - market_i) / market_i, the sign convention of residuals.
pub fn mre(market: &[f64], model: &[f64]) -> f64 {
  -mean_by(market, model, relative_gap)
}

pub fn mrpe(market: &[f64], model: &[f64]) -> f64 {
  100.0 * mre(market, model)
}
