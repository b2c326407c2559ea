use implied_vol::implied_black_volatility;
use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;

/// Black-76 call on a forward, discounted with `df`.
pub fn black76_call(forward: f64, strike: f64, vol: f64, tau: f64, df: f64) -> f64 {
  if tau <= 0.0 || vol <= 0.0 {
    return df * (forward - strike).max(0.0);
  }
  let n = Normal::default();
  let sd = vol * tau.sqrt();
  let d1 = ((forward / strike).ln() + 0.5 * sd * sd) / sd;
  let d2 = d1 - sd;

  df * (forward * n.cdf(d1) - strike * n.cdf(d2))
}

/// Black implied volatility of a discounted call price. `NaN` when the price
/// is outside the no-arbitrage band.
pub fn implied_black_vol(price: f64, forward: f64, strike: f64, tau: f64, df: f64) -> f64 {
  if !price.is_finite() || df <= 0.0 || tau <= 0.0 {
    return f64::NAN;
  }
  let undiscounted = price / df;
  if undiscounted <= (forward - strike).max(0.0) || undiscounted >= forward {
    return f64::NAN;
  }
  implied_black_volatility(undiscounted, forward, strike, tau, true)
}
