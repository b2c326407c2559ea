use crate::quant::calibration::HestonParams;

/// Prices a European call under a parameter vector.
///
/// Market context (spot, curves) lives in the implementor. Implementations must
/// be deterministic and return a non-finite value rather than panic when the
/// parameters cannot be priced.
pub trait PricingMethod {
  fn price(&self, params: &HestonParams, strike: f64, maturity: f64) -> f64;
}

/// Call delta used as the hedge ratio.
pub trait DeltaFunction: Send + Sync {
  /// Sensitivity of the call value to the underlying, in `[0, 1]`.
  fn delta(
    &self,
    params: &HestonParams,
    underlying: f64,
    strike: f64,
    tau: f64,
    risk_free_rate: f64,
  ) -> f64;
}
