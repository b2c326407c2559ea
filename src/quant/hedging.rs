//! # Hedging
//!
//! $$
//! \Pi_t=\beta_t B_t+\Delta_t S_t,\qquad
//! \beta_{t}\leftarrow\beta_{t}-\frac{(\Delta_t-\Delta_{t-1})S_t}{B_t}
//! $$
//!
//! Discrete-time, self-financing delta hedge of a single European option,
//! replayed day by day over an observed underlying path.
//!
pub mod engine;
pub mod types;

pub use engine::DeltaHedgeSimulator;
pub use types::HedgeConfig;
pub use types::HedgeReport;
pub use types::HedgeState;
pub use types::MoneynessConvention;
pub use types::OptionContract;
pub use types::SimulationPhase;
pub use types::TradeLogEntry;

use crate::quant::calibration::HestonParams;
use crate::quant::market::DiscountCurve;
use crate::quant::market::ForwardCurve;
use crate::quant::traits::PricingMethod;
use crate::quant::OptionType;

/// Model premium of the hedged option at trade date. Puts come from call
/// parity on the forward: `P = C - df (F - K)`.
pub fn option_premium(
  pricing: &dyn PricingMethod,
  params: &HestonParams,
  option_type: OptionType,
  strike: f64,
  tau: f64,
  forward: &dyn ForwardCurve,
  discount: &dyn DiscountCurve,
) -> f64 {
  let call = pricing.price(params, strike, tau);
  match option_type {
    OptionType::Call => call,
    OptionType::Put => call - discount.discount_factor(tau) * (forward.value(tau) - strike),
  }
}
