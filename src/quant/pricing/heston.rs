//! # Heston
//!
//! $$
//! C=P(0,T)\left(F-\frac{\sqrt{FK}}{\pi}\int_0^\infty
//! \frac{\operatorname{Re}\left[e^{iux}\,\psi(u-\tfrac i2)\right]}{u^2+\tfrac14}\,du\right),
//! \quad x=\ln\frac FK
//! $$
//!
//! $\psi$ is the characteristic function of $\ln(S_T/F)$ in the
//! Albrecher et al. ("little trap") form, which stays continuous for long
//! maturities.
//!
use std::f64::consts::FRAC_1_PI;

use num_complex::Complex64;
use quadrature::double_exponential;
use serde::Deserialize;

use crate::quant::calibration::HestonParams;
use crate::quant::market::DiscountCurve;
use crate::quant::market::ForwardCurve;
use crate::quant::traits::DeltaFunction;
use crate::quant::traits::PricingMethod;

/// Beyond this frequency a non-finite integrand is treated as underflow.
const TAIL_FREQUENCY: f64 = 1e4;

/// Fourier inversion used for the call price.
#[derive(Deserialize, Default, Clone, Copy, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FourierMethod {
  /// Lewis single-integral formula.
  #[default]
  Lewis,
  /// Carr-Madan damped call transform with damping `alpha`.
  CarrMadan { alpha: f64 },
}

#[derive(Clone, Copy, Debug)]
pub struct HestonFourier {
  pub method: FourierMethod,
  /// Target absolute error of each quadrature.
  pub tolerance: f64,
}

impl Default for HestonFourier {
  fn default() -> Self {
    Self {
      method: FourierMethod::Lewis,
      tolerance: 1e-10,
    }
  }
}

impl HestonFourier {
  pub fn new(method: FourierMethod, tolerance: f64) -> Self {
    Self { method, tolerance }
  }

  /// Characteristic function of `ln(S_T / F)` at a complex frequency.
  pub fn characteristic_fn(params: &HestonParams, u: Complex64, tau: f64) -> Complex64 {
    let i = Complex64::i();
    let one = Complex64::new(1.0, 0.0);
    let sigma2 = params.sigma * params.sigma;

    let iu = i * u;
    let beta = params.kappa - params.rho * params.sigma * iu;
    let mut d = (beta * beta + sigma2 * (u * u + iu)).sqrt();
    if d.re < 0.0 {
      d = -d;
    }
    let g = (beta - d) / (beta + d);
    let e = (-d * tau).exp();

    let c = (params.kappa * params.theta / sigma2)
      * ((beta - d) * tau - 2.0 * ((one - g * e) / (one - g)).ln());
    let dd = ((beta - d) / sigma2) * ((one - e) / (one - g * e));

    (c + dd * params.v0).exp()
  }

  /// Discounted call price from the forward and the discount factor.
  pub fn call_from_forward(
    &self,
    params: &HestonParams,
    forward: f64,
    strike: f64,
    tau: f64,
    df: f64,
  ) -> f64 {
    if !params.is_priceable() || forward <= 0.0 || strike <= 0.0 {
      return f64::NAN;
    }
    if tau <= 0.0 {
      return df * (forward - strike).max(0.0);
    }

    match self.method {
      FourierMethod::Lewis => {
        let x = (forward / strike).ln();
        let integral = self.integrate(|u| {
          let z = Complex64::new(u, -0.5);
          let phase = Complex64::new(0.0, u * x).exp();
          (phase * Self::characteristic_fn(params, z, tau)).re / (u * u + 0.25)
        });
        df * (forward - (forward * strike).sqrt() * FRAC_1_PI * integral)
      }
      FourierMethod::CarrMadan { alpha } => {
        let k = (strike / forward).ln();
        let integral = self.integrate(|u| {
          let z = Complex64::new(u, -(alpha + 1.0));
          let denom = Complex64::new(alpha * alpha + alpha - u * u, (2.0 * alpha + 1.0) * u);
          let phase = Complex64::new(0.0, -u * k).exp();
          (phase * Self::characteristic_fn(params, z, tau) / denom).re
        });
        df * forward * (-alpha * k).exp() * FRAC_1_PI * integral
      }
    }
  }

  /// Call price for a spot with flat rate and dividend yield.
  pub fn call_price(
    &self,
    params: &HestonParams,
    spot: f64,
    strike: f64,
    tau: f64,
    r: f64,
    q: f64,
  ) -> f64 {
    let forward = spot * ((r - q) * tau).exp();
    self.call_from_forward(params, forward, strike, tau, (-r * tau).exp())
  }

  /// Spot delta of the call, from the derivative of the Lewis integral:
  /// `e^{-q tau} (1 - sqrt(K/F)/pi * int Re[e^{iux} psi(u - i/2) / (1/2 - iu)] du)`.
  pub fn call_delta(
    &self,
    params: &HestonParams,
    spot: f64,
    strike: f64,
    tau: f64,
    r: f64,
    q: f64,
  ) -> f64 {
    if !params.is_priceable() || spot <= 0.0 || strike <= 0.0 || tau <= 0.0 {
      return f64::NAN;
    }
    let forward = spot * ((r - q) * tau).exp();
    let x = (forward / strike).ln();
    let integral = self.integrate(|u| {
      let z = Complex64::new(u, -0.5);
      let phase = Complex64::new(0.0, u * x).exp();
      (phase * Self::characteristic_fn(params, z, tau) / Complex64::new(0.5, -u)).re
    });

    (-q * tau).exp() * (1.0 - (strike / forward).sqrt() * FRAC_1_PI * integral)
  }

  // int_0^inf f(u) du with u = t / (1 - t)
  fn integrate<F: Fn(f64) -> f64>(&self, f: F) -> f64 {
    let mapped = |t: f64| {
      let u = t / (1.0 - t);
      let value = f(u) / ((1.0 - t) * (1.0 - t));
      if value.is_finite() || u < TAIL_FREQUENCY {
        value
      } else {
        0.0
      }
    };
    double_exponential::integrate(mapped, 0.0, 1.0, self.tolerance).integral
  }
}

/// [`PricingMethod`] over a forward curve and a discount curve.
pub struct HestonFourierPricer<'a> {
  pub forward: &'a dyn ForwardCurve,
  pub discount: &'a dyn DiscountCurve,
  pub engine: HestonFourier,
}

impl<'a> HestonFourierPricer<'a> {
  pub fn new(
    forward: &'a dyn ForwardCurve,
    discount: &'a dyn DiscountCurve,
    engine: HestonFourier,
  ) -> Self {
    Self {
      forward,
      discount,
      engine,
    }
  }
}

impl PricingMethod for HestonFourierPricer<'_> {
  fn price(&self, params: &HestonParams, strike: f64, maturity: f64) -> f64 {
    self.engine.call_from_forward(
      params,
      self.forward.value(maturity),
      strike,
      maturity,
      self.discount.discount_factor(maturity),
    )
  }
}

/// Semi-analytic Heston call delta.
#[derive(Clone, Copy, Debug)]
pub struct HestonDelta {
  pub engine: HestonFourier,
  pub dividend_yield: f64,
  /// Below this time to maturity the payoff indicator is returned.
  pub min_tau: f64,
}

impl Default for HestonDelta {
  fn default() -> Self {
    Self {
      engine: HestonFourier::default(),
      dividend_yield: 0.0,
      min_tau: 1e-6,
    }
  }
}

impl DeltaFunction for HestonDelta {
  fn delta(
    &self,
    params: &HestonParams,
    underlying: f64,
    strike: f64,
    tau: f64,
    risk_free_rate: f64,
  ) -> f64 {
    if tau <= self.min_tau {
      return if underlying > strike {
        1.0
      } else if underlying < strike {
        0.0
      } else {
        0.5
      };
    }

    let delta = self.engine.call_delta(
      params,
      underlying,
      strike,
      tau,
      risk_free_rate,
      self.dividend_yield,
    );
    if delta.is_finite() {
      delta.clamp(0.0, 1.0)
    } else {
      delta
    }
  }
}
