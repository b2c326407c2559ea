//! # Market
//!
//! $$
//! P(0,t)=e^{-r(t)\,t},\qquad F(t)=S_0\,e^{(r-q)t}
//! $$
//!
//! Curves, option quotes and underlying observations consumed by the calibrator
//! and the hedging simulator.
//!
use std::collections::BTreeMap;

use chrono::NaiveDate;
use impl_new_derive::ImplNew;

use crate::error::HedgeError;
use crate::quant::pricing::bsm::black76_call;

/// Discount factors queryable at arbitrary year fractions.
pub trait DiscountCurve: Send + Sync {
  fn discount_factor(&self, t: f64) -> f64;

  /// Continuously compounded zero rate.
  fn zero_rate(&self, t: f64) -> f64 {
    if t <= f64::EPSILON {
      return self.zero_rate(1e-4);
    }
    -self.discount_factor(t).ln() / t
  }
}

/// Forward value of the underlying at arbitrary year fractions.
pub trait ForwardCurve: Send + Sync {
  fn value(&self, t: f64) -> f64;
}

#[derive(ImplNew, Clone, Copy, Debug)]
pub struct FlatDiscountCurve {
  /// Continuously compounded rate.
  pub rate: f64,
}

impl DiscountCurve for FlatDiscountCurve {
  fn discount_factor(&self, t: f64) -> f64 {
    (-self.rate * t).exp()
  }

  fn zero_rate(&self, _t: f64) -> f64 {
    self.rate
  }
}

/// Zero rates linearly interpolated between pillars, flat outside.
#[derive(Clone, Debug)]
pub struct InterpolatedDiscountCurve {
  times: Vec<f64>,
  rates: Vec<f64>,
}

impl InterpolatedDiscountCurve {
  /// Pillars must be non-empty and strictly increasing in time.
  pub fn new(pillars: Vec<(f64, f64)>) -> Option<Self> {
    if pillars.is_empty() || pillars.windows(2).any(|w| w[1].0 <= w[0].0) {
      return None;
    }
    let (times, rates) = pillars.into_iter().unzip();
    Some(Self { times, rates })
  }
}

impl DiscountCurve for InterpolatedDiscountCurve {
  fn discount_factor(&self, t: f64) -> f64 {
    (-self.zero_rate(t) * t).exp()
  }

  fn zero_rate(&self, t: f64) -> f64 {
    let n = self.times.len();
    if t <= self.times[0] {
      return self.rates[0];
    }
    if t >= self.times[n - 1] {
      return self.rates[n - 1];
    }
    let i = self.times.partition_point(|x| *x <= t);
    let (t0, t1) = (self.times[i - 1], self.times[i]);
    let w = (t - t0) / (t1 - t0);
    self.rates[i - 1] * (1.0 - w) + self.rates[i] * w
  }
}

/// Spot carried forward at a constant cost of carry.
#[derive(ImplNew, Clone, Copy, Debug)]
pub struct FlatForwardCurve {
  pub spot: f64,
  pub rate: f64,
  pub dividend_yield: f64,
}

impl ForwardCurve for FlatForwardCurve {
  fn value(&self, t: f64) -> f64 {
    self.spot * ((self.rate - self.dividend_yield) * t).exp()
  }
}

/// How a surface point is quoted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum QuoteValue {
  /// Discounted call price.
  Price(f64),
  /// Black implied volatility on the forward.
  ImpliedVolatility(f64),
}

#[derive(ImplNew, Clone, Copy, Debug, PartialEq)]
pub struct OptionQuote {
  /// Year fraction from the reference date.
  pub maturity: f64,
  pub strike: f64,
  pub value: QuoteValue,
}

/// Observed call surface for one reference date.
pub struct OptionSurface {
  pub reference_date: NaiveDate,
  pub discount: Box<dyn DiscountCurve>,
  pub forward: Box<dyn ForwardCurve>,
  pub quotes: Vec<OptionQuote>,
}

impl OptionSurface {
  pub fn new(
    reference_date: NaiveDate,
    discount: Box<dyn DiscountCurve>,
    forward: Box<dyn ForwardCurve>,
    quotes: Vec<OptionQuote>,
  ) -> Self {
    Self {
      reference_date,
      discount,
      forward,
      quotes,
    }
  }

  /// Underlying value at the reference date.
  pub fn spot(&self) -> f64 {
    self.forward.value(0.0)
  }

  /// Market price of a quote; implied vols go through Black-76 on the forward.
  pub fn market_price(&self, quote: &OptionQuote) -> f64 {
    match quote.value {
      QuoteValue::Price(p) => p,
      QuoteValue::ImpliedVolatility(vol) => black76_call(
        self.forward.value(quote.maturity),
        quote.strike,
        vol,
        quote.maturity,
        self.discount.discount_factor(quote.maturity),
      ),
    }
  }

  pub fn market_prices(&self) -> Vec<f64> {
    self.quotes.iter().map(|q| self.market_price(q)).collect()
  }

  pub fn is_empty(&self) -> bool {
    self.quotes.is_empty()
  }

  pub fn len(&self) -> usize {
    self.quotes.len()
  }
}

/// Underlying forward prices by date, strictly increasing in date.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriceSeries {
  prices: BTreeMap<NaiveDate, f64>,
}

impl PriceSeries {
  /// Builds the series, rejecting out-of-order or repeated dates.
  pub fn new<I>(observations: I) -> Result<Self, HedgeError>
  where
    I: IntoIterator<Item = (NaiveDate, f64)>,
  {
    let mut prices = BTreeMap::new();
    let mut previous: Option<NaiveDate> = None;

    for (date, price) in observations {
      if let Some(prev) = previous {
        if date <= prev {
          return Err(HedgeError::NonIncreasingDates {
            previous: prev,
            current: date,
          });
        }
      }
      prices.insert(date, price);
      previous = Some(date);
    }

    Ok(Self { prices })
  }

  pub fn get(&self, date: NaiveDate) -> Option<f64> {
    self.prices.get(&date).copied()
  }

  pub fn first_date(&self) -> Option<NaiveDate> {
    self.prices.keys().next().copied()
  }

  pub fn last_date(&self) -> Option<NaiveDate> {
    self.prices.keys().next_back().copied()
  }

  pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
    self.prices.iter().map(|(d, p)| (*d, *p))
  }

  pub fn len(&self) -> usize {
    self.prices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.prices.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn flat_curve_zero_rate_roundtrip() {
    let curve = FlatDiscountCurve::new(0.03);
    assert_abs_diff_eq!(curve.discount_factor(2.0), (-0.06f64).exp(), epsilon = 1e-15);
    assert_abs_diff_eq!(curve.zero_rate(0.5), 0.03);
  }

  #[test]
  fn interpolated_curve_is_linear_in_zero_rates() {
    let curve = InterpolatedDiscountCurve::new(vec![(0.5, 0.02), (1.0, 0.03)]).unwrap();
    assert_abs_diff_eq!(curve.zero_rate(0.75), 0.025, epsilon = 1e-15);
    assert_abs_diff_eq!(curve.zero_rate(0.1), 0.02);
    assert_abs_diff_eq!(curve.zero_rate(5.0), 0.03);
    assert_abs_diff_eq!(curve.discount_factor(0.75), (-0.025f64 * 0.75).exp(), epsilon = 1e-15);
  }

  #[test]
  fn interpolated_curve_rejects_unsorted_pillars() {
    assert!(InterpolatedDiscountCurve::new(vec![(1.0, 0.02), (0.5, 0.03)]).is_none());
    assert!(InterpolatedDiscountCurve::new(vec![]).is_none());
  }

  #[test]
  fn vol_quote_is_priced_with_black() {
    let surface = OptionSurface::new(
      date(2006, 1, 3),
      Box::new(FlatDiscountCurve::new(0.0)),
      Box::new(FlatForwardCurve::new(100.0, 0.0, 0.0)),
      vec![OptionQuote::new(1.0, 100.0, QuoteValue::ImpliedVolatility(0.2))],
    );
    // ATM Black price: F (2N(sigma/2) - 1)
    assert_abs_diff_eq!(surface.market_prices()[0], 7.965567455405804, epsilon = 1e-9);
  }

  #[test]
  fn price_series_rejects_unordered_dates() {
    let err = PriceSeries::new(vec![(date(2006, 1, 4), 1.0), (date(2006, 1, 3), 1.0)]).unwrap_err();
    assert_eq!(
      err,
      HedgeError::NonIncreasingDates {
        previous: date(2006, 1, 4),
        current: date(2006, 1, 3)
      }
    );
  }

  #[test]
  fn price_series_lookup() {
    let s = PriceSeries::new(vec![(date(2006, 1, 3), 10.0), (date(2006, 1, 4), 11.0)]).unwrap();
    assert_eq!(s.get(date(2006, 1, 4)), Some(11.0));
    assert_eq!(s.get(date(2006, 1, 5)), None);
    assert_eq!(s.first_date(), Some(date(2006, 1, 3)));
    assert_eq!(s.last_date(), Some(date(2006, 1, 4)));
  }
}
