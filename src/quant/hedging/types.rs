use chrono::NaiveDate;
use serde::Deserialize;

use crate::quant::OptionDirection;
use crate::quant::OptionType;

/// The hedged liability.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OptionContract {
  pub option_type: OptionType,
  pub direction: OptionDirection,
  pub strike: f64,
  pub trade_date: NaiveDate,
  pub maturity: NaiveDate,
  /// Amount received (sold) or paid (bought) at trade date.
  pub premium: f64,
}

impl OptionContract {
  /// A sold call, the position of the classic replication exercise.
  pub fn sold_call(strike: f64, trade_date: NaiveDate, maturity: NaiveDate, premium: f64) -> Self {
    Self {
      option_type: OptionType::Call,
      direction: OptionDirection::Sold,
      strike,
      trade_date,
      maturity,
      premium,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulationPhase {
  Initialized,
  Stepping,
  Matured,
}

/// Portfolio carried from one rebalancing date to the next.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HedgeState {
  pub bank_account_units: f64,
  pub bank_account_value: f64,
  pub underlying_units: f64,
  pub previous_date: NaiveDate,
  pub phase: SimulationPhase,
}

impl HedgeState {
  /// Premium deposited in a bank account worth 1 at `trade_date`.
  pub fn initial(premium: f64, direction: OptionDirection, trade_date: NaiveDate) -> Self {
    Self {
      bank_account_units: direction.sign() * premium,
      bank_account_value: 1.0,
      underlying_units: 0.0,
      previous_date: trade_date,
      phase: SimulationPhase::Initialized,
    }
  }

  pub fn portfolio_value(&self, underlying: f64) -> f64 {
    self.bank_account_units * self.bank_account_value + self.underlying_units * underlying
  }
}

/// One rebalancing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TradeLogEntry {
  pub date: NaiveDate,
  pub underlying_price: f64,
  pub bank_account_value: f64,
  /// Option delta (put deltas are negative).
  pub delta: f64,
  pub time_to_maturity: f64,
  /// Underlying units held after rebalancing.
  pub underlying_holding: f64,
  pub units_traded: f64,
  /// Bank account units held after rebalancing.
  pub bank_account_holding: f64,
  pub numeraire_units_traded: f64,
}

/// Outcome of a completed hedge.
#[derive(Clone, Debug, PartialEq)]
pub struct HedgeReport {
  pub option: OptionContract,
  pub trade_log: Vec<TradeLogEntry>,
  pub final_state: HedgeState,
  pub final_underlying: f64,
  pub portfolio_value: f64,
  pub payoff: f64,
  /// `portfolio - payoff` for a sold option, `portfolio + payoff` for a bought one.
  pub hedging_error: f64,
}

impl HedgeReport {
  pub fn hedging_days(&self) -> usize {
    self.trade_log.len()
  }
}

/// How underlying and strike are passed to the delta function.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MoneynessConvention {
  /// Underlying fixed at `spot_scale`, strike rescaled to `K / S * spot_scale`.
  Scaled { spot_scale: f64 },
  /// Observed underlying and strike as they are.
  Absolute,
}

impl Default for MoneynessConvention {
  fn default() -> Self {
    MoneynessConvention::Scaled { spot_scale: 100.0 }
  }
}

impl MoneynessConvention {
  /// `(underlying, strike)` handed to the delta function.
  pub fn arguments(&self, underlying: f64, strike: f64) -> (f64, f64) {
    match *self {
      MoneynessConvention::Scaled { spot_scale } => (spot_scale, strike / underlying * spot_scale),
      MoneynessConvention::Absolute => (underlying, strike),
    }
  }
}

/// Runtime configuration for [`super::DeltaHedgeSimulator`].
#[derive(Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct HedgeConfig {
  pub moneyness: MoneynessConvention,
  /// Also rebalance on the trade date itself, with zero elapsed time. On by
  /// default, which departs from a schedule of business days strictly after
  /// the trade date; set to `false` for that schedule.
  pub rebalance_at_trade_date: bool,
}

impl Default for HedgeConfig {
  fn default() -> Self {
    Self {
      moneyness: MoneynessConvention::default(),
      rebalance_at_trade_date: true,
    }
  }
}
