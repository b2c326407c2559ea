//! # Delta hedge engine
//!
//! $$
//! \varepsilon=\beta_T B_T+\Delta_{T^-}S_T-\Pi(S_T)
//! $$
//!
use chrono::NaiveDate;
use tracing::debug;
use tracing::info;

use super::types::HedgeConfig;
use super::types::HedgeReport;
use super::types::HedgeState;
use super::types::OptionContract;
use super::types::SimulationPhase;
use super::types::TradeLogEntry;
use crate::calendar::business_days;
use crate::calendar::BusinessCalendar;
use crate::calendar::DayCountConvention;
use crate::error::HedgeError;
use crate::quant::calibration::HestonParams;
use crate::quant::market::PriceSeries;
use crate::quant::traits::DeltaFunction;
use crate::quant::OptionType;

/// Replays a self-financing delta hedge over observed prices.
pub struct DeltaHedgeSimulator<'a> {
  calendar: &'a dyn BusinessCalendar,
  delta: &'a dyn DeltaFunction,
  config: HedgeConfig,
}

impl<'a> DeltaHedgeSimulator<'a> {
  pub fn new(
    calendar: &'a dyn BusinessCalendar,
    delta: &'a dyn DeltaFunction,
    config: HedgeConfig,
  ) -> Self {
    Self {
      calendar,
      delta,
      config,
    }
  }

  pub fn config(&self) -> &HedgeConfig {
    &self.config
  }

  /// Hedges `option` from trade date to maturity.
  ///
  /// One rebalancing per business day strictly between trade date and
  /// maturity, preceded by a zero-length step on the trade date when
  /// [`HedgeConfig::rebalance_at_trade_date`] is set. Observations before the
  /// trade date are ignored. Every business day in `[trade_date, maturity]`
  /// must be observed with a positive price.
  pub fn run(
    &self,
    params: &HestonParams,
    option: &OptionContract,
    observations: &PriceSeries,
    risk_free_rate: f64,
    day_count: DayCountConvention,
  ) -> Result<HedgeReport, HedgeError> {
    validate(params, option, risk_free_rate)?;
    let step_dates = self.step_dates(option);
    self.check_coverage(option, observations)?;

    let mut state = HedgeState::initial(option.premium, option.direction, option.trade_date);
    let mut trade_log = Vec::with_capacity(step_dates.len());

    for date in step_dates {
      let price = observed(observations, date)?;
      let entry = self.rebalance(
        &mut state,
        params,
        option,
        date,
        price,
        risk_free_rate,
        day_count,
      )?;
      trade_log.push(entry);
    }

    let final_underlying = observed(observations, option.maturity)?;
    let (portfolio_value, payoff, hedging_error) =
      settle(&mut state, option, final_underlying, risk_free_rate, day_count);

    info!(
      hedging_days = trade_log.len(),
      final_underlying,
      strike = option.strike,
      portfolio_value,
      payoff,
      hedging_error,
      "hedge finished"
    );

    Ok(HedgeReport {
      option: *option,
      trade_log,
      final_state: state,
      final_underlying,
      portfolio_value,
      payoff,
      hedging_error,
    })
  }

  fn step_dates(&self, option: &OptionContract) -> Vec<NaiveDate> {
    let trade = option.trade_date;
    let first = self.config.rebalance_at_trade_date.then_some(trade);
    first
      .into_iter()
      .chain(
        business_days(self.calendar, trade, option.maturity)
          .filter(|d| *d > trade && *d < option.maturity),
      )
      .collect()
  }

  fn check_coverage(
    &self,
    option: &OptionContract,
    observations: &PriceSeries,
  ) -> Result<(), HedgeError> {
    let required = business_days(self.calendar, option.trade_date, option.maturity)
      .chain([option.trade_date, option.maturity]);
    for date in required {
      observed(observations, date)?;
    }
    Ok(())
  }

  #[allow(clippy::too_many_arguments)]
  fn rebalance(
    &self,
    state: &mut HedgeState,
    params: &HestonParams,
    option: &OptionContract,
    date: NaiveDate,
    price: f64,
    risk_free_rate: f64,
    day_count: DayCountConvention,
  ) -> Result<TradeLogEntry, HedgeError> {
    let dt = day_count.year_fraction(state.previous_date, date);
    state.bank_account_value *= (risk_free_rate * dt).exp();

    let tau = day_count.year_fraction(date, option.maturity);
    let (underlying, strike) = self.config.moneyness.arguments(price, option.strike);
    let call_delta = self
      .delta
      .delta(params, underlying, strike, tau, risk_free_rate);
    if !call_delta.is_finite() {
      return Err(HedgeError::InvalidInput(format!(
        "delta is not finite on {date}"
      )));
    }
    let delta = match option.option_type {
      OptionType::Call => call_delta,
      OptionType::Put => call_delta - 1.0,
    };

    let target = option.direction.sign() * delta;
    let traded = target - state.underlying_units;
    let funding = traded * price / state.bank_account_value;
    state.bank_account_units -= funding;
    state.underlying_units = target;
    state.previous_date = date;
    state.phase = SimulationPhase::Stepping;

    debug!(
      %date,
      price,
      delta,
      holding = target,
      traded,
      bank_units = state.bank_account_units,
      bank_units_traded = -funding,
      "rebalanced"
    );

    Ok(TradeLogEntry {
      date,
      underlying_price: price,
      bank_account_value: state.bank_account_value,
      delta,
      time_to_maturity: tau,
      underlying_holding: target,
      units_traded: traded,
      bank_account_holding: state.bank_account_units,
      numeraire_units_traded: -funding,
    })
  }
}

fn validate(
  params: &HestonParams,
  option: &OptionContract,
  risk_free_rate: f64,
) -> Result<(), HedgeError> {
  let invalid = |msg: String| Err(HedgeError::InvalidInput(msg));

  if option.maturity <= option.trade_date {
    return invalid(format!(
      "maturity {} must be after trade date {}",
      option.maturity, option.trade_date
    ));
  }
  if !(option.strike > 0.0 && option.strike.is_finite()) {
    return invalid(format!("strike {} must be positive", option.strike));
  }
  if !option.premium.is_finite() {
    return invalid("premium is not finite".into());
  }
  if !risk_free_rate.is_finite() {
    return invalid("risk-free rate is not finite".into());
  }
  if !params.is_priceable() {
    return invalid(format!("parameters {params:?} cannot be priced"));
  }
  Ok(())
}

fn observed(observations: &PriceSeries, date: NaiveDate) -> Result<f64, HedgeError> {
  match observations.get(date) {
    None => Err(HedgeError::DataGap { date }),
    Some(price) if !(price > 0.0 && price.is_finite()) => {
      Err(HedgeError::NonPositiveUnderlying { date, price })
    }
    Some(price) => Ok(price),
  }
}

/// Accrues to maturity and returns `(portfolio, payoff, hedging error)`.
fn settle(
  state: &mut HedgeState,
  option: &OptionContract,
  final_underlying: f64,
  risk_free_rate: f64,
  day_count: DayCountConvention,
) -> (f64, f64, f64) {
  let dt = day_count.year_fraction(state.previous_date, option.maturity);
  state.bank_account_value *= (risk_free_rate * dt).exp();
  state.previous_date = option.maturity;
  state.phase = SimulationPhase::Matured;

  let portfolio = state.portfolio_value(final_underlying);
  let payoff = option.option_type.payoff(final_underlying, option.strike);
  let error = portfolio - option.direction.sign() * payoff;
  (portfolio, payoff, error)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use approx::assert_relative_eq;
  use tracing_test::traced_test;

  use super::*;
  use crate::calendar::add_months;
  use crate::calendar::next_business_day;
  use crate::calendar::HolidayCalendar;
  use crate::calendar::TargetCalendar;
  use crate::calendar::WeekendCalendar;
  use crate::quant::hedging::MoneynessConvention;
  use crate::quant::pricing::heston::HestonDelta;
  use crate::quant::OptionDirection;

  struct ConstantDelta(f64);

  impl DeltaFunction for ConstantDelta {
    fn delta(&self, _: &HestonParams, _: f64, _: f64, _: f64, _: f64) -> f64 {
      self.0
    }
  }

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn params() -> HestonParams {
    HestonParams::new(0.04, 0.04, 1.5, 0.3, -0.5)
  }

  fn scenario_calendar() -> HolidayCalendar<TargetCalendar> {
    HolidayCalendar::new(TargetCalendar, [date(2006, 1, 2)])
  }

  /// Trade date, maturity and a wiggly path observed on every business day.
  fn scenario() -> (NaiveDate, NaiveDate, PriceSeries) {
    let calendar = scenario_calendar();
    let trade = next_business_day(date(2006, 1, 2), &calendar);
    let maturity = next_business_day(add_months(trade, 2), &calendar);
    let prices = business_days(&calendar, date(2005, 12, 1), date(2006, 3, 31))
      .enumerate()
      .map(|(i, d)| (d, 5400.0 * (1.0 + 0.02 * (i as f64 * 0.7).sin())));
    (trade, maturity, PriceSeries::new(prices).unwrap())
  }

  fn constant_path(from: NaiveDate, to: NaiveDate, price: f64) -> PriceSeries {
    PriceSeries::new(business_days(&WeekendCalendar, from, to).map(|d| (d, price))).unwrap()
  }

  #[test]
  #[traced_test]
  fn end_to_end_scenario() {
    let calendar = scenario_calendar();
    let (trade, maturity, series) = scenario();
    assert_eq!(trade, date(2006, 1, 3));
    assert_eq!(maturity, date(2006, 3, 3));

    let spot = series.get(trade).unwrap();
    let option = OptionContract::sold_call(0.95 * spot, trade, maturity, 350.0);
    let delta = HestonDelta::default();
    let simulator = DeltaHedgeSimulator::new(&calendar, &delta, HedgeConfig::default());
    let r = 0.025;
    let report = simulator
      .run(&params(), &option, &series, r, DayCountConvention::Actual365Fixed)
      .unwrap();

    let expected_days = business_days(&calendar, trade, maturity)
      .filter(|d| *d < maturity)
      .count();
    assert_eq!(expected_days, 43);
    assert_eq!(report.hedging_days(), expected_days);
    assert_eq!(report.trade_log[0].date, trade);
    assert_eq!(report.trade_log[0].bank_account_value, 1.0);
    assert!(report
      .trade_log
      .windows(2)
      .all(|w| w[1].bank_account_value > w[0].bank_account_value && w[1].date > w[0].date));
    assert!(report.trade_log.iter().all(|e| e.delta >= 0.0 && e.delta <= 1.0));

    let last = report.trade_log.last().unwrap();
    let bank_t = last.bank_account_value
      * (r * DayCountConvention::Actual365Fixed.year_fraction(last.date, maturity)).exp();
    let s_t = series.get(maturity).unwrap();
    let expected = last.bank_account_holding * bank_t + last.underlying_holding * s_t
      - (s_t - option.strike).max(0.0);
    assert_relative_eq!(report.hedging_error, expected, max_relative = 1e-12);
    assert_eq!(report.final_state.phase, SimulationPhase::Matured);
    assert!(logs_contain("hedge finished"));
  }

  #[test]
  fn rebalancing_is_self_financing() {
    let calendar = scenario_calendar();
    let (trade, maturity, series) = scenario();
    let spot = series.get(trade).unwrap();
    let option = OptionContract::sold_call(0.95 * spot, trade, maturity, 350.0);
    let delta = HestonDelta::default();
    let simulator = DeltaHedgeSimulator::new(&calendar, &delta, HedgeConfig::default());
    let report = simulator
      .run(&params(), &option, &series, 0.03, DayCountConvention::Actual365Fixed)
      .unwrap();

    let (mut units, mut held) = (option.premium, 0.0);
    for e in &report.trade_log {
      let before = units * e.bank_account_value + held * e.underlying_price;
      let after = e.bank_account_holding * e.bank_account_value
        + e.underlying_holding * e.underlying_price;
      assert_relative_eq!(before, after, max_relative = 1e-12);
      assert_abs_diff_eq!(e.underlying_holding - held, e.units_traded, epsilon = 1e-12);
      units = e.bank_account_holding;
      held = e.underlying_holding;
    }
  }

  #[test]
  fn constant_path_at_strike_without_rates_returns_the_premium() {
    let (trade, maturity) = (date(2006, 1, 3), date(2006, 3, 3));
    let series = constant_path(trade, maturity, 100.0);
    let option = OptionContract::sold_call(100.0, trade, maturity, 2.5);
    let delta = HestonDelta::default();
    let simulator = DeltaHedgeSimulator::new(&WeekendCalendar, &delta, HedgeConfig::default());
    let report = simulator
      .run(&params(), &option, &series, 0.0, DayCountConvention::Actual365Fixed)
      .unwrap();

    assert_eq!(report.payoff, 0.0);
    assert_abs_diff_eq!(report.hedging_error, 2.5, epsilon = 1e-12);
  }

  #[test]
  fn unhedged_premium_grows_at_the_risk_free_rate() {
    let (trade, maturity) = (date(2006, 1, 3), date(2006, 3, 3));
    let series = constant_path(trade, maturity, 100.0);
    let option = OptionContract::sold_call(100.0, trade, maturity, 2.5);
    let delta = ConstantDelta(0.0);
    let simulator = DeltaHedgeSimulator::new(&WeekendCalendar, &delta, HedgeConfig::default());
    let r = 0.05;
    let report = simulator
      .run(&params(), &option, &series, r, DayCountConvention::Actual365Fixed)
      .unwrap();

    let t = DayCountConvention::Actual365Fixed.year_fraction(trade, maturity);
    assert_relative_eq!(report.hedging_error, 2.5 * (r * t).exp(), max_relative = 1e-12);
  }

  #[test]
  fn constant_path_with_rates_matches_trade_log() {
    let (trade, maturity) = (date(2006, 1, 3), date(2006, 3, 3));
    let series = constant_path(trade, maturity, 100.0);
    let option = OptionContract::sold_call(100.0, trade, maturity, 2.5);
    let delta = HestonDelta::default();
    let simulator = DeltaHedgeSimulator::new(&WeekendCalendar, &delta, HedgeConfig::default());
    let r = 0.04;
    let report = simulator
      .run(&params(), &option, &series, r, DayCountConvention::Actual365Fixed)
      .unwrap();

    // sum over steps of premium carry minus the financing cost of each trade
    let t_end = |d: NaiveDate| DayCountConvention::Actual365Fixed.year_fraction(d, maturity);
    let mut expected = 2.5 * (r * t_end(trade)).exp();
    for e in &report.trade_log {
      expected -= e.units_traded * 100.0 * (r * t_end(e.date)).exp();
    }
    expected += report.trade_log.last().unwrap().underlying_holding * 100.0;
    assert_relative_eq!(report.hedging_error, expected, max_relative = 1e-10);
  }

  #[test]
  fn runs_are_idempotent() {
    let calendar = scenario_calendar();
    let (trade, maturity, series) = scenario();
    let option = OptionContract::sold_call(5130.0, trade, maturity, 350.0);
    let delta = HestonDelta::default();
    let simulator = DeltaHedgeSimulator::new(&calendar, &delta, HedgeConfig::default());
    let run = || {
      simulator
        .run(&params(), &option, &series, 0.025, DayCountConvention::Actual365Fixed)
        .unwrap()
    };
    assert_eq!(run(), run());
  }

  #[test]
  fn missing_business_day_is_a_data_gap() {
    let calendar = scenario_calendar();
    let (trade, maturity, series) = scenario();
    let gap = date(2006, 2, 15);
    let series = PriceSeries::new(series.iter().filter(|(d, _)| *d != gap)).unwrap();
    let option = OptionContract::sold_call(5130.0, trade, maturity, 350.0);
    let delta = ConstantDelta(0.5);
    let simulator = DeltaHedgeSimulator::new(&calendar, &delta, HedgeConfig::default());

    let err = simulator
      .run(&params(), &option, &series, 0.025, DayCountConvention::Actual365Fixed)
      .unwrap_err();
    assert_eq!(err, HedgeError::DataGap { date: gap });
  }

  #[test]
  fn missing_maturity_is_a_data_gap() {
    let calendar = scenario_calendar();
    let (trade, maturity, series) = scenario();
    let series = PriceSeries::new(series.iter().filter(|(d, _)| *d != maturity)).unwrap();
    let option = OptionContract::sold_call(5130.0, trade, maturity, 350.0);
    let delta = ConstantDelta(0.5);
    let simulator = DeltaHedgeSimulator::new(&calendar, &delta, HedgeConfig::default());

    let err = simulator
      .run(&params(), &option, &series, 0.025, DayCountConvention::Actual365Fixed)
      .unwrap_err();
    assert_eq!(err, HedgeError::DataGap { date: maturity });
  }

  #[test]
  fn non_positive_price_is_rejected() {
    let calendar = scenario_calendar();
    let (trade, maturity, series) = scenario();
    let bad = date(2006, 1, 20);
    let series = PriceSeries::new(
      series
        .iter()
        .map(|(d, p)| if d == bad { (d, 0.0) } else { (d, p) }),
    )
    .unwrap();
    let option = OptionContract::sold_call(5130.0, trade, maturity, 350.0);
    let delta = ConstantDelta(0.5);
    let simulator = DeltaHedgeSimulator::new(&calendar, &delta, HedgeConfig::default());

    let err = simulator
      .run(&params(), &option, &series, 0.025, DayCountConvention::Actual365Fixed)
      .unwrap_err();
    assert_eq!(err, HedgeError::NonPositiveUnderlying { date: bad, price: 0.0 });
  }

  #[test]
  fn observations_before_trade_date_are_ignored() {
    let calendar = scenario_calendar();
    let (trade, maturity, series) = scenario();
    let trimmed = PriceSeries::new(series.iter().filter(|(d, _)| *d >= trade)).unwrap();
    let garbage = PriceSeries::new(
      series
        .iter()
        .map(|(d, p)| if d < trade { (d, -1.0) } else { (d, p) }),
    )
    .unwrap();
    let option = OptionContract::sold_call(5130.0, trade, maturity, 350.0);
    let delta = HestonDelta::default();
    let simulator = DeltaHedgeSimulator::new(&calendar, &delta, HedgeConfig::default());
    let run = |s: &PriceSeries| {
      simulator
        .run(&params(), &option, s, 0.025, DayCountConvention::Actual365Fixed)
        .unwrap()
    };

    assert_eq!(run(&trimmed), run(&garbage));
  }

  #[test]
  fn maturity_before_trade_date_is_invalid() {
    let (_, _, series) = scenario();
    let option = OptionContract::sold_call(5130.0, date(2006, 3, 3), date(2006, 1, 3), 350.0);
    let delta = ConstantDelta(0.5);
    let simulator = DeltaHedgeSimulator::new(&WeekendCalendar, &delta, HedgeConfig::default());

    let err = simulator
      .run(&params(), &option, &series, 0.025, DayCountConvention::Actual365Fixed)
      .unwrap_err();
    assert!(matches!(err, HedgeError::InvalidInput(_)));
  }

  #[test]
  fn skipping_the_trade_date_step_drops_one_entry() {
    let calendar = scenario_calendar();
    let (trade, maturity, series) = scenario();
    let option = OptionContract::sold_call(5130.0, trade, maturity, 350.0);
    let delta = ConstantDelta(0.5);
    let config = HedgeConfig {
      rebalance_at_trade_date: false,
      ..HedgeConfig::default()
    };
    let report = DeltaHedgeSimulator::new(&calendar, &delta, config)
      .run(&params(), &option, &series, 0.025, DayCountConvention::Actual365Fixed)
      .unwrap();

    assert_eq!(report.hedging_days(), 42);
    assert!(report.trade_log[0].date > trade);
    assert!(report.trade_log[0].bank_account_value > 1.0);
  }

  #[test]
  fn bought_option_mirrors_sold_option() {
    let calendar = scenario_calendar();
    let (trade, maturity, series) = scenario();
    let sold = OptionContract::sold_call(5130.0, trade, maturity, 350.0);
    let bought = OptionContract {
      direction: OptionDirection::Bought,
      ..sold
    };
    let delta = HestonDelta::default();
    let simulator = DeltaHedgeSimulator::new(&calendar, &delta, HedgeConfig::default());
    let run = |o: &OptionContract| {
      simulator
        .run(&params(), o, &series, 0.025, DayCountConvention::Actual365Fixed)
        .unwrap()
    };

    let (a, b) = (run(&sold), run(&bought));
    assert_relative_eq!(a.hedging_error, -b.hedging_error, max_relative = 1e-12);
    assert_eq!(a.trade_log[5].underlying_holding, -b.trade_log[5].underlying_holding);
  }

  #[test]
  fn put_holding_is_call_holding_minus_one() {
    let calendar = scenario_calendar();
    let (trade, maturity, series) = scenario();
    let call = OptionContract::sold_call(5130.0, trade, maturity, 350.0);
    let put = OptionContract {
      option_type: OptionType::Put,
      premium: 50.0,
      ..call
    };
    let delta = HestonDelta::default();
    let simulator = DeltaHedgeSimulator::new(&calendar, &delta, HedgeConfig::default());
    let run = |o: &OptionContract| {
      simulator
        .run(&params(), o, &series, 0.025, DayCountConvention::Actual365Fixed)
        .unwrap()
    };

    let (c, p) = (run(&call), run(&put));
    for (ce, pe) in c.trade_log.iter().zip(&p.trade_log) {
      assert_abs_diff_eq!(pe.underlying_holding, ce.underlying_holding - 1.0, epsilon = 1e-12);
      assert!(pe.delta <= 0.0);
    }
    let s_t = series.get(maturity).unwrap();
    assert_eq!(p.payoff, (5130.0 - s_t).max(0.0));
  }

  #[test]
  fn moneyness_conventions_agree() {
    let calendar = scenario_calendar();
    let (trade, maturity, series) = scenario();
    let option = OptionContract::sold_call(5130.0, trade, maturity, 350.0);
    let delta = HestonDelta::default();
    let run = |moneyness: MoneynessConvention| {
      let config = HedgeConfig {
        moneyness,
        ..HedgeConfig::default()
      };
      DeltaHedgeSimulator::new(&calendar, &delta, config)
        .run(&params(), &option, &series, 0.025, DayCountConvention::Actual365Fixed)
        .unwrap()
    };

    let scaled = run(MoneynessConvention::default());
    let absolute = run(MoneynessConvention::Absolute);
    for (a, b) in scaled.trade_log.iter().zip(&absolute.trade_log) {
      assert_abs_diff_eq!(a.delta, b.delta, epsilon = 1e-7);
    }
    assert_abs_diff_eq!(scaled.hedging_error, absolute.hedging_error, epsilon = 1e-3);
  }
}
