//! Calibrates Heston to a synthetic surface, then delta-hedges a sold option
//! along simulated underlying paths.

use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use heston_hedge::calendar::add_months;
use heston_hedge::calendar::business_days;
use heston_hedge::calendar::next_business_day;
use heston_hedge::config::Settings;
use heston_hedge::quant::calibration::heston::HestonCalibrator;
use heston_hedge::quant::calibration::CalibrationProblem;
use heston_hedge::quant::calibration::CalibrationResult;
use heston_hedge::quant::calibration::PARAM_NAMES;
use heston_hedge::quant::hedging::option_premium;
use heston_hedge::quant::hedging::DeltaHedgeSimulator;
use heston_hedge::quant::hedging::HedgeReport;
use heston_hedge::quant::hedging::OptionContract;
use heston_hedge::quant::market::DiscountCurve;
use heston_hedge::quant::market::FlatDiscountCurve;
use heston_hedge::quant::market::FlatForwardCurve;
use heston_hedge::quant::market::ForwardCurve;
use heston_hedge::quant::market::OptionQuote;
use heston_hedge::quant::market::OptionSurface;
use heston_hedge::quant::market::PriceSeries;
use heston_hedge::quant::market::QuoteValue;
use heston_hedge::quant::pricing::bsm::implied_black_vol;
use heston_hedge::quant::pricing::heston::HestonDelta;
use heston_hedge::quant::pricing::heston::HestonFourierPricer;
use heston_hedge::quant::traits::PricingMethod;
use heston_hedge::stochastic::heston::HestonPaths;
use heston_hedge::stochastic::ProcessExt;
use ndarray::Array1;
use prettytable::row;
use prettytable::Table;
use rayon::prelude::*;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "heston-hedge")]
#[command(version, about, long_about = None)]
struct Args {
  /// Configuration file (TOML)
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Number of independent underlying paths to hedge
  #[arg(long)]
  paths: Option<usize>,

  /// Seed of the path simulator
  #[arg(long)]
  seed: Option<u64>,

  /// Log filter used when RUST_LOG is not set
  #[arg(long, default_value = "info")]
  log_level: String,
}

fn init_tracing(log_level: &str) {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();
}

fn main() -> Result<()> {
  let args = Args::parse();
  init_tracing(&args.log_level);

  let mut settings = Settings::load(args.config.as_deref()).context("loading configuration")?;
  if let Some(paths) = args.paths {
    settings.simulation.paths = paths.max(1);
  }
  if args.seed.is_some() {
    settings.simulation.seed = args.seed;
  }

  let market = &settings.market;
  let calendar = market.business_calendar();
  let forward = FlatForwardCurve::new(market.spot, market.risk_free_rate, market.dividend_yield);
  let discount = FlatDiscountCurve::new(market.risk_free_rate);
  let engine = settings.calibration.engine();
  let pricer = HestonFourierPricer::new(&forward, &discount, engine);

  // calibration
  let surface = synthetic_surface(&settings, &pricer, forward, discount);
  let problem = CalibrationProblem::new(
    &surface,
    settings.calibration.initial_guess,
    settings.calibration.bounds,
    settings.calibration.step_sizes,
  );
  let calibration = HestonCalibrator::new(problem, &pricer)
    .with_feller(settings.calibration.enforce_feller)
    .with_max_rmse(settings.calibration.max_rmse)
    .calibrate(&settings.calibration.optimizer)
    .context("calibrating heston parameters")?;
  print_calibration(&settings, &calibration);
  let params = calibration.params;

  // hedged option
  let trade_date = next_business_day(market.reference_date, &calendar);
  let maturity = next_business_day(
    add_months(trade_date, settings.hedging.maturity_months),
    &calendar,
  );
  let tau = market.day_count.year_fraction(trade_date, maturity);
  let strike = settings.hedging.strike_ratio * market.spot;
  let premium = option_premium(
    &pricer,
    &params,
    settings.hedging.option_type,
    strike,
    tau,
    &forward,
    &discount,
  );
  let risk_free_rate = discount.zero_rate(tau);
  let option = OptionContract {
    option_type: settings.hedging.option_type,
    direction: settings.hedging.direction,
    strike,
    trade_date,
    maturity,
    premium,
  };
  info!(%trade_date, %maturity, strike, premium, risk_free_rate, "option priced");

  // hedging
  let dates: Vec<NaiveDate> = business_days(&calendar, trade_date, maturity).collect();
  let simulation = &settings.simulation;
  let paths = HestonPaths::new(
    market.spot,
    simulation.true_params,
    simulation.drift.unwrap_or(risk_free_rate),
    dates.len(),
    tau,
    simulation.seed,
  );
  let series = paths
    .sample_par(simulation.paths)
    .into_iter()
    .map(|[s, _]| PriceSeries::new(dates.iter().copied().zip(s)))
    .collect::<Result<Vec<_>, _>>()?;

  let delta = HestonDelta {
    engine,
    dividend_yield: market.dividend_yield,
    min_tau: settings.hedging.min_tau,
  };
  let simulator = DeltaHedgeSimulator::new(&calendar, &delta, settings.hedging.rebalancing);
  let reports = series
    .par_iter()
    .map(|s| simulator.run(&params, &option, s, risk_free_rate, market.day_count))
    .collect::<Result<Vec<_>, _>>()
    .context("running delta hedge")?;

  print_trade_log(&reports[0]);
  print_summary(&reports);
  Ok(())
}

/// Implied-vol quotes generated from the configured true parameters.
fn synthetic_surface(
  settings: &Settings,
  pricer: &dyn PricingMethod,
  forward: FlatForwardCurve,
  discount: FlatDiscountCurve,
) -> OptionSurface {
  let simulation = &settings.simulation;
  let mut quotes = Vec::new();
  for &tau in &simulation.surface_maturities {
    for &ratio in &simulation.surface_strike_ratios {
      let strike = ratio * settings.market.spot;
      let price = pricer.price(&simulation.true_params, strike, tau);
      let vol = implied_black_vol(
        price,
        forward.value(tau),
        strike,
        tau,
        discount.discount_factor(tau),
      );
      let value = if vol.is_finite() {
        QuoteValue::ImpliedVolatility(vol)
      } else {
        QuoteValue::Price(price)
      };
      quotes.push(OptionQuote::new(tau, strike, value));
    }
  }
  OptionSurface::new(
    settings.market.reference_date,
    Box::new(discount),
    Box::new(forward),
    quotes,
  )
}

fn print_calibration(settings: &Settings, result: &CalibrationResult) {
  let guess = settings.calibration.initial_guess.to_array();
  let fitted = result.params.to_array();
  let truth = settings.simulation.true_params.to_array();

  let mut table = Table::new();
  table.add_row(row!["parameter", "initial", "calibrated", "true"]);
  for i in 0..PARAM_NAMES.len() {
    table.add_row(row![
      PARAM_NAMES[i],
      format!("{:.6}", guess[i]),
      format!("{:.6}", fitted[i]),
      format!("{:.6}", truth[i])
    ]);
  }
  table.printstd();

  let s = &result.loss_scores;
  println!(
    "evaluations: {}  termination: {}  rmse: {:.3e}  mape: {:.4}%  feller: {}",
    result.evaluations,
    result.termination,
    s.rmse,
    s.mape,
    result.params.satisfies_feller()
  );
}

fn print_trade_log(report: &HedgeReport) {
  let mut table = Table::new();
  table.add_row(row![
    "date", "price", "delta", "tau", "holding", "traded", "bank units", "bank traded"
  ]);
  for e in &report.trade_log {
    table.add_row(row![
      e.date,
      format!("{:.2}", e.underlying_price),
      format!("{:.4}", e.delta),
      format!("{:.4}", e.time_to_maturity),
      format!("{:.4}", e.underlying_holding),
      format!("{:+.4}", e.units_traded),
      format!("{:.2}", e.bank_account_holding),
      format!("{:+.2}", e.numeraire_units_traded)
    ]);
  }
  table.printstd();
}

fn print_summary(reports: &[HedgeReport]) {
  let first = &reports[0];
  println!("option:          {} {:?}", first.option.direction, first.option.option_type);
  println!("hedging days:    {}", first.hedging_days());
  println!("S_T:             {:.4}", first.final_underlying);
  println!("strike:          {:.4}", first.option.strike);
  println!("premium:         {:.4}", first.option.premium);
  println!("portfolio value: {:.4}", first.portfolio_value);
  println!("payoff:          {:.4}", first.payoff);
  println!("hedging error:   {:.4}", first.hedging_error);

  if reports.len() > 1 {
    let errors = Array1::from_iter(reports.iter().map(|r| r.hedging_error));
    println!(
      "paths: {}  mean error: {:.4}  std error: {:.4}  relative to premium: {:.2}%",
      errors.len(),
      errors.mean().unwrap_or(f64::NAN),
      errors.std(1.0),
      100.0 * errors.std(1.0) / first.option.premium.abs()
    );
  }
}
