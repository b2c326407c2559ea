//! # Config
//!
//! Layered settings: `config/default.toml` (optional), then an explicit file,
//! then `HESTON_HEDGE__SECTION__KEY` environment variables. Every key has a
//! default reproducing the 2006 replication exercise.
//!
use std::path::Path;

use chrono::NaiveDate;
use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::calendar::BusinessCalendar;
use crate::calendar::CalendarKind;
use crate::calendar::DayCountConvention;
use crate::calendar::HolidayCalendar;
use crate::error::ConfigError;
use crate::quant::calibration::heston::DEFAULT_STEP_SIZES;
use crate::quant::calibration::optimizer::LevenbergMarquardtOptimizer;
use crate::quant::calibration::HestonParams;
use crate::quant::calibration::ParameterBounds;
use crate::quant::calibration::N_PARAMS;
use crate::quant::hedging::HedgeConfig;
use crate::quant::pricing::heston::FourierMethod;
use crate::quant::pricing::heston::HestonFourier;
use crate::quant::OptionDirection;
use crate::quant::OptionType;

pub const ENV_PREFIX: &str = "HESTON_HEDGE";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
  #[serde(default)]
  pub market: MarketConfig,
  #[serde(default)]
  pub calibration: CalibrationConfig,
  #[serde(default)]
  pub hedging: HedgingConfig,
  #[serde(default)]
  pub simulation: SimulationConfig,
}

impl Settings {
  /// Loads and validates the layered configuration.
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let mut builder =
      Config::builder().add_source(File::with_name("config/default").required(false));
    if let Some(path) = path {
      builder = builder.add_source(File::from(path).required(true));
    }
    let config = builder
      .add_source(
        Environment::with_prefix(ENV_PREFIX)
          .separator("__")
          .try_parsing(true),
      )
      .build()?;

    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

    if !(self.market.spot > 0.0) {
      return invalid("market.spot must be positive");
    }
    if !self.market.risk_free_rate.is_finite() {
      return invalid("market.risk_free_rate must be finite");
    }
    if self
      .calibration
      .step_sizes
      .iter()
      .any(|h| !(*h > 0.0 && h.is_finite()))
    {
      return invalid("calibration.step_sizes must be positive");
    }
    if !(self.calibration.quadrature_tolerance > 0.0) {
      return invalid("calibration.quadrature_tolerance must be positive");
    }
    if self.hedging.maturity_months == 0 {
      return invalid("hedging.maturity_months must be at least 1");
    }
    if !(self.hedging.strike_ratio > 0.0) {
      return invalid("hedging.strike_ratio must be positive");
    }
    if self.simulation.paths == 0 {
      return invalid("simulation.paths must be at least 1");
    }
    if self.simulation.surface_maturities.is_empty()
      || self.simulation.surface_strike_ratios.is_empty()
    {
      return invalid("simulation surface grid must not be empty");
    }
    Ok(())
  }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketConfig {
  /// Calibration date; the trade date is the next business day on or after it.
  pub reference_date: NaiveDate,
  pub spot: f64,
  /// Continuously compounded, flat.
  pub risk_free_rate: f64,
  pub dividend_yield: f64,
  pub calendar: CalendarKind,
  /// Closing days on top of the calendar rules.
  pub extra_holidays: Vec<NaiveDate>,
  pub day_count: DayCountConvention,
}

impl Default for MarketConfig {
  fn default() -> Self {
    Self {
      reference_date: NaiveDate::from_ymd_opt(2006, 1, 2).unwrap_or_default(),
      spot: 5400.0,
      risk_free_rate: 0.025,
      dividend_yield: 0.0,
      calendar: CalendarKind::Target,
      extra_holidays: vec![NaiveDate::from_ymd_opt(2006, 1, 2).unwrap_or_default()],
      day_count: DayCountConvention::Actual365Fixed,
    }
  }
}

impl MarketConfig {
  pub fn business_calendar(&self) -> HolidayCalendar<Box<dyn BusinessCalendar>> {
    HolidayCalendar::new(self.calendar.build(), self.extra_holidays.iter().copied())
  }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationConfig {
  pub initial_guess: HestonParams,
  pub bounds: ParameterBounds,
  pub step_sizes: [f64; N_PARAMS],
  pub optimizer: LevenbergMarquardtOptimizer,
  pub pricing: FourierMethod,
  pub quadrature_tolerance: f64,
  pub enforce_feller: bool,
  pub max_rmse: Option<f64>,
}

impl Default for CalibrationConfig {
  fn default() -> Self {
    Self {
      initial_guess: HestonParams::from_volatility(0.15, 0.04, 1.0, 0.5, -0.5),
      bounds: ParameterBounds::default(),
      step_sizes: DEFAULT_STEP_SIZES,
      optimizer: LevenbergMarquardtOptimizer::default(),
      pricing: FourierMethod::default(),
      quadrature_tolerance: 1e-10,
      enforce_feller: false,
      max_rmse: None,
    }
  }
}

impl CalibrationConfig {
  pub fn engine(&self) -> HestonFourier {
    HestonFourier::new(self.pricing, self.quadrature_tolerance)
  }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HedgingConfig {
  pub option_type: OptionType,
  pub direction: OptionDirection,
  /// Maturity is the trade date plus this many months, rolled forward.
  pub maturity_months: u32,
  /// Strike as a fraction of the trade-date underlying.
  pub strike_ratio: f64,
  /// Below this time to maturity the delta is the payoff indicator.
  pub min_tau: f64,
  pub rebalancing: HedgeConfig,
}

impl Default for HedgingConfig {
  fn default() -> Self {
    Self {
      option_type: OptionType::Call,
      direction: OptionDirection::Sold,
      maturity_months: 2,
      strike_ratio: 0.95,
      min_tau: 1e-6,
      rebalancing: HedgeConfig::default(),
    }
  }
}

/// Synthetic market used by the demo driver.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationConfig {
  /// Parameters generating the quoted surface and the underlying paths.
  pub true_params: HestonParams,
  /// Quote maturities in years.
  pub surface_maturities: Vec<f64>,
  /// Quote strikes as fractions of spot.
  pub surface_strike_ratios: Vec<f64>,
  pub paths: usize,
  pub seed: Option<u64>,
  /// Real-world drift of the underlying; the risk-free rate when absent.
  pub drift: Option<f64>,
}

impl Default for SimulationConfig {
  fn default() -> Self {
    Self {
      true_params: HestonParams::new(0.03, 0.05, 2.0, 0.4, -0.65),
      surface_maturities: vec![1.0 / 12.0, 0.25, 0.5, 1.0],
      surface_strike_ratios: vec![0.8, 0.9, 0.95, 1.0, 1.05, 1.1, 1.2],
      paths: 1,
      seed: Some(42),
      drift: None,
    }
  }
}
