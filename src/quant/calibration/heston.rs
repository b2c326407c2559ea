use nalgebra::DVector;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::CalibrationError;
use crate::quant::calibration::optimizer::LeastSquaresOptimizer;
use crate::quant::calibration::Bound;
use crate::quant::calibration::CalibrationProblem;
use crate::quant::calibration::CalibrationResult;
use crate::quant::calibration::HestonParams;
use crate::quant::calibration::N_PARAMS;
use crate::quant::calibration::PARAM_NAMES;
use crate::quant::pricing::bsm::implied_black_vol;
use crate::quant::traits::PricingMethod;
use crate::quant::CalibrationLossScore;

/// Fits [`HestonParams`] to an [`crate::quant::market::OptionSurface`].
pub struct HestonCalibrator<'a> {
  pub problem: CalibrationProblem<'a>,
  pub pricing: &'a dyn PricingMethod,
  /// Treat trials breaching `2 kappa theta > sigma^2` as infeasible.
  pub enforce_feller: bool,
  /// Converged fits with a larger price RMSE are reported as failures.
  pub max_rmse: Option<f64>,
}

impl<'a> HestonCalibrator<'a> {
  pub fn new(problem: CalibrationProblem<'a>, pricing: &'a dyn PricingMethod) -> Self {
    Self {
      problem,
      pricing,
      enforce_feller: false,
      max_rmse: None,
    }
  }

  pub fn with_feller(mut self, enforce_feller: bool) -> Self {
    self.enforce_feller = enforce_feller;
    self
  }

  pub fn with_max_rmse(mut self, max_rmse: Option<f64>) -> Self {
    self.max_rmse = max_rmse;
    self
  }

  pub fn calibrate(
    &self,
    optimizer: &dyn LeastSquaresOptimizer,
  ) -> Result<CalibrationResult, CalibrationError> {
    self.validate()?;

    let guess = self.problem.initial_guess;
    let market = self.problem.surface.market_prices();
    self
      .residuals(&guess, &market)
      .map_err(|reason| CalibrationError::InfeasibleParameters {
        params: guess,
        reason,
      })?;

    let free = self.free_indices();
    info!(
      quotes = market.len(),
      free = free.len(),
      initial_guess = ?guess,
      "starting heston calibration"
    );

    let bounds: Vec<Bound> = free
      .iter()
      .map(|&i| self.problem.bounds.to_array()[i].bound)
      .collect();
    let steps: Vec<f64> = free.iter().map(|&i| self.problem.step_sizes[i]).collect();
    let start: Vec<f64> = free.iter().map(|&i| guess.to_array()[i]).collect();

    let (params, converged, termination, evaluations) = if free.is_empty() {
      (guess, true, "NoParameters".to_string(), 1)
    } else {
      let residual_fn = |x: &[f64]| {
        let trial = self.assemble(&free, x);
        match self.residuals(&trial, &market) {
          Ok(r) => Some(r),
          Err(reason) => {
            debug!(?trial, %reason, "infeasible trial");
            None
          }
        }
      };
      let outcome = optimizer.minimize(&residual_fn, &start, &bounds, &steps);
      if outcome.rejected_trials > 0 {
        warn!(
          rejected = outcome.rejected_trials,
          "optimizer backed off from infeasible trials"
        );
      }
      (
        self.assemble(&free, &outcome.solution),
        outcome.converged,
        outcome.termination,
        outcome.evaluations,
      )
    };

    let result = self.report(params, &market, converged, termination, evaluations);
    let rmse = result.loss_scores.rmse;

    if !result.converged {
      warn!(termination = %result.termination, rmse, "calibration did not converge");
      return Err(CalibrationError::OptimizationFailure {
        reason: result.termination,
        evaluations: result.evaluations,
        rmse,
        best: result.params,
      });
    }
    if let Some(tolerance) = self.max_rmse {
      if !(rmse <= tolerance) {
        warn!(rmse, tolerance, "calibration residuals above tolerance");
        return Err(CalibrationError::OptimizationFailure {
          reason: format!("rmse {rmse:.3e} exceeds tolerance {tolerance:.3e}"),
          evaluations: result.evaluations,
          rmse,
          best: result.params,
        });
      }
    }

    info!(
      params = ?result.params,
      rmse,
      evaluations = result.evaluations,
      termination = %result.termination,
      "calibration finished"
    );
    Ok(result)
  }

  fn validate(&self) -> Result<(), CalibrationError> {
    let invalid = |msg: String| Err(CalibrationError::InvalidInput(msg));
    let surface = self.problem.surface;

    if surface.is_empty() {
      return invalid("option surface has no quotes".into());
    }
    for (i, quote) in surface.quotes.iter().enumerate() {
      if !(quote.maturity > 0.0 && quote.maturity.is_finite()) {
        return invalid(format!("quote {i}: maturity {} must be positive", quote.maturity));
      }
      if !(quote.strike > 0.0 && quote.strike.is_finite()) {
        return invalid(format!("quote {i}: strike {} must be positive", quote.strike));
      }
      let price = surface.market_price(quote);
      if !price.is_finite() {
        return invalid(format!("quote {i}: market price is not finite"));
      }
    }

    let guess = self.problem.initial_guess.to_array();
    for (i, info) in self.problem.bounds.to_array().iter().enumerate() {
      let name = PARAM_NAMES[i];
      let b = info.bound;
      if !(b.lower.is_finite() && b.upper.is_finite()) || b.lower > b.upper {
        return invalid(format!("{name}: malformed bound [{}, {}]", b.lower, b.upper));
      }
      if info.calibrate && b.lower == b.upper {
        return invalid(format!("{name}: empty interval for a calibrated parameter"));
      }
      if !b.contains(guess[i]) {
        return invalid(format!(
          "{name}: initial guess {} outside [{}, {}]",
          guess[i], b.lower, b.upper
        ));
      }
      let step = self.problem.step_sizes[i];
      if info.calibrate && !(step > 0.0 && step.is_finite()) {
        return invalid(format!("{name}: step size {step} must be positive"));
      }
    }

    Ok(())
  }

  fn free_indices(&self) -> Vec<usize> {
    self
      .problem
      .bounds
      .to_array()
      .iter()
      .enumerate()
      .filter(|(_, info)| info.calibrate)
      .map(|(i, _)| i)
      .collect()
  }

  /// Full parameter set from the free coordinates, fixed ones from the guess.
  fn assemble(&self, free: &[usize], x: &[f64]) -> HestonParams {
    let mut full = self.problem.initial_guess.to_array();
    for (&i, &value) in free.iter().zip(x) {
      full[i] = value;
    }
    HestonParams::from_array(full)
  }

  fn model_prices(&self, params: &HestonParams) -> Vec<f64> {
    self
      .problem
      .surface
      .quotes
      .iter()
      .map(|q| self.pricing.price(params, q.strike, q.maturity))
      .collect()
  }

  /// `model - market`, or why `params` cannot be used.
  fn residuals(&self, params: &HestonParams, market: &[f64]) -> Result<DVector<f64>, String> {
    if self.enforce_feller && !params.satisfies_feller() {
      return Err("feller condition violated".into());
    }
    let model = self.model_prices(params);
    if let Some(i) = model.iter().position(|p| !p.is_finite()) {
      return Err(format!("non-finite model price for quote {i}"));
    }
    Ok(DVector::from_iterator(
      market.len(),
      model.iter().zip(market).map(|(m, c)| m - c),
    ))
  }

  fn report(
    &self,
    params: HestonParams,
    market: &[f64],
    converged: bool,
    termination: String,
    evaluations: usize,
  ) -> CalibrationResult {
    let surface = self.problem.surface;
    let model = self.model_prices(&params);
    let residuals: Vec<f64> = model.iter().zip(market).map(|(m, c)| m - c).collect();
    let model_implied_vols = surface
      .quotes
      .iter()
      .zip(&model)
      .map(|(q, &price)| {
        implied_black_vol(
          price,
          surface.forward.value(q.maturity),
          q.strike,
          q.maturity,
          surface.discount.discount_factor(q.maturity),
        )
      })
      .collect();

    CalibrationResult {
      params,
      converged,
      termination,
      evaluations,
      objective: 0.5 * residuals.iter().map(|r| r * r).sum::<f64>(),
      loss_scores: CalibrationLossScore::from_prices(market, &model),
      market_prices: market.to_vec(),
      model_prices: model,
      residuals,
      model_implied_vols,
    }
  }
}

/// Calibrates with the default settings of [`HestonCalibrator`].
pub fn calibrate(
  problem: CalibrationProblem<'_>,
  pricing: &dyn PricingMethod,
  optimizer: &dyn LeastSquaresOptimizer,
) -> Result<CalibrationResult, CalibrationError> {
  HestonCalibrator::new(problem, pricing).calibrate(optimizer)
}

/// Default finite-difference steps.
pub const DEFAULT_STEP_SIZES: [f64; N_PARAMS] = [0.001; N_PARAMS];
