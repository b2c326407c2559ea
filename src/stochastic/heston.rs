use impl_new_derive::ImplNew;
use ndarray::Array1;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::quant::calibration::HestonParams;
use crate::stochastic::ProcessExt;

/// Heston price and variance paths on a uniform grid.
///
/// Log-Euler for the price, full truncation for the variance: the drift and
/// diffusion see `max(v, 0)`, the stored variance is floored at zero.
#[derive(ImplNew, Clone, Copy, Debug)]
pub struct HestonPaths {
  /// Initial price
  pub s0: f64,
  pub params: HestonParams,
  /// Drift of the price
  pub mu: f64,
  /// Number of grid points, including the initial one
  pub n: usize,
  /// Horizon in years
  pub t: f64,
  pub seed: Option<u64>,
}

impl HestonPaths {
  pub fn dt(&self) -> f64 {
    self.t / (self.n.max(2) - 1) as f64
  }
}

impl ProcessExt for HestonPaths {
  type Output = [Array1<f64>; 2];

  fn sample_with<R: Rng>(&self, rng: &mut R) -> Self::Output {
    let p = &self.params;
    let dt = self.dt();
    let sqrt_dt = dt.sqrt();
    let c = (1.0 - p.rho * p.rho).max(0.0).sqrt();

    let mut s = Array1::<f64>::zeros(self.n);
    let mut v = Array1::<f64>::zeros(self.n);
    if self.n == 0 {
      return [s, v];
    }
    s[0] = self.s0;
    v[0] = p.v0.max(0.0);

    for i in 1..self.n {
      let z1: f64 = rng.sample(StandardNormal);
      let z2: f64 = p.rho * z1 + c * rng.sample::<f64, _>(StandardNormal);
      let v_prev = v[i - 1].max(0.0);

      s[i] = s[i - 1] * ((self.mu - 0.5 * v_prev) * dt + v_prev.sqrt() * sqrt_dt * z1).exp();
      let dv = p.kappa * (p.theta - v_prev) * dt + p.sigma * v_prev.sqrt() * sqrt_dt * z2;
      v[i] = (v[i - 1] + dv).max(0.0);
    }

    [s, v]
  }

  fn seed(&self) -> Option<u64> {
    self.seed
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  fn paths(seed: Option<u64>) -> HestonPaths {
    HestonPaths::new(
      100.0,
      HestonParams::new(0.04, 0.04, 1.5, 0.5, -0.7),
      0.02,
      64,
      0.25,
      seed,
    )
  }

  #[test]
  fn seeded_paths_are_reproducible() {
    let [s1, v1] = paths(Some(7)).sample();
    let [s2, v2] = paths(Some(7)).sample();
    assert_eq!(s1, s2);
    assert_eq!(v1, v2);
  }

  #[test]
  fn parallel_paths_are_distinct_and_ordered() {
    let p = paths(Some(11));
    let batch = p.sample_par(4);
    assert_eq!(batch.len(), 4);
    assert_eq!(batch[0][0], p.sample()[0]);
    assert_ne!(batch[0][0], batch[1][0]);
    assert_eq!(batch, p.sample_par(4));
  }

  #[test]
  fn prices_positive_and_variance_non_negative() {
    for [s, v] in paths(Some(3)).sample_par(16) {
      assert_eq!(s.len(), 64);
      assert!(s.iter().all(|x| *x > 0.0));
      assert!(v.iter().all(|x| *x >= 0.0));
    }
  }

  #[test]
  fn terminal_mean_follows_the_drift() {
    let p = paths(Some(2024));
    let m = 4000;
    let mean = p
      .sample_par(m)
      .iter()
      .map(|[s, _]| s[s.len() - 1])
      .sum::<f64>()
      / m as f64;
    assert_relative_eq!(mean, 100.0 * (0.02f64 * 0.25).exp(), max_relative = 0.01);
  }
}
