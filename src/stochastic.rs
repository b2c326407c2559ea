//! # Stochastic
//!
//! $$
//! dS_t=\mu S_tdt+\sqrt{v_t}S_tdW^1_t,\qquad
//! dv_t=\kappa(\theta-v_t)dt+\sigma\sqrt{v_t}dW^2_t
//! $$
//!
//! Path simulation used to generate synthetic underlying series. All
//! `sample_par()` methods use `rayon` over independent paths; with a seed,
//! path `i` draws from the stream `seed + i`, so results do not depend on the
//! thread schedule.
//!
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;

pub mod heston;

pub trait ProcessExt: Send + Sync {
  type Output: Send;

  fn sample_with<R: Rng>(&self, rng: &mut R) -> Self::Output;

  /// Base seed; `None` draws from OS entropy.
  fn seed(&self) -> Option<u64> {
    None
  }

  fn sample(&self) -> Self::Output {
    self.sample_with(&mut rng_for(self.seed(), 0))
  }

  fn sample_par(&self, m: usize) -> Vec<Self::Output> {
    (0..m)
      .into_par_iter()
      .map(|i| self.sample_with(&mut rng_for(self.seed(), i as u64)))
      .collect()
  }
}

fn rng_for(seed: Option<u64>, stream: u64) -> StdRng {
  match seed {
    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
    None => StdRng::from_entropy(),
  }
}
