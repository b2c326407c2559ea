//! # heston-hedge
//!
//! $$
//! \hat\Theta\;\longrightarrow\;\Delta_t=\frac{\partial C(S_t,\tau;\hat\Theta)}{\partial S_t}
//! \;\longrightarrow\;\varepsilon_T=\Pi_T-(S_T-K)^+
//! $$
//!
//! Heston calibration by box-constrained least squares, and a discrete-time
//! self-financing delta-hedging replay driven by the calibrated parameters.
//!
//! | Module         | Description                                                      |
//! |----------------|------------------------------------------------------------------|
//! | [`calendar`]   | Business-day calendars, roll-forward and day counts.             |
//! | [`config`]     | Layered settings (file, environment).                            |
//! | [`error`]      | Typed calibration, hedging and configuration errors.             |
//! | [`quant`]      | Market data, Fourier pricing, calibration and hedging.           |
//! | [`stochastic`] | Synthetic Heston paths.                                          |
//!
pub mod calendar;
pub mod config;
pub mod error;
pub mod quant;
pub mod stochastic;
