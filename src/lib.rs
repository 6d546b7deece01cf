//! # single-gampois
//!
//! A Gamma-Poisson background model for count matrices, part of the single-rust ecosystem.
//!
//! Given a table of non-negative read counts (rows = features or clones, columns = samples),
//! this crate estimates what random background noise looks like and reports, for every
//! cell, how surprising its count is under that background as `-log10(p)`.
//!
//! ## Model
//!
//! Each row's counts are treated as independent Poisson draws. Row rates are themselves
//! drawn from a Gamma(alpha, beta) prior shared by the whole table:
//!
//! - the prior is fitted by maximum likelihood to the row means after trimming counts above
//!   a high percentile (99.9 by default),
//! - each row's rate is the posterior mean `(alpha + row_sum) / (beta + n)` over its
//!   untrimmed cells,
//! - each cell is scored as `-log10 P(X > count)` with `X ~ Poisson(row rate)`.
//!
//! Columns must already be normalized to a common size factor. No multiple-testing
//! correction is applied.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ndarray::array;
//! use single_gampois::{CountTable, gamma_poisson_model};
//!
//! let counts = CountTable::new(
//!     array![[3.0, 4.0, 5.0], [0.0, 1.0, 40.0]],
//!     vec!["clone_a".into(), "clone_b".into()],
//!     vec!["s1".into(), "s2".into(), "s3".into()],
//! )?;
//! let (alpha, beta, rates, mlxp) = gamma_poisson_model(&counts, 99.9)?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Module Organization
//!
//! - **[`background`]**: tail probabilities, prior fit, posterior rates, significance scoring
//! - **[`table`]**: labeled count and significance tables, trimming utilities
//! - **[`error`]**: error kinds raised by the model

pub mod background;
pub mod error;
pub mod table;

pub use background::{
    DEFAULT_TRIM_PERCENTILE, GammaPoissonFit, GammaPoissonOps, GammaPoissonParams,
    fit_gamma, fit_gamma_poisson, gamma_poisson_model, gamma_poisson_posterior_rates,
    mlxp_ceiling, mlxp_gamma_poisson, poisson_logsf,
};
pub use background::prior::GammaPrior;
pub use error::GammaPoissonError;
pub use table::{CountTable, LabeledTable, SignificanceTable};
