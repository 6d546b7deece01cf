//! Gamma-Poisson background model.
//!
//! Each row of a count table (a feature or clone) is treated as independent Poisson draws
//! whose rate comes from a Gamma prior shared by all rows. The model
//!
//! 1. trims outliers above a high percentile of all counts,
//! 2. fits the Gamma prior to the trimmed row means ([`prior`]),
//! 3. shrinks each row toward the prior to get a posterior mean rate ([`posterior`]),
//! 4. scores every cell as `-log10 P(X > count)` under its row's rate ([`significance`]).
//!
//! [`gamma_poisson_model`] runs the whole pipeline; the stages are public for callers that
//! need them individually. The same pipeline is available on plain dense and sparse
//! matrices through [`GammaPoissonOps`].

use nalgebra_sparse::CsrMatrix;
use ndarray::{Array1, Array2};
use single_utilities::traits::FloatOpsTS;

use crate::table::utils::{TrimMask, score_at_percentile};
use crate::table::{CountTable, LabeledTable, SignificanceTable};

pub mod optim;
pub mod posterior;
pub mod prior;
pub mod significance;
pub mod tail;

use optim::LbfgsParams;
use prior::{DEFAULT_INITIAL, GammaPrior, fit_gamma_with};

pub use posterior::gamma_poisson_posterior_rates;
pub use prior::fit_gamma;
pub use significance::{mlxp_ceiling, mlxp_gamma_poisson};
pub use tail::poisson_logsf;

/// Default percentile of all counts above which cells are trimmed.
pub const DEFAULT_TRIM_PERCENTILE: f64 = 99.9;

/// Configurable parameters for the background model.
#[derive(Debug, Clone, PartialEq)]
pub struct GammaPoissonParams {
    /// Percentile (0-100) of all counts used as the trim threshold
    pub trim_percentile: f64,
    /// Tail sums stop once a step moves every log-sum by less than this
    pub tail_tolerance: f64,
    /// Upper limit on tail-sum steps per row
    pub tail_max_iterations: usize,
    /// Starting `(alpha, beta)` for the prior fit
    pub initial: (f64, f64),
    /// Optimizer settings for the prior fit
    pub optimizer: LbfgsParams,
}

impl Default for GammaPoissonParams {
    fn default() -> Self {
        Self {
            trim_percentile: DEFAULT_TRIM_PERCENTILE,
            tail_tolerance: tail::DEFAULT_TOLERANCE,
            tail_max_iterations: tail::DEFAULT_MAX_ITERATIONS,
            initial: DEFAULT_INITIAL,
            optimizer: LbfgsParams::default(),
        }
    }
}

impl GammaPoissonParams {
    pub fn with_trim_percentile(mut self, trim_percentile: f64) -> Self {
        self.trim_percentile = trim_percentile;
        self
    }

    pub fn with_tail_tolerance(mut self, tolerance: f64) -> Self {
        self.tail_tolerance = tolerance;
        self
    }

    pub fn with_tail_max_iterations(mut self, max_iterations: usize) -> Self {
        self.tail_max_iterations = max_iterations;
        self
    }

    pub fn with_initial(mut self, alpha: f64, beta: f64) -> Self {
        self.initial = (alpha, beta);
        self
    }

    pub fn with_optimizer(mut self, optimizer: LbfgsParams) -> Self {
        self.optimizer = optimizer;
        self
    }
}

/// Everything the background model produces for one count table.
#[derive(Debug, Clone)]
pub struct GammaPoissonFit {
    /// Fitted Gamma prior on background rates
    pub prior: GammaPrior,
    /// Trim threshold; counts above it were left out of the fit and the posterior rates
    pub upper_bound: f64,
    /// Posterior mean Poisson rate, one per row
    pub rates: Array1<f64>,
    /// `-log10(p)` per cell, labeled like the input
    pub mlxp: SignificanceTable,
}

impl GammaPoissonFit {
    pub fn alpha(&self) -> f64 {
        self.prior.alpha
    }

    pub fn beta(&self) -> f64 {
        self.prior.beta
    }

    /// `(alpha, beta, rates, mlxp)`
    pub fn into_tuple(self) -> (f64, f64, Array1<f64>, SignificanceTable) {
        (self.prior.alpha, self.prior.beta, self.rates, self.mlxp)
    }

    /// `(row label, column label)` of every cell with `-log10(p)` above `threshold`.
    pub fn significant_cells(&self, threshold: f64) -> Vec<(&str, &str)> {
        self.mlxp
            .cells_above(threshold)
            .into_iter()
            .map(|(i, j)| {
                (
                    self.mlxp.row_labels[i].as_str(),
                    self.mlxp.col_labels[j].as_str(),
                )
            })
            .collect()
    }
}

/// Fit the background model and score every cell.
///
/// Returns `(alpha, beta, rates, mlxp)`. `trim_percentile` is usually
/// [`DEFAULT_TRIM_PERCENTILE`]; 100 disables trimming.
pub fn gamma_poisson_model<T>(
    counts: &CountTable<T>,
    trim_percentile: f64,
) -> anyhow::Result<(f64, f64, Array1<f64>, SignificanceTable)>
where
    T: FloatOpsTS,
{
    let params = GammaPoissonParams::default().with_trim_percentile(trim_percentile);
    Ok(fit_gamma_poisson(counts, &params)?.into_tuple())
}

/// [`gamma_poisson_model`] with full control over the parameters.
pub fn fit_gamma_poisson<T>(
    counts: &CountTable<T>,
    params: &GammaPoissonParams,
) -> anyhow::Result<GammaPoissonFit>
where
    T: FloatOpsTS,
{
    let values = counts.to_f64_counts()?;

    let upper_bound = score_at_percentile(&values, params.trim_percentile)?;
    let mask = TrimMask::mask_greater(&values, upper_bound);
    log::debug!(
        "trim threshold {} at percentile {} masks {} of {} cells",
        upper_bound,
        params.trim_percentile,
        mask.n_masked(),
        values.len()
    );

    let trimmed_means = mask.row_means(&values).to_vec();
    let prior = fit_gamma_with(&trimmed_means[..], params.initial, &params.optimizer)?;

    let rates = posterior::posterior_rates_masked(&values, &mask, &prior);
    let mlxp = significance::mlxp_from_values(
        &values,
        &counts.row_labels,
        &rates.to_vec(),
        params.tail_tolerance,
        params.tail_max_iterations,
    )?;

    Ok(GammaPoissonFit {
        prior,
        upper_bound,
        rates,
        mlxp: counts.with_values(mlxp),
    })
}

/// The background model on unlabeled matrices (rows = features, columns = samples).
///
/// Results carry positional labels ("0", "1", ...).
pub trait GammaPoissonOps<T>
where
    T: FloatOpsTS,
{
    fn gamma_poisson_background(
        &self,
        params: &GammaPoissonParams,
    ) -> anyhow::Result<GammaPoissonFit>;
}

impl<T> GammaPoissonOps<T> for Array2<T>
where
    T: FloatOpsTS,
{
    fn gamma_poisson_background(
        &self,
        params: &GammaPoissonParams,
    ) -> anyhow::Result<GammaPoissonFit> {
        fit_gamma_poisson(&LabeledTable::from_array(self.clone()), params)
    }
}

impl<T> GammaPoissonOps<T> for CsrMatrix<T>
where
    T: FloatOpsTS,
{
    /// Implicit zeros are scored as zero counts.
    fn gamma_poisson_background(
        &self,
        params: &GammaPoissonParams,
    ) -> anyhow::Result<GammaPoissonFit> {
        let mut dense = Array2::<T>::zeros((self.nrows(), self.ncols()));
        for (i, row) in self.row_iter().enumerate() {
            for (&j, &v) in row.col_indices().iter().zip(row.values().iter()) {
                dense[[i, j]] = v;
            }
        }
        fit_gamma_poisson(&LabeledTable::from_array(dense), params)
    }
}
