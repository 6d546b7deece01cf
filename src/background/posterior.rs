use ndarray::{Array1, Array2, Zip};
use single_utilities::traits::FloatOps;

use crate::background::prior::GammaPrior;
use crate::table::utils::{TrimMask, validated_counts};

/// Posterior mean Poisson rate for each row under a Gamma(alpha, beta) prior.
///
/// Cells above `upper_bound` are masked: they count toward neither the row sum nor the
/// number of observations. The result for each row is
/// `(alpha + row_sum) / (beta + n_unmasked)`, so a row with every cell masked gets the
/// prior mean `alpha / beta`.
///
/// Columns are assumed to be normalized to a common size factor already.
pub fn gamma_poisson_posterior_rates<T>(
    counts: &Array2<T>,
    alpha: f64,
    beta: f64,
    upper_bound: f64,
) -> anyhow::Result<Array1<f64>>
where
    T: FloatOps,
{
    let prior = GammaPrior::new(alpha, beta)?;
    let values = validated_counts(counts)?;
    let mask = TrimMask::mask_greater(&values, upper_bound);
    Ok(posterior_rates_masked(&values, &mask, &prior))
}

/// Posterior rates from an already validated table and its trim mask.
pub(crate) fn posterior_rates_masked(
    values: &Array2<f64>,
    mask: &TrimMask,
    prior: &GammaPrior,
) -> Array1<f64> {
    let sums = mask.row_sums(values);
    let sizes = mask.row_counts();

    let degenerate = mask.fully_masked_rows();
    if !degenerate.is_empty() {
        log::warn!(
            "{} row(s) have every count above {}; using the prior mean {} as their rate",
            degenerate.len(),
            mask.upper_bound,
            prior.mean()
        );
    }

    Zip::from(&sums)
        .and(&sizes)
        .map_collect(|&s, &n| (prior.alpha + s) / (prior.beta + n as f64))
}
