use anyhow::Context;
use ndarray::Array2;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use single_utilities::traits::FloatOpsTS;

use crate::background::tail::{DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE, poisson_logsf_with};
use crate::error::GammaPoissonError;
use crate::table::{CountTable, SignificanceTable};

/// `-log10` of the smallest positive normal double, the finite stand-in for `-log10(0)`.
pub fn mlxp_ceiling() -> f64 {
    -f64::MIN_POSITIVE.log10()
}

/// `-log10(p)` of every cell, where `p = P(X > count)` for `X ~ Poisson(rates[row])`.
///
/// Raw (untrimmed) counts are scored. Tail probabilities that evaluate to exactly zero
/// are reported as [`mlxp_ceiling`], so the table never holds an infinity. Row and
/// column labels are carried over from `counts`.
pub fn mlxp_gamma_poisson<T>(
    counts: &CountTable<T>,
    rates: &[f64],
) -> anyhow::Result<SignificanceTable>
where
    T: FloatOpsTS,
{
    mlxp_gamma_poisson_with(counts, rates, DEFAULT_TOLERANCE, DEFAULT_MAX_ITERATIONS)
}

/// [`mlxp_gamma_poisson`] with explicit tail-sum convergence settings.
pub fn mlxp_gamma_poisson_with<T>(
    counts: &CountTable<T>,
    rates: &[f64],
    tolerance: f64,
    max_iterations: usize,
) -> anyhow::Result<SignificanceTable>
where
    T: FloatOpsTS,
{
    let values = counts.to_f64_counts()?;
    let mlxp = mlxp_from_values(&values, &counts.row_labels, rates, tolerance, max_iterations)?;
    Ok(counts.with_values(mlxp))
}

pub(crate) fn mlxp_from_values(
    values: &Array2<f64>,
    row_labels: &[String],
    rates: &[f64],
    tolerance: f64,
    max_iterations: usize,
) -> anyhow::Result<Array2<f64>> {
    let (nrows, ncols) = values.dim();
    if rates.len() != nrows {
        return Err(GammaPoissonError::invalid(format!(
            "expected one rate per row ({}), got {}",
            nrows,
            rates.len()
        )));
    }

    let ln_10 = std::f64::consts::LN_10;
    let rows: Vec<Vec<f64>> = (0..nrows)
        .into_par_iter()
        .map(|i| -> anyhow::Result<Vec<f64>> {
            let row = values.row(i).to_vec();
            let logsf = poisson_logsf_with(&row[..], rates[i], tolerance, max_iterations)
                .with_context(|| format!("scoring row '{}'", row_labels[i]))?;
            // log sums can overshoot 0 by rounding when the tail holds nearly all the mass
            Ok(logsf.into_iter().map(|lp| (-lp / ln_10).max(0.0)).collect())
        })
        .collect::<anyhow::Result<Vec<Vec<f64>>>>()?;

    let ceiling = mlxp_ceiling();
    let mut clamped = 0usize;
    let flat: Vec<f64> = rows
        .into_iter()
        .flatten()
        .map(|v| {
            if v == f64::INFINITY {
                clamped += 1;
                ceiling
            } else {
                v
            }
        })
        .collect();
    if clamped > 0 {
        log::debug!("clamped {} infinite -log10(p) value(s) to {}", clamped, ceiling);
    }

    Ok(Array2::from_shape_vec((nrows, ncols), flat)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_is_minus_log10_of_tiny() {
        assert!((mlxp_ceiling() - 307.652_655_568_588_2).abs() < 1e-9);
    }

    #[test]
    fn zero_tail_probability_is_clamped() {
        let values = ndarray::array![[1.0, 1e306]];
        let mlxp = mlxp_from_values(&values, &["r".to_string()], &[1.0], 1e-4, 1000).unwrap();
        assert!(mlxp[[0, 0]].is_finite());
        assert_eq!(mlxp[[0, 1]], mlxp_ceiling());
    }
}
