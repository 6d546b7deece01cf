//! Poisson upper-tail probabilities in log space.
//!
//! `log P(X > k)` for `X ~ Poisson(rate)` is accumulated directly from the probability
//! mass function, starting at `k + 1`, so that deep-tail values which underflow a plain
//! `1 - cdf(k)` remain representable.

use num_traits::ToPrimitive;
use single_utilities::traits::FloatOps;
use statrs::function::gamma::ln_gamma;

use crate::error::GammaPoissonError;

/// Largest change in a running log-sum still treated as progress.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Upper limit on summation steps before giving up.
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000_000;

/// Natural log of `P(X > count)` for each count, with `X ~ Poisson(rate)`.
///
/// Counts need not be integers (size-normalized data is common); the mass function
/// is extended through the log-gamma function.
///
/// # Errors
///
/// `InvalidInput` if `rate` is not finite and positive or a count is negative or
/// not finite; `NumericalNonConvergence` if the sum fails to settle.
pub fn poisson_logsf<T>(counts: &[T], rate: f64) -> anyhow::Result<Vec<f64>>
where
    T: FloatOps,
{
    poisson_logsf_with(counts, rate, DEFAULT_TOLERANCE, DEFAULT_MAX_ITERATIONS)
}

/// [`poisson_logsf`] with explicit convergence settings.
///
/// All entries are advanced in lock-step: one more mass-function term is folded into
/// every running sum per step, and the loop ends only once the latest step moved every
/// sum by less than `tolerance`.
pub fn poisson_logsf_with<T>(
    counts: &[T],
    rate: f64,
    tolerance: f64,
    max_iterations: usize,
) -> anyhow::Result<Vec<f64>>
where
    T: FloatOps,
{
    if !rate.is_finite() || rate <= 0.0 {
        return Err(GammaPoissonError::invalid(format!(
            "Poisson rate must be finite and positive, got {}",
            rate
        )));
    }

    let mut k = counts
        .iter()
        .enumerate()
        .map(|(i, c)| match ToPrimitive::to_f64(c) {
            Some(x) if x.is_finite() && x >= 0.0 => Ok(x + 1.0),
            _ => Err(GammaPoissonError::invalid(format!(
                "count at position {} must be finite and non-negative",
                i
            ))),
        })
        .collect::<anyhow::Result<Vec<f64>>>()?;

    if k.is_empty() {
        return Ok(Vec::new());
    }

    let log_rate = rate.ln();
    let mut accum: Vec<f64> = k.iter().map(|&k| log_pmf(k, rate, log_rate)).collect();

    for _ in 0..max_iterations {
        let mut converged = true;
        for (acc, k) in accum.iter_mut().zip(k.iter_mut()) {
            *k += 1.0;
            let updated = log_add_exp(*acc, log_pmf(*k, rate, log_rate));
            // equal sums (both -inf included) are settled; NaN never is
            if updated != *acc && !(updated - *acc < tolerance) {
                converged = false;
            }
            *acc = updated;
        }
        if converged {
            return Ok(accum);
        }
    }

    Err(GammaPoissonError::non_convergence(format!(
        "Poisson tail sum for rate {} did not settle within {} steps",
        rate, max_iterations
    )))
}

#[inline]
fn log_pmf(k: f64, rate: f64, log_rate: f64) -> f64 {
    k * log_rate - rate - ln_gamma(k + 1.0)
}

/// Stable `ln(exp(a) + exp(b))`.
#[inline]
pub(crate) fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let m = a.max(b);
    m + (-(a - b).abs()).exp().ln_1p()
}
