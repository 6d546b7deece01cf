//! Maximum-likelihood fit of the Gamma prior on background rates.

use num_traits::ToPrimitive;
use single_utilities::traits::FloatOps;
use statrs::function::gamma::{digamma, ln_gamma};

use crate::background::optim::{LbfgsParams, lbfgs_minimize_bounded};
use crate::error::GammaPoissonError;

/// Smallest positive double; the optimizer box is `[LOWER_BOUND, inf)` for both parameters.
const LOWER_BOUND: f64 = f64::from_bits(1);

/// Starting point `(alpha, beta)` for the likelihood search.
pub const DEFAULT_INITIAL: (f64, f64) = (2.0, 1.0);

/// Gamma distribution in the shape/rate parametrization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaPrior {
    /// Shape
    pub alpha: f64,
    /// Rate
    pub beta: f64,
}

impl GammaPrior {
    pub fn new(alpha: f64, beta: f64) -> anyhow::Result<Self> {
        if !(alpha.is_finite() && alpha > 0.0 && beta.is_finite() && beta > 0.0) {
            return Err(GammaPoissonError::invalid(format!(
                "Gamma parameters must be finite and positive, got alpha={}, beta={}",
                alpha, beta
            )));
        }
        Ok(GammaPrior { alpha, beta })
    }

    /// Prior mean rate, `alpha / beta`.
    pub fn mean(&self) -> f64 {
        self.alpha / self.beta
    }

    pub fn variance(&self) -> f64 {
        self.alpha / (self.beta * self.beta)
    }

    pub fn as_tuple(&self) -> (f64, f64) {
        (self.alpha, self.beta)
    }
}

/// Sufficient statistics of the positive part of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaSufficientStats {
    /// Number of strictly positive values
    pub m: usize,
    /// Sum of the positive values
    pub sum: f64,
    /// Sum of the logs of the positive values
    pub sum_log: f64,
}

impl GammaSufficientStats {
    /// Reduce a sample to its positive-part statistics; zeros are skipped entirely.
    pub fn from_sample<T>(sample: &[T]) -> anyhow::Result<Self>
    where
        T: FloatOps,
    {
        let mut stats = GammaSufficientStats {
            m: 0,
            sum: 0.0,
            sum_log: 0.0,
        };
        for (i, v) in sample.iter().enumerate() {
            let x = match ToPrimitive::to_f64(v) {
                Some(x) if x.is_finite() && x >= 0.0 => x,
                _ => {
                    return Err(GammaPoissonError::invalid(format!(
                        "sample value at position {} must be finite and non-negative",
                        i
                    )));
                }
            };
            if x > 0.0 {
                stats.m += 1;
                stats.sum += x;
                stats.sum_log += x.ln();
            }
        }
        Ok(stats)
    }

    /// Negative log-likelihood of Gamma(alpha, beta) over the positive values.
    pub fn neg_log_likelihood(&self, alpha: f64, beta: f64) -> f64 {
        let m = self.m as f64;
        -(m * alpha * beta.ln() - m * ln_gamma(alpha) + (alpha - 1.0) * self.sum_log
            - beta * self.sum)
    }

    /// Per-observation negative log-likelihood and its gradient. Same minimizer as
    /// [`neg_log_likelihood`](Self::neg_log_likelihood), but on a scale that does not
    /// grow with the sample size.
    fn scaled_objective(&self, x: &[f64], grad: &mut [f64]) -> f64 {
        let (alpha, beta) = (x[0], x[1]);
        let m = self.m as f64;
        let mean = self.sum / m;
        let mean_log = self.sum_log / m;
        let log_beta = beta.ln();

        grad[0] = -(log_beta - digamma(alpha) + mean_log);
        grad[1] = -(alpha / beta - mean);
        -(alpha * log_beta - ln_gamma(alpha) + (alpha - 1.0) * mean_log - beta * mean)
    }
}

/// Fit Gamma(alpha, beta) to the strictly positive values of `sample` by maximum likelihood.
///
/// # Errors
///
/// `InvalidInput` when the sample has no positive values or contains negative or
/// non-finite entries; `NumericalNonConvergence` when the optimizer stops without
/// converging or lands on unusable parameters.
pub fn fit_gamma<T>(sample: &[T]) -> anyhow::Result<GammaPrior>
where
    T: FloatOps,
{
    fit_gamma_with(sample, DEFAULT_INITIAL, &LbfgsParams::default())
}

/// [`fit_gamma`] with an explicit starting point and optimizer settings.
pub fn fit_gamma_with<T>(
    sample: &[T],
    initial: (f64, f64),
    params: &LbfgsParams,
) -> anyhow::Result<GammaPrior>
where
    T: FloatOps,
{
    let stats = GammaSufficientStats::from_sample(sample)?;
    if stats.m == 0 {
        return Err(GammaPoissonError::invalid(
            "cannot fit a Gamma prior: sample has no positive values",
        ));
    }

    let result = lbfgs_minimize_bounded(
        |x, grad| stats.scaled_objective(x, grad),
        &[initial.0, initial.1],
        &[LOWER_BOUND, LOWER_BOUND],
        params,
    );

    if !result.converged {
        return Err(GammaPoissonError::non_convergence(format!(
            "Gamma likelihood search stopped after {} iterations at alpha={}, beta={}",
            result.iterations, result.x[0], result.x[1]
        )));
    }

    let (alpha, beta) = (result.x[0], result.x[1]);
    log::debug!(
        "fitted Gamma prior alpha={:.6}, beta={:.6} from {} positive values in {} iterations",
        alpha,
        beta,
        stats.m,
        result.iterations
    );

    GammaPrior::new(alpha, beta).map_err(|_| {
        GammaPoissonError::non_convergence(format!(
            "Gamma likelihood search ended at unusable parameters alpha={}, beta={}",
            alpha, beta
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_do_not_enter_the_statistics() {
        let stats = GammaSufficientStats::from_sample(&[0.0_f64, 2.0, 0.0, 8.0]).unwrap();
        assert_eq!(stats.m, 2);
        assert_eq!(stats.sum, 10.0);
        assert!((stats.sum_log - 16.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn scaled_gradient_matches_finite_differences() {
        let stats = GammaSufficientStats::from_sample(&[1.5_f64, 2.5, 4.0, 7.0]).unwrap();
        let x = [1.7, 0.6];
        let mut grad = [0.0; 2];
        stats.scaled_objective(&x, &mut grad);

        let h = 1e-6;
        let mut scratch = [0.0; 2];
        for i in 0..2 {
            let mut up = x;
            let mut down = x;
            up[i] += h;
            down[i] -= h;
            let numeric = (stats.scaled_objective(&up, &mut scratch)
                - stats.scaled_objective(&down, &mut scratch))
                / (2.0 * h);
            assert!(
                (numeric - grad[i]).abs() < 1e-5,
                "component {}: analytic {} vs numeric {}",
                i,
                grad[i],
                numeric
            );
        }
    }

    #[test]
    fn scaled_objective_is_nll_over_m() {
        let stats = GammaSufficientStats::from_sample(&[1.0_f64, 3.0, 6.0]).unwrap();
        let mut grad = [0.0; 2];
        let scaled = stats.scaled_objective(&[2.0, 0.5], &mut grad);
        let full = stats.neg_log_likelihood(2.0, 0.5);
        assert!((scaled * 3.0 - full).abs() < 1e-10);
    }
}
