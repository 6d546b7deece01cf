//! Box-constrained L-BFGS.
//!
//! A projected variant of limited-memory BFGS for problems with lower bounds only:
//! search directions come from the usual two-loop recursion, trial points are projected
//! back onto the feasible box, and steps are accepted by an Armijo backtracking rule
//! measured along the projected displacement.

use std::collections::VecDeque;

/// Settings for [`lbfgs_minimize_bounded`].
#[derive(Debug, Clone, PartialEq)]
pub struct LbfgsParams {
    /// Maximum number of outer iterations
    pub max_iter: usize,
    /// Number of correction pairs kept for the Hessian approximation
    pub memory: usize,
    /// Stop when the largest projected-gradient component falls below this
    pub pgtol: f64,
    /// Stop when the relative decrease of the objective falls below this
    pub ftol: f64,
    /// Maximum backtracking steps per line search
    pub max_linesearch: usize,
}

impl Default for LbfgsParams {
    fn default() -> Self {
        Self {
            max_iter: 15_000,
            memory: 10,
            pgtol: 1e-8,
            ftol: 1e-12,
            max_linesearch: 50,
        }
    }
}

/// Outcome of a bounded minimization.
#[derive(Debug, Clone)]
pub struct LbfgsResult {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

const ARMIJO_C1: f64 = 1e-4;

/// Minimize `f` subject to `x >= lower`, starting from `x0`.
///
/// `f_grad` evaluates the objective at `x`, writing its gradient into the second
/// argument. A non-finite objective or gradient at a trial point is treated as a
/// failed trial and the step is shortened.
pub fn lbfgs_minimize_bounded<F>(
    f_grad: F,
    x0: &[f64],
    lower: &[f64],
    params: &LbfgsParams,
) -> LbfgsResult
where
    F: Fn(&[f64], &mut [f64]) -> f64,
{
    let n = x0.len();
    debug_assert_eq!(lower.len(), n);

    let mut x: Vec<f64> = project(x0, lower);
    let mut grad = vec![0.0; n];
    let mut fx = f_grad(&x, &mut grad);
    if !is_finite_point(fx, &grad) {
        return LbfgsResult {
            x,
            value: fx,
            iterations: 0,
            converged: false,
        };
    }

    let mut s_hist: VecDeque<Vec<f64>> = VecDeque::with_capacity(params.memory);
    let mut y_hist: VecDeque<Vec<f64>> = VecDeque::with_capacity(params.memory);
    let mut rho_hist: VecDeque<f64> = VecDeque::with_capacity(params.memory);

    let mut x_new = vec![0.0; n];
    let mut grad_new = vec![0.0; n];

    for k in 1..=params.max_iter {
        if projected_gradient_norm(&x, &grad, lower) <= params.pgtol {
            return LbfgsResult {
                x,
                value: fx,
                iterations: k - 1,
                converged: true,
            };
        }

        let mut drt: Vec<f64> = grad.iter().map(|g| -g).collect();
        two_loop_recursion(&mut drt, &s_hist, &y_hist, &rho_hist);
        freeze_active(&mut drt, &x, lower);

        if dot(&grad, &drt) >= 0.0 {
            // Curvature pairs no longer give a descent direction
            s_hist.clear();
            y_hist.clear();
            rho_hist.clear();
            drt = grad.iter().map(|g| -g).collect();
            freeze_active(&mut drt, &x, lower);
        }

        let mut step = if s_hist.is_empty() {
            (1.0 / norm(&drt)).min(1.0)
        } else {
            1.0
        };

        let mut fx_new = f64::NAN;
        let mut accepted = false;
        for _ in 0..params.max_linesearch {
            for i in 0..n {
                x_new[i] = (x[i] + step * drt[i]).max(lower[i]);
            }
            fx_new = f_grad(&x_new, &mut grad_new);
            let decrease: f64 = grad
                .iter()
                .zip(x_new.iter().zip(x.iter()))
                .map(|(g, (xn, xo))| g * (xn - xo))
                .sum();
            if is_finite_point(fx_new, &grad_new) && fx_new <= fx + ARMIJO_C1 * decrease {
                accepted = true;
                break;
            }
            step *= 0.5;
        }

        if !accepted {
            if s_hist.is_empty() {
                return LbfgsResult {
                    x,
                    value: fx,
                    iterations: k,
                    converged: false,
                };
            }
            s_hist.clear();
            y_hist.clear();
            rho_hist.clear();
            continue;
        }

        let s: Vec<f64> = (0..n).map(|i| x_new[i] - x[i]).collect();
        let y: Vec<f64> = (0..n).map(|i| grad_new[i] - grad[i]).collect();
        let sy = dot(&s, &y);
        let yy = dot(&y, &y);
        if sy > f64::EPSILON * yy {
            if s_hist.len() >= params.memory {
                s_hist.pop_front();
                y_hist.pop_front();
                rho_hist.pop_front();
            }
            rho_hist.push_back(1.0 / sy);
            s_hist.push_back(s);
            y_hist.push_back(y);
        }

        let fx_old = fx;
        x.copy_from_slice(&x_new);
        grad.copy_from_slice(&grad_new);
        fx = fx_new;

        let scale = fx_old.abs().max(fx.abs()).max(1.0);
        if (fx_old - fx) <= params.ftol * scale {
            return LbfgsResult {
                x,
                value: fx,
                iterations: k,
                converged: true,
            };
        }
    }

    let converged = projected_gradient_norm(&x, &grad, lower) <= params.pgtol;
    LbfgsResult {
        x,
        value: fx,
        iterations: params.max_iter,
        converged,
    }
}

fn project(x: &[f64], lower: &[f64]) -> Vec<f64> {
    x.iter().zip(lower.iter()).map(|(&xi, &li)| xi.max(li)).collect()
}

/// Zero the components that would push a variable sitting on its bound further out.
fn freeze_active(d: &mut [f64], x: &[f64], lower: &[f64]) {
    for i in 0..d.len() {
        if x[i] <= lower[i] && d[i] < 0.0 {
            d[i] = 0.0;
        }
    }
}

/// Infinity norm of the gradient projected onto the feasible box.
fn projected_gradient_norm(x: &[f64], grad: &[f64], lower: &[f64]) -> f64 {
    x.iter()
        .zip(grad.iter())
        .zip(lower.iter())
        .map(|((&xi, &gi), &li)| if xi <= li && gi > 0.0 { 0.0 } else { gi.abs() })
        .fold(0.0, f64::max)
}

fn is_finite_point(f: f64, grad: &[f64]) -> bool {
    f.is_finite() && grad.iter().all(|g| g.is_finite())
}

/// Two-loop recursion: turns `d = -g` into `d = -H g`.
fn two_loop_recursion(
    d: &mut [f64],
    s_hist: &VecDeque<Vec<f64>>,
    y_hist: &VecDeque<Vec<f64>>,
    rho_hist: &VecDeque<f64>,
) {
    let m = s_hist.len();
    if m == 0 {
        return;
    }

    let mut alpha = vec![0.0; m];
    for i in (0..m).rev() {
        alpha[i] = rho_hist[i] * dot(&s_hist[i], d);
        for j in 0..d.len() {
            d[j] -= alpha[i] * y_hist[i][j];
        }
    }

    let last = m - 1;
    let yy = dot(&y_hist[last], &y_hist[last]);
    let gamma = if yy > 0.0 {
        dot(&s_hist[last], &y_hist[last]) / yy
    } else {
        1.0
    };
    for dj in d.iter_mut() {
        *dj *= gamma;
    }

    for i in 0..m {
        let beta = rho_hist[i] * dot(&y_hist[i], d);
        for j in 0..d.len() {
            d[j] += s_hist[i][j] * (alpha[i] - beta);
        }
    }
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(ai, bi)| ai * bi).sum()
}

#[inline]
fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_quadratic_interior_minimum() {
        // f(x) = (x0 - 3)^2 + 2 (x1 - 1)^2
        let result = lbfgs_minimize_bounded(
            |x, g| {
                g[0] = 2.0 * (x[0] - 3.0);
                g[1] = 4.0 * (x[1] - 1.0);
                (x[0] - 3.0).powi(2) + 2.0 * (x[1] - 1.0).powi(2)
            },
            &[10.0, 10.0],
            &[0.0, 0.0],
            &LbfgsParams::default(),
        );
        assert!(result.converged);
        assert!((result.x[0] - 3.0).abs() < 1e-4, "x0 = {}", result.x[0]);
        assert!((result.x[1] - 1.0).abs() < 1e-4, "x1 = {}", result.x[1]);
    }

    #[test]
    fn test_minimum_on_the_bound() {
        // Unconstrained minimum at x0 = -2 lies outside the box
        let result = lbfgs_minimize_bounded(
            |x, g| {
                g[0] = 2.0 * (x[0] + 2.0);
                g[1] = 2.0 * (x[1] - 0.5);
                (x[0] + 2.0).powi(2) + (x[1] - 0.5).powi(2)
            },
            &[1.0, 1.0],
            &[0.0, 0.0],
            &LbfgsParams::default(),
        );
        assert!(result.converged);
        assert!(result.x[0] < 1e-6, "x0 = {}", result.x[0]);
        assert!((result.x[1] - 0.5).abs() < 1e-4);
    }
}
