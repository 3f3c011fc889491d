use faer::Mat;
use log::debug;
use rand::Rng;

use crate::error::{Result, SamplerError};
use crate::linalg::mat_vec;
use crate::math::{axpy_out, max_abs};
use crate::problem::Problem;

/// Maximum number of consecutive retries before a step gives up.
pub(crate) const MAX_TRIES: usize = 100;

/// Sample a new feasible point from `x` along the direction `delta`.
///
/// The new point is drawn on the maximal segment of the line
/// `x + alpha * delta` that stays inside every variable bound and
/// inequality constraint, either uniformly or at a fixed `fraction` of the
/// segment. Numerically infeasible candidates are absorbed by restarting
/// from the center along a fresh random warmup direction; each restart
/// increments the shared retry counter. After [`MAX_TRIES`] consecutive
/// failures the polytope is considered numerically unstable and the error
/// propagates to the caller.
#[allow(clippy::too_many_arguments)]
pub(crate) fn step<R: Rng>(
    problem: &Problem,
    warmup: &Mat<f64>,
    center: &[f64],
    feasibility_tol: f64,
    bounds_tol: f64,
    retries: &mut usize,
    rng: &mut R,
    x: &[f64],
    delta: &[f64],
    fraction: Option<f64>,
) -> Result<Vec<f64>> {
    let n = problem.n_variables();
    let mut x = x.to_vec();
    let mut delta = delta.to_vec();
    let mut fraction = fraction;
    let mut tries = 0usize;

    loop {
        let mut alphas: Vec<f64> = Vec::with_capacity(2 * n);

        // permissible alphas for staying in variable bounds
        for j in 0..n {
            if delta[j].abs() <= feasibility_tol || problem.variable_fixed[j] {
                continue;
            }
            let lb = problem.variable_bounds[(0, j)];
            let ub = problem.variable_bounds[(1, j)];
            alphas.push(((1.0 - bounds_tol) * lb - x[j]) / delta[j]);
            alphas.push(((1.0 - bounds_tol) * ub - x[j]) / delta[j]);
        }

        // permissible alphas for staying in constraint bounds
        if problem.inequalities.nrows() > 0 {
            let ineq_delta = mat_vec(&problem.inequalities, &delta);
            let ineq_x = mat_vec(&problem.inequalities, &x);
            for (row, (&d, &v)) in ineq_delta.iter().zip(&ineq_x).enumerate() {
                if d.abs() <= feasibility_tol {
                    continue;
                }
                let lb = problem.bounds[(0, row)];
                let ub = problem.bounds[(1, row)];
                alphas.push(((1.0 - bounds_tol) * lb - v) / d);
                alphas.push(((1.0 - bounds_tol) * ub - v) / d);
            }
        }

        // largest backward and smallest forward step inside every constraint
        let alpha_lo = alphas
            .iter()
            .copied()
            .filter(|&a| a <= 0.0)
            .fold(f64::NEG_INFINITY, f64::max);
        let alpha_lo = if alpha_lo.is_finite() { alpha_lo } else { 0.0 };
        let alpha_hi = alphas
            .iter()
            .copied()
            .filter(|&a| a > 0.0)
            .fold(f64::INFINITY, f64::min);
        let alpha_hi = if alpha_hi.is_finite() { alpha_hi } else { 0.0 };

        let alpha = match fraction {
            Some(f) => alpha_lo + f * (alpha_hi - alpha_lo),
            None => alpha_lo + rng.random::<f64>() * (alpha_hi - alpha_lo),
        };

        let mut p = vec![0f64; n];
        axpy_out(&delta, &x, alpha, &mut p);

        // Numerical instabilities may invalidate the bounds, and a vanishing
        // segment means the walker is stuck. Restart from the center along
        // one of the original warmup directions in either case.
        let (lb_dist, ub_dist) = problem.bounds_dist(&p);
        let stuck = alpha_lo.abs().max(alpha_hi.abs()) * max_abs(&delta) < bounds_tol;
        if lb_dist < -bounds_tol || ub_dist < -bounds_tol || stuck {
            if tries >= MAX_TRIES {
                return Err(SamplerError::NumericallyUnstable(tries));
            }
            debug!("found bounds infeasibility in sample, resetting to center");
            let pi = rng.random_range(0..warmup.ncols());
            delta = warmup
                .col_as_slice(pi)
                .iter()
                .zip(center)
                .map(|(&w, &c)| w - c)
                .collect();
            x.copy_from_slice(center);
            fraction = None;
            *retries += 1;
            tries += 1;
            continue;
        }

        return Ok(p);
    }
}
