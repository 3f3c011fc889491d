use faer::Mat;

use crate::error::{Result, SamplerError};
use crate::linalg::{mat_vec, nullspace};
use crate::model::FluxModel;

/// Frozen matrix representation of a sampling problem.
///
/// Built once per sampler and never mutated afterwards; walkers share it by
/// reference (`Arc`) without any locking.
#[derive(Debug)]
pub struct Problem {
    /// Equality system `equalities * x = b`, including unit rows for
    /// non-zero fixed variables.
    pub equalities: Mat<f64>,
    pub b: Vec<f64>,
    /// Inequality system, one row per constraint.
    pub inequalities: Mat<f64>,
    /// Lower and upper bounds of the inequality rows, one column per row.
    pub bounds: Mat<f64>,
    /// Lower and upper bounds of the variables, one column per variable.
    pub variable_bounds: Mat<f64>,
    pub variable_fixed: Vec<bool>,
    /// Orthonormal null space basis of the equality system, one basis
    /// vector per column.
    pub nullspace: Mat<f64>,
    /// True iff `b` is numerically zero and no fixed variable is non-zero.
    /// Only homogeneous problems can be reprojected from scratch: an affine
    /// offset is not recoverable by a linear null space projection.
    pub homogeneous: bool,
}

impl Problem {
    /// Build the matrix representation of the sampling problem.
    pub fn build(model: &impl FluxModel, feasibility_tol: f64) -> Result<Self> {
        if model.is_discrete() {
            return Err(SamplerError::DiscreteModel);
        }

        let prob = model.constraint_matrices(feasibility_tol);
        let n = prob.variable_bounds.ncols();

        let mut homogeneous = prob.b.iter().all(|&v| v.abs() < feasibility_tol);

        // non-zero fixed variables become extra equality rows `x_i = value`
        let fixed_non_zero: Vec<usize> = (0..n)
            .filter(|&j| {
                prob.variable_fixed[j] && prob.variable_bounds[(1, j)].abs() > feasibility_tol
            })
            .collect();

        let (equalities, b) = if fixed_non_zero.is_empty() {
            (prob.equalities, prob.b)
        } else {
            homogeneous = false;
            let m_eq = prob.equalities.nrows();
            let equalities = Mat::from_fn(m_eq + fixed_non_zero.len(), n, |i, j| {
                if i < m_eq {
                    prob.equalities[(i, j)]
                } else if fixed_non_zero[i - m_eq] == j {
                    1.0
                } else {
                    0.0
                }
            });
            let mut b = prob.b;
            b.extend(fixed_non_zero.iter().map(|&j| prob.variable_bounds[(1, j)]));
            (equalities, b)
        };

        let nulls = nullspace(&equalities)?;

        Ok(Problem {
            equalities,
            b,
            inequalities: prob.inequalities,
            bounds: prob.bounds,
            variable_bounds: prob.variable_bounds,
            variable_fixed: prob.variable_fixed,
            nullspace: nulls,
            homogeneous,
        })
    }

    pub fn n_variables(&self) -> usize {
        self.variable_bounds.ncols()
    }

    /// `max |equalities * p - b|`
    pub(crate) fn equality_residual(&self, p: &[f64]) -> f64 {
        mat_vec(&self.equalities, p)
            .iter()
            .zip(&self.b)
            .fold(0f64, |acc, (&lhs, &rhs)| acc.max((lhs - rhs).abs()))
    }

    /// Project a point onto the null space of the equality system.
    pub(crate) fn project_nullspace(&self, p: &[f64]) -> Vec<f64> {
        let nulls = &self.nullspace;
        let mut coefs = vec![0f64; nulls.ncols()];
        for (c, coef) in coefs.iter_mut().enumerate() {
            *coef = nulls
                .col_as_slice(c)
                .iter()
                .zip(p)
                .map(|(&n, &p)| n * p)
                .sum();
        }
        mat_vec_transposed(nulls, &coefs)
    }

    /// Minimal lower and upper bound slack of a point. Negative is bad.
    pub(crate) fn bounds_dist(&self, p: &[f64]) -> (f64, f64) {
        let mut lb_dist = f64::INFINITY;
        let mut ub_dist = f64::INFINITY;
        for (j, &pj) in p.iter().enumerate() {
            lb_dist = lb_dist.min(pj - self.variable_bounds[(0, j)]);
            ub_dist = ub_dist.min(self.variable_bounds[(1, j)] - pj);
        }

        if self.inequalities.nrows() > 0 {
            let consts = mat_vec(&self.inequalities, p);
            for (row, &v) in consts.iter().enumerate() {
                lb_dist = lb_dist.min(v - self.bounds[(0, row)]);
                ub_dist = ub_dist.min(self.bounds[(1, row)] - v);
            }
        }

        (lb_dist, ub_dist)
    }
}

/// `m^T * x` without materializing the transpose; `m` is read columnwise.
fn mat_vec_transposed(m: &Mat<f64>, coefs: &[f64]) -> Vec<f64> {
    let mut out = vec![0f64; m.nrows()];
    for (c, &coef) in coefs.iter().enumerate() {
        if coef == 0.0 {
            continue;
        }
        for (out, &v) in out.iter_mut().zip(m.col_as_slice(c)) {
            *out += v * coef;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_models::{cone_model, simplex_model};
    use approx::assert_abs_diff_eq;

    #[test]
    fn simplex_problem_is_inhomogeneous() {
        let problem = Problem::build(&simplex_model(), 1e-7).unwrap();
        assert!(!problem.homogeneous);
        assert_eq!(problem.equalities.nrows(), 1);
        assert_eq!(problem.b, vec![10.0]);
    }

    #[test]
    fn cone_problem_is_homogeneous() {
        let problem = Problem::build(&cone_model(), 1e-7).unwrap();
        assert!(problem.homogeneous);
        assert_eq!(problem.b, vec![0.0]);
    }

    #[test]
    fn non_zero_fixed_variable_folds_into_equalities() {
        let mut model = simplex_model();
        model.fix_variable(0, 5.0);
        let problem = Problem::build(&model, 1e-7).unwrap();

        assert!(!problem.homogeneous);
        assert_eq!(problem.equalities.nrows(), 2);
        assert_eq!(problem.b, vec![10.0, 5.0]);
        // the folded row is a unit row on the fixed variable
        assert_abs_diff_eq!(problem.equalities[(1, 0)], 1.0);
        for j in 1..problem.n_variables() {
            assert_abs_diff_eq!(problem.equalities[(1, j)], 0.0);
        }
    }

    #[test]
    fn discrete_model_is_rejected() {
        let model = simplex_model().with_discrete();
        assert!(matches!(
            Problem::build(&model, 1e-7),
            Err(SamplerError::DiscreteModel)
        ));
    }

    #[test]
    fn projection_stays_in_the_nullspace() {
        let problem = Problem::build(&cone_model(), 1e-7).unwrap();
        let p = vec![2.0, 3.0, 5.0, 0.0, 0.0, 0.0];
        assert_abs_diff_eq!(problem.equality_residual(&p), 0.0, epsilon = 1e-12);

        // a feasible point projects onto itself
        let projected = problem.project_nullspace(&p);
        for (a, b) in projected.iter().zip(&p) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }

        // a drifted point lands back on the equality manifold
        let mut drifted = p.clone();
        drifted[0] += 0.1;
        let projected = problem.project_nullspace(&drifted);
        assert_abs_diff_eq!(problem.equality_residual(&projected), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn bounds_dist_flags_violations() {
        let problem = Problem::build(&simplex_model(), 1e-7).unwrap();
        let inside = vec![2.0, 3.0, 5.0, 0.0, 0.0, 0.0];
        let (lb, ub) = problem.bounds_dist(&inside);
        assert!(lb >= 0.0);
        assert!(ub >= 0.0);

        let outside = vec![-1.0, 3.0, 5.0, 0.0, 0.0, 0.0];
        let (lb, _) = problem.bounds_dist(&outside);
        assert_abs_diff_eq!(lb, -1.0);
    }
}
