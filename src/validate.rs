use faer::Mat;

use crate::linalg::mat_vec;

/// The constraint system a set of samples is checked against.
///
/// In flux space this is the stoichiometry; in variable space the full
/// equality system plus the inequality constraints.
pub(crate) struct ValidationSystem<'a> {
    pub(crate) equalities: &'a Mat<f64>,
    pub(crate) b: &'a [f64],
    /// Lower and upper bounds, one column per sample column.
    pub(crate) bounds: &'a Mat<f64>,
    /// Inequality system and its bounds, present only in variable space.
    pub(crate) inequalities: Option<(&'a Mat<f64>, &'a Mat<f64>)>,
}

/// Classify each sample row against equality, lower and upper bound checks.
///
/// The checks are independent: a row that fails several of them gets all
/// the matching letters. `"v"` marks a row that passes everything.
pub(crate) fn classify_rows(
    system: &ValidationSystem,
    samples: &[Vec<f64>],
    feas_tol: f64,
    bounds_tol: f64,
) -> Vec<String> {
    samples
        .iter()
        .map(|row| {
            let residual = mat_vec(system.equalities, row);
            let feasibility = residual
                .iter()
                .zip(system.b)
                .fold(0f64, |acc, (&lhs, &rhs)| acc.max((lhs - rhs).abs()));

            let mut lb_error = f64::INFINITY;
            let mut ub_error = f64::INFINITY;
            for (j, &v) in row.iter().enumerate() {
                lb_error = lb_error.min(v - system.bounds[(0, j)]);
                ub_error = ub_error.min(system.bounds[(1, j)] - v);
            }

            if let Some((ineqs, ineq_bounds)) = system.inequalities {
                if ineqs.nrows() > 0 {
                    let consts = mat_vec(ineqs, row);
                    for (r, &v) in consts.iter().enumerate() {
                        lb_error = lb_error.min(v - ineq_bounds[(0, r)]);
                        ub_error = ub_error.min(ineq_bounds[(1, r)] - v);
                    }
                }
            }

            let valid = feasibility < feas_tol && lb_error > -bounds_tol && ub_error > -bounds_tol;
            if valid {
                return "v".to_string();
            }
            let mut code = String::new();
            if lb_error <= -bounds_tol {
                code.push('l');
            }
            if ub_error <= -bounds_tol {
                code.push('u');
            }
            if feasibility > feas_tol {
                code.push('e');
            }
            code
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::mat_from_rows;
    use pretty_assertions::assert_eq;

    fn simplex_system() -> (Mat<f64>, Vec<f64>, Mat<f64>) {
        let equalities = mat_from_rows(&[vec![1.0, 1.0, 1.0]], 3);
        let b = vec![10.0];
        let bounds = Mat::from_fn(2, 3, |i, _| if i == 0 { 0.0 } else { 10.0 });
        (equalities, b, bounds)
    }

    #[test]
    fn feasible_rows_are_valid() {
        let (equalities, b, bounds) = simplex_system();
        let system = ValidationSystem {
            equalities: &equalities,
            b: &b,
            bounds: &bounds,
            inequalities: None,
        };
        let codes = classify_rows(&system, &[vec![2.0, 3.0, 5.0]], 1e-6, 1e-6);
        assert_eq!(codes, vec!["v".to_string()]);
    }

    #[test]
    fn violations_combine_letters() {
        let (equalities, b, bounds) = simplex_system();
        let system = ValidationSystem {
            equalities: &equalities,
            b: &b,
            bounds: &bounds,
            inequalities: None,
        };

        // upper bound of the second variable broken, equality broken too
        let codes = classify_rows(&system, &[vec![2.0, 12.0, 5.0]], 1e-6, 1e-6);
        assert_eq!(codes, vec!["ue".to_string()]);

        // lower bound violation with a compensating equality
        let codes = classify_rows(&system, &[vec![-1.0, 6.0, 5.0]], 1e-6, 1e-6);
        assert_eq!(codes, vec!["l".to_string()]);
    }

    #[test]
    fn classification_is_idempotent() {
        let (equalities, b, bounds) = simplex_system();
        let system = ValidationSystem {
            equalities: &equalities,
            b: &b,
            bounds: &bounds,
            inequalities: None,
        };
        let rows = vec![vec![2.0, 3.0, 5.0], vec![0.0, 0.0, 10.0]];
        let first = classify_rows(&system, &rows, 1e-6, 1e-6);
        let second = classify_rows(&system, &rows, 1e-6, 1e-6);
        assert_eq!(first, second);
        assert!(first.iter().all(|c| c == "v"));
    }
}
