//! Interface to the constraint-based model collaborator.
//!
//! The sampler does not build models or solve linear programs itself. It
//! consumes a solved feasibility backend through the [`FluxModel`] trait:
//! constraint matrices in variable space, the stoichiometry in flux space
//! and a single-objective optimizer used for warmup point generation.

use anyhow::Result;
use faer::Mat;

/// One reaction of the model, split into a forward and a reverse variable.
///
/// The net flux of the reaction is `x[fwd_idx] - x[rev_idx]`.
#[derive(Debug, Clone)]
pub struct Reaction {
    pub id: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub reversible: bool,
    pub fwd_idx: usize,
    pub rev_idx: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveSense {
    Minimize,
    Maximize,
}

/// Matrix form of the model constraints in variable space.
#[derive(Debug, Clone)]
pub struct Constraints {
    /// Equality system, one row per constraint.
    pub equalities: Mat<f64>,
    /// Right hand side of the equality system.
    pub b: Vec<f64>,
    /// Inequality system, one row per constraint.
    pub inequalities: Mat<f64>,
    /// Lower and upper bounds of the inequality rows, one column per row.
    pub bounds: Mat<f64>,
    /// Lower and upper bounds of the variables, one column per variable.
    pub variable_bounds: Mat<f64>,
    /// True where a variable's lower and upper bound coincide.
    pub variable_fixed: Vec<bool>,
}

/// Flux space view of the model used to validate reaction-space samples.
#[derive(Debug, Clone)]
pub struct Stoichiometry {
    /// Stoichiometric matrix, one column per reaction.
    pub matrix: Mat<f64>,
    /// Right hand side of the mass balance constraints.
    pub b: Vec<f64>,
    /// Lower and upper flux bounds, one column per reaction.
    pub bounds: Mat<f64>,
}

/// A solved constraint-based model that the sampler can draw from.
pub trait FluxModel {
    fn reactions(&self) -> &[Reaction];

    fn n_variables(&self) -> usize;

    fn variable_names(&self) -> Vec<String>;

    /// The model's own feasibility tolerance, used as the sampling tolerance.
    fn tolerance(&self) -> f64;

    /// Whether the model contains integer or otherwise discrete variables.
    fn is_discrete(&self) -> bool {
        false
    }

    /// The constraint system in variable space.
    ///
    /// Bound ranges smaller than `zero_tol` mark a variable as fixed.
    fn constraint_matrices(&self, zero_tol: f64) -> Constraints;

    /// The stoichiometric system in flux space.
    fn stoichiometry(&self) -> Stoichiometry;

    /// Optimize a sparse linear objective over the model variables.
    ///
    /// Returns the primal values of all variables if the solver reports an
    /// optimal solution, `None` for any other solver status, and an error
    /// only for unrecoverable solver failures.
    fn optimize(
        &mut self,
        sense: ObjectiveSense,
        objective: &[(usize, f64)],
    ) -> Result<Option<Vec<f64>>>;
}

/// Small analytically solvable models used in tests and benchmarks.
pub mod test_models {
    use super::*;

    /// A model with box bounds and a single equality row, optimized exactly
    /// by a greedy continuous knapsack. Enough structure to drive warmup
    /// generation without a real LP solver.
    pub struct LinearModel {
        reactions: Vec<Reaction>,
        variable_names: Vec<String>,
        lower: Vec<f64>,
        upper: Vec<f64>,
        eq_row: Vec<f64>,
        eq_b: f64,
        tolerance: f64,
        discrete: bool,
    }

    impl LinearModel {
        /// Build a model of irreversible net reactions with the given flux
        /// bounds and one equality `sum(net_coef * flux) = b`.
        ///
        /// Every reaction gets a forward variable with the flux bounds and a
        /// reverse variable fixed at zero, mirroring how a split-variable
        /// solver lays out irreversible reactions.
        pub fn new(ids: &[&str], bounds: &[(f64, f64)], net_coefs: &[f64], b: f64) -> Self {
            assert!(ids.len() == bounds.len());
            assert!(ids.len() == net_coefs.len());
            let n_rxn = ids.len();

            let mut reactions = Vec::with_capacity(n_rxn);
            let mut variable_names = Vec::with_capacity(2 * n_rxn);
            let mut lower = Vec::with_capacity(2 * n_rxn);
            let mut upper = Vec::with_capacity(2 * n_rxn);
            for (i, (&id, &(lb, ub))) in ids.iter().zip(bounds).enumerate() {
                reactions.push(Reaction {
                    id: id.to_string(),
                    lower_bound: lb,
                    upper_bound: ub,
                    reversible: false,
                    fwd_idx: i,
                    rev_idx: n_rxn + i,
                });
                variable_names.push(id.to_string());
                lower.push(lb);
                upper.push(ub);
            }
            for &id in ids {
                variable_names.push(format!("{id}_reverse"));
                lower.push(0.0);
                upper.push(0.0);
            }

            let mut eq_row = vec![0.0; 2 * n_rxn];
            for (i, &coef) in net_coefs.iter().enumerate() {
                eq_row[i] = coef;
                eq_row[n_rxn + i] = -coef;
            }

            Self {
                reactions,
                variable_names,
                lower,
                upper,
                eq_row,
                eq_b: b,
                tolerance: 1e-7,
                discrete: false,
            }
        }

        pub fn with_discrete(mut self) -> Self {
            self.discrete = true;
            self
        }

        /// Fix one variable to a value by collapsing its bounds.
        pub fn fix_variable(&mut self, idx: usize, value: f64) {
            self.lower[idx] = value;
            self.upper[idx] = value;
            if let Some(r) = self.reactions.iter_mut().find(|r| r.fwd_idx == idx) {
                r.lower_bound = value;
                r.upper_bound = value;
            }
        }
    }

    impl FluxModel for LinearModel {
        fn reactions(&self) -> &[Reaction] {
            &self.reactions
        }

        fn n_variables(&self) -> usize {
            self.variable_names.len()
        }

        fn variable_names(&self) -> Vec<String> {
            self.variable_names.clone()
        }

        fn tolerance(&self) -> f64 {
            self.tolerance
        }

        fn is_discrete(&self) -> bool {
            self.discrete
        }

        fn constraint_matrices(&self, zero_tol: f64) -> Constraints {
            let n = self.n_variables();
            let equalities = Mat::from_fn(1, n, |_, j| self.eq_row[j]);
            let variable_bounds = Mat::from_fn(2, n, |i, j| {
                if i == 0 {
                    self.lower[j]
                } else {
                    self.upper[j]
                }
            });
            let variable_fixed = self
                .lower
                .iter()
                .zip(&self.upper)
                .map(|(&l, &u)| (u - l).abs() < zero_tol)
                .collect();

            Constraints {
                equalities,
                b: vec![self.eq_b],
                inequalities: Mat::zeros(0, n),
                bounds: Mat::zeros(2, 0),
                variable_bounds,
                variable_fixed,
            }
        }

        fn stoichiometry(&self) -> Stoichiometry {
            let n_rxn = self.reactions.len();
            let matrix = Mat::from_fn(1, n_rxn, |_, r| self.eq_row[self.reactions[r].fwd_idx]);
            let bounds = Mat::from_fn(2, n_rxn, |i, r| {
                if i == 0 {
                    self.reactions[r].lower_bound
                } else {
                    self.reactions[r].upper_bound
                }
            });
            Stoichiometry {
                matrix,
                b: vec![self.eq_b],
                bounds,
            }
        }

        fn optimize(
            &mut self,
            sense: ObjectiveSense,
            objective: &[(usize, f64)],
        ) -> Result<Option<Vec<f64>>> {
            let mut c = vec![0.0; self.n_variables()];
            for &(idx, coef) in objective {
                c[idx] = match sense {
                    ObjectiveSense::Minimize => coef,
                    ObjectiveSense::Maximize => -coef,
                };
            }
            Ok(solve_single_equality(
                &c,
                &self.eq_row,
                self.eq_b,
                &self.lower,
                &self.upper,
            ))
        }
    }

    /// Minimize `c . x` subject to `a . x = b` and box bounds.
    ///
    /// Greedy exchange on cost-per-unit rates, exact for a single equality.
    fn solve_single_equality(
        c: &[f64],
        a: &[f64],
        b: f64,
        lower: &[f64],
        upper: &[f64],
    ) -> Option<Vec<f64>> {
        let mut x: Vec<f64> = c
            .iter()
            .zip(lower.iter().zip(upper))
            .map(|(&ci, (&l, &u))| if ci < 0.0 { u } else { l })
            .collect();
        let dot = |x: &[f64]| a.iter().zip(x).map(|(&ai, &xi)| ai * xi).sum::<f64>();

        let mut residual = b - dot(&x);
        while residual.abs() > 1e-9 {
            let sign = residual.signum();
            // cheapest move that shifts a.x toward the residual
            let mut best: Option<(f64, usize, f64)> = None;
            for i in 0..x.len() {
                if a[i] == 0.0 {
                    continue;
                }
                let headroom = if a[i] * sign > 0.0 {
                    upper[i] - x[i]
                } else {
                    x[i] - lower[i]
                };
                if headroom <= 1e-12 {
                    continue;
                }
                let rate = c[i] / a[i] * sign;
                let capacity = a[i].abs() * headroom;
                if best.is_none_or(|(r, _, _)| rate < r) {
                    best = Some((rate, i, capacity));
                }
            }
            let (_, i, capacity) = best?;
            let take = residual.abs().min(capacity);
            x[i] += take * sign / a[i];
            residual -= take * sign;
        }
        Some(x)
    }

    /// Non-homogeneous simplex: `x1 + x2 + x3 = 10`, `0 <= xi <= 10`.
    pub fn simplex_model() -> LinearModel {
        LinearModel::new(
            &["R1", "R2", "R3"],
            &[(0.0, 10.0); 3],
            &[1.0, 1.0, 1.0],
            10.0,
        )
    }

    /// Homogeneous flux cone: `v1 + v2 - v3 = 0`, `0 <= vi <= 10`.
    pub fn cone_model() -> LinearModel {
        LinearModel::new(
            &["A", "B", "C"],
            &[(0.0, 10.0); 3],
            &[1.0, 1.0, -1.0],
            0.0,
        )
    }

}
