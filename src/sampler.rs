use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use faer::Mat;
use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, SamplerError};
use crate::linalg::{column_point_mean, mat_from_rows, row_to_vec};
use crate::model::FluxModel;
use crate::problem::Problem;
use crate::step::step;
use crate::table::SampleTable;
use crate::validate::{classify_rows, ValidationSystem};
use crate::warmup::generate_warmup;

// Redraw budget of the strict validity search per iteration.
const VALIDITY_TRIES: usize = 10;

// Validation runs at its own tolerance, deliberately distinct from the
// model tolerance used while sampling.
const DEFAULT_VALIDATION_TOL: f64 = 1e-6;

/// A log scoring function over points of the sampling space.
///
/// Used for the Metropolis test: the sampler evaluates the scorer on the
/// current variable-space point and compares log posteriors. Any
/// `Fn(&[f64]) -> f64` closure qualifies.
pub trait LogDensity {
    fn logp(&self, point: &[f64]) -> f64;
}

impl<F: Fn(&[f64]) -> f64> LogDensity for F {
    fn logp(&self, point: &[f64]) -> f64 {
        self(point)
    }
}

/// Construction-time settings of the sampler.
#[derive(Debug, Clone, Copy)]
pub struct SamplerSettings {
    /// Number of internal steps per emitted sample.
    pub thinning: usize,
    /// Steps between reprojection events. Defaults to
    /// `min(n_variables^3, 1e6)`. Lower it if `validate` reports many
    /// equality violations.
    pub nproj: Option<usize>,
    /// RNG seed; the wall clock is used when unset.
    pub seed: Option<u64>,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            thinning: 100,
            nproj: None,
            seed: None,
        }
    }
}

/// Per-call options of [`AchrSampler::sample_with`].
#[derive(Clone, Copy)]
pub struct SampleOptions<'a> {
    /// Return fluxes (`forward - reverse` per reaction) instead of the raw
    /// solver variables.
    pub fluxes: bool,
    /// Log likelihood of a point against experimental data. Supplying it
    /// locks the center and enables the Metropolis test.
    pub likelihood: Option<&'a dyn LogDensity>,
    /// Log prior over points, added to the likelihood.
    pub prior: Option<&'a dyn LogDensity>,
    /// Re-draw candidates that fail validation, up to a bounded number of
    /// attempts per iteration.
    pub validity_search: bool,
}

impl Default for SampleOptions<'_> {
    fn default() -> Self {
        Self {
            fluxes: true,
            likelihood: None,
            prior: None,
            validity_search: false,
        }
    }
}

/// The best accepted sample of a posterior run.
#[derive(Debug, Clone)]
pub struct BestSample {
    pub posterior: f64,
    pub point: Vec<f64>,
}

/// Artificial Centering Hit-and-Run sampler with a Metropolis overlay.
///
/// New directions are drawn from the warmup points through the running
/// center of the chain, which gives good mixing because the warmup points
/// span the polytope widely. When a likelihood or prior is supplied the
/// center is locked so the chain stays Markovian and the Metropolis test
/// accepts or rejects each step against the log posterior.
pub struct AchrSampler<M: FluxModel> {
    model: M,
    problem: Arc<Problem>,
    /// Warmup points, one per column. `None` until generated.
    warmup: Option<Mat<f64>>,
    center: Vec<f64>,
    prev: Vec<f64>,
    n_samples: usize,
    retries: usize,
    fwd_idx: Vec<usize>,
    rev_idx: Vec<usize>,
    feasibility_tol: f64,
    bounds_tol: f64,
    val_feasibility_tol: f64,
    val_bounds_tol: f64,
    thinning: usize,
    nproj: usize,
    seed: u64,
    rng: ChaCha8Rng,
    best_sample: Option<BestSample>,
    acceptance_rate: Option<f64>,
}

impl<M: FluxModel> AchrSampler<M> {
    /// Build a sampler for a solved model.
    ///
    /// Fails for models with discrete variables, which a continuous
    /// sampler can not handle.
    pub fn new(model: M, settings: SamplerSettings) -> Result<Self> {
        let feasibility_tol = model.tolerance();
        let bounds_tol = model.tolerance();
        let problem = Arc::new(Problem::build(&model, feasibility_tol)?);
        let n = problem.n_variables();

        let fwd_idx = model.reactions().iter().map(|r| r.fwd_idx).collect();
        let rev_idx = model.reactions().iter().map(|r| r.rev_idx).collect();

        let nproj = settings
            .nproj
            .unwrap_or_else(|| (n as u64).saturating_pow(3).min(1_000_000) as usize);

        // avoid overflow in downstream seed arithmetic
        let seed = settings.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        }) % (i32::MAX as u64);

        Ok(Self {
            model,
            problem,
            warmup: None,
            center: vec![0f64; n],
            prev: vec![0f64; n],
            n_samples: 0,
            retries: 0,
            fwd_idx,
            rev_idx,
            feasibility_tol,
            bounds_tol,
            val_feasibility_tol: DEFAULT_VALIDATION_TOL,
            val_bounds_tol: DEFAULT_VALIDATION_TOL,
            thinning: settings.thinning,
            nproj,
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            best_sample: None,
            acceptance_rate: None,
        })
    }

    /// Generate the warmup points by flux variability analysis.
    ///
    /// Each reaction flux is minimized and maximized in turn; with
    /// `include_reversible` the circulation of reversible reactions is
    /// optimized as well, which helps samplers fitting isotope tracing
    /// data where reverse fluxes matter. The center and the current point
    /// are reset to the mean of the warmup set.
    pub fn generate_fva_warmup(&mut self, include_reversible: bool) -> Result<()> {
        let warmup = generate_warmup(
            &mut self.model,
            &self.problem,
            self.feasibility_tol,
            self.bounds_tol,
            include_reversible,
        )?;
        self.center = column_point_mean(&warmup);
        self.prev = self.center.clone();
        self.warmup = Some(warmup);
        Ok(())
    }

    /// Generate `n` samples, one per `thinning` internal steps.
    pub fn sample(&mut self, n: usize) -> Result<SampleTable> {
        self.sample_with(n, SampleOptions::default())
    }

    /// Generate `n` samples with explicit options.
    ///
    /// Without scorers this is plain ACHR sampling with center updates on
    /// every step. With a likelihood and/or prior the center is locked and
    /// each internal step runs the Metropolis test in the log domain; the
    /// first locked step is always accepted, rejected steps roll the
    /// walker back to the last accepted state. Every `thinning`-th point
    /// is emitted regardless of the acceptance outcome.
    pub fn sample_with(&mut self, n: usize, options: SampleOptions<'_>) -> Result<SampleTable> {
        if self.warmup.is_none() {
            return Err(SamplerError::MissingWarmup);
        }

        let lock_center = options.likelihood.is_some() || options.prior.is_some();
        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(n);

        let mut previous_posterior: Option<f64> = None;
        let mut accepted_state: Option<Vec<f64>> = None;
        let mut total = 0usize;
        let mut rejections = 0usize;

        for i in 1..=self.thinning * n {
            self.single_iteration(lock_center, options.validity_search)?;
            total += 1;

            if lock_center {
                let likelihood = options.likelihood.map_or(0.0, |f| f.logp(&self.prev));
                let prior = options.prior.map_or(0.0, |f| f.logp(&self.prev));
                let new_posterior = likelihood + prior;

                match previous_posterior {
                    None => {
                        // always accept on the first iteration
                        previous_posterior = Some(new_posterior);
                        accepted_state = Some(self.prev.clone());
                    }
                    Some(prev_posterior) => {
                        let accept_probability = new_posterior - prev_posterior;
                        if self.rng.random::<f64>().ln() < accept_probability {
                            previous_posterior = Some(new_posterior);
                            accepted_state = Some(self.prev.clone());
                            let improved = self
                                .best_sample
                                .as_ref()
                                .is_none_or(|best| new_posterior > best.posterior);
                            if improved {
                                self.best_sample = Some(BestSample {
                                    posterior: new_posterior,
                                    point: self.prev.clone(),
                                });
                            }
                        } else {
                            // reject, keep the previous state
                            if let Some(state) = &accepted_state {
                                self.prev.copy_from_slice(state);
                            }
                            rejections += 1;
                        }
                    }
                }
            }

            if i % self.thinning == 0 {
                rows.push(self.prev.clone());
            }
        }

        if total > 0 {
            let rate = (total - rejections) as f64 / total as f64;
            info!("acceptance rate: {rate}");
            self.acceptance_rate = Some(rate);
        }

        Ok(self.build_table(rows, options.fluxes))
    }

    /// Lazily generate `batch_num` batches of `batch_size` samples each.
    pub fn batch(&mut self, batch_size: usize, batch_num: usize, fluxes: bool) -> Batches<'_, M> {
        Batches {
            sampler: self,
            batch_size,
            remaining: batch_num,
            fluxes,
        }
    }

    /// Validate a sample matrix for equality and bounds feasibility.
    ///
    /// Samples are interpreted as fluxes when the column count matches the
    /// reaction count, and as raw variables when it matches the variable
    /// count. The optional tolerances override the validation defaults for
    /// this and later calls.
    ///
    /// Each row yields a short code: `"v"` for a feasible row, otherwise a
    /// combination of `l` (lower bound), `u` (upper bound) and `e`
    /// (equality) violations.
    pub fn validate(
        &mut self,
        samples: &Mat<f64>,
        feas_tol: Option<f64>,
        bounds_tol: Option<f64>,
    ) -> Result<Vec<String>> {
        self.val_feasibility_tol = feas_tol.unwrap_or(DEFAULT_VALIDATION_TOL);
        self.val_bounds_tol = bounds_tol.unwrap_or(DEFAULT_VALIDATION_TOL);

        let rows: Vec<Vec<f64>> = (0..samples.nrows())
            .map(|i| row_to_vec(samples, i))
            .collect();

        let n_reactions = self.fwd_idx.len();
        let n_variables = self.problem.n_variables();

        if samples.ncols() == n_reactions {
            let stoich = self.model.stoichiometry();
            let system = ValidationSystem {
                equalities: &stoich.matrix,
                b: &stoich.b,
                bounds: &stoich.bounds,
                inequalities: None,
            };
            Ok(classify_rows(
                &system,
                &rows,
                self.val_feasibility_tol,
                self.val_bounds_tol,
            ))
        } else if samples.ncols() == n_variables {
            let system = ValidationSystem {
                equalities: &self.problem.equalities,
                b: &self.problem.b,
                bounds: &self.problem.variable_bounds,
                inequalities: Some((&self.problem.inequalities, &self.problem.bounds)),
            };
            Ok(classify_rows(
                &system,
                &rows,
                self.val_feasibility_tol,
                self.val_bounds_tol,
            ))
        } else {
            Err(SamplerError::ShapeMismatch {
                got: samples.ncols(),
                reactions: n_reactions,
                variables: n_variables,
            })
        }
    }

    /// One internal hit-and-run iteration.
    fn single_iteration(&mut self, lock_center: bool, validity_search: bool) -> Result<()> {
        let from = self.prev.clone();
        let mut candidate = self.hit_and_run_step(&from)?;

        if validity_search {
            let mut attempts = 0;
            while !self.is_valid_point(&candidate) {
                if attempts == VALIDITY_TRIES {
                    return Err(SamplerError::NoValidSample(VALIDITY_TRIES));
                }
                debug!("candidate failed validation, searching a new valid sample");
                let from = candidate;
                candidate = self.hit_and_run_step(&from)?;
                attempts += 1;
            }
        }

        self.prev = candidate;

        if self.problem.homogeneous && (self.n_samples * self.thinning) % self.nproj == 0 {
            let prev = self.prev.clone();
            self.prev = self.reproject(&prev)?;
            if !lock_center {
                let center = self.center.clone();
                self.center = self.reproject(&center)?;
            }
        }

        if !lock_center {
            // exact running mean, before the counter moves
            let count = self.n_samples as f64;
            let Self { center, prev, .. } = self;
            for (c, &p) in center.iter_mut().zip(prev.iter()) {
                *c = (count * *c + p) / (count + 1.0);
            }
        }
        self.n_samples += 1;
        Ok(())
    }

    /// Advance from a point along a random warmup direction through the center.
    fn hit_and_run_step(&mut self, from: &[f64]) -> Result<Vec<f64>> {
        let Self {
            problem,
            warmup,
            center,
            retries,
            rng,
            feasibility_tol,
            bounds_tol,
            ..
        } = self;
        let warmup = warmup.as_ref().ok_or(SamplerError::MissingWarmup)?;

        // mix in the original warmup points to not get stuck
        let pi = rng.random_range(0..warmup.ncols());
        let delta: Vec<f64> = warmup
            .col_as_slice(pi)
            .iter()
            .zip(center.iter())
            .map(|(&w, &c)| w - c)
            .collect();

        step(
            problem.as_ref(),
            warmup,
            center,
            *feasibility_tol,
            *bounds_tol,
            retries,
            rng,
            from,
            &delta,
            None,
        )
    }

    /// Reproject a point into the feasibility region.
    ///
    /// Guaranteed to return a feasible point, with no guarantee of
    /// proximity to the input: if the null space projection moved the
    /// point at all, the projection may have left the bounds, and an
    /// approximately random warmup average is substituted instead.
    fn reproject(&mut self, p: &[f64]) -> Result<Vec<f64>> {
        let new = if self.problem.equality_residual(p) < self.feasibility_tol {
            p.to_vec()
        } else {
            info!(
                "feasibility violated in sample {}, trying to reproject",
                self.n_samples
            );
            self.problem.project_nullspace(p)
        };

        if new.iter().zip(p).any(|(a, b)| a != b) {
            info!(
                "reprojection failed in sample {}, using random point in space",
                self.n_samples
            );
            return self.random_point();
        }
        Ok(new)
    }

    /// An approximately random point: the mean of a small random subset of
    /// warmup points.
    fn random_point(&mut self) -> Result<Vec<f64>> {
        let warmup = self.warmup.as_ref().ok_or(SamplerError::MissingWarmup)?;
        let n_warmup = warmup.ncols();
        let size = 2.min((n_warmup as f64).sqrt().ceil() as usize);

        let mut point = vec![0f64; self.problem.n_variables()];
        for _ in 0..size {
            let idx = self.rng.random_range(0..n_warmup);
            for (p, &w) in point.iter_mut().zip(warmup.col_as_slice(idx)) {
                *p += w;
            }
        }
        let scale = (size as f64).recip();
        point.iter_mut().for_each(|p| *p *= scale);
        Ok(point)
    }

    fn is_valid_point(&self, p: &[f64]) -> bool {
        let system = ValidationSystem {
            equalities: &self.problem.equalities,
            b: &self.problem.b,
            bounds: &self.problem.variable_bounds,
            inequalities: Some((&self.problem.inequalities, &self.problem.bounds)),
        };
        let codes = classify_rows(
            &system,
            std::slice::from_ref(&p.to_vec()),
            DEFAULT_VALIDATION_TOL,
            DEFAULT_VALIDATION_TOL,
        );
        codes[0] == "v"
    }

    fn build_table(&self, rows: Vec<Vec<f64>>, fluxes: bool) -> SampleTable {
        if fluxes {
            let names = self
                .model
                .reactions()
                .iter()
                .map(|r| r.id.clone())
                .collect();
            let data = Mat::from_fn(rows.len(), self.fwd_idx.len(), |i, r| {
                rows[i][self.fwd_idx[r]] - rows[i][self.rev_idx[r]]
            });
            SampleTable::new(names, data)
        } else {
            let names = self.model.variable_names();
            let data = mat_from_rows(&rows, self.problem.n_variables());
            SampleTable::new(names, data)
        }
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// Shared handle to the read-only problem, for independent replicas.
    pub fn share_problem(&self) -> Arc<Problem> {
        Arc::clone(&self.problem)
    }

    pub fn warmup(&self) -> Option<&Mat<f64>> {
        self.warmup.as_ref()
    }

    pub fn center(&self) -> &[f64] {
        &self.center
    }

    /// Total internal steps taken by this sampler instance.
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Numerical retries observed so far; large values indicate an
    /// unstable model.
    pub fn retries(&self) -> usize {
        self.retries
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn best_sample(&self) -> Option<&BestSample> {
        self.best_sample.as_ref()
    }

    /// Acceptance rate of the most recent `sample` call.
    pub fn acceptance_rate(&self) -> Option<f64> {
        self.acceptance_rate
    }
}

/// Lazy batch generator returned by [`AchrSampler::batch`].
pub struct Batches<'a, M: FluxModel> {
    sampler: &'a mut AchrSampler<M>,
    batch_size: usize,
    remaining: usize,
    fluxes: bool,
}

impl<M: FluxModel> Iterator for Batches<'_, M> {
    type Item = Result<SampleTable>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let options = SampleOptions {
            fluxes: self.fluxes,
            ..SampleOptions::default()
        };
        Some(self.sampler.sample_with(self.batch_size, options))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_models::{cone_model, simplex_model};
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;

    fn warmed_sampler(seed: u64) -> AchrSampler<crate::model::test_models::LinearModel> {
        let settings = SamplerSettings {
            thinning: 10,
            nproj: None,
            seed: Some(seed),
        };
        let mut sampler = AchrSampler::new(simplex_model(), settings).unwrap();
        sampler.generate_fva_warmup(false).unwrap();
        sampler
    }

    #[test]
    fn sampling_without_warmup_fails() {
        let mut sampler =
            AchrSampler::new(simplex_model(), SamplerSettings::default()).unwrap();
        assert!(matches!(
            sampler.sample(1),
            Err(SamplerError::MissingWarmup)
        ));
    }

    #[test]
    fn plain_achr_always_accepts() {
        let mut sampler = warmed_sampler(42);
        let table = sampler.sample(20).unwrap();
        assert_eq!(table.nrows(), 20);
        assert_abs_diff_eq!(sampler.acceptance_rate().unwrap(), 1.0);
        assert!(sampler.best_sample().is_none());
    }

    #[test]
    fn scorers_lock_the_center() {
        let mut sampler = warmed_sampler(7);
        // let the center move once, then freeze it
        sampler.sample(5).unwrap();
        let center_before = sampler.center().to_vec();

        let likelihood = |_: &[f64]| 0.0;
        let options = SampleOptions {
            fluxes: true,
            likelihood: Some(&likelihood),
            ..SampleOptions::default()
        };
        sampler.sample_with(10, options).unwrap();
        assert_eq!(sampler.center(), center_before.as_slice());
    }

    #[test]
    fn posterior_run_tracks_the_best_sample() {
        let mut sampler = warmed_sampler(3);
        // prefer samples with a large first flux
        let likelihood = |p: &[f64]| p[0] - p[3];
        let options = SampleOptions {
            fluxes: true,
            likelihood: Some(&likelihood),
            ..SampleOptions::default()
        };
        sampler.sample_with(10, options).unwrap();

        let best = sampler.best_sample().expect("posterior run records a best");
        assert_abs_diff_eq!(
            best.posterior,
            likelihood(&best.point),
            epsilon = 1e-12
        );
        let rate = sampler.acceptance_rate().unwrap();
        assert!(rate > 0.0 && rate <= 1.0);
    }

    #[test]
    fn validity_search_keeps_samples_valid() {
        let mut sampler = warmed_sampler(11);
        let options = SampleOptions {
            fluxes: true,
            validity_search: true,
            ..SampleOptions::default()
        };
        let table = sampler.sample_with(5, options).unwrap();
        let codes = sampler.validate(table.data(), None, None).unwrap();
        assert!(codes.iter().all(|c| c == "v"));
    }

    #[test]
    fn homogeneous_chain_reprojects() {
        let settings = SamplerSettings {
            thinning: 5,
            // reproject every other internal step
            nproj: Some(2),
            seed: Some(19),
        };
        let mut sampler = AchrSampler::new(cone_model(), settings).unwrap();
        sampler.generate_fva_warmup(false).unwrap();
        let table = sampler.sample(20).unwrap();

        for i in 0..table.nrows() {
            let row = table.row(i);
            // v1 + v2 - v3 = 0 within the sampling tolerance
            assert_abs_diff_eq!(row[0] + row[1] - row[2], 0.0, epsilon = 1e-6);
        }
        // the running center stays on the equality manifold as well
        assert!(sampler.problem().equality_residual(sampler.center()) < 1e-6);
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let mut sampler = warmed_sampler(1);
        let bad = Mat::zeros(2, 4);
        assert!(matches!(
            sampler.validate(&bad, None, None),
            Err(SamplerError::ShapeMismatch { got: 4, .. })
        ));
    }
}
