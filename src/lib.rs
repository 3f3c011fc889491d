//! Sample the flux space of constraint-based metabolic models.
//!
//! The sampler walks the convex polytope defined by a model's
//! stoichiometry, bounds and extra constraints using Artificial Centering
//! Hit-and-Run (ACHR). Warmup points come from flux variability analysis
//! and serve as the direction pool of the walk, which gives good mixing
//! even in very elongated flux spaces. An optional Metropolis layer turns
//! the uniform walk into a posterior sampler for user supplied log
//! likelihoods and priors.
//!
//! ```
//! use achr_rs::{AchrSampler, SamplerSettings, test_models};
//!
//! let settings = SamplerSettings {
//!     thinning: 10,
//!     seed: Some(42),
//!     ..SamplerSettings::default()
//! };
//! let mut sampler = AchrSampler::new(test_models::simplex_model(), settings)?;
//! sampler.generate_fva_warmup(false)?;
//! let samples = sampler.sample(100)?;
//! assert_eq!(samples.nrows(), 100);
//! # Ok::<(), achr_rs::SamplerError>(())
//! ```

pub(crate) mod error;
pub(crate) mod linalg;
pub(crate) mod math;
pub(crate) mod model;
pub(crate) mod problem;
pub(crate) mod sampler;
pub(crate) mod step;
pub(crate) mod table;
pub(crate) mod validate;
pub(crate) mod warmup;

pub use error::{Result, SamplerError};
pub use model::{Constraints, FluxModel, ObjectiveSense, Reaction, Stoichiometry};
pub use model::test_models;
pub use problem::Problem;
pub use sampler::{
    AchrSampler, Batches, BestSample, LogDensity, SampleOptions, SamplerSettings,
};
pub use table::SampleTable;
