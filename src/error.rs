use thiserror::Error;

/// Errors raised while building or running a hit-and-run sampler.
#[derive(Error, Debug)]
pub enum SamplerError {
    /// Sampling requires a purely continuous relaxation of the model.
    #[error("sampling does not work with integer problems")]
    DiscreteModel,

    /// Warmup collapsed to at most one independent search direction.
    #[error("the flux cone consists of a single point")]
    DegenerateCone,

    /// An inhomogeneous feasible region needs a genuine interior point,
    /// two search directions only describe a line.
    #[error("can not sample from an inhomogeneous problem with only 2 search directions")]
    InhomogeneousLine,

    /// `sample` was called before `generate_fva_warmup`.
    #[error("no warmup points, call generate_fva_warmup first")]
    MissingWarmup,

    /// A step could not find a valid point within the internal retry budget.
    #[error(
        "can not escape sampling region after {0} retries, the model seems \
         numerically unstable. Consider relaxing the tolerances or reporting \
         the model upstream"
    )]
    NumericallyUnstable(usize),

    /// Strict validity search could not find a feasible candidate.
    #[error("tried to find a valid sample {0} times without success")]
    NoValidSample(usize),

    /// A sample matrix matches neither the reaction nor the variable count.
    #[error(
        "wrong number of columns: samples must have one column per \
         reaction ({reactions}) or per variable ({variables}), got {got}"
    )]
    ShapeMismatch {
        got: usize,
        reactions: usize,
        variables: usize,
    },

    /// The nullspace decomposition did not converge.
    #[error("singular value decomposition of the equality system failed")]
    SvdFailed,

    /// The model optimizer failed with an unrecoverable error.
    #[error(transparent)]
    Model(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SamplerError>;
