use faer::Mat;
use log::info;

use crate::error::{Result, SamplerError};
use crate::math::redundant_rows;
use crate::model::{FluxModel, ObjectiveSense};
use crate::problem::Problem;

/// Generate warmup points by minimizing and maximizing each reaction flux.
///
/// The resulting extreme points approximate the shape of the polytope and
/// later serve as the pool of perturbation directions. With
/// `include_reversible` the circulation of every reversible reaction
/// (forward plus reverse flux) is optimized as well, which adds directions
/// that change exchange flux without changing net flux.
///
/// Returns the warmup set with one point per column.
pub(crate) fn generate_warmup<M: FluxModel>(
    model: &mut M,
    problem: &Problem,
    feasibility_tol: f64,
    bounds_tol: f64,
    include_reversible: bool,
) -> Result<Mat<f64>> {
    let reactions = model.reactions().to_vec();
    let mut points: Vec<Vec<f64>> = Vec::with_capacity(2 * reactions.len());

    for sense in [ObjectiveSense::Minimize, ObjectiveSense::Maximize] {
        for r in &reactions {
            // fixed reactions contribute no direction
            if r.upper_bound - r.lower_bound < bounds_tol {
                info!("skipping fixed reaction {}", r.id);
                continue;
            }

            let objective = [(r.fwd_idx, 1.0), (r.rev_idx, -1.0)];
            match model.optimize(sense, &objective)? {
                Some(solution) => points.push(solution),
                None => {
                    info!("can not optimize reaction {}, skipping it", r.id);
                    continue;
                }
            }

            if include_reversible && r.reversible {
                // both coefficients positive: drive circulation within the
                // reaction without altering its net flux
                let objective = [(r.fwd_idx, 1.0), (r.rev_idx, 1.0)];
                match model.optimize(sense, &objective)? {
                    Some(solution) => points.push(solution),
                    None => info!("can not optimize circulation of {}, skipping it", r.id),
                }
            }
        }
    }

    // remove redundant search directions
    let redundant = redundant_rows(&points, 1.0 - feasibility_tol);
    let mut points: Vec<Vec<f64>> = points
        .into_iter()
        .zip(redundant)
        .filter(|(_, redundant)| !redundant)
        .map(|(p, _)| p)
        .collect();

    match points.len() {
        0 | 1 => return Err(SamplerError::DegenerateCone),
        2 if !problem.homogeneous => return Err(SamplerError::InhomogeneousLine),
        2 => {
            info!("all search directions on a line, adding another one");
            let extra: Vec<f64> = points[0]
                .iter()
                .zip(&points[1])
                .map(|(&a, &b)| 0.25 * a + 0.25 * b)
                .collect();
            points.push(extra);
        }
        _ => {}
    }

    let mut warmup = Mat::zeros(problem.n_variables(), points.len());
    for (c, p) in points.iter().enumerate() {
        warmup.col_as_slice_mut(c).copy_from_slice(p);
    }
    Ok(warmup)
}
