use faer::Mat;

use crate::error::{Result, SamplerError};

// Singular values below max(ATOL, RTOL * smax) count as zero.
const NULLSPACE_ATOL: f64 = 1e-13;
const NULLSPACE_RTOL: f64 = 0.0;

/// Orthonormal basis of the null space of `a`, one basis vector per column.
///
/// Computed from the full SVD so that rank deficient equality systems
/// (stoichiometric matrices usually are) are handled correctly.
pub(crate) fn nullspace(a: &Mat<f64>) -> Result<Mat<f64>> {
    let n = a.ncols();
    if a.nrows() == 0 {
        return Ok(Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 }));
    }

    let svd = a.svd().map_err(|_| SamplerError::SvdFailed)?;
    let singular = svd.S().column_vector().to_owned();
    let smax = singular.iter().fold(0f64, |acc, &s| acc.max(s));
    let tol = NULLSPACE_ATOL.max(NULLSPACE_RTOL * smax);
    let rank = singular.iter().filter(|&&s| s > tol).count();

    let v = svd.V();
    let mut nulls = Mat::zeros(n, n - rank);
    for c in 0..n - rank {
        let src = v.col(rank + c);
        nulls
            .col_as_slice_mut(c)
            .copy_from_slice(src.try_as_col_major().unwrap().as_slice());
    }
    Ok(nulls)
}

/// `m * x` for a column major matrix and a point given as a slice.
pub(crate) fn mat_vec(m: &Mat<f64>, x: &[f64]) -> Vec<f64> {
    assert!(m.ncols() == x.len());
    let mut out = vec![0f64; m.nrows()];
    for (j, &xj) in x.iter().enumerate() {
        if xj == 0.0 {
            continue;
        }
        for (out, &mij) in out.iter_mut().zip(m.col_as_slice(j)) {
            *out += mij * xj;
        }
    }
    out
}

/// Build a matrix from row slices.
pub(crate) fn mat_from_rows(rows: &[Vec<f64>], ncols: usize) -> Mat<f64> {
    Mat::from_fn(rows.len(), ncols, |i, j| rows[i][j])
}

/// Extract one row of a column major matrix.
pub(crate) fn row_to_vec(m: &Mat<f64>, row: usize) -> Vec<f64> {
    (0..m.ncols()).map(|j| m[(row, j)]).collect()
}

/// Per-coordinate mean over the columns of `m`.
pub(crate) fn column_point_mean(m: &Mat<f64>) -> Vec<f64> {
    let mut mean = vec![0f64; m.nrows()];
    for j in 0..m.ncols() {
        for (mean, &v) in mean.iter_mut().zip(m.col_as_slice(j)) {
            *mean += v;
        }
    }
    let scale = (m.ncols() as f64).recip();
    mean.iter_mut().for_each(|v| *v *= scale);
    mean
}
