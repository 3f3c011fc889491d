use itertools::izip;

/// `out = a * x + y`
pub(crate) fn axpy_out(x: &[f64], y: &[f64], a: f64, out: &mut [f64]) {
    let n = x.len();
    assert!(y.len() == n);
    assert!(out.len() == n);

    izip!(x, y, out.iter_mut()).for_each(|(x, y, out)| {
        *out = a * x + y;
    });
}

pub(crate) fn max_abs(x: &[f64]) -> f64 {
    x.iter().fold(0f64, |acc, &v| acc.max(v.abs()))
}

/// Pearson correlation coefficient of two equally sized slices.
///
/// Returns NaN if either slice has zero variance, so threshold comparisons
/// on the result are false for degenerate inputs.
pub(crate) fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len();
    assert!(b.len() == n);
    let inv_n = (n as f64).recip();

    let mean_a = a.iter().sum::<f64>() * inv_n;
    let mean_b = b.iter().sum::<f64>() * inv_n;

    let (mut cov, mut var_a, mut var_b) = (0f64, 0f64, 0f64);
    izip!(a, b).for_each(|(&x, &y)| {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    });

    cov / (var_a * var_b).sqrt()
}

/// Mark rows whose absolute correlation with an earlier row exceeds `cutoff`.
///
/// Each row gets an auxiliary trailing entry (`row[0] + 1`, or `2` for
/// all-zero rows) so that constant rows have non-zero variance. Correlation
/// is affine invariant, so all constant rows (zero rows included) still
/// collapse onto a single direction. Only the strictly lower triangle of
/// the correlation matrix is inspected, which keeps the first occurrence of
/// every direction.
pub(crate) fn redundant_rows(rows: &[Vec<f64>], cutoff: f64) -> Vec<bool> {
    let extended: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| {
            let extra = if row.iter().sum::<f64>() == 0.0 {
                2.0
            } else {
                row[0] + 1.0
            };
            let mut ext = row.clone();
            ext.push(extra);
            ext
        })
        .collect();

    let mut redundant = vec![false; rows.len()];
    for i in 1..extended.len() {
        for j in 0..i {
            if pearson(&extended[i], &extended[j]).abs() > cutoff {
                redundant[i] = true;
                break;
            }
        }
    }
    redundant
}
