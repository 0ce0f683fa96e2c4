//! Per-field means, mean subtraction and the field scaling used by FastICA.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{DecompositionError, Result};

/// Arithmetic mean of every field (column).
pub fn field_means(data: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
    data.mean_axis(Axis(0))
        .ok_or_else(|| DecompositionError::precondition("cannot compute means of a dataset without records"))
}

/// Mean-centers `data` in place with the given (training) means.
pub fn center_with(data: &mut Array2<f64>, means: &Array1<f64>) {
    *data -= means;
}

/// Computes training means and returns them with the centered copy of `data`.
pub fn center(data: ArrayView2<'_, f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let means = field_means(data)?;
    let mut centered = data.to_owned();
    center_with(&mut centered, &means);
    Ok((means, centered))
}

/// Root-mean-square of every already-centered field, with the sample
/// (n-1) denominator. Zero scales are replaced by 1.0 so constant fields
/// pass through as zeros.
pub fn field_rms(centered: ArrayView2<'_, f64>) -> Array1<f64> {
    let n = centered.nrows();
    let denom = if n > 1 { (n - 1) as f64 } else { 1.0 };
    centered.map_axis(Axis(0), |column| {
        let rms = (column.dot(&column) / denom).sqrt();
        if rms > 0.0 && rms.is_finite() {
            rms
        } else {
            1.0
        }
    })
}

/// Field covariance of centered data with the sample (n-1) denominator.
/// Shape: (n_fields, n_fields)
pub fn covariance(centered: ArrayView2<'_, f64>) -> Array2<f64> {
    let n = centered.nrows();
    let denom = if n > 1 { (n - 1) as f64 } else { 1.0 };
    centered.t().dot(&centered) / denom
}
