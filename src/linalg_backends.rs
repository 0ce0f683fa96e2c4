// src/linalg_backends.rs

use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::{Eigh as NdLinalgEigh, Inverse as NdLinalgInverse, SVDInto as NdLinalgSVDInto, UPLO};

use crate::error::{DecompositionError, Result};

/// Output of a symmetric eigendecomposition.
#[derive(Debug)]
pub struct EighOutput<F: 'static> {
    /// Eigenvalues in ascending order, as LAPACK returns them.
    pub eigenvalues: Array1<F>,
    /// Eigenvectors as columns of the matrix.
    /// eigenvectors.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<F>,
}

/// Output of a Singular Value Decomposition.
#[derive(Debug)]
pub struct SVDOutput<F: 'static> {
    pub u: Option<Array2<F>>,
    pub s: Array1<F>,
    pub vt: Option<Array2<F>>,
}

/// Trait for symmetric eigendecomposition (similar to LAPACK's DSYEVD).
/// Implementers will typically expect `matrix` to be symmetric.
pub trait BackendEigh<F: 'static + Copy + Send + Sync> {
    fn eigh_upper(&self, matrix: &Array2<F>) -> Result<EighOutput<F>>;
}

/// Trait for Singular Value Decomposition.
pub trait BackendSVD<F: 'static + Copy + Send + Sync> {
    fn svd_into(&self, matrix: Array2<F>, compute_u: bool, compute_v: bool) -> Result<SVDOutput<F>>;
}

/// Trait for inverting a square, non-singular matrix.
pub trait BackendInverse<F: 'static + Copy + Send + Sync> {
    fn inverse(&self, matrix: &Array2<F>) -> Result<Array2<F>>;
}

/// Dense backend over `ndarray-linalg`. The LAPACK provider is picked by the
/// `backend_*` cargo features.
#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

impl BackendEigh<f64> for NdarrayLinAlgBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>> {
        if matrix.nrows() != matrix.ncols() {
            return Err(DecompositionError::Linalg(format!(
                "Matrix must be square for eigendecomposition, got {}x{}.",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if matrix.is_empty() {
            return Ok(EighOutput {
                eigenvalues: Array1::zeros(0),
                eigenvectors: Array2::zeros((0, 0)),
            });
        }
        let (eigenvalues, eigenvectors) = matrix
            .eigh(UPLO::Upper)
            .map_err(|e| DecompositionError::linalg("symmetric eigendecomposition", e))?;
        Ok(EighOutput { eigenvalues, eigenvectors })
    }
}

impl BackendSVD<f64> for NdarrayLinAlgBackend {
    fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SVDOutput<f64>> {
        let (u, s, vt) = matrix
            .svd_into(compute_u, compute_v)
            .map_err(|e| DecompositionError::linalg("singular value decomposition", e))?;
        Ok(SVDOutput { u, s, vt })
    }
}

impl BackendInverse<f64> for NdarrayLinAlgBackend {
    fn inverse(&self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        matrix
            .inv()
            .map_err(|e| DecompositionError::linalg("matrix inverse", e))
    }
}

/// Computes `M^{-1/2}` of a symmetric positive definite matrix through its
/// eigendecomposition: `V diag(1/sqrt(lambda)) V^T`.
///
/// Non-positive eigenvalues produce non-finite entries; callers that iterate
/// on the result check for them.
pub fn symmetric_inverse_sqrt<B: BackendEigh<f64>>(backend: &B, matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let EighOutput { eigenvalues, eigenvectors } = backend.eigh_upper(matrix)?;
    let inv_sqrt = eigenvalues.mapv(|lambda| 1.0 / lambda.sqrt());
    // V * diag(d) scales column j of V by d[j]
    let scaled = &eigenvectors * &inv_sqrt.insert_axis(Axis(0));
    Ok(scaled.dot(&eigenvectors.t()))
}

/// Reorders eigenpairs descending by eigenvalue. The sort is stable, so
/// equal eigenvalues keep the order the backend returned them in.
pub fn eigenpairs_descending(output: EighOutput<f64>) -> Vec<(f64, Array1<f64>)> {
    let EighOutput { eigenvalues, eigenvectors } = output;
    let mut eig_pairs: Vec<(f64, Array1<f64>)> = eigenvalues
        .into_iter()
        .zip(eigenvectors.columns().into_iter().map(|col| col.to_owned()))
        .collect();
    eig_pairs.sort_by(|(a, _), (b, _)| b.total_cmp(a));
    eig_pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn eigh_of_diagonal_matrix() {
        let m = array![[2.0, 0.0], [0.0, 5.0]];
        let out = NdarrayLinAlgBackend.eigh_upper(&m).unwrap();
        assert_abs_diff_eq!(out.eigenvalues[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.eigenvalues[1], 5.0, epsilon = 1e-12);
    }

    #[test]
    fn eigh_rejects_non_square() {
        let m = Array2::<f64>::zeros((2, 3));
        assert!(NdarrayLinAlgBackend.eigh_upper(&m).is_err());
    }

    #[test]
    fn eigenpairs_sorted_descending() {
        let m = array![[3.0, 1.0], [1.0, 3.0]];
        let out = NdarrayLinAlgBackend.eigh_upper(&m).unwrap();
        let pairs = eigenpairs_descending(out);
        assert_abs_diff_eq!(pairs[0].0, 4.0, epsilon = 1e-10);
        assert_abs_diff_eq!(pairs[1].0, 2.0, epsilon = 1e-10);
    }

    #[test]
    fn inverse_sqrt_squares_back_to_inverse() {
        let m = array![[4.0, 1.0], [1.0, 3.0]];
        let backend = NdarrayLinAlgBackend;
        let r = symmetric_inverse_sqrt(&backend, &m).unwrap();
        let product = r.dot(&r).dot(&m);
        assert_abs_diff_eq!(product, Array2::eye(2), epsilon = 1e-10);
    }

    #[test]
    fn svd_singular_values_descending() {
        let m = array![[3.0, 0.0], [0.0, 4.0], [0.0, 0.0]];
        let out = NdarrayLinAlgBackend.svd_into(m, true, true).unwrap();
        assert_abs_diff_eq!(out.s[0], 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.s[1], 3.0, epsilon = 1e-12);
        assert!(out.u.is_some() && out.vt.is_some());
    }

    #[test]
    fn inverse_of_identity() {
        let m = Array2::<f64>::eye(3);
        let inv = NdarrayLinAlgBackend.inverse(&m).unwrap();
        assert_abs_diff_eq!(inv, m, epsilon = 1e-12);
    }
}
