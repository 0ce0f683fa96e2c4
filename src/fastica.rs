// src/fastica.rs
//! FastICA: fixed-point estimation of statistically independent components.
//!
//! The data is centered, optionally scaled per field, and whitened with the
//! SVD of its covariance. The unmixing matrix is then found either one row at
//! a time (deflation, with Gram-Schmidt against the accepted rows) or as a
//! whole (parallel, with symmetric decorrelation every iteration).

use log::{debug, info, trace};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::algorithm::{ComponentExtractor, Fitted};
use crate::centering::{center, field_rms};
use crate::component::ComponentVector;
use crate::dataset::Dataset;
use crate::diagnostics::{check_memory_heuristic, row_orthonormality_error, ConvergenceDetail, FitReport};
use crate::error::{DecompositionError, Result};
use crate::linalg_backends::{symmetric_inverse_sqrt, BackendInverse, BackendSVD, NdarrayLinAlgBackend};
use crate::model::{AlgorithmKind, IcaUnmixing, LinearModel, Model};
use crate::selection::{SelectionPolicy, SoftWarning};
use crate::stop::StopHandle;

const ALGORITHM: &str = "FastICA";

/// How the rows of the unmixing matrix are estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IcaAlgorithmType {
    /// One component at a time.
    #[default]
    Deflation,
    /// All components jointly.
    Parallel,
}

/// Contrast function used to approximate negentropy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IcaFunction {
    /// `G(u) = log cosh(alpha u) / alpha`
    #[default]
    LogCosh,
    /// `G(u) = -exp(-u^2 / 2)`
    Exp,
}

impl IcaFunction {
    /// Applies `g` to `u` in place and returns the mean of `g'(u)`.
    fn apply(&self, u: &mut Array1<f64>, alpha: f64) -> f64 {
        let n = u.len().max(1) as f64;
        let mut derivative_sum = 0.0;
        match self {
            IcaFunction::LogCosh => u.mapv_inplace(|v| {
                let t = (alpha * v).tanh();
                derivative_sum += alpha * (1.0 - t * t);
                t
            }),
            IcaFunction::Exp => u.mapv_inplace(|v| {
                let e = (-v * v / 2.0).exp();
                derivative_sum += (1.0 - v * v) * e;
                v * e
            }),
        }
        derivative_sum / n
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FastIcaConfig {
    /// `None` extracts one component per field; `Fixed(k)` extracts `min(k, fields)`.
    pub policy: SelectionPolicy,
    pub algorithm_type: IcaAlgorithmType,
    pub function: IcaFunction,
    /// Constant of the logcosh contrast, in [1, 2].
    pub alpha: f64,
    /// Scale every centered field to unit root-mean-square before whitening.
    pub row_norm: bool,
    /// Upper bound on fixed-point updates, per component in deflation mode.
    pub max_iteration: usize,
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for FastIcaConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::None,
            algorithm_type: IcaAlgorithmType::Deflation,
            function: IcaFunction::LogCosh,
            alpha: 1.0,
            row_norm: false,
            max_iteration: 200,
            tolerance: 1e-4,
            seed: 1992,
        }
    }
}

impl FastIcaConfig {
    pub fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        if let SelectionPolicy::Threshold(_) = self.policy {
            return Err(DecompositionError::precondition(
                "FastICA does not support threshold selection; use a fixed number of components",
            ));
        }
        if !(1.0..=2.0).contains(&self.alpha) {
            return Err(DecompositionError::precondition(format!(
                "FastICA alpha must lie in [1, 2], got {}",
                self.alpha
            )));
        }
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            return Err(DecompositionError::precondition(format!(
                "FastICA tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// Number of independent components to extract from `n_fields` fields.
    fn component_count(&self, n_fields: usize, warnings: &mut Vec<SoftWarning>) -> Result<usize> {
        let importances = vec![1.0; n_fields];
        self.policy.resolve(&importances, warnings)
    }

    pub fn fit_matrix(
        &self,
        field_names: Vec<String>,
        data: ArrayView2<'_, f64>,
        stop: &StopHandle,
    ) -> Result<(LinearModel, Vec<SoftWarning>)> {
        self.validate()?;
        stop.check()?;
        let n_records = data.nrows();
        let n_fields = data.ncols();
        let mut warnings: Vec<SoftWarning> = check_memory_heuristic("FastICA covariance matrix", n_fields, n_fields)
            .into_iter()
            .collect();
        let n_components = self.component_count(n_fields, &mut warnings)?;
        info!(
            "Fitting FastICA ({:?}, {:?}) on {} records x {} fields, extracting {} components.",
            self.algorithm_type, self.function, n_records, n_fields, n_components
        );

        let (means, mut centered) = center(data)?;
        let field_scales = if self.row_norm {
            let scales = field_rms(centered.view());
            centered /= &scales;
            Some(scales)
        } else {
            None
        };

        let backend = NdarrayLinAlgBackend;
        let whitening = whitening_matrix(&backend, centered.view(), n_components)?;
        // Whitened records as rows. Shape: (n_records, n_components)
        let whitened = centered.dot(&whitening.t());

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| DecompositionError::precondition(format!("cannot build normal distribution: {}", e)))?;
        let w_init = Array2::from_shape_fn((n_components, n_components), |_| normal.sample(&mut rng));

        let mut report = FitReport::new(ALGORITHM, n_records, n_fields);
        let unmixing = match self.algorithm_type {
            IcaAlgorithmType::Deflation => self.deflation(whitened.view(), w_init, &mut report, stop)?,
            IcaAlgorithmType::Parallel => self.parallel(&backend, whitened.view(), w_init, &mut report, stop)?,
        };

        // Combined unmixing of centered (scaled) data. Shape: (n_components, n_fields)
        let combined = unmixing.dot(&whitening);
        let gram = combined.dot(&combined.t());
        let mixing = combined.t().dot(&backend.inverse(&gram)?);
        let components: Vec<ComponentVector> = mixing
            .axis_iter(Axis(1))
            .map(|column| ComponentVector::new(column.to_owned(), 1.0))
            .collect();

        debug!(
            "FastICA unmixing orthonormality error: {:.3e}",
            row_orthonormality_error(&unmixing.view())
        );
        report.n_components = n_components;
        if !report.all_converged() {
            info!("FastICA reached max_iteration before tolerance {} on some components.", self.tolerance);
        }
        let model = LinearModel::new(
            AlgorithmKind::FastIca,
            field_names,
            means,
            components,
            self.policy,
            Some(IcaUnmixing {
                field_scales,
                k_matrix: whitening.reversed_axes(),
                w_matrix: unmixing.reversed_axes(),
            }),
            report,
        );
        info!("FastICA fit complete: {} components.", n_components);
        Ok((model, warnings))
    }

    /// Estimates the unmixing rows one at a time. Each accepted row is
    /// orthogonal to every row accepted before it.
    fn deflation(
        &self,
        whitened: ArrayView2<'_, f64>,
        w_init: Array2<f64>,
        report: &mut FitReport,
        stop: &StopHandle,
    ) -> Result<Array2<f64>> {
        let n_components = w_init.nrows();
        let n = whitened.nrows() as f64;
        let mut unmixing = Array2::<f64>::zeros((n_components, n_components));

        for i in 0..n_components {
            let mut w = w_init.row(i).to_owned();
            orthogonalize_against(&mut w, unmixing.view(), i);
            normalize(&mut w);

            let mut lim = f64::INFINITY;
            let mut iteration = 1;
            while lim > self.tolerance && iteration <= self.max_iteration {
                stop.check()?;
                let mut wx = whitened.dot(&w);
                let mean_derivative = self.function.apply(&mut wx, self.alpha);
                let mut w1 = whitened.t().dot(&wx) / n - &(&w * mean_derivative);
                orthogonalize_against(&mut w1, unmixing.view(), i);
                normalize(&mut w1);
                if !w1.iter().all(|v| v.is_finite()) {
                    return Err(DecompositionError::Divergence {
                        algorithm: ALGORITHM,
                        iteration,
                    });
                }
                lim = (w1.dot(&w).abs() - 1.0).abs();
                trace!("FastICA component {} iteration {}: limit {:.3e}", i + 1, iteration, lim);
                w = w1;
                iteration += 1;
            }
            let iterations = iteration - 1;
            debug!(
                "FastICA component {} finished after {} iterations, limit {:.3e}.",
                i + 1,
                iterations,
                lim
            );
            report.stages.push(ConvergenceDetail {
                stage_name: format!("component {}", i + 1),
                iterations,
                final_limit: (iterations > 0).then_some(lim),
                converged: lim <= self.tolerance,
            });
            unmixing.row_mut(i).assign(&w);
        }
        Ok(unmixing)
    }

    /// Updates the whole unmixing matrix each iteration and restores
    /// orthonormality with `W <- (W W^T)^{-1/2} W`.
    fn parallel(
        &self,
        backend: &NdarrayLinAlgBackend,
        whitened: ArrayView2<'_, f64>,
        w_init: Array2<f64>,
        report: &mut FitReport,
        stop: &StopHandle,
    ) -> Result<Array2<f64>> {
        let n = whitened.nrows() as f64;
        let mut w = symmetric_decorrelation(backend, &w_init)?;

        let mut lim = f64::INFINITY;
        let mut iteration = 1;
        while lim > self.tolerance && iteration <= self.max_iteration {
            stop.check()?;
            // Column j holds the projections on row j of W. Shape: (n_records, n_components)
            let mut wx = whitened.dot(&w.t());
            let mut mean_derivatives = Array1::<f64>::zeros(w.nrows());
            for (mut column, slot) in wx.axis_iter_mut(Axis(1)).zip(mean_derivatives.iter_mut()) {
                let mut owned = column.to_owned();
                *slot = self.function.apply(&mut owned, self.alpha);
                column.assign(&owned);
            }
            let expectation = wx.t().dot(&whitened) / n;
            let update = expectation - &(&w * &mean_derivatives.insert_axis(Axis(1)));
            let w1 = symmetric_decorrelation(backend, &update)?;
            if !w1.iter().all(|v| v.is_finite()) {
                return Err(DecompositionError::Divergence {
                    algorithm: ALGORITHM,
                    iteration,
                });
            }
            lim = w1
                .dot(&w.t())
                .diag()
                .iter()
                .map(|d| (d.abs() - 1.0).abs())
                .fold(0.0, f64::max);
            trace!("FastICA parallel iteration {}: limit {:.3e}", iteration, lim);
            w = w1;
            iteration += 1;
        }
        let iterations = iteration - 1;
        debug!("FastICA parallel basis finished after {} iterations, limit {:.3e}.", iterations, lim);
        report.stages.push(ConvergenceDetail {
            stage_name: "parallel basis".to_string(),
            iterations,
            final_limit: (iterations > 0).then_some(lim),
            converged: lim <= self.tolerance,
        });
        Ok(w)
    }
}

impl ComponentExtractor for FastIcaConfig {
    fn fit(&self, dataset: &Dataset, stop: &StopHandle) -> Result<Fitted> {
        self.validate()?;
        let (names, data) = dataset.training_matrix()?;
        let (model, warnings) = self.fit_matrix(names, data.view(), stop)?;
        Ok(Fitted {
            model: Model::Linear(model),
            warnings,
        })
    }
}

/// `K = D^{-1/2} U^T` from the SVD of the covariance `X^T X / n`, truncated
/// to `n_components` rows. Shape: (n_components, n_fields)
fn whitening_matrix(
    backend: &NdarrayLinAlgBackend,
    centered: ArrayView2<'_, f64>,
    n_components: usize,
) -> Result<Array2<f64>> {
    let n = centered.nrows() as f64;
    let cov = centered.t().dot(&centered) / n;
    let out = backend.svd_into(cov, true, false)?;
    let u = out
        .u
        .ok_or_else(|| DecompositionError::Linalg("SVD did not return left singular vectors".to_string()))?;
    // Singular values below this are rank deficiency, not signal.
    let floor = out.s.first().copied().unwrap_or(0.0) * 1e-12;
    let mut whitening = Array2::<f64>::zeros((n_components, centered.ncols()));
    for (i, mut row) in whitening.axis_iter_mut(Axis(0)).enumerate() {
        let d = out.s[i];
        if !(d > floor) {
            return Err(DecompositionError::precondition(format!(
                "cannot whiten: covariance has no variance left for component {}; extract fewer components",
                i + 1
            )));
        }
        row.assign(&(&u.column(i) / d.sqrt()));
    }
    Ok(whitening)
}

fn symmetric_decorrelation(backend: &NdarrayLinAlgBackend, w: &Array2<f64>) -> Result<Array2<f64>> {
    let inv_sqrt = symmetric_inverse_sqrt(backend, &w.dot(&w.t()))?;
    Ok(inv_sqrt.dot(w))
}

/// Gram-Schmidt step against the first `accepted` rows of `basis`.
fn orthogonalize_against(w: &mut Array1<f64>, basis: ArrayView2<'_, f64>, accepted: usize) {
    for row in basis.axis_iter(Axis(0)).take(accepted) {
        let projection = w.dot(&row);
        w.scaled_add(-projection, &row);
    }
}

fn normalize(w: &mut Array1<f64>) {
    let norm = w.dot(w).sqrt();
    *w /= norm;
}
