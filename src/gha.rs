//! Generalized Hebbian Algorithm: online PCA with Sanger's rule.

use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::algorithm::{ComponentExtractor, Fitted};
use crate::centering::{center, covariance};
use crate::component::{rank_components, ComponentVector};
use crate::dataset::Dataset;
use crate::diagnostics::{check_memory_heuristic, ConvergenceDetail, FitReport};
use crate::error::{DecompositionError, Result};
use crate::model::{AlgorithmKind, LinearModel, Model};
use crate::selection::{SelectionPolicy, SoftWarning};
use crate::stop::StopHandle;

const ALGORITHM: &str = "GHA";
const INIT_RANGE: f64 = 0.1;
const PROGRESS_CHECKPOINTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GhaConfig {
    pub policy: SelectionPolicy,
    /// Rows of the Hebbian weight matrix; -1 means one per field.
    pub number_of_components: i64,
    pub learning_rate: f64,
    /// Number of single-record updates.
    pub number_of_iterations: usize,
    pub seed: u64,
}

impl Default for GhaConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::None,
            number_of_components: -1,
            learning_rate: 0.01,
            number_of_iterations: 10,
            seed: 1992,
        }
    }
}

impl GhaConfig {
    pub fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        if self.number_of_components == 0 || self.number_of_components < -1 {
            return Err(DecompositionError::precondition(format!(
                "GHA number_of_components must be -1 or at least 1, got {}",
                self.number_of_components
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(DecompositionError::precondition(format!(
                "GHA learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }

    fn component_count(&self, n_fields: usize) -> Result<usize> {
        if self.number_of_components == -1 {
            return Ok(n_fields);
        }
        let requested = self.number_of_components as usize;
        if requested > n_fields {
            return Err(DecompositionError::precondition(format!(
                "GHA requested {} components but the dataset has only {} regular fields",
                requested, n_fields
            )));
        }
        Ok(requested)
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
        let n_components = self.component_count(n_fields)?;
        info!(
            "Fitting GHA on {} records x {} fields: {} components, {} iterations at rate {}.",
            n_records, n_fields, n_components, self.number_of_iterations, self.learning_rate
        );
        let mut warnings: Vec<SoftWarning> = check_memory_heuristic("GHA covariance matrix", n_fields, n_fields)
            .into_iter()
            .collect();

        let (means, centered) = center(data)?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut weights = Array2::random_using(
            (n_components, n_fields),
            Uniform::new(-INIT_RANGE, INIT_RANGE),
            &mut rng,
        );

        let checkpoint = (self.number_of_iterations / PROGRESS_CHECKPOINTS).max(1);
        for iteration in 1..=self.number_of_iterations {
            stop.check()?;
            let record = centered.row(rng.gen_range(0..n_records));
            sanger_update(&mut weights, record, self.learning_rate);
            if !weights.iter().all(|v| v.is_finite()) {
                warn!("GHA weights became non-finite at iteration {}.", iteration);
                return Err(DecompositionError::Divergence {
                    algorithm: ALGORITHM,
                    iteration,
                });
            }
            if iteration % checkpoint == 0 {
                debug!("GHA iteration {}/{}", iteration, self.number_of_iterations);
            }
        }

        let cov = covariance(centered.view());
        let mut components: Vec<ComponentVector> = weights
            .axis_iter(Axis(0))
            .map(|w| ComponentVector::new(w.to_owned(), estimate_eigenvalue(&cov, w)))
            .collect();
        rank_components(&mut components);

        let mut report = FitReport::new(ALGORITHM, n_records, n_fields);
        report.n_components = n_components;
        report.stages.push(ConvergenceDetail {
            stage_name: "hebbian updates".to_string(),
            iterations: self.number_of_iterations,
            final_limit: None,
            converged: true,
        });
        let model = LinearModel::new(
            AlgorithmKind::Gha,
            field_names,
            means,
            components,
            self.policy,
            None,
            report,
        );
        let kept = model.resolve_count(&self.policy, &mut warnings)?;
        info!("GHA fit complete: {} components, {} kept by default.", n_components, kept);
        Ok((model, warnings))
    }
}

impl ComponentExtractor for GhaConfig {
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

/// `W += rate * (y x^T - LT(y y^T) W)` with `y = W x`, where `LT` keeps the
/// lower triangle including the diagonal.
///
/// Keeping the diagonal departs from a strictly-lower-triangular `LT`: the
/// diagonal term is what holds each row near unit norm. Outputs should be
/// compared against a reference GHA before relying on exact weight values.
fn sanger_update(weights: &mut Array2<f64>, x: ArrayView1<'_, f64>, rate: f64) {
    let y = weights.dot(&x);
    let k = y.len();
    let mut lower = Array2::<f64>::zeros((k, k));
    for i in 0..k {
        for j in 0..=i {
            lower[[i, j]] = y[i] * y[j];
        }
    }
    let hebbian = y
        .view()
        .insert_axis(Axis(1))
        .dot(&x.insert_axis(Axis(0)));
    let decay = lower.dot(&*weights);
    weights.scaled_add(rate, &(hebbian - decay));
}

/// Approximate eigenvalue of a Hebbian weight vector: the mean of the
/// positive ratios `(C w)_j / w_j` over nonzero `w_j`, or 0 if none is positive.
fn estimate_eigenvalue(cov: &Array2<f64>, w: ArrayView1<'_, f64>) -> f64 {
    let projected: Array1<f64> = cov.dot(&w);
    let (sum, count) = projected
        .iter()
        .zip(w.iter())
        .filter(|(_, wj)| **wj != 0.0)
        .map(|(&cj, &wj)| cj / wj)
        .filter(|&ratio| ratio > 0.0)
        .fold((0.0, 0usize), |(s, c), r| (s + r, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
