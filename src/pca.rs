// src/pca.rs
//! Principal Component Analysis through the eigendecomposition of the field
//! covariance matrix.

use log::{debug, info};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::algorithm::{ComponentExtractor, Fitted};
use crate::centering::{center, covariance};
use crate::component::ComponentVector;
use crate::dataset::Dataset;
use crate::diagnostics::{check_memory_heuristic, FitReport};
use crate::error::Result;
use crate::linalg_backends::{eigenpairs_descending, BackendEigh, NdarrayLinAlgBackend};
use crate::model::{AlgorithmKind, LinearModel, Model};
use crate::selection::{SelectionPolicy, SoftWarning};
use crate::stop::StopHandle;

/// Configuration for covariance PCA.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PcaConfig {
    /// Default number of components kept when the model is applied.
    pub policy: SelectionPolicy,
}

impl PcaConfig {
    pub fn validate(&self) -> Result<()> {
        self.policy.validate()
    }

    /// Fits PCA on a records x fields matrix.
    ///
    /// Every eigenpair of the covariance matrix becomes a component, ranked
    /// descending by eigenvalue. Eigenvalues are kept as computed, so tiny
    /// negative values from rounding can appear at the tail.
    ///
    /// # Errors
    /// Returns a precondition error for an empty matrix and a linalg error if
    /// the eigendecomposition fails.
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
        info!("Fitting PCA on {} records x {} fields.", n_records, n_fields);

        let mut warnings: Vec<SoftWarning> = check_memory_heuristic("PCA covariance matrix", n_fields, n_fields)
            .into_iter()
            .collect();

        let (means, centered) = center(data)?;
        let cov_matrix: Array2<f64> = covariance(centered.view());
        let eig_pairs = eigenpairs_descending(NdarrayLinAlgBackend.eigh_upper(&cov_matrix)?);

        let components: Vec<ComponentVector> = eig_pairs
            .into_iter()
            .map(|(eigenvalue, eigenvector)| ComponentVector::new(eigenvector, eigenvalue))
            .collect();
        debug!(
            "PCA eigenvalues: {:?}",
            components.iter().map(|c| c.importance).collect::<Vec<_>>()
        );

        let mut report = FitReport::new(AlgorithmKind::Pca.name(), n_records, n_fields);
        report.n_components = components.len();
        let model = LinearModel::new(
            AlgorithmKind::Pca,
            field_names,
            means,
            components,
            self.policy,
            None,
            report,
        );
        let kept = model.resolve_count(&self.policy, &mut warnings)?;
        info!("PCA fit complete: {} components, {} kept by default.", n_fields, kept);
        Ok((model, warnings))
    }
}

impl ComponentExtractor for PcaConfig {
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
