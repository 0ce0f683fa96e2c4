//! Singular value decomposition of the raw (uncentered) data matrix.

use log::{debug, info};
use ndarray::{ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::algorithm::{ComponentExtractor, Fitted};
use crate::centering::field_means;
use crate::component::ComponentVector;
use crate::dataset::Dataset;
use crate::diagnostics::FitReport;
use crate::error::{DecompositionError, Result};
use crate::linalg_backends::{BackendSVD, NdarrayLinAlgBackend};
use crate::model::{AlgorithmKind, LinearModel, Model};
use crate::selection::{SelectionPolicy, SoftWarning};
use crate::stop::StopHandle;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SvdConfig {
    pub policy: SelectionPolicy,
}

impl SvdConfig {
    pub fn validate(&self) -> Result<()> {
        self.policy.validate()
    }

    /// Decomposes `data = U S V^T` without subtracting the means.
    ///
    /// Component `i` is `V[:, i] / s_i` with importance `s_i`, in the order
    /// LAPACK returns them (descending). A zero singular value yields a zero
    /// weight vector. Applying the model to the training data therefore
    /// reproduces the columns of `U`.
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
        info!("Fitting SVD on {} records x {} fields (uncentered).", n_records, n_fields);

        // Means are kept for reporting only; the projection ignores them.
        let means = field_means(data)?;
        let out = NdarrayLinAlgBackend.svd_into(data.to_owned(), false, true)?;
        let vt = out
            .vt
            .ok_or_else(|| DecompositionError::Linalg("SVD did not return right singular vectors".to_string()))?;

        let components: Vec<ComponentVector> = out
            .s
            .iter()
            .zip(vt.axis_iter(Axis(0)))
            .map(|(&sigma, v_row)| {
                let weights = if sigma > 0.0 {
                    v_row.mapv(|v| v / sigma)
                } else {
                    v_row.mapv(|_| 0.0)
                };
                ComponentVector::new(weights, sigma)
            })
            .collect();
        debug!("Singular values: {:?}", out.s);

        let mut report = FitReport::new(AlgorithmKind::Svd.name(), n_records, n_fields);
        report.n_components = components.len();
        let model = LinearModel::new(
            AlgorithmKind::Svd,
            field_names,
            means,
            components,
            self.policy,
            None,
            report,
        );
        let mut warnings = Vec::new();
        let kept = model.resolve_count(&self.policy, &mut warnings)?;
        info!("SVD fit complete: {} singular values, {} kept by default.", out.s.len(), kept);
        Ok((model, warnings))
    }
}

impl ComponentExtractor for SvdConfig {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Transformation;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    fn fitted() -> LinearModel {
        let data = array![[3.0, 1.0], [1.0, 3.0], [2.0, 2.0], [0.0, 1.0]];
        SvdConfig::default()
            .fit_matrix(vec!["a".into(), "b".into()], data.view(), &StopHandle::new())
            .unwrap()
            .0
    }

    #[test]
    fn singular_values_are_descending_importances() {
        let model = fitted();
        let importances = model.importances();
        assert_eq!(importances.len(), 2);
        assert!(importances[0] >= importances[1]);
        assert!(importances.iter().all(|&s| s >= 0.0));
    }

    #[test]
    fn training_projection_has_orthonormal_columns() {
        let model = fitted();
        let data = array![[3.0, 1.0], [1.0, 3.0], [2.0, 2.0], [0.0, 1.0]];
        let u = model.transform_matrix(data.view(), 2, &StopHandle::new()).unwrap();
        let gram = u.t().dot(&u);
        assert_abs_diff_eq!(gram, Array2::<f64>::eye(2), epsilon = 1e-10);
    }

    #[test]
    fn cumulative_uses_singular_values_not_squares() {
        let model = fitted();
        let s = model.importances();
        let table = model.cumulative_importance();
        assert_abs_diff_eq!(table.proportions[0], s[0] / (s[0] + s[1]), epsilon = 1e-12);
    }

    #[test]
    fn reconstruct_recovers_uncentered_data() {
        let model = fitted();
        let data = array![[3.0, 1.0], [1.0, 3.0], [2.0, 2.0], [0.0, 1.0]];
        let scores = model.transform_matrix(data.view(), 2, &StopHandle::new()).unwrap();
        let back = model.reconstruct(scores.view()).unwrap();
        assert_abs_diff_eq!(back, data, epsilon = 1e-10);
    }
}
