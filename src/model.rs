//! Fitted transformation models.
//!
//! A model is built once per fit and is immutable afterwards, apart from
//! its default selection policy. `apply` takes the policy override as a
//! per-call argument so one model can serve concurrent callers.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::{debug, trace};
use ndarray::{s, Array1, Array2, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::centering::center_with;
use crate::component::{stack_rows, ComponentVector};
use crate::dataset::{generated_field_name, Dataset};
use crate::diagnostics::FitReport;
use crate::error::{DecompositionError, Result};
use crate::kernel::Kernel;
use crate::selection::{CumulativeTable, SelectionPolicy, SoftWarning};
use crate::stop::{StopHandle, APPLY_STOP_CHECK_INTERVAL};

/// Which extraction algorithm produced a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmKind {
    Pca,
    Svd,
    FastIca,
    Gha,
    KernelPca,
}

impl AlgorithmKind {
    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmKind::Pca => "PCA",
            AlgorithmKind::Svd => "SVD",
            AlgorithmKind::FastIca => "FastICA",
            AlgorithmKind::Gha => "GHA",
            AlgorithmKind::KernelPca => "KernelPCA",
        }
    }

    /// Prefix of the generated output fields (`pc_1`, `ic_1`, ...).
    pub fn field_prefix(&self) -> &'static str {
        match self {
            AlgorithmKind::Pca | AlgorithmKind::Gha => "pc",
            AlgorithmKind::Svd => "svd",
            AlgorithmKind::FastIca => "ic",
            AlgorithmKind::KernelPca => "kpc",
        }
    }

    /// Whether the cumulative-threshold policy is meaningful for this kind.
    pub fn supports_threshold(&self) -> bool {
        matches!(self, AlgorithmKind::Pca | AlgorithmKind::Svd | AlgorithmKind::Gha)
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of the output dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputOptions {
    /// Keep the original regular fields next to the generated ones.
    pub keep_original_fields: bool,
}

/// Per-call settings for `apply`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ApplyOptions {
    /// Overrides the model's default selection policy for this call only.
    pub policy: Option<SelectionPolicy>,
    pub output: OutputOptions,
}

/// Result of applying a model to a dataset.
#[derive(Debug, Clone)]
pub struct Applied {
    pub dataset: Dataset,
    pub n_components: usize,
    pub warnings: Vec<SoftWarning>,
}

/// Weights of one component, labelled for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentWeights {
    pub name: String,
    pub importance: f64,
    /// (field name, weight) for linear models; (training record, coefficient) for kernel models.
    pub weights: Vec<(String, f64)>,
}

/// The capability every fitted model offers.
pub trait Transformation {
    /// Projects `dataset` into the model's component space.
    fn apply(&self, dataset: &Dataset, options: &ApplyOptions, stop: &StopHandle) -> Result<Applied>;

    fn component_weights(&self) -> Vec<ComponentWeights>;

    fn cumulative_importance(&self) -> CumulativeTable;

    fn field_names(&self) -> &[String];

    fn kind(&self) -> AlgorithmKind;
}

/// FastICA's stored whitening and unmixing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcaUnmixing {
    /// Per-field RMS scales when row normalization was requested.
    /// Shape: (n_fields)
    pub field_scales: Option<Array1<f64>>,
    /// Whitening, truncated to the fitted components.
    /// Shape: (n_fields, n_components)
    pub k_matrix: Array2<f64>,
    /// Unmixing in the whitened space.
    /// Shape: (n_components, n_components)
    pub w_matrix: Array2<f64>,
}

/// Finite-basis model produced by PCA, SVD, FastICA and GHA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    kind: AlgorithmKind,
    field_names: Vec<String>,
    /// Training means. Shape: (n_fields)
    means: Array1<f64>,
    /// Ranked components. For PCA, GHA and SVD the weights are the projection
    /// rows; for FastICA they are the mixing directions used for reporting.
    components: Vec<ComponentVector>,
    policy: SelectionPolicy,
    unmixing: Option<IcaUnmixing>,
    report: FitReport,
}

impl LinearModel {
    pub(crate) fn new(
        kind: AlgorithmKind,
        field_names: Vec<String>,
        means: Array1<f64>,
        components: Vec<ComponentVector>,
        policy: SelectionPolicy,
        unmixing: Option<IcaUnmixing>,
        report: FitReport,
    ) -> Self {
        Self {
            kind,
            field_names,
            means,
            components,
            policy,
            unmixing,
            report,
        }
    }

    pub fn means(&self) -> &Array1<f64> {
        &self.means
    }

    pub fn components(&self) -> &[ComponentVector] {
        &self.components
    }

    pub fn importances(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.importance).collect()
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Replaces the default policy used when `apply` gets no override.
    pub fn set_policy(&mut self, policy: SelectionPolicy) -> Result<()> {
        check_policy(self.kind, &policy)?;
        self.policy = policy;
        Ok(())
    }

    pub fn unmixing(&self) -> Option<&IcaUnmixing> {
        self.unmixing.as_ref()
    }

    pub fn report(&self) -> &FitReport {
        &self.report
    }

    /// SVD projects raw values; every other linear model subtracts the training means.
    fn centers(&self) -> bool {
        self.kind != AlgorithmKind::Svd
    }

    /// Number of components kept under `policy`.
    pub fn resolve_count(&self, policy: &SelectionPolicy, warnings: &mut Vec<SoftWarning>) -> Result<usize> {
        check_policy(self.kind, policy)?;
        policy.resolve(&self.importances(), warnings)
    }

    /// Projection matrix for the first `k` components. Shape: (n_fields, k)
    pub fn projection_basis(&self, k: usize) -> Array2<f64> {
        match &self.unmixing {
            Some(ica) => ica.k_matrix.dot(&ica.w_matrix).slice(s![.., ..k]).to_owned(),
            None => stack_rows(&self.components, k, self.field_names.len()).reversed_axes(),
        }
    }

    /// Centers (and for FastICA, rescales) a matrix laid out in model field order.
    fn prepare(&self, data: &mut Array2<f64>) {
        if self.centers() {
            center_with(data, &self.means);
        }
        if let Some(scales) = self.unmixing.as_ref().and_then(|u| u.field_scales.as_ref()) {
            *data /= scales;
        }
    }

    /// Projects a matrix in model field order onto the first `k` components.
    pub fn transform_matrix(&self, data: ArrayView2<'_, f64>, k: usize, stop: &StopHandle) -> Result<Array2<f64>> {
        if data.ncols() != self.field_names.len() {
            return Err(DecompositionError::ShapeMismatch {
                expected: self.field_names.len(),
                found: data.ncols(),
                detail: String::new(),
            });
        }
        if k > self.components.len() {
            return Err(DecompositionError::precondition(format!(
                "cannot project onto {} components, the model has {}",
                k,
                self.components.len()
            )));
        }
        let mut prepared = data.to_owned();
        self.prepare(&mut prepared);
        let basis = self.projection_basis(k);
        let mut output = Array2::zeros((prepared.nrows(), k));
        let mut projected = 0;
        for (chunk_in, mut chunk_out) in prepared
            .axis_chunks_iter(Axis(0), APPLY_STOP_CHECK_INTERVAL)
            .zip(output.axis_chunks_iter_mut(Axis(0), APPLY_STOP_CHECK_INTERVAL))
        {
            stop.check()?;
            chunk_out.assign(&chunk_in.dot(&basis));
            projected += chunk_in.nrows();
            trace!("Projected {} of {} records.", projected, prepared.nrows());
        }
        Ok(output)
    }

    /// Maps component scores back to field space:
    /// `means + sum_i score_i * weights_i`, with the SVD weights rescaled by
    /// the squared singular value and FastICA output rescaled by the field
    /// scales. Scores may cover a prefix of the components.
    pub fn reconstruct(&self, scores: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let k = scores.ncols();
        if k > self.components.len() {
            return Err(DecompositionError::ShapeMismatch {
                expected: self.components.len(),
                found: k,
                detail: "; more score columns than components".to_string(),
            });
        }
        let mut basis = stack_rows(&self.components, k, self.field_names.len());
        if self.kind == AlgorithmKind::Svd {
            for (mut row, component) in basis.axis_iter_mut(Axis(0)).zip(self.components.iter()) {
                row *= component.importance * component.importance;
            }
        }
        let mut reconstructed = scores.dot(&basis);
        if let Some(scales) = self.unmixing.as_ref().and_then(|u| u.field_scales.as_ref()) {
            reconstructed *= scales;
        }
        if self.centers() {
            reconstructed += &self.means;
        }
        Ok(reconstructed)
    }
}

impl Transformation for LinearModel {
    fn apply(&self, dataset: &Dataset, options: &ApplyOptions, stop: &StopHandle) -> Result<Applied> {
        let data = dataset.matrix_for(&self.field_names)?;
        let mut warnings = Vec::new();
        let policy = options.policy.unwrap_or(self.policy);
        let k = self.resolve_count(&policy, &mut warnings)?;
        debug!(
            "Applying {} model to {} records, keeping {} of {} components.",
            self.kind,
            data.nrows(),
            k,
            self.components.len()
        );
        let output = self.transform_matrix(data.view(), k, stop)?;
        let dataset = dataset.with_generated_fields(
            self.kind.field_prefix(),
            output,
            options.output.keep_original_fields,
        )?;
        Ok(Applied {
            dataset,
            n_components: k,
            warnings,
        })
    }

    fn component_weights(&self) -> Vec<ComponentWeights> {
        self.components
            .iter()
            .enumerate()
            .map(|(i, c)| ComponentWeights {
                name: generated_field_name(self.kind.field_prefix(), i + 1),
                importance: c.importance,
                weights: self.field_names.iter().cloned().zip(c.weights.iter().copied()).collect(),
            })
            .collect()
    }

    fn cumulative_importance(&self) -> CumulativeTable {
        CumulativeTable::from_importances(&self.importances())
    }

    fn field_names(&self) -> &[String] {
        &self.field_names
    }

    fn kind(&self) -> AlgorithmKind {
        self.kind
    }
}

impl fmt::Display for LinearModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} model: {} fields, {} components, policy {:?}",
            self.kind,
            self.field_names.len(),
            self.components.len(),
            self.policy
        )?;
        writeln!(f, "{:<12}{:>16}{:>14}{:>14}", "component", "importance", "proportion", "cumulative")?;
        let table = self.cumulative_importance();
        for i in 0..table.len() {
            writeln!(
                f,
                "{:<12}{:>16.6}{:>14.6}{:>14.6}",
                generated_field_name(self.kind.field_prefix(), i + 1),
                table.importances[i],
                table.proportions[i],
                table.cumulative[i]
            )?;
        }
        Ok(())
    }
}

/// Non-parametric Kernel PCA model: keeps every centered training record.
///
/// Applying it costs one kernel evaluation per training record for every
/// applied record (`O(n_training)` per record), and memory grows with the
/// training set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelModel {
    field_names: Vec<String>,
    /// Shape: (n_fields)
    means: Array1<f64>,
    /// Centered training records. Shape: (n_training, n_fields)
    training_rows: Array2<f64>,
    kernel: Kernel,
    /// Ranked Gram-matrix eigenvectors as rows. Shape: (n_components, n_training)
    eigenvectors: Array2<f64>,
    /// Shape: (n_components)
    eigenvalues: Array1<f64>,
    policy: SelectionPolicy,
    report: FitReport,
}

impl KernelModel {
    pub(crate) fn new(
        field_names: Vec<String>,
        means: Array1<f64>,
        training_rows: Array2<f64>,
        kernel: Kernel,
        eigenvectors: Array2<f64>,
        eigenvalues: Array1<f64>,
        report: FitReport,
    ) -> Self {
        Self {
            field_names,
            means,
            training_rows,
            kernel,
            eigenvectors,
            eigenvalues,
            policy: SelectionPolicy::None,
            report,
        }
    }

    pub fn means(&self) -> &Array1<f64> {
        &self.means
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn training_rows(&self) -> &Array2<f64> {
        &self.training_rows
    }

    pub fn eigenvectors(&self) -> &Array2<f64> {
        &self.eigenvectors
    }

    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    pub fn n_components(&self) -> usize {
        self.eigenvectors.nrows()
    }

    pub fn report(&self) -> &FitReport {
        &self.report
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: SelectionPolicy) -> Result<()> {
        check_policy(AlgorithmKind::KernelPca, &policy)?;
        self.policy = policy;
        Ok(())
    }

    /// Kernel similarities of centered records to every training record.
    /// Shape: (n_records, n_training)
    fn similarities(&self, centered: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut sims = Array2::zeros((centered.nrows(), self.training_rows.nrows()));
        Zip::from(sims.rows_mut()).and(centered.rows()).for_each(|mut sim_row, record| {
            for (slot, train) in sim_row.iter_mut().zip(self.training_rows.rows()) {
                *slot = self.kernel.evaluate(record, train);
            }
        });
        sims
    }

    pub fn transform_matrix(&self, data: ArrayView2<'_, f64>, k: usize, stop: &StopHandle) -> Result<Array2<f64>> {
        if data.ncols() != self.field_names.len() {
            return Err(DecompositionError::ShapeMismatch {
                expected: self.field_names.len(),
                found: data.ncols(),
                detail: String::new(),
            });
        }
        if k > self.n_components() {
            return Err(DecompositionError::precondition(format!(
                "cannot project onto {} components, the model has {}",
                k,
                self.n_components()
            )));
        }
        let mut centered = data.to_owned();
        center_with(&mut centered, &self.means);
        let basis = self.eigenvectors.slice(s![..k, ..]);
        let mut output = Array2::zeros((centered.nrows(), k));
        let mut projected = 0;
        for (chunk_in, mut chunk_out) in centered
            .axis_chunks_iter(Axis(0), APPLY_STOP_CHECK_INTERVAL)
            .zip(output.axis_chunks_iter_mut(Axis(0), APPLY_STOP_CHECK_INTERVAL))
        {
            stop.check()?;
            let sims = self.similarities(chunk_in);
            chunk_out.assign(&sims.dot(&basis.t()));
            projected += chunk_in.nrows();
            trace!("Projected {} of {} records onto kernel components.", projected, centered.nrows());
        }
        Ok(output)
    }
}

impl Transformation for KernelModel {
    fn apply(&self, dataset: &Dataset, options: &ApplyOptions, stop: &StopHandle) -> Result<Applied> {
        let data = dataset.matrix_for(&self.field_names)?;
        let mut warnings = Vec::new();
        let policy = options.policy.unwrap_or(self.policy);
        check_policy(AlgorithmKind::KernelPca, &policy)?;
        let k = policy.resolve(self.eigenvalues.as_slice().unwrap_or(&[]), &mut warnings)?;
        debug!(
            "Applying KernelPCA model to {} records against {} training records, {} components.",
            data.nrows(),
            self.training_rows.nrows(),
            k
        );
        let output = self.transform_matrix(data.view(), k, stop)?;
        let dataset = dataset.with_generated_fields(
            AlgorithmKind::KernelPca.field_prefix(),
            output,
            options.output.keep_original_fields,
        )?;
        Ok(Applied {
            dataset,
            n_components: k,
            warnings,
        })
    }

    fn component_weights(&self) -> Vec<ComponentWeights> {
        self.eigenvectors
            .rows()
            .into_iter()
            .zip(self.eigenvalues.iter())
            .enumerate()
            .map(|(i, (row, &eigenvalue))| ComponentWeights {
                name: generated_field_name(AlgorithmKind::KernelPca.field_prefix(), i + 1),
                importance: eigenvalue,
                weights: row
                    .iter()
                    .enumerate()
                    .map(|(r, &w)| (format!("record_{}", r + 1), w))
                    .collect(),
            })
            .collect()
    }

    fn cumulative_importance(&self) -> CumulativeTable {
        CumulativeTable::from_importances(&self.eigenvalues.to_vec())
    }

    fn field_names(&self) -> &[String] {
        &self.field_names
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::KernelPca
    }
}

fn check_policy(kind: AlgorithmKind, policy: &SelectionPolicy) -> Result<()> {
    policy.validate()?;
    if let SelectionPolicy::Threshold(_) = policy {
        if !kind.supports_threshold() {
            return Err(DecompositionError::precondition(format!(
                "{} models do not support threshold selection",
                kind
            )));
        }
    }
    Ok(())
}

/// A fitted model of any algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Model {
    Linear(LinearModel),
    Kernel(KernelModel),
}

impl Model {
    pub fn as_linear(&self) -> Option<&LinearModel> {
        match self {
            Model::Linear(m) => Some(m),
            Model::Kernel(_) => None,
        }
    }

    pub fn as_kernel(&self) -> Option<&KernelModel> {
        match self {
            Model::Kernel(m) => Some(m),
            Model::Linear(_) => None,
        }
    }

    pub fn report(&self) -> &FitReport {
        match self {
            Model::Linear(m) => m.report(),
            Model::Kernel(m) => m.report(),
        }
    }

    pub fn set_policy(&mut self, policy: SelectionPolicy) -> Result<()> {
        match self {
            Model::Linear(m) => m.set_policy(policy),
            Model::Kernel(m) => m.set_policy(policy),
        }
    }

    /// Saves the model to a file using bincode.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref()).map_err(|e| {
            DecompositionError::Persistence(format!("Failed to create file at {:?}: {}", path.as_ref(), e))
        })?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| DecompositionError::Persistence(format!("Failed to serialize model: {}", e)))?;
        Ok(())
    }

    /// Loads a model saved with [`Model::save`] and checks that its parts
    /// agree on dimensions.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            DecompositionError::Persistence(format!("Failed to open file at {:?}: {}", path.as_ref(), e))
        })?;
        let mut reader = BufReader::new(file);
        let model: Model = bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
            .map_err(|e| DecompositionError::Persistence(format!("Failed to deserialize model: {}", e)))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> {
            Err(DecompositionError::Persistence(format!("Loaded model is inconsistent: {}", msg)))
        };
        match self {
            Model::Linear(m) => {
                let d = m.field_names.len();
                if m.means.len() != d {
                    return invalid(format!("{} means for {} fields", m.means.len(), d));
                }
                if let Some(c) = m.components.iter().find(|c| c.weights.len() != d) {
                    return invalid(format!("component of width {} for {} fields", c.weights.len(), d));
                }
                if m.components.iter().any(|c| !c.importance.is_finite()) {
                    return invalid("non-finite component importance".to_string());
                }
                if let Some(ica) = &m.unmixing {
                    if ica.k_matrix.nrows() != d || ica.k_matrix.ncols() != ica.w_matrix.nrows() {
                        return invalid("whitening and unmixing shapes disagree".to_string());
                    }
                    if !ica.w_matrix.is_square() || ica.w_matrix.ncols() != m.components.len() {
                        return invalid(format!(
                            "unmixing matrix of shape {:?} for {} components",
                            ica.w_matrix.dim(),
                            m.components.len()
                        ));
                    }
                    if let Some(scales) = &ica.field_scales {
                        if scales.len() != d {
                            return invalid(format!("{} field scales for {} fields", scales.len(), d));
                        }
                    }
                }
            }
            Model::Kernel(m) => {
                let d = m.field_names.len();
                if m.means.len() != d || m.training_rows.ncols() != d {
                    return invalid(format!("training rows of width {} for {} fields", m.training_rows.ncols(), d));
                }
                if m.eigenvectors.ncols() != m.training_rows.nrows() || m.eigenvectors.nrows() != m.eigenvalues.len() {
                    return invalid("eigenvector shape disagrees with training rows".to_string());
                }
                if m.eigenvalues.iter().any(|v| !v.is_finite()) {
                    return invalid("non-finite kernel eigenvalue".to_string());
                }
            }
        }
        Ok(())
    }
}

impl Transformation for Model {
    fn apply(&self, dataset: &Dataset, options: &ApplyOptions, stop: &StopHandle) -> Result<Applied> {
        match self {
            Model::Linear(m) => m.apply(dataset, options, stop),
            Model::Kernel(m) => m.apply(dataset, options, stop),
        }
    }

    fn component_weights(&self) -> Vec<ComponentWeights> {
        match self {
            Model::Linear(m) => m.component_weights(),
            Model::Kernel(m) => m.component_weights(),
        }
    }

    fn cumulative_importance(&self) -> CumulativeTable {
        match self {
            Model::Linear(m) => m.cumulative_importance(),
            Model::Kernel(m) => m.cumulative_importance(),
        }
    }

    fn field_names(&self) -> &[String] {
        match self {
            Model::Linear(m) => m.field_names(),
            Model::Kernel(m) => m.field_names(),
        }
    }

    fn kind(&self) -> AlgorithmKind {
        match self {
            Model::Linear(m) => m.kind(),
            Model::Kernel(m) => m.kind(),
        }
    }
}
