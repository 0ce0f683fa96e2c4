//! Kernel PCA: eigendecomposition of the training Gram matrix.
//!
//! No finite basis exists in field space, so the model keeps every centered
//! training record and evaluates the kernel against all of them for each
//! applied record.

use log::{debug, info, trace, warn};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::algorithm::{ComponentExtractor, Fitted};
use crate::centering::center;
use crate::dataset::Dataset;
use crate::diagnostics::{check_memory_heuristic, FitReport};
use crate::error::{DecompositionError, Result};
use crate::kernel::Kernel;
use crate::linalg_backends::{eigenpairs_descending, BackendEigh, NdarrayLinAlgBackend};
use crate::model::{AlgorithmKind, KernelModel, Model};
use crate::selection::SoftWarning;
use crate::stop::StopHandle;

/// Gram rows filled between two stop checks.
const GRAM_BLOCK_ROWS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KernelPcaConfig {
    pub kernel: Kernel,
    /// Eigenpairs kept at fit time; all `n_records` when `None`.
    pub number_of_components: Option<usize>,
}

impl KernelPcaConfig {
    pub fn validate(&self) -> Result<()> {
        self.kernel.validate()?;
        if self.number_of_components == Some(0) {
            return Err(DecompositionError::precondition(
                "Kernel PCA number_of_components must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn fit_matrix(
        &self,
        field_names: Vec<String>,
        data: ArrayView2<'_, f64>,
        stop: &StopHandle,
    ) -> Result<(KernelModel, Vec<SoftWarning>)> {
        self.validate()?;
        stop.check()?;
        let n_records = data.nrows();
        let n_fields = data.ncols();
        info!(
            "Fitting Kernel PCA ({:?}) on {} records x {} fields.",
            self.kernel, n_records, n_fields
        );
        let mut warnings: Vec<SoftWarning> = check_memory_heuristic("Kernel PCA Gram matrix", n_records, n_records)
            .into_iter()
            .collect();

        let (means, centered) = center(data)?;
        let gram = gram_matrix(&self.kernel, centered.view(), stop)?;
        if gram.iter().any(|v| !v.is_finite()) {
            return Err(DecompositionError::precondition(format!(
                "kernel {:?} produced non-finite similarities between training records",
                self.kernel
            )));
        }
        stop.check()?;
        let eig_pairs = eigenpairs_descending(NdarrayLinAlgBackend.eigh_upper(&gram)?);

        let n_components = match self.number_of_components {
            Some(k) if k > n_records => {
                let w = SoftWarning::ComponentCountCapped {
                    requested: k,
                    available: n_records,
                };
                warn!("{}", w);
                warnings.push(w);
                n_records
            }
            Some(k) => k,
            None => n_records,
        };
        let mut eigenvectors = Array2::<f64>::zeros((n_components, n_records));
        let mut eigenvalues = Array1::<f64>::zeros(n_components);
        for (i, (value, vector)) in eig_pairs.into_iter().take(n_components).enumerate() {
            eigenvalues[i] = value;
            eigenvectors.row_mut(i).assign(&vector);
        }
        debug!("Kernel PCA leading eigenvalues: {:?}", eigenvalues);

        let mut report = FitReport::new(AlgorithmKind::KernelPca.name(), n_records, n_fields);
        report.n_components = n_components;
        let model = KernelModel::new(
            field_names,
            means,
            centered,
            self.kernel,
            eigenvectors,
            eigenvalues,
            report,
        );
        info!(
            "Kernel PCA fit complete: {} components over {} stored training records.",
            n_components, n_records
        );
        Ok((model, warnings))
    }
}

impl ComponentExtractor for KernelPcaConfig {
    fn fit(&self, dataset: &Dataset, stop: &StopHandle) -> Result<Fitted> {
        self.validate()?;
        let (names, data) = dataset.training_matrix()?;
        let (model, warnings) = self.fit_matrix(names, data.view(), stop)?;
        Ok(Fitted {
            model: Model::Kernel(model),
            warnings,
        })
    }
}

/// Pairwise kernel values of the rows of `records`, filled in parallel
/// blocks of rows with a stop check before each block.
/// Shape: (n_records, n_records)
pub fn gram_matrix(kernel: &Kernel, records: ArrayView2<'_, f64>, stop: &StopHandle) -> Result<Array2<f64>> {
    let n = records.nrows();
    let row_len = n.max(1);
    let mut values = vec![0.0; n * n];
    for (block_index, block) in values.chunks_mut(GRAM_BLOCK_ROWS * row_len).enumerate() {
        stop.check()?;
        let first_row = block_index * GRAM_BLOCK_ROWS;
        block
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(offset, row)| {
                let x = records.row(first_row + offset);
                for (slot, y) in row.iter_mut().zip(records.axis_iter(Axis(0))) {
                    *slot = kernel.evaluate(x, y);
                }
            });
        trace!("Gram matrix rows {}..{} of {} filled.", first_row, first_row + block.len() / row_len, n);
    }
    Array2::from_shape_vec((n, n), values)
        .map_err(|e| DecompositionError::Linalg(format!("Gram matrix shape error: {}", e)))
}
