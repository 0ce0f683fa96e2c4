// src/diagnostics.rs

use log::warn;
use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::selection::SoftWarning;

/// Convergence record of one iterative estimation run (a FastICA deflation
/// component, the FastICA parallel basis, or the GHA training loop).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceDetail {
    pub stage_name: String,          // e.g., "component 2", "parallel basis", "hebbian updates"
    pub iterations: usize,
    pub final_limit: Option<f64>,    // last convergence metric, None when the loop has none (GHA)
    pub converged: bool,
}

/// What a fit did, kept on the model for reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub algorithm: String,
    pub n_records: usize,
    pub n_fields: usize,
    pub n_components: usize,
    pub stages: Vec<ConvergenceDetail>,
}

impl FitReport {
    pub fn new(algorithm: &str, n_records: usize, n_fields: usize) -> Self {
        Self {
            algorithm: algorithm.to_string(),
            n_records,
            n_fields,
            ..Default::default()
        }
    }

    /// True when every iterative stage met its tolerance. Non-iterative fits
    /// have no stages and count as converged.
    pub fn all_converged(&self) -> bool {
        self.stages.iter().all(|s| s.converged)
    }
}

/// Bytes needed for a dense `rows x cols` f64 matrix.
pub fn dense_matrix_bytes(rows: usize, cols: usize) -> u64 {
    (rows as u64)
        .saturating_mul(cols as u64)
        .saturating_mul(std::mem::size_of::<f64>() as u64)
}

/// Flags a dense allocation that would take more than half of the memory
/// currently available. Execution continues either way.
pub fn check_memory_heuristic(what: &str, rows: usize, cols: usize) -> Option<SoftWarning> {
    let mut sys = System::new();
    sys.refresh_memory();
    memory_warning(what, dense_matrix_bytes(rows, cols), sys.available_memory())
}

fn memory_warning(what: &str, bytes_required: u64, bytes_available: u64) -> Option<SoftWarning> {
    // Some sandboxes report zero available memory; treat that as unknown.
    if bytes_available == 0 || bytes_required <= bytes_available / 2 {
        return None;
    }
    let warning = SoftWarning::MemoryHeuristic {
        what: what.to_string(),
        bytes_required,
        bytes_available,
    };
    warn!("{}", warning);
    Some(warning)
}

/// Computes Frobenius norm for an f64 matrix.
pub fn compute_frob_norm_f64(matrix: &ndarray::ArrayView2<f64>) -> f64 {
    if matrix.is_empty() {
        return 0.0;
    }
    matrix.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

/// `||I - W W^T||_F` for a matrix whose rows should be orthonormal.
pub fn row_orthonormality_error(matrix: &ndarray::ArrayView2<f64>) -> f64 {
    let gram = matrix.dot(&matrix.t());
    let residual = ndarray::Array2::<f64>::eye(gram.nrows()) - gram;
    compute_frob_norm_f64(&residual.view())
}
