//! Ranked component vectors shared by PCA, SVD and GHA.

use std::cmp::Ordering;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// One direction of a learned basis paired with its importance score
/// (eigenvalue, singular value, or estimated eigenvalue).
///
/// Orders descending by importance, so sorting a `Vec<ComponentVector>`
/// ascending puts the most important component first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentVector {
    /// Shape: (n_fields)
    pub weights: Array1<f64>,
    pub importance: f64,
}

impl ComponentVector {
    pub fn new(weights: Array1<f64>, importance: f64) -> Self {
        Self { weights, importance }
    }

    pub fn weights(&self) -> ArrayView1<'_, f64> {
        self.weights.view()
    }
}

impl PartialEq for ComponentVector {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ComponentVector {}

impl PartialOrd for ComponentVector {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComponentVector {
    fn cmp(&self, other: &Self) -> Ordering {
        other.importance.total_cmp(&self.importance)
    }
}

/// Sorts components descending by importance. Stable: ties keep their
/// extraction order.
pub fn rank_components(components: &mut [ComponentVector]) {
    components.sort();
}

/// Stacks the first `k` component weight vectors as rows, shape (k, n_fields).
pub fn stack_rows(components: &[ComponentVector], k: usize, n_fields: usize) -> Array2<f64> {
    let mut basis = Array2::zeros((k, n_fields));
    for (mut row, component) in basis.axis_iter_mut(Axis(0)).zip(components.iter().take(k)) {
        row.assign(&component.weights);
    }
    basis
}
