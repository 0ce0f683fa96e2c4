//! Component selection policies and the cumulative importance table.

use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{DecompositionError, Result};

/// How many of the ranked components a model keeps when it is applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Keep every available component.
    None,
    /// Keep exactly `min(k, available)` components.
    Fixed(usize),
    /// Keep the shortest prefix whose cumulative importance proportion reaches `t`.
    Threshold(f64),
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        SelectionPolicy::None
    }
}

impl SelectionPolicy {
    pub fn validate(&self) -> Result<()> {
        match *self {
            SelectionPolicy::None => Ok(()),
            SelectionPolicy::Fixed(0) => Err(DecompositionError::precondition(
                "fixed number of components must be at least 1",
            )),
            SelectionPolicy::Fixed(_) => Ok(()),
            SelectionPolicy::Threshold(t) if !(0.0..=1.0).contains(&t) => Err(DecompositionError::precondition(
                format!("variance threshold must lie in [0, 1], got {}", t),
            )),
            SelectionPolicy::Threshold(_) => Ok(()),
        }
    }

    /// Resolves the policy against ranked importances into a component count.
    ///
    /// Soft conditions (a fixed count larger than what is available) are
    /// logged and pushed onto `warnings`; resolution still succeeds.
    pub fn resolve(&self, importances: &[f64], warnings: &mut Vec<SoftWarning>) -> Result<usize> {
        self.validate()?;
        let available = importances.len();
        match *self {
            SelectionPolicy::None => Ok(available),
            SelectionPolicy::Fixed(k) => {
                if k > available {
                    let w = SoftWarning::ComponentCountCapped { requested: k, available };
                    warn!("{}", w);
                    warnings.push(w);
                }
                Ok(k.min(available))
            }
            SelectionPolicy::Threshold(t) => {
                let table = CumulativeTable::from_importances(importances);
                Ok(table.count_for_threshold(t))
            }
        }
    }
}

/// Conditions surfaced to the caller without aborting fit or apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SoftWarning {
    ComponentCountCapped { requested: usize, available: usize },
    MemoryHeuristic {
        what: String,
        bytes_required: u64,
        bytes_available: u64,
    },
}

impl fmt::Display for SoftWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoftWarning::ComponentCountCapped { requested, available } => write!(
                f,
                "requested {} components but only {} are available; keeping {}",
                requested, available, available
            ),
            SoftWarning::MemoryHeuristic {
                what,
                bytes_required,
                bytes_available,
            } => write!(
                f,
                "{} needs {} bytes, more than half of the {} bytes of available memory",
                what, bytes_required, bytes_available
            ),
        }
    }
}

/// Importance proportions of ranked components and their running sum.
///
/// Derived from the importances on demand; models do not persist it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeTable {
    pub importances: Vec<f64>,
    pub proportions: Vec<f64>,
    pub cumulative: Vec<f64>,
}

impl CumulativeTable {
    /// Builds the table from importances already ranked descending.
    ///
    /// A zero or non-finite total (constant data) splits the proportion
    /// evenly across components.
    pub fn from_importances(importances: &[f64]) -> Self {
        let n = importances.len();
        let total: f64 = importances.iter().sum();
        let proportions: Vec<f64> = if total != 0.0 && total.is_finite() {
            importances.iter().map(|v| v / total).collect()
        } else {
            vec![1.0 / n as f64; n]
        };
        let cumulative = proportions
            .iter()
            .scan(0.0, |acc, p| {
                *acc += p;
                Some(*acc)
            })
            .collect();
        Self {
            importances: importances.to_vec(),
            proportions,
            cumulative,
        }
    }

    pub fn len(&self) -> usize {
        self.importances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.importances.is_empty()
    }

    /// Number of components kept for threshold `t`: find the first index whose
    /// cumulative proportion reaches `t`, keep every index up to and including
    /// it, and give back one if that would keep every component. At least
    /// one component is kept when any exist.
    pub fn count_for_threshold(&self, t: f64) -> usize {
        let n = self.len();
        if n == 0 {
            return 0;
        }
        let crossing = self
            .cumulative
            .iter()
            .position(|&c| c >= t)
            .unwrap_or(n - 1);
        let mut count = crossing + 1;
        if count == n {
            count -= 1;
        }
        count.max(1)
    }
}
